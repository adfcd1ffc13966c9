//! PostgreSQL wire canonicalization (§4.E, §6): deterministic rewrites that
//! strip environment-dependent fields so record and replay hash requests
//! identically regardless of parameter ordering or server version.

/// `BackendKeyData` process-id override.
pub const FIXED_PROCESS_ID: [u8; 4] = [0x00, 0x00, 0x00, 0x21];
/// `BackendKeyData` secret-key override.
pub const FIXED_SECRET_KEY: [u8; 4] = [0x02, 0x04, 0x08, 0x10];
/// `RowDescription` table-OID override.
pub const FIXED_TABLE_OID: [u8; 4] = [0x00, 0x00, 0x04, 0x21];

/// Canonicalizes a startup message: `length:4-BE | version:4 | (key\0value\0)* | \0`.
/// Sorts the key/value pairs lexicographically by key so map-iteration order
/// at record time never perturbs the hash. `raw` is the full message
/// including the 4-byte length prefix.
pub fn canonicalize_startup(raw: &[u8]) -> Vec<u8> {
    let version = &raw[4..8];
    let mut pairs = Vec::new();
    let mut i = 8;
    while i < raw.len() && raw[i] != 0 {
        let (key, next) = read_cstr(raw, i);
        let (value, next) = read_cstr(raw, next);
        pairs.push((key, value));
        i = next;
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Vec::with_capacity(raw.len());
    out.extend_from_slice(&raw[..4]); // length, unchanged
    out.extend_from_slice(version);
    for (key, value) in pairs {
        out.extend_from_slice(key);
        out.push(0);
        out.extend_from_slice(value);
        out.push(0);
    }
    out.push(0); // terminator
    out
}

fn read_cstr(buf: &[u8], start: usize) -> (&[u8], usize) {
    let mut end = start;
    while buf[end] != 0 {
        end += 1;
    }
    (&buf[start..end], end + 1)
}

/// Result of canonicalizing one normal-phase message.
pub struct Canonicalized {
    /// The full rewritten message, tag + length + payload.
    pub bytes: Vec<u8>,
    /// True if this was a `Terminate` ('X') message — the framer that
    /// produced it should stop after emitting it.
    pub terminate: bool,
}

/// Canonicalizes one normal-phase message. `raw` is `tag:1 | length:4-BE |
/// payload:length-4`, exactly as it arrived on the wire.
pub fn canonicalize_message(raw: &[u8]) -> Canonicalized {
    let tag = raw[0];
    let header = &raw[0..5];
    let payload = &raw[5..];

    let rewritten_payload = match tag {
        b'X' => return Canonicalized {
            bytes: header.to_vec(),
            terminate: true,
        },
        b'K' => {
            let mut p = Vec::with_capacity(payload.len());
            p.extend_from_slice(&FIXED_PROCESS_ID);
            p.extend_from_slice(&FIXED_SECRET_KEY);
            p
        }
        b'S' => canonicalize_parameter_status(payload),
        b'T' => canonicalize_row_description(payload),
        _ => payload.to_vec(),
    };

    let mut bytes = Vec::with_capacity(header.len() + rewritten_payload.len());
    bytes.extend_from_slice(header);
    bytes.extend_from_slice(&rewritten_payload);
    Canonicalized {
        bytes,
        terminate: false,
    }
}

/// `ParameterStatus`: two NUL-terminated strings. When the first is
/// `server_version`, the second is replaced with `'X'` repeated to its
/// original length so server-version drift doesn't perturb captures.
fn canonicalize_parameter_status(payload: &[u8]) -> Vec<u8> {
    let (name, next) = read_cstr(payload, 0);
    let (value, _) = read_cstr(payload, next);

    let mut out = Vec::with_capacity(payload.len());
    out.extend_from_slice(name);
    out.push(0);
    if name == b"server_version" {
        out.extend(std::iter::repeat(b'X').take(value.len()));
    } else {
        out.extend_from_slice(value);
    }
    out.push(0);
    out
}

/// `RowDescription`: 2-byte field count, then per field a NUL-terminated
/// name followed by 18 bytes (table OID in the first 4). The OID is
/// replaced with a fixed constant so environment-specific catalogs don't
/// perturb captures.
fn canonicalize_row_description(payload: &[u8]) -> Vec<u8> {
    let field_count = u16::from_be_bytes([payload[0], payload[1]]);
    let mut out = Vec::with_capacity(payload.len());
    out.extend_from_slice(&payload[0..2]);

    let mut i = 2usize;
    for _ in 0..field_count {
        let (name, next) = read_cstr(payload, i);
        out.extend_from_slice(name);
        out.push(0);
        out.extend_from_slice(&FIXED_TABLE_OID);
        out.extend_from_slice(&payload[next + 4..next + 18]);
        i = next + 18;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn startup_msg(pairs: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0, 3, 0, 0]); // protocol version 3.0
        for (k, v) in pairs {
            body.extend_from_slice(k.as_bytes());
            body.push(0);
            body.extend_from_slice(v.as_bytes());
            body.push(0);
        }
        body.push(0);
        let len = (body.len() + 4) as u32;
        let mut msg = len.to_be_bytes().to_vec();
        msg.extend_from_slice(&body);
        msg
    }

    #[test]
    fn startup_reorders_pairs_lexicographically() {
        let a = startup_msg(&[("user", "alice"), ("database", "app"), ("application_name", "x")]);
        let b = startup_msg(&[("application_name", "x"), ("database", "app"), ("user", "alice")]);
        assert_eq!(canonicalize_startup(&a), canonicalize_startup(&b));
    }

    #[test]
    fn startup_preserves_version_prefix() {
        let msg = startup_msg(&[("user", "bob")]);
        let canon = canonicalize_startup(&msg);
        assert_eq!(&canon[0..8], &msg[0..8]);
    }

    fn message(tag: u8, payload: &[u8]) -> Vec<u8> {
        let len = (payload.len() + 4) as u32;
        let mut msg = vec![tag];
        msg.extend_from_slice(&len.to_be_bytes());
        msg.extend_from_slice(payload);
        msg
    }

    #[test]
    fn terminate_emits_header_only() {
        let msg = message(b'X', b"");
        let result = canonicalize_message(&msg);
        assert!(result.terminate);
        assert_eq!(result.bytes, msg);
    }

    #[test]
    fn backend_key_data_is_fixed() {
        let msg = message(b'K', &[1, 2, 3, 4, 5, 6, 7, 8]);
        let result = canonicalize_message(&msg);
        assert_eq!(&result.bytes[5..9], &FIXED_PROCESS_ID);
        assert_eq!(&result.bytes[9..13], &FIXED_SECRET_KEY);
    }

    #[test]
    fn server_version_is_padded_with_x() {
        let mut payload = b"server_version\0".to_vec();
        payload.extend_from_slice(b"15.4\0");
        let msg = message(b'S', &payload);
        let result = canonicalize_message(&msg);
        assert_eq!(&result.bytes[5 + 15..5 + 19], b"XXXX");
    }

    #[test]
    fn unrelated_parameter_status_is_untouched() {
        let mut payload = b"client_encoding\0".to_vec();
        payload.extend_from_slice(b"UTF8\0");
        let msg = message(b'S', &payload);
        let result = canonicalize_message(&msg);
        assert_eq!(&result.bytes[5..], payload.as_slice());
    }

    #[test]
    fn row_description_fixes_table_oid() {
        let mut payload = vec![0, 1]; // one field
        payload.extend_from_slice(b"id\0");
        payload.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]); // table oid
        payload.extend_from_slice(&[0u8; 14]); // remaining fixed-width bytes
        let msg = message(b'T', &payload);
        let result = canonicalize_message(&msg);
        let field_start = 5 + 2 + 3; // header + count + "id\0"
        assert_eq!(
            &result.bytes[field_start..field_start + 4],
            &FIXED_TABLE_OID
        );
    }

    #[test]
    fn default_tag_forwards_payload_verbatim() {
        let msg = message(b'D', b"hello");
        let result = canonicalize_message(&msg);
        assert_eq!(result.bytes, msg);
    }
}
