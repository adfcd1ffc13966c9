//! HTTP/1.1 dump form (§4.F "Canonicalization", §6): parses and
//! reconstructs the wire form of a request or response, with the `Date`
//! header stripped from responses before they are persisted.

use std::io::{self, ErrorKind};

const MAX_HEADERS: usize = 64;

pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub struct ParsedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

pub fn parse_request(raw: &[u8]) -> io::Result<ParsedRequest> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut raw_headers);
    let status = req
        .parse(raw)
        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
    let header_end = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => {
            return Err(io::Error::new(ErrorKind::InvalidData, "partial request head"))
        }
    };
    Ok(ParsedRequest {
        method: req.method.unwrap_or("GET").to_string(),
        path: req.path.unwrap_or("/").to_string(),
        headers: owned_headers(req.headers),
        body: raw[header_end..].to_vec(),
    })
}

pub fn parse_response(raw: &[u8]) -> io::Result<ParsedResponse> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut resp = httparse::Response::new(&mut raw_headers);
    let status = resp
        .parse(raw)
        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
    let header_end = match status {
        httparse::Status::Complete(n) => n,
        httparse::Status::Partial => {
            return Err(io::Error::new(ErrorKind::InvalidData, "partial response head"))
        }
    };
    Ok(ParsedResponse {
        status: resp.code.unwrap_or(0),
        headers: owned_headers(resp.headers),
        body: raw[header_end..].to_vec(),
    })
}

fn owned_headers(headers: &[httparse::Header]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|h| !h.name.is_empty())
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect()
}

/// Rebuilds a request from parts into its wire form, for building a raw
/// dump to persist (used both for requests as-received and for outbound
/// reverse-proxy calls).
pub fn dump_request(method: &str, path: &str, headers: &[(String, String)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("{method} {path} HTTP/1.1\r\n").into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

/// Rebuilds a response into its wire form, keeping every header as given.
pub fn dump_response(status: u16, reason: &str, headers: &[(String, String)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status} {reason}\r\n").into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

/// Rebuilds a response into its wire form, dropping the `Date` header so
/// recorded bytes don't drift run to run (§4.F "Canonicalization").
pub fn dump_response_without_date(status: u16, reason: &str, headers: &[(String, String)], body: &[u8]) -> Vec<u8> {
    let filtered: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("date"))
        .cloned()
        .collect();
    dump_response(status, reason, &filtered, body)
}

/// Canonicalizes an already-dumped response's raw bytes by stripping any
/// `Date` header line, for comparing or re-storing existing capture blobs.
pub fn strip_date_header(raw: &[u8]) -> io::Result<Vec<u8>> {
    let parsed = parse_response(raw)?;
    let reason = reason_phrase(parsed.status);
    Ok(dump_response_without_date(
        parsed.status,
        reason,
        &parsed.headers,
        &parsed.body,
    ))
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "",
    }
}
