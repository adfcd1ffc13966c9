//! PostgreSQL wire framing (§4.E): slices a byte stream into whole messages.
//! The client→server stream opens with one untagged startup message, then
//! every message on either side is `tag:1 | length:4-BE | payload`.

use crate::errors::FramingError;

#[derive(Default)]
pub struct PgFramer {
    buf: Vec<u8>,
    expected_len: Option<usize>,
    awaiting_startup: bool,
    terminated: bool,
}

impl PgFramer {
    /// `awaiting_startup` is true for the client→server framer (its first
    /// message has no tag byte); false for server→client, which is always
    /// normal-phase.
    pub fn new(awaiting_startup: bool) -> Self {
        Self {
            awaiting_startup,
            ..Self::default()
        }
    }

    /// Feeds one raw wire byte; returns the complete raw message (header +
    /// payload, uncanonicalized) once its length is fully buffered. Returns
    /// `None` forever once a `Terminate` message has been framed.
    pub fn push_byte(&mut self, b: u8) -> Result<Option<Vec<u8>>, FramingError> {
        if self.terminated {
            return Ok(None);
        }
        self.buf.push(b);

        if self.expected_len.is_none() {
            let header_len = if self.awaiting_startup { 4 } else { 5 };
            if self.buf.len() < header_len {
                return Ok(None);
            }
            let len_bytes = if self.awaiting_startup {
                [self.buf[0], self.buf[1], self.buf[2], self.buf[3]]
            } else {
                [self.buf[1], self.buf[2], self.buf[3], self.buf[4]]
            };
            let declared = u32::from_be_bytes(len_bytes) as usize;
            if declared < 4 {
                return Err(FramingError::TruncatedLength);
            }
            let total = if self.awaiting_startup {
                declared
            } else {
                1 + declared
            };
            self.expected_len = Some(total);
        }

        let expected = self.expected_len.expect("set above");
        if self.buf.len() < expected {
            return Ok(None);
        }

        let frame = std::mem::take(&mut self.buf);
        self.expected_len = None;
        if self.awaiting_startup {
            self.awaiting_startup = false;
        } else if frame[0] == b'X' {
            self.terminated = true;
        }
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(framer: &mut PgFramer, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        for &b in bytes {
            if let Some(frame) = framer.push_byte(b).unwrap() {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn frames_one_startup_message() {
        let mut framer = PgFramer::new(true);
        let mut msg = 8u32.to_be_bytes().to_vec();
        msg.extend_from_slice(&[0, 3, 0, 0]);
        let frames = feed(&mut framer, &msg);
        assert_eq!(frames, vec![msg]);
    }

    #[test]
    fn startup_then_normal_messages() {
        let mut framer = PgFramer::new(true);
        let mut startup = 8u32.to_be_bytes().to_vec();
        startup.extend_from_slice(&[0, 3, 0, 0]);

        let mut normal = vec![b'Q'];
        normal.extend_from_slice(&9u32.to_be_bytes());
        normal.extend_from_slice(b"SELECT 1");

        let mut all = startup.clone();
        all.extend_from_slice(&normal);
        let frames = feed(&mut framer, &all);
        assert_eq!(frames, vec![startup, normal]);
    }

    #[test]
    fn terminate_stops_further_framing() {
        let mut framer = PgFramer::new(false);
        let mut terminate = vec![b'X'];
        terminate.extend_from_slice(&4u32.to_be_bytes());

        let mut trailing = vec![b'Q'];
        trailing.extend_from_slice(&9u32.to_be_bytes());
        trailing.extend_from_slice(b"SELECT 1");

        let mut all = terminate.clone();
        all.extend_from_slice(&trailing);
        let frames = feed(&mut framer, &all);
        assert_eq!(frames, vec![terminate]);
    }

    #[test]
    fn partial_message_yields_no_frame() {
        let mut framer = PgFramer::new(false);
        let partial = vec![b'Q', 0, 0, 0, 9, b'S'];
        assert!(feed(&mut framer, &partial).is_empty());
    }
}
