//! RESP request framing (§4.D): split a byte stream into `*<N>\r\n` + `2N`
//! line request frames.

use crate::errors::FramingError;

/// Accumulates `\n`-delimited lines and reports a complete request frame
/// once the expected line count reaches zero.
#[derive(Default)]
pub struct RespFramer {
    line_buf: Vec<u8>,
    request_buf: Vec<u8>,
    remaining_lines: Option<u64>,
}

impl RespFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte; returns `Some(frame)` with the complete, owned
    /// request bytes (including all framing) once a request is done.
    pub fn push_byte(&mut self, b: u8) -> Result<Option<Vec<u8>>, FramingError> {
        self.line_buf.push(b);
        if b != b'\n' {
            return Ok(None);
        }
        let line = std::mem::take(&mut self.line_buf);
        self.request_buf.extend_from_slice(&line);

        match self.remaining_lines {
            None => {
                let count = parse_array_header(&line)?;
                if count == 0 {
                    let frame = std::mem::take(&mut self.request_buf);
                    return Ok(Some(frame));
                }
                self.remaining_lines = Some(count * 2);
                Ok(None)
            }
            Some(remaining) => {
                let remaining = remaining - 1;
                if remaining == 0 {
                    self.remaining_lines = None;
                    let frame = std::mem::take(&mut self.request_buf);
                    Ok(Some(frame))
                } else {
                    self.remaining_lines = Some(remaining);
                    Ok(None)
                }
            }
        }
    }
}

/// Parses `*<N>\r\n` (or `*<N>\n`) into `N`.
fn parse_array_header(line: &[u8]) -> Result<u64, FramingError> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim_end_matches(['\r', '\n']);
    let digits = trimmed
        .strip_prefix('*')
        .ok_or_else(|| FramingError::BadRespHeader(text.to_string()))?;
    digits
        .parse::<u64>()
        .map_err(|_| FramingError::BadRespHeader(text.to_string()))
}
