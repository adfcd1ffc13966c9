//! HTTP/1.1 framing (§4.F): reads one complete request or response —
//! headers plus a `Content-Length` body — off a raw byte stream.
//!
//! TODO: chunked transfer-encoding bodies are not supported; every captured
//! scenario in this toolkit's test fixtures uses `Content-Length`.

use std::io::{self, ErrorKind};

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const MAX_HEADERS: usize = 64;

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn content_length(head: &[u8], is_request: bool) -> io::Result<usize> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let header_list: &[httparse::Header] = if is_request {
        let mut req = httparse::Request::new(&mut headers);
        req.parse(head)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        req.headers
    } else {
        let mut resp = httparse::Response::new(&mut headers);
        resp.parse(head)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
        resp.headers
    };
    for header in header_list {
        if header.name.eq_ignore_ascii_case("content-length") {
            let text = std::str::from_utf8(header.value)
                .map_err(|_| io::Error::new(ErrorKind::InvalidData, "non-utf8 content-length"))?;
            return text
                .trim()
                .parse::<usize>()
                .map_err(|_| io::Error::new(ErrorKind::InvalidData, "bad content-length"));
        }
    }
    Ok(0)
}

async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    is_request: bool,
) -> io::Result<Option<Vec<u8>>> {
    let mut buf = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(io::Error::new(ErrorKind::UnexpectedEof, "connection closed mid-frame"));
        }
        buf.put_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
    };

    let body_len = content_length(&buf[..header_end], is_request)?;
    let total = header_end + body_len;
    while buf.len() < total {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(ErrorKind::UnexpectedEof, "connection closed mid-frame"));
        }
        buf.put_slice(&chunk[..n]);
    }
    buf.truncate(total);
    Ok(Some(buf.to_vec()))
}

pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    read_message(reader, true).await
}

pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    read_message(reader, false).await
}
