//! RESP replay matcher (§4.D): frames requests, hashes them, and serves
//! stored responses FIFO per digest; emits the Null Bulk String on a miss.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::net::Endpoint;
use crate::resp::framer::RespFramer;
use crate::store::{default_request_name, default_response_name, load_all};

/// Emitted in place of a recorded response when a request's digest is
/// unknown or its response queue is exhausted (§6).
pub const NULL_BULK_STRING: &[u8] = b"$-1\r\n";

struct Inner {
    framer: Mutex<RespFramer>,
    output: Mutex<Vec<u8>>,
    responses: Mutex<HashMap<[u8; 32], VecDeque<Vec<u8>>>>,
}

#[derive(Clone)]
pub struct RespMatcher(Arc<Inner>);

impl RespMatcher {
    /// Loads every `(request, response)` pair under `capture_dir` and
    /// indexes responses by the SHA-256 of the raw (RESP needs no
    /// canonicalization) request bytes.
    pub async fn load(capture_dir: &std::path::Path) -> std::io::Result<Self> {
        let req_name = default_request_name(capture_dir);
        let resp_name = default_response_name(capture_dir);
        let captures = load_all(&req_name, &resp_name).await?;

        let mut responses: HashMap<[u8; 32], VecDeque<Vec<u8>>> = HashMap::new();
        for capture in captures {
            let digest: [u8; 32] = Sha256::digest(&capture.request).into();
            responses
                .entry(digest)
                .or_default()
                .push_back(capture.response.unwrap_or_default());
        }

        Ok(Self(Arc::new(Inner {
            framer: Mutex::new(RespFramer::new()),
            output: Mutex::new(Vec::new()),
            responses: Mutex::new(responses),
        })))
    }

    async fn handle_frame(&self, request: Vec<u8>) {
        let digest: [u8; 32] = Sha256::digest(&request).into();
        let mut responses = self.0.responses.lock().await;
        let served = responses
            .get_mut(&digest)
            .and_then(VecDeque::pop_front);
        let mut output = self.0.output.lock().await;
        match served {
            Some(bytes) => output.extend_from_slice(&bytes),
            None => {
                tracing::info!(
                    digest = %hex(&digest),
                    request = %String::from_utf8_lossy(&request),
                    "RESP replay miss"
                );
                output.extend_from_slice(NULL_BULK_STRING);
            }
        }
    }
}

impl Endpoint for RespMatcher {
    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        // Imitate a realistic latency profile and avoid a hot spin (§4.D, §9).
        tokio::time::sleep(Duration::from_millis(1)).await;
        let mut output = self.0.output.lock().await;
        let n = output.len().min(buf.len());
        buf[..n].copy_from_slice(&output[..n]);
        output.drain(..n);
        Ok(n)
    }

    async fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        let mut frames = Vec::new();
        {
            let mut framer = self.0.framer.lock().await;
            for &b in buf {
                if let Some(frame) = framer
                    .push_byte(b)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
                {
                    frames.push(frame);
                }
            }
        }
        for frame in frames {
            self.handle_frame(frame).await;
        }
        Ok(buf.len())
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_capture(dir: &std::path::Path, index: u64, req: &[u8], resp: &[u8]) {
        tokio::fs::write(dir.join(format!("{index}.request")), req)
            .await
            .unwrap();
        tokio::fs::write(dir.join(format!("{index}.response")), resp)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn replays_recorded_response_for_matching_request() {
        let dir = tempfile::tempdir().unwrap();
        store_capture(dir.path(), 0, b"*1\r\n$4\r\nPING\r\n", b"+PONG\r\n").await;

        let matcher = RespMatcher::load(dir.path()).await.unwrap();
        matcher.write(b"*1\r\n$4\r\nPING\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = matcher.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+PONG\r\n");
    }

    #[tokio::test]
    async fn unknown_request_yields_null_bulk_string() {
        let dir = tempfile::tempdir().unwrap();
        let matcher = RespMatcher::load(dir.path()).await.unwrap();
        matcher.write(b"*1\r\n$3\r\nDEL\r\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = matcher.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], NULL_BULK_STRING);
    }

    #[tokio::test]
    async fn fifo_order_then_miss_on_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        store_capture(dir.path(), 0, b"*1\r\n$4\r\nPING\r\n", b"+one\r\n").await;
        store_capture(dir.path(), 1, b"*1\r\n$4\r\nPING\r\n", b"+two\r\n").await;

        let matcher = RespMatcher::load(dir.path()).await.unwrap();
        let mut buf = [0u8; 64];

        matcher.write(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let n = matcher.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+one\r\n");

        matcher.write(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let n = matcher.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+two\r\n");

        matcher.write(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let n = matcher.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], NULL_BULK_STRING);
    }
}
