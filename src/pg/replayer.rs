//! PostgreSQL replay engine (§4.E "Replay engine"): frames and canonicalizes
//! the live client stream the same way the recorder did, then serves stored
//! responses FIFO per digest.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::net::Endpoint;
use crate::pg::canon;
use crate::pg::framer::PgFramer;
use crate::store::{default_request_name, default_response_name, load_all};

struct Inner {
    framer: Mutex<PgFramer>,
    startup_done: Mutex<bool>,
    output: Mutex<Vec<u8>>,
    responses: Mutex<HashMap<[u8; 32], VecDeque<Vec<u8>>>>,
}

#[derive(Clone)]
pub struct PgReplayer(Arc<Inner>);

impl PgReplayer {
    /// Loads every capture under `capture_dir`. Stored requests are already
    /// canonical (the recorder wrote them that way), so no re-canonicalization
    /// is needed to build the digest index.
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
            framer: Mutex::new(PgFramer::new(true)),
            startup_done: Mutex::new(false),
            output: Mutex::new(Vec::new()),
            responses: Mutex::new(responses),
        })))
    }

    async fn handle_frame(&self, raw_frame: Vec<u8>) {
        let mut startup_done = self.0.startup_done.lock().await;
        let canonical = if *startup_done {
            canon::canonicalize_message(&raw_frame).bytes
        } else {
            *startup_done = true;
            canon::canonicalize_startup(&raw_frame)
        };
        drop(startup_done);

        let digest: [u8; 32] = Sha256::digest(&canonical).into();
        let mut responses = self.0.responses.lock().await;
        let served = responses.get_mut(&digest).and_then(VecDeque::pop_front);
        match served {
            Some(bytes) => {
                let mut output = self.0.output.lock().await;
                output.extend_from_slice(&bytes);
            }
            None => {
                tracing::info!(digest = %hex(&digest), "PostgreSQL replay miss");
            }
        }
    }
}

impl Endpoint for PgReplayer {
    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
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
                match framer.push_byte(b) {
                    Ok(Some(frame)) => frames.push(frame),
                    Ok(None) => {}
                    Err(e) => {
                        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e));
                    }
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

    fn startup_msg(pairs: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&[0, 3, 0, 0]);
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

    async fn store_capture(dir: &std::path::Path, index: u64, req: &[u8], resp: &[u8]) {
        tokio::fs::write(dir.join(format!("{index}.request")), req)
            .await
            .unwrap();
        tokio::fs::write(dir.join(format!("{index}.response")), resp)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn startup_with_different_pair_order_still_matches() {
        let dir = tempfile::tempdir().unwrap();
        let recorded = startup_msg(&[("user", "alice"), ("database", "app")]);
        let canonical_recorded = canon::canonicalize_startup(&recorded);
        store_capture(dir.path(), 0, &canonical_recorded, b"ready").await;

        let replayer = PgReplayer::load(dir.path()).await.unwrap();
        let live = startup_msg(&[("database", "app"), ("user", "alice")]);
        replayer.write(&live).await.unwrap();

        let mut buf = [0u8; 64];
        let n = replayer.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ready");
    }

    #[tokio::test]
    async fn miss_emits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let replayer = PgReplayer::load(dir.path()).await.unwrap();
        let live = startup_msg(&[("user", "nobody")]);
        replayer.write(&live).await.unwrap();

        let mut buf = [0u8; 64];
        let n = replayer.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
