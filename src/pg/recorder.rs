//! PostgreSQL record-mode endpoint (§4.E "Recorder engine"): forwards raw
//! bytes to the real backend in both directions while teeing canonicalized
//! messages into the capture store.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::errors::IoError;
use crate::net::Endpoint;
use crate::pg::canon;
use crate::pg::framer::PgFramer;
use crate::store::CaptureStore;

struct Inner {
    reader: Mutex<tokio::net::tcp::OwnedReadHalf>,
    writer: Mutex<tokio::net::tcp::OwnedWriteHalf>,
    store: Arc<CaptureStore>,
    client_framer: Mutex<PgFramer>,
    client_startup_done: Mutex<bool>,
    server_framer: Mutex<PgFramer>,
}

#[derive(Clone)]
pub struct PgRecorder(Arc<Inner>);

impl PgRecorder {
    pub async fn dial(remote_addr: &str, store: Arc<CaptureStore>) -> Result<Self, IoError> {
        let conn = TcpStream::connect(remote_addr)
            .await
            .map_err(|e| IoError::Dial(remote_addr.to_string(), e))?;
        let (reader, writer) = conn.into_split();
        Ok(Self(Arc::new(Inner {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            store,
            client_framer: Mutex::new(PgFramer::new(true)),
            client_startup_done: Mutex::new(false),
            server_framer: Mutex::new(PgFramer::new(false)),
        })))
    }

    async fn tee_client_frames(&self, buf: &[u8]) {
        let mut frames = Vec::new();
        {
            let mut framer = self.0.client_framer.lock().await;
            for &b in buf {
                match framer.push_byte(b) {
                    Ok(Some(frame)) => frames.push(frame),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("PostgreSQL client framing error: {e}");
                        return;
                    }
                }
            }
        }
        for frame in frames {
            let mut startup_done = self.0.client_startup_done.lock().await;
            let canonical = if *startup_done {
                canon::canonicalize_message(&frame).bytes
            } else {
                *startup_done = true;
                canon::canonicalize_startup(&frame)
            };
            if let Err(e) = self.0.store.write_request(&canonical).await {
                tracing::warn!("failed to tee PostgreSQL request: {e}");
            }
        }
    }

    async fn tee_server_frames(&self, buf: &[u8]) {
        let mut frames = Vec::new();
        {
            let mut framer = self.0.server_framer.lock().await;
            for &b in buf {
                match framer.push_byte(b) {
                    Ok(Some(frame)) => frames.push(frame),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!("PostgreSQL server framing error: {e}");
                        return;
                    }
                }
            }
        }
        for frame in frames {
            let canonical = canon::canonicalize_message(&frame).bytes;
            if let Err(e) = self.0.store.write_response(&canonical).await {
                tracing::warn!("failed to tee PostgreSQL response: {e}");
            }
        }
    }
}

impl Endpoint for PgRecorder {
    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.0.reader.lock().await.read(buf).await?;
        if n > 0 {
            self.tee_server_frames(&buf[..n]).await;
        }
        Ok(n)
    }

    async fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.tee_client_frames(buf).await;
        self.0.writer.lock().await.write_all(buf).await?;
        Ok(buf.len())
    }
}
