//! A protocol-agnostic recording endpoint: dials the real backend and tees
//! each direction into the capture store verbatim. Used by protocols (RESP)
//! whose capture bytes need no canonicalization.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::errors::IoError;
use crate::net::Endpoint;
use crate::store::CaptureStore;

struct Inner {
    reader: Mutex<tokio::net::tcp::OwnedReadHalf>,
    writer: Mutex<tokio::net::tcp::OwnedWriteHalf>,
    store: Arc<CaptureStore>,
}

#[derive(Clone)]
pub struct TeeRecorder(Arc<Inner>);

impl TeeRecorder {
    pub async fn dial(remote_addr: &str, store: Arc<CaptureStore>) -> Result<Self, IoError> {
        let conn = TcpStream::connect(remote_addr)
            .await
            .map_err(|e| IoError::Dial(remote_addr.to_string(), e))?;
        let (reader, writer) = conn.into_split();
        Ok(Self(Arc::new(Inner {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            store,
        })))
    }
}

impl Endpoint for TeeRecorder {
    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.0.reader.lock().await.read(buf).await?;
        if n > 0 {
            if let Err(e) = self.0.store.write_response(&buf[..n]).await {
                tracing::warn!("failed to tee response bytes: {e}");
            }
        }
        Ok(n)
    }

    async fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
        if let Err(e) = self.0.store.write_request(buf).await {
            tracing::warn!("failed to tee request bytes: {e}");
        }
        self.0.writer.lock().await.write_all(buf).await?;
        Ok(buf.len())
    }
}
