//! Passthrough / tee (§4.C): a diagnostic bidirectional forwarder used to
//! harvest fresh raw captures while teaching the engine a new protocol. Not
//! on the production record/replay path.

use std::sync::Arc;

use tokio::io::{split, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Accepts clients on `port`, dials `remote_addr` per connection, and copies
/// both directions while fanning a copy of each direction to `tap` (a
/// caller-supplied sink, typically a raw-bytes dump file).
pub async fn serve<W>(
    port: u16,
    remote_addr: &str,
    tap: W,
    cancel: CancellationToken,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    let tap = Arc::new(Mutex::new(tap));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                let (client, _addr) = accepted?;
                let backend = TcpStream::connect(remote_addr).await?;
                let tap = tap.clone();
                tokio::spawn(async move {
                    if let Err(e) = forward_with_tap(client, backend, tap).await {
                        error!("tee forwarding error: {e}");
                    }
                });
            }
        }
    }
}

async fn forward_with_tap<W: AsyncWrite + Unpin + Send>(
    client: TcpStream,
    backend: TcpStream,
    tap: Arc<Mutex<W>>,
) -> std::io::Result<()> {
    let (mut client_rd, mut client_wr) = split(client);
    let (mut backend_rd, mut backend_wr) = split(backend);

    let ingress_tap = tap.clone();
    let egress_tap = tap;

    let client_to_backend = async move {
        let mut buf = [0u8; 4096];
        loop {
            let n = client_rd.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            ingress_tap.lock().await.write_all(&buf[..n]).await?;
            backend_wr.write_all(&buf[..n]).await?;
        }
        backend_wr.shutdown().await
    };
    let backend_to_client = async move {
        let mut buf = [0u8; 4096];
        loop {
            let n = backend_rd.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            egress_tap.lock().await.write_all(&buf[..n]).await?;
            client_wr.write_all(&buf[..n]).await?;
        }
        client_wr.shutdown().await
    };

    tokio::select! {
        r = client_to_backend => { r?; }
        r = backend_to_client => { r?; }
    }
    Ok(())
}
