//! TCP accept loop (§4.B). Binds with `SO_REUSEPORT`, accepts on a bounded
//! deadline so shutdown is observed promptly, and spawns a byte pump per
//! connection against a caller-supplied endpoint factory.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::IoError;
use crate::net::endpoint::Endpoint;
use crate::net::pump::pump;

const ACCEPT_DEADLINE: Duration = Duration::from_millis(100);

/// Binds `tcp/:port` with `SO_REUSEPORT` so rapidly-restarting test suites
/// don't pile up in `TIME_WAIT`.
pub(crate) fn bind_reuseport(port: u16) -> Result<TcpListener, IoError> {
    let addr: SocketAddr = format!("0.0.0.0:{port}")
        .parse()
        .expect("well-formed loopback address");
    let socket =
        Socket::new(Domain::IPV4, Type::STREAM, None).map_err(|e| IoError::Bind(port, e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| IoError::Bind(port, e))?;
    socket
        .set_reuse_port(true)
        .map_err(|e| IoError::Bind(port, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| IoError::Bind(port, e))?;
    socket
        .bind(&addr.into())
        .map_err(|e| IoError::Bind(port, e))?;
    socket.listen(1024).map_err(|e| IoError::Bind(port, e))?;
    TcpListener::from_std(socket.into()).map_err(|e| IoError::Bind(port, e))
}

/// Runs the accept loop until `cancel` is triggered, handing each accepted
/// connection a fresh endpoint built by `new_endpoint`. `ready` fires once
/// the socket is bound so test harnesses need not poll.
pub async fn serve<F, Fut, E>(
    port: u16,
    cancel: CancellationToken,
    ready: oneshot::Sender<()>,
    new_endpoint: F,
) -> Result<(), IoError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::io::Result<E>>,
    E: Endpoint,
{
    let listener = bind_reuseport(port)?;
    let _ = ready.send(());
    info!("listening on port {port}");

    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = tokio::time::timeout(ACCEPT_DEADLINE, listener.accept()) => {
                match accepted {
                    Ok(Ok((socket, addr))) => {
                        match new_endpoint().await {
                            Ok(endpoint) => {
                                connections.spawn(async move {
                                    pump(socket, endpoint).await;
                                });
                            }
                            Err(e) => {
                                error!("failed to construct endpoint for {addr}: {e}");
                            }
                        }
                    }
                    Ok(Err(e)) => error!("accept error: {e}"),
                    Err(_elapsed) => {} // deadline hit, re-check cancellation
                }
            }
        }
    }

    while connections.join_next().await.is_some() {}
    Ok(())
}
