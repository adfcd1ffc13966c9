//! HTTP replay engine: serves recorded responses to live client traffic by
//! request digest, without dialing the real dependency (§8 scenarios 5, 6).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::IoError;
use crate::http::dump;
use crate::http::framer;
use crate::net::accept::bind_reuseport;
use crate::store::{load_all, FilenameFn};

struct Responses(HashMap<[u8; 32], VecDeque<Vec<u8>>>);

pub async fn serve(
    port: u16,
    req_name: FilenameFn,
    resp_name: FilenameFn,
    cancel: CancellationToken,
    ready: oneshot::Sender<()>,
) -> Result<(), IoError> {
    let captures = load_all(&req_name, &resp_name)
        .await
        .map_err(IoError::Generic)?;

    let mut map: HashMap<[u8; 32], VecDeque<Vec<u8>>> = HashMap::new();
    for capture in captures {
        let digest: [u8; 32] = Sha256::digest(&capture.request).into();
        map.entry(digest)
            .or_default()
            .push_back(capture.response.unwrap_or_default());
    }
    let responses = Arc::new(tokio::sync::Mutex::new(Responses(map)));

    let listener = bind_reuseport(port)?;
    let _ = ready.send(());
    info!("HTTP replayer listening on port {port}");

    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()) => {
                match accepted {
                    Ok(Ok((socket, _addr))) => {
                        let responses = responses.clone();
                        let cancel = cancel.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(socket, responses, &cancel).await {
                                tracing::warn!("HTTP replayer connection error: {e}");
                            }
                        });
                    }
                    Ok(Err(e)) => error!("accept error: {e}"),
                    Err(_elapsed) => {}
                }
            }
        }
    }
    while connections.join_next().await.is_some() {}
    Ok(())
}

async fn handle_connection(
    mut socket: TcpStream,
    responses: Arc<tokio::sync::Mutex<Responses>>,
    cancel: &CancellationToken,
) -> std::io::Result<()> {
    let (mut rd, mut wr) = socket.split();
    let Some(raw_request) = framer::read_request(&mut rd).await? else {
        return Ok(());
    };

    let parsed = dump::parse_request(&raw_request)?;
    if parsed.path == "/stop" {
        wr.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await?;
        cancel.cancel();
        return Ok(());
    }

    let digest: [u8; 32] = Sha256::digest(&raw_request).into();
    let served = {
        let mut guard = responses.lock().await;
        guard.0.get_mut(&digest).and_then(VecDeque::pop_front)
    };

    match served {
        Some(bytes) => wr.write_all(&bytes).await?,
        None => {
            tracing::info!(
                path = %parsed.path,
                "HTTP replay miss"
            );
        }
    }
    Ok(())
}
