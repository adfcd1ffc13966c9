//! HTTP reverse-proxy recorder (§4.F "Recorder engine"): serves real client
//! traffic by forwarding each request to `remote_addr` via `reqwest`,
//! persisting the canonical request/response dump, and forwarding the real
//! response back to the client untouched.

use std::str::FromStr;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::errors::IoError;
use crate::http::dump;
use crate::http::framer;
use crate::net::accept::bind_reuseport;
use crate::store::CaptureStore;

/// Runs the reverse-proxy recorder until `cancel` fires or a client hits
/// `GET /stop` (§4.F "Control endpoint").
pub async fn serve(
    port: u16,
    remote_addr: String,
    store: Arc<CaptureStore>,
    cancel: CancellationToken,
    ready: oneshot::Sender<()>,
) -> Result<(), IoError> {
    let listener = bind_reuseport(port)?;
    let _ = ready.send(());
    info!("HTTP recorder listening on port {port}, forwarding to {remote_addr}");

    let client = reqwest::Client::new();
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = tokio::time::timeout(std::time::Duration::from_millis(100), listener.accept()) => {
                match accepted {
                    Ok(Ok((socket, _addr))) => {
                        let remote = remote_addr.clone();
                        let store = store.clone();
                        let client = client.clone();
                        let cancel = cancel.clone();
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(socket, &remote, store, &client, &cancel).await {
                                warn!("HTTP recorder connection error: {e}");
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
    store.close().await?;
    Ok(())
}

async fn handle_connection(
    mut socket: TcpStream,
    remote_addr: &str,
    store: Arc<CaptureStore>,
    client: &reqwest::Client,
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

    if let Err(e) = store.write_request(&raw_request).await {
        warn!("failed to record HTTP request: {e}");
    }

    let url = format!("http://{remote_addr}{}", parsed.path);
    let method = reqwest::Method::from_str(&parsed.method).unwrap_or(reqwest::Method::GET);
    let mut builder = client.request(method, &url).body(parsed.body.clone());
    for (name, value) in &parsed.headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        builder = builder.header(name, value);
    }

    match builder.send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            let reason = resp.status().canonical_reason().unwrap_or("");
            let headers: Vec<(String, String)> = resp
                .headers()
                .iter()
                .map(|(n, v)| (n.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect();
            let body = resp.bytes().await.unwrap_or_default().to_vec();

            let canonical = dump::dump_response_without_date(status, reason, &headers, &body);
            if let Err(e) = store.write_response(&canonical).await {
                warn!("failed to record HTTP response: {e}");
            }

            let raw_response = dump::dump_response(status, reason, &headers, &body);
            wr.write_all(&raw_response).await?;
        }
        Err(e) => {
            let message = e.to_string();
            if let Err(write_err) = store.write_error(message.as_bytes()).await {
                warn!("failed to record HTTP error: {write_err}");
            }
            let body = message.into_bytes();
            let raw_response = dump::dump_response(
                502,
                "Bad Gateway",
                &[("Content-Length".to_string(), body.len().to_string())],
                &body,
            );
            wr.write_all(&raw_response).await?;
        }
    }
    Ok(())
}
