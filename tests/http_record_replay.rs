//! End-to-end HTTP record/replay scenarios, driven through the real mode
//! orchestrator (not the bare `http::recorder`/`http::replayer` functions),
//! so the production request/response/error naming contract is what gets
//! exercised: a dependency going unreachable between record and replay, and
//! a record session against an unreachable dependency still producing a
//! capture the verification runner can diff.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use replayd::app::config::{Config, Mode, Protocol};
use replayd::http::{error_name, request_name, response_name, runner};
use replayd::orchestrator;

fn http_config(port: u16, mode: Mode, remote: Option<&str>, capture_dir: &std::path::Path) -> Config {
    Config {
        port,
        protocol: Protocol::Http,
        mode,
        remote_addr: remote.map(|s| s.parse().unwrap()),
        capture_dir: capture_dir.to_path_buf(),
        update_on_diff: false,
        sequential_replay: false,
    }
}

async fn read_http_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || n == 0 {
            break;
        }
    }
    buf
}

/// A stand-in dependency: replies to `GET /foo/25` with a fixed body, with a
/// `Date` header present so the test can confirm the recorder strips it.
async fn spawn_fake_dependency() -> (u16, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = server_cancel.cancelled() => break,
                accepted = listener.accept() => {
                    let (mut socket, _) = accepted.unwrap();
                    tokio::spawn(async move {
                        let _ = read_http_request(&mut socket).await;
                        let body = b"Hello, \"/foo/25\"";
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nDate: Mon, 01 Jan 2024 00:00:00 GMT\r\nContent-Length: {}\r\n\r\n",
                            body.len()
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.write_all(body).await;
                    });
                }
            }
        }
    });
    (port, cancel)
}

async fn send_request(port: u16, raw: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    })
    .await
    .unwrap();
    buf
}

#[tokio::test]
async fn replay_survives_a_dependency_that_later_goes_unreachable() {
    let (dep_port, dep_cancel) = spawn_fake_dependency().await;
    let capture_dir = tempfile::tempdir().unwrap();

    let record_cancel = CancellationToken::new();
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let record_port = portpicker::pick_unused_port().unwrap();

    let record_config = http_config(
        record_port,
        Mode::Record,
        Some(&format!("127.0.0.1:{dep_port}")),
        capture_dir.path(),
    );
    let recorder_task = tokio::spawn(orchestrator::run(
        record_config,
        record_cancel.clone(),
        ready_tx,
    ));
    ready_rx.await.unwrap();

    let request = b"GET /foo/25 HTTP/1.1\r\nHost: app\r\n\r\n";
    let recorded_response = send_request(record_port, request).await;
    let text = String::from_utf8_lossy(&recorded_response);
    assert!(text.contains("Hello, \"/foo/25\""));

    record_cancel.cancel();
    recorder_task.await.unwrap().unwrap();
    dep_cancel.cancel();

    // The production naming contract (§4.F, §6): `requestN.data`/`responseN.data`.
    let stored_request = tokio::fs::read(capture_dir.path().join("request0.data"))
        .await
        .unwrap();
    assert!(!stored_request.is_empty());
    let stored_response = tokio::fs::read(capture_dir.path().join("response0.data"))
        .await
        .unwrap();
    assert!(!String::from_utf8_lossy(&stored_response)
        .to_lowercase()
        .contains("date:"));

    let replay_cancel = CancellationToken::new();
    let (replay_ready_tx, replay_ready_rx) = tokio::sync::oneshot::channel();
    let replay_port = portpicker::pick_unused_port().unwrap();
    let replay_config = http_config(replay_port, Mode::Replay, None, capture_dir.path());
    let replay_task = tokio::spawn(orchestrator::run(
        replay_config,
        replay_cancel.clone(),
        replay_ready_tx,
    ));
    replay_ready_rx.await.unwrap();

    let replayed_response = send_request(replay_port, request).await;
    let replayed_text = String::from_utf8_lossy(&replayed_response);
    assert!(replayed_text.contains("Hello, \"/foo/25\""));

    replay_cancel.cancel();
    replay_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn record_against_an_unreachable_dependency_writes_a_diffable_error_capture() {
    let capture_dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let record_port = portpicker::pick_unused_port().unwrap();

    let record_config = http_config(record_port, Mode::Record, Some("127.0.0.1:1"), capture_dir.path());
    let task = tokio::spawn(orchestrator::run(record_config, cancel.clone(), ready_tx));
    ready_rx.await.unwrap();

    let request = b"GET /unreachable HTTP/1.1\r\nHost: app\r\n\r\n";
    let response = send_request(record_port, request).await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 502"));

    cancel.cancel();
    task.await.unwrap().unwrap();

    // The production error-capture naming contract (§4.F, §6): `responseN.err`,
    // not the RESP/PostgreSQL `{index}.response.err` convention.
    let err_path = error_name(capture_dir.path())(0);
    assert_eq!(err_path, capture_dir.path().join("response0.err"));
    assert!(err_path.exists());
    let err_text = tokio::fs::read_to_string(&err_path).await.unwrap();
    assert!(!err_text.is_empty());

    // Exercising `http::runner::run` directly (orchestrator's replay-with-remote
    // branch only logs its report) against the same naming the record phase
    // above actually wrote through the orchestrator.
    assert_eq!(request_name(capture_dir.path())(0), capture_dir.path().join("request0.data"));
    assert_eq!(response_name(capture_dir.path())(0), capture_dir.path().join("response0.data"));

    let report = runner::run("127.0.0.1:1", capture_dir.path(), true, false)
        .await
        .unwrap();
    assert_eq!(report.cases_checked, 1);
    assert!(report.mismatches.is_empty());
}
