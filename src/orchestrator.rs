//! Mode Orchestrator (§4.G): turns a validated `Config` into a running
//! session — constructing the right protocol endpoint for record or replay
//! and wiring it into the TCP accept loop, or, for HTTP, into its own
//! listener subsystem.

use std::io;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app::config::{Config, Mode, Protocol};
use crate::errors::{Error, IoError};
use crate::net::accept;
use crate::pg::{PgRecorder, PgReplayer};
use crate::resp::RespMatcher;
use crate::store::{CaptureStore, TeeRecorder};

fn to_io_err(e: impl std::fmt::Display) -> io::Error {
    io::Error::other(e.to_string())
}

/// Runs one session until `cancel` fires. `ready` fires once the listener
/// (or, for the HTTP verification runner, nothing — it is one-shot) is up.
pub async fn run(config: Config, cancel: CancellationToken, ready: oneshot::Sender<()>) -> Result<(), Error> {
    match (config.protocol, config.mode) {
        (Protocol::Resp, Mode::Record) => {
            let remote = config.remote_addr.expect("record validated to carry a remote address");
            let store = Arc::new(CaptureStore::with_dir(&config.capture_dir));
            accept::serve(config.port, cancel, ready, move || {
                let store = store.clone();
                async move {
                    TeeRecorder::dial(&remote.to_string(), store)
                        .await
                        .map_err(to_io_err)
                }
            })
            .await?;
        }
        (Protocol::Resp, Mode::Replay) => {
            let matcher = RespMatcher::load(&config.capture_dir).await?;
            accept::serve(config.port, cancel, ready, move || {
                let matcher = matcher.clone();
                async move { Ok(matcher) }
            })
            .await?;
        }
        (Protocol::Postgres, Mode::Record) => {
            let remote = config.remote_addr.expect("record validated to carry a remote address");
            let store = Arc::new(CaptureStore::with_dir(&config.capture_dir));
            accept::serve(config.port, cancel, ready, move || {
                let store = store.clone();
                async move {
                    PgRecorder::dial(&remote.to_string(), store)
                        .await
                        .map_err(to_io_err)
                }
            })
            .await?;
        }
        (Protocol::Postgres, Mode::Replay) => {
            let replayer = PgReplayer::load(&config.capture_dir).await?;
            accept::serve(config.port, cancel, ready, move || {
                let replayer = replayer.clone();
                async move { Ok(replayer) }
            })
            .await?;
        }
        (Protocol::Http, Mode::Record) => {
            let remote = config
                .remote_addr
                .expect("record validated to carry a remote address");
            let req_name = crate::http::request_name(&config.capture_dir);
            let resp_name = crate::http::response_name(&config.capture_dir);
            let err_name = crate::http::error_name(&config.capture_dir);
            let store = Arc::new(CaptureStore::new(req_name, resp_name, err_name));
            crate::http::recorder::serve(config.port, remote.to_string(), store, cancel, ready).await?;
        }
        (Protocol::Http, Mode::Replay) => match config.remote_addr {
            Some(remote) => {
                let _ = ready.send(());
                info!("running HTTP verification runner against {remote}");
                let report = crate::http::runner::run(
                    &remote.to_string(),
                    &config.capture_dir,
                    config.sequential_replay,
                    config.update_on_diff,
                )
                .await
                .map_err(IoError::Generic)?;
                info!(
                    cases_checked = report.cases_checked,
                    mismatches = report.mismatches.len(),
                    "HTTP verification run complete"
                );
                for mismatch in &report.mismatches {
                    tracing::warn!(index = mismatch.index, "{}", mismatch.detail);
                }
            }
            None => {
                let req_name = crate::http::request_name(&config.capture_dir);
                let resp_name = crate::http::response_name(&config.capture_dir);
                crate::http::replayer::serve(config.port, req_name, resp_name, cancel, ready).await?;
            }
        },
    }
    Ok(())
}
