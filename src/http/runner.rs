//! HTTP replay runner (§4.F "Replay"): an offline verification utility that
//! re-fires every recorded request against a live remote and diffs the
//! result against the stored capture, optionally updating captures that
//! have drifted (`--update`). Used to validate that a recording is still
//! reproducible, independent of the live digest-matching replayer.

use std::path::Path;
use std::str::FromStr;

use futures::future::join_all;

use crate::http::{dump, error_name, request_name, response_name};

enum Expected {
    Response(Vec<u8>),
    Error(String),
}

struct Case {
    index: u64,
    request: Vec<u8>,
    expected: Expected,
}

async fn load_cases(capture_dir: &Path) -> std::io::Result<Vec<Case>> {
    let req_name = request_name(capture_dir);
    let resp_name = response_name(capture_dir);
    let err_name = error_name(capture_dir);

    let mut cases = Vec::new();
    let mut index = 0u64;
    loop {
        let request = match tokio::fs::read(req_name(index)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
            Err(e) => return Err(e),
        };
        let expected = match tokio::fs::read(resp_name(index)).await {
            Ok(bytes) => Expected::Response(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match tokio::fs::read_to_string(err_name(index)).await {
                    Ok(text) => Expected::Error(text),
                    Err(_) => Expected::Response(Vec::new()),
                }
            }
            Err(e) => return Err(e),
        };
        cases.push(Case {
            index,
            request,
            expected,
        });
        index += 1;
    }
    Ok(cases)
}

/// One mismatch between a live re-fire and its recorded capture.
pub struct Mismatch {
    pub index: u64,
    pub detail: String,
}

pub struct RunnerReport {
    pub cases_checked: usize,
    pub mismatches: Vec<Mismatch>,
}

async fn fire(client: &reqwest::Client, remote_addr: &str, request: &[u8]) -> Result<Vec<u8>, String> {
    let parsed = dump::parse_request(request).map_err(|e| e.to_string())?;
    let url = format!("http://{remote_addr}{}", parsed.path);
    let method = reqwest::Method::from_str(&parsed.method).unwrap_or(reqwest::Method::GET);
    let mut builder = client.request(method, &url).body(parsed.body);
    for (name, value) in &parsed.headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        builder = builder.header(name, value);
    }
    let resp = builder.send().await.map_err(|e| e.to_string())?;
    let status = resp.status().as_u16();
    let reason = resp.status().canonical_reason().unwrap_or("").to_string();
    let headers: Vec<(String, String)> = resp
        .headers()
        .iter()
        .map(|(n, v)| (n.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    let body = resp.bytes().await.map_err(|e| e.to_string())?.to_vec();
    Ok(dump::dump_response_without_date(status, &reason, &headers, &body))
}

async fn check_one(
    client: &reqwest::Client,
    remote_addr: &str,
    capture_dir: &Path,
    case: Case,
    update: bool,
) -> Option<Mismatch> {
    let result = fire(client, remote_addr, &case.request).await;
    match (result, &case.expected) {
        (Ok(actual), Expected::Response(stored)) if &actual == stored => None,
        (Ok(actual), Expected::Response(stored)) => {
            if update {
                let path = response_name(capture_dir)(case.index);
                let _ = tokio::fs::write(path, &actual).await;
                return None;
            }
            Some(Mismatch {
                index: case.index,
                detail: format!(
                    "response diff: stored {} bytes, live {} bytes",
                    stored.len(),
                    actual.len()
                ),
            })
        }
        (Ok(actual), Expected::Error(stored_err)) => {
            if update {
                let path = response_name(capture_dir)(case.index);
                let _ = tokio::fs::write(path, &actual).await;
                return None;
            }
            Some(Mismatch {
                index: case.index,
                detail: format!("expected error {stored_err:?}, got a response"),
            })
        }
        (Err(actual_err), Expected::Error(stored_err)) if &actual_err == stored_err => None,
        (Err(actual_err), Expected::Error(stored_err)) => Some(Mismatch {
            index: case.index,
            detail: format!("error diff: stored {stored_err:?}, live {actual_err:?}"),
        }),
        (Err(actual_err), Expected::Response(_)) => Some(Mismatch {
            index: case.index,
            detail: format!("expected a response, got error {actual_err:?}"),
        }),
    }
}

/// Re-fires every capture under `capture_dir` against `remote_addr` and
/// diffs the outcome. Concurrent by default; `sequential` serializes the
/// calls for stateful dependencies (§9 "HTTP parallel replay").
pub async fn run(remote_addr: &str, capture_dir: &Path, sequential: bool, update: bool) -> std::io::Result<RunnerReport> {
    let cases = load_cases(capture_dir).await?;
    let cases_checked = cases.len();
    let client = reqwest::Client::new();

    let mismatches = if sequential {
        let mut out = Vec::new();
        for case in cases {
            if let Some(m) = check_one(&client, remote_addr, capture_dir, case, update).await {
                out.push(m);
            }
        }
        out
    } else {
        join_all(
            cases
                .into_iter()
                .map(|case| check_one(&client, remote_addr, capture_dir, case, update)),
        )
        .await
        .into_iter()
        .flatten()
        .collect()
    };

    Ok(RunnerReport {
        cases_checked,
        mismatches,
    })
}
