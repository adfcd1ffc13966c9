//! The capture store: persists and loads per-index request/response blob
//! pairs, serializing the request/response alternation across writers.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::errors::IoError;

pub mod recorder;
pub use recorder::TeeRecorder;

/// Maps an index to a blob path. Pluggable so callers can control on-disk
/// layout (§6: default `testdata/<i>.request`, `testdata/<i>.response`).
pub type FilenameFn = Arc<dyn Fn(u64) -> PathBuf + Send + Sync>;

pub fn default_request_name(dir: &std::path::Path) -> FilenameFn {
    let dir = dir.to_path_buf();
    Arc::new(move |index| dir.join(format!("{index}.request")))
}

pub fn default_response_name(dir: &std::path::Path) -> FilenameFn {
    let dir = dir.to_path_buf();
    Arc::new(move |index| dir.join(format!("{index}.response")))
}

pub fn default_error_name(dir: &std::path::Path) -> FilenameFn {
    let dir = dir.to_path_buf();
    Arc::new(move |index| dir.join(format!("{index}.response.err")))
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Kind {
    Request,
    Response,
}

struct Inner {
    next_index: u64,
    open_kind: Option<Kind>,
    open_file: Option<fs::File>,
}

/// Owns the single open capture file (if any) and the bookkeeping that
/// enforces request/response alternation (§4.A).
pub struct CaptureStore {
    req_name: FilenameFn,
    resp_name: FilenameFn,
    err_name: FilenameFn,
    inner: Mutex<Inner>,
}

impl CaptureStore {
    pub fn new(req_name: FilenameFn, resp_name: FilenameFn, err_name: FilenameFn) -> Self {
        Self {
            req_name,
            resp_name,
            err_name,
            inner: Mutex::new(Inner {
                next_index: 0,
                open_kind: None,
                open_file: None,
            }),
        }
    }

    pub fn with_dir(dir: &std::path::Path) -> Self {
        Self::new(
            default_request_name(dir),
            default_response_name(dir),
            default_error_name(dir),
        )
    }

    /// Appends bytes to the request stream, opening a new index if no
    /// request file is currently open.
    pub async fn write_request(&self, bytes: &[u8]) -> Result<(), IoError> {
        let mut inner = self.inner.lock().await;
        if inner.open_kind != Some(Kind::Request) {
            Self::close_open(&mut inner).await?;
            let index = inner.next_index;
            inner.next_index += 1;
            let path = (self.req_name)(index);
            inner.open_file = Some(Self::create(&path).await?);
            inner.open_kind = Some(Kind::Request);
        }
        let file = inner.open_file.as_mut().expect("request file just opened");
        file.write_all(bytes)
            .await
            .map_err(IoError::Generic)?;
        Ok(())
    }

    /// Appends bytes to the response stream for the most recently opened
    /// request index, opening a new response file if needed.
    pub async fn write_response(&self, bytes: &[u8]) -> Result<(), IoError> {
        let mut inner = self.inner.lock().await;
        if inner.open_kind != Some(Kind::Response) {
            Self::close_open(&mut inner).await?;
            let index = inner.next_index.saturating_sub(1);
            let path = (self.resp_name)(index);
            inner.open_file = Some(Self::create(&path).await?);
            inner.open_kind = Some(Kind::Response);
        }
        let file = inner.open_file.as_mut().expect("response file just opened");
        file.write_all(bytes)
            .await
            .map_err(IoError::Generic)?;
        Ok(())
    }

    /// Writes the terminal error blob for the most recently opened request
    /// index (HTTP: an upstream dial/send failure in place of a response).
    pub async fn write_error(&self, bytes: &[u8]) -> Result<(), IoError> {
        let mut inner = self.inner.lock().await;
        Self::close_open(&mut inner).await?;
        let index = inner.next_index.saturating_sub(1);
        let path = (self.err_name)(index);
        let mut file = Self::create(&path).await?;
        file.write_all(bytes).await.map_err(IoError::Generic)
    }

    /// Flushes and closes whichever sink is currently open.
    pub async fn close(&self) -> Result<(), IoError> {
        let mut inner = self.inner.lock().await;
        Self::close_open(&mut inner).await
    }

    async fn close_open(inner: &mut Inner) -> Result<(), IoError> {
        if let Some(mut file) = inner.open_file.take() {
            file.flush().await.map_err(IoError::Generic)?;
        }
        inner.open_kind = None;
        Ok(())
    }

    async fn create(path: &std::path::Path) -> Result<fs::File, IoError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| IoError::CreateDir(parent.to_path_buf(), e))?;
        }
        fs::File::create(path)
            .await
            .map_err(|e| IoError::CreateFile(path.to_path_buf(), e))
    }
}

/// One loaded `(request, response)` pair.
pub struct Capture {
    pub index: u64,
    pub request: Vec<u8>,
    pub response: Option<Vec<u8>>,
}

/// Loads every contiguous capture starting at index 0, stopping at the
/// first missing request blob (§3: "loading stops at the first missing
/// request blob").
pub async fn load_all(req_name: &FilenameFn, resp_name: &FilenameFn) -> std::io::Result<Vec<Capture>> {
    let mut captures = Vec::new();
    let mut index = 0u64;
    loop {
        let req_path = req_name(index);
        let request = match fs::read(&req_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
            Err(e) => return Err(e),
        };
        let resp_path = resp_name(index);
        let response = match fs::read(&resp_path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        captures.push(Capture {
            index,
            request,
            response,
        });
        index += 1;
    }
    Ok(captures)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn alternation_opens_and_closes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::with_dir(dir.path());

        store.write_request(b"req0").await.unwrap();
        store.write_response(b"resp0").await.unwrap();
        store.write_request(b"req1").await.unwrap();
        store.close().await.unwrap();

        let req_name = default_request_name(dir.path());
        let resp_name = default_response_name(dir.path());
        let captures = load_all(&req_name, &resp_name).await.unwrap();

        assert_eq!(captures.len(), 2);
        assert_eq!(captures[0].request, b"req0");
        assert_eq!(captures[0].response.as_deref(), Some(&b"resp0"[..]));
        assert_eq!(captures[1].request, b"req1");
        assert_eq!(captures[1].response, None);
    }

    #[tokio::test]
    async fn repeated_request_writes_append_to_the_same_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::with_dir(dir.path());

        store.write_request(b"ab").await.unwrap();
        store.write_request(b"cd").await.unwrap();
        store.close().await.unwrap();

        let req_name = default_request_name(dir.path());
        let resp_name = default_response_name(dir.path());
        let captures = load_all(&req_name, &resp_name).await.unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].request, b"abcd");
    }

    #[tokio::test]
    async fn indexes_are_contiguous_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::with_dir(dir.path());
        for i in 0..3 {
            store
                .write_request(format!("req{i}").as_bytes())
                .await
                .unwrap();
            store
                .write_response(format!("resp{i}").as_bytes())
                .await
                .unwrap();
        }
        store.close().await.unwrap();

        let req_name = default_request_name(dir.path());
        let resp_name = default_response_name(dir.path());
        let captures = load_all(&req_name, &resp_name).await.unwrap();
        let indexes: Vec<u64> = captures.iter().map(|c| c.index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }
}
