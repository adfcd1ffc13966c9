//! Error taxonomy for the record/replay engine.

use std::io;
use std::net::AddrParseError;
use std::path::PathBuf;

/// Top-level error for every fallible entry point in this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Framing(#[from] FramingError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(IoError::Generic(err))
    }
}

/// Errors raised while validating or loading configuration. Fatal at construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("mode must be one of \"record\" or \"replay\"")]
    MissingMode,
    #[error("record mode requires a remote address")]
    MissingRemoteAddr,
    #[error("replay mode does not accept a remote address")]
    UnexpectedRemoteAddr,
    #[error("could not parse remote address {0:?}: {1}")]
    InvalidRemoteAddr(String, AddrParseError),
    #[error("failed to read config file {0:?}: {1}")]
    ReadFile(PathBuf, #[source] io::Error),
    #[error("failed to parse config file {0:?}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

/// Errors raised by filesystem or socket I/O. Fatal for bind/dial, logged and
/// skipped for per-byte tee writes.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error(transparent)]
    Generic(#[from] io::Error),
    #[error("failed to create capture directory {0:?}: {1}")]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("failed to create capture file {0:?}: {1}")]
    CreateFile(PathBuf, #[source] io::Error),
    #[error("failed to bind listener on port {0}: {1}")]
    Bind(u16, #[source] io::Error),
    #[error("failed to dial backend {0}: {1}")]
    Dial(String, #[source] io::Error),
}

/// Errors raised while slicing a raw byte stream into protocol messages.
/// Aborts the offending connection; never crashes the process.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("malformed RESP array header: {0:?}")]
    BadRespHeader(String),
    #[error("truncated PostgreSQL message length")]
    TruncatedLength,
}
