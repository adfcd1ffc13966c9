//! Session configuration: the validated combination of a config file and CLI
//! overrides that the mode orchestrator acts on.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde_derive::{Deserialize, Serialize};

use super::args::{Args, ModeArg, Protocol as ArgsProtocol};
use crate::errors::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Postgres,
    Resp,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Record,
    Replay,
}

/// On-disk representation of `replayd.toml`. Every field is optional so a
/// bare CLI invocation with no config file still works.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub protocol: Option<Protocol>,
    pub mode: Option<Mode>,
    pub remote_addr: Option<String>,
    pub capture_dir: Option<String>,
}

/// Fully validated session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub protocol: Protocol,
    pub mode: Mode,
    pub remote_addr: Option<SocketAddr>,
    pub capture_dir: PathBuf,
    pub update_on_diff: bool,
    pub sequential_replay: bool,
}

impl FileConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }
}

impl Config {
    /// Merges CLI overrides on top of the file config and validates the
    /// result (§4.G: record requires a remote address, replay forbids one).
    pub fn from_args(args: &Args, file: FileConfig) -> Result<Self, ConfigError> {
        let port = args.port.or(file.port).unwrap_or(6000);

        let protocol = match args.protocol {
            Some(ArgsProtocol::Postgres) => Protocol::Postgres,
            Some(ArgsProtocol::Resp) => Protocol::Resp,
            Some(ArgsProtocol::Http) => Protocol::Http,
            None => file.protocol.unwrap_or(Protocol::Resp),
        };

        let mode = match args.mode {
            Some(ModeArg::Record) => Mode::Record,
            Some(ModeArg::Replay) => Mode::Replay,
            None => file.mode.ok_or(ConfigError::MissingMode)?,
        };

        // HTTP replay is the one exception to "replay forbids a remote": when
        // given, it selects the offline verification runner (§4.F "Replay")
        // that re-fires captures at a live dependency instead of the live
        // digest-matching replayer.
        let remote_addr_str = args.remote.clone().or(file.remote_addr);
        let remote_addr = match (mode, protocol, remote_addr_str) {
            (Mode::Record, _, None) => return Err(ConfigError::MissingRemoteAddr),
            (Mode::Record, _, Some(s)) | (Mode::Replay, Protocol::Http, Some(s)) => Some(
                s.parse::<SocketAddr>()
                    .map_err(|e| ConfigError::InvalidRemoteAddr(s, e))?,
            ),
            (Mode::Replay, _, None) => None,
            (Mode::Replay, _, Some(_)) => return Err(ConfigError::UnexpectedRemoteAddr),
        };

        let capture_dir = args
            .capture_dir
            .clone()
            .or(file.capture_dir)
            .unwrap_or_else(|| "testdata".to_string())
            .into();

        Ok(Config {
            port,
            protocol,
            mode,
            remote_addr,
            capture_dir,
            update_on_diff: args.update,
            sequential_replay: args.sequential,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(mode: Option<ModeArg>, remote: Option<&str>) -> Args {
        Args {
            config_file: "replayd.toml".into(),
            port: Some(6000),
            protocol: Some(ArgsProtocol::Resp),
            mode,
            remote: remote.map(str::to_string),
            capture_dir: None,
            log_level: tracing::Level::INFO,
            log_format: super::super::args::LogFormat::Text,
            update: false,
            sequential: false,
            test_config: false,
        }
    }

    #[test]
    fn record_without_remote_is_an_error() {
        let err = Config::from_args(&args(Some(ModeArg::Record), None), FileConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRemoteAddr));
    }

    #[test]
    fn replay_with_remote_is_an_error() {
        let err = Config::from_args(
            &args(Some(ModeArg::Replay), Some("127.0.0.1:5432")),
            FileConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnexpectedRemoteAddr));
    }

    #[test]
    fn missing_mode_is_an_error() {
        let err = Config::from_args(&args(None, None), FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingMode));
    }

    #[test]
    fn record_with_remote_succeeds() {
        let cfg = Config::from_args(
            &args(Some(ModeArg::Record), Some("127.0.0.1:5432")),
            FileConfig::default(),
        )
        .unwrap();
        assert_eq!(cfg.mode, Mode::Record);
        assert!(cfg.remote_addr.is_some());
    }

    #[test]
    fn http_replay_with_remote_selects_the_verification_runner() {
        let mut a = args(Some(ModeArg::Replay), Some("127.0.0.1:8080"));
        a.protocol = Some(ArgsProtocol::Http);
        let cfg = Config::from_args(&a, FileConfig::default()).unwrap();
        assert_eq!(cfg.mode, Mode::Replay);
        assert!(cfg.remote_addr.is_some());
    }
}
