use clap::{Parser, ValueEnum};
use tracing::Level;

/// replayd: a protocol-aware record/replay proxy for deterministic tests.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(default_value_t = String::from("replayd.toml"), env)]
    pub config_file: String,

    #[arg(long, env)]
    pub port: Option<u16>,

    #[arg(long, value_enum, env)]
    pub protocol: Option<Protocol>,

    #[arg(long, value_enum, env)]
    pub mode: Option<ModeArg>,

    #[arg(long, env)]
    pub remote: Option<String>,

    #[arg(long, env)]
    pub capture_dir: Option<String>,

    #[arg(short, long, default_value_t = Level::INFO, env)]
    pub log_level: Level,

    #[clap(short = 'F', long, value_enum, default_value_t = LogFormat::Text, env)]
    pub log_format: LogFormat,

    #[arg(
        long,
        default_value_t = false,
        env,
        help = "overwrite stored HTTP responses that diff from the live backend, instead of failing"
    )]
    pub update: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "replay HTTP requests one at a time instead of in parallel"
    )]
    pub sequential: bool,

    #[arg(
        short = 't',
        long = "test-config",
        default_value_t = false,
        help = "validate the configuration file and exit"
    )]
    pub test_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    Postgres,
    Resp,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Record,
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
    Debug,
}

pub fn parse() -> Args {
    Args::parse()
}
