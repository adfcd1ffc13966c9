use tracing_subscriber::EnvFilter;

use super::args::{Args, LogFormat};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initializes the global logger from CLI flags. Must run once, before any
/// other component logs.
pub fn init_logging(args: &Args) {
    use log::info;

    let filter = EnvFilter::from_default_env().add_directive(args.log_level.into());
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match args.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Debug => subscriber.pretty().init(),
        LogFormat::Text => subscriber.init(),
    };

    info!("replayd {VERSION} starting up");
}
