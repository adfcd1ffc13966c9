use tokio::signal;
use tokio_util::sync::CancellationToken;

use replayd::app::{self, Config, FileConfig};
use replayd::orchestrator;

fn main() -> std::process::ExitCode {
    let args = app::parse();
    app::init_logging(&args);

    match run(args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            std::process::ExitCode::from(exitcode::SOFTWARE as u8)
        }
    }
}

fn run(args: app::Args) -> Result<(), replayd::Error> {
    let file = FileConfig::load(std::path::Path::new(&args.config_file))?;
    let config = Config::from_args(&args, file)?;

    if args.test_config {
        println!("configuration valid: {config:?}");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build the tokio runtime");

    runtime.block_on(async move {
        let cancel = CancellationToken::new();
        let (ready_tx, _ready_rx) = tokio::sync::oneshot::channel();

        let shutdown = {
            let cancel = cancel.clone();
            async move {
                let _ = signal::ctrl_c().await;
                cancel.cancel();
            }
        };

        tokio::select! {
            result = orchestrator::run(config, cancel.clone(), ready_tx) => result,
            _ = shutdown => Ok(()),
        }
    })
}
