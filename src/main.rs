mod app;
mod cli;
mod config;
mod core;
mod executors;
mod reporters;
mod stages;
mod ui;
mod utils;

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;

use crate::core::errors::HawkeyeError;

/// Upper bound on waiting for blocking work (a pending prompt) at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> ExitCode {
    human_panic::setup_panic!();

    let cli = cli::args::Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("fatal: cannot start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(app::run(cli));
    // Dropping the remaining tasks here kills any external tool still running.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if matches!(err.downcast_ref::<HawkeyeError>(), Some(HawkeyeError::Interrupted)) {
                tracing::warn!("Scan interrupted by user");
                tracing::info!("Progress saved. Use --resume to continue");
            } else {
                tracing::error!("fatal: {:#}", err);
                eprintln!("fatal: {:#}", err);
            }
            ExitCode::FAILURE
        }
    }
}
