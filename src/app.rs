use anyhow::Result;
use std::sync::Arc;

use crate::{
    cli::args::Cli,
    config::{ConfigLoader, WordlistKind},
    core::{models::RunDirs, pipeline::Pipeline},
    reporters::FileReporter,
    stages::StageRegistry,
    ui::{printer, progress::ProgressManager, prompt::StdinConfirm},
    utils::logging,
};

pub async fn run(cli: Cli) -> Result<()> {
    let level = logging::level_from_cli(&cli);
    logging::init(level, cli.verbose)?;

    if cli.list_stages {
        printer::print_stage_table();
        return Ok(());
    }

    let config = Arc::new(ConfigLoader::resolve(&cli)?);
    tracing::info!("Starting hawkeye for target: {}", config.target);
    tracing::debug!(
        "threads={} rate={} timeout={}s workers={} tier={}",
        config.concurrency.threads,
        config.concurrency.rate_limit,
        config.concurrency.timeout_secs,
        config.concurrency.workers,
        config.wordlists.tier
    );
    for kind in WordlistKind::ALL {
        match config.wordlist_path(kind) {
            Some(path) => tracing::debug!("{} wordlist: {}", kind.file_stem(), path.display()),
            None => tracing::debug!("{} wordlist: not found", kind.file_stem()),
        }
    }

    let registry = StageRegistry::from_config(Arc::clone(&config));
    if registry.available_stages().is_empty() {
        tracing::warn!("No stage is available with the current tool filters");
    }

    let dirs = RunDirs::new(&config.output_dir, &config.target);
    let reporter = FileReporter::new(dirs, &config.report_formats)?;
    let progress = if cli.verbose || cli.debug {
        ProgressManager::hidden()
    } else {
        ProgressManager::new()
    };

    let mut pipeline = Pipeline::new(Arc::clone(&config), registry, Box::new(reporter));
    if config.flags.interactive {
        pipeline = pipeline.with_confirm(Box::new(StdinConfirm::new(Some(progress.handle()))));
    }
    let pipeline = pipeline.with_progress(progress);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let summary = pipeline.run_until(shutdown).await?;
    printer::print_summary(&summary);

    if !config.notify.is_empty() {
        tracing::warn!("Notifications are not supported yet, skipping {:?}", config.notify);
    }

    Ok(())
}
