use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use super::checkpoint::{CheckpointData, CheckpointStore};
use super::errors::HawkeyeError;
use super::events::Event;
use super::models::{RunDirs, StageName, StageResult};
use super::modes;
use super::state::{RunState, StageState};
use crate::config::RunConfig;
use crate::reporters::RunReport;
use crate::stages::StageRegistry;
use crate::ui::progress::ProgressManager;

/// Operator yes/no gate consulted before each stage in interactive mode.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, stage: StageName) -> bool;
}

/// Turns the accumulated results into report artifacts.
pub trait ReportSink: Send + Sync {
    fn write(&self, report: &RunReport<'_>) -> Result<Vec<PathBuf>>;
}

/// What a completed run hands back for the final summary.
#[derive(Debug)]
pub struct RunSummary {
    pub target: String,
    pub run_dir: PathBuf,
    pub duration_seconds: f64,
    pub planned: Vec<StageName>,
    pub stage_states: BTreeMap<StageName, StageState>,
    pub results: BTreeMap<StageName, StageResult>,
    pub reports: Vec<PathBuf>,
}

/// Drives one run: plans the stages, executes them strictly in order,
/// checkpoints after each one and reports at the end.
pub struct Pipeline {
    config: Arc<RunConfig>,
    registry: StageRegistry,
    dirs: RunDirs,
    checkpoints: CheckpointStore,
    state: RunState,
    prior_failed: BTreeSet<StageName>,
    confirm: Option<Box<dyn Confirm>>,
    reports: Box<dyn ReportSink>,
    progress: Option<ProgressManager>,
}

impl Pipeline {
    pub fn new(config: Arc<RunConfig>, registry: StageRegistry, reports: Box<dyn ReportSink>) -> Self {
        let dirs = RunDirs::new(&config.output_dir, &config.target);
        let checkpoints = CheckpointStore::new(&dirs.root);
        let state = RunState::new(config.target.to_string());
        Self {
            config,
            registry,
            dirs,
            checkpoints,
            state,
            prior_failed: BTreeSet::new(),
            confirm: None,
            reports,
            progress: None,
        }
    }

    pub fn with_confirm(mut self, confirm: Box<dyn Confirm>) -> Self {
        self.confirm = Some(confirm);
        self
    }

    pub fn with_progress(mut self, progress: ProgressManager) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs every planned stage unless `shutdown` resolves first.
    ///
    /// On shutdown the last saved checkpoint is left in place, no report is
    /// written and `HawkeyeError::Interrupted` is returned.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<RunSummary, HawkeyeError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.state.mark_started();

        let root = self.dirs.root.clone();
        if let Err(source) = std::fs::create_dir_all(&root) {
            let err = HawkeyeError::OutputDir { path: root, source };
            self.state.on_event(Event::RunFailed(err.to_string()));
            return Err(err);
        }

        let completed = if self.config.flags.resume {
            self.resume_point()
        } else {
            None
        };
        let stages = modes::plan(self.config.mode, completed.as_ref());

        tracing::info!("Target: {}", self.config.target);
        tracing::info!("Mode: {}", self.config.mode);
        tracing::info!("Output: {}", root.display());
        if stages.is_empty() {
            tracing::info!("Every stage of mode {} already completed", self.config.mode);
        }

        self.state.on_event(Event::RunStarted(stages.clone()));
        if let Some(progress) = &self.progress {
            progress.start(stages.len());
        }

        let total = stages.len();
        for (index, stage) in stages.into_iter().enumerate() {
            if self.config.flags.interactive {
                if let Some(confirm) = &self.confirm {
                    let answer = tokio::select! {
                        biased;
                        _ = &mut shutdown => None,
                        accepted = confirm.confirm(stage) => Some(accepted),
                    };
                    match answer {
                        None => return Err(self.interrupted(None)),
                        Some(false) => {
                            self.state.on_event(Event::StageDeclined(stage));
                            if let Some(progress) = &self.progress {
                                progress.stage_declined(stage);
                            }
                            continue;
                        }
                        Some(true) => {}
                    }
                }
            }

            tracing::info!("Stage {}/{}: {}", index + 1, total, stage);
            self.state.on_event(Event::StageStarted(stage));
            if let Some(progress) = &self.progress {
                progress.stage_started(stage);
            }

            let outcome = tokio::select! {
                biased;
                _ = &mut shutdown => None,
                result = self.registry.execute(stage, &root) => Some(result),
            };
            let Some(result) = outcome else {
                return Err(self.interrupted(Some(stage)));
            };

            tracing::info!("Stage {} finished: {}", stage, result.status);
            if let Some(progress) = &self.progress {
                progress.stage_finished(stage, result.status);
            }
            self.state.on_event(Event::StageFinished(stage, result));
            self.save_checkpoint(stage);
        }

        self.state.on_event(Event::RunCompleted);
        tracing::debug!("Run phase: {:?}", self.state.phase);
        if let Some(progress) = &self.progress {
            progress.finish();
        }

        let reports = self.write_reports();
        self.checkpoints.clear();

        tracing::info!(
            "Workflow completed in {:.2} seconds ({:.2} minutes)",
            self.state.duration_seconds(),
            self.state.duration_seconds() / 60.0
        );

        Ok(RunSummary {
            target: self.state.target.clone(),
            run_dir: root,
            duration_seconds: self.state.duration_seconds(),
            planned: self.state.planned,
            stage_states: self.state.stage_states,
            results: self.state.results,
            reports,
        })
    }

    fn resume_point(&mut self) -> Option<BTreeSet<StageName>> {
        tracing::debug!("Looking for checkpoint at {}", self.checkpoints.path().display());
        let Some(checkpoint) = self.checkpoints.load() else {
            tracing::info!("No checkpoint found, starting from the first stage");
            return None;
        };

        let completed = checkpoint.data.completed_set();
        let names: Vec<&str> = completed.iter().map(|s| s.as_str()).collect();
        tracing::info!("Resuming, already completed: {}", names.join(", "));

        self.prior_failed = checkpoint
            .data
            .failed_stages
            .iter()
            .filter_map(|name| name.parse::<StageName>().ok())
            .collect();
        if !self.prior_failed.is_empty() {
            let failed: Vec<&str> = self.prior_failed.iter().map(|s| s.as_str()).collect();
            tracing::warn!("Previously failed stages will not be retried: {}", failed.join(", "));
        }

        self.state.resumed_from = completed.clone();
        Some(completed)
    }

    fn save_checkpoint(&self, stage: StageName) {
        let mut failed: BTreeSet<StageName> = self.prior_failed.clone();
        failed.extend(self.state.failed_stages());
        let failed: Vec<StageName> = failed.into_iter().collect();

        let data = CheckpointData::new(&self.state.attempted_stages(), &failed);
        self.checkpoints.save(stage, &data);
    }

    fn write_reports(&self) -> Vec<PathBuf> {
        let timestamp = |t: Option<chrono::DateTime<chrono::Local>>| {
            t.map(|t| t.to_rfc3339()).unwrap_or_default()
        };
        let report = RunReport {
            target: self.state.target.clone(),
            start_time: timestamp(self.state.start_time),
            end_time: timestamp(self.state.end_time),
            duration_seconds: self.state.duration_seconds(),
            results: &self.state.results,
            config: &self.config,
        };

        match self.reports.write(&report) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::error!("Report generation failed: {:#}", e);
                Vec::new()
            }
        }
    }

    fn interrupted(&mut self, stage: Option<StageName>) -> HawkeyeError {
        self.state.on_event(Event::RunInterrupted(stage));
        if let Some(progress) = &self.progress {
            progress.abandon();
        }
        HawkeyeError::Interrupted
    }
}
