pub mod content;
pub mod discovery;
pub mod registry;
pub mod scanning;
pub mod vulnerability;
pub mod web;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RunConfig;
use crate::core::errors::HawkeyeError;
use crate::core::models::{StageName, StageResult, StageStatus, Target};
use crate::core::parallel::TaskRunner;
use crate::executors::tool::ToolStatus;
use crate::executors::{ToolCommand, ToolOutcome, ToolRunner};
use crate::utils::fs::{atomic_write, has_content, read_lines_lossy};

pub use registry::StageRegistry;

/// External tools a stage may invoke, in invocation order.
pub fn tools_for(stage: StageName) -> &'static [&'static str] {
    match stage {
        StageName::Discovery => discovery::TOOLS,
        StageName::Scanning => scanning::TOOLS,
        StageName::Web => web::TOOLS,
        StageName::Content => content::TOOLS,
        StageName::Vulnerability => vulnerability::TOOLS,
    }
}

/// One phase of the reconnaissance pipeline.
///
/// `execute` reports expected conditions (no input, tool missing, tool
/// failed) inside the returned `StageResult`; an `Err` is reserved for
/// conditions the stage cannot describe, and the registry turns it into a
/// `failed` result.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    /// External tools this stage may invoke, in invocation order.
    fn tools(&self) -> &'static [&'static str];

    async fn execute(&self, work_dir: &Path) -> Result<StageResult>;
}

/// Everything a stage needs from the run: settings and the two runners.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub config: Arc<RunConfig>,
    pub tools: ToolRunner,
    pub tasks: TaskRunner,
}

impl StageContext {
    pub fn new(config: Arc<RunConfig>) -> Self {
        let tools = ToolRunner::new(config.tool_timeout());
        let tasks = TaskRunner::new(config.concurrency.workers);
        Self { config, tools, tasks }
    }

    pub fn should_run(&self, tool: &str) -> bool {
        self.config.tool_enabled(tool)
    }

    /// Fails when the skip/only filters exclude every tool of a stage.
    pub fn require_any_tool(&self, stage: StageName, tools: &[&str]) -> Result<(), HawkeyeError> {
        if tools.iter().any(|tool| self.should_run(tool)) {
            Ok(())
        } else {
            Err(HawkeyeError::StageUnavailable {
                stage: stage.to_string(),
                reason: format!("all of its tools are excluded ({})", tools.join(", ")),
            })
        }
    }

    /// Writes the run's own target hosts to `<stage_dir>/targets.txt`.
    /// A list target is used in place.
    pub fn seed_targets(&self, stage_dir: &Path) -> Result<Option<PathBuf>> {
        if let Target::List(path) = &self.config.target {
            return Ok(has_content(path).then(|| path.clone()));
        }

        let hosts = self.config.target.hosts()?;
        if hosts.is_empty() {
            return Ok(None);
        }
        let seed = stage_dir.join("targets.txt");
        atomic_write(&seed, format!("{}\n", hosts.join("\n")).as_bytes())?;
        Ok(Some(seed))
    }

    /// First candidate with content, else the seeded target file.
    pub fn input_or_targets(&self, candidates: &[PathBuf], stage_dir: &Path) -> Result<Option<PathBuf>> {
        if let Some(found) = candidates.iter().find(|path| has_content(path)) {
            return Ok(Some(found.clone()));
        }
        tracing::info!("No input from earlier stages, using the run targets");
        self.seed_targets(stage_dir)
    }

    /// Runs one tool and counts the non-empty lines of its output file.
    pub async fn run_counted(
        &self,
        cmd: ToolCommand,
        cwd: &Path,
        output: &Path,
        tally: &mut ToolTally,
    ) -> Option<usize> {
        let tool = cmd.tool;
        match self.tools.run(&cmd, cwd).await {
            Ok(run) => {
                let count = read_lines_lossy(output).len();
                tally.record(ToolOutcome::succeeded(tool, &run, Some(output.to_path_buf()), count));
                Some(count)
            }
            Err(e) => {
                tally.record(ToolOutcome::failed(tool, &e));
                None
            }
        }
    }

    /// Runs independent tool jobs through the task runner.
    /// Outcomes come back in job order.
    pub async fn run_parallel(&self, jobs: Vec<ToolJob>, cwd: &Path) -> Vec<ToolOutcome> {
        let labels: Vec<&'static str> = jobs.iter().map(|job| job.cmd.tool).collect();

        let units: Vec<_> = jobs
            .into_iter()
            .enumerate()
            .map(|(index, job)| {
                let runner = self.tools.clone();
                let cwd = cwd.to_path_buf();
                move || async move {
                    let outcome = match runner.run(&job.cmd, &cwd).await {
                        Ok(run) => {
                            let count = (job.counter)(&job.output);
                            ToolOutcome::succeeded(job.cmd.tool, &run, Some(job.output), count)
                        }
                        Err(e) => ToolOutcome::failed(job.cmd.tool, &e),
                    };
                    Ok::<_, anyhow::Error>((index, outcome))
                }
            })
            .collect();

        let mut slots: Vec<Option<ToolOutcome>> = vec![None; labels.len()];
        for (index, outcome) in self.tasks.run(units).await.into_iter().flatten() {
            slots[index] = Some(outcome);
        }

        slots
            .into_iter()
            .zip(labels)
            .map(|(slot, tool)| slot.unwrap_or_else(|| ToolOutcome::aborted(tool)))
            .collect()
    }
}

/// A tool invocation for `StageContext::run_parallel`.
#[derive(Debug, Clone)]
pub struct ToolJob {
    pub cmd: ToolCommand,
    pub output: PathBuf,
    pub counter: fn(&Path) -> usize,
}

impl ToolJob {
    pub fn new(cmd: ToolCommand, output: PathBuf) -> Self {
        Self {
            cmd,
            output,
            counter: count_lines,
        }
    }

    pub fn counted_by(mut self, counter: fn(&Path) -> usize) -> Self {
        self.counter = counter;
        self
    }
}

pub fn count_lines(path: &Path) -> usize {
    read_lines_lossy(path).len()
}

/// Per-tool outcomes of one stage execution.
#[derive(Debug, Default)]
pub struct ToolTally {
    outcomes: Vec<ToolOutcome>,
}

impl ToolTally {
    pub fn record(&mut self, outcome: ToolOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn excluded(&mut self, tool: &str) {
        tracing::debug!("{} excluded by tool filters", tool);
        self.record(ToolOutcome::skipped(tool, "excluded"));
    }

    /// Records a tool that was allowed but had nothing to work on.
    pub fn no_input(&mut self, tool: &str) {
        tracing::info!("{} has no input, skipping", tool);
        self.record(ToolOutcome::skipped(tool, "no_input"));
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status != ToolStatus::Skipped).count()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn status(&self) -> StageStatus {
        StageStatus::from_tool_results(self.succeeded(), self.attempted())
    }

    pub fn outcomes(&self) -> &[ToolOutcome] {
        &self.outcomes
    }

    /// Builds the stage result: derived status plus a `tools` array.
    pub fn into_result(self, stage_dir: &Path) -> StageResult {
        let status = self.status();
        let mut result = StageResult::new(status, stage_dir);
        if status == StageStatus::Skipped {
            result.insert("reason", "no_tools_ran");
        }
        let tools: Vec<Value> = self.outcomes.iter().map(ToolOutcome::to_value).collect();
        result.insert("tools", Value::Array(tools));
        result
    }
}

pub fn prepare_stage_dir(work_dir: &Path, stage: StageName) -> Result<PathBuf> {
    let stage_dir = work_dir.join(stage.dir_name());
    std::fs::create_dir_all(&stage_dir)
        .with_context(|| format!("Failed to create stage directory: {:?}", stage_dir))?;
    Ok(stage_dir)
}

pub fn path_value(path: &Path) -> Value {
    Value::String(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ToolFilter;
    use crate::core::models::Target;
    use tempfile::TempDir;

    fn ctx_with(filter: ToolFilter) -> StageContext {
        let mut config = RunConfig::for_target(Target::Host("example.com".to_string()));
        config.tools = filter;
        StageContext::new(Arc::new(config))
    }

    #[test]
    fn test_require_any_tool() {
        let ctx = ctx_with(ToolFilter {
            skip: vec!["ffuf".to_string()],
            only: vec![],
        });
        assert!(ctx.require_any_tool(StageName::Content, &["ffuf"]).is_err());
        assert!(ctx.require_any_tool(StageName::Scanning, &["naabu", "nmap"]).is_ok());
    }

    #[test]
    fn test_input_falls_back_to_seeded_targets() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_with(ToolFilter::default());
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "").unwrap();

        let input = ctx
            .input_or_targets(&[dir.path().join("missing.txt"), empty], dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(input, dir.path().join("targets.txt"));
        assert_eq!(read_lines_lossy(&input), vec!["example.com"]);
    }

    #[test]
    fn test_input_prefers_candidate_with_content() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_with(ToolFilter::default());
        let hosts = dir.path().join("resolved.txt");
        std::fs::write(&hosts, "a.example.com\n").unwrap();
        let input = ctx.input_or_targets(&[hosts.clone()], dir.path()).unwrap();
        assert_eq!(input, Some(hosts));
    }

    #[test]
    fn test_tally_status() {
        let mut tally = ToolTally::default();
        tally.excluded("puredns");
        assert_eq!(tally.status(), StageStatus::Skipped);

        tally.record(ToolOutcome::failed("subfinder", &HawkeyeError::ToolMissing("subfinder".into())));
        assert_eq!(tally.status(), StageStatus::Failed);

        let dir = TempDir::new().unwrap();
        let result = tally.into_result(dir.path());
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.get("tools").and_then(|t| t.as_array()).map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_run_parallel_keeps_job_order_and_records_failures() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_with(ToolFilter::default());
        let jobs = vec![
            ToolJob::new(ToolCommand::new("hawkeye-missing-a"), dir.path().join("a.txt")),
            ToolJob::new(ToolCommand::new("hawkeye-missing-b"), dir.path().join("b.txt")),
        ];
        let outcomes = ctx.run_parallel(jobs, dir.path()).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].tool, "hawkeye-missing-a");
        assert_eq!(outcomes[1].tool, "hawkeye-missing-b");
        assert!(outcomes.iter().all(|o| o.reason.as_deref() == Some("tool_not_found")));
    }
}
