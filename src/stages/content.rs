use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use super::{Stage, StageContext, ToolJob, ToolTally, path_value, prepare_stage_dir};
use crate::config::WordlistKind;
use crate::core::errors::HawkeyeError;
use crate::core::models::{StageName, StageResult};
use crate::executors::ToolCommand;
use crate::utils::fs::read_lines_lossy;

pub const TOOLS: &[&str] = &["ffuf"];
const MATCH_CODES: &str = "200,204,301,302,307,401,403";

/// Stage 4: directory and file fuzzing of every live URL.
pub struct ContentStage {
    ctx: StageContext,
}

impl ContentStage {
    pub fn new(ctx: StageContext) -> Result<Self, HawkeyeError> {
        ctx.require_any_tool(StageName::Content, TOOLS)?;
        Ok(Self { ctx })
    }

    fn ffuf_command(&self, url: &str, wordlist: &Path, output: &Path) -> ToolCommand {
        let config = &self.ctx.config;
        let cmd = ToolCommand::new("ffuf")
            .arg("-u")
            .arg(format!("{}/FUZZ", url.trim_end_matches('/')))
            .path_arg("-w", wordlist)
            .arg("-mc")
            .arg(MATCH_CODES)
            .args(["-fc", "404"])
            .path_arg("-o", output)
            .args(["-of", "json"])
            .arg("-t")
            .arg(config.concurrency.threads.to_string())
            .arg("-rate")
            .arg(config.concurrency.rate_limit.to_string())
            .arg("-timeout")
            .arg(config.concurrency.timeout_secs.to_string())
            .arg("-s");
        if config.flags.deep {
            cmd.args(["-recursion", "-recursion-depth", "2"])
        } else {
            cmd
        }
    }
}

/// Number of entries in the `results` array of an ffuf JSON report.
fn count_ffuf_results(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        .and_then(|report| report.get("results").and_then(Value::as_array).map(Vec::len))
        .unwrap_or(0)
}

#[async_trait]
impl Stage for ContentStage {
    fn name(&self) -> StageName {
        StageName::Content
    }

    fn tools(&self) -> &'static [&'static str] {
        TOOLS
    }

    async fn execute(&self, work_dir: &Path) -> Result<StageResult> {
        let stage_dir = prepare_stage_dir(work_dir, StageName::Content)?;

        tracing::info!("Stage 4: Content Discovery");

        let live_file = work_dir.join(StageName::Web.dir_name()).join("live_urls.txt");
        let urls: Vec<String> = read_lines_lossy(&live_file)
            .into_iter()
            .filter(|url| url.starts_with("http"))
            .collect();
        if urls.is_empty() {
            tracing::warn!("No live URLs from web discovery, skipping content discovery");
            return Ok(StageResult::skipped(&stage_dir, "no_input"));
        }

        let Some(wordlist) = self.ctx.config.wordlist_path(WordlistKind::Directories) else {
            tracing::warn!("No directories wordlist for tier {}", self.ctx.config.wordlists.tier);
            return Ok(StageResult::skipped(&stage_dir, "no_wordlist"));
        };

        tracing::info!("Fuzzing {} URLs with {:?}", urls.len(), wordlist);

        let jobs: Vec<ToolJob> = urls
            .iter()
            .enumerate()
            .map(|(n, url)| {
                let output = stage_dir.join(format!("ffuf_{}.json", n + 1));
                ToolJob::new(self.ffuf_command(url, &wordlist, &output), output).counted_by(count_ffuf_results)
            })
            .collect();

        let mut tally = ToolTally::default();
        for outcome in self.ctx.run_parallel(jobs, &stage_dir).await {
            tally.record(outcome);
        }
        let findings: usize = tally.outcomes().iter().map(|o| o.count).sum();

        tracing::info!(
            "Content summary: {} URLs fuzzed, {} paths found ({})",
            urls.len(),
            findings,
            stage_dir.display()
        );

        Ok(tally
            .into_result(&stage_dir)
            .with("urls_fuzzed", urls.len())
            .with("findings", findings)
            .with("wordlist", path_value(&wordlist)))
    }
}
