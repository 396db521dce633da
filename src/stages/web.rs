use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;

use super::{Stage, StageContext, ToolJob, ToolTally, path_value, prepare_stage_dir};
use crate::core::errors::HawkeyeError;
use crate::core::models::{StageName, StageResult};
use crate::executors::ToolCommand;
use crate::utils::fs::{has_content, read_lines_lossy, write_sorted_lines};

pub const TOOLS: &[&str] = &["httpx", "katana", "gau"];

/// Stage 3: live host probing, crawling and archived URL collection.
pub struct WebStage {
    ctx: StageContext,
}

impl WebStage {
    pub fn new(ctx: StageContext) -> Result<Self, HawkeyeError> {
        ctx.require_any_tool(StageName::Web, TOOLS)?;
        Ok(Self { ctx })
    }

    fn httpx_command(&self, input: &Path, output: &Path) -> ToolCommand {
        let c = &self.ctx.config.concurrency;
        ToolCommand::new("httpx")
            .path_arg("-l", input)
            .path_arg("-o", output)
            .args(["-silent", "-follow-redirects", "-random-agent"])
            .arg("-timeout")
            .arg(c.timeout_secs.to_string())
            .arg("-rl")
            .arg(c.rate_limit.to_string())
            .arg("-threads")
            .arg(c.threads.to_string())
    }

    fn katana_command(&self, input: &Path, output: &Path) -> ToolCommand {
        let config = &self.ctx.config;
        let depth = if config.flags.deep { "5" } else { "3" };
        ToolCommand::new("katana")
            .path_arg("-list", input)
            .path_arg("-o", output)
            .args(["-silent", "-jc", "-kf", "all", "-d", depth])
            .arg("-rl")
            .arg(config.concurrency.rate_limit.to_string())
            .arg("-c")
            .arg(config.concurrency.threads.to_string())
    }

    fn gau_command(&self, domains: &[String], output: &Path) -> ToolCommand {
        ToolCommand::new("gau")
            .arg("--threads")
            .arg(self.ctx.config.concurrency.threads.to_string())
            .path_arg("--o", output)
            .args(domains.iter().cloned())
    }
}

#[async_trait]
impl Stage for WebStage {
    fn name(&self) -> StageName {
        StageName::Web
    }

    fn tools(&self) -> &'static [&'static str] {
        TOOLS
    }

    async fn execute(&self, work_dir: &Path) -> Result<StageResult> {
        let stage_dir = prepare_stage_dir(work_dir, StageName::Web)?;
        let mut tally = ToolTally::default();

        tracing::info!("Stage 3: Web Discovery");

        let scanning_dir = work_dir.join(StageName::Scanning.dir_name());
        let discovery_dir = work_dir.join(StageName::Discovery.dir_name());
        let candidates = [
            scanning_dir.join("naabu_output.txt"),
            discovery_dir.join("resolved_subdomains.txt"),
            discovery_dir.join("all_subdomains.txt"),
        ];
        let Some(hosts_file) = self.ctx.input_or_targets(&candidates, &stage_dir)? else {
            tracing::warn!("No hosts for httpx");
            return Ok(StageResult::skipped(&stage_dir, "no_hosts"));
        };

        let live_file = stage_dir.join("live_urls.txt");
        let mut live_hosts = 0;
        if self.ctx.should_run("httpx") {
            let cmd = self.httpx_command(&hosts_file, &live_file);
            live_hosts = self
                .ctx
                .run_counted(cmd, &stage_dir, &live_file, &mut tally)
                .await
                .unwrap_or(0);
        } else {
            tally.excluded("httpx");
        }

        let mut jobs = Vec::new();
        let katana_file = stage_dir.join("katana_urls.txt");
        if !self.ctx.should_run("katana") {
            tally.excluded("katana");
        } else if has_content(&live_file) {
            jobs.push(ToolJob::new(self.katana_command(&live_file, &katana_file), katana_file.clone()));
        } else {
            tally.no_input("katana");
        }

        let gau_file = stage_dir.join("gau_urls.txt");
        if !self.ctx.should_run("gau") {
            tally.excluded("gau");
        } else {
            let domains = self.ctx.config.target.hosts().unwrap_or_default();
            if domains.is_empty() {
                tally.no_input("gau");
            } else {
                jobs.push(ToolJob::new(self.gau_command(&domains, &gau_file), gau_file.clone()));
            }
        }

        for outcome in self.ctx.run_parallel(jobs, &stage_dir).await {
            tally.record(outcome);
        }

        let mut urls: BTreeSet<String> = BTreeSet::new();
        for file in [&live_file, &katana_file, &gau_file] {
            urls.extend(read_lines_lossy(file));
        }
        let urls_file = stage_dir.join("urls.txt");
        write_sorted_lines(&urls_file, &urls)?;

        tracing::info!(
            "Web summary: {} live hosts, {} unique URLs ({})",
            live_hosts,
            urls.len(),
            stage_dir.display()
        );

        Ok(tally
            .into_result(&stage_dir)
            .with("live_hosts", live_hosts)
            .with("total_urls", urls.len())
            .with("live_urls_file", path_value(&live_file))
            .with("urls_file", path_value(&urls_file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::core::models::{StageStatus, Target};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn stage_with(edit: impl FnOnce(&mut RunConfig)) -> WebStage {
        let mut config = RunConfig::for_target(Target::Host("example.com".to_string()));
        edit(&mut config);
        WebStage::new(StageContext::new(Arc::new(config))).unwrap()
    }

    #[test]
    fn test_katana_depth_follows_deep_flag() {
        let stage = stage_with(|c| c.flags.deep = true);
        let cmd = stage.katana_command(Path::new("live.txt"), Path::new("out.txt"));
        assert!(cmd.args.windows(2).any(|w| w == ["-d", "5"]));
    }

    #[test]
    fn test_gau_takes_domains_as_arguments() {
        let stage = stage_with(|_| {});
        let cmd = stage.gau_command(&["example.com".to_string()], Path::new("gau.txt"));
        assert_eq!(cmd.args.last().map(String::as_str), Some("example.com"));
    }

    #[tokio::test]
    async fn test_urls_file_written_when_tools_unavailable() {
        let dir = TempDir::new().unwrap();
        let stage = stage_with(|c| c.tools.only = vec!["katana".to_string()]);
        let result = stage.execute(dir.path()).await.unwrap();

        // httpx and gau excluded, katana has no live hosts to crawl
        assert_eq!(result.status, StageStatus::Skipped);
        assert_eq!(result.get("total_urls"), Some(&serde_json::json!(0)));
        assert!(dir.path().join("03-web/urls.txt").exists());

        let tools = result.get("tools").and_then(|t| t.as_array()).unwrap();
        let katana = tools.iter().find(|t| t["tool"] == "katana").unwrap();
        assert_eq!(katana["status"], "skipped");
        assert_eq!(katana["reason"], "no_input");
        assert_eq!(tools.len(), 3);
    }
}
