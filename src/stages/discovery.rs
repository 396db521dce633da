use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;

use super::{Stage, StageContext, ToolTally, path_value, prepare_stage_dir};
use crate::core::errors::HawkeyeError;
use crate::core::models::{StageName, StageResult, Target};
use crate::executors::ToolCommand;
use crate::utils::fs::{has_content, read_lines_lossy, write_sorted_lines};

pub const TOOLS: &[&str] = &["subfinder", "puredns", "dnsx"];

/// Stage 1: subdomain enumeration, resolution and DNS enrichment.
pub struct DiscoveryStage {
    ctx: StageContext,
}

impl DiscoveryStage {
    pub fn new(ctx: StageContext) -> Result<Self, HawkeyeError> {
        ctx.require_any_tool(StageName::Discovery, TOOLS)?;
        Ok(Self { ctx })
    }

    fn subfinder_command(&self, output: &Path) -> ToolCommand {
        let config = &self.ctx.config;
        let cmd = match &config.target {
            Target::Host(host) => ToolCommand::new("subfinder").arg("-d").arg(host.as_str()),
            Target::List(path) => ToolCommand::new("subfinder").path_arg("-dL", path),
        };
        cmd.path_arg("-o", output)
            .arg("-silent")
            .arg("-rl")
            .arg(config.concurrency.rate_limit.to_string())
    }
}

#[async_trait]
impl Stage for DiscoveryStage {
    fn name(&self) -> StageName {
        StageName::Discovery
    }

    fn tools(&self) -> &'static [&'static str] {
        TOOLS
    }

    async fn execute(&self, work_dir: &Path) -> Result<StageResult> {
        let stage_dir = prepare_stage_dir(work_dir, StageName::Discovery)?;
        let mut tally = ToolTally::default();

        tracing::info!("Stage 1: Subdomain Discovery");
        tracing::info!("Target: {}", self.ctx.config.target);

        let mut subdomains: BTreeSet<String> = BTreeSet::new();

        if self.ctx.should_run("subfinder") {
            let output = stage_dir.join("subfinder.txt");
            let cmd = self.subfinder_command(&output);
            if self.ctx.run_counted(cmd, &stage_dir, &output, &mut tally).await.is_some() {
                subdomains.extend(read_lines_lossy(&output));
            }
        } else {
            tally.excluded("subfinder");
        }

        let all_file = stage_dir.join("all_subdomains.txt");
        write_sorted_lines(&all_file, &subdomains)?;
        if subdomains.is_empty() {
            tracing::warn!("No subdomains discovered");
        } else {
            tracing::info!("Total subdomains found: {}", subdomains.len());
        }

        let resolved_file = stage_dir.join("resolved_subdomains.txt");
        if self.ctx.should_run("puredns") && !subdomains.is_empty() {
            let cmd = ToolCommand::new("puredns")
                .arg("resolve")
                .arg(all_file.display().to_string())
                .path_arg("-w", &resolved_file)
                .arg("--skip-wildcard-filter");
            self.ctx.run_counted(cmd, &stage_dir, &resolved_file, &mut tally).await;
        } else {
            if self.ctx.should_run("puredns") {
                tally.no_input("puredns");
            } else {
                tally.excluded("puredns");
            }
            if !subdomains.is_empty() {
                write_sorted_lines(&resolved_file, &subdomains)?;
            }
        }

        if self.ctx.should_run("dnsx") {
            if has_content(&resolved_file) {
                let output = stage_dir.join("dnsx_output.txt");
                let cmd = ToolCommand::new("dnsx")
                    .path_arg("-l", &resolved_file)
                    .args(["-a", "-cname", "-resp", "-silent"])
                    .path_arg("-o", &output);
                self.ctx.run_counted(cmd, &stage_dir, &output, &mut tally).await;
            } else {
                tally.no_input("dnsx");
            }
        } else {
            tally.excluded("dnsx");
        }

        let resolved = read_lines_lossy(&resolved_file).len();

        tracing::info!(
            "Discovery summary: {} subdomains, {} resolved ({})",
            subdomains.len(),
            resolved,
            stage_dir.display()
        );

        Ok(tally
            .into_result(&stage_dir)
            .with("total_subdomains", subdomains.len())
            .with("resolved_subdomains", resolved)
            .with("subdomains_file", path_value(&all_file))
            .with("resolved_file", path_value(&resolved_file)))
    }
}
