use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;

use super::{Stage, StageContext, ToolTally, path_value, prepare_stage_dir};
use crate::core::errors::HawkeyeError;
use crate::core::models::{StageName, StageResult};
use crate::executors::ToolCommand;
use crate::utils::fs::{has_content, read_lines_lossy, write_sorted_lines};

pub const TOOLS: &[&str] = &["naabu", "nmap"];

/// Stage 2: fast port discovery followed by service detection.
pub struct ScanningStage {
    ctx: StageContext,
}

impl ScanningStage {
    pub fn new(ctx: StageContext) -> Result<Self, HawkeyeError> {
        ctx.require_any_tool(StageName::Scanning, TOOLS)?;
        Ok(Self { ctx })
    }

    fn naabu_command(&self, input: &Path, output: &Path) -> ToolCommand {
        let config = &self.ctx.config;
        let ports = if config.flags.quick {
            ["-top-ports", "100"]
        } else {
            ["-p", "-"]
        };
        ToolCommand::new("naabu")
            .path_arg("-list", input)
            .path_arg("-o", output)
            .arg("-silent")
            .args(ports)
            .arg("-rate")
            .arg(config.concurrency.rate_limit.to_string())
            .arg("-c")
            .arg(config.concurrency.threads.to_string())
            .args(["-retries", "2"])
            .arg("-timeout")
            .arg(config.concurrency.timeout_secs.saturating_mul(1000).to_string())
    }

    fn nmap_command(&self, input: &Path, xml: &Path, text: &Path) -> ToolCommand {
        let flags = &self.ctx.config.flags;
        let mut cmd = ToolCommand::new("nmap").path_arg("-iL", input).arg("-sV");
        if flags.udp {
            tracing::warn!("UDP scan enabled, this will be very slow");
            cmd = cmd.arg("-sU");
        }
        cmd = if flags.stealth {
            cmd.args(["-T2", "--max-rate", "50"])
        } else {
            cmd.arg("-T4")
        };
        cmd = if flags.deep {
            cmd.args(["-sC", "--script", "vuln"])
        } else {
            cmd.arg("-sC")
        };
        cmd.arg("--open").path_arg("-oX", xml).path_arg("-oN", text)
    }
}

/// Unique hosts of `host:port` lines.
fn hosts_with_ports(lines: &[String]) -> BTreeSet<String> {
    lines
        .iter()
        .filter_map(|line| line.split_once(':'))
        .map(|(host, _)| host.trim().to_string())
        .filter(|host| !host.is_empty())
        .collect()
}

/// Open-port lines of nmap's normal output.
fn count_open_services(path: &Path) -> usize {
    read_lines_lossy(path)
        .iter()
        .filter(|line| (line.contains("/tcp") || line.contains("/udp")) && line.contains("open"))
        .count()
}

#[async_trait]
impl Stage for ScanningStage {
    fn name(&self) -> StageName {
        StageName::Scanning
    }

    fn tools(&self) -> &'static [&'static str] {
        TOOLS
    }

    async fn execute(&self, work_dir: &Path) -> Result<StageResult> {
        let stage_dir = prepare_stage_dir(work_dir, StageName::Scanning)?;
        let mut tally = ToolTally::default();

        tracing::info!("Stage 2: Port Scanning");

        let discovery_dir = work_dir.join(StageName::Discovery.dir_name());
        let candidates = [
            discovery_dir.join("resolved_subdomains.txt"),
            discovery_dir.join("all_subdomains.txt"),
        ];
        let Some(hosts_file) = self.ctx.input_or_targets(&candidates, &stage_dir)? else {
            tracing::warn!("No hosts to scan");
            return Ok(StageResult::skipped(&stage_dir, "no_hosts"));
        };
        let host_count = read_lines_lossy(&hosts_file).len();
        tracing::info!("Scanning {} hosts", host_count);

        let naabu_output = stage_dir.join("naabu_output.txt");
        let mut open_ports = 0;
        if self.ctx.should_run("naabu") {
            let cmd = self.naabu_command(&hosts_file, &naabu_output);
            open_ports = self
                .ctx
                .run_counted(cmd, &stage_dir, &naabu_output, &mut tally)
                .await
                .unwrap_or(0);
        } else {
            tally.excluded("naabu");
        }

        let mut services = 0;
        if self.ctx.should_run("nmap") {
            let nmap_input = if has_content(&naabu_output) {
                let hosts = hosts_with_ports(&read_lines_lossy(&naabu_output));
                let file = stage_dir.join("hosts_with_open_ports.txt");
                write_sorted_lines(&file, &hosts)?;
                tracing::info!("Scanning {} hosts with open ports", hosts.len());
                file
            } else {
                tracing::info!("Using all hosts for nmap scan");
                hosts_file.clone()
            };

            let xml = stage_dir.join("nmap_output.xml");
            let text = stage_dir.join("nmap_output.txt");
            let cmd = self.nmap_command(&nmap_input, &xml, &text);
            if self.ctx.run_counted(cmd, &stage_dir, &xml, &mut tally).await.is_some() {
                services = count_open_services(&text);
            }
        } else {
            tally.excluded("nmap");
        }

        tracing::info!(
            "Scanning summary: {} hosts, {} open ports, {} services ({})",
            host_count,
            open_ports,
            services,
            stage_dir.display()
        );

        Ok(tally
            .into_result(&stage_dir)
            .with("hosts_scanned", host_count)
            .with("total_open_ports", open_ports)
            .with("services_detected", services)
            .with("hosts_file", path_value(&hosts_file)))
    }
}
