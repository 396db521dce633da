use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::{Stage, StageContext, ToolTally, path_value, prepare_stage_dir};
use crate::core::errors::HawkeyeError;
use crate::core::models::{StageName, StageResult};
use crate::executors::ToolCommand;
use crate::utils::fs::read_lines_lossy;

pub const TOOLS: &[&str] = &["nuclei"];
const TEMPLATE_UPDATE_TIMEOUT: Duration = Duration::from_secs(300);

/// Stage 5: template-driven vulnerability scanning.
pub struct VulnerabilityStage {
    ctx: StageContext,
}

impl VulnerabilityStage {
    pub fn new(ctx: StageContext) -> Result<Self, HawkeyeError> {
        ctx.require_any_tool(StageName::Vulnerability, TOOLS)?;
        Ok(Self { ctx })
    }

    fn severity(&self) -> &'static str {
        let flags = &self.ctx.config.flags;
        if flags.quick {
            "critical,high"
        } else if flags.deep {
            "critical,high,medium,low,info"
        } else {
            "critical,high,medium"
        }
    }

    fn nuclei_command(&self, input: &Path, output: &Path) -> ToolCommand {
        let config = &self.ctx.config;
        let mut cmd = ToolCommand::new("nuclei")
            .path_arg("-list", input)
            .path_arg("-o", output)
            .args(["-silent", "-jsonl"])
            .arg("-severity")
            .arg(self.severity());
        if config.flags.deep {
            cmd = cmd.args(["-tags", "cve,exposure,misconfig,vuln"]);
        }
        cmd.arg("-rate-limit")
            .arg(config.concurrency.rate_limit.to_string())
            .arg("-c")
            .arg(config.concurrency.threads.to_string())
    }

    async fn update_templates(&self, cwd: &Path) {
        let cmd = ToolCommand::new("nuclei")
            .args(["-update-templates", "-silent"])
            .timeout(TEMPLATE_UPDATE_TIMEOUT);
        if let Err(e) = self.ctx.tools.run(&cmd, cwd).await {
            tracing::warn!("Template update failed, scanning with installed templates: {}", e);
        }
    }
}

/// Findings per `info.severity` of a nuclei JSONL report.
fn count_by_severity(path: &Path) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for line in read_lines_lossy(path) {
        let Ok(finding) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let severity = finding
            .pointer("/info/severity")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_ascii_lowercase();
        *counts.entry(severity).or_insert(0) += 1;
    }
    counts
}

#[async_trait]
impl Stage for VulnerabilityStage {
    fn name(&self) -> StageName {
        StageName::Vulnerability
    }

    fn tools(&self) -> &'static [&'static str] {
        TOOLS
    }

    async fn execute(&self, work_dir: &Path) -> Result<StageResult> {
        let stage_dir = prepare_stage_dir(work_dir, StageName::Vulnerability)?;
        let mut tally = ToolTally::default();

        tracing::info!("Stage 5: Vulnerability Scanning");

        let web_dir = work_dir.join(StageName::Web.dir_name());
        let candidates = [web_dir.join("urls.txt"), web_dir.join("live_urls.txt")];
        let Some(input) = self.ctx.input_or_targets(&candidates, &stage_dir)? else {
            tracing::warn!("No URLs to scan");
            return Ok(StageResult::skipped(&stage_dir, "no_input"));
        };

        let output = stage_dir.join("nuclei_results.jsonl");
        let mut severities = BTreeMap::new();
        if self.ctx.tools.is_installed("nuclei") {
            self.update_templates(&stage_dir).await;
        }
        let cmd = self.nuclei_command(&input, &output);
        if self.ctx.run_counted(cmd, &stage_dir, &output, &mut tally).await.is_some() {
            severities = count_by_severity(&output);
        }
        let total: usize = severities.values().sum();

        tracing::info!(
            "Vulnerability summary: {} findings {:?} ({})",
            total,
            severities,
            stage_dir.display()
        );

        let by_severity: Map<String, Value> = severities
            .into_iter()
            .map(|(severity, count)| (severity, Value::from(count)))
            .collect();

        Ok(tally
            .into_result(&stage_dir)
            .with("total_findings", total)
            .with("by_severity", Value::Object(by_severity))
            .with("results_file", path_value(&output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::config::types::ToolFilter;
    use crate::core::models::Target;
    use rstest::rstest;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn stage_with(quick: bool, deep: bool) -> VulnerabilityStage {
        let mut config = RunConfig::for_target(Target::Host("example.com".to_string()));
        config.flags.quick = quick;
        config.flags.deep = deep;
        VulnerabilityStage::new(StageContext::new(Arc::new(config))).unwrap()
    }

    #[rstest]
    #[case(true, false, "critical,high")]
    #[case(false, true, "critical,high,medium,low,info")]
    #[case(false, false, "critical,high,medium")]
    fn test_severity_selection(#[case] quick: bool, #[case] deep: bool, #[case] expected: &str) {
        assert_eq!(stage_with(quick, deep).severity(), expected);
    }

    #[test]
    fn test_deep_adds_tags() {
        let cmd = stage_with(false, true).nuclei_command(Path::new("u.txt"), Path::new("o.jsonl"));
        assert!(cmd.args.windows(2).any(|w| w == ["-tags", "cve,exposure,misconfig,vuln"]));
    }

    #[test]
    fn test_count_by_severity() {
        let dir = TempDir::new().unwrap();
        let report = dir.path().join("nuclei_results.jsonl");
        std::fs::write(
            &report,
            concat!(
                r#"{"template-id":"a","info":{"severity":"high"}}"#,
                "\n",
                r#"{"template-id":"b","info":{"severity":"HIGH"}}"#,
                "\n",
                r#"{"template-id":"c","info":{"severity":"low"}}"#,
                "\n",
                "[INF] stats line\n",
            ),
        )
        .unwrap();

        let counts = count_by_severity(&report);
        assert_eq!(counts.get("high"), Some(&2));
        assert_eq!(counts.get("low"), Some(&1));
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn test_unavailable_when_nuclei_skipped() {
        let mut config = RunConfig::for_target(Target::Host("example.com".to_string()));
        config.tools = ToolFilter {
            skip: vec!["nuclei".to_string()],
            only: vec![],
        };
        let result = VulnerabilityStage::new(StageContext::new(Arc::new(config)));
        assert!(matches!(result, Err(HawkeyeError::StageUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_missing_nuclei_marks_stage_failed() {
        if crate::executors::toolchain::is_installed("nuclei") {
            return;
        }
        let dir = TempDir::new().unwrap();
        let result = stage_with(false, false).execute(dir.path()).await.unwrap();
        assert_eq!(result.status, crate::core::models::StageStatus::Failed);
        assert!(dir.path().join("05-vulnerability/targets.txt").exists());
    }
}
