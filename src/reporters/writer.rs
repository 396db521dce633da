use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use super::RunReport;
use crate::config::ReportFormat;
use crate::core::models::RunDirs;
use crate::core::pipeline::ReportSink;
use crate::utils::fs::atomic_write;

const TXT_TEMPLATE: &str = include_str!("../../templates/txt/report.txt.j2");
const MD_TEMPLATE: &str = include_str!("../../templates/markdown/report.md.j2");
const HTML_TEMPLATE: &str = include_str!("../../templates/html/report.html.j2");
const CSV_TEMPLATE: &str = include_str!("../../templates/csv/report.csv.j2");

/// Writes `report.<ext>` into the run directory for each requested format.
pub struct FileReporter {
    dirs: RunDirs,
    formats: Vec<ReportFormat>,
    env: Environment<'static>,
}

#[derive(Debug, Serialize)]
struct StageRow {
    name: String,
    status: String,
    stage_dir: String,
    details: Vec<(String, String)>,
    tools: Vec<Value>,
}

impl FileReporter {
    pub fn new(dirs: RunDirs, formats: &[ReportFormat]) -> Result<Self> {
        let mut env = Environment::new();

        env.add_filter("format_duration", |value: f64| {
            if value < 60.0 {
                format!("{:.1}s", value)
            } else if value < 3600.0 {
                format!("{:.1}m", value / 60.0)
            } else {
                format!("{:.1}h", value / 3600.0)
            }
        });
        env.add_filter("csv", |value: String| format!("\"{}\"", value.replace('"', "\"\"")));

        env.add_template("report.txt", TXT_TEMPLATE)?;
        env.add_template("report.md", MD_TEMPLATE)?;
        env.add_template("report.html", HTML_TEMPLATE)?;
        env.add_template("report.csv", CSV_TEMPLATE)?;

        Ok(Self {
            dirs,
            formats: ReportFormat::expand(formats),
            env,
        })
    }

    fn render(&self, format: ReportFormat, report: &RunReport<'_>) -> Result<String> {
        if format == ReportFormat::Json {
            return serde_json::to_string_pretty(report).context("Failed to serialize JSON report");
        }

        let name = format!("report.{}", format.extension());
        let template = self.env.get_template(&name)?;
        let rendered = template.render(context! {
            target => &report.target,
            mode => report.config.mode.as_str(),
            start_time => &report.start_time,
            end_time => &report.end_time,
            duration_seconds => report.duration_seconds,
            run_dir => self.dirs.root.display().to_string(),
            stages => stage_rows(report),
            version => env!("CARGO_PKG_VERSION"),
        })?;
        Ok(rendered)
    }
}

impl ReportSink for FileReporter {
    fn write(&self, report: &RunReport<'_>) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let content = self
                .render(*format, report)
                .with_context(|| format!("Failed to render {} report", format.extension()))?;
            let path = self.dirs.report_file(format.extension());
            atomic_write(&path, content.as_bytes())?;
            tracing::info!("Report written: {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}

fn stage_rows(report: &RunReport<'_>) -> Vec<StageRow> {
    report
        .results
        .iter()
        .map(|(name, result)| {
            let details = result
                .payload
                .iter()
                .filter(|(key, _)| key.as_str() != "tools")
                .map(|(key, value)| (key.clone(), display_value(value)))
                .collect();
            let tools = result
                .get("tools")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            StageRow {
                name: name.to_string(),
                status: result.status.to_string(),
                stage_dir: result.stage_dir.display().to_string(),
                details,
                tools,
            }
        })
        .collect()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", k, display_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::core::models::{StageName, StageResult, StageStatus, Target};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_results() -> BTreeMap<StageName, StageResult> {
        let mut results = BTreeMap::new();
        results.insert(
            StageName::Discovery,
            StageResult::new(StageStatus::Success, "/runs/example.com/01-discovery")
                .with("total_subdomains", 12)
                .with("tools", serde_json::json!([{"tool": "subfinder", "status": "success", "count": 12}])),
        );
        results.insert(
            StageName::Content,
            StageResult::skipped("/runs/example.com/04-content", "no_wordlist"),
        );
        results
    }

    fn write_formats(formats: &[ReportFormat]) -> (TempDir, Vec<PathBuf>) {
        let dir = TempDir::new().unwrap();
        let target = Target::Host("example.com".to_string());
        let dirs = RunDirs::new(dir.path(), &target);
        let config = RunConfig::for_target(target);
        let results = sample_results();
        let report = RunReport {
            target: "example.com".to_string(),
            start_time: "2026-01-01T10:00:00+00:00".to_string(),
            end_time: "2026-01-01T10:02:00+00:00".to_string(),
            duration_seconds: 120.0,
            results: &results,
            config: &config,
        };
        let written = FileReporter::new(dirs, formats).unwrap().write(&report).unwrap();
        (dir, written)
    }

    #[test]
    fn test_writes_every_format_for_all() {
        let (dir, written) = write_formats(&[ReportFormat::All]);
        assert_eq!(written.len(), 5);
        for ext in ["txt", "json", "html", "md", "csv"] {
            assert!(dir.path().join(format!("example.com/report.{}", ext)).exists());
        }
    }

    #[test]
    fn test_text_report_lists_stages() {
        let (_dir, written) = write_formats(&[ReportFormat::Txt]);
        let text = std::fs::read_to_string(&written[0]).unwrap();
        assert!(text.contains("[SUCCESS] discovery"));
        assert!(text.contains("total_subdomains: 12"));
        assert!(text.contains("reason: no_wordlist"));
        assert!(text.contains("2.0m"));
    }

    #[test]
    fn test_json_report_round_trips() {
        let (_dir, written) = write_formats(&[ReportFormat::Json]);
        let value: Value = serde_json::from_str(&std::fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(value["target"], "example.com");
        assert_eq!(value["results"]["discovery"]["status"], "success");
        assert_eq!(value["config"]["mode"], "full");
    }

    #[test]
    fn test_csv_report_has_one_row_per_stage() {
        let (_dir, written) = write_formats(&[ReportFormat::Csv]);
        let csv = std::fs::read_to_string(&written[0]).unwrap();
        let rows: Vec<&str> = csv.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(rows[0], "stage,status,stage_dir");
        assert_eq!(rows[1], r#""discovery","success","/runs/example.com/01-discovery""#);
        assert_eq!(rows.len(), 3);
    }
}
