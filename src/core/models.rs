use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::utils::time::sanitize_target;

/// The five pipeline stages, in their canonical execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Discovery,
    Scanning,
    Web,
    Content,
    Vulnerability,
}

impl StageName {
    pub const ALL: [StageName; 5] = [
        StageName::Discovery,
        StageName::Scanning,
        StageName::Web,
        StageName::Content,
        StageName::Vulnerability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Discovery => "discovery",
            StageName::Scanning => "scanning",
            StageName::Web => "web",
            StageName::Content => "content",
            StageName::Vulnerability => "vulnerability",
        }
    }

    /// Subdirectory of the run directory owned by this stage.
    pub fn dir_name(&self) -> &'static str {
        match self {
            StageName::Discovery => "01-discovery",
            StageName::Scanning => "02-scanning",
            StageName::Web => "03-web",
            StageName::Content => "04-content",
            StageName::Vulnerability => "05-vulnerability",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageName::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Partial,
    Skipped,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::Partial => "partial",
            StageStatus::Skipped => "skipped",
            StageStatus::Failed => "failed",
        }
    }

    /// Folds per-tool success flags into a stage status.
    pub fn from_tool_results(succeeded: usize, attempted: usize) -> Self {
        if attempted == 0 {
            StageStatus::Skipped
        } else if succeeded == attempted {
            StageStatus::Success
        } else if succeeded == 0 {
            StageStatus::Failed
        } else {
            StageStatus::Partial
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform outcome record returned by every stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub status: StageStatus,
    pub payload: Map<String, Value>,
    pub stage_dir: PathBuf,
}

impl StageResult {
    pub fn new(status: StageStatus, stage_dir: impl Into<PathBuf>) -> Self {
        Self {
            status,
            payload: Map::new(),
            stage_dir: stage_dir.into(),
        }
    }

    pub fn skipped(stage_dir: impl Into<PathBuf>, reason: &str) -> Self {
        Self::new(StageStatus::Skipped, stage_dir).with("reason", reason)
    }

    pub fn failed(stage_dir: impl Into<PathBuf>, error: impl fmt::Display) -> Self {
        Self::new(StageStatus::Failed, stage_dir).with("error", error.to_string())
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.payload.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Single host or domain.
    Host(String),
    /// File with one host per line.
    List(PathBuf),
}

impl Target {
    /// Filesystem-safe name used for the run directory.
    pub fn safe_name(&self) -> String {
        match self {
            Target::Host(host) => sanitize_target(host),
            Target::List(path) => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "targets".to_string());
                sanitize_target(&stem)
            }
        }
    }

    /// Hosts named by this target, reading the list file if needed.
    pub fn hosts(&self) -> std::io::Result<Vec<String>> {
        match self {
            Target::Host(host) => Ok(vec![host.clone()]),
            Target::List(path) => crate::utils::fs::read_lines(path),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Host(host) => f.write_str(host),
            Target::List(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunDirs {
    pub root: PathBuf, // <output_dir>/<safe_target>
}

impl RunDirs {
    pub fn new(output_dir: &Path, target: &Target) -> Self {
        Self {
            root: output_dir.join(target.safe_name()),
        }
    }

    pub fn report_file(&self, extension: &str) -> PathBuf {
        self.root.join(format!("report.{}", extension))
    }
}
