use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::models::Target;

/// Operator-selected subset of stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Subdomain discovery only
    Discover,
    /// Port scanning only
    Scan,
    /// Web application discovery only
    Web,
    /// Directory/file discovery only
    Content,
    /// Vulnerability scanning only
    Vuln,
    /// Passive recon (discover only)
    Passive,
    /// Active recon (scan + web + content)
    Active,
    /// Complete reconnaissance (all stages)
    Full,
}

impl Mode {
    pub const ALL: [Mode; 8] = [
        Mode::Discover,
        Mode::Scan,
        Mode::Web,
        Mode::Content,
        Mode::Vuln,
        Mode::Passive,
        Mode::Active,
        Mode::Full,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Discover => "discover",
            Mode::Scan => "scan",
            Mode::Web => "web",
            Mode::Content => "content",
            Mode::Vuln => "vuln",
            Mode::Passive => "passive",
            Mode::Active => "active",
            Mode::Full => "full",
        }
    }

    /// Parses a mode name; anything unrecognized falls back to `Full`.
    pub fn from_name(name: &str) -> Mode {
        let normalized = name.trim().to_ascii_lowercase();
        match Mode::ALL.into_iter().find(|m| m.as_str() == normalized) {
            Some(mode) => mode,
            None => {
                tracing::warn!("Unknown mode '{}', running the full pipeline", name);
                Mode::Full
            }
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Txt,
    Json,
    Html,
    Md,
    Csv,
    /// Every format above
    All,
}

impl ReportFormat {
    pub const CONCRETE: [ReportFormat; 5] = [
        ReportFormat::Txt,
        ReportFormat::Json,
        ReportFormat::Html,
        ReportFormat::Md,
        ReportFormat::Csv,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Txt => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Html => "html",
            ReportFormat::Md => "md",
            ReportFormat::Csv => "csv",
            ReportFormat::All => "all",
        }
    }

    /// Expands `All`, drops duplicates, keeps first-seen order.
    pub fn expand(requested: &[ReportFormat]) -> Vec<ReportFormat> {
        if requested.contains(&ReportFormat::All) {
            return Self::CONCRETE.to_vec();
        }
        let mut formats = Vec::new();
        for format in requested {
            if !formats.contains(format) {
                formats.push(*format);
            }
        }
        formats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NotifyTarget {
    Slack,
    Discord,
    Telegram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordlistKind {
    Subdomains,
    Directories,
    Files,
    Parameters,
}

impl WordlistKind {
    pub const ALL: [WordlistKind; 4] = [
        WordlistKind::Subdomains,
        WordlistKind::Directories,
        WordlistKind::Files,
        WordlistKind::Parameters,
    ];

    pub fn file_stem(&self) -> &'static str {
        match self {
            WordlistKind::Subdomains => "subdomains",
            WordlistKind::Directories => "directories",
            WordlistKind::Files => "files",
            WordlistKind::Parameters => "parameters",
        }
    }
}

/// On-disk configuration. Every key is optional; missing keys take defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub mode: Option<String>,
    pub wordlist_tier: Option<u8>,
    pub threads: Option<usize>,
    pub rate_limit: Option<u32>,
    pub timeout: Option<u64>,
    pub tool_timeout: Option<u64>,
    pub workers: Option<usize>,
    pub udp_scan: Option<bool>,
    pub stealth: Option<bool>,
    pub interactive: Option<bool>,
    pub output_dir: Option<PathBuf>,
    pub report_format: Option<Vec<ReportFormat>>,
    pub skip_tools: Option<Vec<String>>,
    pub only_tools: Option<Vec<String>>,
    pub notify: Option<Vec<NotifyTarget>>,
    pub custom_wordlists: CustomWordlists,
    pub wordlist_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CustomWordlists {
    pub subdomains: Option<PathBuf>,
    pub directories: Option<PathBuf>,
    pub files: Option<PathBuf>,
    pub parameters: Option<PathBuf>,
}

impl CustomWordlists {
    fn get(&self, kind: WordlistKind) -> Option<&Path> {
        match kind {
            WordlistKind::Subdomains => self.subdomains.as_deref(),
            WordlistKind::Directories => self.directories.as_deref(),
            WordlistKind::Files => self.files.as_deref(),
            WordlistKind::Parameters => self.parameters.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConcurrencyConfig {
    /// Threads handed to each external tool.
    pub threads: usize,
    /// Requests per second handed to each external tool.
    pub rate_limit: u32,
    /// Per-request timeout handed to each external tool, in seconds.
    pub timeout_secs: u64,
    /// Wall-clock limit for one external command, in seconds.
    pub tool_timeout_secs: u64,
    /// Worker bound of the in-stage task runner.
    pub workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            threads: 50,
            rate_limit: 150,
            timeout_secs: 10,
            tool_timeout_secs: 3600,
            workers: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureFlags {
    pub quick: bool,
    pub deep: bool,
    pub stealth: bool,
    pub udp: bool,
    pub interactive: bool,
    pub resume: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolFilter {
    pub skip: Vec<String>,
    pub only: Vec<String>,
}

impl ToolFilter {
    pub fn allows(&self, tool: &str) -> bool {
        if !self.only.is_empty() && !self.only.iter().any(|t| t == tool) {
            return false;
        }
        !self.skip.iter().any(|t| t == tool)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordlistConfig {
    pub tier: u8,
    pub dir: PathBuf,
    pub custom: CustomWordlists,
}

/// Run-wide settings, resolved once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    pub target: Target,
    pub mode: Mode,
    pub concurrency: ConcurrencyConfig,
    pub flags: FeatureFlags,
    pub tools: ToolFilter,
    pub wordlists: WordlistConfig,
    pub output_dir: PathBuf,
    pub report_formats: Vec<ReportFormat>,
    pub notify: Vec<NotifyTarget>,
}

impl RunConfig {
    /// Defaults for a target; mainly a starting point for tests.
    pub fn for_target(target: Target) -> Self {
        Self {
            target,
            mode: Mode::Full,
            concurrency: ConcurrencyConfig::default(),
            flags: FeatureFlags::default(),
            tools: ToolFilter::default(),
            wordlists: WordlistConfig {
                tier: 2,
                dir: PathBuf::from("./wordlists"),
                custom: CustomWordlists::default(),
            },
            output_dir: PathBuf::from("./hawkeye-output"),
            report_formats: vec![ReportFormat::Txt, ReportFormat::Html],
            notify: Vec::new(),
        }
    }

    pub fn tool_enabled(&self, tool: &str) -> bool {
        self.tools.allows(tool)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.concurrency.tool_timeout_secs)
    }

    /// Custom wordlist if it exists, else `<dir>/tier<N>/<kind>.txt` if it exists.
    pub fn wordlist_path(&self, kind: WordlistKind) -> Option<PathBuf> {
        if let Some(custom) = self.wordlists.custom.get(kind) {
            if custom.exists() {
                return Some(custom.to_path_buf());
            }
            tracing::warn!("Custom {} wordlist not found: {:?}", kind.file_stem(), custom);
        }

        let tiered = self
            .wordlists
            .dir
            .join(format!("tier{}", self.wordlists.tier))
            .join(format!("{}.txt", kind.file_stem()));
        tiered.exists().then_some(tiered)
    }
}
