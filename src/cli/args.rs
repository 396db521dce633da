use clap::{ArgAction, ArgGroup, Parser};
use std::path::PathBuf;

use crate::config::types::{Mode, NotifyTarget, ReportFormat};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "hawkeye",
    version,
    about = "HAWKEYE - Automated Reconnaissance Framework",
    group(ArgGroup::new("targets").required(true).multiple(true).args(["target", "target_list", "list_stages"]))
)]
pub struct Cli {
    /// Target domain (example.com)
    #[arg(short = 't', long = "target", conflicts_with = "target_list")]
    pub target: Option<String>,

    /// File with one target per line
    #[arg(short = 'L', long = "target-list")]
    pub target_list: Option<PathBuf>,

    /// Scan mode (default: full)
    #[arg(short = 'm', long = "mode", value_enum)]
    pub mode: Option<Mode>,

    /// Quick scan (minimal wordlists, top ports, high severities only)
    #[arg(short = 'q', long = "quick", action = ArgAction::SetTrue)]
    pub quick: bool,

    /// Deep scan (comprehensive wordlists, all severities)
    #[arg(short = 'd', long = "deep", action = ArgAction::SetTrue)]
    pub deep: bool,

    /// Output directory (default: ./hawkeye-output)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Wordlist tier: 1=minimal, 2=balanced, 3=full
    #[arg(short = 'w', long = "wordlist", value_parser = clap::value_parser!(u8).range(1..=3))]
    pub wordlist: Option<u8>,

    /// Report formats (default: txt html)
    #[arg(short = 'f', long = "format", value_enum, num_args = 1..)]
    pub format: Vec<ReportFormat>,

    /// Ask before each stage
    #[arg(long = "interactive", action = ArgAction::SetTrue)]
    pub interactive: bool,

    /// Resume from the last checkpoint
    #[arg(long = "resume", action = ArgAction::SetTrue)]
    pub resume: bool,

    /// Stealth mode (slower, quieter)
    #[arg(short = 's', long = "stealth", action = ArgAction::SetTrue)]
    pub stealth: bool,

    /// Skip specific tools (e.g. --skip ffuf nuclei)
    #[arg(long = "skip", num_args = 1..)]
    pub skip: Vec<String>,

    /// Only run specific tools (e.g. --only subfinder httpx)
    #[arg(long = "only", num_args = 1..)]
    pub only: Vec<String>,

    /// Enable UDP port scanning (slow)
    #[arg(long = "udp", action = ArgAction::SetTrue)]
    pub udp: bool,

    /// Threads handed to each tool
    #[arg(long = "threads")]
    pub threads: Option<usize>,

    /// Rate limit in requests per second
    #[arg(short = 'r', long = "rate")]
    pub rate: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long = "timeout")]
    pub timeout: Option<u64>,

    /// Concurrent tool invocations inside a stage
    #[arg(long = "workers")]
    pub workers: Option<usize>,

    /// Notification targets
    #[arg(short = 'n', long = "notify", value_enum, num_args = 1..)]
    pub notify: Vec<NotifyTarget>,

    /// Configuration file (YAML)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// List stages per mode and tool availability, then exit
    #[arg(long = "list-stages", action = ArgAction::SetTrue)]
    pub list_stages: bool,

    /// Verbose output, including dependency logs
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Debug logs (implies verbose)
    #[arg(long = "debug", action = ArgAction::SetTrue)]
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let cli = Cli::try_parse_from(["hawkeye", "-t", "example.com"]).unwrap();
        assert_eq!(cli.target.as_deref(), Some("example.com"));
        assert!(cli.mode.is_none());
        assert!(!cli.resume);
    }

    #[test]
    fn test_parse_full_flags() {
        let cli = Cli::try_parse_from([
            "hawkeye", "-t", "example.com", "-m", "active", "-f", "json", "md", "--skip", "nmap",
            "--resume", "--interactive", "-w", "3",
        ])
        .unwrap();
        assert_eq!(cli.mode, Some(Mode::Active));
        assert_eq!(cli.format, vec![ReportFormat::Json, ReportFormat::Md]);
        assert_eq!(cli.skip, vec!["nmap"]);
        assert_eq!(cli.wordlist, Some(3));
        assert!(cli.resume && cli.interactive);
    }

    #[test]
    fn test_target_required() {
        assert!(Cli::try_parse_from(["hawkeye"]).is_err());
        assert!(Cli::try_parse_from(["hawkeye", "--list-stages"]).is_ok());
    }

    #[test]
    fn test_target_and_list_conflict() {
        let result = Cli::try_parse_from(["hawkeye", "-t", "a.com", "-L", "hosts.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_wordlist_tier_range() {
        assert!(Cli::try_parse_from(["hawkeye", "-t", "a.com", "-w", "4"]).is_err());
    }
}
