use anyhow::{Context, Result};
use directories::BaseDirs;
use std::path::{Path, PathBuf};

use super::types::{
    ConcurrencyConfig, FeatureFlags, FileConfig, Mode, ReportFormat, RunConfig, ToolFilter,
    WordlistConfig,
};
use crate::cli::args::Cli;
use crate::core::errors::HawkeyeError;
use crate::core::models::Target;

const DEFAULT_CONFIG_PATHS: &[&str] = &["./hawkeye.yaml", "./config/hawkeye.yaml"];

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the file layer, trying a custom path first
    pub fn load_with_custom_path(custom_path: Option<&Path>) -> Result<FileConfig> {
        if let Some(path) = custom_path {
            if path.exists() {
                return Self::load_from_file(path)
                    .with_context(|| format!("Failed to load config from custom path: {:?}", path));
            }
            tracing::warn!("Custom config path does not exist: {:?}, falling back to defaults", path);
        }

        for path in Self::default_paths() {
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from: {:?}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {:#}", path, e);
                        continue;
                    }
                }
            }
        }

        tracing::debug!("No configuration file found, using default settings");
        Ok(FileConfig::default())
    }

    fn default_paths() -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
        if let Some(base) = BaseDirs::new() {
            paths.push(base.home_dir().join(".hawkeye").join("config.yaml"));
        }
        paths
    }

    fn load_from_file(path: &Path) -> Result<FileConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        // An empty document deserializes to unit, not a map.
        if content.trim().is_empty() {
            return Ok(FileConfig::default());
        }

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {:?}", path))
    }

    /// Merge defaults, the file layer and CLI overrides into the run configuration
    pub fn resolve(cli: &Cli) -> Result<RunConfig> {
        let file = Self::load_with_custom_path(cli.config.as_deref())?;
        let config = build_run_config(cli, file)?;
        Ok(config)
    }
}

pub fn build_run_config(cli: &Cli, file: FileConfig) -> Result<RunConfig, HawkeyeError> {
    let target = match (&cli.target, &cli.target_list) {
        (Some(host), _) => Target::Host(host.trim().to_string()),
        (None, Some(list)) => Target::List(list.clone()),
        (None, None) => return Err(HawkeyeError::Config("a target or target list is required".into())),
    };

    let defaults = RunConfig::for_target(target.clone());

    let mode = match (cli.mode, file.mode.as_deref()) {
        (Some(mode), _) => mode,
        (None, Some(name)) => Mode::from_name(name),
        (None, None) => defaults.mode,
    };

    let mut tier = cli.wordlist.or(file.wordlist_tier).unwrap_or(defaults.wordlists.tier);
    if cli.quick {
        tier = 1;
    }
    if cli.deep {
        tier = 3;
    }

    let concurrency = ConcurrencyConfig {
        threads: cli.threads.or(file.threads).unwrap_or(defaults.concurrency.threads),
        rate_limit: cli.rate.or(file.rate_limit).unwrap_or(defaults.concurrency.rate_limit),
        timeout_secs: cli.timeout.or(file.timeout).unwrap_or(defaults.concurrency.timeout_secs),
        tool_timeout_secs: file.tool_timeout.unwrap_or(defaults.concurrency.tool_timeout_secs),
        workers: cli.workers.or(file.workers).unwrap_or(defaults.concurrency.workers),
    };

    let flags = FeatureFlags {
        quick: cli.quick && !cli.deep,
        deep: cli.deep,
        stealth: cli.stealth || file.stealth.unwrap_or(false),
        udp: cli.udp || file.udp_scan.unwrap_or(false),
        interactive: cli.interactive || file.interactive.unwrap_or(false),
        resume: cli.resume,
    };

    let tools = ToolFilter {
        skip: if cli.skip.is_empty() { file.skip_tools.unwrap_or_default() } else { cli.skip.clone() },
        only: if cli.only.is_empty() { file.only_tools.unwrap_or_default() } else { cli.only.clone() },
    };

    let requested_formats = if cli.format.is_empty() {
        file.report_format.unwrap_or(defaults.report_formats)
    } else {
        cli.format.clone()
    };

    let config = RunConfig {
        target,
        mode,
        concurrency,
        flags,
        tools,
        wordlists: WordlistConfig {
            tier,
            dir: file.wordlist_dir.unwrap_or(defaults.wordlists.dir),
            custom: file.custom_wordlists,
        },
        output_dir: cli.output.clone().or(file.output_dir).unwrap_or(defaults.output_dir),
        report_formats: ReportFormat::expand(&requested_formats),
        notify: if cli.notify.is_empty() { file.notify.unwrap_or_default() } else { cli.notify.clone() },
    };

    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &RunConfig) -> Result<(), HawkeyeError> {
    let invalid = |msg: &str| Err(HawkeyeError::Config(msg.to_string()));

    match &config.target {
        Target::Host(host) if host.is_empty() => return invalid("target cannot be empty"),
        Target::List(path) if !path.is_file() => {
            return Err(HawkeyeError::Config(format!("target list not found: {}", path.display())));
        }
        _ => {}
    }

    if config.concurrency.threads == 0 {
        return invalid("threads must be greater than 0");
    }
    if config.concurrency.rate_limit == 0 {
        return invalid("rate_limit must be greater than 0");
    }
    if config.concurrency.timeout_secs == 0 {
        return invalid("timeout must be greater than 0");
    }
    if config.concurrency.tool_timeout_secs == 0 {
        return invalid("tool_timeout must be greater than 0");
    }
    if config.concurrency.workers == 0 {
        return invalid("workers must be greater than 0");
    }
    if !(1..=3).contains(&config.wordlists.tier) {
        return invalid("wordlist_tier must be between 1 and 3");
    }
    if config.report_formats.is_empty() {
        return invalid("at least one report format is required");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::NotifyTarget;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::NamedTempFile;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["hawkeye"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = build_run_config(&cli(&["-t", "example.com"]), FileConfig::default()).unwrap();
        assert_eq!(config.mode, Mode::Full);
        assert_eq!(config.wordlists.tier, 2);
        assert_eq!(config.concurrency.threads, 50);
        assert_eq!(config.concurrency.rate_limit, 150);
        assert_eq!(config.concurrency.workers, 5);
        assert_eq!(config.report_formats, vec![ReportFormat::Txt, ReportFormat::Html]);
        assert_eq!(config.output_dir, PathBuf::from("./hawkeye-output"));
        assert!(!config.flags.resume);
    }

    #[test]
    fn test_cli_overrides_file() {
        let file: FileConfig = serde_yaml::from_str(
            r#"
mode: passive
threads: 10
rate_limit: 20
skip_tools: [nuclei]
report_format: [json]
notify: [slack]
"#,
        )
        .unwrap();
        let config = build_run_config(&cli(&["-t", "example.com", "-m", "active", "--threads", "99"]), file).unwrap();
        assert_eq!(config.mode, Mode::Active);
        assert_eq!(config.concurrency.threads, 99);
        assert_eq!(config.concurrency.rate_limit, 20);
        assert_eq!(config.tools.skip, vec!["nuclei"]);
        assert_eq!(config.report_formats, vec![ReportFormat::Json]);
        assert_eq!(config.notify, vec![NotifyTarget::Slack]);
    }

    #[test]
    fn test_unknown_file_mode_is_full() {
        let file = FileConfig {
            mode: Some("everything".to_string()),
            ..FileConfig::default()
        };
        let config = build_run_config(&cli(&["-t", "example.com"]), file).unwrap();
        assert_eq!(config.mode, Mode::Full);
    }

    #[test]
    fn test_quick_and_deep_are_explicit_fields() {
        let quick = build_run_config(&cli(&["-t", "a.com", "-q"]), FileConfig::default()).unwrap();
        assert!(quick.flags.quick);
        assert_eq!(quick.wordlists.tier, 1);

        let both = build_run_config(&cli(&["-t", "a.com", "-q", "-d"]), FileConfig::default()).unwrap();
        assert!(both.flags.deep);
        assert!(!both.flags.quick);
        assert_eq!(both.wordlists.tier, 3);
    }

    #[test]
    fn test_format_all_expands() {
        let config = build_run_config(&cli(&["-t", "a.com", "-f", "all"]), FileConfig::default()).unwrap();
        assert_eq!(config.report_formats, ReportFormat::CONCRETE.to_vec());
    }

    #[test]
    fn test_validation_errors() {
        let err = build_run_config(&cli(&["-t", "a.com", "--workers", "0"]), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("workers must be greater than 0"));

        let err = build_run_config(&cli(&["-L", "/definitely/missing.txt"]), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("target list not found"));
    }

    #[test]
    fn test_load_custom_config() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(
            &temp_file,
            r#"
wordlist_tier: 3
stealth: true
custom_wordlists:
  directories: /opt/lists/dirs.txt
"#,
        )
        .unwrap();

        let file = ConfigLoader::load_with_custom_path(Some(temp_file.path())).unwrap();
        assert_eq!(file.wordlist_tier, Some(3));
        assert_eq!(file.stealth, Some(true));
        assert_eq!(file.custom_wordlists.directories, Some(PathBuf::from("/opt/lists/dirs.txt")));
    }

    #[test]
    fn test_invalid_custom_config_is_an_error() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(&temp_file, "threads: [not, a, number]").unwrap();
        assert!(ConfigLoader::load_with_custom_path(Some(temp_file.path())).is_err());
    }

    #[test]
    fn test_empty_config_file_is_default() {
        let temp_file = NamedTempFile::new().unwrap();
        let file = ConfigLoader::load_with_custom_path(Some(temp_file.path())).unwrap();
        assert!(file.mode.is_none());
    }
}
