//! Configuration for the notifier
//!
//! Resolved once at start-up: environment first, then CLI flags on top.
//! Empty environment values count as unset.

use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Cli;

pub const DEFAULT_CHANNEL: &str = "#kube-bench";
pub const DEFAULT_MAX_WAIT_SECS: u64 = 300;
pub const DEFAULT_MODEL: &str = "gpt-4";

/// What the process does once configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Watch a directory for kube-bench output
    Sidecar { output_dir: PathBuf },
    /// Send test messages and a sample report
    Test,
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Slack bot token; `None` only in dry runs
    pub slack_token: Option<String>,
    pub channel: String,
    pub mode: RunMode,
    pub max_wait: Duration,
    pub debug: bool,
    pub openai_api_key: Option<String>,
    pub model: String,
    pub report_dir: PathBuf,
    pub dry_run: bool,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No bot token and not a dry run
    MissingToken,
    /// A numeric variable did not parse
    InvalidNumber { name: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingToken => write!(
                f,
                "SLACK_BOT_TOKEN is required (use --dry-run to print payloads instead)"
            ),
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{} must be a whole number of seconds, got '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl NotifierConfig {
    /// Resolve from the process environment and parsed flags
    pub fn from_env(cli: &Cli) -> Result<Self, ConfigError> {
        Self::resolve(cli, |name| std::env::var(name).ok())
    }

    /// Resolve with an explicit variable lookup
    pub fn resolve<F>(cli: &Cli, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let dry_run = cli.dry_run;
        let slack_token = var("SLACK_BOT_TOKEN");
        if slack_token.is_none() && !dry_run {
            return Err(ConfigError::MissingToken);
        }

        let max_wait_secs = match cli.max_wait {
            Some(secs) => secs,
            None => match var("MAX_WAIT_TIME") {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                    name: "MAX_WAIT_TIME",
                    value: raw.clone(),
                })?,
                None => DEFAULT_MAX_WAIT_SECS,
            },
        };

        let test_mode = cli.test || var("TEST_MODE").is_some_and(|v| is_truthy(&v));
        let output_dir = cli
            .output_dir
            .clone()
            .or_else(|| var("KUBE_BENCH_OUTPUT_DIR").map(PathBuf::from));
        let mode = match output_dir {
            Some(output_dir) if !test_mode => RunMode::Sidecar { output_dir },
            _ => RunMode::Test,
        };

        Ok(Self {
            slack_token,
            channel: cli
                .channel
                .clone()
                .or_else(|| var("SLACK_CHANNEL"))
                .unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
            mode,
            max_wait: Duration::from_secs(max_wait_secs),
            debug: cli.debug || var("DEBUG").is_some_and(|v| is_truthy(&v)),
            openai_api_key: var("OPENAI_API_KEY"),
            model: cli
                .model
                .clone()
                .or_else(|| var("OPENAI_MODEL"))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            report_dir: cli
                .report_dir
                .clone()
                .or_else(|| var("REPORT_DIR").map(PathBuf::from))
                .unwrap_or_else(std::env::temp_dir),
            dry_run,
        })
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value == "1"
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_output_dir_run_test_mode() {
        let config =
            NotifierConfig::resolve(&Cli::default(), env(&[("SLACK_BOT_TOKEN", "xoxb-1")])).unwrap();

        assert_eq!(config.mode, RunMode::Test);
        assert_eq!(config.channel, DEFAULT_CHANNEL);
        assert_eq!(config.max_wait, Duration::from_secs(300));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.openai_api_key.is_none());
        assert!(!config.debug);
    }

    #[test]
    fn test_environment_selects_sidecar_mode() {
        let config = NotifierConfig::resolve(
            &Cli::default(),
            env(&[
                ("SLACK_BOT_TOKEN", "xoxb-1"),
                ("KUBE_BENCH_OUTPUT_DIR", "/tmp/kube-bench-results"),
                ("SLACK_CHANNEL", "#security"),
                ("MAX_WAIT_TIME", "600"),
                ("DEBUG", "TRUE"),
            ]),
        )
        .unwrap();

        assert_eq!(
            config.mode,
            RunMode::Sidecar {
                output_dir: PathBuf::from("/tmp/kube-bench-results")
            }
        );
        assert_eq!(config.channel, "#security");
        assert_eq!(config.max_wait, Duration::from_secs(600));
        assert!(config.debug);
    }

    #[test]
    fn test_flags_override_environment() {
        let cli = Cli {
            channel: Some("#ops".into()),
            max_wait: Some(30),
            model: Some("gpt-4o".into()),
            ..Cli::default()
        };
        let config = NotifierConfig::resolve(
            &cli,
            env(&[
                ("SLACK_BOT_TOKEN", "xoxb-1"),
                ("SLACK_CHANNEL", "#security"),
                ("MAX_WAIT_TIME", "not-a-number"),
                ("OPENAI_MODEL", "gpt-3.5-turbo"),
            ]),
        )
        .unwrap();

        assert_eq!(config.channel, "#ops");
        assert_eq!(config.max_wait, Duration::from_secs(30));
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn test_test_mode_wins_over_output_dir() {
        let config = NotifierConfig::resolve(
            &Cli::default(),
            env(&[
                ("SLACK_BOT_TOKEN", "xoxb-1"),
                ("KUBE_BENCH_OUTPUT_DIR", "/tmp/out"),
                ("TEST_MODE", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(config.mode, RunMode::Test);
    }

    #[test]
    fn test_missing_token_is_an_error_unless_dry_run() {
        assert_eq!(
            NotifierConfig::resolve(&Cli::default(), env(&[("SLACK_BOT_TOKEN", "  ")])),
            Err(ConfigError::MissingToken)
        );

        let cli = Cli {
            dry_run: true,
            ..Cli::default()
        };
        let config = NotifierConfig::resolve(&cli, env(&[])).unwrap();
        assert!(config.slack_token.is_none());
        assert!(config.dry_run);
    }

    #[test]
    fn test_malformed_max_wait_is_an_error() {
        let err = NotifierConfig::resolve(
            &Cli::default(),
            env(&[("SLACK_BOT_TOKEN", "xoxb-1"), ("MAX_WAIT_TIME", "5m")]),
        )
        .unwrap_err();

        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                name: "MAX_WAIT_TIME",
                value: "5m".into()
            }
        );
    }
}
