//! # Kube-bench Notifier
//!
//! Sidecar that waits for kube-bench to write its JSON results, then posts a
//! summary to Slack with a detailed HTML report and, when an OpenAI key is
//! configured, an AI analysis of the failed tests.
//!
//! ## Usage
//!
//! ```bash
//! # Sidecar mode
//! bench_notifier --output-dir /tmp/kube-bench-results
//!
//! # Connectivity check with a sample report
//! bench_notifier --test
//!
//! # Print payloads instead of posting them
//! bench_notifier --dry-run -d ./results
//! ```
//!
//! Exit codes: 0 delivered, 1 timed out, 2 configuration or delivery error.

mod cli;
mod config;
mod notifier;
mod openai;
mod sink;

use clap::Parser;
use report_kit::{SecurityAnalyzer, WatchConfig};

use cli::Cli;
use config::{NotifierConfig, RunMode};
use notifier::{Notifier, NotifyError, RunOutcome};
use openai::OpenAiProvider;
use sink::{ChatSink, ConsoleSink, SlackClient};

fn main() {
    let cli = Cli::parse();

    let config = match NotifierConfig::from_env(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    init_logging(config.debug);

    let exit_code = match run(&config) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            log::error!("{}", e);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Info by default, debug with `--debug`; `RUST_LOG` wins over both
fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .filter_module("hyper", log::LevelFilter::Warn)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

fn run(config: &NotifierConfig) -> Result<RunOutcome, NotifyError> {
    log::debug!("Configuration: channel={} mode={:?}", config.channel, config.mode);

    match (&config.slack_token, config.dry_run) {
        (Some(token), false) => {
            log::info!("Posting to Slack channel {}", config.channel);
            dispatch(SlackClient::new(token.clone(), config.channel.clone()), config)
        }
        _ => {
            log::info!("Dry run: payloads are printed to stdout");
            dispatch(ConsoleSink::stdout(), config)
        }
    }
}

fn dispatch<S: ChatSink>(sink: S, config: &NotifierConfig) -> Result<RunOutcome, NotifyError> {
    let mut notifier = Notifier::new(sink, WatchConfig::new(config.max_wait), &config.report_dir);

    if let Some(analyzer) = build_analyzer(config) {
        notifier = notifier.with_analyzer(analyzer);
    }

    match &config.mode {
        RunMode::Sidecar { output_dir } => notifier.run_sidecar(output_dir),
        RunMode::Test => notifier.run_test_mode(),
    }
}

fn build_analyzer(config: &NotifierConfig) -> Option<SecurityAnalyzer> {
    let Some(key) = &config.openai_api_key else {
        log::info!("OPENAI_API_KEY not set, AI analysis disabled");
        return None;
    };

    match OpenAiProvider::new(key.clone(), config.model.clone()) {
        Ok(provider) => {
            log::info!("AI analysis enabled with model {}", provider.model());
            Some(SecurityAnalyzer::new(Box::new(provider)))
        }
        Err(e) => {
            log::warn!("AI analysis disabled: {}", e);
            None
        }
    }
}
