//! Command-line interface parsing
//!
//! Every flag is optional; unset flags fall back to the environment (see
//! `config`), which is how the sidecar is normally configured in a pod.

use std::path::PathBuf;

use clap::Parser;

const AFTER_HELP: &str = "\
ENVIRONMENT:
    SLACK_BOT_TOKEN         Bot token (required unless --dry-run)
    SLACK_CHANNEL           Target channel (default: #kube-bench)
    KUBE_BENCH_OUTPUT_DIR   Directory to watch; unset runs test mode
    MAX_WAIT_TIME           Seconds to wait for results (default: 300)
    OPENAI_API_KEY          Enables AI analysis of failed tests
    OPENAI_MODEL            Analysis model (default: gpt-4)
    REPORT_DIR              Where HTML reports are written (default: temp dir)
    DEBUG, TEST_MODE        Set to 'true' to enable
    RUST_LOG                Overrides the log filter

EXIT CODES:
    0    Report delivered (or test mode completed)
    1    Timed out waiting for kube-bench results
    2    Configuration or delivery error

EXAMPLES:
    bench_notifier --output-dir /tmp/kube-bench-results      # Sidecar mode
    bench_notifier --test --channel '#security'              # Connectivity check
    bench_notifier --dry-run -d ./results --max-wait 10      # Print payloads only";

/// Kube-bench notifier command line
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "bench_notifier",
    version,
    about = "Waits for kube-bench results and posts a summary report to Slack",
    after_help = AFTER_HELP
)]
pub struct Cli {
    /// Directory where kube-bench writes its JSON results
    #[arg(short = 'd', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Slack channel name or ID
    #[arg(short, long, value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// Maximum seconds to wait for a complete result file
    #[arg(long, value_name = "SECONDS")]
    pub max_wait: Option<u64>,

    /// Send test messages and a sample report instead of watching
    #[arg(long)]
    pub test: bool,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,

    /// Model used for AI analysis
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Directory for generated HTML reports
    #[arg(long, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Print message payloads to stdout instead of posting them
    #[arg(long)]
    pub dry_run: bool,
}
