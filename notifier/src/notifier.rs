//! Report delivery workflows
//!
//! ```text
//! sidecar:  startup text -> watch -> report blocks -> HTML upload -> AI analysis
//!                              └── timeout ──> timeout text
//! test:     test text -> test blocks -> sample report -> integration JSON
//! ```
//!
//! Once the report blocks are delivered, upload and analysis failures are
//! logged and do not fail the run.

use std::path::{Path, PathBuf};

use report_kit::render::blocks::{
    render_analysis_blocks, render_chat_blocks, render_json_block, render_test_blocks,
};
use report_kit::render::analysis::render_analysis_html;
use report_kit::render::{html, Clock, SystemClock};
use report_kit::{
    parser, projector, OutputWatcher, ScanDocument, SecurityAnalyzer, Summary, WatchConfig,
    WatchOutcome,
};
use serde_json::json;

use crate::sink::{ChatSink, SinkError, UploadRequest};

pub const STARTUP_MESSAGE: &str = "🚀 Kube-bench security scan started! Monitoring for results...";
pub const TIMEOUT_MESSAGE: &str = "⚠️ Kube-bench scan timed out - no results found";
pub const TEST_MESSAGE: &str = "🧪 Test message from kube-bench security scanner!";

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Delivered,
    TimedOut,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Delivered => 0,
            RunOutcome::TimedOut => 1,
        }
    }
}

/// Errors that end a run
#[derive(Debug)]
pub enum NotifyError {
    /// A required message could not be delivered
    Delivery { stage: &'static str, source: SinkError },
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Delivery { stage, source } => {
                write!(f, "Failed to send {}: {}", stage, source)
            }
        }
    }
}

impl std::error::Error for NotifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NotifyError::Delivery { source, .. } => Some(source),
        }
    }
}

fn delivery(stage: &'static str) -> impl FnOnce(SinkError) -> NotifyError {
    move |source| NotifyError::Delivery { stage, source }
}

/// Drives a sink through the sidecar or test workflow
pub struct Notifier<S: ChatSink> {
    sink: S,
    watch: WatchConfig,
    report_dir: PathBuf,
    analyzer: Option<SecurityAnalyzer>,
    clock: Box<dyn Clock>,
}

impl<S: ChatSink> Notifier<S> {
    pub fn new(sink: S, watch: WatchConfig, report_dir: impl Into<PathBuf>) -> Self {
        Self {
            sink,
            watch,
            report_dir: report_dir.into(),
            analyzer: None,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_analyzer(mut self, analyzer: SecurityAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Watch `output_dir` and deliver the report
    ///
    /// A fatal error is reported to the channel on a best-effort basis
    /// before being returned.
    pub fn run_sidecar(&mut self, output_dir: &Path) -> Result<RunOutcome, NotifyError> {
        log::info!("🔒 Starting kube-bench notifier sidecar");
        log::info!("📁 Monitoring directory: {}", output_dir.display());

        let result = self.sidecar(output_dir);
        if let Err(e) = &result {
            log::error!("❌ Fatal error in sidecar: {}", e);
            let notice = format!("❌ Fatal error in kube-bench sidecar: {}", e);
            if let Err(send_err) = self.sink.send_text(&notice) {
                log::warn!("Could not report fatal error to channel: {}", send_err);
            }
        }
        result
    }

    fn sidecar(&mut self, output_dir: &Path) -> Result<RunOutcome, NotifyError> {
        self.sink
            .send_text(STARTUP_MESSAGE)
            .map_err(delivery("startup notification"))?;

        let watcher = OutputWatcher::new(output_dir, self.watch.clone());
        match watcher.wait_for_result() {
            WatchOutcome::Ready { path, document } => {
                log::info!("Reporting results from {}", path.display());
                self.send_report(&document)?;
                log::info!("✅ Kube-bench report sent successfully");
                Ok(RunOutcome::Delivered)
            }
            WatchOutcome::TimedOut { waited } => {
                log::warn!("Gave up after {}s without a usable result", waited.as_secs());
                self.sink
                    .send_text(TIMEOUT_MESSAGE)
                    .map_err(delivery("timeout notification"))?;
                Ok(RunOutcome::TimedOut)
            }
        }
    }

    /// Connectivity check plus a full report rendered from sample data
    pub fn run_test_mode(&mut self) -> Result<RunOutcome, NotifyError> {
        log::info!("🧪 Running in test mode");

        self.sink
            .send_text(TEST_MESSAGE)
            .map_err(delivery("test message"))?;
        self.sink
            .send_blocks(&render_test_blocks(), "Kube-bench Security Test Report")
            .map_err(delivery("test blocks"))?;

        log::info!("🔒 Sending sample kube-bench report");
        self.send_report(&parser::fixture())?;

        let status = json!({
            "test_run": "kube-bench-slack-integration",
            "status": "success",
            "components": {
                "slack_connection": "working",
                "kube_bench_parser": "working",
                "message_formatting": "working"
            }
        });
        self.sink
            .send_blocks(
                &render_json_block(&status, "Integration Test Results"),
                "Integration Test Results",
            )
            .map_err(delivery("integration status"))?;

        log::info!("🎉 All tests completed successfully");
        Ok(RunOutcome::Delivered)
    }

    /// Chat report, then the HTML attachment and optional analysis
    pub fn send_report(&mut self, doc: &ScanDocument) -> Result<(), NotifyError> {
        let summary = projector::project(doc);
        let fallback = format!(
            "🔒 Kube-bench Security Scan Results - {} tests, {} passed, {} failed",
            summary.total_tests(),
            summary.counts.passed,
            summary.counts.failed
        );

        self.sink
            .send_blocks(&render_chat_blocks(&summary, self.clock.as_ref()), &fallback)
            .map_err(delivery("scan report"))?;

        self.upload_html_report(doc, &summary);
        self.send_analysis(doc, &summary);
        Ok(())
    }

    fn upload_html_report(&mut self, doc: &ScanDocument, summary: &Summary) {
        let filename = format!("kube-bench-report-{}.html", self.clock.file_timestamp());
        let path = self.report_dir.join(&filename);

        let content = match html::save_html(doc, summary, self.clock.as_ref(), &path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("{}; uploading without a local copy", e);
                html::render_html(doc, summary, self.clock.as_ref())
            }
        };

        let request = UploadRequest {
            filename,
            title: "Kube-bench Security Report".to_string(),
            comment: Some("📊 Detailed kube-bench security report (HTML)".to_string()),
            content,
        };
        if let Err(e) = self.sink.upload(&request) {
            log::warn!("HTML report upload failed: {}", e);
        }
    }

    fn send_analysis(&mut self, doc: &ScanDocument, summary: &Summary) {
        let Some(analyzer) = &self.analyzer else {
            log::debug!("No analysis provider configured, skipping AI analysis");
            return;
        };

        if summary.counts.failed == 0 {
            log::info!("No failed tests, skipping AI analysis");
            return;
        }

        let analysis = match analyzer.analyze(doc, &summary.version) {
            Ok(analysis) => analysis,
            Err(e) => {
                log::warn!("AI analysis skipped: {}", e);
                return;
            }
        };

        if let Err(e) = self.sink.send_blocks(
            &render_analysis_blocks(&analysis.text),
            "🤖 AI Security Analysis Report - AI-powered insights from kube-bench scan",
        ) {
            log::warn!("AI analysis message failed: {}", e);
        }

        let request = UploadRequest {
            filename: format!("kube-bench-ai-analysis-{}.html", self.clock.file_timestamp()),
            title: "AI Security Analysis Report".to_string(),
            comment: Some(format!(
                "🤖 AI analysis of {} failed tests",
                analysis.analyzed_findings
            )),
            content: render_analysis_html(&analysis.text, self.clock.as_ref()),
        };
        if let Err(e) = self.sink.upload(&request) {
            log::warn!("AI analysis upload failed: {}", e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
