//! # Kube-bench Report Kit
//!
//! Watches for kube-bench result files, summarizes them and renders the
//! summaries for chat and HTML delivery.
//!
//! ## Modules
//!
//! - `document` - Scan document model and the optional-field accessor
//! - `parser` - Loading result files, status tallies and finding lists
//! - `projector` - Normalized summaries via an ordered count-strategy chain
//! - `watcher` - Polling a directory for a complete, parseable result
//! - `render` - Chat blocks, HTML scan report and AI analysis page
//! - `analysis` - Two-tier AI analysis over a pluggable provider
//! - `error` - Error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use report_kit::render::{blocks, html, SystemClock};
//! use report_kit::watcher::{OutputWatcher, WatchConfig, WatchOutcome};
//!
//! let watcher = OutputWatcher::new("/tmp/kube-bench-results", WatchConfig::new(Duration::from_secs(300)));
//! if let WatchOutcome::Ready { document, .. } = watcher.wait_for_result() {
//!     let summary = report_kit::projector::project(&document);
//!     let chat = blocks::render_chat_blocks(&summary, &SystemClock);
//!     let page = html::render_html(&document, &summary, &SystemClock);
//! }
//! ```

pub mod analysis;
pub mod document;
pub mod error;
pub mod parser;
pub mod projector;
pub mod render;
pub mod watcher;

pub use analysis::{Analysis, AnalysisProvider, SecurityAnalyzer};
pub use document::{ScanDocument, Status, StatusCounts};
pub use error::{AnalysisError, ParseError, ReportError};
pub use projector::{OverallStatus, Summary, SummaryProjector};
pub use watcher::{OutputWatcher, WatchConfig, WatchOutcome};
