//! # Summary Projector
//!
//! Maps a raw [`ScanDocument`] onto the normalized [`Summary`] shared by the
//! chat and HTML renderers.
//!
//! Different kube-bench releases populate different levels of the document,
//! so counts come from an ordered chain of strategies. Each strategy either
//! answers or reports "not applicable"; the first answer wins.
//!
//! ```text
//! document totals:  TopLevelTotals -> PerControlTotals -> ResultTally
//! control counts:                     PerControlTotals -> ResultTally
//! ```

use std::fmt;

use serde::Serialize;

use crate::document::{Control, ScanDocument, StatusCounts, UNKNOWN};

/// Controls with more failures than this are flagged critical
pub const CRITICAL_CONTROL_FAIL_THRESHOLD: u64 = 5;

/// At or above this many failures the overall status is critical
pub const CRITICAL_STATUS_FAIL_THRESHOLD: u64 = 10;

// ============================================================================
// Summary types
// ============================================================================

/// Fixed classification thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    /// A control is critical when `failed > critical_control_fails`
    pub critical_control_fails: u64,
    /// The scan is critical when `failed >= critical_status_fails`
    pub critical_status_fails: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            critical_control_fails: CRITICAL_CONTROL_FAIL_THRESHOLD,
            critical_status_fails: CRITICAL_STATUS_FAIL_THRESHOLD,
        }
    }
}

/// Overall scan classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Passed,
    NeedsAttention,
    Critical,
}

impl OverallStatus {
    pub fn classify(failed: u64, thresholds: &Thresholds) -> Self {
        if failed == 0 {
            OverallStatus::Passed
        } else if failed < thresholds.critical_status_fails {
            OverallStatus::NeedsAttention
        } else {
            OverallStatus::Critical
        }
    }

    /// Human label, e.g. `NEEDS ATTENTION`
    pub fn label(&self) -> &'static str {
        match self {
            OverallStatus::Passed => "PASSED",
            OverallStatus::NeedsAttention => "NEEDS ATTENTION",
            OverallStatus::Critical => "CRITICAL",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            OverallStatus::Passed => "✅",
            OverallStatus::NeedsAttention => "⚠️",
            OverallStatus::Critical => "❌",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-control breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlSummary {
    pub id: String,
    pub text: String,
    pub node_type: String,
    pub counts: StatusCounts,
}

impl ControlSummary {
    /// `passed / (passed + failed + warned)` as a percentage
    pub fn pass_rate(&self) -> f64 {
        self.counts.pass_rate()
    }

    /// `"<id>: <text>"`
    pub fn title(&self) -> String {
        format!("{}: {}", self.id, self.text)
    }
}

/// A control whose failure count crossed the critical threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriticalControl {
    pub id: String,
    pub text: String,
    pub failed: u64,
}

impl CriticalControl {
    pub fn title(&self) -> String {
        format!("{}: {}", self.id, self.text)
    }
}

/// Normalized view of one scan document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub counts: StatusCounts,
    pub controls: Vec<ControlSummary>,
    pub critical_controls: Vec<CriticalControl>,
    pub version: String,
    pub status: OverallStatus,
    /// Thresholds the summary was classified with
    pub thresholds: Thresholds,
    /// Name of the strategy that produced `counts`, if any applied
    pub counts_source: Option<&'static str>,
}

impl Summary {
    pub fn total_tests(&self) -> u64 {
        self.counts.total()
    }

    /// Share of passes among all tallied results, in percent
    pub fn overall_pass_rate(&self) -> f64 {
        let total = self.counts.total();
        if total == 0 {
            0.0
        } else {
            (self.counts.passed as f64 / total as f64) * 100.0
        }
    }

    /// Whether a control row has more failures than the control threshold
    pub fn is_critical(&self, control: &ControlSummary) -> bool {
        control.counts.failed > self.thresholds.critical_control_fails
    }
}

// ============================================================================
// Count strategies
// ============================================================================

/// One way of reading status counts out of a document
pub trait CountStrategy: Send + Sync {
    /// Short identifier used in logs and in [`Summary::counts_source`]
    fn name(&self) -> &'static str;

    /// Whole-document counts, or `None` when not applicable
    fn document_counts(&self, doc: &ScanDocument) -> Option<StatusCounts>;

    /// Counts for a single control, or `None` when not applicable
    fn control_counts(&self, control: &Control<'_>) -> Option<StatusCounts>;
}

/// Reads the top-level `Totals` object
pub struct TopLevelTotals;

impl CountStrategy for TopLevelTotals {
    fn name(&self) -> &'static str {
        "totals"
    }

    fn document_counts(&self, doc: &ScanDocument) -> Option<StatusCounts> {
        let totals = doc.totals();
        totals
            .is_present()
            .then(|| StatusCounts::from_totals(totals))
    }

    fn control_counts(&self, _control: &Control<'_>) -> Option<StatusCounts> {
        None
    }
}

/// Sums the `total_*` fields declared on each control
///
/// Applies once any control declares totals. Controls that declare none
/// contribute their result tally, so the document counts always equal the
/// sum of the per-control rows.
pub struct PerControlTotals;

impl CountStrategy for PerControlTotals {
    fn name(&self) -> &'static str {
        "control_totals"
    }

    fn document_counts(&self, doc: &ScanDocument) -> Option<StatusCounts> {
        let mut any_declared = false;
        let mut counts = StatusCounts::default();

        for control in doc.controls() {
            match control.declared_counts() {
                Some(declared) => {
                    any_declared = true;
                    counts += declared;
                }
                None => counts += control.tally(),
            }
        }

        any_declared.then_some(counts)
    }

    fn control_counts(&self, control: &Control<'_>) -> Option<StatusCounts> {
        control.declared_counts()
    }
}

/// Tallies every individual result status
pub struct ResultTally;

impl CountStrategy for ResultTally {
    fn name(&self) -> &'static str {
        "result_tally"
    }

    fn document_counts(&self, doc: &ScanDocument) -> Option<StatusCounts> {
        if !doc.has_controls() {
            return None;
        }

        let mut counts = StatusCounts::default();
        for control in doc.controls() {
            counts += control.tally();
        }
        Some(counts)
    }

    fn control_counts(&self, control: &Control<'_>) -> Option<StatusCounts> {
        Some(control.tally())
    }
}

// ============================================================================
// Projector
// ============================================================================

/// Builds [`Summary`] values from documents
pub struct SummaryProjector {
    strategies: Vec<Box<dyn CountStrategy>>,
    thresholds: Thresholds,
}

impl SummaryProjector {
    /// The full three-tier chain
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(TopLevelTotals),
                Box::new(PerControlTotals),
                Box::new(ResultTally),
            ],
            thresholds: Thresholds::default(),
        }
    }

    /// Only the per-result tally
    pub fn tally_only() -> Self {
        Self::with_strategies(vec![Box::new(ResultTally)])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn CountStrategy>>) -> Self {
        Self {
            strategies,
            thresholds: Thresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Project a document onto a summary
    pub fn project(&self, doc: &ScanDocument) -> Summary {
        let (counts, counts_source) = self
            .strategies
            .iter()
            .find_map(|s| s.document_counts(doc).map(|counts| (counts, s.name())))
            .map(|(counts, name)| (counts, Some(name)))
            .unwrap_or((StatusCounts::default(), None));

        if let Some(source) = counts_source {
            log::debug!("Summary counts taken from {}", source);
        }

        let mut controls = Vec::new();
        let mut critical_controls = Vec::new();

        for control in doc.controls() {
            let control_counts = self
                .strategies
                .iter()
                .find_map(|s| s.control_counts(&control))
                .unwrap_or_default();

            let summary = ControlSummary {
                id: control.id(),
                text: control.text(),
                node_type: control.node_type(),
                counts: control_counts,
            };

            if summary.counts.failed > self.thresholds.critical_control_fails {
                critical_controls.push(CriticalControl {
                    id: summary.id.clone(),
                    text: summary.text.clone(),
                    failed: summary.counts.failed,
                });
            }

            controls.push(summary);
        }

        Summary {
            status: OverallStatus::classify(counts.failed, &self.thresholds),
            counts,
            controls,
            critical_controls,
            version: resolve_version(doc),
            thresholds: self.thresholds,
            counts_source,
        }
    }
}

impl Default for SummaryProjector {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary using the default three-tier chain
pub fn project(doc: &ScanDocument) -> Summary {
    SummaryProjector::new().project(doc)
}

/// Detected runtime version, else benchmark version, else `Unknown`
fn resolve_version(doc: &ScanDocument) -> String {
    doc.first_control()
        .and_then(|c| c.detected_version().or_else(|| c.spec_version()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

// ============================================================================
// Tests
// ============================================================================
