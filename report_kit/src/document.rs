//! # Scan Documents
//!
//! A kube-bench result file is an arbitrary JSON tree. Nothing in it is
//! validated: every lookup goes through [`Node`], which treats a missing key,
//! a `null` and a value of the wrong type the same way and falls back to a
//! fixed default (empty text, zero count, no items).
//!
//! ```text
//! {
//!   "Controls": [
//!     { "id", "text", "node_type", "version", "detected_version",
//!       "total_pass", "total_fail", "total_warn", "total_info",
//!       "tests": [ { "section", "desc", "results": [ TestResult... ] } ],
//!       "results": [ TestResult... ]          <- older, flatter layout
//!     }
//!   ],
//!   "Totals": { "total_pass", "total_fail", "total_warn", "total_info" }
//! }
//! ```

use std::fmt;
use std::ops::AddAssign;

use serde::Serialize;
use serde_json::Value;

/// Label used wherever a textual field is absent
pub const UNKNOWN: &str = "Unknown";

// ============================================================================
// Document
// ============================================================================

/// A parsed scan result document
///
/// Read-only once loaded. A fresh document is built on every read.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanDocument {
    root: Value,
}

impl ScanDocument {
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// The underlying JSON tree
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Accessor for the document root
    pub fn root(&self) -> Node<'_> {
        Node::new(&self.root)
    }

    /// Whether a `Controls` key is present (even if empty)
    pub fn has_controls(&self) -> bool {
        self.root().get("Controls").is_present()
    }

    /// The `Totals` node, possibly missing
    pub fn totals(&self) -> Node<'_> {
        self.root().get("Totals")
    }

    /// All controls in document order
    pub fn controls(&self) -> impl Iterator<Item = Control<'_>> {
        self.root().get("Controls").items().map(Control::new)
    }

    /// The first control, used for version detection
    pub fn first_control(&self) -> Option<Control<'_>> {
        self.controls().next()
    }
}

impl From<Value> for ScanDocument {
    fn from(root: Value) -> Self {
        Self::from_value(root)
    }
}

// ============================================================================
// Optional field accessor
// ============================================================================

/// Best-effort view of a JSON value that may not exist
///
/// All accessors are total: absence is represented by [`Node::MISSING`] and
/// every extraction has one defined default.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a>(Option<&'a Value>);

impl<'a> Node<'a> {
    /// The absent node
    pub const MISSING: Node<'static> = Node(None);

    pub fn new(value: &'a Value) -> Self {
        Node(Some(value))
    }

    /// True when the value exists and is not `null`
    pub fn is_present(&self) -> bool {
        matches!(self.0, Some(v) if !v.is_null())
    }

    /// Child lookup; non-objects yield [`Node::MISSING`]
    pub fn get(&self, key: &str) -> Node<'a> {
        Node(self.0.and_then(|v| v.get(key)))
    }

    pub fn value(&self) -> Option<&'a Value> {
        self.0
    }

    /// String value, if this node holds one
    pub fn text(&self) -> Option<&'a str> {
        self.0.and_then(Value::as_str)
    }

    /// Text rendering of a scalar, or `default`
    ///
    /// Numbers and booleans are accepted so that `"id": 1` and `"id": "1"`
    /// read the same.
    pub fn text_or(&self, default: &str) -> String {
        match self.0 {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    /// True when this node holds a number
    pub fn is_number(&self) -> bool {
        matches!(self.0, Some(Value::Number(_)))
    }

    /// Non-negative count; anything else reads as zero
    pub fn count(&self) -> u64 {
        match self.0 {
            Some(Value::Number(n)) => {
                if let Some(u) = n.as_u64() {
                    u
                } else if let Some(f) = n.as_f64() {
                    if f.is_finite() && f > 0.0 {
                        f.trunc() as u64
                    } else {
                        0
                    }
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    /// Array elements; non-arrays yield nothing
    pub fn items(&self) -> impl Iterator<Item = Node<'a>> + 'a {
        self.0
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(Node::new)
    }
}

// ============================================================================
// Status
// ============================================================================

/// A test status as emitted by kube-bench
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Fail,
    Warn,
    Info,
}

impl Status {
    /// Case-insensitive parse; unknown vocabulary yields `None`
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("pass") {
            Some(Status::Pass)
        } else if raw.eq_ignore_ascii_case("fail") {
            Some(Status::Fail)
        } else if raw.eq_ignore_ascii_case("warn") {
            Some(Status::Warn)
        } else if raw.eq_ignore_ascii_case("info") {
            Some(Status::Info)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Warn => "WARN",
            Status::Info => "INFO",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Counts
// ============================================================================

/// Tally of results per status bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub passed: u64,
    pub failed: u64,
    pub warned: u64,
    pub info: u64,
}

impl StatusCounts {
    pub fn new(passed: u64, failed: u64, warned: u64, info: u64) -> Self {
        Self {
            passed,
            failed,
            warned,
            info,
        }
    }

    /// Read `total_pass` / `total_fail` / `total_warn` / `total_info` from a node
    pub fn from_totals(node: Node<'_>) -> Self {
        Self {
            passed: node.get("total_pass").count(),
            failed: node.get("total_fail").count(),
            warned: node.get("total_warn").count(),
            info: node.get("total_info").count(),
        }
    }

    /// Whether a node carries at least one numeric `total_*` field
    pub fn declared_in(node: Node<'_>) -> bool {
        ["total_pass", "total_fail", "total_warn", "total_info"]
            .iter()
            .any(|key| node.get(key).is_number())
    }

    pub fn record(&mut self, status: Status) {
        match status {
            Status::Pass => self.passed = self.passed.saturating_add(1),
            Status::Fail => self.failed = self.failed.saturating_add(1),
            Status::Warn => self.warned = self.warned.saturating_add(1),
            Status::Info => self.info = self.info.saturating_add(1),
        }
    }

    /// Sum of all buckets, saturating at `u64::MAX`
    pub fn total(&self) -> u64 {
        self.passed
            .saturating_add(self.failed)
            .saturating_add(self.warned)
            .saturating_add(self.info)
    }

    /// Percentage of passes among pass/fail/warn; 0 when none ran
    pub fn pass_rate(&self) -> f64 {
        let denominator = self
            .passed
            .saturating_add(self.failed)
            .saturating_add(self.warned);
        if denominator == 0 {
            0.0
        } else {
            (self.passed as f64 / denominator as f64) * 100.0
        }
    }
}

impl AddAssign for StatusCounts {
    fn add_assign(&mut self, other: Self) {
        self.passed = self.passed.saturating_add(other.passed);
        self.failed = self.failed.saturating_add(other.failed);
        self.warned = self.warned.saturating_add(other.warned);
        self.info = self.info.saturating_add(other.info);
    }
}

// ============================================================================
// Typed views
// ============================================================================

/// One entry of `Controls[]`
#[derive(Debug, Clone, Copy)]
pub struct Control<'a> {
    node: Node<'a>,
}

impl<'a> Control<'a> {
    pub fn new(node: Node<'a>) -> Self {
        Self { node }
    }

    pub fn node(&self) -> Node<'a> {
        self.node
    }

    pub fn id(&self) -> String {
        self.node.get("id").text_or(UNKNOWN)
    }

    pub fn text(&self) -> String {
        self.node.get("text").text_or(UNKNOWN)
    }

    pub fn node_type(&self) -> String {
        self.node.get("node_type").text_or(UNKNOWN)
    }

    /// Runtime version detected by the scanner, preferred over `version`
    pub fn detected_version(&self) -> Option<String> {
        let node = self.node.get("detected_version");
        node.is_present().then(|| node.text_or(UNKNOWN))
    }

    /// Benchmark specification version
    pub fn spec_version(&self) -> Option<String> {
        let node = self.node.get("version");
        node.is_present().then(|| node.text_or(UNKNOWN))
    }

    /// Counts from the control's own `total_*` fields, if it declares any
    pub fn declared_counts(&self) -> Option<StatusCounts> {
        StatusCounts::declared_in(self.node).then(|| StatusCounts::from_totals(self.node))
    }

    /// Whether the control carries the nested `tests[]` layout
    pub fn has_test_sections(&self) -> bool {
        self.node.get("tests").items().next().is_some()
    }

    /// Every result of the control in order
    ///
    /// Walks `tests[].results[]` first, then any flat `results[]`.
    pub fn results(&self) -> impl Iterator<Item = TestResult<'a>> + 'a {
        let nested = self
            .node
            .get("tests")
            .items()
            .flat_map(|section| section.get("results").items());
        let flat = self.node.get("results").items();
        nested.chain(flat).map(TestResult::new)
    }

    /// Tally of this control's results by status
    pub fn tally(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for status in self.results().filter_map(|r| r.status()) {
            counts.record(status);
        }
        counts
    }
}

/// One entry of a `results[]` array
#[derive(Debug, Clone, Copy)]
pub struct TestResult<'a> {
    node: Node<'a>,
}

impl<'a> TestResult<'a> {
    pub fn new(node: Node<'a>) -> Self {
        Self { node }
    }

    pub fn status(&self) -> Option<Status> {
        self.node.get("status").text().and_then(Status::parse)
    }

    /// Upper-cased status as written, `UNKNOWN` if absent
    pub fn raw_status(&self) -> String {
        self.node
            .get("status")
            .text()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }

    pub fn test_number(&self) -> String {
        self.node.get("test_number").text_or("")
    }

    pub fn description(&self) -> String {
        self.node.get("test_desc").text_or("")
    }

    pub fn remediation(&self) -> String {
        self.node.get("remediation").text_or("")
    }
}

// ============================================================================
// Tests
// ============================================================================
