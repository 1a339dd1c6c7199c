//! # Security Analysis
//!
//! Asks a language-model provider to rank and explain the failed tests of a
//! scan. The provider is a trait so the notifier can plug in a real HTTP
//! client and tests can script responses.
//!
//! ## Two-tier strategy
//!
//! ```text
//! full prompt (every failed test)
//!     │
//!     ├── Ok ───────────────────────────────► Analysis { limited: false }
//!     ├── ContextLengthExceeded ──► limited prompt (first 15 failed tests)
//!     │                                 ├── Ok ──► Analysis { limited: true }
//!     │                                 └── Err ─► error
//!     └── any other error ──────────────────► error
//! ```
//!
//! There is exactly one retry and only for the size-limit signal.

use serde::Serialize;

use crate::document::{ScanDocument, Status};
use crate::error::AnalysisError;
use crate::projector;

/// Failed tests sent on the reduced-scope retry
pub const LIMITED_FINDINGS: usize = 15;

/// A chat-completion style text generator
pub trait AnalysisProvider {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Complete a single system + user exchange
    fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError>;
}

/// Outcome of a successful analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analysis {
    /// Model output, prefixed with a note when the scope was reduced
    pub text: String,
    /// True when the reduced-scope retry produced the text
    pub limited: bool,
    /// Failed tests included in the prompt that succeeded
    pub analyzed_findings: usize,
    /// Failures reported for the whole scan
    pub total_failures: u64,
}

/// One failed test as presented to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct PromptFinding {
    control_id: String,
    test_number: String,
    test_desc: String,
    remediation: String,
}

/// Runs the two-tier analysis against a provider
pub struct SecurityAnalyzer {
    provider: Box<dyn AnalysisProvider>,
    limited_findings: usize,
}

impl SecurityAnalyzer {
    pub fn new(provider: Box<dyn AnalysisProvider>) -> Self {
        Self {
            provider,
            limited_findings: LIMITED_FINDINGS,
        }
    }

    pub fn with_limited_findings(mut self, limit: usize) -> Self {
        self.limited_findings = limit;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Analyze the failed tests of `doc`
    pub fn analyze(&self, doc: &ScanDocument, k8s_version: &str) -> Result<Analysis, AnalysisError> {
        let total_failures = projector::project(doc).counts.failed;
        let (findings, failed_controls) = collect_failed(doc);

        if findings.is_empty() {
            return Err(AnalysisError::NothingToAnalyze);
        }

        log::info!(
            "Sending {} failed tests to {} for analysis",
            findings.len(),
            self.provider.name()
        );

        let prompt = full_prompt(k8s_version, total_failures, failed_controls, &findings);
        match self.provider.complete(SYSTEM_PROMPT, &prompt) {
            Ok(text) => {
                log::info!("AI analysis completed");
                Ok(Analysis {
                    text: text.trim().to_string(),
                    limited: false,
                    analyzed_findings: findings.len(),
                    total_failures,
                })
            }
            Err(AnalysisError::ContextLengthExceeded(reason)) => {
                log::warn!(
                    "Prompt too large ({}), retrying with the first {} failed tests",
                    reason,
                    self.limited_findings
                );
                self.analyze_limited(k8s_version, total_failures, &findings)
            }
            Err(e) => {
                log::error!("AI analysis failed: {}", e);
                Err(e)
            }
        }
    }

    fn analyze_limited(
        &self,
        k8s_version: &str,
        total_failures: u64,
        findings: &[PromptFinding],
    ) -> Result<Analysis, AnalysisError> {
        let subset = findings.get(..self.limited_findings).unwrap_or(findings);
        let prompt = limited_prompt(k8s_version, total_failures, subset);

        let text = self.provider.complete(SYSTEM_PROMPT, &prompt).map_err(|e| {
            log::error!("Limited AI analysis also failed: {}", e);
            e
        })?;

        log::info!("AI analysis completed on {} failed tests", subset.len());
        Ok(Analysis {
            text: format!(
                "⚠️ NOTE: Due to large number of findings ({} total), this report analyzes the top {} most critical issues.\n\n{}",
                total_failures,
                subset.len(),
                text.trim()
            ),
            limited: true,
            analyzed_findings: subset.len(),
            total_failures,
        })
    }
}

/// FAIL results of every control that reports failures, and the count of
/// such controls
///
/// A control that declares `total_fail` is included only when it is
/// positive; a control without declared counts is included when it holds a
/// FAIL result.
fn collect_failed(doc: &ScanDocument) -> (Vec<PromptFinding>, usize) {
    let mut findings = Vec::new();
    let mut failed_controls = 0;

    for control in doc.controls() {
        let declares_failures = control.declared_counts().map_or(true, |c| c.failed > 0);
        if !declares_failures {
            continue;
        }

        let before = findings.len();
        let control_id = control.id();
        for result in control.results().filter(|r| r.status() == Some(Status::Fail)) {
            findings.push(PromptFinding {
                control_id: control_id.clone(),
                test_number: non_empty(result.test_number(), "N/A"),
                test_desc: non_empty(result.description(), "No description"),
                remediation: non_empty(result.remediation(), "No remediation provided"),
            });
        }
        if findings.len() > before {
            failed_controls += 1;
        }
    }

    (findings, failed_controls)
}

fn non_empty(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

// ============================================================================
// Prompts
// ============================================================================

const SYSTEM_PROMPT: &str = "You are a Kubernetes security expert analyzing kube-bench scan results.
Generate a comprehensive security analysis that:
1. ONLY focuses on FAILED tests (ignore PASS/WARN/INFO)
2. Ranks findings from HIGHEST risk (fix ASAP) to LOWEST risk
3. Explains WHY each finding is dangerous and its business impact
4. Includes: Executive Summary, Prioritized Findings with explanations, Remediation steps

Return your analysis as clean text (not HTML). Rank by severity (1 being most critical).";

const REPORT_SECTIONS: &str = "3. Risk Assessment section explaining why these findings are dangerous
4. Remediation Roadmap with prioritized action items
5. Compliance Status section";

fn finding_requirements(count: usize) -> String {
    format!(
        "2. Critical Findings section with ranked list (#1 to #{count}, highest risk first) where EACH finding includes:
   - Rank/priority number (#1 = fix ASAP)
   - Severity rating (Critical/High/Medium/Low)
   - Test number and description
   - WHY IT'S DANGEROUS: Explain business impact, attack vectors, compliance risk
   - EXPLANATION: What could attackers do? What data/systems are at risk?
   - Remediation steps with time estimate",
        count = count
    )
}

fn findings_json(findings: &[PromptFinding]) -> String {
    serde_json::to_string_pretty(findings).unwrap_or_default()
}

fn full_prompt(
    k8s_version: &str,
    total_failures: u64,
    failed_controls: usize,
    findings: &[PromptFinding],
) -> String {
    format!(
        "Analyze ONLY the FAILED kube-bench tests and generate a security analysis report.

Kubernetes Version: {version}
Total Failures: {total}
Failed Controls: {controls}

ALL FAILED TESTS (analyze these ONLY, ignore all PASS/WARN/INFO):
{tests}

Provide a comprehensive security analysis including:
1. Executive Summary (overall risk assessment)
{requirements}
{sections}

IMPORTANT:
- ONLY analyze FAILED tests
- Rank by severity (1 is most critical)
- Explain WHY each finding is dangerous
- Return your analysis as clear, structured text (not HTML)",
        version = k8s_version,
        total = total_failures,
        controls = failed_controls,
        tests = findings_json(findings),
        requirements = finding_requirements(findings.len()),
        sections = REPORT_SECTIONS,
    )
}

fn limited_prompt(k8s_version: &str, total_failures: u64, findings: &[PromptFinding]) -> String {
    let count = findings.len();
    format!(
        "Analyze ONLY the FAILED kube-bench tests and generate a security analysis report.

⚠️ NOTE: Only analyzing top {count} of {total} total failures due to token limits.

Kubernetes Version: {version}
Total Failures: {total}
Analyzing: {count} most critical issues

FAILED TESTS TO ANALYZE (analyze these ONLY):
{tests}

Provide a comprehensive security analysis including:
1. Executive Summary (overall risk assessment)
{requirements}

You MUST list ALL {count} findings in full detail. Do NOT use placeholders. List every single finding #1 through #{count}.

{sections}

IMPORTANT:
- ONLY analyze the tests provided
- Rank by severity (1 is most critical)
- Explain WHY each finding is dangerous
- Return your analysis as clear, structured text (not HTML)",
        count = count,
        total = total_failures,
        version = k8s_version,
        tests = findings_json(findings),
        requirements = finding_requirements(count),
        sections = REPORT_SECTIONS,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Replays canned responses and records every user prompt
    struct ScriptedProvider {
        responses: RefCell<VecDeque<Result<String, AnalysisError>>>,
        prompts: Rc<RefCell<Vec<String>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<String, AnalysisError>>) -> (Self, Rc<RefCell<Vec<String>>>) {
            let prompts = Rc::new(RefCell::new(Vec::new()));
            let provider = Self {
                responses: RefCell::new(responses.into()),
                prompts: Rc::clone(&prompts),
            };
            (provider, prompts)
        }
    }

    impl AnalysisProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn complete(&self, _system: &str, user: &str) -> Result<String, AnalysisError> {
            self.prompts.borrow_mut().push(user.to_string());
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(AnalysisError::Provider("script exhausted".into())))
        }
    }

    fn many_failures(n: usize) -> ScanDocument {
        let results: Vec<_> = (0..n)
            .map(|i| json!({ "test_number": format!("1.{}", i), "status": "FAIL", "test_desc": "bad" }))
            .collect();
        ScanDocument::from(json!({
            "Controls": [{ "id": "1", "total_fail": n, "tests": [{ "results": results }] }],
            "Totals": { "total_fail": n }
        }))
    }

    #[test]
    fn test_full_analysis_on_first_try() {
        let (provider, prompts) = ScriptedProvider::new(vec![Ok("  EXECUTIVE SUMMARY:\nfine \n".into())]);
        let analyzer = SecurityAnalyzer::new(Box::new(provider));

        let analysis = analyzer.analyze(&parser::fixture(), "1.29").unwrap();

        assert_eq!(analysis.text, "EXECUTIVE SUMMARY:\nfine");
        assert!(!analysis.limited);
        assert_eq!(analysis.analyzed_findings, 4);
        assert_eq!(analysis.total_failures, 4);

        let prompts = prompts.borrow();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Kubernetes Version: 1.29"));
        assert!(prompts[0].contains("Failed Controls: 2"));
        assert!(prompts[0].contains("1.2.16"));
        assert!(!prompts[0].contains("4.1.1"));
    }

    #[test]
    fn test_context_length_retries_once_with_subset() {
        let (provider, prompts) = ScriptedProvider::new(vec![
            Err(AnalysisError::ContextLengthExceeded("too big".into())),
            Ok("ranked".into()),
        ]);
        let analyzer = SecurityAnalyzer::new(Box::new(provider));

        let analysis = analyzer.analyze(&many_failures(40), "1.30").unwrap();

        assert!(analysis.limited);
        assert_eq!(analysis.analyzed_findings, LIMITED_FINDINGS);
        assert!(analysis
            .text
            .starts_with("⚠️ NOTE: Due to large number of findings (40 total)"));
        assert!(analysis.text.ends_with("ranked"));

        let prompts = prompts.borrow();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Only analyzing top 15 of 40"));
        assert!(prompts[1].contains("\"1.14\""));
        assert!(!prompts[1].contains("\"1.15\""));
    }

    #[test]
    fn test_other_errors_are_terminal() {
        let (provider, prompts) =
            ScriptedProvider::new(vec![Err(AnalysisError::Provider("HTTP 500".into()))]);
        let analyzer = SecurityAnalyzer::new(Box::new(provider));

        let err = analyzer.analyze(&many_failures(3), "1.30").unwrap_err();

        assert!(matches!(err, AnalysisError::Provider(_)));
        assert_eq!(prompts.borrow().len(), 1);
    }

    #[test]
    fn test_failed_retry_is_not_retried_again() {
        let (provider, prompts) = ScriptedProvider::new(vec![
            Err(AnalysisError::ContextLengthExceeded("too big".into())),
            Err(AnalysisError::ContextLengthExceeded("still too big".into())),
            Ok("never reached".into()),
        ]);
        let analyzer = SecurityAnalyzer::new(Box::new(provider));

        assert!(analyzer.analyze(&many_failures(20), "1.30").is_err());
        assert_eq!(prompts.borrow().len(), 2);
    }

    #[test]
    fn test_nothing_to_analyze_without_failures() {
        let (provider, prompts) = ScriptedProvider::new(vec![]);
        let analyzer = SecurityAnalyzer::new(Box::new(provider));
        let doc = ScanDocument::from(json!({
            "Controls": [{ "id": "1", "tests": [{ "results": [{ "status": "PASS" }] }] }]
        }));

        assert!(matches!(
            analyzer.analyze(&doc, "1.30"),
            Err(AnalysisError::NothingToAnalyze)
        ));
        assert!(prompts.borrow().is_empty());
    }

    #[test]
    fn test_control_declaring_zero_failures_is_skipped() {
        let doc = ScanDocument::from(json!({
            "Controls": [
                { "id": "1", "total_fail": 0, "results": [{ "status": "FAIL", "test_number": "1.1" }] },
                { "id": "2", "results": [{ "status": "fail", "test_number": "2.1" }] }
            ]
        }));
        let (findings, controls) = collect_failed(&doc);

        assert_eq!(controls, 1);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].control_id, "2");
        assert_eq!(findings[0].test_desc, "No description");
    }
}
