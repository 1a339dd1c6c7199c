//! Standalone HTML scan report
//!
//! One self-contained page: status banner, four summary cards, an animated
//! pass-rate bar and one collapsible section per control listing its tests.
//! Remediation text is shown for failed tests only.

use std::fs;
use std::path::Path;

use super::{escape_html, Clock};
use crate::document::{Control, ScanDocument, Status, TestResult};
use crate::error::ReportError;
use crate::projector::{ControlSummary, OverallStatus, Summary};

/// Render the full report page
pub fn render_html(doc: &ScanDocument, summary: &Summary, clock: &dyn Clock) -> String {
    let timestamp = clock.timestamp();
    let controls_html: String = doc
        .controls()
        .zip(&summary.controls)
        .map(|(control, control_summary)| render_control(&control, control_summary, summary))
        .collect();

    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Kube-bench Security Report - {timestamp}</title>
    <style>
{style}
        .status-banner {{ background: {status_color}; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>🔒 Kube-bench Security Report</h1>
            <div class="timestamp">Generated: {timestamp}</div>
            <div class="timestamp">Version: {version}</div>
        </div>

        <div class="status-banner">{status}</div>

        <div class="summary">
            <div class="summary-card">
                <div class="label">Total Tests</div>
                <div class="number">{total}</div>
            </div>
            <div class="summary-card">
                <div class="label">Passed</div>
                <div class="number pass">✓ {passed}</div>
            </div>
            <div class="summary-card">
                <div class="label">Failed</div>
                <div class="number fail">✗ {failed}</div>
            </div>
            <div class="summary-card">
                <div class="label">Warnings</div>
                <div class="number warn">⚠ {warned}</div>
            </div>
        </div>

        <div class="content">
            <div class="section">
                <h2>📊 Pass Rate</h2>
                <div class="progress-bar">
                    <div class="progress-fill" style="width: {pass_rate:.1}%">{pass_rate:.1}%</div>
                </div>
            </div>

            <div class="section">
                <h2>🔍 Control Results</h2>
                <button class="toggle-all" onclick="toggleAll()">Expand/Collapse All</button>
{controls_html}
            </div>
        </div>

        <div class="footer">
            <p><strong>Kube-bench Security Scanner</strong></p>
            <p>CIS Kubernetes Benchmark Assessment</p>
            <p class="footer-note">
                Report generated by the kube-bench notifier<br>
                For more information, visit <a href="https://github.com/aquasecurity/kube-bench">github.com/aquasecurity/kube-bench</a>
            </p>
        </div>
    </div>

    <script>
{script}
    </script>
</body>
</html>
"##,
        timestamp = timestamp,
        style = STYLE,
        status_color = status_color(summary.status),
        version = escape_html(&summary.version),
        status = summary.status.label(),
        total = summary.total_tests(),
        passed = summary.counts.passed,
        failed = summary.counts.failed,
        warned = summary.counts.warned,
        pass_rate = summary.overall_pass_rate(),
        controls_html = controls_html,
        script = SCRIPT,
    )
}

/// Render the report and write it to `path`
pub fn save_html(
    doc: &ScanDocument,
    summary: &Summary,
    clock: &dyn Clock,
    path: &Path,
) -> Result<String, ReportError> {
    let html = render_html(doc, summary, clock);
    fs::write(path, &html).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("HTML report saved to {}", path.display());
    Ok(html)
}

fn status_color(status: OverallStatus) -> &'static str {
    match status {
        OverallStatus::Passed => "#10b981",
        OverallStatus::NeedsAttention => "#f59e0b",
        OverallStatus::Critical => "#ef4444",
    }
}

fn render_control(control: &Control<'_>, counts: &ControlSummary, summary: &Summary) -> String {
    let badge = if summary.is_critical(counts) {
        r#" <span class="critical-badge">CRITICAL</span>"#
    } else {
        ""
    };

    let mut tests_html: String = control.results().map(|r| render_test(&r)).collect();
    if tests_html.is_empty() {
        tests_html = r#"                        <p class="no-tests">No detailed test information available for this control.</p>
"#
        .to_string();
    }

    format!(
        r#"
                <div class="control" onclick="toggleControl(this)">
                    <div class="control-header">
                        <div class="control-title">{title}{badge}</div>
                        <div class="control-stats">
                            <span class="stat-pass">✓ {passed}</span>
                            <span class="stat-fail">✗ {failed}</span>
                            <span class="stat-warn">⚠ {warned}</span>
                        </div>
                    </div>
                    <div class="control-body">
{tests_html}                    </div>
                </div>
"#,
        title = escape_html(&counts.title()),
        badge = badge,
        passed = counts.counts.passed,
        failed = counts.counts.failed,
        warned = counts.counts.warned,
        tests_html = tests_html,
    )
}

fn render_test(result: &TestResult<'_>) -> String {
    let status_class = match result.status() {
        Some(status) => status.as_str().to_lowercase(),
        None => "unknown".to_string(),
    };

    let number = result.test_number();
    let description = result.description();
    let remediation = result.remediation();

    let remediation_html = if result.status() == Some(Status::Fail) && !remediation.is_empty() {
        format!(
            r#"                            <div class="test-remediation">
                                <strong>🔧 Remediation:</strong>
                                {}
                            </div>
"#,
            escape_html(&remediation)
        )
    } else {
        String::new()
    };

    format!(
        r#"                        <div class="test {class}">
                            <div class="test-header">
                                <span class="test-number">{number}</span>
                                <span class="test-status status-{class}">{status}</span>
                            </div>
                            <div class="test-desc">{description}</div>
{remediation_html}                        </div>
"#,
        class = status_class,
        number = escape_html(if number.is_empty() { "N/A" } else { &number }),
        status = escape_html(&result.raw_status()),
        description = escape_html(if description.is_empty() {
            "No description"
        } else {
            &description
        }),
        remediation_html = remediation_html,
    )
}

const STYLE: &str = r#"        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            padding: 20px;
            line-height: 1.6;
        }
        .container {
            max-width: 1200px;
            margin: 0 auto;
            background: white;
            border-radius: 12px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
            overflow: hidden;
        }
        .header {
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            color: white;
            padding: 40px;
            text-align: center;
        }
        .header h1 { font-size: 2.5em; margin-bottom: 10px; font-weight: 700; }
        .header .timestamp { opacity: 0.9; font-size: 0.9em; }
        .status-banner {
            color: white;
            padding: 30px;
            text-align: center;
            font-size: 1.8em;
            font-weight: bold;
            text-transform: uppercase;
            letter-spacing: 2px;
        }
        .summary {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
            gap: 20px;
            padding: 40px;
            background: #f9fafb;
        }
        .summary-card {
            background: white;
            padding: 25px;
            border-radius: 8px;
            box-shadow: 0 2px 8px rgba(0,0,0,0.1);
            text-align: center;
        }
        .summary-card .label { color: #6b7280; font-size: 0.9em; text-transform: uppercase; letter-spacing: 1px; }
        .summary-card .number { font-size: 2.5em; font-weight: bold; margin: 10px 0; }
        .number.pass { color: #10b981; }
        .number.fail { color: #ef4444; }
        .number.warn { color: #f59e0b; }
        .content { padding: 40px; }
        .section { margin-bottom: 40px; }
        .section h2 { color: #1f2937; margin-bottom: 20px; padding-bottom: 10px; border-bottom: 3px solid #667eea; }
        .progress-bar { background: #e5e7eb; border-radius: 10px; height: 30px; overflow: hidden; }
        .progress-fill {
            height: 100%;
            background: linear-gradient(90deg, #10b981 0%, #059669 100%);
            color: white;
            font-weight: bold;
            display: flex;
            align-items: center;
            justify-content: center;
            transition: width 1s ease;
        }
        .toggle-all {
            background: #667eea;
            color: white;
            border: none;
            padding: 10px 20px;
            border-radius: 6px;
            cursor: pointer;
            margin-bottom: 20px;
        }
        .control { border: 1px solid #e5e7eb; border-radius: 8px; margin-bottom: 15px; cursor: pointer; }
        .control-header { display: flex; justify-content: space-between; align-items: center; padding: 20px; background: #f9fafb; }
        .control-title { font-weight: 600; color: #1f2937; }
        .control-stats span { margin-left: 15px; font-weight: 600; }
        .stat-pass { color: #10b981; }
        .stat-fail { color: #ef4444; }
        .stat-warn { color: #f59e0b; }
        .critical-badge {
            background: #ef4444;
            color: white;
            font-size: 0.7em;
            padding: 2px 8px;
            border-radius: 10px;
            margin-left: 10px;
            vertical-align: middle;
        }
        .control-body { display: none; padding: 20px; }
        .control.expanded .control-body { display: block; }
        .test { border-left: 4px solid #9ca3af; padding: 15px; margin-bottom: 10px; background: #f9fafb; border-radius: 4px; }
        .test.pass { border-left-color: #10b981; }
        .test.fail { border-left-color: #ef4444; background: #fef2f2; }
        .test.warn { border-left-color: #f59e0b; background: #fffbeb; }
        .test.info { border-left-color: #3b82f6; }
        .test-header { display: flex; justify-content: space-between; margin-bottom: 8px; }
        .test-number { font-family: monospace; font-weight: bold; color: #4b5563; }
        .test-status { padding: 2px 10px; border-radius: 12px; font-size: 0.8em; font-weight: bold; color: white; background: #9ca3af; }
        .status-pass { background: #10b981; }
        .status-fail { background: #ef4444; }
        .status-warn { background: #f59e0b; }
        .status-info { background: #3b82f6; }
        .test-desc { color: #374151; }
        .test-remediation { margin-top: 10px; padding: 10px; background: white; border-radius: 4px; font-size: 0.9em; color: #4b5563; }
        .no-tests { color: #6b7280; font-style: italic; }
        .footer { background: #1f2937; color: #d1d5db; text-align: center; padding: 30px; }
        .footer a { color: #667eea; }
        .footer-note { margin-top: 10px; font-size: 0.9em; }"#;

const SCRIPT: &str = r#"        function toggleControl(element) {
            element.classList.toggle('expanded');
        }

        function toggleAll() {
            const controls = document.querySelectorAll('.control');
            const allExpanded = Array.from(controls).every(c => c.classList.contains('expanded'));
            controls.forEach(control => {
                if (allExpanded) {
                    control.classList.remove('expanded');
                } else {
                    control.classList.add('expanded');
                }
            });
        }

        window.addEventListener('load', () => {
            const progressFill = document.querySelector('.progress-fill');
            const width = progressFill.style.width;
            progressFill.style.width = '0%';
            setTimeout(() => { progressFill.style.width = width; }, 100);
        });"#;

// ============================================================================
// Tests
// ============================================================================

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::projector::project;
    use crate::render::tests::fixed_clock;
    use serde_json::json;

    fn render(doc: &ScanDocument) -> String {
        render_html(doc, &project(doc), &fixed_clock())
    }

    #[test]
    fn test_zero_failures_render_passed_without_badges() {
        let doc = ScanDocument::from(json!({
            "Controls": [{
                "id": "1",
                "text": "Clean",
                "total_pass": 2,
                "tests": [{ "results": [
                    { "test_number": "1.1", "status": "PASS", "test_desc": "ok", "remediation": "none" }
                ]}]
            }],
            "Totals": { "total_pass": 2, "total_fail": 0 }
        }));
        let html = render(&doc);

        assert!(html.contains(r#"<div class="status-banner">PASSED</div>"#));
        assert!(!html.contains(r#"class="critical-badge""#));
        assert!(!html.contains("test-remediation\""));
    }

    #[test]
    fn test_critical_control_is_badged() {
        let doc = ScanDocument::from(json!({
            "Controls": [
                { "id": "1", "text": "Hot", "total_fail": 12 },
                { "id": "2", "text": "Mild", "total_fail": 1 }
            ]
        }));
        let html = render(&doc);

        assert!(html.contains(r#"<div class="status-banner">CRITICAL</div>"#));
        assert_eq!(html.matches(r#"class="critical-badge""#).count(), 1);
        assert!(html.contains(r#"1: Hot <span class="critical-badge">"#));
    }

    #[test]
    fn test_badge_follows_each_control_not_its_id() {
        let doc = ScanDocument::from(json!({
            "Controls": [
                { "text": "Hot", "total_fail": 12 },
                { "text": "Mild", "total_fail": 1 }
            ]
        }));
        let html = render(&doc);

        assert_eq!(html.matches(r#"class="critical-badge""#).count(), 1);
        assert!(html.contains(r#"Unknown: Hot <span class="critical-badge">"#));
        assert!(!html.contains(r#"Unknown: Mild <span class="critical-badge">"#));
    }

    #[test]
    fn test_remediation_only_for_failures() {
        let doc = parser::fixture();
        let html = render(&doc);
        let failed = parser::failed_tests(&doc).len();

        assert_eq!(html.matches(r#"<div class="test-remediation">"#).count(), failed);
        assert_eq!(html.matches(r#"<div class="control" "#).count(), 3);
        assert!(html.contains("toggleControl"));
        assert!(html.contains("2025-03-14 09:26:53 UTC"));
    }

    #[test]
    fn test_control_without_tests_shows_placeholder() {
        let doc = ScanDocument::from(json!({ "Controls": [{ "id": "3", "text": "Empty" }] }));
        assert!(render(&doc).contains("No detailed test information available for this control."));
    }

    #[test]
    fn test_text_is_escaped_and_unknown_status_is_neutral() {
        let doc = ScanDocument::from(json!({
            "Controls": [{
                "id": "1",
                "text": "<b>bold</b>",
                "results": [{ "status": "skipped", "test_desc": "a & b" }]
            }]
        }));
        let html = render(&doc);

        assert!(html.contains("1: &lt;b&gt;bold&lt;/b&gt;"));
        assert!(html.contains("a &amp; b"));
        assert!(html.contains(r#"<div class="test unknown">"#));
        assert!(html.contains(">SKIPPED</span>"));
    }

    #[test]
    fn test_save_html_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.html");
        let doc = parser::fixture();

        let html = save_html(&doc, &project(&doc), &fixed_clock(), &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), html);
    }

    #[test]
    fn test_save_html_reports_write_failure() {
        let doc = parser::fixture();
        let err = save_html(
            &doc,
            &project(&doc),
            &fixed_clock(),
            Path::new("/nonexistent/dir/report.html"),
        )
        .unwrap_err();

        assert!(matches!(err, ReportError::Write { .. }));
    }
}
