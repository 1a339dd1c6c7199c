//! Standalone AI analysis page
//!
//! The analysis text is free-form. It is escaped first, then a handful of
//! recognizable markers are decorated: severity ratings become coloured
//! badges, known section headers become headings, `N. Rank: M` becomes a
//! rank marker and finding labels are emphasised. Nothing else is parsed.

use std::sync::OnceLock;

use regex::Regex;

use super::{escape_html, Clock};

struct BadgeRules {
    severities: Vec<(Regex, &'static str)>,
    headers: Regex,
    rank: Regex,
    labels: Regex,
}

impl BadgeRules {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            severities: vec![
                (
                    Regex::new(r"(?i)Severity:\s*Critical")?,
                    r#"<span class="severity-critical">🔴 Critical</span>"#,
                ),
                (
                    Regex::new(r"(?i)Severity:\s*High")?,
                    r#"<span class="severity-high">🟠 High</span>"#,
                ),
                (
                    Regex::new(r"(?i)Severity:\s*Medium")?,
                    r#"<span class="severity-medium">🟡 Medium</span>"#,
                ),
                (
                    Regex::new(r"(?i)Severity:\s*Low")?,
                    r#"<span class="severity-low">🟢 Low</span>"#,
                ),
            ],
            headers: Regex::new(
                r"(?m)^(EXECUTIVE SUMMARY:|CRITICAL FINDINGS:|RISK ASSESSMENT:|REMEDIATION ROADMAP:|COMPLIANCE STATUS:)",
            )?,
            rank: Regex::new(r"(\d+)\.\s*Rank:\s*(\d+)")?,
            // the apostrophe is already escaped when labels are matched
            labels: Regex::new(
                r"(?i)(Test:|WHY IT(?:&#39;|')S DANGEROUS:|EXPLANATION:|Remediation:|Estimated time:)",
            )?,
        })
    }
}

fn rules() -> Option<&'static BadgeRules> {
    static RULES: OnceLock<Option<BadgeRules>> = OnceLock::new();
    RULES
        .get_or_init(|| match BadgeRules::compile() {
            Ok(rules) => Some(rules),
            Err(e) => {
                log::error!("Severity badge patterns failed to compile: {}", e);
                None
            }
        })
        .as_ref()
}

/// Escape `text` and decorate severity, section, rank and label markers
pub fn add_severity_badges(text: &str) -> String {
    let escaped = escape_html(text);
    let Some(rules) = rules() else {
        return escaped;
    };

    let mut out = escaped;
    for (pattern, badge) in &rules.severities {
        out = pattern.replace_all(&out, *badge).into_owned();
    }
    out = rules.headers.replace_all(&out, "<h2>$1</h2>").into_owned();
    out = rules
        .rank
        .replace_all(&out, r#"<span class="rank-number">#$2</span>"#)
        .into_owned();
    out = rules
        .labels
        .replace_all(&out, r#"<span class="label">$1</span>"#)
        .into_owned();
    out
}

/// Wrap analysis text in a styled standalone page
pub fn render_analysis_html(text: &str, clock: &dyn Clock) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>AI Security Analysis Report</title>
    <style>
{style}
    </style>
</head>
<body>
    <div class="container">
        <h1>🤖 AI Security Analysis Report</h1>
        <div class="timestamp">Generated: {timestamp}</div>
        <div class="content-text">{content}</div>
    </div>
</body>
</html>
"##,
        style = STYLE,
        timestamp = clock.timestamp(),
        content = add_severity_badges(text.trim()),
    )
}

const STYLE: &str = r#"        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            padding: 20px;
            line-height: 1.7;
        }
        .container {
            max-width: 1100px;
            margin: 0 auto;
            background: white;
            border-radius: 12px;
            padding: 40px;
            box-shadow: 0 20px 60px rgba(0,0,0,0.3);
        }
        h1 { color: #1f2937; border-bottom: 4px solid #667eea; padding-bottom: 15px; }
        h2 { color: #4c1d95; margin-top: 30px; margin-bottom: 10px; }
        .severity-critical, .severity-high, .severity-medium, .severity-low {
            color: white;
            padding: 3px 12px;
            border-radius: 12px;
            font-weight: bold;
            font-size: 0.9em;
        }
        .severity-critical { background: #dc2626; }
        .severity-high { background: #ea580c; }
        .severity-medium { background: #ca8a04; }
        .severity-low { background: #16a34a; }
        .rank-number {
            display: inline-block;
            margin-top: 25px;
            background: #667eea;
            color: white;
            font-weight: bold;
            padding: 4px 12px;
            border-radius: 50%;
        }
        .label { font-weight: bold; color: #4c1d95; }
        .timestamp { color: #6b7280; font-size: 0.9em; margin-bottom: 20px; }
        .content-text { white-space: pre-wrap; color: #374151; }"#;
