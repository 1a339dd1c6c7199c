//! Chat message blocks
//!
//! Typed Block Kit structures plus the renderers that produce them. A block
//! list serializes straight into the `blocks` field of a chat message.
//!
//! ```text
//! header   ✅/⚠️/❌ Kube-bench Security Scan Results
//! section  Status + Version
//! section  Total | Passed | Failed | Warnings
//! divider  + up to 3 critical control callouts
//! divider  + one line per control
//! divider  + context footer with timestamp
//! ```

use serde::Serialize;
use serde_json::Value;

use super::{pass_rate_emoji, Clock};
use crate::projector::Summary;

/// Maximum characters the chat platform accepts in one section text
pub const SLACK_TEXT_LIMIT: usize = 3000;

/// Critical controls called out in a chat report
pub const MAX_CRITICAL_CALLOUTS: usize = 3;

const TRUNCATION_MARKER: &str = "\n… (truncated)";
const ZERO_WIDTH_SPACE: char = '\u{200B}';

// ============================================================================
// Block types
// ============================================================================

/// A text object inside a block
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Text {
    PlainText {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        emoji: Option<bool>,
    },
    Mrkdwn {
        text: String,
    },
}

impl Text {
    pub fn plain(text: impl Into<String>) -> Self {
        Text::PlainText {
            text: text.into(),
            emoji: None,
        }
    }

    /// Plain text with emoji shortcodes enabled
    pub fn plain_emoji(text: impl Into<String>) -> Self {
        Text::PlainText {
            text: text.into(),
            emoji: Some(true),
        }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Text::Mrkdwn { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Text::PlainText { text, .. } | Text::Mrkdwn { text } => text,
        }
    }
}

/// One layout block of a chat message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header {
        text: Text,
    },
    Section {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<Text>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fields: Vec<Text>,
    },
    Divider,
    Context {
        elements: Vec<Text>,
    },
}

impl Block {
    pub fn header(text: Text) -> Self {
        Block::Header { text }
    }

    /// Section with a single markdown text
    pub fn section(text: impl Into<String>) -> Self {
        Block::Section {
            text: Some(Text::mrkdwn(text)),
            fields: Vec::new(),
        }
    }

    /// Section laid out as a field grid
    pub fn fields(fields: Vec<Text>) -> Self {
        Block::Section { text: None, fields }
    }

    pub fn divider() -> Self {
        Block::Divider
    }

    pub fn context(text: impl Into<String>) -> Self {
        Block::Context {
            elements: vec![Text::mrkdwn(text)],
        }
    }

    /// Main text of a header or section
    pub fn text(&self) -> Option<&str> {
        match self {
            Block::Header { text } => Some(text.as_str()),
            Block::Section { text, .. } => text.as_ref().map(Text::as_str),
            Block::Context { elements } => elements.first().map(Text::as_str),
            Block::Divider => None,
        }
    }
}

// ============================================================================
// Renderers
// ============================================================================

/// The scan report message
pub fn render_chat_blocks(summary: &Summary, clock: &dyn Clock) -> Vec<Block> {
    let counts = &summary.counts;
    let mut blocks = vec![
        Block::header(Text::plain_emoji(format!(
            "{} Kube-bench Security Scan Results",
            summary.status.emoji()
        ))),
        Block::section(format!(
            "*Status:* {}\n*Version:* {}",
            summary.status.label(),
            summary.version
        )),
        Block::fields(vec![
            Text::mrkdwn(format!("*Total Tests:*\n`{}`", summary.total_tests())),
            Text::mrkdwn(format!("*Passed:*\n✅ `{}`", counts.passed)),
            Text::mrkdwn(format!("*Failed:*\n❌ `{}`", counts.failed)),
            Text::mrkdwn(format!("*Warnings:*\n⚠️ `{}`", counts.warned)),
        ]),
    ];

    if !summary.critical_controls.is_empty() {
        blocks.push(Block::divider());
        blocks.push(Block::section(format!(
            "*🚨 Critical Areas (>{} failures):*",
            summary.thresholds.critical_control_fails
        )));
        for critical in summary.critical_controls.iter().take(MAX_CRITICAL_CALLOUTS) {
            blocks.push(Block::section(format!(
                "• {}\n  Failed: `{}` tests",
                critical.title(),
                critical.failed
            )));
        }
    }

    if !summary.controls.is_empty() {
        blocks.push(Block::divider());
        blocks.push(Block::section("*📊 Control Summary:*"));
        for control in &summary.controls {
            let rate = control.pass_rate();
            blocks.push(Block::section(format!(
                "{} *{}*\nPass: `{}` | Fail: `{}` | Warn: `{}` | Pass Rate: `{:.1}%`",
                pass_rate_emoji(rate),
                control.title(),
                control.counts.passed,
                control.counts.failed,
                control.counts.warned,
                rate
            )));
        }
    }

    blocks.push(Block::divider());
    blocks.push(Block::context(format!(
        "⏰ Scan completed: {} | 📄 Full HTML report attached below",
        clock.timestamp()
    )));

    blocks
}

/// Fixed connectivity check message
pub fn render_test_blocks() -> Vec<Block> {
    vec![
        Block::header(Text::plain("🔒 Kube-bench Security Test Report")),
        Block::fields(vec![
            Text::mrkdwn("*Test Status:*\n✅ Connection Working"),
            Text::mrkdwn("*Bot Status:*\n🤖 Ready for kube-bench"),
        ]),
        Block::divider(),
        Block::section(
            "This is a *test message* to verify the kube-bench Slack integration is working correctly! 🎉",
        ),
    ]
}

/// Title header followed by the pretty-printed JSON of `data`
pub fn render_json_block(data: &Value, title: &str) -> Vec<Block> {
    vec![
        Block::header(Text::plain(title)),
        json_section(data, SLACK_TEXT_LIMIT),
    ]
}

/// A single section holding `data` as a fenced JSON code block
///
/// The whole section text, fences and truncation marker included, stays
/// within `limit` characters whenever `limit` leaves room for the fences.
pub fn json_section(data: &Value, limit: usize) -> Block {
    let pretty = serde_json::to_string_pretty(data)
        .unwrap_or_else(|e| format!("<unserializable data: {}>", e));
    Block::section(fenced_code("json", &pretty, limit))
}

/// AI analysis summary message
pub fn render_analysis_blocks(text: &str) -> Vec<Block> {
    vec![
        Block::header(Text::plain_emoji("🤖 AI Security Analysis Report")),
        Block::section("*AI-Powered Security Analysis*\nGenerated from kube-bench scan results"),
        Block::divider(),
        Block::section(fenced_code("", text, SLACK_TEXT_LIMIT)),
    ]
}

/// Escape the three characters the chat markup reserves
pub fn escape_mrkdwn(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escaped body wrapped in a code fence, cut to fit `limit`
///
/// The fence is always closed and the body can never close it early.
/// Truncation counts characters, never splits a UTF-8 sequence and never
/// leaves half an entity behind.
fn fenced_code(lang: &str, body: &str, limit: usize) -> String {
    let open = format!("```{}\n", lang);
    let close = "\n```";
    let escaped = break_backtick_runs(&escape_mrkdwn(body));

    let overhead = open.chars().count() + close.chars().count();
    if overhead + escaped.chars().count() <= limit {
        return format!("{}{}{}", open, escaped, close);
    }

    let budget = limit.saturating_sub(overhead + TRUNCATION_MARKER.chars().count());
    let mut kept: String = escaped.chars().take(budget).collect();
    if let Some(amp) = kept.rfind('&') {
        if !kept[amp..].contains(';') {
            kept.truncate(amp);
        }
    }

    log::debug!(
        "Code block truncated from {} to {} characters",
        escaped.chars().count(),
        kept.chars().count()
    );

    format!("{}{}{}{}", open, kept, TRUNCATION_MARKER, close)
}

/// Separate adjacent backticks with a zero-width space so no run can form a fence
fn break_backtick_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_tick = false;
    for c in s.chars() {
        if c == '`' && prev_tick {
            out.push(ZERO_WIDTH_SPACE);
        }
        prev_tick = c == '`';
        out.push(c);
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ScanDocument;
    use crate::parser;
    use crate::projector::{project, SummaryProjector, Thresholds};
    use crate::render::tests::fixed_clock;
    use serde_json::json;

    fn section_texts(blocks: &[Block]) -> Vec<String> {
        blocks
            .iter()
            .filter_map(|b| b.text().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_chat_blocks_layout() {
        let summary = project(&parser::fixture());
        let blocks = render_chat_blocks(&summary, &fixed_clock());

        assert!(matches!(blocks[0], Block::Header { .. }));
        assert!(blocks[0].text().unwrap().contains("Kube-bench Security Scan Results"));
        assert_eq!(
            blocks[1].text().unwrap(),
            format!("*Status:* {}\n*Version:* 1.29", summary.status.label())
        );
        match &blocks[2] {
            Block::Section { fields, .. } => assert_eq!(fields.len(), 4),
            other => panic!("expected field section, got {:?}", other),
        }

        let footer = blocks.last().unwrap().text().unwrap();
        assert!(footer.contains("2025-03-14 09:26:53 UTC"));
    }

    #[test]
    fn test_chat_blocks_control_lines() {
        let summary = project(&parser::fixture());
        let texts = section_texts(&render_chat_blocks(&summary, &fixed_clock()));
        let control_lines: Vec<&String> = texts.iter().filter(|t| t.contains("Pass Rate:")).collect();

        assert_eq!(control_lines.len(), summary.controls.len());
        for (line, control) in control_lines.iter().zip(&summary.controls) {
            assert!(line.contains(&control.title()));
            assert!(line.contains(&format!("{:.1}%", control.pass_rate())));
        }
    }

    #[test]
    fn test_critical_callouts_capped_at_three() {
        let controls: Vec<Value> = (1..=5)
            .map(|i| json!({ "id": i.to_string(), "text": "hot", "total_fail": 10 }))
            .collect();
        let summary = project(&ScanDocument::from(json!({ "Controls": controls })));
        let texts = section_texts(&render_chat_blocks(&summary, &fixed_clock()));

        assert_eq!(summary.critical_controls.len(), 5);
        assert!(texts.iter().any(|t| t.contains("Critical Areas (>5 failures)")));
        assert_eq!(texts.iter().filter(|t| t.starts_with("• ")).count(), 3);
    }

    #[test]
    fn test_critical_heading_follows_thresholds() {
        let projector = SummaryProjector::new().with_thresholds(Thresholds {
            critical_control_fails: 2,
            critical_status_fails: 10,
        });
        let summary = projector.project(&ScanDocument::from(json!({
            "Controls": [{ "id": "1", "text": "warm", "total_fail": 3 }]
        })));
        let texts = section_texts(&render_chat_blocks(&summary, &fixed_clock()));

        assert!(texts.iter().any(|t| t.contains("Critical Areas (>2 failures)")));
        assert!(!texts.iter().any(|t| t.contains("(>5 failures)")));
    }

    #[test]
    fn test_no_critical_section_when_clean() {
        let summary = project(&ScanDocument::from(json!({ "Controls": [{ "id": "1", "total_pass": 4 }] })));
        let texts = section_texts(&render_chat_blocks(&summary, &fixed_clock()));

        assert!(texts[0].starts_with("✅"));
        assert!(!texts.iter().any(|t| t.contains("Critical Areas")));
    }

    #[test]
    fn test_blocks_serialize_as_block_kit() {
        let value = serde_json::to_value(render_test_blocks()).unwrap();

        assert_eq!(value[0]["type"], "header");
        assert_eq!(value[0]["text"]["type"], "plain_text");
        assert_eq!(value[1]["fields"][0]["type"], "mrkdwn");
        assert!(value[1].get("text").is_none());
        assert_eq!(value[2], json!({ "type": "divider" }));
    }

    #[test]
    fn test_small_json_block_is_untouched() {
        let blocks = render_json_block(&json!({ "status": "ok" }), "Integration Status");
        let text = blocks[1].text().unwrap();

        assert_eq!(blocks[0].text().unwrap(), "Integration Status");
        assert_eq!(text, "```json\n{\n  \"status\": \"ok\"\n}\n```");
    }

    #[test]
    fn test_large_json_block_is_truncated_to_limit() {
        let payload = json!({ "payload": "x".repeat(5000) });
        let block = json_section(&payload, SLACK_TEXT_LIMIT);
        let text = block.text().unwrap();

        assert!(text.chars().count() <= SLACK_TEXT_LIMIT);
        assert!(text.starts_with("```json\n{"));
        assert!(text.ends_with("\n```"));
        assert!(text.contains("(truncated)"));
    }

    #[test]
    fn test_truncation_never_splits_entities_or_chars() {
        let payload = json!({ "payload": "<é>".repeat(2000) });
        let block = json_section(&payload, SLACK_TEXT_LIMIT);
        let text = block.text().unwrap();
        let body = text
            .strip_prefix("```json\n")
            .and_then(|t| t.strip_suffix(&format!("{}\n```", TRUNCATION_MARKER)))
            .unwrap();

        assert!(text.chars().count() <= SLACK_TEXT_LIMIT);
        assert!(!body.contains('<'));
        let last_amp = body.rfind('&').unwrap();
        assert!(body[last_amp..].contains(';'));
    }

    #[test]
    fn test_backtick_runs_cannot_close_the_fence() {
        let blocks = render_analysis_blocks("before\n```\n*bold* after ``");
        let text = blocks[3].text().unwrap();
        let body = text.strip_prefix("```\n").and_then(|t| t.strip_suffix("\n```")).unwrap();

        assert!(!body.contains("``"));
        assert_eq!(body.replace(ZERO_WIDTH_SPACE, ""), "before\n```\n*bold* after ``");
        assert_eq!(text.matches("```").count(), 2);
    }

    #[test]
    fn test_analysis_blocks_fit_limit() {
        let blocks = render_analysis_blocks(&"finding ".repeat(1000));

        assert_eq!(blocks.len(), 4);
        assert!(blocks[3].text().unwrap().chars().count() <= SLACK_TEXT_LIMIT);
        assert!(blocks[3].text().unwrap().ends_with("```"));
    }
}
