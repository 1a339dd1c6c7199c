//! Chat delivery
//!
//! [`ChatSink`] is the one seam between report generation and transport.
//! [`SlackClient`] posts to the Slack Web API; [`ConsoleSink`] prints the
//! same payloads for dry runs.
//!
//! Channel names are resolved to IDs through a [`ChannelCache`] owned by the
//! client, so a name is looked up at most once per process.

use std::collections::HashMap;
use std::io::{self, Write};

use report_kit::render::blocks::Block;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};

/// Slack Web API root
pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// A file to attach to the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub filename: String,
    pub title: String,
    pub comment: Option<String>,
    pub content: String,
}

/// Destination for notifications
pub trait ChatSink {
    fn send_text(&mut self, text: &str) -> Result<(), SinkError>;

    /// Rich message; `fallback` is shown where blocks cannot be rendered
    fn send_blocks(&mut self, blocks: &[Block], fallback: &str) -> Result<(), SinkError>;

    fn upload(&mut self, request: &UploadRequest) -> Result<(), SinkError>;
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while delivering to a sink
#[derive(Debug)]
pub enum SinkError {
    /// Transport failure
    Http(reqwest::Error),
    /// The API answered with `ok: false`
    Api { method: &'static str, error: String },
    /// The channel name matched no visible conversation
    ChannelNotFound(String),
    /// Payload could not be encoded
    Encode(serde_json::Error),
    /// Local output failed
    Io(io::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Http(e) => write!(f, "HTTP request failed: {}", e),
            SinkError::Api { method, error } => write!(f, "Slack {} failed: {}", method, error),
            SinkError::ChannelNotFound(name) => write!(f, "Channel not found: {}", name),
            SinkError::Encode(e) => write!(f, "Failed to encode payload: {}", e),
            SinkError::Io(e) => write!(f, "Failed to write output: {}", e),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Http(e) => Some(e),
            SinkError::Encode(e) => Some(e),
            SinkError::Io(e) => Some(e),
            SinkError::Api { .. } | SinkError::ChannelNotFound(_) => None,
        }
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        SinkError::Http(e)
    }
}

impl From<io::Error> for SinkError {
    fn from(e: io::Error) -> Self {
        SinkError::Io(e)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError::Encode(e)
    }
}

// ============================================================================
// Channel cache
// ============================================================================

/// Name-to-ID lookups remembered for the life of the owner
#[derive(Debug, Default, Clone)]
pub struct ChannelCache {
    ids: HashMap<String, String>,
}

impl ChannelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached ID for `name`, if any
    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.ids.get(normalize_channel(name)).map(String::as_str)
    }

    /// Look `name` up, calling `resolver` only on a miss
    ///
    /// Names that already look like conversation IDs are returned unchanged
    /// and never cached. Resolver errors leave the cache untouched.
    pub fn resolve_with<F, E>(&mut self, name: &str, resolver: F) -> Result<String, E>
    where
        F: FnOnce(&str) -> Result<String, E>,
    {
        if looks_like_channel_id(name) {
            return Ok(name.to_string());
        }

        let key = normalize_channel(name);
        if let Some(id) = self.ids.get(key) {
            return Ok(id.clone());
        }

        let id = resolver(key)?;
        log::debug!("Resolved channel #{} to {}", key, id);
        self.ids.insert(key.to_string(), id.clone());
        Ok(id)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn normalize_channel(name: &str) -> &str {
    name.trim().trim_start_matches('#')
}

/// `C…`, `G…` or `D…` followed by upper-case alphanumerics
fn looks_like_channel_id(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some('C' | 'G' | 'D'))
        && name.len() >= 9
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

// ============================================================================
// Slack
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConversationsPage {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channels: Vec<ConversationInfo>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ConversationInfo {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

/// Slack Web API client bound to one channel
pub struct SlackClient {
    http: Client,
    base_url: String,
    token: String,
    channel: String,
    channels: ChannelCache,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::with_base_url(token, channel, SLACK_API_BASE)
    }

    /// Client against a different API root
    pub fn with_base_url(
        token: impl Into<String>,
        channel: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            channel: channel.into(),
            channels: ChannelCache::new(),
        }
    }

    fn post_message(&self, body: &Value) -> Result<(), SinkError> {
        let response: ApiResponse = self
            .http
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.token)
            .json(body)
            .send()?
            .error_for_status()?
            .json()?;
        check_ok("chat.postMessage", response.ok, response.error)
    }

    fn resolve_channel_id(&mut self) -> Result<String, SinkError> {
        let http = &self.http;
        let base_url = &self.base_url;
        let token = &self.token;
        self.channels
            .resolve_with(&self.channel, |name| lookup_channel_id(http, base_url, token, name))
    }
}

impl ChatSink for SlackClient {
    fn send_text(&mut self, text: &str) -> Result<(), SinkError> {
        self.post_message(&json!({ "channel": self.channel, "text": text }))?;
        log::info!("Message sent successfully to {}", self.channel);
        Ok(())
    }

    fn send_blocks(&mut self, blocks: &[Block], fallback: &str) -> Result<(), SinkError> {
        self.post_message(&json!({
            "channel": self.channel,
            "text": fallback,
            "blocks": blocks,
        }))?;
        log::info!("Rich message sent successfully to {}", self.channel);
        Ok(())
    }

    fn upload(&mut self, request: &UploadRequest) -> Result<(), SinkError> {
        let channel_id = self.resolve_channel_id()?;

        let mut form = vec![
            ("channels", channel_id.as_str()),
            ("content", request.content.as_str()),
            ("filename", request.filename.as_str()),
            ("filetype", "html"),
            ("title", request.title.as_str()),
        ];
        if let Some(comment) = &request.comment {
            form.push(("initial_comment", comment.as_str()));
        }

        let response: ApiResponse = self
            .http
            .post(format!("{}/files.upload", self.base_url))
            .bearer_auth(&self.token)
            .form(&form)
            .send()?
            .error_for_status()?
            .json()?;
        check_ok("files.upload", response.ok, response.error)?;

        log::info!("File {} sent successfully to {}", request.filename, self.channel);
        Ok(())
    }
}

fn check_ok(method: &'static str, ok: bool, error: Option<String>) -> Result<(), SinkError> {
    if ok {
        Ok(())
    } else {
        let error = error.unwrap_or_else(|| "unknown_error".to_string());
        log::error!("Slack {} returned error: {}", method, error);
        Err(SinkError::Api { method, error })
    }
}

/// Page through `conversations.list` until `name` is found
fn lookup_channel_id(
    http: &Client,
    base_url: &str,
    token: &str,
    name: &str,
) -> Result<String, SinkError> {
    let mut cursor = String::new();
    loop {
        let page: ConversationsPage = {
            let mut query = vec![
                ("types", "public_channel,private_channel"),
                ("exclude_archived", "true"),
                ("limit", "200"),
            ];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.as_str()));
            }

            http.get(format!("{}/conversations.list", base_url))
                .bearer_auth(token)
                .query(&query)
                .send()?
                .error_for_status()?
                .json()?
        };
        check_ok("conversations.list", page.ok, page.error)?;

        if let Some(found) = page.channels.into_iter().find(|c| c.name == name) {
            return Ok(found.id);
        }

        cursor = page
            .response_metadata
            .map(|m| m.next_cursor)
            .unwrap_or_default();
        if cursor.is_empty() {
            return Err(SinkError::ChannelNotFound(name.to_string()));
        }
    }
}

// ============================================================================
// Console
// ============================================================================

/// Prints payloads as JSON instead of delivering them
pub struct ConsoleSink<W: Write> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, payload: &Value) -> Result<(), SinkError> {
        let rendered = serde_json::to_string_pretty(payload)?;
        writeln!(self.out, "{}", rendered)?;
        Ok(())
    }
}

impl<W: Write> ChatSink for ConsoleSink<W> {
    fn send_text(&mut self, text: &str) -> Result<(), SinkError> {
        self.emit(&json!({ "kind": "text", "text": text }))
    }

    fn send_blocks(&mut self, blocks: &[Block], fallback: &str) -> Result<(), SinkError> {
        self.emit(&json!({ "kind": "blocks", "text": fallback, "blocks": blocks }))
    }

    fn upload(&mut self, request: &UploadRequest) -> Result<(), SinkError> {
        self.emit(&json!({
            "kind": "upload",
            "filename": request.filename,
            "title": request.title,
            "comment": request.comment,
            "bytes": request.content.len(),
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
#[cfg(test)]
mod tests {
    use super::*;
    use report_kit::render::blocks::render_test_blocks;

    #[test]
    fn test_cache_resolves_once() {
        let mut cache = ChannelCache::new();
        let mut calls = 0;

        for _ in 0..3 {
            let id: Result<String, SinkError> = cache.resolve_with("#kube-bench", |name| {
                calls += 1;
                assert_eq!(name, "kube-bench");
                Ok("C0123456789".to_string())
            });
            assert_eq!(id.unwrap(), "C0123456789");
        }

        assert_eq!(calls, 1);
        assert_eq!(cache.get("kube-bench"), Some("C0123456789"));
    }

    #[test]
    fn test_cache_passes_ids_through() {
        let mut cache = ChannelCache::new();
        let id: Result<String, SinkError> =
            cache.resolve_with("C0123456789", |_| panic!("resolver must not run"));

        assert_eq!(id.unwrap(), "C0123456789");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_does_not_store_failures() {
        let mut cache = ChannelCache::new();
        let first: Result<String, SinkError> =
            cache.resolve_with("#missing", |n| Err(SinkError::ChannelNotFound(n.to_string())));

        assert!(matches!(first, Err(SinkError::ChannelNotFound(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_channel_id_shape() {
        assert!(looks_like_channel_id("C0123456789"));
        assert!(looks_like_channel_id("G01ABCDEF12"));
        assert!(!looks_like_channel_id("#kube-bench"));
        assert!(!looks_like_channel_id("general"));
        assert!(!looks_like_channel_id("Cabc"));
    }

    #[test]
    fn test_console_sink_prints_payloads() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.send_text("hello").unwrap();
        sink.send_blocks(&render_test_blocks(), "fallback").unwrap();
        sink.upload(&UploadRequest {
            filename: "report.html".into(),
            title: "Report".into(),
            comment: None,
            content: "<html></html>".into(),
        })
        .unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.contains("\"text\": \"hello\""));
        assert!(out.contains("\"type\": \"header\""));
        assert!(out.contains("\"bytes\": 13"));
        assert!(!out.contains("<html>"));
    }

    #[test]
    fn test_api_error_is_reported() {
        let err = check_ok("chat.postMessage", false, Some("channel_not_found".into())).unwrap_err();
        assert_eq!(err.to_string(), "Slack chat.postMessage failed: channel_not_found");
        assert!(check_ok("chat.postMessage", true, None).is_ok());
    }
}
