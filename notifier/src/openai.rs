//! OpenAI chat-completions provider for the security analysis

use std::time::Duration;

use report_kit::{AnalysisError, AnalysisProvider};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

/// Chat completions endpoint
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 2500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Calls the OpenAI chat-completions API
pub struct OpenAiProvider {
    http: Client,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, AnalysisError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AnalysisError::Unavailable(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            url: OPENAI_CHAT_URL.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request<'a>(&'a self, system: &'a str, user: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        }
    }
}

impl AnalysisProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request(system, user))
            .send()
            .map_err(|e| AnalysisError::Provider(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| AnalysisError::Provider(format!("invalid response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| AnalysisError::Provider("empty completion".to_string()))
    }
}

/// Map an error response onto the analyzer's error kinds
///
/// Only a context-window overflow is distinguished; the analyzer retries
/// on that signal alone.
fn classify_error(status: u16, body: &str) -> AnalysisError {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error)
        .unwrap_or_default();

    let message = detail
        .message
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());

    let overflow = detail.code.as_deref() == Some("context_length_exceeded")
        || message.contains("maximum context length")
        || body.contains("context_length_exceeded");

    if overflow {
        AnalysisError::ContextLengthExceeded(message)
    } else {
        AnalysisError::Provider(format!("HTTP {}: {}", status, message))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Deserialize, Default)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let provider = OpenAiProvider::new("sk-test", "gpt-4").unwrap();
        let body = serde_json::to_value(provider.request("sys", "usr")).unwrap();

        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
        assert_eq!(body["max_tokens"], 2500);
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_context_length_code_is_recognized() {
        let body = r#"{"error": {"message": "This model's maximum context length is 8192 tokens.", "type": "invalid_request_error", "code": "context_length_exceeded"}}"#;
        assert!(matches!(
            classify_error(400, body),
            AnalysisError::ContextLengthExceeded(_)
        ));
    }

    #[test]
    fn test_context_length_message_is_recognized() {
        let body = r#"{"error": {"message": "exceeds maximum context length", "code": null}}"#;
        assert!(matches!(
            classify_error(400, body),
            AnalysisError::ContextLengthExceeded(_)
        ));
    }

    #[test]
    fn test_other_errors_are_provider_errors() {
        match classify_error(429, r#"{"error": {"message": "Rate limit reached", "code": "rate_limit_exceeded"}}"#) {
            AnalysisError::Provider(msg) => assert_eq!(msg, "HTTP 429: Rate limit reached"),
            other => panic!("unexpected {:?}", other),
        }
        match classify_error(502, "Bad Gateway") {
            AnalysisError::Provider(msg) => assert_eq!(msg, "HTTP 502: Bad Gateway"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
