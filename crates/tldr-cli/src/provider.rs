//! OpenAI-compatible summarizer adapter.
//!
//! Sends one `POST {base_url}/chat/completions` per summary request and maps
//! HTTP failures onto the two error classes the pipeline understands:
//!
//! | Failure                                       | Class      |
//! |-----------------------------------------------|------------|
//! | transport error, 401/403/408/429, 5xx         | `Provider` |
//! | missing or empty choices / content            | `Provider` |
//! | 400/413/422, `finish_reason = content_filter` | `Content`  |

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tldr_core::{Summarizer, SummarizerError, SummaryKind, SummaryRequest};
use tracing::debug;

use crate::config::{ConfigError, ProviderConfig};

/// Longest body excerpt carried in an error message.
const ERROR_BODY_LIMIT: usize = 300;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Summarizer backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl OpenAiSummarizer {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn build_request(&self, request: &SummaryRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::new("system", system_prompt(request.kind, &request.style_hint)),
                ChatMessage::new("user", request.text.clone()),
            ],
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn name(&self) -> &str {
        &self.model
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<String, SummarizerError> {
        let body = self.build_request(request);
        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| SummarizerError::Provider(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SummarizerError::Provider(format!("invalid response body: {e}")))?;
        let summary = extract_summary(parsed)?;
        debug!(model = %self.model, kind = %request.kind, chars = summary.len(), "completion received");
        Ok(summary)
    }
}

/// Minimal framing per request kind.
pub fn system_prompt(kind: SummaryKind, style_hint: &str) -> String {
    let task = match kind {
        SummaryKind::Whole => "Summarize the text the user sends.",
        SummaryKind::Chunk => {
            "The user sends one part of a longer document. Summarize this part only, \
             keeping names, numbers and conclusions."
        }
        SummaryKind::Merge => {
            "The user sends partial summaries of consecutive parts of one document, in \
             document order, separated by blank lines. Merge them into a single summary \
             that keeps their order."
        }
    };
    if style_hint.trim().is_empty() {
        format!("{task} Reply with the summary only.")
    } else {
        format!("{task} Style: {}. Reply with the summary only.", style_hint.trim())
    }
}

/// Map a non-success HTTP status onto a summarizer error.
pub fn classify_status(status: u16, body: &str) -> SummarizerError {
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    let message = format!("HTTP {status}: {}", excerpt.trim());
    match status {
        400 | 413 | 422 => SummarizerError::Content(message),
        _ => SummarizerError::Provider(message),
    }
}

/// Pull the summary out of a completion response.
pub fn extract_summary(response: ChatResponse) -> Result<String, SummarizerError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| SummarizerError::Provider("response contained no choices".to_string()))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(SummarizerError::Content(
            "completion stopped by the provider's content filter".to_string(),
        ));
    }

    choice
        .message
        .and_then(|m| m.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| SummarizerError::Provider("response contained an empty message".to_string()))
}

/// Check if the endpoint is reachable (GET `{base_url}/models`).
pub async fn check_endpoint(config: &ProviderConfig) -> bool {
    let models_url = format!("{}/models", config.base_url.trim_end_matches('/'));
    let mut request = reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5));
    if let Some(key) = &config.api_key {
        request = request.bearer_auth(key);
    }
    match request.send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> ChatResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn status_classification() {
        for status in [400, 413, 422] {
            assert!(matches!(
                classify_status(status, "refused"),
                SummarizerError::Content(_)
            ));
        }
        for status in [401, 403, 408, 429, 500, 502, 503] {
            assert!(classify_status(status, "").is_retryable(), "status {status}");
        }
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(5_000);
        let err = classify_status(503, &body);
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn extracts_trimmed_content() {
        let parsed = response(
            r#"{"choices":[{"message":{"role":"assistant","content":"  Short summary. \n"},"finish_reason":"stop"}]}"#,
        );
        assert_eq!(extract_summary(parsed).unwrap(), "Short summary.");
    }

    #[test]
    fn content_filter_is_a_content_error() {
        let parsed = response(
            r#"{"choices":[{"message":{"role":"assistant","content":""},"finish_reason":"content_filter"}]}"#,
        );
        assert!(matches!(
            extract_summary(parsed),
            Err(SummarizerError::Content(_))
        ));
    }

    #[test]
    fn missing_choices_is_a_provider_error() {
        let err = extract_summary(response(r#"{"choices":[]}"#)).unwrap_err();
        assert!(err.is_retryable());
        let err = extract_summary(response(r#"{}"#)).unwrap_err();
        assert!(err.is_retryable());
        let err = extract_summary(response(
            r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#,
        ))
        .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn merge_prompt_mentions_order() {
        let prompt = system_prompt(SummaryKind::Merge, "bullets");
        assert!(prompt.contains("order"));
        assert!(prompt.contains("Style: bullets."));
        assert!(!system_prompt(SummaryKind::Whole, "  ").contains("Style"));
    }

    #[test]
    fn request_body_shape() {
        let config = ProviderConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            model: "tiny".to_string(),
            ..Default::default()
        };
        let summarizer = OpenAiSummarizer::from_config(&config).unwrap();
        assert_eq!(summarizer.endpoint(), "http://localhost:9000/v1/chat/completions");

        let body = summarizer.build_request(&SummaryRequest::new(
            "Some text.",
            "concise",
            SummaryKind::Chunk,
        ));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "tiny");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Some text.");
        assert_eq!(json["max_tokens"], 512);
    }
}
