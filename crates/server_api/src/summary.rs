use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_SUMMARY_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_SUMMARY_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str =
    "You brief a sales team on investment firms. Answer in exactly one sentence.";

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("firm summaries are not configured")]
    NotConfigured,
    #[error("summary request failed: {0}")]
    Http(String),
    #[error("summary service returned an unexpected response: {0}")]
    Response(String),
}

#[async_trait]
pub trait FirmSummarizer: Send + Sync {
    async fn summarize(&self, firm_name: &str) -> Result<String, SummaryError>;
}

/// Used when no API key is configured.
pub struct MissingSummarizer;

#[async_trait]
impl FirmSummarizer for MissingSummarizer {
    async fn summarize(&self, _firm_name: &str) -> Result<String, SummaryError> {
        Err(SummaryError::NotConfigured)
    }
}

#[derive(Debug, Clone)]
pub struct SummaryConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl SummaryConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_SUMMARY_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_SUMMARY_MODEL.to_string(),
            timeout_secs: 20,
        }
    }
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiSummarizer {
    http: reqwest::Client,
    config: SummaryConfig,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiSummarizer {
    pub fn new(config: SummaryConfig) -> Result<Self, SummaryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SummaryError::Http(e.to_string()))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl FirmSummarizer for OpenAiSummarizer {
    async fn summarize(&self, firm_name: &str) -> Result<String, SummaryError> {
        let prompt = format!(
            "In one sentence, summarize what the investment firm \"{firm_name}\" is known for."
        );
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.2,
            max_tokens: 80,
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SummaryError::Http(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SummaryError::Http(e.to_string()))?;
        if !status.is_success() {
            warn!(%status, firm = firm_name, "summary: upstream error");
            return Err(SummaryError::Response(format!("HTTP {status}: {text}")));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| SummaryError::Response(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| SummaryError::Response("missing choices".to_string()))?;

        let summary = first_line(&content);
        if summary.is_empty() {
            return Err(SummaryError::Response("empty completion".to_string()));
        }
        debug!(firm = firm_name, chars = summary.len(), "summary: generated");
        Ok(summary)
    }
}

fn first_line(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
#[path = "tests/summary_tests.rs"]
mod tests;
