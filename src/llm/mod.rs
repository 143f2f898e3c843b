//! Reqwest-based client for OpenAI-compatible Chat Completions (non-streaming).

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    /// PNG bytes of a rendered chart.
    Image(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
    /// Shown in the chat view instead of `content` (e.g. without the data dump).
    pub display: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self { role, content: MessageContent::Text(text.into()), display: None }
    }

    pub fn image(role: Role, png: Vec<u8>) -> Self {
        Self { role, content: MessageContent::Image(png), display: None }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(t) => Some(t),
            MessageContent::Image(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: Option<u32>,
    /// Prepended when the outgoing messages do not start with a system message.
    pub system_prompt: String,
    pub send_images: bool,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("failed to reach completion endpoint: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM error: {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid completion response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("completion response contained no choices")]
    EmptyChoices,

    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn from_config(cfg: &Config) -> Result<Self, CompletionError> {
        let base_url = cfg
            .get("API_BASE_URL")
            .unwrap_or_else(|| "http://localhost:11434".into());
        Self::new(&base_url, cfg.get("OPENAI_API_KEY"), cfg.get_secs("REQUEST_TIMEOUT"))
    }

    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, CompletionError> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder.build()?;
        Ok(Self { http, base_url: normalize_base_url(base_url), api_key })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One request, one reply: the text of the top choice.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        opts: &ChatOptions,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
        }

        let wire = request_messages(messages, opts);
        let count = wire.len();
        let mut body = serde_json::json!({
            "model": opts.model,
            "temperature": opts.temperature,
            "top_p": opts.top_p,
            "messages": wire,
            "stream": false,
        });
        if let Some(max) = opts.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }

        tracing::debug!(model = %opts.model, messages = count, "sending chat completion");
        let resp = self.http.post(url).headers(headers).json(&body).send().await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(CompletionError::Status { status: status.as_u16(), body: text });
        }

        let parsed: CompletionResponse = serde_json::from_str(&text)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::EmptyChoices)?;
        let content = choice.message.content.unwrap_or_default();
        tracing::debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

/// Outgoing message list: leading system message guaranteed, images optional.
fn request_messages(messages: &[ChatMessage], opts: &ChatOptions) -> Vec<WireMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if messages.first().map(|m| m.role) != Some(Role::System) {
        out.push(WireMessage {
            role: Role::System,
            content: WireContent::Text(opts.system_prompt.clone()),
        });
    }
    for m in messages {
        let content = match &m.content {
            MessageContent::Text(t) => WireContent::Text(t.clone()),
            MessageContent::Image(png) if opts.send_images => {
                WireContent::Parts(vec![ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{}", STANDARD.encode(png)),
                    },
                }])
            }
            MessageContent::Image(_) => continue,
        };
        out.push(WireMessage { role: m.role, content });
    }
    out
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
