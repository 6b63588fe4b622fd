//! LLM backend abstraction: chat completion + embeddings (§6 "Consumed: LLM
//! provider"). Concrete backends talk to an Ollama-compatible or an
//! OpenAI-compatible HTTP endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// External calls to the LLM provider carry a 60s timeout (§5).
pub const LLM_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error talking to LLM backend: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM reply did not conform to the expected JSON schema: {0}")]
    SchemaViolation(String),

    #[error("no backend registered for role {0:?}")]
    NoBackendForRole(String),
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// If set, ask the provider for a JSON-mode response (structure parser, §4.2).
    pub json_mode: bool,
    pub stream: bool,
}

impl LlmRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages, ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A streamed completion delta — one per `token` event (§4.6.2).
#[derive(Debug, Clone)]
pub struct LlmStreamDelta {
    pub text: String,
    pub done: bool,
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse>;

    /// Streaming completion. The default implementation falls back to a
    /// single non-streamed call wrapped as one delta, matching the
    /// "if no tokens were streamed" branch of §4.6.2's `answer` event.
    async fn complete_stream(
        &self,
        req: LlmRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<LlmStreamDelta>> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let resp = self.complete(req).await?;
        let _ = tx
            .send(LlmStreamDelta { text: resp.content, done: true })
            .await;
        Ok(rx)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_id(&self) -> &str;
    fn is_local(&self) -> bool;
    fn max_context_tokens(&self) -> u32;
    fn max_output_tokens(&self) -> u32;
}

/// Talks to an Ollama-compatible `/api/chat` and `/api/embeddings` endpoint.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(LLM_TIMEOUT)
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            model: model.into(),
            embedding_model: embedding_model.into(),
        }
    }
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct OllamaMessage {
    content: String,
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse> {
        let body = OllamaChatRequest {
            model: req.model.as_deref().unwrap_or(&self.model),
            messages: &req.messages,
            stream: false,
            format: if req.json_mode { Some("json") } else { None },
        };

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LlmError::Unavailable(format!("ollama returned {}", resp.status())));
        }

        let parsed: OllamaChatResponse = resp.json().await?;
        Ok(LlmResponse {
            content: parsed.message.content,
            model: req.model.unwrap_or_else(|| self.model.clone()),
            prompt_tokens: parsed.prompt_eval_count,
            completion_tokens: parsed.eval_count,
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = OllamaEmbedRequest { model: &self.embedding_model, input: texts };
        let resp = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LlmError::Unavailable(format!("ollama returned {}", resp.status())));
        }

        let parsed: OllamaEmbedResponse = resp.json().await?;
        Ok(parsed.embeddings)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn is_local(&self) -> bool {
        true
    }

    fn max_context_tokens(&self) -> u32 {
        8192
    }

    fn max_output_tokens(&self) -> u32 {
        2048
    }
}

/// Talks to an OpenAI-compatible `/v1/chat/completions` and `/v1/embeddings`
/// endpoint (covers OpenAI itself and any drop-in-compatible provider).
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: secret_holder::ApiKey,
    model: String,
    embedding_model: String,
}

/// Keeps the API key out of `Debug`/log output without pulling in `secrecy`
/// as a second redaction crate alongside the one already used elsewhere.
mod secret_holder {
    #[derive(Clone)]
    pub struct ApiKey(String);
    impl ApiKey {
        pub fn new(s: impl Into<String>) -> Self {
            Self(s.into())
        }
        pub fn expose(&self) -> &str {
            &self.0
        }
    }
    impl std::fmt::Debug for ApiKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "ApiKey(***)")
        }
    }
}

impl OpenAiBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(LLM_TIMEOUT)
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            api_key: secret_holder::ApiKey::new(api_key),
            model: model.into(),
            embedding_model: embedding_model.into(),
        }
    }
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
    model: String,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse> {
        let body = OpenAiChatRequest {
            model: req.model.as_deref().unwrap_or(&self.model),
            messages: &req.messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            response_format: if req.json_mode {
                Some(serde_json::json!({"type": "json_object"}))
            } else {
                None
            },
        };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LlmError::Unavailable(format!("openai-compatible backend returned {}", resp.status())));
        }

        let parsed: OpenAiChatResponse = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: parsed.model,
            prompt_tokens: parsed.usage.prompt_tokens,
            completion_tokens: parsed.usage.completion_tokens,
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = OpenAiEmbedRequest { model: &self.embedding_model, input: texts };
        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(LlmError::Unavailable(format!("openai-compatible backend returned {}", resp.status())));
        }

        let parsed: OpenAiEmbedResponse = resp.json().await?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn is_local(&self) -> bool {
        false
    }

    fn max_context_tokens(&self) -> u32 {
        128_000
    }

    fn max_output_tokens(&self) -> u32 {
        4096
    }
}
