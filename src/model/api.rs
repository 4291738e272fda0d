//! HTTP completion client.
//!
//! Speaks either an OpenAI-compatible chat completions API or Ollama's
//! non-streaming generate API, selected by [`Backend`].

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Backend, ModelConfig};

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A single message in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author: `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: usize,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

/// Token usage statistics for a request. Some compatible servers omit it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// A chat completion response from an OpenAI-compatible API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    /// Text of the first choice, or empty when there are no choices.
    pub fn first_content(&self) -> String {
        self.choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default()
    }
}

/// Non-streaming response from Ollama's `/api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for a completion backend.
#[derive(Debug, Clone)]
pub struct LlmClient {
    pub backend: Backend,
    /// The base URL for API requests (e.g. `"http://localhost:11434"`).
    pub api_base: String,
    /// Bearer token; only sent to the OpenAI-compatible backend.
    pub api_key: String,
    pub model_id: String,
    pub temperature: f64,
    pub max_tokens: usize,
    pub http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build completion HTTP client")?;
        Ok(Self {
            backend: config.backend,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model_id: config.model_id.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            http,
        })
    }

    // ------------------------------------------------------------------
    // Chat completions
    // ------------------------------------------------------------------

    /// Send a chat completion request and return the parsed response.
    ///
    /// Calls `POST {api_base}/chat/completions`.
    pub async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let model = self.model_id.as_str();
        debug!(model, temperature = self.temperature, max_tokens = self.max_tokens, "sending chat completion request");

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let mut req = self.http.post(&url).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req
            .send()
            .await
            .context("failed to send chat completion request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat completion API returned {status}: {text}");
        }

        let chat_response: ChatResponse = resp
            .json()
            .await
            .context("failed to parse chat completion response")?;

        info!(
            model,
            prompt_tokens = chat_response.usage.prompt_tokens,
            completion_tokens = chat_response.usage.completion_tokens,
            "chat completion succeeded"
        );

        Ok(chat_response)
    }

    // ------------------------------------------------------------------
    // Ollama generate
    // ------------------------------------------------------------------

    /// Calls `POST {api_base}/api/generate` with streaming disabled.
    pub async fn ollama_generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.api_base);
        let model = self.model_id.as_str();
        debug!(model, "sending generate request");

        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("failed to send generate request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("generate API returned {status}: {text}");
        }

        let generated: GenerateResponse = resp
            .json()
            .await
            .context("failed to parse generate response")?;

        info!(model, chars = generated.response.len(), "generate succeeded");
        Ok(generated.response)
    }

    /// Send a single user prompt to whichever backend is configured and
    /// return the generated text.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        match self.backend {
            Backend::OpenAi => {
                let messages = [ChatMessage::user(prompt)];
                Ok(self.chat_completion(&messages).await?.first_content())
            }
            Backend::Ollama => self.ollama_generate(prompt).await,
        }
    }
}
