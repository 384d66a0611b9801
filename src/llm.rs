//! Chat-model provider implementations.
//!
//! Concrete backends for the [`ChatModel`] trait from `docqa-core`:
//! - **[`GeminiChat`]**: Google `generateContent` (default `gemini-2.0-flash`).
//!   Requires `GOOGLE_API_KEY`.
//! - **[`OpenAIChat`]**: `POST /v1/chat/completions`. Requires `OPENAI_API_KEY`.
//! - **[`OllamaChat`]**: `POST {url}/api/chat` with streaming off.
//! - **[`DisabledChat`]**: fails every call.
//!
//! Like the embedding providers, each call is a single request; the
//! pipeline owns timeouts and retries.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use docqa_core::chat::{ChatMessage, ChatModel, ChatRole};
use docqa_core::error::ModelError;

use crate::config::LlmConfig;
use crate::http::{build_client, send_json};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

// ============ Disabled ============

pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ModelError> {
        Err(ModelError::Disabled)
    }
}

// ============ Gemini ============

pub struct GeminiChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl GeminiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| anyhow!("GOOGLE_API_KEY environment variable not set"))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: base_url(config, GEMINI_BASE_URL),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            temperature: config.temperature,
            timeout,
        })
    }
}

/// Gemini takes system instructions separately from the turn list and
/// calls the assistant role `model`.
fn gemini_request(messages: &[ChatMessage], temperature: f32) -> serde_json::Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let contents: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| {
            let role = if m.role == ChatRole::Assistant {
                "model"
            } else {
                "user"
            };
            serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": { "temperature": temperature },
    });
    if !system.is_empty() {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{ "text": system.join("\n\n") }]
        });
    }
    body
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<String, ModelError> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| ModelError::InvalidResponse("Gemini response has no candidates".into()))?;
    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

#[async_trait]
impl ChatModel for GeminiChat {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let request = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&gemini_request(messages, self.temperature));
        let json = send_json(request, "Gemini", self.timeout).await?;
        parse_gemini_response(&json)
    }
}

// ============ OpenAI ============

pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: base_url(config, OPENAI_BASE_URL),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            temperature: config.temperature,
            timeout,
        })
    }
}

fn role_messages(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
        .collect()
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String, ModelError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| ModelError::InvalidResponse("OpenAI response has no message content".into()))
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": role_messages(messages),
            "temperature": self.temperature,
        });
        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);
        let json = send_json(request, "OpenAI", self.timeout).await?;
        parse_openai_response(&json)
    }
}

// ============ Ollama ============

pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url(config, OLLAMA_BASE_URL),
            model: config.model.clone().unwrap_or_else(|| "llama3.2".to_string()),
            temperature: config.temperature,
            timeout,
        })
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<String, ModelError> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| ModelError::InvalidResponse("Ollama response has no message content".into()))
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": role_messages(messages),
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let request = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body);
        let json = send_json(request, "Ollama", self.timeout).await?;
        parse_ollama_response(&json)
    }
}

fn base_url(config: &LlmConfig, default: &str) -> String {
    config
        .url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Create the [`ChatModel`] named by `config.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat)),
        "gemini" => Ok(Arc::new(GeminiChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
