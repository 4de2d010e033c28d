//! Dialogue backend client
//!
//! Talks to a local Ollama server through `/api/chat` in JSON mode. The raw
//! message content is returned untouched; turning it into a `DialogueReply`
//! is the job of `reply_parser`.

use super::{build_http_client, post_json, ClientError};
use crate::error::{TurnError, TurnResult};
use crate::types::ConversationExchange;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama server address
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub const DEFAULT_DIALOGUE_MODEL: &str = "llama3.2";

const SYSTEM_PROMPT: &str = "You are a warm, encouraging conversation partner helping \
someone practise speaking. Reply in one or two short sentences that sound natural \
when read aloud. Respond ONLY with a JSON object of the form \
{\"emotion\": \"<Joy|Sadness|Anger|Surprise|Fear|Neutral>\", \"responseText\": \"<your reply>\"} \
where emotion is the feeling your reply should be spoken with.";

#[derive(Debug, Clone)]
pub struct DialogueRequest {
    pub transcript_text: String,
    /// Earlier exchanges, oldest first
    pub conversation_context: Vec<ConversationExchange>,
}

#[async_trait]
pub trait DialogueClient: Send + Sync {
    /// Return the backend's raw reply payload
    async fn reply(&self, request: DialogueRequest) -> TurnResult<String>;
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    format: &'static str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
    #[serde(default)]
    #[allow(dead_code)]
    done: bool,
}

fn build_messages(request: &DialogueRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2 + request.conversation_context.len() * 2);
    messages.push(ChatMessage::new("system", SYSTEM_PROMPT));
    for exchange in &request.conversation_context {
        messages.push(ChatMessage::new("user", exchange.transcript.clone()));
        messages.push(ChatMessage::new("assistant", exchange.reply.clone()));
    }
    messages.push(ChatMessage::new("user", request.transcript_text.clone()));
    messages
}

#[derive(Debug, Clone)]
pub struct OllamaDialogueClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
    temperature: Option<f32>,
}

impl OllamaDialogueClient {
    pub fn with_config(base_url: &str, timeout_secs: u64, model: &str) -> Result<Self, ClientError> {
        let timeout = Duration::from_secs(timeout_secs);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: build_http_client(timeout)?,
            timeout,
            temperature: Some(0.7),
        })
    }

    pub fn from_config(config: &crate::config::DialogueConfig) -> Result<Self, ClientError> {
        Self::with_config(&config.ollama_url, config.timeout_secs, &config.model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Check if the Ollama server is reachable
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Ollama not available: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl DialogueClient for OllamaDialogueClient {
    async fn reply(&self, request: DialogueRequest) -> TurnResult<String> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: build_messages(&request),
            format: "json",
            stream: false,
            options: self.temperature.map(|temperature| ChatOptions { temperature }),
        };

        tracing::debug!(
            "Sending chat request to Ollama with model: {} ({} prior exchange(s))",
            self.model,
            request.conversation_context.len()
        );

        let url = format!("{}/api/chat", self.base_url);
        let response: ChatResponse = post_json(&self.client, &url, None, &body, self.timeout)
            .await
            .map_err(|e| TurnError::DialogueFailure(e.to_string()))?;

        Ok(response.message.content)
    }
}
