//! Network clients for the three remote stages
//!
//! Each stage sits behind a trait so the orchestrator can run against any
//! backend. The HTTP implementations make one request per call and never
//! retry: a failed stage is surfaced to the user, who starts a new turn.

pub mod dialogue;
pub mod reply_parser;
pub mod synthesis;
pub mod transcription;

pub use dialogue::{DialogueClient, DialogueRequest, OllamaDialogueClient};
pub use reply_parser::{parse_reply, ParsedReply};
pub use synthesis::{HttpSynthesisClient, SpeechSynthesisClient, SynthesisRequest, SynthesizedAudio};
pub use transcription::{HttpTranscriptionClient, TranscriptionClient, TranscriptionRequest};

use std::time::Duration;

/// Transport-level failures shared by the HTTP clients
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            ClientError::Timeout(timeout.as_secs())
        } else {
            ClientError::ConnectionFailed(e.to_string())
        }
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::ConnectionFailed(format!("Failed to create HTTP client: {}", e)))
}

/// POST `body` as JSON and decode a JSON response
pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &B,
    timeout: Duration,
) -> Result<R, ClientError>
where
    B: serde::Serialize + ?Sized,
    R: serde::de::DeserializeOwned,
{
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.query(&[("key", key)]);
    }

    let response = request
        .send()
        .await
        .map_err(|e| ClientError::from_reqwest(e, timeout))?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(ClientError::ServerError { status, message });
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(e.to_string()))
}

/// Read an API key from the named environment variable, ignoring blanks
pub(crate) fn api_key_from_env(var: Option<&str>) -> Option<String> {
    let var = var?;
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            tracing::debug!("API key variable {} is not set", var);
            None
        }
    }
}
