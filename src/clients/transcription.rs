//! Speech-to-text client
//!
//! Speaks the Google Speech `speech:recognize` JSON protocol: the whole
//! utterance is sent inline as base64 and the best alternative of each result
//! is joined into one transcript.

use super::{api_key_from_env, build_http_client, post_json, ClientError};
use crate::error::{TurnError, TurnResult};
use crate::types::{AudioEncoding, Transcript};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TRANSCRIPTION_URL: &str = "https://speech.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio_bytes: Vec<u8>,
    pub sample_rate: u32,
    pub encoding: AudioEncoding,
    pub language_code: String,
}

#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Transcribe one utterance; no detected speech yields an empty transcript
    async fn transcribe(&self, request: TranscriptionRequest) -> TurnResult<Transcript>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'a str,
    sample_rate_hertz: u32,
    language_code: &'a str,
}

#[derive(Debug, Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Debug, Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Debug, Deserialize)]
struct RecognitionAlternative {
    #[serde(default)]
    transcript: String,
}

fn transcript_from_response(response: RecognizeResponse) -> Transcript {
    let text = response
        .results
        .into_iter()
        .filter_map(|r| r.alternatives.into_iter().next())
        .map(|a| a.transcript.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Transcript::from_text(text)
}

#[derive(Debug, Clone)]
pub struct HttpTranscriptionClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTranscriptionClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self, ClientError> {
        let timeout = Duration::from_secs(timeout_secs);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: build_http_client(timeout)?,
            timeout,
        })
    }

    /// Build from config, reading the API key from the configured variable
    pub fn from_config(config: &crate::config::TranscriptionConfig) -> Result<Self, ClientError> {
        Self::new(
            &config.base_url,
            api_key_from_env(config.api_key_env.as_deref()),
            config.timeout_secs,
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/speech:recognize", self.base_url)
    }
}

#[async_trait]
impl TranscriptionClient for HttpTranscriptionClient {
    async fn transcribe(&self, request: TranscriptionRequest) -> TurnResult<Transcript> {
        let body = RecognizeRequest {
            config: RecognitionConfig {
                encoding: request.encoding.api_name(),
                sample_rate_hertz: request.sample_rate,
                language_code: &request.language_code,
            },
            audio: RecognitionAudio {
                content: base64::engine::general_purpose::STANDARD.encode(&request.audio_bytes),
            },
        };

        tracing::debug!(
            "Sending {} bytes to {} ({})",
            request.audio_bytes.len(),
            self.endpoint(),
            request.language_code
        );

        let response: RecognizeResponse = post_json(
            &self.client,
            &self.endpoint(),
            self.api_key.as_deref(),
            &body,
            self.timeout,
        )
        .await
        .map_err(|e| TurnError::TranscriptionFailure(e.to_string()))?;

        let transcript = transcript_from_response(response);
        tracing::info!(
            "Transcription complete: {} chars{}",
            transcript.text.len(),
            if transcript.is_empty { " (no speech)" } else { "" }
        );
        Ok(transcript)
    }
}
