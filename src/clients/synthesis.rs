//! Text-to-speech client
//!
//! Speaks the Google Text-to-Speech `text:synthesize` JSON protocol. Prosody
//! travels as `audioConfig.pitch` (semitones) and `audioConfig.speakingRate`.

use super::{api_key_from_env, build_http_client, post_json, ClientError};
use crate::error::{TurnError, TurnResult};
use crate::types::{AudioEncoding, ProsodyParams, VoiceGender};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SYNTHESIS_URL: &str = "https://texttospeech.googleapis.com/v1";

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub language_code: String,
    pub voice_gender: VoiceGender,
    pub prosody: ProsodyParams,
    pub encoding: AudioEncoding,
}

/// Encoded audio returned by the synthesis backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    pub encoding: AudioEncoding,
}

#[async_trait]
pub trait SpeechSynthesisClient: Send + Sync {
    async fn synthesize(&self, request: SynthesisRequest) -> TurnResult<SynthesizedAudio>;
}

#[derive(Debug, Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    ssml_gender: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig<'a> {
    audio_encoding: &'a str,
    pitch: f32,
    speaking_rate: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig<'a>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    #[serde(default)]
    audio_content: String,
}

impl<'a> SynthesizeRequest<'a> {
    fn from_request(request: &'a SynthesisRequest) -> Self {
        Self {
            input: SynthesisInput {
                text: &request.text,
            },
            voice: VoiceSelection {
                language_code: &request.language_code,
                ssml_gender: request.voice_gender.ssml_name(),
            },
            audio_config: AudioConfig {
                audio_encoding: request.encoding.api_name(),
                pitch: request.prosody.pitch_semitones,
                speaking_rate: request.prosody.speaking_rate,
            },
        }
    }
}

fn decode_audio(response: SynthesizeResponse) -> Result<Vec<u8>, String> {
    if response.audio_content.is_empty() {
        return Err("response contained no audio".to_string());
    }
    base64::engine::general_purpose::STANDARD
        .decode(response.audio_content.as_bytes())
        .map_err(|e| format!("invalid audio content: {}", e))
}

#[derive(Debug, Clone)]
pub struct HttpSynthesisClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpSynthesisClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self, ClientError> {
        let timeout = Duration::from_secs(timeout_secs);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: build_http_client(timeout)?,
            timeout,
        })
    }

    pub fn from_config(config: &crate::config::SynthesisConfig) -> Result<Self, ClientError> {
        Self::new(
            &config.base_url,
            api_key_from_env(config.api_key_env.as_deref()),
            config.timeout_secs,
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/text:synthesize", self.base_url)
    }
}

#[async_trait]
impl SpeechSynthesisClient for HttpSynthesisClient {
    async fn synthesize(&self, request: SynthesisRequest) -> TurnResult<SynthesizedAudio> {
        let body = SynthesizeRequest::from_request(&request);

        tracing::debug!(
            "Synthesizing {} chars (pitch {:+.1}, rate {:.2})",
            request.text.len(),
            request.prosody.pitch_semitones,
            request.prosody.speaking_rate
        );

        let response: SynthesizeResponse = post_json(
            &self.client,
            &self.endpoint(),
            self.api_key.as_deref(),
            &body,
            self.timeout,
        )
        .await
        .map_err(|e| TurnError::SynthesisFailure(e.to_string()))?;

        let bytes = decode_audio(response).map_err(TurnError::SynthesisFailure)?;
        tracing::info!("Synthesis complete: {} bytes", bytes.len());

        Ok(SynthesizedAudio {
            bytes,
            encoding: request.encoding,
        })
    }
}
