//! Shared data types passed between pipeline stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Monotonically increasing turn identifier
///
/// Every asynchronous result is tagged with the sequence id of the turn that
/// issued it; a result whose id no longer matches the live turn is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnSequenceId(pub u64);

impl TurnSequenceId {
    /// The id following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TurnSequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Audio container/codec of an artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// 16-bit PCM in a WAV container
    #[default]
    Linear16Wav,
    Mp3,
    OggOpus,
}

impl AudioEncoding {
    /// Encoding name used by the speech service APIs
    pub fn api_name(&self) -> &'static str {
        match self {
            AudioEncoding::Linear16Wav => "LINEAR16",
            AudioEncoding::Mp3 => "MP3",
            AudioEncoding::OggOpus => "OGG_OPUS",
        }
    }

    /// File extension for artifacts of this encoding
    pub fn extension(&self) -> &'static str {
        match self {
            AudioEncoding::Linear16Wav => "wav",
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::OggOpus => "ogg",
        }
    }
}

/// Voice used for synthesized replies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceGender {
    #[default]
    Female,
    Male,
    Neutral,
}

impl VoiceGender {
    /// SSML gender name used by the synthesis API
    pub fn ssml_name(&self) -> &'static str {
        match self {
            VoiceGender::Female => "FEMALE",
            VoiceGender::Male => "MALE",
            VoiceGender::Neutral => "NEUTRAL",
        }
    }
}

/// Identifies an ephemeral audio file and the turn that created it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub id: Uuid,
    pub path: PathBuf,
    pub sequence: TurnSequenceId,
}

/// A finished recording of the user's utterance
///
/// Owned by the recording controller until handed to transcription, then
/// deleted as soon as the transcription call resolves.
#[derive(Debug)]
pub struct AudioArtifact {
    pub handle: ArtifactHandle,
    pub sample_rate: u32,
    pub encoding: AudioEncoding,
    pub created_at: DateTime<Utc>,
    /// Number of captured frames; zero when the user stopped immediately
    pub frame_count: usize,
}

/// Synthesized reply audio, deleted when playback ends for any reason
#[derive(Debug)]
pub struct SynthesizedAudioArtifact {
    pub handle: ArtifactHandle,
    pub encoding: AudioEncoding,
    pub created_at: DateTime<Utc>,
}

/// Result of transcribing one utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    pub text: String,
    /// True when no speech was detected; branch on this, not on the text
    pub is_empty: bool,
}

impl Transcript {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into().trim().to_string();
        let is_empty = text.is_empty();
        Self { text, is_empty }
    }

    pub fn empty() -> Self {
        Self {
            text: String::new(),
            is_empty: true,
        }
    }
}

/// Emotion detected by the dialogue backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmotionTag {
    Joy,
    Sadness,
    Anger,
    Surprise,
    Fear,
    #[default]
    Neutral,
}

impl EmotionTag {
    /// Lenient parse of a backend emotion label; anything unrecognised is `Neutral`
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "joy" | "happy" | "happiness" | "joyful" => EmotionTag::Joy,
            "sadness" | "sad" => EmotionTag::Sadness,
            "anger" | "angry" => EmotionTag::Anger,
            "surprise" | "surprised" => EmotionTag::Surprise,
            "fear" | "afraid" | "scared" | "fearful" => EmotionTag::Fear,
            _ => EmotionTag::Neutral,
        }
    }
}

/// Reply from the dialogue backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueReply {
    pub emotion: EmotionTag,
    pub response_text: String,
}

impl DialogueReply {
    /// A reply spoken with neutral delivery
    pub fn neutral(text: impl Into<String>) -> Self {
        Self {
            emotion: EmotionTag::Neutral,
            response_text: text.into(),
        }
    }
}

/// Synthesis delivery parameters derived from an emotion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProsodyParams {
    pub pitch_semitones: f32,
    pub speaking_rate: f32,
}

/// One completed exchange, passed back to the dialogue backend as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationExchange {
    pub transcript: String,
    pub reply: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_ids_increase() {
        let first = TurnSequenceId::default();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.next(), TurnSequenceId(2));
        assert_eq!(second.to_string(), "#1");
    }

    #[test]
    fn test_transcript_emptiness_ignores_whitespace() {
        assert!(Transcript::from_text("   \n").is_empty);
        assert!(Transcript::empty().is_empty);

        let transcript = Transcript::from_text("  how are you ");
        assert!(!transcript.is_empty);
        assert_eq!(transcript.text, "how are you");
    }

    #[test]
    fn test_emotion_parse() {
        assert_eq!(EmotionTag::parse("Sadness"), EmotionTag::Sadness);
        assert_eq!(EmotionTag::parse("  JOY "), EmotionTag::Joy);
        assert_eq!(EmotionTag::parse("angry"), EmotionTag::Anger);
        assert_eq!(EmotionTag::parse("scared"), EmotionTag::Fear);
        assert_eq!(EmotionTag::parse("melancholy"), EmotionTag::Neutral);
        assert_eq!(EmotionTag::parse(""), EmotionTag::Neutral);
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(AudioEncoding::Linear16Wav.api_name(), "LINEAR16");
        assert_eq!(AudioEncoding::Mp3.extension(), "mp3");
        assert_eq!(VoiceGender::Male.ssml_name(), "MALE");
    }

    #[test]
    fn test_reply_serialisation_uses_camel_case() {
        let reply = DialogueReply {
            emotion: EmotionTag::Joy,
            response_text: "Lovely!".to_string(),
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"emotion":"Joy","responseText":"Lovely!"}"#);
    }
}
