//! Error taxonomy for a conversation turn
//!
//! Two kinds degrade instead of failing: an empty transcript and a dialogue
//! failure both still lead to a spoken (fallback) reply. Every other kind
//! moves the turn to `Failed` and is surfaced to the user. Nothing is retried
//! automatically; the user starts a new turn.

use crate::turn::TurnState;
use serde::Serialize;

/// Result type alias for turn operations
pub type TurnResult<T> = Result<T, TurnError>;

/// Errors that can occur while running a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TurnError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Recording failed: {0}")]
    RecordingFailure(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailure(String),

    #[error("No speech detected")]
    EmptyTranscript,

    #[error("Dialogue failed: {0}")]
    DialogueFailure(String),

    #[error("Speech synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("Playback failed: {0}")]
    PlaybackFailure(String),

    #[error("A turn is already in progress ({0:?})")]
    TurnInProgress(TurnState),
}

impl TurnError {
    /// Whether the pipeline continues with a fallback utterance for this error
    pub fn is_degradation(&self) -> bool {
        matches!(self, TurnError::EmptyTranscript | TurnError::DialogueFailure(_))
    }

    /// Short message suitable for showing to the user
    pub fn user_message(&self) -> &'static str {
        match self {
            TurnError::PermissionDenied => {
                "Microphone access is needed to talk. Please allow it in Settings."
            }
            TurnError::RecordingFailure(_) => {
                "Couldn't start the microphone. Please try again."
            }
            TurnError::TranscriptionFailure(_) => {
                "Couldn't understand the recording. Please try again."
            }
            TurnError::EmptyTranscript => "I didn't catch that.",
            TurnError::DialogueFailure(_) => "I had trouble thinking of a reply.",
            TurnError::SynthesisFailure(_) => "Couldn't prepare the spoken reply.",
            TurnError::PlaybackFailure(_) => "Couldn't play the reply.",
            TurnError::TurnInProgress(_) => "Please wait for the current reply to finish.",
        }
    }
}
