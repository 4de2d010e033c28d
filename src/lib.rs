//! Wellspoken - spoken conversation practice
//!
//! Turn-based voice pipeline: record the user until they fall silent,
//! transcribe, ask a dialogue model for an emotion-tagged reply, synthesize
//! it with matching prosody and play it back.

pub mod artifact;
pub mod audio;
pub mod clients;
pub mod config;
pub mod error;
pub mod logging;
pub mod permission;
pub mod playback;
pub mod prosody;
pub mod recording;
pub mod turn;
pub mod types;

pub use artifact::{ArtifactKind, ArtifactStore};
pub use config::Config;
pub use error::{TurnError, TurnResult};
pub use permission::{PermissionGate, PermissionStatus, StaticPermissionGate};
pub use playback::{AudioSink, PlaybackController, PlaybackStream};
pub use prosody::prosody_for;
pub use recording::{AudioFrame, AudioSource, CaptureStream, RecordingController};
pub use turn::{OrchestratorEvent, TurnComponents, TurnOrchestrator, TurnSettings, TurnState};
pub use types::{DialogueReply, EmotionTag, ProsodyParams, Transcript, TurnSequenceId};
