//! Conversation turns
//!
//! A turn takes one spoken utterance from the user and answers it out loud.
//! Only one turn is live at a time; each new turn gets a fresh sequence id
//! and any late result tagged with an older id is ignored.
//!
//! ## States
//!
//! 1. **IDLE** - Waiting for the user to start a turn
//! 2. **AWAITING_PERMISSION** - Checking microphone access
//! 3. **LISTENING** - Recording until silence or a manual stop
//! 4. **TRANSCRIBING** - Speech-to-text on the recording
//! 5. **GENERATING_REPLY** - Asking the dialogue backend for an answer
//! 6. **SYNTHESIZING** - Text-to-speech with emotion-driven prosody
//! 7. **SPEAKING** - Playing the reply
//! 8. **FAILED** - A stage failed; the user acknowledges or starts again
//!
//! ## State Transitions
//!
//! ```text
//! ┌──────┐ start ┌────────────┐ granted ┌───────────┐ silence/stop ┌──────────────┐
//! │ IDLE │──────►│ AWAITING   │────────►│ LISTENING │─────────────►│ TRANSCRIBING │
//! └──────┘       │ PERMISSION │         └───────────┘              └──────────────┘
//!    ▲  ▲        └────────────┘                                      │          │
//!    │  │ denied       │                                    transcript│    empty │
//!    │  └──────────────┘                                             ▼          │
//!    │                                                    ┌──────────────────┐  │
//!    │                                                    │ GENERATING_REPLY │  │
//!    │                                                    └──────────────────┘  │
//!    │                                               reply/degraded  │          │
//!    │                                                               ▼          │
//!    │  complete/stop  ┌──────────┐        ready        ┌──────────────┐        │
//!    │◄────────────────│ SPEAKING │◄────────────────────│ SYNTHESIZING │◄───────┘
//!    │                 └──────────┘                     └──────────────┘
//!    │
//!    │  cancel/background from any active state
//!    │◄──────────────────────────────────────────────────────────────────
//!    │
//!    │  acknowledge   ┌────────┐   recording, transcription, synthesis,
//!    └────────────────│ FAILED │◄─ playback failure or permission revoked
//!                     └────────┘
//! ```
//!
//! Dialogue failures never reach FAILED: the turn speaks a fallback reply
//! instead.
//!
//! ## Events
//!
//! `TurnOrchestrator::subscribe` yields `OrchestratorEvent`s: every state
//! change, input levels while listening, the transcript, the reply with its
//! prosody, degradations, playback progress and errors.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{OrchestratorEvent, TurnComponents, TurnOrchestrator, TurnSettings};
pub use state::{Transition, TransitionReason, TurnEvent, TurnState, TurnStateMachine};
