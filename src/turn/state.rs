//! Turn state machine
//!
//! Pure transition logic for one conversation turn. It owns no resources; the
//! orchestrator applies side effects after a transition is accepted.

use crate::types::TurnSequenceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

/// Transitions kept for inspection
const TRANSITION_LOG_CAPACITY: usize = 256;

/// Phase of the current conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// No turn in progress
    #[default]
    Idle,
    /// Waiting for microphone access
    AwaitingPermission,
    /// Capturing the user's utterance
    Listening,
    /// Converting the utterance to text
    Transcribing,
    /// Waiting for the dialogue backend
    GeneratingReply,
    /// Converting the reply to speech
    Synthesizing,
    /// Playing the reply
    Speaking,
    /// Turn ended with an error the user must see
    Failed,
}

impl TurnState {
    /// Returns a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            TurnState::Idle => "Ready",
            TurnState::AwaitingPermission => "Checking microphone access",
            TurnState::Listening => "Listening",
            TurnState::Transcribing => "Transcribing speech",
            TurnState::GeneratingReply => "Thinking of a reply",
            TurnState::Synthesizing => "Preparing spoken reply",
            TurnState::Speaking => "Speaking",
            TurnState::Failed => "Something went wrong",
        }
    }

    /// Whether a turn is in progress
    pub fn is_active(&self) -> bool {
        !matches!(self, TurnState::Idle | TurnState::Failed)
    }

    /// Whether the user can cancel from this state
    pub fn is_cancellable(&self) -> bool {
        self.is_active()
    }

    /// Whether the microphone is in use in this state
    pub fn is_capturing_audio(&self) -> bool {
        matches!(self, TurnState::Listening)
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// User asked to talk
    StartTurn,
    PermissionGranted,
    PermissionDenied,
    /// Microphone could not be opened or the recording could not be finalized
    RecordingFailed { message: String },
    /// No audio frames for the silence timeout
    SilenceTimeout,
    /// User tapped stop while talking
    ManualStop,
    /// User abandoned the turn
    Cancel,
    TranscriptReady,
    /// No speech detected; the turn degrades to a clarification prompt
    TranscriptEmpty,
    TranscriptionFailed { message: String },
    ReplyReady,
    /// Dialogue failed or was unparseable; a fallback reply is spoken
    ReplyDegraded { message: String },
    SynthesisReady,
    SynthesisFailed { message: String },
    PlaybackComplete,
    /// User interrupted the spoken reply
    StopSpeaking,
    PlaybackFailed { message: String },
    AppBackgrounded,
    /// Microphone access was withdrawn while a turn was active
    PermissionRevoked,
    /// User dismissed a failure
    Acknowledge,
}

/// Reason recorded with each transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransitionReason {
    UserStart,
    PermissionGranted,
    PermissionDenied,
    SilenceDetected,
    UserStop,
    UserCancellation,
    TranscriptReady,
    NoSpeech,
    ReplyReady,
    Degraded { message: String },
    AudioReady,
    PlaybackFinished,
    UserInterrupted,
    Backgrounded,
    PermissionRevoked,
    Error { message: String },
    Acknowledged,
}

/// An accepted state change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: TurnState,
    pub to: TurnState,
    pub reason: TransitionReason,
    /// Turn the transition belongs to
    pub sequence: TurnSequenceId,
    pub at: DateTime<Utc>,
}

/// Turn state machine
///
/// Thread-safety is handled by the orchestrator, which keeps this behind
/// its lock.
pub struct TurnStateMachine {
    state: TurnState,
    sequence: TurnSequenceId,
    state_entered_at: Instant,
    log: VecDeque<Transition>,
}

impl TurnStateMachine {
    pub fn new() -> Self {
        Self {
            state: TurnState::Idle,
            sequence: TurnSequenceId::default(),
            state_entered_at: Instant::now(),
            log: VecDeque::new(),
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Sequence id of the current (or most recent) turn
    pub fn sequence(&self) -> TurnSequenceId {
        self.sequence
    }

    pub fn time_in_state(&self) -> std::time::Duration {
        self.state_entered_at.elapsed()
    }

    /// Recent transitions, oldest first
    pub fn transitions(&self) -> Vec<Transition> {
        self.log.iter().cloned().collect()
    }

    /// Process an event and return the transition if one occurred
    ///
    /// Returns `None` if the event is not valid for the current state. A
    /// `StartTurn` that is accepted allocates the next sequence id.
    pub fn process_event(&mut self, event: TurnEvent) -> Option<Transition> {
        use TurnEvent as E;
        use TurnState as S;

        let (to, reason) = match (self.state, event) {
            (S::Idle | S::Failed, E::StartTurn) => (S::AwaitingPermission, TransitionReason::UserStart),

            (S::AwaitingPermission, E::PermissionGranted) => {
                (S::Listening, TransitionReason::PermissionGranted)
            }
            (S::AwaitingPermission, E::PermissionDenied) => {
                (S::Idle, TransitionReason::PermissionDenied)
            }
            (S::AwaitingPermission | S::Listening, E::RecordingFailed { message }) => {
                (S::Failed, TransitionReason::Error { message })
            }

            (S::Listening, E::SilenceTimeout) => (S::Transcribing, TransitionReason::SilenceDetected),
            (S::Listening, E::ManualStop) => (S::Transcribing, TransitionReason::UserStop),

            (S::Transcribing, E::TranscriptReady) => {
                (S::GeneratingReply, TransitionReason::TranscriptReady)
            }
            // Skip the dialogue backend and ask the user to repeat themselves
            (S::Transcribing, E::TranscriptEmpty) => (S::Synthesizing, TransitionReason::NoSpeech),
            (S::Transcribing, E::TranscriptionFailed { message }) => {
                (S::Failed, TransitionReason::Error { message })
            }

            (S::GeneratingReply, E::ReplyReady) => (S::Synthesizing, TransitionReason::ReplyReady),
            (S::GeneratingReply, E::ReplyDegraded { message }) => {
                (S::Synthesizing, TransitionReason::Degraded { message })
            }

            (S::Synthesizing, E::SynthesisReady) => (S::Speaking, TransitionReason::AudioReady),
            (S::Synthesizing, E::SynthesisFailed { message }) => {
                (S::Failed, TransitionReason::Error { message })
            }

            (S::Speaking, E::PlaybackComplete) => (S::Idle, TransitionReason::PlaybackFinished),
            (S::Speaking, E::StopSpeaking) => (S::Idle, TransitionReason::UserInterrupted),
            (S::Speaking, E::PlaybackFailed { message }) => {
                (S::Failed, TransitionReason::Error { message })
            }

            (state, E::Cancel) if state.is_active() => (S::Idle, TransitionReason::UserCancellation),
            (state, E::AppBackgrounded) if state.is_active() => {
                (S::Idle, TransitionReason::Backgrounded)
            }
            (state, E::PermissionRevoked) if state.is_active() => {
                (S::Failed, TransitionReason::PermissionRevoked)
            }

            (S::Failed, E::Acknowledge) => (S::Idle, TransitionReason::Acknowledged),

            _ => return None,
        };

        if to == S::AwaitingPermission {
            self.sequence = self.sequence.next();
        }

        let transition = Transition {
            from: self.state,
            to,
            reason,
            sequence: self.sequence,
            at: Utc::now(),
        };
        self.apply_transition(&transition);
        Some(transition)
    }

    fn apply_transition(&mut self, transition: &Transition) {
        let elapsed = self.time_in_state();
        self.state = transition.to;
        self.state_entered_at = Instant::now();

        if self.log.len() == TRANSITION_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(transition.clone());

        tracing::info!(
            "Turn {} state transition: {:?} -> {:?} after {}ms (reason: {:?})",
            transition.sequence,
            transition.from,
            transition.to,
            elapsed.as_millis(),
            transition.reason
        );
    }
}

impl Default for TurnStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_in(path: &[TurnEvent]) -> TurnStateMachine {
        let mut sm = TurnStateMachine::new();
        for event in path {
            assert!(
                sm.process_event(event.clone()).is_some(),
                "setup event {:?} rejected in {:?}",
                event,
                sm.state()
            );
        }
        sm
    }

    fn listening() -> TurnStateMachine {
        machine_in(&[TurnEvent::StartTurn, TurnEvent::PermissionGranted])
    }

    fn speaking() -> TurnStateMachine {
        machine_in(&[
            TurnEvent::StartTurn,
            TurnEvent::PermissionGranted,
            TurnEvent::SilenceTimeout,
            TurnEvent::TranscriptReady,
            TurnEvent::ReplyReady,
            TurnEvent::SynthesisReady,
        ])
    }

    #[test]
    fn test_initial_state_is_idle() {
        let sm = TurnStateMachine::new();
        assert_eq!(sm.state(), TurnState::Idle);
        assert_eq!(sm.sequence(), TurnSequenceId(0));
        assert!(sm.transitions().is_empty());
    }

    #[test]
    fn test_start_turn_allocates_sequence() {
        let mut sm = TurnStateMachine::new();
        let transition = sm.process_event(TurnEvent::StartTurn).unwrap();

        assert_eq!(transition.to, TurnState::AwaitingPermission);
        assert_eq!(transition.sequence, TurnSequenceId(1));
        assert_eq!(sm.sequence(), TurnSequenceId(1));
    }

    #[test]
    fn test_happy_path_returns_to_idle() {
        let mut sm = speaking();
        let transition = sm.process_event(TurnEvent::PlaybackComplete).unwrap();

        assert_eq!(transition.from, TurnState::Speaking);
        assert_eq!(transition.to, TurnState::Idle);
        assert_eq!(sm.transitions().len(), 7);
        assert!(sm.transitions().iter().all(|t| t.sequence == TurnSequenceId(1)));
    }

    #[test]
    fn test_manual_stop_transitions_to_transcribing() {
        let mut sm = listening();
        let transition = sm.process_event(TurnEvent::ManualStop).unwrap();
        assert_eq!(transition.to, TurnState::Transcribing);
        assert_eq!(transition.reason, TransitionReason::UserStop);
    }

    #[test]
    fn test_second_stop_signal_is_rejected() {
        let mut sm = listening();
        assert!(sm.process_event(TurnEvent::ManualStop).is_some());
        assert!(sm.process_event(TurnEvent::SilenceTimeout).is_none());
        assert_eq!(sm.state(), TurnState::Transcribing);
    }

    #[test]
    fn test_permission_denied_returns_to_idle() {
        let mut sm = machine_in(&[TurnEvent::StartTurn]);
        let transition = sm.process_event(TurnEvent::PermissionDenied).unwrap();
        assert_eq!(transition.to, TurnState::Idle);
    }

    #[test]
    fn test_recording_failure_fails_turn() {
        let mut sm = machine_in(&[TurnEvent::StartTurn]);
        let transition = sm
            .process_event(TurnEvent::RecordingFailed {
                message: "device busy".to_string(),
            })
            .unwrap();
        assert_eq!(transition.to, TurnState::Failed);
    }

    #[test]
    fn test_empty_transcript_skips_dialogue() {
        let mut sm = machine_in(&[
            TurnEvent::StartTurn,
            TurnEvent::PermissionGranted,
            TurnEvent::ManualStop,
        ]);
        let transition = sm.process_event(TurnEvent::TranscriptEmpty).unwrap();
        assert_eq!(transition.to, TurnState::Synthesizing);
        assert_eq!(transition.reason, TransitionReason::NoSpeech);
    }

    #[test]
    fn test_degraded_reply_still_synthesizes() {
        let mut sm = machine_in(&[
            TurnEvent::StartTurn,
            TurnEvent::PermissionGranted,
            TurnEvent::SilenceTimeout,
            TurnEvent::TranscriptReady,
        ]);
        let transition = sm
            .process_event(TurnEvent::ReplyDegraded {
                message: "malformed".to_string(),
            })
            .unwrap();
        assert_eq!(transition.to, TurnState::Synthesizing);
    }

    #[test]
    fn test_failures_move_to_failed() {
        let mut sm = machine_in(&[
            TurnEvent::StartTurn,
            TurnEvent::PermissionGranted,
            TurnEvent::SilenceTimeout,
        ]);
        let transition = sm
            .process_event(TurnEvent::TranscriptionFailed {
                message: "timeout".to_string(),
            })
            .unwrap();
        assert_eq!(transition.to, TurnState::Failed);

        let mut sm = speaking();
        let transition = sm
            .process_event(TurnEvent::PlaybackFailed {
                message: "no device".to_string(),
            })
            .unwrap();
        assert_eq!(transition.to, TurnState::Failed);
    }

    #[test]
    fn test_cancel_from_every_active_state() {
        let paths: Vec<Vec<TurnEvent>> = vec![
            vec![TurnEvent::StartTurn],
            vec![TurnEvent::StartTurn, TurnEvent::PermissionGranted],
            vec![
                TurnEvent::StartTurn,
                TurnEvent::PermissionGranted,
                TurnEvent::ManualStop,
            ],
            vec![
                TurnEvent::StartTurn,
                TurnEvent::PermissionGranted,
                TurnEvent::ManualStop,
                TurnEvent::TranscriptReady,
            ],
            vec![
                TurnEvent::StartTurn,
                TurnEvent::PermissionGranted,
                TurnEvent::ManualStop,
                TurnEvent::TranscriptEmpty,
            ],
        ];

        for path in paths {
            let mut sm = machine_in(&path);
            assert!(sm.state().is_cancellable());
            let transition = sm.process_event(TurnEvent::Cancel).unwrap();
            assert_eq!(transition.to, TurnState::Idle);
        }

        let mut sm = speaking();
        assert_eq!(
            sm.process_event(TurnEvent::AppBackgrounded).unwrap().to,
            TurnState::Idle
        );
    }

    #[test]
    fn test_cancel_when_idle_is_ignored() {
        let mut sm = TurnStateMachine::new();
        assert!(sm.process_event(TurnEvent::Cancel).is_none());
        assert!(sm.process_event(TurnEvent::AppBackgrounded).is_none());
        assert!(sm.process_event(TurnEvent::PlaybackComplete).is_none());
        assert_eq!(sm.state(), TurnState::Idle);
    }

    #[test]
    fn test_permission_revoked_fails_active_turn() {
        let mut sm = speaking();
        let transition = sm.process_event(TurnEvent::PermissionRevoked).unwrap();
        assert_eq!(transition.to, TurnState::Failed);

        let mut idle = TurnStateMachine::new();
        assert!(idle.process_event(TurnEvent::PermissionRevoked).is_none());
    }

    #[test]
    fn test_failed_acknowledge_or_restart() {
        let mut sm = machine_in(&[
            TurnEvent::StartTurn,
            TurnEvent::RecordingFailed {
                message: "busy".to_string(),
            },
        ]);
        assert_eq!(sm.state(), TurnState::Failed);
        assert!(!sm.state().is_active());

        let mut restarted = machine_in(&[
            TurnEvent::StartTurn,
            TurnEvent::RecordingFailed {
                message: "busy".to_string(),
            },
        ]);
        let transition = restarted.process_event(TurnEvent::StartTurn).unwrap();
        assert_eq!(transition.sequence, TurnSequenceId(2));

        assert_eq!(
            sm.process_event(TurnEvent::Acknowledge).unwrap().to,
            TurnState::Idle
        );
    }

    #[test]
    fn test_start_rejected_while_active() {
        let mut sm = listening();
        assert!(sm.process_event(TurnEvent::StartTurn).is_none());
        assert_eq!(sm.sequence(), TurnSequenceId(1));
    }

    #[test]
    fn test_transition_log_is_bounded() {
        let mut sm = TurnStateMachine::new();
        for _ in 0..200 {
            sm.process_event(TurnEvent::StartTurn);
            sm.process_event(TurnEvent::Cancel);
        }
        assert_eq!(sm.transitions().len(), TRANSITION_LOG_CAPACITY);
        assert_eq!(sm.sequence(), TurnSequenceId(200));
    }

    #[test]
    fn test_state_serialisation() {
        let json = serde_json::to_string(&TurnState::GeneratingReply).unwrap();
        assert_eq!(json, "\"generating_reply\"");
        assert_eq!(TurnState::Speaking.description(), "Speaking");
    }

    #[test]
    fn test_time_in_state_restarts_on_transition() {
        let mut sm = TurnStateMachine::new();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(sm.time_in_state() >= std::time::Duration::from_millis(20));

        sm.process_event(TurnEvent::StartTurn);
        assert!(sm.time_in_state() < std::time::Duration::from_millis(20));
    }
}
