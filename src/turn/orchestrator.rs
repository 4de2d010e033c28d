//! Turn orchestrator
//!
//! Drives one conversation turn at a time through the state machine. Each
//! accepted `start_turn` spawns a task that awaits the stages in order and,
//! after every await, re-checks under the lock that its sequence id is still
//! the live turn. User actions (cancel, stop, background) transition
//! synchronously and release the turn's resources on the spot; the task
//! notices on its next check and drops whatever result it was holding.

use super::state::{Transition, TurnEvent, TurnState, TurnStateMachine};
use crate::artifact::{ArtifactKind, ArtifactStore};
use crate::audio::{AudioLevel, AudioMeter};
use crate::clients::{
    parse_reply, DialogueClient, DialogueRequest, SpeechSynthesisClient, SynthesisRequest,
    TranscriptionClient, TranscriptionRequest,
};
use crate::config::Config;
use crate::error::{TurnError, TurnResult};
use crate::permission::{PermissionGate, PermissionStatus};
use crate::playback::{AudioSink, PlaybackController, PlaybackOutcome, ProgressHandler};
use crate::prosody::prosody_for;
use crate::recording::{AudioFrame, AudioSource, RecordingController, RecordingSettings};
use crate::types::{
    AudioArtifact, AudioEncoding, ConversationExchange, DialogueReply, ProsodyParams,
    SynthesizedAudioArtifact, Transcript, TurnSequenceId, VoiceGender,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Backends and devices a turn runs against
#[derive(Clone)]
pub struct TurnComponents {
    pub permission: Arc<dyn PermissionGate>,
    pub audio_source: Arc<dyn AudioSource>,
    pub audio_sink: Arc<dyn AudioSink>,
    pub transcription: Arc<dyn TranscriptionClient>,
    pub dialogue: Arc<dyn DialogueClient>,
    pub synthesis: Arc<dyn SpeechSynthesisClient>,
}

#[cfg(feature = "audio-io")]
impl TurnComponents {
    /// The default microphone and speaker with the HTTP backends from `config`
    pub fn from_config(config: &Config) -> Result<Self, crate::clients::ClientError> {
        use crate::audio::{CpalAudioSource, RodioAudioSink};
        use crate::clients::{HttpSynthesisClient, HttpTranscriptionClient, OllamaDialogueClient};
        use crate::permission::DevicePermissionGate;

        Ok(Self {
            permission: Arc::new(DevicePermissionGate),
            audio_source: Arc::new(CpalAudioSource::new(config.recording.device_name.clone())),
            audio_sink: Arc::new(RodioAudioSink::new()),
            transcription: Arc::new(HttpTranscriptionClient::from_config(&config.transcription)?),
            dialogue: Arc::new(OllamaDialogueClient::from_config(&config.dialogue)?),
            synthesis: Arc::new(HttpSynthesisClient::from_config(&config.synthesis)?),
        })
    }
}

/// Per-turn behaviour
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    pub recording: RecordingSettings,
    pub frame_interval: Duration,
    /// Language of the user's speech
    pub language_code: String,
    /// Language of the spoken reply
    pub voice_language_code: String,
    pub voice_gender: VoiceGender,
    pub synthesis_encoding: AudioEncoding,
    pub max_history_turns: usize,
    pub apology_text: String,
    pub clarification_text: String,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl TurnSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            recording: RecordingSettings {
                silence_timeout: Duration::from_millis(config.recording.silence_timeout_ms),
                sample_rate: config.recording.sample_rate,
            },
            frame_interval: Duration::from_millis(config.playback.frame_interval_ms),
            language_code: config.transcription.language_code.clone(),
            voice_language_code: config.synthesis.language_code.clone(),
            voice_gender: config.synthesis.voice_gender,
            synthesis_encoding: config.synthesis.encoding,
            max_history_turns: config.dialogue.max_history_turns,
            apology_text: config.dialogue.apology_text.clone(),
            clarification_text: config.dialogue.clarification_text.clone(),
        }
    }
}

/// Notifications published to subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    StateChanged {
        transition: Transition,
    },
    InputLevel {
        sequence: TurnSequenceId,
        level: AudioLevel,
    },
    Transcript {
        sequence: TurnSequenceId,
        transcript: Transcript,
    },
    Reply {
        sequence: TurnSequenceId,
        reply: DialogueReply,
        prosody: ProsodyParams,
    },
    /// The turn continues with a fallback utterance
    Degraded {
        sequence: TurnSequenceId,
        error: TurnError,
    },
    PlaybackProgress {
        sequence: TurnSequenceId,
        position_ms: u64,
        duration_ms: Option<u64>,
    },
    Error {
        sequence: TurnSequenceId,
        error: TurnError,
        message: String,
    },
}

/// Why listening ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenEnd {
    Silence,
    Manual,
}

/// Resources owned by the live turn
struct LiveTurn {
    sequence: TurnSequenceId,
    recording: Option<RecordingController>,
    listen_tx: Option<mpsc::UnboundedSender<ListenEnd>>,
    playback: Option<PlaybackController>,
}

struct Shared {
    machine: TurnStateMachine,
    live: Option<LiveTurn>,
    history: VecDeque<ConversationExchange>,
    last_error: Option<TurnError>,
}

struct Inner {
    components: TurnComponents,
    settings: TurnSettings,
    store: ArtifactStore,
    shared: Mutex<Shared>,
    events: broadcast::Sender<OrchestratorEvent>,
}

/// Handle to the turn pipeline; clones share the same turn
#[derive(Clone)]
pub struct TurnOrchestrator {
    inner: Arc<Inner>,
}

impl TurnOrchestrator {
    pub fn new(components: TurnComponents, settings: TurnSettings, store: ArtifactStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                components,
                settings,
                store,
                shared: Mutex::new(Shared {
                    machine: TurnStateMachine::new(),
                    live: None,
                    history: VecDeque::new(),
                    last_error: None,
                }),
                events,
            }),
        }
    }

    /// Begin a new turn
    ///
    /// Must be called from within a tokio runtime. Rejected with
    /// `TurnInProgress` while another turn is active.
    pub fn start_turn(&self) -> TurnResult<TurnSequenceId> {
        let mut shared = self.inner.shared.lock();
        let state = shared.machine.state();
        if state.is_active() {
            tracing::warn!("Start rejected: turn already in progress ({:?})", state);
            return Err(TurnError::TurnInProgress(state));
        }

        let transition = self
            .inner
            .transition(&mut shared, TurnEvent::StartTurn)
            .ok_or(TurnError::TurnInProgress(state))?;
        let sequence = transition.sequence;

        let (listen_tx, listen_rx) = mpsc::unbounded_channel();
        shared.last_error = None;
        shared.live = Some(LiveTurn {
            sequence,
            recording: None,
            listen_tx: Some(listen_tx),
            playback: None,
        });
        drop(shared);

        tokio::spawn(run_turn(self.inner.clone(), sequence, listen_rx));
        Ok(sequence)
    }

    /// Stop listening and move on to transcription
    ///
    /// Returns false when not listening.
    pub fn stop_listening(&self) -> bool {
        let shared = self.inner.shared.lock();
        if !shared.machine.state().is_capturing_audio() {
            return false;
        }
        shared
            .live
            .as_ref()
            .and_then(|live| live.listen_tx.as_ref())
            .map(|tx| tx.send(ListenEnd::Manual).is_ok())
            .unwrap_or(false)
    }

    /// Abandon the current turn from any active state
    pub fn cancel(&self) -> bool {
        let mut shared = self.inner.shared.lock();
        self.inner.transition(&mut shared, TurnEvent::Cancel).is_some()
    }

    /// Interrupt the spoken reply
    pub fn stop_speaking(&self) -> bool {
        let mut shared = self.inner.shared.lock();
        self.inner
            .transition(&mut shared, TurnEvent::StopSpeaking)
            .is_some()
    }

    /// The host application lost the foreground
    pub fn app_backgrounded(&self) -> bool {
        let mut shared = self.inner.shared.lock();
        self.inner
            .transition(&mut shared, TurnEvent::AppBackgrounded)
            .is_some()
    }

    /// The host application regained the foreground
    ///
    /// Re-checks microphone permission; a revocation fails the active turn.
    pub async fn app_foregrounded(&self) -> PermissionStatus {
        let status = self.inner.components.permission.ensure_granted().await;
        if !status.is_granted() {
            let mut shared = self.inner.shared.lock();
            if shared.machine.state().is_active() {
                let sequence = shared.machine.sequence();
                tracing::warn!("Microphone permission revoked during turn {}", sequence);
                self.inner.fail(
                    &mut shared,
                    sequence,
                    TurnError::PermissionDenied,
                    TurnEvent::PermissionRevoked,
                );
            }
        }
        status
    }

    /// Dismiss a failure and return to Idle
    pub fn acknowledge_failure(&self) -> bool {
        let mut shared = self.inner.shared.lock();
        let acknowledged = self
            .inner
            .transition(&mut shared, TurnEvent::Acknowledge)
            .is_some();
        if acknowledged {
            shared.last_error = None;
        }
        acknowledged
    }

    pub fn state(&self) -> TurnState {
        self.inner.shared.lock().machine.state()
    }

    pub fn sequence(&self) -> TurnSequenceId {
        self.inner.shared.lock().machine.sequence()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    /// Recent transitions, oldest first
    pub fn transitions(&self) -> Vec<Transition> {
        self.inner.shared.lock().machine.transitions()
    }

    /// Completed exchanges, oldest first
    pub fn history(&self) -> Vec<ConversationExchange> {
        self.inner.shared.lock().history.iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.inner.shared.lock().history.clear();
    }

    pub fn last_error(&self) -> Option<TurnError> {
        self.inner.shared.lock().last_error.clone()
    }

    pub fn artifact_store(&self) -> &ArtifactStore {
        &self.inner.store
    }

    pub fn settings(&self) -> &TurnSettings {
        &self.inner.settings
    }
}

impl Inner {
    fn emit(&self, event: OrchestratorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Feed an event to the machine; entering Idle or Failed ends the live turn
    fn transition(&self, shared: &mut Shared, event: TurnEvent) -> Option<Transition> {
        let transition = shared.machine.process_event(event)?;
        self.emit(OrchestratorEvent::StateChanged {
            transition: transition.clone(),
        });
        if !transition.to.is_active() {
            self.finish_turn(shared);
        }
        Some(transition)
    }

    fn fail(&self, shared: &mut Shared, sequence: TurnSequenceId, error: TurnError, event: TurnEvent) {
        tracing::error!("Turn {} failed: {}", sequence, error);
        shared.last_error = Some(error.clone());
        self.emit(OrchestratorEvent::Error {
            sequence,
            message: error.user_message().to_string(),
            error,
        });
        self.transition(shared, event);
    }

    /// Release everything the live turn holds
    fn finish_turn(&self, shared: &mut Shared) {
        let Some(mut live) = shared.live.take() else {
            return;
        };

        if let Some(mut recording) = live.recording.take() {
            let _ = recording.stop(true);
        }
        if let Some(mut playback) = live.playback.take() {
            playback.stop();
        }
        // Closing the channel wakes a task still waiting for the end of listening
        live.listen_tx.take();

        let released = self.store.release_sequence(live.sequence);
        tracing::debug!(
            "Turn {} finished, {} artifact(s) released",
            live.sequence,
            released
        );
    }

    fn live_mut<'a>(shared: &'a mut Shared, sequence: TurnSequenceId) -> Option<&'a mut LiveTurn> {
        shared.live.as_mut().filter(|live| live.sequence == sequence)
    }

    /// Whether `sequence` is still the live turn; logs the drop if not
    fn is_current(shared: &Shared, sequence: TurnSequenceId, stage: &str) -> bool {
        let current = shared
            .live
            .as_ref()
            .map(|live| live.sequence == sequence)
            .unwrap_or(false);
        if !current {
            tracing::warn!("Discarding stale {} result for turn {}", stage, sequence);
        }
        current
    }

    fn push_history(&self, shared: &mut Shared, exchange: ConversationExchange) {
        let cap = self.settings.max_history_turns;
        if cap == 0 {
            return;
        }
        shared.history.push_back(exchange);
        while shared.history.len() > cap {
            shared.history.pop_front();
        }
    }
}

/// What follows transcription
enum NextStep {
    /// Ask the dialogue backend about this transcript
    Converse(String),
    /// Skip dialogue and speak this reply
    Speak(DialogueReply),
}

/// Body of one turn; exits quietly as soon as the turn is no longer live
async fn run_turn(
    inner: Arc<Inner>,
    sequence: TurnSequenceId,
    mut listen_rx: mpsc::UnboundedReceiver<ListenEnd>,
) {
    if !begin_listening(&inner, sequence).await {
        return;
    }

    let Some(end) = listen_rx.recv().await else {
        tracing::debug!("Turn {} ended while listening", sequence);
        return;
    };
    drop(listen_rx);

    let Some(recording) = finish_listening(&inner, sequence, end) else {
        return;
    };

    let transcript = transcribe(&inner, recording).await;

    let reply = match handle_transcript(&inner, sequence, transcript) {
        Some(NextStep::Converse(text)) => match generate_reply(&inner, sequence, text).await {
            Some(reply) => reply,
            None => return,
        },
        Some(NextStep::Speak(reply)) => reply,
        None => return,
    };

    let Some(artifact) = synthesize(&inner, sequence, reply).await else {
        return;
    };

    speak(&inner, sequence, artifact).await;
}

/// AwaitingPermission -> Listening
async fn begin_listening(inner: &Inner, sequence: TurnSequenceId) -> bool {
    let status = inner.components.permission.ensure_granted().await;

    let silence_tx = {
        let mut shared = inner.shared.lock();
        if !Inner::is_current(&shared, sequence, "permission") {
            return false;
        }
        if !status.is_granted() {
            tracing::warn!("Microphone permission denied for turn {}", sequence);
            shared.last_error = Some(TurnError::PermissionDenied);
            inner.emit(OrchestratorEvent::Error {
                sequence,
                error: TurnError::PermissionDenied,
                message: TurnError::PermissionDenied.user_message().to_string(),
            });
            inner.transition(&mut shared, TurnEvent::PermissionDenied);
            return false;
        }
        match Inner::live_mut(&mut shared, sequence).and_then(|live| live.listen_tx.clone()) {
            Some(tx) => tx,
            None => return false,
        }
    };

    let on_silence = Box::new(move || {
        let _ = silence_tx.send(ListenEnd::Silence);
    });
    let started = RecordingController::start(
        inner.components.audio_source.as_ref(),
        &inner.store,
        sequence,
        inner.settings.recording,
        on_silence,
    )
    .await;

    let mut shared = inner.shared.lock();
    if !Inner::is_current(&shared, sequence, "recording start") {
        // Dropping the controller cancels it and deletes its artifact
        return false;
    }

    let recording = match started {
        Ok(recording) => recording,
        Err(e) => {
            let message = e.to_string();
            inner.fail(&mut shared, sequence, e, TurnEvent::RecordingFailed { message });
            return false;
        }
    };

    let events = inner.events.clone();
    let meter = Arc::new(Mutex::new(AudioMeter::new()));
    recording.on_frame(Arc::new(move |frame: &AudioFrame| {
        let level = meter.lock().process(&frame.samples);
        let _ = events.send(OrchestratorEvent::InputLevel { sequence, level });
    }));

    let Some(live) = Inner::live_mut(&mut shared, sequence) else {
        return false;
    };
    live.recording = Some(recording);
    inner
        .transition(&mut shared, TurnEvent::PermissionGranted)
        .is_some()
}

/// Listening -> Transcribing, handing over the finalized recording
///
/// The outer `None` means the turn is over; the inner one that no recording
/// was left to finalize.
fn finish_listening(
    inner: &Inner,
    sequence: TurnSequenceId,
    end: ListenEnd,
) -> Option<Option<AudioArtifact>> {
    let mut shared = inner.shared.lock();
    if !Inner::is_current(&shared, sequence, "listening") {
        return None;
    }
    if !shared.machine.state().is_capturing_audio() {
        return None;
    }

    let stopped = Inner::live_mut(&mut shared, sequence)
        .and_then(|live| live.recording.take())
        .map(|mut recording| recording.stop(false))
        .unwrap_or(Ok(None));

    let artifact = match stopped {
        Ok(artifact) => artifact,
        Err(e) => {
            let message = e.to_string();
            inner.fail(&mut shared, sequence, e, TurnEvent::RecordingFailed { message });
            return None;
        }
    };

    let event = match end {
        ListenEnd::Silence => TurnEvent::SilenceTimeout,
        ListenEnd::Manual => TurnEvent::ManualStop,
    };
    inner.transition(&mut shared, event)?;
    Some(artifact)
}

/// Run speech-to-text and delete the recording whatever the outcome
async fn transcribe(inner: &Inner, artifact: Option<AudioArtifact>) -> TurnResult<Transcript> {
    let Some(artifact) = artifact else {
        return Ok(Transcript::empty());
    };
    if artifact.frame_count == 0 {
        tracing::info!(
            "No audio captured for turn {}, skipping transcription",
            artifact.handle.sequence
        );
        inner.store.release(&artifact.handle);
        return Ok(Transcript::empty());
    }

    let result = match tokio::fs::read(&artifact.handle.path).await {
        Ok(audio_bytes) => {
            inner
                .components
                .transcription
                .transcribe(TranscriptionRequest {
                    audio_bytes,
                    sample_rate: artifact.sample_rate,
                    encoding: artifact.encoding,
                    language_code: inner.settings.language_code.clone(),
                })
                .await
        }
        Err(e) => Err(TurnError::TranscriptionFailure(format!(
            "Failed to read recording: {}",
            e
        ))),
    };

    inner.store.release(&artifact.handle);
    result
}

/// Transcribing -> GeneratingReply, or straight to Synthesizing with a
/// clarification prompt when nothing was said
fn handle_transcript(
    inner: &Inner,
    sequence: TurnSequenceId,
    result: TurnResult<Transcript>,
) -> Option<NextStep> {
    let mut shared = inner.shared.lock();
    if !Inner::is_current(&shared, sequence, "transcription") {
        return None;
    }

    let transcript = match result {
        Ok(transcript) => transcript,
        Err(e) => {
            let message = e.to_string();
            inner.fail(&mut shared, sequence, e, TurnEvent::TranscriptionFailed { message });
            return None;
        }
    };

    inner.emit(OrchestratorEvent::Transcript {
        sequence,
        transcript: transcript.clone(),
    });

    if transcript.is_empty {
        tracing::warn!("No speech detected in turn {}, asking the user to repeat", sequence);
        inner.transition(&mut shared, TurnEvent::TranscriptEmpty)?;
        inner.emit(OrchestratorEvent::Degraded {
            sequence,
            error: TurnError::EmptyTranscript,
        });
        let reply = DialogueReply::neutral(inner.settings.clarification_text.clone());
        inner.emit(OrchestratorEvent::Reply {
            sequence,
            reply: reply.clone(),
            prosody: prosody_for(reply.emotion),
        });
        return Some(NextStep::Speak(reply));
    }

    inner.transition(&mut shared, TurnEvent::TranscriptReady)?;
    Some(NextStep::Converse(transcript.text))
}

/// GeneratingReply -> Synthesizing; dialogue problems degrade to a fallback
async fn generate_reply(
    inner: &Inner,
    sequence: TurnSequenceId,
    transcript_text: String,
) -> Option<DialogueReply> {
    let conversation_context: Vec<ConversationExchange> =
        inner.shared.lock().history.iter().cloned().collect();
    let raw = inner
        .components
        .dialogue
        .reply(DialogueRequest {
            transcript_text: transcript_text.clone(),
            conversation_context,
        })
        .await;

    let (reply, degraded) = match raw {
        Ok(raw) => {
            let parsed = parse_reply(&raw);
            let fallback = parsed.is_fallback();
            let reply = parsed.into_reply();
            if !fallback {
                (reply, None)
            } else if reply.response_text.trim().is_empty() {
                (
                    DialogueReply::neutral(inner.settings.apology_text.clone()),
                    Some(TurnError::DialogueFailure("empty reply".to_string())),
                )
            } else {
                (
                    reply,
                    Some(TurnError::DialogueFailure(
                        "reply did not match the expected format".to_string(),
                    )),
                )
            }
        }
        Err(e) => {
            let error = match e {
                TurnError::DialogueFailure(_) => e,
                other => TurnError::DialogueFailure(other.to_string()),
            };
            (DialogueReply::neutral(inner.settings.apology_text.clone()), Some(error))
        }
    };

    let mut shared = inner.shared.lock();
    if !Inner::is_current(&shared, sequence, "dialogue") {
        return None;
    }

    match degraded {
        Some(error) => {
            tracing::warn!("Dialogue degraded for turn {}: {}", sequence, error);
            inner.transition(
                &mut shared,
                TurnEvent::ReplyDegraded {
                    message: error.to_string(),
                },
            )?;
            inner.emit(OrchestratorEvent::Degraded { sequence, error });
        }
        None => {
            inner.transition(&mut shared, TurnEvent::ReplyReady)?;
        }
    }

    if reply.response_text != inner.settings.apology_text {
        inner.push_history(
            &mut shared,
            ConversationExchange {
                transcript: transcript_text,
                reply: reply.response_text.clone(),
            },
        );
    }

    inner.emit(OrchestratorEvent::Reply {
        sequence,
        reply: reply.clone(),
        prosody: prosody_for(reply.emotion),
    });
    Some(reply)
}

/// Synthesizing -> Speaking, with the reply audio written to an artifact
async fn synthesize(
    inner: &Inner,
    sequence: TurnSequenceId,
    reply: DialogueReply,
) -> Option<SynthesizedAudioArtifact> {
    let prosody = prosody_for(reply.emotion);
    tracing::info!(
        "Turn {} reply emotion {:?} -> pitch {:+.1}, rate {:.2}",
        sequence,
        reply.emotion,
        prosody.pitch_semitones,
        prosody.speaking_rate
    );

    let result = inner
        .components
        .synthesis
        .synthesize(SynthesisRequest {
            text: reply.response_text,
            language_code: inner.settings.voice_language_code.clone(),
            voice_gender: inner.settings.voice_gender,
            prosody,
            encoding: inner.settings.synthesis_encoding,
        })
        .await;

    let mut shared = inner.shared.lock();
    if !Inner::is_current(&shared, sequence, "synthesis") {
        return None;
    }

    let audio = match result {
        Ok(audio) => audio,
        Err(e) => {
            let message = e.to_string();
            inner.fail(&mut shared, sequence, e, TurnEvent::SynthesisFailed { message });
            return None;
        }
    };

    // Written under the lock so a concurrent cancel always sees the artifact
    let handle = match inner
        .store
        .persist(sequence, ArtifactKind::Reply, audio.encoding, &audio.bytes)
    {
        Ok(handle) => handle,
        Err(e) => {
            let error = TurnError::SynthesisFailure(format!("Failed to store reply audio: {}", e));
            let message = error.to_string();
            inner.fail(&mut shared, sequence, error, TurnEvent::SynthesisFailed { message });
            return None;
        }
    };

    inner.transition(&mut shared, TurnEvent::SynthesisReady)?;
    Some(SynthesizedAudioArtifact {
        handle,
        encoding: audio.encoding,
        created_at: chrono::Utc::now(),
    })
}

/// Speaking -> Idle on completion
async fn speak(inner: &Inner, sequence: TurnSequenceId, artifact: SynthesizedAudioArtifact) {
    let (done_tx, done_rx) = oneshot::channel();
    let events = inner.events.clone();
    let on_progress: ProgressHandler = Arc::new(move |position, duration| {
        let _ = events.send(OrchestratorEvent::PlaybackProgress {
            sequence,
            position_ms: position.as_millis() as u64,
            duration_ms: duration.map(|d| d.as_millis() as u64),
        });
    });

    let mut playback =
        PlaybackController::new(inner.components.audio_sink.clone(), inner.settings.frame_interval);
    let started = playback
        .start(
            &artifact,
            Box::new(move |outcome| {
                let _ = done_tx.send(outcome);
            }),
            Some(on_progress),
        )
        .await;

    {
        let mut shared = inner.shared.lock();
        if !Inner::is_current(&shared, sequence, "playback start") {
            playback.stop();
            return;
        }
        if let Err(e) = started {
            let message = e.to_string();
            inner.fail(&mut shared, sequence, e, TurnEvent::PlaybackFailed { message });
            return;
        }
        match Inner::live_mut(&mut shared, sequence) {
            Some(live) => live.playback = Some(playback),
            None => return,
        }
    }

    // Sender is dropped without a value when playback is stopped
    let Ok(outcome) = done_rx.await else {
        return;
    };

    let mut shared = inner.shared.lock();
    if !Inner::is_current(&shared, sequence, "playback") {
        return;
    }
    match outcome {
        PlaybackOutcome::Completed => {
            inner.transition(&mut shared, TurnEvent::PlaybackComplete);
        }
        PlaybackOutcome::Failed(message) => {
            inner.fail(
                &mut shared,
                sequence,
                TurnError::PlaybackFailure(message.clone()),
                TurnEvent::PlaybackFailed { message },
            );
        }
    }
}
