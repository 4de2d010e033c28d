//! Playback controller
//!
//! Plays one synthesized artifact and reports completion exactly once. A
//! monitor task polls the stream every frame interval; playback counts as
//! complete when the device reports end-of-stream or the position is within
//! one frame interval of the total duration.

use crate::error::{TurnError, TurnResult};
use crate::types::SynthesizedAudioArtifact;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A playing stream on the output device
pub trait PlaybackStream: Send {
    fn position(&self) -> Duration;

    /// Total length, if the decoder knows it
    fn duration(&self) -> Option<Duration>;

    /// Device reports end-of-stream
    fn is_finished(&self) -> bool;

    /// Asynchronous device error, if any
    fn error(&self) -> Option<String> {
        None
    }

    fn stop(&mut self);
}

/// Speaker seam
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Open `artifact` and start playing it
    async fn open(&self, artifact: &SynthesizedAudioArtifact)
        -> TurnResult<Box<dyn PlaybackStream>>;
}

/// How a playback ended on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Failed(String),
}

pub type CompletionHandler = Box<dyn FnOnce(PlaybackOutcome) + Send>;

/// Receives `(position, duration)` on every monitor tick
pub type ProgressHandler = Arc<dyn Fn(Duration, Option<Duration>) + Send + Sync>;

type SharedStream = Arc<Mutex<Box<dyn PlaybackStream>>>;

struct ActivePlayback {
    stream: SharedStream,
    monitor: JoinHandle<()>,
}

pub struct PlaybackController {
    sink: Arc<dyn AudioSink>,
    frame_interval: Duration,
    active: Option<ActivePlayback>,
}

impl PlaybackController {
    pub fn new(sink: Arc<dyn AudioSink>, frame_interval: Duration) -> Self {
        Self {
            sink,
            frame_interval: frame_interval.max(Duration::from_millis(1)),
            active: None,
        }
    }

    /// Start playing `artifact`
    ///
    /// `on_complete` is invoked at most once, from the monitor task. It is not
    /// invoked if `stop` is called first.
    pub async fn start(
        &mut self,
        artifact: &SynthesizedAudioArtifact,
        on_complete: CompletionHandler,
        on_progress: Option<ProgressHandler>,
    ) -> TurnResult<()> {
        self.stop();

        let stream = self.sink.open(artifact).await.map_err(|e| match e {
            TurnError::PlaybackFailure(_) => e,
            other => TurnError::PlaybackFailure(other.to_string()),
        })?;

        tracing::info!(
            "Playback started: {} ({:?})",
            artifact.handle.path.display(),
            stream.duration()
        );

        let stream: SharedStream = Arc::new(Mutex::new(stream));
        let monitor = tokio::spawn(monitor_playback(
            stream.clone(),
            self.frame_interval,
            on_complete,
            on_progress,
        ));

        self.active = Some(ActivePlayback { stream, monitor });
        Ok(())
    }

    /// Halt playback immediately; safe to call repeatedly
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.monitor.abort();
            active.stream.lock().stop();
            tracing::debug!("Playback stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn monitor_playback(
    stream: SharedStream,
    frame_interval: Duration,
    on_complete: CompletionHandler,
    on_progress: Option<ProgressHandler>,
) {
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let outcome = loop {
        ticker.tick().await;

        let (position, duration, finished, error) = {
            let stream = stream.lock();
            (
                stream.position(),
                stream.duration(),
                stream.is_finished(),
                stream.error(),
            )
        };

        if let Some(message) = error {
            break PlaybackOutcome::Failed(message);
        }

        if let Some(on_progress) = &on_progress {
            on_progress(position, duration);
        }

        let near_end = duration
            .map(|total| position + frame_interval >= total)
            .unwrap_or(false);
        if finished || near_end {
            break PlaybackOutcome::Completed;
        }
    };

    match &outcome {
        PlaybackOutcome::Completed => tracing::info!("Playback complete"),
        PlaybackOutcome::Failed(message) => tracing::error!("Playback failed: {}", message),
    }
    on_complete(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArtifactHandle, AudioEncoding, TurnSequenceId};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio::sync::oneshot;

    struct ClockStream {
        started: Instant,
        length: Duration,
        stopped: Arc<AtomicBool>,
        fail_after: Option<Duration>,
    }

    impl PlaybackStream for ClockStream {
        fn position(&self) -> Duration {
            self.started.elapsed().min(self.length)
        }

        fn duration(&self) -> Option<Duration> {
            Some(self.length)
        }

        fn is_finished(&self) -> bool {
            false
        }

        fn error(&self) -> Option<String> {
            match self.fail_after {
                Some(after) if self.started.elapsed() >= after => {
                    Some("device unplugged".to_string())
                }
                _ => None,
            }
        }

        fn stop(&mut self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct ClockSink {
        length: Duration,
        stopped: Arc<AtomicBool>,
        fail_open: bool,
        fail_after: Option<Duration>,
    }

    impl ClockSink {
        fn new(length_ms: u64) -> Self {
            Self {
                length: Duration::from_millis(length_ms),
                stopped: Arc::new(AtomicBool::new(false)),
                fail_open: false,
                fail_after: None,
            }
        }
    }

    #[async_trait]
    impl AudioSink for ClockSink {
        async fn open(
            &self,
            _artifact: &SynthesizedAudioArtifact,
        ) -> TurnResult<Box<dyn PlaybackStream>> {
            if self.fail_open {
                return Err(TurnError::PlaybackFailure("unsupported format".to_string()));
            }
            Ok(Box::new(ClockStream {
                started: Instant::now(),
                length: self.length,
                stopped: self.stopped.clone(),
                fail_after: self.fail_after,
            }))
        }
    }

    fn artifact() -> SynthesizedAudioArtifact {
        SynthesizedAudioArtifact {
            handle: ArtifactHandle {
                id: uuid::Uuid::new_v4(),
                path: "/tmp/reply.wav".into(),
                sequence: TurnSequenceId(1),
            },
            encoding: AudioEncoding::Linear16Wav,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_completion_fires_once_near_end() {
        let sink = Arc::new(ClockSink::new(120));
        let mut controller = PlaybackController::new(sink.clone(), Duration::from_millis(20));
        let (tx, rx) = oneshot::channel();
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();

        controller
            .start(
                &artifact(),
                Box::new(move |outcome| {
                    let _ = tx.send(outcome);
                }),
                Some(Arc::new(move |_, _| {
                    t.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert!(ticks.load(Ordering::SeqCst) >= 1);

        controller.stop();
        assert!(sink.stopped.load(Ordering::SeqCst));
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_suppresses_completion() {
        let sink = Arc::new(ClockSink::new(10_000));
        let mut controller = PlaybackController::new(sink.clone(), Duration::from_millis(10));
        let completed = Arc::new(AtomicBool::new(false));
        let c = completed.clone();

        controller
            .start(
                &artifact(),
                Box::new(move |_| c.store(true, Ordering::SeqCst)),
                None,
            )
            .await
            .unwrap();
        assert!(controller.is_active());

        controller.stop();
        controller.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(sink.stopped.load(Ordering::SeqCst));
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_open_failure_reports_playback_failure() {
        let mut sink = ClockSink::new(100);
        sink.fail_open = true;
        let mut controller = PlaybackController::new(Arc::new(sink), Duration::from_millis(10));

        let result = controller.start(&artifact(), Box::new(|_| {}), None).await;
        assert!(matches!(result, Err(TurnError::PlaybackFailure(_))));
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_device_error_reports_failed() {
        let mut sink = ClockSink::new(10_000);
        sink.fail_after = Some(Duration::from_millis(30));
        let mut controller = PlaybackController::new(Arc::new(sink), Duration::from_millis(10));
        let (tx, rx) = oneshot::channel();

        controller
            .start(
                &artifact(),
                Box::new(move |outcome| {
                    let _ = tx.send(outcome);
                }),
                None,
            )
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, PlaybackOutcome::Failed("device unplugged".to_string()));
    }
}
