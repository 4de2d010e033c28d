//! Recording controller
//!
//! Owns one capture session: frames from an `AudioSource` are appended to a
//! 16-bit mono WAV artifact and each one rearms a single silence timer. When
//! the timer runs out the silence notifier fires once and the pump exits; the
//! owner then calls `stop(false)` to finalize the artifact.
//!
//! ```text
//! AudioSource ──frames──▶ pump task ──▶ WavWriter (artifact)
//!                            │  └────▶ frame observer (levels)
//!                            └─ sleep.reset(now + timeout) per frame
//!                                  └─ expires ──▶ on_silence() (once)
//! ```

use crate::artifact::{ArtifactKind, ArtifactStore};
use crate::audio::capture::f32_to_i16;
use crate::error::{TurnError, TurnResult};
use crate::types::{ArtifactHandle, AudioArtifact, AudioEncoding, TurnSequenceId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufWriter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// One chunk of mono samples from the capture device
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Handle to a running capture; dropping or stopping it releases the device
pub trait CaptureStream: Send {
    fn stop(&mut self);
}

/// Microphone seam
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Open the device and start sending mono frames at `sample_rate`
    async fn open(
        &self,
        sample_rate: u32,
        frames: UnboundedSender<AudioFrame>,
    ) -> TurnResult<Box<dyn CaptureStream>>;
}

/// Called for every captured frame
pub type FrameObserver = Arc<dyn Fn(&AudioFrame) + Send + Sync>;

/// Called once when no frame arrived for the silence timeout
pub type SilenceNotifier = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingSettings {
    pub silence_timeout: Duration,
    pub sample_rate: u32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            silence_timeout: Duration::from_millis(1800),
            sample_rate: 16000,
        }
    }
}

type WavSink = hound::WavWriter<BufWriter<File>>;

struct Session {
    handle: ArtifactHandle,
    capture: Box<dyn CaptureStream>,
    pump: JoinHandle<()>,
    writer: Arc<Mutex<Option<WavSink>>>,
    write_error: Arc<Mutex<Option<String>>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// State shared between the controller and its pump task
struct PumpShared {
    writer: Arc<Mutex<Option<WavSink>>>,
    write_error: Arc<Mutex<Option<String>>>,
    frames: Arc<AtomicUsize>,
    observer: Arc<Mutex<Option<FrameObserver>>>,
}

pub struct RecordingController {
    session: Option<Session>,
    store: ArtifactStore,
    sequence: TurnSequenceId,
    sample_rate: u32,
    frames: Arc<AtomicUsize>,
    observer: Arc<Mutex<Option<FrameObserver>>>,
}

impl RecordingController {
    /// Open the capture device and begin writing a new utterance artifact
    ///
    /// Fails with `RecordingFailure` if the artifact cannot be created or the
    /// device cannot be opened; nothing is left on disk in either case.
    pub async fn start(
        source: &dyn AudioSource,
        store: &ArtifactStore,
        sequence: TurnSequenceId,
        settings: RecordingSettings,
        on_silence: SilenceNotifier,
    ) -> TurnResult<Self> {
        let handle = store.allocate(sequence, ArtifactKind::Utterance, AudioEncoding::Linear16Wav);

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: settings.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = match hound::WavWriter::create(&handle.path, spec) {
            Ok(writer) => writer,
            Err(e) => {
                store.release(&handle);
                return Err(TurnError::RecordingFailure(format!(
                    "Failed to create {}: {}",
                    handle.path.display(),
                    e
                )));
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let capture = match source.open(settings.sample_rate, tx).await {
            Ok(capture) => capture,
            Err(e) => {
                drop(writer);
                store.release(&handle);
                tracing::error!("Recording failed to start for turn {}: {}", sequence, e);
                return Err(e);
            }
        };

        let writer = Arc::new(Mutex::new(Some(writer)));
        let write_error = Arc::new(Mutex::new(None));
        let frames = Arc::new(AtomicUsize::new(0));
        let observer: Arc<Mutex<Option<FrameObserver>>> = Arc::new(Mutex::new(None));

        let shared = PumpShared {
            writer: writer.clone(),
            write_error: write_error.clone(),
            frames: frames.clone(),
            observer: observer.clone(),
        };
        let pump = tokio::spawn(pump_frames(rx, shared, settings.silence_timeout, on_silence));

        tracing::info!(
            "Recording started for turn {} ({}Hz, silence timeout {}ms)",
            sequence,
            settings.sample_rate,
            settings.silence_timeout.as_millis()
        );

        Ok(Self {
            session: Some(Session {
                handle,
                capture,
                pump,
                writer,
                write_error,
                created_at: chrono::Utc::now(),
            }),
            store: store.clone(),
            sequence,
            sample_rate: settings.sample_rate,
            frames,
            observer,
        })
    }

    /// Register the per-frame observer, replacing any previous one
    pub fn on_frame(&self, observer: FrameObserver) {
        *self.observer.lock() = Some(observer);
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn sequence(&self) -> TurnSequenceId {
        self.sequence
    }

    /// Frames captured so far
    pub fn frame_count(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    /// End the session
    ///
    /// With `cancel` the audio is discarded and the artifact deleted. Otherwise
    /// the WAV is finalized and handed over. A second call returns `Ok(None)`.
    pub fn stop(&mut self, cancel: bool) -> TurnResult<Option<AudioArtifact>> {
        let Some(mut session) = self.session.take() else {
            return Ok(None);
        };

        session.pump.abort();
        session.capture.stop();
        let writer = session.writer.lock().take();
        let frame_count = self.frame_count();

        if cancel {
            drop(writer);
            self.store.release(&session.handle);
            tracing::info!(
                "Recording cancelled for turn {} after {} frame(s)",
                self.sequence,
                frame_count
            );
            return Ok(None);
        }

        let finalized = match writer {
            Some(writer) => writer.finalize().map_err(|e| e.to_string()),
            None => Err("writer already closed".to_string()),
        };
        let failure = finalized.err().or_else(|| session.write_error.lock().take());
        if let Some(message) = failure {
            self.store.release(&session.handle);
            tracing::error!("Recording failed for turn {}: {}", self.sequence, message);
            return Err(TurnError::RecordingFailure(message));
        }

        tracing::info!(
            "Recording stopped for turn {}: {} frame(s) -> {}",
            self.sequence,
            frame_count,
            session.handle.path.display()
        );

        Ok(Some(AudioArtifact {
            handle: session.handle,
            sample_rate: self.sample_rate,
            encoding: AudioEncoding::Linear16Wav,
            created_at: session.created_at,
            frame_count,
        }))
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        if self.session.is_some() {
            let _ = self.stop(true);
        }
    }
}

async fn pump_frames(
    mut rx: UnboundedReceiver<AudioFrame>,
    shared: PumpShared,
    silence_timeout: Duration,
    on_silence: SilenceNotifier,
) {
    let timer = tokio::time::sleep(silence_timeout);
    tokio::pin!(timer);
    let mut open = true;

    loop {
        tokio::select! {
            frame = rx.recv(), if open => match frame {
                Some(frame) => {
                    write_frame(&shared, &frame);
                    shared.frames.fetch_add(1, Ordering::SeqCst);
                    let observer = shared.observer.lock().clone();
                    if let Some(observer) = observer {
                        observer(&frame);
                    }
                    timer.as_mut().reset(Instant::now() + silence_timeout);
                }
                None => {
                    // Device went away; only the timer can end the session now
                    tracing::debug!("Capture channel closed");
                    open = false;
                }
            },
            () = &mut timer => {
                tracing::info!(
                    "No audio for {}ms, signalling silence",
                    silence_timeout.as_millis()
                );
                on_silence();
                break;
            }
        }
    }
}

fn write_frame(shared: &PumpShared, frame: &AudioFrame) {
    let mut guard = shared.writer.lock();
    let Some(writer) = guard.as_mut() else {
        return;
    };

    for sample in &frame.samples {
        if let Err(e) = writer.write_sample(f32_to_i16(*sample)) {
            tracing::error!("Failed to write audio frame: {}", e);
            shared.write_error.lock().get_or_insert(e.to_string());
            return;
        }
    }
}
