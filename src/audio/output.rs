//! Speaker playback via rodio
//!
//! Like capture, the rodio `OutputStream` must stay on the thread that
//! created it. The thread keeps the stream alive while the shared `Sink`
//! answers position and completion queries from the playback monitor.

use crate::error::{TurnError, TurnResult};
use crate::playback::{AudioSink, PlaybackStream};
use crate::types::SynthesizedAudioArtifact;
use anyhow::{Context, Result};
use async_trait::async_trait;
use crossbeam_channel::{bounded, Sender};
use rodio::{Decoder, OutputStream, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Plays synthesized replies on the default output device
#[derive(Debug, Clone, Default)]
pub struct RodioAudioSink;

impl RodioAudioSink {
    pub fn new() -> Self {
        Self
    }
}

type Ready = Result<(Arc<Sink>, Option<Duration>)>;

#[async_trait]
impl AudioSink for RodioAudioSink {
    async fn open(
        &self,
        artifact: &SynthesizedAudioArtifact,
    ) -> TurnResult<Box<dyn PlaybackStream>> {
        let path = artifact.handle.path.clone();
        let (ready_tx, ready_rx) = bounded::<Ready>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        std::thread::Builder::new()
            .name("wellspoken-playback".to_string())
            .spawn(move || {
                let (_stream, sink) = match start_output(path) {
                    Ok((stream, sink, duration)) => {
                        let _ = ready_tx.send(Ok((sink.clone(), duration)));
                        (stream, sink)
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = stop_rx.recv();
                sink.stop();
                tracing::debug!("Playback thread finished");
            })
            .map_err(|e| TurnError::PlaybackFailure(e.to_string()))?;

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| TurnError::PlaybackFailure(e.to_string()))?;

        match ready {
            Ok(Ok((sink, duration))) => Ok(Box::new(RodioPlayback {
                sink,
                duration,
                stop_tx: Some(stop_tx),
            })),
            Ok(Err(e)) => Err(TurnError::PlaybackFailure(format!("{:#}", e))),
            Err(_) => Err(TurnError::PlaybackFailure(
                "playback thread exited before starting".to_string(),
            )),
        }
    }
}

fn start_output(path: PathBuf) -> Result<(OutputStream, Arc<Sink>, Option<Duration>)> {
    let (stream, handle) =
        OutputStream::try_default().context("No output device available")?;
    let sink = Sink::try_new(&handle).context("Failed to create audio sink")?;

    let file = File::open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let source = Decoder::new(BufReader::new(file)).context("Failed to decode reply audio")?;
    let duration = source.total_duration();

    tracing::info!(
        "Playing {} ({})",
        path.display(),
        duration
            .map(|d| format!("{}ms", d.as_millis()))
            .unwrap_or_else(|| "unknown length".to_string())
    );

    sink.append(source);
    Ok((stream, Arc::new(sink), duration))
}

struct RodioPlayback {
    sink: Arc<Sink>,
    duration: Option<Duration>,
    stop_tx: Option<Sender<()>>,
}

impl PlaybackStream for RodioPlayback {
    fn position(&self) -> Duration {
        self.sink.get_pos()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }

    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for RodioPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
