//! Microphone capture
//!
//! cpal streams are not `Send`, so each capture owns a dedicated thread that
//! builds the stream, forwards converted frames over a tokio channel and
//! drops the stream when told to stop.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

const RESAMPLE_CHUNK_SIZE: usize = 1024;

/// Average interleaved frames down to a single channel
pub fn mix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Streaming mono mixdown plus sample rate conversion
///
/// Device buffers arrive in whatever sizes the driver picks, so mono samples
/// are held back until a full resampler chunk is available. When the device
/// already runs at the target rate the samples pass straight through.
pub struct CaptureResampler {
    resampler: Option<SincFixedIn<f32>>,
    channels: usize,
    pending: Vec<f32>,
}

impl CaptureResampler {
    pub fn new(
        source_rate: u32,
        target_rate: u32,
        channels: usize,
    ) -> Result<Self, rubato::ResamplerConstructionError> {
        let resampler = if source_rate == target_rate {
            None
        } else {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                interpolation: SincInterpolationType::Linear,
                oversampling_factor: 256,
                window: WindowFunction::BlackmanHarris2,
            };
            Some(SincFixedIn::new(
                target_rate as f64 / source_rate.max(1) as f64,
                2.0,
                params,
                RESAMPLE_CHUNK_SIZE,
                1,
            )?)
        };

        Ok(Self {
            resampler,
            channels: channels.max(1),
            pending: Vec::new(),
        })
    }

    /// Leading samples of filter delay in the converted output
    pub fn output_delay(&self) -> usize {
        self.resampler.as_ref().map_or(0, |r| r.output_delay())
    }

    /// Convert one buffer of interleaved device samples
    ///
    /// May return fewer samples than the input represents; the remainder is
    /// emitted by a later call or by `flush`.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>, rubato::ResampleError> {
        let mono = mix_to_mono(interleaved, self.channels);
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(mono);
        };

        self.pending.extend_from_slice(&mono);
        let mut output = Vec::new();
        while self.pending.len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let waves_in = vec![self.pending.drain(..needed).collect::<Vec<f32>>()];
            let waves_out = resampler.process(&waves_in, None)?;
            output.extend(waves_out.into_iter().next().unwrap_or_default());
        }
        Ok(output)
    }

    /// Push out held-back samples and the filter tail
    pub fn flush(&mut self) -> Result<Vec<f32>, rubato::ResampleError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };

        let mut output = Vec::new();
        if !self.pending.is_empty() {
            let waves_in = vec![std::mem::take(&mut self.pending)];
            let waves_out = resampler.process_partial(Some(waves_in.as_slice()), None)?;
            output.extend(waves_out.into_iter().next().unwrap_or_default());
        }
        let waves_out = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
        output.extend(waves_out.into_iter().next().unwrap_or_default());
        Ok(output)
    }
}

/// Mix a complete interleaved buffer to mono at `target_rate`
///
/// The filter delay is trimmed so the result lines up with the input and has
/// exactly as many samples as the input duration calls for.
pub fn resample_to_mono_f32(
    samples: &[f32],
    source_rate: u32,
    channels: usize,
    target_rate: u32,
) -> anyhow::Result<Vec<f32>> {
    let mut converter = CaptureResampler::new(source_rate, target_rate, channels)?;
    let frames = samples.len() / channels.max(1);
    let expected =
        (frames as f64 * target_rate as f64 / source_rate.max(1) as f64).round() as usize;
    let delay = converter.output_delay();

    let mut output = converter.process(samples)?;
    output.extend(converter.flush()?);
    while output.len() < delay + expected {
        let tail = converter.flush()?;
        if tail.is_empty() {
            break;
        }
        output.extend(tail);
    }

    Ok(output.into_iter().skip(delay).take(expected).collect())
}

/// Convert a normalised sample to 16-bit PCM
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

#[cfg(feature = "audio-io")]
pub use device::CpalAudioSource;

#[cfg(feature = "audio-io")]
mod device {
    use super::CaptureResampler;
    use crate::error::{TurnError, TurnResult};
    use crate::recording::{AudioFrame, AudioSource, CaptureStream};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use crossbeam_channel::{bounded, Sender};
    use tokio::sync::mpsc::UnboundedSender;

    /// Captures from the default (or a named) cpal input device
    #[derive(Debug, Clone, Default)]
    pub struct CpalAudioSource {
        device_name: Option<String>,
    }

    impl CpalAudioSource {
        pub fn new(device_name: Option<String>) -> Self {
            Self { device_name }
        }
    }

    #[async_trait]
    impl AudioSource for CpalAudioSource {
        async fn open(
            &self,
            sample_rate: u32,
            frames: UnboundedSender<AudioFrame>,
        ) -> TurnResult<Box<dyn CaptureStream>> {
            let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
            let (stop_tx, stop_rx) = bounded::<()>(1);
            let device_name = self.device_name.clone();

            std::thread::Builder::new()
                .name("wellspoken-capture".to_string())
                .spawn(move || {
                    let stream = match build_stream(device_name.as_deref(), sample_rate, frames) {
                        Ok(stream) => {
                            let _ = ready_tx.send(Ok(()));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    // Blocks until stop() or the handle is dropped
                    let _ = stop_rx.recv();
                    drop(stream);
                    tracing::debug!("Capture thread finished");
                })
                .map_err(|e| TurnError::RecordingFailure(e.to_string()))?;

            let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
                .await
                .map_err(|e| TurnError::RecordingFailure(e.to_string()))?;

            match ready {
                Ok(Ok(())) => Ok(Box::new(CpalCapture {
                    stop_tx: Some(stop_tx),
                })),
                Ok(Err(e)) => Err(TurnError::RecordingFailure(e.to_string())),
                Err(_) => Err(TurnError::RecordingFailure(
                    "capture thread exited before starting".to_string(),
                )),
            }
        }
    }

    struct CpalCapture {
        stop_tx: Option<Sender<()>>,
    }

    impl CaptureStream for CpalCapture {
        fn stop(&mut self) {
            if let Some(tx) = self.stop_tx.take() {
                let _ = tx.send(());
            }
        }
    }

    impl Drop for CpalCapture {
        fn drop(&mut self) {
            self.stop();
        }
    }

    #[allow(deprecated)] // cpal 0.17 deprecates name() but description() is not yet stable
    fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
        if let Some(wanted) = name {
            if let Some(device) = host
                .input_devices()?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
            {
                return Ok(device);
            }
            tracing::warn!("Input device '{}' not found, using default", wanted);
        }

        host.default_input_device()
            .ok_or_else(|| anyhow!("No default input device available"))
    }

    #[allow(deprecated)]
    fn build_stream(
        device_name: Option<&str>,
        target_rate: u32,
        frames: UnboundedSender<AudioFrame>,
    ) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = find_device(&host, device_name)?;
        let supported = device.default_input_config()?;
        let source_rate = supported.sample_rate();
        let channels = supported.channels() as usize;

        tracing::info!(
            "Opening input device '{}': {}Hz, {} channels, format={:?}",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            source_rate,
            channels,
            supported.sample_format()
        );

        let mut resampler = CaptureResampler::new(source_rate, target_rate, channels)?;

        let stream = device.build_input_stream(
            &supported.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let samples = match resampler.process(data) {
                    Ok(samples) if !samples.is_empty() => samples,
                    Ok(_) => return,
                    Err(e) => {
                        tracing::warn!("Dropping capture buffer, resampling failed: {}", e);
                        return;
                    }
                };
                // Receiver gone means the recording was stopped
                let _ = frames.send(AudioFrame {
                    samples,
                    sample_rate: target_rate,
                });
            },
            |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )?;

        stream.play()?;
        Ok(stream)
    }
}
