//! Audio helpers and device adapters
//!
//! The sample conversion and metering code is always built. Real microphone
//! capture (cpal) and speaker playback (rodio) live behind the `audio-io`
//! feature; without it the pipeline runs against any `AudioSource` /
//! `AudioSink` implementation supplied by the caller.

pub mod capture;
pub mod metering;
#[cfg(feature = "audio-io")]
pub mod output;

pub use capture::{f32_to_i16, mix_to_mono, resample_to_mono_f32, CaptureResampler};
#[cfg(feature = "audio-io")]
pub use capture::CpalAudioSource;
pub use metering::{AudioLevel, AudioMeter};
#[cfg(feature = "audio-io")]
pub use output::RodioAudioSink;
