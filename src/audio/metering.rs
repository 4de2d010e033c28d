//! Input level metering
//!
//! Turns captured frames into the level readings shown while the user is
//! speaking.

use serde::Serialize;

/// Level reading for one captured frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AudioLevel {
    /// RMS level, normalised 0.0-1.0
    pub rms: f32,
    /// Peak level with decay, normalised 0.0-1.0
    pub peak: f32,
    /// RMS in dB, floored at `MIN_DB`
    pub db: f32,
}

/// Floor for dB readings
pub const MIN_DB: f32 = -60.0;

/// Peak-hold meter fed one frame at a time
pub struct AudioMeter {
    peak: f32,
    decay_rate: f32,
}

impl Default for AudioMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioMeter {
    /// ~300ms peak hold at 30Hz updates
    pub fn new() -> Self {
        Self::with_decay(0.95)
    }

    pub fn with_decay(decay_rate: f32) -> Self {
        Self {
            peak: 0.0,
            decay_rate: decay_rate.clamp(0.0, 0.999),
        }
    }

    pub fn process(&mut self, samples: &[f32]) -> AudioLevel {
        let rms = rms(samples);
        let frame_peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        self.peak = if frame_peak > self.peak {
            frame_peak
        } else {
            self.peak * self.decay_rate
        };

        AudioLevel {
            rms: rms.min(1.0),
            peak: self.peak.min(1.0),
            db: to_db(rms),
        }
    }

    pub fn reset(&mut self) {
        self.peak = 0.0;
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

fn to_db(amplitude: f32) -> f32 {
    if amplitude > 0.0 {
        (20.0 * amplitude.log10()).max(MIN_DB)
    } else {
        MIN_DB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_reads_floor() {
        let mut meter = AudioMeter::new();
        let level = meter.process(&[0.0; 512]);
        assert_eq!(level.rms, 0.0);
        assert_eq!(level.peak, 0.0);
        assert_eq!(level.db, MIN_DB);
    }

    #[test]
    fn test_empty_frame_decays_peak() {
        let mut meter = AudioMeter::with_decay(0.5);
        meter.process(&[0.8]);
        let level = meter.process(&[]);
        assert!((level.peak - 0.4).abs() < 1e-6);
        assert_eq!(level.db, MIN_DB);
    }

    #[test]
    fn test_full_scale_is_zero_db() {
        let mut meter = AudioMeter::new();
        let level = meter.process(&[1.0, -1.0, 1.0, -1.0]);
        assert!((level.rms - 1.0).abs() < 1e-6);
        assert!(level.db.abs() < 1e-4);
        assert_eq!(level.peak, 1.0);
    }

    #[test]
    fn test_reset_clears_peak() {
        let mut meter = AudioMeter::new();
        meter.process(&[0.9]);
        meter.reset();
        assert_eq!(meter.process(&[0.1]).peak, 0.1);
    }
}
