//! Emotion to speech-delivery mapping

use crate::types::{EmotionTag, ProsodyParams};

impl ProsodyParams {
    /// Unmodified delivery
    pub const NEUTRAL: ProsodyParams = ProsodyParams {
        pitch_semitones: 0.0,
        speaking_rate: 1.0,
    };
}

/// Synthesis parameters for a detected emotion
pub fn prosody_for(emotion: EmotionTag) -> ProsodyParams {
    match emotion {
        EmotionTag::Joy | EmotionTag::Surprise => ProsodyParams {
            pitch_semitones: 2.0,
            speaking_rate: 1.1,
        },
        EmotionTag::Sadness | EmotionTag::Fear => ProsodyParams {
            pitch_semitones: -2.0,
            speaking_rate: 0.9,
        },
        EmotionTag::Anger => ProsodyParams {
            pitch_semitones: -1.0,
            speaking_rate: 1.05,
        },
        EmotionTag::Neutral => ProsodyParams::NEUTRAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uplifting_emotions_raise_pitch() {
        for emotion in [EmotionTag::Joy, EmotionTag::Surprise] {
            let p = prosody_for(emotion);
            assert_eq!(p.pitch_semitones, 2.0);
            assert_eq!(p.speaking_rate, 1.1);
        }
    }

    #[test]
    fn test_low_emotions_slow_down() {
        for emotion in [EmotionTag::Sadness, EmotionTag::Fear] {
            let p = prosody_for(emotion);
            assert_eq!(p.pitch_semitones, -2.0);
            assert_eq!(p.speaking_rate, 0.9);
        }
    }

    #[test]
    fn test_anger_and_neutral() {
        assert_eq!(
            prosody_for(EmotionTag::Anger),
            ProsodyParams {
                pitch_semitones: -1.0,
                speaking_rate: 1.05
            }
        );
        assert_eq!(prosody_for(EmotionTag::Neutral), ProsodyParams::NEUTRAL);
        assert_eq!(
            prosody_for(EmotionTag::parse("bewildered")),
            ProsodyParams::NEUTRAL
        );
    }
}
