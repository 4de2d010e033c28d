//! Configuration management
//!
//! Persistent settings with schema versioning and migrations, stored as JSON
//! in `~/.wellspoken/config.json`. Every section is `#[serde(default)]` so a
//! partial or older file still loads.

use crate::types::{AudioEncoding, VoiceGender};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current config schema version
pub const CURRENT_VERSION: u32 = 1;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    pub recording: RecordingConfig,
    pub transcription: TranscriptionConfig,
    pub dialogue: DialogueConfig,
    pub synthesis: SynthesisConfig,
    pub playback: PlaybackConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            recording: RecordingConfig::default(),
            transcription: TranscriptionConfig::default(),
            dialogue: DialogueConfig::default(),
            synthesis: SynthesisConfig::default(),
            playback: PlaybackConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Microphone capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Silence after which listening stops on its own
    pub silence_timeout_ms: u64,
    /// Sample rate of recorded artifacts (16000 suits speech recognition)
    pub sample_rate: u32,
    /// Input device name (None for system default)
    pub device_name: Option<String>,
    /// Where ephemeral audio lives (None for `<temp>/wellspoken`)
    pub artifact_dir: Option<PathBuf>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: 1800,
            sample_rate: 16000,
            device_name: None,
            artifact_dir: None,
        }
    }
}

/// Speech-to-text service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    pub language_code: String,
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: crate::clients::transcription::DEFAULT_TRANSCRIPTION_URL.to_string(),
            api_key_env: Some("GOOGLE_API_KEY".to_string()),
            language_code: "en-US".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Dialogue backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Ollama server URL
    pub ollama_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Prior exchanges sent as context
    pub max_history_turns: usize,
    /// Spoken when the dialogue backend fails outright
    pub apology_text: String,
    /// Spoken when no speech was detected
    pub clarification_text: String,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            ollama_url: crate::clients::dialogue::DEFAULT_OLLAMA_BASE_URL.to_string(),
            model: crate::clients::dialogue::DEFAULT_DIALOGUE_MODEL.to_string(),
            timeout_secs: 30,
            max_history_turns: 6,
            apology_text: "Sorry, I lost my train of thought. Could you say that again?"
                .to_string(),
            clarification_text: "I didn't catch that. Could you say it again?".to_string(),
        }
    }
}

/// Text-to-speech service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub base_url: String,
    pub api_key_env: Option<String>,
    pub language_code: String,
    pub voice_gender: VoiceGender,
    pub encoding: AudioEncoding,
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            base_url: crate::clients::synthesis::DEFAULT_SYNTHESIS_URL.to_string(),
            api_key_env: Some("GOOGLE_API_KEY".to_string()),
            language_code: "en-US".to_string(),
            voice_gender: VoiceGender::default(),
            encoding: AudioEncoding::Linear16Wav,
            timeout_secs: 30,
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Poll interval for playback progress; also the end-of-stream tolerance
    pub frame_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 50,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub filter: String,
    /// Also write logs to `~/.wellspoken/logs`
    pub log_to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "wellspoken=info".to_string(),
            log_to_file: false,
        }
    }
}

/// Get the path to the config file (~/.wellspoken/config.json)
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Get the data directory (~/.wellspoken)
pub fn get_data_dir() -> PathBuf {
    home_dir_or_fallback().join(".wellspoken")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load configuration from `path`, migrating and re-saving older schemas
///
/// A missing file yields the defaults.
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::info!("Config file not found at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = serde_json::from_str(&contents).context("Failed to parse config")?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        save_to(path, &migrated)?;
    }

    Ok(migrated)
}

/// Save configuration to `path`, creating parent directories
pub fn save_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    }

    let contents = serde_json::to_string_pretty(config).context("Failed to serialise config")?;
    fs::write(path, contents)
        .with_context(|| format!("Failed to write config file {}", path.display()))?;

    tracing::info!("Config saved to {}", path.display());
    Ok(())
}

/// Load from the default location
pub fn load() -> Result<Config> {
    load_from(&get_config_path())
}

/// Save to the default location
pub fn save(config: &Config) -> Result<()> {
    save_to(&get_config_path(), config)
}

/// Migrate configuration from older schema versions
pub fn migrate_config(mut config: Config) -> Result<Config> {
    let original_version = config.version;

    if config.version > CURRENT_VERSION {
        return Err(anyhow!("Unknown config version: {}", config.version));
    }

    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
pub fn apply_migration(config: Config) -> Result<Config> {
    match config.version {
        // Version 0 -> 1: a zero silence timeout used to mean "default"
        0 => {
            let mut migrated = config;
            if migrated.recording.silence_timeout_ms == 0 {
                migrated.recording.silence_timeout_ms =
                    RecordingConfig::default().silence_timeout_ms;
            }
            migrated.version = 1;
            Ok(migrated)
        }
        v => Err(anyhow!("Unknown config version: {}", v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_current_version() {
        let config = Config::default();
        assert_eq!(config.version, CURRENT_VERSION);
    }

    #[test]
    fn test_recording_config_defaults() {
        let recording = RecordingConfig::default();
        assert_eq!(recording.silence_timeout_ms, 1800);
        assert_eq!(recording.sample_rate, 16000);
        assert!(recording.device_name.is_none());
        assert!(recording.artifact_dir.is_none());
    }

    #[test]
    fn test_dialogue_config_defaults() {
        let dialogue = DialogueConfig::default();
        assert_eq!(dialogue.ollama_url, "http://localhost:11434");
        assert_eq!(dialogue.model, "llama3.2");
        assert_eq!(dialogue.max_history_turns, 6);
        assert!(!dialogue.apology_text.is_empty());
        assert!(!dialogue.clarification_text.is_empty());
    }

    #[test]
    fn test_synthesis_config_serialisation() {
        let json = serde_json::to_value(SynthesisConfig::default()).unwrap();
        assert_eq!(json["voice_gender"], "female");
        assert_eq!(json["encoding"], "linear16_wav");
    }

    #[test]
    fn test_partial_config_deserialisation() {
        let json = r#"{"version": 1, "recording": {"silence_timeout_ms": 2500}}"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.recording.silence_timeout_ms, 2500);
        assert_eq!(config.recording.sample_rate, 16000);
        assert_eq!(config.playback.frame_interval_ms, 50);
        assert_eq!(config.transcription.language_code, "en-US");
    }

    #[test]
    fn test_config_unknown_fields_ignored() {
        let json = r#"{
            "version": 1,
            "unknown_field": "should be ignored",
            "dialogue": {"model": "mistral", "extra": true}
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.dialogue.model, "mistral");
    }

    #[test]
    fn test_migration_from_version_0() {
        let mut old_config = Config {
            version: 0,
            ..Default::default()
        };
        old_config.recording.silence_timeout_ms = 0;

        let migrated = migrate_config(old_config).unwrap();
        assert_eq!(migrated.version, CURRENT_VERSION);
        assert_eq!(migrated.recording.silence_timeout_ms, 1800);
    }

    #[test]
    fn test_apply_migration_unknown_version() {
        let future_config = Config {
            version: 999,
            ..Default::default()
        };

        let result = apply_migration(future_config.clone());
        assert!(result.unwrap_err().to_string().contains("Unknown config version"));
        assert!(migrate_config(future_config).is_err());
    }

    #[test]
    fn test_config_path_format() {
        let path = get_config_path();
        assert!(path.ends_with(".wellspoken/config.json"));
    }
}
