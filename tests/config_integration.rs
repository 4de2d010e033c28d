//! Configuration system integration tests for Wellspoken.
//!
//! Tests load, save, migration and the config-to-turn-settings mapping using
//! temporary files to avoid affecting the real config.

use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use wellspoken::config::{self, Config, CURRENT_VERSION};
use wellspoken::types::{AudioEncoding, VoiceGender};
use wellspoken::TurnSettings;

// =============================================================================
// Config File Operations Tests
// =============================================================================

#[test]
fn test_save_and_load_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("config.json");

    let mut config = Config::default();
    config.recording.silence_timeout_ms = 2500;
    config.dialogue.model = "mistral".to_string();
    config.synthesis.voice_gender = VoiceGender::Male;

    config::save_to(&config_path, &config).expect("Failed to save config");
    let loaded = config::load_from(&config_path).expect("Failed to load config");

    assert_eq!(loaded, config);
}

#[test]
fn test_load_nonexistent_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nonexistent.json");

    let config = config::load_from(&config_path).expect("Should return defaults");

    assert_eq!(config, Config::default());
    assert!(!config_path.exists());
}

#[test]
fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("nested").join("dir").join("config.json");

    config::save_to(&config_path, &Config::default()).expect("Failed to save");
    assert!(config_path.exists());
}

#[test]
fn test_reset_config() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("reset.json");

    let mut config = Config::default();
    config.recording.sample_rate = 48000;
    config.logging.log_to_file = true;
    config::save_to(&config_path, &config).expect("Failed to save");

    config::save_to(&config_path, &Config::default()).expect("Failed to save defaults");

    let loaded = config::load_from(&config_path).expect("Failed to load");
    assert_eq!(loaded.recording.sample_rate, 16000);
    assert!(!loaded.logging.log_to_file);
}

#[test]
fn test_config_pretty_printed_json() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("pretty.json");

    config::save_to(&config_path, &Config::default()).expect("Failed to save");
    let content = fs::read_to_string(&config_path).expect("Failed to read");

    assert!(content.contains('\n'));
    assert!(content.contains("  "));
    assert!(content.contains("\"silence_timeout_ms\": 1800"));
}

#[test]
fn test_config_handles_invalid_json() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("invalid.json");

    fs::write(&config_path, "{ this is not valid json }").expect("Failed to write");

    assert!(config::load_from(&config_path).is_err());
}

// =============================================================================
// Config Version and Migration Tests
// =============================================================================

#[test]
fn test_old_version_is_migrated_and_rewritten() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("old.json");

    fs::write(
        &config_path,
        r#"{"version": 0, "recording": {"silence_timeout_ms": 0, "sample_rate": 22050}}"#,
    )
    .expect("Failed to write");

    let loaded = config::load_from(&config_path).expect("Failed to load");
    assert_eq!(loaded.version, CURRENT_VERSION);
    assert_eq!(loaded.recording.silence_timeout_ms, 1800);
    assert_eq!(loaded.recording.sample_rate, 22050);

    // The migrated file was saved back
    let content = fs::read_to_string(&config_path).expect("Failed to read");
    let on_disk: Config = serde_json::from_str(&content).expect("Failed to parse");
    assert_eq!(on_disk.version, CURRENT_VERSION);
}

#[test]
fn test_future_version_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("future.json");

    fs::write(&config_path, r#"{"version": 42}"#).expect("Failed to write");

    let error = config::load_from(&config_path).unwrap_err();
    assert!(error.to_string().contains("Unknown config version"));
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_config_with_all_sections_set() {
    let json = r#"{
        "version": 1,
        "recording": {
            "silence_timeout_ms": 1200,
            "sample_rate": 24000,
            "device_name": "USB Mic",
            "artifact_dir": "/var/tmp/wellspoken"
        },
        "transcription": {
            "base_url": "http://localhost:8080/v1",
            "api_key_env": null,
            "language_code": "de-DE",
            "timeout_secs": 10
        },
        "dialogue": {
            "ollama_url": "http://192.168.1.100:11434",
            "model": "mistral",
            "max_history_turns": 0
        },
        "synthesis": {
            "voice_gender": "neutral",
            "encoding": "mp3"
        },
        "playback": {"frame_interval_ms": 20},
        "logging": {"filter": "debug", "log_to_file": true}
    }"#;

    let config: Config = serde_json::from_str(json).expect("Failed to deserialise");

    assert_eq!(config.recording.device_name.as_deref(), Some("USB Mic"));
    assert_eq!(config.transcription.api_key_env, None);
    assert_eq!(config.transcription.language_code, "de-DE");
    assert_eq!(config.dialogue.max_history_turns, 0);
    assert_eq!(config.synthesis.voice_gender, VoiceGender::Neutral);
    assert_eq!(config.synthesis.encoding, AudioEncoding::Mp3);
    assert_eq!(config.playback.frame_interval_ms, 20);
    assert!(config.logging.log_to_file);
}

#[test]
fn test_multiple_saves_dont_corrupt() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_path = temp_dir.path().join("concurrent.json");

    for i in 0..10 {
        let mut config = Config::default();
        config.recording.silence_timeout_ms = 1000 + i * 100;
        config::save_to(&config_path, &config).expect("Failed to save");
    }

    let loaded = config::load_from(&config_path).expect("Failed to load");
    assert_eq!(loaded.recording.silence_timeout_ms, 1900);
}

// =============================================================================
// Turn Settings Mapping
// =============================================================================

#[test]
fn test_turn_settings_follow_config() {
    let mut config = Config::default();
    config.recording.silence_timeout_ms = 900;
    config.playback.frame_interval_ms = 25;
    config.transcription.language_code = "en-GB".to_string();
    config.dialogue.max_history_turns = 3;

    let settings = TurnSettings::from_config(&config);

    assert_eq!(settings.recording.silence_timeout, Duration::from_millis(900));
    assert_eq!(settings.recording.sample_rate, 16000);
    assert_eq!(settings.frame_interval, Duration::from_millis(25));
    assert_eq!(settings.language_code, "en-GB");
    assert_eq!(settings.max_history_turns, 3);
    assert_eq!(settings.apology_text, config.dialogue.apology_text);
}
