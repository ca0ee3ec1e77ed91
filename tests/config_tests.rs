// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use vp8_capture::config::EncoderOptions;
use vp8_capture::{CaptureError, Config, DrainPolicy, EncoderSettings};

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.width, 640, "Default capture width should be 640");
    assert_eq!(config.height, 480, "Default capture height should be 480");
    assert_eq!(
        config.output_capacity,
        5 * 1024 * 1024,
        "Default output capacity should be 5 MiB"
    );
    assert_eq!(config.encoder, EncoderOptions::default());
    assert_eq!(config.encoder.drain, DrainPolicy::FirstPacket);
}

#[test]
fn test_partial_json_keeps_defaults() {
    let config = Config::from_json(r#"{ "width": 320, "encoder": { "drain": "concatenate" } }"#)
        .expect("partial config should parse");

    assert_eq!(config.width, 320);
    assert_eq!(config.height, 480, "Unset fields fall back to defaults");
    assert_eq!(config.encoder.drain, DrainPolicy::Concatenate);
    assert_eq!(config.encoder.keyframe_max_dist, 1000);
}

#[test]
fn test_invalid_json_is_config_error() {
    assert!(matches!(
        Config::from_json("{ width: }"),
        Err(CaptureError::ConfigError(_))
    ));
}

#[test]
fn test_save_and_load() {
    let path = std::env::temp_dir()
        .join(format!("vp8-capture-test-{}", std::process::id()))
        .join("config.json");

    let mut config = Config::default();
    config.framerate = 15;
    config.encoder.target_bitrate_bps = Some(400_000);
    config.save(&path).expect("config should save");

    let loaded = Config::load_or_default(Some(&path)).expect("config should load");
    assert_eq!(loaded, config);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}

#[test]
fn test_missing_file_uses_defaults() {
    let path = std::env::temp_dir().join("vp8-capture-does-not-exist.json");
    let config = Config::load_or_default(Some(&path)).expect("defaults");
    assert_eq!(config, Config::default());
}

#[test]
fn test_encoder_settings_from_config() {
    let mut config = Config::default();
    config.framerate = 24;
    config.encoder.lag_in_frames = 2;
    config.encoder.drain = DrainPolicy::Concatenate;

    let settings = EncoderSettings::from_config(&config);
    assert_eq!(settings.framerate, 24);
    assert_eq!(settings.lag_in_frames, 2);
    assert!(settings.validate().is_ok(), "lag is fine when concatenating");
}
