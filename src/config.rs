// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{app_info, capacity, capture, encoder, timing};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::encoders::DrainPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Encoder options that can be overridden by the user
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderOptions {
    /// Target bitrate in bits per second; `None` scales the library default
    /// to the capture resolution
    pub target_bitrate_bps: Option<u32>,
    /// Maximum distance between automatic key frames
    pub keyframe_max_dist: u32,
    /// Frames the encoder may hold back before emitting output
    pub lag_in_frames: u32,
    /// How packets produced for one frame are collected
    pub drain: DrainPolicy,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            target_bitrate_bps: None,
            keyframe_max_dist: encoder::KEYFRAME_MAX_DIST,
            lag_in_frames: encoder::LAG_IN_FRAMES,
            drain: DrainPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device index (`/dev/videoN`)
    pub device: u32,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Capture framerate
    pub framerate: u32,
    /// Scratch capacity for one encoded frame
    pub output_capacity: usize,
    /// How long a camera read waits for a frame
    pub read_timeout_ms: u64,
    /// Encoder options
    pub encoder: EncoderOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: capture::DEFAULT_DEVICE,
            width: capture::DEFAULT_WIDTH,
            height: capture::DEFAULT_HEIGHT,
            framerate: capture::DEFAULT_FRAMERATE,
            output_capacity: capacity::DEFAULT_OUTPUT_CAPACITY,
            read_timeout_ms: timing::READ_TIMEOUT_MS,
            encoder: EncoderOptions::default(),
        }
    }
}

impl Config {
    /// Default location: `<config dir>/vp8-capture/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::CONFIG_DIR_NAME).join("config.json"))
    }

    /// Parse a config from JSON text. Missing fields take their defaults.
    pub fn from_json(text: &str) -> CaptureResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| CaptureError::ConfigError(format!("invalid config: {}", e)))
    }

    /// Load a config file
    pub fn load(path: &Path) -> CaptureResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load from `path`, or the default location, falling back to defaults
    /// when no file exists. A file that exists but fails to parse is an error.
    pub fn load_or_default(path: Option<&Path>) -> CaptureResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    warn!("No config directory available, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        Self::load(&path)
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> CaptureResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| CaptureError::ConfigError(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }
}
