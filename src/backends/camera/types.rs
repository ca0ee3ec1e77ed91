// SPDX-License-Identifier: GPL-3.0-only

//! Camera types shared by enumeration and capture

use crate::constants::capture;
use std::fmt;

/// A V4L2 capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    /// Index N of `/dev/videoN`
    pub index: u32,
    /// Card name reported by the driver
    pub name: String,
    /// Device node path
    pub path: String,
    /// Driver name (e.g. "uvcvideo")
    pub driver: String,
    /// Bus the device sits on
    pub bus: String,
    /// Pixel formats the device offers, as fourcc strings
    pub formats: Vec<String>,
}

/// Where captured frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSource {
    /// V4L2 camera at `/dev/video{index}`
    V4l2 { index: u32 },
    /// Synthetic `videotestsrc` pattern (e.g. "smpte", "ball", "black")
    TestPattern { pattern: String },
}

impl CameraSource {
    pub fn device(index: u32) -> Self {
        CameraSource::V4l2 { index }
    }

    pub fn test_pattern(pattern: impl Into<String>) -> Self {
        CameraSource::TestPattern {
            pattern: pattern.into(),
        }
    }
}

impl fmt::Display for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSource::V4l2 { index } => write!(f, "{}", device_path(*index)),
            CameraSource::TestPattern { pattern } => write!(f, "test pattern '{}'", pattern),
        }
    }
}

/// Device node for a V4L2 index
pub fn device_path(index: u32) -> String {
    format!("{}{}", capture::V4L2_DEVICE_PREFIX, index)
}
