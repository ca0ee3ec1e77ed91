// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera discovery

use super::types::CameraDevice;
use tracing::debug;
use v4l::capability::Flags;
use v4l::prelude::*;
use v4l::video::Capture;

/// List V4L2 devices that can capture video, ordered by index
pub fn enumerate_cameras() -> Vec<CameraDevice> {
    let mut cameras = Vec::new();

    for node in v4l::context::enum_devices() {
        let path = node.path().to_path_buf();
        let dev = match Device::with_path(&path) {
            Ok(dev) => dev,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unopenable V4L2 node");
                continue;
            }
        };
        let caps = match dev.query_caps() {
            Ok(caps) => caps,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping V4L2 node without caps");
                continue;
            }
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        let formats: Vec<String> = dev
            .enum_formats()
            .into_iter()
            .flatten()
            .filter_map(|desc| desc.fourcc.str().ok().map(|s| s.trim().to_string()))
            .collect();

        // Metadata nodes claim capture but offer no pixel formats
        if formats.is_empty() {
            continue;
        }

        let device = CameraDevice {
            index: node.index() as u32,
            name: node.name().unwrap_or_else(|| caps.card.clone()),
            path: path.display().to_string(),
            driver: caps.driver.clone(),
            bus: caps.bus.clone(),
            formats,
        };
        debug!(path = %device.path, name = %device.name, "Found V4L2 camera");
        cameras.push(device);
    }

    cameras.sort_by_key(|camera| camera.index);
    cameras
}
