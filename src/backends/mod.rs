// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for frame capture
//!
//! - [`camera`]: V4L2 device enumeration and GStreamer capture pipelines

pub mod camera;
