// SPDX-License-Identifier: GPL-3.0-only

//! Capture and transport pipelines
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │    Camera    │ ──▶ │  CaptureSession   │ ──▶ │  VP8 frames  │
//! │ (FrameSource)│     │  - read frame     │     │  (IVF, ...)  │
//! │              │     │  - VP8 encode     │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Bytes/images │ ──▶ │  MediaPipeline    │ ──▶ │ Sink / bytes │
//! │   (appsrc)   │     │  - launch string  │     │  (appsink)   │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```

pub mod capture;
pub mod transport;

pub use capture::{CaptureSession, KeyFrameRequest};
pub use transport::MediaPipeline;
