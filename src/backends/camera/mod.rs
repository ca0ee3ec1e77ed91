// SPDX-License-Identifier: GPL-3.0-only

//! Camera backend
//!
//! ```text
//! ┌──────────────────────┐
//! │   CaptureSession     │
//! └──────────┬───────────┘
//!            │ read_frame()
//!            ▼
//! ┌──────────────────────┐
//! │  FrameSource trait   │  ← I420 frames at a fixed size
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │   GstCameraSource    │  ← v4l2src / videotestsrc ! videoconvert ! appsink
//! └──────────────────────┘
//! ```

pub mod enumeration;
pub mod gst_source;
pub mod types;

pub use enumeration::enumerate_cameras;
pub use gst_source::GstCameraSource;
pub use types::*;

use crate::errors::CaptureResult;
use crate::media::planar::PlanarImage;

/// Anything that yields uncompressed frames of a fixed geometry
pub trait FrameSource: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Wait for the next frame. Fails with `NoData` when none arrives in time.
    fn read_frame(&mut self) -> CaptureResult<PlanarImage>;

    /// Stop capturing and release the device
    fn close(&mut self) -> CaptureResult<()>;
}
