// SPDX-License-Identifier: GPL-3.0-only

//! VP8 Capture - camera capture and VP8 encode/decode sessions
//!
//! This library wraps the GStreamer VP8 elements in owned codec sessions
//! with an explicit lifecycle, and builds a camera capture façade and IVF
//! storage on top of them.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera enumeration and frame sources
//! - [`media`]: Planar images, VP8 encoder/decoder sessions, IVF container
//! - [`pipelines`]: Capture session and launch-string transport pipelines
//! - [`config`]: User configuration handling
//! - [`errors`]: Error type shared by every operation
//!
//! # Example
//!
//! ```no_run
//! use vp8_capture::{PlanarImage, Vp8Decoder, Vp8Encoder};
//!
//! let mut encoder = Vp8Encoder::open(640, 480)?;
//! let frame = encoder.encode(&PlanarImage::black(640, 480), true, 65536)?;
//!
//! let mut decoder = Vp8Decoder::open()?;
//! let image = decoder.decode(&frame.data, 640 * 480 * 2)?;
//! assert_eq!((image.width(), image.height()), (640, 480));
//! # Ok::<(), vp8_capture::CaptureError>(())
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;

// Re-export commonly used types
pub use backends::camera::{CameraDevice, CameraSource, FrameSource};
pub use config::Config;
pub use errors::{CaptureError, CaptureResult};
pub use media::{
    DecodeSummary, DrainPolicy, EncodedFrame, EncodedFrameInfo, EncoderSettings, PlanarImage,
    PlaneLayout, SessionState, Vp8Decoder, Vp8Encoder,
};
pub use pipelines::{CaptureSession, KeyFrameRequest, MediaPipeline};
