// SPDX-License-Identifier: GPL-3.0-only

//! VP8 decoding
//!
//! [`vp8::Vp8Decoder`] is the decode session on top of a [`NativeDecoder`];
//! [`vp8::GstVp8Decoder`] wraps the `vp8dec` element.

pub mod vp8;

use crate::errors::CaptureResult;
use crate::media::planar::StridedPlanes;

pub use vp8::{GstVp8Decoder, Vp8Decoder};

/// Result of decoding into a caller-provided buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    /// Tightly packed I420 bytes written to the front of the output
    pub bytes_written: usize,
    /// Pictures drained for this input
    pub frames: usize,
    /// Geometry of the last picture (zero when none was produced)
    pub width: u32,
    pub height: u32,
}

/// Native VP8 decoder used by [`Vp8Decoder`]
pub trait NativeDecoder: Send + Sized {
    type Picture: StridedPlanes;

    fn create() -> CaptureResult<Self>;

    /// Submit one compressed frame
    fn decode(&mut self, data: &[u8]) -> CaptureResult<()>;

    /// Next reconstructed picture for the last submitted frame
    fn next_picture(&mut self) -> Option<CaptureResult<Self::Picture>>;

    fn destroy(&mut self) -> CaptureResult<()>;
}
