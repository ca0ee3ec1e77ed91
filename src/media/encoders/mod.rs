// SPDX-License-Identifier: GPL-3.0-only

//! VP8 encoding
//!
//! [`vp8::Vp8Encoder`] is the encode session. It owns a [`NativeEncoder`],
//! the seam to the actual codec implementation ([`vp8::GstVp8Encoder`]
//! wraps the `vp8enc` element), and applies the session rules on top:
//! lifecycle checks, frame counting, packet draining and output capacity.

pub mod vp8;

use crate::errors::CaptureResult;
use crate::media::planar::PlanarImage;
use serde::{Deserialize, Serialize};

pub use vp8::{EncoderSettings, GstVp8Encoder, Vp8Encoder};

/// How the packets produced for one submitted frame are collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Return the first packet and discard any others. Requires zero lag so
    /// that every frame yields exactly one packet.
    #[default]
    FirstPacket,
    /// Concatenate every packet produced for the frame
    Concatenate,
}

/// One compressed packet as produced by the native encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    pub is_key_frame: bool,
}

/// Encoded frame handed to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub data: Vec<u8>,
    pub is_key_frame: bool,
    /// Zero-based index of the submitted frame this data belongs to
    pub presentation_index: u64,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Result of encoding into a caller-provided buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedFrameInfo {
    /// Bytes written to the front of the output buffer
    pub len: usize,
    pub is_key_frame: bool,
    pub presentation_index: u64,
}

/// Native VP8 encoder used by [`Vp8Encoder`]
pub trait NativeEncoder: Send + Sized {
    /// Create and start an encoder for the given settings
    fn create(settings: &EncoderSettings) -> CaptureResult<Self>;

    /// Submit one image; `pts` is the frame index
    fn encode(&mut self, image: &PlanarImage, pts: u64, force_key_frame: bool)
    -> CaptureResult<()>;

    /// Next packet produced by the last `encode` call
    fn next_packet(&mut self) -> Option<CaptureResult<EncodedPacket>>;

    /// Release the working buffers and destroy the encoder
    fn destroy(&mut self) -> CaptureResult<()>;
}
