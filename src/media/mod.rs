// SPDX-License-Identifier: GPL-3.0-only

//! Media processing: planar images, VP8 codec sessions and IVF storage
//!
//! # Images
//!
//! [`planar::PlanarImage`] is the uncompressed frame type used everywhere:
//! I420 in one contiguous buffer with tight rows.
//!
//! # Codec sessions
//!
//! [`encoders::Vp8Encoder`] and [`decoders::Vp8Decoder`] wrap the GStreamer
//! `vp8enc`/`vp8dec` elements. Each session is driven synchronously through
//! [`element::StreamElement`] and follows the lifecycle in [`session`].
//!
//! # Storage
//!
//! [`ivf`] reads and writes the IVF container for recorded streams.

pub mod decoders;
pub mod element;
pub mod encoders;
pub mod ivf;
pub mod planar;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use decoders::{DecodeSummary, Vp8Decoder};
pub use encoders::{DrainPolicy, EncodedFrame, EncodedFrameInfo, EncoderSettings, Vp8Encoder};
pub use planar::{PlanarImage, PlaneLayout};
pub use session::SessionState;
