// SPDX-License-Identifier: GPL-3.0-only

//! VP8 decode session backed by the GStreamer `vp8dec` element

use super::{DecodeSummary, NativeDecoder};
use crate::constants::{encoder, pipeline, timing};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::element::{StreamElement, VideoPicture};
use crate::media::planar::{PlanarImage, StridedPlanes, copy_strided};
use crate::media::session::SessionState;
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info, warn};

/// `vp8dec` driven one frame at a time
pub struct GstVp8Decoder {
    stream: StreamElement,
}

impl NativeDecoder for GstVp8Decoder {
    type Picture = VideoPicture;

    fn create() -> CaptureResult<Self> {
        gst::init().map_err(|e| CaptureError::InitFailed(format!("GStreamer: {}", e)))?;

        let element = gst::ElementFactory::make(encoder::DECODER_ELEMENT)
            .name("vp8-decoder")
            .build()
            .map_err(|e| {
                CaptureError::InitFailed(format!(
                    "Failed to create {}: {}",
                    encoder::DECODER_ELEMENT,
                    e
                ))
            })?;

        // Report the first corrupt frame instead of silently dropping it
        if element.find_property("max-errors").is_some() {
            element.set_property_from_str("max-errors", "0");
        }

        let caps = gst::Caps::builder(pipeline::VP8_CAPS).build();
        let mut stream = StreamElement::new(element).map_err(CaptureError::InitFailed)?;
        stream
            .start("vp8-capture-decode", &caps)
            .map_err(CaptureError::InitFailed)?;

        info!("VP8 decoder ready");
        Ok(Self { stream })
    }

    fn decode(&mut self, data: &[u8]) -> CaptureResult<()> {
        let buffer = gst::Buffer::from_slice(data.to_vec());
        self.stream.push(buffer).map_err(CaptureError::DecodeFailed)
    }

    fn next_picture(&mut self) -> Option<CaptureResult<VideoPicture>> {
        let collected = self.stream.pop()?;
        let Some(caps) = collected.caps else {
            return Some(Err(CaptureError::DecodeFailed(
                "decoded buffer arrived before caps".into(),
            )));
        };
        Some(VideoPicture::from_buffer(collected.buffer, &caps).map_err(CaptureError::DecodeFailed))
    }

    fn destroy(&mut self) -> CaptureResult<()> {
        self.stream.stop().map_err(CaptureError::TeardownFailed)
    }
}

/// Adjust a copy error from a sub-slice to the caller's whole buffer
fn at_offset(err: CaptureError, offset: usize, capacity: usize) -> CaptureError {
    match err {
        CaptureError::OutputTooSmall { needed, .. } => CaptureError::OutputTooSmall {
            needed: offset + needed,
            capacity,
        },
        CaptureError::InvalidFrame(msg) => CaptureError::DecodeFailed(msg),
        other => other,
    }
}

/// VP8 decode session
///
/// Every call drains all pictures the decoder produces for the input and
/// writes their visible area tightly packed, one after another.
pub struct Vp8Decoder<N: NativeDecoder = GstVp8Decoder> {
    state: SessionState,
    native: Option<N>,
    frames_decoded: u64,
}

impl Vp8Decoder<GstVp8Decoder> {
    /// Decoder session ready to decode
    pub fn open() -> CaptureResult<Self> {
        let mut session = Self::new();
        session.init()?;
        Ok(session)
    }
}

impl<N: NativeDecoder> Default for Vp8Decoder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: NativeDecoder> Vp8Decoder<N> {
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            native: None,
            frames_decoded: 0,
        }
    }

    /// Ready session around an already created native decoder
    pub fn with_native(native: N) -> Self {
        Self {
            state: SessionState::Ready,
            native: Some(native),
            frames_decoded: 0,
        }
    }

    pub fn init(&mut self) -> CaptureResult<()> {
        self.state
            .require(SessionState::Uninitialized, "initialize decoder")?;
        self.native = Some(N::create()?);
        self.state = SessionState::Ready;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Pictures reconstructed so far
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    fn submit(&mut self, frame: &[u8]) -> CaptureResult<&mut N> {
        self.state.require_ready("decode")?;
        if frame.is_empty() {
            return Err(CaptureError::DecodeFailed("empty input frame".into()));
        }
        let native = self.native.as_mut().ok_or(CaptureError::InvalidState {
            operation: "decode",
            state: "uninitialized",
        })?;
        native.decode(frame).map_err(|e| match e {
            e @ CaptureError::DecodeFailed(_) => e,
            other => CaptureError::DecodeFailed(other.to_string()),
        })?;
        Ok(native)
    }

    /// Decode one compressed frame into `out`.
    ///
    /// The running offset is checked before every row; the call fails with
    /// `OutputTooSmall` at the first row that would not fit, leaving the
    /// rows before it written.
    pub fn decode_into(&mut self, frame: &[u8], out: &mut [u8]) -> CaptureResult<DecodeSummary> {
        let capacity = out.len();
        let native = self.submit(frame)?;
        let mut summary = DecodeSummary::default();

        while let Some(next) = native.next_picture() {
            let written = next.and_then(|picture| {
                let offset = summary.bytes_written;
                summary.width = picture.width();
                summary.height = picture.height();
                copy_strided(&picture, &mut out[offset..], capacity - offset)
                    .map_err(|e| at_offset(e, offset, capacity))
            });
            match written {
                Ok(written) => {
                    summary.bytes_written += written;
                    summary.frames += 1;
                }
                Err(e) => {
                    discard_remaining(native);
                    return Err(e);
                }
            }
        }

        self.record(summary.frames, summary.bytes_written);
        Ok(summary)
    }

    /// Decode one compressed frame and return the last reconstructed picture.
    ///
    /// All drained pictures count against `out_capacity`. Fails with
    /// `NoData` when the decoder produced nothing for this input.
    pub fn decode(&mut self, frame: &[u8], out_capacity: usize) -> CaptureResult<PlanarImage> {
        let native = self.submit(frame)?;
        let mut consumed = 0usize;
        let mut frames = 0usize;
        let mut last = None;

        while let Some(next) = native.next_picture() {
            let image = next.and_then(|picture| {
                let mut image = PlanarImage::try_new(picture.width(), picture.height())?;
                let limit = out_capacity.saturating_sub(consumed);
                let written = copy_strided(&picture, image.as_bytes_mut(), limit)
                    .map_err(|e| at_offset(e, consumed, out_capacity))?;
                consumed += written;
                Ok(image)
            });
            match image {
                Ok(image) => {
                    frames += 1;
                    last = Some(image);
                }
                Err(e) => {
                    discard_remaining(native);
                    return Err(e);
                }
            }
        }

        self.record(frames, consumed);
        last.ok_or(CaptureError::NoData)
    }

    fn record(&mut self, frames: usize, bytes: usize) {
        let before = self.frames_decoded;
        self.frames_decoded += frames as u64;
        if frames > 1 || before % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(
                frame = before,
                pictures = frames,
                bytes,
                "Decoded frame"
            );
        }
    }

    /// Destroy the native decoder. The session is `Closed` afterwards even
    /// when teardown fails.
    pub fn close(&mut self) -> CaptureResult<()> {
        if self.state == SessionState::Closed {
            return Err(CaptureError::InvalidState {
                operation: "close decoder",
                state: self.state.as_str(),
            });
        }
        self.state = SessionState::Closed;
        let result = match self.native.take() {
            Some(mut native) => native.destroy(),
            None => Ok(()),
        };
        info!(frames = self.frames_decoded, "VP8 decoder closed");
        result
    }
}

fn discard_remaining<N: NativeDecoder>(native: &mut N) {
    let mut discarded = 0usize;
    while native.next_picture().is_some() {
        discarded += 1;
    }
    if discarded > 0 {
        warn!(discarded, "Discarded decoded pictures after failure");
    }
}

impl<N: NativeDecoder> Drop for Vp8Decoder<N> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed
            && let Err(e) = self.close()
        {
            warn!(error = %e, "VP8 decoder teardown failed on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::planar::PlaneLayout;
    use crate::media::testing::{PaddedPicture, ScriptedDecoder};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_empty_input_fails() {
        let mut decoder = Vp8Decoder::with_native(ScriptedDecoder::default());
        let mut out = vec![0u8; 64];
        assert!(matches!(
            decoder.decode_into(&[], &mut out),
            Err(CaptureError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_native_rejection_is_decode_failed() {
        let mut native = ScriptedDecoder::default();
        native.reject_input = true;
        let mut decoder = Vp8Decoder::with_native(native);
        assert!(matches!(
            decoder.decode(&[1, 2, 3], 1024),
            Err(CaptureError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_stride_padding_is_dropped() {
        let picture = PaddedPicture::new(6, 4, 26, 10);
        let mut decoder = Vp8Decoder::with_native(ScriptedDecoder::with_pictures(vec![picture]));
        let mut out = vec![0u8; 128];

        let summary = decoder.decode_into(&[0x9d], &mut out).expect("decode");
        let layout = PlaneLayout::new(6, 4);
        assert_eq!(summary.bytes_written, layout.total_len());
        assert_eq!((summary.width, summary.height, summary.frames), (6, 4, 1));
        assert!(out[..24].iter().all(|&b| b == 10));
        assert!(out[24..30].iter().all(|&b| b == 11));
        assert!(out[30..36].iter().all(|&b| b == 12));
    }

    #[test]
    fn test_all_pictures_are_drained() {
        let pictures = vec![
            PaddedPicture::new(4, 2, 4, 1),
            PaddedPicture::new(4, 2, 4, 50),
        ];
        let mut decoder = Vp8Decoder::with_native(ScriptedDecoder::with_pictures(pictures));
        let mut out = vec![0u8; 64];

        let summary = decoder.decode_into(&[1], &mut out).expect("decode");
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.bytes_written, 24);
        assert_eq!(out[12], 50);

        let image = decoder.decode(&[1], 24).expect("decode");
        assert_eq!(image.luma()[0], 50);
        assert_eq!(decoder.frames_decoded(), 4);
    }

    #[test]
    fn test_capacity_checked_per_row() {
        let mut decoder = Vp8Decoder::with_native(ScriptedDecoder::with_pictures(vec![
            PaddedPicture::new(4, 4, 8, 7),
        ]));
        // Luma (16 bytes) fits, the first chroma row does not
        let mut out = vec![0u8; 17];
        let err = decoder.decode_into(&[1], &mut out).unwrap_err();
        assert_eq!(
            err,
            CaptureError::OutputTooSmall {
                needed: 18,
                capacity: 17
            }
        );
        assert!(out[..16].iter().all(|&b| b == 7));
    }

    #[test]
    fn test_capacity_spans_pictures() {
        let pictures = vec![
            PaddedPicture::new(2, 2, 0, 1),
            PaddedPicture::new(2, 2, 0, 2),
        ];
        let mut native = ScriptedDecoder::with_pictures(pictures);
        native.pictures_per_frame.push(PaddedPicture::new(2, 2, 0, 3));
        let mut decoder = Vp8Decoder::with_native(native);

        // Each picture is 6 bytes; the second overflows a capacity of 10
        let err = decoder.decode(&[1], 10).unwrap_err();
        assert!(matches!(err, CaptureError::OutputTooSmall { capacity: 10, .. }));

        let image = decoder.decode(&[1], 18).expect("fits");
        assert_eq!(image.luma(), &[3, 3, 3, 3]);
    }

    #[test]
    fn test_no_picture_is_no_data() {
        let mut decoder = Vp8Decoder::with_native(ScriptedDecoder::with_pictures(Vec::new()));
        assert_eq!(decoder.decode(&[1], 1024).unwrap_err(), CaptureError::NoData);
        let mut out = vec![0u8; 8];
        let summary = decoder.decode_into(&[1], &mut out).expect("empty drain");
        assert_eq!(summary.frames, 0);
    }

    #[test]
    fn test_close_twice() {
        let mut decoder: Vp8Decoder<ScriptedDecoder> = Vp8Decoder::new();
        decoder.init().expect("init");
        decoder.close().expect("close");
        assert_eq!(decoder.state(), SessionState::Closed);
        assert!(matches!(
            decoder.close(),
            Err(CaptureError::InvalidState { .. })
        ));
        assert!(matches!(
            decoder.decode(&[1], 16),
            Err(CaptureError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_teardown_failure_still_closes() {
        let mut native = ScriptedDecoder::default();
        native.fail_destroy = true;
        let mut decoder = Vp8Decoder::with_native(native);

        assert!(matches!(
            decoder.close(),
            Err(CaptureError::TeardownFailed(_))
        ));
        assert_eq!(decoder.state(), SessionState::Closed);
        assert!(matches!(
            decoder.close(),
            Err(CaptureError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_drop_closes_ready_session() {
        let native = ScriptedDecoder::default();
        let destroyed = native.destroyed.clone();
        let decoder = Vp8Decoder::with_native(native);
        assert_eq!(decoder.state(), SessionState::Ready);

        drop(decoder);
        assert!(destroyed.load(Ordering::SeqCst), "drop destroys the native decoder");
    }

    #[test]
    fn test_short_stride_is_decode_failed() {
        let mut picture = PaddedPicture::new(8, 4, 0, 5);
        picture.stride_override = Some(6);
        let mut decoder = Vp8Decoder::with_native(ScriptedDecoder::with_pictures(vec![picture]));

        let mut out = vec![0u8; 256];
        assert!(matches!(
            decoder.decode_into(&[1], &mut out),
            Err(CaptureError::DecodeFailed(_))
        ));
        assert!(matches!(
            decoder.decode(&[1], 256),
            Err(CaptureError::DecodeFailed(_))
        ));
        assert_eq!(decoder.frames_decoded(), 0);
    }
}
