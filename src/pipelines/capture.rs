// SPDX-License-Identifier: GPL-3.0-only

//! Capture session: camera frames in, VP8 frames out
//!
//! ```text
//! CaptureSession::start ── open camera ── init encoder ──▶ running
//!        read()         ── read_frame ── encode ──────────▶ bytes
//!        stop()         ── close encoder ── close camera ──▶ stopped
//! ```
//!
//! Key frames can be requested from any thread through a
//! [`KeyFrameRequest`] handle; the request is folded into the next read.

use crate::backends::camera::{CameraSource, FrameSource, GstCameraSource};
use crate::config::Config;
use crate::constants::{capacity, timing};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::encoders::{
    EncodedFrame, EncoderSettings, GstVp8Encoder, NativeEncoder, Vp8Encoder,
};
use crate::media::planar::PlanarImage;
use crate::media::session::SessionState;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared flag asking the capture loop for a key frame
#[derive(Debug, Clone, Default)]
pub struct KeyFrameRequest(Arc<AtomicBool>);

impl KeyFrameRequest {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Consume a pending request
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct CaptureSession<N: NativeEncoder = GstVp8Encoder> {
    source: Box<dyn FrameSource>,
    encoder: Vp8Encoder<N>,
    output_capacity: usize,
    key_frame: KeyFrameRequest,
    running: bool,
}

impl CaptureSession<GstVp8Encoder> {
    /// Open the camera and initialize an encoder for `width` x `height`.
    ///
    /// The camera is closed again when the encoder cannot be created.
    pub fn start(
        source: &CameraSource,
        width: u32,
        height: u32,
        config: &Config,
    ) -> CaptureResult<Self> {
        let mut camera = GstCameraSource::open(
            source,
            width,
            height,
            config.framerate,
            Duration::from_millis(config.read_timeout_ms),
        )?;

        let settings = EncoderSettings {
            width,
            height,
            ..EncoderSettings::from_config(config)
        };
        let encoder = match Vp8Encoder::with_settings(settings) {
            Ok(encoder) => encoder,
            Err(e) => {
                if let Err(close_err) = camera.close() {
                    warn!(error = %close_err, "Failed to close camera after encoder init failure");
                }
                return Err(e);
            }
        };

        info!(source = %source, width, height, "Capture session started");
        Ok(Self::with_parts(Box::new(camera), encoder)?.with_output_capacity(config.output_capacity))
    }
}

impl<N: NativeEncoder> CaptureSession<N> {
    /// Combine an open frame source with a ready encoder of the same geometry
    pub fn with_parts(source: Box<dyn FrameSource>, encoder: Vp8Encoder<N>) -> CaptureResult<Self> {
        if source.width() != encoder.width() || source.height() != encoder.height() {
            return Err(CaptureError::ConfigError(format!(
                "source delivers {}x{}, encoder expects {}x{}",
                source.width(),
                source.height(),
                encoder.width(),
                encoder.height()
            )));
        }
        encoder.state().require_ready("start capture")?;

        Ok(Self {
            source,
            encoder,
            output_capacity: capacity::DEFAULT_OUTPUT_CAPACITY,
            key_frame: KeyFrameRequest::default(),
            running: true,
        })
    }

    /// Capacity used by [`read_frame`](Self::read_frame)
    pub fn with_output_capacity(mut self, output_capacity: usize) -> Self {
        self.output_capacity = output_capacity;
        self
    }

    pub fn key_frame_handle(&self) -> KeyFrameRequest {
        self.key_frame.clone()
    }

    pub fn width(&self) -> u32 {
        self.encoder.width()
    }

    pub fn height(&self) -> u32 {
        self.encoder.height()
    }

    pub fn frame_count(&self) -> u64 {
        self.encoder.frame_count()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn next_image(&mut self, operation: &'static str) -> CaptureResult<PlanarImage> {
        if !self.running {
            return Err(CaptureError::InvalidState {
                operation,
                state: SessionState::Closed.as_str(),
            });
        }
        self.source.read_frame()
    }

    fn with_key_frame_request<T>(
        &mut self,
        force_key_frame: bool,
        encode: impl FnOnce(&mut Vp8Encoder<N>, bool) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        let requested = self.key_frame.take();
        let result = encode(&mut self.encoder, force_key_frame || requested);
        if requested && result.is_err() {
            // Keep the request for the next frame
            self.key_frame.request();
        }
        result
    }

    /// Capture and encode one frame into `out`, returning the byte count
    pub fn read(&mut self, out: &mut [u8], force_key_frame: bool) -> CaptureResult<usize> {
        let image = self.next_image("read")?;
        let info = self.with_key_frame_request(force_key_frame, |encoder, force| {
            encoder.encode_into(&image, force, out)
        })?;
        if info.presentation_index % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(
                frame = info.presentation_index,
                bytes = info.len,
                key_frame = info.is_key_frame,
                "Captured frame"
            );
        }
        Ok(info.len)
    }

    /// Capture and encode one frame, bounded by the configured output capacity
    pub fn read_frame(&mut self, force_key_frame: bool) -> CaptureResult<EncodedFrame> {
        let image = self.next_image("read frame")?;
        let capacity = self.output_capacity;
        self.with_key_frame_request(force_key_frame, |encoder, force| {
            encoder.encode(&image, force, capacity)
        })
    }

    /// Close the encoder and the camera. Both are released even when one of
    /// them fails; the first failure is returned.
    pub fn stop(&mut self) -> CaptureResult<()> {
        if !self.running {
            return Err(CaptureError::InvalidState {
                operation: "stop capture",
                state: SessionState::Closed.as_str(),
            });
        }
        self.running = false;

        let encoder_result = match self.encoder.state() {
            SessionState::Closed => Ok(()),
            _ => self.encoder.close(),
        };
        let source_result = self.source.close();

        info!(frames = self.encoder.frame_count(), "Capture session stopped");
        encoder_result.and(source_result)
    }
}

impl<N: NativeEncoder> Drop for CaptureSession<N> {
    fn drop(&mut self) {
        if self.running
            && let Err(e) = self.stop()
        {
            warn!(error = %e, "Capture session did not stop cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::ScriptedEncoder;

    struct StillSource {
        width: u32,
        height: u32,
        fail_close: bool,
        closed: Arc<AtomicBool>,
    }

    impl StillSource {
        fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                fail_close: false,
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl FrameSource for StillSource {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn read_frame(&mut self) -> CaptureResult<PlanarImage> {
            Ok(PlanarImage::black(self.width, self.height))
        }

        fn close(&mut self) -> CaptureResult<()> {
            self.closed.store(true, Ordering::SeqCst);
            if self.fail_close {
                return Err(CaptureError::PipelineError("scripted close failure".into()));
            }
            Ok(())
        }
    }

    fn session(source: StillSource, packet_len: usize) -> CaptureSession<ScriptedEncoder> {
        let settings = EncoderSettings::new(source.width, source.height);
        let encoder = Vp8Encoder::with_native(settings, ScriptedEncoder::new(packet_len))
            .expect("valid settings");
        CaptureSession::with_parts(Box::new(source), encoder).expect("matching geometry")
    }

    #[test]
    fn test_read_returns_byte_count() {
        let mut capture = session(StillSource::new(32, 24), 40);
        let mut out = vec![0u8; 128];

        assert_eq!(capture.read(&mut out, true).expect("first read"), 40);
        assert_eq!(capture.read(&mut out, false).expect("second read"), 40);
        assert_eq!(out[0], 1, "second frame carries index 1");
        assert_eq!(capture.frame_count(), 2);
    }

    #[test]
    fn test_key_frame_request_consumed_once() {
        let mut capture = session(StillSource::new(32, 24), 8);
        let handle = capture.key_frame_handle();

        let first = capture.read_frame(false).expect("frame 0");
        assert!(first.is_key_frame);

        handle.request();
        assert!(handle.is_pending());
        let requested = capture.read_frame(false).expect("frame 1");
        assert!(requested.is_key_frame, "pending request forces a key frame");
        assert!(!handle.is_pending());

        let next = capture.read_frame(false).expect("frame 2");
        assert!(!next.is_key_frame);
    }

    #[test]
    fn test_request_survives_failed_encode() {
        let mut capture = session(StillSource::new(32, 24), 64);
        let handle = capture.key_frame_handle();
        handle.request();

        let mut small = vec![0u8; 10];
        assert!(matches!(
            capture.read(&mut small, false),
            Err(CaptureError::OutputTooSmall { .. })
        ));
        assert!(handle.is_pending());
    }

    #[test]
    fn test_geometry_mismatch_rejected() {
        let encoder = Vp8Encoder::with_native(EncoderSettings::new(64, 48), ScriptedEncoder::new(8))
            .expect("valid settings");
        let result = CaptureSession::with_parts(Box::new(StillSource::new(32, 24)), encoder);
        assert!(matches!(result, Err(CaptureError::ConfigError(_))));
    }

    #[test]
    fn test_stop_closes_both_and_reports_first_error() {
        let mut source = StillSource::new(32, 24);
        source.fail_close = true;
        let closed = source.closed.clone();
        let mut capture = session(source, 8);

        let err = capture.stop().unwrap_err();
        assert!(matches!(err, CaptureError::PipelineError(_)));
        assert!(closed.load(Ordering::SeqCst), "camera closed");
        assert!(!capture.is_running());
    }

    #[test]
    fn test_use_after_stop() {
        let mut capture = session(StillSource::new(32, 24), 8);
        capture.stop().expect("clean stop");

        assert!(matches!(
            capture.stop(),
            Err(CaptureError::InvalidState { .. })
        ));
        let mut out = vec![0u8; 64];
        assert_eq!(
            capture.read(&mut out, false).unwrap_err(),
            CaptureError::InvalidState {
                operation: "read",
                state: "closed"
            }
        );
    }

    #[test]
    fn test_read_frame_respects_capacity() {
        let mut capture = session(StillSource::new(32, 24), 100).with_output_capacity(50);
        assert_eq!(
            capture.read_frame(true).unwrap_err(),
            CaptureError::OutputTooSmall {
                needed: 100,
                capacity: 50
            }
        );
    }
}
