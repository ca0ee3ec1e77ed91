// SPDX-License-Identifier: GPL-3.0-only

//! VP8 encode session backed by the GStreamer `vp8enc` element

use super::{DrainPolicy, EncodedFrame, EncodedFrameInfo, EncodedPacket, NativeEncoder};
use crate::config::Config;
use crate::constants::{capacity, capture, encoder, pipeline, timing};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::element::{StreamElement, attach_plane_layout};
use crate::media::planar::{PlanarImage, PlaneLayout};
use crate::media::session::SessionState;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_video as gst_video;
use tracing::{debug, info, warn};

/// Largest frame dimension VP8 can signal
const MAX_DIMENSION: u32 = 16383;

/// Encoder parameters for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Explicit target bitrate in bits per second. When unset, the
    /// library's default is scaled from its reference resolution.
    pub target_bitrate_bps: Option<u32>,
    pub keyframe_max_dist: u32,
    pub lag_in_frames: u32,
    pub drain: DrainPolicy,
}

impl EncoderSettings {
    /// Defaults for the given geometry
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            framerate: capture::DEFAULT_FRAMERATE,
            target_bitrate_bps: None,
            keyframe_max_dist: encoder::KEYFRAME_MAX_DIST,
            lag_in_frames: encoder::LAG_IN_FRAMES,
            drain: DrainPolicy::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            width: config.width,
            height: config.height,
            framerate: config.framerate,
            target_bitrate_bps: config.encoder.target_bitrate_bps,
            keyframe_max_dist: config.encoder.keyframe_max_dist,
            lag_in_frames: config.encoder.lag_in_frames,
            drain: config.encoder.drain,
        }
    }

    pub fn layout(&self) -> PlaneLayout {
        PlaneLayout::new(self.width, self.height)
    }

    pub fn validate(&self) -> CaptureResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::ConfigError(format!(
                "invalid geometry {}x{}",
                self.width, self.height
            )));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(CaptureError::ConfigError(format!(
                "geometry {}x{} exceeds {}",
                self.width, self.height, MAX_DIMENSION
            )));
        }
        if self.framerate == 0 {
            return Err(CaptureError::ConfigError("framerate must be positive".into()));
        }
        if self.drain == DrainPolicy::FirstPacket && self.lag_in_frames > 0 {
            return Err(CaptureError::ConfigError(format!(
                "lag of {} frames can emit several packets per frame; use the concatenate drain policy",
                self.lag_in_frames
            )));
        }
        Ok(())
    }

    /// Raw caps submitted to the encoder
    fn raw_caps(&self) -> gst::Caps {
        gst::Caps::builder("video/x-raw")
            .field("format", pipeline::RAW_FORMAT)
            .field("width", self.width as i32)
            .field("height", self.height as i32)
            .field("framerate", gst::Fraction::new(self.framerate as i32, 1))
            .build()
    }
}

/// Set a property by its string form, failing if the element lacks it
fn configure(element: &gst::Element, property: &str, value: &str) -> CaptureResult<()> {
    if element.find_property(property).is_none() {
        return Err(CaptureError::ConfigError(format!(
            "{} has no property '{}'",
            element.name(),
            property
        )));
    }
    element.set_property_from_str(property, value);
    debug!(property, value, "Configured VP8 encoder");
    Ok(())
}

/// Target bitrate in bits per second: the explicit setting, or the
/// element's default scaled from the reference resolution.
fn resolve_bitrate(element: &gst::Element, settings: &EncoderSettings) -> CaptureResult<u32> {
    if let Some(bitrate) = settings.target_bitrate_bps {
        return Ok(bitrate.min(i32::MAX as u32));
    }

    let default = element
        .find_property("target-bitrate")
        .and_then(|pspec| pspec.default_value().get::<i32>().ok())
        .filter(|bitrate| *bitrate > 0)
        .ok_or_else(|| {
            CaptureError::ConfigError(format!(
                "{} does not report a default target bitrate",
                element.name()
            ))
        })?;

    let scaled = encoder::scaled_bitrate(settings.width, settings.height, default as u32);
    debug!(
        default,
        scaled,
        width = settings.width,
        height = settings.height,
        "Scaled default bitrate"
    );
    Ok(scaled)
}

/// Pool of frame-sized working buffers the images are copied into
fn create_pool(caps: &gst::Caps, size: usize) -> CaptureResult<gst::BufferPool> {
    let size = u32::try_from(size)
        .map_err(|_| CaptureError::AllocationFailed(format!("frame of {} bytes", size)))?;

    let pool = gst::BufferPool::new();
    let mut config = pool.config();
    config.set_params(Some(caps), size, capacity::ENCODER_POOL_BUFFERS, 0);
    pool.set_config(config)
        .map_err(|e| CaptureError::AllocationFailed(format!("buffer pool config: {}", e)))?;
    pool.set_active(true)
        .map_err(|e| CaptureError::AllocationFailed(format!("buffer pool activation: {}", e)))?;
    Ok(pool)
}

/// `vp8enc` driven one frame at a time
pub struct GstVp8Encoder {
    stream: StreamElement,
    pool: gst::BufferPool,
    layout: PlaneLayout,
    frame_duration_ns: u64,
}

impl NativeEncoder for GstVp8Encoder {
    fn create(settings: &EncoderSettings) -> CaptureResult<Self> {
        gst::init().map_err(|e| CaptureError::InitFailed(format!("GStreamer: {}", e)))?;

        let element = gst::ElementFactory::make(encoder::ELEMENT)
            .name("vp8-encoder")
            .build()
            .map_err(|e| {
                CaptureError::InitFailed(format!("Failed to create {}: {}", encoder::ELEMENT, e))
            })?;

        let bitrate = resolve_bitrate(&element, settings)?;
        configure(&element, "target-bitrate", &bitrate.to_string())?;
        configure(&element, "end-usage", encoder::END_USAGE)?;
        configure(&element, "multipass-mode", encoder::MULTIPASS_MODE)?;
        configure(&element, "keyframe-mode", encoder::KEYFRAME_MODE)?;
        configure(
            &element,
            "keyframe-max-dist",
            &settings.keyframe_max_dist.to_string(),
        )?;
        configure(
            &element,
            "lag-in-frames",
            &settings.lag_in_frames.to_string(),
        )?;
        configure(&element, "error-resilient", encoder::ERROR_RESILIENT)?;
        configure(
            &element,
            "deadline",
            &encoder::DEADLINE_REALTIME.to_string(),
        )?;

        let layout = settings.layout();
        let caps = settings.raw_caps();
        let pool = create_pool(&caps, layout.total_len())?;

        let mut stream = StreamElement::new(element).map_err(CaptureError::InitFailed)?;
        if let Err(e) = stream.start("vp8-capture-encode", &caps) {
            let _ = pool.set_active(false);
            return Err(CaptureError::InitFailed(e));
        }

        info!(
            width = settings.width,
            height = settings.height,
            bitrate,
            framerate = settings.framerate,
            "VP8 encoder ready"
        );

        Ok(Self {
            stream,
            pool,
            layout,
            frame_duration_ns: timing::frame_duration_ns(settings.framerate),
        })
    }

    fn encode(
        &mut self,
        image: &PlanarImage,
        pts: u64,
        force_key_frame: bool,
    ) -> CaptureResult<()> {
        let mut buffer = self.pool.acquire_buffer(None).map_err(|e| {
            CaptureError::EncodeFailed(format!("No working buffer available: {:?}", e))
        })?;

        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or_else(|| CaptureError::EncodeFailed("Working buffer is shared".into()))?;
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts * self.frame_duration_ns));
            buffer_ref.set_duration(gst::ClockTime::from_nseconds(self.frame_duration_ns));
            buffer_ref.set_offset(pts);

            attach_plane_layout(buffer_ref, &self.layout).map_err(CaptureError::EncodeFailed)?;

            let mut map = buffer_ref
                .map_writable()
                .map_err(|e| CaptureError::EncodeFailed(format!("Failed to map buffer: {}", e)))?;
            map.copy_from_slice(image.as_bytes());
        }

        if force_key_frame {
            let event = gst_video::DownstreamForceKeyUnitEvent::builder()
                .all_headers(true)
                .build();
            if !self.stream.push_event(event) {
                warn!(frame = pts, "Encoder ignored key frame request");
            }
        }

        self.stream.push(buffer).map_err(CaptureError::EncodeFailed)
    }

    fn next_packet(&mut self) -> Option<CaptureResult<EncodedPacket>> {
        let buffer = self.stream.pop()?.buffer;
        let is_key_frame = !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT);
        Some(
            buffer
                .map_readable()
                .map(|map| EncodedPacket {
                    data: map.as_slice().to_vec(),
                    is_key_frame,
                })
                .map_err(|e| {
                    CaptureError::EncodeFailed(format!("Failed to map encoded buffer: {}", e))
                }),
        )
    }

    fn destroy(&mut self) -> CaptureResult<()> {
        let pool_result = self
            .pool
            .set_active(false)
            .map_err(|e| CaptureError::TeardownFailed(format!("buffer pool: {}", e)));
        let stream_result = self.stream.stop().map_err(CaptureError::TeardownFailed);
        pool_result.and(stream_result)
    }
}

/// VP8 encode session
///
/// Created `Uninitialized`; [`init`](Self::init) brings it to `Ready`, after
/// which frames can be encoded until [`close`](Self::close). Dropping a
/// `Ready` session closes it.
pub struct Vp8Encoder<N: NativeEncoder = GstVp8Encoder> {
    settings: EncoderSettings,
    state: SessionState,
    native: Option<N>,
    frame_counter: u64,
}

impl Vp8Encoder<GstVp8Encoder> {
    /// Encoder session with default settings for `width` x `height`, ready
    /// to encode
    pub fn open(width: u32, height: u32) -> CaptureResult<Self> {
        Self::with_settings(EncoderSettings::new(width, height))
    }
}

impl<N: NativeEncoder> Vp8Encoder<N> {
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            state: SessionState::Uninitialized,
            native: None,
            frame_counter: 0,
        }
    }

    /// New session, initialized
    pub fn with_settings(settings: EncoderSettings) -> CaptureResult<Self> {
        let mut session = Self::new(settings);
        session.init()?;
        Ok(session)
    }

    /// Ready session around an already created native encoder
    pub fn with_native(settings: EncoderSettings, native: N) -> CaptureResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            state: SessionState::Ready,
            native: Some(native),
            frame_counter: 0,
        })
    }

    /// Derive the encoder configuration and create the native encoder
    pub fn init(&mut self) -> CaptureResult<()> {
        self.state
            .require(SessionState::Uninitialized, "initialize encoder")?;
        self.settings.validate()?;
        self.native = Some(N::create(&self.settings)?);
        self.state = SessionState::Ready;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &EncoderSettings {
        &self.settings
    }

    pub fn width(&self) -> u32 {
        self.settings.width
    }

    pub fn height(&self) -> u32 {
        self.settings.height
    }

    /// Frames submitted to the native encoder so far
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Encode one image and return the compressed frame.
    ///
    /// Fails with `OutputTooSmall` when the frame is larger than
    /// `out_capacity`.
    pub fn encode(
        &mut self,
        image: &PlanarImage,
        force_key_frame: bool,
        out_capacity: usize,
    ) -> CaptureResult<EncodedFrame> {
        let frame = self.submit(image, force_key_frame)?;
        if frame.len() > out_capacity {
            return Err(CaptureError::OutputTooSmall {
                needed: frame.len(),
                capacity: out_capacity,
            });
        }
        Ok(frame)
    }

    /// Encode one image into the front of `out`. Nothing is written when the
    /// frame does not fit.
    pub fn encode_into(
        &mut self,
        image: &PlanarImage,
        force_key_frame: bool,
        out: &mut [u8],
    ) -> CaptureResult<EncodedFrameInfo> {
        let frame = self.submit(image, force_key_frame)?;
        if frame.len() > out.len() {
            return Err(CaptureError::OutputTooSmall {
                needed: frame.len(),
                capacity: out.len(),
            });
        }
        out[..frame.len()].copy_from_slice(&frame.data);
        Ok(EncodedFrameInfo {
            len: frame.len(),
            is_key_frame: frame.is_key_frame,
            presentation_index: frame.presentation_index,
        })
    }

    fn submit(&mut self, image: &PlanarImage, force_key_frame: bool) -> CaptureResult<EncodedFrame> {
        self.state.require_ready("encode")?;
        if image.width() != self.settings.width || image.height() != self.settings.height {
            return Err(CaptureError::InvalidFrame(format!(
                "image is {}x{}, session expects {}x{}",
                image.width(),
                image.height(),
                self.settings.width,
                self.settings.height
            )));
        }

        let native = self.native.as_mut().ok_or(CaptureError::InvalidState {
            operation: "encode",
            state: "uninitialized",
        })?;

        let index = self.frame_counter;
        let submitted = native.encode(image, index, force_key_frame);
        // The native encoder saw this frame, so its index is used up
        self.frame_counter += 1;
        submitted?;

        let frame = match drain_packets(native, self.settings.drain, index) {
            Ok(frame) => frame,
            Err(e) => {
                while native.next_packet().is_some() {}
                return Err(e);
            }
        };

        match frame {
            Some(frame) if !frame.is_empty() => {
                if index % timing::FRAME_LOG_INTERVAL == 0 || frame.is_key_frame {
                    debug!(
                        frame = index,
                        bytes = frame.len(),
                        key_frame = frame.is_key_frame,
                        "Encoded frame"
                    );
                }
                Ok(frame)
            }
            _ => Err(CaptureError::EmptyOutput),
        }
    }

    /// Release the working buffer and destroy the native encoder.
    ///
    /// The session is `Closed` afterwards even when teardown fails.
    pub fn close(&mut self) -> CaptureResult<()> {
        if self.state == SessionState::Closed {
            return Err(CaptureError::InvalidState {
                operation: "close encoder",
                state: self.state.as_str(),
            });
        }
        self.state = SessionState::Closed;
        let result = match self.native.take() {
            Some(mut native) => native.destroy(),
            None => Ok(()),
        };
        info!(frames = self.frame_counter, "VP8 encoder closed");
        result
    }
}

/// Collect the packets of frame `index` according to `drain`
fn drain_packets<N: NativeEncoder>(
    native: &mut N,
    drain: DrainPolicy,
    index: u64,
) -> CaptureResult<Option<EncodedFrame>> {
    let Some(first) = native.next_packet().transpose()? else {
        return Ok(None);
    };
    let mut data = first.data;
    let mut extra = 0usize;
    while let Some(packet) = native.next_packet() {
        let packet = packet?;
        extra += 1;
        if drain == DrainPolicy::Concatenate {
            data.extend_from_slice(&packet.data);
        }
    }
    if extra > 0 && drain == DrainPolicy::FirstPacket {
        warn!(frame = index, discarded = extra, "Discarded extra encoder packets");
    }
    Ok(Some(EncodedFrame {
        data,
        is_key_frame: first.is_key_frame,
        presentation_index: index,
    }))
}

impl<N: NativeEncoder> Drop for Vp8Encoder<N> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed
            && let Err(e) = self.close()
        {
            warn!(error = %e, "VP8 encoder teardown failed on drop");
        }
    }
}
