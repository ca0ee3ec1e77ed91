// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer camera pipeline delivering I420 frames through an appsink

use super::FrameSource;
use super::types::{CameraSource, device_path};
use crate::constants::{pipeline as pipeline_consts, timing};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::element::{VideoPicture, pop_bus_error};
use crate::media::planar::PlanarImage;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Camera (or test pattern) converted and scaled to I420 at a fixed size
pub struct GstCameraSource {
    pipeline: gst::Pipeline,
    appsink: AppSink,
    width: u32,
    height: u32,
    read_timeout: Duration,
    frames_read: u64,
    running: bool,
}

/// Pattern nick or number, e.g. `ball` or `18`
fn is_pattern_name(pattern: &str) -> bool {
    !pattern.is_empty()
        && pattern
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Launch description for `source` producing `width`x`height` I420
fn build_description(
    source: &CameraSource,
    width: u32,
    height: u32,
    framerate: u32,
) -> CaptureResult<String> {
    let head = match source {
        CameraSource::V4l2 { index } => {
            let path = device_path(*index);
            if !Path::new(&path).exists() {
                return Err(CaptureError::DeviceNotFound(path));
            }
            format!("v4l2src device={}", path)
        }
        CameraSource::TestPattern { pattern } => {
            if !is_pattern_name(pattern) {
                return Err(CaptureError::ConfigError(format!(
                    "invalid test pattern {:?}",
                    pattern
                )));
            }
            format!(
                "videotestsrc is-live=true pattern={} ! video/x-raw,framerate={}/1",
                pattern, framerate
            )
        }
    };

    Ok(format!(
        "{} ! videoconvert ! videoscale ! video/x-raw,format={},width={},height={} ! \
         appsink name={} max-buffers={} drop=true sync=false",
        head,
        pipeline_consts::RAW_FORMAT,
        width,
        height,
        pipeline_consts::SINK_NAME,
        pipeline_consts::MAX_BUFFERS
    ))
}

impl GstCameraSource {
    /// Open `source` and start streaming frames of the given size
    pub fn open(
        source: &CameraSource,
        width: u32,
        height: u32,
        framerate: u32,
        read_timeout: Duration,
    ) -> CaptureResult<Self> {
        if width == 0 || height == 0 {
            return Err(CaptureError::DeviceOpenFailed(format!(
                "invalid geometry {}x{}",
                width, height
            )));
        }
        let description = build_description(source, width, height, framerate)?;

        gst::init().map_err(|e| CaptureError::DeviceOpenFailed(format!("GStreamer: {}", e)))?;

        info!(source = %source, width, height, "Opening camera");
        debug!(pipeline = %description, "Camera pipeline");

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| CaptureError::DeviceOpenFailed(format!("Failed to create pipeline: {}", e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CaptureError::DeviceOpenFailed("Failed to downcast to Pipeline".into()))?;

        let appsink = pipeline
            .by_name(pipeline_consts::SINK_NAME)
            .ok_or_else(|| CaptureError::DeviceOpenFailed("Failed to get appsink".into()))?
            .downcast::<AppSink>()
            .map_err(|_| CaptureError::DeviceOpenFailed("Failed to downcast appsink".into()))?;

        let mut camera = Self {
            pipeline,
            appsink,
            width,
            height,
            read_timeout,
            frames_read: 0,
            running: true,
        };
        camera.start(source)?;
        Ok(camera)
    }

    fn start(&mut self, source: &CameraSource) -> CaptureResult<()> {
        let open_failed = |pipeline: &gst::Pipeline, what: &str| {
            let detail = pop_bus_error(pipeline).unwrap_or_else(|| what.to_string());
            CaptureError::DeviceOpenFailed(format!("{}: {}", source, detail))
        };

        if self.pipeline.set_state(gst::State::Playing).is_err() {
            return Err(open_failed(&self.pipeline, "failed to start"));
        }

        let (result, state, _pending) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        if result.is_err() {
            return Err(open_failed(&self.pipeline, "did not reach PLAYING"));
        }

        debug!(?state, "Camera pipeline started");
        Ok(())
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl FrameSource for GstCameraSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn read_frame(&mut self) -> CaptureResult<PlanarImage> {
        if !self.running {
            return Err(CaptureError::InvalidState {
                operation: "read frame",
                state: "closed",
            });
        }

        let timeout = gst::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            if let Some(err) = pop_bus_error(&self.pipeline) {
                warn!(error = %err, "Camera pipeline reported an error");
            }
            return Err(CaptureError::NoData);
        };

        let buffer = sample.buffer_owned().ok_or(CaptureError::NoData)?;
        let caps = sample
            .caps_owned()
            .ok_or_else(|| CaptureError::InvalidFrame("sample without caps".into()))?;
        let picture = VideoPicture::from_buffer(buffer, &caps).map_err(CaptureError::InvalidFrame)?;
        let image = PlanarImage::from_strided(&picture)?;

        self.frames_read += 1;
        if self.frames_read % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frames = self.frames_read, "Camera frames read");
        }
        Ok(image)
    }

    fn close(&mut self) -> CaptureResult<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.pipeline
            .set_state(gst::State::Null)
            .map(|_| ())
            .map_err(|e| CaptureError::PipelineError(format!("Failed to stop camera: {}", e)))?;
        info!(frames = self.frames_read, "Camera closed");
        Ok(())
    }
}

impl Drop for GstCameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Failed to stop camera pipeline");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_is_not_found() {
        let err = build_description(&CameraSource::device(4242), 640, 480, 30).unwrap_err();
        assert_eq!(err, CaptureError::DeviceNotFound("/dev/video4242".into()));
    }

    #[test]
    fn test_test_pattern_description() {
        let description =
            build_description(&CameraSource::test_pattern("ball"), 320, 240, 15).expect("desc");
        assert!(description.starts_with("videotestsrc is-live=true pattern=ball"));
        assert!(description.contains("framerate=15/1"));
        assert!(description.contains("format=I420,width=320,height=240"));
        assert!(description.contains("appsink name=sink"));
    }

    #[test]
    fn test_pattern_must_be_single_name() {
        for pattern in ["ball ! fakesink", "", "smpte name=sink", "ball,x=1"] {
            let err = build_description(&CameraSource::test_pattern(pattern), 320, 240, 30)
                .unwrap_err();
            assert!(
                matches!(err, CaptureError::ConfigError(_)),
                "{:?} accepted",
                pattern
            );
        }
        assert!(build_description(&CameraSource::test_pattern("pinwheel"), 320, 240, 30).is_ok());
        assert!(build_description(&CameraSource::test_pattern("18"), 320, 240, 30).is_ok());
    }
}
