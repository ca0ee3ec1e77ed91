// SPDX-License-Identifier: GPL-3.0-only

//! Launch-string pipelines used as a byte transport
//!
//! A transport pipeline is described by a `gst-launch` style string. Data
//! enters through an appsrc named `src` and leaves through an appsink named
//! `sink`; either end is optional, so the same type covers pure producers
//! (e.g. `appsrc name=src ! ... ! autovideosink`) and pure consumers.

use crate::constants::{pipeline as pipeline_consts, timing};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::element::{VideoPicture, attach_plane_layout, pop_bus_error};
use crate::media::planar::PlanarImage;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSrc};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct MediaPipeline {
    pipeline: gst::Pipeline,
    appsrc: Option<AppSrc>,
    appsink: Option<AppSink>,
    pull_timeout: Duration,
    pushed: u64,
    running: bool,
}

impl MediaPipeline {
    /// Parse `description` into a pipeline (not yet started)
    pub fn launch(description: &str) -> CaptureResult<Self> {
        gst::init().map_err(|e| CaptureError::PipelineError(format!("GStreamer: {}", e)))?;

        let pipeline = gst::parse::launch(description)
            .map_err(|e| CaptureError::PipelineError(format!("Failed to create pipeline: {}", e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CaptureError::PipelineError("Failed to downcast to Pipeline".into()))?;

        let appsrc = pipeline
            .by_name(pipeline_consts::SOURCE_NAME)
            .and_then(|element| element.downcast::<AppSrc>().ok());
        if let Some(appsrc) = &appsrc {
            appsrc.set_format(gst::Format::Time);
        }
        let appsink = pipeline
            .by_name(pipeline_consts::SINK_NAME)
            .and_then(|element| element.downcast::<AppSink>().ok());

        debug!(
            pipeline = description,
            has_src = appsrc.is_some(),
            has_sink = appsink.is_some(),
            "Transport pipeline created"
        );

        Ok(Self {
            pipeline,
            appsrc,
            appsink,
            pull_timeout: Duration::from_millis(timing::PULL_TIMEOUT_MS),
            pushed: 0,
            running: false,
        })
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }

    fn appsrc(&self) -> CaptureResult<&AppSrc> {
        self.appsrc.as_ref().ok_or_else(|| {
            CaptureError::PipelineError(format!(
                "pipeline has no appsrc named '{}'",
                pipeline_consts::SOURCE_NAME
            ))
        })
    }

    fn appsink(&self) -> CaptureResult<&AppSink> {
        self.appsink.as_ref().ok_or_else(|| {
            CaptureError::PipelineError(format!(
                "pipeline has no appsink named '{}'",
                pipeline_consts::SINK_NAME
            ))
        })
    }

    pub fn set_source_caps(&self, caps: &gst::Caps) -> CaptureResult<()> {
        self.appsrc()?.set_caps(Some(caps));
        Ok(())
    }

    /// Declare the appsrc output as I420 frames of the given size
    pub fn set_raw_video_caps(&self, width: u32, height: u32, framerate: u32) -> CaptureResult<()> {
        let caps = gst::Caps::builder("video/x-raw")
            .field("format", pipeline_consts::RAW_FORMAT)
            .field("width", width as i32)
            .field("height", height as i32)
            .field("framerate", gst::Fraction::new(framerate.max(1) as i32, 1))
            .build();
        self.set_source_caps(&caps)
    }

    pub fn start(&mut self) -> CaptureResult<()> {
        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            let detail = pop_bus_error(&self.pipeline).unwrap_or_else(|| e.to_string());
            CaptureError::PipelineError(format!("Failed to start pipeline: {}", detail))
        })?;
        self.running = true;
        info!("Transport pipeline started");
        Ok(())
    }

    /// Copy `data` into a new buffer and push it into the appsrc
    pub fn push(&mut self, data: &[u8]) -> CaptureResult<()> {
        let buffer = gst::Buffer::from_slice(data.to_vec());
        self.push_buffer(buffer)
    }

    /// Push a raw frame with an explicit presentation time
    pub fn push_image(&mut self, image: &PlanarImage, pts: gst::ClockTime) -> CaptureResult<()> {
        let mut buffer = gst::Buffer::from_slice(image.as_bytes().to_vec());
        {
            let buffer_ref = buffer.get_mut().ok_or_else(|| {
                CaptureError::PipelineError("Failed to get mutable buffer reference".into())
            })?;
            buffer_ref.set_pts(pts);
            attach_plane_layout(buffer_ref, &image.layout()).map_err(CaptureError::PipelineError)?;
        }
        self.push_buffer(buffer)
    }

    fn push_buffer(&mut self, buffer: gst::Buffer) -> CaptureResult<()> {
        let appsrc = self.appsrc()?;
        match appsrc.push_buffer(buffer) {
            Ok(_) => {
                self.pushed += 1;
                if self.pushed % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(buffers = self.pushed, "Transport buffers pushed");
                }
                Ok(())
            }
            Err(flow) => {
                let detail = pop_bus_error(&self.pipeline).unwrap_or_else(|| format!("{:?}", flow));
                warn!(?flow, "Failed to push buffer");
                Err(CaptureError::PipelineError(format!(
                    "Failed to push buffer: {}",
                    detail
                )))
            }
        }
    }

    /// Signal end of stream on the appsrc
    pub fn end_of_stream(&self) -> CaptureResult<()> {
        self.appsrc()?
            .end_of_stream()
            .map(|_| ())
            .map_err(|flow| CaptureError::PipelineError(format!("EOS rejected: {:?}", flow)))
    }

    fn pull_sample(&self) -> CaptureResult<gst::Sample> {
        let appsink = self.appsink()?;
        let timeout = gst::ClockTime::from_mseconds(self.pull_timeout.as_millis() as u64);
        appsink.try_pull_sample(timeout).ok_or(CaptureError::NoData)
    }

    /// Copy the next sample into `out`, returning its length
    pub fn pull(&self, out: &mut [u8]) -> CaptureResult<usize> {
        let sample = self.pull_sample()?;
        let buffer = sample.buffer().ok_or(CaptureError::NoData)?;
        let map = buffer
            .map_readable()
            .map_err(|e| CaptureError::PipelineError(format!("Failed to map sample: {}", e)))?;
        let data = map.as_slice();
        if data.len() > out.len() {
            return Err(CaptureError::OutputTooSmall {
                needed: data.len(),
                capacity: out.len(),
            });
        }
        out[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    /// Next sample as a tightly packed I420 image
    pub fn pull_image(&self) -> CaptureResult<PlanarImage> {
        let sample = self.pull_sample()?;
        let buffer = sample.buffer_owned().ok_or(CaptureError::NoData)?;
        let caps = sample
            .caps_owned()
            .ok_or_else(|| CaptureError::InvalidFrame("sample without caps".into()))?;
        let picture = VideoPicture::from_buffer(buffer, &caps).map_err(CaptureError::InvalidFrame)?;
        PlanarImage::from_strided(&picture)
    }

    /// Fail with the most recent error posted on the bus, if any
    pub fn check_errors(&self) -> CaptureResult<()> {
        match pop_bus_error(&self.pipeline) {
            Some(err) => Err(CaptureError::PipelineError(err)),
            None => Ok(()),
        }
    }

    /// Block until EOS or an error, or until `timeout` elapses
    pub fn wait_for_eos(&self, timeout: Duration) -> CaptureResult<()> {
        let bus = self
            .pipeline
            .bus()
            .ok_or_else(|| CaptureError::PipelineError("No bus on pipeline".into()))?;
        let msg = bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(timeout.as_millis() as u64),
            &[gst::MessageType::Eos, gst::MessageType::Error],
        );
        match msg.as_ref().map(|msg| msg.view()) {
            Some(gst::MessageView::Error(err)) => Err(CaptureError::PipelineError(format!(
                "{} ({:?})",
                err.error(),
                err.debug()
            ))),
            Some(_) => Ok(()),
            None => Err(CaptureError::NoData),
        }
    }

    pub fn stop(&mut self) -> CaptureResult<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.pipeline
            .set_state(gst::State::Null)
            .map(|_| ())
            .map_err(|e| CaptureError::PipelineError(format!("Failed to stop pipeline: {}", e)))?;
        info!(buffers = self.pushed, "Transport pipeline stopped");
        Ok(())
    }
}

impl Drop for MediaPipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(error = %e, "Failed to stop transport pipeline");
        }
    }
}
