// SPDX-License-Identifier: GPL-3.0-only

//! Synchronous driver for a single GStreamer element
//!
//! The codec elements (`vp8enc`, `vp8dec`) are run outside of a full
//! pipeline graph: a private source pad feeds the element's sink pad and a
//! private sink pad collects whatever the element pushes out. Pushing a
//! buffer returns once the element has processed it, so every output the
//! element produced for that input is already queued when `push` returns.
//! This gives the codec session the call-and-drain shape of a plain codec
//! library while still using the GStreamer plugin.

use crate::media::planar::{PlaneLayout, StridedPlanes};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_video as gst_video;
use gstreamer_video::prelude::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Output buffer together with the caps that were current when it arrived
pub struct CollectedBuffer {
    pub buffer: gst::Buffer,
    pub caps: Option<gst::Caps>,
}

type OutputQueue = Arc<Mutex<VecDeque<CollectedBuffer>>>;

/// One element between a feeding pad and a collecting pad
pub struct StreamElement {
    pipeline: gst::Pipeline,
    element: gst::Element,
    feed: gst::Pad,
    collect: gst::Pad,
    output: OutputQueue,
    running: bool,
}

impl StreamElement {
    /// Wrap `element` and link private pads to its static `sink`/`src` pads
    pub fn new(element: gst::Element) -> Result<Self, String> {
        let element_sink = element
            .static_pad("sink")
            .ok_or_else(|| format!("{} has no sink pad", element.name()))?;
        let element_src = element
            .static_pad("src")
            .ok_or_else(|| format!("{} has no src pad", element.name()))?;

        let output: OutputQueue = Arc::new(Mutex::new(VecDeque::new()));
        let current_caps: Arc<Mutex<Option<gst::Caps>>> = Arc::new(Mutex::new(None));

        let feed = gst::Pad::builder(gst::PadDirection::Src)
            .name("feed")
            .build();

        let collect = gst::Pad::builder(gst::PadDirection::Sink)
            .name("collect")
            .chain_function({
                let output = output.clone();
                let current_caps = current_caps.clone();
                move |_pad, _parent: Option<&gst::Object>, buffer| {
                    let caps = current_caps.lock().ok().and_then(|caps| caps.clone());
                    match output.lock() {
                        Ok(mut queue) => {
                            queue.push_back(CollectedBuffer { buffer, caps });
                            Ok(gst::FlowSuccess::Ok)
                        }
                        Err(_) => Err(gst::FlowError::Error),
                    }
                }
            })
            .event_function({
                let current_caps = current_caps.clone();
                move |_pad, _parent: Option<&gst::Object>, event| {
                    if let gst::EventView::Caps(caps_event) = event.view()
                        && let Ok(mut slot) = current_caps.lock()
                    {
                        *slot = Some(caps_event.caps_owned());
                    }
                    true
                }
            })
            .build();

        let pipeline = gst::Pipeline::new();
        pipeline
            .add(&element)
            .map_err(|e| format!("Failed to add {}: {}", element.name(), e))?;

        feed.link(&element_sink)
            .map_err(|e| format!("Failed to link feed pad: {:?}", e))?;
        element_src
            .link(&collect)
            .map_err(|e| format!("Failed to link collect pad: {:?}", e))?;

        Ok(Self {
            pipeline,
            element,
            feed,
            collect,
            output,
            running: false,
        })
    }

    /// Activate the pads, bring the element to PLAYING and send the sticky
    /// stream-start, caps and segment events.
    pub fn start(&mut self, stream_id: &str, caps: &gst::Caps) -> Result<(), String> {
        self.collect
            .set_active(true)
            .map_err(|e| format!("Failed to activate collect pad: {}", e))?;
        self.feed
            .set_active(true)
            .map_err(|e| format!("Failed to activate feed pad: {}", e))?;
        self.running = true;

        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| format!("{}: {}", e, self.take_error().unwrap_or_default()))?;

        if !self.feed.push_event(gst::event::StreamStart::new(stream_id)) {
            return Err(format!("{} rejected stream-start", self.element.name()));
        }
        if !self.feed.push_event(gst::event::Caps::new(caps)) {
            return Err(format!(
                "{} rejected caps {}: {}",
                self.element.name(),
                caps,
                self.take_error().unwrap_or_default()
            ));
        }
        let segment = gst::FormattedSegment::<gst::ClockTime>::new();
        if !self.feed.push_event(gst::event::Segment::new(&segment)) {
            return Err(format!("{} rejected segment", self.element.name()));
        }

        debug!(element = %self.element.name(), caps = %caps, "Stream element started");
        Ok(())
    }

    /// Send an event downstream ahead of the next buffer
    pub fn push_event(&self, event: gst::Event) -> bool {
        self.feed.push_event(event)
    }

    /// Push one buffer through the element
    pub fn push(&self, buffer: gst::Buffer) -> Result<(), String> {
        match self.feed.push(buffer) {
            Ok(_) => Ok(()),
            Err(flow) => Err(match self.take_error() {
                Some(detail) => format!("{:?}: {}", flow, detail),
                None => format!("{:?}", flow),
            }),
        }
    }

    /// Next buffer the element produced, oldest first
    pub fn pop(&self) -> Option<CollectedBuffer> {
        self.output.lock().ok().and_then(|mut queue| queue.pop_front())
    }

    /// Drop everything still queued, returning how many buffers were discarded
    pub fn discard(&self) -> usize {
        match self.output.lock() {
            Ok(mut queue) => {
                let count = queue.len();
                queue.clear();
                count
            }
            Err(_) => 0,
        }
    }

    /// Most recent error message posted by the element, if any
    pub fn take_error(&self) -> Option<String> {
        pop_bus_error(&self.pipeline)
    }

    /// Bring the element back to NULL and deactivate the pads
    pub fn stop(&mut self) -> Result<(), String> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.discard();

        let state_result = self
            .pipeline
            .set_state(gst::State::Null)
            .map(|_| ())
            .map_err(|e| format!("Failed to stop {}: {}", self.element.name(), e));

        if let Err(e) = self.feed.set_active(false) {
            warn!(error = %e, "Failed to deactivate feed pad");
        }
        if let Err(e) = self.collect.set_active(false) {
            warn!(error = %e, "Failed to deactivate collect pad");
        }

        state_result
    }
}

impl Drop for StreamElement {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Stream element did not stop cleanly");
        }
    }
}

/// Describe a tightly packed I420 buffer with explicit plane offsets and
/// strides, so elements do not assume GStreamer's default row alignment.
pub fn attach_plane_layout(buffer: &mut gst::BufferRef, layout: &PlaneLayout) -> Result<(), String> {
    gst_video::VideoMeta::add_full(
        buffer,
        gst_video::VideoFrameFlags::empty(),
        gst_video::VideoFormat::I420,
        layout.width(),
        layout.height(),
        &layout.offsets(),
        &layout.strides(),
    )
    .map(|_| ())
    .map_err(|e| format!("Failed to describe planes: {}", e))
}

/// Drain every pending message from a pipeline bus, returning the most
/// recent error
pub fn pop_bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    drain_bus(&pipeline.bus()?)
}

fn drain_bus(bus: &gst::Bus) -> Option<String> {
    let mut last = None;
    while let Some(msg) = bus.pop() {
        match msg.view() {
            gst::MessageView::Error(err) => {
                last = Some(match err.debug() {
                    Some(debug) => format!("{} ({})", err.error(), debug),
                    None => err.error().to_string(),
                });
            }
            gst::MessageView::Warning(w) => {
                warn!(warning = %w.error(), "Pipeline warning");
            }
            _ => {}
        }
    }
    last
}

/// Raw video buffer mapped for reading with its negotiated layout
pub struct VideoPicture {
    frame: gst_video::VideoFrame<gst_video::video_frame::Readable>,
}

impl VideoPicture {
    /// Map `buffer` using the layout described by `caps` (or the buffer's
    /// video meta, when present). Only I420 is accepted.
    pub fn from_buffer(buffer: gst::Buffer, caps: &gst::Caps) -> Result<Self, String> {
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| format!("Failed to parse caps {}: {}", caps, e))?;
        if info.format() != gst_video::VideoFormat::I420 {
            return Err(format!("Unsupported raw format {:?}", info.format()));
        }
        let frame = gst_video::VideoFrame::from_buffer_readable(buffer, &info)
            .map_err(|_| "Failed to map video buffer".to_string())?;
        Ok(Self { frame })
    }
}

impl StridedPlanes for VideoPicture {
    fn width(&self) -> u32 {
        self.frame.width()
    }

    fn height(&self) -> u32 {
        self.frame.height()
    }

    fn plane(&self, index: usize) -> Option<(&[u8], usize)> {
        let data = self.frame.plane_data(index as u32).ok()?;
        let stride = *self.frame.plane_stride().get(index)?;
        Some((data, usize::try_from(stride).ok()?))
    }
}
