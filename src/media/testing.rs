// SPDX-License-Identifier: GPL-3.0-only

//! Scripted native codecs for unit tests

use crate::errors::{CaptureError, CaptureResult};
use crate::media::decoders::NativeDecoder;
use crate::media::encoders::{EncodedPacket, EncoderSettings, NativeEncoder};
use crate::media::planar::{PlaneLayout, PlanarImage, StridedPlanes};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Encoder that emits fixed-size packets filled with the frame index
#[derive(Debug, Clone)]
pub struct ScriptedEncoder {
    pub packet_len: usize,
    pub packets_per_frame: usize,
    pub fail_on_frame: Option<u64>,
    /// Frame whose second packet cannot be read back
    pub unreadable_packet_on_frame: Option<u64>,
    pub fail_destroy: bool,
    pub destroyed: Arc<AtomicBool>,
    pending: VecDeque<CaptureResult<EncodedPacket>>,
}

impl ScriptedEncoder {
    pub fn new(packet_len: usize) -> Self {
        Self {
            packet_len,
            packets_per_frame: 1,
            fail_on_frame: None,
            unreadable_packet_on_frame: None,
            fail_destroy: false,
            destroyed: Arc::new(AtomicBool::new(false)),
            pending: VecDeque::new(),
        }
    }
}

impl NativeEncoder for ScriptedEncoder {
    fn create(_settings: &EncoderSettings) -> CaptureResult<Self> {
        Ok(Self::new(16))
    }

    fn encode(
        &mut self,
        _image: &PlanarImage,
        pts: u64,
        force_key_frame: bool,
    ) -> CaptureResult<()> {
        if self.fail_on_frame == Some(pts) {
            return Err(CaptureError::EncodeFailed(format!("scripted failure at {}", pts)));
        }
        for packet in 0..self.packets_per_frame {
            if packet == 1 && self.unreadable_packet_on_frame == Some(pts) {
                self.pending
                    .push_back(Err(CaptureError::EncodeFailed("scripted map failure".into())));
                continue;
            }
            self.pending.push_back(Ok(EncodedPacket {
                data: vec![pts as u8; self.packet_len],
                is_key_frame: force_key_frame || pts == 0,
            }));
        }
        Ok(())
    }

    fn next_packet(&mut self) -> Option<CaptureResult<EncodedPacket>> {
        self.pending.pop_front()
    }

    fn destroy(&mut self) -> CaptureResult<()> {
        self.destroyed.store(true, Ordering::SeqCst);
        if self.fail_destroy {
            Err(CaptureError::TeardownFailed("scripted".into()))
        } else {
            Ok(())
        }
    }
}

/// Decoded picture with configurable row padding
#[derive(Debug, Clone)]
pub struct PaddedPicture {
    pub width: u32,
    pub height: u32,
    pub padding: usize,
    /// Reported row stride, overriding `row width + padding`
    pub stride_override: Option<usize>,
    planes: Vec<Vec<u8>>,
}

impl PaddedPicture {
    /// Picture whose visible bytes are `fill + plane index`; padding is 0xEE
    pub fn new(width: u32, height: u32, padding: usize, fill: u8) -> Self {
        let layout = PlaneLayout::new(width, height);
        let planes = (0..3)
            .map(|index| {
                let (row_len, rows) = layout.plane_dims(index);
                let stride = row_len + padding;
                let mut data = vec![0xEE; stride * rows];
                for row in 0..rows {
                    data[row * stride..row * stride + row_len]
                        .fill(fill.wrapping_add(index as u8));
                }
                data
            })
            .collect();
        Self {
            width,
            height,
            padding,
            stride_override: None,
            planes,
        }
    }
}

impl StridedPlanes for PaddedPicture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn plane(&self, index: usize) -> Option<(&[u8], usize)> {
        let (row_len, _) = PlaneLayout::new(self.width, self.height).plane_dims(index);
        let stride = self.stride_override.unwrap_or(row_len + self.padding);
        Some((self.planes.get(index)?, stride))
    }
}

/// Decoder that returns a scripted list of pictures for every input
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecoder {
    pub pictures_per_frame: Vec<PaddedPicture>,
    pub reject_input: bool,
    pub fail_destroy: bool,
    pub destroyed: Arc<AtomicBool>,
    pending: VecDeque<PaddedPicture>,
}

impl ScriptedDecoder {
    pub fn with_pictures(pictures: Vec<PaddedPicture>) -> Self {
        Self {
            pictures_per_frame: pictures,
            ..Self::default()
        }
    }
}

impl NativeDecoder for ScriptedDecoder {
    type Picture = PaddedPicture;

    fn create() -> CaptureResult<Self> {
        Ok(Self::with_pictures(vec![PaddedPicture::new(4, 4, 0, 0)]))
    }

    fn decode(&mut self, _data: &[u8]) -> CaptureResult<()> {
        if self.reject_input {
            return Err(CaptureError::DecodeFailed("scripted corrupt input".into()));
        }
        self.pending.extend(self.pictures_per_frame.iter().cloned());
        Ok(())
    }

    fn next_picture(&mut self) -> Option<CaptureResult<PaddedPicture>> {
        self.pending.pop_front().map(Ok)
    }

    fn destroy(&mut self) -> CaptureResult<()> {
        self.destroyed.store(true, Ordering::SeqCst);
        if self.fail_destroy {
            Err(CaptureError::TeardownFailed("scripted".into()))
        } else {
            Ok(())
        }
    }
}
