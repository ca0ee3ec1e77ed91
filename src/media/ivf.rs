// SPDX-License-Identifier: GPL-3.0-only

//! IVF container reading and writing
//!
//! IVF is the minimal container libvpx tools use for raw VP8 streams: a
//! 32-byte file header followed by frames, each prefixed with a 12-byte
//! header holding the payload size and presentation timestamp. All integers
//! are little endian.

use crate::constants::ivf::{FRAME_HEADER_LEN, HEADER_LEN, SIGNATURE, VERSION, VP8_FOURCC};
use crate::errors::{CaptureError, CaptureResult};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use tracing::debug;

/// Upper bound on a single frame payload
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Byte offset of the frame count inside the file header
const FRAME_COUNT_OFFSET: u64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfHeader {
    pub fourcc: [u8; 4],
    pub width: u16,
    pub height: u16,
    /// Timebase denominator (frames per `time_scale` units)
    pub frame_rate: u32,
    pub time_scale: u32,
    pub frame_count: u32,
}

impl IvfHeader {
    /// VP8 stream header with a `1/framerate` timebase
    pub fn vp8(width: u32, height: u32, framerate: u32) -> CaptureResult<Self> {
        let width = u16::try_from(width)
            .map_err(|_| CaptureError::InvalidContainer(format!("width {} exceeds u16", width)))?;
        let height = u16::try_from(height).map_err(|_| {
            CaptureError::InvalidContainer(format!("height {} exceeds u16", height))
        })?;
        Ok(Self {
            fourcc: *VP8_FOURCC,
            width,
            height,
            frame_rate: framerate.max(1),
            time_scale: 1,
            frame_count: 0,
        })
    }

    /// Codec fourcc as text, e.g. `VP80`
    pub fn codec(&self) -> String {
        String::from_utf8_lossy(&self.fourcc).into_owned()
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN as usize] {
        let mut header = [0u8; HEADER_LEN as usize];
        header[0..4].copy_from_slice(SIGNATURE);
        header[4..6].copy_from_slice(&VERSION.to_le_bytes());
        header[6..8].copy_from_slice(&HEADER_LEN.to_le_bytes());
        header[8..12].copy_from_slice(&self.fourcc);
        header[12..14].copy_from_slice(&self.width.to_le_bytes());
        header[14..16].copy_from_slice(&self.height.to_le_bytes());
        header[16..20].copy_from_slice(&self.frame_rate.to_le_bytes());
        header[20..24].copy_from_slice(&self.time_scale.to_le_bytes());
        header[24..28].copy_from_slice(&self.frame_count.to_le_bytes());
        header
    }

    pub fn parse(bytes: &[u8; HEADER_LEN as usize]) -> CaptureResult<Self> {
        if &bytes[0..4] != SIGNATURE {
            return Err(CaptureError::InvalidContainer("missing DKIF signature".into()));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(CaptureError::InvalidContainer(format!(
                "unsupported version {}",
                version
            )));
        }
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Ok(Self {
            fourcc: [bytes[8], bytes[9], bytes[10], bytes[11]],
            width: u16::from_le_bytes([bytes[12], bytes[13]]),
            height: u16::from_le_bytes([bytes[14], bytes[15]]),
            frame_rate: u32_at(16),
            time_scale: u32_at(20),
            frame_count: u32_at(24),
        })
    }
}

/// One stored frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IvfFrame {
    pub data: Vec<u8>,
    pub pts: u64,
}

/// Streams VP8 frames into an IVF container
pub struct IvfWriter<W: Write> {
    writer: W,
    header: IvfHeader,
}

impl<W: Write> IvfWriter<W> {
    /// Write the file header and return a writer positioned for frames
    pub fn new(mut writer: W, header: IvfHeader) -> CaptureResult<Self> {
        writer.write_all(&header.to_bytes())?;
        Ok(Self { writer, header })
    }

    pub fn write_frame(&mut self, data: &[u8], pts: u64) -> CaptureResult<()> {
        let size = u32::try_from(data.len()).map_err(|_| {
            CaptureError::InvalidContainer(format!("frame of {} bytes", data.len()))
        })?;
        let mut frame_header = [0u8; FRAME_HEADER_LEN];
        frame_header[0..4].copy_from_slice(&size.to_le_bytes());
        frame_header[4..12].copy_from_slice(&pts.to_le_bytes());
        self.writer.write_all(&frame_header)?;
        self.writer.write_all(data)?;
        self.header.frame_count = self.header.frame_count.saturating_add(1);
        Ok(())
    }

    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    /// Flush and return the inner writer without touching the header
    pub fn into_inner(mut self) -> CaptureResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write + Seek> IvfWriter<W> {
    /// Patch the frame count in the file header, flush and return the writer
    pub fn finish(mut self) -> CaptureResult<W> {
        self.writer.seek(SeekFrom::Start(FRAME_COUNT_OFFSET))?;
        self.writer.write_all(&self.header.frame_count.to_le_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        debug!(frames = self.header.frame_count, "Finished IVF stream");
        Ok(self.writer)
    }
}

/// Reads frames back out of an IVF container
pub struct IvfReader<R: Read> {
    reader: R,
    header: IvfHeader,
}

impl<R: Read> IvfReader<R> {
    /// Read and validate the file header
    pub fn new(mut reader: R) -> CaptureResult<Self> {
        let mut bytes = [0u8; HEADER_LEN as usize];
        reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => CaptureError::InvalidContainer("truncated header".into()),
            _ => e.into(),
        })?;
        let header = IvfHeader::parse(&bytes)?;
        debug!(
            codec = %header.codec(),
            width = header.width,
            height = header.height,
            frames = header.frame_count,
            "Opened IVF stream"
        );
        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &IvfHeader {
        &self.header
    }

    pub fn codec(&self) -> String {
        self.header.codec()
    }

    /// Next frame, or `None` at a clean end of stream
    pub fn read_frame(&mut self) -> CaptureResult<Option<IvfFrame>> {
        let mut frame_header = [0u8; FRAME_HEADER_LEN];
        let mut filled = 0;
        while filled < FRAME_HEADER_LEN {
            match self.reader.read(&mut frame_header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < FRAME_HEADER_LEN {
            return Err(CaptureError::InvalidContainer("truncated frame header".into()));
        }

        let size = u32::from_le_bytes([
            frame_header[0],
            frame_header[1],
            frame_header[2],
            frame_header[3],
        ]) as usize;
        let mut pts_bytes = [0u8; 8];
        pts_bytes.copy_from_slice(&frame_header[4..12]);
        let pts = u64::from_le_bytes(pts_bytes);

        if size > MAX_FRAME_LEN {
            return Err(CaptureError::InvalidContainer(format!(
                "frame of {} bytes exceeds limit",
                size
            )));
        }

        let mut data = vec![0u8; size];
        self.reader.read_exact(&mut data).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                CaptureError::InvalidContainer(format!("truncated frame at pts {}", pts))
            }
            _ => e.into(),
        })?;

        Ok(Some(IvfFrame { data, pts }))
    }
}

impl<R: Read + Seek> IvfReader<R> {
    /// Seek back to the first frame
    pub fn rewind(&mut self) -> CaptureResult<()> {
        self.reader.seek(SeekFrom::Start(HEADER_LEN as u64))?;
        Ok(())
    }
}

impl<R: Read> Iterator for IvfReader<R> {
    type Item = CaptureResult<IvfFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_frame().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let header = IvfHeader::vp8(640, 480, 30).expect("header");
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"DKIF");
        assert_eq!(&bytes[6..8], &32u16.to_le_bytes());
        assert_eq!(&bytes[8..12], b"VP80");
        assert_eq!(&bytes[12..14], &640u16.to_le_bytes());
        assert_eq!(&bytes[28..32], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_finish_patches_frame_count() {
        let header = IvfHeader::vp8(16, 16, 30).expect("header");
        let mut writer = IvfWriter::new(Cursor::new(Vec::new()), header).expect("writer");
        writer.write_frame(&[1, 2, 3], 0).expect("frame");
        writer.write_frame(&[4], 1).expect("frame");
        let bytes = writer.finish().expect("finish").into_inner();

        assert_eq!(bytes.len(), 32 + 12 + 3 + 12 + 1);
        assert_eq!(&bytes[24..28], &2u32.to_le_bytes());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = IvfHeader::vp8(16, 16, 30).expect("header").to_bytes();
        bytes[4] = 1;
        let err = IvfReader::new(Cursor::new(bytes.to_vec())).err();
        assert!(matches!(err, Some(CaptureError::InvalidContainer(_))));
    }

    #[test]
    fn test_truncated_frame() {
        let mut bytes = IvfHeader::vp8(16, 16, 30).expect("header").to_bytes().to_vec();
        bytes.extend_from_slice(&10u32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut reader = IvfReader::new(Cursor::new(bytes)).expect("reader");
        assert!(matches!(
            reader.read_frame(),
            Err(CaptureError::InvalidContainer(_))
        ));
    }
}
