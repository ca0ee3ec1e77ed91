// SPDX-License-Identifier: GPL-3.0-only

//! Planar YUV 4:2:0 (I420) image buffers
//!
//! Images are stored as one contiguous allocation holding the luma plane
//! followed by the U and V chroma planes with no row padding. Chroma planes
//! are half resolution in both directions, rounded up, so odd geometries keep
//! their last column and row of chroma.

use crate::errors::{CaptureError, CaptureResult};

/// Number of planes in an I420 image
pub const PLANE_COUNT: usize = 3;

/// Plane geometry for a tightly packed I420 image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneLayout {
    width: u32,
    height: u32,
}

impl PlaneLayout {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width of each chroma plane, `ceil(width / 2)`
    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    /// Height of each chroma plane, `ceil(height / 2)`
    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }

    pub fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn chroma_len(&self) -> usize {
        self.chroma_width() as usize * self.chroma_height() as usize
    }

    /// Total byte length: `w*h + 2*ceil(w/2)*ceil(h/2)`
    pub fn total_len(&self) -> usize {
        self.luma_len() + 2 * self.chroma_len()
    }

    /// Row width and row count of plane `index` (0 = Y, 1 = U, 2 = V)
    pub fn plane_dims(&self, index: usize) -> (usize, usize) {
        if index == 0 {
            (self.width as usize, self.height as usize)
        } else {
            (self.chroma_width() as usize, self.chroma_height() as usize)
        }
    }

    /// Byte offsets of the three planes inside the contiguous buffer
    pub fn offsets(&self) -> [usize; PLANE_COUNT] {
        let luma = self.luma_len();
        [0, luma, luma + self.chroma_len()]
    }

    /// Row strides of the three planes (equal to the logical row widths)
    pub fn strides(&self) -> [i32; PLANE_COUNT] {
        let chroma = self.chroma_width() as i32;
        [self.width as i32, chroma, chroma]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A picture whose planes may carry row padding, as produced by codecs and
/// camera pipelines.
pub trait StridedPlanes {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Plane data and its row stride in bytes
    fn plane(&self, index: usize) -> Option<(&[u8], usize)>;
}

/// Copy the visible area of a strided picture into `dst`, tightly packed.
///
/// Rows are written one at a time; before each row the running offset is
/// checked against `limit` and the copy stops with `OutputTooSmall` as soon
/// as the next row would not fit. Returns the number of bytes written.
pub fn copy_strided<P: StridedPlanes + ?Sized>(
    picture: &P,
    dst: &mut [u8],
    limit: usize,
) -> CaptureResult<usize> {
    let limit = limit.min(dst.len());
    let layout = PlaneLayout::new(picture.width(), picture.height());
    let mut offset = 0usize;

    for index in 0..PLANE_COUNT {
        let (row_len, rows) = layout.plane_dims(index);
        let (data, stride) = picture
            .plane(index)
            .ok_or_else(|| CaptureError::InvalidFrame(format!("plane {} unavailable", index)))?;
        if rows > 0 && stride < row_len {
            return Err(CaptureError::InvalidFrame(format!(
                "plane {} stride {} shorter than row width {}",
                index, stride, row_len
            )));
        }

        for row in 0..rows {
            if offset + row_len > limit {
                return Err(CaptureError::OutputTooSmall {
                    needed: offset + row_len,
                    capacity: limit,
                });
            }
            let start = row * stride;
            let src = data.get(start..start + row_len).ok_or_else(|| {
                CaptureError::InvalidFrame(format!(
                    "plane {} truncated at row {} of {}",
                    index, row, rows
                ))
            })?;
            dst[offset..offset + row_len].copy_from_slice(src);
            offset += row_len;
        }
    }

    Ok(offset)
}

/// Contiguous I420 image
#[derive(Clone, PartialEq, Eq)]
pub struct PlanarImage {
    layout: PlaneLayout,
    data: Vec<u8>,
}

impl std::fmt::Debug for PlanarImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanarImage")
            .field("width", &self.layout.width)
            .field("height", &self.layout.height)
            .field("len", &self.data.len())
            .finish()
    }
}

impl PlanarImage {
    /// Zero-filled image
    pub fn new(width: u32, height: u32) -> Self {
        let layout = PlaneLayout::new(width, height);
        Self {
            data: vec![0; layout.total_len()],
            layout,
        }
    }

    /// Zero-filled image, reporting allocation failure instead of aborting
    pub fn try_new(width: u32, height: u32) -> CaptureResult<Self> {
        let layout = PlaneLayout::new(width, height);
        let len = layout.total_len();
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            CaptureError::AllocationFailed(format!(
                "{}x{} image ({} bytes): {}",
                width, height, len, e
            ))
        })?;
        data.resize(len, 0);
        Ok(Self { layout, data })
    }

    /// Image with every plane set to a constant value
    pub fn filled(width: u32, height: u32, y: u8, u: u8, v: u8) -> Self {
        let mut image = Self::new(width, height);
        let [_, u_offset, v_offset] = image.layout.offsets();
        image.data[..u_offset].fill(y);
        image.data[u_offset..v_offset].fill(u);
        image.data[v_offset..].fill(v);
        image
    }

    /// Video-range black (Y=16, U=V=128)
    pub fn black(width: u32, height: u32) -> Self {
        Self::filled(width, height, 16, 128, 128)
    }

    /// Wrap existing I420 bytes; the length must match the geometry exactly
    pub fn from_bytes(width: u32, height: u32, data: Vec<u8>) -> CaptureResult<Self> {
        let layout = PlaneLayout::new(width, height);
        if data.len() != layout.total_len() {
            return Err(CaptureError::InvalidFrame(format!(
                "{}x{} I420 needs {} bytes, got {}",
                width,
                height,
                layout.total_len(),
                data.len()
            )));
        }
        Ok(Self { layout, data })
    }

    /// Tightly pack a strided picture
    pub fn from_strided<P: StridedPlanes + ?Sized>(picture: &P) -> CaptureResult<Self> {
        let mut image = Self::try_new(picture.width(), picture.height())?;
        let len = image.data.len();
        copy_strided(picture, &mut image.data, len)?;
        Ok(image)
    }

    pub fn width(&self) -> u32 {
        self.layout.width
    }

    pub fn height(&self) -> u32 {
        self.layout.height
    }

    pub fn layout(&self) -> PlaneLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Plane `index` (0 = Y, 1 = U, 2 = V)
    pub fn plane(&self, index: usize) -> &[u8] {
        let (start, end) = self.plane_range(index);
        &self.data[start..end]
    }

    pub fn plane_mut(&mut self, index: usize) -> &mut [u8] {
        let (start, end) = self.plane_range(index);
        &mut self.data[start..end]
    }

    pub fn luma(&self) -> &[u8] {
        self.plane(0)
    }

    pub fn chroma_u(&self) -> &[u8] {
        self.plane(1)
    }

    pub fn chroma_v(&self) -> &[u8] {
        self.plane(2)
    }

    fn plane_range(&self, index: usize) -> (usize, usize) {
        let offsets = self.layout.offsets();
        let start = offsets[index];
        let end = offsets.get(index + 1).copied().unwrap_or(self.data.len());
        (start, end)
    }
}

impl StridedPlanes for PlanarImage {
    fn width(&self) -> u32 {
        self.layout.width
    }

    fn height(&self) -> u32 {
        self.layout.height
    }

    fn plane(&self, index: usize) -> Option<(&[u8], usize)> {
        if index >= PLANE_COUNT {
            return None;
        }
        let (row_len, _) = self.layout.plane_dims(index);
        Some((PlanarImage::plane(self, index), row_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Picture with padded rows, filled with the plane index + row number
    struct Padded {
        width: u32,
        height: u32,
        padding: usize,
        planes: Vec<Vec<u8>>,
    }

    impl Padded {
        fn new(width: u32, height: u32, padding: usize) -> Self {
            let layout = PlaneLayout::new(width, height);
            let planes = (0..PLANE_COUNT)
                .map(|index| {
                    let (row_len, rows) = layout.plane_dims(index);
                    let stride = row_len + padding;
                    let mut data = vec![0xEE; stride * rows];
                    for row in 0..rows {
                        data[row * stride..row * stride + row_len]
                            .fill((index * 100 + row) as u8);
                    }
                    data
                })
                .collect();
            Self {
                width,
                height,
                padding,
                planes,
            }
        }
    }

    impl StridedPlanes for Padded {
        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }

        fn plane(&self, index: usize) -> Option<(&[u8], usize)> {
            let (row_len, _) = PlaneLayout::new(self.width, self.height).plane_dims(index);
            Some((&self.planes[index], row_len + self.padding))
        }
    }

    #[test]
    fn test_layout_odd_geometry() {
        let layout = PlaneLayout::new(5, 3);
        assert_eq!(layout.chroma_width(), 3);
        assert_eq!(layout.chroma_height(), 2);
        assert_eq!(layout.total_len(), 15 + 2 * 6);
        assert_eq!(layout.offsets(), [0, 15, 21]);
        assert_eq!(layout.strides(), [5, 3, 3]);
    }

    #[test]
    fn test_black_planes() {
        let image = PlanarImage::black(4, 2);
        assert!(image.luma().iter().all(|&b| b == 16));
        assert!(image.chroma_u().iter().all(|&b| b == 128));
        assert_eq!(image.chroma_v().len(), 2);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        let err = PlanarImage::from_bytes(4, 4, vec![0; 10]).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidFrame(_)));
    }

    #[test]
    fn test_strided_copy_drops_padding() {
        let picture = Padded::new(6, 4, 10);
        let image = PlanarImage::from_strided(&picture).expect("copy");
        assert_eq!(image.len(), 24 + 2 * 6);
        assert!(!image.as_bytes().contains(&0xEE));
        assert_eq!(&image.luma()[6..12], &[1; 6]);
        assert_eq!(image.chroma_u(), &[100, 100, 100, 101, 101, 101]);
        assert_eq!(image.chroma_v()[0], 200);
    }

    #[test]
    fn test_strided_copy_checks_every_row() {
        let picture = Padded::new(4, 4, 2);
        let mut dst = vec![0u8; 64];
        // Room for the luma plane and one chroma row only
        let err = copy_strided(&picture, &mut dst, 16 + 2).unwrap_err();
        assert_eq!(
            err,
            CaptureError::OutputTooSmall {
                needed: 20,
                capacity: 18
            }
        );
        assert_eq!(&dst[16..18], &[100, 100]);
    }

    #[test]
    fn test_stride_shorter_than_row_is_rejected() {
        struct Narrow(Vec<u8>);
        impl StridedPlanes for Narrow {
            fn width(&self) -> u32 {
                4
            }
            fn height(&self) -> u32 {
                2
            }
            fn plane(&self, _index: usize) -> Option<(&[u8], usize)> {
                Some((&self.0, 1))
            }
        }
        let mut dst = vec![0u8; 32];
        let err = copy_strided(&Narrow(vec![0; 32]), &mut dst, 32).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidFrame(_)));
    }
}
