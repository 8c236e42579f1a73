use std::time::Instant;

use bytes::Bytes;
use scrollcap_core::{Frame, FrameError};

/// Channel layout of a backend buffer. All layouts are 4 bytes per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgba,
    /// Blue, Green, Red, Alpha.
    Bgra,
    /// Blue, Green, Red, unused. Alpha is forced opaque on conversion.
    Bgrx,
}

/// A frame as delivered by a backend, before conversion to [`Frame`].
#[derive(Clone)]
pub struct RawImage {
    pub data:        Bytes,
    pub width:       u32,
    pub height:      u32,
    /// Bytes per row including padding.
    pub row_stride:  usize,
    pub format:      PixelFormat,
    pub captured_at: Instant,
}

impl RawImage {
    /// A buffer with no row padding.
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            row_stride: width as usize * Frame::BYTES_PER_PIXEL,
            format,
            captured_at: Instant::now(),
        }
    }

    /// Wrap an existing frame, e.g. for replay.
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            data: frame.clone().into_bytes(),
            width: frame.width(),
            height: frame.height(),
            row_stride: frame.width() as usize * Frame::BYTES_PER_PIXEL,
            format: PixelFormat::Rgba,
            captured_at: frame.captured_at(),
        }
    }

    pub fn with_stride(mut self, row_stride: usize) -> Self {
        self.row_stride = row_stride;
        self
    }

    /// Crop row padding and normalise to RGBA.
    ///
    /// Tightly packed RGBA input is wrapped without copying.
    pub fn to_frame(&self) -> Result<Frame, FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::InvalidDimensions { width: self.width, height: self.height });
        }
        let row_bytes = self.width as usize * Frame::BYTES_PER_PIXEL;
        if self.row_stride < row_bytes {
            return Err(FrameError::StrideTooSmall { stride: self.row_stride, row_bytes });
        }
        let needed = self.row_stride * (self.height as usize - 1) + row_bytes;
        if self.data.len() < needed {
            return Err(FrameError::BufferTooShort { needed, actual: self.data.len() });
        }

        let packed_len = row_bytes * self.height as usize;
        if self.format == PixelFormat::Rgba && self.row_stride == row_bytes {
            let frame = Frame::from_rgba(self.width, self.height, self.data.slice(..packed_len))?;
            return Ok(frame.with_timestamp(self.captured_at));
        }

        let mut out = Vec::with_capacity(packed_len);
        for y in 0..self.height as usize {
            let row = &self.data[y * self.row_stride..y * self.row_stride + row_bytes];
            match self.format {
                PixelFormat::Rgba => out.extend_from_slice(row),
                PixelFormat::Bgra => {
                    for px in row.chunks_exact(4) {
                        out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
                    }
                }
                PixelFormat::Bgrx => {
                    for px in row.chunks_exact(4) {
                        out.extend_from_slice(&[px[2], px[1], px[0], 0xFF]);
                    }
                }
            }
        }
        Ok(Frame::from_rgba(self.width, self.height, out)?.with_timestamp(self.captured_at))
    }
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("row_stride", &self.row_stride)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_rgba_is_passed_through() {
        let data: Vec<u8> = (0..16).collect();
        let frame = RawImage::packed(2, 2, PixelFormat::Rgba, data.clone()).to_frame().unwrap();
        assert_eq!(frame.as_bytes(), &data[..]);
    }

    #[test]
    fn padded_rows_are_cropped() {
        // 2×2 RGBA with 4 bytes of padding per row
        let mut data = Vec::new();
        data.extend_from_slice(&[1, 1, 1, 1, 2, 2, 2, 2, 0xEE, 0xEE, 0xEE, 0xEE]);
        data.extend_from_slice(&[3, 3, 3, 3, 4, 4, 4, 4]); // last row unpadded
        let raw = RawImage::packed(2, 2, PixelFormat::Rgba, data).with_stride(12);
        let frame = raw.to_frame().unwrap();
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.pixel(1, 0), [2, 2, 2, 2]);
        assert_eq!(frame.pixel(0, 1), [3, 3, 3, 3]);
        assert!(!frame.as_bytes().contains(&0xEE));
    }

    #[test]
    fn bgr_layouts_are_swizzled() {
        let bgra = RawImage::packed(1, 1, PixelFormat::Bgra, vec![10, 20, 30, 40]).to_frame().unwrap();
        assert_eq!(bgra.pixel(0, 0), [30, 20, 10, 40]);

        let bgrx = RawImage::packed(1, 1, PixelFormat::Bgrx, vec![10, 20, 30, 0]).to_frame().unwrap();
        assert_eq!(bgrx.pixel(0, 0), [30, 20, 10, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        // last row needs no padding: 12 + 8 bytes
        let exact = RawImage::packed(2, 2, PixelFormat::Rgba, vec![0u8; 20]).with_stride(12);
        assert!(exact.to_frame().is_ok());

        let short = RawImage::packed(2, 2, PixelFormat::Rgba, vec![0u8; 19]).with_stride(12);
        assert_eq!(
            short.to_frame().unwrap_err(),
            FrameError::BufferTooShort { needed: 20, actual: 19 }
        );
    }

    #[test]
    fn narrow_stride_is_rejected() {
        let raw = RawImage::packed(4, 1, PixelFormat::Rgba, vec![0u8; 16]).with_stride(8);
        assert!(matches!(raw.to_frame(), Err(FrameError::StrideTooSmall { stride: 8, row_bytes: 16 })));
    }
}
