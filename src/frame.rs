//! Decoded frame container.
//!
//! Every capture backend hands the viewer a `Frame`: tightly packed RGB24
//! pixels plus dimensions and a per-source sequence number. Display backends
//! convert to whatever layout their toolkit expects (`to_bgr` for OpenCV).
//!
//! A frame is only rendered when `is_valid()` holds. Backends that fail to
//! decode report "no frame" instead of producing a placeholder.

use anyhow::{anyhow, Result};

/// Bytes per pixel for RGB24.
pub const BYTES_PER_PIXEL: usize = 3;

/// Owned RGB24 raster, row-major, no row padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Sequence number assigned by the source (1-based).
    pub seq: u64,
}

impl Frame {
    /// Build a frame, rejecting buffers whose length does not match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, seq: u64) -> Result<Self> {
        let expected = expected_len(width, height);
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} RGB24",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            seq,
        })
    }

    /// Build a frame from rows that may carry trailing padding (`stride` bytes per row).
    pub fn from_strided(
        data: &[u8],
        width: u32,
        height: u32,
        stride: usize,
        seq: u64,
    ) -> Result<Self> {
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        if stride == row_bytes {
            let packed = data
                .get(..row_bytes * height as usize)
                .ok_or_else(|| anyhow!("frame buffer is shorter than {}x{}", width, height))?;
            return Self::new(packed.to_vec(), width, height, seq);
        }
        if stride < row_bytes {
            return Err(anyhow!(
                "row stride {} is smaller than row width {} bytes",
                stride,
                row_bytes
            ));
        }

        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_bytes;
            pixels.extend_from_slice(
                data.get(start..end)
                    .ok_or_else(|| anyhow!("frame row {} is out of bounds", row))?,
            );
        }
        Self::new(pixels, width, height, seq)
    }

    /// A frame with both dimensions non-zero and a matching buffer.
    ///
    /// `Frame::new` already enforces the buffer length, so this only rejects
    /// zero-sized frames (what a failed decode would otherwise look like).
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == expected_len(self.width, self.height)
    }

    pub fn as_rgb(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Same pixels with red and blue swapped (OpenCV channel order).
    pub fn to_bgr(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        for px in out.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.swap(0, 2);
        }
        out
    }

    /// Build a frame from BGR24 pixels.
    pub fn from_bgr(mut bgr: Vec<u8>, width: u32, height: u32, seq: u64) -> Result<Self> {
        for px in bgr.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.swap(0, 2);
        }
        Self::new(bgr, width, height, seq)
    }

    /// RGB value at (x, y), if in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.data.get(offset..offset + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2]])
    }
}

fn expected_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0; 10], 2, 2, 1).is_err());
        assert!(Frame::new(vec![0; 12], 2, 2, 1).is_ok());
    }

    #[test]
    fn zero_sized_frame_is_not_valid() -> Result<()> {
        let frame = Frame::new(Vec::new(), 0, 0, 1)?;
        assert!(!frame.is_valid());
        Ok(())
    }

    #[test]
    fn strided_rows_are_packed() -> Result<()> {
        // 2x2 image, 8 bytes per row (2 bytes padding)
        let data = [
            1, 2, 3, 4, 5, 6, 0xee, 0xee, //
            7, 8, 9, 10, 11, 12, 0xee, 0xee,
        ];
        let frame = Frame::from_strided(&data, 2, 2, 8, 1)?;
        assert_eq!(frame.as_rgb(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(frame.pixel(1, 1), Some([10, 11, 12]));
        assert_eq!(frame.pixel(2, 0), None);
        Ok(())
    }

    #[test]
    fn stride_smaller_than_row_is_rejected() {
        assert!(Frame::from_strided(&[0; 12], 2, 2, 4, 1).is_err());
    }

    #[test]
    fn bgr_swaps_red_and_blue() -> Result<()> {
        let frame = Frame::new(vec![10, 20, 30], 1, 1, 1)?;
        assert_eq!(frame.to_bgr(), vec![30, 20, 10]);
        let back = Frame::from_bgr(frame.to_bgr(), 1, 1, 1)?;
        assert_eq!(back, frame);
        Ok(())
    }
}
