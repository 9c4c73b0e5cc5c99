use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::coords::Extent;

/// Producer-assigned frame number. Monotonic per camera stream.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pixel layout of a frame's backing buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }
}

/// Reasons a frame cannot be attached to a texture.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame {id} has an empty extent ({extent})")]
    EmptyExtent { id: FrameId, extent: Extent },

    #[error("frame {id} stride {stride} is shorter than a row ({row} bytes)")]
    StrideTooSmall { id: FrameId, stride: u32, row: u32 },

    #[error("frame {id} buffer holds {len} bytes, {needed} needed")]
    Truncated { id: FrameId, len: usize, needed: usize },
}

/// One decoded camera image, as delivered by the capture pipeline.
///
/// The backing buffer is shared, so cloning a frame is cheap.
#[derive(Clone)]
pub struct CameraFrame {
    id: FrameId,
    extent: Extent,
    format: PixelFormat,
    stride: u32,
    timestamp: Duration,
    data: Arc<[u8]>,
}

impl CameraFrame {
    /// Creates a tightly packed frame (stride = width × bytes per pixel).
    pub fn new(
        id: FrameId,
        extent: Extent,
        format: PixelFormat,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            id,
            extent,
            format,
            stride: extent.width.saturating_mul(format.bytes_per_pixel()),
            timestamp: Duration::ZERO,
            data: data.into(),
        }
    }

    /// Overrides the row stride for padded buffers.
    pub fn with_stride(mut self, stride: u32) -> Self {
        self.stride = stride;
        self
    }

    /// Capture time relative to the start of the stream.
    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Pixel rows with any stride padding removed. Expects a valid frame.
    pub fn packed(&self) -> Vec<u8> {
        let row = self.extent.width as usize * self.format.bytes_per_pixel() as usize;
        let stride = self.stride as usize;
        if stride == row {
            let len = (row * self.extent.height as usize).min(self.data.len());
            return self.data[..len].to_vec();
        }
        self.data
            .chunks(stride)
            .take(self.extent.height as usize)
            .flat_map(|r| &r[..row.min(r.len())])
            .copied()
            .collect()
    }

    /// Checks that the buffer actually holds the image it claims to.
    pub fn validate(&self) -> Result<(), FrameError> {
        if self.extent.is_empty() {
            return Err(FrameError::EmptyExtent { id: self.id, extent: self.extent });
        }

        let row = self.extent.width.saturating_mul(self.format.bytes_per_pixel());
        if self.stride < row {
            return Err(FrameError::StrideTooSmall { id: self.id, stride: self.stride, row });
        }

        // The last row only needs `row` bytes, not a full stride.
        let needed = self.stride as usize * (self.extent.height as usize - 1) + row as usize;
        if self.data.len() < needed {
            return Err(FrameError::Truncated { id: self.id, len: self.data.len(), needed });
        }

        Ok(())
    }
}

impl std::fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraFrame")
            .field("id", &self.id)
            .field("extent", &self.extent)
            .field("format", &self.format)
            .field("stride", &self.stride)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(w: u32, h: u32, len: usize) -> CameraFrame {
        CameraFrame::new(FrameId(1), Extent::new(w, h), PixelFormat::Rgba8, vec![0u8; len])
    }

    #[test]
    fn packed_frame_is_valid() {
        assert_eq!(frame(4, 2, 32).validate(), Ok(()));
    }

    #[test]
    fn padded_last_row_may_be_short() {
        // Two rows of 16 bytes with a 20-byte stride: 20 + 16.
        let f = frame(4, 2, 36).with_stride(20);
        assert_eq!(f.validate(), Ok(()));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let err = frame(4, 2, 31).validate().unwrap_err();
        assert_eq!(err, FrameError::Truncated { id: FrameId(1), len: 31, needed: 32 });
    }

    #[test]
    fn short_stride_is_rejected() {
        let err = frame(4, 2, 64).with_stride(8).validate().unwrap_err();
        assert!(matches!(err, FrameError::StrideTooSmall { stride: 8, row: 16, .. }));
    }

    #[test]
    fn empty_extent_is_rejected() {
        assert!(matches!(frame(0, 2, 0).validate(), Err(FrameError::EmptyExtent { .. })));
    }

    #[test]
    fn packed_strips_row_padding() {
        let data: Vec<u8> = (0..36).collect();
        let f = CameraFrame::new(FrameId(1), Extent::new(4, 2), PixelFormat::Rgba8, data)
            .with_stride(20);
        let packed = f.packed();
        assert_eq!(packed.len(), 32);
        assert_eq!(&packed[..16], &(0..16).collect::<Vec<u8>>()[..]);
        assert_eq!(&packed[16..], &(20..36).collect::<Vec<u8>>()[..]);
        assert_eq!(frame(4, 2, 32).packed().len(), 32);
    }

    #[test]
    fn debug_omits_pixel_data() {
        let s = format!("{:?}", frame(4, 2, 32));
        assert!(s.contains("bytes: 32"));
    }
}
