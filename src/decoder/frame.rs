//! Decoded image type

use super::config::PixelFormat;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Decoded image
///
/// Once wrapped in an `Arc` and published to a cache the pixel data is
/// treated as immutable; consumers that need to modify it clone first.
#[derive(Clone, PartialEq)]
pub struct Image {
    /// Raw pixel data
    pub data: Vec<u8>,

    /// Frame width
    pub width: u32,

    /// Frame height
    pub height: u32,

    /// Bytes per row (stride)
    pub stride: u32,

    /// Pixel format
    pub pixel_format: PixelFormat,
}

impl Image {
    /// Create a new image
    pub fn new(data: Vec<u8>, width: u32, height: u32, stride: u32, pixel_format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            stride,
            pixel_format,
        }
    }

    /// Zero-filled image with a tightly packed stride
    pub fn blank(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        let size = Self::expected_size(width, height, pixel_format);
        let stride = match pixel_format {
            PixelFormat::Bgra => width * 4,
            PixelFormat::Nv12 | PixelFormat::Yuv420p => width,
        };
        Self::new(vec![0u8; size], width, height, stride, pixel_format)
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    /// Get data size in bytes
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Calculate expected data size for format
    pub fn expected_size(width: u32, height: u32, format: PixelFormat) -> usize {
        let (w, h) = (width as usize, height as usize);
        match format {
            PixelFormat::Bgra => w * h * 4,
            PixelFormat::Nv12 | PixelFormat::Yuv420p => w * h * 3 / 2,
        }
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pixel_format", &self.pixel_format)
            .field("data_size", &self.data.len())
            .finish()
    }
}
