//! Reader initialization options

use std::fmt;
use std::str::FromStr;

use crate::options::OptionsMap;

/// Init option: decoding threads (0 = auto)
pub const OPTION_THREAD_COUNT: &str = "thread_count";
/// Init option: output pixel format name
pub const OPTION_PIXEL_FORMAT: &str = "pixel_format";
/// Init option: prefer hardware decoding ("true"/"false")
pub const OPTION_PREFER_HARDWARE: &str = "prefer_hardware_decoding";

/// Pixel format for output images
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PixelFormat {
    /// BGRA (32-bit)
    #[default]
    Bgra = 0,
    /// NV12 (12-bit, Y plane + interleaved UV)
    Nv12 = 1,
    /// YUV420P (12-bit, planar)
    Yuv420p = 2,
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PixelFormat::Bgra => "bgra",
            PixelFormat::Nv12 => "nv12",
            PixelFormat::Yuv420p => "yuv420p",
        })
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bgra" => Ok(PixelFormat::Bgra),
            "nv12" => Ok(PixelFormat::Nv12),
            "yuv420p" => Ok(PixelFormat::Yuv420p),
            other => Err(format!("unknown pixel format: {}", other)),
        }
    }
}

/// Typed view over a reader's init options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Prefer hardware decoding where available
    pub prefer_hardware_decoding: bool,

    /// Number of decoding threads (0 = auto)
    pub thread_count: u32,

    /// Output pixel format
    pub output_pixel_format: PixelFormat,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            prefer_hardware_decoding: true,
            thread_count: 0,
            output_pixel_format: PixelFormat::Bgra,
        }
    }
}

impl DecoderConfig {
    /// Read the known keys of `options`; missing or malformed values keep
    /// their defaults.
    pub fn from_options(options: &OptionsMap) -> Self {
        let defaults = Self::default();
        Self {
            prefer_hardware_decoding: options
                .get_parsed(OPTION_PREFER_HARDWARE)
                .unwrap_or(defaults.prefer_hardware_decoding),
            thread_count: options
                .get_parsed(OPTION_THREAD_COUNT)
                .unwrap_or(defaults.thread_count),
            output_pixel_format: options
                .get_parsed(OPTION_PIXEL_FORMAT)
                .unwrap_or(defaults.output_pixel_format),
        }
    }

    /// Write this config as init options
    pub fn to_options(&self) -> OptionsMap {
        OptionsMap::new()
            .with(OPTION_PREFER_HARDWARE, self.prefer_hardware_decoding)
            .with(OPTION_THREAD_COUNT, self.thread_count)
            .with(OPTION_PIXEL_FORMAT, self.output_pixel_format)
    }

    /// Low memory preset
    pub fn low_memory() -> Self {
        Self {
            prefer_hardware_decoding: true,
            thread_count: 2,
            output_pixel_format: PixelFormat::Nv12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DecoderConfig::default();
        assert!(config.prefer_hardware_decoding);
        assert_eq!(config.thread_count, 0);
        assert_eq!(config.output_pixel_format, PixelFormat::Bgra);
    }

    #[test]
    fn test_options_round_trip() {
        let config = DecoderConfig::low_memory();
        assert_eq!(DecoderConfig::from_options(&config.to_options()), config);
    }

    #[test]
    fn test_malformed_options_keep_defaults() {
        let options = OptionsMap::new()
            .with(OPTION_THREAD_COUNT, "many")
            .with(OPTION_PIXEL_FORMAT, "YUV420P")
            .with("exr/layer", "beauty");
        let config = DecoderConfig::from_options(&options);
        assert_eq!(config.thread_count, 0);
        assert_eq!(config.output_pixel_format, PixelFormat::Yuv420p);
    }
}
