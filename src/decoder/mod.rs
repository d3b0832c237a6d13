//! Format readers
//!
//! A [`Reader`] decodes one media source. Readers are created by a
//! [`ReaderPlugin`] looked up in the [`FormatRegistry`], then moved onto a
//! worker thread that owns them exclusively, so a reader needs `Send` but
//! never `Sync`.

use crate::error::Result;
use crate::options::OptionsMap;
use crate::path::MediaPath;
use crate::time::{TimePoint, TimeRange};
use crate::unit::{AudioUnit, VideoUnit};

mod audio_frame;
pub(crate) mod config;
#[cfg(feature = "ffmpeg")]
pub(crate) mod ffmpeg_decoder;
mod frame;
mod info;
mod registry;
#[cfg(test)]
pub(crate) mod testing;

pub use audio_frame::AudioBuffer;
pub use config::{DecoderConfig, PixelFormat};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg_decoder::{FFmpegPlugin, FFmpegReader};
pub use frame::{Image, ImageSize};
pub use info::{AudioTrack, CodecInfo, MediaInfo, VideoTrack};
pub use registry::FormatRegistry;

/// Decoder for a single opened source
///
/// Calls arrive one at a time from the owning worker thread.
pub trait Reader: Send {
    /// Stream layout of the source
    fn info(&mut self) -> Result<MediaInfo>;

    /// Decode the frame shown at `time`
    fn decode_video(&mut self, time: TimePoint, options: &OptionsMap) -> Result<VideoUnit>;

    /// Decode the samples covering `range`
    fn decode_audio(&mut self, range: TimeRange, options: &OptionsMap) -> Result<AudioUnit>;
}

/// Factory for readers of one family of formats
pub trait ReaderPlugin: Send + Sync {
    /// Plugin name, for logging
    fn name(&self) -> &str;

    /// Lower-case file extensions this plugin claims, without the dot
    fn extensions(&self) -> &[&str];

    /// Content sniff, consulted when no extension matches
    fn can_read(&self, _path: &MediaPath) -> bool {
        false
    }

    /// Open `path`; `init_options` are fixed for the reader's lifetime
    fn open(&self, path: &MediaPath, init_options: &OptionsMap) -> Result<Box<dyn Reader>>;
}
