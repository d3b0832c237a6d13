//! Media information types

use std::collections::BTreeMap;

use crate::time::TimeRange;

/// Codec information
#[derive(Debug, Clone, PartialEq)]
pub struct CodecInfo {
    /// Short name (e.g., "vp9")
    pub name: String,

    /// Long name (e.g., "Google VP9")
    pub long_name: String,
}

impl CodecInfo {
    /// Create unknown codec info
    pub fn unknown() -> Self {
        Self {
            name: "unknown".to_string(),
            long_name: "Unknown Codec".to_string(),
        }
    }
}

/// Video track information
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrack {
    /// Track index
    pub index: usize,

    /// Codec info
    pub codec: CodecInfo,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Frame rate
    pub frame_rate: f64,

    /// Pixel format string
    pub pixel_format: String,
}

/// Audio track information
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    /// Track index
    pub index: usize,

    /// Codec info
    pub codec: CodecInfo,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels
    pub channels: u32,

    /// Language code
    pub language_code: Option<String>,
}

/// Stream layout of a media source.
///
/// Opaque to the caches: it is stored and handed back, never interpreted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    /// Video time range, in the source's frame rate
    pub video_time: TimeRange,

    /// Audio time range
    pub audio_time: TimeRange,

    /// Container format
    pub container_format: String,

    /// Video tracks
    pub video_tracks: Vec<VideoTrack>,

    /// Audio tracks
    pub audio_tracks: Vec<AudioTrack>,

    /// Metadata
    pub metadata: BTreeMap<String, String>,
}

impl MediaInfo {
    /// Check if media has video
    pub fn has_video(&self) -> bool {
        !self.video_tracks.is_empty()
    }

    /// Check if media has audio
    pub fn has_audio(&self) -> bool {
        !self.audio_tracks.is_empty()
    }

    /// Get primary video track
    pub fn primary_video(&self) -> Option<&VideoTrack> {
        self.video_tracks.first()
    }

    /// Get primary audio track
    pub fn primary_audio(&self) -> Option<&AudioTrack> {
        self.audio_tracks.first()
    }
}
