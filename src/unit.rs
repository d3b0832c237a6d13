//! Decoded units: what readers produce and the caches hold.
//!
//! A [`VideoUnit`] is every layer shown at one timeline time. An
//! [`AudioUnit`] is every layer mixed for one whole second. Payloads are
//! `Arc`-shared and immutable once a unit has been published.

use std::sync::Arc;

use crate::decoder::{AudioBuffer, Image, ImageSize};
use crate::options::OptionsMap;
use crate::time::TimePoint;

/// How layer B blends into layer A
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Transition {
    #[default]
    None,
    Dissolve,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::None => "none",
            Transition::Dissolve => "dissolve",
        }
    }
}

/// One composited layer of a video unit
#[derive(Debug, Clone)]
pub struct VideoLayer {
    pub image: Arc<Image>,
    pub image_options: OptionsMap,

    /// Incoming image while a transition is running
    pub image_b: Option<Arc<Image>>,
    pub image_options_b: OptionsMap,

    pub transition: Transition,

    /// Blend amount in `[0, 1]`; 0 shows only `image`
    pub transition_progress: f32,
}

impl VideoLayer {
    /// Layer with a single image and no transition
    pub fn new(image: Arc<Image>) -> Self {
        Self {
            image,
            image_options: OptionsMap::new(),
            image_b: None,
            image_options_b: OptionsMap::new(),
            transition: Transition::None,
            transition_progress: 0.0,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.image.data_size() + self.image_b.as_ref().map_or(0, |b| b.data_size())
    }
}

/// Everything visible at one timeline time
#[derive(Debug, Clone)]
pub struct VideoUnit {
    pub size: ImageSize,
    pub time: TimePoint,
    pub layers: Vec<VideoLayer>,
}

impl VideoUnit {
    /// Unit holding one image as its only layer
    pub fn single(time: TimePoint, image: Image) -> Self {
        Self {
            size: image.size(),
            time,
            layers: vec![VideoLayer::new(Arc::new(image))],
        }
    }

    pub fn byte_size(&self) -> usize {
        self.layers.iter().map(VideoLayer::byte_size).sum()
    }
}

/// One source's samples within an audio unit
#[derive(Debug, Clone)]
pub struct AudioLayer {
    pub audio: Arc<AudioBuffer>,
}

/// Every audio layer for one whole second of the timeline
#[derive(Debug, Clone)]
pub struct AudioUnit {
    pub start_seconds: f64,
    pub layers: Vec<AudioLayer>,
}

impl AudioUnit {
    pub fn single(start_seconds: f64, audio: AudioBuffer) -> Self {
        Self {
            start_seconds,
            layers: vec![AudioLayer {
                audio: Arc::new(audio),
            }],
        }
    }

    pub fn byte_size(&self) -> usize {
        self.layers.iter().map(|l| l.audio.data_size()).sum()
    }
}

/// Equality on time identity only, ignoring payloads
pub trait TimeIdentity {
    fn is_time_equal(&self, other: &Self) -> bool;
}

impl TimeIdentity for VideoUnit {
    fn is_time_equal(&self, other: &Self) -> bool {
        self.time == other.time
    }
}

impl TimeIdentity for AudioUnit {
    fn is_time_equal(&self, other: &Self) -> bool {
        self.start_seconds == other.start_seconds
    }
}

/// True when two units refer to the same time, whatever their contents
pub fn is_time_equal<T: TimeIdentity>(a: &T, b: &T) -> bool {
    a.is_time_equal(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::PixelFormat;

    #[test]
    fn test_video_time_identity_ignores_payload() {
        let a = VideoUnit::single(TimePoint::new(24, 24), Image::blank(4, 4, PixelFormat::Bgra));
        let b = VideoUnit::single(TimePoint::new(48, 48), Image::blank(8, 8, PixelFormat::Nv12));
        let c = VideoUnit::single(TimePoint::new(25, 24), Image::blank(4, 4, PixelFormat::Bgra));
        assert!(is_time_equal(&a, &b));
        assert!(!is_time_equal(&a, &c));
    }

    #[test]
    fn test_audio_time_identity() {
        let a = AudioUnit::single(3.0, AudioBuffer::silence(48000, 2, 48000));
        let b = AudioUnit {
            start_seconds: 3.0,
            layers: Vec::new(),
        };
        let c = AudioUnit::single(4.0, AudioBuffer::silence(48000, 2, 48000));
        assert!(is_time_equal(&a, &b));
        assert!(!is_time_equal(&a, &c));
    }

    #[test]
    fn test_byte_size() {
        let mut unit = VideoUnit::single(TimePoint::new(0, 24), Image::blank(2, 2, PixelFormat::Bgra));
        assert_eq!(unit.byte_size(), 16);
        unit.layers[0].image_b = Some(Arc::new(Image::blank(2, 2, PixelFormat::Bgra)));
        unit.layers[0].transition = Transition::Dissolve;
        assert_eq!(unit.byte_size(), 32);

        let audio = AudioUnit::single(0.0, AudioBuffer::silence(10, 2, 48000));
        assert_eq!(audio.byte_size(), 80);
    }
}
