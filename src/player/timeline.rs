//! What the player reads: a timeline maps each time to the media sources
//! that make up its frame and its audio.

use crate::cache::key::{audio_cache_key, video_cache_key};
use crate::cache::CacheKey;
use crate::decoder::MediaInfo;
use crate::options::OptionsMap;
use crate::path::MediaPath;
use crate::time::{TimePoint, TimeRange};
use crate::unit::Transition;

/// One source frame to decode
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSource {
    pub path: MediaPath,
    /// Time within the source media
    pub time: TimePoint,
    pub init_options: OptionsMap,
    pub request_options: OptionsMap,
}

impl LayerSource {
    pub fn cache_key(&self) -> CacheKey {
        video_cache_key(&self.path, self.time, &self.init_options, &self.request_options)
    }
}

/// One layer of a frame: a source, and optionally a second source blended
/// into it by a transition
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRequest {
    pub a: LayerSource,
    pub b: Option<LayerSource>,
    pub transition: Transition,
    pub transition_progress: f32,
}

impl LayerRequest {
    pub fn single(a: LayerSource) -> Self {
        Self {
            a,
            b: None,
            transition: Transition::None,
            transition_progress: 0.0,
        }
    }

    /// Key for this layer alone: both sources and the transition between them
    pub fn cache_key(&self) -> CacheKey {
        let b = self.b.as_ref().map(LayerSource::cache_key);
        CacheKey::layer(
            &self.a.cache_key(),
            b.as_ref(),
            self.transition.name(),
            self.transition_progress,
        )
    }
}

/// One source's audio for a timeline second
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSource {
    pub path: MediaPath,
    /// Range within the source media
    pub range: TimeRange,
    pub init_options: OptionsMap,
    pub request_options: OptionsMap,
}

impl AudioSource {
    pub fn cache_key(&self) -> CacheKey {
        audio_cache_key(&self.path, self.range, &self.init_options, &self.request_options)
    }
}

/// Key for a whole frame: every layer in order, each with its sources and
/// transition
pub fn video_key(layers: &[LayerRequest]) -> CacheKey {
    let keys: Vec<CacheKey> = layers.iter().map(LayerRequest::cache_key).collect();
    CacheKey::composite(&keys)
}

/// Key for one second of mixed audio
pub fn audio_key(sources: &[AudioSource]) -> CacheKey {
    let keys: Vec<CacheKey> = sources.iter().map(AudioSource::cache_key).collect();
    CacheKey::composite(&keys)
}

/// Source of the layers to show at each time
pub trait Timeline: Send + Sync {
    /// Playable range; its start rate is the frame rate
    fn time_range(&self) -> TimeRange;

    /// Layers visible at `time`, bottom first. Empty means nothing to show.
    fn video_layers(&self, time: TimePoint) -> Vec<LayerRequest>;

    /// Audio sources for the whole second starting at `seconds`
    fn audio_sources(&self, seconds: i64) -> Vec<AudioSource>;
}

/// A timeline that plays one source from its start
#[derive(Debug, Clone)]
pub struct SingleMedia {
    path: MediaPath,
    range: TimeRange,
    init_options: OptionsMap,
    request_options: OptionsMap,
    audio: bool,
}

impl SingleMedia {
    pub fn new(path: MediaPath, range: TimeRange) -> Self {
        Self {
            path,
            range,
            init_options: OptionsMap::new(),
            request_options: OptionsMap::new(),
            audio: true,
        }
    }

    /// Timeline over the source's own video range
    pub fn from_info(path: MediaPath, info: &MediaInfo) -> Self {
        let mut media = Self::new(path, info.video_time);
        media.audio = info.has_audio();
        media
    }

    pub fn with_init_options(mut self, options: OptionsMap) -> Self {
        self.init_options = options;
        self
    }

    pub fn with_request_options(mut self, options: OptionsMap) -> Self {
        self.request_options = options;
        self
    }

    pub fn without_audio(mut self) -> Self {
        self.audio = false;
        self
    }

    pub fn path(&self) -> &MediaPath {
        &self.path
    }

    fn source_at(&self, time: TimePoint) -> Option<LayerSource> {
        self.range.contains(time).then(|| LayerSource {
            path: self.path.clone(),
            time,
            init_options: self.init_options.clone(),
            request_options: self.request_options.clone(),
        })
    }
}

impl Timeline for SingleMedia {
    fn time_range(&self) -> TimeRange {
        self.range
    }

    fn video_layers(&self, time: TimePoint) -> Vec<LayerRequest> {
        self.source_at(time).map(LayerRequest::single).into_iter().collect()
    }

    fn audio_sources(&self, seconds: i64) -> Vec<AudioSource> {
        if !self.audio {
            return Vec::new();
        }
        vec![AudioSource {
            path: self.path.clone(),
            range: TimeRange::whole_second(seconds),
            init_options: self.init_options.clone(),
            request_options: self.request_options.clone(),
        }]
    }
}

/// How compared sources are combined
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareMode {
    /// One layer per source, first at the bottom
    Stack,
    /// First two sources in one layer, blended by the given amount
    Dissolve(f32),
}

/// Several sources played in sync for A/B comparison.
///
/// The first source sets the time range and supplies the audio.
#[derive(Debug, Clone)]
pub struct Compare {
    sources: Vec<SingleMedia>,
    mode: CompareMode,
}

impl Compare {
    pub fn new(sources: Vec<SingleMedia>, mode: CompareMode) -> Self {
        Self { sources, mode }
    }
}

impl Timeline for Compare {
    fn time_range(&self) -> TimeRange {
        self.sources.first().map(|s| s.range).unwrap_or_default()
    }

    fn video_layers(&self, time: TimePoint) -> Vec<LayerRequest> {
        match self.mode {
            CompareMode::Stack => self
                .sources
                .iter()
                .filter_map(|s| s.source_at(time))
                .map(LayerRequest::single)
                .collect(),
            CompareMode::Dissolve(progress) => {
                let Some(a) = self.sources.first().and_then(|s| s.source_at(time)) else {
                    return Vec::new();
                };
                let b = self.sources.get(1).and_then(|s| s.source_at(time));
                let transition = if b.is_some() {
                    Transition::Dissolve
                } else {
                    Transition::None
                };
                vec![LayerRequest {
                    a,
                    b,
                    transition,
                    transition_progress: progress.clamp(0.0, 1.0),
                }]
            }
        }
    }

    fn audio_sources(&self, seconds: i64) -> Vec<AudioSource> {
        self.sources
            .first()
            .map(|s| s.audio_sources(seconds))
            .unwrap_or_default()
    }
}
