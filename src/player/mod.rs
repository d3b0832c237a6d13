//! Read-ahead player
//!
//! The player keeps the caches filled around the playback position. Each
//! [`Player::tick`] collects finished decodes into the caches, then
//! reconciles the read-ahead window: missing times are requested from the
//! reader pool, and times that left the window are dropped from the caches
//! and their pending requests discarded.
//!
//! The player never blocks on decoding except in
//! [`Player::wait_current_video`], which waits at most the given timeout.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::key::info_cache_key;
use crate::cache::{CacheConfig, CacheKey, LruCache};
use crate::decoder::{FormatRegistry, MediaInfo};
use crate::error::Result;
use crate::options::OptionsMap;
use crate::path::MediaPath;
use crate::pool::ReaderPool;
use crate::threading::Request;
use crate::time::TimePoint;
use crate::unit::{AudioUnit, Transition, VideoLayer, VideoUnit};

mod timeline;
mod window;

pub use timeline::{
    audio_key, video_key, AudioSource, Compare, CompareMode, LayerRequest, LayerSource, SingleMedia,
    Timeline,
};
pub use window::{audio_window, frame_step, video_window, Playback};

/// Read-ahead settings
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Frames to read ahead of the position
    pub read_ahead: usize,

    /// Frames to keep behind the position
    pub read_behind: usize,

    /// Whole seconds of audio to read ahead
    pub audio_read_ahead_seconds: usize,

    /// Whole seconds of audio to keep behind
    pub audio_read_behind_seconds: usize,

    /// Show the last decoded frame while the current one is missing
    pub hold_last_frame: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            read_ahead: 24,
            read_behind: 4,
            audio_read_ahead_seconds: 2,
            audio_read_behind_seconds: 1,
            hold_last_frame: true,
        }
    }
}

impl PlayerConfig {
    /// Short window for scrubbing
    pub fn scrubbing() -> Self {
        Self {
            read_ahead: 4,
            read_behind: 4,
            audio_read_ahead_seconds: 0,
            audio_read_behind_seconds: 0,
            hold_last_frame: true,
        }
    }
}

/// Caches a player reads from and fills. Clones share the same caches,
/// so several players can share decoded results and open readers.
#[derive(Clone)]
pub struct PlayerCaches {
    pub video: Arc<LruCache<CacheKey, Arc<VideoUnit>>>,
    pub audio: Arc<LruCache<CacheKey, Arc<AudioUnit>>>,
    pub info: Arc<LruCache<CacheKey, Arc<MediaInfo>>>,
    pub readers: Arc<ReaderPool>,
}

impl PlayerCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            video: Arc::new(LruCache::new(config.video_max)),
            audio: Arc::new(LruCache::new(config.audio_max)),
            info: Arc::new(LruCache::new(config.info_max)),
            readers: Arc::new(ReaderPool::new(config.reader_max)),
        }
    }
}

impl Default for PlayerCaches {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

/// Outstanding result of one source decode
enum Slot<T> {
    Waiting(Request<T>),
    Done(T),
    /// Decode error; not retried while the time stays in the window
    Failed,
    /// Discarded before it ran; retried on the next reconcile
    Cancelled,
}

impl<T> Slot<T> {
    fn poll(&mut self) {
        let next = match self {
            Slot::Waiting(request) => request.try_take().map(Self::resolved),
            _ => None,
        };
        if let Some(next) = next {
            *self = next;
        }
    }

    fn wait(&mut self, timeout: Duration) {
        let next = match self {
            Slot::Waiting(request) => request.wait_timeout(timeout).map(Self::resolved),
            _ => None,
        };
        if let Some(next) = next {
            *self = next;
        }
    }

    /// Errors are already logged by the worker
    fn resolved(result: Result<T>) -> Self {
        match result {
            Ok(value) => Slot::Done(value),
            Err(e) if e.is_cancelled() => Slot::Cancelled,
            Err(_) => Slot::Failed,
        }
    }

    fn is_waiting(&self) -> bool {
        matches!(self, Slot::Waiting(_))
    }

    fn is_failed(&self) -> bool {
        matches!(self, Slot::Failed)
    }

    fn is_cancelled(&self) -> bool {
        matches!(self, Slot::Cancelled)
    }

    fn done(&self) -> Option<&T> {
        match self {
            Slot::Done(value) => Some(value),
            _ => None,
        }
    }
}

struct PendingLayer {
    a: Slot<VideoUnit>,
    a_options: OptionsMap,
    b: Option<(Slot<VideoUnit>, OptionsMap)>,
    transition: Transition,
    transition_progress: f32,
}

impl PendingLayer {
    fn slots_mut(&mut self) -> impl Iterator<Item = &mut Slot<VideoUnit>> {
        std::iter::once(&mut self.a).chain(self.b.as_mut().map(|(slot, _)| slot))
    }

    fn slots(&self) -> impl Iterator<Item = &Slot<VideoUnit>> {
        std::iter::once(&self.a).chain(self.b.as_ref().map(|(slot, _)| slot))
    }

    fn assemble(&self) -> Option<VideoLayer> {
        let image = self.a.done()?.layers.first()?.image.clone();
        let (image_b, image_options_b) = match &self.b {
            Some((slot, options)) => (Some(slot.done()?.layers.first()?.image.clone()), options.clone()),
            None => (None, OptionsMap::new()),
        };
        Some(VideoLayer {
            image,
            image_options: self.a_options.clone(),
            image_b,
            image_options_b,
            transition: self.transition,
            transition_progress: self.transition_progress,
        })
    }
}

/// How a pending time ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Waiting,
    Done,
    Failed,
    Cancelled,
}

/// Combined outcome of a set of slots
fn outcome<'a, T: 'a>(slots: impl IntoIterator<Item = &'a Slot<T>>) -> Outcome {
    let mut waiting = false;
    let mut cancelled = false;
    for slot in slots {
        if slot.is_failed() {
            return Outcome::Failed;
        }
        waiting |= slot.is_waiting();
        cancelled |= slot.is_cancelled();
    }
    if cancelled {
        Outcome::Cancelled
    } else if waiting {
        Outcome::Waiting
    } else {
        Outcome::Done
    }
}

/// Decodes in flight for one timeline time
struct PendingVideo {
    time: TimePoint,
    layers: Vec<PendingLayer>,
}

impl PendingVideo {
    fn poll(&mut self) {
        self.layers.iter_mut().flat_map(|l| l.slots_mut()).for_each(Slot::poll);
    }

    fn wait_until(&mut self, deadline: Instant) {
        for slot in self.layers.iter_mut().flat_map(|l| l.slots_mut()) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            slot.wait(remaining);
        }
    }

    fn outcome(&self) -> Outcome {
        outcome(self.layers.iter().flat_map(|l| l.slots()))
    }

    fn assemble(&self) -> Option<VideoUnit> {
        let layers = self
            .layers
            .iter()
            .map(PendingLayer::assemble)
            .collect::<Option<Vec<_>>>()?;
        let size = self.layers.first()?.a.done()?.size;
        Some(VideoUnit {
            size,
            time: self.time,
            layers,
        })
    }
}

/// Decodes in flight for one timeline second of audio
struct PendingAudio {
    seconds: i64,
    slots: Vec<Slot<AudioUnit>>,
}

impl PendingAudio {
    fn poll(&mut self) {
        self.slots.iter_mut().for_each(Slot::poll);
    }

    fn outcome(&self) -> Outcome {
        outcome(&self.slots)
    }

    fn assemble(&self) -> Option<AudioUnit> {
        let mut layers = Vec::new();
        for slot in &self.slots {
            layers.extend(slot.done()?.layers.iter().cloned());
        }
        Some(AudioUnit {
            start_seconds: self.seconds as f64,
            layers,
        })
    }
}

/// Read-ahead scheduler for one timeline
pub struct Player {
    timeline: Arc<dyn Timeline>,
    registry: Arc<FormatRegistry>,
    caches: PlayerCaches,
    config: PlayerConfig,

    position: TimePoint,
    playback: Playback,
    speed: f64,

    pending_video: HashMap<CacheKey, PendingVideo>,
    pending_audio: HashMap<CacheKey, PendingAudio>,

    /// Keys this player published, with the time they hold
    resident_video: HashMap<CacheKey, TimePoint>,
    resident_audio: HashMap<CacheKey, i64>,

    /// Keys whose decode failed while inside the window
    failed_video: HashSet<CacheKey>,
    failed_audio: HashSet<CacheKey>,

    last_video: Option<Arc<VideoUnit>>,
}

impl Player {
    /// Create a player positioned at the start of `timeline`
    pub fn new(
        timeline: Arc<dyn Timeline>,
        registry: Arc<FormatRegistry>,
        caches: PlayerCaches,
        config: PlayerConfig,
    ) -> Self {
        let range = timeline.time_range();
        Self {
            position: range.start(),
            timeline,
            registry,
            caches,
            config,
            playback: Playback::Stop,
            speed: 1.0,
            pending_video: HashMap::new(),
            pending_audio: HashMap::new(),
            resident_video: HashMap::new(),
            resident_audio: HashMap::new(),
            failed_video: HashSet::new(),
            failed_audio: HashSet::new(),
            last_video: None,
        }
    }

    pub fn timeline(&self) -> &Arc<dyn Timeline> {
        &self.timeline
    }

    pub fn caches(&self) -> &PlayerCaches {
        &self.caches
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PlayerConfig) {
        self.config = config;
        self.tick();
    }

    pub fn position(&self) -> TimePoint {
        self.position
    }

    pub fn playback(&self) -> Playback {
        self.playback
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Move to `time`, clamped to the timeline and snapped to its frame rate
    pub fn seek(&mut self, time: TimePoint) {
        let range = self.timeline.time_range();
        let position = range.clamp(time).rescaled_to(range.start().rate());
        if !position.is_valid() {
            return;
        }
        log::trace!("Seek to {}", position);
        self.position = position;
        self.tick();
    }

    pub fn set_playback(&mut self, playback: Playback) {
        if playback != self.playback {
            log::debug!("Playback {:?} -> {:?}", self.playback, playback);
            self.playback = playback;
            self.tick();
        }
    }

    /// Set the playback speed multiplier; non-finite or zero values are ignored
    pub fn set_speed(&mut self, speed: f64) {
        if speed.is_finite() && speed != 0.0 {
            self.speed = speed.abs();
            self.tick();
        }
    }

    /// Step one window step in the playback direction. Does nothing while
    /// stopped or at the end of the timeline.
    pub fn advance(&mut self) -> TimePoint {
        if self.playback != Playback::Stop {
            let step = frame_step(self.speed) * self.playback.direction();
            self.seek(self.position.offset(step));
        }
        self.position
    }

    /// Collect finished decodes, then refresh the read-ahead window
    pub fn tick(&mut self) {
        self.harvest();
        self.reconcile();
    }

    /// Unit for the current position, if cached.
    ///
    /// With `hold_last_frame` the last unit shown is returned while the
    /// current one is missing.
    pub fn current_video(&mut self) -> Option<Arc<VideoUnit>> {
        let layers = self.timeline.video_layers(self.position);
        if !layers.is_empty() {
            if let Some(unit) = self.caches.video.get(&video_key(&layers)) {
                self.last_video = Some(unit.clone());
                return Some(unit);
            }
        }
        if self.config.hold_last_frame {
            self.last_video.clone()
        } else {
            None
        }
    }

    /// Like [`Player::current_video`], but waits up to `timeout` for the
    /// current unit to finish decoding.
    pub fn wait_current_video(&mut self, timeout: Duration) -> Option<Arc<VideoUnit>> {
        let deadline = Instant::now() + timeout;
        let layers = self.timeline.video_layers(self.position);
        if !layers.is_empty() {
            let key = video_key(&layers);
            if !self.caches.video.contains(&key) {
                if !self.pending_video.contains_key(&key) {
                    self.reconcile();
                }
                if let Some(pending) = self.pending_video.get_mut(&key) {
                    pending.wait_until(deadline);
                }
                self.harvest();
            }
        }
        self.current_video()
    }

    /// Audio for the second containing the current position, if cached
    pub fn current_audio(&self) -> Option<Arc<AudioUnit>> {
        let sources = self.timeline.audio_sources(self.position.floor_seconds());
        if sources.is_empty() {
            return None;
        }
        self.caches.audio.get(&audio_key(&sources))
    }

    /// Timeline times this player holds in the video cache, sorted
    pub fn cached_video_times(&self) -> Vec<TimePoint> {
        let mut times: Vec<TimePoint> = self
            .resident_video
            .iter()
            .filter(|(key, _)| self.caches.video.contains(key))
            .map(|(_, time)| *time)
            .collect();
        times.sort();
        times
    }

    /// Audio seconds this player holds in the audio cache, sorted
    pub fn cached_audio_seconds(&self) -> Vec<i64> {
        let mut seconds: Vec<i64> = self
            .resident_audio
            .iter()
            .filter(|(key, _)| self.caches.audio.contains(key))
            .map(|(_, s)| *s)
            .collect();
        seconds.sort_unstable();
        seconds
    }

    /// Video cache fill level, percent of its capacity
    pub fn cache_percentage(&self) -> f32 {
        self.caches.video.percentage()
    }

    /// Video times still being decoded
    pub fn pending_video_count(&self) -> usize {
        self.pending_video.len()
    }

    pub fn pending_audio_count(&self) -> usize {
        self.pending_audio.len()
    }

    /// Media info for a source, from the info cache or its reader.
    ///
    /// Blocks until the reader answers.
    pub fn media_info(&self, path: &MediaPath, init_options: &OptionsMap) -> Result<Arc<MediaInfo>> {
        let key = info_cache_key(path, init_options, &OptionsMap::new());
        if let Some(info) = self.caches.info.get(&key) {
            return Ok(info);
        }
        let handle = self
            .caches
            .readers
            .get_or_open(path, init_options, &self.registry)?;
        let info = Arc::new(handle.request_info().wait()?);
        self.caches.info.add(key, info.clone());
        Ok(info)
    }

    /// Discard every pending request and cancel queued work on all readers
    pub fn cancel_all(&mut self) {
        self.pending_video.clear();
        self.pending_audio.clear();
        self.caches.readers.cancel_requests();
    }

    fn harvest(&mut self) {
        let finished: Vec<(CacheKey, Outcome)> = self
            .pending_video
            .iter_mut()
            .filter_map(|(key, pending)| {
                pending.poll();
                let outcome = pending.outcome();
                (outcome != Outcome::Waiting).then(|| (key.clone(), outcome))
            })
            .collect();
        for (key, outcome) in finished {
            let Some(pending) = self.pending_video.remove(&key) else { continue };
            match (outcome, pending.assemble()) {
                (Outcome::Done, Some(unit)) => self.publish_video(key, pending.time, unit),
                (Outcome::Cancelled, _) => {}
                _ => {
                    log::debug!("No video for {}", pending.time);
                    self.failed_video.insert(key);
                }
            }
        }

        let finished: Vec<(CacheKey, Outcome)> = self
            .pending_audio
            .iter_mut()
            .filter_map(|(key, pending)| {
                pending.poll();
                let outcome = pending.outcome();
                (outcome != Outcome::Waiting).then(|| (key.clone(), outcome))
            })
            .collect();
        for (key, outcome) in finished {
            let Some(pending) = self.pending_audio.remove(&key) else { continue };
            match (outcome, pending.assemble()) {
                (Outcome::Done, Some(unit)) => self.publish_audio(key, pending.seconds, unit),
                (Outcome::Cancelled, _) => {}
                _ => {
                    log::debug!("No audio for second {}", pending.seconds);
                    self.failed_audio.insert(key);
                }
            }
        }
    }

    fn publish_video(&mut self, key: CacheKey, time: TimePoint, unit: VideoUnit) {
        for (evicted, _) in self.caches.video.add(key.clone(), Arc::new(unit)) {
            self.resident_video.remove(&evicted);
        }
        if self.caches.video.contains(&key) {
            self.resident_video.insert(key, time);
        }
    }

    fn publish_audio(&mut self, key: CacheKey, seconds: i64, unit: AudioUnit) {
        for (evicted, _) in self.caches.audio.add(key.clone(), Arc::new(unit)) {
            self.resident_audio.remove(&evicted);
        }
        if self.caches.audio.contains(&key) {
            self.resident_audio.insert(key, seconds);
        }
    }

    fn reconcile(&mut self) {
        let range = self.timeline.time_range();

        let times = video_window(
            self.position,
            self.playback,
            self.speed,
            self.config.read_ahead,
            self.config.read_behind,
            range,
        );
        let mut wanted = HashSet::new();
        for time in times {
            let layers = self.timeline.video_layers(time);
            if layers.is_empty() {
                continue;
            }
            let key = video_key(&layers);
            if !self.caches.video.contains(&key)
                && !self.pending_video.contains_key(&key)
                && !self.failed_video.contains(&key)
            {
                if let Some(pending) = self.submit_video(time, &layers) {
                    self.pending_video.insert(key.clone(), pending);
                }
            }
            wanted.insert(key);
        }
        self.pending_video.retain(|key, _| wanted.contains(key));
        self.failed_video.retain(|key| wanted.contains(key));
        let stale: Vec<CacheKey> = self
            .resident_video
            .keys()
            .filter(|key| !wanted.contains(*key))
            .cloned()
            .collect();
        for key in &stale {
            self.resident_video.remove(key);
            self.caches.video.remove(key);
        }

        let seconds = audio_window(
            self.position,
            self.playback,
            self.config.audio_read_ahead_seconds,
            self.config.audio_read_behind_seconds,
            range,
        );
        let mut wanted_audio = HashSet::new();
        for s in seconds {
            let sources = self.timeline.audio_sources(s);
            if sources.is_empty() {
                continue;
            }
            let key = audio_key(&sources);
            if !self.caches.audio.contains(&key)
                && !self.pending_audio.contains_key(&key)
                && !self.failed_audio.contains(&key)
            {
                if let Some(pending) = self.submit_audio(s, &sources) {
                    self.pending_audio.insert(key.clone(), pending);
                }
            }
            wanted_audio.insert(key);
        }
        self.pending_audio.retain(|key, _| wanted_audio.contains(key));
        self.failed_audio.retain(|key| wanted_audio.contains(key));
        let stale_audio: Vec<CacheKey> = self
            .resident_audio
            .keys()
            .filter(|key| !wanted_audio.contains(*key))
            .cloned()
            .collect();
        for key in &stale_audio {
            self.resident_audio.remove(key);
            self.caches.audio.remove(key);
        }

        log::trace!(
            "Window at {}: {} video pending, {} audio pending, {} video evicted",
            self.position,
            self.pending_video.len(),
            self.pending_audio.len(),
            stale.len()
        );
    }

    fn request_source(&self, source: &LayerSource) -> Option<Slot<VideoUnit>> {
        match self
            .caches
            .readers
            .get_or_open(&source.path, &source.init_options, &self.registry)
        {
            Ok(handle) => Some(Slot::Waiting(
                handle.request_video(source.time, &source.request_options),
            )),
            Err(e) => {
                log::warn!("Cannot read {}: {}", source.path, e);
                None
            }
        }
    }

    fn submit_video(&self, time: TimePoint, layers: &[LayerRequest]) -> Option<PendingVideo> {
        let mut pending = Vec::with_capacity(layers.len());
        for layer in layers {
            let a = self.request_source(&layer.a)?;
            let b = match &layer.b {
                Some(source) => Some((self.request_source(source)?, source.request_options.clone())),
                None => None,
            };
            pending.push(PendingLayer {
                a,
                a_options: layer.a.request_options.clone(),
                b,
                transition: layer.transition,
                transition_progress: layer.transition_progress,
            });
        }
        Some(PendingVideo {
            time,
            layers: pending,
        })
    }

    fn submit_audio(&self, seconds: i64, sources: &[AudioSource]) -> Option<PendingAudio> {
        let mut slots = Vec::with_capacity(sources.len());
        for source in sources {
            let handle = match self
                .caches
                .readers
                .get_or_open(&source.path, &source.init_options, &self.registry)
            {
                Ok(handle) => handle,
                Err(e) => {
                    log::warn!("Cannot read audio from {}: {}", source.path, e);
                    return None;
                }
            };
            slots.push(Slot::Waiting(
                handle.request_audio(source.range, &source.request_options),
            ));
        }
        Some(PendingAudio { seconds, slots })
    }
}
