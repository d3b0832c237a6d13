//! Deterministic cache keys
//!
//! A key is a canonical serialization of
//! `(kind, path, time or range, init options, request options)`.
//! Fields are separated by `;` and every free-form field is escaped, so no
//! two distinct requests can serialize to the same string. Times are written
//! in lowest terms, which keeps keys in agreement with exact rational time
//! equality: `24/24` and `48/48` produce the same key.

use std::fmt;

use crate::options::OptionsMap;
use crate::path::MediaPath;
use crate::time::{TimePoint, TimeRange};

/// Result kind a key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Info,
    Video,
    Audio,
    /// One layer: primary source, optional secondary source, transition
    Layer,
    /// Several video keys composited into one unit
    Composite,
}

impl CacheKind {
    fn tag(&self) -> &'static str {
        match self {
            CacheKind::Info => "info",
            CacheKind::Video => "video",
            CacheKind::Audio => "audio",
            CacheKind::Layer => "layer",
            CacheKind::Composite => "composite",
        }
    }
}

/// What a key is requested for: media info, a video time, or an audio range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheRequest {
    Info,
    Video(TimePoint),
    Audio(TimeRange),
}

impl CacheRequest {
    pub fn kind(&self) -> CacheKind {
        match self {
            CacheRequest::Info => CacheKind::Info,
            CacheRequest::Video(_) => CacheKind::Video,
            CacheRequest::Audio(_) => CacheKind::Audio,
        }
    }
}

/// Stable string identity of a decode request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Kind encoded in the key's leading tag
    pub fn kind(&self) -> Option<CacheKind> {
        let tag = self.0.split(';').next()?;
        let tag = tag.split('[').next()?;
        [
            CacheKind::Info,
            CacheKind::Video,
            CacheKind::Audio,
            CacheKind::Layer,
            CacheKind::Composite,
        ]
        .into_iter()
        .find(|k| k.tag() == tag)
    }

    /// Key for one composited layer.
    ///
    /// The secondary slot is always written, as `-` when empty, so a
    /// primary-only layer never aliases a layer with a secondary source.
    /// The transition name and progress are part of the key.
    pub fn layer(a: &CacheKey, b: Option<&CacheKey>, transition: &str, progress: f32) -> CacheKey {
        let b = b.map_or_else(|| "-".to_string(), |k| escape(k.as_str()));
        CacheKey(format!(
            "{}[{};{};{};{}]",
            CacheKind::Layer.tag(),
            escape(a.as_str()),
            b,
            escape(transition),
            progress
        ))
    }

    /// Combine the keys of every layer into one key.
    ///
    /// Order matters: layer A over layer B is a different composite than B
    /// over A. A single key still gets wrapped so a composite never aliases
    /// a plain video key.
    pub fn composite<'a, I>(keys: I) -> CacheKey
    where
        I: IntoIterator<Item = &'a CacheKey>,
    {
        let parts: Vec<String> = keys.into_iter().map(|k| escape(k.as_str())).collect();
        let mut out = format!("{}[{}]", CacheKind::Composite.tag(), parts.len());
        for part in parts {
            out.push(';');
            out.push_str(&part);
        }
        CacheKey(out)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | ';' | '=' | ',' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn time_field(time: &TimePoint) -> String {
    if time.is_valid() {
        let (value, rate) = time.reduced();
        format!("{}/{}", value, rate)
    } else {
        "invalid".to_string()
    }
}

fn range_field(range: &TimeRange) -> String {
    format!("{}+{}", time_field(&range.start()), time_field(&range.duration()))
}

fn options_field(options: &OptionsMap) -> String {
    options
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Build the key for any request kind
pub fn build_cache_key(
    request: &CacheRequest,
    path: &MediaPath,
    init_options: &OptionsMap,
    request_options: &OptionsMap,
) -> CacheKey {
    let time = match request {
        CacheRequest::Info => String::new(),
        CacheRequest::Video(time) => time_field(time),
        CacheRequest::Audio(range) => range_field(range),
    };
    CacheKey(format!(
        "{};{};{};{};{}",
        request.kind().tag(),
        escape(&path.identity()),
        time,
        options_field(init_options),
        options_field(request_options),
    ))
}

/// Key for a source's media info
pub fn info_cache_key(
    path: &MediaPath,
    init_options: &OptionsMap,
    request_options: &OptionsMap,
) -> CacheKey {
    build_cache_key(&CacheRequest::Info, path, init_options, request_options)
}

/// Key for one video unit at `time`
pub fn video_cache_key(
    path: &MediaPath,
    time: TimePoint,
    init_options: &OptionsMap,
    request_options: &OptionsMap,
) -> CacheKey {
    build_cache_key(&CacheRequest::Video(time), path, init_options, request_options)
}

/// Key for one audio unit covering `range`
pub fn audio_cache_key(
    path: &MediaPath,
    range: TimeRange,
    init_options: &OptionsMap,
    request_options: &OptionsMap,
) -> CacheKey {
    build_cache_key(&CacheRequest::Audio(range), path, init_options, request_options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn opts(pairs: &[(&str, &str)]) -> OptionsMap {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_deterministic() {
        let path = MediaPath::file("/media/shot.mov");
        let init = opts(&[("thread_count", "4")]);
        let req = opts(&[("layer", "beauty")]);
        let a = video_cache_key(&path, TimePoint::new(10, 24), &init, &req);
        let b = video_cache_key(&path, TimePoint::new(10, 24), &init, &req);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), b.as_str());
        assert_eq!(a.kind(), Some(CacheKind::Video));
    }

    #[test]
    fn test_option_order_is_canonical() {
        let path = MediaPath::file("/media/shot.mov");
        let mut first = OptionsMap::new();
        first.insert("b", "2");
        first.insert("a", "1");
        let mut second = OptionsMap::new();
        second.insert("a", "1");
        second.insert("b", "2");
        assert_eq!(
            info_cache_key(&path, &first, &OptionsMap::new()),
            info_cache_key(&path, &second, &OptionsMap::new())
        );
    }

    #[test]
    fn test_equal_rationals_share_key() {
        let path = MediaPath::file("a.mov");
        let none = OptionsMap::new();
        assert_eq!(
            video_cache_key(&path, TimePoint::new(24, 24), &none, &none),
            video_cache_key(&path, TimePoint::new(48, 48), &none, &none)
        );
    }

    #[test]
    fn test_every_field_changes_key() {
        let path = MediaPath::file("/media/shot.mov");
        let init = opts(&[("thread_count", "4")]);
        let req = opts(&[("layer", "beauty")]);
        let time = TimePoint::new(10, 24);
        let range = TimeRange::whole_second(0);

        let keys = vec![
            video_cache_key(&path, time, &init, &req),
            video_cache_key(&MediaPath::file("/media/shot2.mov"), time, &init, &req),
            video_cache_key(&path, TimePoint::new(11, 24), &init, &req),
            video_cache_key(&path, TimePoint::new(10001, 24000), &init, &req),
            video_cache_key(&path, time, &opts(&[("thread_count", "8")]), &req),
            video_cache_key(&path, time, &init, &opts(&[("layer", "depth")])),
            video_cache_key(&path, time, &init, &OptionsMap::new()),
            audio_cache_key(&path, range, &init, &req),
            info_cache_key(&path, &init, &req),
        ];
        let unique: HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn test_separators_cannot_collide() {
        let path = MediaPath::file("x.mov");
        let none = OptionsMap::new();
        let time = TimePoint::new(1, 24);

        // Same characters, different split between key and value
        let a = video_cache_key(&path, time, &opts(&[("a=b", "c")]), &none);
        let b = video_cache_key(&path, time, &opts(&[("a", "b=c")]), &none);
        assert_ne!(a, b);

        // Option text moved between init and request options
        let c = video_cache_key(&path, time, &opts(&[("a", "1;b=2")]), &none);
        let d = video_cache_key(&path, time, &opts(&[("a", "1")]), &opts(&[("b", "2")]));
        assert_ne!(c, d);

        // Two pairs versus one pair containing a comma
        let e = video_cache_key(&path, time, &opts(&[("a", "1"), ("b", "2")]), &none);
        let f = video_cache_key(&path, time, &opts(&[("a", "1,b=2")]), &none);
        assert_ne!(e, f);

        // A path that embeds a separator
        let g = video_cache_key(&MediaPath::file("x.mov;1/24"), time, &none, &none);
        let h = video_cache_key(&MediaPath::file("x.mov"), time, &none, &none);
        assert_ne!(g, h);
    }

    #[test]
    fn test_memory_sources() {
        let none = OptionsMap::new();
        let time = TimePoint::new(0, 1);
        let a = MediaPath::memory("clip.png", vec![0u8; 4]);
        let b = MediaPath::memory("clip.png", vec![1u8; 4]);
        assert_ne!(
            video_cache_key(&a, time, &none, &none),
            video_cache_key(&b, time, &none, &none)
        );
    }

    #[test]
    fn test_composite() {
        let none = OptionsMap::new();
        let a = video_cache_key(&MediaPath::file("a.mov"), TimePoint::new(1, 24), &none, &none);
        let b = video_cache_key(&MediaPath::file("b.mov"), TimePoint::new(1, 24), &none, &none);
        let b2 = video_cache_key(&MediaPath::file("b2.mov"), TimePoint::new(1, 24), &none, &none);

        let ab = CacheKey::composite([&a, &b]);
        assert_eq!(ab, CacheKey::composite([&a, &b]));
        assert_ne!(ab, CacheKey::composite([&b, &a]));
        assert_ne!(ab, CacheKey::composite([&a, &b2]));
        assert_ne!(CacheKey::composite([&a]), a);
        assert_eq!(ab.kind(), Some(CacheKind::Composite));
    }

    #[test]
    fn test_layer_keeps_slots_and_transition() {
        let a = video_cache_key(&MediaPath::file("a.mov"), TimePoint::new(3, 24), &opts(&[]), &opts(&[]));
        let b = video_cache_key(&MediaPath::file("b.mov"), TimePoint::new(3, 24), &opts(&[]), &opts(&[]));

        let stacked = CacheKey::composite([
            &CacheKey::layer(&a, None, "none", 0.0),
            &CacheKey::layer(&b, None, "none", 0.0),
        ]);
        let quarter = CacheKey::composite([&CacheKey::layer(&a, Some(&b), "dissolve", 0.25)]);
        let three_quarters = CacheKey::composite([&CacheKey::layer(&a, Some(&b), "dissolve", 0.75)]);
        let keys: HashSet<_> = [&stacked, &quarter, &three_quarters].into_iter().collect();
        assert_eq!(keys.len(), 3);

        assert_ne!(
            CacheKey::layer(&a, Some(&b), "dissolve", 0.5),
            CacheKey::layer(&a, Some(&b), "none", 0.5)
        );
        assert_eq!(CacheKey::layer(&a, None, "none", 0.0).kind(), Some(CacheKind::Layer));
    }
}
