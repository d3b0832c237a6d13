//! readahead-core - read-ahead decoding for timeline playback
//!
//! This crate keeps decoded frames and audio ready around a playback position:
//! - Bounded LRU caches keyed by source, time and options
//! - A pool of open readers, each with its own decode worker thread
//! - Cancellable requests that resolve later
//! - A player that keeps a read-ahead window filled as the position moves
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │           Player Module              │
//! │  (windows, timeline, reconcile)      │
//! └─────────────────────────────────────┘
//!          │                    │
//!          ▼                    ▼
//! ┌──────────────────┐ ┌────────────────┐
//! │   Cache Module   │ │  Reader Pool   │
//! │  (LRU + keys)    │ │ (LRU of reader │
//! └──────────────────┘ │    handles)    │
//!                      └────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────┐
//! │        Threading Module              │
//! │  (one decode worker per reader)      │
//! └─────────────────────────────────────┘
//!                  │
//!                  ▼
//! ┌─────────────────────────────────────┐
//! │         Decoder Module               │
//! │  (format registry, ffmpeg-next)      │
//! └─────────────────────────────────────┘
//! ```

pub mod cache;
pub mod decoder;
pub mod error;
pub mod options;
pub mod path;
pub mod player;
pub mod pool;
pub mod reader;
pub mod threading;
pub mod time;
pub mod unit;

// Re-export main types
pub use cache::{CacheConfig, CacheKey, CacheStatistics, LruCache};
pub use decoder::{
    AudioBuffer, DecoderConfig, FormatRegistry, Image, MediaInfo, PixelFormat, Reader,
    ReaderPlugin,
};
pub use error::{Error, Result};
pub use options::OptionsMap;
pub use path::MediaPath;
pub use player::{Player, PlayerCaches, PlayerConfig, Playback, SingleMedia, Timeline};
pub use pool::ReaderPool;
pub use reader::ReaderHandle;
pub use threading::{Request, WorkerState};
pub use time::{TimePoint, TimeRange};
pub use unit::{AudioUnit, VideoUnit};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging (call once at startup)
pub fn init() {
    // Info level by default if RUST_LOG is not set
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    log::info!("readahead-core {} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init();
        init();
        assert!(!VERSION.is_empty());
    }
}
