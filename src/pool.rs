//! Bounded pool of open readers
//!
//! Opening a source is expensive, so readers are kept open in an LRU keyed
//! by [`MediaPath`]. A reader evicted from the pool has its queued requests
//! cancelled and its worker stopped. Eviction work happens after the pool's
//! lock is released, so a slow reader never blocks other pool users.

use parking_lot::Mutex;

use crate::cache::{CacheStatistics, LruCache};
use crate::decoder::FormatRegistry;
use crate::error::Result;
use crate::options::OptionsMap;
use crate::path::MediaPath;
use crate::reader::ReaderHandle;

/// Default number of readers kept open
pub const DEFAULT_READER_MAX: usize = 16;

/// LRU of open readers keyed by source path
pub struct ReaderPool {
    readers: LruCache<MediaPath, ReaderHandle>,

    /// Serializes opens so concurrent misses on one path open it once
    open_lock: Mutex<()>,
}

impl ReaderPool {
    /// Create a pool holding at most `max` readers
    pub fn new(max: usize) -> Self {
        Self {
            readers: LruCache::new(max),
            open_lock: Mutex::new(()),
        }
    }

    /// Reader for `path`, refreshing its recency
    pub fn get(&self, path: &MediaPath) -> Option<ReaderHandle> {
        self.readers.get(path)
    }

    pub fn contains(&self, path: &MediaPath) -> bool {
        self.readers.contains(path)
    }

    /// Insert a reader, releasing whatever it displaces
    pub fn add(&self, path: MediaPath, handle: ReaderHandle) {
        let replaced = self
            .readers
            .remove(&path)
            .filter(|old| !old.same_reader(&handle));
        let evicted = self.readers.add(path, handle);

        if let Some(old) = replaced {
            Self::release(&old);
        }
        for (path, handle) in evicted {
            log::debug!("Evicting reader: {}", path);
            Self::release(&handle);
        }
    }

    /// Remove and release the reader for `path`
    pub fn remove(&self, path: &MediaPath) -> Option<ReaderHandle> {
        let handle = self.readers.remove(path)?;
        Self::release(&handle);
        Some(handle)
    }

    /// Reader for `path` opened with `init_options`, opening it on a miss.
    ///
    /// A pooled reader opened with different init options is replaced.
    /// Open failures are returned and never cached, so the next call tries
    /// again.
    pub fn get_or_open(
        &self,
        path: &MediaPath,
        init_options: &OptionsMap,
        registry: &FormatRegistry,
    ) -> Result<ReaderHandle> {
        if let Some(handle) = self.usable(path, init_options) {
            return Ok(handle);
        }

        let _guard = self.open_lock.lock();
        // Another caller may have opened it while we waited
        if let Some(handle) = self.usable(path, init_options) {
            return Ok(handle);
        }
        let handle = ReaderHandle::open(registry, path, init_options)?;
        self.add(path.clone(), handle.clone());
        Ok(handle)
    }

    fn usable(&self, path: &MediaPath, init_options: &OptionsMap) -> Option<ReaderHandle> {
        self.get(path)
            .filter(|h| h.init_options() == init_options && !h.is_stopped())
    }

    /// Change capacity, releasing readers that no longer fit
    pub fn set_max(&self, max: usize) {
        for (path, handle) in self.readers.set_max(max) {
            log::debug!("Evicting reader: {}", path);
            Self::release(&handle);
        }
    }

    pub fn max(&self) -> usize {
        self.readers.max()
    }

    /// Number of open readers
    pub fn count(&self) -> usize {
        self.readers.count()
    }

    /// Cancel queued requests on every pooled reader. Readers stay open.
    pub fn cancel_requests(&self) -> usize {
        let total: usize = self
            .readers
            .values()
            .iter()
            .map(ReaderHandle::cancel_pending)
            .sum();
        if total > 0 {
            log::debug!("Cancelled {} pending requests across readers", total);
        }
        total
    }

    /// Release every reader
    pub fn clear(&self) {
        for (_, handle) in self.readers.clear() {
            Self::release(&handle);
        }
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.readers.statistics()
    }

    fn release(handle: &ReaderHandle) {
        handle.cancel_pending();
        handle.stop();
    }
}

impl Default for ReaderPool {
    fn default() -> Self {
        Self::new(DEFAULT_READER_MAX)
    }
}

impl Drop for ReaderPool {
    fn drop(&mut self) {
        self.clear();
    }
}
