//! Shared handle to an opened reader and its worker

use std::fmt;
use std::sync::Arc;

use crate::decoder::{FormatRegistry, MediaInfo, Reader};
use crate::error::Result;
use crate::options::OptionsMap;
use crate::path::MediaPath;
use crate::threading::{Request, Worker, WorkerState};
use crate::time::{TimePoint, TimeRange};
use crate::unit::{AudioUnit, VideoUnit};

struct Inner {
    path: MediaPath,
    init_options: OptionsMap,
    worker: Worker,
}

/// Cloneable handle to one opened source
///
/// Clones share the same worker. The worker stops when the last clone is
/// dropped or when [`ReaderHandle::stop`] is called.
#[derive(Clone)]
pub struct ReaderHandle {
    inner: Arc<Inner>,
}

impl ReaderHandle {
    /// Open `path` through `registry` and start its worker.
    ///
    /// Opening runs on the calling thread; open errors are returned here
    /// rather than through a request.
    pub fn open(registry: &FormatRegistry, path: &MediaPath, init_options: &OptionsMap) -> Result<Self> {
        let reader = registry.open(path, init_options).map_err(|e| {
            log::warn!("Failed to open {}: {}", path, e);
            e
        })?;
        Self::from_reader(path.clone(), init_options.clone(), reader)
    }

    /// Wrap an already opened reader
    pub fn from_reader(path: MediaPath, init_options: OptionsMap, reader: Box<dyn Reader>) -> Result<Self> {
        let worker = Worker::spawn(path.to_string(), reader)?;
        log::info!("Opened reader: {}", path);
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                init_options,
                worker,
            }),
        })
    }

    pub fn path(&self) -> &MediaPath {
        &self.inner.path
    }

    /// Options the reader was opened with
    pub fn init_options(&self) -> &OptionsMap {
        &self.inner.init_options
    }

    pub fn request_info(&self) -> Request<MediaInfo> {
        self.inner.worker.request_info()
    }

    pub fn request_video(&self, time: TimePoint, options: &OptionsMap) -> Request<VideoUnit> {
        self.inner.worker.request_video(time, options.clone())
    }

    pub fn request_audio(&self, range: TimeRange, options: &OptionsMap) -> Request<AudioUnit> {
        self.inner.worker.request_audio(range, options.clone())
    }

    /// Cancel every queued request on this reader
    pub fn cancel_pending(&self) -> usize {
        self.inner.worker.cancel_pending()
    }

    /// Release the reader; queued requests fail with `WorkerStopped`
    pub fn stop(&self) {
        self.inner.worker.stop();
    }

    pub fn state(&self) -> WorkerState {
        self.inner.worker.state()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.worker.is_stopped()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.worker.pending_count()
    }

    /// Whether both handles share one worker
    pub fn same_reader(&self, other: &ReaderHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ReaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderHandle")
            .field("path", &self.inner.path)
            .field("init_options", &self.inner.init_options)
            .field("state", &self.state())
            .finish()
    }
}
