//! Per-reader worker threads
//!
//! Every opened reader is owned by one [`Worker`] thread. Requests are
//! queued FIFO and executed one at a time against the reader, so a reader
//! never sees concurrent calls. Each request resolves exactly once: with
//! the decode result, with `Cancelled` if drained before it started, or
//! with `WorkerStopped` if the worker exits first.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::atomic::AtomicCell;
use parking_lot::{Condvar, Mutex};

use crate::decoder::{MediaInfo, Reader};
use crate::error::{Error, Result};
use crate::options::OptionsMap;
use crate::time::{TimePoint, TimeRange};
use crate::unit::{AudioUnit, VideoUnit};

mod request;

pub use request::Request;
use request::Promise;

/// Lifecycle of a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for requests
    Idle,
    /// Executing a request
    Running,
    /// Exited; no further requests will run
    Stopped,
}

/// Queued unit of work
enum Job {
    Info {
        promise: Promise<MediaInfo>,
    },
    Video {
        time: TimePoint,
        options: OptionsMap,
        promise: Promise<VideoUnit>,
    },
    Audio {
        range: TimeRange,
        options: OptionsMap,
        promise: Promise<AudioUnit>,
    },
}

impl Job {
    /// Resolve without running
    fn fail(self, error: Error) {
        match self {
            Job::Info { promise } => promise.fulfill(Err(error)),
            Job::Video { promise, .. } => promise.fulfill(Err(error)),
            Job::Audio { promise, .. } => promise.fulfill(Err(error)),
        };
    }

    fn is_cancelled(&self) -> bool {
        match self {
            Job::Info { promise } => promise.is_cancelled(),
            Job::Video { promise, .. } => promise.is_cancelled(),
            Job::Audio { promise, .. } => promise.is_cancelled(),
        }
    }

    /// Run against the reader. Returns false if the reader panicked.
    fn run(self, reader: &mut dyn Reader, label: &str) -> bool {
        match self {
            Job::Info { promise } => {
                let result = guarded(|| reader.info());
                let ok = !is_panic(&result);
                promise.fulfill(result);
                ok
            }
            Job::Video {
                time,
                options,
                promise,
            } => {
                let result = guarded(|| reader.decode_video(time, &options));
                if let Err(e) = &result {
                    log::warn!("{}: video decode at {} failed: {}", label, time, e);
                }
                let ok = !is_panic(&result);
                promise.fulfill(result);
                ok
            }
            Job::Audio {
                range,
                options,
                promise,
            } => {
                let result = guarded(|| reader.decode_audio(range, &options));
                if let Err(e) = &result {
                    log::warn!("{}: audio decode at {} failed: {}", label, range, e);
                }
                let ok = !is_panic(&result);
                promise.fulfill(result);
                ok
            }
        }
    }
}

/// Run a reader call, turning a panic into `WorkerPanicked`
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(Error::WorkerPanicked(message))
    })
}

fn is_panic<T>(result: &Result<T>) -> bool {
    matches!(result, Err(Error::WorkerPanicked(_)))
}

struct Queue {
    jobs: VecDeque<Job>,
    stop: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    cond: Condvar,
    state: AtomicCell<WorkerState>,
    label: String,
}

impl Shared {
    /// Mark stopped and take every queued job
    fn shut(&self) -> Vec<Job> {
        let mut queue = self.queue.lock();
        queue.stop = true;
        self.cond.notify_all();
        queue.jobs.drain(..).collect()
    }
}

/// Thread owning one reader and serving its request queue
pub struct Worker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker that takes ownership of `reader`
    pub fn spawn(label: impl Into<String>, reader: Box<dyn Reader>) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                stop: false,
            }),
            cond: Condvar::new(),
            state: AtomicCell::new(WorkerState::Idle),
            label: label.into(),
        });

        let thread_shared = shared.clone();
        let thread = thread::Builder::new()
            .name(format!("reader-{}", shared.label))
            .spawn(move || Self::worker_loop(thread_shared, reader))?;

        log::debug!("Worker started: {}", shared.label);
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Queue a media info request
    pub fn request_info(&self) -> Request<MediaInfo> {
        let (promise, request) = request::channel();
        self.submit(Job::Info { promise });
        request
    }

    /// Queue a video decode at `time`
    pub fn request_video(&self, time: TimePoint, options: OptionsMap) -> Request<VideoUnit> {
        let (promise, request) = request::channel();
        self.submit(Job::Video {
            time,
            options,
            promise,
        });
        request
    }

    /// Queue an audio decode covering `range`
    pub fn request_audio(&self, range: TimeRange, options: OptionsMap) -> Request<AudioUnit> {
        let (promise, request) = request::channel();
        self.submit(Job::Audio {
            range,
            options,
            promise,
        });
        request
    }

    fn submit(&self, job: Job) {
        let mut queue = self.shared.queue.lock();
        if queue.stop {
            drop(queue);
            job.fail(Error::WorkerStopped);
            return;
        }
        queue.jobs.push_back(job);
        self.shared.cond.notify_one();
    }

    /// Resolve every queued request with `Cancelled`.
    ///
    /// Does not wait for, or interrupt, the request currently running.
    /// Returns the number of requests cancelled.
    pub fn cancel_pending(&self) -> usize {
        let drained: Vec<Job> = self.shared.queue.lock().jobs.drain(..).collect();
        let count = drained.len();
        for job in drained {
            job.fail(Error::Cancelled);
        }
        if count > 0 {
            log::debug!("{}: cancelled {} pending requests", self.shared.label, count);
        }
        count
    }

    /// Stop accepting requests and let the thread exit.
    ///
    /// Queued requests resolve with `WorkerStopped`. Never blocks on the
    /// request currently running.
    pub fn stop(&self) {
        for job in self.shared.shut() {
            job.fail(Error::WorkerStopped);
        }
    }

    /// Wait for the thread to exit after [`Worker::stop`]
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("{}: worker thread panicked", self.shared.label);
            }
        }
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state.load()
    }

    /// True once stop was requested, even if the thread is still finishing
    pub fn is_stopped(&self) -> bool {
        self.state() == WorkerState::Stopped || self.shared.queue.lock().stop
    }

    /// Requests queued and not yet started
    pub fn pending_count(&self) -> usize {
        self.shared.queue.lock().jobs.len()
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Worker thread main loop
    fn worker_loop(shared: Arc<Shared>, mut reader: Box<dyn Reader>) {
        loop {
            let job = {
                let mut queue = shared.queue.lock();
                loop {
                    if queue.stop {
                        break None;
                    }
                    if let Some(job) = queue.jobs.pop_front() {
                        shared.state.store(WorkerState::Running);
                        break Some(job);
                    }
                    shared.state.store(WorkerState::Idle);
                    shared.cond.wait(&mut queue);
                }
            };

            let Some(job) = job else { break };

            if job.is_cancelled() {
                log::trace!("{}: skipping dropped request", shared.label);
                job.fail(Error::Cancelled);
                continue;
            }

            if !job.run(reader.as_mut(), &shared.label) {
                log::error!("{}: reader panicked, stopping worker", shared.label);
                for job in shared.shut() {
                    job.fail(Error::WorkerStopped);
                }
                break;
            }
        }

        shared.state.store(WorkerState::Stopped);
        log::debug!("Worker stopped: {}", shared.label);
        // Reader is dropped here, on its own thread
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::testing::{Script, ScriptedReader};
    use std::time::{Duration, Instant};

    fn spawn(script: &Script) -> Worker {
        Worker::spawn("test", Box::new(ScriptedReader::new(script.clone()))).unwrap()
    }

    fn t(frame: i64) -> TimePoint {
        TimePoint::new(frame, 24)
    }

    fn wait_for_state(worker: &Worker, state: WorkerState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.state() != state {
            assert!(Instant::now() < deadline, "worker never reached {:?}", state);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_requests_run_in_fifo_order() {
        let script = Script::default();
        let worker = spawn(&script);
        let requests: Vec<_> = (0..5)
            .map(|i| worker.request_video(t(i), OptionsMap::new()))
            .collect();
        for (i, request) in requests.into_iter().enumerate() {
            let unit = request.wait().unwrap();
            assert_eq!(unit.time, t(i as i64));
        }
        assert_eq!(script.decoded_video(), (0..5).map(t).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel_before_start() {
        let (mut script, gate) = Script::gated();
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        script.started = Some(started_tx);
        let worker = spawn(&script);

        // Hold the worker inside t=0 so t=10 stays queued
        let first = worker.request_video(t(0), OptionsMap::new());
        assert_eq!(started_rx.recv().unwrap(), t(0));
        let queued = worker.request_video(t(10), OptionsMap::new());
        assert_eq!(worker.pending_count(), 1);

        assert_eq!(worker.cancel_pending(), 1);
        assert!(matches!(queued.wait(), Err(Error::Cancelled)));

        gate.send(()).unwrap();
        assert!(first.wait().is_ok());
        assert_eq!(script.decoded_video(), vec![t(0)]);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let script = Script::default();
        let worker = spawn(&script);
        assert_eq!(worker.cancel_pending(), 0);
        assert_eq!(worker.cancel_pending(), 0);
        let unit = worker.request_video(t(3), OptionsMap::new()).wait().unwrap();
        assert_eq!(unit.time, t(3));
    }

    #[test]
    fn test_dropped_request_is_skipped() {
        let (mut script, gate) = Script::gated();
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        script.started = Some(started_tx);
        let worker = spawn(&script);

        let first = worker.request_video(t(0), OptionsMap::new());
        assert_eq!(started_rx.recv().unwrap(), t(0));
        drop(worker.request_video(t(1), OptionsMap::new()));
        let last = worker.request_video(t(2), OptionsMap::new());

        gate.send(()).unwrap();
        gate.send(()).unwrap();
        assert!(first.wait().is_ok());
        assert_eq!(last.wait().unwrap().time, t(2));
        assert_eq!(script.decoded_video(), vec![t(0), t(2)]);
    }

    #[test]
    fn test_decode_error_keeps_worker_alive() {
        let script = Script {
            fail_at: vec![t(1)],
            ..Script::default()
        };
        let worker = spawn(&script);
        let err = worker.request_video(t(1), OptionsMap::new()).wait().unwrap_err();
        assert!(err.is_decode_error());
        assert_eq!(worker.request_video(t(2), OptionsMap::new()).wait().unwrap().time, t(2));
        assert!(!worker.is_stopped());
    }

    #[test]
    fn test_panic_is_confined() {
        let script = Script {
            panic_at: vec![t(1)],
            ..Script::default()
        };
        let mut worker = spawn(&script);
        let err = worker.request_video(t(1), OptionsMap::new()).wait().unwrap_err();
        assert!(matches!(err, Error::WorkerPanicked(_)));

        worker.join();
        assert!(worker.is_stopped());
        let after = worker.request_video(t(2), OptionsMap::new()).wait();
        assert!(matches!(after, Err(Error::WorkerStopped)));
    }

    #[test]
    fn test_stop_fails_queued_requests() {
        let (mut script, gate) = Script::gated();
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        script.started = Some(started_tx);
        let mut worker = spawn(&script);

        let running = worker.request_video(t(0), OptionsMap::new());
        assert_eq!(started_rx.recv().unwrap(), t(0));
        let queued = worker.request_video(t(1), OptionsMap::new());

        worker.stop();
        assert!(matches!(queued.wait(), Err(Error::WorkerStopped)));

        // The running decode still completes and is delivered
        gate.send(()).unwrap();
        assert!(running.wait().is_ok());
        worker.join();
        assert!(worker.is_stopped());
    }

    #[test]
    fn test_info_and_audio() {
        let script = Script::default();
        let worker = spawn(&script);
        let info = worker.request_info().wait().unwrap();
        assert_eq!(info.container_format, "scripted");

        let audio = worker
            .request_audio(TimeRange::whole_second(2), OptionsMap::new())
            .wait()
            .unwrap();
        assert_eq!(audio.start_seconds, 2.0);
        assert_eq!(script.decoded_audio(), vec![TimeRange::whole_second(2)]);
        wait_for_state(&worker, WorkerState::Idle);
    }
}
