//! One-shot request handles
//!
//! A [`Request`] is the caller's side of a single decode; the worker holds
//! the matching [`Promise`]. Dropping a request marks it cancelled: the
//! worker skips it if it has not started yet, and otherwise discards the
//! result when it finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{Error, Result};

/// Create a linked promise/request pair
pub(crate) fn channel<T>() -> (Promise<T>, Request<T>) {
    let (tx, rx) = bounded(1);
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        Promise {
            tx,
            cancelled: cancelled.clone(),
        },
        Request {
            rx,
            cancelled,
            result: None,
            taken: false,
        },
    )
}

/// Worker side of a request
pub(crate) struct Promise<T> {
    tx: Sender<Result<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> Promise<T> {
    /// Whether the caller has given up on this request
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Deliver the result. Returns false when the caller is gone.
    pub fn fulfill(self, result: Result<T>) -> bool {
        self.tx.send(result).is_ok()
    }
}

/// Pending result of a decode submitted to a worker
///
/// Resolves exactly once, to a value or an error. A request whose worker
/// exits without answering resolves to [`Error::WorkerStopped`]. Once the
/// result has been taken the request stays empty.
pub struct Request<T> {
    rx: Receiver<Result<T>>,
    cancelled: Arc<AtomicBool>,
    result: Option<Result<T>>,
    /// Result already handed out; the closed channel means nothing now
    taken: bool,
}

impl<T> Request<T> {
    /// Check for a result without blocking. False after the result is taken.
    pub fn poll(&mut self) -> bool {
        if self.taken {
            return false;
        }
        if self.result.is_none() {
            match self.rx.try_recv() {
                Ok(result) => self.result = Some(result),
                Err(TryRecvError::Disconnected) => self.result = Some(Err(Error::WorkerStopped)),
                Err(TryRecvError::Empty) => {}
            }
        }
        self.result.is_some()
    }

    /// Take the result if it has arrived
    pub fn try_take(&mut self) -> Option<Result<T>> {
        self.poll();
        let result = self.result.take();
        self.taken |= result.is_some();
        result
    }

    /// Block until the result arrives
    pub fn wait(mut self) -> Result<T> {
        if let Some(result) = self.result.take() {
            return result;
        }
        self.rx.recv().unwrap_or(Err(Error::WorkerStopped))
    }

    /// Block for at most `timeout`; `None` means still pending or already
    /// taken
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<Result<T>> {
        if self.taken {
            return None;
        }
        let result = match self.result.take() {
            Some(result) => Some(result),
            None => match self.rx.recv_timeout(timeout) {
                Ok(result) => Some(result),
                Err(RecvTimeoutError::Disconnected) => Some(Err(Error::WorkerStopped)),
                Err(RecvTimeoutError::Timeout) => None,
            },
        };
        self.taken |= result.is_some();
        result
    }

    /// Ask the worker to skip this request if it has not started
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl<T> Drop for Request<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl<T> std::fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("ready", &(self.result.is_some() || !self.rx.is_empty()))
            .field("cancelled", &self.cancelled.load(Ordering::Relaxed))
            .finish()
    }
}
