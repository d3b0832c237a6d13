//! Error types for readahead-core

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::time::TimePoint;

/// Result type alias for readahead-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for reader, worker and cache operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Permission denied while opening a source
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// No registered reader handles this source
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Source is recognised but malformed
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Codec not supported
    #[error("Codec not supported: {0}")]
    CodecNotSupported(String),

    /// Decode error
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Seek error
    #[error("Seek failed at {0}")]
    SeekFailed(TimePoint),

    /// Stream ended before the requested data
    #[error("Truncated stream: {0}")]
    TruncatedStream(String),

    /// Request drained from a worker queue before it ran
    #[error("Request cancelled")]
    Cancelled,

    /// Worker exited; the request can never complete
    #[error("Worker stopped")]
    WorkerStopped,

    /// A reader panicked inside its worker thread
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Channel error
    #[error("Channel error: {0}")]
    Channel(String),
}

impl Error {
    /// Map an IO error raised while opening `path` to the matching open error
    pub fn from_io(path: &Path, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied(path.to_path_buf()),
            _ => Error::Io(format!("{}: {}", path.display(), e)),
        }
    }

    /// Raised while opening a reader
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            Error::FileNotFound(_)
                | Error::PermissionDenied(_)
                | Error::UnsupportedFormat(_)
                | Error::InvalidFormat(_)
                | Error::CodecNotSupported(_)
        )
    }

    /// Raised while decoding; the player treats these as "no data for this time"
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::DecodeFailed(_)
                | Error::SeekFailed(_)
                | Error::TruncatedStream(_)
                | Error::WorkerPanicked(_)
        )
    }

    /// The request was discarded rather than attempted
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled | Error::WorkerStopped)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<crossbeam_channel::RecvError> for Error {
    fn from(e: crossbeam_channel::RecvError) -> Self {
        Error::Channel(e.to_string())
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for Error {
    fn from(e: crossbeam_channel::SendError<T>) -> Self {
        Error::Channel(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_mapping() {
        let path = Path::new("/missing/clip.mov");
        let err = Error::from_io(path, std::io::Error::from(std::io::ErrorKind::NotFound));
        assert!(matches!(err, Error::FileNotFound(ref p) if p == path));
        assert!(err.is_open_error());

        let err = Error::from_io(
            path,
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn test_classification() {
        assert!(Error::DecodeFailed("bad frame".into()).is_decode_error());
        assert!(!Error::DecodeFailed("bad frame".into()).is_open_error());
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::WorkerStopped.is_cancelled());
        assert!(!Error::Cancelled.is_decode_error());
        assert!(Error::UnsupportedFormat("xyz".into()).is_open_error());
    }

    #[test]
    fn test_display() {
        let err = Error::SeekFailed(TimePoint::new(48, 24));
        assert_eq!(err.to_string(), "Seek failed at 48/24");
    }
}
