//! Scripted in-memory readers for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use super::{AudioBuffer, Image, MediaInfo, PixelFormat, Reader, ReaderPlugin};
use crate::error::{Error, Result};
use crate::options::OptionsMap;
use crate::path::MediaPath;
use crate::time::{TimePoint, TimeRange};
use crate::unit::{AudioUnit, VideoUnit};

/// Shared behaviour for every reader opened from one plugin
#[derive(Clone, Default)]
pub(crate) struct Script {
    /// Video times decoded, in call order
    pub video_log: Arc<Mutex<Vec<TimePoint>>>,
    /// Audio ranges decoded, in call order
    pub audio_log: Arc<Mutex<Vec<TimeRange>>>,
    /// Each decode blocks for one token when set
    pub gate: Option<Receiver<()>>,
    /// Receives the time of each video decode as it starts
    pub started: Option<Sender<TimePoint>>,
    pub fail_at: Vec<TimePoint>,
    pub panic_at: Vec<TimePoint>,
    pub fail_open: bool,
}

impl Script {
    /// Script whose decodes wait on the returned gate sender
    pub fn gated() -> (Self, Sender<()>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let script = Self {
            gate: Some(rx),
            ..Self::default()
        };
        (script, tx)
    }

    pub fn decoded_video(&self) -> Vec<TimePoint> {
        self.video_log.lock().clone()
    }

    pub fn decoded_audio(&self) -> Vec<TimeRange> {
        self.audio_log.lock().clone()
    }

    fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            // A dropped sender opens the gate for good
            let _ = gate.recv();
        }
    }
}

pub(crate) struct ScriptedReader {
    script: Script,
}

impl ScriptedReader {
    pub fn new(script: Script) -> Self {
        Self { script }
    }
}

impl Reader for ScriptedReader {
    fn info(&mut self) -> Result<MediaInfo> {
        Ok(MediaInfo {
            video_time: TimeRange::new(TimePoint::new(0, 24), TimePoint::new(240, 24)),
            audio_time: TimeRange::new(TimePoint::new(0, 1), TimePoint::new(10, 1)),
            container_format: "scripted".to_string(),
            ..Default::default()
        })
    }

    fn decode_video(&mut self, time: TimePoint, _options: &OptionsMap) -> Result<VideoUnit> {
        if let Some(started) = &self.script.started {
            let _ = started.send(time);
        }
        self.script.wait_gate();
        self.script.video_log.lock().push(time);
        if self.script.panic_at.contains(&time) {
            panic!("scripted panic at {}", time);
        }
        if self.script.fail_at.contains(&time) {
            return Err(Error::DecodeFailed(format!("scripted failure at {}", time)));
        }
        Ok(VideoUnit::single(time, Image::blank(2, 2, PixelFormat::Bgra)))
    }

    fn decode_audio(&mut self, range: TimeRange, _options: &OptionsMap) -> Result<AudioUnit> {
        self.script.wait_gate();
        self.script.audio_log.lock().push(range);
        Ok(AudioUnit::single(
            range.start().seconds(),
            AudioBuffer::silence(480, 2, 48000),
        ))
    }
}

/// Plugin for `.test` files and in-memory blobs starting with `SCRIPTED`
pub(crate) struct ScriptedPlugin {
    script: Script,
    opens: AtomicUsize,
}

impl ScriptedPlugin {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            opens: AtomicUsize::new(0),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl ReaderPlugin for ScriptedPlugin {
    fn name(&self) -> &str {
        "scripted"
    }

    fn extensions(&self) -> &[&str] {
        &["test"]
    }

    fn can_read(&self, path: &MediaPath) -> bool {
        path.bytes().is_some_and(|b| b.starts_with(b"SCRIPTED"))
    }

    fn open(&self, path: &MediaPath, _init_options: &OptionsMap) -> Result<Box<dyn Reader>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_open {
            return Err(Error::InvalidFormat(path.to_string()));
        }
        Ok(Box::new(ScriptedReader::new(self.script.clone())))
    }
}
