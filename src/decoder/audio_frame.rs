//! Decoded audio buffer type

/// Decoded audio samples
#[derive(Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved audio sample data
    /// Format: [L0, R0, L1, R1, ...] for stereo
    pub data: Vec<f32>,

    /// Number of audio channels
    pub channels: u32,

    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new audio buffer
    pub fn new(data: Vec<f32>, channels: u32, sample_rate: u32) -> Self {
        Self {
            data,
            channels,
            sample_rate,
        }
    }

    /// Silent buffer holding `sample_count` samples per channel
    pub fn silence(sample_count: usize, channels: u32, sample_rate: u32) -> Self {
        Self::new(vec![0.0; sample_count * channels as usize], channels, sample_rate)
    }

    /// Number of samples per channel
    pub fn sample_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.data.len() / self.channels as usize
    }

    /// Get data size in bytes
    pub fn data_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f64 / self.sample_rate as f64
    }
}

impl std::fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("sample_count", &self.sample_count())
            .finish()
    }
}
