//! Decoded drum samples shared by every voice of a track.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Error loading a sample file.
#[derive(Debug)]
pub enum SampleError {
    Io(std::io::Error),
    Wav(hound::Error),
    /// The file decoded to zero frames.
    Empty,
}

impl From<std::io::Error> for SampleError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<hound::Error> for SampleError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => Self::Io(io),
            other => Self::Wav(other),
        }
    }
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Wav(e) => write!(f, "WAV error: {}", e),
            Self::Empty => write!(f, "sample contains no audio"),
        }
    }
}

impl std::error::Error for SampleError {}

/// Interleaved `f32` audio decoded once and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn from_samples(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Decode a PCM or float WAV file, normalizing integer samples to -1.0..1.0.
    pub fn load_wav(path: &Path) -> Result<Self, SampleError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };
        if samples.is_empty() {
            return Err(SampleError::Empty);
        }
        log::debug!(
            target: "audio::samples",
            "loaded {:?}: {} samples, {} ch @ {} Hz",
            path, samples.len(), spec.channels, spec.sample_rate
        );
        Ok(Self::from_samples(samples, spec.channels, spec.sample_rate))
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len_frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.len_frames() as f64 / self.sample_rate as f64)
    }
}

/// A named kit sound. The buffer is absent when loading failed, in which
/// case every voice built from the piece stays silent.
#[derive(Debug, Clone)]
pub struct DrumPiece {
    name: String,
    buffer: Option<Arc<SampleBuffer>>,
}

impl DrumPiece {
    pub fn new(name: impl Into<String>, buffer: SampleBuffer) -> Self {
        Self {
            name: name.into(),
            buffer: Some(Arc::new(buffer)),
        }
    }

    /// A piece with no audio.
    pub fn silent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: None,
        }
    }

    /// Load a piece from a WAV file. A load failure is logged and yields a
    /// silent piece rather than an error.
    pub fn load(name: impl Into<String>, path: &Path) -> Self {
        let name = name.into();
        match SampleBuffer::load_wav(path) {
            Ok(buffer) => Self::new(name, buffer),
            Err(e) => {
                log::warn!(target: "audio::samples", "could not load {} from {}: {}", name, path.display(), e);
                Self::silent(name)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> Option<&Arc<SampleBuffer>> {
        self.buffer.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.buffer.is_some()
    }
}
