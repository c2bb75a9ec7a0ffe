//! # drumloop-audio
//!
//! Playback side of the drumloop step sequencer: the device seam, per-step
//! voices, tracks, and the pattern scheduler's timing thread.

pub mod backend;
pub mod pattern;
pub mod samples;
pub mod scheduler;
pub mod telemetry;
pub mod track;
pub mod voice;

pub use backend::{AudioBackend, BackendError, BackendResult, DeviceHandle, NullBackend, SourceId};
pub use pattern::{PatternError, PatternState};
pub use samples::{DrumPiece, SampleBuffer, SampleError};
pub use scheduler::{EventReceiver, PatternScheduler, SchedulerEvent, SchedulerSettings};
pub use telemetry::TelemetrySummary;
pub use track::{AutomationEdit, Track, TrackSnapshot};
pub use voice::Voice;
