//! Audio backend trait: the device seam between voices and whatever makes sound.
//!
//! `AudioBackend` captures what a voice *means* to do (prepare a one-shot
//! source for a buffer, start it inside a batch, commit the batch) without
//! owning decoding, mixing or driver setup. The scheduler only ever holds a
//! [`DeviceHandle`]; the application decides which backend sits behind it.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use drumloop_types::BatchId;

use crate::samples::SampleBuffer;

/// Result type for backend operations.
pub type BackendResult<T = ()> = Result<T, BackendError>;

/// Error from a backend operation.
#[derive(Debug, Clone)]
pub struct BackendError(pub String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError(e.to_string())
    }
}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

/// Handle to a one-shot playback source created on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

/// Semantic-level audio device trait.
///
/// Only the timing thread triggers sources during playback, so
/// implementations never see concurrent `start_source` calls for the same
/// pattern. They must still be `Send + Sync` because the handle is shared
/// with the editor thread.
pub trait AudioBackend: Send + Sync {
    /// Create a source bound to a decoded buffer.
    fn create_source(&self, buffer: &SampleBuffer) -> BackendResult<SourceId>;

    /// Queue a source to start when `batch` is committed.
    fn start_source(&self, source: SourceId, volume: f32, batch: BatchId) -> BackendResult;

    /// Release a source. Freeing a playing source stops it.
    fn free_source(&self, source: SourceId) -> BackendResult;

    /// Start every source queued under `batch` together.
    fn commit(&self, batch: BatchId) -> BackendResult;
}

/// Shared handle to the process-wide audio device.
pub type DeviceHandle = Arc<dyn AudioBackend>;

// ─── Null Backend ───────────────────────────────────────────────────

/// Backend that accepts every operation and plays nothing.
/// Used when no output device is available.
#[derive(Default)]
pub struct NullBackend {
    next_source: AtomicU64,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for NullBackend {
    fn create_source(&self, _buffer: &SampleBuffer) -> BackendResult<SourceId> {
        Ok(SourceId(self.next_source.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn start_source(&self, _source: SourceId, _volume: f32, _batch: BatchId) -> BackendResult {
        Ok(())
    }

    fn free_source(&self, _source: SourceId) -> BackendResult {
        Ok(())
    }

    fn commit(&self, _batch: BatchId) -> BackendResult {
        Ok(())
    }
}

// ─── Test Backend ───────────────────────────────────────────────────

/// An operation recorded by `TestBackend` for assertion in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum TestOp {
    CreateSource { source: SourceId, frames: usize },
    StartSource {
        source: SourceId,
        volume: f32,
        batch: BatchId,
    },
    FreeSource(SourceId),
    Commit(BatchId),
}

/// Fault injected by `TestBackend` when creating a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFault {
    /// `create_source` returns an error.
    Error,
    /// `create_source` panics.
    Panic,
}

/// A test backend that records all operations with the instant they
/// happened. All operations succeed unless a fault is registered for the
/// buffer's frame count. Uses `Mutex` for interior mutability so the
/// backend is `Send + Sync` (needed for `Arc<TestBackend>` sharing).
#[derive(Default)]
pub struct TestBackend {
    ops: Mutex<Vec<(Instant, TestOp)>>,
    faults: Mutex<HashMap<usize, TestFault>>,
    next_source: AtomicU64,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create_source` fail for buffers with exactly `frames` frames.
    pub fn inject_fault(&self, frames: usize, fault: TestFault) {
        self.faults.lock().unwrap().insert(frames, fault);
    }

    /// Return all recorded operations.
    pub fn operations(&self) -> Vec<TestOp> {
        self.ops.lock().unwrap().iter().map(|(_, op)| op.clone()).collect()
    }

    /// Return all recorded operations with their timestamps.
    pub fn timed_operations(&self) -> Vec<(Instant, TestOp)> {
        self.ops.lock().unwrap().clone()
    }

    /// Clear recorded operations.
    pub fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    /// Count operations matching a predicate.
    pub fn count<F: Fn(&TestOp) -> bool>(&self, f: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|(_, op)| f(op)).count()
    }

    /// Return (instant, batch) for every started source.
    pub fn starts(&self) -> Vec<(Instant, BatchId)> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(at, op)| match op {
                TestOp::StartSource { batch, .. } => Some((*at, *batch)),
                _ => None,
            })
            .collect()
    }

    /// Return every committed batch in order.
    pub fn commits(&self) -> Vec<BatchId> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, op)| match op {
                TestOp::Commit(batch) => Some(*batch),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: TestOp) {
        self.ops.lock().unwrap().push((Instant::now(), op));
    }
}

impl AudioBackend for TestBackend {
    fn create_source(&self, buffer: &SampleBuffer) -> BackendResult<SourceId> {
        let frames = buffer.len_frames();
        let fault = self.faults.lock().unwrap().get(&frames).copied();
        match fault {
            Some(TestFault::Error) => {
                return Err(BackendError(format!("injected fault for {} frames", frames)))
            }
            Some(TestFault::Panic) => panic!("injected panic for {} frames", frames),
            None => {}
        }
        let source = SourceId(self.next_source.fetch_add(1, Ordering::Relaxed) + 1);
        self.record(TestOp::CreateSource { source, frames });
        Ok(source)
    }

    fn start_source(&self, source: SourceId, volume: f32, batch: BatchId) -> BackendResult {
        self.record(TestOp::StartSource {
            source,
            volume,
            batch,
        });
        Ok(())
    }

    fn free_source(&self, source: SourceId) -> BackendResult {
        self.record(TestOp::FreeSource(source));
        Ok(())
    }

    fn commit(&self, batch: BatchId) -> BackendResult {
        self.record(TestOp::Commit(batch));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(frames: usize) -> SampleBuffer {
        SampleBuffer::from_samples(vec![0.0; frames], 1, 44_100)
    }

    #[test]
    fn test_backend_records_in_order() {
        let backend = TestBackend::new();
        let src = backend.create_source(&buffer(8)).unwrap();
        backend.start_source(src, 0.5, BatchId::FIRST).unwrap();
        backend.commit(BatchId::FIRST).unwrap();
        backend.free_source(src).unwrap();

        assert_eq!(
            backend.operations(),
            vec![
                TestOp::CreateSource { source: src, frames: 8 },
                TestOp::StartSource {
                    source: src,
                    volume: 0.5,
                    batch: BatchId::FIRST
                },
                TestOp::Commit(BatchId::FIRST),
                TestOp::FreeSource(src),
            ]
        );
        assert_eq!(backend.commits(), vec![BatchId::FIRST]);
    }

    #[test]
    fn test_backend_injects_error() {
        let backend = TestBackend::new();
        backend.inject_fault(3, TestFault::Error);
        assert!(backend.create_source(&buffer(3)).is_err());
        assert!(backend.create_source(&buffer(4)).is_ok());
        assert_eq!(backend.count(|op| matches!(op, TestOp::CreateSource { .. })), 1);
    }

    #[test]
    fn null_backend_hands_out_distinct_sources() {
        let backend = NullBackend::new();
        let a = backend.create_source(&buffer(1)).unwrap();
        let b = backend.create_source(&buffer(1)).unwrap();
        assert_ne!(a, b);
    }
}
