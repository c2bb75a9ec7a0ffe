//! Per-step voice: one kit buffer bound to one step of one track.
//!
//! The editor flips `on` and `volume` while the timing thread triggers, so
//! both live in atomics. A device source is created lazily on the first
//! trigger and recreated on every later trigger (one-shot playback).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use drumloop_types::BatchId;

use crate::backend::{DeviceHandle, SourceId};
use crate::samples::SampleBuffer;

const NO_SOURCE: u64 = 0;

pub struct Voice {
    step: usize,
    buffer: Option<Arc<SampleBuffer>>,
    device: DeviceHandle,
    on: AtomicBool,
    /// f32 bits
    volume: AtomicU32,
    source: AtomicU64,
    /// Set once the device refused to create a source; never cleared.
    disabled: AtomicBool,
}

impl Voice {
    pub fn new(step: usize, buffer: Option<Arc<SampleBuffer>>, device: DeviceHandle) -> Self {
        Self {
            step,
            buffer,
            device,
            on: AtomicBool::new(false),
            volume: AtomicU32::new(1.0f32.to_bits()),
            source: AtomicU64::new(NO_SOURCE),
            disabled: AtomicBool::new(false),
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::Relaxed)
    }

    pub fn set_on(&self, on: bool) {
        self.on.store(on, Ordering::Relaxed);
    }

    /// Flip the grid flag, returning the new value.
    pub fn toggle(&self) -> bool {
        !self.on.fetch_xor(true, Ordering::Relaxed)
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    pub fn set_volume(&self, volume: f32) {
        let volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
        self.volume.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// Whether a trigger could reach the device.
    pub fn is_ready(&self) -> bool {
        self.buffer.is_some() && !self.disabled.load(Ordering::Relaxed)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }

    /// Start this voice inside `batch`, scaled by `gain`.
    ///
    /// A no-op unless the voice is on and ready. Device faults, panics
    /// included, are logged and kept here; they never reach the caller.
    /// Returns whether a source was started.
    pub fn trigger(&self, batch: BatchId, gain: f32) -> bool {
        if !self.is_on() {
            return false;
        }
        let Some(buffer) = self.buffer.as_deref() else {
            return false;
        };
        if self.is_disabled() {
            return false;
        }

        match catch_unwind(AssertUnwindSafe(|| self.fire(buffer, batch, gain))) {
            Ok(started) => started,
            Err(_) => {
                log::warn!(target: "audio::voice", "device panicked on step {}; voice disabled", self.step);
                self.disabled.store(true, Ordering::Relaxed);
                false
            }
        }
    }

    fn fire(&self, buffer: &SampleBuffer, batch: BatchId, gain: f32) -> bool {
        self.release_source();

        let source = match self.device.create_source(buffer) {
            Ok(source) => source,
            Err(e) => {
                log::warn!(target: "audio::voice", "could not create source for step {}: {}; voice disabled", self.step, e);
                self.disabled.store(true, Ordering::Relaxed);
                return false;
            }
        };
        self.source.store(source.0, Ordering::Relaxed);

        let volume = self.volume() * gain;
        if let Err(e) = self.device.start_source(source, volume, batch) {
            log::warn!(target: "audio::voice", "could not start step {} in batch {}: {}", self.step, batch, e);
            self.release_source();
            return false;
        }
        true
    }

    fn release_source(&self) {
        let previous = self.source.swap(NO_SOURCE, Ordering::Relaxed);
        if previous != NO_SOURCE {
            if let Err(e) = self.device.free_source(SourceId(previous)) {
                log::debug!(target: "audio::voice", "free_source({}) failed: {}", previous, e);
            }
        }
    }
}

impl Drop for Voice {
    fn drop(&mut self) {
        self.release_source();
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("step", &self.step)
            .field("on", &self.is_on())
            .field("volume", &self.volume())
            .field("ready", &self.is_ready())
            .finish()
    }
}
