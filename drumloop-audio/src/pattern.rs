//! Pattern state shared between the editor thread and the timing thread.
//!
//! Meter values are single atomics. A tempo edit may or may not reach the
//! step currently sleeping, but a reader never sees a torn value. The track
//! list sits behind an `RwLock`; the timing thread clones the `Arc`s once
//! per pass and never holds the lock while triggering.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use drumloop_types::{clamp_beats, clamp_steps_per_beat, clamp_tempo, meter, Meter};

use crate::track::Track;

/// Error from a structural pattern edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// Tracks cannot be added or removed while the transport runs.
    Playing,
    /// The scheduler thread has been shut down.
    ShutDown,
    /// The track was not built for the pattern's current step count.
    StepCount { expected: usize, found: usize },
    NoSuchTrack(usize),
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playing => write!(f, "pattern is playing; stop it before editing tracks"),
            Self::ShutDown => write!(f, "pattern scheduler has shut down"),
            Self::StepCount { expected, found } => write!(
                f,
                "track has {} steps but the pattern has {}",
                found, expected
            ),
            Self::NoSuchTrack(index) => write!(f, "no track at index {}", index),
        }
    }
}

impl std::error::Error for PatternError {}

pub struct PatternState {
    beats: AtomicU32,
    steps_per_beat: AtomicU32,
    tempo: AtomicU32,
    sleep_millis: AtomicU64,
    tracks: RwLock<Vec<Arc<Track>>>,
}

impl PatternState {
    pub fn new(meter: Meter) -> Self {
        Self {
            beats: AtomicU32::new(meter.beats()),
            steps_per_beat: AtomicU32::new(meter.steps_per_beat()),
            tempo: AtomicU32::new(meter.tempo()),
            sleep_millis: AtomicU64::new(meter.sleep_millis()),
            tracks: RwLock::new(Vec::new()),
        }
    }

    pub fn beats(&self) -> u32 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn steps_per_beat(&self) -> u32 {
        self.steps_per_beat.load(Ordering::Relaxed)
    }

    pub fn tempo(&self) -> u32 {
        self.tempo.load(Ordering::Relaxed)
    }

    pub fn sleep_millis(&self) -> u64 {
        self.sleep_millis.load(Ordering::Relaxed)
    }

    pub fn total_steps(&self) -> usize {
        meter::total_steps(self.beats(), self.steps_per_beat())
    }

    pub fn meter(&self) -> Meter {
        Meter::new(
            self.beats() as i64,
            self.steps_per_beat() as i64,
            self.tempo() as i64,
        )
    }

    pub fn set_beats(&self, beats: i64) -> u32 {
        let beats = clamp_beats(beats);
        self.beats.store(beats, Ordering::Relaxed);
        beats
    }

    pub fn set_steps_per_beat(&self, steps_per_beat: i64) -> u32 {
        let steps_per_beat = clamp_steps_per_beat(steps_per_beat);
        self.steps_per_beat.store(steps_per_beat, Ordering::Relaxed);
        self.recompute_sleep();
        steps_per_beat
    }

    pub fn set_tempo(&self, tempo: i64) -> u32 {
        let tempo = clamp_tempo(tempo);
        self.tempo.store(tempo, Ordering::Relaxed);
        self.recompute_sleep();
        tempo
    }

    fn recompute_sleep(&self) {
        let millis = meter::sleep_millis(self.tempo(), self.steps_per_beat());
        self.sleep_millis.store(millis, Ordering::Relaxed);
    }

    /// Current track list.
    pub fn tracks(&self) -> Vec<Arc<Track>> {
        self.tracks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn track(&self, index: usize) -> Option<Arc<Track>> {
        self.tracks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn push_track(&self, track: Arc<Track>) -> usize {
        let mut tracks = self.tracks.write().unwrap_or_else(PoisonError::into_inner);
        tracks.push(track);
        tracks.len() - 1
    }

    pub(crate) fn remove_track(&self, index: usize) -> Option<Arc<Track>> {
        let mut tracks = self.tracks.write().unwrap_or_else(PoisonError::into_inner);
        (index < tracks.len()).then(|| tracks.remove(index))
    }

    pub(crate) fn replace_tracks(&self, new_tracks: Vec<Arc<Track>>) -> Vec<Arc<Track>> {
        let mut tracks = self.tracks.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *tracks, new_tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_clamp_and_recompute_sleep() {
        let state = PatternState::new(Meter::default());
        assert_eq!(state.sleep_millis(), 125);

        assert_eq!(state.set_tempo(300), 220);
        assert_eq!(state.sleep_millis(), (60_000 / 220) / 4);

        assert_eq!(state.set_steps_per_beat(0), 1);
        assert_eq!(state.sleep_millis(), 60_000 / 220);

        assert_eq!(state.set_beats(2), 4);
        assert_eq!(state.total_steps(), 4);
    }

    #[test]
    fn total_steps_follows_meter() {
        let state = PatternState::new(Meter::new(8, 6, 100));
        assert_eq!(state.total_steps(), 48);
        assert_eq!(state.meter(), Meter::new(8, 6, 100));
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let state = PatternState::new(Meter::default());
        assert!(state.remove_track(0).is_none());
        assert_eq!(state.track_count(), 0);
    }
}
