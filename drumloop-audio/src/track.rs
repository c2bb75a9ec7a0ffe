//! A track: one voice per pattern step plus the track's pass automation.
//!
//! Tracks are sized once. Changing the pattern's step count means building
//! replacement tracks with [`Track::resized`] while playback is stopped.
//!
//! Automation has two sides. The editor edits its own copy behind a mutex
//! through [`Track::automation`]; dropping the edit guard publishes an
//! immutable snapshot. The timing thread only ever reads the published
//! snapshot and keeps the active item in its own slot, so an editor holding
//! the guard never delays a step.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::{ArcSwap, ArcSwapOption};
use serde::{Deserialize, Serialize};

use drumloop_types::{
    AutomationError, AutomationItem, AutomationTimeline, BatchId, Pass, PassGate, TimelineData,
};

use crate::backend::DeviceHandle;
use crate::samples::DrumPiece;
use crate::voice::Voice;

pub struct Track {
    piece: DrumPiece,
    voices: Vec<Voice>,
    muted: AtomicBool,
    /// Editor copy.
    automation: Mutex<AutomationTimeline>,
    /// What the timing thread reads.
    published: ArcSwap<AutomationTimeline>,
    /// Active item as announced by the timing thread.
    active: ArcSwapOption<AutomationItem>,
}

/// Edit access to a track's automation. The edited timeline is published
/// to the timing thread when the guard drops.
pub struct AutomationEdit<'a> {
    timeline: MutexGuard<'a, AutomationTimeline>,
    published: &'a ArcSwap<AutomationTimeline>,
}

impl Deref for AutomationEdit<'_> {
    type Target = AutomationTimeline;

    fn deref(&self) -> &AutomationTimeline {
        &self.timeline
    }
}

impl DerefMut for AutomationEdit<'_> {
    fn deref_mut(&mut self) -> &mut AutomationTimeline {
        &mut self.timeline
    }
}

impl Drop for AutomationEdit<'_> {
    fn drop(&mut self) {
        self.published.store(Arc::new(self.timeline.clone()));
    }
}

/// Serializable view of a track's grid and automation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub name: String,
    pub steps: Vec<bool>,
    pub volumes: Vec<f32>,
    pub muted: bool,
    pub automation: TimelineData,
}

impl Track {
    /// Build a track with `steps` voices, all off at full volume.
    pub fn new(piece: DrumPiece, steps: usize, device: DeviceHandle) -> Self {
        let voices = (0..steps)
            .map(|step| Voice::new(step, piece.buffer().cloned(), device.clone()))
            .collect();
        Self {
            piece,
            voices,
            muted: AtomicBool::new(false),
            automation: Mutex::new(AutomationTimeline::new()),
            published: ArcSwap::from_pointee(AutomationTimeline::new()),
            active: ArcSwapOption::empty(),
        }
    }

    /// Build a track from a snapshot. Grid entries beyond `steps` are
    /// dropped and missing ones start off.
    pub fn from_snapshot(
        snapshot: &TrackSnapshot,
        piece: DrumPiece,
        steps: usize,
        device: DeviceHandle,
    ) -> Result<Self, AutomationError> {
        let automation = AutomationTimeline::restore(snapshot.automation.clone())?;
        let track = Self::new(piece, steps, device);
        for (voice, &on) in track.voices.iter().zip(&snapshot.steps) {
            voice.set_on(on);
        }
        for (voice, &volume) in track.voices.iter().zip(&snapshot.volumes) {
            voice.set_volume(volume);
        }
        track.set_muted(snapshot.muted);
        *track.automation() = automation;
        Ok(track)
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            name: self.name().to_string(),
            steps: self.steps_on(),
            volumes: self.voices.iter().map(Voice::volume).collect(),
            muted: self.is_muted(),
            automation: self.published.load().serialize(),
        }
    }

    /// A copy of this track with `steps` voices, keeping grid flags,
    /// volumes, mute and automation for the steps both sizes share.
    pub fn resized(&self, steps: usize, device: DeviceHandle) -> Self {
        let track = Self::new(self.piece.clone(), steps, device);
        for (new, old) in track.voices.iter().zip(&self.voices) {
            new.set_on(old.is_on());
            new.set_volume(old.volume());
        }
        track.set_muted(self.is_muted());
        *track.automation() = AutomationTimeline::clone(&self.published.load());
        track
    }

    pub fn name(&self) -> &str {
        self.piece.name()
    }

    pub fn piece(&self) -> &DrumPiece {
        &self.piece
    }

    pub fn steps(&self) -> usize {
        self.voices.len()
    }

    pub fn voice(&self, step: usize) -> Option<&Voice> {
        self.voices.get(step)
    }

    /// Set a grid flag. Returns false when `step` is out of range.
    pub fn set_step(&self, step: usize, on: bool) -> bool {
        match self.voices.get(step) {
            Some(voice) => {
                voice.set_on(on);
                true
            }
            None => false,
        }
    }

    /// Flip a grid flag, returning the new value.
    pub fn toggle_step(&self, step: usize) -> Option<bool> {
        self.voices.get(step).map(Voice::toggle)
    }

    pub fn is_step_on(&self, step: usize) -> bool {
        self.voices.get(step).is_some_and(Voice::is_on)
    }

    pub fn steps_on(&self) -> Vec<bool> {
        self.voices.iter().map(Voice::is_on).collect()
    }

    /// Set the volume of every voice.
    pub fn set_volume(&self, volume: f32) {
        for voice in &self.voices {
            voice.set_volume(volume);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    /// Lock the editor copy of the automation timeline. Edits reach the
    /// timing thread when the returned guard drops.
    pub fn automation(&self) -> AutomationEdit<'_> {
        AutomationEdit {
            timeline: self.automation.lock().unwrap_or_else(PoisonError::into_inner),
            published: &self.published,
        }
    }

    /// The timeline as last published to the timing thread.
    pub fn published_automation(&self) -> Arc<AutomationTimeline> {
        self.published.load_full()
    }

    pub fn gate(&self, pass: Pass) -> PassGate {
        self.published.load().gate(pass)
    }

    /// Item the timing thread currently treats as active.
    pub fn active_automation(&self) -> Option<AutomationItem> {
        self.active.load_full().map(|item| *item)
    }

    /// Advance the active item for a completed pass. An active item that
    /// has since been edited away is dropped first. Returns true on change.
    pub(crate) fn announce_pass(&self, pass: Pass) -> bool {
        let timeline = self.published.load();
        let current = self
            .active_automation()
            .filter(|item| timeline.item_at(item.first_pass()) == Some(item));
        let next = timeline.transition(current, pass);
        let changed = next != self.active_automation();
        if changed {
            self.active.store(next.map(Arc::new));
        }
        changed
    }

    /// Back to idle before a fresh playback sequence.
    pub(crate) fn reset_automation(&self) {
        self.active.store(None);
    }

    /// Trigger the voice at `step` if the gate and the grid allow it.
    /// Returns whether a source was started.
    pub fn play_step(&self, step: usize, batch: BatchId, gate: PassGate) -> bool {
        if self.is_muted() {
            return false;
        }
        let Some(voice) = self.voices.get(step) else {
            log::trace!(target: "audio::track", "{}: no voice for step {}", self.name(), step);
            return false;
        };
        if !gate.allows(voice.is_on()) {
            return false;
        }
        voice.trigger(batch, gate.gain())
    }
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("name", &self.name())
            .field("steps", &self.steps())
            .field("muted", &self.is_muted())
            .finish()
    }
}
