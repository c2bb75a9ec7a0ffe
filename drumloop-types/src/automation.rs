//! Pass automation: scheduled windows that override a track's on/off grid.
//!
//! A track owns one [`AutomationTimeline`]. Each [`AutomationItem`] covers a
//! contiguous run of passes (one pass is one full traversal of the pattern)
//! and carries an [`AutomationKind`] that decides what the track does while
//! the window is open.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// 1-based playback pass number.
pub type Pass = u32;

/// What a track does while an automation window covers the current pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum AutomationKind {
    /// No override; the step grid decides.
    #[default]
    None,
    /// Track is muted for the whole window.
    Silence,
    /// Track sounds under its own step grid, scaled by `gain` (0.0-1.0).
    Voice { gain: f32 },
}

impl AutomationKind {
    pub fn voice(gain: f32) -> Self {
        AutomationKind::Voice {
            gain: gain.clamp(0.0, 1.0),
        }
    }

    fn normalized(self) -> Self {
        match self {
            AutomationKind::Voice { gain } => AutomationKind::voice(gain),
            other => other,
        }
    }

    pub fn gate(self) -> PassGate {
        match self {
            AutomationKind::None => PassGate::Free,
            AutomationKind::Silence => PassGate::Silenced,
            AutomationKind::Voice { gain } => PassGate::Voiced { gain },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AutomationKind::None => "None",
            AutomationKind::Silence => "Silence",
            AutomationKind::Voice { .. } => "Voice",
        }
    }
}

/// Result of asking a timeline whether its track may sound on a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassGate {
    /// No window covers the pass; the step's own on flag is the sole authority.
    Free,
    /// A silence window covers the pass.
    Silenced,
    /// A voice window covers the pass.
    Voiced { gain: f32 },
}

impl PassGate {
    /// Whether a step whose grid flag is `is_on` should trigger.
    pub fn allows(self, is_on: bool) -> bool {
        match self {
            PassGate::Silenced => false,
            PassGate::Free | PassGate::Voiced { .. } => is_on,
        }
    }

    /// Volume multiplier applied on top of the voice volume.
    pub fn gain(self) -> f32 {
        match self {
            PassGate::Voiced { gain } => gain,
            PassGate::Free | PassGate::Silenced => 1.0,
        }
    }

    pub fn is_gated(self) -> bool {
        !matches!(self, PassGate::Free)
    }
}

/// Error from an automation edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    /// `first_pass` or `duration` was zero.
    InvalidRange { first_pass: Pass, duration: u32 },
    /// The window intersects an item that starts on a different pass.
    Overlap { first_pass: Pass, existing: Pass },
}

impl fmt::Display for AutomationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRange {
                first_pass,
                duration,
            } => write!(
                f,
                "invalid automation range: first pass {}, duration {}",
                first_pass, duration
            ),
            Self::Overlap {
                first_pass,
                existing,
            } => write!(
                f,
                "automation starting at pass {} overlaps item starting at pass {}",
                first_pass, existing
            ),
        }
    }
}

impl std::error::Error for AutomationError {}

/// Plain persisted form of an [`AutomationItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationItemData {
    pub first_pass: Pass,
    pub duration: u32,
    pub kind: AutomationKind,
}

/// One immutable automation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AutomationItemData", into = "AutomationItemData")]
pub struct AutomationItem {
    first_pass: Pass,
    duration: u32,
    kind: AutomationKind,
}

impl AutomationItem {
    pub fn new(first_pass: Pass, duration: u32, kind: AutomationKind) -> Result<Self, AutomationError> {
        if first_pass == 0 || duration == 0 || first_pass.checked_add(duration - 1).is_none() {
            return Err(AutomationError::InvalidRange {
                first_pass,
                duration,
            });
        }
        Ok(Self {
            first_pass,
            duration,
            kind: kind.normalized(),
        })
    }

    pub fn first_pass(&self) -> Pass {
        self.first_pass
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn last_pass(&self) -> Pass {
        self.first_pass + self.duration - 1
    }

    pub fn kind(&self) -> AutomationKind {
        self.kind
    }

    pub fn covers(&self, pass: Pass) -> bool {
        (self.first_pass..=self.last_pass()).contains(&pass)
    }

    fn intersects(&self, other: &AutomationItem) -> bool {
        self.first_pass <= other.last_pass() && other.first_pass <= self.last_pass()
    }

    pub fn serialize(&self) -> AutomationItemData {
        AutomationItemData {
            first_pass: self.first_pass,
            duration: self.duration,
            kind: self.kind,
        }
    }

    pub fn restore(data: AutomationItemData) -> Result<Self, AutomationError> {
        Self::new(data.first_pass, data.duration, data.kind)
    }
}

impl TryFrom<AutomationItemData> for AutomationItem {
    type Error = AutomationError;

    fn try_from(data: AutomationItemData) -> Result<Self, Self::Error> {
        Self::restore(data)
    }
}

impl From<AutomationItem> for AutomationItemData {
    fn from(item: AutomationItem) -> Self {
        item.serialize()
    }
}

/// Plain persisted form of an [`AutomationTimeline`].
///
/// Only the items are stored; the active item is runtime state and the
/// last-pass index is rebuilt on restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineData {
    pub items: Vec<AutomationItemData>,
}

/// Per-track automation keyed by first pass.
///
/// Tracks an active item as playback announces passes: an item becomes
/// active on the announcement of its first pass and goes idle on the
/// announcement of its last pass. Both checks run on every announcement,
/// so a one-pass item activates and deactivates within the same call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TimelineData", into = "TimelineData")]
pub struct AutomationTimeline {
    items: BTreeMap<Pass, AutomationItem>,
    last_passes: BTreeSet<Pass>,
    active: Option<AutomationItem>,
}

impl AutomationTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Items in first-pass order.
    pub fn items(&self) -> impl Iterator<Item = &AutomationItem> {
        self.items.values()
    }

    pub fn item_at(&self, first_pass: Pass) -> Option<&AutomationItem> {
        self.items.get(&first_pass)
    }

    /// Last pass covered by any item.
    pub fn final_pass(&self) -> Option<Pass> {
        self.last_passes.iter().next_back().copied()
    }

    /// Insert a window. An item with the same first pass is replaced; a
    /// window intersecting an item with a different first pass is rejected.
    pub fn add_sequence(
        &mut self,
        first_pass: Pass,
        duration: u32,
        kind: AutomationKind,
    ) -> Result<(), AutomationError> {
        let item = AutomationItem::new(first_pass, duration, kind)?;
        self.insert(item)
    }

    /// Append a window starting right after the current final item, or at
    /// pass 1 on an empty timeline. Returns the new item's first pass.
    pub fn add_next_sequence(
        &mut self,
        duration: u32,
        kind: AutomationKind,
    ) -> Result<Pass, AutomationError> {
        let first_pass = match self.final_pass() {
            Some(last) => last.checked_add(1).ok_or(AutomationError::InvalidRange {
                first_pass: last,
                duration,
            })?,
            None => 1,
        };
        self.add_sequence(first_pass, duration, kind)?;
        Ok(first_pass)
    }

    fn insert(&mut self, item: AutomationItem) -> Result<(), AutomationError> {
        if let Some(existing) = self
            .items
            .values()
            .find(|other| other.first_pass != item.first_pass && other.intersects(&item))
        {
            return Err(AutomationError::Overlap {
                first_pass: item.first_pass,
                existing: existing.first_pass,
            });
        }
        if let Some(replaced) = self.items.insert(item.first_pass, item) {
            self.last_passes.remove(&replaced.last_pass());
            if self.active == Some(replaced) {
                self.active = Some(item);
            }
        }
        self.last_passes.insert(item.last_pass());
        Ok(())
    }

    pub fn remove_sequence(&mut self, first_pass: Pass) -> Option<AutomationItem> {
        let removed = self.items.remove(&first_pass)?;
        self.last_passes.remove(&removed.last_pass());
        if self.active == Some(removed) {
            self.active = None;
        }
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.last_passes.clear();
        self.active = None;
    }

    /// Item made active by the most recent announcements, if any.
    pub fn active(&self) -> Option<&AutomationItem> {
        self.active.as_ref()
    }

    /// Return to idle, e.g. before a fresh playback sequence.
    pub fn reset(&mut self) {
        self.active = None;
    }

    /// Advance the state machine for an announced pass.
    /// Returns true when the active item changed.
    pub fn announce_pass(&mut self, pass: Pass) -> bool {
        let before = self.active;
        self.active = self.transition(before, pass);
        before != self.active
    }

    /// The item that would be active after announcing `pass` with `current`
    /// active, without touching this timeline. Lets a reader that only holds
    /// a shared snapshot of the timeline keep its own active state.
    pub fn transition(&self, current: Option<AutomationItem>, pass: Pass) -> Option<AutomationItem> {
        let mut next = current;
        if let Some(item) = self.items.get(&pass) {
            next = Some(*item);
        }
        if self.last_passes.contains(&pass) {
            next = None;
        }
        next
    }

    /// Gate for `pass`, from the item whose window covers it.
    pub fn gate(&self, pass: Pass) -> PassGate {
        self.items
            .range(..=pass)
            .next_back()
            .map(|(_, item)| item)
            .filter(|item| item.covers(pass))
            .map(|item| item.kind.gate())
            .unwrap_or(PassGate::Free)
    }

    /// Whether a step with grid flag `is_on` may sound on `pass`.
    pub fn can_play(&self, pass: Pass, is_on: bool) -> bool {
        self.gate(pass).allows(is_on)
    }

    pub fn serialize(&self) -> TimelineData {
        TimelineData {
            items: self.items.values().map(AutomationItem::serialize).collect(),
        }
    }

    pub fn restore(data: TimelineData) -> Result<Self, AutomationError> {
        let mut timeline = Self::new();
        for item in data.items {
            timeline.insert(AutomationItem::restore(item)?)?;
        }
        Ok(timeline)
    }
}

impl TryFrom<TimelineData> for AutomationTimeline {
    type Error = AutomationError;

    fn try_from(data: TimelineData) -> Result<Self, Self::Error> {
        Self::restore(data)
    }
}

impl From<AutomationTimeline> for TimelineData {
    fn from(timeline: AutomationTimeline) -> Self {
        timeline.serialize()
    }
}
