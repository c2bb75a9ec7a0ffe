//! Common subdivision timeline.
//!
//! Every note length the grid supports lands on a 24-tick timeline per
//! quarter note (24 is the least common multiple of the 2, 3, 4 and 8
//! divisions). Tick 0 is the beat boundary itself; it is implied and never
//! listed in the maps below.

use serde::{Deserialize, Serialize};

/// Position within one quarter note, in `0..TICKS_PER_QUARTER`.
pub type Tick = u8;

pub const TICKS_PER_QUARTER: Tick = 24;

/// Every tick a trigger may land on.
pub const PLAYABLE_TICKS: [Tick; 10] = [0, 3, 6, 8, 9, 12, 15, 16, 18, 21];

// Ticks owned by exactly one subdivision (used for click and marker rendering)
const EIGHTH_TICKS: &[Tick] = &[12];
const SIXTEENTH_TICKS: &[Tick] = &[6, 18];
const THIRTY_SECOND_TICKS: &[Tick] = &[3, 9, 15, 21];
const EIGHTH_TRIPLET_TICKS: &[Tick] = &[8, 16];

// Every tick touched by a raw division count, shared ticks included
const HALF_DIVISION: &[Tick] = &[12];
const THIRD_DIVISION: &[Tick] = &[8, 16];
const QUARTER_DIVISION: &[Tick] = &[6, 12, 18];
const EIGHTH_DIVISION: &[Tick] = &[3, 6, 9, 12, 15, 18, 21];

/// Named note subdivision below the quarter note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubdivisionKind {
    EighthNote,
    SixteenthNote,
    ThirtySecondNote,
    EighthNoteTriplet,
}

impl SubdivisionKind {
    pub fn all() -> &'static [SubdivisionKind] {
        &[
            SubdivisionKind::EighthNote,
            SubdivisionKind::SixteenthNote,
            SubdivisionKind::ThirtySecondNote,
            SubdivisionKind::EighthNoteTriplet,
        ]
    }

    /// Number of equal parts the quarter note is split into.
    pub fn divisor(self) -> u8 {
        match self {
            SubdivisionKind::EighthNote => 2,
            SubdivisionKind::SixteenthNote => 4,
            SubdivisionKind::ThirtySecondNote => 8,
            SubdivisionKind::EighthNoteTriplet => 3,
        }
    }

    pub fn from_divisor(divisor: u8) -> Option<Self> {
        match divisor {
            2 => Some(SubdivisionKind::EighthNote),
            3 => Some(SubdivisionKind::EighthNoteTriplet),
            4 => Some(SubdivisionKind::SixteenthNote),
            8 => Some(SubdivisionKind::ThirtySecondNote),
            _ => None,
        }
    }

    /// Ticks belonging to this subdivision and no coarser one.
    pub fn unique_positions(self) -> &'static [Tick] {
        match self {
            SubdivisionKind::EighthNote => EIGHTH_TICKS,
            SubdivisionKind::SixteenthNote => SIXTEENTH_TICKS,
            SubdivisionKind::ThirtySecondNote => THIRTY_SECOND_TICKS,
            SubdivisionKind::EighthNoteTriplet => EIGHTH_TRIPLET_TICKS,
        }
    }

    /// Every tick this subdivision touches, including shared ones.
    pub fn all_positions(self) -> &'static [Tick] {
        all_positions(self.divisor())
    }

    pub fn name(self) -> &'static str {
        match self {
            SubdivisionKind::EighthNote => "1/8",
            SubdivisionKind::SixteenthNote => "1/16",
            SubdivisionKind::ThirtySecondNote => "1/32",
            SubdivisionKind::EighthNoteTriplet => "1/8T",
        }
    }
}

/// Ticks belonging exclusively to `kind`.
pub fn unique_positions(kind: SubdivisionKind) -> &'static [Tick] {
    kind.unique_positions()
}

/// Every tick touched when a quarter note is split into `divisor` parts.
///
/// Only 2, 3, 4 and 8 are defined. Any other divisor is a caller bug: it
/// asserts in debug builds and yields no positions in release builds.
pub fn all_positions(divisor: u8) -> &'static [Tick] {
    match divisor {
        2 => HALF_DIVISION,
        3 => THIRD_DIVISION,
        4 => QUARTER_DIVISION,
        8 => EIGHTH_DIVISION,
        _ => {
            debug_assert!(false, "no tick map for divisor {}", divisor);
            &[]
        }
    }
}

pub fn is_playable(tick: Tick) -> bool {
    PLAYABLE_TICKS.binary_search(&tick).is_ok()
}

/// Map a step index onto `(beat, tick)` for a grid of `steps_per_beat`.
///
/// Returns `None` when the step does not land on a playable tick, e.g. for
/// five steps per beat (24 is not divisible by 5) or the off-grid sixteenth
/// triplets of a six-step beat.
pub fn step_position(step: usize, steps_per_beat: u32) -> Option<(usize, Tick)> {
    if steps_per_beat == 0 || TICKS_PER_QUARTER as u32 % steps_per_beat != 0 {
        return None;
    }
    let spb = steps_per_beat as usize;
    let ticks_per_step = TICKS_PER_QUARTER as usize / spb;
    let beat = step / spb;
    let tick = ((step % spb) * ticks_per_step) as Tick;
    is_playable(tick).then_some((beat, tick))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn playable_set_is_exact() {
        for t in 0..TICKS_PER_QUARTER {
            let expected = [0, 3, 6, 8, 9, 12, 15, 16, 18, 21].contains(&t);
            assert_eq!(is_playable(t), expected, "tick {}", t);
        }
        assert!(!is_playable(24));
    }

    #[test]
    fn unique_positions_are_disjoint_and_cover_playable() {
        let mut union = BTreeSet::new();
        for kind in SubdivisionKind::all() {
            for &t in kind.unique_positions() {
                assert!(union.insert(t), "tick {} appears in two kinds", t);
            }
        }
        assert!(!union.contains(&0));
        union.insert(0);
        let playable: BTreeSet<Tick> = PLAYABLE_TICKS.iter().copied().collect();
        assert_eq!(union, playable);
    }

    #[test]
    fn full_map_contains_unique_ticks() {
        for kind in SubdivisionKind::all() {
            let all = kind.all_positions();
            for t in kind.unique_positions() {
                assert!(all.contains(t));
            }
            assert!(all.iter().all(|&t| is_playable(t)));
        }
        assert_eq!(all_positions(4), &[6, 12, 18]);
        assert_eq!(all_positions(8).len(), 7);
    }

    #[test]
    fn divisor_round_trips() {
        for &kind in SubdivisionKind::all() {
            assert_eq!(SubdivisionKind::from_divisor(kind.divisor()), Some(kind));
        }
        assert_eq!(SubdivisionKind::from_divisor(6), None);
    }

    #[test]
    fn step_position_for_sixteenths() {
        assert_eq!(step_position(0, 4), Some((0, 0)));
        assert_eq!(step_position(1, 4), Some((0, 6)));
        assert_eq!(step_position(6, 4), Some((1, 12)));
        assert_eq!(step_position(5, 3), Some((1, 16)));
    }

    #[test]
    fn step_position_off_grid() {
        assert_eq!(step_position(1, 5), None);
        // sixteenth triplets land on ticks 4 and 20
        assert_eq!(step_position(1, 6), None);
        assert_eq!(step_position(2, 6), Some((0, 8)));
        assert_eq!(step_position(0, 0), None);
    }
}
