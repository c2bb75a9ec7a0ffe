//! Pattern meter: beats, steps per beat and tempo, with their bounds.
//!
//! Out-of-range values are clamped silently. Sliders drive these setters
//! and should never produce an error.

use serde::{Deserialize, Serialize};

pub const MIN_BEATS: u32 = 4;
pub const MAX_BEATS: u32 = 8;
pub const MIN_STEPS_PER_BEAT: u32 = 1;
pub const MAX_STEPS_PER_BEAT: u32 = 6;
pub const MIN_TEMPO: u32 = 65;
pub const MAX_TEMPO: u32 = 220;

pub const MIN_TOTAL_STEPS: usize = (MIN_BEATS * MIN_STEPS_PER_BEAT) as usize;
pub const MAX_TOTAL_STEPS: usize = (MAX_BEATS * MAX_STEPS_PER_BEAT) as usize;

fn clamp_to(value: i64, min: u32, max: u32) -> u32 {
    value.clamp(min as i64, max as i64) as u32
}

pub fn clamp_beats(beats: i64) -> u32 {
    clamp_to(beats, MIN_BEATS, MAX_BEATS)
}

pub fn clamp_steps_per_beat(steps_per_beat: i64) -> u32 {
    clamp_to(steps_per_beat, MIN_STEPS_PER_BEAT, MAX_STEPS_PER_BEAT)
}

pub fn clamp_tempo(tempo: i64) -> u32 {
    clamp_to(tempo, MIN_TEMPO, MAX_TEMPO)
}

/// Wall-clock delay between two steps, truncated to whole milliseconds.
///
/// Both divisions truncate, so long patterns drift slightly against the
/// exact tempo. Playback keeps that drift on purpose.
pub fn sleep_millis(tempo: u32, steps_per_beat: u32) -> u64 {
    if tempo == 0 || steps_per_beat == 0 {
        return 0;
    }
    (60_000 / tempo as u64) / steps_per_beat as u64
}

pub fn total_steps(beats: u32, steps_per_beat: u32) -> usize {
    (beats * steps_per_beat) as usize
}

/// A clamped meter value, used for defaults and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawMeter")]
pub struct Meter {
    beats: u32,
    steps_per_beat: u32,
    tempo: u32,
}

/// Unchecked wire form; deserializing clamps through `Meter::new`.
#[derive(Deserialize)]
struct RawMeter {
    beats: i64,
    steps_per_beat: i64,
    tempo: i64,
}

impl From<RawMeter> for Meter {
    fn from(raw: RawMeter) -> Self {
        Meter::new(raw.beats, raw.steps_per_beat, raw.tempo)
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            beats: 4,
            steps_per_beat: 4,
            tempo: 120,
        }
    }
}

impl Meter {
    pub fn new(beats: i64, steps_per_beat: i64, tempo: i64) -> Self {
        Self {
            beats: clamp_beats(beats),
            steps_per_beat: clamp_steps_per_beat(steps_per_beat),
            tempo: clamp_tempo(tempo),
        }
    }

    pub fn beats(&self) -> u32 {
        self.beats
    }

    pub fn steps_per_beat(&self) -> u32 {
        self.steps_per_beat
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn set_beats(&mut self, beats: i64) -> u32 {
        self.beats = clamp_beats(beats);
        self.beats
    }

    pub fn set_steps_per_beat(&mut self, steps_per_beat: i64) -> u32 {
        self.steps_per_beat = clamp_steps_per_beat(steps_per_beat);
        self.steps_per_beat
    }

    pub fn set_tempo(&mut self, tempo: i64) -> u32 {
        self.tempo = clamp_tempo(tempo);
        self.tempo
    }

    pub fn total_steps(&self) -> usize {
        total_steps(self.beats, self.steps_per_beat)
    }

    pub fn sleep_millis(&self) -> u64 {
        sleep_millis(self.tempo, self.steps_per_beat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_millis_truncates() {
        for tempo in MIN_TEMPO..=MAX_TEMPO {
            for spb in MIN_STEPS_PER_BEAT..=MAX_STEPS_PER_BEAT {
                let expected = (60_000 / tempo as u64) / spb as u64;
                assert_eq!(sleep_millis(tempo, spb), expected);
            }
        }
        assert_eq!(sleep_millis(120, 4), 125);
        // 60000 / 70 = 857, / 6 = 142
        assert_eq!(sleep_millis(70, 6), 142);
    }

    #[test]
    fn setters_clamp_to_nearest_bound() {
        let mut meter = Meter::default();
        assert_eq!(meter.set_tempo(10), MIN_TEMPO);
        assert_eq!(meter.set_tempo(1_000), MAX_TEMPO);
        assert_eq!(meter.set_beats(-3), MIN_BEATS);
        assert_eq!(meter.set_beats(99), MAX_BEATS);
        assert_eq!(meter.set_steps_per_beat(0), MIN_STEPS_PER_BEAT);
        assert_eq!(meter.set_steps_per_beat(12), MAX_STEPS_PER_BEAT);
        assert_eq!(meter.set_tempo(150), 150);
    }

    #[test]
    fn total_steps_stays_in_bounds() {
        for beats in -2..12 {
            for spb in -2..10 {
                let meter = Meter::new(beats, spb, 120);
                let total = meter.total_steps();
                assert_eq!(total, (meter.beats() * meter.steps_per_beat()) as usize);
                assert!((MIN_TOTAL_STEPS..=MAX_TOTAL_STEPS).contains(&total));
            }
        }
    }

    #[test]
    fn default_meter_is_sixteen_steps_at_120() {
        let meter = Meter::default();
        assert_eq!(meter.total_steps(), 16);
        assert_eq!(meter.sleep_millis(), 125);
    }

    #[test]
    fn deserializing_clamps() {
        let meter: Meter =
            serde_json::from_str(r#"{"beats":99,"steps_per_beat":0,"tempo":1000}"#).unwrap();
        assert_eq!(meter, Meter::new(8, 1, 220));
        let json = serde_json::to_string(&meter).unwrap();
        assert_eq!(serde_json::from_str::<Meter>(&json).unwrap(), meter);
    }
}
