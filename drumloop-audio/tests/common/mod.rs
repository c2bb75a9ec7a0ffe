#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use drumloop_audio::backend::TestBackend;
use drumloop_audio::{DrumPiece, PatternScheduler, SampleBuffer, SchedulerEvent, SchedulerSettings, Track};
use drumloop_types::Meter;

/// A piece whose buffer has `frames` mono frames. `TestBackend` keys
/// injected faults on the frame count, so distinct sizes tell tracks apart.
pub fn piece(name: &str, frames: usize) -> DrumPiece {
    DrumPiece::new(name, SampleBuffer::from_samples(vec![0.25; frames], 1, 44_100))
}

pub fn scheduler(beats: i64, steps_per_beat: i64, tempo: i64) -> (Arc<TestBackend>, PatternScheduler) {
    let backend = Arc::new(TestBackend::new());
    let scheduler = PatternScheduler::with_settings(
        backend.clone(),
        Meter::new(beats, steps_per_beat, tempo),
        SchedulerSettings::default(),
    )
    .unwrap();
    (backend, scheduler)
}

/// Add a track with the given steps switched on.
pub fn add_track(scheduler: &PatternScheduler, piece: DrumPiece, on: &[usize]) -> Arc<Track> {
    let track = scheduler.new_track(piece);
    for &step in on {
        assert!(track.set_step(step, true), "step {} out of range", step);
    }
    let index = scheduler.add_track(track).unwrap();
    scheduler.track(index).unwrap()
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Drain events until one matches `pred`. Returns every event seen,
/// the match last, or `None` on timeout.
pub fn wait_for_event(
    events: &Receiver<SchedulerEvent>,
    timeout: Duration,
    mut pred: impl FnMut(&SchedulerEvent) -> bool,
) -> Option<Vec<SchedulerEvent>> {
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(event) => {
                let done = pred(&event);
                seen.push(event);
                if done {
                    return Some(seen);
                }
            }
            Err(_) => return None,
        }
    }
}
