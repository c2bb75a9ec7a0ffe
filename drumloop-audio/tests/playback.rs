mod common;

use std::time::{Duration, Instant};

use drumloop_audio::backend::{TestFault, TestOp};
use drumloop_audio::SchedulerEvent;
use drumloop_types::AutomationKind;

#[test]
fn test_triggers_follow_step_interval() {
    // 4 beats x 4 steps at 120 bpm: 125 ms per step
    let (backend, scheduler) = common::scheduler(4, 4, 120);
    assert_eq!(scheduler.sleep_millis(), 125);
    common::add_track(&scheduler, common::piece("hat", 8), &(0..16).collect::<Vec<_>>());

    scheduler.start();
    assert!(common::wait_until(Duration::from_secs(3), || backend.starts().len() >= 6));
    scheduler.stop();
    assert!(scheduler.wait_stopped(Duration::from_secs(1)));

    let starts = backend.starts();
    for pair in starts.windows(2).take(5) {
        let gap = pair[1].0.duration_since(pair[0].0);
        assert!(
            gap >= Duration::from_millis(124) && gap <= Duration::from_millis(200),
            "step gap {:?} outside tolerance",
            gap
        );
    }
}

#[test]
fn test_stop_right_after_start_allows_at_most_one_step() {
    // 65 bpm, one step per beat: ~923 ms per step
    let (backend, scheduler) = common::scheduler(4, 1, 65);
    common::add_track(&scheduler, common::piece("kick", 8), &[0, 1, 2, 3]);

    scheduler.start();
    scheduler.stop();
    assert!(scheduler.wait_stopped(Duration::from_secs(2)));
    let after_stop = backend.starts().len();
    assert!(after_stop <= 1, "{} steps played after stop", after_stop);

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(backend.starts().len(), after_stop);
    assert!(!scheduler.is_playing());
}

#[test]
fn test_stop_interrupts_step_sleep() {
    let (_backend, scheduler) = common::scheduler(4, 1, 65);
    common::add_track(&scheduler, common::piece("kick", 8), &[0]);
    let events = scheduler.events();

    scheduler.start();
    assert!(common::wait_for_event(&events, Duration::from_secs(1), |e| {
        matches!(e, SchedulerEvent::StepPlayed { .. })
    })
    .is_some());
    scheduler.stop();
    // well inside the 923 ms step interval
    assert!(scheduler.wait_stopped(Duration::from_millis(300)));
}

#[test]
fn test_shutdown_while_stopped_ends_thread() {
    let (backend, scheduler) = common::scheduler(4, 4, 120);
    common::add_track(&scheduler, common::piece("snare", 8), &[0, 4, 8, 12]);

    scheduler.shutdown();
    assert!(common::wait_until(Duration::from_secs(1), || scheduler.is_shut_down()));

    scheduler.start();
    std::thread::sleep(Duration::from_millis(100));
    assert!(!scheduler.is_playing());
    assert!(backend.operations().is_empty());
}

#[test]
fn test_shutdown_while_playing_ends_thread() {
    let (_backend, scheduler) = common::scheduler(4, 1, 65);
    common::add_track(&scheduler, common::piece("kick", 8), &[0]);
    let events = scheduler.events();

    scheduler.start();
    assert!(common::wait_until(Duration::from_secs(1), || scheduler.is_playing()));
    scheduler.shutdown();
    assert!(common::wait_for_event(&events, Duration::from_secs(1), |e| {
        *e == SchedulerEvent::ShutDown
    })
    .is_some());
    assert!(common::wait_until(Duration::from_secs(1), || scheduler.is_shut_down()));
}

#[test]
fn test_start_without_tracks_emits_nothing() {
    let (_backend, scheduler) = common::scheduler(4, 4, 120);
    let events = scheduler.events();
    scheduler.start();
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(!scheduler.is_playing());
}

#[test]
fn test_silence_automation_mutes_first_pass_only() {
    // 4 steps at 220 bpm: ~1.1 s per pass
    let (_backend, scheduler) = common::scheduler(4, 1, 220);
    let track = common::add_track(&scheduler, common::piece("clap", 8), &[0]);
    track
        .automation()
        .add_sequence(1, 1, AutomationKind::Silence)
        .unwrap();
    let events = scheduler.events();

    scheduler.start();
    let seen = common::wait_for_event(&events, Duration::from_secs(4), |e| {
        matches!(e, SchedulerEvent::StepPlayed { pass: 2, step: 0, .. })
    })
    .expect("pass 2 never started");
    scheduler.stop();

    let triggered = |pass| {
        seen.iter().find_map(|e| match *e {
            SchedulerEvent::StepPlayed {
                pass: p,
                step: 0,
                triggered,
            } if p == pass => Some(triggered),
            _ => None,
        })
    };
    assert_eq!(seen.first(), Some(&SchedulerEvent::Started));
    assert_eq!(triggered(1), Some(0));
    assert_eq!(triggered(2), Some(1));
    assert!(seen.contains(&SchedulerEvent::PassCompleted(1)));
    // one-pass item activates and deactivates on the same pass
    assert!(track.active_automation().is_none());
}

#[test]
fn test_steps_share_one_committed_batch() {
    // 24 steps at 220 bpm: 45 ms per step
    let (backend, scheduler) = common::scheduler(4, 6, 220);
    common::add_track(&scheduler, common::piece("kick", 8), &[0, 1]);
    common::add_track(&scheduler, common::piece("hat", 9), &[0, 1]);

    scheduler.start();
    assert!(common::wait_until(Duration::from_secs(2), || backend.starts().len() >= 4));
    scheduler.stop();
    assert!(scheduler.wait_stopped(Duration::from_secs(1)));

    let batches: Vec<_> = backend.starts().iter().map(|(_, b)| *b).collect();
    assert_eq!(batches[0], batches[1]);
    assert_eq!(batches[2], batches[3]);
    assert!(batches[2] > batches[0]);

    let ops = backend.operations();
    for batch in [batches[0], batches[2]] {
        let commit = ops
            .iter()
            .position(|op| *op == TestOp::Commit(batch))
            .expect("batch never committed");
        let last_start = ops
            .iter()
            .rposition(|op| matches!(op, TestOp::StartSource { batch: b, .. } if *b == batch))
            .unwrap();
        assert!(last_start < commit);
    }
    assert_eq!(
        backend.commits().iter().filter(|b| **b == batches[0]).count(),
        1
    );
}

#[test]
fn test_faulty_voices_do_not_halt_transport() {
    let (backend, scheduler) = common::scheduler(4, 6, 220);
    let all: Vec<usize> = (0..24).collect();
    let failing = common::add_track(&scheduler, common::piece("broken", 5), &all);
    let panicking = common::add_track(&scheduler, common::piece("cursed", 6), &all);
    common::add_track(&scheduler, common::piece("good", 7), &all);
    backend.inject_fault(5, TestFault::Error);
    backend.inject_fault(6, TestFault::Panic);

    scheduler.start();
    assert!(common::wait_until(Duration::from_secs(2), || backend.starts().len() >= 3));
    assert!(scheduler.is_playing());
    scheduler.stop();
    assert!(scheduler.wait_stopped(Duration::from_secs(1)));

    assert!(failing.voice(0).unwrap().is_disabled());
    assert!(panicking.voice(0).unwrap().is_disabled());
    let created: Vec<usize> = backend
        .operations()
        .iter()
        .filter_map(|op| match op {
            TestOp::CreateSource { frames, .. } => Some(*frames),
            _ => None,
        })
        .collect();
    assert!(created.iter().all(|&frames| frames == 7));
}

#[test]
fn test_restart_begins_at_pass_one() {
    let (_backend, scheduler) = common::scheduler(4, 6, 220);
    common::add_track(&scheduler, common::piece("kick", 8), &[0]);
    let events = scheduler.events();

    scheduler.start();
    assert!(common::wait_for_event(&events, Duration::from_secs(1), |e| {
        matches!(e, SchedulerEvent::StepPlayed { step: 2, .. })
    })
    .is_some());
    assert_eq!(scheduler.current_pass(), Some(1));
    scheduler.stop();
    assert!(scheduler.wait_stopped(Duration::from_secs(1)));
    assert_eq!(scheduler.current_pass(), None);

    scheduler.start();
    let mut restarted = false;
    let seen = common::wait_for_event(&events, Duration::from_secs(1), |e| {
        restarted |= *e == SchedulerEvent::Started;
        restarted && matches!(e, SchedulerEvent::StepPlayed { .. })
    })
    .unwrap();
    assert!(matches!(
        seen.last(),
        Some(SchedulerEvent::StepPlayed { pass: 1, step: 0, .. })
    ));
}

#[test]
fn test_structural_edits_rejected_while_playing() {
    let (_backend, scheduler) = common::scheduler(4, 1, 65);
    common::add_track(&scheduler, common::piece("kick", 8), &[0]);
    scheduler.start();
    assert!(common::wait_until(Duration::from_secs(1), || scheduler.is_playing()));

    let extra = scheduler.new_track(common::piece("snare", 9));
    assert_eq!(
        scheduler.add_track(extra),
        Err(drumloop_audio::PatternError::Playing)
    );
    scheduler.stop();
    assert!(scheduler.wait_stopped(Duration::from_secs(2)));
    assert!(scheduler.add_track(scheduler.new_track(common::piece("snare", 9))).is_ok());
}

#[test]
fn test_tempo_change_applies_next_step() {
    // 220 bpm at 6 steps per beat: 45 ms per step
    let (backend, scheduler) = common::scheduler(4, 6, 220);
    common::add_track(&scheduler, common::piece("hat", 8), &(0..24).collect::<Vec<_>>());

    scheduler.start();
    assert!(common::wait_until(Duration::from_secs(2), || backend.starts().len() >= 2));
    let n = backend.starts().len();
    assert_eq!(scheduler.set_tempo(65), 65);
    assert_eq!(scheduler.sleep_millis(), (60_000 / 65) / 6);
    assert!(common::wait_until(Duration::from_secs(2), || backend.starts().len() >= n + 2));
    scheduler.stop();
    assert!(scheduler.wait_stopped(Duration::from_secs(1)));

    // the sleep in flight at the change may still be the old 45 ms one;
    // the one after it uses the new interval
    let starts = backend.starts();
    let gap = starts[n + 1].0.duration_since(starts[n].0);
    assert!(
        gap >= Duration::from_millis(152) && gap <= Duration::from_millis(230),
        "gap after tempo change {:?}",
        gap
    );
}

#[test]
fn test_editor_holding_automation_does_not_stall_steps() {
    let (backend, scheduler) = common::scheduler(4, 6, 220);
    let track = common::add_track(&scheduler, common::piece("hat", 8), &(0..24).collect::<Vec<_>>());

    scheduler.start();
    assert!(common::wait_until(Duration::from_secs(2), || backend.starts().len() >= 2));

    let held_from = Instant::now();
    {
        let mut edit = track.automation();
        edit.add_sequence(3, 1, AutomationKind::Silence).unwrap();
        std::thread::sleep(Duration::from_millis(300));
    }
    let held_until = Instant::now();
    assert!(common::wait_until(Duration::from_secs(1), || {
        backend.starts().iter().any(|(at, _)| *at > held_until)
    }));
    scheduler.stop();
    assert!(scheduler.wait_stopped(Duration::from_secs(1)));

    let starts = backend.starts();
    let during_hold = starts
        .iter()
        .filter(|(at, _)| *at >= held_from && *at <= held_until)
        .count();
    assert!(during_hold >= 4, "only {} steps while the editor held the timeline", during_hold);
    for pair in starts.windows(2) {
        let gap = pair[1].0.duration_since(pair[0].0);
        assert!(gap <= Duration::from_millis(120), "step gap {:?}", gap);
    }
    assert_eq!(track.published_automation().len(), 1);
}
