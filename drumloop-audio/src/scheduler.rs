//! Pattern scheduler: the dedicated timing thread that walks passes and steps.
//!
//! One thread per pattern, spawned at construction and parked on a condvar
//! until `start()`. Each step triggers every track's voice for that step
//! under one shared batch id, commits the batch, then sleeps for the
//! pattern's current step interval. `stop()` and `shutdown()` are
//! cooperative: they set flags under the control lock and wake the thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use drumloop_types::{BatchId, Meter, Pass};

use crate::backend::DeviceHandle;
use crate::pattern::{PatternError, PatternState};
use crate::samples::DrumPiece;
use crate::telemetry::{StepTelemetry, TelemetrySummary};
use crate::track::Track;

const NO_STEP: usize = usize::MAX;

/// Tunables for the timing thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Log a timing summary every N completed passes (0 disables).
    pub telemetry_interval_passes: u32,
    /// Let `stop()` cut the current step's sleep short.
    pub stop_wakes_sleep: bool,
    /// Wake-up lateness beyond this counts as an overrun.
    pub lateness_budget_us: u32,
    /// Capacity of the event channel. Events are dropped when it is full.
    pub event_capacity: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            telemetry_interval_passes: 16,
            stop_wakes_sleep: true,
            lateness_budget_us: 2_000,
            event_capacity: 1024,
        }
    }
}

/// Playback progress published by the timing thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    Started,
    StepPlayed {
        pass: Pass,
        step: usize,
        /// Voices started for this step.
        triggered: usize,
    },
    PassCompleted(Pass),
    Stopped { pass: Pass },
    ShutDown,
}

#[derive(Default)]
struct Control {
    start_pending: bool,
    stop: bool,
    shutdown: bool,
    running: bool,
}

struct Shared {
    pattern: PatternState,
    device: DeviceHandle,
    settings: SchedulerSettings,
    control: Mutex<Control>,
    wake: Condvar,
    playing: AtomicBool,
    current_pass: AtomicU32,
    current_step: AtomicUsize,
    telemetry: Mutex<StepTelemetry>,
    events: Sender<SchedulerEvent>,
}

/// Receiving end of the scheduler's event channel.
pub type EventReceiver = Receiver<SchedulerEvent>;

/// Owns the pattern's meter and tracks, and the thread that plays them.
pub struct PatternScheduler {
    shared: Arc<Shared>,
    events: EventReceiver,
    thread: Option<JoinHandle<()>>,
}

impl PatternScheduler {
    /// Create a scheduler with the default meter (4 beats, 4 steps per
    /// beat, 120 bpm) bound to `device`.
    pub fn new(device: DeviceHandle) -> std::io::Result<Self> {
        Self::with_settings(device, Meter::default(), SchedulerSettings::default())
    }

    pub fn with_settings(
        device: DeviceHandle,
        meter: Meter,
        settings: SchedulerSettings,
    ) -> std::io::Result<Self> {
        let (events_tx, events_rx) = crossbeam_channel::bounded(settings.event_capacity.max(1));
        let shared = Arc::new(Shared {
            pattern: PatternState::new(meter),
            device,
            settings,
            control: Mutex::new(Control::default()),
            wake: Condvar::new(),
            playing: AtomicBool::new(false),
            current_pass: AtomicU32::new(0),
            current_step: AtomicUsize::new(NO_STEP),
            telemetry: Mutex::new(StepTelemetry::new(Duration::from_micros(
                settings.lateness_budget_us as u64,
            ))),
            events: events_tx,
        });

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("pattern-scheduler".into())
            .spawn(move || thread_shared.run())?;

        Ok(Self {
            shared,
            events: events_rx,
            thread: Some(thread),
        })
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.shared.device
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.shared.settings
    }

    // ── Meter ───────────────────────────────────────────────────────

    pub fn beats(&self) -> u32 {
        self.shared.pattern.beats()
    }

    pub fn steps_per_beat(&self) -> u32 {
        self.shared.pattern.steps_per_beat()
    }

    pub fn tempo(&self) -> u32 {
        self.shared.pattern.tempo()
    }

    pub fn total_steps(&self) -> usize {
        self.shared.pattern.total_steps()
    }

    pub fn sleep_millis(&self) -> u64 {
        self.shared.pattern.sleep_millis()
    }

    pub fn meter(&self) -> Meter {
        self.shared.pattern.meter()
    }

    /// Clamped to 4..=8. Changing the step count while playing leaves
    /// existing tracks the wrong size; rebuild them while stopped.
    pub fn set_beats(&self, beats: i64) -> u32 {
        self.shared.pattern.set_beats(beats)
    }

    /// Clamped to 1..=6. Same caveat as [`set_beats`](Self::set_beats).
    pub fn set_steps_per_beat(&self, steps_per_beat: i64) -> u32 {
        self.shared.pattern.set_steps_per_beat(steps_per_beat)
    }

    /// Clamped to 65..=220 bpm. Safe while playing; applies from the next
    /// step's sleep.
    pub fn set_tempo(&self, tempo: i64) -> u32 {
        self.shared.pattern.set_tempo(tempo)
    }

    /// Change beats and steps per beat together and, when the step count
    /// changes, rebuild every track at the new size keeping its grid and
    /// automation. Only while stopped.
    pub fn resize(&self, beats: i64, steps_per_beat: i64) -> Result<Meter, PatternError> {
        let _control = self.shared.structural_guard()?;
        let before = self.total_steps();
        self.shared.pattern.set_beats(beats);
        self.shared.pattern.set_steps_per_beat(steps_per_beat);
        let after = self.total_steps();
        if after != before {
            let resized = self
                .shared
                .pattern
                .tracks()
                .iter()
                .map(|t| Arc::new(t.resized(after, Arc::clone(&self.shared.device))))
                .collect();
            self.shared.pattern.replace_tracks(resized);
            log::debug!(target: "audio::scheduler", "resized tracks {} -> {} steps", before, after);
        }
        Ok(self.meter())
    }

    // ── Tracks ──────────────────────────────────────────────────────

    /// Build a track sized to the current step count on this device.
    pub fn new_track(&self, piece: DrumPiece) -> Track {
        Track::new(piece, self.total_steps(), Arc::clone(&self.shared.device))
    }

    pub fn tracks(&self) -> Vec<Arc<Track>> {
        self.shared.pattern.tracks()
    }

    pub fn track(&self, index: usize) -> Option<Arc<Track>> {
        self.shared.pattern.track(index)
    }

    pub fn track_count(&self) -> usize {
        self.shared.pattern.track_count()
    }

    /// Append a track. Only while stopped, and only a track built for the
    /// current step count.
    pub fn add_track(&self, track: Track) -> Result<usize, PatternError> {
        let control = self.shared.structural_guard()?;
        let expected = self.total_steps();
        if track.steps() != expected {
            return Err(PatternError::StepCount {
                expected,
                found: track.steps(),
            });
        }
        let index = self.shared.pattern.push_track(Arc::new(track));
        drop(control);
        log::debug!(target: "audio::scheduler", "added track {} ({} steps)", index, expected);
        Ok(index)
    }

    pub fn remove_track(&self, index: usize) -> Result<Arc<Track>, PatternError> {
        let _control = self.shared.structural_guard()?;
        self.shared
            .pattern
            .remove_track(index)
            .ok_or(PatternError::NoSuchTrack(index))
    }

    /// Swap in a new track list, e.g. after a step-count change.
    /// Returns the previous tracks.
    pub fn replace_tracks(&self, tracks: Vec<Track>) -> Result<Vec<Arc<Track>>, PatternError> {
        let _control = self.shared.structural_guard()?;
        check_step_counts(&tracks, self.total_steps())?;
        let tracks = tracks.into_iter().map(Arc::new).collect();
        Ok(self.shared.pattern.replace_tracks(tracks))
    }

    /// Install a whole pattern: meter and tracks under one structural
    /// guard. Tracks must be sized for `meter`; on error nothing changes.
    /// Returns the previous tracks.
    pub fn replace_all(
        &self,
        meter: Meter,
        tracks: Vec<Track>,
    ) -> Result<Vec<Arc<Track>>, PatternError> {
        let _control = self.shared.structural_guard()?;
        check_step_counts(&tracks, meter.total_steps())?;
        let pattern = &self.shared.pattern;
        pattern.set_beats(meter.beats() as i64);
        pattern.set_steps_per_beat(meter.steps_per_beat() as i64);
        pattern.set_tempo(meter.tempo() as i64);
        let tracks = tracks.into_iter().map(Arc::new).collect();
        let previous = pattern.replace_tracks(tracks);
        log::debug!(
            target: "audio::scheduler",
            "pattern replaced: {} tracks at {} steps",
            pattern.track_count(),
            meter.total_steps()
        );
        Ok(previous)
    }

    // ── Transport ───────────────────────────────────────────────────

    /// Begin playback at pass 1. No-op while already playing, when the
    /// pattern has no tracks, or after shutdown.
    pub fn start(&self) {
        let mut control = self.shared.lock_control();
        if control.shutdown {
            log::warn!(target: "audio::scheduler", "start() after shutdown ignored");
            return;
        }
        if !control.stop && (control.running || control.start_pending) {
            return;
        }
        if self.shared.pattern.track_count() == 0 {
            log::debug!(target: "audio::scheduler", "start() with no tracks ignored");
            return;
        }
        control.stop = false;
        control.start_pending = true;
        self.shared.wake.notify_all();
    }

    /// Ask the timing thread to stop. Does not wait; the in-flight step may
    /// still complete. Use [`wait_stopped`](Self::wait_stopped) to block.
    pub fn stop(&self) {
        let mut control = self.shared.lock_control();
        control.stop = true;
        if !control.running {
            control.start_pending = false;
        }
        self.shared.wake.notify_all();
    }

    /// Stop playback and end the timing thread for good.
    pub fn shutdown(&self) {
        let mut control = self.shared.lock_control();
        control.stop = true;
        control.shutdown = true;
        control.start_pending = false;
        self.shared.wake.notify_all();
    }

    /// Block until the timing thread is idle or `timeout` elapses.
    /// Returns true when idle.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut control = self.shared.lock_control();
        loop {
            if !control.running && !control.start_pending {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            control = match self.shared.wake.wait_timeout(control, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    /// Whether the timing thread has exited.
    pub fn is_shut_down(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Pass being played, if playing.
    pub fn current_pass(&self) -> Option<Pass> {
        match self.shared.current_pass.load(Ordering::Relaxed) {
            0 => None,
            pass => Some(pass),
        }
    }

    /// Step most recently triggered, if playing.
    pub fn current_step(&self) -> Option<usize> {
        match self.shared.current_step.load(Ordering::Relaxed) {
            NO_STEP => None,
            step => Some(step),
        }
    }

    /// Receiver for playback events. All clones share one queue.
    pub fn events(&self) -> EventReceiver {
        self.events.clone()
    }

    pub fn telemetry_summary(&self) -> TelemetrySummary {
        self.shared
            .telemetry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }
}

fn check_step_counts(tracks: &[Track], expected: usize) -> Result<(), PatternError> {
    match tracks.iter().find(|t| t.steps() != expected) {
        Some(bad) => Err(PatternError::StepCount {
            expected,
            found: bad.steps(),
        }),
        None => Ok(()),
    }
}

impl Drop for PatternScheduler {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!(target: "audio::scheduler", "timing thread panicked");
            }
        }
    }
}

impl Shared {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Control lock held for the duration of a structural edit, so that
    /// `start()` cannot begin playback halfway through it.
    fn structural_guard(&self) -> Result<MutexGuard<'_, Control>, PatternError> {
        let control = self.lock_control();
        if control.shutdown {
            return Err(PatternError::ShutDown);
        }
        if control.running || control.start_pending {
            return Err(PatternError::Playing);
        }
        Ok(control)
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            log::trace!(target: "audio::scheduler", "event queue full, dropped {:?}", event);
        }
    }

    fn run(&self) {
        log::debug!(target: "audio::scheduler", "timing thread parked");
        while self.wait_for_start() {
            self.play_sequence();
        }
        self.emit(SchedulerEvent::ShutDown);
        log::info!(target: "audio::scheduler", "timing thread exiting");
    }

    /// Park until a start request or shutdown. Returns false on shutdown.
    fn wait_for_start(&self) -> bool {
        let mut control = self.lock_control();
        loop {
            if control.shutdown {
                return false;
            }
            if control.start_pending {
                control.start_pending = false;
                control.running = true;
                self.playing.store(true, Ordering::Release);
                return true;
            }
            control = self.wake.wait(control).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn should_halt(&self) -> bool {
        let control = self.lock_control();
        control.stop || control.shutdown || control.start_pending
    }

    /// Sleep until `deadline`. Returns false if woken to halt.
    fn sleep_until(&self, deadline: Instant) -> bool {
        let mut control = self.lock_control();
        loop {
            if control.shutdown || control.start_pending {
                return false;
            }
            if control.stop && self.settings.stop_wakes_sleep {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            control = match self.wake.wait_timeout(control, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn play_sequence(&self) {
        for track in self.pattern.tracks() {
            track.reset_automation();
        }
        self.emit(SchedulerEvent::Started);
        log::info!(
            target: "audio::scheduler",
            "playback started: {} tracks, {} steps, {} bpm ({} ms/step)",
            self.pattern.track_count(),
            self.pattern.total_steps(),
            self.pattern.tempo(),
            self.pattern.sleep_millis()
        );

        let mut pass: Pass = 1;
        let mut batch = BatchId::FIRST;
        let last_pass = 'passes: loop {
            let tracks = self.pattern.tracks();
            let total_steps = self.pattern.total_steps();
            self.current_pass.store(pass, Ordering::Relaxed);

            for step in 0..total_steps {
                if self.should_halt() {
                    break 'passes pass;
                }
                let step_started = Instant::now();
                self.current_step.store(step, Ordering::Relaxed);

                let triggered = self.trigger_step(&tracks, pass, step, batch);
                batch = batch.next();
                self.emit(SchedulerEvent::StepPlayed {
                    pass,
                    step,
                    triggered,
                });

                if self.should_halt() {
                    break 'passes pass;
                }
                let interval = Duration::from_millis(self.pattern.sleep_millis());
                let deadline = step_started + interval;
                if !self.sleep_until(deadline) {
                    break 'passes pass;
                }
                self.record_lateness(deadline, interval);
            }

            for (index, track) in tracks.iter().enumerate() {
                if track.announce_pass(pass) {
                    match track.active_automation() {
                        Some(item) => log::debug!(
                            target: "audio::scheduler",
                            "track {} ({}): {} automation active for passes {}..={}",
                            index, track.name(), item.kind().name(), item.first_pass(), item.last_pass()
                        ),
                        None => log::debug!(
                            target: "audio::scheduler",
                            "track {} ({}): automation idle after pass {}",
                            index, track.name(), pass
                        ),
                    }
                }
            }
            self.emit(SchedulerEvent::PassCompleted(pass));
            self.maybe_log_telemetry(pass);
            pass = pass.saturating_add(1);
        };

        self.current_pass.store(0, Ordering::Relaxed);
        self.current_step.store(NO_STEP, Ordering::Relaxed);
        {
            let mut control = self.lock_control();
            control.running = false;
            self.playing.store(false, Ordering::Release);
            self.wake.notify_all();
        }
        self.emit(SchedulerEvent::Stopped { pass: last_pass });
        log::info!(target: "audio::scheduler", "playback stopped during pass {}", last_pass);
    }

    /// Trigger every track for one step and commit the batch.
    /// Returns how many voices started.
    fn trigger_step(&self, tracks: &[Arc<Track>], pass: Pass, step: usize, batch: BatchId) -> usize {
        let mut triggered = 0;
        for track in tracks {
            let gate = track.gate(pass);
            if track.play_step(step, batch, gate) {
                triggered += 1;
            }
        }
        if triggered > 0 {
            match catch_unwind(AssertUnwindSafe(|| self.device.commit(batch))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!(target: "audio::scheduler", "commit of batch {} failed: {}", batch, e)
                }
                Err(_) => {
                    log::warn!(target: "audio::scheduler", "device panicked committing batch {}", batch)
                }
            }
        }
        triggered
    }

    fn record_lateness(&self, deadline: Instant, interval: Duration) {
        let lateness = Instant::now().saturating_duration_since(deadline);
        if let Ok(mut telemetry) = self.telemetry.try_lock() {
            telemetry.record(lateness, interval);
        }
    }

    fn maybe_log_telemetry(&self, pass: Pass) {
        let interval = self.settings.telemetry_interval_passes;
        if interval == 0 || pass % interval != 0 {
            return;
        }
        if let Ok(mut telemetry) = self.telemetry.try_lock() {
            let s = telemetry.take_summary();
            log::debug!(
                target: "audio::scheduler",
                "pass {}: {} steps woke {}us late on average, worst {}us ({} permille of a step), {} overruns ({} total)",
                pass, s.steps, s.mean_late_us, s.worst_late_us, s.worst_share_permille,
                s.overruns, s.total_overruns
            );
        }
    }
}
