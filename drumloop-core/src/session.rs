//! Editor-facing session: one pattern scheduler built from configuration,
//! plus the structural edits that are only legal while stopped.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use drumloop_audio::{
    DeviceHandle, DrumPiece, EventReceiver, PatternError, PatternScheduler, Track, TrackSnapshot,
};
use drumloop_types::{AutomationError, Meter};

use crate::config::Config;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    Pattern(PatternError),
    Automation(AutomationError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(e) => write!(f, "{}", e),
            Self::Automation(e) => write!(f, "invalid automation: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<PatternError> for SessionError {
    fn from(e: PatternError) -> Self {
        Self::Pattern(e)
    }
}

impl From<AutomationError> for SessionError {
    fn from(e: AutomationError) -> Self {
        Self::Automation(e)
    }
}

/// Serializable pattern: meter plus every track's grid and automation.
/// Sample data is not included; tracks are matched to kit pieces by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub meter: Meter,
    pub tracks: Vec<TrackSnapshot>,
}

pub struct Session {
    scheduler: PatternScheduler,
    voice_volume: f32,
}

impl Session {
    pub fn new(config: &Config, device: DeviceHandle) -> std::io::Result<Self> {
        let scheduler =
            PatternScheduler::with_settings(device, config.meter(), config.scheduler_settings())?;
        log::info!(
            target: "core::session",
            "session created: {} beats x {} steps at {} bpm",
            scheduler.beats(),
            scheduler.steps_per_beat(),
            scheduler.tempo()
        );
        Ok(Self {
            scheduler,
            voice_volume: config.voice_volume(),
        })
    }

    pub fn scheduler(&self) -> &PatternScheduler {
        &self.scheduler
    }

    pub fn meter(&self) -> Meter {
        self.scheduler.meter()
    }

    /// Add a track for `piece` at the configured voice volume.
    pub fn add_track(&self, piece: DrumPiece) -> Result<Arc<Track>, SessionError> {
        let track = self.scheduler.new_track(piece);
        track.set_volume(self.voice_volume);
        let index = self.scheduler.add_track(track)?;
        self.scheduler
            .track(index)
            .ok_or(SessionError::Pattern(PatternError::NoSuchTrack(index)))
    }

    /// Add a track from a WAV file. A file that fails to load still adds
    /// a (silent) track so the grid stays editable.
    pub fn load_track(&self, name: &str, path: &Path) -> Result<Arc<Track>, SessionError> {
        self.add_track(DrumPiece::load(name, path))
    }

    pub fn remove_track(&self, index: usize) -> Result<Arc<Track>, SessionError> {
        Ok(self.scheduler.remove_track(index)?)
    }

    pub fn tracks(&self) -> Vec<Arc<Track>> {
        self.scheduler.tracks()
    }

    /// Change the beat count, rebuilding tracks if the step count changes.
    /// Rejected while playing.
    pub fn set_beats(&self, beats: i64) -> Result<u32, SessionError> {
        let meter = self
            .scheduler
            .resize(beats, self.scheduler.steps_per_beat() as i64)?;
        Ok(meter.beats())
    }

    /// Change steps per beat, rebuilding tracks if the step count changes.
    /// Rejected while playing.
    pub fn set_steps_per_beat(&self, steps_per_beat: i64) -> Result<u32, SessionError> {
        let meter = self
            .scheduler
            .resize(self.scheduler.beats() as i64, steps_per_beat)?;
        Ok(meter.steps_per_beat())
    }

    /// Allowed while playing.
    pub fn set_tempo(&self, tempo: i64) -> u32 {
        self.scheduler.set_tempo(tempo)
    }

    pub fn start(&self) {
        self.scheduler.start();
    }

    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Stop and wait up to `timeout` for the timing thread to go idle.
    pub fn stop_and_wait(&self, timeout: Duration) -> bool {
        self.scheduler.stop();
        self.scheduler.wait_stopped(timeout)
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    pub fn events(&self) -> EventReceiver {
        self.scheduler.events()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            meter: self.meter(),
            tracks: self.tracks().iter().map(|t| t.snapshot()).collect(),
        }
    }

    /// Replace the pattern with `snapshot`. `kit` supplies the piece for
    /// each track name. Meter and tracks are installed together; invalid
    /// automation in the snapshot, or a restore while playing, changes
    /// nothing.
    pub fn restore(
        &self,
        snapshot: &SessionSnapshot,
        kit: impl Fn(&str) -> DrumPiece,
    ) -> Result<(), SessionError> {
        let meter = snapshot.meter;
        let steps = meter.total_steps();
        let tracks = snapshot
            .tracks
            .iter()
            .map(|s| {
                let track =
                    Track::from_snapshot(s, kit(&s.name), steps, Arc::clone(self.scheduler.device()));
                if let Ok(track) = &track {
                    if !track.piece().is_loaded() {
                        log::warn!(target: "core::session", "no sample for track {}", s.name);
                    }
                }
                track
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.scheduler.replace_all(meter, tracks)?;
        log::debug!(
            target: "core::session",
            "restored {} tracks at {} steps",
            snapshot.tracks.len(),
            steps
        );
        Ok(())
    }

    /// Stop playback and end the timing thread. Dropping the session does
    /// the same.
    pub fn shutdown(self) {
        self.scheduler.shutdown();
    }
}
