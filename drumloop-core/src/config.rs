use std::path::{Path, PathBuf};

use serde::Deserialize;

use drumloop_audio::SchedulerSettings;
use drumloop_types::Meter;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    defaults: DefaultsConfig,
    #[serde(default)]
    runtime: RuntimeConfig,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    tempo: Option<i64>,
    beats: Option<i64>,
    steps_per_beat: Option<i64>,
    voice_volume: Option<f32>,
}

#[derive(Deserialize, Default)]
struct RuntimeConfig {
    telemetry_interval_passes: Option<u32>,
    stop_wakes_sleep: Option<bool>,
    lateness_budget_us: Option<u32>,
}

pub struct Config {
    defaults: DefaultsConfig,
    runtime: RuntimeConfig,
}

impl Default for Config {
    /// The embedded defaults with no user overlay.
    fn default() -> Self {
        let base = embedded();
        Config {
            defaults: base.defaults,
            runtime: base.runtime,
        }
    }
}

impl Config {
    /// Embedded defaults overlaid with `~/.config/drumloop/config.toml`.
    pub fn load() -> Self {
        match user_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Self::default(),
        }
    }

    /// Embedded defaults overlaid with the file at `path`. A missing,
    /// unreadable or malformed file is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                log::warn!(target: "core::config", "could not read config {}: {}", path.display(), e);
                return Self::default();
            }
        };
        match Self::from_toml_str(&contents) {
            Ok(config) => {
                log::debug!(target: "core::config", "loaded config {}", path.display());
                config
            }
            Err(e) => {
                log::warn!(target: "core::config", "ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Embedded defaults overlaid with a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let user: ConfigFile = toml::from_str(contents)?;
        let mut base = embedded();
        merge_defaults(&mut base.defaults, user.defaults);
        merge_runtime(&mut base.runtime, user.runtime);
        Ok(Config {
            defaults: base.defaults,
            runtime: base.runtime,
        })
    }

    /// Starting meter for new patterns, clamped like the pattern setters.
    pub fn meter(&self) -> Meter {
        let fallback = Meter::default();
        Meter::new(
            self.defaults.beats.unwrap_or(fallback.beats() as i64),
            self.defaults
                .steps_per_beat
                .unwrap_or(fallback.steps_per_beat() as i64),
            self.defaults.tempo.unwrap_or(fallback.tempo() as i64),
        )
    }

    /// Initial voice volume for new tracks (clamped to 0.0..=1.0).
    pub fn voice_volume(&self) -> f32 {
        match self.defaults.voice_volume {
            Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => 1.0,
        }
    }

    /// Passes between timing summaries (clamped to 1..=1000).
    pub fn telemetry_interval_passes(&self) -> u32 {
        self.runtime
            .telemetry_interval_passes
            .unwrap_or(16)
            .clamp(1, 1_000)
    }

    pub fn stop_wakes_sleep(&self) -> bool {
        self.runtime.stop_wakes_sleep.unwrap_or(true)
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        let fallback = SchedulerSettings::default();
        SchedulerSettings {
            telemetry_interval_passes: self.telemetry_interval_passes(),
            stop_wakes_sleep: self.stop_wakes_sleep(),
            lateness_budget_us: self
                .runtime
                .lateness_budget_us
                .unwrap_or(fallback.lateness_budget_us),
            event_capacity: fallback.event_capacity,
        }
    }
}

fn embedded() -> ConfigFile {
    toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
        log::error!(target: "core::config", "embedded config.toml is invalid: {}", e);
        ConfigFile::default()
    })
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("drumloop").join("config.toml"))
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.tempo.is_some() {
        base.tempo = user.tempo;
    }
    if user.beats.is_some() {
        base.beats = user.beats;
    }
    if user.steps_per_beat.is_some() {
        base.steps_per_beat = user.steps_per_beat;
    }
    if user.voice_volume.is_some() {
        base.voice_volume = user.voice_volume;
    }
}

fn merge_runtime(base: &mut RuntimeConfig, user: RuntimeConfig) {
    if user.telemetry_interval_passes.is_some() {
        base.telemetry_interval_passes = user.telemetry_interval_passes;
    }
    if user.stop_wakes_sleep.is_some() {
        base.stop_wakes_sleep = user.stop_wakes_sleep;
    }
    if user.lateness_budget_us.is_some() {
        base.lateness_budget_us = user.lateness_budget_us;
    }
}
