//! Log file setup for applications embedding the engine.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use simplelog::{Config, LevelFilter, WriteLogger};

#[derive(Debug)]
pub enum LoggingError {
    Io(std::io::Error),
    /// This module already installed the global logger.
    AlreadyInitialized,
    /// Some other global logger is installed.
    Logger(log::SetLoggerError),
}

/// Set before the log file is touched, so a repeated init never truncates
/// the file the installed logger is writing to.
static INSTALLED: AtomicBool = AtomicBool::new(false);

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot create log file: {}", e),
            Self::AlreadyInitialized => write!(f, "logger already initialized"),
            Self::Logger(e) => write!(f, "cannot install logger: {}", e),
        }
    }
}

impl std::error::Error for LoggingError {}

impl From<std::io::Error> for LoggingError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<log::SetLoggerError> for LoggingError {
    fn from(e: log::SetLoggerError) -> Self {
        Self::Logger(e)
    }
}

/// `<config_dir>/drumloop/drumloop.log`
pub fn default_log_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("drumloop")
        .join("drumloop.log")
}

pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    }
}

/// Install the global file logger at the default path, falling back to
/// `/tmp/drumloop.log`. Returns the path in use.
pub fn init_logging(verbose: bool) -> Result<PathBuf, LoggingError> {
    let log_path = default_log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match init_logging_at(&log_path, verbose) {
        Err(LoggingError::Io(_)) => {
            let fallback = PathBuf::from("/tmp/drumloop.log");
            init_logging_at(&fallback, verbose)?;
            Ok(fallback)
        }
        other => other.map(|()| log_path),
    }
}

/// Install the global file logger writing to `path` (truncated). Fails
/// without touching `path` once a logger is installed.
pub fn init_logging_at(path: &Path, verbose: bool) -> Result<(), LoggingError> {
    if INSTALLED.swap(true, Ordering::AcqRel) {
        return Err(LoggingError::AlreadyInitialized);
    }
    let log_level = level_for(verbose);
    let log_file = match File::create(path) {
        Ok(file) => file,
        Err(e) => {
            INSTALLED.store(false, Ordering::Release);
            return Err(e.into());
        }
    };
    WriteLogger::init(log_level, Config::default(), log_file)?;
    log::info!("drumloop starting (log level: {:?})", log_level);
    Ok(())
}
