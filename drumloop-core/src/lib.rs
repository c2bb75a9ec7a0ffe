//! # drumloop-core
//!
//! Application glue for the drumloop engine: configuration, logging setup
//! and the editor-facing [`Session`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use drumloop_core::{Config, Session};
//! use drumloop_core::audio::{DrumPiece, NullBackend};
//!
//! drumloop_core::init_logging(false)?;
//!
//! // 1. Session with meter and runtime settings from config
//! let config = Config::load();
//! let session = Session::new(&config, Arc::new(NullBackend::new()))?;
//!
//! // 2. Tracks and grid edits happen while stopped
//! let kick = session.load_track("kick", "kit/kick.wav".as_ref())?;
//! kick.set_step(0, true);
//!
//! // 3. Transport
//! session.start();
//! for event in session.events().iter() { /* follow the playhead */ }
//! ```

pub mod config;
pub mod logging;
pub mod session;

pub use config::Config;
pub use logging::init_logging;
pub use session::{Session, SessionError, SessionSnapshot};

pub use drumloop_audio as audio;
pub use drumloop_types as types;
