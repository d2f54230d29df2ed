//! Access decisions, enrollment flow and session lifecycle for the Doorman
//! station.
//!
//! This crate is the control plane: it turns device lines into granted or
//! denied verdicts, runs the administrator-gated enrollment state machine,
//! and owns the session that binds a serial port to a durable log file.
//!
//! # Architecture
//!
//! ```text
//!                    ┌───────────────┐ start/stop/rename
//!  device line ────► │ AccessEngine  │ ◄──── StationSession ◄── operator
//!  (reader thread)   │  ModeMachine  │             │
//!       ▲            │  today cache  │         SerialLink
//!       │ '1'/'0'    └──────┬────────┘             │
//!       └── CommandSink ◄───┤                 AccessLogWriter
//!                           └─ NoticeBus ──► subscribers
//! ```
//!
//! # Core Concepts
//!
//! - **System mode**: exactly one of access, awaiting-admin or enrolling;
//!   the [`state::ModeMachine`] enforces the transition table and deadlines.
//! - **Fast/slow split**: the device reply is sent on the reader thread,
//!   everything durable happens on a worker fed through a bounded queue.
//! - **Notices**: every externally visible change is published as a typed
//!   [`Notice`] on a broadcast bus; subscribers may lag and lose old
//!   values, never block the station.
//!
//! # Example
//!
//! ```no_run
//! use doorman_engine::{AccessEngine, NoticeBus, StationConfig, StationSession};
//! use doorman_store::{AccessLogWriter, UserRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() -> doorman_engine::EngineResult<()> {
//! let config = StationConfig::load("doorman.json")?;
//! let writer = Arc::new(AccessLogWriter::open(config.log_config(), &config.session_label)?);
//! let registry = Arc::new(UserRegistry::open(config.registry_config())?);
//! let bus = NoticeBus::new();
//!
//! let engine = AccessEngine::new(&config, Arc::clone(&writer), Arc::clone(&registry), bus.clone())?;
//! let session = StationSession::new(&config, Arc::clone(&engine), writer, bus)?;
//!
//! session.start(None, None)?;
//! engine.start_enrollment()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod notice;
pub mod session;
pub mod state;

pub use config::StationConfig;
pub use engine::AccessEngine;
pub use error::{EngineError, EngineResult};
pub use notice::{DEFAULT_NOTICE_CAPACITY, Notice, NoticeBus};
pub use session::{SessionStatus, StationSession};
pub use state::{ModeChange, ModeMachine, SystemMode};
