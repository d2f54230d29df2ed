//! SQLite mirror of the durable CSV logs.
//!
//! The station's source of truth is the mirrored CSV pair managed by
//! `doorman-store`. This crate drains recorded sessions into a queryable
//! SQLite file once a day (or on demand), so reporting never touches the
//! files the station is writing.
//!
//! # Architecture
//!
//! - [`MirrorDb`] - connection pool with schema applied on open
//! - [`UserRepository`], [`RecordRepository`] - data access traits with
//!   SQLite implementations
//! - [`BatchJob`] - the daily scheduler and the run logic itself
//!
//! # Example
//!
//! ```no_run
//! use doorman_mirror::{BatchJob, MirrorConfig, MirrorDb};
//! # use std::sync::Arc;
//! # use doorman_engine::NoticeBus;
//! # use doorman_store::{AccessLogWriter, LogConfig, RegistryConfig, UserRegistry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let writer = Arc::new(AccessLogWriter::open(LogConfig::default(), "station")?);
//! let registry = Arc::new(UserRegistry::open(RegistryConfig::default())?);
//! let bus = NoticeBus::new();
//!
//! let config = MirrorConfig::new("doorman.db").schedule(23, 50);
//! let db = MirrorDb::open(config.clone()).await?;
//! let job = BatchJob::new(&config, db, writer, registry, bus)?;
//! job.start_schedule();
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod error;
pub mod job;
pub mod repo;

pub use db::{MirrorConfig, MirrorDb};
pub use error::{MirrorError, MirrorResult};
pub use job::{BatchJob, BatchOutcome};
pub use repo::{
    MirrorRecord, MirrorUser, RecordRepository, SqliteRecordRepository, SqliteUserRepository,
    UserRepository,
};
