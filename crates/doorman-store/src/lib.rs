//! Durable file storage for access stations.
//!
//! Everything an operator might need to recover after a crash lives in
//! plain CSV files on local disk. SQLite mirroring is a separate, optional
//! concern; this crate is the part that must never lose a row.
//!
//! # Architecture
//!
//! ```text
//! data_logs/                       data_logs_backup/
//! ├── station_2025-08-25.csv       ├── station_2025-08-25_backup.csv
//! ├── user_registry.csv            ├── user_registry_backup.csv
//! ├── .session_pointer.dat         └── ...
//! └── history/
//!     └── station_2025-08-24.csv   (processed by the batch job)
//! ```
//!
//! # Core Concepts
//!
//! - **Mirrored pair**: every file is written twice, to a primary and a
//!   backup directory. The primary write must succeed; the backup write is
//!   best-effort. A missing half is restored from the survivor.
//! - **Session pointer**: a small binary sidecar naming the CSV file the
//!   current session appends to, so tooling and recovery find it without
//!   guessing from timestamps.
//! - **Boot rewrite**: the user registry is re-written from its parsed
//!   contents on open, which normalizes UID casing and sheds rows that no
//!   longer parse.
//! - **Self-healing**: both the append path and a periodic
//!   [`ResilienceSweeper`] re-create files deleted underneath a running
//!   session.
//!
//! # Examples
//!
//! ```no_run
//! use doorman_core::{AccessEvent, Decision, Uid};
//! use doorman_store::{AccessLogWriter, LogConfig};
//!
//! # fn main() -> doorman_store::StoreResult<()> {
//! let writer = AccessLogWriter::open(LogConfig::default(), "station")?;
//! let uid = Uid::new("EB-EE-C0-01")?;
//! writer.append(&AccessEvent::new(uid, Decision::Granted, 1))?;
//! # Ok(())
//! # }
//! ```
//!
//! # Durability
//!
//! Appends open, write, flush and close the file every time. That is slow
//! by database standards and exactly right for a reader that sees a few
//! taps per minute: a power cut between taps can never take buffered rows
//! with it.

pub mod access_log;
pub mod csv;
pub mod error;
pub mod mirrored;
pub mod pointer;
pub mod reader;
pub mod registry;
pub mod resilience;

pub use access_log::{AccessLogWriter, LogConfig, LogHeal};
pub use error::{StoreError, StoreResult};
pub use mirrored::{HealReport, MirroredFile};
pub use pointer::{POINTER_FILE_NAME, PointerFile, PointerRecord};
pub use reader::{archive, pending_files, read_events};
pub use registry::{RegistryConfig, UserRegistry};
pub use resilience::{ResilienceSweeper, SweepReport};
