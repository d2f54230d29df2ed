//! Session access log.
//!
//! Every authorization attempt becomes one CSV row in the current session
//! file, `{label}_{date}.csv` under the data directory, mirrored into the
//! backup directory as `{label}_{date}_backup.csv`. A binary pointer
//! sidecar tracks which file is live; see [`crate::pointer`].
//!
//! Appends open, write, flush and close the file each time. Slow, but the
//! write rate is human-paced (one row per tap) and it means the row is on
//! disk before the function returns.

use crate::csv;
use crate::error::StoreResult;
use crate::mirrored::{HealReport, MirroredFile};
use crate::pointer::PointerFile;
use chrono::Local;
use doorman_core::AccessEvent;
use doorman_core::constants::{FILE_DATE_FORMAT, LOG_HEADER};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Where the log keeps its three directories.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Primary session files and the pointer sidecar.
    pub data_dir: PathBuf,
    /// Mirror copies.
    pub backup_dir: PathBuf,
    /// Processed session files end up here after a batch run.
    pub history_dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data_logs"),
            backup_dir: PathBuf::from("data_logs_backup"),
            history_dir: PathBuf::from("data_logs/history"),
        }
    }
}

impl LogConfig {
    /// The default layout rooted somewhere other than the working directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data_logs"),
            backup_dir: root.join("data_logs_backup"),
            history_dir: root.join("data_logs/history"),
        }
    }

    fn primary_path(&self, label: &str, date: &str) -> PathBuf {
        self.data_dir.join(format!("{label}_{date}.csv"))
    }

    fn backup_path(&self, label: &str, date: &str) -> PathBuf {
        self.backup_dir.join(format!("{label}_{date}_backup.csv"))
    }
}

/// What [`AccessLogWriter::heal`] had to fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogHeal {
    pub files: HealReport,
    pub pointer_recreated: bool,
}

impl LogHeal {
    pub fn any(&self) -> bool {
        self.files.any() || self.pointer_recreated
    }
}

struct WriterState {
    files: MirroredFile,
    label: String,
    open: bool,
    session_events: u64,
}

/// Appender for the current session's access log.
///
/// All mutation happens under one internal mutex, so a writer shared behind
/// an `Arc` is safe to use from the reader-thread fast path, the timers and
/// the batch job at once.
pub struct AccessLogWriter {
    config: LogConfig,
    pointer: PointerFile,
    state: Mutex<WriterState>,
}

impl AccessLogWriter {
    /// Open a session labelled `label`, creating today's files and pointing
    /// the sidecar at the primary.
    pub fn open(config: LogConfig, label: &str) -> StoreResult<Self> {
        let date = Local::now().format(FILE_DATE_FORMAT).to_string();
        let files = MirroredFile::new(
            config.primary_path(label, &date),
            config.backup_path(label, &date),
            LOG_HEADER,
        );
        files.ensure()?;

        let pointer = PointerFile::in_dir(&config.data_dir);
        pointer.save(files.primary())?;

        info!(file = %files.primary().display(), "Access log session opened");

        Ok(Self {
            config,
            pointer,
            state: Mutex::new(WriterState {
                files,
                label: label.to_string(),
                open: true,
                session_events: 0,
            }),
        })
    }

    /// Append one event.
    ///
    /// # Errors
    /// `Error::NoActiveSession` when the writer is closed; I/O errors when
    /// the primary write fails. Backup trouble never surfaces here.
    pub fn append(&self, event: &AccessEvent) -> StoreResult<()> {
        let mut state = self.lock_state();
        if !state.open {
            return Err(doorman_core::Error::NoActiveSession.into());
        }

        let row = format_event(event);
        let healed = state.files.append_line(&row)?;
        if healed.any() {
            debug!(?healed, "Log files repaired before append");
        }

        if !self.pointer.exists() {
            warn!("Session pointer was missing, regenerating");
            self.pointer.save(state.files.primary())?;
        }

        state.session_events += 1;
        Ok(())
    }

    /// Rename the live session, moving both files and retargeting the
    /// pointer. Returns the new primary path.
    pub fn rename_session(&self, new_label: &str) -> StoreResult<PathBuf> {
        let mut state = self.lock_state();
        if !state.open {
            return Err(doorman_core::Error::NoActiveSession.into());
        }

        let date = Local::now().format(FILE_DATE_FORMAT).to_string();
        let new_primary = self.config.primary_path(new_label, &date);
        let new_backup = self.config.backup_path(new_label, &date);

        state.files.rename_to(new_primary, new_backup)?;
        self.pointer.save(state.files.primary())?;
        state.label = new_label.to_string();

        info!(file = %state.files.primary().display(), "Session renamed");
        Ok(state.files.primary().to_path_buf())
    }

    /// Close the current session (if any) and start a fresh one under
    /// `label`. Returns the new primary path.
    ///
    /// The previous file is left in place, which makes it eligible for the
    /// next batch pickup.
    pub fn reopen(&self, label: &str) -> StoreResult<PathBuf> {
        let mut state = self.lock_state();
        if state.open {
            info!(
                file = %state.files.primary().display(),
                events = state.session_events,
                "Access log session closed"
            );
        }

        let date = Local::now().format(FILE_DATE_FORMAT).to_string();
        let files = MirroredFile::new(
            self.config.primary_path(label, &date),
            self.config.backup_path(label, &date),
            LOG_HEADER,
        );
        files.ensure()?;
        self.pointer.save(files.primary())?;

        info!(file = %files.primary().display(), "Access log session opened");

        state.files = files;
        state.label = label.to_string();
        state.open = true;
        state.session_events = 0;
        Ok(state.files.primary().to_path_buf())
    }

    /// Close the session. Idempotent; appends afterwards fail until
    /// [`AccessLogWriter::reopen`].
    pub fn close(&self) {
        let mut state = self.lock_state();
        if !state.open {
            return;
        }
        info!(
            file = %state.files.primary().display(),
            events = state.session_events,
            "Access log session closed"
        );
        state.open = false;
    }

    /// Primary path of the live session, `None` when closed.
    pub fn active_path(&self) -> Option<PathBuf> {
        let state = self.lock_state();
        state.open.then(|| state.files.primary().to_path_buf())
    }

    /// Label of the live session, `None` when closed.
    pub fn label(&self) -> Option<String> {
        let state = self.lock_state();
        state.open.then(|| state.label.clone())
    }

    /// Rows appended since the session was (re)opened.
    pub fn session_events(&self) -> u64 {
        self.lock_state().session_events
    }

    /// Check files and pointer, repairing whatever is missing. No-op when
    /// the writer is closed.
    pub fn heal(&self) -> StoreResult<LogHeal> {
        let state = self.lock_state();
        if !state.open {
            return Ok(LogHeal::default());
        }

        let files = state.files.ensure()?;
        let pointer_recreated = if self.pointer.exists() {
            false
        } else {
            self.pointer.save(state.files.primary())?;
            true
        };

        Ok(LogHeal {
            files,
            pointer_recreated,
        })
    }

    /// Directory layout this writer was opened with.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn format_event(event: &AccessEvent) -> String {
    let timestamp = event.timestamp.format();
    let station = event.station_id.to_string();
    csv::format_row(&[
        &timestamp,
        event.uid.as_str(),
        event.decision.as_str(),
        &station,
    ])
}
