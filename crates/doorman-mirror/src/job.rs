//! Daily batch job draining session files into the mirror.
//!
//! A scheduled run syncs registry credentials into the `users` table,
//! rotates the active session file so it becomes pending, mirrors every
//! pending file, archives the processed ones and reopens the writer under
//! a `batch_<HHMMSS>` label. Manual runs only mirror what is already
//! pending; the live session keeps its file.
//!
//! One failing file never stops the run, and a failing run never takes
//! down the station. Everything lands in the [`BatchOutcome`].

use crate::db::{MirrorConfig, MirrorDb};
use crate::error::{MirrorError, MirrorResult};
use crate::repo::{RecordRepository, SqliteRecordRepository, SqliteUserRepository, UserRepository};
use chrono::Local;
use doorman_core::LogTimestamp;
use doorman_engine::{Notice, NoticeBus};
use doorman_store::{AccessLogWriter, UserRegistry, archive, pending_files, read_events};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// What the last batch run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub ran_at: LogTimestamp,
    pub records: u64,
    pub files_with_errors: u64,
    pub success: bool,
    pub detail: Option<String>,
}

/// The batch mirror job.
///
/// Owns the scheduler task; runs can also be triggered manually at any
/// time. Cheap to share behind an [`Arc`].
pub struct BatchJob {
    db: MirrorDb,
    writer: Arc<AccessLogWriter>,
    registry: Arc<UserRegistry>,
    bus: NoticeBus,
    schedule: Mutex<(u8, u8)>,
    last_run: Mutex<Option<BatchOutcome>>,
    task: Mutex<Option<JoinHandle<()>>>,
    rt: Handle,
}

impl BatchJob {
    /// Create the job with the configured daily schedule.
    ///
    /// # Errors
    /// Fails when the schedule is out of range or when called outside a
    /// tokio runtime.
    pub fn new(
        config: &MirrorConfig,
        db: MirrorDb,
        writer: Arc<AccessLogWriter>,
        registry: Arc<UserRegistry>,
        bus: NoticeBus,
    ) -> MirrorResult<Arc<Self>> {
        validate_schedule(config.batch_hour, config.batch_minute)?;
        let rt = Handle::try_current().map_err(|_| {
            MirrorError::Configuration("batch job must be created inside a tokio runtime".into())
        })?;

        Ok(Arc::new(Self {
            db,
            writer,
            registry,
            bus,
            schedule: Mutex::new((config.batch_hour, config.batch_minute)),
            last_run: Mutex::new(None),
            task: Mutex::new(None),
            rt,
        }))
    }

    /// Start (or restart) the daily scheduler task.
    pub fn start_schedule(self: &Arc<Self>) {
        let job = Arc::clone(self);
        let handle = self.rt.spawn(job.run_loop());
        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        let (hour, minute) = self.scheduled_at();
        info!(hour, minute, "Batch scheduler started");
    }

    /// Change the daily run time and restart the scheduler.
    ///
    /// # Errors
    /// Fails when hour or minute are out of range; the previous schedule
    /// stays in effect.
    pub fn reschedule(self: &Arc<Self>, hour: u8, minute: u8) -> MirrorResult<()> {
        validate_schedule(hour, minute)?;
        *self.schedule.lock().unwrap_or_else(PoisonError::into_inner) = (hour, minute);
        info!(hour, minute, "Batch rescheduled");
        self.start_schedule();
        Ok(())
    }

    /// Stop the scheduler task. Manual runs keep working.
    pub fn stop(&self) {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
            debug!("Batch scheduler stopped");
        }
    }

    /// The configured daily run time as (hour, minute).
    pub fn scheduled_at(&self) -> (u8, u8) {
        *self.schedule.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// What the last run did, if any run has happened.
    pub fn last_run(&self) -> Option<BatchOutcome> {
        self.last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A full scheduled run: sync users, rotate, mirror, reopen.
    pub async fn run_scheduled(&self) -> BatchOutcome {
        info!("Scheduled batch run starting");
        self.bus.publish(Notice::BatchStarted { manual: false });

        self.sync_users().await;
        self.rotate_active();
        let outcome = self.drain_pending().await;
        self.reopen_writer();

        self.finish(outcome)
    }

    /// Mirror already-pending files without touching the live session.
    pub async fn run_manual(&self) -> BatchOutcome {
        info!("Manual batch run starting");
        self.bus.publish(Notice::BatchStarted { manual: true });

        let outcome = self.drain_pending().await;
        self.finish(outcome)
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            let (hour, minute) = self.scheduled_at();
            let wait = until_next(hour, minute);
            debug!(
                hour,
                minute,
                wait_secs = wait.as_secs(),
                "Sleeping until next batch run"
            );
            tokio::time::sleep(wait).await;
            self.run_scheduled().await;
        }
    }

    /// Push every registry credential into the `users` table.
    ///
    /// Insert-if-absent per credential; a failing row is logged and the
    /// rest still sync.
    async fn sync_users(&self) {
        let repo = SqliteUserRepository::new(self.db.pool().clone());
        let mut synced = 0u32;
        let mut skipped = 0u32;

        for credential in self.registry.all() {
            match repo.ensure(&credential).await {
                Ok(true) => synced += 1,
                Ok(false) => skipped += 1,
                Err(e) => {
                    error!(uid = credential.uid.as_str(), error = %e, "Syncing credential failed");
                }
            }
        }

        info!(synced, skipped, "Registry sync finished");
    }

    /// Close the active session file so the sweep below picks it up.
    fn rotate_active(&self) {
        if self.writer.label().is_none() {
            return;
        }
        if let Some(path) = self.writer.active_path() {
            info!(file = %path.display(), "Rotating active session file");
        }
        self.writer.close();
    }

    async fn drain_pending(&self) -> BatchOutcome {
        let data_dir = self.writer.config().data_dir.clone();
        let active = self.writer.active_path();

        let files = match pending_files(&data_dir, active.as_deref()) {
            Ok(files) => files,
            Err(e) => {
                error!(error = %e, "Listing pending session files failed");
                return BatchOutcome {
                    ran_at: LogTimestamp::now(),
                    records: 0,
                    files_with_errors: 1,
                    success: false,
                    detail: Some(e.to_string()),
                };
            }
        };

        if files.is_empty() {
            info!("No pending session files");
            return BatchOutcome {
                ran_at: LogTimestamp::now(),
                records: 0,
                files_with_errors: 0,
                success: true,
                detail: Some("no pending files".to_string()),
            };
        }

        info!(files = files.len(), "Mirroring pending session files");
        let mut records = 0u64;
        let mut failed = 0u64;

        for path in &files {
            match self.mirror_file(path).await {
                Ok(count) => {
                    records += count;
                    info!(file = %path.display(), count, "Session file mirrored");
                }
                Err(e) => {
                    failed += 1;
                    error!(file = %path.display(), error = %e, "Mirroring session file failed");
                }
            }
        }

        BatchOutcome {
            ran_at: LogTimestamp::now(),
            records,
            files_with_errors: failed,
            success: failed == 0,
            detail: (failed > 0).then(|| format!("{failed} files failed")),
        }
    }

    async fn mirror_file(&self, path: &Path) -> MirrorResult<u64> {
        let history_dir = self.writer.config().history_dir.clone();

        let events = read_events(path)?;
        if events.is_empty() {
            debug!(file = %path.display(), "Empty session file, archiving without records");
            archive(path, &history_dir)?;
            return Ok(0);
        }

        let repo = SqliteRecordRepository::new(self.db.pool().clone());
        let inserted = repo.insert_batch(&events).await?;
        archive(path, &history_dir)?;
        Ok(inserted)
    }

    fn reopen_writer(&self) {
        let label = format!("batch_{}", Local::now().format("%H%M%S"));
        match self.writer.reopen(&label) {
            Ok(path) => info!(file = %path.display(), "Session writer reopened"),
            Err(e) => error!(error = %e, "Reopening the session writer failed"),
        }
    }

    fn finish(&self, outcome: BatchOutcome) -> BatchOutcome {
        info!(
            records = outcome.records,
            failed_files = outcome.files_with_errors,
            success = outcome.success,
            "Batch run finished"
        );
        self.bus.publish(Notice::BatchCompleted {
            records: outcome.records,
            errors: outcome.files_with_errors,
            success: outcome.success,
        });
        *self
            .last_run
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        outcome
    }
}

fn validate_schedule(hour: u8, minute: u8) -> MirrorResult<()> {
    if hour > 23 {
        return Err(MirrorError::Schedule(format!(
            "hour must be 0-23, got {hour}"
        )));
    }
    if minute > 59 {
        return Err(MirrorError::Schedule(format!(
            "minute must be 0-59, got {minute}"
        )));
    }
    Ok(())
}

/// Wall-clock wait until the next daily occurrence of `hour:minute`.
fn until_next(hour: u8, minute: u8) -> Duration {
    let now = Local::now().naive_local();
    let Some(mut target) = now
        .date()
        .and_hms_opt(u32::from(hour), u32::from(minute), 0)
    else {
        return Duration::from_secs(24 * 60 * 60);
    };
    if target <= now {
        target += chrono::Duration::days(1);
    }
    (target - now).to_std().unwrap_or(Duration::from_secs(1))
}
