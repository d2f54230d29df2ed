//! Periodic self-check of the durable files.
//!
//! Operators treat the data directory as theirs: files get copied away,
//! "cleaned up", or lost to a dying SD card. The sweeper re-runs the same
//! repairs the append path does, on a timer, so a deleted file is back
//! within one interval even when nobody taps a tag.

use crate::access_log::{AccessLogWriter, LogHeal};
use crate::registry::UserRegistry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What one sweep repaired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub log: LogHeal,
    pub registry_healed: bool,
}

impl SweepReport {
    pub fn any(&self) -> bool {
        self.log.any() || self.registry_healed
    }
}

/// Re-checks the access log and registry on a fixed interval.
pub struct ResilienceSweeper {
    log: Arc<AccessLogWriter>,
    registry: Arc<UserRegistry>,
    interval: Duration,
}

impl ResilienceSweeper {
    pub fn new(
        log: Arc<AccessLogWriter>,
        registry: Arc<UserRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            log,
            registry,
            interval,
        }
    }

    /// Run one sweep now. Failures are logged, never propagated; the next
    /// interval retries anyway.
    pub fn sweep_once(&self) -> SweepReport {
        let log = self.log.heal().unwrap_or_else(|e| {
            warn!(error = %e, "Log self-check failed");
            LogHeal::default()
        });
        let registry_healed = self.registry.heal().unwrap_or_else(|e| {
            warn!(error = %e, "Registry self-check failed");
            false
        });

        let report = SweepReport {
            log,
            registry_healed,
        };
        if report.any() {
            info!(?report, "Durable files repaired");
        }
        report
    }

    /// Spawn the sweep loop on the current runtime. The first sweep runs
    /// immediately, then once per interval. Abort the handle to stop it.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep_once();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_log::LogConfig;
    use crate::registry::RegistryConfig;
    use doorman_core::constants::DEFAULT_SWEEP_INTERVAL_SECS;
    use doorman_core::{AccessEvent, Credential, Decision, Uid};
    use tempfile::tempdir;

    fn rig(root: &std::path::Path) -> (Arc<AccessLogWriter>, Arc<UserRegistry>) {
        let log = Arc::new(AccessLogWriter::open(LogConfig::under(root), "station").unwrap());
        let registry = Arc::new(UserRegistry::open(RegistryConfig::under(root)).unwrap());
        (log, registry)
    }

    #[test]
    fn test_sweep_finds_nothing_on_healthy_files() {
        let dir = tempdir().unwrap();
        let (log, registry) = rig(dir.path());
        let sweeper = ResilienceSweeper::new(log, registry, Duration::from_secs(30));

        assert!(!sweeper.sweep_once().any());
    }

    #[test]
    fn test_sweep_restores_deleted_files() {
        let dir = tempdir().unwrap();
        let (log, registry) = rig(dir.path());
        let uid = Uid::new("11-22-33-44").unwrap();
        log.append(&AccessEvent::new(uid.clone(), Decision::Granted, 1))
            .unwrap();
        registry.save(Credential::new(uid, "Ana")).unwrap();

        let log_primary = log.active_path().unwrap();
        std::fs::remove_file(&log_primary).unwrap();
        std::fs::remove_file(registry.primary_path()).unwrap();

        let sweeper = ResilienceSweeper::new(log, registry, Duration::from_secs(30));
        let report = sweeper.sweep_once();

        assert!(report.log.files.restored_primary_from_backup);
        assert!(report.registry_healed);
        assert!(log_primary.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweeper_repairs_on_schedule() {
        let dir = tempdir().unwrap();
        let (log, registry) = rig(dir.path());
        let log_primary = log.active_path().unwrap();

        let sweeper = ResilienceSweeper::new(
            Arc::clone(&log),
            Arc::clone(&registry),
            Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        );
        let handle = sweeper.spawn();

        // Let the immediate first sweep run, then break the files.
        tokio::task::yield_now().await;
        std::fs::remove_file(&log_primary).unwrap();

        tokio::time::advance(Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS + 1)).await;
        tokio::task::yield_now().await;

        assert!(log_primary.exists());
        handle.abort();
    }
}
