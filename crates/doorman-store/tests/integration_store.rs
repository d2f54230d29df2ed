//! Integration tests for the durable file layer
//!
//! These tests drive the writer, registry, reader and sweeper together
//! against a real temporary directory, the way a station session does.
//!
//! Run with: cargo test --package doorman-store --test integration_store

use std::sync::Arc;
use std::time::Duration;

use doorman_core::{AccessEvent, Credential, Decision, Uid};
use doorman_store::{
    AccessLogWriter, LogConfig, PointerFile, RegistryConfig, ResilienceSweeper, StoreError,
    UserRegistry, archive, pending_files, read_events,
};
use tempfile::tempdir;

fn uid(raw: &str) -> Uid {
    Uid::new(raw).unwrap()
}

#[test]
fn test_session_lifecycle_append_close_append() {
    let dir = tempdir().unwrap();
    let writer = AccessLogWriter::open(LogConfig::under(dir.path()), "station").unwrap();

    writer
        .append(&AccessEvent::new(uid("EB-EE-C0-01"), Decision::Granted, 1))
        .unwrap();
    writer
        .append(&AccessEvent::new(uid("11-22-33-44"), Decision::Denied, 1))
        .unwrap();
    assert_eq!(writer.session_events(), 2);

    writer.close();
    let err = writer
        .append(&AccessEvent::new(uid("EB-EE-C0-01"), Decision::Granted, 1))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Domain(doorman_core::Error::NoActiveSession)
    ));
}

#[test]
fn test_appends_survive_primary_deletion_mid_session() {
    let dir = tempdir().unwrap();
    let writer = AccessLogWriter::open(LogConfig::under(dir.path()), "station").unwrap();
    let primary = writer.active_path().unwrap();

    writer
        .append(&AccessEvent::new(uid("AA-01"), Decision::Granted, 1))
        .unwrap();
    std::fs::remove_file(&primary).unwrap();
    writer
        .append(&AccessEvent::new(uid("AA-02"), Decision::Denied, 1))
        .unwrap();

    // Both rows are back: the first from the backup copy, the second fresh.
    let events = read_events(&primary).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].uid.as_str(), "AA-01");
    assert_eq!(events[1].uid.as_str(), "AA-02");
}

#[test]
fn test_disk_round_trip_preserves_event_fields() {
    let dir = tempdir().unwrap();
    let writer = AccessLogWriter::open(LogConfig::under(dir.path()), "station").unwrap();

    let written = AccessEvent::new(uid("04-A3-F2-5B"), Decision::Granted, 7);
    writer.append(&written).unwrap();

    let events = read_events(&writer.active_path().unwrap()).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].uid, written.uid);
    assert_eq!(events[0].decision, written.decision);
    assert_eq!(events[0].station_id, 7);
    // Rows carry second precision; compare the rendered form.
    assert_eq!(events[0].timestamp.format(), written.timestamp.format());
}

#[test]
fn test_rename_session_moves_files_and_pointer() {
    let dir = tempdir().unwrap();
    let writer = AccessLogWriter::open(LogConfig::under(dir.path()), "pending").unwrap();
    let old_primary = writer.active_path().unwrap();
    writer
        .append(&AccessEvent::new(uid("AA-01"), Decision::Granted, 1))
        .unwrap();

    let new_primary = writer.rename_session("visitors").unwrap();

    assert!(!old_primary.exists());
    assert!(new_primary.exists());
    assert_eq!(writer.label().as_deref(), Some("visitors"));

    let pointer = PointerFile::in_dir(&writer.config().data_dir);
    let record = pointer.load().unwrap().unwrap();
    assert_eq!(record.target, new_primary);

    let events = read_events(&new_primary).unwrap();
    assert_eq!(events.len(), 1);
}

#[test]
fn test_reopen_stages_previous_file_for_batch() {
    let dir = tempdir().unwrap();
    let config = LogConfig::under(dir.path());
    let writer = AccessLogWriter::open(config.clone(), "station").unwrap();
    let first_primary = writer.active_path().unwrap();
    writer
        .append(&AccessEvent::new(uid("AA-01"), Decision::Granted, 1))
        .unwrap();

    let second_primary = writer.reopen("batch_120000").unwrap();
    assert_ne!(first_primary, second_primary);
    assert_eq!(writer.session_events(), 0);

    // The closed file is pending; the fresh one is excluded as active.
    let pending = pending_files(&config.data_dir, Some(&second_primary)).unwrap();
    assert_eq!(pending, vec![first_primary.clone()]);

    let archived = archive(&first_primary, &config.history_dir).unwrap();
    assert!(!first_primary.exists());
    assert!(archived.starts_with(&config.history_dir));
    assert!(pending_files(&config.data_dir, Some(&second_primary))
        .unwrap()
        .is_empty());
}

#[test]
fn test_pending_files_skip_registry_sharing_the_data_dir() {
    let dir = tempdir().unwrap();
    let log_config = LogConfig::under(dir.path());
    let writer = AccessLogWriter::open(log_config.clone(), "station").unwrap();
    let registry = UserRegistry::open(RegistryConfig::under(dir.path())).unwrap();
    registry
        .save(Credential::new(uid("EB-EE-C0-01"), "Admin"))
        .unwrap();

    let active = writer.active_path().unwrap();
    let pending = pending_files(&log_config.data_dir, Some(&active)).unwrap();
    assert!(pending.is_empty());
}

#[test]
fn test_registry_round_trip_across_restarts() {
    let dir = tempdir().unwrap();
    let config = RegistryConfig::under(dir.path());

    {
        let registry = UserRegistry::open(config.clone()).unwrap();
        registry
            .save(Credential::new(uid("11-22-33-44"), "Ana Beatriz"))
            .unwrap();
        registry
            .save(Credential::new(uid("55-66-77-88"), "Silva, Ana"))
            .unwrap();
    }

    let reopened = UserRegistry::open(config).unwrap();
    assert_eq!(reopened.count(), 2);
    let ana = reopened.find(&uid("55-66-77-88")).unwrap();
    assert_eq!(ana.display_name, "Silva, Ana");
}

#[test]
fn test_registry_survives_primary_loss_between_restarts() {
    let dir = tempdir().unwrap();
    let config = RegistryConfig::under(dir.path());

    let primary = {
        let registry = UserRegistry::open(config.clone()).unwrap();
        registry
            .save(Credential::new(uid("11-22-33-44"), "Ana"))
            .unwrap();
        registry.primary_path().to_path_buf()
    };
    std::fs::remove_file(&primary).unwrap();

    let reopened = UserRegistry::open(config).unwrap();
    assert_eq!(reopened.count(), 1);
    assert!(reopened.exists(&uid("11-22-33-44")));
}

#[test]
fn test_sweeper_repairs_log_and_registry_together() {
    let dir = tempdir().unwrap();
    let writer = Arc::new(AccessLogWriter::open(LogConfig::under(dir.path()), "station").unwrap());
    let registry = Arc::new(UserRegistry::open(RegistryConfig::under(dir.path())).unwrap());

    writer
        .append(&AccessEvent::new(uid("AA-01"), Decision::Granted, 1))
        .unwrap();
    registry
        .save(Credential::new(uid("AA-01"), "Ana"))
        .unwrap();

    let log_primary = writer.active_path().unwrap();
    std::fs::remove_file(&log_primary).unwrap();
    std::fs::remove_file(registry.primary_path()).unwrap();

    let sweeper = ResilienceSweeper::new(
        Arc::clone(&writer),
        Arc::clone(&registry),
        Duration::from_secs(30),
    );
    let report = sweeper.sweep_once();
    assert!(report.any());
    assert!(log_primary.exists());
    assert!(registry.primary_path().exists());

    // Repaired files still hold their rows.
    assert_eq!(read_events(&log_primary).unwrap().len(), 1);
    assert_eq!(registry.reload().unwrap(), 1);
}
