//! Reading recorded sessions back and staging them for the batch job.

use crate::csv;
use crate::error::{StoreError, StoreResult};
use doorman_core::constants::DEFAULT_STATION_ID;
use doorman_core::{AccessEvent, Decision, LogTimestamp, Uid};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Registry files share the data directory and must never be swept up as
/// pending sessions.
const REGISTRY_PREFIX: &str = "user_registry";

/// Read every event from a session file.
///
/// The first line is the header and is skipped unconditionally. Rows that
/// do not parse are logged and dropped; one vandalized line must not sink
/// the rest of the session.
pub fn read_events(path: &Path) -> StoreResult<Vec<AccessEvent>> {
    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let file = path.display().to_string();

    let mut events = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_event(line, &file, idx + 1) {
            Ok(event) => events.push(event),
            Err(e) => warn!(error = %e, "Skipping malformed row"),
        }
    }

    debug!(file, events = events.len(), "Session file read");
    Ok(events)
}

/// Session files in `data_dir` waiting to be mirrored.
///
/// Everything `*.csv` qualifies except the registry files and the file the
/// live session is still appending to. Paths are compared canonicalized,
/// so a relative `active` matches its absolute directory entry. Sorted by
/// name, which for dated session files is chronological.
pub fn pending_files(data_dir: &Path, active: Option<&Path>) -> StoreResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(data_dir, e)),
    };

    let active_canon = active.and_then(|p| p.canonicalize().ok());
    let mut pending = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(data_dir, e))?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !path.is_file() || !is_csv {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with(REGISTRY_PREFIX)
        {
            continue;
        }
        if let Some(active) = &active_canon
            && path.canonicalize().ok().as_ref() == Some(active)
        {
            continue;
        }
        pending.push(path);
    }

    pending.sort();
    Ok(pending)
}

/// Move a processed session file into the history directory.
///
/// A name collision gets a `_1`, `_2`, ... suffix instead of overwriting
/// whatever is already archived. Returns the final resting path.
pub fn archive(path: &Path, history_dir: &Path) -> StoreResult<PathBuf> {
    fs::create_dir_all(history_dir).map_err(|e| StoreError::io(history_dir, e))?;

    let name = path.file_name().ok_or_else(|| {
        StoreError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());

    let mut dest = history_dir.join(name);
    let mut suffix = 1;
    while dest.exists() {
        dest = history_dir.join(format!("{stem}_{suffix}.{ext}"));
        suffix += 1;
    }

    if fs::rename(path, &dest).is_err() {
        // Rename fails across filesystems; copy-and-delete covers that.
        fs::copy(path, &dest).map_err(|e| StoreError::io(&dest, e))?;
        fs::remove_file(path).map_err(|e| StoreError::io(path, e))?;
    }

    info!(from = %path.display(), to = %dest.display(), "Session file archived");
    Ok(dest)
}

fn parse_event(line: &str, file: &str, line_no: usize) -> StoreResult<AccessEvent> {
    let malformed = |reason: String| StoreError::MalformedRow {
        file: file.to_string(),
        line: line_no,
        reason,
    };

    let fields = csv::split_row(line);
    if fields.len() < 3 {
        return Err(malformed(format!(
            "expected at least 3 fields, got {}",
            fields.len()
        )));
    }

    let timestamp = LogTimestamp::parse(&fields[0]).map_err(|e| malformed(e.to_string()))?;
    let uid = Uid::new(&fields[1]).map_err(|e| malformed(e.to_string()))?;
    let decision = Decision::from_label(&fields[2]);
    let station_id = fields
        .get(3)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_STATION_ID);

    Ok(AccessEvent {
        uid,
        timestamp,
        decision,
        station_id,
        resolved_name: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorman_core::constants::LOG_HEADER;
    use std::fs;
    use tempfile::tempdir;

    fn write_session(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut content = format!("{LOG_HEADER}\n");
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_read_events_parses_rows() {
        let dir = tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "station_2025-01-15.csv",
            &[
                "2025-01-15 08:30:00,EB-EE-C0-01,GRANTED,1",
                "2025-01-15 08:31:10,11-22-33-44,DENIED,2",
            ],
        );

        let events = read_events(&path).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].uid.as_str(), "EB-EE-C0-01");
        assert_eq!(events[0].decision, Decision::Granted);
        assert_eq!(events[1].station_id, 2);
    }

    #[test]
    fn test_read_events_skips_malformed_rows() {
        let dir = tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "station_2025-01-15.csv",
            &[
                "2025-01-15 08:30:00,EB-EE-C0-01,GRANTED,1",
                "not a row at all",
                "garbage-date,AA-BB,GRANTED,1",
                "2025-01-15 08:32:00,!!invalid uid!!,GRANTED,1",
                "2025-01-15 08:33:00,AA-BB-CC-01,DENIED,1",
            ],
        );

        let events = read_events(&path).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].uid.as_str(), "AA-BB-CC-01");
    }

    #[test]
    fn test_unknown_status_maps_to_unknown() {
        let dir = tempdir().unwrap();
        let path = write_session(
            dir.path(),
            "s.csv",
            &["2025-01-15 08:30:00,AA-BB,WEDGED,1"],
        );

        let events = read_events(&path).unwrap();
        assert_eq!(events[0].decision, Decision::Unknown);
    }

    #[test]
    fn test_missing_station_defaults() {
        let dir = tempdir().unwrap();
        let path = write_session(dir.path(), "s.csv", &["2025-01-15 08:30:00,AA-BB,GRANTED"]);

        let events = read_events(&path).unwrap();
        assert_eq!(events[0].station_id, DEFAULT_STATION_ID);
    }

    #[test]
    fn test_pending_excludes_registry_and_active() {
        let dir = tempdir().unwrap();
        let active = write_session(dir.path(), "station_2025-01-16.csv", &[]);
        let old = write_session(dir.path(), "station_2025-01-15.csv", &[]);
        write_session(dir.path(), "user_registry.csv", &[]);
        fs::write(dir.path().join("notes.txt"), "not a session").unwrap();

        let pending = pending_files(dir.path(), Some(&active)).unwrap();

        assert_eq!(pending, vec![old]);
    }

    #[test]
    fn test_pending_on_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let pending = pending_files(&dir.path().join("nope"), None).unwrap();
        assert!(pending.is_empty());
    }

    #[test]
    fn test_archive_moves_file() {
        let dir = tempdir().unwrap();
        let history = dir.path().join("history");
        let path = write_session(dir.path(), "station_2025-01-15.csv", &[]);

        let dest = archive(&path, &history).unwrap();

        assert!(!path.exists());
        assert_eq!(dest, history.join("station_2025-01-15.csv"));
        assert!(dest.exists());
    }

    #[test]
    fn test_archive_suffixes_on_collision() {
        let dir = tempdir().unwrap();
        let history = dir.path().join("history");

        let first = write_session(dir.path(), "station_2025-01-15.csv", &[]);
        archive(&first, &history).unwrap();
        let second = write_session(dir.path(), "station_2025-01-15.csv", &["x"]);
        let dest2 = archive(&second, &history).unwrap();
        let third = write_session(dir.path(), "station_2025-01-15.csv", &["y"]);
        let dest3 = archive(&third, &history).unwrap();

        assert_eq!(dest2, history.join("station_2025-01-15_1.csv"));
        assert_eq!(dest3, history.join("station_2025-01-15_2.csv"));
    }
}
