//! Primary-plus-backup file pair.
//!
//! Every durable CSV the station owns is written twice: once to the data
//! directory and once to a backup directory, each append flushed and the
//! handle closed again immediately. Losing the primary between two taps
//! costs nothing; the next write notices and restores it from the backup.
//! Backup failures are logged and swallowed so a full or read-only backup
//! disk can never block the door.

use crate::error::{StoreError, StoreResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What a self-check had to fix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealReport {
    /// Primary was missing and copied back from the backup.
    pub restored_primary_from_backup: bool,
    /// Primary was missing with no backup; recreated header-only.
    pub created_primary: bool,
    /// Backup was missing and reseeded from the primary.
    pub created_backup: bool,
}

impl HealReport {
    /// Whether anything was repaired.
    pub fn any(&self) -> bool {
        self.restored_primary_from_backup || self.created_primary || self.created_backup
    }
}

/// A CSV file mirrored into a backup directory.
#[derive(Debug, Clone)]
pub struct MirroredFile {
    primary: PathBuf,
    backup: PathBuf,
    header: String,
}

impl MirroredFile {
    pub fn new(
        primary: impl Into<PathBuf>,
        backup: impl Into<PathBuf>,
        header: impl Into<String>,
    ) -> Self {
        Self {
            primary: primary.into(),
            backup: backup.into(),
            header: header.into(),
        }
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Make sure both halves exist, repairing from whichever survived.
    ///
    /// Recovery order: a missing primary is restored from the backup when
    /// one exists, otherwise recreated with just the header; a missing
    /// backup is reseeded from the primary.
    pub fn ensure(&self) -> StoreResult<HealReport> {
        let mut report = HealReport::default();

        ensure_parent(&self.primary)?;
        if let Err(e) = ensure_parent(&self.backup) {
            warn!(error = %e, "Backup directory unavailable");
        }

        if !self.primary.exists() {
            if self.backup.exists() {
                fs::copy(&self.backup, &self.primary)
                    .map_err(|e| StoreError::io(&self.primary, e))?;
                warn!(
                    primary = %self.primary.display(),
                    backup = %self.backup.display(),
                    "Primary file was missing, restored from backup"
                );
                report.restored_primary_from_backup = true;
            } else {
                fs::write(&self.primary, format!("{}\n", self.header))
                    .map_err(|e| StoreError::io(&self.primary, e))?;
                debug!(primary = %self.primary.display(), "Created file with header");
                report.created_primary = true;
            }
        }

        if !self.backup.exists() {
            match fs::copy(&self.primary, &self.backup) {
                Ok(_) => report.created_backup = true,
                Err(e) => warn!(
                    backup = %self.backup.display(),
                    error = %e,
                    "Could not reseed backup"
                ),
            }
        }

        Ok(report)
    }

    /// Append one row to both halves.
    ///
    /// The primary write must succeed; the backup write is best-effort.
    /// Runs [`MirroredFile::ensure`] first so files deleted underneath a
    /// running session come back before the row lands.
    pub fn append_line(&self, line: &str) -> StoreResult<HealReport> {
        let report = self.ensure()?;

        append_to(&self.primary, line).map_err(|e| StoreError::io(&self.primary, e))?;
        if let Err(e) = append_to(&self.backup, line) {
            warn!(
                backup = %self.backup.display(),
                error = %e,
                "Backup append failed, primary row is safe"
            );
        }

        Ok(report)
    }

    /// Replace the contents of both halves with header plus `rows`.
    pub fn rewrite_all<I>(&self, rows: I) -> StoreResult<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut content = String::with_capacity(128);
        content.push_str(&self.header);
        content.push('\n');
        for row in rows {
            content.push_str(row.as_ref());
            content.push('\n');
        }

        ensure_parent(&self.primary)?;
        fs::write(&self.primary, &content).map_err(|e| StoreError::io(&self.primary, e))?;

        if let Err(e) = ensure_parent(&self.backup)
            .and_then(|_| fs::write(&self.backup, &content).map_err(|e| StoreError::io(&self.backup, e)))
        {
            warn!(error = %e, "Backup rewrite failed, primary is safe");
        }
        Ok(())
    }

    /// Move both halves to new paths, keeping this handle pointed at them.
    ///
    /// The primary rename must succeed; a backup that cannot follow is
    /// dropped with a warning and reseeded on the next append.
    pub fn rename_to(
        &mut self,
        new_primary: impl Into<PathBuf>,
        new_backup: impl Into<PathBuf>,
    ) -> StoreResult<()> {
        let new_primary = new_primary.into();
        let new_backup = new_backup.into();

        fs::rename(&self.primary, &new_primary).map_err(|e| StoreError::io(&self.primary, e))?;
        if self.backup.exists()
            && let Err(e) = fs::rename(&self.backup, &new_backup)
        {
            warn!(
                backup = %self.backup.display(),
                error = %e,
                "Backup did not follow rename"
            );
        }

        self.primary = new_primary;
        self.backup = new_backup;
        Ok(())
    }

    /// Delete both halves. Missing files are not an error.
    pub fn remove_both(&self) -> StoreResult<()> {
        for path in [&self.primary, &self.backup] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    Ok(())
}

fn append_to(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: &str = "timestamp,uid,status,station_id";

    fn pair(dir: &Path) -> MirroredFile {
        MirroredFile::new(
            dir.join("data/log.csv"),
            dir.join("backup/log_backup.csv"),
            HEADER,
        )
    }

    #[test]
    fn test_ensure_creates_both_with_header() {
        let dir = tempdir().unwrap();
        let pair = pair(dir.path());

        let report = pair.ensure().unwrap();

        assert!(report.created_primary);
        assert_eq!(
            fs::read_to_string(pair.primary()).unwrap(),
            format!("{HEADER}\n")
        );
        assert_eq!(
            fs::read_to_string(pair.backup()).unwrap(),
            format!("{HEADER}\n")
        );
    }

    #[test]
    fn test_append_mirrors_to_both() {
        let dir = tempdir().unwrap();
        let pair = pair(dir.path());

        pair.append_line("row-1").unwrap();
        pair.append_line("row-2").unwrap();

        let expected = format!("{HEADER}\nrow-1\nrow-2\n");
        assert_eq!(fs::read_to_string(pair.primary()).unwrap(), expected);
        assert_eq!(fs::read_to_string(pair.backup()).unwrap(), expected);
    }

    #[test]
    fn test_deleted_primary_is_restored_from_backup() {
        let dir = tempdir().unwrap();
        let pair = pair(dir.path());
        pair.append_line("row-1").unwrap();

        fs::remove_file(pair.primary()).unwrap();
        let report = pair.append_line("row-2").unwrap();

        assert!(report.restored_primary_from_backup);
        assert_eq!(
            fs::read_to_string(pair.primary()).unwrap(),
            format!("{HEADER}\nrow-1\nrow-2\n")
        );
    }

    #[test]
    fn test_deleted_backup_is_reseeded_from_primary() {
        let dir = tempdir().unwrap();
        let pair = pair(dir.path());
        pair.append_line("row-1").unwrap();

        fs::remove_file(pair.backup()).unwrap();
        let report = pair.append_line("row-2").unwrap();

        assert!(report.created_backup);
        assert_eq!(
            fs::read_to_string(pair.backup()).unwrap(),
            format!("{HEADER}\nrow-1\nrow-2\n")
        );
    }

    #[test]
    fn test_both_deleted_recreates_header_only() {
        let dir = tempdir().unwrap();
        let pair = pair(dir.path());
        pair.append_line("row-1").unwrap();

        fs::remove_file(pair.primary()).unwrap();
        fs::remove_file(pair.backup()).unwrap();
        pair.append_line("row-2").unwrap();

        assert_eq!(
            fs::read_to_string(pair.primary()).unwrap(),
            format!("{HEADER}\nrow-2\n")
        );
    }

    #[test]
    fn test_unwritable_backup_does_not_block_primary() {
        let dir = tempdir().unwrap();
        let backup = dir.path().join("backup/log_backup.csv");
        // A directory where the backup file should be forces every backup
        // write to fail.
        fs::create_dir_all(&backup).unwrap();
        let pair = MirroredFile::new(dir.path().join("data/log.csv"), backup, HEADER);

        pair.append_line("row-1").unwrap();

        assert!(
            fs::read_to_string(pair.primary())
                .unwrap()
                .contains("row-1")
        );
    }

    #[test]
    fn test_rewrite_all_replaces_contents() {
        let dir = tempdir().unwrap();
        let pair = pair(dir.path());
        pair.append_line("old").unwrap();

        pair.rewrite_all(["new-1", "new-2"]).unwrap();

        let expected = format!("{HEADER}\nnew-1\nnew-2\n");
        assert_eq!(fs::read_to_string(pair.primary()).unwrap(), expected);
        assert_eq!(fs::read_to_string(pair.backup()).unwrap(), expected);
    }

    #[test]
    fn test_rename_moves_both_halves() {
        let dir = tempdir().unwrap();
        let mut pair = pair(dir.path());
        pair.append_line("row-1").unwrap();
        let old_primary = pair.primary().to_path_buf();

        pair.rename_to(
            dir.path().join("data/renamed.csv"),
            dir.path().join("backup/renamed_backup.csv"),
        )
        .unwrap();

        assert!(!old_primary.exists());
        assert!(pair.primary().ends_with("renamed.csv"));
        assert!(
            fs::read_to_string(pair.primary())
                .unwrap()
                .contains("row-1")
        );
        assert!(
            fs::read_to_string(pair.backup())
                .unwrap()
                .contains("row-1")
        );
    }

    #[test]
    fn test_remove_both_is_idempotent() {
        let dir = tempdir().unwrap();
        let pair = pair(dir.path());
        pair.ensure().unwrap();

        pair.remove_both().unwrap();
        pair.remove_both().unwrap();

        assert!(!pair.primary().exists());
        assert!(!pair.backup().exists());
    }
}
