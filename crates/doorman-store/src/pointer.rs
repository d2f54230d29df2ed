//! Session pointer sidecar.
//!
//! A small binary file next to the logs names the CSV the current session
//! is appending to. After a crash or power cut the host reads it back to
//! tell which file was live, and the batch job uses it to leave the active
//! file alone. Layout, all big-endian:
//!
//! ```text
//! u32  magic  "DOOR"
//! u16  format version
//! i64  written-at, epoch milliseconds
//! u16  path length
//! ..   path, UTF-8
//! ```

use crate::error::{StoreError, StoreResult};
use bytes::{Buf, BufMut, BytesMut};
use chrono::Utc;
use doorman_core::constants::{POINTER_MAGIC, POINTER_VERSION};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the sidecar inside the data directory.
pub const POINTER_FILE_NAME: &str = ".session_pointer.dat";

/// A decoded pointer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerRecord {
    /// When the pointer was written, epoch milliseconds.
    pub written_at_millis: i64,
    /// The file the session was appending to.
    pub target: PathBuf,
}

/// Handle to the pointer sidecar of one data directory.
#[derive(Debug, Clone)]
pub struct PointerFile {
    path: PathBuf,
}

impl PointerFile {
    /// Pointer location for `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(POINTER_FILE_NAME),
        }
    }

    /// Path of the sidecar itself.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the sidecar currently exists on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Point the sidecar at `target`, stamping the current time.
    pub fn save(&self, target: &Path) -> StoreResult<()> {
        let bytes = encode(target, Utc::now().timestamp_millis())?;
        std::fs::write(&self.path, bytes).map_err(|e| StoreError::io(&self.path, e))?;
        debug!(pointer = %self.path.display(), target = %target.display(), "Session pointer written");
        Ok(())
    }

    /// Read the sidecar back.
    ///
    /// Returns `Ok(None)` when the file is missing or does not decode; a
    /// corrupt pointer is logged and treated as absent so the caller simply
    /// regenerates it.
    pub fn load(&self) -> StoreResult<Option<PointerRecord>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        match decode(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(pointer = %self.path.display(), error = %e, "Ignoring corrupt session pointer");
                Ok(None)
            }
        }
    }
}

fn encode(target: &Path, written_at_millis: i64) -> StoreResult<Vec<u8>> {
    let path_str = target.to_string_lossy();
    let path_bytes = path_str.as_bytes();
    if path_bytes.len() > u16::MAX as usize {
        return Err(StoreError::PointerCorrupt(format!(
            "target path too long ({} bytes)",
            path_bytes.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(16 + path_bytes.len());
    buf.put_u32(POINTER_MAGIC);
    buf.put_u16(POINTER_VERSION);
    buf.put_i64(written_at_millis);
    buf.put_u16(path_bytes.len() as u16);
    buf.put_slice(path_bytes);
    Ok(buf.to_vec())
}

fn decode(mut buf: &[u8]) -> StoreResult<PointerRecord> {
    if buf.remaining() < 4 + 2 + 8 + 2 {
        return Err(StoreError::PointerCorrupt(format!(
            "truncated record ({} bytes)",
            buf.remaining()
        )));
    }

    let magic = buf.get_u32();
    if magic != POINTER_MAGIC {
        return Err(StoreError::PointerCorrupt(format!(
            "bad magic {magic:#010x}"
        )));
    }

    let version = buf.get_u16();
    if version != POINTER_VERSION {
        return Err(StoreError::PointerCorrupt(format!(
            "unsupported version {version}"
        )));
    }

    let written_at_millis = buf.get_i64();

    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(StoreError::PointerCorrupt(format!(
            "path length {len} exceeds remaining {} bytes",
            buf.remaining()
        )));
    }
    let target = std::str::from_utf8(&buf[..len])
        .map_err(|e| StoreError::PointerCorrupt(format!("path is not UTF-8: {e}")))?;

    Ok(PointerRecord {
        written_at_millis,
        target: PathBuf::from(target),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let pointer = PointerFile::in_dir(dir.path());
        let target = dir.path().join("station_2025-01-15.csv");

        pointer.save(&target).unwrap();

        let record = pointer.load().unwrap().unwrap();
        assert_eq!(record.target, target);
        assert!(record.written_at_millis > 0);
    }

    #[test]
    fn test_missing_pointer_loads_none() {
        let dir = tempdir().unwrap();
        let pointer = PointerFile::in_dir(dir.path());

        assert!(pointer.load().unwrap().is_none());
        assert!(!pointer.exists());
    }

    #[test]
    fn test_bad_magic_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let pointer = PointerFile::in_dir(dir.path());
        std::fs::write(pointer.path(), [0xDEu8, 0xAD, 0xBE, 0xEF, 0, 1, 0, 0]).unwrap();

        assert!(pointer.load().unwrap().is_none());
    }

    #[test]
    fn test_truncated_record_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let pointer = PointerFile::in_dir(dir.path());
        std::fs::write(pointer.path(), [0x44u8, 0x4F]).unwrap();

        assert!(pointer.load().unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_short_path() {
        let target = Path::new("/tmp/x.csv");
        let mut bytes = encode(target, 42).unwrap();
        bytes.truncate(bytes.len() - 3);

        assert!(matches!(
            decode(&bytes),
            Err(StoreError::PointerCorrupt(_))
        ));
    }

    #[test]
    fn test_save_overwrites_previous_target() {
        let dir = tempdir().unwrap();
        let pointer = PointerFile::in_dir(dir.path());
        let first = dir.path().join("a.csv");
        let second = dir.path().join("b.csv");

        pointer.save(&first).unwrap();
        pointer.save(&second).unwrap();

        assert_eq!(pointer.load().unwrap().unwrap().target, second);
    }
}
