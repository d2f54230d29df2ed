//! Enrolled-credential registry.
//!
//! One mirrored CSV pair (`user_registry.csv` plus its backup) holds every
//! credential the station will grant. The whole registry is cached in
//! memory; lookups on the tap path never touch the disk. Writes rewrite
//! both files in full, which keeps them canonical at the cost of O(n) per
//! enrollment, and n here is a building's worth of keyfobs.
//!
//! On boot the registry is loaded, then both files are rewritten from the
//! cache. That one pass drops rows that no longer parse and normalizes
//! hand-edited spellings, so every file this module owns is in its own
//! format by the time the door opens.

use crate::csv;
use crate::error::StoreResult;
use crate::mirrored::MirroredFile;
use doorman_core::constants::REGISTRY_HEADER;
use doorman_core::{Credential, LogTimestamp, Uid};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, warn};

const PRIMARY_NAME: &str = "user_registry.csv";
const BACKUP_NAME: &str = "user_registry_backup.csv";

/// Where the registry files live.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub data_dir: PathBuf,
    pub backup_dir: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data_logs"),
            backup_dir: PathBuf::from("data_logs_backup"),
        }
    }
}

impl RegistryConfig {
    /// The default layout rooted somewhere other than the working directory.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            data_dir: root.join("data_logs"),
            backup_dir: root.join("data_logs_backup"),
        }
    }
}

/// In-memory registry over the mirrored CSV pair.
pub struct UserRegistry {
    files: MirroredFile,
    cache: RwLock<Vec<Credential>>,
}

impl UserRegistry {
    /// Load the registry, restoring the primary from its backup when
    /// needed, then rewrite both files from the parsed cache.
    pub fn open(config: RegistryConfig) -> StoreResult<Self> {
        let files = MirroredFile::new(
            config.data_dir.join(PRIMARY_NAME),
            config.backup_dir.join(BACKUP_NAME),
            REGISTRY_HEADER,
        );
        files.ensure()?;

        let cache = load_rows(files.primary())?;
        files.rewrite_all(cache.iter().map(format_credential))?;
        info!(users = cache.len(), "User registry loaded");

        Ok(Self {
            files,
            cache: RwLock::new(cache),
        })
    }

    /// Insert or replace the credential with this UID, then persist.
    pub fn save(&self, credential: Credential) -> StoreResult<()> {
        let mut cache = self.write_cache();
        cache.retain(|c| c.uid != credential.uid);
        debug!(uid = %credential.uid, name = %credential.display_name, "Credential saved");
        cache.push(credential);
        self.files.rewrite_all(cache.iter().map(format_credential))
    }

    /// Remove the credential with this UID. Returns whether one existed.
    pub fn delete(&self, uid: &Uid) -> StoreResult<bool> {
        let mut cache = self.write_cache();
        let before = cache.len();
        cache.retain(|c| &c.uid != uid);
        if cache.len() == before {
            return Ok(false);
        }
        info!(%uid, "Credential deleted");
        self.files
            .rewrite_all(cache.iter().map(format_credential))?;
        Ok(true)
    }

    /// Look a credential up by UID.
    pub fn find(&self, uid: &Uid) -> Option<Credential> {
        self.read_cache().iter().find(|c| &c.uid == uid).cloned()
    }

    /// Whether this UID is enrolled.
    pub fn exists(&self, uid: &Uid) -> bool {
        self.read_cache().iter().any(|c| &c.uid == uid)
    }

    /// Number of enrolled credentials.
    pub fn count(&self) -> usize {
        self.read_cache().len()
    }

    /// Snapshot of every credential, in file order.
    pub fn all(&self) -> Vec<Credential> {
        self.read_cache().clone()
    }

    /// Re-read the primary file into the cache, picking up edits made
    /// behind the station's back. Returns the new count.
    pub fn reload(&self) -> StoreResult<usize> {
        self.files.ensure()?;
        let rows = load_rows(self.files.primary())?;
        let mut cache = self.write_cache();
        *cache = rows;
        info!(users = cache.len(), "User registry reloaded");
        Ok(cache.len())
    }

    /// Repair missing files. A lost primary is rewritten from the cache,
    /// which is authoritative while the station runs.
    pub fn heal(&self) -> StoreResult<bool> {
        if self.files.primary().exists() {
            let report = self.files.ensure()?;
            return Ok(report.any());
        }

        let cache = self.read_cache();
        self.files.rewrite_all(cache.iter().map(format_credential))?;
        warn!(users = cache.len(), "Registry primary was missing, rewritten from cache");
        Ok(true)
    }

    /// Path of the primary registry file.
    pub fn primary_path(&self) -> &Path {
        self.files.primary()
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, Vec<Credential>> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Credential>> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn format_credential(credential: &Credential) -> String {
    let registered = credential
        .registered_at
        .map(|t| t.format())
        .unwrap_or_default();
    csv::format_row(&[
        credential.uid.as_str(),
        &credential.display_name,
        &registered,
    ])
}

fn load_rows(path: &Path) -> StoreResult<Vec<Credential>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(crate::error::StoreError::io(path, e)),
    };

    let mut rows = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields = csv::split_row(line);
        if fields.len() < 2 {
            warn!(file = %path.display(), line = idx + 1, "Skipping short registry row");
            continue;
        }
        let uid = match Uid::new(&fields[0]) {
            Ok(uid) => uid,
            Err(e) => {
                warn!(file = %path.display(), line = idx + 1, error = %e, "Skipping registry row");
                continue;
            }
        };
        let registered_at = fields
            .get(2)
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| LogTimestamp::parse(s).ok());

        rows.push(Credential {
            uid,
            display_name: fields[1].clone(),
            registered_at,
        });
    }

    Ok(rows)
}
