//! Backup-before-write for binary files owned by the game.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Result, SwapperError};

pub const BACKUP_PREFIX: &str = "BACKUP_";

const IDENTITY_DIGEST_BYTES: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub container: PathBuf,
    pub backup_path: PathBuf,
    /// Unix timestamp in seconds of when this session first ensured the backup.
    pub created_at: i64,
    /// False when a backup from an earlier session was already on disk.
    pub newly_created: bool,
}

/// Takes at most one backup per file per session and never overwrites an
/// existing backup file.
pub struct BackupStore {
    dir: PathBuf,
    session: Mutex<HashMap<PathBuf, BackupRecord>>,
}

impl BackupStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            session: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `BACKUP_<digest>_<file name>`, where the digest is taken over the
    /// container's canonical path so that equally named files in different
    /// directories get distinct backups.
    pub fn backup_path_for(&self, container: &Path) -> Result<PathBuf> {
        let file_name = container.file_name().ok_or_else(|| {
            SwapperError::InvalidArgument(format!("{:?} has no file name", container))
        })?;
        let mut name = std::ffi::OsString::from(BACKUP_PREFIX);
        name.push(identity_digest(&identity(container)));
        name.push("_");
        name.push(file_name);
        Ok(self.dir.join(name))
    }

    /// Make sure a durable copy of `container` exists before it is modified.
    pub fn ensure_backup(&self, container: &Path) -> Result<BackupRecord> {
        let identity = identity(container);
        let mut session = self.session.lock().map_err(|_| SwapperError::poisoned())?;
        if let Some(record) = session.get(&identity) {
            debug!("Backup of {:?} already taken this session", container);
            return Ok(record.clone());
        }

        let backup_path = self.backup_path_for(container)?;
        fs::create_dir_all(&self.dir)?;

        let newly_created = if backup_path.exists() {
            info!(
                "Keeping existing backup {:?} for {:?}",
                backup_path, container
            );
            false
        } else {
            let bytes = fs::read(container).map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    SwapperError::NotFound(format!("{:?} does not exist", container))
                }
                _ => SwapperError::Io(e),
            })?;
            let mut tmp = NamedTempFile::new_in(&self.dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist_noclobber(&backup_path).map_err(|e| e.error)?;
            info!("Backed up {:?} to {:?}", container, backup_path);
            true
        };

        let record = BackupRecord {
            container: container.to_path_buf(),
            backup_path,
            created_at: chrono::Utc::now().timestamp(),
            newly_created,
        };
        session.insert(identity, record.clone());
        Ok(record)
    }

    /// Backups ensured during this session, ordered by container path.
    pub fn records(&self) -> Result<Vec<BackupRecord>> {
        let session = self.session.lock().map_err(|_| SwapperError::poisoned())?;
        let mut records: Vec<_> = session.values().cloned().collect();
        records.sort_by(|a, b| a.container.cmp(&b.container));
        Ok(records)
    }
}

/// Canonical form of `container`, or the path as given when it can't be
/// resolved.
fn identity(container: &Path) -> PathBuf {
    fs::canonicalize(container).unwrap_or_else(|_| container.to_path_buf())
}

fn identity_digest(identity: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identity.to_string_lossy().as_bytes());
    hasher.finalize()[..IDENTITY_DIGEST_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_taken_once_per_session() {
        let dir = TempDir::new().unwrap();
        let container = dir.path().join("000123_CardArt_abc");
        fs::write(&container, b"original").unwrap();
        let store = BackupStore::new(dir.path().join("backups"));

        let first = store.ensure_backup(&container).unwrap();
        assert!(first.newly_created);
        assert_eq!(first.backup_path, store.backup_path_for(&container).unwrap());
        let name = first.backup_path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(BACKUP_PREFIX));
        assert!(name.ends_with("_000123_CardArt_abc"));

        fs::write(&container, b"modified").unwrap();
        let second = store.ensure_backup(&container).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(&first.backup_path).unwrap(), b"original");
        assert_eq!(store.records().unwrap().len(), 1);
    }

    #[test]
    fn test_existing_backup_is_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let container = dir.path().join("data.mtga");
        fs::write(&container, b"new").unwrap();
        let backups = dir.path().join("backups");
        fs::create_dir_all(&backups).unwrap();
        let store = BackupStore::new(&backups);
        let backup_path = store.backup_path_for(&container).unwrap();
        fs::write(&backup_path, b"old").unwrap();

        let record = store.ensure_backup(&container).unwrap();
        assert!(!record.newly_created);
        assert_eq!(fs::read(&backup_path).unwrap(), b"old");
    }

    #[test]
    fn test_same_file_name_in_two_directories_gets_two_backups() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("install_a").join("Raw_CardDatabase_x.mtga");
        let second = dir.path().join("install_b").join("Raw_CardDatabase_x.mtga");
        for (path, content) in [(&first, b"AAAA"), (&second, b"BBBB")] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let store = BackupStore::new(dir.path().join("backups"));

        let first_record = store.ensure_backup(&first).unwrap();
        let second_record = store.ensure_backup(&second).unwrap();

        assert_ne!(first_record.backup_path, second_record.backup_path);
        assert!(second_record.newly_created);
        assert_eq!(fs::read(&first_record.backup_path).unwrap(), b"AAAA");
        assert_eq!(fs::read(&second_record.backup_path).unwrap(), b"BBBB");
        assert_eq!(store.records().unwrap().len(), 2);
    }

    #[test]
    fn test_backup_name_is_stable_across_sessions() {
        let dir = TempDir::new().unwrap();
        let container = dir.path().join("data.mtga");
        fs::write(&container, b"x").unwrap();
        let backups = dir.path().join("backups");
        assert_eq!(
            BackupStore::new(&backups).backup_path_for(&container).unwrap(),
            BackupStore::new(&backups).backup_path_for(&container).unwrap()
        );
    }

    #[test]
    fn test_missing_container_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = BackupStore::new(dir.path());
        let result = store.ensure_backup(&dir.path().join("missing"));
        assert!(matches!(result, Err(SwapperError::NotFound(_))));
        assert!(store.records().unwrap().is_empty());
    }
}
