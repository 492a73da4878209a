//! Backups and the change log.

pub mod backup;
pub mod changelog;

pub use backup::{BackupRecord, BackupStore, BACKUP_PREFIX};
pub use changelog::{
    ChangeLogEntry, ChangeLogStore, ChangeOperation, EntityKind, ATTACHED_SCHEMA,
    CHANGELOG_FILE_NAME,
};
