//! Append-only log of every change made to the card database or to an
//! artwork container.
//!
//! The log lives in its own SQLite file next to the user configuration so the
//! game's database never carries tables it does not know about.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::sqlite_persistence::{
    migrate_if_needed, open_versioned, Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};
use crate::tagset::StyleId;

pub const CHANGELOG_FILE_NAME: &str = "changes.db";

/// Schema name of the log when attached to another connection.
pub const ATTACHED_SCHEMA: &str = "changelog";

// =============================================================================
// Schema
// =============================================================================

const CHANGES_TABLE_V_0: Table = Table {
    name: "changes",
    columns: &[
        Column {
            name: "id",
            sql_type: &SqlType::Integer,
            is_primary_key: true,
            non_null: false,
            default_value: None,
        },
        Column {
            name: "entity_key",
            sql_type: &SqlType::Integer,
            is_primary_key: false,
            non_null: true,
            default_value: None,
        },
        Column {
            name: "entity_kind",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: true,
            default_value: None,
        },
        Column {
            name: "operation",
            sql_type: &SqlType::Text,
            is_primary_key: false,
            non_null: true,
            default_value: None,
        },
        Column {
            name: "style_id",
            sql_type: &SqlType::Integer,
            is_primary_key: false,
            non_null: false,
            default_value: None,
        },
        Column {
            name: "created_at",
            sql_type: &SqlType::Integer,
            is_primary_key: false,
            non_null: true,
            default_value: Some(DEFAULT_TIMESTAMP),
        },
    ],
    indices: &[("idx_changes_entity", "entity_key")],
};

pub const CHANGELOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[CHANGES_TABLE_V_0],
    migration: None,
}];

// =============================================================================
// Enumerations
// =============================================================================

/// What kind of thing a change touched.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Card,
    Artwork,
}

impl EntityKind {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "artwork" => EntityKind::Artwork,
            _ => EntityKind::Card,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            EntityKind::Card => "card",
            EntityKind::Artwork => "artwork",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    AddStyle,
    RemoveStyle,
    SwapArtwork,
}

impl ChangeOperation {
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "remove_style" => ChangeOperation::RemoveStyle,
            "swap_artwork" => ChangeOperation::SwapArtwork,
            _ => ChangeOperation::AddStyle,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            ChangeOperation::AddStyle => "add_style",
            ChangeOperation::RemoveStyle => "remove_style",
            ChangeOperation::SwapArtwork => "swap_artwork",
        }
    }
}

// =============================================================================
// Structs
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub id: i64,
    /// Card key or artwork key, depending on `entity_kind`.
    pub entity_key: i64,
    pub entity_kind: EntityKind,
    pub operation: ChangeOperation,
    pub style_id: Option<StyleId>,
    /// Unix timestamp in seconds.
    pub created_at: i64,
}

impl ChangeLogEntry {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ChangeLogEntry {
            id: row.get(0)?,
            entity_key: row.get(1)?,
            entity_kind: EntityKind::from_db_str(&row.get::<_, String>(2)?),
            operation: ChangeOperation::from_db_str(&row.get::<_, String>(3)?),
            style_id: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

const ENTRY_COLUMNS: &str = "id, entity_key, entity_kind, operation, style_id, created_at";

// =============================================================================
// ChangeLogStore
// =============================================================================

#[derive(Clone)]
pub struct ChangeLogStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl ChangeLogStore {
    /// Open the log at `path`, creating it empty when absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }
        let conn = open_versioned(path, CHANGELOG_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migrate_if_needed(&mut conn, CHANGELOG_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// The log file, or `None` for an in-memory log.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("change log connection lock poisoned"))
    }

    /// Append a single entry.
    pub fn record(
        &self,
        entity_key: i64,
        entity_kind: EntityKind,
        operation: ChangeOperation,
        style_id: Option<StyleId>,
    ) -> Result<ChangeLogEntry> {
        let conn = self.lock()?;
        let created_at = Self::now();
        conn.execute(
            "INSERT INTO changes (entity_key, entity_kind, operation, style_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entity_key,
                entity_kind.to_db_str(),
                operation.to_db_str(),
                style_id,
                created_at
            ],
        )?;
        Ok(ChangeLogEntry {
            id: conn.last_insert_rowid(),
            entity_key,
            entity_kind,
            operation,
            style_id,
            created_at,
        })
    }

    /// Append one entry per key, all or nothing.
    pub fn record_many(
        &self,
        entity_keys: &[i64],
        entity_kind: EntityKind,
        operation: ChangeOperation,
        style_id: Option<StyleId>,
    ) -> Result<usize> {
        if entity_keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        Self::append_with(&tx, "main", entity_keys, entity_kind, operation, style_id)?;
        tx.commit()?;
        Ok(entity_keys.len())
    }

    /// Insert one entry per key into `schema.changes` through `conn`, inside
    /// whatever transaction `conn` has open. `schema` is `main` on the log's
    /// own connection, or the name the log is attached under elsewhere.
    pub fn append_with(
        conn: &Connection,
        schema: &str,
        entity_keys: &[i64],
        entity_kind: EntityKind,
        operation: ChangeOperation,
        style_id: Option<StyleId>,
    ) -> rusqlite::Result<usize> {
        let created_at = Self::now();
        let mut stmt = conn.prepare(&format!(
            "INSERT INTO {}.changes (entity_key, entity_kind, operation, style_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            schema
        ))?;
        for key in entity_keys {
            stmt.execute(params![
                key,
                entity_kind.to_db_str(),
                operation.to_db_str(),
                style_id,
                created_at
            ])?;
        }
        Ok(entity_keys.len())
    }

    /// Every entry for one card or artwork key, oldest first.
    pub fn entries_for(&self, entity_key: i64) -> Result<Vec<ChangeLogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM changes WHERE entity_key = ?1 ORDER BY id ASC",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![entity_key], ChangeLogEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// The `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ChangeLogEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM changes ORDER BY id DESC LIMIT ?1",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(params![limit as i64], ChangeLogEntry::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM changes", [], |r| r.get(0))?)
    }

    /// Make every later append fail. Used to exercise unaudited-change paths.
    #[cfg(test)]
    pub(crate) fn make_read_only(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_changes BEFORE INSERT ON changes
             BEGIN SELECT RAISE(ABORT, 'change log is read-only'); END;",
        )
        .unwrap();
    }
}
