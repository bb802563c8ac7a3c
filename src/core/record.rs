/// Ledger rows and handler request payloads

use std::path::PathBuf;

use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// One archive as recorded in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_id: i64,
    pub created: i64,
    pub name: String,
    pub path: String,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub id: String,
}

impl BackupRecord {
    pub(crate) const COLUMNS: &'static str =
        "b.backup_id, b.created, b.name, b.path, b.user_id, b.type, b.version, b.id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            backup_id: row.get(0)?,
            created: row.get(1)?,
            name: row.get(2)?,
            path: row.get(3)?,
            user_id: row.get(4)?,
            kind: row.get(5)?,
            version: row.get(6)?,
            id: row.get(7)?,
        })
    }
}

/// Values for a new ledger row. `created` is always set by the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBackup {
    pub name: String,
    pub path: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Owner; `None` or `0` means the acting user
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Input handed to a backup handler's `backup` or `restore`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupRequest {
    /// Source directory for a backup, target directory for a restore
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Top-level entry of `directory` to leave out of the archive
    #[serde(default)]
    pub exclude: Option<String>,
    /// Ledger row to restore from
    #[serde(default)]
    pub backup_id: Option<i64>,
}

impl BackupRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn exclude(mut self, entry: impl Into<String>) -> Self {
        self.exclude = Some(entry.into());
        self
    }

    pub fn restore_from(backup_id: i64, directory: impl Into<PathBuf>) -> Self {
        Self {
            backup_id: Some(backup_id),
            directory: Some(directory.into()),
            ..Default::default()
        }
    }
}

/// A listed row with its owner's display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRow {
    #[serde(flatten)]
    pub record: BackupRecord,
    pub user_name: Option<String>,
}
