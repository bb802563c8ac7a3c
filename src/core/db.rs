/// SQLite access for the backup ledger
///
/// Connections come from an r2d2 pool so the ledger can be shared between
/// the CLI and concurrent API requests.

use std::fs;
use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use tracing::info;

use super::error::{BackupError, Result};
use crate::utils::BACKUP_TABLE;

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type SqliteConn = PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = r#"
CREATE TABLE backup (
    backup_id INTEGER PRIMARY KEY AUTOINCREMENT,
    created INTEGER NOT NULL,
    name TEXT NOT NULL,
    path TEXT NOT NULL,
    user_id INTEGER NOT NULL DEFAULT 0,
    type TEXT NOT NULL DEFAULT '',
    version TEXT NOT NULL DEFAULT '',
    id TEXT NOT NULL DEFAULT ''
);
CREATE UNIQUE INDEX backup_id_version ON backup (id, version);
CREATE INDEX backup_created ON backup (created);
"#;

/// Unicode-aware `ulower(text)`. SQLite's built-in `LOWER()` only folds ASCII.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "ulower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|text| text.to_lowercase())),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed,
    AlreadyInstalled,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|c| {
            c.pragma_update(None, "journal_mode", "WAL")?;
            c.pragma_update(None, "synchronous", "NORMAL")?;
            c.pragma_update(None, "busy_timeout", 3000i64)?;
            register_functions(c)
        });

        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(Duration::from_secs(10))
            .build(manager)?;

        Ok(Self { pool })
    }

    pub fn conn(&self) -> Result<SqliteConn> {
        Ok(self.pool.get()?)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create the ledger table. Idempotent: an existing table is left alone.
    pub fn install_schema(&self) -> Result<InstallStatus> {
        if self.table_exists(BACKUP_TABLE)? {
            return Ok(InstallStatus::AlreadyInstalled);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA)
            .map_err(|e| BackupError::Install(format!("failed to create schema: {}", e)))?;
        tx.commit()?;

        info!("Created table {}", BACKUP_TABLE);
        Ok(InstallStatus::Installed)
    }

    /// Drop the ledger table. Returns false when it did not exist.
    pub fn drop_schema(&self) -> Result<bool> {
        if !self.table_exists(BACKUP_TABLE)? {
            return Ok(false);
        }

        let conn = self.conn()?;
        conn.execute_batch("DROP TABLE backup;")?;
        info!("Dropped table {}", BACKUP_TABLE);
        Ok(true)
    }
}
