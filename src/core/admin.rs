/// Admin list/action surface shared by the CLI and the HTTP API
///
/// Turns 1-based pages into ledger offsets, attaches handler display names
/// to listed rows, and applies bulk actions under the caller's grants.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::access::{Grants, Permission};
use super::error::{BackupError, Result};
use super::ledger::BackupLedger;
use super::query::ListQuery;
use super::record::BackupRow;
use crate::utils::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// A listed row as shown on the admin page
#[derive(Debug, Clone, Serialize)]
pub struct AdminRow {
    #[serde(flatten)]
    pub row: BackupRow,
    /// Display name of the handler matching the row's type
    pub handler_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListPage {
    pub rows: Vec<AdminRow>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub pages: u32,
}

/// Normalize a 1-based page request into `(page, limit, offset)`
pub fn paginate(page: Option<u32>, limit: Option<u32>) -> (u32, u32, u32) {
    let limit = limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .min(MAX_PAGE_LIMIT);
    let page = page.filter(|p| *p > 0).unwrap_or(1);
    let offset = (page - 1).saturating_mul(limit);
    (page, limit, offset)
}

/// One page of rows plus the total for the same filters
pub fn list_page(
    ledger: &BackupLedger,
    filters: &ListQuery,
    page: Option<u32>,
    limit: Option<u32>,
) -> Result<ListPage> {
    let total = ledger.count(filters)?;
    let (page, limit, offset) = paginate(page, limit);

    let mut query = filters.clone();
    query.limit = Some((offset, limit));
    let list = ledger.get_list(&query)?;

    let rows = list
        .into_rows()
        .into_iter()
        .map(|row| AdminRow {
            handler_name: ledger.handler(&row.record.kind).map(|h| h.name.clone()),
            row,
        })
        .collect();

    let pages = if total <= 0 {
        0
    } else {
        ((total as u64 + limit as u64 - 1) / limit as u64) as u32
    };

    Ok(ListPage {
        rows,
        total,
        page,
        limit,
        pages,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Delete,
}

impl BulkAction {
    pub fn parse(action: &str) -> Result<Self> {
        match action {
            "delete" => Ok(BulkAction::Delete),
            other => Err(BackupError::invalid(format!("unknown action: {}", other))),
        }
    }
}

/// Apply `action` to the selected rows and return how many were affected.
///
/// Rows are skipped silently when the caller lacks the permission. A row
/// that fails to delete is logged and left out of the count.
pub fn apply_action(
    ledger: &BackupLedger,
    action: BulkAction,
    selected: &[i64],
    grants: &Grants,
) -> Result<usize> {
    match action {
        BulkAction::Delete => {
            if !grants.allows(Permission::BackupDelete) {
                debug!("Skipping delete of {} backups: permission denied", selected.len());
                return Ok(0);
            }

            let mut deleted = 0;
            for backup_id in selected {
                match ledger.delete(*backup_id) {
                    Ok(true) => deleted += 1,
                    Ok(false) => {}
                    Err(e) => warn!("Failed to delete backup {}: {}", backup_id, e),
                }
            }

            if deleted > 0 {
                info!("Deleted {} of {} selected backups", deleted, selected.len());
            }
            Ok(deleted)
        }
    }
}

/// A download ready to be streamed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    pub file_name: String,
}

/// Resolve the archive for `backup_id`. `None` when the record or its file
/// is missing.
pub fn resolve_download(ledger: &BackupLedger, backup_id: i64) -> Result<Option<Download>> {
    let Some(record) = ledger.get(backup_id)? else {
        return Ok(None);
    };

    let Some(path) = ledger.archive_path(&record) else {
        debug!("Archive for backup {} is missing: {}", backup_id, record.path);
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("backup-{}.zip", backup_id));

    Ok(Some(Download { path, file_name }))
}
