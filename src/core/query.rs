/// List query: filters, whitelisted sorting and pagination over the ledger
///
/// Row mode and count mode share one WHERE builder so a page and its total
/// always agree for the same filter input.

use std::collections::HashMap;

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use super::record::BackupRow;
use crate::utils::SORTABLE_FIELDS;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Case-insensitive substring match on the name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    /// `(offset, count)`
    #[serde(default)]
    pub limit: Option<(u32, u32)>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    pub fn user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn name(mut self, needle: impl Into<String>) -> Self {
        self.name = Some(needle.into());
        self
    }

    pub fn sort(mut self, field: impl Into<String>, order: impl Into<String>) -> Self {
        self.sort = Some(field.into());
        self.order = Some(order.into());
        self
    }

    pub fn limit(mut self, offset: u32, count: u32) -> Self {
        self.limit = Some((offset, count));
        self
    }

    /// Resolved ORDER BY clause. Anything outside the whitelist falls back
    /// to newest first.
    pub fn order_clause(&self) -> String {
        match (self.sort_field(), self.sort_direction()) {
            (Some(field), Some(direction)) => {
                format!(" ORDER BY b.{} {}, b.backup_id {}", field, direction, direction)
            }
            _ => " ORDER BY b.created DESC, b.backup_id DESC".to_string(),
        }
    }

    fn sort_field(&self) -> Option<&'static str> {
        let requested = self.sort.as_deref()?;
        SORTABLE_FIELDS.iter().copied().find(|f| *f == requested)
    }

    fn sort_direction(&self) -> Option<&'static str> {
        match self.order.as_deref()? {
            "asc" => Some("ASC"),
            "desc" => Some("DESC"),
            _ => None,
        }
    }

    /// WHERE clause and its bound parameters
    pub(crate) fn where_clause(&self) -> (String, Vec<Value>) {
        let mut sql = String::from(" WHERE b.backup_id > 0");
        let mut params = Vec::new();

        if let Some(user_id) = self.user_id {
            sql.push_str(" AND b.user_id = ?");
            params.push(Value::Integer(user_id));
        }

        if let Some(id) = &self.id {
            sql.push_str(" AND b.id = ?");
            params.push(Value::Text(id.clone()));
        }

        if let Some(version) = &self.version {
            sql.push_str(" AND b.version = ?");
            params.push(Value::Text(version.clone()));
        }

        if let Some(name) = &self.name {
            sql.push_str(" AND ulower(b.name) LIKE ? ESCAPE '\\'");
            params.push(Value::Text(format!("%{}%", escape_like(&name.to_lowercase()))));
        }

        (sql, params)
    }

    pub(crate) fn limit_clause(&self) -> String {
        match self.limit {
            Some((offset, count)) => format!(" LIMIT {} OFFSET {}", count, offset),
            None => String::new(),
        }
    }
}

fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Rows in query order, addressable by `backup_id`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupList {
    rows: Vec<BackupRow>,
    index: HashMap<i64, usize>,
}

impl BackupList {
    pub fn from_rows(rows: Vec<BackupRow>) -> Self {
        let index = rows
            .iter()
            .enumerate()
            .map(|(pos, row)| (row.record.backup_id, pos))
            .collect();
        Self { rows, index }
    }

    pub fn get(&self, backup_id: i64) -> Option<&BackupRow> {
        self.index.get(&backup_id).map(|pos| &self.rows[*pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackupRow> {
        self.rows.iter()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.record.backup_id).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<BackupRow> {
        self.rows
    }
}
