/// Backup ledger: metadata rows for every archive plus handler dispatch
///
/// The ledger owns the existence rule (one row per `(id, version)`), keeps
/// rows and archive files in step on delete, and hands `backup`/`restore`
/// requests to the frozen handler registry.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::db::{Database, InstallStatus};
use super::error::{BackupError, Result};
use super::handlers::{DispatchOutcome, HandlerDescriptor, HandlerRegistry, Operation};
use super::hooks::{HookFlow, LedgerHooks};
use super::query::{BackupList, ListQuery};
use super::record::{BackupRecord, BackupRequest, BackupRow, NewBackup};
use super::storage::PrivateStorage;
use super::users::UserDirectory;
use crate::utils::{BACKUP_TABLE, MAX_NAME_LEN, MAX_PATH_LEN, MAX_TAG_LEN, MODULE_BACKUP_DIR};

/// Result of [`BackupLedger::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "backup_id", rename_all = "snake_case")]
pub enum AddOutcome {
    Inserted(i64),
    /// A row with the same `(id, version)` already exists
    Duplicate,
    /// An `add.before` hook took over
    Skipped,
}

impl AddOutcome {
    pub fn backup_id(&self) -> Option<i64> {
        match self {
            AddOutcome::Inserted(id) => Some(*id),
            _ => None,
        }
    }
}

pub struct BackupLedger {
    db: Database,
    storage: PrivateStorage,
    registry: Arc<HandlerRegistry>,
    users: Arc<dyn UserDirectory>,
    hooks: LedgerHooks,
}

impl BackupLedger {
    pub fn new(
        db: Database,
        storage: PrivateStorage,
        registry: Arc<HandlerRegistry>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            db,
            storage,
            registry,
            users,
            hooks: LedgerHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: LedgerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn storage(&self) -> &PrivateStorage {
        &self.storage
    }

    pub fn users(&self) -> &dyn UserDirectory {
        self.users.as_ref()
    }

    /// Check preconditions and create the ledger table
    pub fn install(&self) -> Result<InstallStatus> {
        let archive_dir = self.storage.private_dir(MODULE_BACKUP_DIR);
        self.storage.ensure_dir(&archive_dir).map_err(|e| {
            BackupError::Install(format!(
                "storage directory {} is not writable: {}",
                archive_dir.display(),
                e
            ))
        })?;

        self.db.install_schema()
    }

    pub fn is_installed(&self) -> Result<bool> {
        self.db.table_exists(BACKUP_TABLE)
    }

    /// Drop the ledger table. Archives stay on disk.
    pub fn uninstall(&self) -> Result<bool> {
        self.db.drop_schema()
    }

    // ========================================================================
    // Records
    // ========================================================================

    pub fn add(&self, data: NewBackup) -> Result<AddOutcome> {
        let mut data = match self.hooks.run_add_before(data) {
            HookFlow::Proceed(data) => data,
            HookFlow::Return(outcome) => return Ok(outcome),
        };

        validate_new(&data)?;

        if self.exists(&data.id, data.version.as_deref())? {
            debug!(
                "Backup for {} version {:?} already exists",
                data.id, data.version
            );
            return Ok(AddOutcome::Duplicate);
        }

        if data.user_id.unwrap_or(0) == 0 {
            data.user_id = Some(self.users.current_user_id());
        }

        let conn = self.db.conn()?;
        let inserted = conn.execute(
            "INSERT INTO backup (created, name, path, user_id, type, version, id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Utc::now().timestamp(),
                data.name,
                data.path,
                data.user_id.unwrap_or(0),
                data.kind,
                data.version.as_deref().unwrap_or(""),
                data.id,
            ],
        );

        let outcome = match inserted {
            Ok(_) => AddOutcome::Inserted(conn.last_insert_rowid()),
            Err(e) => {
                let err = BackupError::from(e);
                if !err.is_unique_violation() {
                    return Err(err);
                }
                // Lost the race against a concurrent insert of the same pair
                AddOutcome::Duplicate
            }
        };

        if let AddOutcome::Inserted(backup_id) = outcome {
            info!("Recorded backup {} ({}) at {}", backup_id, data.name, data.path);
            self.hooks.run_add_after(&data, &outcome);
        }

        Ok(outcome)
    }

    pub fn get(&self, backup_id: i64) -> Result<Option<BackupRecord>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM backup b WHERE b.backup_id = ?1",
            BackupRecord::COLUMNS
        );
        let record = conn
            .query_row(&sql, params![backup_id], BackupRecord::from_row)
            .optional()?;
        Ok(record)
    }

    /// Delete the row and, best-effort, its archive file.
    ///
    /// Returns false when there was no such row.
    pub fn delete(&self, backup_id: i64) -> Result<bool> {
        let backup_id = match self.hooks.run_delete_before(backup_id) {
            HookFlow::Proceed(id) => id,
            HookFlow::Return(result) => return Ok(result),
        };

        let Some(record) = self.get(backup_id)? else {
            return Ok(false);
        };

        self.remove_archive(&record);

        let conn = self.db.conn()?;
        let deleted = conn.execute("DELETE FROM backup WHERE backup_id = ?1", params![backup_id])? > 0;

        if deleted {
            info!("Deleted backup {} ({})", backup_id, record.name);
        }

        self.hooks.run_delete_after(backup_id, deleted);
        Ok(deleted)
    }

    fn remove_archive(&self, record: &BackupRecord) {
        if record.path.is_empty() {
            return;
        }

        let Some(file) = self.storage.absolute_path(&record.path) else {
            warn!("Backup {} has an invalid path: {}", record.backup_id, record.path);
            return;
        };

        match fs::remove_file(&file) {
            Ok(()) => debug!("Removed archive {}", file.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Archive {} already gone", file.display())
            }
            Err(e) => warn!("Failed to remove archive {}: {}", file.display(), e),
        }
    }

    /// Absolute path of a record's archive, if the file is present
    pub fn archive_path(&self, record: &BackupRecord) -> Option<PathBuf> {
        if record.path.is_empty() {
            return None;
        }
        self.storage
            .absolute_path(&record.path)
            .filter(|path| path.is_file())
    }

    // ========================================================================
    // Listing
    // ========================================================================

    pub fn get_list(&self, query: &ListQuery) -> Result<BackupList> {
        let (where_sql, values) = query.where_clause();
        let sql = format!(
            "SELECT {} FROM backup b{}{}{}",
            BackupRecord::COLUMNS,
            where_sql,
            query.order_clause(),
            query.limit_clause()
        );
        debug!("Listing backups: {}", sql);

        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), BackupRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let rows = records
            .into_iter()
            .map(|record| BackupRow {
                user_name: self.users.display_name(record.user_id),
                record,
            })
            .collect();

        Ok(BackupList::from_rows(self.hooks.run_list(rows)))
    }

    /// Number of rows matching the same filters as [`get_list`](Self::get_list)
    pub fn count(&self, query: &ListQuery) -> Result<i64> {
        let (where_sql, values) = query.where_clause();
        let sql = format!("SELECT COUNT(b.backup_id) FROM backup b{}", where_sql);

        let conn = self.db.conn()?;
        let count = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count)
    }

    /// Whether a backup of `id` exists. `version: None` matches any version.
    pub fn exists(&self, id: &str, version: Option<&str>) -> Result<bool> {
        let query = ListQuery::new()
            .id(id)
            .version(version.map(str::to_string));
        Ok(self.count(&query)? > 0)
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    pub fn backup(&self, handler_id: &str, request: BackupRequest) -> DispatchOutcome {
        self.registry
            .dispatch(handler_id, Operation::Backup, request, self)
    }

    pub fn restore(&self, handler_id: &str, request: BackupRequest) -> DispatchOutcome {
        self.registry
            .dispatch(handler_id, Operation::Restore, request, self)
    }

    pub fn handlers(&self) -> &[HandlerDescriptor] {
        self.registry.list()
    }

    pub fn handler(&self, handler_id: &str) -> Option<&HandlerDescriptor> {
        self.registry.get(handler_id)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}

fn validate_new(data: &NewBackup) -> Result<()> {
    if data.name.is_empty() || data.name.len() > MAX_NAME_LEN {
        return Err(BackupError::invalid("name must be 1-255 bytes"));
    }
    if data.path.is_empty() || data.path.len() > MAX_PATH_LEN {
        return Err(BackupError::invalid("path must be 1-255 bytes"));
    }
    let tags = [
        data.kind.as_str(),
        data.id.as_str(),
        data.version.as_deref().unwrap_or(""),
    ];
    if tags.iter().any(|t| t.len() > MAX_TAG_LEN) {
        return Err(BackupError::invalid("type, id and version are limited to 50 bytes"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handlers::BackupHandler;
    use crate::core::i18n::Catalog;
    use crate::core::users::{MockUserDirectory, StaticUsers};
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        ledger: BackupLedger,
    }

    fn users() -> Arc<dyn UserDirectory> {
        Arc::new(StaticUsers::new(1, HashMap::from([(1, "admin".to_string())])))
    }

    fn harness_with(registry: HandlerRegistry, hooks: LedgerHooks) -> Harness {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("ledger.db")).unwrap();
        let storage = PrivateStorage::new(dir.path().join("files"));
        let ledger = BackupLedger::new(db, storage, Arc::new(registry), users()).with_hooks(hooks);
        ledger.install().unwrap();
        Harness { dir, ledger }
    }

    fn harness() -> Harness {
        let registry = HandlerRegistry::builder()
            .with_defaults(Arc::new(Catalog::new()))
            .build();
        harness_with(registry, LedgerHooks::new())
    }

    fn record(id: &str, version: Option<&str>) -> NewBackup {
        NewBackup {
            name: format!("Module {}", id),
            path: format!("private/modules/backup/module-{}.zip", id),
            kind: "module".into(),
            id: id.into(),
            version: version.map(str::to_string),
            user_id: None,
        }
    }

    fn insert_raw(ledger: &BackupLedger, created: i64, id: &str, name: &str, user_id: i64) {
        let conn = ledger.db.conn().unwrap();
        conn.execute(
            "INSERT INTO backup (created, name, path, user_id, type, version, id)
             VALUES (?1, ?2, ?3, ?4, 'module', '', ?5)",
            params![created, name, format!("private/{}.zip", id), user_id, id],
        )
        .unwrap();
    }

    fn write_module(root: &Path) -> PathBuf {
        let module = root.join("src/modA");
        fs::create_dir_all(module.join("assets")).unwrap();
        fs::write(module.join("module.json"), b"{\"id\":\"modA\"}").unwrap();
        fs::write(module.join("assets/app.js"), b"console.log(1)").unwrap();
        module
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let h = harness();
        let first = h.ledger.add(record("mod-a", Some("1.0"))).unwrap();
        assert!(matches!(first, AddOutcome::Inserted(_)));

        let second = h.ledger.add(record("mod-a", Some("1.0"))).unwrap();
        assert_eq!(second, AddOutcome::Duplicate);

        let query = ListQuery::new().id("mod-a").version(Some("1.0".into()));
        assert_eq!(h.ledger.count(&query).unwrap(), 1);
    }

    #[test]
    fn test_exists_without_version_matches_any_version() {
        let h = harness();
        h.ledger.add(record("mod-a", Some("1.0"))).unwrap();

        assert!(h.ledger.exists("mod-a", Some("1.0")).unwrap());
        assert!(!h.ledger.exists("mod-a", Some("2.0")).unwrap());
        assert!(h.ledger.exists("mod-a", None).unwrap());
        assert!(!h.ledger.exists("mod-b", None).unwrap());

        // A new version of the same unit is allowed
        let next = h.ledger.add(record("mod-a", Some("2.0"))).unwrap();
        assert!(next.backup_id().is_some());
    }

    #[test]
    fn test_unique_index_guards_concurrent_inserts() {
        let h = harness();
        insert_raw(&h.ledger, 10, "mod-a", "A", 1);

        let conn = h.ledger.db.conn().unwrap();
        let err = conn
            .execute(
                "INSERT INTO backup (created, name, path, user_id, type, version, id)
                 VALUES (11, 'A', 'x.zip', 1, 'module', '', 'mod-a')",
                [],
            )
            .map_err(BackupError::from)
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_add_defaults_owner_to_acting_user() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("ledger.db")).unwrap();
        let mut users = MockUserDirectory::new();
        users.expect_current_user_id().times(1).return_const(42i64);
        users
            .expect_display_name()
            .returning(|id| (id == 42).then(|| "alice".to_string()));

        let ledger = BackupLedger::new(
            db,
            PrivateStorage::new(dir.path()),
            Arc::new(HandlerRegistry::default()),
            Arc::new(users),
        );
        ledger.install().unwrap();

        let outcome = ledger.add(record("mod-a", None)).unwrap();
        let explicit = NewBackup {
            user_id: Some(7),
            ..record("mod-b", None)
        };
        ledger.add(explicit).unwrap();

        let stored = ledger.get(outcome.backup_id().unwrap()).unwrap().unwrap();
        assert_eq!(stored.user_id, 42);

        let list = ledger.get_list(&ListQuery::new().sort("id", "asc")).unwrap();
        let names: Vec<_> = list.iter().map(|r| r.user_name.clone()).collect();
        assert_eq!(names, vec![Some("alice".to_string()), None]);
    }

    #[test]
    fn test_add_validates_lengths() {
        let h = harness();
        let data = NewBackup {
            id: "x".repeat(51),
            ..record("mod-a", None)
        };
        assert!(matches!(
            h.ledger.add(data),
            Err(BackupError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_get_missing_is_none() {
        let h = harness();
        assert_eq!(h.ledger.get(999).unwrap(), None);
    }

    #[test]
    fn test_default_list_is_newest_first_and_counts_match() {
        let h = harness();
        for (created, id) in [(100, "a"), (300, "b"), (200, "c"), (400, "d")] {
            insert_raw(&h.ledger, created, id, id, 1);
        }

        let list = h.ledger.get_list(&ListQuery::new()).unwrap();
        let created: Vec<_> = list.iter().map(|r| r.record.created).collect();
        assert_eq!(created, vec![400, 300, 200, 100]);
        assert_eq!(h.ledger.count(&ListQuery::new()).unwrap(), 4);

        let row = list.get(list.ids()[1]).unwrap();
        assert_eq!(row.record.id, "b");
    }

    #[test]
    fn test_count_agrees_with_rows_for_filters() {
        let h = harness();
        insert_raw(&h.ledger, 1, "alpha", "Module Alpha", 1);
        insert_raw(&h.ledger, 2, "beta", "Module Beta", 2);
        insert_raw(&h.ledger, 3, "gamma", "Theme Gamma", 2);
        insert_raw(&h.ledger, 4, "delta", "MODULE Delta", 3);

        let filters = vec![
            ListQuery::new(),
            ListQuery::new().user_id(2),
            ListQuery::new().name("module"),
            ListQuery::new().name("module").user_id(2),
            ListQuery::new().id("gamma"),
            ListQuery::new().id("gamma").version(Some("".into())),
            ListQuery::new().id("gamma").version(Some("9".into())),
            ListQuery::new().name("%"),
        ];

        for filter in filters {
            let rows = h.ledger.get_list(&filter).unwrap();
            let count = h.ledger.count(&filter).unwrap();
            assert_eq!(rows.len() as i64, count, "filter {:?}", filter);
        }

        assert_eq!(h.ledger.count(&ListQuery::new().name("module")).unwrap(), 3);
        assert_eq!(h.ledger.count(&ListQuery::new().name("%")).unwrap(), 0);
    }

    #[test]
    fn test_name_filter_folds_non_ascii_case() {
        let h = harness();
        insert_raw(&h.ledger, 1, "shop", "Модуль Магазин", 1);
        insert_raw(&h.ledger, 2, "ecole", "École Theme", 1);
        insert_raw(&h.ledger, 3, "plain", "Module Plain", 1);

        for needle in ["модуль", "МОДУЛЬ", "Модуль"] {
            let filter = ListQuery::new().name(needle);
            let rows = h.ledger.get_list(&filter).unwrap();
            assert_eq!(rows.len(), 1, "needle {}", needle);
            assert_eq!(rows.iter().next().unwrap().record.id, "shop");
            assert_eq!(h.ledger.count(&filter).unwrap(), 1);
        }

        assert_eq!(h.ledger.count(&ListQuery::new().name("école")).unwrap(), 1);
        assert_eq!(h.ledger.count(&ListQuery::new().name("ÉCOLE")).unwrap(), 1);
    }

    #[test]
    fn test_pagination_and_sort() {
        let h = harness();
        for (created, id) in [(1, "c"), (2, "a"), (3, "b")] {
            insert_raw(&h.ledger, created, id, id, 1);
        }

        let page = h
            .ledger
            .get_list(&ListQuery::new().sort("id", "asc").limit(1, 2))
            .unwrap();
        let ids: Vec<_> = page.iter().map(|r| r.record.id.clone()).collect();
        assert_eq!(ids, vec!["b", "c"]);

        // Count ignores pagination
        let counted = h
            .ledger
            .count(&ListQuery::new().sort("id", "asc").limit(1, 2))
            .unwrap();
        assert_eq!(counted, 3);
    }

    #[test]
    fn test_unknown_sort_falls_back_to_default() {
        let h = harness();
        for (created, id) in [(5, "a"), (9, "b"), (7, "c")] {
            insert_raw(&h.ledger, created, id, id, 1);
        }

        let fallback = h
            .ledger
            .get_list(&ListQuery::new().sort("password", "asc"))
            .unwrap();
        let default = h.ledger.get_list(&ListQuery::new()).unwrap();
        assert_eq!(fallback.ids(), default.ids());
    }

    #[test]
    fn test_delete_tolerates_missing_file_and_is_idempotent() {
        let h = harness();
        let archive = h.ledger.storage().private_dir(MODULE_BACKUP_DIR).join("gone.zip");
        fs::write(&archive, b"zip").unwrap();

        let data = NewBackup {
            path: h.ledger.storage().relative_path(&archive),
            ..record("mod-a", None)
        };
        let backup_id = h.ledger.add(data).unwrap().backup_id().unwrap();

        fs::remove_file(&archive).unwrap();
        assert!(h.ledger.delete(backup_id).unwrap());
        assert_eq!(h.ledger.get(backup_id).unwrap(), None);
        assert!(!h.ledger.delete(backup_id).unwrap());
    }

    #[test]
    fn test_hooks_can_short_circuit_and_rewrite() {
        let registry = HandlerRegistry::default();
        let hooks = LedgerHooks::new()
            .on_add_before(|data| {
                if data.id == "vetoed" {
                    HookFlow::Return(AddOutcome::Skipped)
                } else {
                    HookFlow::Proceed(data)
                }
            })
            .on_delete_before(|backup_id| {
                if backup_id == 1 {
                    HookFlow::Return(false)
                } else {
                    HookFlow::Proceed(backup_id)
                }
            })
            .on_list(|mut rows| {
                for row in rows.iter_mut() {
                    row.record.name = row.record.name.to_uppercase();
                }
                rows
            });
        let h = harness_with(registry, hooks);

        assert_eq!(h.ledger.add(record("vetoed", None)).unwrap(), AddOutcome::Skipped);
        assert_eq!(h.ledger.count(&ListQuery::new()).unwrap(), 0);

        let id = h.ledger.add(record("kept", None)).unwrap().backup_id().unwrap();
        assert_eq!(id, 1);
        assert!(!h.ledger.delete(id).unwrap());
        assert!(h.ledger.get(id).unwrap().is_some());

        let list = h.ledger.get_list(&ListQuery::new()).unwrap();
        assert_eq!(list.get(id).unwrap().record.name, "MODULE KEPT");
    }

    #[test]
    fn test_add_after_hook_sees_only_inserts() {
        use std::sync::Mutex;

        let seen: Arc<Mutex<Vec<(String, AddOutcome)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let hooks = LedgerHooks::new().on_add_after(move |data, outcome| {
            sink.lock().unwrap().push((data.id.clone(), *outcome));
        });
        let h = harness_with(HandlerRegistry::default(), hooks);

        let first = h.ledger.add(record("mod-a", Some("1.0"))).unwrap();
        let backup_id = first.backup_id().unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("mod-a".to_string(), AddOutcome::Inserted(backup_id))]
        );

        let mut renamed = record("mod-a", Some("1.0"));
        renamed.name = "Replacement".into();
        assert_eq!(h.ledger.add(renamed).unwrap(), AddOutcome::Duplicate);

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(h.ledger.get(backup_id).unwrap().unwrap().name, "Module mod-a");
        assert_eq!(h.ledger.count(&ListQuery::new()).unwrap(), 1);
    }

    #[test]
    fn test_module_backup_skipped_by_hook_leaves_no_archive() {
        let registry = HandlerRegistry::builder()
            .with_defaults(Arc::new(Catalog::new()))
            .build();
        let hooks = LedgerHooks::new().on_add_before(|_| HookFlow::Return(AddOutcome::Skipped));
        let h = harness_with(registry, hooks);
        let module = write_module(h.dir.path());

        let outcome = h
            .ledger
            .backup("module", BackupRequest::new("modA", "Mod A").directory(&module));
        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(h.ledger.count(&ListQuery::new()).unwrap(), 0);

        let dir = h.ledger.storage().private_dir(MODULE_BACKUP_DIR);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    struct Faulty;

    impl BackupHandler for Faulty {
        fn backup(&self, _request: BackupRequest, _ledger: &BackupLedger) -> Result<bool> {
            Err(BackupError::invalid("always broken"))
        }
    }

    struct Panicky;

    impl BackupHandler for Panicky {
        fn backup(&self, _request: BackupRequest, _ledger: &BackupLedger) -> Result<bool> {
            panic!("boom")
        }
    }

    #[test]
    fn test_faulty_handlers_are_isolated() {
        let registry = HandlerRegistry::builder()
            .with_defaults(Arc::new(Catalog::new()))
            .register("faulty", "Faulty", Faulty)
            .register("panicky", "Panicky", Panicky)
            .build();
        let h = harness_with(registry, LedgerHooks::new());
        let module = write_module(h.dir.path());

        let outcome = h.ledger.backup("faulty", BackupRequest::new("x", "X"));
        assert_eq!(outcome, DispatchOutcome::Error("Invalid request: always broken".into()));

        let outcome = h.ledger.backup("panicky", BackupRequest::new("x", "X"));
        assert!(matches!(outcome, DispatchOutcome::Error(ref msg) if msg.contains("boom")));

        let outcome = h.ledger.backup("nonexistent-id", BackupRequest::new("x", "X"));
        assert_eq!(outcome, DispatchOutcome::UnknownHandler("nonexistent-id".into()));

        let outcome = h
            .ledger
            .backup("module", BackupRequest::new("modA", "Mod A").directory(&module));
        assert!(outcome.is_success());
    }

    #[test]
    fn test_restore_unsupported_is_reported() {
        let registry = HandlerRegistry::builder()
            .register("faulty", "Faulty", Faulty)
            .build();
        let h = harness_with(registry, LedgerHooks::new());

        let outcome = h.ledger.restore("faulty", BackupRequest::default());
        assert!(matches!(outcome, DispatchOutcome::Error(ref msg) if msg.contains("restore")));
    }

    #[test]
    fn test_module_backup_end_to_end() {
        let h = harness();
        let module = write_module(h.dir.path());

        let outcome = h
            .ledger
            .backup("module", BackupRequest::new("modA", "Mod A").directory(&module));
        assert_eq!(outcome, DispatchOutcome::Success);

        let list = h.ledger.get_list(&ListQuery::new()).unwrap();
        assert_eq!(list.len(), 1);
        let row = list.iter().next().unwrap();
        assert_eq!(row.record.name, "Module Mod A");
        assert_eq!(row.record.kind, "module");
        assert_eq!(row.record.id, "modA");
        assert_eq!(row.record.version, "");
        assert_eq!(row.record.user_id, 1);
        assert_eq!(row.user_name.as_deref(), Some("admin"));
        assert!(row
            .record
            .path
            .starts_with("private/modules/backup/module-modA-"));
        assert!(row.record.path.ends_with(".zip"));

        assert!(h.ledger.exists("modA", None).unwrap());

        let archive = h.ledger.archive_path(&row.record).unwrap();
        let bytes = fs::read(&archive).unwrap();
        assert_eq!(&bytes[..2], b"PK");

        // Same unit without a version is a duplicate; its archive is cleaned up
        let again = h
            .ledger
            .backup("module", BackupRequest::new("modA", "Mod A").directory(&module));
        assert_eq!(again, DispatchOutcome::Failed);
        let dir = h.ledger.storage().private_dir(MODULE_BACKUP_DIR);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);

        assert!(h.ledger.delete(row.record.backup_id).unwrap());
        assert!(!archive.exists());
        assert!(!h.ledger.exists("modA", None).unwrap());
    }

    #[test]
    fn test_module_backup_requires_directory_and_valid_id() {
        let h = harness();
        let module = write_module(h.dir.path());

        let missing_dir = h.ledger.backup("module", BackupRequest::new("modA", "Mod A"));
        assert!(matches!(missing_dir, DispatchOutcome::Error(_)));

        let bad_id = h
            .ledger
            .backup("module", BackupRequest::new("../etc", "Evil").directory(&module));
        assert!(matches!(bad_id, DispatchOutcome::Error(_)));

        let missing_source = h.ledger.backup(
            "module",
            BackupRequest::new("modB", "Mod B").directory(h.dir.path().join("nope")),
        );
        assert_eq!(missing_source, DispatchOutcome::Failed);
        assert_eq!(h.ledger.count(&ListQuery::new()).unwrap(), 0);
    }

    #[test]
    fn test_module_restore_round_trip() {
        let h = harness();
        let module = write_module(h.dir.path());
        h.ledger.backup(
            "module",
            BackupRequest::new("modA", "Mod A").directory(&module).version("1.0"),
        );
        let backup_id = h.ledger.get_list(&ListQuery::new()).unwrap().ids()[0];

        let target = h.dir.path().join("restored/modA");
        let outcome = h
            .ledger
            .restore("module", BackupRequest::restore_from(backup_id, &target));
        assert_eq!(outcome, DispatchOutcome::Success);
        assert_eq!(
            fs::read_to_string(target.join("assets/app.js")).unwrap(),
            "console.log(1)"
        );

        let missing = h
            .ledger
            .restore("module", BackupRequest::restore_from(backup_id + 100, &target));
        assert_eq!(missing, DispatchOutcome::Failed);
    }

    #[test]
    fn test_install_refuses_unwritable_storage() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("files");
        fs::write(&blocker, b"not a directory").unwrap();

        let db = Database::open(&dir.path().join("ledger.db")).unwrap();
        let ledger = BackupLedger::new(
            db.clone(),
            PrivateStorage::new(&blocker),
            Arc::new(HandlerRegistry::default()),
            users(),
        );

        assert!(matches!(ledger.install(), Err(BackupError::Install(_))));
        assert!(!db.table_exists(BACKUP_TABLE).unwrap());
    }
}
