/// Backup handler for installable module directories

use std::fs;
use std::sync::Arc;

use chrono::Local;
use regex::Regex;
use tracing::{info, warn};

use super::BackupHandler;
use crate::core::archive::{compress_folder, extract_archive, CompressOptions};
use crate::core::error::{BackupError, Result};
use crate::core::i18n::Translator;
use crate::core::ledger::{AddOutcome, BackupLedger};
use crate::core::record::{BackupRequest, NewBackup};
use crate::core::storage::reserve_unique_file;
use crate::utils::{
    ARCHIVE_TIME_FORMAT, MAX_TAG_LEN, MODULE_ARCHIVE_PREFIX, MODULE_BACKUP_DIR, MODULE_HANDLER_ID,
};

pub struct ModuleHandler {
    translator: Arc<dyn Translator>,
    id_pattern: Regex,
}

impl ModuleHandler {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator,
            id_pattern: Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("static pattern"),
        }
    }

    fn validate_id(&self, id: &str) -> Result<()> {
        if id.is_empty() || id.len() > MAX_TAG_LEN || !self.id_pattern.is_match(id) {
            return Err(BackupError::invalid(format!("invalid module id: {:?}", id)));
        }
        Ok(())
    }
}

impl BackupHandler for ModuleHandler {
    fn backup(&self, request: BackupRequest, ledger: &BackupLedger) -> Result<bool> {
        let source = request
            .directory
            .clone()
            .ok_or_else(|| BackupError::invalid("module backup requires a directory"))?;
        self.validate_id(&request.id)?;

        let storage = ledger.storage();
        let directory = storage.private_dir(MODULE_BACKUP_DIR);
        if let Err(e) = storage.ensure_dir(&directory) {
            warn!("Cannot create backup directory {}: {}", directory.display(), e);
            return Ok(false);
        }

        let time = Local::now().format(ARCHIVE_TIME_FORMAT);
        let base = directory.join(format!("{}-{}-{}.zip", MODULE_ARCHIVE_PREFIX, request.id, time));
        let destination = match reserve_unique_file(&base) {
            Ok(path) => path,
            Err(e) => {
                warn!("Cannot reserve archive name {}: {}", base.display(), e);
                return Ok(false);
            }
        };

        let options = CompressOptions {
            wrapper: Some(&request.id),
            exclude: request.exclude.as_deref(),
        };

        if !compress_folder(&source, &destination, &options) {
            let _ = fs::remove_file(&destination);
            return Ok(false);
        }

        let data = NewBackup {
            name: self
                .translator
                .text("Module @name", &[("@name", request.name.as_str())]),
            path: storage.relative_path(&destination),
            kind: MODULE_HANDLER_ID.to_string(),
            id: request.id.clone(),
            version: request.version.clone(),
            user_id: request.user_id,
        };

        let outcome = match ledger.add(data) {
            Ok(outcome) => outcome,
            Err(e) => {
                let _ = fs::remove_file(&destination);
                return Err(e);
            }
        };

        match outcome {
            AddOutcome::Inserted(backup_id) => {
                info!(
                    "Module {} archived to {} (backup {})",
                    request.id,
                    destination.display(),
                    backup_id
                );
                Ok(true)
            }
            AddOutcome::Duplicate | AddOutcome::Skipped => {
                // Nothing references the new archive
                let _ = fs::remove_file(&destination);
                Ok(false)
            }
        }
    }

    fn restore(&self, request: BackupRequest, ledger: &BackupLedger) -> Result<bool> {
        let backup_id = request
            .backup_id
            .ok_or_else(|| BackupError::invalid("module restore requires a backup_id"))?;
        let target = request
            .directory
            .as_deref()
            .ok_or_else(|| BackupError::invalid("module restore requires a target directory"))?;

        let Some(record) = ledger.get(backup_id)? else {
            return Ok(false);
        };

        if record.kind != MODULE_HANDLER_ID {
            return Err(BackupError::invalid(format!(
                "backup {} was made by handler {:?}, not {}",
                backup_id, record.kind, MODULE_HANDLER_ID
            )));
        }

        let archive = match ledger.storage().absolute_path(&record.path) {
            Some(path) if path.is_file() => path,
            _ => {
                warn!("Archive for backup {} is missing: {}", backup_id, record.path);
                return Ok(false);
            }
        };

        let wrapper = (!record.id.is_empty()).then_some(record.id.as_str());
        let count = extract_archive(&archive, target, wrapper)?;
        info!(
            "Restored {} entries from backup {} into {}",
            count,
            backup_id,
            target.display()
        );
        Ok(true)
    }
}
