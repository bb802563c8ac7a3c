pub mod access;
pub mod admin;
pub mod archive;
pub mod db;
pub mod error;
pub mod handlers;
pub mod hooks;
pub mod i18n;
pub mod ledger;
pub mod query;
pub mod record;
pub mod storage;
pub mod users;

pub use access::{Grants, Permission};
pub use db::{Database, InstallStatus};
pub use error::{BackupError, Result};
pub use handlers::{
    BackupHandler, DispatchOutcome, HandlerRegistry, ModuleHandler, RegistryBuilder,
};
pub use hooks::{HookFlow, LedgerHooks};
pub use i18n::{Catalog, Translator};
pub use ledger::{AddOutcome, BackupLedger};
pub use query::{BackupList, ListQuery};
pub use record::{BackupRecord, BackupRequest, BackupRow, NewBackup};
pub use storage::PrivateStorage;
pub use users::{StaticUsers, UserDirectory};
