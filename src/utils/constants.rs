/// Ledger, storage and permission constants shared by the CLI and the API

/// Ledger table name
pub const BACKUP_TABLE: &str = "backup";

/// Handler id of the built-in module handler
pub const MODULE_HANDLER_ID: &str = "module";

/// Filename prefix for module archives
pub const MODULE_ARCHIVE_PREFIX: &str = "module";

/// Logical private storage name for module archives, resolved under `<root>/private/`
pub const MODULE_BACKUP_DIR: &str = "modules/backup";

/// Timestamp embedded in archive filenames (day-month-year--hour-minute)
pub const ARCHIVE_TIME_FORMAT: &str = "%d-%m-%Y--%-H-%M";

/// Sort keys accepted by the list query
pub const SORTABLE_FIELDS: &[&str] = &[
    "name",
    "user_id",
    "version",
    "id",
    "backup_id",
    "type",
    "created",
];

/// Items per page on the admin list when the caller does not ask for a size
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Upper bound for a requested page size
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Column length limits from the ledger schema
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_PATH_LEN: usize = 255;
pub const MAX_TAG_LEN: usize = 50;

/// Permission names
pub const PERMISSION_ACCESS: &str = "backup";
pub const PERMISSION_DELETE: &str = "backup_delete";
pub const PERMISSION_DOWNLOAD: &str = "backup_download";

/// Environment overrides
pub const ENV_DATABASE: &str = "MODVAULT_DATABASE";
pub const ENV_STORAGE: &str = "MODVAULT_STORAGE";
pub const ENV_USER_ID: &str = "MODVAULT_USER_ID";
pub const ENV_WEB_TOKEN: &str = "MODVAULT_WEB_TOKEN";
