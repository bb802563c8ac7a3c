/// CLI argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::utils::MODULE_HANDLER_ID;

// Build timestamp injected at compile time
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "modvault")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/modvault/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the ledger table and storage directories
    Install,

    /// Drop the ledger table (archives stay on disk)
    Uninstall,

    /// Back up a directory through a handler
    Backup {
        /// Directory to archive
        directory: PathBuf,

        /// Identifier of the unit being backed up
        #[arg(long)]
        id: String,

        /// Human readable name of the unit
        #[arg(long)]
        name: String,

        /// Version of the unit
        #[arg(long)]
        version: Option<String>,

        /// Top-level entry to leave out of the archive
        #[arg(long)]
        exclude: Option<String>,

        /// Owner of the backup (default: acting user)
        #[arg(long)]
        user_id: Option<i64>,

        /// Handler to use
        #[arg(long, default_value = MODULE_HANDLER_ID)]
        handler: String,
    },

    /// Restore a backup into a directory
    Restore {
        backup_id: i64,

        /// Target directory
        directory: PathBuf,

        /// Handler to use
        #[arg(long, default_value = MODULE_HANDLER_ID)]
        handler: String,
    },

    /// List backups
    List {
        #[arg(long)]
        user_id: Option<i64>,

        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        version: Option<String>,

        /// Case-insensitive name filter
        #[arg(long)]
        name: Option<String>,

        /// Sort field (name, user_id, version, id, backup_id, type, created)
        #[arg(long)]
        sort: Option<String>,

        /// Sort order (asc, desc)
        #[arg(long)]
        order: Option<String>,

        /// Page number, starting at 1
        #[arg(short, long)]
        page: Option<u32>,

        /// Rows per page
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show a single backup
    Show { backup_id: i64 },

    /// Delete backups and their archives
    Delete {
        #[arg(required = true)]
        backup_ids: Vec<i64>,
    },

    /// Copy a backup archive to a file
    Download {
        backup_id: i64,

        /// Output file (default: archive name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List registered backup handlers
    Handlers,

    /// Check whether a backup exists for an id
    Exists {
        id: String,

        #[arg(long)]
        version: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Run HTTP API server mode
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (default: from config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default: from config)
        #[arg(long)]
        host: Option<String>,

        /// Enable CORS for cross-origin requests
        #[arg(long)]
        cors: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// View configuration
    View,

    /// Validate configuration
    Validate,

    /// Generate an API token
    #[cfg(feature = "server")]
    GenerateToken,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup() {
        let cli = Cli::try_parse_from([
            "modvault", "backup", "/srv/modules/shop", "--id", "shop", "--name", "Shop",
            "--version", "2.1",
        ])
        .unwrap();

        match cli.command {
            Commands::Backup {
                directory,
                id,
                version,
                handler,
                ..
            } => {
                assert_eq!(directory, PathBuf::from("/srv/modules/shop"));
                assert_eq!(id, "shop");
                assert_eq!(version.as_deref(), Some("2.1"));
                assert_eq!(handler, "module");
            }
            _ => panic!("expected backup command"),
        }
    }

    #[test]
    fn test_delete_requires_ids() {
        assert!(Cli::try_parse_from(["modvault", "delete"]).is_err());

        let cli = Cli::try_parse_from(["modvault", "-v", "delete", "1", "2"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Delete { ref backup_ids } if backup_ids == &[1, 2]));
    }
}
