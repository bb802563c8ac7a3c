use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use modvault::cli::{Cli, Commands, ConfigCommands};
use modvault::core::admin::{self, BulkAction};
use modvault::core::{
    BackupLedger, BackupRequest, Catalog, Database, DispatchOutcome, Grants, HandlerRegistry,
    InstallStatus, ListQuery, PrivateStorage, UserDirectory,
};
use modvault::utils::{
    format_bytes, format_timestamp, or_sentinel, truncate_string, AppConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Install => handle_install(&config)?,
        Commands::Uninstall => handle_uninstall(&config)?,
        Commands::Backup {
            directory,
            id,
            name,
            version,
            exclude,
            user_id,
            handler,
        } => {
            let mut request = BackupRequest::new(id, name).directory(directory);
            request.version = version;
            request.exclude = exclude;
            request.user_id = user_id;
            handle_dispatch(&config, &handler, request, false)?;
        }
        Commands::Restore {
            backup_id,
            directory,
            handler,
        } => {
            let request = BackupRequest::restore_from(backup_id, directory);
            handle_dispatch(&config, &handler, request, true)?;
        }
        Commands::List {
            user_id,
            id,
            version,
            name,
            sort,
            order,
            page,
            limit,
        } => {
            let filters = ListQuery {
                user_id,
                id,
                version,
                name,
                sort,
                order,
                limit: None,
            };
            handle_list(&config, &filters, page, limit)?;
        }
        Commands::Show { backup_id } => handle_show(&config, backup_id)?,
        Commands::Delete { backup_ids } => handle_delete(&config, &backup_ids)?,
        Commands::Download { backup_id, output } => handle_download(&config, backup_id, output)?,
        Commands::Handlers => handle_handlers(&config)?,
        Commands::Exists { id, version } => handle_exists(&config, &id, version.as_deref())?,
        Commands::Config { command } => handle_config(command, &config)?,
        #[cfg(feature = "server")]
        Commands::Serve { port, host, cors } => {
            handle_serve(config, host, port, cors).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("modvault=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("modvault=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_ledger(config: &AppConfig) -> Result<BackupLedger> {
    let db = Database::open(&config.database_path).with_context(|| {
        format!("Failed to open ledger database {}", config.database_path.display())
    })?;

    let registry = HandlerRegistry::builder()
        .with_defaults(Arc::new(Catalog::new()))
        .build();

    Ok(BackupLedger::new(
        db,
        PrivateStorage::new(&config.storage_root),
        Arc::new(registry),
        Arc::new(config.user_directory()),
    ))
}

fn handle_install(config: &AppConfig) -> Result<()> {
    let ledger = open_ledger(config)?;

    match ledger.install()? {
        InstallStatus::Installed => println!("{} Ledger installed", "✓".green()),
        InstallStatus::AlreadyInstalled => println!("Ledger is already installed"),
    }
    println!("  Database: {}", config.database_path.display());
    println!("  Storage:  {}", config.storage_root.display());

    Ok(())
}

fn handle_uninstall(config: &AppConfig) -> Result<()> {
    let ledger = open_ledger(config)?;

    if ledger.uninstall()? {
        println!("{} Ledger table dropped (archives were left on disk)", "✓".green());
    } else {
        println!("Ledger is not installed");
    }

    Ok(())
}

fn handle_dispatch(
    config: &AppConfig,
    handler: &str,
    request: BackupRequest,
    restore: bool,
) -> Result<()> {
    let ledger = open_ledger(config)?;
    let outcome = if restore {
        ledger.restore(handler, request)
    } else {
        ledger.backup(handler, request)
    };

    let verb = if restore { "Restore" } else { "Backup" };
    match outcome {
        DispatchOutcome::Success => {
            println!("{} {} completed", "✓".green(), verb);
            Ok(())
        }
        other => {
            println!("{} {}", "✗".red(), other.message());
            bail!("{} through handler {} did not complete", verb, handler)
        }
    }
}

fn handle_list(
    config: &AppConfig,
    filters: &ListQuery,
    page: Option<u32>,
    limit: Option<u32>,
) -> Result<()> {
    let ledger = open_ledger(config)?;
    let page = admin::list_page(&ledger, filters, page, limit)?;

    if page.rows.is_empty() {
        println!("No backups found");
        return Ok(());
    }

    println!(
        "{:<6} {:<30} {:<10} {:<10} {:<20} {:<15} {:<20}",
        "ID", "Name", "Type", "Version", "Unit", "User", "Created"
    );
    println!("{}", "-".repeat(115));

    for item in &page.rows {
        let record = &item.row.record;
        println!(
            "{:<6} {:<30} {:<10} {:<10} {:<20} {:<15} {:<20}",
            record.backup_id,
            truncate_string(&record.name, 30),
            or_sentinel(item.handler_name.as_deref(), "Unknown"),
            or_sentinel(Some(record.version.as_str()), "None"),
            truncate_string(&or_sentinel(Some(record.id.as_str()), "None"), 20),
            or_sentinel(item.row.user_name.as_deref(), "Unknown"),
            format_timestamp(record.created),
        );
    }

    println!();
    println!(
        "Page {} of {} ({} backups, {} per page)",
        page.page, page.pages, page.total, page.limit
    );

    Ok(())
}

fn handle_show(config: &AppConfig, backup_id: i64) -> Result<()> {
    let ledger = open_ledger(config)?;
    let Some(record) = ledger.get(backup_id)? else {
        bail!("Backup {} not found", backup_id);
    };

    let handler = ledger.handler(&record.kind).map(|h| h.name.as_str());
    let archive = ledger.archive_path(&record);

    println!("{:<12} {}", "Backup:", record.backup_id);
    println!("{:<12} {}", "Name:", record.name);
    println!("{:<12} {}", "Type:", or_sentinel(handler, "Unknown"));
    println!("{:<12} {}", "Unit:", or_sentinel(Some(record.id.as_str()), "None"));
    println!("{:<12} {}", "Version:", or_sentinel(Some(record.version.as_str()), "None"));
    println!(
        "{:<12} {}",
        "User:",
        or_sentinel(ledger.users().display_name(record.user_id).as_deref(), "Unknown")
    );
    println!("{:<12} {}", "Created:", format_timestamp(record.created));
    println!("{:<12} {}", "Path:", record.path);

    match archive.and_then(|p| fs::metadata(p).ok()) {
        Some(meta) => println!("{:<12} {}", "Size:", format_bytes(meta.len())),
        None => println!("{:<12} {}", "Size:", "archive missing".yellow()),
    }

    Ok(())
}

fn handle_delete(config: &AppConfig, backup_ids: &[i64]) -> Result<()> {
    let ledger = open_ledger(config)?;
    let deleted = admin::apply_action(&ledger, BulkAction::Delete, backup_ids, &Grants::all())?;

    println!("Deleted {} of {} selected backups", deleted, backup_ids.len());
    Ok(())
}

fn handle_download(config: &AppConfig, backup_id: i64, output: Option<PathBuf>) -> Result<()> {
    let ledger = open_ledger(config)?;
    let Some(download) = admin::resolve_download(&ledger, backup_id)? else {
        bail!("Backup {} or its archive was not found", backup_id);
    };

    let output = output.unwrap_or_else(|| PathBuf::from(&download.file_name));
    let bytes = fs::copy(&download.path, &output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} Saved {} ({})",
        "✓".green(),
        output.display(),
        format_bytes(bytes)
    );
    Ok(())
}

fn handle_handlers(config: &AppConfig) -> Result<()> {
    let ledger = open_ledger(config)?;

    println!("{:<20} {:<30}", "Handler", "Name");
    println!("{}", "-".repeat(50));
    for handler in ledger.handlers() {
        println!("{:<20} {:<30}", handler.id, handler.name);
    }

    Ok(())
}

fn handle_exists(config: &AppConfig, id: &str, version: Option<&str>) -> Result<()> {
    let ledger = open_ledger(config)?;

    if ledger.exists(id, version)? {
        println!("{} A backup of {} exists", "✓".green(), id);
    } else {
        println!("No backup of {} found", id);
    }

    Ok(())
}

fn handle_config(command: ConfigCommands, config: &AppConfig) -> Result<()> {
    match command {
        ConfigCommands::View => {
            println!("Configuration:\n");
            println!("{:<16} {}", "database_path:", config.database_path.display());
            println!("{:<16} {}", "storage_root:", config.storage_root.display());
            println!("{:<16} {}", "acting_user_id:", config.acting_user_id);
            println!("{:<16} {}:{}", "server:", config.server.host, config.server.port);
            println!("{:<16} {}", "cors:", config.server.cors);

            if !config.users.is_empty() {
                println!("\nUsers:");
                for (id, name) in &config.users {
                    println!("  {:<8} {}", id, name);
                }
            }

            if !config.server.tokens.is_empty() {
                println!("\nAPI tokens:");
                for token in &config.server.tokens {
                    println!(
                        "  {:<20} {}",
                        token.display_name(),
                        token.permissions.join(", ")
                    );
                }
            }
        }
        ConfigCommands::Validate => {
            let errors = config.validate();

            if errors.is_empty() {
                println!("{} Configuration is valid", "✓".green());
            } else {
                println!("{} Configuration errors:", "✗".red());
                for error in errors {
                    println!("  - {}", error);
                }
            }
        }
        #[cfg(feature = "server")]
        ConfigCommands::GenerateToken => {
            let token = modvault::server::auth::generate_token();
            println!("{}", token);
            println!("\nAdd it to the [[server.tokens]] table of your config, for example:");
            println!("  [[server.tokens]]");
            println!("  token = \"{}\"", token);
            println!("  permissions = [\"backup\", \"backup_delete\", \"backup_download\"]");
        }
    }

    Ok(())
}

#[cfg(feature = "server")]
async fn handle_serve(
    config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    cors: bool,
) -> Result<()> {
    use modvault::server::{self, AppState};

    let ledger = open_ledger(&config)?;
    ledger.install()?;

    let state = AppState::new(ledger, config.token_grants());
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    server::run(state, host, port, cors || config.server.cors).await
}
