/// HTTP API Server module for modvault
/// Provides the admin REST API on top of the backup ledger

pub mod auth;
pub mod handlers;
pub mod routes;

pub use routes::create_router;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::{BackupLedger, Grants};

/// Shared state for request handlers
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<BackupLedger>,
    /// Bearer token → grants; empty means open access
    pub tokens: Arc<HashMap<String, Grants>>,
}

impl AppState {
    pub fn new(ledger: BackupLedger, tokens: HashMap<String, Grants>) -> Self {
        Self {
            ledger: Arc::new(ledger),
            tokens: Arc::new(tokens),
        }
    }
}

pub async fn run(state: AppState, host: String, port: u16, enable_cors: bool) -> anyhow::Result<()> {
    let auth_enabled = !state.tokens.is_empty();
    let app = create_router(state, enable_cors);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("modvault admin server");
    println!("   API:    http://{}/api", addr);

    if auth_enabled {
        println!("   Auth:   Enabled (token required)");
    } else {
        println!("   Auth:   Disabled (no tokens configured)");
        warn!("Starting without authentication - API will be open");
    }

    println!();
    println!("API Endpoints:");
    println!("   GET  /api/backups                 - List backups (?download=<id> to fetch an archive)");
    println!("   GET  /api/backups/:id             - Show a backup");
    println!("   POST /api/backups                 - Create a backup through a handler");
    println!("   POST /api/backups/restore         - Restore a backup");
    println!("   POST /api/backups/action          - Bulk action on selected backups");
    println!("   GET  /api/handlers                - List backup handlers");
    println!("   GET  /api/health                  - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
