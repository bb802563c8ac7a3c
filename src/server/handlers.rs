/// API Request Handlers
/// Ledger calls are blocking and run on the blocking thread pool

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

use super::AppState;
use crate::core::admin::{self, BulkAction, ListPage};
use crate::core::handlers::HandlerInfo;
use crate::core::{
    BackupError, BackupLedger, BackupRecord, BackupRequest, DispatchOutcome, Grants, ListQuery,
    Permission,
};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(msg: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg),
        }
    }
}

#[derive(Serialize)]
pub struct HealthStatus {
    status: &'static str,
    version: &'static str,
    installed: bool,
}

#[derive(Serialize)]
pub struct ActionResult {
    deleted: usize,
}

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default)]
    order: Option<String>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    limit: Option<u32>,
    /// Serve this backup's archive instead of the list
    #[serde(default)]
    download: Option<i64>,
}

impl ListParams {
    fn filters(&self) -> ListQuery {
        ListQuery {
            user_id: self.user_id,
            id: self.id.clone().filter(|v| !v.is_empty()),
            version: self.version.clone().filter(|v| !v.is_empty()),
            name: self.name.clone().filter(|v| !v.is_empty()),
            sort: self.sort.clone(),
            order: self.order.clone(),
            limit: None,
        }
    }
}

#[derive(Deserialize)]
pub struct ActionBody {
    action: String,
    #[serde(default)]
    selected: Vec<i64>,
}

#[derive(Deserialize)]
pub struct BackupBody {
    handler: String,
    directory: PathBuf,
    id: String,
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    exclude: Option<String>,
    #[serde(default)]
    user_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct RestoreBody {
    handler: String,
    backup_id: i64,
    directory: PathBuf,
}

// ============================================================================
// Helpers
// ============================================================================

fn require(grants: &Grants, permission: Permission) -> Result<(), StatusCode> {
    if grants.allows(permission) {
        Ok(())
    } else {
        warn!("Request denied: missing {} permission", permission.as_str());
        Err(StatusCode::FORBIDDEN)
    }
}

fn status_for(err: &BackupError) -> StatusCode {
    match err {
        BackupError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run a ledger operation on the blocking pool
async fn blocking<T, F>(ledger: &Arc<BackupLedger>, f: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&BackupLedger) -> crate::core::Result<T> + Send + 'static,
{
    let ledger = ledger.clone();
    tokio::task::spawn_blocking(move || f(&ledger))
        .await
        .map_err(|e| {
            error!("Ledger task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Ledger operation failed: {}", e);
            status_for(&e)
        })
}

fn outcome_response(outcome: DispatchOutcome) -> Json<ApiResponse<DispatchOutcome>> {
    if outcome.is_success() {
        Json(ApiResponse::ok(outcome))
    } else {
        let msg = outcome.message();
        Json(ApiResponse {
            data: Some(outcome),
            ..ApiResponse::error(msg)
        })
    }
}

// ============================================================================
// Backup Handlers
// ============================================================================

/// Paged list, or an archive download when `download` is set
pub async fn list_backups(
    State(state): State<AppState>,
    Extension(grants): Extension<Grants>,
    Query(params): Query<ListParams>,
) -> Result<Response, StatusCode> {
    require(&grants, Permission::Backup)?;

    if let Some(backup_id) = params.download {
        return download_backup(&state, &grants, backup_id).await;
    }

    let filters = params.filters();
    let (page, limit) = (params.page, params.limit);
    let page: ListPage =
        blocking(&state.ledger, move |ledger| admin::list_page(ledger, &filters, page, limit))
            .await?;

    Ok(Json(ApiResponse::ok(page)).into_response())
}

async fn download_backup(
    state: &AppState,
    grants: &Grants,
    backup_id: i64,
) -> Result<Response, StatusCode> {
    require(grants, Permission::BackupDownload)?;

    let download = blocking(&state.ledger, move |ledger| admin::resolve_download(ledger, backup_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    let file = match tokio::fs::File::open(&download.path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("Failed to open archive {}: {}", download.path.display(), e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let length = file
        .metadata()
        .await
        .map_err(|e| {
            error!("Failed to stat archive {}: {}", download.path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .len();

    let mime = mime_guess::from_path(&download.path).first_or_octet_stream();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name.replace('"', "")
    );

    Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

pub async fn get_backup(
    State(state): State<AppState>,
    Extension(grants): Extension<Grants>,
    Path(backup_id): Path<i64>,
) -> Result<Json<ApiResponse<BackupRecord>>, StatusCode> {
    require(&grants, Permission::Backup)?;

    let record = blocking(&state.ledger, move |ledger| ledger.get(backup_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiResponse::ok(record)))
}

pub async fn apply_action(
    State(state): State<AppState>,
    Extension(grants): Extension<Grants>,
    Json(body): Json<ActionBody>,
) -> Result<Json<ApiResponse<ActionResult>>, StatusCode> {
    require(&grants, Permission::Backup)?;

    let action = BulkAction::parse(&body.action).map_err(|_| StatusCode::BAD_REQUEST)?;
    let selected = body.selected;
    let deleted = blocking(&state.ledger, move |ledger| {
        admin::apply_action(ledger, action, &selected, &grants)
    })
    .await?;

    Ok(Json(ApiResponse::ok(ActionResult { deleted })))
}

pub async fn create_backup(
    State(state): State<AppState>,
    Extension(grants): Extension<Grants>,
    Json(body): Json<BackupBody>,
) -> Result<Json<ApiResponse<DispatchOutcome>>, StatusCode> {
    require(&grants, Permission::Backup)?;

    let handler = body.handler;
    let request = BackupRequest {
        directory: Some(body.directory),
        id: body.id,
        name: body.name,
        version: body.version.filter(|v| !v.is_empty()),
        exclude: body.exclude,
        user_id: body.user_id,
        ..Default::default()
    };

    let outcome = blocking(&state.ledger, move |ledger| Ok(ledger.backup(&handler, request))).await?;
    Ok(outcome_response(outcome))
}

pub async fn restore_backup(
    State(state): State<AppState>,
    Extension(grants): Extension<Grants>,
    Json(body): Json<RestoreBody>,
) -> Result<Json<ApiResponse<DispatchOutcome>>, StatusCode> {
    require(&grants, Permission::Backup)?;

    let handler = body.handler;
    let request = BackupRequest::restore_from(body.backup_id, body.directory);

    let outcome = blocking(&state.ledger, move |ledger| Ok(ledger.restore(&handler, request))).await?;
    Ok(outcome_response(outcome))
}

pub async fn get_handlers(
    State(state): State<AppState>,
    Extension(grants): Extension<Grants>,
) -> Result<Json<ApiResponse<Vec<HandlerInfo>>>, StatusCode> {
    require(&grants, Permission::Backup)?;
    Ok(Json(ApiResponse::ok(state.ledger.registry().info())))
}

// ============================================================================
// Health Check
// ============================================================================

pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<HealthStatus>>, StatusCode> {
    let installed = blocking(&state.ledger, |ledger| ledger.is_installed()).await?;

    Ok(Json(ApiResponse::ok(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        installed,
    })))
}
