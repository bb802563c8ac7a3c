/// API Routes definition

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth;
use super::handlers;
use super::AppState;

pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    // Protected routes (require a token when any are configured)
    let protected_routes = Router::new()
        .route("/api/backups", get(handlers::list_backups).post(handlers::create_backup))
        .route("/api/backups/action", post(handlers::apply_action))
        .route("/api/backups/restore", post(handlers::restore_backup))
        .route("/api/backups/:backup_id", get(handlers::get_backup))
        .route("/api/handlers", get(handlers::get_handlers))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware));

    // Public routes
    let public_routes = Router::new().route("/api/health", get(handlers::health_check));

    let mut app = Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }

    app
}
