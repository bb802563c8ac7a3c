/// Authentication middleware for the admin API
/// Resolves the bearer token to permission grants for the request

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use super::AppState;
use crate::core::Grants;

/// Attach the caller's [`Grants`] to the request, or reject it
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    if state.tokens.is_empty() {
        // No tokens configured, allow access (development mode)
        warn!("No API tokens configured - authentication disabled");
        request.extensions_mut().insert(Grants::all());
        return Ok(next.run(request).await);
    }

    let token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        // Support both "Bearer TOKEN" and just "TOKEN"
        .map(|header| header.strip_prefix("Bearer ").unwrap_or(header));

    match token.and_then(|t| state.tokens.get(t)) {
        Some(grants) => {
            request.extensions_mut().insert(grants.clone());
            Ok(next.run(request).await)
        }
        None => Err(unauthorized_response()),
    }
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "success": false,
            "error": "Unauthorized - invalid or missing authentication token"
        })),
    )
        .into_response()
}

/// Generate a random secure token
pub fn generate_token() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    const TOKEN_LEN: usize = 32;
    let mut rng = rand::thread_rng();

    (0..TOKEN_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}
