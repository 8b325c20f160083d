use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::AppState;

/// Validate the bearer token with the same gate the WebSocket handshake uses
/// and expose the caller's `Identity` as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let identity = state.gate.admit_headers(req.headers()).map_err(|e| {
        debug!("Rejected {} {}: {}", req.method(), req.uri().path(), e);
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
