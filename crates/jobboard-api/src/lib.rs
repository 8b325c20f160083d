pub mod auth;
pub mod middleware;
pub mod notifications;
pub mod notify;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use jobboard_db::Database;
use jobboard_gateway::{GroupRegistry, SessionGate};

use crate::notify::Notifier;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub gate: Arc<SessionGate>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub notifier: Notifier,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        registry: GroupRegistry,
        jwt_secret: String,
        token_ttl: chrono::Duration,
    ) -> AppState {
        Arc::new(Self {
            notifier: Notifier::new(db.clone(), registry),
            gate: Arc::new(SessionGate::new(&jwt_secret)),
            db,
            jwt_secret,
            token_ttl,
        })
    }
}

/// Public auth routes plus the bearer-protected notification routes.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    public_routes.merge(protected_routes).with_state(state)
}
