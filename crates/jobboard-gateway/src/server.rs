//! WebSocket upgrade route. The session gate runs here, on the HTTP request,
//! so a rejected attempt never becomes an open socket.

use std::sync::Arc;

use axum::Router;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::{debug, info};

use crate::connection;
use crate::gate::SessionGate;
use crate::registry::GroupRegistry;

#[derive(Clone)]
pub struct GatewayState {
    pub gate: Arc<SessionGate>,
    pub registry: GroupRegistry,
}

impl GatewayState {
    pub fn new(gate: SessionGate, registry: GroupRegistry) -> Self {
        Self {
            gate: Arc::new(gate),
            registry,
        }
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match state.gate.admit_headers(&headers) {
        Ok(identity) => identity,
        Err(e) => {
            info!("Gateway handshake rejected: {}", e);
            return e.into_response();
        }
    };

    debug!("Gateway handshake admitted for {}", identity.user_id);
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, registry, identity))
}
