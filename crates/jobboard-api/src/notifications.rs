use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};

use jobboard_db::models::NotificationRow;
use jobboard_gateway::Identity;
use jobboard_types::api::{MarkAllReadResponse, NotificationPage, UnreadCountResponse};
use jobboard_types::models::Notification;

use crate::AppState;

const MAX_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: id of the oldest notification on the previous page.
    pub before: Option<i64>,
}

fn default_limit() -> u32 {
    20
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, StatusCode> {
    let limit = query.limit.clamp(1, MAX_PAGE);
    let db = state.db.clone();
    let uid = identity.user_id.to_string();
    let before = query.before;

    // Run blocking DB query off the async runtime
    let rows = tokio::task::spawn_blocking(move || db.get_notifications(&uid, limit, before))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let next_before = if rows.len() == limit as usize {
        rows.last().map(|r| r.id)
    } else {
        None
    };

    Ok(Json(NotificationPage {
        notifications: rows.into_iter().map(notification_from_row).collect(),
        next_before,
    }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let uid = identity.user_id.to_string();

    let count = tokio::task::spawn_blocking(move || db.unread_notification_count(&uid))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(UnreadCountResponse { count }))
}

/// Marking an already-read notification is not an error.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, StatusCode> {
    let db = state.db.clone();
    let uid = identity.user_id.to_string();

    let found = tokio::task::spawn_blocking(move || db.mark_notification_read(&uid, id))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    match found {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(StatusCode::NOT_FOUND),
    }
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let uid = identity.user_id.to_string();

    let updated = tokio::task::spawn_blocking(move || db.mark_all_notifications_read(&uid))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(MarkAllReadResponse { updated }))
}

pub(crate) fn notification_from_row(row: NotificationRow) -> Notification {
    let data = row.data.as_deref().and_then(|raw| {
        serde_json::from_str(raw)
            .map_err(|e| warn!("Corrupt data on notification {}: {}", row.id, e))
            .ok()
    });

    let created_at = chrono::DateTime::parse_from_rfc3339(&row.created_at)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on notification {}: {}", row.created_at, row.id, e);
            chrono::DateTime::default()
        });

    Notification {
        id: row.id,
        kind: row.kind,
        title: row.title,
        message: row.message,
        data,
        is_read: row.is_read,
        created_at,
    }
}
