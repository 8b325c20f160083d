use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use jobboard_api::{AppState, AppStateInner};
use jobboard_db::Database;
use jobboard_gateway::GroupRegistry;
use jobboard_types::models::NewNotification;

fn test_state() -> AppState {
    let db = Arc::new(Database::open_in_memory().unwrap());
    AppStateInner::new(
        db,
        GroupRegistry::new(),
        "api-test-secret".to_string(),
        chrono::Duration::hours(1),
    )
}

async fn call(state: &AppState, req: Request<Body>) -> (StatusCode, Value) {
    let resp = jobboard_api::router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn register(state: &AppState, email: &str) -> (Uuid, String) {
    let (status, body) = call(
        state,
        json_request(
            "POST",
            "/auth/register",
            None,
            json!({ "email": email, "password": "correct horse", "role": "candidate" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = body["user_id"].as_str().unwrap().parse().unwrap();
    (user_id, body["token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn register_then_login() {
    let state = test_state();
    let (user_id, _) = register(&state, "Casey@Example.com").await;

    let (status, body) = call(
        &state,
        json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "casey@example.com", "password": "correct horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user_id.to_string());
    assert_eq!(body["role"], "candidate");

    let (status, _) = call(
        &state,
        json_request(
            "POST",
            "/auth/login",
            None,
            json!({ "email": "casey@example.com", "password": "wrong password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_duplicates_and_admin_role() {
    let state = test_state();
    register(&state, "jo@example.com").await;

    let (status, _) = call(
        &state,
        json_request(
            "POST",
            "/auth/register",
            None,
            json!({ "email": "jo@example.com", "password": "another one", "role": "employer" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &state,
        json_request(
            "POST",
            "/auth/register",
            None,
            json!({ "email": "root@example.com", "password": "another one", "role": "admin" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn notification_routes_require_a_token() {
    let state = test_state();
    let req = Request::builder()
        .uri("/notifications")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&state, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&state, get("/notifications", "not-a-token")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn history_paging_and_read_state() {
    let state = test_state();
    let (user_id, token) = register(&state, "pat@example.com").await;
    let (other_id, other_token) = register(&state, "lee@example.com").await;

    for i in 0..3 {
        state
            .notifier
            .notify(user_id, NewNotification::new("new_application", format!("n{i}"), "m"))
            .await
            .unwrap();
    }
    state
        .notifier
        .notify(other_id, NewNotification::new("status_change", "theirs", "m"))
        .await
        .unwrap();

    let (status, page) = call(&state, get("/notifications?limit=2", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let items = page["notifications"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["title"], "n2");
    assert_eq!(items[1]["title"], "n1");
    assert_eq!(items[0]["isRead"], false);

    let cursor = page["next_before"].as_i64().unwrap();
    let (_, older) = call(&state, get(&format!("/notifications?limit=2&before={cursor}"), &token)).await;
    let items = older["notifications"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "n0");
    assert!(older["next_before"].is_null());

    let (_, count) = call(&state, get("/notifications/unread-count", &token)).await;
    assert_eq!(count["count"], 3);

    let first_id = items[0]["id"].as_i64().unwrap();
    let mark = |tok: &str| json_request("POST", &format!("/notifications/{first_id}/read"), Some(tok), Value::Null);

    // Someone else's notification looks like a missing one
    let (status, _) = call(&state, mark(&other_token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&state, mark(&token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&state, mark(&token)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, count) = call(&state, get("/notifications/unread-count", &token)).await;
    assert_eq!(count["count"], 2);

    let (_, updated) = call(
        &state,
        json_request("POST", "/notifications/read-all", Some(&token), Value::Null),
    )
    .await;
    assert_eq!(updated["updated"], 2);

    let (_, count) = call(&state, get("/notifications/unread-count", &other_token)).await;
    assert_eq!(count["count"], 1);
}
