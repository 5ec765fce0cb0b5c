use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::{LeadId, LeadStatus};
use shared::error::ApiError;
use shared::protocol::Credentials;
use tokio::{net::TcpListener, sync::Mutex};
use uuid::Uuid;

use super::*;

#[derive(Debug, Clone)]
struct RecordedListRequest {
    query: HashMap<String, String>,
    apikey: Option<String>,
    authorization: Option<String>,
}

#[derive(Clone)]
struct BackendState {
    rows: Arc<Mutex<Vec<Value>>>,
    grant_token: Arc<Mutex<Option<String>>>,
    grant_failure: Arc<Mutex<Option<Value>>>,
    list_failure: Arc<Mutex<Option<Value>>>,
    logout_failure: Arc<Mutex<bool>>,
    token_requests: Arc<Mutex<Vec<(HashMap<String, String>, Value)>>>,
    list_requests: Arc<Mutex<Vec<RecordedListRequest>>>,
    insert_requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    patch_requests: Arc<Mutex<Vec<(HashMap<String, String>, Value)>>>,
    delete_requests: Arc<Mutex<Vec<HashMap<String, String>>>>,
    logout_calls: Arc<Mutex<u32>>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            rows: Arc::new(Mutex::new(Vec::new())),
            grant_token: Arc::new(Mutex::new(Some("token-abc".to_string()))),
            grant_failure: Arc::new(Mutex::new(None)),
            list_failure: Arc::new(Mutex::new(None)),
            logout_failure: Arc::new(Mutex::new(false)),
            token_requests: Arc::new(Mutex::new(Vec::new())),
            list_requests: Arc::new(Mutex::new(Vec::new())),
            insert_requests: Arc::new(Mutex::new(Vec::new())),
            patch_requests: Arc::new(Mutex::new(Vec::new())),
            delete_requests: Arc::new(Mutex::new(Vec::new())),
            logout_calls: Arc::new(Mutex::new(0)),
        }
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

async fn grant_token(
    State(state): State<BackendState>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    state.token_requests.lock().await.push((query, body));
    if let Some(failure) = state.grant_failure.lock().await.clone() {
        return (StatusCode::BAD_REQUEST, Json(failure)).into_response();
    }
    let body = match state.grant_token.lock().await.clone() {
        Some(token) => json!({"access_token": token, "token_type": "bearer"}),
        None => json!({"token_type": "bearer"}),
    };
    (StatusCode::OK, Json(body)).into_response()
}

async fn sign_out_endpoint(State(state): State<BackendState>) -> Response {
    *state.logout_calls.lock().await += 1;
    if *state.logout_failure.lock().await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "session store offline"})),
        )
            .into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn list_leads_endpoint(
    State(state): State<BackendState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.list_requests.lock().await.push(RecordedListRequest {
        query,
        apikey: header_string(&headers, "apikey"),
        authorization: header_string(&headers, "authorization"),
    });
    if let Some(failure) = state.list_failure.lock().await.clone() {
        return (StatusCode::FORBIDDEN, Json(failure)).into_response();
    }
    let rows = state.rows.lock().await.clone();
    (StatusCode::OK, Json(Value::Array(rows))).into_response()
}

async fn insert_lead_endpoint(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state
        .insert_requests
        .lock()
        .await
        .push((header_string(&headers, "prefer"), body));
    StatusCode::CREATED.into_response()
}

async fn patch_lead_endpoint(
    State(state): State<BackendState>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    state.patch_requests.lock().await.push((query, body));
    StatusCode::NO_CONTENT.into_response()
}

async fn delete_lead_endpoint(
    State(state): State<BackendState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.delete_requests.lock().await.push(query);
    StatusCode::NO_CONTENT.into_response()
}

async fn spawn_backend(state: BackendState) -> Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/auth/v1/token", post(grant_token))
        .route("/auth/v1/logout", post(sign_out_endpoint))
        .route(
            "/rest/v1/leads",
            axum::routing::get(list_leads_endpoint)
                .post(insert_lead_endpoint)
                .patch(patch_lead_endpoint)
                .delete(delete_lead_endpoint),
        )
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn connected_backend() -> Result<(BackendState, Arc<RestConnection>)> {
    let state = BackendState::new();
    let url = spawn_backend(state.clone()).await?;
    let conn = RestConnection::new(&url, "anon-key")?;
    Ok((state, conn))
}

fn credentials() -> Credentials {
    Credentials {
        email: "ana@example.com".to_string(),
        password: "secret".to_string(),
    }
}

fn lead_row(name: &str) -> Value {
    json!({
        "id": Uuid::new_v4(),
        "name": name,
        "contact_handle": "5511999",
        "category": null,
        "status": "new",
        "note": null,
        "created_at": "2026-01-05T12:00:00Z",
    })
}

#[tokio::test]
async fn sign_in_requests_a_password_grant_and_stores_the_token() {
    let (state, conn) = connected_backend().await.expect("backend");
    let session = RestSessionProvider::new(conn.clone());

    assert!(!session.session_present().await.expect("presence"));
    session.sign_in(&credentials()).await.expect("sign in");
    assert!(session.session_present().await.expect("presence"));

    let requests = state.token_requests.lock().await.clone();
    assert_eq!(requests.len(), 1);
    let (query, body) = &requests[0];
    assert_eq!(query.get("grant_type").map(String::as_str), Some("password"));
    assert_eq!(body["email"], "ana@example.com");
    assert_eq!(body["password"], "secret");

    let data = RestLeadService::new(conn);
    data.list_leads().await.expect("list");
    let recorded = state.list_requests.lock().await.clone();
    assert_eq!(
        recorded[0].authorization.as_deref(),
        Some("Bearer token-abc")
    );
    assert_eq!(recorded[0].apikey.as_deref(), Some("anon-key"));
}

#[tokio::test]
async fn sign_in_without_a_usable_token_leaves_the_session_absent() {
    let (state, conn) = connected_backend().await.expect("backend");
    *state.grant_token.lock().await = None;
    let session = RestSessionProvider::new(conn);

    session.sign_in(&credentials()).await.expect("reported success");

    assert!(!session.session_present().await.expect("presence"));
}

#[tokio::test]
async fn sign_in_failure_surfaces_the_auth_description_verbatim() {
    let (state, conn) = connected_backend().await.expect("backend");
    *state.grant_failure.lock().await =
        Some(json!({"error_description": "Invalid login credentials"}));
    let session = RestSessionProvider::new(conn);

    let err = session.sign_in(&credentials()).await.expect_err("must fail");

    assert_eq!(err.to_string(), "Invalid login credentials");
    assert!(!session.session_present().await.expect("presence"));
}

#[tokio::test]
async fn sign_out_drops_the_local_session_even_when_the_remote_call_fails() {
    let (state, conn) = connected_backend().await.expect("backend");
    let session = RestSessionProvider::new(conn);
    session.sign_in(&credentials()).await.expect("sign in");
    *state.logout_failure.lock().await = true;

    let err = session.sign_out().await.expect_err("remote failure");

    assert_eq!(err.to_string(), "session store offline");
    assert!(!session.session_present().await.expect("presence"));
    assert_eq!(*state.logout_calls.lock().await, 1);
}

#[tokio::test]
async fn list_requests_the_full_set_newest_first() {
    let (state, conn) = connected_backend().await.expect("backend");
    *state.rows.lock().await = vec![lead_row("newest"), lead_row("oldest")];
    let data = RestLeadService::new(conn);

    let leads = data.list_leads().await.expect("list");

    assert_eq!(leads.len(), 2);
    assert_eq!(leads[0].name, "newest");
    assert_eq!(leads[0].status, LeadStatus::New);

    let recorded = state.list_requests.lock().await.clone();
    assert_eq!(recorded[0].query.get("select").map(String::as_str), Some("*"));
    assert_eq!(
        recorded[0].query.get("order").map(String::as_str),
        Some("created_at.desc")
    );
}

#[tokio::test]
async fn list_failure_surfaces_the_remote_message_verbatim() {
    let (state, conn) = connected_backend().await.expect("backend");
    let failure = ApiError::new(ErrorCode::Forbidden, "permission denied for table leads");
    *state.list_failure.lock().await = Some(serde_json::to_value(&failure).expect("body"));
    let data = RestLeadService::new(conn);

    let err = data.list_leads().await.expect_err("must fail");

    assert_eq!(err.to_string(), "permission denied for table leads");
    let exception = err.downcast_ref::<ApiException>().expect("typed failure");
    assert_eq!(exception.code, ErrorCode::Forbidden);
}

#[tokio::test]
async fn insert_sends_one_row_without_status_or_owner_fields() {
    let (state, conn) = connected_backend().await.expect("backend");
    let data = RestLeadService::new(conn);

    data.insert_lead(&NewLead {
        name: "Ana".to_string(),
        contact_handle: Some("5511999".to_string()),
        category: None,
        note: None,
    })
    .await
    .expect("insert");

    let requests = state.insert_requests.lock().await.clone();
    assert_eq!(requests.len(), 1);
    let (prefer, body) = &requests[0];
    assert_eq!(prefer.as_deref(), Some("return=minimal"));

    let rows = body.as_array().expect("array payload");
    assert_eq!(rows.len(), 1);
    let row = rows[0].as_object().expect("object row");
    assert_eq!(row["name"], "Ana");
    assert!(!row.contains_key("status"));
    assert!(!row.contains_key("user_id"));
    assert!(!row.contains_key("owner_id"));
}

#[tokio::test]
async fn update_status_targets_exactly_one_row_by_id_filter() {
    let (state, conn) = connected_backend().await.expect("backend");
    let data = RestLeadService::new(conn);
    let id = LeadId(Uuid::new_v4());

    data.update_status(id, LeadStatus::InProgress)
        .await
        .expect("update");

    let requests = state.patch_requests.lock().await.clone();
    assert_eq!(requests.len(), 1);
    let (query, body) = &requests[0];
    assert_eq!(
        query.get("id").map(String::as_str),
        Some(format!("eq.{}", id.0).as_str())
    );
    assert_eq!(body, &json!({"status": "in_progress"}));
}

#[tokio::test]
async fn delete_targets_exactly_one_row_by_id_filter() {
    let (state, conn) = connected_backend().await.expect("backend");
    let data = RestLeadService::new(conn);
    let id = LeadId(Uuid::new_v4());

    data.delete_lead(id).await.expect("delete");

    let requests = state.delete_requests.lock().await.clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].get("id").map(String::as_str),
        Some(format!("eq.{}", id.0).as_str())
    );
}

#[test]
fn rejects_an_unparseable_base_url() {
    RestConnection::new("not a url", "anon-key").expect_err("must reject");
}
