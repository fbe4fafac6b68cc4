use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use vicp_registry::{
    AdminCredentials, AdminOutcome, AdminService, QueryService, Record, RegistrationService,
    RegistryError,
};
use vicp_storage::KeyValueStore;

use crate::panel::CONTROL_PANEL_HTML;

/// Largest request body accepted by the API, enforced by the body extractor.
const MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub registration: Arc<RegistrationService>,
    pub query: Arc<QueryService>,
    pub admin: Arc<AdminService>,
    pub req_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        credentials: AdminCredentials,
        list_page_size: usize,
    ) -> Self {
        Self {
            registration: Arc::new(RegistrationService::new(store.clone())),
            query: Arc::new(QueryService::new(store.clone())),
            admin: Arc::new(AdminService::with_page_size(
                store,
                credentials,
                list_page_size,
            )),
            req_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    site: Option<String>,
    domain: Option<String>,
    owner: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    ok: bool,
    record_id: String,
}

#[derive(Debug, Deserialize)]
struct LookupParams {
    id: Option<String>,
    domain: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AdminRequest {
    user: Option<String>,
    pass: Option<String>,
    #[serde(default)]
    id: Value,
}

impl AdminRequest {
    /// `null` or a missing id asks for the listing; anything that is not a string
    /// is passed on verbatim so it fails id validation after authentication.
    fn target_id(&self) -> Option<String> {
        match &self.id {
            Value::Null => None,
            Value::String(id) => Some(id.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct AdminListResponse {
    ok: bool,
    records: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AdminDeleteResponse {
    ok: bool,
    deleted: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    err: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    record_id: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    record_id: Option<String>,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
            record_id: None,
        }
    }

    fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        if err.is_internal() {
            error!("Registry operation failed: {}", err);
            return Self::internal("internal error");
        }

        match err {
            RegistryError::Validation(message) => Self::bad_request(message),
            RegistryError::NotFound(message) => Self::not_found(message),
            RegistryError::Conflict { message, record_id } => Self {
                status: StatusCode::CONFLICT,
                message,
                record_id: Some(record_id),
            },
            other => Self::new(StatusCode::FORBIDDEN, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            err: self.message,
            record_id: self.record_id,
        });
        (self.status, payload).into_response()
    }
}

pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let listener = bind_listener(addr).await?;
    info!("VICP registry listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("RPC server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind RPC listener on {addr}"))
    }
}

/// Wrong methods on known paths are answered like unknown paths.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);
    Router::new()
        .route("/", get(handle_panel).fallback(handle_not_found))
        .route(
            "/api/register",
            post(handle_register).fallback(handle_not_found),
        )
        .route("/api/query", get(handle_query).fallback(handle_not_found))
        .route(
            "/api/admin/delete",
            post(handle_admin).fallback(handle_not_found),
        )
        .fallback(handle_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

async fn handle_panel(State(state): State<SharedState>) -> Html<&'static str> {
    let req_total = state.record_request();
    debug!("Serving control panel (req_total={})", req_total);
    Html(CONTROL_PANEL_HTML)
}

async fn handle_not_found() -> ApiError {
    ApiError::not_found("not found")
}

async fn handle_register(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let req_total = state.record_request();
    debug!("Register request (req_total={})", req_total);
    let body = body.map_err(body_rejection)?;
    let request: RegisterRequest = parse_body(&body)?;

    let record = state.registration.register(
        request.site.as_deref().unwrap_or_default(),
        request.domain.as_deref().unwrap_or_default(),
        request.owner.as_deref().unwrap_or_default(),
    )?;

    Ok(Json(RegisterResponse {
        ok: true,
        record_id: record.id.into(),
    }))
}

async fn handle_query(
    State(state): State<SharedState>,
    params: Result<Query<LookupParams>, QueryRejection>,
) -> Result<Json<Record>, ApiError> {
    let req_total = state.record_request();
    debug!("Query request (req_total={})", req_total);
    let Query(params) = params.map_err(|rejection| {
        debug!("Rejected query string: {}", rejection);
        ApiError::bad_request("invalid query string")
    })?;

    let record = state
        .query
        .lookup(params.id.as_deref(), params.domain.as_deref())?;
    Ok(Json(record))
}

async fn handle_admin(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<axum::response::Response, ApiError> {
    let req_total = state.record_request();
    // An unreadable or oversized body carries no credentials and is rejected by
    // authentication.
    let request: AdminRequest = body
        .ok()
        .and_then(|body| parse_body(&body).ok())
        .unwrap_or_default();
    let target = request.target_id();

    let outcome = state.admin.handle(
        request.user.as_deref(),
        request.pass.as_deref(),
        target.as_deref(),
    )?;

    let response = match outcome {
        AdminOutcome::Listed(records) => {
            debug!("Admin listed {} records (req_total={})", records.len(), req_total);
            Json(AdminListResponse { ok: true, records }).into_response()
        }
        AdminOutcome::Deleted(deleted) => {
            debug!("Admin deleted {} (req_total={})", deleted, req_total);
            Json(AdminDeleteResponse { ok: true, deleted }).into_response()
        }
    };
    Ok(response)
}

fn body_rejection(rejection: BytesRejection) -> ApiError {
    debug!("Rejected request body: {}", rejection);
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
    } else {
        ApiError::bad_request("invalid request body")
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| {
        debug!("Rejected request body: {}", err);
        ApiError::bad_request("invalid request body")
    })
}
