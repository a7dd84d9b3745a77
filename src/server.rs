//!
//! recordkeep HTTP server
//! -----------------------
//! Axum routes over the table store and the identity services.
//!
//! Responsibilities:
//! - `GET/POST /api/{table}` and `GET /api/{table}/{id}` for tables listed in config.
//! - Login/logout/me endpoints with an opaque session cookie; the session holds only
//!   the user id and the user is re-read from the directory on every request.
//! - Pass-through of tables configured with a remote endpoint source.
//! - Startup: user directory load (fatal on failure) and background session sweeping.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info, warn};

use crate::config::{ServiceConfig, TableAccess, TableSource};
use crate::error::{AppError, AppResult};
use crate::identity::{AuthService, SessionCodec, SessionManager, SessionToken, User, UserDirectory};
use crate::storage::{FileBackend, Record, RecordId, SnapshotBackend, TableStore};

pub const SESSION_COOKIE: &str = "recordkeep_session";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub tables: TableStore,
    pub auth: Arc<AuthService>,
    pub codec: SessionCodec,
    pub sessions: Arc<SessionManager>,
    pub config: Arc<ServiceConfig>,
    /// Client for remote-endpoint table sources.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: ServiceConfig, backend: Arc<dyn SnapshotBackend>, directory: UserDirectory) -> anyhow::Result<Self> {
        let auth = Arc::new(AuthService::new(Arc::new(directory)));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.remote_timeout_secs))
            .build()
            .context("building HTTP client for remote tables")?;
        Ok(Self {
            tables: TableStore::new(backend),
            codec: SessionCodec::new(auth.clone()),
            auth,
            sessions: Arc::new(SessionManager::new(Duration::from_secs(config.session_ttl_secs))),
            config: Arc::new(config),
            http,
        })
    }

    /// Open the file backend under `data_dir` and load the user directory from it.
    /// A directory that cannot be loaded aborts startup.
    pub fn from_config(config: ServiceConfig) -> anyhow::Result<Self> {
        let backend = FileBackend::new(&config.data_dir)
            .with_context(|| format!("opening data folder {}", config.data_dir.display()))?
            .with_pretty(config.pretty_snapshots);
        let directory = UserDirectory::load(&backend, &config.auth)
            .with_context(|| format!("loading user directory from {}", config.data_dir.display()))?;
        Self::new(config, Arc::new(backend), directory)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(target: "recordkeep::server", "{}", self);
        }
        (status, Json(json!({"status": "error", "code": self.code_str(), "message": self.message()}))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "recordkeep ok" }))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/{table}", get(get_records).post(save_record))
        .route("/api/{table}/{id}", get(get_record))
        .with_state(state)
}

/// Load the directory, bind, and serve until the process ends.
pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    info!(
        target: "startup",
        "recordkeep starting: bind={} http_port={} data_dir='{}' tables={}",
        config.bind_address, config.http_port, config.data_dir.display(), config.tables.len()
    );
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.bind_address, config.http_port))?;
    let state = AppState::from_config(config)?;

    // Background session sweeper
    {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                sweep_sessions(&sessions);
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;
    info!(target: "startup", "listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn sweep_sessions(sessions: &SessionManager) -> usize {
    let removed = sessions.sweep();
    if removed > 0 {
        tracing::debug!(target: "recordkeep::session", removed = removed, "session_sweep");
    }
    removed
}

/// Run blocking store or credential work off the async workers.
async fn blocking<T, E, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(res) => res.map_err(Into::into),
        Err(e) => Err(AppError::internal("internal".to_string(), format!("worker task failed: {}", e))),
    }
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE) {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            if let Some((k, v)) = part.trim().split_once('=') {
                if k == name { return Some(v.to_string()); }
            }
        }
    }
    None
}

fn session_cookie(state: &AppState, token: &str) -> AppResult<HeaderValue> {
    let secure = if state.config.secure_cookies { "; Secure" } else { "" };
    let v = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        SESSION_COOKIE, token, state.sessions.ttl().as_secs(), secure
    );
    HeaderValue::from_str(&v).map_err(|e| AppError::internal("internal".to_string(), e.to_string()))
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("recordkeep_session=deleted; Max-Age=0; HttpOnly; SameSite=Strict; Path=/")
}

/// Rehydrate the acting user from the session cookie. A session whose user no longer
/// exists is revoked.
fn current_user(state: &AppState, headers: &HeaderMap) -> AppResult<(SessionToken, User)> {
    let unauthorized = || AppError::auth("unauthorized", "no active session");
    let token = parse_cookie(headers, SESSION_COOKIE).ok_or_else(unauthorized)?;
    let identity = state.sessions.resolve(&token).ok_or_else(unauthorized)?;
    match state.codec.expand(&identity) {
        Ok(user) => Ok((token, user)),
        Err(e) => {
            warn!(target: "recordkeep::server", "session for unknown user id={} revoked", identity.0);
            state.sessions.revoke(&token);
            Err(e.into())
        }
    }
}

#[derive(Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginPayload>, JsonRejection>,
) -> AppResult<Response> {
    let Json(payload) = payload.map_err(|e| AppError::user("invalid_login_request".to_string(), e.body_text()))?;
    let auth = state.auth.clone();
    let LoginPayload { username, password } = payload;
    let user = blocking(move || auth.authenticate(&username, &password)).await?;
    let session = state.sessions.issue(state.codec.reduce(&user));
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&state, &session.token)?);
    Ok((StatusCode::OK, headers, Json(user.public_json())).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = parse_cookie(&headers, SESSION_COOKIE) {
        state.sessions.revoke(&token);
    }
    let mut h = HeaderMap::new();
    h.insert(header::SET_COOKIE, clear_session_cookie());
    (StatusCode::OK, h, Json(json!({"status": "ok"})))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<JsonValue>> {
    let (_, user) = current_user(&state, &headers)?;
    Ok(Json(user.public_json()))
}

fn table_access<'a>(state: &'a AppState, table: &str) -> AppResult<&'a TableAccess> {
    state
        .config
        .table_access(table)
        .ok_or_else(|| AppError::not_found("unknown_table".to_string(), format!("no table named '{}'", table)))
}

async fn fetch_remote(state: &AppState, url: &str, table: &str) -> AppResult<(Option<HeaderValue>, axum::body::Bytes)> {
    let upstream = |e: reqwest::Error| {
        warn!(target: "recordkeep::server", "remote fetch failed table='{}': {}", table, e);
        AppError::upstream("upstream_error".to_string(), format!("remote source for '{}' failed", table))
    };
    let resp = state.http.get(url).query(&[("table", table)]).send().await.map_err(upstream)?;
    let resp = resp.error_for_status().map_err(upstream)?;
    let content_type = resp.headers().get(header::CONTENT_TYPE).cloned();
    let body = resp.bytes().await.map_err(upstream)?;
    Ok((content_type, body))
}

async fn get_records(State(state): State<AppState>, Path(table): Path<String>) -> AppResult<Response> {
    match &table_access(&state, &table)?.source {
        TableSource::LocalFile => {
            let tables = state.tables.clone();
            let records = blocking(move || tables.table(&table)?.get_all()).await?;
            Ok(Json(records).into_response())
        }
        TableSource::RemoteEndpoint { url } => {
            let (content_type, body) = fetch_remote(&state, url, &table).await?;
            let content_type = content_type.unwrap_or_else(|| HeaderValue::from_static("application/json"));
            Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
        }
    }
}

async fn get_record(State(state): State<AppState>, Path((table, id)): Path<(String, String)>) -> AppResult<Json<Record>> {
    let id = RecordId::parse(&id);
    match &table_access(&state, &table)?.source {
        TableSource::LocalFile => {
            let tables = state.tables.clone();
            let record = blocking(move || tables.table(&table)?.get_by_id(&id)).await?;
            Ok(Json(record))
        }
        TableSource::RemoteEndpoint { url } => {
            let (_, body) = fetch_remote(&state, url, &table).await?;
            let records: Vec<Record> = serde_json::from_slice(&body).map_err(|_| {
                AppError::upstream("upstream_error".to_string(), format!("remote source for '{}' did not return records", table))
            })?;
            records
                .into_iter()
                .find(|r| id.matches(r))
                .map(Json)
                .ok_or_else(|| AppError::not_found("not_found".to_string(), format!("{}/{}", table, id)))
        }
    }
}

async fn save_record(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Json(body): Json<JsonValue>,
) -> AppResult<Json<Record>> {
    let access = table_access(&state, &table)?;
    if !access.writable || access.source != TableSource::LocalFile {
        return Err(AppError::method_not_allowed("read_only".to_string(), format!("table '{}' is read-only", table)));
    }
    let JsonValue::Object(record) = body else {
        return Err(AppError::user("invalid_record", "request body must be a JSON object"));
    };
    let tables = state.tables.clone();
    let saved = blocking(move || tables.table(&table)?.upsert(record)).await?;
    Ok(Json(saved))
}
