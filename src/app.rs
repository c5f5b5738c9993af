use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post, put},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use handlebars::Handlebars;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::campaign;
use crate::cell::CellValue;
use crate::config::Config;
use crate::downloader::ExportFormat;
use crate::filter::{FilterError, FilterId};
use crate::license::{LicenseError, LicenseGate};
use crate::mailer::{EmailDispatcher, SmtpDispatcher};
use crate::session::{SendRequest, SendRunError, Session};
use crate::template::DEFAULT_TEMPLATE;

pub const SESSION_COOKIE: &str = "sheetmail_session";

const UPLOAD_LIMIT: usize = 25 * 1024 * 1024;

/// A browser's session and when it was last used.
struct SessionSlot {
    session: Arc<Mutex<Session>>,
    last_seen: Mutex<Instant>,
}

impl SessionSlot {
    fn new(now: Instant) -> Self {
        SessionSlot {
            session: Arc::new(Mutex::new(Session::new())),
            last_seen: Mutex::new(now),
        }
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        let last_seen = *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last_seen) >= ttl
    }

    fn touch(&self, now: Instant) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }
}

/// Shared server state. Each browser gets its own [`Session`], keyed by the
/// session cookie. Sessions idle for longer than the configured TTL are
/// dropped.
pub struct AppState {
    sessions: RwLock<HashMap<String, SessionSlot>>,
    session_ttl: Duration,
    license: LicenseGate,
    dispatcher: Arc<dyn EmailDispatcher>,
    pages: Handlebars<'static>,
    config: Config,
}

impl AppState {
    pub fn new(
        config: Config,
        dispatcher: Arc<dyn EmailDispatcher>,
    ) -> Result<Self, handlebars::TemplateError> {
        let mut pages = Handlebars::new();
        pages.register_template_string("dashboard", include_str!("./static/index.html"))?;
        pages.register_template_string("license", include_str!("./static/license.html"))?;

        Ok(AppState {
            sessions: RwLock::new(HashMap::new()),
            session_ttl: Duration::from_secs(config.session_ttl_secs),
            license: LicenseGate::new(config.license_file.clone(), config.license_keys.clone()),
            dispatcher,
            pages,
            config,
        })
    }

    /// Session for the request's cookie, creating one (and the cookie) if
    /// there is none or it has expired.
    fn session(&self, jar: CookieJar) -> (CookieJar, Arc<Mutex<Session>>) {
        let now = Instant::now();

        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = sessions.get(cookie.value()) {
                if !slot.is_expired(now, self.session_ttl) {
                    slot.touch(now);
                    return (jar, slot.session.clone());
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        let slot = SessionSlot::new(now);
        let session = slot.session.clone();

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, slot| !slot.is_expired(now, self.session_ttl));
        if sessions.len() < before {
            debug!("dropped {} idle sessions", before - sessions.len());
        }
        sessions.insert(id.clone(), slot);
        drop(sessions);

        let cookie = Cookie::build((SESSION_COOKIE, id))
            .path("/")
            .http_only(true);
        (jar.add(cookie), session)
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
    message: Option<String>,
}

impl StatusResponse {
    fn error(code: StatusCode, message: impl Into<String>) -> Response {
        (
            code,
            Json(StatusResponse {
                status: "error".to_string(),
                message: Some(message.into()),
            }),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
struct LicenseRequest {
    key: String,
}

#[derive(Deserialize)]
struct ColumnUpdate {
    #[serde(default)]
    column: Option<String>,
}

#[derive(Deserialize)]
struct DownloadQuery {
    #[serde(default)]
    format: ExportFormat,
}

#[derive(Deserialize)]
struct ValueUpdate {
    #[serde(default)]
    value: Option<CellValue>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/upload", post(upload))
        .route("/api/columns", get(columns))
        .route("/api/filters", get(list_filters).post(add_filter))
        .route("/api/filters/:id", delete(remove_filter))
        .route("/api/filters/:id/column", put(set_filter_column))
        .route("/api/filters/:id/value", put(set_filter_value))
        .route("/api/apply", post(apply_filters))
        .route("/api/download", get(download))
        .route("/api/send", post(send_emails))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_license));

    Router::new()
        .route("/", get(serve_index))
        .route("/api/license", get(license_status).post(activate_license))
        .merge(api)
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = Arc::new(SmtpDispatcher::new(config.smtp_host.clone(), config.smtp_port));
    let address = config.address();
    let state = Arc::new(AppState::new(config, dispatcher)?);

    let app = router(state);

    let listener = TcpListener::bind(&address).await?;
    info!("Listening on http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Rejects API calls until a license key has been activated.
async fn require_license(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if state.license.is_activated() {
        return next.run(request).await;
    }
    StatusResponse::error(StatusCode::FORBIDDEN, "license not activated")
}

async fn serve_index(State(state): State<Arc<AppState>>) -> Response {
    let (name, data) = if state.license.is_activated() {
        (
            "dashboard",
            json!({
                "page_size": state.config.page_size,
                "default_template": DEFAULT_TEMPLATE,
            }),
        )
    } else {
        ("license", json!({}))
    };

    match state.pages.render(name, &data) {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            error!("failed to render {} page: {}", name, e);
            StatusResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "failed to render page")
        }
    }
}

async fn license_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "activated": state.license.is_activated() }))
}

async fn activate_license(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LicenseRequest>,
) -> Response {
    match state.license.activate(&payload.key) {
        Ok(()) => Json(StatusResponse {
            status: "ok".to_string(),
            message: Some("✅ License Activated! Restarting...".to_string()),
        })
        .into_response(),
        Err(LicenseError::InvalidKey) => StatusResponse::error(
            StatusCode::BAD_REQUEST,
            "❌ Invalid License Key! Try Again.",
        ),
        Err(e) => StatusResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Response {
    let mut upload = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                let file_name = field.file_name().unwrap_or("upload").to_string();
                match field.bytes().await {
                    Ok(bytes) => upload = Some((file_name, bytes)),
                    Err(e) => return StatusResponse::error(StatusCode::BAD_REQUEST, e.to_string()),
                }
            }
            Ok(None) => break,
            Err(e) => return StatusResponse::error(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }

    let Some((file_name, bytes)) = upload else {
        return StatusResponse::error(StatusCode::BAD_REQUEST, "No file data received");
    };

    let (jar, session) = state.session(jar);
    let mut session = lock(&session);
    let response = match session.load_upload(&file_name, &bytes) {
        Ok(table) => Json(json!({
            "status": "ok",
            "file_name": file_name,
            "columns": table.columns(),
            "rows": table.len(),
        }))
        .into_response(),
        Err(e) => StatusResponse::error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Failed to read {}: {}", file_name, e),
        ),
    };
    (jar, response).into_response()
}

async fn columns(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, session) = state.session(jar);
    let session = lock(&session);
    (
        jar,
        Json(json!({
            "file_name": session.file_name(),
            "columns": session.columns(),
        })),
    )
}

async fn list_filters(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, session) = state.session(jar);
    let session = lock(&session);
    (jar, Json(json!(session.filters())))
}

async fn add_filter(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, session) = state.session(jar);
    let mut session = lock(&session);
    let added = session.add_filter();
    (
        jar,
        Json(json!({
            "added": added,
            "filters": session.filters(),
        })),
    )
}

async fn remove_filter(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let (jar, session) = state.session(jar);
    let mut session = lock(&session);
    let removed = session.remove_filter(FilterId(id)).map(|f| f.id);
    (
        jar,
        Json(json!({
            "removed": removed,
            "filters": session.filters(),
        })),
    )
}

async fn set_filter_column(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<u64>,
    Json(payload): Json<ColumnUpdate>,
) -> Response {
    let (jar, session) = state.session(jar);
    let mut session = lock(&session);
    let response = match session.set_filter_column(FilterId(id), payload.column.as_deref()) {
        Some((values, enabled)) => Json(json!({
            "candidate_values": values,
            "enabled": enabled,
        }))
        .into_response(),
        None => StatusResponse::error(StatusCode::NOT_FOUND, format!("no filter {}", id)),
    };
    (jar, response).into_response()
}

async fn set_filter_value(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<u64>,
    Json(payload): Json<ValueUpdate>,
) -> Response {
    let (jar, session) = state.session(jar);
    let mut session = lock(&session);
    let id = FilterId(id);
    let response = match session.set_filter_value(id, payload.value) {
        Ok(()) => Json(json!(session.filter(id))).into_response(),
        Err(e @ FilterError::UnknownFilter(_)) => {
            StatusResponse::error(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e) => StatusResponse::error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };
    (jar, response).into_response()
}

async fn apply_filters(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    let (jar, session) = state.session(jar);
    let mut session = lock(&session);
    let view = session.apply_filters();
    (
        jar,
        Json(json!({
            "columns": view.columns(),
            "data": view.to_records(),
            "total": view.len(),
            "page_size": state.config.page_size,
        })),
    )
}

async fn download(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let (jar, session) = state.session(jar);
    let export = lock(&session).download(query.format);

    let response = match export {
        Ok(Some(export)) => {
            let disposition = format!(
                "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                export.file_name,
                urlencoding::encode(export.file_name)
            );
            (
                [
                    (header::CONTENT_TYPE, export.content_type.to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                export.bytes,
            )
                .into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("export failed: {}", e);
            StatusResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    };
    (jar, response).into_response()
}

async fn send_emails(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<SendRequest>,
) -> Response {
    let (jar, session) = state.session(jar);
    let prepared = lock(&session).prepare_send(&request);

    let (jobs, plan) = match prepared {
        Ok(prepared) => prepared,
        Err(SendRunError::NothingToSend) => {
            return (
                jar,
                Json(StatusResponse {
                    status: "idle".to_string(),
                    message: Some(SendRunError::NothingToSend.to_string()),
                }),
            )
                .into_response();
        }
        Err(e) => {
            return (jar, StatusResponse::error(StatusCode::BAD_REQUEST, e.to_string()))
                .into_response();
        }
    };

    // SMTP is blocking; keep it off the async workers
    let dispatcher = state.dispatcher.clone();
    let report = tokio::task::spawn_blocking(move || {
        campaign::run(&jobs, &plan, dispatcher.as_ref())
    })
    .await;

    let response = match report {
        Ok(report) => Json(json!({
            "status": "ok",
            "lines": report.lines(),
            "sent": report.sent(),
            "failed": report.failed(),
            "results": report.results,
        }))
        .into_response(),
        Err(e) => {
            error!("send run aborted: {}", e);
            StatusResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "send run aborted")
        }
    };
    (jar, response).into_response()
}
