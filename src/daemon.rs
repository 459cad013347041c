use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Json, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::config::Config;
use crate::error::{ClockError, Result};
use crate::interfaces::channel::ChannelClient;
use crate::interfaces::scheduler::ScheduledJob;
use crate::providers::http_channel::HttpChannelClient;
use crate::scheduler::Scheduler;
use crate::services::clock::{ClockService, FetchReport};
use crate::services::parser;
use crate::services::render::{self, Link};
use crate::updates::{ClockUpdate, UpdateStore};

const DEFAULT_HISTORY_LIMIT: i64 = 10;
const DEFAULT_PERIOD_DAYS: i64 = 1;

const INDEX_HTML: &str = include_str!("../web/index.html");
const ADMIN_HTML: &str = include_str!("../web/admin.html");
const APP_JS: &str = include_str!("../web/app.js");
const ADMIN_JS: &str = include_str!("../web/admin.js");

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ClockService>,
    pub polling_enabled: bool,
}

struct ClockFetchJob {
    service: Arc<ClockService>,
    interval: Duration,
    retry_delay: Duration,
}

#[async_trait::async_trait]
impl ScheduledJob for ClockFetchJob {
    fn name(&self) -> &str {
        "clock_fetch"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    async fn run(&self) -> Result<()> {
        let report = self.service.fetch_latest().await?;
        if report.updates_count > 0 {
            tracing::info!(updates = report.updates_count, "Background fetch stored updates");
        } else {
            tracing::debug!("Background fetch found no new updates");
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

#[derive(Serialize, Default)]
struct LatestResponse {
    id: Option<i32>,
    message_id: Option<i64>,
    time: Option<String>,
    normalized_time: Option<String>,
    date: Option<String>,
    current: Option<String>,
    description: Option<String>,
    content: Option<String>,
    content_html: Option<String>,
    links: Option<Vec<Link>>,
    image_data: Option<String>,
    posted_at: Option<String>,
    created_at: Option<String>,
}

impl From<ClockUpdate> for LatestResponse {
    fn from(update: ClockUpdate) -> Self {
        Self {
            id: Some(update.id),
            message_id: Some(update.message_id),
            normalized_time: parser::normalize_time(&update.time_value),
            time: Some(update.time_value),
            date: update.date_label,
            current: update.current_label,
            description: Some(update.description),
            content_html: Some(render::content_to_html(&update.content)),
            links: Some(render::extract_links(&update.content)),
            content: Some(update.content),
            image_data: update.image_data,
            posted_at: iso_timestamp(update.posted_at),
            created_at: iso_timestamp(update.created_at),
        }
    }
}

#[derive(Serialize)]
struct UpdateView {
    id: i32,
    message_id: i64,
    time: String,
    date: Option<String>,
    current: Option<String>,
    description: String,
    content: String,
    image_data: Option<String>,
    is_active: bool,
    posted_at: Option<String>,
    created_at: Option<String>,
}

impl From<ClockUpdate> for UpdateView {
    fn from(update: ClockUpdate) -> Self {
        Self {
            id: update.id,
            message_id: update.message_id,
            time: update.time_value,
            date: update.date_label,
            current: update.current_label,
            description: update.description,
            content: update.content,
            image_data: update.image_data,
            is_active: update.is_active,
            posted_at: iso_timestamp(update.posted_at),
            created_at: iso_timestamp(update.created_at),
        }
    }
}

#[derive(Serialize)]
struct HistoryResponse {
    updates: Vec<UpdateView>,
    total_count: i64,
    limit: i64,
}

#[derive(Serialize)]
struct FetchResponse {
    updates_count: usize,
    skipped: usize,
    message: String,
}

impl From<FetchReport> for FetchResponse {
    fn from(report: FetchReport) -> Self {
        Self {
            message: format!("Successfully fetched {} new updates", report.updates_count),
            updates_count: report.updates_count,
            skipped: report.skipped,
        }
    }
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct PeriodQuery {
    days: Option<i64>,
}

#[derive(Deserialize)]
struct ParseRequest {
    text: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/clock/latest", get(latest))
        .route("/clock/history", get(history))
        .route("/clock/fetch", post(fetch))
        .route("/clock/fetch-period", post(fetch_period))
        .route("/clock/reload/:message_id", post(reload))
        .route("/clock/reset", post(reset))
        .route("/clock/parse", post(parse_text))
        .route("/app", get(index_page))
        .route("/admin", get(admin_page))
        .route("/static/app.js", get(app_script))
        .route("/static/admin.js", get(admin_script))
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Dooms Deal Clock API",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
        "polling": state.polling_enabled,
    }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn latest(State(state): State<AppState>) -> Response {
    match state.service.latest().await {
        Ok(Some(update)) => (StatusCode::OK, Json(LatestResponse::from(update))).into_response(),
        Ok(None) => (StatusCode::OK, Json(LatestResponse::default())).into_response(),
        Err(err) => error_response(err),
    }
}

async fn history(
    State(state): State<AppState>,
    query: std::result::Result<Query<HistoryQuery>, QueryRejection>,
) -> Response {
    let limit = match query {
        Ok(Query(query)) => query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let updates = match state.service.history(limit).await {
        Ok(updates) => updates,
        Err(err) => return error_response(err),
    };
    let total_count = match state.service.total_count().await {
        Ok(count) => count,
        Err(err) => return error_response(err),
    };

    (
        StatusCode::OK,
        Json(HistoryResponse {
            updates: updates.into_iter().map(UpdateView::from).collect(),
            total_count,
            limit,
        }),
    )
        .into_response()
}

async fn fetch(State(state): State<AppState>) -> Response {
    match state.service.fetch_latest().await {
        Ok(report) => (StatusCode::OK, Json(FetchResponse::from(report))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn fetch_period(
    State(state): State<AppState>,
    query: std::result::Result<Query<PeriodQuery>, QueryRejection>,
) -> Response {
    let days = match query {
        Ok(Query(query)) => query.days.unwrap_or(DEFAULT_PERIOD_DAYS),
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match state.service.fetch_period(days).await {
        Ok(report) => (StatusCode::OK, Json(FetchResponse::from(report))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn reload(
    State(state): State<AppState>,
    message_id: std::result::Result<Path<i64>, PathRejection>,
) -> Response {
    let message_id = match message_id {
        Ok(Path(message_id)) => message_id,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match state.service.reload(message_id).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "message": format!("Successfully reloaded message {}", report.message_id),
                "message_id": report.message_id,
                "updates_count": report.updates_count,
                "activated": report.activated,
            })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn reset(State(state): State<AppState>) -> Response {
    match state.service.reset().await {
        Ok(deleted) => (StatusCode::OK, Json(json!({ "deleted": deleted }))).into_response(),
        Err(err) => error_response(err),
    }
}

async fn parse_text(payload: std::result::Result<Json<ParseRequest>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(request)) => {
            (StatusCode::OK, Json(parser::analyze(&request.text))).into_response()
        }
        Err(rejection) => bad_request(rejection.body_text()),
    }
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn admin_page() -> Html<&'static str> {
    Html(ADMIN_HTML)
}

async fn app_script() -> impl IntoResponse {
    javascript(APP_JS)
}

async fn admin_script() -> impl IntoResponse {
    javascript(ADMIN_JS)
}

fn javascript(body: &'static str) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        body,
    )
}

fn status_for(err: &ClockError) -> StatusCode {
    match err {
        ClockError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ClockError::NotFound(_) => StatusCode::NOT_FOUND,
        ClockError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ClockError::Upstream(_) | ClockError::Http(_) => StatusCode::BAD_GATEWAY,
        ClockError::Config(_)
        | ClockError::Database(_)
        | ClockError::Serialization(_)
        | ClockError::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: ClockError) -> Response {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::warn!(error = %err, "Request failed");
    }
    (
        status,
        Json(ErrorResponse {
            detail: err.to_string(),
        }),
    )
        .into_response()
}

fn bad_request(detail: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { detail })).into_response()
}

fn iso_timestamp(ts: i64) -> Option<String> {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}

pub async fn build_state(config: &Config, client: Arc<dyn ChannelClient>) -> Result<AppState> {
    let store = Arc::new(UpdateStore::new(&config.database_path).await?);
    let service = Arc::new(ClockService::new(client, store, config.fetch_limit));
    Ok(AppState {
        service,
        polling_enabled: config.polling_enabled(),
    })
}

pub async fn run(config: Config) -> Result<()> {
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to listen for shutdown signal");
            futures::future::pending::<()>().await;
        }
    };
    let client: Arc<dyn ChannelClient> = Arc::new(HttpChannelClient::new(&config.channel)?);
    run_with_shutdown(config, client, shutdown).await
}

pub async fn run_with_shutdown<F>(
    config: Config,
    client: Arc<dyn ChannelClient>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let state = build_state(&config, client).await?;

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ClockError::Runtime(e.to_string()))?;
    tracing::info!(%addr, channel = %config.channel.username, "Clock server listening");

    let mut scheduler = Scheduler::new();
    if state.polling_enabled {
        scheduler.register_job(Arc::new(ClockFetchJob {
            service: state.service.clone(),
            interval: config.update_interval(),
            retry_delay: config.retry_delay(),
        }));
        scheduler.start();
    } else {
        tracing::info!("Background polling disabled; use POST /clock/fetch");
    }

    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await;
    scheduler.stop().await;
    served.map_err(|e| ClockError::Runtime(e.to_string()))?;

    tracing::info!("Clock server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_statuses() {
        for (err, status) in [
            (ClockError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (ClockError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ClockError::Unprocessable("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ClockError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (ClockError::Http("x".into()), StatusCode::BAD_GATEWAY),
            (ClockError::Serialization("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ClockError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            assert_eq!(status_for(&err), status, "{err}");
        }
    }
}
