//! HTTP transport for the campus assistant.

use axum::{
    extract::{Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::brain::{CampusAssistant, ChatRequest, ChatResponse, Language, Session};
use crate::error::AppError;
use crate::turn_log::{ConversationRow, DailyStats, SqliteTurnLog};

/// Shared state behind every route
pub struct AppState {
    pub assistant: CampusAssistant,
    /// Persisted conversation log; log routes answer 503 without it
    pub log: Option<SqliteTurnLog>,
}

type ApiError = (StatusCode, String);

#[derive(Debug, Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DailyLogsResponse {
    pub date: String,
    pub total_conversations: usize,
    pub languages_used: Vec<String>,
    pub conversations: Vec<ConversationRow>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root))
        .route("/chat", post(chat))
        .route("/health", get(health))
        .route("/languages", get(languages))
        .route("/sessions/:session_id", get(get_session))
        .route("/sessions/:session_id/history", get(get_history))
        .route("/logs/daily", get(daily_logs))
        .route("/stats/daily", get(daily_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    let codes: Vec<&str> = Language::all().iter().map(|l| l.code()).collect();
    Json(json!({
        "message": "Multilingual Campus Assistant API",
        "version": env!("CARGO_PKG_VERSION"),
        "supported_languages": codes,
        "endpoints": ["/chat", "/health", "/languages", "/sessions", "/logs", "/stats"],
    }))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    Json(state.assistant.handle(request).await)
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let ready = state.assistant.is_ready();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if ready { "healthy" } else { "unavailable" },
        "ready": ready,
        "timestamp": Utc::now().to_rfc3339(),
        "topics": state.assistant.knowledge_base().len(),
        "active_sessions": state.assistant.sessions().session_count().await,
        "conversation_log": state.log.is_some(),
    });
    (status, Json(body)).into_response()
}

async fn languages() -> Json<serde_json::Value> {
    let list: Vec<_> = Language::all()
        .iter()
        .map(|l| json!({ "code": l.code(), "name": l.name() }))
        .collect();
    Json(json!({ "languages": list }))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, StatusCode> {
    state
        .assistant
        .sessions()
        .snapshot(&session_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let log = require_log(&state)?;
    let info = log.session_info(&session_id).await.map_err(internal)?;
    let Some(info) = info else {
        return Err((StatusCode::NOT_FOUND, "Session not found".into()));
    };
    let history = log.conversation_history(&session_id).await.map_err(internal)?;
    Ok(Json(json!({ "session": info, "history": history })))
}

async fn daily_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<DailyLogsResponse>, ApiError> {
    let log = require_log(&state)?;
    let date = parse_date(query.date.as_deref())?;
    let conversations = log.daily_logs(date).await.map_err(internal)?;
    let languages_used: BTreeSet<String> =
        conversations.iter().map(|c| c.language.clone()).collect();

    Ok(Json(DailyLogsResponse {
        date: date.to_string(),
        total_conversations: conversations.len(),
        languages_used: languages_used.into_iter().collect(),
        conversations,
    }))
}

async fn daily_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateQuery>,
) -> Result<Json<DailyStats>, ApiError> {
    let log = require_log(&state)?;
    let date = parse_date(query.date.as_deref())?;
    log.daily_stats(date)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, format!("No statistics for {}", date)))
}

fn require_log(state: &AppState) -> Result<&SqliteTurnLog, ApiError> {
    state.log.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "Conversation log is not configured".into(),
    ))
}

/// `YYYY-MM-DD`; today (UTC) when absent.
fn parse_date(raw: Option<&str>) -> Result<NaiveDate, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Utc::now().date_naive()),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
            let err = AppError::from(e);
            (StatusCode::BAD_REQUEST, err.to_string())
        }),
    }
}

fn internal(err: AppError) -> ApiError {
    error!(error = %err, "Request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(state: Arc<AppState>, addr: &str) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "Campus assistant listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
