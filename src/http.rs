//! HTTP surface — thin request/response mapping over the store and the
//! suggestion pipeline.
//!
//! Missing required parameters → 400. Unexpected sink/query failure →
//! 500. Classification and notification failures are internal and never
//! reach a caller.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::model::Category;
use crate::store::{EmailFilter, EmailPage, EmailStore};
use crate::suggest::Suggester;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EmailStore>,
    pub suggester: Arc<Suggester>,
}

/// Build the Axum router.
pub fn routes(store: Arc<dyn EmailStore>, suggester: Arc<Suggester>) -> Router {
    let state = AppState { store, suggester };

    Router::new()
        .route("/health", get(health))
        .route("/api/emails/search", get(search_emails))
        .route("/api/emails", get(list_emails))
        .route("/api/suggest", post(suggest_replies))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "onebox"
    }))
}

// ── Search / list ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    #[serde(default)]
    page: usize,
}

async fn search_emails(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(q) = params.q.filter(|q| !q.trim().is_empty()) else {
        return Err(ApiError::MissingParam("q"));
    };

    let page = state.store.search(&q, params.page).await?;
    Ok(Json(page_body(page, params.page)))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    category: Option<String>,
    account: Option<String>,
    folder: Option<String>,
    #[serde(default)]
    page: usize,
}

async fn list_emails(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let category = match params.category.as_deref() {
        None => None,
        Some(label) => {
            Some(Category::parse(label).ok_or(ApiError::InvalidParam("category"))?)
        }
    };

    let filter = EmailFilter {
        category,
        account_id: params.account,
        folder: params.folder,
    };
    let page = state.store.list(&filter, params.page).await?;
    Ok(Json(page_body(page, params.page)))
}

fn page_body(page: EmailPage, page_no: usize) -> serde_json::Value {
    serde_json::json!({
        "total": page.total,
        "page": page_no,
        "emails": page.records,
    })
}

// ── Suggestions ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SuggestRequest {
    #[serde(default)]
    subject: String,
    body: Option<String>,
}

async fn suggest_replies(
    State(state): State<AppState>,
    Json(req): Json<SuggestRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(body) = req.body else {
        return Err(ApiError::MissingParam("body"));
    };

    let replies = state.suggester.suggest_replies(&req.subject, &body).await;
    Ok(Json(serde_json::json!({ "replies": replies })))
}

// ── Error mapping ───────────────────────────────────────────────────

enum ApiError {
    MissingParam(&'static str),
    InvalidParam(&'static str),
    Internal,
}

impl From<crate::error::IndexError> for ApiError {
    fn from(e: crate::error::IndexError) -> Self {
        error!(error = %e, "Store query failed");
        ApiError::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::MissingParam(name) => (
                StatusCode::BAD_REQUEST,
                format!("missing required parameter: {name}"),
            ),
            ApiError::InvalidParam(name) => {
                (StatusCode::BAD_REQUEST, format!("invalid parameter: {name}"))
            }
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
