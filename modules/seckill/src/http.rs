use crate::config::Config;
use crate::models::{AdminInitRequest, AdminReleaseRequest, BuyOutcome, BuyRequest, ReserveOutcome, SeckillError};
use crate::service;
use crate::store::SeckillStore;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use event_bus::EventBus;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: SeckillStore,
    pub bus: Arc<dyn EventBus>,
    pub pool: PgPool,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .route("/seckill/buy", axum::routing::post(buy))
        .route("/seckill/status/{product_id}", axum::routing::get(status))
        .route("/admin/seckill/init", axum::routing::post(admin_init))
        .route("/admin/seckill/release", axum::routing::post(admin_release))
        .route("/api/health", axum::routing::get(health))
        .with_state(state)
}

impl IntoResponse for SeckillError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "seckill request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": "internal error"}))).into_response()
    }
}

fn user_id_header(headers: &HeaderMap) -> Result<String, Response> {
    headers
        .get("X-User-ID")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "X-User-ID header required"}))).into_response())
}

fn admin_key_header(headers: &HeaderMap, config: &Config) -> Result<(), Response> {
    let provided = headers.get("X-Admin-Key").and_then(|v| v.to_str().ok()).unwrap_or_default();
    if provided == config.admin_key {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": "invalid admin key"}))).into_response())
    }
}

async fn buy(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<BuyRequest>) -> Response {
    let user_id = match user_id_header(&headers) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let status = match state.store.status(&req.product_id).await {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let price = status.map(|s| s.price).unwrap_or(0.0);

    match service::buy(&state.store, &state.bus, &state.pool, &req.product_id, &user_id, state.config.rate_limit, state.config.rate_window_secs, price, None).await {
        Ok(BuyOutcome::Won(resp)) => (StatusCode::ACCEPTED, Json(resp)).into_response(),
        Ok(BuyOutcome::Rejected(ReserveOutcome::RateLimited)) => {
            (StatusCode::TOO_MANY_REQUESTS, Json(serde_json::json!({"error": "RATE_LIMIT_EXCEEDED"}))).into_response()
        }
        Ok(BuyOutcome::Rejected(ReserveOutcome::CampaignNotStarted)) => {
            (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "CAMPAIGN_NOT_STARTED"}))).into_response()
        }
        Ok(BuyOutcome::Rejected(ReserveOutcome::AlreadyPurchased)) => {
            (StatusCode::CONFLICT, Json(serde_json::json!({"error": "ALREADY_PURCHASED"}))).into_response()
        }
        Ok(BuyOutcome::Rejected(ReserveOutcome::OutOfStock)) => {
            (StatusCode::CONFLICT, Json(serde_json::json!({"error": "OUT_OF_STOCK"}))).into_response()
        }
        Ok(BuyOutcome::Rejected(ReserveOutcome::Won)) => unreachable!("Won is never returned as a rejection"),
        Err(e) => e.into_response(),
    }
}

async fn status(State(state): State<Arc<AppState>>, Path(product_id): Path<String>) -> Response {
    match state.store.status(&product_id).await {
        Ok(Some(status)) => (StatusCode::OK, Json(status)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "CAMPAIGN_NOT_FOUND"}))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn admin_init(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<AdminInitRequest>) -> Response {
    if let Err(resp) = admin_key_header(&headers, &state.config) {
        return resp;
    }
    if req.stock < 0 || req.price < 0.0 || req.end_time <= req.start_time {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "invalid campaign parameters"}))).into_response();
    }

    match state.store.init_campaign(&req.product_id, req.stock, req.price, req.start_time, req.end_time).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn admin_release(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<AdminReleaseRequest>) -> Response {
    if let Err(resp) = admin_key_header(&headers, &state.config) {
        return resp;
    }
    if req.product_id.trim().is_empty() || req.user_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": "product_id and user_id are required"}))).into_response();
    }

    match service::release(&state.store, &state.bus, &req.product_id, &req.user_id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "module": "seckill",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
