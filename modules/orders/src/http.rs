use crate::handlers::{create_order, get_order, OrderError};
use crate::models::{CreateOrderRequest, OrderView};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

pub fn router(pool: PgPool) -> Router {
    let state = Arc::new(AppState { pool });
    Router::new()
        .route("/orders", axum::routing::post(post_order))
        .route("/orders/{id}", axum::routing::get(get_order_handler))
        .route("/api/health", axum::routing::get(health))
        .with_state(state)
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        match self {
            OrderError::InvalidQuantity | OrderError::Empty => {
                (StatusCode::BAD_REQUEST, Json(serde_json::json!({"error": self.to_string()}))).into_response()
            }
            OrderError::Database(e) => {
                tracing::error!(error = %e, "database error handling order request");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": "internal error"}))).into_response()
            }
            OrderError::Other(e) => {
                tracing::error!(error = %e, "internal error handling order request");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": "internal error"}))).into_response()
            }
        }
    }
}

async fn post_order(State(state): State<Arc<AppState>>, Json(req): Json<CreateOrderRequest>) -> Response {
    match create_order(&state.pool, req).await {
        Ok(resp) => (StatusCode::CREATED, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_order_handler(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match get_order(&state.pool, &id).await {
        Ok(Some(row)) => (StatusCode::OK, Json(OrderView::from(row))).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(serde_json::json!({"error": "order not found"}))).into_response(),
        Err(e) => {
            tracing::error!(order_id = %id, error = %e, "failed to fetch order");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": "internal error"}))).into_response()
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "module": "orders",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
