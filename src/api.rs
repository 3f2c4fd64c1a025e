//! REST API server for the orchestration engine
//!
//! Exposes the router and planner over HTTP for frontend integration.

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router as AxumRouter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::planner::Planner;
use crate::router::Router;

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub request: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct ApiState {
    pub router: Arc<Router>,
    pub planner: Arc<Planner>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Route a request through the full gate chain. `handled: false` tells the
/// frontend to fall back to its own open-chat handling.
async fn route_request(
    State(state): State<ApiState>,
    Json(req): Json<RouteRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received routing request: {}", req.request);

    match state.router.route(&req.request).await {
        Ok(Some(reply)) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "handled": true,
                "reply": reply,
            }))),
        ),
        Ok(None) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "handled": false,
                "reply": serde_json::Value::Null,
            }))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Routing failed: {}", e))),
        ),
    }
}

/// Bypass the gates and run the planner pipeline directly.
async fn plan_request(
    State(state): State<ApiState>,
    Json(req): Json<RouteRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received planning request: {}", req.request);

    match state.planner.plan_and_execute(&req.request).await {
        Ok(transcript) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "transcript": transcript,
            }))),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(format!("Planning failed: {}", e))),
        ),
    }
}

pub fn create_router(state: ApiState) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health))
        .route("/api/route", post(route_request))
        .route("/api/plan", post(plan_request))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
