//! Webhook server for the finance agent
//!
//! Exposes the inbound boundary over HTTP: the chat transport posts
//! normalized events to /webhook and the dispatcher runs the full cascade.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::dispatcher::Dispatcher;
use crate::models::InboundMessage;

/// =============================
/// Response Wrapper
/// =============================

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

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Webhook Endpoints
/// =============================

async fn webhook_status() -> Json<ApiResponse> {
    Json(ApiResponse::success(serde_json::json!({
        "message": "Webhook já está configurado e funcionando. Aguardando mensagens..."
    })))
}

async fn receive_message(
    State(state): State<ApiState>,
    Json(event): Json<InboundMessage>,
) -> (StatusCode, Json<ApiResponse>) {
    if event.sender_id.trim().is_empty() || event.text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error(
                "senderId and text are required".to_string(),
            )),
        );
    }

    info!(sender = %event.sender_id, "webhook event received");

    state.dispatcher.handle_inbound_message(event).await;

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "status": "processed"
        }))),
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(dispatcher: Arc<Dispatcher>) -> Router {
    let state = ApiState { dispatcher };

    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(webhook_status).post(receive_message))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    dispatcher: Arc<Dispatcher>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(dispatcher);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
