//! HTTP server for webhook event delivery.
//!
//! `POST /webhook/event` accepts platform event callbacks and hands message
//! events to the relay through the inbound channel; `GET /health` reports
//! liveness.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bus::InboundMessage;
use crate::channels::lark::{EventRejection, LarkEvent, parse_event};
use crate::errors::RelayError;

/// Max webhook payload size: 1 MB.
const WEBHOOK_MAX_BODY: usize = 1_048_576;

#[derive(Clone)]
pub struct GatewayState {
    inbound_tx: mpsc::Sender<InboundMessage>,
    verification_token: Option<Arc<str>>,
}

impl GatewayState {
    pub fn new(inbound_tx: mpsc::Sender<InboundMessage>, verification_token: Option<String>) -> Self {
        Self {
            inbound_tx,
            verification_token: verification_token
                .filter(|t| !t.is_empty())
                .map(Arc::from),
        }
    }
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/webhook/event", post(event_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(WEBHOOK_MAX_BODY))
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"error": message})))
}

/// POST /webhook/event: answer verification challenges, forward messages.
async fn event_handler(State(state): State<GatewayState>, body: Bytes) -> impl IntoResponse {
    let Ok(value) = serde_json::from_slice::<Value>(&body) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid JSON");
    };

    match parse_event(&value, state.verification_token.as_deref()) {
        Ok(LarkEvent::UrlVerification { challenge }) => {
            info!("answered webhook URL verification");
            (StatusCode::OK, Json(json!({"challenge": challenge})))
        }
        Ok(LarkEvent::Message(msg)) => {
            debug!("webhook event {} for chat {}", msg.event_id, msg.chat_id);
            if state.inbound_tx.send(*msg).await.is_err() {
                error!("inbound channel closed, dropping webhook event");
                return error_response(StatusCode::SERVICE_UNAVAILABLE, "shutting down");
            }
            (StatusCode::OK, Json(json!({})))
        }
        Ok(LarkEvent::Other { event_type }) => {
            debug!("ignoring webhook event {}", event_type);
            (StatusCode::OK, Json(json!({})))
        }
        Err(e) => {
            warn!("rejected webhook event: {}", e);
            let status = match e {
                EventRejection::TokenMismatch => StatusCode::UNAUTHORIZED,
                EventRejection::Encrypted | EventRejection::Malformed(_) => {
                    StatusCode::BAD_REQUEST
                }
            };
            error_response(status, &e.to_string())
        }
    }
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": crate::VERSION,
    }))
}

/// Bind and serve in the background.
pub async fn start(
    host: &str,
    port: u16,
    state: GatewayState,
) -> Result<tokio::task::JoinHandle<()>> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| RelayError::Config(format!("cannot listen on {}: {}", addr, e)))?;
    info!("webhook server listening on {}", addr);
    info!("webhook endpoint: http://{}/webhook/event", addr);

    let app = build_router(state);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("webhook server error: {}", e);
        }
    });
    Ok(handle)
}
