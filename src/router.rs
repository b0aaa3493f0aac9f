//! Axum router for the IP verification endpoint.
//! Routes: `POST /verify-ip` (decision), `OPTIONS /verify-ip` (CORS preflight),
//! `GET /health` (liveness). Every response carries the CORS headers.

use axum::{
    Json, Router,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tracing::error;

use crate::config::ResponseMode;
use crate::engine::{AccessDecision, AccessGate, MatchedRecord};

pub const VERIFY_PATH: &str = "/verify-ip";
pub const VERIFICATION_ERROR: &str = "VERIFICATION_ERROR";
const VERIFICATION_ERROR_MESSAGE: &str =
    "Erro ao verificar o endereço IP. Tente novamente mais tarde.";

/// Shared state threaded through all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AccessGate>,
    pub response_mode: ResponseMode,
}

/// JSON body of `POST /verify-ip`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub allowed: bool,
    pub reason: String,
    #[serde(rename = "clientIP")]
    pub client_ip: Option<String>,
    pub ip_type: Option<String>,
    #[serde(rename = "allDetectedIPs")]
    pub all_detected_ips: Vec<String>,
    #[serde(rename = "matchedIP")]
    pub matched_ip: Option<String>,
    pub message: String,
}

impl From<&AccessDecision> for VerifyResponse {
    fn from(decision: &AccessDecision) -> Self {
        Self {
            allowed: decision.allowed,
            reason: decision.reason.as_str().to_string(),
            client_ip: decision.primary.as_ref().map(|c| c.address.clone()),
            ip_type: decision
                .primary
                .as_ref()
                .and_then(|c| c.class.label())
                .map(str::to_string),
            all_detected_ips: decision
                .candidates
                .iter()
                .map(|c| c.address.clone())
                .collect(),
            matched_ip: decision
                .matched
                .as_ref()
                .map(MatchedRecord::address)
                .map(str::to_string),
            message: decision.reason.message().to_string(),
        }
    }
}

impl VerifyResponse {
    /// Body for an evaluation that could not complete. Never `allowed`.
    #[must_use]
    pub fn verification_error() -> Self {
        Self {
            allowed: false,
            reason: VERIFICATION_ERROR.to_string(),
            client_ip: None,
            ip_type: None,
            all_detected_ips: Vec::new(),
            matched_ip: None,
            message: VERIFICATION_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Builds the axum `Router` with all routes and the CORS layer.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(VERIFY_PATH, post(handle_verify).options(handle_preflight))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(middleware::map_response(apply_cors))
        .with_state(state)
}

async fn apply_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    response
}

async fn handle_preflight() -> StatusCode {
    StatusCode::OK
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "ip-gate"}))
}

async fn handle_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"})))
}

async fn handle_verify(State(state): State<AppState>, request: Request) -> Response {
    let fallback = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let headers = request.headers().clone();

    match Arc::clone(&state.gate).check(headers, fallback).await {
        Ok(decision) => {
            let status = match (decision.allowed, state.response_mode) {
                (false, ResponseMode::HttpStatus) => StatusCode::FORBIDDEN,
                _ => StatusCode::OK,
            };
            (status, Json(VerifyResponse::from(&decision))).into_response()
        }
        Err(e) => {
            error!(error = %e, "IP verification failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(VerifyResponse::verification_error()),
            )
                .into_response()
        }
    }
}
