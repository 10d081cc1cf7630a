// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP API
//!
//! Axum router for form submission, time-token issue and health checks.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/forms/submit/` | contact/quote submission (JSON or form-encoded) |
//! | `POST` | `/forms/{slug}/submit/` | dynamic form submission |
//! | `GET` | `/forms/time-token/` | fresh anti-spam time token |
//! | `GET` | `/health/` | liveness, version and uptime |
//!
//! The `Host` header selects the site. Every response carries an
//! `X-Request-ID`, taken from the request when present.

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::error;
use uuid::Uuid;

use crate::application::lead_service::LeadError;
use crate::application::submission::{
    FormSubmissionService, SubmissionAccepted, SubmissionError, SubmissionRequest,
};
use crate::domain::lead::FormData;
use crate::presentation::client_ip::TrustedProxies;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const REQUESTED_WITH_HEADER: &str = "x-requested-with";

pub struct AppState {
    pub submissions: Arc<FormSubmissionService>,
    pub trusted_proxies: TrustedProxies,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(submissions: Arc<FormSubmissionService>, trusted_proxies: TrustedProxies) -> Self {
        Self {
            submissions,
            trusted_proxies,
            start_time: Instant::now(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/forms/submit/", post(submit_handler))
        .route("/forms/{slug}/submit/", post(submit_dynamic_handler))
        .route("/forms/time-token/", get(time_token_handler))
        .route("/health/", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

// ============================================================================
// Extractors
// ============================================================================

/// Client address after trusted-proxy resolution.
pub struct ClientIp(pub IpAddr);

impl FromRequestParts<Arc<AppState>> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let forwarded = parts
            .headers
            .get(FORWARDED_FOR_HEADER)
            .and_then(|v| v.to_str().ok());
        Ok(ClientIp(state.trusted_proxies.client_ip(remote, forwarded)))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn request_id(headers: &HeaderMap) -> String {
    match header_str(headers, REQUEST_ID_HEADER).trim() {
        "" => Uuid::new_v4().to_string(),
        id => id.to_string(),
    }
}

/// Decode a JSON object or a form-encoded body. Repeated form keys become
/// arrays.
pub fn parse_submission_body(headers: &HeaderMap, body: &[u8]) -> Option<FormData> {
    let content_type = header_str(headers, header::CONTENT_TYPE);
    if content_type.contains("application/json") {
        return match serde_json::from_slice::<Value>(body).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        };
    }

    let mut data = Map::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        let value = Value::String(value.into_owned());
        match data.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                data.insert(key.into_owned(), value);
            }
        }
    }
    Some(data)
}

fn build_request(
    headers: &HeaderMap,
    body: &[u8],
    client_ip: IpAddr,
    request_id: &str,
) -> Result<SubmissionRequest, SubmissionError> {
    let data = parse_submission_body(headers, body).ok_or(SubmissionError::InvalidRequest)?;
    Ok(SubmissionRequest {
        host: header_str(headers, header::HOST).to_string(),
        client_ip: client_ip.to_string(),
        data,
        is_xhr: header_str(headers, REQUESTED_WITH_HEADER) == "XMLHttpRequest",
        request_id: Some(request_id.to_string()),
    })
}

// ============================================================================
// Responses
// ============================================================================

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn general_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"success": false, "errors": {"__all__": [message]}})),
    )
        .into_response()
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        match self {
            SubmissionError::InvalidRequest => {
                general_error(StatusCode::BAD_REQUEST, "Invalid request data")
            }
            SubmissionError::SiteNotFound => general_error(StatusCode::BAD_REQUEST, "Site not found"),
            SubmissionError::FormNotFound => general_error(StatusCode::NOT_FOUND, "Form not found"),
            SubmissionError::RateLimited => {
                general_error(StatusCode::TOO_MANY_REQUESTS, "Too many requests")
            }
            SubmissionError::Spam { reason, is_xhr } => general_error(
                StatusCode::BAD_REQUEST,
                SubmissionError::spam_message(&reason, is_xhr),
            ),
            SubmissionError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "errors": errors})),
            )
                .into_response(),
            SubmissionError::Lead(e @ LeadError::Validation { .. }) => {
                general_error(StatusCode::BAD_REQUEST, &e.to_string())
            }
            SubmissionError::Lead(e) => {
                error!(error = %e, "Lead creation failed");
                general_error(StatusCode::INTERNAL_SERVER_ERROR, "An error occurred")
            }
            SubmissionError::Repository(e) => {
                error!(error = %e, "Storage failure during submission");
                general_error(StatusCode::INTERNAL_SERVER_ERROR, "An error occurred")
            }
        }
    }
}

fn respond(result: Result<SubmissionAccepted, SubmissionError>, request_id: &str) -> Response {
    let response = match result {
        Ok(accepted) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": accepted.message,
                "lead_id": accepted.lead_id.to_string(),
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    };
    with_request_id(response, request_id)
}

// ============================================================================
// Handlers
// ============================================================================

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers);
    let result = match build_request(&headers, &body, client_ip, &request_id) {
        Ok(request) => state.submissions.submit(request).await,
        Err(e) => Err(e),
    };
    respond(result, &request_id)
}

async fn submit_dynamic_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers);
    let result = match build_request(&headers, &body, client_ip, &request_id) {
        Ok(request) => state.submissions.submit_dynamic(&slug, request).await,
        Err(e) => Err(e),
    };
    respond(result, &request_id)
}

async fn time_token_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let token = state.submissions.spam_guard().signer().issue();
    Json(json!({ "token": token }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}
