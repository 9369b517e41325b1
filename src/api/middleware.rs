//! API Middleware
//!
//! Request logging with sensitive headers masked.

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", IDEMPOTENCY_KEY_HEADER];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// Request logging middleware.
///
/// Completion is logged at `error` for 5xx, `warn` for 4xx and `info`
/// otherwise, so ledger rejections stand out without enabling debug logs.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let idempotent = request.headers().contains_key(IDEMPOTENCY_KEY_HEADER);
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    tracing::debug!(
        method = %method,
        uri = %uri,
        version = ?request.version(),
        request_id = ?request_id,
        headers = ?mask_headers_for_logging(request.headers()),
        "Incoming request"
    );

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(%method, %uri, %status, duration_ms, ?request_id, idempotent, "Request failed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %uri, %status, duration_ms, ?request_id, idempotent, "Request rejected");
    } else {
        tracing::info!(%method, %uri, %status, duration_ms, ?request_id, idempotent, "Request completed");
    }

    response
}
