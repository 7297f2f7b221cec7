//! Per-request tracing span.
//!
//! Every request gets a fresh UUID v4 so log lines from the key guard and the
//! static file service can be tied back to one request. Requests the guard
//! answers with 404 are logged exactly like any other miss.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// Wrap the request in a `request` span and log its outcome.
///
/// Must be the outermost layer so the span covers the whole request.
pub async fn request_span_layer(request: Request, next: Next) -> Response {
    let span = tracing::info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
        status = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    );

    let start = Instant::now();
    async move {
        let response = next.run(request).await;
        let status = response.status().as_u16();
        let duration_ms = start.elapsed().as_millis() as u64;

        let span = tracing::Span::current();
        span.record("status", status);
        span.record("duration_ms", duration_ms);
        if response.status().is_server_error() {
            tracing::warn!(status, duration_ms, "Request failed");
        } else {
            tracing::info!(status, duration_ms, "Request completed");
        }

        response
    }
    .instrument(span)
    .await
}

