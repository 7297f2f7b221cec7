//! Static file service and router assembly.

use std::path::Path;
use std::sync::Arc;

use axum::{middleware, Router};
use http::StatusCode;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

use crate::config::REQUEST_TIMEOUT;
use crate::guard::{key_guard_layer, KeyGuard};
use crate::middleware::request_span_layer;

/// Serve files under `root`, with `index.html` for directory requests.
pub fn create_static_service(root: &Path) -> ServeDir {
    ServeDir::new(root).append_index_html_on_directories(true)
}

/// Build the router shared by the HTTP and HTTPS listeners.
///
/// The key guard wraps the file service, so every request passes it before
/// the filesystem is touched.
pub fn create_router(root: &Path, guard: Arc<KeyGuard>) -> Router {
    Router::new()
        .fallback_service(create_static_service(root))
        .layer(middleware::from_fn_with_state(guard, key_guard_layer))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        // Outermost, so guard rejections are logged under the same span
        .layer(middleware::from_fn(request_span_layer))
}
