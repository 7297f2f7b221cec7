//! moose: a static file server for HTTP and HTTPS.
//!
//! Serves a directory with `tower_http::services::ServeDir`. HTTPS uses an
//! operator-supplied certificate and key, or a self-signed identity generated
//! at startup. When the active private key sits inside the served directory,
//! requests for it are answered with 404.

pub mod cli;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod middleware;
pub mod tls;

pub use error::ServerError;
