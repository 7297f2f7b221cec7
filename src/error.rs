use std::io;
use std::path::PathBuf;

use crate::config::ConfigError;
use crate::tls::IdentityError;

/// Server startup and runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unable to resolve directory {path}: {source}")]
    ServedDir { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Failed to bind {listener} listener: {source}")]
    Bind {
        listener: &'static str,
        source: io::Error,
    },

    #[error("HTTPS listener requested but TLS is disabled")]
    TlsDisabled,

    #[error("{listener} server error: {source}")]
    Serve {
        listener: &'static str,
        source: io::Error,
    },

    #[error("Server task failed: {0}")]
    Task(String),
}
