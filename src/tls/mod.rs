//! TLS identity provisioning.
//!
//! At startup the server either loads an operator-supplied certificate and key
//! or generates a self-signed pair for `localhost`, optionally saving it so the
//! next start loads the same identity. The identity is never replaced while the
//! server runs.

mod files;
mod identity;
mod provision;

use std::path::PathBuf;

pub use files::{is_regular_file, PersistError, CERT_FILE_MODE, KEY_FILE_MODE};
pub use identity::{
    generate_self_signed, Identity, TlsMaterialError, SELF_SIGNED_DNS_NAME,
    SELF_SIGNED_ORGANIZATION, SELF_SIGNED_VALIDITY_DAYS,
};
pub use provision::{
    load_identity, obtain_identity, persist_identity, IdentityPaths, IdentitySource,
};

/// Provisioning failures. All of them stop startup.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to load TLS certificate {cert} with key {key}: {source}")]
    InvalidPair {
        cert: PathBuf,
        key: PathBuf,
        source: TlsMaterialError,
    },

    #[error("Random number source failed: {0}")]
    Entropy(String),

    #[error("Certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),

    #[error("Generated certificate is unusable: {0}")]
    Encoding(#[source] TlsMaterialError),
}

impl IdentityError {
    /// The configured files exist but cannot be used.
    pub fn is_load_error(&self) -> bool {
        matches!(self, IdentityError::Read { .. } | IdentityError::InvalidPair { .. })
    }
}
