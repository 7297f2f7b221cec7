//! Startup-time decision between loading an identity from disk and
//! generating one.

use std::fs;
use std::path::{Path, PathBuf};

use super::files::{is_regular_file, write_with_mode, PersistError, CERT_FILE_MODE, KEY_FILE_MODE};
use super::identity::{generate_self_signed, Identity};
use super::IdentityError;

/// Locations of a certificate and its private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl IdentityPaths {
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }

    /// Both files exist as regular files.
    pub fn exist(&self) -> bool {
        is_regular_file(&self.cert) && is_regular_file(&self.key)
    }
}

/// Where the active identity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// Read from existing certificate and key files
    Loaded,
    /// Generated at startup; `persisted` is true if both files were written
    Generated { persisted: bool },
}

impl IdentitySource {
    pub fn is_generated(&self) -> bool {
        matches!(self, IdentitySource::Generated { .. })
    }
}

/// Load the identity at `paths`, or generate one if either file is missing.
///
/// With `persist_to` set, a generated identity is also written there. Write
/// failures are logged and do not fail provisioning.
pub fn obtain_identity(
    paths: &IdentityPaths,
    persist_to: Option<&IdentityPaths>,
) -> Result<(Identity, IdentitySource), IdentityError> {
    if paths.exist() {
        let identity = load_identity(paths)?;
        tracing::info!(
            cert = %paths.cert.display(),
            key = %paths.key.display(),
            "Loaded TLS certificate and key"
        );
        return Ok((identity, IdentitySource::Loaded));
    }

    tracing::info!(
        cert = %paths.cert.display(),
        key = %paths.key.display(),
        "TLS certificate files not found, generating self-signed certificate in memory"
    );
    let identity = generate_self_signed()?;

    let persisted = match persist_to {
        Some(target) => match persist_identity(&identity, target) {
            Ok(()) => {
                tracing::info!(
                    cert = %target.cert.display(),
                    key = %target.key.display(),
                    "Saved generated certificate and key"
                );
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to save generated certificate; continuing with in-memory identity");
                false
            }
        },
        None => false,
    };

    Ok((identity, IdentitySource::Generated { persisted }))
}

/// Read and validate the certificate and key at `paths`.
pub fn load_identity(paths: &IdentityPaths) -> Result<Identity, IdentityError> {
    let cert_pem = read_file(&paths.cert)?;
    let key_pem = read_file(&paths.key)?;

    Identity::from_pem(cert_pem, key_pem).map_err(|source| IdentityError::InvalidPair {
        cert: paths.cert.clone(),
        key: paths.key.clone(),
        source,
    })
}

/// Write the certificate (mode 0644) and then the key (mode 0600).
pub fn persist_identity(identity: &Identity, paths: &IdentityPaths) -> Result<(), PersistError> {
    write_with_mode(&paths.cert, identity.cert_pem(), CERT_FILE_MODE)?;
    write_with_mode(&paths.key, identity.key_pem(), KEY_FILE_MODE)
}

fn read_file(path: &Path) -> Result<Vec<u8>, IdentityError> {
    fs::read(path).map_err(|source| IdentityError::Read {
        path: path.to_path_buf(),
        source,
    })
}
