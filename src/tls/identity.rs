//! TLS identity: a certificate and private key in PEM form, plus the rustls
//! server configuration built from them.
//!
//! An [`Identity`] can only be constructed from PEM material that parses and
//! whose key matches the certificate, so holding one means the HTTPS listener
//! can use it as-is.

use std::fmt;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::TryRngCore;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_ECDSA_P256_SHA256,
};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use super::IdentityError;

/// Organization name on generated certificates
pub const SELF_SIGNED_ORGANIZATION: &str = "Moose Self-Signed";

/// DNS name on generated certificates
pub const SELF_SIGNED_DNS_NAME: &str = "localhost";

/// Validity of generated certificates, in days
pub const SELF_SIGNED_VALIDITY_DAYS: i64 = 365;

/// 128 bits of serial number entropy
const SERIAL_NUMBER_BYTES: usize = 16;

/// ALPN protocols offered by the HTTPS listener
const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Reasons PEM material cannot back a TLS listener.
#[derive(Debug, thiserror::Error)]
pub enum TlsMaterialError {
    #[error("Invalid PEM: {0}")]
    Pem(#[from] rustls_pki_types::pem::Error),

    #[error("No certificate found in PEM data")]
    NoCertificate,

    #[error("{0}")]
    Rustls(#[from] rustls::Error),
}

/// A certificate/key pair ready for use by the HTTPS listener.
#[derive(Clone)]
pub struct Identity {
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
    server_config: Arc<ServerConfig>,
}

impl Identity {
    /// Build an identity from PEM-encoded certificate chain and private key.
    ///
    /// Fails if either block is malformed, the key algorithm is unsupported, or
    /// the key does not belong to the leaf certificate.
    pub fn from_pem(cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Result<Self, TlsMaterialError> {
        let server_config = build_server_config(&cert_pem, &key_pem)?;
        Ok(Self {
            cert_pem,
            key_pem,
            server_config: Arc::new(server_config),
        })
    }

    pub fn cert_pem(&self) -> &[u8] {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &[u8] {
        &self.key_pem
    }

    /// The rustls configuration for the HTTPS listener.
    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.server_config)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("cert_pem_len", &self.cert_pem.len())
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<ServerConfig, TlsMaterialError> {
    let certs = CertificateDer::pem_slice_iter(cert_pem).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(TlsMaterialError::NoCertificate);
    }
    let key = PrivateKeyDer::from_pem_slice(key_pem)?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());

    // with_single_cert only checks the key matches on recent rustls releases
    let signing_key = provider.key_provider.load_private_key(key.clone_key())?;
    CertifiedKey::new(certs.clone(), signing_key).keys_match()?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    Ok(config)
}

/// Synthesize a self-signed identity for `localhost`.
///
/// The key is ECDSA P-256 and the serial number is drawn from the operating
/// system's random source, so no two calls share either.
pub fn generate_self_signed() -> Result<Identity, IdentityError> {
    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)?;

    let mut serial = [0u8; SERIAL_NUMBER_BYTES];
    OsRng
        .try_fill_bytes(&mut serial)
        .map_err(|e| IdentityError::Entropy(e.to_string()))?;

    let mut params = CertificateParams::new(vec![SELF_SIGNED_DNS_NAME.to_string()])?;

    let mut subject = DistinguishedName::new();
    subject.push(DnType::OrganizationName, SELF_SIGNED_ORGANIZATION);
    params.distinguished_name = subject;
    params.serial_number = Some(SerialNumber::from_slice(&serial));

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(SELF_SIGNED_VALIDITY_DAYS);

    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.is_ca = IsCa::ExplicitNoCa;

    let cert = params.self_signed(&key_pair)?;

    Identity::from_pem(
        cert.pem().into_bytes(),
        key_pair.serialize_pem().into_bytes(),
    )
    .map_err(IdentityError::Encoding)
}
