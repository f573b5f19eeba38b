//! TLS helpers for the Vault HTTP client.
//!
//! Builds the reqwest client used for every Vault call, loading an optional
//! server CA bundle and, for the `tls` auth method, a client identity.

use std::path::Path;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::error::AuthError;

/// Request timeout applied to every Vault call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// PEM material loaded from disk for mutual TLS.
#[derive(Clone)]
pub struct ClientIdentity {
    /// PEM-encoded certificate chain.
    pub cert_pem: Vec<u8>,
    /// PEM-encoded private key.
    pub key_pem: Vec<u8>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("cert_pem", &format!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl ClientIdentity {
    /// Load and sanity-check a certificate and key from PEM files.
    pub async fn from_files(cert: &Path, key: &Path) -> Result<Self, AuthError> {
        let cert_pem = read_pem_file(cert).await?;
        let key_pem = read_pem_file(key).await?;

        parse_pem_certificates(&cert_pem)?;
        parse_pem_private_key(&key_pem)?;

        Ok(Self { cert_pem, key_pem })
    }
}

/// Read the CA bundle at `path`, if one is configured.
pub async fn load_ca_bundle(path: Option<&Path>) -> Result<Option<Vec<u8>>, AuthError> {
    match path {
        Some(path) => {
            let pem = read_pem_file(path).await?;
            tracing::debug!("Loaded CA bundle from {}", path.display());
            Ok(Some(pem))
        }
        None => Ok(None),
    }
}

/// Build a reqwest Client for talking to Vault.
///
/// `ca_pem` replaces the built-in roots when present; `identity` enables
/// client certificate authentication.
pub fn build_http_client(
    ca_pem: Option<&[u8]>,
    identity: Option<&ClientIdentity>,
) -> Result<reqwest::Client, AuthError> {
    let mut builder = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(crate::USER_AGENT)
        .use_rustls_tls()
        .min_tls_version(reqwest::tls::Version::TLS_1_2);

    if let Some(pem) = ca_pem {
        let certs = parse_pem_certificates(pem)?;
        tracing::debug!("Trusting {} CA certificate(s)", certs.len());

        builder = builder.tls_built_in_root_certs(false);
        for cert in certs {
            let cert = reqwest::Certificate::from_der(cert.as_ref())
                .map_err(|e| AuthError::tls(format!("Failed to parse CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
    }

    if let Some(identity) = identity {
        builder = builder.identity(build_reqwest_identity(identity)?);
    }

    builder
        .build()
        .map_err(|e| AuthError::tls(format!("Failed to build HTTP client: {e}")))
}

/// Combine cert and key into the single PEM buffer reqwest expects.
fn build_reqwest_identity(identity: &ClientIdentity) -> Result<reqwest::Identity, AuthError> {
    let mut pem_data = identity.cert_pem.clone();
    pem_data.extend_from_slice(b"\n");
    pem_data.extend_from_slice(&identity.key_pem);

    reqwest::Identity::from_pem(&pem_data)
        .map_err(|e| AuthError::tls(format!("Failed to create client identity: {e}")))
}

async fn read_pem_file(path: &Path) -> Result<Vec<u8>, AuthError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| AuthError::tls(format!("Failed to read {}: {e}", path.display())))
}

/// Parse PEM-encoded certificates.
pub fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>, AuthError> {
    let mut reader = std::io::BufReader::new(pem_data);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .filter_map(|result| result.ok())
        .collect();

    if certs.is_empty() {
        return Err(AuthError::tls("No certificates found in PEM data"));
    }

    Ok(certs)
}

/// Parse a PEM-encoded private key (PKCS#8, PKCS#1 or SEC1).
pub fn parse_pem_private_key(pem_data: &[u8]) -> Result<PrivateKeyDer<'static>, AuthError> {
    let mut reader = std::io::BufReader::new(pem_data);

    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(key)) => Ok(key),
        Ok(None) => Err(AuthError::tls("No private key found in PEM data")),
        Err(e) => Err(AuthError::tls(format!("Failed to parse PEM: {e}"))),
    }
}
