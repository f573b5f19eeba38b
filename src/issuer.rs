//! Certificate issuance.
//!
//! [`issue`] asks Vault's PKI engine for a new certificate and writes the
//! result into the tenant's output directory:
//!
//! | File            | Mode | Content                              |
//! |-----------------|------|--------------------------------------|
//! | `cert.pem`      | 0644 | leaf certificate                     |
//! | `key.pem`       | 0600 | private key                          |
//! | `ca.pem`        | 0644 | CA chain, or issuing CA, or empty    |
//! | `fullchain.pem` | 0644 | `cert + "\n" + ca`                   |
//! | `meta.json`     | 0644 | `{"expiration": <unix seconds>}`     |
//!
//! Individual write failures are logged and do not stop the remaining
//! writes, nor do they turn a successful issuance into an error.
//!
//! If Vault's `expiration` cannot be decoded the stored expiration falls
//! back to 24 hours after issuance. The fallback only ever shortens the
//! stored lifetime, so the worst case is an early reissue.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use crate::auth::Session;
use crate::config::TenantConfig;
use crate::error::IssueError;
use crate::metadata::{IssuanceMetadata, METADATA_FILE};

/// Fallback lifetime used when the expiration cannot be decoded.
pub const FALLBACK_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Mode of the output directory when it is created.
pub const OUTPUT_DIR_MODE: u32 = 0o755;

/// Files written after a successful issue call, in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Leaf certificate.
    Certificate,
    /// Private key.
    PrivateKey,
    /// CA material.
    CaChain,
    /// Certificate followed by CA material.
    FullChain,
    /// Issuance metadata.
    Metadata,
}

impl Artifact {
    /// All artifacts in write order.
    pub const ALL: [Artifact; 5] = [
        Artifact::Certificate,
        Artifact::PrivateKey,
        Artifact::CaChain,
        Artifact::FullChain,
        Artifact::Metadata,
    ];

    /// File name inside the output directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Certificate => "cert.pem",
            Self::PrivateKey => "key.pem",
            Self::CaChain => "ca.pem",
            Self::FullChain => "fullchain.pem",
            Self::Metadata => METADATA_FILE,
        }
    }

    /// Unix permission bits.
    pub fn mode(&self) -> u32 {
        match self {
            Self::PrivateKey => 0o600,
            _ => 0o644,
        }
    }
}

/// Material extracted from an issue response.
#[derive(Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// PEM leaf certificate.
    pub certificate: String,
    /// PEM private key.
    pub private_key: String,
    /// CA material written to `ca.pem`.
    pub ca_material: String,
    /// Expiration as Unix seconds.
    pub expiration: i64,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("certificate", &format!("{} bytes", self.certificate.len()))
            .field("private_key", &"[REDACTED]")
            .field("ca_material", &format!("{} bytes", self.ca_material.len()))
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl CertificateBundle {
    /// Extract the bundle from the `data` section of an issue response.
    ///
    /// `now` is only used for the expiration fallback.
    pub fn from_response(data: &Map<String, Value>, now: i64) -> Result<Self, IssueError> {
        let certificate = required_str(data, "certificate")?;
        let private_key = required_str(data, "private_key")?;

        let expiration = data.get("expiration").and_then(parse_expiration).unwrap_or_else(|| {
            tracing::warn!(
                "Could not decode expiration {:?}, assuming {}h",
                data.get("expiration"),
                FALLBACK_LIFETIME_SECS / 3600
            );
            now + FALLBACK_LIFETIME_SECS
        });

        Ok(Self {
            certificate,
            private_key,
            ca_material: ca_material(data),
            expiration,
        })
    }

    /// Certificate followed by the CA material.
    pub fn fullchain(&self) -> String {
        format!("{}\n{}", self.certificate, self.ca_material)
    }

    /// Bytes to write for `artifact`.
    pub fn contents(&self, artifact: Artifact) -> String {
        match artifact {
            Artifact::Certificate => self.certificate.clone(),
            Artifact::PrivateKey => self.private_key.clone(),
            Artifact::CaChain => self.ca_material.clone(),
            Artifact::FullChain => self.fullchain(),
            Artifact::Metadata => IssuanceMetadata {
                expiration: self.expiration,
            }
            .to_json(),
        }
    }
}

fn required_str(data: &Map<String, Value>, field: &str) -> Result<String, IssueError> {
    match data.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        _ => Err(IssueError::malformed_response(format!(
            "missing or non-string '{field}'"
        ))),
    }
}

/// CA material: every `ca_chain` entry followed by a newline, else
/// `issuing_ca` verbatim, else empty.
pub fn ca_material(data: &Map<String, Value>) -> String {
    if let Some(Value::Array(chain)) = data.get("ca_chain") {
        return chain
            .iter()
            .filter_map(Value::as_str)
            .map(|pem| format!("{pem}\n"))
            .collect();
    }

    match data.get("issuing_ca") {
        Some(Value::String(ca)) => ca.clone(),
        _ => String::new(),
    }
}

/// Decode an expiration given as an integer, a float or a decimal string.
pub fn parse_expiration(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn truncate(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
    if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// Result of a successful issue call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    /// Stored expiration (Unix seconds).
    pub expiration: i64,
    /// Artifacts that could not be written.
    pub failed_writes: Vec<Artifact>,
}

/// Request a certificate for `config` and write it to `config.output.dir`.
///
/// # Errors
///
/// - [`IssueError::BackendFailure`] when Vault rejects the request
/// - [`IssueError::MalformedResponse`] when certificate or key is missing
/// - [`IssueError::DiskFailure`] when the output directory cannot be created
pub async fn issue(session: &Session, config: &TenantConfig) -> Result<Issued, IssueError> {
    let path = config.pki.issue_path();
    tracing::info!(tenant = %config.name, "Requesting certificate for {} from {}", config.pki.common_name, path);

    let data = session
        .client()
        .write(session.token(), &path, request_body(config))
        .await?;

    let bundle = CertificateBundle::from_response(&data, chrono::Utc::now().timestamp())?;

    create_output_dir(&config.output.dir)
        .await
        .map_err(|e| IssueError::disk_failure(&config.output.dir, e))?;

    let failed_writes = write_artifacts(&config.name, &config.output.dir, &bundle).await;

    match chrono::DateTime::from_timestamp(bundle.expiration, 0) {
        Some(at) => tracing::info!(tenant = %config.name, "Certificate issued, expires at {}", at.to_rfc3339()),
        None => tracing::info!(tenant = %config.name, "Certificate issued, expires at {}", bundle.expiration),
    }

    Ok(Issued {
        expiration: bundle.expiration,
        failed_writes,
    })
}

/// JSON body for the issue endpoint.
pub fn request_body(config: &TenantConfig) -> Value {
    let mut body = Map::new();
    body.insert("common_name".to_string(), Value::String(config.pki.common_name.clone()));

    if !config.pki.alt_names.is_empty() {
        body.insert(
            "alt_names".to_string(),
            Value::String(config.pki.alt_names.join(",")),
        );
    }

    if let Some(ttl) = config.pki.ttl.as_deref().filter(|t| !t.is_empty()) {
        body.insert("ttl".to_string(), Value::String(ttl.to_string()));
    }

    Value::Object(body)
}

async fn create_output_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(OUTPUT_DIR_MODE);
    builder.create(dir).await
}

/// Write every artifact, logging and collecting failures.
pub async fn write_artifacts(tenant: &str, dir: &Path, bundle: &CertificateBundle) -> Vec<Artifact> {
    let mut failed = Vec::new();

    for artifact in Artifact::ALL {
        let path: PathBuf = dir.join(artifact.file_name());
        let contents = bundle.contents(artifact);
        if let Err(e) = write_file(&path, contents.as_bytes(), artifact.mode()).await {
            tracing::error!(tenant = %tenant, "Error writing file {}: {}", path.display(), e);
            failed.push(artifact);
        }
    }

    failed
}

async fn write_file(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let mut file = open_restricted(path, mode).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    Ok(())
}

/// Open `path` truncated, with `mode` applied before any byte is written.
///
/// `mode` on `OpenOptions` only affects newly created files, so an existing
/// file is tightened through the open handle.
async fn open_restricted(path: &Path, mode: u32) -> std::io::Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);

    let file = options.open(path).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(file)
}
