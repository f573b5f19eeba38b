//! Error types for the certificate agent.
//!
//! Errors are grouped by the stage that produces them: configuration
//! loading, authentication against Vault, certificate issuance, hook
//! execution and metadata access. [`AgentError`] wraps all of them for
//! callers that drive a whole issuance cycle.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;

/// Top-level error returned by workers, the supervisor and the CLI.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Authentication against Vault failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Certificate issuance failed.
    #[error(transparent)]
    Issue(#[from] IssueError),

    /// Process-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors talking to the Vault HTTP API.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure (connection, TLS handshake, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Vault answered with a non-success status.
    #[error("Vault returned {status}: {}", .errors.join("; "))]
    Status {
        /// HTTP status code.
        status: u16,
        /// Messages from the `errors` array of the response body.
        errors: Vec<String>,
    },

    /// The request URL could not be built.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The response body was not the expected JSON envelope.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Create a status error.
    pub fn status(status: u16, errors: Vec<String>) -> Self {
        Self::Status { status, errors }
    }

    /// Create a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// HTTP status code, if Vault answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Errors obtaining a Vault session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A credential required by the selected method is absent or empty.
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// Vault rejected the login exchange.
    #[error("Login rejected by Vault: {0}")]
    BackendRejected(#[source] BackendError),

    /// Vault accepted the login but returned no usable auth data.
    #[error("Malformed login response: {0}")]
    MalformedResponse(String),

    /// The configured method is not one of `token`, `approle` or `tls`.
    #[error("Unknown auth method: '{0}'")]
    UnknownMethod(String),

    /// The transport could not be set up (bad address, unreadable or
    /// invalid certificate, key or CA material).
    #[error("TLS error: {0}")]
    Tls(String),
}

impl AuthError {
    /// Create a missing credential error naming the config field.
    pub fn missing_credential(field: impl Into<String>) -> Self {
        Self::MissingCredential(field.into())
    }

    /// Create a malformed response error.
    pub fn malformed_response(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Create a TLS error.
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }
}

/// Errors issuing a certificate.
#[derive(Debug, Error)]
pub enum IssueError {
    /// The issue request failed at Vault.
    #[error("Issue request failed: {0}")]
    BackendFailure(#[from] BackendError),

    /// Vault answered but a required field was absent.
    #[error("Malformed issue response: {0}")]
    MalformedResponse(String),

    /// The output directory could not be created.
    #[error("Cannot create output directory {}: {source}", .path.display())]
    DiskFailure {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl IssueError {
    /// Create a malformed response error.
    pub fn malformed_response(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Create a disk failure error for `path`.
    pub fn disk_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DiskFailure {
            path: path.into(),
            source,
        }
    }
}

/// Configuration loading and validation errors.
///
/// These are only produced before any worker starts and are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file or directory could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file could not be decoded.
    #[error("Failed to decode {}: {message}", .path.display())]
    Parse {
        /// Path that failed.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// The file extension is not a supported format.
    #[error("Unsupported config format: {}", .path.display())]
    UnsupportedFormat {
        /// Offending path.
        path: PathBuf,
    },

    /// One or more fields failed validation.
    #[error("Configuration validation failed:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),

    /// Both a file and a directory were given.
    #[error("Only one of --config or --config-dir can be specified")]
    Conflict,

    /// Neither a file nor a directory was given.
    #[error("Either --config or --config-dir must be specified")]
    NoSource,

    /// The directory contained no configuration files.
    #[error("No valid configuration files loaded")]
    NoTenants,

    /// Two files resolve to the same tenant name.
    #[error("Duplicate tenant name '{0}'")]
    DuplicateTenant(String),
}

impl ConfigError {
    /// Create a parse error for `path`.
    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a read error for `path`.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}

/// Errors running a post-issue hook. Logged, never propagated.
#[derive(Debug, Error)]
pub enum HookError {
    /// The shell could not be started.
    #[error("Failed to spawn hook: {0}")]
    Spawn(#[from] std::io::Error),

    /// The command ran and exited unsuccessfully.
    #[error("Hook exited with {0}")]
    Failed(std::process::ExitStatus),
}

/// Errors reading persisted issuance metadata.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// No metadata file exists yet.
    #[error("Metadata file not found")]
    Missing,

    /// The file exists but could not be read.
    #[error("Failed to read metadata: {0}")]
    Io(#[from] std::io::Error),

    /// The file content is not a valid metadata record.
    #[error("Corrupt metadata: {0}")]
    Corrupt(#[from] serde_json::Error),
}
