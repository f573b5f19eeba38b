//! Authentication strategies.
//!
//! Vault supports many auth methods; the agent supports three, modelled as
//! the closed enum [`AuthStrategy`]. Each issuance attempt calls
//! [`authenticate`] afresh, so a rotated secret or expired token is picked
//! up on the next tick without restarting the process.

use std::path::PathBuf;

use crate::client::VaultClient;
use crate::config::{AuthConfig, VaultConfig};
use crate::error::AuthError;
use crate::tls::{load_ca_bundle, ClientIdentity};

/// How a worker obtains a Vault session.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthStrategy {
    /// A static token taken from configuration.
    Token(String),

    /// AppRole login exchanging role and secret IDs for a token.
    AppRole {
        /// Role ID.
        role_id: String,
        /// Secret ID.
        secret_id: String,
    },

    /// Client certificate on the transport; no explicit login call.
    MutualTls {
        /// Client certificate path.
        cert: PathBuf,
        /// Client key path.
        key: PathBuf,
        /// Optional CA bundle for verifying the server.
        ca: Option<PathBuf>,
    },
}

impl std::fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.debug_tuple("Token").field(&"[REDACTED]").finish(),
            Self::AppRole { role_id, .. } => f
                .debug_struct("AppRole")
                .field("role_id", role_id)
                .field("secret_id", &"[REDACTED]")
                .finish(),
            Self::MutualTls { cert, key, ca } => f
                .debug_struct("MutualTls")
                .field("cert", cert)
                .field("key", key)
                .field("ca", ca)
                .finish(),
        }
    }
}

impl AuthStrategy {
    /// Resolve the configured method and check its credentials are present.
    ///
    /// # Errors
    ///
    /// [`AuthError::UnknownMethod`] for anything other than `token`,
    /// `approle` or `tls`, and [`AuthError::MissingCredential`] naming the
    /// first absent field.
    pub fn from_config(auth: &AuthConfig) -> Result<Self, AuthError> {
        match auth.method.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(Self::Token(required(&auth.token, "vault.auth.token")?)),
            "approle" => Ok(Self::AppRole {
                role_id: required(&auth.role_id, "vault.auth.role_id")?,
                secret_id: required(&auth.secret_id, "vault.auth.secret_id")?,
            }),
            "tls" => Ok(Self::MutualTls {
                cert: auth
                    .tls
                    .cert
                    .clone()
                    .filter(|p| !p.as_os_str().is_empty())
                    .ok_or_else(|| AuthError::missing_credential("vault.auth.tls.cert"))?,
                key: auth
                    .tls
                    .key
                    .clone()
                    .filter(|p| !p.as_os_str().is_empty())
                    .ok_or_else(|| AuthError::missing_credential("vault.auth.tls.key"))?,
                ca: auth.tls.ca.clone().filter(|p| !p.as_os_str().is_empty()),
            }),
            _ => Err(AuthError::UnknownMethod(auth.method.clone())),
        }
    }

    /// Short method name for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::AppRole { .. } => "approle",
            Self::MutualTls { .. } => "tls",
        }
    }
}

fn required(value: &Option<String>, field: &str) -> Result<String, AuthError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuthError::missing_credential(field))
}

/// An authenticated connection to Vault, valid for one issuance attempt.
#[derive(Debug)]
pub struct Session {
    client: VaultClient,
    token: Option<String>,
}

impl Session {
    /// Wrap an already-configured client and token.
    pub fn new(client: VaultClient, token: Option<String>) -> Self {
        Self { client, token }
    }

    /// Transport to use for requests.
    pub fn client(&self) -> &VaultClient {
        &self.client
    }

    /// Token to present, if the method produced one.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Obtain a session for `vault`.
///
/// For `tls` the client identity is installed on the transport before any
/// request is made and the session carries no token.
pub async fn authenticate(vault: &VaultConfig) -> Result<Session, AuthError> {
    let strategy = AuthStrategy::from_config(&vault.auth)?;
    tracing::debug!("Authenticating to {} with method {}", vault.addr, strategy.method());

    match strategy {
        AuthStrategy::Token(token) => {
            let ca_pem = load_ca_bundle(vault.ca_cert.as_deref()).await?;
            let client = VaultClient::new(&vault.addr, ca_pem.as_deref(), None)?;
            Ok(Session::new(client, Some(token)))
        }
        AuthStrategy::AppRole { role_id, secret_id } => {
            let ca_pem = load_ca_bundle(vault.ca_cert.as_deref()).await?;
            let client = VaultClient::new(&vault.addr, ca_pem.as_deref(), None)?;
            let token = client.login_approle(&role_id, &secret_id).await?;
            Ok(Session::new(client, Some(token)))
        }
        AuthStrategy::MutualTls { cert, key, ca } => {
            let identity = ClientIdentity::from_files(&cert, &key).await?;
            let ca_pem = load_ca_bundle(ca.as_deref().or(vault.ca_cert.as_deref())).await?;
            let client = VaultClient::new(&vault.addr, ca_pem.as_deref(), Some(&identity))?;
            Ok(Session::new(client, None))
        }
    }
}
