//! Vault HTTP client.
//!
//! This module provides [`VaultClient`], the thin transport over Vault's
//! HTTP API used for AppRole login and for PKI issue requests. It knows
//! nothing about tenants or files; callers hand it logical paths and JSON
//! bodies and get back the `data` or `auth` section of the response.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::error::{AuthError, BackendError};
use crate::tls::{build_http_client, ClientIdentity};

/// Header carrying the Vault token.
pub const TOKEN_HEADER: &str = "X-Vault-Token";

/// Vault HTTP client for a single server address.
///
/// # Example
///
/// ```no_run
/// use vault_cert_agent::client::VaultClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = VaultClient::new("https://vault.example.com:8200", None, None)?;
/// let token = client.login_approle("role-id", "secret-id").await?;
/// let data = client
///     .write(Some(&token), "pki_int/issue/web", serde_json::json!({"common_name": "www.example.com"}))
///     .await?;
/// println!("{:?}", data.get("serial_number"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct VaultClient {
    base_url: Url,
    http: reqwest::Client,
}

/// Envelope shared by Vault logical responses.
#[derive(Debug, Default, Deserialize)]
struct SecretResponse {
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    auth: Option<SecretAuth>,
}

#[derive(Debug, Deserialize)]
struct SecretAuth {
    #[serde(default)]
    client_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

impl VaultClient {
    /// Create a client for `addr`.
    ///
    /// `ca_pem` (PEM certificates) overrides the built-in trust roots;
    /// `identity` presents a client certificate on every connection.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Tls`] if the address is not a URL or the TLS
    /// material cannot be parsed.
    pub fn new(
        addr: &str,
        ca_pem: Option<&[u8]>,
        identity: Option<&ClientIdentity>,
    ) -> Result<Self, AuthError> {
        let mut base_url = Url::parse(addr)
            .map_err(|e| AuthError::tls(format!("Invalid Vault address '{addr}': {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = build_http_client(ca_pem, identity)?;
        Ok(Self { base_url, http })
    }

    /// Server address this client talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the URL of a logical path, e.g. `auth/approle/login`.
    pub fn build_url(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self
            .base_url
            .join("v1/")?
            .join(path.trim_start_matches('/'))?)
    }

    /// Log in with AppRole credentials and return the client token.
    ///
    /// # Errors
    ///
    /// [`AuthError::BackendRejected`] if Vault refuses the request and
    /// [`AuthError::MalformedResponse`] if it answers without auth data.
    pub async fn login_approle(&self, role_id: &str, secret_id: &str) -> Result<String, AuthError> {
        let body = serde_json::json!({
            "role_id": role_id,
            "secret_id": secret_id,
        });

        let response = self
            .post(None, "auth/approle/login", &body)
            .await
            .map_err(AuthError::BackendRejected)?;

        match response.auth {
            Some(auth) if !auth.client_token.is_empty() => Ok(auth.client_token),
            Some(_) => Err(AuthError::malformed_response("approle login returned an empty client_token")),
            None => Err(AuthError::malformed_response("approle login returned no auth data")),
        }
    }

    /// Write to a logical path and return the response `data` object.
    ///
    /// A response without `data` yields an empty map.
    pub async fn write(
        &self,
        token: Option<&str>,
        path: &str,
        body: Value,
    ) -> Result<Map<String, Value>, BackendError> {
        let response = self.post(token, path, &body).await?;
        Ok(response.data.unwrap_or_default())
    }

    async fn post(
        &self,
        token: Option<&str>,
        path: &str,
        body: &Value,
    ) -> Result<SecretResponse, BackendError> {
        let url = self.build_url(path)?;
        tracing::debug!("POST {}", url);

        let mut request = self.http.post(url).json(body);
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }

        let response = self.handle_error_response(request.send().await?).await?;

        // Vault answers some writes with 204 and no body.
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(SecretResponse::default());
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(SecretResponse::default());
        }
        serde_json::from_slice(&bytes).map_err(|e| BackendError::decode(e.to_string()))
    }

    /// Map non-success statuses to [`BackendError::Status`].
    async fn handle_error_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let errors = match serde_json::from_str::<ErrorResponse>(&text) {
            Ok(parsed) if !parsed.errors.is_empty() => parsed.errors,
            _ if text.trim().is_empty() => vec![status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()],
            _ => vec![text.trim().to_string()],
        };

        Err(BackendError::status(status.as_u16(), errors))
    }
}
