// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tenant configuration types.
//!
//! A [`TenantConfig`] describes one managed certificate: how to reach and
//! authenticate to Vault, which PKI role to issue from, where to write the
//! result, how often to check it and which hooks to run afterwards.
//!
//! The same types are used as the on-disk format (see [`crate::loader`]) and
//! as the immutable value handed to a [`crate::worker::Worker`].
//!
//! # Example
//!
//! ```yaml
//! vault:
//!   addr: https://vault.example.com:8200
//!   auth:
//!     method: approle
//!     role_id: 3c5a...
//!     secret_id: 9e1f...
//! pki:
//!   path: pki_int
//!   role: web
//!   common_name: www.example.com
//!   alt_names: [example.com]
//!   ttl: 720h
//! output:
//!   dir: /etc/ssl/www
//! daemon:
//!   check_interval: 30m
//!   renew_before: 48h
//! hooks:
//!   post_issue:
//!     - systemctl reload nginx
//!     - cmd: systemctl restart haproxy
//!       run_after: "02:00"
//!       run_before: "04:00"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use serde::Deserialize;
use url::Url;

use crate::auth::AuthStrategy;
use crate::error::ConfigError;

/// Poll interval used when `daemon.check_interval` is absent or unusable.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Renewal lead time used when `daemon.renew_before` is absent or unusable.
pub const DEFAULT_RENEW_BEFORE: Duration = Duration::from_secs(72 * 60 * 60);

/// Configuration for one managed certificate.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantConfig {
    /// Tenant name, taken from the configuration file stem.
    #[serde(skip)]
    pub name: String,

    /// Vault connection and authentication.
    pub vault: VaultConfig,

    /// PKI secrets engine parameters.
    pub pki: PkiConfig,

    /// Where issued material is written.
    pub output: OutputConfig,

    /// Polling and renewal timing.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Post-issue commands.
    #[serde(default)]
    pub hooks: HooksConfig,
}

impl TenantConfig {
    /// Validate the configuration, collecting every problem found.
    ///
    /// Authentication settings are checked with the same rules
    /// [`AuthStrategy::from_config`] applies at runtime, so an unknown
    /// method or missing credential is rejected before any worker starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.vault.addr.is_empty() {
            errors.push("vault.addr is required".to_string());
        } else if let Err(e) = Url::parse(&self.vault.addr) {
            errors.push(format!("vault.addr is not a valid URL: {e}"));
        }

        if let Err(e) = AuthStrategy::from_config(&self.vault.auth) {
            errors.push(format!("vault.auth: {e}"));
        }

        if self.pki.path.trim_matches('/').is_empty() {
            errors.push("pki.path is required".to_string());
        }
        if self.pki.role.is_empty() {
            errors.push("pki.role is required".to_string());
        }
        if self.pki.common_name.is_empty() {
            errors.push("pki.common_name is required".to_string());
        }
        if self.output.dir.as_os_str().is_empty() {
            errors.push("output.dir is required".to_string());
        }

        for (i, hook) in self.hooks.post_issue.iter().enumerate() {
            if hook.cmd.trim().is_empty() {
                errors.push(format!("hooks.post_issue[{i}].cmd must not be empty"));
            }
        }

        if let Some(ref raw) = self.daemon.check_interval {
            if parse_duration(raw).map_or(true, |d| d.is_zero()) {
                tracing::warn!(
                    tenant = %self.name,
                    "Invalid check_interval '{}', defaulting to {:?}",
                    raw,
                    DEFAULT_CHECK_INTERVAL
                );
            }
        }
        if let Some(ref raw) = self.daemon.renew_before {
            if parse_duration(raw).is_none() {
                tracing::warn!(
                    tenant = %self.name,
                    "Invalid renew_before '{}', defaulting to {:?}",
                    raw,
                    DEFAULT_RENEW_BEFORE
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(
                errors
                    .into_iter()
                    .map(|e| format!("[{}] {e}", self.name))
                    .collect(),
            ))
        }
    }
}

/// Vault server settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Server address, e.g. `https://vault.example.com:8200`.
    #[serde(default)]
    pub addr: String,

    /// CA bundle used to verify the server, for any auth method.
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Raw authentication settings as written in the configuration file.
///
/// Turned into a closed [`AuthStrategy`] by [`AuthStrategy::from_config`].
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// `token`, `approle` or `tls`.
    #[serde(default)]
    pub method: String,

    /// Static token for the `token` method.
    #[serde(default)]
    pub token: Option<String>,

    /// AppRole role ID.
    #[serde(default)]
    pub role_id: Option<String>,

    /// AppRole secret ID.
    #[serde(default)]
    pub secret_id: Option<String>,

    /// Client certificate material for the `tls` method.
    #[serde(default)]
    pub tls: TlsFiles,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("method", &self.method)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("role_id", &self.role_id)
            .field("secret_id", &self.secret_id.as_ref().map(|_| "[REDACTED]"))
            .field("tls", &self.tls)
            .finish()
    }
}

/// Paths to mutual-TLS material.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsFiles {
    /// Client certificate (PEM).
    #[serde(default)]
    pub cert: Option<PathBuf>,

    /// Client private key (PEM).
    #[serde(default)]
    pub key: Option<PathBuf>,

    /// CA bundle used to verify the server (PEM).
    #[serde(default)]
    pub ca: Option<PathBuf>,
}

/// PKI secrets engine parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PkiConfig {
    /// Mount path of the PKI engine, e.g. `pki_int`.
    #[serde(default)]
    pub path: String,

    /// Role to issue against.
    #[serde(default)]
    pub role: String,

    /// Certificate common name.
    #[serde(default)]
    pub common_name: String,

    /// Subject alternative names.
    #[serde(default)]
    pub alt_names: Vec<String>,

    /// Requested TTL, passed to Vault verbatim.
    #[serde(default)]
    pub ttl: Option<String>,
}

impl PkiConfig {
    /// Logical path of the issue endpoint: `<path>/issue/<role>`.
    pub fn issue_path(&self) -> String {
        format!("{}/issue/{}", self.path.trim_matches('/'), self.role)
    }
}

/// Output location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory receiving `cert.pem`, `key.pem`, `ca.pem`, `fullchain.pem`
    /// and `meta.json`.
    #[serde(default)]
    pub dir: PathBuf,
}

/// Polling and renewal timing, as duration strings (`30m`, `48h`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// How often the worker checks the certificate.
    #[serde(default)]
    pub check_interval: Option<String>,

    /// Remaining lifetime below which the certificate is reissued.
    #[serde(default)]
    pub renew_before: Option<String>,
}

impl DaemonConfig {
    /// Poll interval, falling back to one minute when absent, zero or
    /// unparsable.
    pub fn check_interval(&self) -> Duration {
        self.check_interval
            .as_deref()
            .and_then(parse_duration)
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_CHECK_INTERVAL)
    }

    /// Renewal lead time, falling back to 72 hours when absent or
    /// unparsable.
    pub fn renew_before(&self) -> Duration {
        self.renew_before
            .as_deref()
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_RENEW_BEFORE)
    }
}

/// Parse a duration such as `90s`, `30m`, `48h` or `1h30m`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    humantime::parse_duration(s.trim()).ok()
}

/// Post-issue hooks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HooksConfig {
    /// Commands run after every successful issuance.
    #[serde(default)]
    pub post_issue: Vec<HookSpec>,
}

/// A shell command with an optional daily time window.
///
/// Accepts either a plain string (run immediately) or a table with `cmd`,
/// `run_after` and `run_before`, the latter two in local `HH:MM`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "HookEntry")]
pub struct HookSpec {
    /// Command passed to `sh -c`.
    pub cmd: String,

    /// Earliest local time of day the hook may run.
    pub run_after: Option<NaiveTime>,

    /// Latest local time of day the hook may run.
    pub run_before: Option<NaiveTime>,
}

impl HookSpec {
    /// A hook without a window.
    pub fn immediate(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            run_after: None,
            run_before: None,
        }
    }

    /// A hook restricted to the window `[start, end]`.
    pub fn windowed(cmd: impl Into<String>, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            cmd: cmd.into(),
            run_after: Some(start),
            run_before: Some(end),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HookEntry {
    Command(String),
    Windowed(WindowedHook),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WindowedHook {
    cmd: String,
    #[serde(default)]
    run_after: Option<String>,
    #[serde(default)]
    run_before: Option<String>,
}

impl TryFrom<HookEntry> for HookSpec {
    type Error = String;

    fn try_from(entry: HookEntry) -> Result<Self, Self::Error> {
        match entry {
            HookEntry::Command(cmd) => Ok(Self::immediate(cmd)),
            HookEntry::Windowed(WindowedHook {
                cmd,
                run_after,
                run_before,
            }) => Ok(Self {
                cmd,
                run_after: run_after.as_deref().map(parse_time_of_day).transpose()?,
                run_before: run_before.as_deref().map(parse_time_of_day).transpose()?,
            }),
        }
    }
}

fn parse_time_of_day(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| format!("invalid hook time '{s}' (expected HH:MM): {e}"))
}
