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

//! # vault-cert-agent
//!
//! An agent that keeps X.509 certificates issued by a HashiCorp Vault PKI
//! secrets engine fresh on disk.
//!
//! Each configured tenant names a Vault server, an authentication method, a
//! PKI mount and role, and an output directory. The agent writes the
//! certificate, private key, CA chain and full chain to that directory,
//! records the expiration in `meta.json`, and reissues once the remaining
//! lifetime drops under the tenant's lead time. Post-issue hooks (for
//! example `systemctl reload nginx`) run after every successful issuance,
//! optionally deferred to a daily time window.
//!
//! ## Features
//!
//! - **Token, AppRole and TLS client certificate** authentication
//! - **Many tenants per process**, each with its own worker
//! - **YAML, JSON or TOML** configuration, with `VAULT_*` environment overrides
//! - **Windowed hooks** bounded by a shared concurrency limit
//!
//! ## Quick Start
//!
//! ```no_run
//! use vault_cert_agent::{ConfigLoader, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tenants = ConfigLoader::new()
//!         .with_dir("/etc/vault-cert-agent/conf.d")
//!         .load()?;
//!
//!     // Issue once for every tenant, then keep them renewed.
//!     let supervisor = Supervisor::new(tenants);
//!     supervisor.issue_all().await?;
//!     supervisor.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Single Tenant
//!
//! ```no_run
//! use vault_cert_agent::{HookRunner, TenantConfig, Worker};
//!
//! # async fn example(config: TenantConfig) -> vault_cert_agent::Result<()> {
//! let worker = Worker::new(config, HookRunner::default());
//! let (issued, hooks) = worker.issue_once().await?;
//! println!("Certificate valid until {}", issued.expiration);
//! hooks.wait().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Output Files
//!
//! | File            | Contents                         | Mode   |
//! |-----------------|----------------------------------|--------|
//! | `cert.pem`      | Leaf certificate                 | `0644` |
//! | `key.pem`       | Private key                      | `0600` |
//! | `ca.pem`        | CA chain (or issuing CA)         | `0644` |
//! | `fullchain.pem` | Leaf followed by the CA material | `0644` |
//! | `meta.json`     | `{"expiration": <unix seconds>}` | `0644` |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod hooks;
pub mod issuer;
pub mod loader;
pub mod logging;
pub mod metadata;
pub mod renewal;
pub mod supervisor;
pub mod tls;
pub mod worker;

// Re-export main types at crate root for convenience
pub use auth::{authenticate, AuthStrategy, Session};
pub use client::VaultClient;
pub use config::{
    AuthConfig, DaemonConfig, HookSpec, HooksConfig, OutputConfig, PkiConfig, TenantConfig,
    TlsFiles, VaultConfig,
};
pub use error::{AgentError, AuthError, ConfigError, IssueError, Result};
pub use hooks::{HookBatch, HookRunner};
pub use issuer::{issue, Artifact, CertificateBundle, Issued};
pub use loader::ConfigLoader;
pub use metadata::IssuanceMetadata;
pub use renewal::RenewalDecision;
pub use supervisor::Supervisor;
pub use worker::{TickOutcome, Worker};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests.
pub const USER_AGENT: &str = concat!("vault-cert-agent/", env!("CARGO_PKG_VERSION"));
