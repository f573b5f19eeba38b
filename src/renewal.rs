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

//! Renewal decision.
//!
//! Whether a certificate must be reissued is decided solely from the
//! persisted [`IssuanceMetadata`]: the certificate files themselves are
//! never parsed. A missing or unreadable record always means "renew".
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use vault_cert_agent::renewal::needs_renewal;
//!
//! # async fn example() {
//! let lead = Duration::from_secs(72 * 60 * 60);
//! if needs_renewal(Path::new("/etc/ssl/www"), lead).await {
//!     println!("time to reissue");
//! }
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use crate::error::MetadataError;
use crate::metadata::IssuanceMetadata;

/// Outcome of comparing the stored expiration with the lead time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalDecision {
    /// No metadata record exists.
    Missing,

    /// A record exists but could not be read or decoded.
    Corrupt,

    /// Remaining lifetime is below the lead time, or already negative.
    Due {
        /// Stored expiration (Unix seconds).
        expiration: i64,
        /// Seconds until expiration; negative once expired.
        remaining: i64,
    },

    /// Remaining lifetime is at least the lead time.
    Valid {
        /// Stored expiration (Unix seconds).
        expiration: i64,
        /// Seconds until expiration.
        remaining: i64,
    },
}

impl RenewalDecision {
    /// Decide from a metadata read result, a lead time and the current time.
    pub fn evaluate(
        metadata: Result<IssuanceMetadata, MetadataError>,
        lead: Duration,
        now: i64,
    ) -> Self {
        let metadata = match metadata {
            Ok(metadata) => metadata,
            Err(MetadataError::Missing) => return Self::Missing,
            Err(_) => return Self::Corrupt,
        };

        let expiration = metadata.expiration;
        let remaining = expiration.saturating_sub(now);
        let lead = i64::try_from(lead.as_secs()).unwrap_or(i64::MAX);

        if remaining < lead {
            Self::Due {
                expiration,
                remaining,
            }
        } else {
            Self::Valid {
                expiration,
                remaining,
            }
        }
    }

    /// Whether the certificate should be reissued.
    pub fn needs_renewal(&self) -> bool {
        !matches!(self, Self::Valid { .. })
    }
}

impl std::fmt::Display for RenewalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => write!(f, "no metadata, certificate needs renewal"),
            Self::Corrupt => write!(f, "metadata unreadable, certificate needs renewal"),
            Self::Due { remaining, .. } if *remaining < 0 => {
                write!(f, "certificate expired {}s ago, needs renewal", -remaining)
            }
            Self::Due { remaining, .. } => {
                write!(f, "certificate expires in {}s, needs renewal", remaining)
            }
            Self::Valid { remaining, .. } => write!(f, "certificate valid for {}s", remaining),
        }
    }
}

/// Read the metadata in `output_dir` and decide against the current time.
pub async fn check(output_dir: &Path, lead: Duration) -> RenewalDecision {
    let metadata = IssuanceMetadata::load(output_dir).await;
    RenewalDecision::evaluate(metadata, lead, chrono::Utc::now().timestamp())
}

/// Whether the certificate in `output_dir` should be reissued now.
pub async fn needs_renewal(output_dir: &Path, lead: Duration) -> bool {
    check(output_dir, lead).await.needs_renewal()
}
