//! Persisted issuance metadata.
//!
//! `meta.json` in a tenant's output directory records the expiration of the
//! certificate currently on disk as `{"expiration": <unix seconds>}`. Only
//! the issuer writes it; the renewal check reads it on every tick.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MetadataError;

/// File name of the metadata record inside the output directory.
pub const METADATA_FILE: &str = "meta.json";

/// Last known expiration of the issued certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceMetadata {
    /// Expiration as seconds since the Unix epoch.
    pub expiration: i64,
}

impl IssuanceMetadata {
    /// Path of the metadata file for `output_dir`.
    pub fn path(output_dir: &Path) -> PathBuf {
        output_dir.join(METADATA_FILE)
    }

    /// Read the record from `output_dir`.
    pub async fn load(output_dir: &Path) -> Result<Self, MetadataError> {
        let bytes = match tokio::fs::read(Self::path(output_dir)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(MetadataError::Missing),
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&bytes)
    }

    /// Decode a record.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MetadataError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode the record.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "expiration": self.expiration }).to_string()
    }

    /// Expiration as a UTC timestamp, if representable.
    pub fn expires_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp(self.expiration, 0)
    }
}
