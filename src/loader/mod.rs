// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Configuration discovery and loading.
//!
//! The agent is pointed at either a single file (`--config`) or a
//! directory (`--config-dir`) in which every `.yaml`, `.yml`, `.json` and
//! `.toml` file is one tenant. The tenant name is the file stem.
//!
//! # Environment overrides
//!
//! Vault connection and authentication settings may be supplied or
//! overridden through the environment, which wins over every file:
//!
//! | Variable               | Field                   |
//! |------------------------|-------------------------|
//! | `VAULT_ADDR`           | `vault.addr`            |
//! | `VAULT_CACERT`         | `vault.ca_cert`         |
//! | `VAULT_AUTH_METHOD`    | `vault.auth.method`     |
//! | `VAULT_AUTH_TOKEN`     | `vault.auth.token`      |
//! | `VAULT_AUTH_ROLE_ID`   | `vault.auth.role_id`    |
//! | `VAULT_AUTH_SECRET_ID` | `vault.auth.secret_id`  |
//! | `VAULT_AUTH_TLS_CERT`  | `vault.auth.tls.cert`   |
//! | `VAULT_AUTH_TLS_KEY`   | `vault.auth.tls.key`    |
//! | `VAULT_AUTH_TLS_CA`    | `vault.auth.tls.ca`     |
//!
//! PKI, output, daemon and hook settings come from files only.
//!
//! # Example
//!
//! ```no_run
//! use vault_cert_agent::loader::ConfigLoader;
//!
//! let tenants = ConfigLoader::new()
//!     .with_dir("/etc/vault-cert-agent/conf.d")
//!     .load()
//!     .unwrap();
//! println!("Loaded {} configuration(s)", tenants.len());
//! ```

mod expand;

pub use expand::expand_variables;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::TenantConfig;
use crate::error::ConfigError;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.yaml` / `.yml`
    Yaml,
    /// `.json`
    Json,
    /// `.toml`
    Toml,
}

impl ConfigFormat {
    /// Detect the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    fn decode(&self, content: &str) -> Result<TenantConfig, String> {
        match self {
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
            Self::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// Where environment overrides are read from.
#[derive(Debug, Clone, Default)]
pub enum EnvSource {
    /// The process environment.
    #[default]
    Process,
    /// A fixed set of variables, for tests and embedding.
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    /// Build a fixed source from key/value pairs.
    pub fn fixed<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Fixed(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Non-empty value of `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match self {
            Self::Process => std::env::var(key).ok(),
            Self::Fixed(map) => map.get(key).cloned(),
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Loads tenant configurations from a file or a directory.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Single configuration file.
    file: Option<PathBuf>,

    /// Directory of configuration files.
    dir: Option<PathBuf>,

    /// Source of `VAULT_*` overrides and `${VAR}` values.
    env: EnvSource,

    /// Whether to expand `${VAR}` references.
    expand_variables: bool,

    /// Whether to validate after loading.
    validate: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader reading the process environment, with expansion and
    /// validation enabled.
    pub fn new() -> Self {
        Self {
            file: None,
            dir: None,
            env: EnvSource::Process,
            expand_variables: true,
            validate: true,
        }
    }

    /// Load a single configuration file.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load every configuration file in a directory.
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment source.
    pub fn with_env(mut self, env: EnvSource) -> Self {
        self.env = env;
        self
    }

    /// Enable or disable variable expansion.
    ///
    /// Default: `true`
    pub fn with_expand_variables(mut self, expand: bool) -> Self {
        self.expand_variables = expand;
        self
    }

    /// Enable or disable validation after loading.
    ///
    /// Default: `true`
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Load all tenant configurations.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - both or neither of a file and a directory were given
    /// - a file cannot be read or decoded
    /// - the directory holds no configuration files
    /// - two files share a stem
    /// - validation fails (if enabled); problems from every file are
    ///   reported together
    pub fn load(&self) -> Result<Vec<TenantConfig>, ConfigError> {
        let paths = match (&self.file, &self.dir) {
            (Some(_), Some(_)) => return Err(ConfigError::Conflict),
            (None, None) => return Err(ConfigError::NoSource),
            (Some(file), None) => vec![file.clone()],
            (None, Some(dir)) => Self::discover(dir)?,
        };

        if paths.is_empty() {
            return Err(ConfigError::NoTenants);
        }

        let mut seen = HashSet::new();
        let mut configs = Vec::with_capacity(paths.len());
        for path in &paths {
            let config = self.read(path)?;
            if !seen.insert(config.name.clone()) {
                return Err(ConfigError::DuplicateTenant(config.name));
            }
            configs.push(config);
        }

        if self.validate {
            let problems: Vec<String> = configs
                .iter()
                .filter_map(|c| match c.validate() {
                    Err(ConfigError::Invalid(problems)) => Some(problems),
                    _ => None,
                })
                .flatten()
                .collect();
            if !problems.is_empty() {
                return Err(ConfigError::Invalid(problems));
            }
        }

        tracing::info!("Loaded {} configuration(s)", configs.len());
        Ok(configs)
    }

    /// Decode one tenant from a string, applying overrides and expansion.
    ///
    /// Useful for testing or when config is provided programmatically.
    /// Validation is not applied here.
    pub fn load_from_str(
        &self,
        name: &str,
        content: &str,
        format: ConfigFormat,
    ) -> Result<TenantConfig, ConfigError> {
        let mut config = format
            .decode(content)
            .map_err(|e| ConfigError::parse(name, e))?;
        config.name = name.to_string();
        self.apply_env(&mut config);
        if self.expand_variables {
            self.expand(&mut config);
        }
        Ok(config)
    }

    fn read(&self, path: &Path) -> Result<TenantConfig, ConfigError> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let config = self
            .load_from_str(&name, &content, format)
            .map_err(|e| match e {
                ConfigError::Parse { message, .. } => ConfigError::parse(path, message),
                other => other,
            })?;

        tracing::debug!("Loaded config: {}", path.display());
        Ok(config)
    }

    /// Supported files directly inside `dir`, sorted by name.
    fn discover(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
        let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::read(dir, e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConfigError::read(dir, e))?;
            let path = entry.path();
            if path.is_dir() || ConfigFormat::from_path(&path).is_none() {
                continue;
            }
            paths.push(path);
        }

        paths.sort();
        Ok(paths)
    }

    fn apply_env(&self, config: &mut TenantConfig) {
        let env = &self.env;
        let auth = &mut config.vault.auth;

        if let Some(v) = env.get("VAULT_ADDR") {
            config.vault.addr = v;
        }
        if let Some(v) = env.get("VAULT_CACERT") {
            config.vault.ca_cert = Some(PathBuf::from(v));
        }
        if let Some(v) = env.get("VAULT_AUTH_METHOD") {
            auth.method = v;
        }
        if let Some(v) = env.get("VAULT_AUTH_TOKEN") {
            auth.token = Some(v);
        }
        if let Some(v) = env.get("VAULT_AUTH_ROLE_ID") {
            auth.role_id = Some(v);
        }
        if let Some(v) = env.get("VAULT_AUTH_SECRET_ID") {
            auth.secret_id = Some(v);
        }
        if let Some(v) = env.get("VAULT_AUTH_TLS_CERT") {
            auth.tls.cert = Some(PathBuf::from(v));
        }
        if let Some(v) = env.get("VAULT_AUTH_TLS_KEY") {
            auth.tls.key = Some(PathBuf::from(v));
        }
        if let Some(v) = env.get("VAULT_AUTH_TLS_CA") {
            auth.tls.ca = Some(PathBuf::from(v));
        }
    }

    fn expand(&self, config: &mut TenantConfig) {
        let lookup = |name: &str| self.env.get(name);

        config.pki.common_name = expand_variables(&config.pki.common_name, lookup);
        for alt in &mut config.pki.alt_names {
            *alt = expand_variables(alt, lookup);
        }
        if let Some(dir) = config.output.dir.to_str() {
            config.output.dir = PathBuf::from(expand_variables(dir, lookup));
        }
    }
}
