//! WORM store configuration.
//!
//! A `WormConfig` can be built from defaults, from the `WORM_*` process
//! environment, or from a TOML document. `validate()` is called by the store
//! at open time so a misconfigured encryption setup fails before the first
//! write rather than on it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{WormError, WormResult};

/// Seven years, the common regulatory horizon for financial audit trails.
pub const DEFAULT_RETENTION_DAYS: u32 = 2555;

pub const ENV_STORAGE_PATH: &str = "WORM_STORAGE_PATH";
pub const ENV_ENABLE_ENCRYPTION: &str = "WORM_ENABLE_ENCRYPTION";
pub const ENV_ENCRYPTION_KEY: &str = "WORM_ENCRYPTION_KEY";
pub const ENV_ENABLE_COMPRESSION: &str = "WORM_ENABLE_COMPRESSION";
pub const ENV_RETENTION_DAYS: &str = "WORM_RETENTION_DAYS";

/// Construction-time settings for a WORM store.
///
/// Example TOML:
/// ```toml
/// storage_path = "/var/lib/trustverify/worm"
/// enable_encryption = true
/// encryption_key = "operator-secret"
/// retention_days = 2555
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WormConfig {
    /// Root directory holding the `YYYY/MM/DD` partitions and chain state.
    pub storage_path: PathBuf,

    /// Encrypt every record line with AES-256-GCM before it touches disk.
    pub enable_encryption: bool,

    /// Secret the cipher key is derived from. Required with encryption.
    pub encryption_key: Option<String>,

    /// Accepted for compatibility; records are never compressed.
    pub enable_compression: bool,

    /// Days a day-partition is kept before cleanup may delete it.
    pub retention_days: u32,
}

impl Default for WormConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./worm-storage"),
            enable_encryption: false,
            encryption_key: None,
            enable_compression: false,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl WormConfig {
    /// Build a config rooted at `path` with every other field defaulted.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: path.into(),
            ..Self::default()
        }
    }

    /// Read the `WORM_*` variables from the process environment.
    pub fn from_env() -> WormResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup, e.g. a map in tests.
    ///
    /// Unset variables keep their defaults. Set but unparseable values are a
    /// `ConfigError`.
    pub fn from_lookup<F>(lookup: F) -> WormResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_STORAGE_PATH) {
            config.storage_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_ENABLE_ENCRYPTION) {
            config.enable_encryption = parse_flag(ENV_ENABLE_ENCRYPTION, &raw)?;
        }
        if let Some(key) = lookup(ENV_ENCRYPTION_KEY) {
            config.encryption_key = Some(key);
        }
        if let Some(raw) = lookup(ENV_ENABLE_COMPRESSION) {
            config.enable_compression = parse_flag(ENV_ENABLE_COMPRESSION, &raw)?;
        }
        if let Some(raw) = lookup(ENV_RETENTION_DAYS) {
            config.retention_days = raw.trim().parse().map_err(|e| WormError::ConfigError {
                reason: format!("{} must be a non-negative integer, got '{}': {}", ENV_RETENTION_DAYS, raw, e),
            })?;
        }

        Ok(config)
    }

    /// Parse `s` as a TOML config document.
    pub fn from_toml_str(s: &str) -> WormResult<Self> {
        toml::from_str(s).map_err(|e| WormError::ConfigError {
            reason: format!("failed to parse WORM config TOML: {}", e),
        })
    }

    /// Read and parse the TOML config file at `path`.
    pub fn from_file(path: &Path) -> WormResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WormError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject configurations the store cannot operate with.
    pub fn validate(&self) -> WormResult<()> {
        if self.storage_path.as_os_str().is_empty() {
            return Err(WormError::ConfigError {
                reason: "storage_path must not be empty".to_string(),
            });
        }

        if self.enable_encryption {
            let has_key = self
                .encryption_key
                .as_deref()
                .is_some_and(|k| !k.is_empty());
            if !has_key {
                return Err(WormError::ConfigError {
                    reason: "encryption is enabled but no encryption_key is configured".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn parse_flag(name: &str, raw: &str) -> WormResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        other => Err(WormError::ConfigError {
            reason: format!("{} must be a boolean, got '{}'", name, other),
        }),
    }
}
