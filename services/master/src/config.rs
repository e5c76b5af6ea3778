//! Master configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/relaymesh/master.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `bind`

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub schema_version: u32,
    pub bind: String,
    /// `None` runs with `NullPersistence` (fresh membership on every
    /// restart); `Some(path)` backs the registry with `FilePersistence`.
    pub persistence_path: Option<String>,
    pub debug_bind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    bind: Option<String>,
    persistence_path: Option<String>,
    debug_bind: Option<String>,
}

pub fn load_config_from_path(path: &Path) -> Result<MasterConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<MasterConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/relaymesh/master.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<MasterConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw.schema_version.ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!("schema_version must be 1, got {}", schema_version)));
    }

    let bind = raw.bind.ok_or_else(|| ConfigError::MissingField("bind".to_owned()))?;

    Ok(MasterConfig { schema_version, bind, persistence_path: raw.persistence_path, debug_bind: raw.debug_bind })
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {}", s),
            ConfigError::Parse(s) => write!(f, "Parse error: {}", s),
            ConfigError::MissingField(s) => write!(f, "Missing required field: {}", s),
            ConfigError::InvalidValue(s) => write!(f, "Invalid config value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_loads_with_defaults() {
        let cfg = load_config_from_str("schema_version = 1\nbind = \"0.0.0.0:9000\"\n").unwrap();
        assert_eq!(cfg.bind, "0.0.0.0:9000");
        assert!(cfg.persistence_path.is_none());
        assert!(cfg.debug_bind.is_none());
    }

    #[test]
    fn missing_bind_is_rejected() {
        let err = load_config_from_str("schema_version = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let err = load_config_from_str("schema_version = 2\nbind = \"0.0.0.0:9000\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }
}
