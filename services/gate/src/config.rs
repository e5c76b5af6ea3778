//! Gate configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/relaymesh/gate.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `label`
//! - `member_bind`
//! - `client_bind`

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub schema_version: u32,
    pub label: String,
    pub version: String,
    /// Address the `Member` gRPC service binds to, and advertises as this
    /// gate's `service_addr` so backends know where to push/respond.
    pub member_bind: String,
    /// Raw, framed-TCP client listener.
    pub client_bind: String,
    /// Optional HTTP bridge (`/ws` upgrade + one-shot `/:route` POST).
    pub http_bind: Option<String>,
    pub master_addr: Option<String>,
    pub master_register_retry_interval: Duration,
    pub idle_session_timeout: Option<Duration>,
    pub debug_bind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    label: Option<String>,
    version: Option<String>,
    member_bind: Option<String>,
    client_bind: Option<String>,
    http_bind: Option<String>,
    master_addr: Option<String>,
    master_register_retry_interval_secs: Option<u64>,
    idle_session_timeout_secs: Option<u64>,
    debug_bind: Option<String>,
}

pub fn load_config_from_path(path: &Path) -> Result<GateConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<GateConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/relaymesh/gate.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<GateConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw.schema_version.ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!("schema_version must be 1, got {}", schema_version)));
    }

    let label = raw.label.ok_or_else(|| ConfigError::MissingField("label".to_owned()))?;
    let member_bind = raw.member_bind.ok_or_else(|| ConfigError::MissingField("member_bind".to_owned()))?;
    let client_bind = raw.client_bind.ok_or_else(|| ConfigError::MissingField("client_bind".to_owned()))?;

    Ok(GateConfig {
        schema_version,
        label,
        version: raw.version.unwrap_or_else(|| "0.0.0".to_owned()),
        member_bind,
        client_bind,
        http_bind: raw.http_bind,
        master_addr: raw.master_addr,
        master_register_retry_interval: Duration::from_secs(raw.master_register_retry_interval_secs.unwrap_or(5)),
        idle_session_timeout: raw.idle_session_timeout_secs.map(Duration::from_secs),
        debug_bind: raw.debug_bind,
    })
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
        let cfg = load_config_from_str(
            "schema_version = 1\nlabel = \"gate-1\"\nmember_bind = \"0.0.0.0:9200\"\nclient_bind = \"0.0.0.0:3250\"\n",
        )
        .unwrap();
        assert_eq!(cfg.version, "0.0.0");
        assert!(cfg.http_bind.is_none());
        assert!(cfg.idle_session_timeout.is_none());
    }

    #[test]
    fn missing_client_bind_is_rejected() {
        let err =
            load_config_from_str("schema_version = 1\nlabel = \"gate-1\"\nmember_bind = \"0.0.0.0:9200\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }
}
