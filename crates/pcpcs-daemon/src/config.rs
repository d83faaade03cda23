// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Daemon configuration: the bind address and receive area, plus log verbosity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Address the transfer server and discovery listener bind to (default: 0.0.0.0).
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Directory incoming files and folders are written to. Defaults to
    /// `pcpcs_core::receive_area::receive_dir()` when unset.
    #[serde(default)]
    pub receive_dir: Option<PathBuf>,

    /// `tracing`/`log` filter directive, e.g. `"info"` or `"pcpcs_core=debug,info"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Announce and answer discovery broadcasts. Disabling is useful for a daemon that
    /// only wants to receive transfers addressed directly to its IP.
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,
}

fn default_bind_address() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            receive_dir: None,
            log_level: default_log_level(),
            discovery_enabled: true,
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Saves configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Validates configuration, catching mistakes before the daemon tries to bind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::InvalidValue("log_level cannot be empty".into()));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Serialize(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(s) => write!(f, "I/O error: {s}"),
            Self::Parse(s) => write!(f, "parse error: {s}"),
            Self::Serialize(s) => write!(f, "serialize error: {s}"),
            Self::InvalidValue(s) => write!(f, "invalid value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DaemonConfig::default();
        assert!(config.discovery_enabled);
        assert!(config.receive_dir.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_serialization_roundtrips() {
        let config = DaemonConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: DaemonConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.bind_address, parsed.bind_address);
        assert_eq!(config.log_level, parsed.log_level);
    }

    #[test]
    fn empty_log_level_is_rejected() {
        let config = DaemonConfig { log_level: String::new(), ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcpcs-daemon.json");
        let mut config = DaemonConfig::default();
        config.log_level = "debug".to_string();
        config.to_file(&path).unwrap();

        let loaded = DaemonConfig::from_file(&path).unwrap();
        assert_eq!(loaded.log_level, "debug");
    }
}
