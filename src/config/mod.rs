// Configuration module
//
// Two layers: process `Settings` read from the environment (SCANNER_*), and
// the scan document (`config/endpoints.yaml`) reloaded on every scan.

mod document;

pub use document::{EndpointDescriptor, MAX_DEADLINE_SECS, ProbeDescriptor, ScanDocument, ScanSettings};

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_SCAN_CONFIG_PATH: &str = "config/endpoints.yaml";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server_host: String,
    pub server_port: u16,
    /// Path of the scan document
    pub scan_config_path: PathBuf,
    /// garak executable
    pub garak_bin: PathBuf,
    pub log_format: LogFormat,
    pub environment: Environment,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Settings {
    /// Read settings from `SCANNER_*` environment variables, falling back to
    /// the defaults below.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let config = config::Config::builder()
            .set_default("server_host", defaults.server_host)?
            .set_default("server_port", defaults.server_port as i64)?
            .set_default(
                "scan_config_path",
                defaults.scan_config_path.to_string_lossy().to_string(),
            )?
            .set_default("garak_bin", defaults.garak_bin.to_string_lossy().to_string())?
            .set_default("log_format", "pretty")?
            .set_default("environment", "development")?
            .add_source(config::Environment::with_prefix("SCANNER"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8080,
            scan_config_path: PathBuf::from(DEFAULT_SCAN_CONFIG_PATH),
            garak_bin: PathBuf::from("garak"),
            log_format: LogFormat::Pretty,
            environment: Environment::Development,
        }
    }
}
