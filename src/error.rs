use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading the scan document. Always fatal: nothing is
/// scheduled and no report is produced.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config document: {0}")]
    Shape(#[from] serde_yaml::Error),

    #[error("missing required section '{0}' in config document")]
    MissingSection(&'static str),

    #[error("endpoint '{id}': {reason}")]
    InvalidEndpoint { id: String, reason: String },

    #[error("probe '{id}': {reason}")]
    InvalidProbe { id: String, reason: String },

    #[error("duplicate endpoint id '{0}'")]
    DuplicateEndpoint(String),

    #[error("duplicate probe id '{0}'")]
    DuplicateProbe(String),

    #[error("invalid scan settings: {0}")]
    InvalidSettings(String),

    #[error("invalid process settings: {0}")]
    Settings(#[from] config::ConfigError),
}

/// Errors surfaced to whoever invoked a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("endpoint '{0}' not found")]
    EndpointNotFound(String),

    #[error("unknown probe '{0}'")]
    UnknownProbe(String),

    #[error("nothing to scan: {0}")]
    EmptyRun(String),

    #[error("invalid scan request: {0}")]
    InvalidRequest(String),
}

/// A failure inside the probe engine while executing one probe.
///
/// Never crosses the worker boundary: the catalog adapter converts it into
/// an `error` outcome.
#[derive(Debug, Error)]
pub enum ProbeExecutionError {
    #[error("failed to launch probe engine: {0}")]
    Launch(String),

    #[error("probe engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },

    #[error("unreadable probe report: {0}")]
    Report(String),

    #[error("credential reference could not be resolved: {0}")]
    Credential(String),

    #[error("{0}")]
    Other(String),
}
