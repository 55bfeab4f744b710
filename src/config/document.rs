use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::error::ConfigError;
use crate::models::{DEFAULT_GENERATOR, DEFAULT_TIMEOUT_SECS};
use crate::utils::bounded_duration;

/// Upper bound for a run deadline (one week)
pub const MAX_DEADLINE_SECS: f64 = 604_800.0;

// ============================================
// Scan Document
// ============================================

/// The YAML scan document. Only `endpoints` is required.
///
/// ```yaml
/// endpoints:
///   - id: support-bot
///     address: https://llm.example.com/v1/chat
///     auth_ref: env:SUPPORT_BOT_KEY
///     categories: [LLM01, LLM06]
///     rate_limit: 2
///     timeout_seconds: 120
/// probes:
///   - id: promptinject
///     category: LLM01
///     severity: high
/// scan_settings:
///   workers: 4
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ScanDocument {
    #[serde(default)]
    pub endpoints: Option<Vec<EndpointDescriptor>>,

    #[serde(default)]
    pub probes: Option<Vec<ProbeDescriptor>>,

    #[serde(default)]
    pub scan_settings: ScanSettings,
}

impl ScanDocument {
    /// Parse a document, checking its shape only.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let document: ScanDocument = serde_yaml::from_str(source)?;
        if document.endpoints.is_none() {
            return Err(ConfigError::MissingSection("endpoints"));
        }
        Ok(document)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source)
    }

    pub fn endpoint_descriptors(&self) -> &[EndpointDescriptor] {
        self.endpoints.as_deref().unwrap_or_default()
    }
}

// ============================================
// Endpoint Descriptor
// ============================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EndpointDescriptor {
    #[validate(length(min = 1, max = 128, message = "id must be 1-128 characters"))]
    pub id: String,

    #[validate(url(message = "address is not a valid URL"))]
    pub address: String,

    /// Opaque credential handle (`env:NAME` or `none`)
    #[serde(default)]
    pub auth_ref: Option<String>,

    #[serde(default)]
    pub categories: Vec<String>,

    /// Requests per second
    #[validate(range(exclusive_min = 0.0, message = "rate_limit must be greater than 0"))]
    pub rate_limit: f64,

    #[serde(default)]
    #[validate(range(min = 1, message = "burst must be at least 1"))]
    pub burst: Option<u32>,

    #[serde(default = "default_timeout_seconds")]
    #[validate(range(exclusive_min = 0.0, message = "timeout_seconds must be greater than 0"))]
    pub timeout_seconds: f64,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// garak generator family; `type` in older documents
    #[serde(default = "default_generator", alias = "type")]
    pub generator: String,

    #[serde(default)]
    pub model: Option<String>,
}

fn default_timeout_seconds() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_generator() -> String {
    DEFAULT_GENERATOR.to_string()
}

fn default_true() -> bool {
    true
}

// ============================================
// Probe Descriptor
// ============================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProbeDescriptor {
    /// garak probe name; `name` in older documents
    #[serde(alias = "name")]
    #[validate(length(min = 1, max = 128, message = "id must be 1-128 characters"))]
    pub id: String,

    /// OWASP tag; `owasp_mapping` in older documents
    #[serde(alias = "owasp_mapping")]
    pub category: String,

    #[serde(default)]
    pub severity: Option<String>,

    #[serde(default = "default_true")]
    pub idempotent: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub description: Option<String>,
}

// ============================================
// Scan Settings
// ============================================

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ScanSettings {
    /// Worker pool width; `parallel` in older documents
    #[serde(alias = "parallel")]
    #[validate(range(min = 1, max = 256, message = "workers must be between 1 and 256"))]
    pub workers: usize,

    /// Retries for idempotent probes that end in `error`
    #[validate(range(max = 10, message = "max_retries must be at most 10"))]
    pub max_retries: u32,

    pub retry_base_delay_ms: u64,

    pub retry_max_delay_ms: u64,

    /// Global run deadline
    #[validate(range(exclusive_min = 0.0, message = "deadline_seconds must be greater than 0"))]
    pub deadline_seconds: f64,

    /// garak `--generations`
    #[validate(range(min = 1, max = 100, message = "generations must be between 1 and 100"))]
    pub generations: u32,

    /// Directory for garak report files
    pub output_dir: PathBuf,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            max_retries: 2,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            deadline_seconds: 3600.0,
            generations: 5,
            output_dir: PathBuf::from("results"),
        }
    }
}

impl ScanSettings {
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;
        if bounded_duration(self.deadline_seconds, MAX_DEADLINE_SECS).is_none() {
            return Err(ConfigError::InvalidSettings(format!(
                "deadline_seconds must be a finite number between 0 and {}",
                MAX_DEADLINE_SECS
            )));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ConfigError::InvalidSettings(
                "retry_max_delay_ms must not be lower than retry_base_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Run deadline; values `check` would reject fall back to the maximum.
    pub fn deadline(&self) -> Duration {
        bounded_duration(self.deadline_seconds, MAX_DEADLINE_SECS)
            .unwrap_or(Duration::from_secs_f64(MAX_DEADLINE_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_endpoints_section() {
        let err = ScanDocument::parse("probes: []\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection("endpoints")));
    }

    #[test]
    fn test_legacy_field_names() {
        let doc = ScanDocument::parse(
            r#"
endpoints:
  - id: hf
    address: https://api-inference.huggingface.co
    auth_ref: env:HF_TOKEN
    type: huggingface
    model: gpt2
    rate_limit: 1
probes:
  - name: promptinject
    owasp_mapping: LLM01
scan_settings:
  parallel: 8
  generations: 3
"#,
        )
        .unwrap();

        let endpoint = &doc.endpoint_descriptors()[0];
        assert_eq!(endpoint.generator, "huggingface");
        assert_eq!(endpoint.model.as_deref(), Some("gpt2"));
        assert!(endpoint.enabled);

        let probe = &doc.probes.as_ref().unwrap()[0];
        assert_eq!(probe.id, "promptinject");
        assert_eq!(probe.category, "LLM01");

        assert_eq!(doc.scan_settings.workers, 8);
        assert_eq!(doc.scan_settings.generations, 3);
        assert_eq!(doc.scan_settings.max_retries, 2);
    }

    #[test]
    fn test_settings_bounds() {
        let mut settings = ScanSettings::default();
        assert!(settings.check().is_ok());

        settings.workers = 0;
        assert!(settings.check().is_err());

        let mut settings = ScanSettings::default();
        settings.retry_base_delay_ms = 10_000;
        settings.retry_max_delay_ms = 100;
        assert!(settings.check().is_err());
    }

    #[test]
    fn test_deadline_bounds() {
        for seconds in [1e20, MAX_DEADLINE_SECS + 1.0, f64::NAN, f64::INFINITY] {
            let settings = ScanSettings {
                deadline_seconds: seconds,
                ..ScanSettings::default()
            };
            assert!(
                matches!(settings.check(), Err(ConfigError::InvalidSettings(_))),
                "deadline_seconds {seconds} accepted"
            );
            assert_eq!(settings.deadline(), Duration::from_secs_f64(MAX_DEADLINE_SECS));
        }

        let settings = ScanSettings {
            deadline_seconds: MAX_DEADLINE_SECS,
            ..ScanSettings::default()
        };
        assert!(settings.check().is_ok());
        assert_eq!(settings.deadline(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_oversized_deadline_in_document() {
        let doc = ScanDocument::parse(
            "endpoints: []\nscan_settings:\n  deadline_seconds: 1e20\n",
        )
        .unwrap();
        assert!(matches!(
            doc.scan_settings.check(),
            Err(ConfigError::InvalidSettings(_))
        ));
    }
}
