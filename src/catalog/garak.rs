// garak subprocess adapter
//
// One probe execution is one `garak` invocation restricted to a single
// probe. The verdict comes from the `eval` entries of the JSONL report the
// run leaves behind at `<report_prefix>.report.jsonl`.

use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

use super::{Probe, ProbeCatalog, ProbeResult, Runnable};
use crate::config::{ScanSettings, Settings};
use crate::error::{ProbeExecutionError, ScanError};
use crate::models::Endpoint;
use crate::registry::NO_AUTH;

/// garak probe modules this adapter will dispatch to
const KNOWN_PROBE_MODULES: &[&str] = &[
    "ansiescape",
    "atkgen",
    "av_spam_scanning",
    "continuation",
    "dan",
    "divergence",
    "donotanswer",
    "encoding",
    "exploitation",
    "fileformats",
    "glitch",
    "goodside",
    "grandma",
    "latentinjection",
    "leakreplay",
    "lmrc",
    "malwaregen",
    "misleading",
    "packagehallucination",
    "phrasing",
    "promptinject",
    "realtoxicityprompts",
    "snowball",
    "suffix",
    "tap",
    "topic",
    "visual_jailbreak",
    "web_injection",
    "xss",
];

/// Environment variable the garak REST generator reads its key from
const REST_KEY_ENV: &str = "REST_API_KEY";

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_STDERR_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct GarakConfig {
    pub binary: PathBuf,
    pub generations: u32,
    pub output_dir: PathBuf,
}

impl GarakConfig {
    pub fn new(settings: &Settings, scan_settings: &ScanSettings) -> Self {
        Self {
            binary: settings.garak_bin.clone(),
            generations: scan_settings.generations,
            output_dir: scan_settings.output_dir.clone(),
        }
    }
}

impl Default for GarakConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("garak"),
            generations: 5,
            output_dir: PathBuf::from("results"),
        }
    }
}

// ============================================
// Catalog
// ============================================

#[derive(Debug, Clone)]
pub struct GarakCatalog {
    config: Arc<GarakConfig>,
}

impl GarakCatalog {
    pub fn new(config: GarakConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl ProbeCatalog for GarakCatalog {
    fn name(&self) -> &str {
        "garak"
    }

    fn resolve(&self, probe_id: &str) -> Result<Runnable, ScanError> {
        if !is_known_probe(probe_id) {
            return Err(ScanError::UnknownProbe(probe_id.to_string()));
        }
        Ok(Arc::new(GarakProbe {
            id: probe_id.to_string(),
            config: Arc::clone(&self.config),
        }))
    }

    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let mut command = Command::new(&self.config.binary);
            command
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);

            match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, command.status()).await {
                Ok(Ok(status)) => status.success(),
                Ok(Err(e)) => {
                    tracing::warn!(binary = %self.config.binary.display(), error = %e, "garak is not runnable");
                    false
                }
                Err(_) => false,
            }
        })
    }
}

/// `module` or `module.ClassName`, with a module garak ships.
fn is_known_probe(probe_id: &str) -> bool {
    let (module, class) = match probe_id.split_once('.') {
        Some((module, class)) => (module, Some(class)),
        None => (probe_id, None),
    };

    let class_ok = class.is_none_or(|c| {
        !c.is_empty() && c.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    });

    class_ok && KNOWN_PROBE_MODULES.contains(&module)
}

// ============================================
// Probe
// ============================================

struct GarakProbe {
    id: String,
    config: Arc<GarakConfig>,
}

impl Probe for GarakProbe {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute<'a>(
        &'a self,
        endpoint: &'a Endpoint,
    ) -> BoxFuture<'a, Result<ProbeResult, ProbeExecutionError>> {
        Box::pin(self.invoke(endpoint))
    }
}

impl GarakProbe {
    async fn invoke(&self, endpoint: &Endpoint) -> Result<ProbeResult, ProbeExecutionError> {
        let credential = resolve_credential(&endpoint.auth_ref)?;

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|e| {
                ProbeExecutionError::Launch(format!(
                    "cannot create report directory {}: {}",
                    self.config.output_dir.display(),
                    e
                ))
            })?;

        let prefix = self.config.output_dir.join(format!(
            "{}-{}-{}",
            sanitize(&endpoint.id),
            sanitize(&self.id),
            Uuid::new_v4().simple()
        ));
        let args = build_args(
            endpoint,
            &self.id,
            self.config.generations,
            &prefix,
            credential.as_ref().map(|(name, _)| name.as_str()),
        );

        tracing::debug!(
            endpoint = %endpoint.id,
            probe = %self.id,
            auth = %endpoint.auth_fingerprint(),
            "Launching garak"
        );

        let mut command = Command::new(&self.config.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some((name, value)) = &credential {
            command.env(name, value);
            if endpoint.generator == "rest" && name != REST_KEY_ENV {
                command.env(REST_KEY_ENV, value);
            }
        }

        let output = command
            .output()
            .await
            .map_err(|e| ProbeExecutionError::Launch(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeExecutionError::EngineFailed {
                status: output.status.to_string(),
                stderr: tail(&stderr, MAX_STDERR_CHARS),
            });
        }

        let path = report_path(&prefix);
        let report = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ProbeExecutionError::Report(format!("{}: {}", path.display(), e)))?;

        parse_report(&report)
    }
}

/// `none` means no credential; `env:NAME` is read from this process's
/// environment and forwarded to garak.
fn resolve_credential(auth_ref: &str) -> Result<Option<(String, String)>, ProbeExecutionError> {
    if auth_ref == NO_AUTH {
        return Ok(None);
    }

    let Some(name) = auth_ref.strip_prefix("env:").filter(|n| !n.is_empty()) else {
        return Err(ProbeExecutionError::Credential(
            "unsupported auth_ref scheme (expected env:NAME or none)".to_string(),
        ));
    };

    std::env::var(name)
        .map(|value| Some((name.to_string(), value)))
        .map_err(|_| ProbeExecutionError::Credential(format!("environment variable {} is not set", name)))
}

/// garak command line for one probe against one endpoint.
pub fn build_args(
    endpoint: &Endpoint,
    probe_id: &str,
    generations: u32,
    report_prefix: &Path,
    key_env: Option<&str>,
) -> Vec<String> {
    let model_name = endpoint
        .model
        .clone()
        .unwrap_or_else(|| endpoint.address.clone());

    let mut args = vec![
        "--model_type".to_string(),
        endpoint.generator.clone(),
        "--model_name".to_string(),
        model_name,
    ];

    if endpoint.generator == "rest" {
        let mut options = serde_json::json!({
            "uri": endpoint.address,
            "method": "post",
            "req_template_json_object": { "prompt": "$INPUT" },
            "response_json": true,
            "response_json_field": "text",
        });
        if key_env.is_some() {
            options["key_env_var"] = serde_json::Value::from(REST_KEY_ENV);
            options["headers"] = serde_json::json!({ "Authorization": "Bearer $KEY" });
        }
        args.push("--generator_options".to_string());
        args.push(serde_json::json!({ "rest": { "RestGenerator": options } }).to_string());
    }

    args.extend([
        "--probes".to_string(),
        probe_id.to_string(),
        "--generations".to_string(),
        generations.to_string(),
        "--report_prefix".to_string(),
        report_prefix.to_string_lossy().to_string(),
    ]);

    args
}

pub fn report_path(prefix: &Path) -> PathBuf {
    let mut path = prefix.as_os_str().to_owned();
    path.push(".report.jsonl");
    PathBuf::from(path)
}

#[derive(Debug, Deserialize)]
struct EvalEntry {
    #[serde(default)]
    probe: String,
    #[serde(default)]
    detector: String,
    passed: u64,
    total: u64,
}

/// Reduce a garak JSONL report to a verdict: vulnerable when any detector
/// saw a failing generation.
pub fn parse_report(report: &str) -> Result<ProbeResult, ProbeExecutionError> {
    let mut evals = Vec::new();

    for line in report.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| ProbeExecutionError::Report(format!("invalid JSONL line: {}", e)))?;
        if value.get("entry_type").and_then(|t| t.as_str()) != Some("eval") {
            continue;
        }
        let entry: EvalEntry = serde_json::from_value(value)
            .map_err(|e| ProbeExecutionError::Report(format!("invalid eval entry: {}", e)))?;
        evals.push(entry);
    }

    if evals.is_empty() {
        return Err(ProbeExecutionError::Report(
            "report has no eval entries".to_string(),
        ));
    }

    let failing: Vec<String> = evals
        .iter()
        .filter(|e| e.passed < e.total)
        .map(|e| {
            format!(
                "{} failed {}/{} on {}",
                e.probe,
                e.total - e.passed,
                e.total,
                e.detector
            )
        })
        .collect();

    if failing.is_empty() {
        let total: u64 = evals.iter().map(|e| e.total).sum();
        Ok(ProbeResult::passed(format!(
            "all {} generations passed {} detector(s)",
            total,
            evals.len()
        )))
    } else {
        Ok(ProbeResult::vulnerable(failing.join("; ")))
    }
}

fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn tail(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let skipped: String = text.chars().skip(count - max_chars).collect();
    format!("…{}", skipped)
}
