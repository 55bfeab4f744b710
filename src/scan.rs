// Scan invocation
//
// `run_scan` is the single entry point: select endpoints, plan, execute,
// aggregate. Registry and probe specs are loaded fresh for every scanner, so
// nothing carries over between runs.

use chrono::Utc;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::catalog::{ProbeCatalog, load_probe_specs};
use crate::config::{MAX_DEADLINE_SECS, ScanDocument, ScanSettings};
use crate::error::{ConfigError, ScanError};
use crate::models::{Endpoint, OwaspCategory, ProbeSpec, RunReport};
use crate::registry::EndpointRegistry;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::utils::bounded_duration;

/// Parameters of one run. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanRequest {
    /// Restrict the run to these endpoints (all enabled endpoints otherwise)
    #[serde(default)]
    pub endpoint_ids: Option<Vec<String>>,

    /// Restrict the run to these OWASP tags
    #[serde(default, alias = "category_filter")]
    pub categories: Option<Vec<String>>,

    /// Overrides `scan_settings.deadline_seconds`
    #[serde(default)]
    pub deadline_seconds: Option<f64>,
}

impl ScanRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoints<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoint_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn categories(mut self, categories: impl IntoIterator<Item = OwaspCategory>) -> Self {
        self.categories = Some(categories.into_iter().map(|c| c.tag().to_string()).collect());
        self
    }

    pub fn deadline_seconds(mut self, seconds: f64) -> Self {
        self.deadline_seconds = Some(seconds);
        self
    }

    fn category_filter(&self) -> Result<Option<BTreeSet<OwaspCategory>>, ScanError> {
        self.categories
            .as_ref()
            .map(|tags| {
                tags.iter()
                    .map(|tag| tag.parse::<OwaspCategory>())
                    .collect::<Result<BTreeSet<_>, _>>()
                    .map_err(|e| ScanError::InvalidRequest(e.to_string()))
            })
            .transpose()
    }

    fn deadline(&self, settings: &ScanSettings) -> Result<Duration, ScanError> {
        let Some(seconds) = self.deadline_seconds else {
            return Ok(settings.deadline());
        };
        bounded_duration(seconds, MAX_DEADLINE_SECS).ok_or_else(|| {
            ScanError::InvalidRequest(format!(
                "deadline_seconds must be a finite number between 0 and {}",
                MAX_DEADLINE_SECS
            ))
        })
    }
}

pub struct Scanner {
    registry: EndpointRegistry,
    specs: Vec<ProbeSpec>,
    settings: ScanSettings,
    catalog: Arc<dyn ProbeCatalog>,
}

impl Scanner {
    pub fn new(
        registry: EndpointRegistry,
        specs: Vec<ProbeSpec>,
        settings: ScanSettings,
        catalog: Arc<dyn ProbeCatalog>,
    ) -> Self {
        Self {
            registry,
            specs,
            settings,
            catalog,
        }
    }

    /// Validate a parsed document: settings, endpoints, then probes.
    pub fn from_document(document: &ScanDocument, catalog: Arc<dyn ProbeCatalog>) -> Result<Self, ConfigError> {
        document.scan_settings.check()?;
        let registry = EndpointRegistry::from_descriptors(document.endpoint_descriptors())?;
        let specs = load_probe_specs(document.probes.as_deref())?;

        Ok(Self::new(registry, specs, document.scan_settings.clone(), catalog))
    }

    pub fn load(source: &str, catalog: Arc<dyn ProbeCatalog>) -> Result<Self, ConfigError> {
        Self::from_document(&ScanDocument::parse(source)?, catalog)
    }

    pub fn load_path(path: impl AsRef<Path>, catalog: Arc<dyn ProbeCatalog>) -> Result<Self, ConfigError> {
        Self::from_document(&ScanDocument::from_path(path)?, catalog)
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn probe_specs(&self) -> &[ProbeSpec] {
        &self.specs
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &Arc<dyn ProbeCatalog> {
        &self.catalog
    }

    /// Run one scan and return its finalized report.
    ///
    /// Fails before anything executes on an unknown endpoint id, an invalid
    /// request, or an empty plan. Once execution starts a report is always
    /// produced.
    pub async fn run_scan(&self, request: &ScanRequest) -> Result<RunReport, ScanError> {
        let deadline = request.deadline(&self.settings)?;
        let category_filter = request.category_filter()?;
        let endpoints = self.select_endpoints(request.endpoint_ids.as_deref())?;

        let scheduler = Scheduler::new(
            SchedulerConfig::from_settings(&self.settings).with_deadline(deadline),
            Arc::clone(&self.catalog),
        );
        let plan = scheduler.plan(&endpoints, &self.specs, category_filter.as_ref())?;

        let run_id = Uuid::new_v4();
        let mut report = RunReport::begin(run_id, Utc::now());
        report.tasks_planned = plan.len();
        report.unresolved_probes = plan.unresolved_probes.clone();

        tracing::info!(
            %run_id,
            endpoints = endpoints.len(),
            tasks = plan.len(),
            unresolved = plan.unresolved_probes.len(),
            catalog = self.catalog.name(),
            "Scan started"
        );

        let outcomes = scheduler.execute(run_id, plan).await;
        let report = Aggregator::new(&self.specs).finalize(report, &outcomes, Utc::now());

        tracing::info!(
            %run_id,
            verdict = ?report.verdict,
            findings = report.findings.len(),
            risk_score = report.risk_score,
            "Scan completed"
        );

        Ok(report)
    }

    fn select_endpoints(&self, ids: Option<&[String]>) -> Result<Vec<Arc<Endpoint>>, ScanError> {
        let Some(ids) = ids else {
            return Ok(self.registry.enabled().cloned().collect());
        };

        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for id in ids {
            let endpoint = self.registry.get(id)?;
            if !seen.insert(id.as_str()) {
                continue;
            }
            if endpoint.enabled {
                selected.push(endpoint);
            } else {
                tracing::warn!(endpoint = %id, "Requested endpoint is disabled, skipping");
            }
        }
        Ok(selected)
    }
}

/// Load the scan document at `path` and run one scan against it.
pub async fn run_scan(
    path: impl AsRef<Path>,
    catalog: Arc<dyn ProbeCatalog>,
    request: &ScanRequest,
) -> Result<RunReport, ScanError> {
    Scanner::load_path(path, catalog)?.run_scan(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ProbeResult, StaticCatalog};

    const DOCUMENT: &str = r#"
endpoints:
  - { id: ep1, address: "https://one.example.com", auth_ref: none, rate_limit: 100, categories: [LLM01] }
  - { id: off, address: "https://off.example.com", auth_ref: none, rate_limit: 100, categories: [LLM01], enabled: false }
probes:
  - { id: dan, category: LLM01 }
"#;

    fn scanner() -> Scanner {
        let catalog = StaticCatalog::new().with_probe("dan", |_| async { Ok(ProbeResult::passed("ok")) });
        Scanner::load(DOCUMENT, Arc::new(catalog)).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_endpoint_id_is_rejected() {
        let err = scanner()
            .run_scan(&ScanRequest::new().endpoints(["ep1", "ghost"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::EndpointNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_disabled_endpoint_only_is_an_empty_run() {
        let err = scanner()
            .run_scan(&ScanRequest::new().endpoints(["off"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::EmptyRun(_)));
    }

    #[tokio::test]
    async fn test_invalid_request_fields() {
        let bad_category = ScanRequest {
            categories: Some(vec!["LLM99".to_string()]),
            ..ScanRequest::default()
        };
        assert!(matches!(
            scanner().run_scan(&bad_category).await,
            Err(ScanError::InvalidRequest(_))
        ));

        for seconds in [0.0, -1.0, f64::NAN, 1e19, MAX_DEADLINE_SECS + 1.0] {
            assert!(matches!(
                scanner().run_scan(&ScanRequest::new().deadline_seconds(seconds)).await,
                Err(ScanError::InvalidRequest(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_settings_deadline_ignored_when_request_overrides() {
        let document = ScanDocument::parse(DOCUMENT).unwrap();
        let mut settings = document.scan_settings.clone();
        settings.deadline_seconds = 1e20;
        let scanner = Scanner::new(
            EndpointRegistry::from_descriptors(document.endpoint_descriptors()).unwrap(),
            load_probe_specs(document.probes.as_deref()).unwrap(),
            settings,
            Arc::clone(scanner().catalog()),
        );

        let report = scanner
            .run_scan(&ScanRequest::new().deadline_seconds(5.0))
            .await
            .unwrap();
        assert_eq!(report.findings.len(), 1);

        let report = scanner.run_scan(&ScanRequest::new()).await.unwrap();
        assert_eq!(report.findings.len(), 1);
    }

    #[test]
    fn test_oversized_settings_deadline_fails_load() {
        let doc = format!("{DOCUMENT}scan_settings:\n  deadline_seconds: 1e20\n");
        let catalog = StaticCatalog::new();
        assert!(matches!(
            Scanner::load(&doc, Arc::new(catalog)),
            Err(ConfigError::InvalidSettings(_))
        ));
    }

    #[tokio::test]
    async fn test_report_records_plan() {
        let report = scanner()
            .run_scan(&ScanRequest::new().endpoints(["ep1", "ep1"]))
            .await
            .unwrap();
        assert_eq!(report.tasks_planned, 1);
        assert_eq!(report.findings.len(), 1);
        assert!(report.is_finalized());
        assert!(report.ended_at.unwrap() >= report.started_at);
    }

    #[test]
    fn test_invalid_settings_rejected_at_load() {
        let doc = "endpoints: []\nscan_settings:\n  workers: 0\n";
        assert!(matches!(
            Scanner::load(doc, Arc::new(StaticCatalog::new())),
            Err(ConfigError::InvalidSettings(_))
        ));
    }
}
