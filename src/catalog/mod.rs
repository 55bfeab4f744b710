// Probe catalog adapter
//
// The probe engine is a black box behind two capabilities: resolving a probe
// id to a runnable probe, and running that probe once against one endpoint.
// `run` is the containment boundary: whatever the engine does (error, hang,
// panic) comes back as an `Outcome`.

pub mod garak;
mod specs;
mod static_catalog;

pub use garak::{GarakCatalog, GarakConfig};
pub use specs::{default_probe_specs, load_probe_specs};
pub use static_catalog::StaticCatalog;

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{ProbeExecutionError, ScanError};
use crate::models::{Endpoint, Outcome, OutcomeStatus};
use crate::utils::truncate_evidence;

/// Longest evidence summary kept on an outcome
pub const MAX_EVIDENCE_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Passed,
    Vulnerable,
}

/// What the probe engine reports for one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub verdict: ProbeVerdict,
    pub evidence: String,
}

impl ProbeResult {
    pub fn passed(evidence: impl Into<String>) -> Self {
        Self {
            verdict: ProbeVerdict::Passed,
            evidence: evidence.into(),
        }
    }

    pub fn vulnerable(evidence: impl Into<String>) -> Self {
        Self {
            verdict: ProbeVerdict::Vulnerable,
            evidence: evidence.into(),
        }
    }
}

/// One runnable probe. Each `execute` call must issue exactly one probe
/// request against the endpoint; retries belong to the scheduler.
pub trait Probe: Send + Sync {
    fn id(&self) -> &str;

    fn execute<'a>(
        &'a self,
        endpoint: &'a Endpoint,
    ) -> BoxFuture<'a, Result<ProbeResult, ProbeExecutionError>>;
}

pub type Runnable = Arc<dyn Probe>;

pub trait ProbeCatalog: Send + Sync {
    /// Short name used in logs and health output
    fn name(&self) -> &str;

    /// Fails with `ScanError::UnknownProbe` when the engine has no such probe.
    fn resolve(&self, probe_id: &str) -> Result<Runnable, ScanError>;

    /// Whether the probe engine is usable at all
    fn health_check(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }
}

/// Run a probe once, bounded by `timeout`.
///
/// Never fails: engine errors and panics become `error` outcomes, an
/// elapsed timeout becomes a `timeout` outcome.
pub async fn run(runnable: &Runnable, endpoint: &Endpoint, timeout: Duration) -> Outcome {
    let at = Utc::now();
    let started = Instant::now();

    let execution = AssertUnwindSafe(async { runnable.execute(endpoint).await }).catch_unwind();

    let (status, evidence) = match tokio::time::timeout(timeout, execution).await {
        Err(_) => (
            OutcomeStatus::Timeout,
            format!("probe did not finish within {:.1}s", timeout.as_secs_f64()),
        ),
        Ok(Err(panic)) => (
            OutcomeStatus::Error,
            format!("probe engine panicked: {}", panic_message(panic.as_ref())),
        ),
        Ok(Ok(Err(e))) => (OutcomeStatus::Error, e.to_string()),
        Ok(Ok(Ok(result))) => match result.verdict {
            ProbeVerdict::Vulnerable => (OutcomeStatus::Vulnerable, result.evidence),
            ProbeVerdict::Passed => (OutcomeStatus::Success, result.evidence),
        },
    };

    if status == OutcomeStatus::Error {
        tracing::warn!(
            endpoint = %endpoint.id,
            probe = runnable.id(),
            error = %evidence,
            "Probe execution failed"
        );
    }

    Outcome::attempt(
        endpoint.id.clone(),
        runnable.id().to_string(),
        status,
        truncate_evidence(&evidence, MAX_EVIDENCE_CHARS),
        started.elapsed(),
        at,
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
