use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::{Probe, ProbeCatalog, ProbeResult, Runnable};
use crate::error::{ProbeExecutionError, ScanError};
use crate::models::Endpoint;

type ProbeFn =
    dyn Fn(&Endpoint) -> BoxFuture<'static, Result<ProbeResult, ProbeExecutionError>> + Send + Sync;

/// Probe backed by a closure.
struct FnProbe {
    id: String,
    handler: Box<ProbeFn>,
}

impl Probe for FnProbe {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute<'a>(
        &'a self,
        endpoint: &'a Endpoint,
    ) -> BoxFuture<'a, Result<ProbeResult, ProbeExecutionError>> {
        (self.handler)(endpoint)
    }
}

/// In-process catalog with a fixed set of probes.
///
/// Used for embedding and tests; the handler receives a clone of the target
/// endpoint so the returned future owns everything it touches.
#[derive(Clone, Default)]
pub struct StaticCatalog {
    probes: HashMap<String, Runnable>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe<F, Fut>(mut self, id: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Endpoint) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProbeResult, ProbeExecutionError>> + Send + 'static,
    {
        let id = id.into();
        let probe = FnProbe {
            id: id.clone(),
            handler: Box::new(move |endpoint: &Endpoint| handler(endpoint.clone()).boxed()),
        };
        self.probes.insert(id, Arc::new(probe));
        self
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

impl ProbeCatalog for StaticCatalog {
    fn name(&self) -> &str {
        "static"
    }

    fn resolve(&self, probe_id: &str) -> Result<Runnable, ScanError> {
        self.probes
            .get(probe_id)
            .cloned()
            .ok_or_else(|| ScanError::UnknownProbe(probe_id.to_string()))
    }
}
