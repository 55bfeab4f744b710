// Endpoint registry
//
// Loading is fail-fast and all-or-nothing. Validation runs in three passes
// over the whole document: shape (serde), field constraints, uniqueness.
// The first failure aborts the load; no partial registry is ever built.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use validator::Validate;

use crate::config::{EndpointDescriptor, ScanDocument};
use crate::error::{ConfigError, ScanError};
use crate::models::{Endpoint, MAX_TIMEOUT_SECS, OwaspCategory, RateLimit};
use crate::utils::bounded_duration;

/// Auth reference for endpoints that need no credential
pub const NO_AUTH: &str = "none";

#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<Arc<Endpoint>>,
    index: HashMap<String, usize>,
}

impl EndpointRegistry {
    /// Load from a YAML document source.
    pub fn load(source: &str) -> Result<Self, ConfigError> {
        let document = ScanDocument::parse(source)?;
        Self::from_descriptors(document.endpoint_descriptors())
    }

    pub fn load_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let document = ScanDocument::from_path(path)?;
        Self::from_descriptors(document.endpoint_descriptors())
    }

    /// Build from already-parsed descriptors (field constraints, then
    /// uniqueness).
    pub fn from_descriptors(descriptors: &[EndpointDescriptor]) -> Result<Self, ConfigError> {
        let endpoints = descriptors
            .iter()
            .map(endpoint_from_descriptor)
            .collect::<Result<Vec<_>, _>>()?;

        let mut index = HashMap::with_capacity(endpoints.len());
        for (position, endpoint) in endpoints.iter().enumerate() {
            if index.insert(endpoint.id.clone(), position).is_some() {
                return Err(ConfigError::DuplicateEndpoint(endpoint.id.clone()));
            }
        }

        tracing::debug!(
            endpoints = endpoints.len(),
            enabled = endpoints.iter().filter(|e| e.enabled).count(),
            "Endpoint registry loaded"
        );

        Ok(Self {
            endpoints: endpoints.into_iter().map(Arc::new).collect(),
            index,
        })
    }

    /// Build from endpoints constructed in code, enforcing the same
    /// invariants as a document load.
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = Endpoint>) -> Result<Self, ConfigError> {
        let mut registry = Self::default();
        for endpoint in endpoints {
            check_runtime_invariants(&endpoint)?;
            if registry.index.contains_key(&endpoint.id) {
                return Err(ConfigError::DuplicateEndpoint(endpoint.id));
            }
            registry
                .index
                .insert(endpoint.id.clone(), registry.endpoints.len());
            registry.endpoints.push(Arc::new(endpoint));
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Endpoint>, ScanError> {
        self.index
            .get(id)
            .map(|&position| Arc::clone(&self.endpoints[position]))
            .ok_or_else(|| ScanError::EndpointNotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.endpoints.iter()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.endpoints.iter().filter(|e| e.enabled)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

fn endpoint_from_descriptor(descriptor: &EndpointDescriptor) -> Result<Endpoint, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        id: descriptor.id.clone(),
        reason,
    };

    descriptor.validate().map_err(|e| invalid(e.to_string()))?;

    let scheme = descriptor
        .address
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase());
    if !matches!(scheme.as_deref(), Some("http") | Some("https")) {
        return Err(invalid(format!(
            "address '{}' must use http or https",
            descriptor.address
        )));
    }

    let auth_ref = descriptor
        .auth_ref
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| invalid(format!("missing auth_ref (use '{}' for open endpoints)", NO_AUTH)))?;

    let categories = descriptor
        .categories
        .iter()
        .map(|tag| tag.parse::<OwaspCategory>())
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(|e| invalid(e.to_string()))?;

    let rate_limit = match descriptor.burst {
        Some(burst) => RateLimit::per_second(descriptor.rate_limit).with_burst(burst),
        None => RateLimit::per_second(descriptor.rate_limit),
    };

    let endpoint = Endpoint {
        id: descriptor.id.trim().to_string(),
        address: descriptor.address.clone(),
        auth_ref: auth_ref.to_string(),
        categories,
        rate_limit,
        timeout: bounded_duration(descriptor.timeout_seconds, MAX_TIMEOUT_SECS).ok_or_else(|| {
            invalid(format!(
                "timeout_seconds must be a finite number between 0 and {}",
                MAX_TIMEOUT_SECS
            ))
        })?,
        enabled: descriptor.enabled,
        generator: descriptor.generator.clone(),
        model: descriptor.model.clone(),
    };

    check_runtime_invariants(&endpoint)?;
    Ok(endpoint)
}

fn check_runtime_invariants(endpoint: &Endpoint) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        id: endpoint.id.clone(),
        reason: reason.to_string(),
    };

    if endpoint.id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if endpoint.auth_ref.trim().is_empty() {
        return Err(invalid("missing auth_ref"));
    }
    let rps = endpoint.rate_limit.requests_per_second;
    if !(rps.is_finite() && rps > 0.0) {
        return Err(invalid("rate_limit must be a finite number greater than 0"));
    }
    if endpoint.timeout.is_zero() || endpoint.timeout.as_secs_f64() > MAX_TIMEOUT_SECS {
        return Err(invalid("timeout must be greater than 0 and at most one day"));
    }
    Ok(())
}
