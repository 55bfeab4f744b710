use std::collections::HashSet;
use validator::Validate;

use crate::config::ProbeDescriptor;
use crate::error::ConfigError;
use crate::models::{OwaspCategory, ProbeSpec, Severity};

/// Built-in probe set used when the scan document has no `probes` section.
pub fn default_probe_specs() -> Vec<ProbeSpec> {
    use OwaspCategory::*;

    vec![
        ProbeSpec::new("promptinject", PromptInjection, Severity::High)
            .with_description("Prompt injection via hijacking instructions"),
        ProbeSpec::new("dan", PromptInjection, Severity::High)
            .with_description("Do-Anything-Now style jailbreaks"),
        ProbeSpec::new("latentinjection", PromptInjection, Severity::High)
            .with_description("Instructions hidden inside documents and context"),
        ProbeSpec::new("encoding", PromptInjection, Severity::Medium)
            .with_description("Injection through encoded payloads"),
        ProbeSpec::new("xss", InsecureOutputHandling, Severity::High)
            .with_description("Markdown and script exfiltration in model output"),
        ProbeSpec::new("leakreplay", SensitiveInformationDisclosure, Severity::Medium)
            .with_description("Replay of memorised training data"),
        ProbeSpec::new("packagehallucination", Overreliance, Severity::Medium)
            .with_description("Hallucinated package names in generated code"),
        ProbeSpec::new("snowball", Overreliance, Severity::Low)
            .with_description("Confidently wrong answers to unanswerable questions"),
    ]
}

/// Turn the document's `probes` section into probe specs, or fall back to
/// the built-in set when the section is absent.
pub fn load_probe_specs(descriptors: Option<&[ProbeDescriptor]>) -> Result<Vec<ProbeSpec>, ConfigError> {
    let Some(descriptors) = descriptors else {
        return Ok(default_probe_specs());
    };

    let mut seen = HashSet::with_capacity(descriptors.len());
    let mut specs = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let invalid = |reason: String| ConfigError::InvalidProbe {
            id: descriptor.id.clone(),
            reason,
        };

        descriptor.validate().map_err(|e| invalid(e.to_string()))?;

        let category = descriptor
            .category
            .parse::<OwaspCategory>()
            .map_err(|e| invalid(e.to_string()))?;

        let severity = match descriptor.severity.as_deref() {
            Some(raw) => raw.parse::<Severity>().map_err(invalid)?,
            None => Severity::default(),
        };

        if !seen.insert(descriptor.id.clone()) {
            return Err(ConfigError::DuplicateProbe(descriptor.id.clone()));
        }

        specs.push(ProbeSpec {
            id: descriptor.id.clone(),
            category,
            severity,
            idempotent: descriptor.idempotent,
            enabled: descriptor.enabled,
            description: descriptor.description.clone(),
        });
    }

    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanDocument;

    fn probes(yaml: &str) -> Vec<ProbeDescriptor> {
        ScanDocument::parse(yaml).unwrap().probes.unwrap_or_default()
    }

    #[test]
    fn test_defaults_when_section_absent() {
        let specs = load_probe_specs(None).unwrap();
        assert_eq!(specs, default_probe_specs());
        assert!(specs.iter().all(|s| s.category != OwaspCategory::Unmapped));
    }

    #[test]
    fn test_descriptors_are_converted() {
        let descriptors = probes(
            r#"
endpoints: []
probes:
  - id: dan
    category: llm01
    severity: critical
    idempotent: false
  - id: snowball
    category: LLM09
"#,
        );
        let specs = load_probe_specs(Some(&descriptors)).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].category, OwaspCategory::PromptInjection);
        assert_eq!(specs[0].severity, Severity::Critical);
        assert!(!specs[0].idempotent);
        assert_eq!(specs[1].severity, Severity::Medium);
        assert!(specs[1].idempotent);
    }

    #[test]
    fn test_bad_descriptors_rejected() {
        let unknown_category = probes(
            r#"
endpoints: []
probes:
  - { id: dan, category: LLM11 }
"#,
        );
        assert!(matches!(
            load_probe_specs(Some(&unknown_category)),
            Err(ConfigError::InvalidProbe { .. })
        ));

        let duplicate = probes(
            r#"
endpoints: []
probes:
  - { id: dan, category: LLM01 }
  - { id: dan, category: LLM06 }
"#,
        );
        assert!(matches!(
            load_probe_specs(Some(&duplicate)),
            Err(ConfigError::DuplicateProbe(id)) if id == "dan"
        ));
    }
}
