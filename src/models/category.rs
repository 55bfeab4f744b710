use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// OWASP Top 10 for LLM Applications, used as the classification tag on
/// probes and findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OwaspCategory {
    #[serde(rename = "LLM01")]
    PromptInjection,
    #[serde(rename = "LLM02")]
    InsecureOutputHandling,
    #[serde(rename = "LLM03")]
    TrainingDataPoisoning,
    #[serde(rename = "LLM04")]
    ModelDenialOfService,
    #[serde(rename = "LLM05")]
    SupplyChainVulnerabilities,
    #[serde(rename = "LLM06")]
    SensitiveInformationDisclosure,
    #[serde(rename = "LLM07")]
    InsecurePluginDesign,
    #[serde(rename = "LLM08")]
    ExcessiveAgency,
    #[serde(rename = "LLM09")]
    Overreliance,
    #[serde(rename = "LLM10")]
    ModelTheft,
    /// Reserved for findings whose probe has no known mapping.
    /// Never accepted from configuration.
    #[serde(rename = "unmapped")]
    Unmapped,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown OWASP LLM category '{0}' (expected LLM01..LLM10)")]
pub struct UnknownCategory(pub String);

impl OwaspCategory {
    pub const ALL: [OwaspCategory; 10] = [
        OwaspCategory::PromptInjection,
        OwaspCategory::InsecureOutputHandling,
        OwaspCategory::TrainingDataPoisoning,
        OwaspCategory::ModelDenialOfService,
        OwaspCategory::SupplyChainVulnerabilities,
        OwaspCategory::SensitiveInformationDisclosure,
        OwaspCategory::InsecurePluginDesign,
        OwaspCategory::ExcessiveAgency,
        OwaspCategory::Overreliance,
        OwaspCategory::ModelTheft,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            OwaspCategory::PromptInjection => "LLM01",
            OwaspCategory::InsecureOutputHandling => "LLM02",
            OwaspCategory::TrainingDataPoisoning => "LLM03",
            OwaspCategory::ModelDenialOfService => "LLM04",
            OwaspCategory::SupplyChainVulnerabilities => "LLM05",
            OwaspCategory::SensitiveInformationDisclosure => "LLM06",
            OwaspCategory::InsecurePluginDesign => "LLM07",
            OwaspCategory::ExcessiveAgency => "LLM08",
            OwaspCategory::Overreliance => "LLM09",
            OwaspCategory::ModelTheft => "LLM10",
            OwaspCategory::Unmapped => "unmapped",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            OwaspCategory::PromptInjection => "Prompt Injection",
            OwaspCategory::InsecureOutputHandling => "Insecure Output Handling",
            OwaspCategory::TrainingDataPoisoning => "Training Data Poisoning",
            OwaspCategory::ModelDenialOfService => "Model Denial of Service",
            OwaspCategory::SupplyChainVulnerabilities => "Supply Chain Vulnerabilities",
            OwaspCategory::SensitiveInformationDisclosure => "Sensitive Information Disclosure",
            OwaspCategory::InsecurePluginDesign => "Insecure Plugin Design",
            OwaspCategory::ExcessiveAgency => "Excessive Agency",
            OwaspCategory::Overreliance => "Overreliance",
            OwaspCategory::ModelTheft => "Model Theft",
            OwaspCategory::Unmapped => "Unmapped",
        }
    }
}

impl fmt::Display for OwaspCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Parses a configured tag. Case-insensitive; `unmapped` is rejected.
impl FromStr for OwaspCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.tag().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_tags() {
        assert_eq!("LLM01".parse::<OwaspCategory>(), Ok(OwaspCategory::PromptInjection));
        assert_eq!(" llm06 ".parse::<OwaspCategory>(), Ok(OwaspCategory::SensitiveInformationDisclosure));
        assert_eq!("LLM10".parse::<OwaspCategory>(), Ok(OwaspCategory::ModelTheft));
    }

    #[test]
    fn test_reject_unknown_and_reserved_tags() {
        assert!("LLM11".parse::<OwaspCategory>().is_err());
        assert!("LLM1".parse::<OwaspCategory>().is_err());
        assert!("unmapped".parse::<OwaspCategory>().is_err());
    }

    #[test]
    fn test_serializes_as_tag() {
        let json = serde_json::to_string(&OwaspCategory::Overreliance).unwrap();
        assert_eq!(json, "\"LLM09\"");
        let json = serde_json::to_string(&OwaspCategory::Unmapped).unwrap();
        assert_eq!(json, "\"unmapped\"");
    }
}
