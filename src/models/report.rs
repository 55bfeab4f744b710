use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{OutcomeStatus, OwaspCategory, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Degraded,
    Fail,
}

impl Verdict {
    /// `fail` on any vulnerable status, `degraded` on any error/timeout,
    /// otherwise `pass`.
    pub fn from_statuses(statuses: impl IntoIterator<Item = OutcomeStatus>) -> Self {
        let mut verdict = Verdict::Pass;
        for status in statuses {
            match status {
                OutcomeStatus::Vulnerable => return Verdict::Fail,
                OutcomeStatus::Error | OutcomeStatus::Timeout => verdict = Verdict::Degraded,
                OutcomeStatus::Success => {}
            }
        }
        verdict
    }
}

/// A deduplicated, classified outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub endpoint_id: String,
    pub probe_id: String,
    pub category: OwaspCategory,
    pub severity: Severity,
    pub status: OutcomeStatus,
    pub evidence: String,
    pub latency_ms: u64,
    /// Total probe executions merged into this finding
    pub attempts: u32,
    /// Number of outcomes merged into this finding
    pub occurrences: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub total: usize,
    pub passed: usize,
    pub vulnerable: usize,
    pub errored: usize,
    pub timed_out: usize,
    pub verdict: Option<Verdict>,
}

/// Terminal artifact of a run, handed read-only to report emitters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub verdict: Verdict,
    /// Mean severity weight of vulnerable findings (0.0 - 1.0)
    pub risk_score: f32,
    pub tasks_planned: usize,
    pub findings: Vec<Finding>,
    pub counts_by_category: BTreeMap<OwaspCategory, usize>,
    pub counts_by_severity: BTreeMap<Severity, usize>,
    pub counts_by_endpoint: BTreeMap<String, usize>,
    pub endpoints: BTreeMap<String, EndpointSummary>,
    /// Probe ids the catalog could not resolve; they were not scheduled
    pub unresolved_probes: Vec<String>,
}

impl RunReport {
    /// Empty report created when a run starts.
    pub fn begin(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            ended_at: None,
            verdict: Verdict::Pass,
            risk_score: 0.0,
            tasks_planned: 0,
            findings: Vec::new(),
            counts_by_category: BTreeMap::new(),
            counts_by_severity: BTreeMap::new(),
            counts_by_endpoint: BTreeMap::new(),
            endpoints: BTreeMap::new(),
            unresolved_probes: Vec::new(),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn findings_with_status(&self, status: OutcomeStatus) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_policy() {
        use OutcomeStatus::*;
        assert_eq!(Verdict::from_statuses(Vec::new()), Verdict::Pass);
        assert_eq!(Verdict::from_statuses([Success, Success]), Verdict::Pass);
        assert_eq!(Verdict::from_statuses([Success, Timeout]), Verdict::Degraded);
        assert_eq!(Verdict::from_statuses([Error, Success]), Verdict::Degraded);
        assert_eq!(Verdict::from_statuses([Error, Vulnerable, Timeout]), Verdict::Fail);
    }

    #[test]
    fn test_report_serializes_category_keys_as_tags() {
        let mut report = RunReport::begin(Uuid::nil(), Utc::now());
        report
            .counts_by_category
            .insert(OwaspCategory::PromptInjection, 2);
        report.counts_by_severity.insert(Severity::High, 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["counts_by_category"]["LLM01"], 2);
        assert_eq!(json["counts_by_severity"]["high"], 2);
        assert_eq!(json["verdict"], "pass");
    }
}
