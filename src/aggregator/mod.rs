// Finding aggregator
//
// Pure fold from outcomes to a finalized report. Deterministic regardless of
// outcome order: findings are keyed and sorted by (endpoint id, probe id).

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use crate::models::{
    EndpointSummary, Finding, Outcome, OutcomeStatus, OwaspCategory, ProbeSpec, RunReport, Severity,
    Verdict,
};

pub struct Aggregator {
    classification: HashMap<String, (OwaspCategory, Severity)>,
}

impl Aggregator {
    pub fn new(specs: &[ProbeSpec]) -> Self {
        Self {
            classification: specs
                .iter()
                .map(|spec| (spec.id.clone(), (spec.category, spec.severity)))
                .collect(),
        }
    }

    /// Category and severity for a probe; probes without a spec land in
    /// `unmapped` at the default severity.
    pub fn classify(&self, probe_id: &str) -> (OwaspCategory, Severity) {
        self.classification
            .get(probe_id)
            .copied()
            .unwrap_or((OwaspCategory::Unmapped, Severity::default()))
    }

    /// Fold outcomes into `report`, replacing any findings and counts it
    /// already carries.
    pub fn finalize(&self, report: RunReport, outcomes: &[Outcome], ended_at: DateTime<Utc>) -> RunReport {
        let mut groups: BTreeMap<(&str, &str), Vec<&Outcome>> = BTreeMap::new();
        for outcome in outcomes {
            groups
                .entry((outcome.endpoint_id.as_str(), outcome.probe_id.as_str()))
                .or_default()
                .push(outcome);
        }

        let findings: Vec<Finding> = groups
            .into_values()
            .filter_map(|group| self.merge(&group))
            .collect();

        let mut counts_by_category = BTreeMap::new();
        let mut counts_by_severity = BTreeMap::new();
        let mut counts_by_endpoint = BTreeMap::new();
        let mut endpoints: BTreeMap<String, EndpointSummary> = BTreeMap::new();

        for finding in &findings {
            *counts_by_category.entry(finding.category).or_insert(0) += 1;
            *counts_by_severity.entry(finding.severity).or_insert(0) += 1;
            *counts_by_endpoint.entry(finding.endpoint_id.clone()).or_insert(0) += 1;

            let summary = endpoints.entry(finding.endpoint_id.clone()).or_default();
            summary.total += 1;
            match finding.status {
                OutcomeStatus::Success => summary.passed += 1,
                OutcomeStatus::Vulnerable => summary.vulnerable += 1,
                OutcomeStatus::Error => summary.errored += 1,
                OutcomeStatus::Timeout => summary.timed_out += 1,
            }
        }

        for (endpoint_id, summary) in endpoints.iter_mut() {
            summary.verdict = Some(Verdict::from_statuses(
                findings
                    .iter()
                    .filter(|f| &f.endpoint_id == endpoint_id)
                    .map(|f| f.status),
            ));
        }

        RunReport {
            ended_at: Some(ended_at),
            verdict: Verdict::from_statuses(findings.iter().map(|f| f.status)),
            risk_score: risk_score(&findings),
            findings,
            counts_by_category,
            counts_by_severity,
            counts_by_endpoint,
            endpoints,
            ..report
        }
    }

    /// Collapse all outcomes for one (endpoint, probe) key. The most severe
    /// status wins; ties go to the latest outcome.
    fn merge(&self, group: &[&Outcome]) -> Option<Finding> {
        let representative = group.iter().copied().max_by(|a, b| {
            (a.status.rank(), a.recorded_at, &a.evidence, a.latency_ms)
                .cmp(&(b.status.rank(), b.recorded_at, &b.evidence, b.latency_ms))
        })?;
        let (category, severity) = self.classify(&representative.probe_id);

        Some(Finding {
            endpoint_id: representative.endpoint_id.clone(),
            probe_id: representative.probe_id.clone(),
            category,
            severity,
            status: representative.status,
            evidence: representative.evidence.clone(),
            latency_ms: representative.latency_ms,
            attempts: group.iter().map(|o| o.attempts).sum(),
            occurrences: group.len() as u32,
            first_seen: group.iter().map(|o| o.first_attempt_at).min()?,
            last_seen: group.iter().map(|o| o.recorded_at).max()?,
        })
    }
}

/// Mean severity weight of vulnerable findings, capped at 1.0
fn risk_score(findings: &[Finding]) -> f32 {
    let weights: Vec<f32> = findings
        .iter()
        .filter(|f| f.status == OutcomeStatus::Vulnerable)
        .map(|f| f.severity.weight())
        .collect();

    if weights.is_empty() {
        return 0.0;
    }
    (weights.iter().sum::<f32>() / weights.len() as f32).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;
    use uuid::Uuid;

    fn specs() -> Vec<ProbeSpec> {
        vec![
            ProbeSpec::new("dan", OwaspCategory::PromptInjection, Severity::High),
            ProbeSpec::new("leakreplay", OwaspCategory::SensitiveInformationDisclosure, Severity::Medium),
        ]
    }

    fn outcome(endpoint: &str, probe: &str, status: OutcomeStatus, at: DateTime<Utc>) -> Outcome {
        Outcome::attempt(endpoint, probe, status, status.as_str(), Duration::from_millis(10), at)
    }

    fn finalize(outcomes: &[Outcome]) -> RunReport {
        let started = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let report = RunReport::begin(Uuid::nil(), started);
        Aggregator::new(&specs()).finalize(report, outcomes, started + ChronoDuration::seconds(60))
    }

    #[test]
    fn test_duplicates_keep_most_severe_status() {
        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_010, 0).unwrap();
        let t1 = t0 + ChronoDuration::seconds(5);
        let t2 = t0 + ChronoDuration::seconds(9);

        let report = finalize(&[
            outcome("ep1", "dan", OutcomeStatus::Timeout, t0),
            outcome("ep1", "dan", OutcomeStatus::Vulnerable, t1),
            outcome("ep1", "dan", OutcomeStatus::Error, t2),
        ]);

        assert_eq!(report.findings.len(), 1);
        let finding = &report.findings[0];
        assert_eq!(finding.status, OutcomeStatus::Vulnerable);
        assert_eq!(finding.evidence, "vulnerable");
        assert_eq!(finding.first_seen, t0);
        assert_eq!(finding.last_seen, t2);
        assert_eq!(finding.occurrences, 3);
        assert_eq!(finding.attempts, 3);
    }

    #[test]
    fn test_vulnerable_beats_success_and_error() {
        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_010, 0).unwrap();

        let report = finalize(&[
            outcome("ep1", "dan", OutcomeStatus::Success, t0),
            outcome("ep1", "dan", OutcomeStatus::Vulnerable, t0 + ChronoDuration::seconds(1)),
            outcome("ep1", "dan", OutcomeStatus::Error, t0 + ChronoDuration::seconds(2)),
        ]);

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].status, OutcomeStatus::Vulnerable);
        assert_eq!(report.verdict, Verdict::Fail);
    }

    #[test]
    fn test_result_is_independent_of_input_order() {
        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_010, 0).unwrap();
        let mut outcomes = vec![
            outcome("ep2", "dan", OutcomeStatus::Error, t0),
            outcome("ep1", "dan", OutcomeStatus::Success, t0),
            outcome("ep2", "dan", OutcomeStatus::Timeout, t0 + ChronoDuration::seconds(1)),
            outcome("ep1", "leakreplay", OutcomeStatus::Vulnerable, t0),
        ];
        let forward = finalize(&outcomes);
        outcomes.reverse();
        assert_eq!(finalize(&outcomes), forward);
        assert_eq!(forward.findings[0].endpoint_id, "ep1");
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let t0 = DateTime::<Utc>::from_timestamp(1_700_000_010, 0).unwrap();
        let outcomes = vec![
            outcome("ep1", "dan", OutcomeStatus::Vulnerable, t0),
            outcome("ep1", "leakreplay", OutcomeStatus::Success, t0),
            outcome("ep2", "dan", OutcomeStatus::Error, t0),
        ];
        let once = finalize(&outcomes);
        assert_eq!(finalize(&outcomes), once);

        let again = Aggregator::new(&specs()).finalize(once.clone(), &outcomes, once.ended_at.unwrap());
        assert_eq!(again, once);
    }

    #[test]
    fn test_unknown_probe_is_unmapped() {
        let report = finalize(&[outcome("ep1", "custom.Probe", OutcomeStatus::Vulnerable, Utc::now())]);
        assert_eq!(report.findings[0].category, OwaspCategory::Unmapped);
        assert_eq!(report.findings[0].severity, Severity::Medium);
        assert_eq!(report.counts_by_category[&OwaspCategory::Unmapped], 1);
    }

    #[test]
    fn test_verdicts_and_summaries() {
        let now = Utc::now();
        let report = finalize(&[
            outcome("ep1", "dan", OutcomeStatus::Success, now),
            outcome("ep1", "leakreplay", OutcomeStatus::Timeout, now),
            outcome("ep2", "dan", OutcomeStatus::Success, now),
        ]);
        assert_eq!(report.verdict, Verdict::Degraded);
        assert_eq!(report.endpoints["ep1"].verdict, Some(Verdict::Degraded));
        assert_eq!(report.endpoints["ep1"].timed_out, 1);
        assert_eq!(report.endpoints["ep2"].verdict, Some(Verdict::Pass));
        assert_eq!(report.counts_by_endpoint["ep1"], 2);
        assert_eq!(report.risk_score, 0.0);
        assert!(report.is_finalized());

        let empty = finalize(&[]);
        assert_eq!(empty.verdict, Verdict::Pass);
        assert!(empty.findings.is_empty());
    }

    #[test]
    fn test_risk_score_averages_vulnerable_weights() {
        let now = Utc::now();
        let report = finalize(&[
            outcome("ep1", "dan", OutcomeStatus::Vulnerable, now),
            outcome("ep1", "leakreplay", OutcomeStatus::Vulnerable, now),
            outcome("ep2", "dan", OutcomeStatus::Success, now),
        ]);
        assert_eq!(report.verdict, Verdict::Fail);
        assert!((report.risk_score - 0.625).abs() < f32::EPSILON);
        assert_eq!(report.counts_by_severity[&Severity::High], 2);
    }
}
