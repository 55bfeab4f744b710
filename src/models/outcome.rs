use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Evidence recorded for tasks cut off by the run deadline
pub const NOT_RUN_EVIDENCE: &str = "not run, deadline exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Vulnerable,
    Error,
    Timeout,
}

impl OutcomeStatus {
    /// Severity order used when merging: vulnerable > error > timeout > success.
    pub fn rank(self) -> u8 {
        match self {
            OutcomeStatus::Vulnerable => 3,
            OutcomeStatus::Error => 2,
            OutcomeStatus::Timeout => 1,
            OutcomeStatus::Success => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Vulnerable => "vulnerable",
            OutcomeStatus::Error => "error",
            OutcomeStatus::Timeout => "timeout",
        }
    }
}

/// Result of executing one probe task.
///
/// Built once and never mutated; `for_task` consumes the value and returns
/// a new one bound to the task's correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub correlation_id: Uuid,
    pub endpoint_id: String,
    pub probe_id: String,
    pub status: OutcomeStatus,
    pub evidence: String,
    pub latency_ms: u64,
    /// Number of executions behind this outcome (0 when never run)
    pub attempts: u32,
    pub first_attempt_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

impl Outcome {
    /// A single execution, not yet bound to a task.
    pub fn attempt(
        endpoint_id: impl Into<String>,
        probe_id: impl Into<String>,
        status: OutcomeStatus,
        evidence: impl Into<String>,
        latency: Duration,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            correlation_id: Uuid::nil(),
            endpoint_id: endpoint_id.into(),
            probe_id: probe_id.into(),
            status,
            evidence: evidence.into(),
            latency_ms: latency.as_millis() as u64,
            attempts: 1,
            first_attempt_at: at,
            recorded_at: at,
        }
    }

    /// Terminal outcome for a task that was never started.
    pub fn not_run(
        correlation_id: Uuid,
        endpoint_id: impl Into<String>,
        probe_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            correlation_id,
            endpoint_id: endpoint_id.into(),
            probe_id: probe_id.into(),
            status: OutcomeStatus::Timeout,
            evidence: NOT_RUN_EVIDENCE.to_string(),
            latency_ms: 0,
            attempts: 0,
            first_attempt_at: now,
            recorded_at: now,
        }
    }

    pub fn for_task(self, correlation_id: Uuid, attempts: u32, first_attempt_at: DateTime<Utc>) -> Self {
        Self {
            correlation_id,
            attempts,
            first_attempt_at: first_attempt_at.min(self.recorded_at),
            ..self
        }
    }

    pub fn was_run(&self) -> bool {
        self.attempts > 0
    }
}
