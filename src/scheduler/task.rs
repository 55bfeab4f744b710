use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::catalog::Runnable;
use crate::models::{Endpoint, Outcome, OutcomeStatus, ProbeSpec};

/// One (endpoint, probe) pair scheduled for execution.
#[derive(Clone)]
pub struct ProbeTask {
    pub correlation_id: Uuid,
    pub endpoint: Arc<Endpoint>,
    pub spec: Arc<ProbeSpec>,
    pub runnable: Runnable,
}

impl ProbeTask {
    pub fn new(endpoint: Arc<Endpoint>, spec: Arc<ProbeSpec>, runnable: Runnable) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            endpoint,
            spec,
            runnable,
        }
    }

    pub fn not_run(&self) -> Outcome {
        Outcome::not_run(self.correlation_id, self.endpoint.id.clone(), self.spec.id.clone())
    }
}

impl std::fmt::Debug for ProbeTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeTask")
            .field("correlation_id", &self.correlation_id)
            .field("endpoint", &self.endpoint.id)
            .field("probe", &self.spec.id)
            .finish()
    }
}

// ============================================
// Retry Policy
// ============================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries for idempotent probes ending in `error`
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

/// Retries granted to an idempotent probe ending in `timeout`
pub const TIMEOUT_RETRIES: u32 = 1;

impl RetryPolicy {
    /// `base_delay * 2^retry`, capped at `max_delay`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

// ============================================
// Task State Machine
// ============================================
//
// Pending -> Running -> Done
//               |  ^
//               v  |
//             Backoff

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Pending,
    Running,
    Backoff,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Finish,
    Retry(Duration),
}

#[derive(Debug)]
pub struct TaskState {
    phase: TaskPhase,
    attempts: u32,
    error_retries: u32,
    timeout_retries: u32,
    first_attempt_at: Option<DateTime<Utc>>,
    last: Option<Outcome>,
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskState {
    pub fn new() -> Self {
        Self {
            phase: TaskPhase::Pending,
            attempts: 0,
            error_retries: 0,
            timeout_retries: 0,
            first_attempt_at: None,
            last: None,
        }
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn begin_attempt(&mut self) {
        self.phase = TaskPhase::Running;
    }

    /// Record the outcome of one attempt and decide what happens next.
    pub fn record(&mut self, outcome: Outcome, policy: &RetryPolicy, idempotent: bool) -> Transition {
        self.attempts += 1;
        if self.first_attempt_at.is_none() {
            self.first_attempt_at = Some(outcome.first_attempt_at);
        }

        let transition = match outcome.status {
            OutcomeStatus::Success | OutcomeStatus::Vulnerable => Transition::Finish,
            _ if !idempotent => Transition::Finish,
            OutcomeStatus::Error if self.error_retries < policy.max_retries => {
                let delay = policy.backoff(self.error_retries);
                self.error_retries += 1;
                Transition::Retry(delay)
            }
            OutcomeStatus::Timeout if self.timeout_retries < TIMEOUT_RETRIES => {
                self.timeout_retries += 1;
                Transition::Retry(policy.backoff(0))
            }
            OutcomeStatus::Error | OutcomeStatus::Timeout => Transition::Finish,
        };

        self.last = Some(outcome);
        self.phase = match transition {
            Transition::Finish => TaskPhase::Done,
            Transition::Retry(_) => TaskPhase::Backoff,
        };
        transition
    }

    /// Terminal outcome: the last attempt, or "not run" when nothing ran.
    pub fn into_outcome(self, task: &ProbeTask) -> Outcome {
        match (self.last, self.first_attempt_at) {
            (Some(last), Some(first)) => last.for_task(task.correlation_id, self.attempts, first),
            _ => task.not_run(),
        }
    }
}
