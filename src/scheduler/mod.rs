// Run scheduler
//
// Build phase: Cartesian product of enabled endpoints and the enabled probe
// specs each endpoint covers, resolved once per probe through the catalog.
// Execution phase: a fixed-width pool of tokio workers drains a shared queue.
// Every planned task yields exactly one terminal outcome.

mod rate_limit;
mod task;

pub use rate_limit::EndpointBuckets;
pub use task::{ProbeTask, RetryPolicy, TIMEOUT_RETRIES, TaskPhase, TaskState, Transition};

use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use uuid::Uuid;

use crate::catalog::{self, ProbeCatalog, Runnable};
use crate::config::{MAX_DEADLINE_SECS, ScanSettings};
use crate::error::ScanError;
use crate::models::{Endpoint, Outcome, OutcomeStatus, OwaspCategory, ProbeSpec};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Worker pool width
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Global wall-clock budget for one run
    pub deadline: Duration,
}

impl SchedulerConfig {
    pub fn from_settings(settings: &ScanSettings) -> Self {
        Self {
            workers: settings.workers.max(1),
            retry: RetryPolicy {
                max_retries: settings.max_retries,
                base_delay: Duration::from_millis(settings.retry_base_delay_ms),
                max_delay: Duration::from_millis(settings.retry_max_delay_ms),
            },
            deadline: settings.deadline(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_settings(&ScanSettings::default())
    }
}

/// Tasks ready to execute, plus the probe ids the catalog rejected.
#[derive(Debug, Default)]
pub struct RunPlan {
    pub tasks: Vec<ProbeTask>,
    pub unresolved_probes: Vec<String>,
}

impl RunPlan {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    catalog: Arc<dyn ProbeCatalog>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, catalog: Arc<dyn ProbeCatalog>) -> Self {
        Self { config, catalog }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ============================================
    // Build phase
    // ============================================

    /// Plan one task per (enabled endpoint, enabled probe in one of its
    /// categories), optionally narrowed to `category_filter`.
    ///
    /// Probes the catalog cannot resolve are reported in
    /// `unresolved_probes` and skipped. Fails with `EmptyRun` when nothing
    /// is left to execute.
    pub fn plan(
        &self,
        endpoints: &[Arc<Endpoint>],
        specs: &[ProbeSpec],
        category_filter: Option<&BTreeSet<OwaspCategory>>,
    ) -> Result<RunPlan, ScanError> {
        let endpoints: Vec<&Arc<Endpoint>> = endpoints.iter().filter(|e| e.enabled).collect();
        if endpoints.is_empty() {
            return Err(ScanError::EmptyRun("no enabled endpoints selected".to_string()));
        }

        let relevant = specs.iter().filter(|spec| {
            spec.enabled
                && category_filter.is_none_or(|filter| filter.contains(&spec.category))
                && endpoints.iter().any(|e| e.accepts(spec.category))
        });

        let mut plan = RunPlan::default();
        let mut resolved: Vec<(Arc<ProbeSpec>, Runnable)> = Vec::new();
        let mut seen = HashSet::new();

        for spec in relevant {
            if !seen.insert(spec.id.as_str()) {
                continue;
            }
            match self.catalog.resolve(&spec.id) {
                Ok(runnable) => resolved.push((Arc::new(spec.clone()), runnable)),
                Err(e) => {
                    tracing::warn!(probe = %spec.id, catalog = self.catalog.name(), error = %e, "Skipping unresolvable probe");
                    plan.unresolved_probes.push(spec.id.clone());
                }
            }
        }

        for &endpoint in &endpoints {
            for (spec, runnable) in &resolved {
                if endpoint.accepts(spec.category) {
                    plan.tasks.push(ProbeTask::new(
                        Arc::clone(endpoint),
                        Arc::clone(spec),
                        Arc::clone(runnable),
                    ));
                }
            }
        }

        if plan.is_empty() {
            let reason = if plan.unresolved_probes.is_empty() {
                "no enabled probe matches the selected endpoints and categories".to_string()
            } else {
                format!(
                    "no runnable probe left after resolution (unresolved: {})",
                    plan.unresolved_probes.join(", ")
                )
            };
            return Err(ScanError::EmptyRun(reason));
        }

        Ok(plan)
    }

    // ============================================
    // Execution phase
    // ============================================

    /// Execute every planned task and return one outcome per task.
    ///
    /// Once the deadline passes no new task or retry is started; tasks never
    /// started come back as `timeout` with "not run" evidence.
    pub async fn execute(&self, run_id: Uuid, plan: RunPlan) -> Vec<Outcome> {
        let planned: Vec<(Uuid, String, String)> = plan
            .tasks
            .iter()
            .map(|t| (t.correlation_id, t.endpoint.id.clone(), t.spec.id.clone()))
            .collect();
        if planned.is_empty() {
            return Vec::new();
        }

        // Clamped to one week so adding it to `now` cannot overflow.
        let budget = self.config.deadline.min(Duration::from_secs_f64(MAX_DEADLINE_SECS));
        let deadline = Instant::now() + budget;
        let buckets = Arc::new(EndpointBuckets::for_endpoints(
            plan.tasks.iter().map(|t| t.endpoint.as_ref()),
        ));
        let width = self.config.workers.clamp(1, planned.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(plan.tasks)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        tracing::info!(
            %run_id,
            tasks = planned.len(),
            workers = width,
            deadline_secs = self.config.deadline.as_secs_f64(),
            "Starting probe run"
        );

        let mut workers = JoinSet::new();
        for index in 0..width {
            let worker = Worker {
                index,
                run_id,
                queue: Arc::clone(&queue),
                buckets: Arc::clone(&buckets),
                outcomes: tx.clone(),
                retry: self.config.retry,
                deadline,
            };
            workers.spawn(worker.run());
        }
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(%run_id, error = %e, "Scan worker aborted");
            }
        }

        let mut outcomes = Vec::with_capacity(planned.len());
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }

        // A worker that died mid-task leaves its task without an outcome.
        let recorded: HashSet<Uuid> = outcomes.iter().map(|o| o.correlation_id).collect();
        for (correlation_id, endpoint_id, probe_id) in planned {
            if !recorded.contains(&correlation_id) {
                let now = Utc::now();
                let lost = Outcome::attempt(
                    endpoint_id,
                    probe_id,
                    OutcomeStatus::Error,
                    "scan worker aborted before recording an outcome",
                    Duration::ZERO,
                    now,
                );
                outcomes.push(lost.for_task(correlation_id, 0, now));
            }
        }

        let mut by_status: HashMap<&'static str, usize> = HashMap::new();
        for outcome in &outcomes {
            *by_status.entry(outcome.status.as_str()).or_default() += 1;
        }
        tracing::info!(%run_id, outcomes = outcomes.len(), ?by_status, "Probe run finished");

        outcomes
    }
}

// ============================================
// Worker
// ============================================

struct Worker {
    index: usize,
    run_id: Uuid,
    queue: Arc<Mutex<VecDeque<ProbeTask>>>,
    buckets: Arc<EndpointBuckets>,
    outcomes: mpsc::UnboundedSender<Outcome>,
    retry: RetryPolicy,
    deadline: Instant,
}

impl Worker {
    async fn run(self) {
        loop {
            let Some(task) = self.queue.lock().await.pop_front() else {
                break;
            };

            let outcome = if Instant::now() >= self.deadline {
                task.not_run()
            } else {
                self.drive(&task).await
            };

            tracing::debug!(
                run_id = %self.run_id,
                worker = self.index,
                endpoint = %outcome.endpoint_id,
                probe = %outcome.probe_id,
                status = outcome.status.as_str(),
                attempts = outcome.attempts,
                latency_ms = outcome.latency_ms,
                "Task finished"
            );

            if self.outcomes.send(outcome).is_err() {
                tracing::error!(run_id = %self.run_id, "Outcome channel closed");
                break;
            }
        }
    }

    /// Run one task through its retry state machine.
    async fn drive(&self, task: &ProbeTask) -> Outcome {
        let endpoint = task.endpoint.as_ref();
        let mut state = TaskState::new();

        loop {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            state.begin_attempt();
            let wait = endpoint.timeout.min(remaining);
            let waited_from = Utc::now();

            let outcome = if self.buckets.acquire(&endpoint.id, wait).await {
                catalog::run(&task.runnable, endpoint, endpoint.timeout).await
            } else if state.attempts() == 0 && Instant::now() >= self.deadline {
                break;
            } else {
                Outcome::attempt(
                    endpoint.id.clone(),
                    task.spec.id.clone(),
                    OutcomeStatus::Timeout,
                    format!(
                        "no rate-limit token for endpoint within {:.1}s",
                        wait.as_secs_f64()
                    ),
                    wait,
                    waited_from,
                )
            };

            match state.record(outcome, &self.retry, task.spec.idempotent) {
                Transition::Finish => break,
                Transition::Retry(delay) => {
                    let delay = delay.min(endpoint.timeout);
                    let remaining = self.deadline.saturating_duration_since(Instant::now());
                    if delay >= remaining {
                        break;
                    }
                    tracing::debug!(
                        run_id = %self.run_id,
                        endpoint = %endpoint.id,
                        probe = %task.spec.id,
                        attempt = state.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "Retrying probe"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        state.into_outcome(task)
    }
}
