use dworkers_core::WorkerRole;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Coarse state of a role's workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Nothing running.
    Idle,
    /// At least one step in flight.
    Working,
    /// A deliverable is awaiting review.
    WaitingForReview,
    /// The last step failed.
    Error,
}

/// Counters kept per worker role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    /// Steps finished.
    pub steps_run: u32,
    /// Steps that failed.
    pub errors: u32,
    /// Total step time.
    pub duration_ms: u64,
}

/// Real-time snapshot of one role's workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    /// The role tracked.
    pub role: WorkerRole,
    /// Most recently started step still in flight.
    pub current_step: Option<String>,
    /// Steps in flight.
    pub active_steps: u32,
    /// Coarse state.
    pub status: WorkerStatus,
    /// Counters.
    pub metrics: WorkerMetrics,
}

/// Tracks state and metrics for every worker role across runs.
pub struct WorkerMonitor {
    states: Arc<RwLock<HashMap<WorkerRole, WorkerState>>>,
}

impl WorkerMonitor {
    /// A monitor with every role idle.
    pub fn new() -> Self {
        let states = WorkerRole::ALL
            .into_iter()
            .map(|role| {
                (
                    role,
                    WorkerState {
                        role,
                        current_step: None,
                        active_steps: 0,
                        status: WorkerStatus::Idle,
                        metrics: WorkerMetrics::default(),
                    },
                )
            })
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
        }
    }

    /// Mark a role as working on a step.
    pub async fn start_step(&self, role: WorkerRole, step_id: &str) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&role) {
            state.current_step = Some(step_id.to_string());
            state.active_steps += 1;
            state.status = WorkerStatus::Working;
        }
    }

    /// Record a finished step (any outcome) and its duration.
    pub async fn finish_step(&self, role: WorkerRole, duration_ms: u64) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&role) {
            state.active_steps = state.active_steps.saturating_sub(1);
            state.metrics.steps_run += 1;
            state.metrics.duration_ms += duration_ms;
            if state.active_steps == 0 {
                state.current_step = None;
                if state.status == WorkerStatus::Working {
                    state.status = WorkerStatus::Idle;
                }
            }
        }
    }

    /// Mark a role as blocked on a checkpoint review.
    pub async fn waiting_for_review(&self, role: WorkerRole) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&role) {
            state.status = WorkerStatus::WaitingForReview;
        }
    }

    /// Record a step failure for a role.
    pub async fn record_error(&self, role: WorkerRole) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&role) {
            state.metrics.errors += 1;
            state.status = WorkerStatus::Error;
        }
    }

    /// All role states, in role declaration order.
    pub async fn snapshot(&self) -> Vec<WorkerState> {
        let states = self.states.read().await;
        WorkerRole::ALL
            .iter()
            .filter_map(|role| states.get(role).cloned())
            .collect()
    }

    /// Snapshot for `role`.
    pub async fn get_state(&self, role: WorkerRole) -> Option<WorkerState> {
        let states = self.states.read().await;
        states.get(&role).cloned()
    }

    /// Metrics summed over every role.
    pub async fn aggregate_metrics(&self) -> WorkerMetrics {
        let states = self.states.read().await;
        let mut total = WorkerMetrics::default();
        for state in states.values() {
            total.steps_run += state.metrics.steps_run;
            total.errors += state.metrics.errors;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    /// Snapshot plus aggregate, as served by the gateway.
    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "workers": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for WorkerMonitor {
    fn default() -> Self {
        Self::new()
    }
}
