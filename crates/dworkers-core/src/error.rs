/// Top-level error type for the dworkers platform.
///
/// Variants fall into the families callers care about: configuration
/// problems, lookups that failed closed (the `*NotFound` variants), plan graph
/// errors raised at compile time, and run-time step failures.
#[derive(Debug, thiserror::Error)]
pub enum DworkersError {
    /// Bad or missing tenant, plan or process configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// No tenant registered under the given id.
    #[error("Tenant '{0}' not registered")]
    TenantNotFound(String),

    /// No plan registered under the given name.
    #[error("Plan '{0}' not found")]
    PlanNotFound(String),

    /// No worker registered under the given name or role.
    #[error("Worker '{0}' not found")]
    WorkerNotFound(String),

    /// No checkpoint stored under the given id.
    #[error("Checkpoint '{0}' not found")]
    CheckpointNotFound(String),

    /// No stored run under the given id.
    #[error("Run '{0}' not found")]
    RunNotFound(String),

    /// No vertical registered under the given name.
    #[error("Vertical '{0}' not found")]
    VerticalNotFound(String),

    /// An operation was attempted on an object in the wrong state
    /// (e.g. resolving a checkpoint twice).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The plan's dependency graph contains a cycle.
    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    Cycle {
        /// Step ids along the cycle; the first id is repeated at the end.
        cycle: Vec<String>,
    },

    /// A step references a dependency that does not exist in the plan.
    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownStep {
        /// The step declaring the dependency.
        step: String,
        /// The missing dependency id.
        dependency: String,
    },

    /// A worker reported a failure while executing a step.
    #[error("Step '{step}' failed: {message}")]
    StepExecution {
        /// The failed step id.
        step: String,
        /// The worker's failure detail.
        message: String,
    },

    /// A reviewer rejected a step's deliverable.
    #[error("Checkpoint '{checkpoint_id}' rejected: {reason}")]
    CheckpointRejected {
        /// The rejected checkpoint, empty when the reviewer kept no record.
        checkpoint_id: String,
        /// Reviewer-supplied reason.
        reason: String,
    },

    /// The scheduler tried to exceed its concurrency bound. Never expected.
    #[error("Concurrency limit of {limit} exceeded")]
    ConcurrencyLimitExceeded {
        /// The configured bound.
        limit: usize,
    },

    /// The operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// An error raised by a worker or model backend outside a step.
    #[error("Worker error: {0}")]
    Worker(String),

    /// An error from the HTTP gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DworkersError {
    /// `true` for the lookup failures (`*NotFound`).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DworkersError::TenantNotFound(_)
                | DworkersError::PlanNotFound(_)
                | DworkersError::WorkerNotFound(_)
                | DworkersError::CheckpointNotFound(_)
                | DworkersError::RunNotFound(_)
                | DworkersError::VerticalNotFound(_)
        )
    }

    /// `true` for errors raised while compiling a plan graph.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            DworkersError::Cycle { .. } | DworkersError::UnknownStep { .. }
        )
    }
}

/// A convenience `Result` alias using [`DworkersError`].
pub type DworkersResult<T> = Result<T, DworkersError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = DworkersError::Cycle {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
        assert!(err.is_graph_error());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_family() {
        assert!(DworkersError::PlanNotFound("x".into()).is_not_found());
        assert!(DworkersError::CheckpointNotFound("x".into()).is_not_found());
        assert!(!DworkersError::InvalidState("x".into()).is_not_found());
    }
}
