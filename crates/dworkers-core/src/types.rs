use crate::{DworkersError, DworkersResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Role of a digital worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    /// Analyzes processes, gathers requirements, produces recommendations.
    Analyst,
    /// Researches markets, competitors and best practices.
    Researcher,
    /// Works with datasets and quantitative evidence.
    DataAnalyst,
    /// Coordinates work and reviews deliverables.
    Manager,
}

impl WorkerRole {
    /// Every role, in declaration order.
    pub const ALL: [WorkerRole; 4] = [
        WorkerRole::Analyst,
        WorkerRole::Researcher,
        WorkerRole::DataAnalyst,
        WorkerRole::Manager,
    ];

    /// The snake_case name used in config files and URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Analyst => "analyst",
            WorkerRole::Researcher => "researcher",
            WorkerRole::DataAnalyst => "data_analyst",
            WorkerRole::Manager => "manager",
        }
    }
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerRole {
    type Err = DworkersError;

    fn from_str(s: &str) -> DworkersResult<Self> {
        match s.to_lowercase().as_str() {
            "analyst" => Ok(WorkerRole::Analyst),
            "researcher" => Ok(WorkerRole::Researcher),
            "data_analyst" => Ok(WorkerRole::DataAnalyst),
            "manager" => Ok(WorkerRole::Manager),
            other => Err(DworkersError::Config(format!("Unknown worker role '{other}'"))),
        }
    }
}

/// How often a worker pauses for review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    /// Every checkpoint requires review.
    Manual,
    /// Only phase transitions, deliverables and final outputs are reviewed.
    #[default]
    SemiSupervised,
    /// Never pause.
    Autonomous,
}

impl std::fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutonomyLevel::Manual => write!(f, "manual"),
            AutonomyLevel::SemiSupervised => write!(f, "semi_supervised"),
            AutonomyLevel::Autonomous => write!(f, "autonomous"),
        }
    }
}

impl FromStr for AutonomyLevel {
    type Err = DworkersError;

    fn from_str(s: &str) -> DworkersResult<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(AutonomyLevel::Manual),
            "semi_supervised" => Ok(AutonomyLevel::SemiSupervised),
            "autonomous" => Ok(AutonomyLevel::Autonomous),
            other => Err(DworkersError::Config(format!(
                "Unknown autonomy level '{other}'"
            ))),
        }
    }
}

/// How a pipeline reacts when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Skip every transitive dependent of the failed step; other branches continue.
    SkipDownstream,
    /// Fail the run; in-flight steps finish but nothing new is scheduled.
    #[default]
    FailPipeline,
    /// Treat the failed output as `null` and keep going.
    Ignore,
}

impl std::fmt::Display for FailureStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureStrategy::SkipDownstream => write!(f, "skip_downstream"),
            FailureStrategy::FailPipeline => write!(f, "fail_pipeline"),
            FailureStrategy::Ignore => write!(f, "ignore"),
        }
    }
}

impl FromStr for FailureStrategy {
    type Err = DworkersError;

    fn from_str(s: &str) -> DworkersResult<Self> {
        match s.to_lowercase().as_str() {
            "skip_downstream" => Ok(FailureStrategy::SkipDownstream),
            "fail_pipeline" => Ok(FailureStrategy::FailPipeline),
            "ignore" => Ok(FailureStrategy::Ignore),
            other => Err(DworkersError::Config(format!(
                "Unknown failure strategy '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display_and_parse() {
        for role in WorkerRole::ALL {
            assert_eq!(role.to_string().parse::<WorkerRole>().unwrap(), role);
        }
        assert_eq!(WorkerRole::DataAnalyst.to_string(), "data_analyst");
        assert!("coder".parse::<WorkerRole>().is_err());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&WorkerRole::DataAnalyst).unwrap();
        assert_eq!(json, "\"data_analyst\"");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(AutonomyLevel::default(), AutonomyLevel::SemiSupervised);
        assert_eq!(FailureStrategy::default(), FailureStrategy::FailPipeline);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "SKIP_DOWNSTREAM".parse::<FailureStrategy>().unwrap(),
            FailureStrategy::SkipDownstream
        );
        assert!("retry".parse::<FailureStrategy>().is_err());
    }
}
