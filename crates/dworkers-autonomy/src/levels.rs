use dworkers_core::AutonomyLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Checkpoint types that pause a semi-supervised worker.
pub const SEMI_SUPERVISED_CHECKPOINTS: [&str; 3] = ["phase_transition", "deliverable", "final_output"];

/// Whether a deliverable of `checkpoint_type` needs review at `level`.
pub fn should_checkpoint(level: AutonomyLevel, checkpoint_type: &str) -> bool {
    match level {
        AutonomyLevel::Manual => true,
        AutonomyLevel::Autonomous => false,
        AutonomyLevel::SemiSupervised => SEMI_SUPERVISED_CHECKPOINTS.contains(&checkpoint_type),
    }
}

/// An autonomy level together with the checkpoint types it reviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomyConfig {
    /// How much human review applies.
    #[serde(default)]
    pub level: AutonomyLevel,
    /// Checkpoint types reviewed under `semi_supervised`.
    #[serde(default = "default_checkpoint_types")]
    pub checkpoint_types: BTreeSet<String>,
}

fn default_checkpoint_types() -> BTreeSet<String> {
    SEMI_SUPERVISED_CHECKPOINTS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            level: AutonomyLevel::default(),
            checkpoint_types: default_checkpoint_types(),
        }
    }
}

impl AutonomyConfig {
    /// `level` with the default semi-supervised checkpoint types.
    pub fn new(level: AutonomyLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Like [`should_checkpoint`], but semi-supervised mode consults this
    /// config's own type set.
    pub fn should_checkpoint(&self, checkpoint_type: &str) -> bool {
        match self.level {
            AutonomyLevel::SemiSupervised => self.checkpoint_types.contains(checkpoint_type),
            level => should_checkpoint(level, checkpoint_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_always_checkpoints() {
        for ty in ["deliverable", "random_type", ""] {
            assert!(should_checkpoint(AutonomyLevel::Manual, ty));
        }
    }

    #[test]
    fn test_autonomous_never_checkpoints() {
        for ty in ["deliverable", "final_output", "random_type"] {
            assert!(!should_checkpoint(AutonomyLevel::Autonomous, ty));
        }
    }

    #[test]
    fn test_semi_supervised() {
        assert!(should_checkpoint(AutonomyLevel::SemiSupervised, "deliverable"));
        assert!(should_checkpoint(AutonomyLevel::SemiSupervised, "phase_transition"));
        assert!(should_checkpoint(AutonomyLevel::SemiSupervised, "final_output"));
        assert!(!should_checkpoint(AutonomyLevel::SemiSupervised, "random_type"));
    }

    #[test]
    fn test_config_custom_types() {
        let mut config = AutonomyConfig::default();
        assert!(config.should_checkpoint("deliverable"));
        config.checkpoint_types = ["budget".to_string()].into_iter().collect();
        assert!(config.should_checkpoint("budget"));
        assert!(!config.should_checkpoint("deliverable"));
        assert!(AutonomyConfig::new(AutonomyLevel::Manual).should_checkpoint("anything"));
    }
}
