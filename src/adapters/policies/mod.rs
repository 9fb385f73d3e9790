//! Reference decision policies.
//!
//! `PolicyKind` is the policy stored with a model. Each variant carries its
//! own parameters and implements exploration its own way.

pub mod epsilon_greedy;

pub use epsilon_greedy::{ArmStats, EpsilonGreedy};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::errors::DomainResult;
use crate::domain::models::ArmId;
use crate::domain::ports::{uniform_arm, DecisionPolicy, TrainingBatch};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyKind {
    EpsilonGreedy(EpsilonGreedy),
    /// Uniform choice; learns nothing.
    Random,
}

impl Default for PolicyKind {
    fn default() -> Self {
        Self::EpsilonGreedy(EpsilonGreedy::default())
    }
}

impl PolicyKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EpsilonGreedy(_) => "epsilon_greedy",
            Self::Random => "random",
        }
    }
}

impl DecisionPolicy for PolicyKind {
    fn fit(&mut self, arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()> {
        match self {
            Self::EpsilonGreedy(policy) => policy.fit(arms, batch),
            Self::Random => epsilon_greedy::check_shape(batch),
        }
    }

    fn partial_fit(&mut self, arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()> {
        match self {
            Self::EpsilonGreedy(policy) => policy.partial_fit(arms, batch),
            Self::Random => epsilon_greedy::check_shape(batch),
        }
    }

    fn choose(&self, arms: &[ArmId], context: &[f64]) -> DomainResult<ArmId> {
        match self {
            Self::EpsilonGreedy(policy) => policy.choose(arms, context),
            Self::Random => uniform_arm(arms),
        }
    }

    fn expected_rewards(&self, arms: &[ArmId], context: &[f64]) -> DomainResult<BTreeMap<ArmId, f64>> {
        match self {
            Self::EpsilonGreedy(policy) => policy.expected_rewards(arms, context),
            Self::Random => Ok(arms.iter().map(|arm| (*arm, 0.0)).collect()),
        }
    }
}
