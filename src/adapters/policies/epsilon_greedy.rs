//! Epsilon-greedy reference policy.
//!
//! Keeps a running mean reward per arm and ignores the context vector. With
//! probability `epsilon` it explores a uniformly random arm, otherwise it
//! exploits the arm with the highest mean.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ArmId;
use crate::domain::ports::{uniform_arm, DecisionPolicy, TrainingBatch};

/// Running reward statistics of one arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmStats {
    pub arm: ArmId,
    pub pulls: u64,
    pub mean_reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpsilonGreedy {
    /// Exploration probability in [0, 1]
    pub epsilon: f64,
    #[serde(default)]
    pub arm_stats: Vec<ArmStats>,
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self {
            epsilon: 0.1,
            arm_stats: Vec::new(),
        }
    }
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64) -> DomainResult<Self> {
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(DomainError::ValidationFailed(format!(
                "epsilon must be within [0, 1], got {epsilon}"
            )));
        }
        Ok(Self {
            epsilon,
            arm_stats: Vec::new(),
        })
    }

    fn mean(&self, arm: ArmId) -> f64 {
        self.arm_stats
            .iter()
            .find(|stats| stats.arm == arm)
            .map_or(0.0, |stats| stats.mean_reward)
    }

    fn learn(&mut self, arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()> {
        check_shape(batch)?;
        for (decision, reward) in batch.decisions.iter().zip(&batch.rewards) {
            if !arms.contains(decision) {
                return Err(DomainError::Policy(format!("decision {decision} is not an arm")));
            }
            match self.arm_stats.iter_mut().find(|stats| stats.arm == *decision) {
                Some(stats) => {
                    stats.pulls += 1;
                    stats.mean_reward += (reward - stats.mean_reward) / stats.pulls as f64;
                }
                None => self.arm_stats.push(ArmStats {
                    arm: *decision,
                    pulls: 1,
                    mean_reward: *reward,
                }),
            }
        }
        Ok(())
    }

    fn best_arm(&self, arms: &[ArmId]) -> Option<ArmId> {
        // Ties go to the lowest arm id.
        arms.iter().copied().fold(None, |best, arm| match best {
            Some(current) if self.mean(current) >= self.mean(arm) => Some(current),
            _ => Some(arm),
        })
    }
}

pub(super) fn check_shape(batch: &TrainingBatch) -> DomainResult<()> {
    if batch.rewards.len() != batch.len() || batch.contexts.len() != batch.len() {
        return Err(DomainError::Policy(format!(
            "batch shape mismatch: {} decisions, {} rewards, {} contexts",
            batch.len(),
            batch.rewards.len(),
            batch.contexts.len()
        )));
    }
    Ok(())
}

impl DecisionPolicy for EpsilonGreedy {
    fn fit(&mut self, arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()> {
        self.arm_stats.clear();
        self.learn(arms, batch)
    }

    fn partial_fit(&mut self, arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()> {
        self.learn(arms, batch)
    }

    fn choose(&self, arms: &[ArmId], _context: &[f64]) -> DomainResult<ArmId> {
        if rand::thread_rng().gen::<f64>() < self.epsilon {
            return uniform_arm(arms);
        }
        self.best_arm(arms)
            .ok_or_else(|| DomainError::Policy("no arms to choose from".to_string()))
    }

    fn expected_rewards(&self, arms: &[ArmId], _context: &[f64]) -> DomainResult<BTreeMap<ArmId, f64>> {
        Ok(arms.iter().map(|arm| (*arm, self.mean(*arm))).collect())
    }
}
