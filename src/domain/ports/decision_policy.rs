//! Decision policy port.
//!
//! The arm-selection algorithm and its reward model live behind this
//! capability. The state manager only decides *when* to call it and with
//! which data; the policy's parameters travel inside the model blob.

use rand::seq::SliceRandom;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ArmId, Observation};

/// A batch of training data: N decisions, N rewards and an N x F context matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingBatch {
    pub decisions: Vec<ArmId>,
    pub rewards: Vec<f64>,
    pub contexts: Vec<Vec<f64>>,
}

impl TrainingBatch {
    /// Build a batch whose context rows all have `width` columns.
    ///
    /// Rows recorded before the feature order was fixed are shorter; missing
    /// positions are filled with 0.0.
    pub fn from_observations<'a, I>(observations: I, width: usize) -> Self
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        let mut batch = Self::default();
        for observation in observations {
            let mut row = observation.context.clone();
            row.resize(width, 0.0);
            batch.decisions.push(observation.decision);
            batch.rewards.push(observation.reward);
            batch.contexts.push(row);
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Number of context columns (0 for an empty batch).
    pub fn width(&self) -> usize {
        self.contexts.first().map_or(0, Vec::len)
    }
}

/// Pick an arm uniformly at random.
pub fn uniform_arm(arms: &[ArmId]) -> DomainResult<ArmId> {
    arms.choose(&mut rand::thread_rng())
        .copied()
        .ok_or_else(|| DomainError::Policy("no arms to choose from".to_string()))
}

/// Pluggable arm-selection capability.
///
/// Implementations are plain data: they are cloned, serialized with the
/// model and may run on a blocking thread, hence the bounds.
pub trait DecisionPolicy: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Train from scratch on a full batch.
    fn fit(&mut self, arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()>;

    /// Incrementally train on new samples only.
    fn partial_fit(&mut self, arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()>;

    /// Pick an arm for an encoded context.
    fn choose(&self, arms: &[ArmId], context: &[f64]) -> DomainResult<ArmId>;

    /// Expected reward of every arm for an encoded context.
    fn expected_rewards(&self, arms: &[ArmId], context: &[f64]) -> DomainResult<BTreeMap<ArmId, f64>>;
}
