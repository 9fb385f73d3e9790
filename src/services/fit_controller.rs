//! Cold-accumulation to trained state machine.
//!
//! While cold, observations are buffered until `min_observations` is
//! reached and then fitted as one batch. Once trained, every observation is
//! a single-sample incremental fit. The controller also routes predictions
//! and keeps the exploitation bookkeeping.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::iter;
use tracing::{info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{ArmId, BanditModel, ExploitationSnapshot, FitSettings, FitState, Observation};
use crate::domain::ports::{uniform_arm, DecisionPolicy, TrainingBatch};

/// What an observation did to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitOutcome {
    /// Appended to the cold buffer
    Buffered { buffered: usize },
    /// Buffer reached the threshold and was fitted as one batch
    BatchFit { samples: usize },
    /// A buffer already at the threshold was fitted before this observation
    /// was applied incrementally
    DeferredFitThenPartial { samples: usize },
    /// Single-sample incremental fit
    PartialFit,
}

/// Why an arm was recommended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// Global rollout arm
    Override,
    /// Uniform random choice
    Exploration,
    /// Decision policy choice
    Policy,
}

impl RecommendationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Exploration => "exploration",
            Self::Policy => "policy",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FitController {
    min_observations: usize,
    snapshot_interval: u64,
}

impl FitController {
    pub fn new(settings: &FitSettings) -> Self {
        Self {
            min_observations: settings.min_observations.max(1),
            snapshot_interval: settings.exploitation_snapshot_interval.max(1),
        }
    }

    /// Feed one observation into the model.
    pub fn observe<P: DecisionPolicy>(
        &self,
        model: &mut BanditModel<P>,
        observation: Observation,
    ) -> DomainResult<FitOutcome> {
        let width = model.context_schema.width();

        let outcome = match &mut model.fit_state {
            FitState::Trained => {
                let batch = TrainingBatch::from_observations(iter::once(&observation), width);
                model.policy.partial_fit(&model.arms, &batch)?;
                FitOutcome::PartialFit
            }
            FitState::Cold { buffer } if buffer.len() >= self.min_observations => {
                let batch = TrainingBatch::from_observations(buffer.iter(), width);
                model.policy.fit(&model.arms, &batch)?;
                let single = TrainingBatch::from_observations(iter::once(&observation), width);
                model.policy.partial_fit(&model.arms, &single)?;
                FitOutcome::DeferredFitThenPartial { samples: batch.len() }
            }
            FitState::Cold { buffer } => {
                buffer.push(observation);
                if buffer.len() >= self.min_observations {
                    let batch = TrainingBatch::from_observations(buffer.iter(), width);
                    model.policy.fit(&model.arms, &batch)?;
                    FitOutcome::BatchFit { samples: batch.len() }
                } else {
                    FitOutcome::Buffered { buffered: buffer.len() }
                }
            }
        };

        match outcome {
            FitOutcome::BatchFit { samples } | FitOutcome::DeferredFitThenPartial { samples } => {
                info!(model_id = %model.id, samples, "initial batch fit complete, model trained");
                model.fit_state = FitState::Trained;
            }
            FitOutcome::Buffered { .. } | FitOutcome::PartialFit => {}
        }
        Ok(outcome)
    }

    /// Pick an arm for an encoded context.
    ///
    /// A rollout wins outright. Cold models choose uniformly at random;
    /// trained models ask the policy, falling back to random if it answers
    /// with an arm the model does not have.
    pub fn choose_arm<P: DecisionPolicy>(
        &self,
        model: &BanditModel<P>,
        context: &[f64],
    ) -> DomainResult<(ArmId, RecommendationSource)> {
        if let Some(arm) = model.global_override {
            return Ok((arm, RecommendationSource::Override));
        }
        if !model.is_trained() {
            return Ok((uniform_arm(&model.arms)?, RecommendationSource::Exploration));
        }

        let arm = model.policy.choose(&model.arms, context)?;
        if model.arms.contains(&arm) {
            Ok((arm, RecommendationSource::Policy))
        } else {
            warn!(model_id = %model.id, arm, "policy chose an unknown arm, falling back to random");
            Ok((uniform_arm(&model.arms)?, RecommendationSource::Exploration))
        }
    }

    /// Update exploitation counters after a served prediction.
    ///
    /// Call after `prediction_count` has been incremented. Does nothing for
    /// cold models or while a rollout is active.
    pub fn record_exploitation<P: DecisionPolicy>(
        &self,
        model: &mut BanditModel<P>,
        chosen: ArmId,
        context: &[f64],
    ) -> DomainResult<()> {
        if !model.is_trained() || !model.is_active() {
            return Ok(());
        }

        let expected = model.policy.expected_rewards(&model.arms, context)?;
        let best = expected
            .iter()
            .fold(None::<(ArmId, f64)>, |best, (arm, score)| match best {
                Some((_, top)) if top >= *score => best,
                _ => Some((*arm, *score)),
            })
            .map_or(chosen, |(arm, _)| arm);

        let counters = &mut model.counters;
        if chosen == best {
            counters.exploitation_count += 1;
        }
        if counters.prediction_count > 0 && counters.prediction_count % self.snapshot_interval == 0 {
            counters.exploitation_history.push(ExploitationSnapshot {
                predictions: counters.prediction_count,
                ratio_percent: 100.0 * counters.exploitation_count as f64 / counters.prediction_count as f64,
            });
        }
        Ok(())
    }

    /// Count a served prediction.
    pub fn record_prediction<P>(model: &mut BanditModel<P>) {
        model.counters.prediction_count += 1;
        model.counters.last_prediction_at = Some(Utc::now());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::models::ArmLabel;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    /// Policy that records how it was called and always prefers `favourite`.
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub(crate) struct RecordingPolicy {
        pub fit_batches: Vec<usize>,
        pub partial_batches: Vec<usize>,
        pub favourite: ArmId,
    }

    impl DecisionPolicy for RecordingPolicy {
        fn fit(&mut self, _arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()> {
            self.fit_batches.push(batch.len());
            Ok(())
        }

        fn partial_fit(&mut self, _arms: &[ArmId], batch: &TrainingBatch) -> DomainResult<()> {
            self.partial_batches.push(batch.len());
            Ok(())
        }

        fn choose(&self, _arms: &[ArmId], _context: &[f64]) -> DomainResult<ArmId> {
            Ok(self.favourite)
        }

        fn expected_rewards(&self, arms: &[ArmId], _context: &[f64]) -> DomainResult<BTreeMap<ArmId, f64>> {
            Ok(arms
                .iter()
                .map(|arm| (*arm, if *arm == self.favourite { 1.0 } else { 0.0 }))
                .collect())
        }
    }

    fn model() -> BanditModel<RecordingPolicy> {
        let labels = BTreeMap::from([(0, ArmLabel::from("a")), (1, ArmLabel::from("b"))]);
        BanditModel::new("m1", "test", labels, RecordingPolicy::default()).unwrap()
    }

    fn observation(decision: ArmId) -> Observation {
        Observation {
            decision,
            reward: 1.0,
            context: vec![],
        }
    }

    fn controller(min_observations: usize) -> FitController {
        FitController::new(&FitSettings {
            min_observations,
            exploitation_snapshot_interval: 2,
        })
    }

    #[test]
    fn test_batch_fit_at_threshold_then_partial_fit() {
        let fit = controller(5);
        let mut model = model();

        for expected in 1..5 {
            assert_eq!(
                fit.observe(&mut model, observation(0)).unwrap(),
                FitOutcome::Buffered { buffered: expected }
            );
        }
        assert_eq!(
            fit.observe(&mut model, observation(1)).unwrap(),
            FitOutcome::BatchFit { samples: 5 }
        );
        assert!(model.is_trained());
        assert!(model.fit_state.buffered().is_empty());

        assert_eq!(fit.observe(&mut model, observation(1)).unwrap(), FitOutcome::PartialFit);
        assert_eq!(model.policy.fit_batches, vec![5]);
        assert_eq!(model.policy.partial_batches, vec![1]);
    }

    #[test]
    fn test_deferred_fit_when_buffer_already_full() {
        let mut model = model();
        model.fit_state = FitState::Cold {
            buffer: vec![observation(0), observation(1), observation(0)],
        };

        let outcome = controller(2).observe(&mut model, observation(1)).unwrap();

        assert_eq!(outcome, FitOutcome::DeferredFitThenPartial { samples: 3 });
        assert!(model.is_trained());
        assert_eq!(model.policy.fit_batches, vec![3]);
        assert_eq!(model.policy.partial_batches, vec![1]);

        controller(2).observe(&mut model, observation(1)).unwrap();
        assert_eq!(model.policy.fit_batches, vec![3]);
    }

    #[test]
    fn test_cold_model_explores_and_rollout_wins() {
        let fit = controller(5);
        let mut model = model();

        let (arm, source) = fit.choose_arm(&model, &[]).unwrap();
        assert!(model.arms.contains(&arm));
        assert_eq!(source, RecommendationSource::Exploration);

        model.rollout(1);
        assert_eq!(fit.choose_arm(&model, &[]).unwrap(), (1, RecommendationSource::Override));
    }

    #[test]
    fn test_trained_model_uses_policy_and_falls_back_on_unknown_arm() {
        let fit = controller(1);
        let mut model = model();
        model.fit_state = FitState::Trained;
        model.policy.favourite = 1;
        assert_eq!(fit.choose_arm(&model, &[]).unwrap(), (1, RecommendationSource::Policy));

        model.policy.favourite = 9;
        let (arm, source) = fit.choose_arm(&model, &[]).unwrap();
        assert!(model.arms.contains(&arm));
        assert_eq!(source, RecommendationSource::Exploration);
    }

    #[test]
    fn test_exploitation_snapshots_every_interval() {
        let fit = controller(1);
        let mut model = model();
        model.fit_state = FitState::Trained;
        model.policy.favourite = 1;

        for chosen in [1, 0, 1, 1] {
            FitController::record_prediction(&mut model);
            fit.record_exploitation(&mut model, chosen, &[]).unwrap();
        }

        assert_eq!(model.counters.exploitation_count, 3);
        assert_eq!(
            model.counters.exploitation_history,
            vec![
                ExploitationSnapshot { predictions: 2, ratio_percent: 50.0 },
                ExploitationSnapshot { predictions: 4, ratio_percent: 75.0 },
            ]
        );
    }

    #[test]
    fn test_no_exploitation_bookkeeping_while_cold() {
        let fit = controller(5);
        let mut model = model();
        FitController::record_prediction(&mut model);
        fit.record_exploitation(&mut model, 0, &[]).unwrap();
        assert_eq!(model.counters.exploitation_count, 0);
        assert!(model.counters.exploitation_history.is_empty());
    }
}
