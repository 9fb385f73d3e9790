//! Bandit model domain model.
//!
//! A bandit model is the unit of state: its arm set and labels, the learned
//! context schema, the fit lifecycle, the decision policy parameters and the
//! counters and trails used for monitoring. Every mutation of a model is a
//! load -> mutate -> store cycle under the model's distributed lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::context::{ContextSchema, RawContext};
use super::trail::Trail;
use crate::domain::errors::{DomainError, DomainResult};

/// Internal arm identifier.
pub type ArmId = i64;

/// User-facing label of an arm (string or integer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArmLabel {
    Int(i64),
    Text(String),
}

impl fmt::Display for ArmLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for ArmLabel {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ArmLabel {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ArmLabel {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// A caller's reference to an arm.
///
/// Text resolves through the label mapping; an integer is taken as an
/// internal arm id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArmRef {
    Id(ArmId),
    Label(String),
}

impl ArmRef {
    /// Parse a command-line style reference: integers become ids.
    pub fn parse(raw: &str) -> Self {
        raw.parse::<ArmId>()
            .map_or_else(|_| Self::Label(raw.to_string()), Self::Id)
    }
}

impl fmt::Display for ArmRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// One (decision, reward, encoded context) observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub decision: ArmId,
    pub reward: f64,
    pub context: Vec<f64>,
}

/// Fit lifecycle of a model.
///
/// `Cold` buffers observations until the batch-fit threshold; `Trained` is
/// terminal and every observation becomes an incremental fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FitState {
    Cold { buffer: Vec<Observation> },
    Trained,
}

impl Default for FitState {
    fn default() -> Self {
        Self::Cold { buffer: Vec::new() }
    }
}

impl FitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold { .. } => "cold",
            Self::Trained => "trained",
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self, Self::Trained)
    }

    /// Observations waiting for the first batch fit.
    pub fn buffered(&self) -> &[Observation] {
        match self {
            Self::Cold { buffer } => buffer,
            Self::Trained => &[],
        }
    }
}

/// Exploitation ratio sampled after a number of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExploitationSnapshot {
    /// Prediction count at the time of the snapshot
    pub predictions: u64,
    /// Exploitation ratio in percent
    pub ratio_percent: f64,
}

/// Request/usage counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCounters {
    pub update_count: u64,
    pub prediction_count: u64,
    pub last_update_at: Option<DateTime<Utc>>,
    pub last_prediction_at: Option<DateTime<Utc>>,
    pub exploitation_count: u64,
    #[serde(default)]
    pub exploitation_history: Vec<ExploitationSnapshot>,
}

/// A served prediction together with the raw context that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub context: RawContext,
    pub arm: ArmId,
    pub at: DateTime<Utc>,
}

/// The full mutable state of one bandit model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanditModel<P> {
    /// Stable model identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Ordered arm ids, fixed at creation
    pub arms: Vec<ArmId>,
    /// Arm id -> user-facing label, bijective, fixed at creation
    pub labels: BTreeMap<ArmId, ArmLabel>,
    /// Learned feature order and categorical encoders
    #[serde(default)]
    pub context_schema: ContextSchema,
    /// Cold accumulation or trained
    #[serde(default)]
    pub fit_state: FitState,
    /// Decision policy parameters
    pub policy: P,
    /// Arm returned for every recommendation while set
    pub global_override: Option<ArmId>,
    #[serde(default)]
    pub counters: ModelCounters,
    #[serde(default)]
    pub trail: Trail,
    /// Recent predictions with their raw contexts (bounded)
    #[serde(default)]
    pub feature_trail: Vec<PredictionRecord>,
    pub created_at: DateTime<Utc>,
    /// Version of the stored blob this state was read from or written as.
    /// Tracked by the store's counter, not serialized.
    #[serde(skip)]
    pub version: u64,
}

impl<P> BanditModel<P> {
    /// Create a model for the given arm labels.
    ///
    /// Arms are the sorted label keys; labels must be unique.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        labels: BTreeMap<ArmId, ArmLabel>,
        policy: P,
    ) -> DomainResult<Self> {
        if labels.is_empty() {
            return Err(DomainError::ValidationFailed(
                "a model needs at least one arm".to_string(),
            ));
        }

        let mut seen = Vec::with_capacity(labels.len());
        for label in labels.values() {
            if seen.contains(&label) {
                return Err(DomainError::DuplicateLabel(label.to_string()));
            }
            seen.push(label);
        }

        Ok(Self {
            id: id.into(),
            name: name.into(),
            arms: labels.keys().copied().collect(),
            labels,
            context_schema: ContextSchema::default(),
            fit_state: FitState::default(),
            policy,
            global_override: None,
            counters: ModelCounters::default(),
            trail: Trail::default(),
            feature_trail: Vec::new(),
            created_at: Utc::now(),
            version: 0,
        })
    }

    pub fn label_for_arm(&self, arm: ArmId) -> Option<&ArmLabel> {
        self.labels.get(&arm)
    }

    /// Trail/summary key for an arm: its label, or `unknown_variant_<id>`.
    pub fn label_key(&self, arm: ArmId) -> String {
        self.labels
            .get(&arm)
            .map_or_else(|| format!("unknown_variant_{arm}"), ToString::to_string)
    }

    /// Arm carrying a text label.
    pub fn arm_for_label(&self, label: &str) -> Option<ArmId> {
        self.labels
            .iter()
            .find(|(_, l)| matches!(l, ArmLabel::Text(text) if text == label))
            .map(|(arm, _)| *arm)
    }

    /// Resolve a caller reference to an arm of this model.
    pub fn resolve(&self, reference: &ArmRef) -> DomainResult<ArmId> {
        match reference {
            ArmRef::Label(label) => self
                .arm_for_label(label)
                .ok_or_else(|| DomainError::InvalidLabel(label.clone())),
            ArmRef::Id(id) if self.arms.contains(id) => Ok(*id),
            ArmRef::Id(id) => Err(DomainError::InvalidArm(*id)),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.fit_state.is_trained()
    }

    /// A model without a global override consults its policy.
    pub fn is_active(&self) -> bool {
        self.global_override.is_none()
    }

    pub fn rollout(&mut self, arm: ArmId) {
        self.global_override = Some(arm);
    }

    pub fn clear_rollout(&mut self) {
        self.global_override = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> BTreeMap<ArmId, ArmLabel> {
        BTreeMap::from([(0, ArmLabel::from("a")), (1, ArmLabel::from("b")), (5, ArmLabel::Int(50))])
    }

    #[test]
    fn test_new_model_sorts_arms() {
        let model = BanditModel::new("m1", "homepage", labels(), ()).unwrap();
        assert_eq!(model.arms, vec![0, 1, 5]);
        assert_eq!(model.fit_state, FitState::Cold { buffer: vec![] });
        assert!(model.is_active());
        assert_eq!(model.version, 0);
    }

    #[test]
    fn test_new_model_rejects_duplicate_labels() {
        let labels = BTreeMap::from([(0, ArmLabel::from("a")), (1, ArmLabel::from("a"))]);
        let err = BanditModel::new("m1", "dup", labels, ()).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateLabel(label) if label == "a"));
    }

    #[test]
    fn test_new_model_rejects_empty_arms() {
        let err = BanditModel::new("m1", "empty", BTreeMap::new(), ()).unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[test]
    fn test_resolve_references() {
        let model = BanditModel::new("m1", "homepage", labels(), ()).unwrap();
        assert_eq!(model.resolve(&ArmRef::Label("b".to_string())).unwrap(), 1);
        assert_eq!(model.resolve(&ArmRef::Id(5)).unwrap(), 5);
        assert!(matches!(
            model.resolve(&ArmRef::Label("zzz".to_string())),
            Err(DomainError::InvalidLabel(_))
        ));
        assert!(matches!(model.resolve(&ArmRef::Id(2)), Err(DomainError::InvalidArm(2))));
    }

    #[test]
    fn test_label_key_falls_back_for_unknown_arm() {
        let model = BanditModel::new("m1", "homepage", labels(), ()).unwrap();
        assert_eq!(model.label_key(5), "50");
        assert_eq!(model.label_key(9), "unknown_variant_9");
    }

    #[test]
    fn test_arm_ref_parse() {
        assert_eq!(ArmRef::parse("3"), ArmRef::Id(3));
        assert_eq!(ArmRef::parse("blue"), ArmRef::Label("blue".to_string()));
    }

    #[test]
    fn test_fit_state_serializes_with_tag() {
        let json = serde_json::to_value(FitState::Trained).unwrap();
        assert_eq!(json["state"], "trained");
        let cold: FitState = serde_json::from_str(r#"{"state":"cold","buffer":[]}"#).unwrap();
        assert_eq!(cold.buffered().len(), 0);
    }
}
