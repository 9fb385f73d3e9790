//! Context domain model.
//!
//! A context is the named-feature snapshot a caller sends with a
//! recommendation request or a reward update. The schema remembers how those
//! names and categorical values map onto a fixed numeric vector.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw caller-supplied context: feature name to JSON value.
pub type RawContext = BTreeMap<String, serde_json::Value>;

/// Learned encoding state of a model's contexts.
///
/// `feature_order` is empty until the first non-empty context and fixed
/// afterwards. Categorical ordinals are assigned once and never reused.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSchema {
    /// Ordered feature names, defining vector positions
    #[serde(default)]
    pub feature_order: Vec<String>,
    /// Feature name -> (observed string value -> ordinal)
    #[serde(default)]
    pub categorical_encoders: BTreeMap<String, BTreeMap<String, u32>>,
}

impl ContextSchema {
    /// Whether the feature order has been fixed by a first observation.
    pub fn is_seeded(&self) -> bool {
        !self.feature_order.is_empty()
    }

    /// Number of positions in an encoded vector.
    pub fn width(&self) -> usize {
        self.feature_order.len()
    }

    /// Ordinal already assigned to a categorical value, if any.
    pub fn ordinal(&self, feature: &str, value: &str) -> Option<u32> {
        self.categorical_encoders
            .get(feature)
            .and_then(|encoder| encoder.get(value))
            .copied()
    }
}
