//! Rolling activity trail of a model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key in an update bucket holding the summed reward.
pub const TOTAL_REWARD_KEY: &str = "total_reward";

/// Key in an update bucket holding the number of updates.
pub const UPDATE_COUNT_KEY: &str = "update_count";

/// Prefix of the per-decision counters in an update bucket.
pub const DECISION_KEY_PREFIX: &str = "decision_";

/// Time-bucketed prediction and update aggregates.
///
/// Buckets are keyed by their start as unix seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trail {
    /// bucket -> label -> number of predictions
    #[serde(default)]
    pub prediction_counts: BTreeMap<i64, BTreeMap<String, u64>>,
    /// bucket -> detail key -> summed value
    #[serde(default)]
    pub update_details: BTreeMap<i64, BTreeMap<String, f64>>,
}
