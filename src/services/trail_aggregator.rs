//! Time-bucketed rolling counters for predictions and reward updates.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::domain::models::trail::{DECISION_KEY_PREFIX, TOTAL_REWARD_KEY, UPDATE_COUNT_KEY};
use crate::domain::models::{Trail, TrailSettings};

/// Bucketing and retention rules applied to a model's trail.
#[derive(Debug, Clone, Copy)]
pub struct TrailAggregator {
    granularity_seconds: i64,
    window_seconds: i64,
}

impl TrailAggregator {
    pub fn new(settings: &TrailSettings) -> Self {
        Self {
            granularity_seconds: i64::from(settings.bucket_granularity_seconds.max(1)),
            window_seconds: i64::from(settings.window_minutes) * 60,
        }
    }

    /// Start of the bucket containing `at`, as unix seconds.
    pub fn bucket(&self, at: DateTime<Utc>) -> i64 {
        let seconds = at.timestamp();
        seconds - seconds.rem_euclid(self.granularity_seconds)
    }

    pub fn record_prediction(&self, trail: &mut Trail, label: &str, at: DateTime<Utc>) {
        let bucket = self.bucket(at);
        *trail
            .prediction_counts
            .entry(bucket)
            .or_default()
            .entry(label.to_string())
            .or_default() += 1;
        self.prune(trail, at);
    }

    pub fn record_update(&self, trail: &mut Trail, label: &str, reward: f64, at: DateTime<Utc>) {
        let details = trail.update_details.entry(self.bucket(at)).or_default();
        *details.entry(format!("{DECISION_KEY_PREFIX}{label}")).or_default() += 1.0;
        *details.entry(TOTAL_REWARD_KEY.to_string()).or_default() += reward;
        *details.entry(UPDATE_COUNT_KEY.to_string()).or_default() += 1.0;
        self.prune(trail, at);
    }

    /// Drop buckets that start before `now - window`. Returns how many went.
    pub fn prune(&self, trail: &mut Trail, now: DateTime<Utc>) -> usize {
        let cutoff = now.timestamp() - self.window_seconds;
        let before = trail.prediction_counts.len() + trail.update_details.len();

        // Both maps are ordered, so expired buckets form a prefix.
        trail.prediction_counts = trail.prediction_counts.split_off(&cutoff);
        trail.update_details = trail.update_details.split_off(&cutoff);

        before - trail.prediction_counts.len() - trail.update_details.len()
    }
}

/// Share of predictions per label across all live buckets.
///
/// Every label in `labels` is present; all are 0.0 when there is no data.
pub fn prediction_ratio<I>(trail: &Trail, labels: I) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = String>,
{
    let mut totals: BTreeMap<String, u64> = labels.into_iter().map(|label| (label, 0)).collect();
    for counts in trail.prediction_counts.values() {
        for (label, count) in counts {
            *totals.entry(label.clone()).or_default() += count;
        }
    }
    ratios(&totals)
}

/// Per-bucket prediction shares, oldest bucket first.
pub fn ratio_over_time<I>(trail: &Trail, labels: I) -> Vec<(i64, BTreeMap<String, f64>)>
where
    I: IntoIterator<Item = String>,
{
    let labels: Vec<String> = labels.into_iter().collect();
    trail
        .prediction_counts
        .iter()
        .map(|(bucket, counts)| {
            let mut totals: BTreeMap<String, u64> = labels.iter().map(|label| (label.clone(), 0)).collect();
            for (label, count) in counts {
                *totals.entry(label.clone()).or_default() += count;
            }
            (*bucket, ratios(&totals))
        })
        .collect()
}

fn ratios(totals: &BTreeMap<String, u64>) -> BTreeMap<String, f64> {
    let total: u64 = totals.values().sum();
    totals
        .iter()
        .map(|(label, count)| {
            let ratio = if total == 0 { 0.0 } else { *count as f64 / total as f64 };
            (label.clone(), ratio)
        })
        .collect()
}
