//! Read-only summaries of a model for dashboards and the CLI.

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::trail_aggregator::{prediction_ratio, ratio_over_time};
use crate::domain::models::{ArmId, BanditModel, PredictionRecord};

/// Numeric features with more distinct values than this are binned.
const MAX_EXACT_NUMERIC_VALUES: usize = 5;

/// Number of equal-width bins for numeric features.
const NUMERIC_BIN_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCounts {
    pub bucket: DateTime<Utc>,
    pub counts: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketDetails {
    pub bucket: DateTime<Utc>,
    pub details: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketRatios {
    pub bucket: DateTime<Utc>,
    pub ratios: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExploitationPoint {
    pub n: u64,
    pub exploitation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Bool,
    Numeric,
    Categorical,
}

impl FeatureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Numeric => "numeric",
            Self::Categorical => "categorical",
        }
    }
}

/// Predictions served for one feature value (or value range).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureBucket {
    pub bucket: String,
    pub total: u64,
    pub predictions: BTreeMap<String, u64>,
    /// Percent of `total` per label
    pub ratios: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureBreakdown {
    #[serde(rename = "type")]
    pub feature_type: FeatureType,
    pub buckets: Vec<FeatureBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDetails {
    pub request_trail: Vec<BucketCounts>,
    pub update_trail: Vec<BucketDetails>,
    pub prediction_ratio: BTreeMap<String, f64>,
    pub prediction_ratio_over_time: Vec<BucketRatios>,
    pub exploitation_ratio: f64,
    pub exploitation_over_time: Vec<ExploitationPoint>,
    pub feature_breakdown: BTreeMap<String, FeatureBreakdown>,
}

fn bucket_time(bucket: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(bucket, 0).single().unwrap_or_default()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn labels<P>(model: &BanditModel<P>) -> Vec<String> {
    model.labels.values().map(ToString::to_string).collect()
}

pub fn model_details<P>(model: &BanditModel<P>) -> ModelDetails {
    let trail = &model.trail;

    let request_trail = trail
        .prediction_counts
        .iter()
        .map(|(bucket, counts)| BucketCounts {
            bucket: bucket_time(*bucket),
            counts: counts.clone(),
        })
        .collect();

    let update_trail = trail
        .update_details
        .iter()
        .map(|(bucket, details)| BucketDetails {
            bucket: bucket_time(*bucket),
            details: details.clone(),
        })
        .collect();

    let prediction_ratio_over_time = ratio_over_time(trail, labels(model))
        .into_iter()
        .map(|(bucket, ratios)| BucketRatios {
            bucket: bucket_time(bucket),
            ratios,
        })
        .collect();

    let history = &model.counters.exploitation_history;
    let exploitation_ratio = history.last().map_or(0.0, |snapshot| round2(snapshot.ratio_percent));
    let exploitation_over_time = if history.is_empty() {
        vec![ExploitationPoint { n: 0, exploitation: 0.0 }]
    } else {
        history
            .iter()
            .map(|snapshot| ExploitationPoint {
                n: snapshot.predictions,
                exploitation: round2(snapshot.ratio_percent),
            })
            .collect()
    };

    ModelDetails {
        request_trail,
        update_trail,
        prediction_ratio: prediction_ratio(trail, labels(model)),
        prediction_ratio_over_time,
        exploitation_ratio,
        exploitation_over_time,
        feature_breakdown: feature_breakdown(model),
    }
}

/// Recorded predictions grouped by the value of each known feature.
pub fn feature_breakdown<P>(model: &BanditModel<P>) -> BTreeMap<String, FeatureBreakdown> {
    let mut result = BTreeMap::new();
    for feature in &model.context_schema.feature_order {
        let entries: Vec<(&Value, ArmId)> = model
            .feature_trail
            .iter()
            .filter_map(|PredictionRecord { context, arm, .. }| context.get(feature).map(|value| (value, *arm)))
            .collect();
        if entries.is_empty() {
            continue;
        }

        let feature_type = classify(&entries);
        let grouped = match feature_type {
            FeatureType::Numeric => group_numeric(&entries),
            FeatureType::Bool | FeatureType::Categorical => group_distinct(&entries),
        };

        let buckets = grouped
            .into_iter()
            .map(|(bucket, arms)| summarize(model, bucket, &arms))
            .collect();
        result.insert(feature.clone(), FeatureBreakdown { feature_type, buckets });
    }
    result
}

fn classify(entries: &[(&Value, ArmId)]) -> FeatureType {
    match entries.first() {
        Some((Value::Bool(_), _)) => FeatureType::Bool,
        Some((Value::Number(_), _)) if entries.iter().all(|(value, _)| value.is_number()) => FeatureType::Numeric,
        _ => FeatureType::Categorical,
    }
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.as_f64().map_or_else(|| number.to_string(), |n| n.to_string()),
        other => other.to_string(),
    }
}

/// Buckets keyed by label, sorted by label.
fn group_distinct(entries: &[(&Value, ArmId)]) -> Vec<(String, Vec<ArmId>)> {
    let mut groups: BTreeMap<String, Vec<ArmId>> = BTreeMap::new();
    for (value, arm) in entries {
        groups.entry(value_label(value)).or_default().push(*arm);
    }
    groups.into_iter().collect()
}

/// Exact values when there are few, otherwise equal-width bins; ascending.
fn group_numeric(entries: &[(&Value, ArmId)]) -> Vec<(String, Vec<ArmId>)> {
    let values: Vec<(f64, ArmId)> = entries
        .iter()
        .filter_map(|(value, arm)| value.as_f64().map(|n| (n, *arm)))
        .collect();

    let mut distinct: Vec<f64> = values.iter().map(|(n, _)| *n).collect();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();

    let min = distinct.first().copied().unwrap_or_default();
    let max = distinct.last().copied().unwrap_or_default();

    // (sort key, label) -> arms
    let mut groups: Vec<(f64, String, Vec<ArmId>)> = Vec::new();
    let mut push = |key: f64, label: String, arm: ArmId| {
        match groups.iter_mut().find(|(_, existing, _)| *existing == label) {
            Some((_, _, arms)) => arms.push(arm),
            None => groups.push((key, label, vec![arm])),
        }
    };

    if distinct.len() <= MAX_EXACT_NUMERIC_VALUES || min == max {
        for (value, arm) in &values {
            push(*value, value.to_string(), *arm);
        }
    } else {
        let width = (max - min) / NUMERIC_BIN_COUNT as f64;
        for (value, arm) in &values {
            let index = (((value - min) / width) as usize).min(NUMERIC_BIN_COUNT - 1);
            let low = min + index as f64 * width;
            let high = min + (index + 1) as f64 * width;
            push(low, format!("{low:.2}-{high:.2}"), *arm);
        }
    }

    groups.sort_by(|a, b| a.0.total_cmp(&b.0));
    groups.into_iter().map(|(_, label, arms)| (label, arms)).collect()
}

fn summarize<P>(model: &BanditModel<P>, bucket: String, arms: &[ArmId]) -> FeatureBucket {
    let total = arms.len() as u64;
    let mut predictions: BTreeMap<String, u64> = BTreeMap::new();
    for arm in arms {
        *predictions.entry(model.label_key(*arm)).or_default() += 1;
    }
    let ratios = predictions
        .iter()
        .map(|(label, count)| (label.clone(), *count as f64 / total as f64 * 100.0))
        .collect();
    FeatureBucket {
        bucket,
        total,
        predictions,
        ratios,
    }
}
