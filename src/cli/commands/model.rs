//! Model lifecycle commands: create, list, show, details, rollout, delete.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::adapters::policies::{EpsilonGreedy, PolicyKind};
use crate::cli::output::{detail_view, list_table, output, render_list, truncate, CommandOutput};
use crate::cli::types::PolicyArg;
use crate::domain::models::trail::{TOTAL_REWARD_KEY, UPDATE_COUNT_KEY};
use crate::domain::models::{ArmId, ArmLabel, ArmRef};
use crate::services::{BanditService, ModelDetails, ModelSummary};

/// Parse `--arm` values. `ID=LABEL` sets the id; a bare `LABEL` takes its
/// position in the list. Numeric labels become integer labels.
pub fn parse_arms(specs: &[String]) -> Result<BTreeMap<ArmId, ArmLabel>> {
    let mut arms = BTreeMap::new();
    for (position, spec) in specs.iter().enumerate() {
        let (id, label) = match spec.split_once('=') {
            Some((id, label)) => {
                let id: ArmId = id
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid arm id in '{spec}'"))?;
                (id, label.trim())
            }
            None => (ArmId::try_from(position)?, spec.trim()),
        };
        if label.is_empty() {
            bail!("Arm '{spec}' has an empty label");
        }
        let label = label
            .parse::<i64>()
            .map_or_else(|_| ArmLabel::from(label), ArmLabel::Int);
        if arms.insert(id, label).is_some() {
            bail!("Arm id {id} is used more than once");
        }
    }
    Ok(arms)
}

pub fn build_policy(policy: PolicyArg, epsilon: Option<f64>) -> Result<PolicyKind> {
    match (policy, epsilon) {
        (PolicyArg::EpsilonGreedy, Some(epsilon)) => Ok(PolicyKind::EpsilonGreedy(EpsilonGreedy::new(epsilon)?)),
        (PolicyArg::EpsilonGreedy, None) => Ok(PolicyKind::default()),
        (PolicyArg::Random, None) => Ok(PolicyKind::Random),
        (PolicyArg::Random, Some(_)) => bail!("--epsilon only applies to the epsilon-greedy policy"),
    }
}

#[derive(Debug, Serialize)]
pub struct CreateOutput {
    pub id: String,
    pub name: String,
    pub policy: &'static str,
    pub arms: BTreeMap<ArmId, ArmLabel>,
}

impl CommandOutput for CreateOutput {
    fn to_human(&self) -> String {
        let arms: Vec<String> = self.arms.iter().map(|(id, label)| format!("{id}={label}")).collect();
        format!(
            "Created model '{}' ({})\n  policy: {}\n  arms:   {}",
            self.name,
            self.id,
            self.policy,
            arms.join(", ")
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ModelListOutput {
    pub models: Vec<ModelSummary>,
    pub total: usize,
}

impl CommandOutput for ModelListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "name", "arms", "state", "updates", "predictions", "version"]);
        for model in &self.models {
            table.add_row(vec![
                model.id.clone(),
                truncate(&model.name, 24),
                model.labels.len().to_string(),
                state(model),
                model.update_count.to_string(),
                model.prediction_count.to_string(),
                model.version.to_string(),
            ]);
        }
        render_list("model", &table, self.total)
    }
}

fn state(model: &ModelSummary) -> String {
    match (&model.global_override, model.trained) {
        (Some(label), _) => format!("rollout:{label}"),
        (None, true) => "trained".to_string(),
        (None, false) => "cold".to_string(),
    }
}

fn optional_time(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |at| at.to_rfc3339())
}

impl CommandOutput for ModelSummary {
    fn to_human(&self) -> String {
        let labels: Vec<String> = self.labels.iter().map(ToString::to_string).collect();
        let ratios: Vec<String> = self
            .prediction_ratio
            .iter()
            .map(|(label, ratio)| format!("{label}={ratio:.2}"))
            .collect();

        detail_view(
            &format!("Model: {}", self.name),
            &[
                ("id", self.id.clone()),
                ("arms", labels.join(", ")),
                ("state", state(self)),
                ("version", self.version.to_string()),
                ("created", self.created_at.to_rfc3339()),
                ("updates", self.update_count.to_string()),
                ("last update", optional_time(self.last_update_at)),
                ("predictions", self.prediction_count.to_string()),
                ("last prediction", optional_time(self.last_prediction_at)),
                ("prediction ratio", ratios.join(", ")),
                ("features", self.features.join(", ")),
            ],
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct DetailsOutput(pub ModelDetails);

impl CommandOutput for DetailsOutput {
    fn to_human(&self) -> String {
        let details = &self.0;
        let mut lines = vec![format!(
            "Exploitation ratio: {:.2}% ({} snapshots)",
            details.exploitation_ratio,
            details.exploitation_over_time.len()
        )];

        lines.push("\nPrediction ratio:".to_string());
        for (label, ratio) in &details.prediction_ratio {
            lines.push(format!("  {label:<20} {ratio:.2}"));
        }

        let mut table = list_table(&["bucket", "updates", "total reward"]);
        for bucket in &details.update_trail {
            let value = |key: &str| bucket.details.get(key).copied().unwrap_or_default();
            table.add_row(vec![
                bucket.bucket.to_rfc3339(),
                format!("{}", value(UPDATE_COUNT_KEY)),
                format!("{:.2}", value(TOTAL_REWARD_KEY)),
            ]);
        }
        lines.push(String::new());
        lines.push(render_list("update bucket", &table, details.update_trail.len()));

        if !details.feature_breakdown.is_empty() {
            lines.push("\nFeatures:".to_string());
            for (feature, breakdown) in &details.feature_breakdown {
                let buckets: Vec<String> = breakdown
                    .buckets
                    .iter()
                    .map(|bucket| format!("{} ({})", bucket.bucket, bucket.total))
                    .collect();
                lines.push(format!("  {feature} [{}]: {}", breakdown.feature_type.as_str(), buckets.join(", ")));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ActionOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput for ActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn create(
    service: &BanditService<PolicyKind>,
    name: &str,
    arm_specs: &[String],
    policy: PolicyArg,
    epsilon: Option<f64>,
    json_mode: bool,
) -> Result<()> {
    let arms = parse_arms(arm_specs)?;
    let policy = build_policy(policy, epsilon)?;
    let policy_name = policy.name();
    let id = service.create_model(name, arms.clone(), policy).await?;
    output(
        &CreateOutput {
            id,
            name: name.to_string(),
            policy: policy_name,
            arms,
        },
        json_mode,
    );
    Ok(())
}

pub async fn list(service: &BanditService<PolicyKind>, json_mode: bool) -> Result<()> {
    let models = service.list_models().await?;
    let total = models.len();
    output(&ModelListOutput { models, total }, json_mode);
    Ok(())
}

pub async fn show(service: &BanditService<PolicyKind>, model_id: &str, json_mode: bool) -> Result<()> {
    let model = service.get_model(model_id).await?;
    output(&ModelSummary::from(&model), json_mode);
    Ok(())
}

pub async fn details(service: &BanditService<PolicyKind>, model_id: &str, json_mode: bool) -> Result<()> {
    let details = service.model_details(model_id).await?;
    output(&DetailsOutput(details), json_mode);
    Ok(())
}

pub async fn rollout(service: &BanditService<PolicyKind>, model_id: &str, arm: &str, json_mode: bool) -> Result<()> {
    let arm = service.rollout(model_id, &ArmRef::parse(arm)).await?;
    output(
        &ActionOutput {
            success: true,
            message: format!("Model {model_id} now serves arm {arm} for every request"),
        },
        json_mode,
    );
    Ok(())
}

pub async fn clear_rollout(service: &BanditService<PolicyKind>, model_id: &str, json_mode: bool) -> Result<()> {
    service.clear_rollout(model_id).await?;
    output(
        &ActionOutput {
            success: true,
            message: format!("Model {model_id} is back under its decision policy"),
        },
        json_mode,
    );
    Ok(())
}

pub async fn delete(service: &BanditService<PolicyKind>, model_id: &str, json_mode: bool) -> Result<()> {
    let deleted = service.delete_model(model_id).await?;
    let message = if deleted {
        format!("Deleted model {model_id}")
    } else {
        format!("Model {model_id} did not exist")
    };
    output(&ActionOutput { success: deleted, message }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_arms_positional_and_explicit() {
        let arms = parse_arms(&specs(&["red", "5=blue", "7"])).unwrap();
        assert_eq!(
            arms,
            BTreeMap::from([(0, ArmLabel::from("red")), (5, ArmLabel::from("blue")), (2, ArmLabel::Int(7))])
        );
    }

    #[test]
    fn test_parse_arms_rejects_bad_specs() {
        assert!(parse_arms(&specs(&["x=red"])).is_err());
        assert!(parse_arms(&specs(&["1="])).is_err());
        assert!(parse_arms(&specs(&["red", "0=blue"])).is_err());
    }

    #[test]
    fn test_build_policy() {
        assert_eq!(build_policy(PolicyArg::Random, None).unwrap(), PolicyKind::Random);
        assert!(build_policy(PolicyArg::Random, Some(0.3)).is_err());
        assert!(build_policy(PolicyArg::EpsilonGreedy, Some(1.5)).is_err());
        assert_eq!(
            build_policy(PolicyArg::EpsilonGreedy, Some(0.3)).unwrap(),
            PolicyKind::EpsilonGreedy(EpsilonGreedy::new(0.3).unwrap())
        );
    }
}
