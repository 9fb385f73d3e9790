//! Recommend and update commands.

use anyhow::{Context, Result};
use std::path::Path;

use super::parse_context;
use crate::adapters::policies::PolicyKind;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::ArmRef;
use crate::services::{BanditService, RecommendRequest, Recommendation, UpdateRecord, UpdateSummary};

impl CommandOutput for Recommendation {
    fn to_human(&self) -> String {
        format!(
            "{} (arm {}, {})\nrequest id: {}",
            self.label,
            self.arm,
            self.source.as_str(),
            self.request_id
        )
    }
}

impl CommandOutput for UpdateSummary {
    fn to_human(&self) -> String {
        let mut message = format!(
            "Applied {} update(s), total reward {:.2}",
            self.processed, self.total_reward
        );
        if self.context_hits > 0 {
            message.push_str(&format!("\n  {} used a stashed context", self.context_hits));
        }
        if self.missing_context > 0 {
            message.push_str(&format!("\n  {} skipped for missing context", self.missing_context));
        }
        message
    }
}

pub async fn recommend(
    service: &BanditService<PolicyKind>,
    model_id: &str,
    context: Option<&str>,
    request_id: Option<String>,
    json_mode: bool,
) -> Result<()> {
    let request = RecommendRequest {
        context: parse_context(context)?,
        request_id,
    };
    let recommendation = service.recommend(model_id, request).await?;
    output(&recommendation, json_mode);
    Ok(())
}

/// Read a JSON array of updates.
pub fn read_updates(path: &Path) -> Result<Vec<UpdateRecord>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array of updates", path.display()))
}

pub struct UpdateArgs<'a> {
    pub decision: Option<&'a str>,
    pub reward: Option<f64>,
    pub context: Option<&'a str>,
    pub request_id: Option<String>,
    pub file: Option<&'a Path>,
}

pub async fn update(
    service: &BanditService<PolicyKind>,
    model_id: &str,
    args: UpdateArgs<'_>,
    json_mode: bool,
) -> Result<()> {
    let records = match (args.file, args.decision, args.reward) {
        (Some(path), _, _) => read_updates(path)?,
        (None, Some(decision), Some(reward)) => vec![UpdateRecord {
            decision: ArmRef::parse(decision),
            reward,
            context: parse_context(args.context)?,
            request_id: args.request_id,
        }],
        _ => anyhow::bail!("An update needs --decision and --reward, or --file"),
    };

    let summary = service.update_model(model_id, records).await?;
    output(&summary, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_updates_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"decision": "red", "reward": 1.0, "context": {{"device": "mobile"}}}},
               {{"decision": 2, "reward": -0.5, "request_id": "req-9"}}]"#
        )
        .unwrap();

        let updates = read_updates(file.path()).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].decision, ArmRef::Label("red".to_string()));
        assert_eq!(updates[1].decision, ArmRef::Id(2));
        assert!(updates[1].context.is_empty());
        assert_eq!(updates[1].request_id.as_deref(), Some("req-9"));
    }

    #[test]
    fn test_read_updates_rejects_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"decision": "red"}}"#).unwrap();
        assert!(read_updates(file.path()).is_err());
    }
}
