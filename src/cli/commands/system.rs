//! Health and configuration commands.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::adapters::policies::PolicyKind;
use crate::cli::output::{detail_view, output, CommandOutput};
use crate::domain::models::Config;
use crate::services::{BanditService, HealthReport};

impl CommandOutput for HealthReport {
    fn to_human(&self) -> String {
        detail_view(
            if self.store_healthy { "Store: healthy" } else { "Store: unreachable" },
            &[
                (
                    "stashed contexts",
                    self.context_keys.map_or_else(|| "unknown".to_string(), |n| n.to_string()),
                ),
                ("context ttl", format!("{}s", self.context_ttl_seconds)),
            ],
        )
    }
}

pub async fn health(service: &BanditService<PolicyKind>, json_mode: bool) -> Result<()> {
    let report = service.health().await;
    output(&report, json_mode);
    if !report.store_healthy {
        bail!("Shared store is unreachable");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigOutput<'a>(pub &'a Config);

impl CommandOutput for ConfigOutput<'_> {
    fn to_human(&self) -> String {
        serde_yaml::to_string(self.0).unwrap_or_default()
    }
}

pub fn show_config(config: &Config, json_mode: bool) {
    output(&ConfigOutput(config), json_mode);
}
