//! CLI command implementations.

pub mod decision;
pub mod model;
pub mod system;

use anyhow::{bail, Context, Result};

use crate::domain::models::RawContext;

/// Parse a `--context` argument. Absent means an empty context.
pub fn parse_context(raw: Option<&str>) -> Result<RawContext> {
    let Some(raw) = raw else {
        return Ok(RawContext::new());
    };
    let value: serde_json::Value = serde_json::from_str(raw).context("Context is not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        other => bail!("Context must be a JSON object, got {other}"),
    }
}
