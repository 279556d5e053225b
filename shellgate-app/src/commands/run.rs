use super::{build_dispatcher, build_registry};
use crate::config::GateConfig;
use anyhow::{Context, Result};
use serde_json::Value;

/// Dispatches one tool call locally, without the chat gate. Returns whether
/// the tool reported success.
pub async fn run(config: &GateConfig, tool: &str, args: Option<&str>) -> Result<bool> {
    config.validate_working_dir()?;

    let args = match args {
        Some(raw) => serde_json::from_str(raw).context("Arguments must be a JSON object")?,
        None => Value::Null,
    };

    let dispatcher = build_dispatcher(config, build_registry(&config.catalog_context(), None));
    let result = dispatcher.execute(tool, args).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.ok())
}
