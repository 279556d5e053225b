use super::build_registry;
use anyhow::Result;
use shellgate_tools::CatalogContext;

/// Prints the function-calling declarations of every discovered tool.
pub fn run() -> Result<()> {
    let registry = build_registry(&CatalogContext::default(), None);
    let schemas = registry.schemas();
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}
