pub mod chat;
pub mod run;
pub mod tools;

use crate::config::GateConfig;
use shellgate_tools::{CatalogContext, ToolDispatcher, ToolRegistry, BUILTIN_TOOLS};
use std::sync::Arc;
use tracing::warn;

/// Discovers the built-in tools, optionally narrowed to `allowed`.
pub fn build_registry(ctx: &CatalogContext, allowed: Option<&[String]>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let report = registry.discover(BUILTIN_TOOLS, ctx);
    for (name, reason) in &report.failures {
        warn!("Tool {} unavailable: {}", name, reason);
    }

    if let Some(allowed) = allowed {
        for name in allowed {
            if registry.get(name).is_none() {
                warn!("Allowed tool {} is not a known tool", name);
            }
        }
        registry.restrict_to(allowed.iter().cloned());
    }
    registry
}

pub fn build_dispatcher(config: &GateConfig, registry: ToolRegistry) -> Arc<ToolDispatcher> {
    Arc::new(ToolDispatcher::new(Arc::new(registry), config.working_dir.clone()).with_dry_run(config.dry_run))
}
