use crate::catalog::{BuiltinTool, CatalogContext};
use crate::descriptor::ToolDescriptor;
use crate::tools::ToolHandler;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A descriptor together with the handler that executes it.
#[derive(Clone)]
pub struct ToolEntry {
    pub descriptor: Arc<ToolDescriptor>,
    pub handler: Arc<dyn ToolHandler>,
}

/// Outcome of [`ToolRegistry::discover`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Tools in the registry after discovery.
    pub registered: usize,
    /// Catalogue entries that failed to construct, with the reason.
    pub failures: Vec<(String, String)>,
}

pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
    allowlist: Option<HashSet<String>>,
    discovered: bool,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            allowlist: None,
            discovered: false,
        }
    }

    /// Stores a tool under its descriptor name. An existing tool with the
    /// same name is replaced.
    pub fn register(&mut self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> &mut Self {
        let name = descriptor.name.to_string();

        if let Some(allowlist) = &self.allowlist {
            if !allowlist.contains(&name) {
                warn!("Tool '{}' is outside the active allowlist, not registering", name);
                return self;
            }
        }
        if self.tools.contains_key(&name) {
            warn!("Tool '{}' is already registered, overwriting", name);
        }

        debug!("Registered tool: {}", name);
        self.tools.insert(
            name,
            ToolEntry {
                descriptor: Arc::new(descriptor),
                handler,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.tools.get(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|entry| entry.descriptor.as_ref())
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Drops every tool whose name is not in `allowed` and returns how many
    /// were removed. The restriction sticks: later registrations outside
    /// the allowlist are refused, and a second call can only narrow it.
    pub fn restrict_to<I, S>(&mut self, allowed: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed: HashSet<String> = allowed.into_iter().map(Into::into).collect();
        if let Some(previous) = &self.allowlist {
            allowed.retain(|name| previous.contains(name));
        }

        let before = self.tools.len();
        self.tools.retain(|name, _| allowed.contains(name));
        let removed = before - self.tools.len();

        self.allowlist = Some(allowed);
        if removed > 0 {
            info!("Tool allowlist active ({} tools disabled)", removed);
        }
        removed
    }

    /// Registers every tool of `catalogue`. Runs once; later calls leave the
    /// registry untouched and report the current count.
    pub fn discover(&mut self, catalogue: &[BuiltinTool], ctx: &CatalogContext) -> DiscoveryReport {
        if self.discovered {
            return DiscoveryReport {
                registered: self.tools.len(),
                failures: Vec::new(),
            };
        }

        let mut failures = Vec::new();
        for builtin in catalogue {
            match (builtin.build)(ctx) {
                Ok((descriptor, handler)) => {
                    self.register(descriptor, handler);
                }
                Err(e) => {
                    error!("Failed to construct tool {}: {}", builtin.name, e);
                    failures.push((builtin.name.to_string(), e.to_string()));
                }
            }
        }

        self.discovered = true;
        info!("Discovered {} tools ({} failed)", self.tools.len(), failures.len());
        DiscoveryReport {
            registered: self.tools.len(),
            failures,
        }
    }

    /// Function-calling declarations for every registered tool.
    pub fn schemas(&self) -> Vec<serde_json::Value> {
        self.list()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|entry| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": entry.descriptor.name,
                        "description": entry.descriptor.description,
                        "parameters": entry.descriptor.parameters_schema()
                    }
                })
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
