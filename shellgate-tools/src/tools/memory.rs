use crate::descriptor::{ArgKind, ToolArgument, ToolDescriptor};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::tools::base::{parse_args, ToolHandler, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Key-value store kept in the working directory.
pub const MEMORY_FILE: &str = ".shellgate_memory.json";
const MAX_KEY_CHARS: usize = 256;

/// Serializes load-modify-store cycles across every memory handler.
static STORE_LOCK: Mutex<()> = Mutex::const_new(());

type Memory = BTreeMap<String, String>;

pub fn save_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "save_memory",
        "Store a key-value pair in persistent memory. Use for remembering project context, preferences, or important info.",
    )
    .arg(ToolArgument::required("key", ArgKind::String, "The key to store the value under"))
    .arg(ToolArgument::required("value", ArgKind::String, "The value to store"))
    .destructive()
}

pub fn get_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_memory",
        "Retrieve a value from persistent memory by key, or list all keys if no key provided.",
    )
    .arg(ToolArgument::optional(
        "key",
        ArgKind::String,
        "The key to retrieve. If not provided, lists all keys.",
    ))
}

pub fn delete_descriptor() -> ToolDescriptor {
    ToolDescriptor::new("delete_memory", "Delete a key from persistent memory.")
        .arg(ToolArgument::required("key", ArgKind::String, "The key to delete"))
        .destructive()
}

/// One handler type for the three memory operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTool {
    Save,
    Get,
    Delete,
}

impl MemoryTool {
    pub fn name(&self) -> &'static str {
        match self {
            MemoryTool::Save => "save_memory",
            MemoryTool::Get => "get_memory",
            MemoryTool::Delete => "delete_memory",
        }
    }
}

#[derive(Deserialize)]
struct SaveInput {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct KeyInput {
    key: Option<String>,
}

#[async_trait]
impl ToolHandler for MemoryTool {
    async fn run(
        &self,
        ctx: ExecutionContext,
        args: Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let store = MemoryStore::new(&ctx.working_dir, &ctx.call_id);
        let outcome = match self {
            MemoryTool::Save => {
                let input: SaveInput = parse_args(args)?;
                store.save(&input.key, input.value).await
            }
            MemoryTool::Get => {
                let input: KeyInput = parse_args(args)?;
                store.get(input.key.as_deref()).await
            }
            MemoryTool::Delete => {
                let input: KeyInput = parse_args(args)?;
                let key = input
                    .key
                    .ok_or_else(|| ToolError::Validation("Key required for delete".into()))?;
                store.delete(&key).await
            }
        };
        Ok(ToolResult::from_outcome(self.name(), outcome))
    }
}

struct MemoryStore<'a> {
    path: PathBuf,
    call_id: &'a str,
}

impl<'a> MemoryStore<'a> {
    fn new(working_dir: &Path, call_id: &'a str) -> Self {
        Self {
            path: working_dir.join(MEMORY_FILE),
            call_id,
        }
    }

    async fn save(&self, key: &str, value: String) -> Result<Value, ToolError> {
        check_key(key)?;
        let _guard = STORE_LOCK.lock().await;
        let mut memory = self.load().await;
        memory.insert(key.to_string(), value);
        self.store(&memory).await?;
        Ok(json!({"key": key, "saved": true}))
    }

    async fn get(&self, key: Option<&str>) -> Result<Value, ToolError> {
        let memory = {
            let _guard = STORE_LOCK.lock().await;
            self.load().await
        };
        match key.filter(|k| !k.is_empty()) {
            Some(key) => memory
                .get(key)
                .map(|value| json!({"key": key, "value": value}))
                .ok_or_else(|| ToolError::NotFound(format!("Key not found: {}", key))),
            None => Ok(json!({
                "keys": memory.keys().collect::<Vec<_>>(),
                "count": memory.len(),
            })),
        }
    }

    async fn delete(&self, key: &str) -> Result<Value, ToolError> {
        let _guard = STORE_LOCK.lock().await;
        let mut memory = self.load().await;
        if memory.remove(key).is_none() {
            return Err(ToolError::NotFound(format!("Key not found: {}", key)));
        }
        self.store(&memory).await?;
        Ok(json!({"key": key, "deleted": true}))
    }

    /// A missing or unreadable file is an empty memory.
    async fn load(&self) -> Memory {
        let Ok(bytes) = fs::read(&self.path).await else {
            return Memory::new();
        };
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("Ignoring unreadable memory file {}: {}", self.path.display(), e);
            Memory::new()
        })
    }

    async fn store(&self, memory: &Memory) -> Result<(), ToolError> {
        let encoded = serde_json::to_vec_pretty(memory)
            .map_err(|e| ToolError::Internal(format!("Failed to encode memory: {}", e)))?;
        let temp_path = self
            .path
            .with_file_name(format!("{}.{}.tmp", MEMORY_FILE, self.call_id));
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;
        file.write_all(&encoded).await?;
        file.sync_all().await?;
        drop(file);
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn check_key(key: &str) -> Result<(), ToolError> {
    if key.trim().is_empty() {
        return Err(ToolError::Validation("Key must not be empty".into()));
    }
    if key.chars().count() > MAX_KEY_CHARS {
        return Err(ToolError::Validation(format!(
            "Key longer than {} characters",
            MAX_KEY_CHARS
        )));
    }
    Ok(())
}
