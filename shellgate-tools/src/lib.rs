pub mod catalog;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod execution_context;
pub mod registry;
pub mod sandbox;
pub mod tools;

pub use catalog::{BuiltinTool, CatalogContext, BUILTIN_TOOLS, DEFAULT_CHAT_TOOLS};
pub use descriptor::{ArgKind, ToolArgument, ToolDescriptor};
pub use dispatcher::ToolDispatcher;
pub use error::ToolError;
pub use execution_context::ExecutionContext;
pub use registry::{DiscoveryReport, ToolEntry, ToolRegistry};
pub use tools::{ToolHandler, ToolResult};
