pub mod agent;
pub mod commands;
pub mod config;
pub mod gateway;

pub use agent::{AgentBackend, AgentError, DirectDispatchAgent};
pub use config::{ConfigError, GateConfig};
pub use gateway::{ChatGateway, Reply};

use tracing_subscriber::EnvFilter;

/// `RUST_LOG`-driven logging to stderr, `info` when unset.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
