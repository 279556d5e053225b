use rlimit::{setrlimit, Resource};
use std::time::Duration;

const FILE_SIZE_LIMIT: u64 = 100 * 1024 * 1024; // 100MB
const NOFILE_LIMIT: u64 = 256;

/// Resource limits applied to each spawned child before `exec`.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    pub cpu_seconds: u64,
}

impl ResourceLimits {
    pub fn for_timeout(timeout: Duration) -> Self {
        Self {
            cpu_seconds: timeout.as_secs().max(1),
        }
    }

    /// Runs in the forked child; must stay async-signal-safe.
    pub fn apply(&self) -> std::io::Result<()> {
        setrlimit(Resource::CPU, self.cpu_seconds, self.cpu_seconds)?;
        setrlimit(Resource::FSIZE, FILE_SIZE_LIMIT, FILE_SIZE_LIMIT)?;
        setrlimit(Resource::NOFILE, NOFILE_LIMIT, NOFILE_LIMIT)?;
        Ok(())
    }
}
