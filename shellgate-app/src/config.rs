use shellgate_infra::SecurityConfig;
use shellgate_tools::sandbox::shell_approval::{ShellApproval, DEFAULT_APPROVAL_FILE};
use shellgate_tools::{CatalogContext, DEFAULT_CHAT_TOOLS};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const AUTHORIZED_USERS: &str = "SHELLGATE_AUTHORIZED_USERS";
pub const REQUIRE_CONFIRM: &str = "SHELLGATE_REQUIRE_CONFIRM";
pub const LOCAL_APPROVAL_REQUIRED: &str = "SHELLGATE_LOCAL_APPROVAL_REQUIRED";
pub const LOCAL_APPROVAL_FILE: &str = "SHELLGATE_LOCAL_APPROVAL_FILE";
pub const LOCAL_SECRET_FILE: &str = "SHELLGATE_LOCAL_SECRET_FILE";
pub const LOCAL_APPROVAL_REQUEST_TTL: &str = "SHELLGATE_LOCAL_APPROVAL_REQUEST_TTL";
pub const LOCAL_APPROVAL_TTL: &str = "SHELLGATE_LOCAL_APPROVAL_TTL";
pub const CONFIRM_TTL: &str = "SHELLGATE_CONFIRM_TTL";
pub const RATE_LIMIT_PER_MIN: &str = "SHELLGATE_RATE_LIMIT_PER_MIN";
pub const ALLOWED_TOOLS: &str = "SHELLGATE_ALLOWED_TOOLS";
pub const BLOCK_UNAUTHORIZED_IMMEDIATE: &str = "SHELLGATE_BLOCK_UNAUTHORIZED_IMMEDIATE";
pub const DRY_RUN: &str = "SHELLGATE_DRY_RUN";
pub const WORKING_DIR: &str = "SHELLGATE_WORKING_DIR";
pub const REQUIRE_LOCAL_SHELL_APPROVAL: &str = "SHELLGATE_REQUIRE_LOCAL_SHELL_APPROVAL";
pub const SHELL_APPROVAL_FILE: &str = "SHELLGATE_SHELL_APPROVAL_FILE";
pub const SHELL_APPROVAL_TOKEN: &str = "SHELLGATE_SHELL_APPROVAL_TOKEN";
pub const SHELL_APPROVAL_ONCE: &str = "SHELLGATE_SHELL_APPROVAL_ONCE";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set when local approval is required")]
    Missing(&'static str),
    #[error("SHELLGATE_AUTHORIZED_USERS must list at least one identity")]
    NoAuthorizedUsers,
    #[error("Local approval secret {} is missing or empty", .0.display())]
    SecretUnavailable(PathBuf),
    #[error("Working directory {} is not a directory", .0.display())]
    WorkingDir(PathBuf),
    #[error("Cannot determine the current directory: {0}")]
    CurrentDir(String),
}

/// Settings read from `SHELLGATE_*` variables.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// `None` when the variable is unset: everyone is authorized.
    pub authorized_users: Option<HashSet<String>>,
    pub require_confirm: bool,
    pub security: SecurityConfig,
    pub rate_limit_per_min: usize,
    pub allowed_tools: Vec<String>,
    pub block_unauthorized_immediately: bool,
    pub dry_run: bool,
    pub working_dir: PathBuf,
    /// Approval file gate for the process-spawning tools.
    pub shell_approval: Option<ShellApproval>,
}

impl GateConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Only variable-level
    /// checks happen here; see [`GateConfig::validate_for_chat`] for the
    /// filesystem checks.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME");
        let path_var = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| expand_home(&v, home.as_deref()))
        };

        let authorized_users: Option<HashSet<String>> =
            lookup(AUTHORIZED_USERS).map(|raw| split_list(&raw).collect());

        let require_local_approval = env_bool(&lookup, LOCAL_APPROVAL_REQUIRED, false);
        let code_file = path_var(LOCAL_APPROVAL_FILE);
        let secret_file = path_var(LOCAL_SECRET_FILE);
        if require_local_approval {
            if code_file.is_none() {
                return Err(ConfigError::Missing(LOCAL_APPROVAL_FILE));
            }
            if secret_file.is_none() {
                return Err(ConfigError::Missing(LOCAL_SECRET_FILE));
            }
        }

        let security = SecurityConfig {
            require_local_approval,
            code_file,
            secret_file,
            request_ttl: Duration::from_secs(env_int(&lookup, LOCAL_APPROVAL_REQUEST_TTL, 300)),
            code_ttl: Duration::from_secs(env_int(&lookup, LOCAL_APPROVAL_TTL, 600)),
            confirm_ttl: Duration::from_secs(env_int(&lookup, CONFIRM_TTL, 300)),
        };

        let allowed_tools = match lookup(ALLOWED_TOOLS) {
            Some(raw) => split_list(&raw).collect(),
            None => DEFAULT_CHAT_TOOLS.iter().map(|t| t.to_string()).collect(),
        };

        let working_dir = match path_var(WORKING_DIR) {
            Some(dir) => dir,
            None => std::env::current_dir().map_err(|e| ConfigError::CurrentDir(e.to_string()))?,
        };

        let shell_approval = env_bool(&lookup, REQUIRE_LOCAL_SHELL_APPROVAL, false).then(|| ShellApproval {
            file_name: lookup(SHELL_APPROVAL_FILE)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_APPROVAL_FILE.to_string()),
            token: lookup(SHELL_APPROVAL_TOKEN)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            consume: env_bool(&lookup, SHELL_APPROVAL_ONCE, false),
        });

        Ok(Self {
            authorized_users,
            require_confirm: env_bool(&lookup, REQUIRE_CONFIRM, true),
            security,
            rate_limit_per_min: env_int(&lookup, RATE_LIMIT_PER_MIN, 30) as usize,
            allowed_tools,
            block_unauthorized_immediately: env_bool(&lookup, BLOCK_UNAUTHORIZED_IMMEDIATE, false),
            dry_run: env_bool(&lookup, DRY_RUN, false),
            working_dir,
            shell_approval,
        })
    }

    /// Settings handed to the tool constructors.
    pub fn catalog_context(&self) -> CatalogContext {
        CatalogContext {
            shell_approval: self.shell_approval.clone(),
            ..CatalogContext::default()
        }
    }

    pub fn is_authorized(&self, identity: &str) -> bool {
        self.authorized_users
            .as_ref()
            .map_or(true, |users| users.contains(identity))
    }

    /// Checks the remote chat front end needs before it starts: a non-empty
    /// allow-list, a usable secret when local approval is on and an existing
    /// working directory.
    pub fn validate_for_chat(&self) -> Result<(), ConfigError> {
        if self.authorized_users.as_ref().map_or(true, HashSet::is_empty) {
            return Err(ConfigError::NoAuthorizedUsers);
        }
        self.validate_working_dir()?;
        if self.security.require_local_approval {
            let secret = self
                .security
                .secret_file
                .as_deref()
                .ok_or(ConfigError::Missing(LOCAL_SECRET_FILE))?;
            if shellgate_infra::ApprovalSecret::from_file(secret).is_none() {
                return Err(ConfigError::SecretUnavailable(secret.to_path_buf()));
            }
        }
        Ok(())
    }

    pub fn validate_working_dir(&self) -> Result<(), ConfigError> {
        if self.working_dir.is_dir() {
            Ok(())
        } else {
            Err(ConfigError::WorkingDir(self.working_dir.clone()))
        }
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn env_bool<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: bool) -> bool {
    match lookup(key) {
        Some(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        None => default,
    }
}

fn env_int<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u64) -> u64 {
    let Some(value) = lookup(key) else {
        return default;
    };
    match value.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("Ignoring invalid {}={:?}, using {}", key, value, default);
            default
        }
    }
}

fn expand_home(value: &str, home: Option<&str>) -> PathBuf {
    match (value.strip_prefix('~'), home) {
        (Some(""), Some(home)) => PathBuf::from(home),
        (Some(rest), Some(home)) if rest.starts_with('/') => {
            Path::new(home).join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(value),
    }
}
