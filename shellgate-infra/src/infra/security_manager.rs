use super::approval_code::{ApprovalCode, ApprovalSecret};
use super::lockout::Lockout;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const MAX_INPUT_CHARS: usize = 2000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Message too long (max {max} chars)")]
    TooLong { max: usize },
    #[error("Invalid characters detected")]
    InvalidCharacters,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub require_local_approval: bool,
    /// Written by `shellgate-approve`; only its presence and mtime matter.
    pub code_file: Option<PathBuf>,
    pub secret_file: Option<PathBuf>,
    /// Lifetime of a pending local approval request. Zero disables expiry.
    pub request_ttl: Duration,
    /// Maximum age of the code file. Zero disables the check.
    pub code_ttl: Duration,
    pub confirm_ttl: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            require_local_approval: false,
            code_file: None,
            secret_file: None,
            request_ttl: Duration::from_secs(300),
            code_ttl: Duration::from_secs(600),
            confirm_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    Idle,
    AwaitingLocalApproval,
    AwaitingConfirmation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// Carries the original message, which may now run.
    Confirmed(String),
    Cancelled,
    Expired,
    StillPending,
}

struct Pending {
    id: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl Pending {
    fn expired(&self, now: DateTime<Utc>, ttl: Option<TimeDelta>) -> bool {
        ttl.is_some_and(|ttl| now - self.created_at > ttl)
    }
}

#[derive(Default)]
struct State {
    local: HashMap<String, Pending>,
    confirm: HashMap<String, Pending>,
    lockout: Lockout,
}

/// First 12 hex characters of SHA-256; the only form of an identity that
/// reaches the logs.
pub fn hash_identity(identity: &str) -> String {
    let digest = hex::encode(Sha256::digest(identity.as_bytes()));
    digest[..12].to_string()
}

/// Bounds and control characters for inbound chat text.
pub fn validate_input(message: &str) -> Result<(), InputError> {
    if message.chars().count() > MAX_INPUT_CHARS {
        return Err(InputError::TooLong { max: MAX_INPUT_CHARS });
    }
    if message.contains('\0') {
        return Err(InputError::InvalidCharacters);
    }
    Ok(())
}

fn derive_id(identity: &str, message: &str, now: DateTime<Utc>) -> String {
    let seed = format!("{}:{}:{}", identity, now.timestamp_micros(), message);
    hex::encode(Sha256::digest(seed.as_bytes()))[..8].to_string()
}

fn ttl(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::weeks(5200))
}

/// Per-identity approval state machine, lockout and confirmation tracking.
///
/// All maps sit behind one mutex so that consuming a pending entry is atomic
/// with respect to other messages from the same identity.
pub struct SecurityManager {
    config: SecurityConfig,
    state: Mutex<State>,
}

impl SecurityManager {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
        }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn state(&self, identity: &str) -> ApprovalState {
        let state = self.state.lock();
        if state.local.contains_key(identity) {
            ApprovalState::AwaitingLocalApproval
        } else if state.confirm.contains_key(identity) {
            ApprovalState::AwaitingConfirmation
        } else {
            ApprovalState::Idle
        }
    }

    pub fn has_pending_local_approval(&self, identity: &str) -> bool {
        self.state.lock().local.contains_key(identity)
    }

    pub fn has_pending_confirmation(&self, identity: &str) -> bool {
        self.state.lock().confirm.contains_key(identity)
    }

    /// Id of the pending local approval, for re-prompting.
    pub fn pending_request_id(&self, identity: &str) -> Option<String> {
        self.state.lock().local.get(identity).map(|p| p.id.clone())
    }

    // Local approval

    pub fn request_local_approval(&self, identity: &str, message: &str) -> String {
        self.request_local_approval_at(identity, message, Utc::now())
    }

    /// Replaces any earlier pending local approval for `identity`.
    pub fn request_local_approval_at(&self, identity: &str, message: &str, now: DateTime<Utc>) -> String {
        let request_id = derive_id(identity, message, now).to_uppercase();
        self.state.lock().local.insert(
            identity.to_string(),
            Pending {
                id: request_id.clone(),
                message: message.to_string(),
                created_at: now,
            },
        );
        info!(user = %hash_identity(identity), request_id = %request_id, "Local approval requested");
        request_id
    }

    pub fn check_local_approval(&self, identity: &str, code: &str) -> Option<String> {
        self.check_local_approval_at(identity, code, Utc::now())
    }

    /// On success the pending local approval turns into a pending
    /// confirmation for the same message, which is returned. Every failure
    /// is `None`.
    pub fn check_local_approval_at(&self, identity: &str, code: &str, now: DateTime<Utc>) -> Option<String> {
        let request_ttl = (!self.config.request_ttl.is_zero()).then(|| ttl(self.config.request_ttl));
        let request_id = {
            let mut state = self.state.lock();
            let pending = state.local.get(identity)?;
            if pending.expired(now, request_ttl) {
                state.local.remove(identity);
                info!(user = %hash_identity(identity), "Local approval request expired");
                return None;
            }
            pending.id.clone()
        };

        if !self.code_file_fresh(now) {
            warn!(user = %hash_identity(identity), "Local approval rejected");
            return None;
        }
        let secret = self.config.secret_file.as_deref().and_then(ApprovalSecret::from_file)?;
        let verified = ApprovalCode::parse(code)
            .map(|code| code.verify(&secret, &request_id))
            .unwrap_or(false);
        if !verified {
            warn!(user = %hash_identity(identity), "Local approval rejected");
            return None;
        }

        let mut state = self.state.lock();
        match state.local.get(identity) {
            Some(p) if p.id == request_id && !p.expired(now, request_ttl) => {}
            _ => return None,
        }
        let pending = state.local.remove(identity)?;
        let confirm_id = derive_id(identity, &pending.message, now);
        state.confirm.insert(
            identity.to_string(),
            Pending {
                id: confirm_id,
                message: pending.message.clone(),
                created_at: now,
            },
        );
        info!(user = %hash_identity(identity), request_id = %request_id, "Local approval granted");
        Some(pending.message)
    }

    fn code_file_fresh(&self, now: DateTime<Utc>) -> bool {
        let Some(path) = self.config.code_file.as_deref() else {
            return false;
        };
        let Some(modified) = modified_at(path) else {
            return false;
        };
        if self.config.code_ttl.is_zero() {
            return true;
        }
        now - modified <= ttl(self.config.code_ttl)
    }

    // Confirmation

    pub fn request_confirmation(&self, identity: &str, message: &str) -> String {
        self.request_confirmation_at(identity, message, Utc::now())
    }

    pub fn request_confirmation_at(&self, identity: &str, message: &str, now: DateTime<Utc>) -> String {
        let confirm_id = derive_id(identity, message, now);
        self.state.lock().confirm.insert(
            identity.to_string(),
            Pending {
                id: confirm_id.clone(),
                message: message.to_string(),
                created_at: now,
            },
        );
        info!(user = %hash_identity(identity), "Confirmation requested");
        confirm_id
    }

    pub fn check_confirmation(&self, identity: &str, reply: &str) -> ConfirmationOutcome {
        self.check_confirmation_at(identity, reply, Utc::now())
    }

    pub fn check_confirmation_at(&self, identity: &str, reply: &str, now: DateTime<Utc>) -> ConfirmationOutcome {
        let mut state = self.state.lock();
        let Some(pending) = state.confirm.get(identity) else {
            return ConfirmationOutcome::Cancelled;
        };
        if pending.expired(now, Some(ttl(self.config.confirm_ttl))) {
            state.confirm.remove(identity);
            info!(user = %hash_identity(identity), "Confirmation expired");
            return ConfirmationOutcome::Expired;
        }

        let reply = reply.trim();
        let answer = reply.to_lowercase();
        if matches!(answer.as_str(), "yes" | "y" | "confirm") || reply == pending.id {
            let message = state.confirm.remove(identity).map(|p| p.message).unwrap_or_default();
            info!(user = %hash_identity(identity), "Action confirmed");
            ConfirmationOutcome::Confirmed(message)
        } else if matches!(answer.as_str(), "no" | "n" | "cancel") {
            state.confirm.remove(identity);
            info!(user = %hash_identity(identity), "Action cancelled");
            ConfirmationOutcome::Cancelled
        } else {
            ConfirmationOutcome::StillPending
        }
    }

    /// Drops both kinds of pending entry. Returns whether anything was pending.
    pub fn cancel(&self, identity: &str) -> bool {
        let mut state = self.state.lock();
        let local = state.local.remove(identity).is_some();
        let confirm = state.confirm.remove(identity).is_some();
        local || confirm
    }

    // Lockout

    pub fn record_failure(&self, identity: &str) {
        self.record_failure_at(identity, Utc::now());
    }

    pub fn record_failure_at(&self, identity: &str, now: DateTime<Utc>) {
        let failures = {
            let mut state = self.state.lock();
            state.lockout.record_failure(identity, now);
            state.lockout.recent_failures(identity)
        };
        warn!(user = %hash_identity(identity), failures, "Authorization failure recorded");
    }

    pub fn is_blocked(&self, identity: &str) -> bool {
        self.is_blocked_at(identity, Utc::now())
    }

    pub fn is_blocked_at(&self, identity: &str, now: DateTime<Utc>) -> bool {
        self.state.lock().lockout.is_blocked(identity, now)
    }

    pub fn block(&self, identity: &str) {
        self.state.lock().lockout.block(identity);
        warn!(user = %hash_identity(identity), "Identity blocked");
    }

    pub fn unblock(&self, identity: &str) -> bool {
        let lifted = self.state.lock().lockout.unblock(identity);
        if lifted {
            info!(user = %hash_identity(identity), "Identity unblocked");
        }
        lifted
    }
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}
