use crate::agent::AgentBackend;
use crate::config::GateConfig;
use serde::Serialize;
use shellgate_infra::{
    classify, hash_identity, sanitize_output, validate_input, ConfirmationOutcome, RateLimitConfig,
    RateLimitError, RateLimiter, RiskLevel, SecurityManager,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Largest single message the chat channel accepts.
pub const CHUNK_CHARS: usize = 4000;
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(60);

const CANCEL_WORDS: &[&str] = &["no", "n", "cancel"];

/// What the channel should send back for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Reply {
    /// `None` means nothing is sent.
    Denied(Option<String>),
    RateLimited { retry_after_secs: u64 },
    Ignored,
    Rejected(String),
    Notice(String),
    Refused(String),
    Output(Vec<String>),
    TimedOut,
    Failed(String),
}

impl Reply {
    /// Messages to send, in order.
    pub fn messages(&self) -> Vec<String> {
        match self {
            Reply::Denied(text) => text.iter().cloned().collect(),
            Reply::RateLimited { retry_after_secs } => vec![format!(
                "Rate limit exceeded. Try again in {}s.",
                retry_after_secs
            )],
            Reply::Ignored => Vec::new(),
            Reply::Rejected(text) | Reply::Notice(text) | Reply::Refused(text) | Reply::Failed(text) => {
                vec![text.clone()]
            }
            Reply::Output(chunks) => chunks.clone(),
            Reply::TimedOut => vec!["Request timed out.".to_string()],
        }
    }
}

/// Splits on character boundaries into pieces of at most `size` chars.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Runs every inbound chat message through authorization, rate limiting and
/// the approval state machine before anything reaches the agent.
pub struct ChatGateway {
    config: GateConfig,
    security: Arc<SecurityManager>,
    limiter: RateLimiter,
    agent: Arc<dyn AgentBackend>,
    agent_timeout: Duration,
}

impl ChatGateway {
    pub fn new(config: GateConfig, agent: Arc<dyn AgentBackend>) -> Self {
        let security = Arc::new(SecurityManager::new(config.security.clone()));
        let limiter = RateLimiter::new(RateLimitConfig::per_minute(config.rate_limit_per_min));
        Self {
            config,
            security,
            limiter,
            agent,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn security(&self) -> &Arc<SecurityManager> {
        &self.security
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub async fn handle(&self, identity: &str, text: &str) -> Reply {
        let user = hash_identity(identity);

        if self.security.is_blocked(identity) {
            warn!(user = %user, "Message from blocked identity dropped");
            return Reply::Denied(None);
        }

        if !self.config.is_authorized(identity) {
            self.security.record_failure(identity);
            if self.config.block_unauthorized_immediately {
                self.security.block(identity);
            }
            warn!(user = %user, "Unauthorized message");
            return Reply::Denied(Some("Access denied.".to_string()));
        }

        if let Err(RateLimitError::Exceeded { retry_after_secs }) = self.limiter.check(identity) {
            info!(user = %user, retry_after_secs, "Rate limited");
            return Reply::RateLimited { retry_after_secs };
        }

        let text = text.trim();
        if let Some(reply) = self.command(identity, text) {
            return reply;
        }

        if text.is_empty() {
            return Reply::Ignored;
        }
        if let Err(e) = validate_input(text) {
            return Reply::Rejected(e.to_string());
        }

        if self.security.has_pending_local_approval(identity) {
            return self.handle_approval_code(identity, text);
        }

        if self.security.has_pending_confirmation(identity) {
            return match self.security.check_confirmation(identity, text) {
                ConfirmationOutcome::Confirmed(original) => self.run_agent(identity, &original).await,
                ConfirmationOutcome::Cancelled => Reply::Notice("Cancelled.".to_string()),
                ConfirmationOutcome::Expired => {
                    Reply::Notice("Confirmation expired. Send the request again.".to_string())
                }
                ConfirmationOutcome::StillPending => {
                    Reply::Notice("Reply 'yes' to confirm or 'no' to cancel.".to_string())
                }
            };
        }

        match classify(text) {
            RiskLevel::Blocked => {
                warn!(user = %user, "Blocked request refused");
                Reply::Refused("This request matches a blocked pattern and was refused.".to_string())
            }
            RiskLevel::Dangerous if self.config.require_confirm => self.gate_dangerous(identity, text),
            _ => self.run_agent(identity, text).await,
        }
    }

    fn command(&self, identity: &str, text: &str) -> Option<Reply> {
        let command = text.split_whitespace().next()?;
        let command = command.split('@').next().unwrap_or(command);
        let reply = match command {
            "/start" => Reply::Notice(format!(
                "Shellgate is ready. Send a request, or one of /status, /reset, /cancel.\nYour id hash: {}",
                hash_identity(identity)
            )),
            "/status" => Reply::Notice(format!(
                "dry_run: {}\nrequire_confirm: {}\nlocal_approval: {}",
                self.config.dry_run,
                self.config.require_confirm,
                self.config.security.require_local_approval
            )),
            "/reset" => {
                self.security.cancel(identity);
                self.agent.reset(identity);
                Reply::Notice("Session reset.".to_string())
            }
            "/cancel" => {
                if self.security.cancel(identity) {
                    Reply::Notice("Pending action cancelled.".to_string())
                } else {
                    Reply::Notice("Nothing to cancel.".to_string())
                }
            }
            _ => return None,
        };
        Some(reply)
    }

    fn handle_approval_code(&self, identity: &str, text: &str) -> Reply {
        if CANCEL_WORDS.contains(&text.to_lowercase().as_str()) {
            self.security.cancel(identity);
            return Reply::Notice("Cancelled.".to_string());
        }

        if self.security.check_local_approval(identity, text).is_some() {
            return Reply::Notice(
                "Local approval accepted. Reply 'yes' to run the request or 'no' to cancel.".to_string(),
            );
        }

        match self.security.pending_request_id(identity) {
            Some(request_id) => Reply::Notice(format!(
                "Approval code not accepted. On the host run: shellgate-approve {}\nThen send the code here.",
                request_id
            )),
            None => Reply::Notice("Approval request expired. Send the request again.".to_string()),
        }
    }

    fn gate_dangerous(&self, identity: &str, text: &str) -> Reply {
        if self.config.security.require_local_approval {
            let request_id = self.security.request_local_approval(identity, text);
            Reply::Notice(format!(
                "This request needs local approval. On the host run: shellgate-approve {}\nThen send the code here.",
                request_id
            ))
        } else {
            let confirm_id = self.security.request_confirmation(identity, text);
            Reply::Notice(format!(
                "This request looks dangerous. Reply 'yes' (or {}) to run it, 'no' to cancel.",
                confirm_id
            ))
        }
    }

    async fn run_agent(&self, identity: &str, message: &str) -> Reply {
        let user = hash_identity(identity);
        let agent = Arc::clone(&self.agent);
        let owned_identity = identity.to_string();
        let owned_message = message.to_string();
        let mut handle =
            tokio::spawn(async move { agent.process(&owned_identity, &owned_message).await });

        match tokio::time::timeout(self.agent_timeout, &mut handle).await {
            Ok(Ok(Ok(output))) => {
                info!(user = %user, "Request completed");
                let output = sanitize_output(&output);
                if output.trim().is_empty() {
                    Reply::Output(vec!["(no output)".to_string()])
                } else {
                    Reply::Output(chunk_text(&output, CHUNK_CHARS))
                }
            }
            Ok(Ok(Err(e))) => {
                error!(user = %user, "Agent failed: {}", e);
                Reply::Failed("Something went wrong while handling the request.".to_string())
            }
            Ok(Err(e)) => {
                error!(user = %user, "Agent task failed: {}", e);
                Reply::Failed("Something went wrong while handling the request.".to_string())
            }
            Err(_) => {
                handle.abort();
                warn!(user = %user, "Agent timed out after {:?}", self.agent_timeout);
                Reply::TimedOut
            }
        }
    }
}
