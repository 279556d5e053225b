pub mod infra;

pub use infra::approval_code::{ApprovalCode, ApprovalCodeError, ApprovalSecret};
pub use infra::lockout::Lockout;
pub use infra::rate_limiter::{RateLimitConfig, RateLimitError, RateLimiter};
pub use infra::risk::{classify, RiskLevel};
pub use infra::sanitizer::sanitize_output;
pub use infra::security_manager::{
    hash_identity, validate_input, ApprovalState, ConfirmationOutcome, InputError, SecurityConfig,
    SecurityManager,
};
