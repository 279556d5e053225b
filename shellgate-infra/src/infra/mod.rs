pub mod approval_code;
pub mod lockout;
pub mod rate_limiter;
pub mod risk;
pub mod sanitizer;
pub mod security_manager;
