use chrono::{TimeDelta, Utc};
use shellgate_infra::infra::approval_code::sign;
use shellgate_infra::{
    ApprovalSecret, ApprovalState, ConfirmationOutcome, SecurityConfig, SecurityManager,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const SECRET: &str = "local-approval-secret";

struct Fixture {
    _temp: TempDir,
    manager: SecurityManager,
    code_file: PathBuf,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let code_file = temp.path().join("approval.code");
    let secret_file = temp.path().join("approval.secret");
    std::fs::write(&secret_file, format!("{}\n", SECRET)).unwrap();

    let manager = SecurityManager::new(SecurityConfig {
        require_local_approval: true,
        code_file: Some(code_file.clone()),
        secret_file: Some(secret_file),
        ..SecurityConfig::default()
    });
    Fixture {
        _temp: temp,
        manager,
        code_file,
    }
}

fn code_for(request_id: &str) -> String {
    let secret = ApprovalSecret::from_bytes(SECRET.as_bytes()).unwrap();
    let raw = "XY987Z65";
    format!("{}-{}", raw, sign(&secret, raw, request_id).unwrap())
}

#[test]
fn test_local_approval_moves_to_confirmation() {
    let f = fixture();
    let request_id = f.manager.request_local_approval("alice", "delete build");
    assert_eq!(f.manager.state("alice"), ApprovalState::AwaitingLocalApproval);

    let code = code_for(&request_id);
    std::fs::write(&f.code_file, &code).unwrap();

    let approved = f.manager.check_local_approval("alice", &code.to_lowercase());
    assert_eq!(approved.as_deref(), Some("delete build"));
    assert_eq!(f.manager.state("alice"), ApprovalState::AwaitingConfirmation);

    assert_eq!(
        f.manager.check_confirmation("alice", " YES "),
        ConfirmationOutcome::Confirmed("delete build".to_string())
    );
    assert_eq!(f.manager.state("alice"), ApprovalState::Idle);
}

#[test]
fn test_wrong_code_keeps_request_pending() {
    let f = fixture();
    let request_id = f.manager.request_local_approval("alice", "delete build");
    std::fs::write(&f.code_file, "anything").unwrap();

    assert!(f.manager.check_local_approval("alice", "XY987Z65-00000000").is_none());
    assert!(f.manager.check_local_approval("alice", "garbage").is_none());
    assert_eq!(f.manager.state("alice"), ApprovalState::AwaitingLocalApproval);

    // Codes are bound to the request id.
    let other = code_for("FFFFFFFF");
    assert!(f.manager.check_local_approval("alice", &other).is_none());

    let good = code_for(&request_id);
    assert!(f.manager.check_local_approval("alice", &good).is_some());
}

#[test]
fn test_missing_code_file_rejects_valid_code() {
    let f = fixture();
    let request_id = f.manager.request_local_approval("alice", "delete build");
    assert!(f
        .manager
        .check_local_approval("alice", &code_for(&request_id))
        .is_none());
}

#[test]
fn test_stale_code_file_rejects() {
    let f = fixture();
    std::fs::write(&f.code_file, "x").unwrap();

    // The request itself is fresh; the code file is 650 s old.
    let later = Utc::now() + TimeDelta::seconds(650);
    let request_id = f
        .manager
        .request_local_approval_at("alice", "delete build", later - TimeDelta::seconds(10));
    assert!(f
        .manager
        .check_local_approval_at("alice", &code_for(&request_id), later)
        .is_none());
    assert_eq!(f.manager.state("alice"), ApprovalState::AwaitingLocalApproval);
}

#[test]
fn test_code_ttl_zero_disables_freshness_check() {
    let f = fixture();
    let manager = SecurityManager::new(SecurityConfig {
        code_ttl: Duration::ZERO,
        request_ttl: Duration::from_secs(3600),
        ..f.manager.config().clone()
    });
    std::fs::write(&f.code_file, "x").unwrap();

    let later = Utc::now() + TimeDelta::days(3);
    let request_id = manager.request_local_approval_at("alice", "delete build", later);
    assert!(manager
        .check_local_approval_at("alice", &code_for(&request_id), later)
        .is_some());
}

#[test]
fn test_expired_local_request_is_discarded() {
    let f = fixture();
    let t0 = Utc::now();
    let request_id = f.manager.request_local_approval_at("alice", "delete build", t0);
    std::fs::write(&f.code_file, "x").unwrap();

    let code = code_for(&request_id);
    assert!(f
        .manager
        .check_local_approval_at("alice", &code, t0 + TimeDelta::seconds(301))
        .is_none());
    assert_eq!(f.manager.state("alice"), ApprovalState::Idle);
}

#[test]
fn test_request_ttl_zero_never_expires() {
    let f = fixture();
    let manager = SecurityManager::new(SecurityConfig {
        request_ttl: Duration::ZERO,
        ..f.manager.config().clone()
    });
    let now = Utc::now();
    let request_id = manager.request_local_approval_at("alice", "delete build", now - TimeDelta::days(2));
    std::fs::write(&f.code_file, "x").unwrap();

    assert_eq!(manager.state("alice"), ApprovalState::AwaitingLocalApproval);
    assert_eq!(
        manager
            .check_local_approval_at("alice", &code_for(&request_id), now)
            .as_deref(),
        Some("delete build")
    );
}

#[test]
fn test_missing_secret_rejects() {
    let temp = TempDir::new().unwrap();
    let code_file = temp.path().join("approval.code");
    std::fs::write(&code_file, "x").unwrap();
    let manager = SecurityManager::new(SecurityConfig {
        require_local_approval: true,
        code_file: Some(code_file),
        secret_file: Some(temp.path().join("absent")),
        ..SecurityConfig::default()
    });

    let request_id = manager.request_local_approval("alice", "delete build");
    assert!(manager.check_local_approval("alice", &code_for(&request_id)).is_none());
}

#[test]
fn test_new_request_replaces_previous() {
    let f = fixture();
    let t0 = Utc::now();
    let first = f.manager.request_local_approval_at("alice", "first", t0);
    let second = f.manager.request_local_approval_at("alice", "second", t0 + TimeDelta::seconds(1));
    assert_ne!(first, second);
    std::fs::write(&f.code_file, "x").unwrap();

    assert!(f.manager.check_local_approval("alice", &code_for(&first)).is_none());
    assert_eq!(
        f.manager.check_local_approval("alice", &code_for(&second)).as_deref(),
        Some("second")
    );
}

#[test]
fn test_confirmation_replies() {
    let manager = SecurityManager::new(SecurityConfig::default());

    manager.request_confirmation("bob", "rm old.log");
    assert_eq!(manager.check_confirmation("bob", "maybe"), ConfirmationOutcome::StillPending);
    assert_eq!(manager.check_confirmation("bob", "No"), ConfirmationOutcome::Cancelled);
    assert_eq!(manager.state("bob"), ApprovalState::Idle);

    // Nothing pending behaves like a cancel.
    assert_eq!(manager.check_confirmation("bob", "yes"), ConfirmationOutcome::Cancelled);

    let confirm_id = manager.request_confirmation("bob", "rm old.log");
    assert_eq!(
        manager.check_confirmation("bob", &confirm_id),
        ConfirmationOutcome::Confirmed("rm old.log".to_string())
    );
}

#[test]
fn test_confirmation_expires_after_ttl() {
    let manager = SecurityManager::new(SecurityConfig::default());
    let t0 = Utc::now();
    manager.request_confirmation_at("bob", "rm old.log", t0);

    assert_eq!(
        manager.check_confirmation_at("bob", "yes", t0 + TimeDelta::seconds(301)),
        ConfirmationOutcome::Expired
    );
    assert_eq!(manager.state("bob"), ApprovalState::Idle);
}

#[test]
fn test_confirmation_within_ttl() {
    let manager = SecurityManager::new(SecurityConfig::default());
    let t0 = Utc::now();
    manager.request_confirmation_at("bob", "rm old.log", t0);

    assert_eq!(
        manager.check_confirmation_at("bob", "y", t0 + TimeDelta::seconds(299)),
        ConfirmationOutcome::Confirmed("rm old.log".to_string())
    );
}

#[test]
fn test_confirmation_is_consumed_exactly_once() {
    let manager = Arc::new(SecurityManager::new(SecurityConfig::default()));
    manager.request_confirmation("carol", "rm old.log");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.check_confirmation("carol", "yes"))
        })
        .collect();

    let confirmed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|outcome| matches!(outcome, ConfirmationOutcome::Confirmed(_)))
        .count();
    assert_eq!(confirmed, 1);
}

#[test]
fn test_one_pending_entry_per_identity() {
    let manager = SecurityManager::new(SecurityConfig::default());
    manager.request_confirmation("dave", "first");
    manager.request_confirmation("dave", "second");
    assert_eq!(
        manager.check_confirmation("dave", "yes"),
        ConfirmationOutcome::Confirmed("second".to_string())
    );
    assert_eq!(manager.check_confirmation("dave", "yes"), ConfirmationOutcome::Cancelled);
}

#[test]
fn test_identities_are_isolated() {
    let manager = SecurityManager::new(SecurityConfig::default());
    manager.request_confirmation("erin", "rm a");
    assert_eq!(manager.state("frank"), ApprovalState::Idle);
    assert_eq!(manager.check_confirmation("frank", "yes"), ConfirmationOutcome::Cancelled);
    assert_eq!(manager.state("erin"), ApprovalState::AwaitingConfirmation);
}

#[test]
fn test_lockout_after_five_failures() {
    let manager = SecurityManager::new(SecurityConfig::default());
    let t0 = Utc::now();
    for i in 0..5 {
        assert!(!manager.is_blocked_at("mallory", t0 + TimeDelta::seconds(i)));
        manager.record_failure_at("mallory", t0 + TimeDelta::seconds(i));
    }
    assert!(manager.is_blocked_at("mallory", t0 + TimeDelta::seconds(10)));
    assert!(manager.is_blocked_at("mallory", t0 + TimeDelta::hours(5)));

    assert!(manager.unblock("mallory"));
    assert!(!manager.is_blocked("mallory"));
}

#[test]
fn test_manual_block() {
    let manager = SecurityManager::new(SecurityConfig::default());
    manager.block("oscar");
    assert!(manager.is_blocked("oscar"));
    assert!(!manager.is_blocked("peggy"));
}
