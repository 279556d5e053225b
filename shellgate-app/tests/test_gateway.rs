use async_trait::async_trait;
use parking_lot::Mutex;
use shellgate_app::agent::{AgentBackend, AgentError};
use shellgate_app::commands::chat::serve;
use shellgate_app::config::GateConfig;
use shellgate_app::gateway::{ChatGateway, Reply};
use shellgate_infra::infra::approval_code::sign;
use shellgate_infra::{ApprovalSecret, ApprovalState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Records every message it is asked to process and echoes it back.
#[derive(Default)]
struct RecordingAgent {
    seen: Mutex<Vec<String>>,
    resets: Mutex<Vec<String>>,
}

#[async_trait]
impl AgentBackend for RecordingAgent {
    async fn process(&self, _identity: &str, message: &str) -> Result<String, AgentError> {
        self.seen.lock().push(message.to_string());
        Ok(format!("done: {}", message))
    }

    fn reset(&self, identity: &str) {
        self.resets.lock().push(identity.to_string());
    }
}

struct FixedAgent(Result<String, String>);

#[async_trait]
impl AgentBackend for FixedAgent {
    async fn process(&self, _identity: &str, _message: &str) -> Result<String, AgentError> {
        self.0.clone().map_err(AgentError::Backend)
    }

    fn reset(&self, _identity: &str) {}
}

struct SleepyAgent;

#[async_trait]
impl AgentBackend for SleepyAgent {
    async fn process(&self, _identity: &str, _message: &str) -> Result<String, AgentError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("late".to_string())
    }

    fn reset(&self, _identity: &str) {}
}

fn config(vars: &[(&str, &str)]) -> GateConfig {
    let mut map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.entry("SHELLGATE_AUTHORIZED_USERS".into())
        .or_insert_with(|| "alice,bob".into());
    map.entry("SHELLGATE_WORKING_DIR".into())
        .or_insert_with(|| "/tmp".into());
    GateConfig::from_lookup(|key| map.get(key).cloned()).unwrap()
}

fn gateway(vars: &[(&str, &str)]) -> (ChatGateway, Arc<RecordingAgent>) {
    let agent = Arc::new(RecordingAgent::default());
    let gateway = ChatGateway::new(config(vars), agent.clone());
    (gateway, agent)
}

fn notice(reply: &Reply) -> &str {
    match reply {
        Reply::Notice(text) => text,
        other => panic!("expected a notice, got {:?}", other),
    }
}

#[tokio::test]
async fn test_safe_message_reaches_agent() {
    let (gateway, agent) = gateway(&[]);
    let reply = gateway.handle("alice", "  list the files  ").await;
    assert_eq!(reply, Reply::Output(vec!["done: list the files".to_string()]));
    assert_eq!(*agent.seen.lock(), vec!["list the files"]);
}

#[tokio::test]
async fn test_unauthorized_identity_is_denied_then_locked_out() {
    let (gateway, agent) = gateway(&[]);

    for _ in 0..5 {
        assert_eq!(
            gateway.handle("mallory", "hi").await,
            Reply::Denied(Some("Access denied.".to_string()))
        );
    }
    // Five failures inside ten minutes: now silently dropped.
    assert_eq!(gateway.handle("mallory", "hi").await, Reply::Denied(None));
    assert!(agent.seen.lock().is_empty());
}

#[tokio::test]
async fn test_immediate_block_of_unauthorized() {
    let (gateway, _) = gateway(&[("SHELLGATE_BLOCK_UNAUTHORIZED_IMMEDIATE", "true")]);
    assert_eq!(
        gateway.handle("mallory", "hi").await,
        Reply::Denied(Some("Access denied.".to_string()))
    );
    assert_eq!(gateway.handle("mallory", "hi").await, Reply::Denied(None));
}

#[tokio::test]
async fn test_blocked_identity_rejected_before_rate_limit() {
    let (gateway, _) = gateway(&[("SHELLGATE_RATE_LIMIT_PER_MIN", "1")]);
    gateway.security().block("alice");
    for _ in 0..3 {
        assert_eq!(gateway.handle("alice", "hi").await, Reply::Denied(None));
    }
}

#[tokio::test]
async fn test_rate_limit() {
    let (gateway, _) = gateway(&[("SHELLGATE_RATE_LIMIT_PER_MIN", "2")]);
    assert!(matches!(gateway.handle("alice", "a").await, Reply::Output(_)));
    assert!(matches!(gateway.handle("alice", "b").await, Reply::Output(_)));
    match gateway.handle("alice", "c").await {
        Reply::RateLimited { retry_after_secs } => assert!((1..=60).contains(&retry_after_secs)),
        other => panic!("expected rate limit, got {:?}", other),
    }
    // Other identities have their own window.
    assert!(matches!(gateway.handle("bob", "a").await, Reply::Output(_)));
}

#[tokio::test]
async fn test_blocked_pattern_is_refused() {
    let (gateway, agent) = gateway(&[]);
    let reply = gateway.handle("alice", "please run rm -rf / now").await;
    assert!(matches!(reply, Reply::Refused(_)));
    assert!(agent.seen.lock().is_empty());
}

#[tokio::test]
async fn test_dangerous_request_needs_confirmation() {
    let (gateway, agent) = gateway(&[]);

    let prompt = gateway.handle("alice", "delete old.log").await;
    assert!(notice(&prompt).contains("Reply 'yes'"));
    assert!(agent.seen.lock().is_empty());

    let reply = gateway.handle("alice", "hmm").await;
    assert_eq!(notice(&reply), "Reply 'yes' to confirm or 'no' to cancel.");

    let reply = gateway.handle("alice", "YES").await;
    assert_eq!(reply, Reply::Output(vec!["done: delete old.log".to_string()]));
    assert_eq!(*agent.seen.lock(), vec!["delete old.log"]);

    // The confirmation is consumed.
    let reply = gateway.handle("alice", "yes").await;
    assert_eq!(reply, Reply::Output(vec!["done: yes".to_string()]));
}

#[tokio::test]
async fn test_dangerous_request_can_be_cancelled() {
    let (gateway, agent) = gateway(&[]);
    gateway.handle("alice", "sudo reboot").await;
    assert_eq!(notice(&gateway.handle("alice", "no").await), "Cancelled.");
    assert!(agent.seen.lock().is_empty());
    assert_eq!(gateway.security().state("alice"), ApprovalState::Idle);
}

#[tokio::test]
async fn test_confirmation_disabled_runs_directly() {
    let (gateway, agent) = gateway(&[("SHELLGATE_REQUIRE_CONFIRM", "false")]);
    let reply = gateway.handle("alice", "delete old.log").await;
    assert!(matches!(reply, Reply::Output(_)));
    assert_eq!(agent.seen.lock().len(), 1);
}

#[tokio::test]
async fn test_local_approval_flow() {
    let temp = TempDir::new().unwrap();
    let code_file = temp.path().join("code");
    let secret_file = temp.path().join("secret");
    std::fs::write(&secret_file, "host-secret\n").unwrap();
    let code_path = code_file.to_str().unwrap().to_string();
    let secret_path = secret_file.to_str().unwrap().to_string();

    let (gateway, agent) = gateway(&[
        ("SHELLGATE_LOCAL_APPROVAL_REQUIRED", "true"),
        ("SHELLGATE_LOCAL_APPROVAL_FILE", code_path.as_str()),
        ("SHELLGATE_LOCAL_SECRET_FILE", secret_path.as_str()),
    ]);

    let prompt = gateway.handle("alice", "chmod 600 key.pem").await;
    assert!(notice(&prompt).contains("shellgate-approve"));
    let request_id = gateway.security().pending_request_id("alice").unwrap();

    // Wrong code: re-prompted with the same request id.
    let reply = gateway.handle("alice", "AAAAAAAA-BBBBBBBB").await;
    assert!(notice(&reply).contains(&request_id));

    let secret = ApprovalSecret::from_bytes(b"host-secret").unwrap();
    let code = format!("K7M2P9QX-{}", sign(&secret, "K7M2P9QX", &request_id).unwrap());
    std::fs::write(&code_file, &code).unwrap();

    let reply = gateway.handle("alice", &code.to_lowercase()).await;
    assert!(notice(&reply).starts_with("Local approval accepted"));
    assert_eq!(gateway.security().state("alice"), ApprovalState::AwaitingConfirmation);
    assert!(agent.seen.lock().is_empty());

    let reply = gateway.handle("alice", "y").await;
    assert_eq!(reply, Reply::Output(vec!["done: chmod 600 key.pem".to_string()]));
}

#[tokio::test]
async fn test_commands() {
    let (gateway, agent) = gateway(&[("SHELLGATE_DRY_RUN", "1")]);

    let status = gateway.handle("alice", "/status").await;
    assert!(notice(&status).contains("dry_run: true"));
    assert!(notice(&status).contains("require_confirm: true"));

    assert_eq!(notice(&gateway.handle("alice", "/cancel").await), "Nothing to cancel.");
    gateway.handle("alice", "delete old.log").await;
    assert_eq!(
        notice(&gateway.handle("alice", "/cancel").await),
        "Pending action cancelled."
    );

    gateway.handle("alice", "delete old.log").await;
    assert_eq!(notice(&gateway.handle("alice", "/reset").await), "Session reset.");
    assert_eq!(gateway.security().state("alice"), ApprovalState::Idle);
    assert_eq!(*agent.resets.lock(), vec!["alice"]);

    assert!(notice(&gateway.handle("alice", "/start").await).contains("/status"));
}

#[tokio::test]
async fn test_input_validation() {
    let (gateway, agent) = gateway(&[]);
    assert_eq!(gateway.handle("alice", "   ").await, Reply::Ignored);
    assert_eq!(
        gateway.handle("alice", &"x".repeat(2001)).await,
        Reply::Rejected("Message too long (max 2000 chars)".to_string())
    );
    assert_eq!(
        gateway.handle("alice", "a\0b").await,
        Reply::Rejected("Invalid characters detected".to_string())
    );
    assert!(agent.seen.lock().is_empty());
}

#[tokio::test]
async fn test_output_is_sanitized_and_chunked() {
    let long = format!("token=abc123 host 10.0.0.8\n{}", "z".repeat(9000));
    let gateway = ChatGateway::new(config(&[]), Arc::new(FixedAgent(Ok(long))));

    let Reply::Output(chunks) = gateway.handle("alice", "show config").await else {
        panic!("expected output");
    };
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.chars().count() <= 4000));
    assert!(chunks[0].starts_with("token=[REDACTED] host [IP_ADDRESS]"));
    assert!(!chunks.concat().contains("abc123"));
}

#[tokio::test]
async fn test_agent_error_is_generic() {
    let gateway = ChatGateway::new(
        config(&[]),
        Arc::new(FixedAgent(Err("stack trace with /home/secret path".to_string()))),
    );
    match gateway.handle("alice", "hello").await {
        Reply::Failed(text) => assert!(!text.contains("secret")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_agent_timeout() {
    let gateway = ChatGateway::new(config(&[]), Arc::new(SleepyAgent))
        .with_agent_timeout(Duration::from_millis(100));
    assert_eq!(gateway.handle("alice", "hello").await, Reply::TimedOut);
}

#[tokio::test]
async fn test_serve_line_channel() {
    let (gateway, _) = gateway(&[]);
    let input: &[u8] = b"alice: hello\nno prefix here\n\nmallory: hi\n";
    let mut output = Vec::new();

    serve(&gateway, input, &mut output, false).await.unwrap();
    let text = String::from_utf8(output).unwrap();
    assert_eq!(text, "alice> done: hello\nmallory> Access denied.\n");
}

#[tokio::test]
async fn test_serve_json_lines() {
    let (gateway, _) = gateway(&[]);
    let input: &[u8] = b"bob: /cancel\n";
    let mut output = Vec::new();

    serve(&gateway, input, &mut output, true).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["identity"], "bob");
    assert_eq!(value["reply"]["kind"], "notice");
    assert_eq!(value["reply"]["body"], "Nothing to cancel.");
}
