use shellgate_infra::{ApprovalCode, ApprovalSecret};
use std::process::Command;
use tempfile::TempDir;

fn approve() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_shellgate-approve"));
    cmd.env_remove("SHELLGATE_LOCAL_SECRET_FILE")
        .env_remove("SHELLGATE_LOCAL_APPROVAL_FILE");
    cmd
}

#[test]
fn test_issues_verifiable_code() {
    let temp = TempDir::new().unwrap();
    let secret = temp.path().join("secret");
    let code_file = temp.path().join("nested/dir/code");
    std::fs::write(&secret, "host-secret\n").unwrap();

    let output = approve()
        .arg("ab12cd34")
        .env("SHELLGATE_LOCAL_SECRET_FILE", &secret)
        .env("SHELLGATE_LOCAL_APPROVAL_FILE", &code_file)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let printed = String::from_utf8(output.stdout).unwrap();
    let written = std::fs::read_to_string(&code_file).unwrap();
    assert_eq!(printed.trim(), written.trim());

    let code = ApprovalCode::parse(&printed).unwrap();
    let secret = ApprovalSecret::from_bytes(b"host-secret").unwrap();
    assert!(code.verify(&secret, "AB12CD34"));
    assert!(!code.verify(&secret, "AB12CD35"));
}

#[test]
fn test_flags_override_environment() {
    let temp = TempDir::new().unwrap();
    let secret = temp.path().join("secret");
    let code_file = temp.path().join("code");
    std::fs::write(&secret, "flag-secret").unwrap();

    let output = approve()
        .args(["--secret-file", secret.to_str().unwrap()])
        .args(["--code-file", code_file.to_str().unwrap()])
        .arg("0000FFFF")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(code_file.exists());
}

#[test]
fn test_missing_secret_exits_with_two() {
    let temp = TempDir::new().unwrap();
    let output = approve()
        .arg("AB12CD34")
        .env("SHELLGATE_LOCAL_SECRET_FILE", temp.path().join("absent"))
        .env("SHELLGATE_LOCAL_APPROVAL_FILE", temp.path().join("code"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(!temp.path().join("code").exists());
}

#[test]
fn test_bad_request_id_exits_with_two() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("secret"), "s").unwrap();
    let output = approve()
        .arg("not-hex!")
        .env("SHELLGATE_LOCAL_SECRET_FILE", temp.path().join("secret"))
        .env("SHELLGATE_LOCAL_APPROVAL_FILE", temp.path().join("code"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_missing_arguments_is_usage_error() {
    let output = approve().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}
