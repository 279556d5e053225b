//! Issues a local approval code for a pending request.
//!
//! Run on the host, by someone with access to the secret file. The code is
//! written to the code file, whose mtime the gate checks, and printed so it
//! can be sent back over the chat channel.

use anyhow::{bail, Context, Result};
use clap::Parser;
use shellgate_app::config::{LOCAL_APPROVAL_FILE, LOCAL_SECRET_FILE};
use shellgate_infra::{ApprovalCode, ApprovalSecret};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "shellgate-approve", version, about = "Issue a local approval code")]
struct Args {
    /// Request id shown in the chat, 8 hex characters
    request_id: String,

    #[arg(long, env = LOCAL_SECRET_FILE)]
    secret_file: PathBuf,

    #[arg(long, env = LOCAL_APPROVAL_FILE)]
    code_file: PathBuf,
}

fn issue(args: &Args) -> Result<String> {
    let request_id = args.request_id.trim().to_uppercase();
    if request_id.len() != 8 || !request_id.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Request id must be 8 hex characters, got {:?}", args.request_id);
    }

    let secret = ApprovalSecret::from_file(&args.secret_file).with_context(|| {
        format!("Secret file {} is missing or empty", args.secret_file.display())
    })?;

    let code = ApprovalCode::issue(&secret, &request_id)?.to_string();

    if let Some(parent) = args.code_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&args.code_file, format!("{}\n", code))
        .with_context(|| format!("Failed to write {}", args.code_file.display()))?;
    Ok(code)
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(2);
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    match issue(&args) {
        Ok(code) => {
            println!("{}", code);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::from(2)
        }
    }
}
