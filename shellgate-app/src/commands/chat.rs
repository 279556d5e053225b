use super::{build_dispatcher, build_registry};
use crate::agent::DirectDispatchAgent;
use crate::config::GateConfig;
use crate::gateway::{ChatGateway, Reply};
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// Splits `<identity>: <message>`. The identity must be non-empty.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (identity, message) = line.split_once(':')?;
    let identity = identity.trim();
    if identity.is_empty() {
        return None;
    }
    Some((identity, message.trim()))
}

/// Gated line channel on stdin and stdout.
pub async fn run(config: GateConfig, json: bool) -> Result<()> {
    config.validate_for_chat()?;

    let registry = build_registry(&config.catalog_context(), Some(&config.allowed_tools));
    info!("Chat gateway ready with tools: {}", registry.list().join(", "));
    let dispatcher = build_dispatcher(&config, registry);
    let gateway = ChatGateway::new(config, Arc::new(DirectDispatchAgent::new(dispatcher)));

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    serve(&gateway, stdin, &mut stdout, json).await
}

/// Feeds every line of `input` through the gateway and writes the replies.
pub async fn serve<R, W>(gateway: &ChatGateway, input: R, output: &mut W, json: bool) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Some((identity, message)) = parse_line(&line) else {
            warn!("Ignoring line without an identity prefix");
            continue;
        };

        let reply = gateway.handle(identity, message).await;
        write_reply(output, identity, &reply, json).await?;
    }
    Ok(())
}

async fn write_reply<W>(output: &mut W, identity: &str, reply: &Reply, json: bool) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if json {
        let line = json!({ "identity": identity, "reply": reply });
        output.write_all(format!("{}\n", line).as_bytes()).await?;
    } else {
        for message in reply.messages() {
            output
                .write_all(format!("{}> {}\n", identity, message).as_bytes())
                .await?;
        }
    }
    output.flush().await?;
    Ok(())
}
