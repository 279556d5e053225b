use anyhow::Result;
use clap::{Parser, Subcommand};
use shellgate_app::commands;
use shellgate_app::config::GateConfig;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "shellgate", version, about = "Safety-gated tool execution for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the declarations of every built-in tool
    Tools,
    /// Run one tool directly in the working directory, without the chat gate
    Run {
        tool: String,
        /// JSON object with the tool arguments
        args: Option<String>,
    },
    /// Gated chat channel: reads `<identity>: <message>` lines from stdin
    Chat {
        /// Write replies as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    shellgate_app::init_tracing();

    match dispatch(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Tools => {
            commands::tools::run()?;
            Ok(true)
        }
        Command::Run { tool, args } => {
            let config = GateConfig::from_env()?;
            commands::run::run(&config, &tool, args.as_deref()).await
        }
        Command::Chat { json } => {
            let config = GateConfig::from_env()?;
            commands::chat::run(config, json).await?;
            Ok(true)
        }
    }
}
