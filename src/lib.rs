pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod model;
pub mod model_gateway;
pub mod providers;
pub mod session;

use anyhow::{Context, Result};
use reqwest::Client;
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

use config::Config;
use context::FileContextStore;
use model_gateway::HostModelGateway;
use session::ChatSession;

pub const CLEAR_COMMAND: &str = "/clear";

const USAGE: &str = "Usage: agentcc \"PROMPT_MSG\"\n       agentcc \"/clear\"";

enum Command {
    Clear,
    Send(String),
}

fn parse_command(mut args: impl Iterator<Item = String>) -> Option<Command> {
    let first = args.next()?;
    if first == CLEAR_COMMAND {
        Some(Command::Clear)
    } else {
        Some(Command::Send(first))
    }
}

fn build_client(cfg: &Config) -> Result<Client> {
    let mut builder = Client::builder();
    if let Some(secs) = cfg.model_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().context("Failed to initialize HTTP client")
}

pub async fn run() -> ExitCode {
    let Some(command) = parse_command(env::args().skip(1)) else {
        println!("{USAGE}");
        return ExitCode::FAILURE;
    };

    dotenvy::dotenv().ok();
    logging::init();

    let cfg = Config::from_env();
    info!(
        api_base_url = %cfg.api_base_url,
        model = %cfg.model,
        max_tokens = cfg.max_tokens,
        context_path = %cfg.context_path.display(),
        has_api_key = cfg.api_key.is_some(),
        "loaded runtime configuration"
    );

    match execute(&cfg, command).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cfg: &Config, command: Command) -> Result<String> {
    let client = build_client(cfg)?;
    let store = FileContextStore::new(cfg.context_path.clone());
    let session = ChatSession::new(cfg, store, HostModelGateway::new(&client, cfg));

    match command {
        Command::Clear => {
            session.clear_context()?;
            Ok("Context cleared.".to_string())
        }
        Command::Send(prompt) => {
            let answer = session.send_message(&prompt).await?;
            Ok(answer.trim().to_string())
        }
    }
}
