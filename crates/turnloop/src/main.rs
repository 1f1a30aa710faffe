//! A simple program demonstrates how to use `turnloop` as a library.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use turnloop::mcp::McpClient;
use turnloop::terminal::TerminalProgress;
use turnloop::{Config, SessionBuilder};
use turnloop_model::RequestIdentity;
use turnloop_openai_model::OpenAIProvider;

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    debug!("loaded {config:?}");

    let mut builder =
        SessionBuilder::with_model_provider(OpenAIProvider::new(
            config.openai_config(),
        ))
        .with_system_prompt(
            include_str!("./system_prompt.md")
                .replace("{{HOST_OS}}", host_os()),
        )
        .with_identity(RequestIdentity::new(
            config.api_key.clone(),
            config.conversation_id.clone(),
        ))
        .configure_agent(|mut agent| {
            if let Some(max_turns) = config.max_turns {
                agent = agent.with_max_turns(max_turns);
            }
            if let Some(deadline) = config.tool_timeout {
                agent = agent.with_tool_timeout(deadline);
            }
            if let Some(deadline) = config.model_timeout {
                agent = agent.with_model_timeout(deadline);
            }
            agent
        });

    if let Some(deployment) = &config.proxy_deployment {
        builder = builder.with_deployment(deployment);
    }

    let mut mcp_client = None;
    if let Some(url) = &config.mcp_server_url {
        let client = Arc::new(McpClient::with_url(url));
        let connected = match client.connect().await {
            Ok(()) => builder.with_mcp_tools(&client).await,
            Err(err) => Err(err),
        };
        match connected {
            Ok(with_tools) => {
                builder = with_tools;
                mcp_client = Some(client);
            }
            Err(err) => {
                eprintln!("failed to use tool server {url}: {err}");
                client.close().await;
                return;
            }
        }
    }

    let mut session = builder.build();

    let progress_style = match ProgressStyle::with_template("{spinner} {wide_msg}")
    {
        Ok(style) => style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        Err(err) => {
            error!("invalid progress template: {err}");
            ProgressStyle::default_spinner()
        }
    };

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(progress_style.clone());
        spinner.set_message("🤔 Thinking...");
        spinner.enable_steady_tick(Duration::from_millis(100));

        let progress = TerminalProgress::new(spinner);
        let result = session.send_message(line, &progress).await;
        progress.finish();

        if let Err(err) = result {
            println!("{}❌ {}", BAR_CHAR.bright_red(), err.bright_red());
        }
        println!();
    }

    if let Some(client) = mcp_client {
        client.close().await;
    }
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

#[inline]
fn host_os() -> &'static str {
    let os = std::env::consts::OS;
    match os {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        _ => "some other OS",
    }
}
