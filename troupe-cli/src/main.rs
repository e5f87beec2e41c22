use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use thiserror::Error;
use troupe_bus::{Delivery, payload};
use troupe_runtime::{
    AgentConfig, AppContext, BootstrapError, ConfigError, OrchestratorError, RuntimeConfigBuilder,
};

/// How long `demo` waits for the echo reply
const DEMO_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "troupe", version = "0.1.0")]
#[command(about = "Troupe CLI - run and talk to supervised agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Spawn an echo agent, send it one message and print the reply
    Demo {
        /// Text sent to the echo agent
        #[arg(long, default_value = "Hello agent")]
        message: String,
    },
    /// Send a natural-language request to the orchestrator agent
    Chat {
        /// Request text, e.g. "create an echo agent"
        #[arg(long)]
        message: String,
        /// Session to scope created agents to (generated when omitted)
        #[arg(long)]
        session: Option<String>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("startup failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("failed to render reply: {0}")]
    Render(#[from] serde_json::Error),

    #[error("no reply from echo agent within {0:?}")]
    NoReply(Duration),
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .try_init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), CliError> {
    let config = RuntimeConfigBuilder::from_env()?.build()?;
    let app = AppContext::bootstrap(config).await?;

    let outcome = match command {
        Commands::Demo { message } => run_demo(&app, &message).await,
        Commands::Chat { message, session } => run_chat(&app, &message, session).await,
    };

    let report = app.shutdown().await;
    if !report.is_clean() {
        for (id, reason) in &report.faulted {
            tracing::warn!(agent_id = %id, reason = %reason, "Agent faulted during shutdown");
        }
    }
    outcome
}

async fn run_demo(app: &AppContext, message: &str) -> Result<(), CliError> {
    let orchestrator = app.orchestrator();
    let agent = orchestrator
        .spawn(AgentConfig::new("demo-echo", "echo", "echo").with_session("cli-demo"))
        .await?;
    println!("Spawned {} ({}) in state {}", agent.name(), agent.id(), agent.state());

    let inbox = app.client_mailbox("cli")?;
    orchestrator.dispatch(
        inbox.id().clone(),
        Some(agent.id().clone()),
        payload(json!({ "content": message })),
    );

    let result = match inbox.recv_timeout(DEMO_REPLY_TIMEOUT).await {
        Delivery::Message(reply) => {
            println!("Agent said: {}", reply.text("echo").unwrap_or("<empty>"));
            Ok(())
        }
        Delivery::Idle | Delivery::Closed => Err(CliError::NoReply(DEMO_REPLY_TIMEOUT)),
    };

    orchestrator.terminate(agent.id()).await?;
    println!("Terminated {}", agent.id());
    result
}

async fn run_chat(
    app: &AppContext,
    message: &str,
    session: Option<String>,
) -> Result<(), CliError> {
    let reply = app.chat(message, session).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}
