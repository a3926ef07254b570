use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use creditgate::config::{CreditGateConfig, LoggingConfig};
use creditgate::credits::{CreditGate, LedgerStore, SqliteLedger, UserId};
use creditgate::http::{AppState, HttpServer};
use creditgate::vision::OpenAiVisionClient;

#[derive(Debug, Parser)]
#[command(name = "creditgate", version, about = "Credit-gated image description service")]
struct Cli {
    /// Optional YAML configuration file
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Print a user's ledger entry
    Balance {
        #[arg(long)]
        user: String,
    },
    /// Overwrite a user's balance
    Set {
        #[arg(long)]
        user: String,
        #[arg(long)]
        amount: i64,
    },
    /// Add credits to a user's balance
    TopUp {
        #[arg(long)]
        user: String,
        #[arg(long)]
        amount: i64,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn parse_user(raw: &str) -> anyhow::Result<UserId> {
    UserId::parse(raw).context("user id must not be blank")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CreditGateConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging);

    let ledger = Arc::new(
        SqliteLedger::open(&config.ledger.database_path).context("Failed to open credit ledger")?,
    );
    let gate = CreditGate::with_default_credits(ledger.clone(), config.ledger.default_credits);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, gate).await?,
        Command::Balance { user } => {
            let user = parse_user(&user)?;
            match ledger.entry(&user).await? {
                Some(entry) => println!("{}: {} credits", entry.user_id, entry.credits),
                None => println!("{}: no ledger entry", user),
            }
        }
        Command::Set { user, amount } => {
            let user = parse_user(&user)?;
            gate.set_balance(&user, amount).await?;
            println!("{}: {} credits", user, amount);
        }
        Command::TopUp { user, amount } => {
            let user = parse_user(&user)?;
            let balance = gate.top_up(&user, amount).await?;
            println!("{}: {} credits", user, balance);
        }
    }

    Ok(())
}

async fn serve(config: CreditGateConfig, gate: CreditGate) -> anyhow::Result<()> {
    info!("Starting creditgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let vision = OpenAiVisionClient::from_config(&config.vision)
        .context("Failed to configure vision client")?;

    if config.auth.api_key.is_none() {
        info!("No API key configured, caller authentication is disabled");
    }

    let state = AppState::new(gate, Arc::new(vision), config.auth.api_key.clone());
    let server = HttpServer::new(config.server.http_addr, state)
        .with_max_body_bytes(config.server.max_body_bytes);

    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("creditgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
