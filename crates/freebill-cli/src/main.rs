//! # freebill CLI
//!
//! Usage:
//!   freebill client add --id acme --name "Acme Corp"     # Register a client
//!   freebill recurring create --client acme --amount 1000.00 --currency USD \
//!       --description "Support retainer" --frequency monthly --day-of-month 15
//!   freebill recurring list [--json]
//!   freebill recurring generate [--all] [--dry-run]
//!   freebill recurring pause|resume|delete <ID>
//!   freebill serve                                        # Run the scheduler until Ctrl-C

use anyhow::Result;
use clap::{Parser, Subcommand};
use freebill_core::FreebillConfig;
use tracing::{info, warn};

mod app;
mod commands;
mod output;

#[derive(Parser)]
#[command(name = "freebill", version, about = "Freelance billing: recurring invoices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage recurring invoice templates
    Recurring {
        #[command(subcommand)]
        action: commands::RecurringAction,
    },

    /// Manage clients
    Client {
        #[command(subcommand)]
        action: commands::ClientAction,
    },

    /// Run the recurring-invoice scheduler until interrupted
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "freebill=info,freebill_recurring=info,freebill_scheduler=info".into()
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    // explicit --config > FREEBILL_CONFIG env > ~/.freebill/freebill.toml
    let config_path = cli.config.or_else(|| std::env::var("FREEBILL_CONFIG").ok());
    let config = FreebillConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        FreebillConfig::default()
    });

    let state = app::AppState::open(config)?;
    match cli.command {
        Commands::Recurring { action } => commands::recurring(&state, action).await,
        Commands::Client { action } => commands::client(&state, action),
        Commands::Serve => {
            commands::serve(&state).await?;
            info!("freebill stopped");
            Ok(())
        }
    }
}
