use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use cleaning_service::config::{Config, DEFAULT_CONFIG_PATH};
use cleaning_service::server::{self, AppState};
use cleaning_service::storage::{SqliteStorage, Storage};
use cleaning_service::{logging, metrics, seed, BookingService};

#[derive(Parser)]
#[command(name = "cleaning_service")]
#[command(about = "Booking and availability API for a home cleaning service")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve {
        /// Override the configured bind host
        #[arg(long)]
        host: Option<String>,
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Seed an empty database with the default fleet and exit
    Seed,
}

fn open_storage(config: &Config) -> anyhow::Result<Arc<SqliteStorage>> {
    let storage = SqliteStorage::open(&config.database.path)
        .with_context(|| format!("opening database '{}'", config.database.path))?;
    Ok(Arc::new(storage))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config).context("loading configuration")?;
    let _log_guard = logging::init_logging(&config.logging);

    match cli.command.unwrap_or(Commands::Serve { host: None, port: None }) {
        Commands::Seed => {
            let storage = open_storage(&config)?;
            let seeded = seed::seed_fleet(storage.as_ref(), &config.seed).await?;
            info!(seeded, "Seed finished");
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let metrics_handle = metrics::init_metrics();
            let storage = open_storage(&config)?;
            if config.seed.enabled {
                seed::seed_fleet(storage.as_ref(), &config.seed).await?;
            }

            let storage: Arc<dyn Storage> = storage;
            let state = AppState {
                service: Arc::new(BookingService::new(storage)),
                metrics: metrics_handle,
            };

            let addr: SocketAddr = config
                .bind_address()
                .parse()
                .with_context(|| format!("invalid bind address '{}'", config.bind_address()))?;
            server::start_server(state, addr).await?;
        }
    }

    Ok(())
}
