use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pool_config::{ConfigLoader, PoolConfig};
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod service;

#[derive(Parser)]
#[command(name = "pool-coordinator")]
#[command(about = "Mining pool transaction coordinator", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/pool.toml")]
	config: PathBuf,

	/// Overrides the level set in the configuration file
	#[arg(long, env = "POOL_LOG_LEVEL")]
	log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
	/// Run the coordinator workers
	Start,
	/// Validate the configuration file
	Validate,
	/// Print chain parameters and transaction statistics from the store
	Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

	let log_level = cli
		.log_level
		.clone()
		.unwrap_or_else(|| config.pool.log_level.clone());
	setup_tracing(&log_level)?;

	match cli.command {
		Some(Commands::Start) | None => start_service(config).await,
		Some(Commands::Validate) => validate_config(&cli, &config),
		Some(Commands::Stats) => print_stats(config).await,
	}
}

async fn start_service(config: PoolConfig) -> Result<()> {
	info!(pool = %config.pool.name, replicas = config.pool.replicas, "Starting pool coordinator");

	let service = service::PoolService::new(config)
		.await
		.context("Failed to build coordinator")?;
	service.run(setup_shutdown_signal()).await?;

	info!("Pool coordinator stopped");
	Ok(())
}

fn validate_config(cli: &Cli, config: &PoolConfig) -> Result<()> {
	info!("Configuration {:?} is valid", cli.config);
	info!("Pool name: {}", config.pool.name);
	info!("Replicas: {}", config.pool.replicas);
	info!("Chain id: {}", config.ledger.chain_id);
	info!("Token contract: {}", config.ledger.token_contract);
	info!("Mint helper: {}", config.ledger.mint_helper);
	info!("Storage backend: {:?}", config.storage.backend);
	info!("Merge-mint candidates: {}", config.merge_mint.candidates.len());
	Ok(())
}

async fn print_stats(config: PoolConfig) -> Result<()> {
	let service = service::PoolService::new(config)
		.await
		.context("Failed to build coordinator")?;
	let report = service.report().await?;
	println!("{}", serde_json::to_string_pretty(&report)?);
	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn setup_shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			warn!(error = %e, "Failed to listen for Ctrl+C");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			}
			Err(e) => {
				warn!(error = %e, "Failed to install SIGTERM handler");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
