//! Main entry point for the withdrawal processor.
//!
//! Accepts bank-authorized withdrawal requests and raw signed transactions
//! over HTTP, then drives them to the chain through retried background jobs.
//! Backends for storage, chain delivery, job queue and alerts are chosen by
//! name in the configuration file.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use withdrawal_config::Config;

mod apis;
mod factory_registry;
mod server;

/// Command-line arguments for the withdrawal processor.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Parses arguments, sets up logging, builds the engine and runs it next to
/// the API server until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started withdrawal processor");

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!(
		"Loaded configuration [{}] on {}",
		config.service.id,
		config.network.active
	);

	let engine = Arc::new(factory_registry::build_engine_from_config(config.clone())?);
	engine.initialize().await?;

	match config.api.filter(|api| api.enabled) {
		Some(api_config) => {
			let engine_task = engine.run();
			let api_task = server::start_server(api_config, Arc::clone(&engine));

			tokio::select! {
				result = engine_task => {
					tracing::info!("Engine finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					engine.shutdown().await?;
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting engine only");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped withdrawal processor");
	Ok(())
}
