//! Main entry point for the spot deployer.
//!
//! The binary loads a TOML configuration, assembles the deployer from the
//! configured storage, account and exchange implementations and runs one
//! command: a deploy pipeline, a status query, an operator confirmation or a
//! one-off signed action.

use clap::Parser;
use deployer_config::Config;
use deployer_core::{Deployer, DeployerBuilder, DeployerFactories};
use std::path::PathBuf;
use tokio::sync::watch;

mod commands;

use commands::Command;

/// Command-line arguments for the spot deployer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Command,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt()
		.with_env_filter(env_filter)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	let config_path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.deployer.id);

	let deployer = build_deployer(config).await?;

	let (cancel_tx, cancel_rx) = watch::channel(false);
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::warn!("Interrupt received, stopping before the next dispatch");
			cancel_tx.send_replace(true);
		}
	});

	commands::run(&deployer, args.command, cancel_rx).await
}

/// Builds the deployer with every shipped implementation available.
async fn build_deployer(config: Config) -> Result<Deployer, Box<dyn std::error::Error>> {
	let builder = DeployerBuilder::new(config);
	Ok(builder.build(DeployerFactories::all()).await?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn test_cli_definition_is_consistent() {
		Args::command().debug_assert();
	}

	#[test]
	fn test_args_default_values() {
		let args = Args::try_parse_from(["spot-deployer", "address"]).unwrap();
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
		assert!(matches!(args.command, Command::Address));
	}

	#[tokio::test]
	async fn test_build_deployer_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(
			&path,
			format!(
				r#"
[deployer]
id = "service-test"
network = "testnet"

[account]
primary = "local"
[account.implementations.local]
private_key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"

[exchange]
primary = "mock"
[exchange.implementations.mock]

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "{}"
"#,
				dir.path().join("data").display()
			),
		)
		.unwrap();

		let config = Config::from_file(path.to_str().unwrap()).await.unwrap();
		let deployer = build_deployer(config).await.unwrap();
		assert_eq!(
			deployer.address().await.unwrap().to_string(),
			"0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
		);
	}
}
