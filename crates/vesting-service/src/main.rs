//! Operator CLI for the vesting ledger and locked deposit escrow.
//!
//! Loads a configuration file, wires the configured storage, funds and
//! account implementations into an engine and runs one command against it.
//! Command output is JSON on stdout; logs go to stderr.

use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use vesting_config::Config;
use vesting_types::{current_timestamp, Address};

mod commands;
mod factory_registry;

use commands::{CommandError, PermitSource};

/// Command-line arguments for the vesting CLI.
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

/// Permit input shared by the permit commands.
#[derive(ClapArgs, Debug)]
struct PermitInput {
	/// JSON file holding the permit
	#[arg(long, conflicts_with = "encoded")]
	permit: Option<PathBuf>,

	/// Hex of the ABI-encoded permit
	#[arg(long)]
	encoded: Option<String>,
}

impl PermitInput {
	fn source(&self) -> Result<PermitSource, CommandError> {
		match (&self.permit, &self.encoded) {
			(Some(path), None) => Ok(PermitSource::Json(path.clone())),
			(None, Some(data)) => Ok(PermitSource::Encoded(data.clone())),
			_ => Err(CommandError::InvalidInput(
				"exactly one of --permit or --encoded is required".into(),
			)),
		}
	}
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Print the EIP-712 digest of a permit
	PermitHash(PermitInput),
	/// Sign a permit with the configured account
	SignPermit(PermitInput),
	/// Recover the signer of a permit signature
	RecoverSigner {
		#[command(flatten)]
		input: PermitInput,
		/// Packed 65-byte signature as hex
		#[arg(long)]
		signature: String,
	},
	/// Export every live deposit slot
	ExportDeposits {
		/// Write the export to a file instead of stdout
		#[arg(short, long)]
		output: Option<PathBuf>,
	},
	/// Show what a beneficiary can withdraw
	Available {
		#[arg(long)]
		beneficiary: Address,
		/// Unix timestamp to evaluate at, defaults to now
		#[arg(long)]
		at: Option<u64>,
	},
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CommandError> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

/// Main entry point for the vesting CLI.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	let config_path = args.config.to_string_lossy();
	let config = Config::from_file(&config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.ledger.id);

	let engine = factory_registry::build_engine_from_config(config).await?;

	match args.command {
		Command::PermitHash(input) => {
			let permit = commands::load_permit(&input.source()?)?;
			print_json(&commands::permit_hash(&engine, &permit)?)?;
		},
		Command::SignPermit(input) => {
			let permit = commands::load_permit(&input.source()?)?;
			print_json(&commands::sign_permit(&engine, &permit).await?)?;
		},
		Command::RecoverSigner { input, signature } => {
			let permit = commands::load_permit(&input.source()?)?;
			let signature = commands::parse_signature(&signature)?;
			print_json(&commands::recover_signer(&engine, &permit, &signature)?)?;
		},
		Command::ExportDeposits { output } => {
			let records = commands::export_deposits(&engine).await?;
			match output {
				Some(path) => {
					tokio::fs::write(&path, serde_json::to_vec_pretty(&records)?).await?;
					tracing::info!(count = records.len(), path = %path.display(), "Exported deposits");
				},
				None => print_json(&records)?,
			}
		},
		Command::Available { beneficiary, at } => {
			let timestamp = at.unwrap_or_else(current_timestamp);
			print_json(&commands::available(&engine, beneficiary, timestamp).await?)?;
		},
	}

	Ok(())
}
