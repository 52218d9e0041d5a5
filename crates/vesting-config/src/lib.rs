//! Configuration module for the vesting ledger and escrow.
//!
//! This module provides structures and utilities for managing configuration.
//! It supports loading configuration from TOML files and validates that the
//! protocol constants and backend selections are usable before anything is
//! constructed from them.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

#[cfg(any(test, feature = "testing"))]
pub mod builders {
	pub mod config;

	pub use config::ConfigBuilder;
}

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use vesting_types::{deserialize_peers, Address, PeersConfig};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Vesting ledger instance and its protocol constants.
	pub ledger: LedgerConfig,
	/// Locked deposit escrow instance and its EIP-712 domain.
	pub escrow: EscrowConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Configuration for the funds (custody) backend.
	pub funds: FundsConfig,
	/// Signing account, only needed by commands that produce signatures.
	pub account: Option<AccountConfig>,
}

/// Ledger instance configuration.
///
/// The numeric constants are fixed for the lifetime of a ledger; changing them
/// on a populated ledger changes every schedule it holds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Unique identifier, used to namespace the ledger's storage.
	pub id: String,
	/// Account holding the ledger's funds.
	pub address: Address,
	/// Account allowed to run administrative operations.
	pub admin: Address,
	/// Successor that receives migrated balances.
	pub migrator: Address,
	#[serde(default = "default_max_deposits")]
	pub max_deposits: u32,
	#[serde(default = "default_number_of_payments")]
	pub number_of_payments: u32,
	/// Seconds per vesting interval.
	#[serde(default = "default_time_between_payments")]
	pub time_between_payments: u64,
	/// Pay the first installment at deposit time.
	#[serde(default)]
	pub upfront_installment: bool,
}

fn default_max_deposits() -> u32 {
	5
}

fn default_number_of_payments() -> u32 {
	24
}

/// 30 days.
fn default_time_between_payments() -> u64 {
	2_592_000
}

/// Escrow instance configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EscrowConfig {
	/// EIP-712 domain name.
	#[serde(default = "default_domain_name")]
	pub name: String,
	/// EIP-712 domain version.
	#[serde(default = "default_domain_version")]
	pub version: String,
	/// Chain this instance settles on.
	pub chain_id: u64,
	/// Address of this instance; the verifying contract of its domain.
	pub address: Address,
	/// The single non-native currency deals may use.
	pub designated_token: Option<Address>,
	/// Instances of the same escrow on other chains.
	#[serde(deserialize_with = "deserialize_peers", default)]
	pub peers: PeersConfig,
}

fn default_domain_name() -> String {
	"LockedDeposit".to_string()
}

fn default_domain_version() -> String {
	"1".to_string()
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the funds backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FundsConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of funds implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for account management.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of account implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut replacements = Vec::new();
	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	let mut result = input.to_string();
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

fn require_implementation(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl Config {
	/// Loads configuration from a file with environment variable resolution.
	///
	/// Supports `include = ["file1.toml", "file2.toml"]`; each top-level
	/// section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// Checks the protocol constants, the escrow domain and peers, and that
	/// every selected backend has a matching implementation table.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let ledger = &self.ledger;
		if ledger.id.is_empty() {
			return Err(ConfigError::Validation("Ledger ID cannot be empty".into()));
		}
		if ledger.address.is_zero() {
			return Err(ConfigError::Validation(
				"Ledger address cannot be the zero address".into(),
			));
		}
		if ledger.migrator.is_zero() || ledger.migrator == ledger.address {
			return Err(ConfigError::Validation(
				"Ledger migrator must be a non-zero address other than the ledger".into(),
			));
		}
		if ledger.max_deposits == 0 {
			return Err(ConfigError::Validation(
				"max_deposits must be at least 1".into(),
			));
		}
		if ledger.number_of_payments == 0 {
			return Err(ConfigError::Validation(
				"number_of_payments must be at least 1".into(),
			));
		}
		if ledger.time_between_payments == 0 {
			return Err(ConfigError::Validation(
				"time_between_payments must be greater than 0".into(),
			));
		}

		let escrow = &self.escrow;
		if escrow.name.is_empty() || escrow.version.is_empty() {
			return Err(ConfigError::Validation(
				"Escrow domain name and version cannot be empty".into(),
			));
		}
		if escrow.chain_id == 0 {
			return Err(ConfigError::Validation(
				"Escrow chain_id must be greater than 0".into(),
			));
		}
		if escrow.address.is_zero() {
			return Err(ConfigError::Validation(
				"Escrow address cannot be the zero address".into(),
			));
		}
		if escrow.designated_token.is_some_and(|token| token.is_zero()) {
			return Err(ConfigError::Validation(
				"designated_token cannot be the zero address; omit it for native-only deals"
					.into(),
			));
		}
		for (chain_id, address) in &escrow.peers {
			if *chain_id == escrow.chain_id {
				return Err(ConfigError::Validation(format!(
					"Peer list cannot contain the local chain {}",
					chain_id
				)));
			}
			if address.is_zero() {
				return Err(ConfigError::Validation(format!(
					"Peer on chain {} has the zero address",
					chain_id
				)));
			}
		}

		require_implementation(
			"storage",
			&self.storage.primary,
			&self.storage.implementations,
		)?;
		require_implementation("funds", &self.funds.primary, &self.funds.implementations)?;
		if let Some(account) = &self.account {
			require_implementation("account", &account.primary, &account.implementations)?;
		}

		Ok(())
	}
}

/// Parses a TOML string, resolving environment variables and validating the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
