//! Builder pattern for constructing vesting engines.
//!
//! Composes a VestingEngine from pluggable storage, funds and account
//! implementations using factory functions keyed by implementation name.

use crate::engine::{event_bus::EventBus, VestingEngine};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use vesting_account::{AccountError, AccountInterface, AccountService};
use vesting_config::Config;
use vesting_funds::{FundsError, FundsInterface, FundsService};
use vesting_storage::{StorageError, StorageInterface, StorageService};
use vesting_types::{format_ether, Currency};

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for all factory functions needed to build a VestingEngine.
pub struct VestingFactories<SF, FF, AF> {
	pub storage_factories: HashMap<String, SF>,
	pub funds_factories: HashMap<String, FF>,
	pub account_factories: HashMap<String, AF>,
}

/// Instantiates every configured implementation that has a factory and
/// returns the primary one.
fn load_primary<T: ?Sized, E: std::fmt::Display, F>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		if let Some(factory) = factories.get(name) {
			match factory(config) {
				Ok(implementation) => {
					// Validation already happened in the factory
					loaded.insert(name.clone(), implementation);
					let is_primary = primary == name;
					tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				},
				Err(e) => {
					tracing::error!(
						component,
						implementation = %name,
						error = %e,
						"Failed to create implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create {} implementation '{}': {}",
						component, name, e
					)));
				},
			}
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::Config(format!(
			"No valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

/// Builder for constructing a VestingEngine with pluggable implementations.
pub struct VestingBuilder {
	config: Config,
}

impl VestingBuilder {
	/// Creates a new VestingBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the VestingEngine using factories for each component type.
	pub async fn build<SF, FF, AF>(
		self,
		factories: VestingFactories<SF, FF, AF>,
	) -> Result<VestingEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		FF: Fn(&toml::Value) -> Result<Box<dyn FundsInterface>, FundsError>,
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>,
	{
		let storage_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let funds_backend = load_primary(
			"funds",
			&self.config.funds.primary,
			&self.config.funds.implementations,
			&factories.funds_factories,
		)?;
		let funds = Arc::new(FundsService::new(funds_backend));

		let account = match &self.config.account {
			Some(account_config) => {
				let implementation = load_primary(
					"account",
					&account_config.primary,
					&account_config.implementations,
					&factories.account_factories,
				)?;
				let service = AccountService::new(implementation);
				match service.get_address().await {
					Ok(address) => {
						tracing::info!(component = "account", address = %address, "Operator account ready");
					},
					Err(e) => {
						tracing::error!(component = "account", error = %e, "Failed to get account address");
						return Err(BuilderError::Config(format!(
							"Failed to get account address: {}",
							e
						)));
					},
				}
				Some(Arc::new(service))
			},
			None => None,
		};

		// Log custody balances for monitoring
		let custodians = [
			("ledger", self.config.ledger.address),
			("escrow", self.config.escrow.address),
		];
		for (component, address) in custodians {
			match funds.balance(Currency::Native, address).await {
				Ok(balance) => {
					tracing::info!(
						component,
						address = %address,
						balance = %format_ether(balance),
						"Initial custody balance"
					);
				},
				Err(e) => {
					tracing::warn!(component, error = %e, "Failed to check custody balance");
				},
			}
		}

		tracing::info!(
			ledger = %self.config.ledger.id,
			chain_id = self.config.escrow.chain_id,
			peers = self.config.escrow.peers.len(),
			"Engine built"
		);

		Ok(VestingEngine::new(
			self.config,
			storage,
			funds,
			account,
			EventBus::new(1000),
		))
	}
}
