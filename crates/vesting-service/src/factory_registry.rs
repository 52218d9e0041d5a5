//! Dynamic factory registry for pluggable implementations.
//!
//! Collects every storage, funds and account implementation the crates
//! register, so the engine can be assembled from configuration alone.

use std::collections::HashMap;
use std::sync::OnceLock;
use vesting_account::AccountFactory;
use vesting_config::Config;
use vesting_core::{VestingBuilder, VestingEngine, VestingFactories};
use vesting_funds::FundsFactory;
use vesting_storage::StorageFactory;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub funds: HashMap<String, FundsFactory>,
	pub account: HashMap<String, AccountFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			funds: HashMap::new(),
			account: HashMap::new(),
		}
	}

	/// Register a storage implementation
	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	/// Register a funds implementation
	pub fn register_funds(&mut self, name: impl Into<String>, factory: FundsFactory) {
		self.funds.insert(name.into(), factory);
	}

	/// Register an account implementation
	pub fn register_account(&mut self, name: impl Into<String>, factory: AccountFactory) {
		self.account.insert(name.into(), factory);
	}
}

// Global registry instance
static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Initialize the global registry with all available implementations
pub fn initialize_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in vesting_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in vesting_funds::get_all_implementations() {
			tracing::debug!("Registering funds implementation: {}", name);
			registry.register_funds(name, factory);
		}

		for (name, factory) in vesting_account::get_all_implementations() {
			tracing::debug!("Registering account implementation: {}", name);
			registry.register_account(name, factory);
		}

		registry
	})
}

/// Macro to build factories from config implementations
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				let available_str = available.join(", ");
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name, name, available_str
				)
				.into());
			}
		}
		factories
	}};
}

/// Build the engine using the registry and config
pub async fn build_engine_from_config(
	config: Config,
) -> Result<VestingEngine, Box<dyn std::error::Error>> {
	let registry = initialize_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let funds_factories = build_factories!(registry, config.funds.implementations, funds, "funds");
	let account_factories = match &config.account {
		Some(account_config) => {
			build_factories!(registry, account_config.implementations, account, "account")
		},
		None => HashMap::new(),
	};

	let factories = VestingFactories {
		storage_factories,
		funds_factories,
		account_factories,
	};

	Ok(VestingBuilder::new(config).build(factories).await?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use vesting_config::builders::ConfigBuilder;

	#[test]
	fn test_registry_knows_all_implementations() {
		let registry = initialize_registry();
		assert!(registry.storage.contains_key("memory"));
		assert!(registry.storage.contains_key("file"));
		assert!(registry.funds.contains_key("memory"));
		assert!(registry.account.contains_key("local"));
	}

	#[tokio::test]
	async fn test_unknown_implementation_lists_available() {
		let mut config = ConfigBuilder::new().build();
		config
			.funds
			.implementations
			.insert("chain".to_string(), toml::Value::Table(toml::Table::new()));

		let err = build_engine_from_config(config).await.err().unwrap();
		let message = err.to_string();
		assert!(message.contains("Unknown funds implementation 'chain'"));
		assert!(message.contains("memory"));
	}
}
