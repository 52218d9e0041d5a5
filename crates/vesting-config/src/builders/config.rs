//! Configuration builder for tests and local runs.
//!
//! Produces a complete, valid `Config` backed by the in-memory storage and
//! funds implementations, so tests only override what they exercise.

use crate::{AccountConfig, Config, EscrowConfig, FundsConfig, LedgerConfig, StorageConfig};
use std::collections::HashMap;
use vesting_types::{Address, PeersConfig};

/// Well-known development key (first Anvil/Hardhat account).
pub const DEV_PRIVATE_KEY: &str =
	"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Builder for creating `Config` instances with a fluent API.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	ledger_id: String,
	ledger_address: Address,
	admin: Address,
	migrator: Address,
	max_deposits: u32,
	number_of_payments: u32,
	time_between_payments: u64,
	upfront_installment: bool,
	chain_id: u64,
	escrow_address: Address,
	designated_token: Option<Address>,
	peers: PeersConfig,
	private_key: Option<String>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		Self {
			ledger_id: "test-ledger".to_string(),
			ledger_address: Address::repeat_byte(0x10),
			admin: Address::repeat_byte(0xad),
			migrator: Address::repeat_byte(0x30),
			max_deposits: 5,
			number_of_payments: 24,
			time_between_payments: 2_592_000,
			upfront_installment: false,
			chain_id: 1,
			escrow_address: Address::repeat_byte(0x40),
			designated_token: Some(Address::repeat_byte(0x50)),
			peers: HashMap::new(),
			private_key: None,
		}
	}

	pub fn ledger_id(mut self, id: impl Into<String>) -> Self {
		self.ledger_id = id.into();
		self
	}

	pub fn ledger_address(mut self, address: Address) -> Self {
		self.ledger_address = address;
		self
	}

	pub fn admin(mut self, admin: Address) -> Self {
		self.admin = admin;
		self
	}

	pub fn migrator(mut self, migrator: Address) -> Self {
		self.migrator = migrator;
		self
	}

	pub fn max_deposits(mut self, max: u32) -> Self {
		self.max_deposits = max;
		self
	}

	pub fn number_of_payments(mut self, payments: u32) -> Self {
		self.number_of_payments = payments;
		self
	}

	pub fn time_between_payments(mut self, seconds: u64) -> Self {
		self.time_between_payments = seconds;
		self
	}

	pub fn upfront_installment(mut self, enabled: bool) -> Self {
		self.upfront_installment = enabled;
		self
	}

	pub fn chain_id(mut self, chain_id: u64) -> Self {
		self.chain_id = chain_id;
		self
	}

	pub fn escrow_address(mut self, address: Address) -> Self {
		self.escrow_address = address;
		self
	}

	pub fn designated_token(mut self, token: Option<Address>) -> Self {
		self.designated_token = token;
		self
	}

	/// Registers an escrow instance on another chain.
	pub fn peer(mut self, chain_id: u64, address: Address) -> Self {
		self.peers.insert(chain_id, address);
		self
	}

	/// Adds a `local` account section signing with `private_key`.
	pub fn private_key(mut self, private_key: impl Into<String>) -> Self {
		self.private_key = Some(private_key.into());
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let memory = || {
			HashMap::from([(
				"memory".to_string(),
				toml::Value::Table(toml::Table::new()),
			)])
		};

		let account = self.private_key.map(|key| {
			let mut table = toml::Table::new();
			table.insert("private_key".to_string(), toml::Value::String(key));
			AccountConfig {
				primary: "local".to_string(),
				implementations: HashMap::from([("local".to_string(), toml::Value::Table(table))]),
			}
		});

		Config {
			ledger: LedgerConfig {
				id: self.ledger_id,
				address: self.ledger_address,
				admin: self.admin,
				migrator: self.migrator,
				max_deposits: self.max_deposits,
				number_of_payments: self.number_of_payments,
				time_between_payments: self.time_between_payments,
				upfront_installment: self.upfront_installment,
			},
			escrow: EscrowConfig {
				name: "LockedDeposit".to_string(),
				version: "1".to_string(),
				chain_id: self.chain_id,
				address: self.escrow_address,
				designated_token: self.designated_token,
				peers: self.peers,
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: memory(),
			},
			funds: FundsConfig {
				primary: "memory".to_string(),
				implementations: memory(),
			},
			account,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_build_is_valid() {
		let config = ConfigBuilder::new().build();
		assert!(config.validate().is_ok());
		assert!(config.account.is_none());
	}

	#[test]
	fn test_overrides_and_account() {
		let config = ConfigBuilder::new()
			.chain_id(121713)
			.peer(1, Address::repeat_byte(0x41))
			.upfront_installment(true)
			.private_key(DEV_PRIVATE_KEY)
			.build();

		assert!(config.validate().is_ok());
		assert_eq!(config.escrow.chain_id, 121713);
		assert!(config.ledger.upfront_installment);
		assert_eq!(config.account.unwrap().primary, "local");
	}
}
