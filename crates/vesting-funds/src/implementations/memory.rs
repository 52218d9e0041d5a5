//! In-memory funds backend.
//!
//! Tracks balances and allowances in process memory. Handles are cheap to
//! clone and share state, so a test can keep one to mint and approve while
//! the service owns another.

use crate::{FundsError, FundsFactory, FundsInterface, FundsRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use vesting_types::{
	Address, ConfigSchema, Currency, Field, FieldType, ImplementationRegistry, Schema,
	ValidationError, U256,
};

#[derive(Default)]
struct Ledgers {
	balances: HashMap<(Currency, Address), U256>,
	allowances: HashMap<(Address, Address, Address), U256>,
}

impl Ledgers {
	fn balance(&self, currency: Currency, account: Address) -> U256 {
		self.balances
			.get(&(currency, account))
			.copied()
			.unwrap_or_default()
	}

	fn move_balance(
		&mut self,
		currency: Currency,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), FundsError> {
		let available = self.balance(currency, from);
		if available < amount {
			return Err(FundsError::InsufficientBalance {
				account: from,
				needed: amount,
				available,
			});
		}
		self.balances.insert((currency, from), available - amount);
		let credited = self.balance(currency, to).saturating_add(amount);
		self.balances.insert((currency, to), credited);
		Ok(())
	}
}

/// In-memory funds implementation.
#[derive(Clone, Default)]
pub struct MemoryFunds {
	state: Arc<RwLock<Ledgers>>,
}

impl MemoryFunds {
	pub fn new() -> Self {
		Self::default()
	}

	/// Credits `amount` to `account` out of thin air.
	pub async fn mint(&self, currency: Currency, account: Address, amount: U256) {
		let mut state = self.state.write().await;
		let credited = state.balance(currency, account).saturating_add(amount);
		state.balances.insert((currency, account), credited);
	}

	/// Sets the allowance of `spender` over `owner`'s tokens.
	pub async fn approve(&self, token: Address, owner: Address, spender: Address, amount: U256) {
		let mut state = self.state.write().await;
		state.allowances.insert((token, owner, spender), amount);
	}
}

#[async_trait]
impl FundsInterface for MemoryFunds {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryFundsSchema)
	}

	async fn balance(&self, currency: Currency, account: Address) -> Result<U256, FundsError> {
		Ok(self.state.read().await.balance(currency, account))
	}

	async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, FundsError> {
		let state = self.state.read().await;
		Ok(state
			.allowances
			.get(&(token, owner, spender))
			.copied()
			.unwrap_or_default())
	}

	async fn transfer(
		&self,
		currency: Currency,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), FundsError> {
		self.state
			.write()
			.await
			.move_balance(currency, from, to, amount)
	}

	async fn transfer_from(
		&self,
		token: Address,
		spender: Address,
		owner: Address,
		to: Address,
		amount: U256,
	) -> Result<(), FundsError> {
		let mut state = self.state.write().await;
		let key = (token, owner, spender);
		let approved = state.allowances.get(&key).copied().unwrap_or_default();
		if approved < amount {
			return Err(FundsError::InsufficientAllowance {
				owner,
				spender,
				needed: amount,
				approved,
			});
		}
		state.move_balance(Currency::Token(token), owner, to, amount)?;
		state.allowances.insert(key, approved - amount);
		Ok(())
	}
}

/// Configuration schema for MemoryFunds.
///
/// Accepts an optional `balances` array seeding accounts at startup:
/// `{ account = "0x..", amount = "1000", token = "0x.." }`, `token` omitted
/// for the native currency. Amounts are decimal strings.
pub struct MemoryFundsSchema;

impl ConfigSchema for MemoryFundsSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let entry = Schema::new(
			vec![
				Field::new("account", FieldType::Address),
				Field::new("amount", FieldType::Amount),
			],
			vec![Field::new("token", FieldType::Address)],
		);
		Schema::new(
			vec![],
			vec![Field::new(
				"balances",
				FieldType::Array(Box::new(FieldType::Table(entry))),
			)],
		)
		.validate(config)
	}
}

/// Factory function to create a memory funds backend from configuration.
pub fn create_funds(config: &toml::Value) -> Result<Box<dyn FundsInterface>, FundsError> {
	MemoryFundsSchema
		.validate(config)
		.map_err(|e| FundsError::Configuration(e.to_string()))?;

	let mut ledgers = Ledgers::default();
	let entries = config
		.get("balances")
		.and_then(|v| v.as_array())
		.cloned()
		.unwrap_or_default();
	for entry in entries {
		let parse_address = |field: &str| -> Result<Option<Address>, FundsError> {
			entry
				.get(field)
				.and_then(|v| v.as_str())
				.map(|s| {
					s.parse::<Address>()
						.map_err(|e| FundsError::Configuration(e.to_string()))
				})
				.transpose()
		};
		let account = parse_address("account")?
			.ok_or_else(|| FundsError::Configuration("balance entry without account".into()))?;
		let currency = parse_address("token")?.map_or(Currency::Native, Currency::Token);
		let amount = entry
			.get("amount")
			.and_then(|v| v.as_str())
			.and_then(|s| s.parse::<U256>().ok())
			.ok_or_else(|| FundsError::Configuration("balance entry without amount".into()))?;

		let credited = ledgers.balance(currency, account).saturating_add(amount);
		ledgers.balances.insert((currency, account), credited);
	}

	Ok(Box::new(MemoryFunds {
		state: Arc::new(RwLock::new(ledgers)),
	}))
}

/// Registry for the memory funds implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = FundsFactory;

	fn factory() -> Self::Factory {
		create_funds
	}
}

impl FundsRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::FundsService;

	fn addr(byte: u8) -> Address {
		Address::repeat_byte(byte)
	}

	#[tokio::test]
	async fn test_native_collect_and_pay() {
		let funds = MemoryFunds::new();
		let service = FundsService::new(Box::new(funds.clone()));
		funds.mint(Currency::Native, addr(1), U256::from(100)).await;

		service
			.collect(Currency::Native, addr(1), addr(9), U256::from(60))
			.await
			.unwrap();
		service
			.pay(Currency::Native, addr(9), addr(2), U256::from(25))
			.await
			.unwrap();

		assert_eq!(service.balance(Currency::Native, addr(1)).await.unwrap(), U256::from(40));
		assert_eq!(service.balance(Currency::Native, addr(9)).await.unwrap(), U256::from(35));
		assert_eq!(service.balance(Currency::Native, addr(2)).await.unwrap(), U256::from(25));
	}

	#[tokio::test]
	async fn test_token_collect_consumes_allowance() {
		let token = addr(0x50);
		let funds = MemoryFunds::new();
		let service = FundsService::new(Box::new(funds.clone()));
		funds.mint(Currency::Token(token), addr(1), U256::from(100)).await;

		let err = service
			.collect(Currency::Token(token), addr(1), addr(9), U256::from(10))
			.await
			.unwrap_err();
		assert!(matches!(err, FundsError::InsufficientAllowance { .. }));

		funds.approve(token, addr(1), addr(9), U256::from(30)).await;
		service
			.collect(Currency::Token(token), addr(1), addr(9), U256::from(10))
			.await
			.unwrap();

		assert_eq!(
			service.allowance(token, addr(1), addr(9)).await.unwrap(),
			U256::from(20)
		);
		assert_eq!(
			service.balance(Currency::Token(token), addr(9)).await.unwrap(),
			U256::from(10)
		);
		// Native balance is untouched by token moves.
		assert_eq!(service.balance(Currency::Native, addr(9)).await.unwrap(), U256::ZERO);
	}

	#[tokio::test]
	async fn test_overdraw_leaves_balances_unchanged() {
		let funds = MemoryFunds::new();
		funds.mint(Currency::Native, addr(1), U256::from(5)).await;

		let err = funds
			.transfer(Currency::Native, addr(1), addr(2), U256::from(6))
			.await
			.unwrap_err();
		assert!(matches!(err, FundsError::InsufficientBalance { .. }));
		assert_eq!(
			funds.balance(Currency::Native, addr(1)).await.unwrap(),
			U256::from(5)
		);
		assert_eq!(funds.balance(Currency::Native, addr(2)).await.unwrap(), U256::ZERO);
	}

	#[tokio::test]
	async fn test_factory_seeds_balances() {
		let config: toml::Value = toml::from_str(
			r#"
[[balances]]
account = "0x0101010101010101010101010101010101010101"
amount = "1000000000000000000"

[[balances]]
account = "0x0101010101010101010101010101010101010101"
token = "0x5050505050505050505050505050505050505050"
amount = "42"
"#,
		)
		.unwrap();

		let funds = create_funds(&config).unwrap();
		assert_eq!(
			funds.balance(Currency::Native, addr(1)).await.unwrap(),
			U256::from(1_000_000_000_000_000_000u128)
		);
		assert_eq!(
			funds
				.balance(Currency::Token(addr(0x50)), addr(1))
				.await
				.unwrap(),
			U256::from(42)
		);
	}

	#[test]
	fn test_factory_rejects_bad_amount() {
		let config: toml::Value = toml::from_str(
			r#"
[[balances]]
account = "0x0101010101010101010101010101010101010101"
amount = "1.5"
"#,
		)
		.unwrap();
		assert!(matches!(
			create_funds(&config),
			Err(FundsError::Configuration(_))
		));
	}
}
