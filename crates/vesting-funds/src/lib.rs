//! Funds custody module for the vesting ledger and escrow.
//!
//! Ledger and escrow never hold balances themselves; every movement of the
//! native currency or the designated token goes through a funds backend. The
//! backend stands in for the chain's value transfers: native value attached to
//! a call, ERC20-style pulls through a pre-approved allowance, and payouts
//! from a custody account.

use async_trait::async_trait;
use thiserror::Error;
use vesting_types::{format_ether, Address, ConfigSchema, Currency, ImplementationRegistry, U256};

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during funds operations.
#[derive(Debug, Error)]
pub enum FundsError {
	/// The paying account does not hold enough of the currency.
	#[error("Insufficient balance of {account}: needed {needed}, available {available}")]
	InsufficientBalance {
		account: Address,
		needed: U256,
		available: U256,
	},
	/// The spender was not approved for enough tokens.
	#[error("Insufficient allowance from {owner} to {spender}: needed {needed}, approved {approved}")]
	InsufficientAllowance {
		owner: Address,
		spender: Address,
		needed: U256,
		approved: U256,
	},
	/// The backend refused or failed the transfer.
	#[error("Transfer failed: {0}")]
	TransferFailed(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the interface for funds backends.
#[async_trait]
pub trait FundsInterface: Send + Sync {
	/// Returns the configuration schema for this funds implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Balance of `account` in `currency`.
	async fn balance(&self, currency: Currency, account: Address) -> Result<U256, FundsError>;

	/// Tokens `spender` may still pull from `owner`.
	async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, FundsError>;

	/// Moves `amount` from `from` to `to`, as the owner of the funds.
	async fn transfer(
		&self,
		currency: Currency,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), FundsError>;

	/// Moves `amount` tokens from `owner` to `to` on behalf of `spender`,
	/// consuming allowance.
	async fn transfer_from(
		&self,
		token: Address,
		spender: Address,
		owner: Address,
		to: Address,
		amount: U256,
	) -> Result<(), FundsError>;
}

/// Type alias for funds factory functions.
pub type FundsFactory = fn(&toml::Value) -> Result<Box<dyn FundsInterface>, FundsError>;

/// Registry trait for funds implementations.
pub trait FundsRegistry: ImplementationRegistry<Factory = FundsFactory> {}

/// Get all registered funds implementations.
pub fn get_all_implementations() -> Vec<(&'static str, FundsFactory)> {
	use implementations::memory;

	vec![(memory::Registry::NAME, memory::Registry::factory())]
}

/// Service that moves funds in and out of a custody account.
pub struct FundsService {
	/// The underlying funds backend.
	implementation: Box<dyn FundsInterface>,
}

impl FundsService {
	/// Creates a new FundsService with the specified backend.
	pub fn new(implementation: Box<dyn FundsInterface>) -> Self {
		Self { implementation }
	}

	/// Takes `amount` from `payer` into `custody`.
	///
	/// Native value is transferred as if attached to the call. Tokens are
	/// pulled with `custody` as the spender, so the payer must have approved
	/// it beforehand.
	pub async fn collect(
		&self,
		currency: Currency,
		payer: Address,
		custody: Address,
		amount: U256,
	) -> Result<(), FundsError> {
		match currency {
			Currency::Native => {
				self.implementation
					.transfer(currency, payer, custody, amount)
					.await?
			},
			Currency::Token(token) => {
				self.implementation
					.transfer_from(token, custody, payer, custody, amount)
					.await?
			},
		}
		tracing::debug!(
			?currency,
			payer = %payer,
			custody = %custody,
			amount = %format_ether(amount),
			"Collected funds"
		);
		Ok(())
	}

	/// Pays `amount` out of `custody` to `recipient`.
	pub async fn pay(
		&self,
		currency: Currency,
		custody: Address,
		recipient: Address,
		amount: U256,
	) -> Result<(), FundsError> {
		self.implementation
			.transfer(currency, custody, recipient, amount)
			.await?;
		tracing::debug!(
			?currency,
			custody = %custody,
			recipient = %recipient,
			amount = %format_ether(amount),
			"Paid out funds"
		);
		Ok(())
	}

	/// Balance of `account` in `currency`.
	pub async fn balance(&self, currency: Currency, account: Address) -> Result<U256, FundsError> {
		self.implementation.balance(currency, account).await
	}

	/// Remaining allowance of `spender` over `owner`'s tokens.
	pub async fn allowance(
		&self,
		token: Address,
		owner: Address,
		spender: Address,
	) -> Result<U256, FundsError> {
		self.implementation.allowance(token, owner, spender).await
	}
}
