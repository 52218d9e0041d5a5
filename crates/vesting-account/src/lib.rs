//! Account management module for permit signing.
//!
//! Parties of a locked deposit sign permits off-chain; this module provides the
//! signing side of that exchange. An account exposes its address and produces
//! `{v, r, s}` signatures over EIP-712 digests.

use async_trait::async_trait;
use thiserror::Error;
use vesting_types::{
	Address, ConfigSchema, ImplementationRegistry, Permit, PermitDomain, PermitSignature, B256,
};

/// Re-export implementations
pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// Error that occurs when signing operations fail.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// Error that occurs when a cryptographic key is invalid or malformed.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Error that occurs when interacting with the account implementation.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Trait defining the interface for account implementations.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Retrieves the address associated with this account.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a 32-byte digest without any message prefix.
	///
	/// The returned `v` is 27 or 28.
	async fn sign_hash(&self, hash: &B256) -> Result<PermitSignature, AccountError>;
}

/// Type alias for account factory functions.
pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Get all registered account implementations.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service that manages account operations.
pub struct AccountService {
	/// The underlying account implementation.
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	/// Creates a new AccountService with the specified implementation.
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	/// Retrieves the address associated with the managed account.
	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Signs `permit` under `domain`, returning the digest and the signature.
	///
	/// Signing a mirror for a peer chain is the same call with the permit's
	/// chain id and the peer's domain.
	pub async fn sign_permit(
		&self,
		permit: &Permit,
		domain: &PermitDomain,
	) -> Result<(B256, PermitSignature), AccountError> {
		let hash = permit.signing_hash(domain);
		let signature = self.implementation.sign_hash(&hash).await?;
		tracing::debug!(
			permit_hash = %hash,
			chain_id = permit.chain_id,
			"Signed deposit permit"
		);
		Ok((hash, signature))
	}
}
