//! Operator commands.
//!
//! Each command runs against a fully built engine and returns a serializable
//! report; `main` prints it as JSON.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use vesting_account::AccountError;
use vesting_core::{EscrowError, LedgerError, VestingEngine};
use vesting_types::{
	with_0x_prefix, without_0x_prefix, Address, DepositRecord, Permit, PermitError,
	PermitSignature, B256, U256,
};

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
	#[error("Hex error: {0}")]
	Hex(#[from] hex::FromHexError),
	#[error(transparent)]
	Permit(#[from] PermitError),
	#[error(transparent)]
	Escrow(#[from] EscrowError),
	#[error(transparent)]
	Ledger(#[from] LedgerError),
	#[error(transparent)]
	Account(#[from] AccountError),
	#[error("No [account] configured; signing needs one")]
	MissingAccount,
	#[error("Invalid input: {0}")]
	InvalidInput(String),
}

/// Where a permit is read from.
#[derive(Debug, Clone)]
pub enum PermitSource {
	/// JSON file with the permit's message fields.
	Json(PathBuf),
	/// Hex of the 256-byte canonical ABI encoding.
	Encoded(String),
}

pub fn load_permit(source: &PermitSource) -> Result<Permit, CommandError> {
	match source {
		PermitSource::Json(path) => Ok(serde_json::from_slice(&std::fs::read(path)?)?),
		PermitSource::Encoded(data) => Ok(Permit::decode_data(&hex::decode(
			without_0x_prefix(data.trim()),
		)?)?),
	}
}

/// Parses a packed 65-byte `r || s || v` signature.
pub fn parse_signature(data: &str) -> Result<PermitSignature, CommandError> {
	let bytes = hex::decode(without_0x_prefix(data.trim()))?;
	Ok(PermitSignature::from_bytes(&bytes)?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitDigest {
	pub permit_hash: B256,
	pub struct_hash: B256,
	pub chain_id: u64,
	pub verifying_contract: Address,
	/// Canonical ABI encoding, usable as `--encoded` input.
	pub encoded: String,
}

/// Digest of `permit` under the domain of its own chain.
pub fn permit_hash(engine: &VestingEngine, permit: &Permit) -> Result<PermitDigest, CommandError> {
	let domain = engine.escrow().domain_for(permit.chain_id)?;
	Ok(PermitDigest {
		permit_hash: permit.signing_hash(&domain),
		struct_hash: permit.struct_hash(),
		chain_id: domain.chain_id,
		verifying_contract: domain.verifying_contract,
		encoded: with_0x_prefix(&hex::encode(permit.encode_data())),
	})
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPermit {
	pub permit_hash: B256,
	pub signer: Address,
	pub signature: PermitSignature,
	/// Packed `r || s || v`, usable as `--signature` input.
	pub packed: String,
}

/// Signs `permit` with the configured account.
pub async fn sign_permit(
	engine: &VestingEngine,
	permit: &Permit,
) -> Result<SignedPermit, CommandError> {
	let account = engine.account().ok_or(CommandError::MissingAccount)?;
	let domain = engine.escrow().domain_for(permit.chain_id)?;
	let (permit_hash, signature) = account.sign_permit(permit, &domain).await?;
	Ok(SignedPermit {
		permit_hash,
		signer: account.get_address().await?,
		packed: with_0x_prefix(&hex::encode(signature.to_bytes())),
		signature,
	})
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveredSigner {
	pub permit_hash: B256,
	pub signer: Address,
	/// Whether the signer is a party of the permit.
	pub is_party: bool,
}

pub fn recover_signer(
	engine: &VestingEngine,
	permit: &Permit,
	signature: &PermitSignature,
) -> Result<RecoveredSigner, CommandError> {
	let domain = engine.escrow().domain_for(permit.chain_id)?;
	let permit_hash = permit.signing_hash(&domain);
	let signer = signature.recover(&permit_hash)?;
	Ok(RecoveredSigner {
		permit_hash,
		signer,
		is_party: permit.is_party(signer),
	})
}

/// Audit export of every live slot.
pub async fn export_deposits(engine: &VestingEngine) -> Result<Vec<DepositRecord>, CommandError> {
	Ok(engine.ledger().get_all_deposits().await?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
	pub beneficiary: Address,
	pub timestamp: u64,
	pub deposits: u32,
	pub available: U256,
	pub remaining: U256,
}

pub async fn available(
	engine: &VestingEngine,
	beneficiary: Address,
	timestamp: u64,
) -> Result<Availability, CommandError> {
	let ledger = engine.ledger();
	Ok(Availability {
		beneficiary,
		timestamp,
		deposits: ledger.deposits_counter(beneficiary).await?,
		available: ledger
			.available_for_all_deposits(beneficiary, timestamp)
			.await?,
		remaining: ledger.remaining_for_all_deposits(beneficiary).await?,
	})
}
