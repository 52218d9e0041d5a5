//! Deposit permits and their EIP-712 encoding.
//!
//! A permit is the immutable 8-field record both parties of a locked deposit
//! sign off-chain. Its canonical ABI encoding is shared by struct hashing and
//! by the compact byte form used for transport, so a permit always hashes the
//! same way no matter where it was loaded from.

use crate::utils::eip712::{
	compute_domain_hash, compute_final_digest, AbiDecodeError, Eip712AbiDecoder,
	Eip712AbiEncoder,
};
use alloy_primitives::{keccak256, Address, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EIP-712 type string of the permit's primary type.
pub const PERMIT_TYPE: &str = "ApproveDepositPermit(uint256 amount,uint256 createdAt,uint256 deadline,address investor,address team,address currency,address vestingContractAddress,uint256 chainId)";

/// Number of ABI words in a permit's encoded data.
pub const PERMIT_FIELDS: usize = 8;

/// Errors raised while decoding or verifying permits.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermitError {
	/// The signature triple is malformed or recovers no key.
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	/// The byte form of a permit could not be decoded.
	#[error("Malformed permit: {0}")]
	Malformed(#[from] AbiDecodeError),
}

/// EIP-712 domain a permit signature is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitDomain {
	pub name: String,
	pub version: String,
	pub chain_id: u64,
	pub verifying_contract: Address,
}

impl PermitDomain {
	pub fn new(
		name: impl Into<String>,
		version: impl Into<String>,
		chain_id: u64,
		verifying_contract: Address,
	) -> Self {
		Self {
			name: name.into(),
			version: version.into(),
			chain_id,
			verifying_contract,
		}
	}

	/// Domain separator hash.
	pub fn separator(&self) -> B256 {
		compute_domain_hash(
			&self.name,
			&self.version,
			self.chain_id,
			&self.verifying_contract,
		)
	}
}

/// Off-chain signed authorization for one locked deposit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit {
	/// Amount to be escrowed, in the smallest unit of `currency`.
	pub amount: U256,
	pub created_at: u64,
	/// After this timestamp the investor may reclaim an unapproved deposit.
	pub deadline: u64,
	pub investor: Address,
	pub team: Address,
	/// Zero address for the native currency.
	pub currency: Address,
	pub vesting_contract_address: Address,
	pub chain_id: u64,
}

impl Permit {
	/// Canonical ABI encoding of the eight fields (without the type hash).
	pub fn encode_data(&self) -> Vec<u8> {
		let mut enc = Eip712AbiEncoder::new();
		enc.push_u256(self.amount);
		enc.push_u64(self.created_at);
		enc.push_u64(self.deadline);
		enc.push_address(&self.investor);
		enc.push_address(&self.team);
		enc.push_address(&self.currency);
		enc.push_address(&self.vesting_contract_address);
		enc.push_u64(self.chain_id);
		enc.finish()
	}

	/// Inverse of [`Permit::encode_data`].
	pub fn decode_data(bytes: &[u8]) -> Result<Self, PermitError> {
		let dec = Eip712AbiDecoder::new(bytes, PERMIT_FIELDS)?;
		Ok(Self {
			amount: dec.u256(0),
			created_at: dec.u64(1)?,
			deadline: dec.u64(2)?,
			investor: dec.address(3)?,
			team: dec.address(4)?,
			currency: dec.address(5)?,
			vesting_contract_address: dec.address(6)?,
			chain_id: dec.u64(7)?,
		})
	}

	/// keccak256(typeHash || encodeData).
	pub fn struct_hash(&self) -> B256 {
		let mut buf = Vec::with_capacity(32 * (PERMIT_FIELDS + 1));
		buf.extend_from_slice(keccak256(PERMIT_TYPE.as_bytes()).as_slice());
		buf.extend_from_slice(&self.encode_data());
		keccak256(buf)
	}

	/// Digest that parties sign for this permit under `domain`.
	pub fn signing_hash(&self, domain: &PermitDomain) -> B256 {
		compute_final_digest(&domain.separator(), &self.struct_hash())
	}

	/// The same deal expressed for another chain.
	pub fn with_chain_id(&self, chain_id: u64) -> Self {
		Self {
			chain_id,
			..self.clone()
		}
	}

	/// Returns the other party of the deal, or `None` if `party` is neither.
	pub fn counterparty(&self, party: Address) -> Option<Address> {
		if party == self.team {
			Some(self.investor)
		} else if party == self.investor {
			Some(self.team)
		} else {
			None
		}
	}

	pub fn is_party(&self, address: Address) -> bool {
		address == self.team || address == self.investor
	}
}
