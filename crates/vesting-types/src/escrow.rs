//! Locked deposit deal records.

use crate::{Permit, PermitSignature};
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a deal: the investor it belongs to and its slot for that investor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealKey {
	pub investor: Address,
	pub slot: u64,
}

impl DealKey {
	pub fn new(investor: Address, slot: u64) -> Self {
		Self { investor, slot }
	}

	/// Storage id, `<investor>:<slot>`.
	pub fn storage_id(&self) -> String {
		format!("{:#x}:{}", self.investor, self.slot)
	}
}

impl fmt::Display for DealKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#x}#{}", self.investor, self.slot)
	}
}

/// Lifecycle of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealStatus {
	/// Permit registered by the team, nothing escrowed yet.
	Created,
	/// Funds escrowed by one of the parties.
	Deposited,
	/// The non-depositing party countersigned.
	Approved,
	/// Escrow released to the beneficiary.
	Claimed,
	/// Escrow refunded after the deadline.
	Reclaimed,
}

impl DealStatus {
	/// Claimed and Reclaimed deals accept no further calls.
	pub fn is_resolved(&self) -> bool {
		matches!(self, DealStatus::Claimed | DealStatus::Reclaimed)
	}
}

/// A stored deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowDeal {
	pub key: DealKey,
	pub permit: Permit,
	/// Signing hash of `permit` under the local domain.
	pub permit_hash: B256,
	pub status: DealStatus,
	/// Party whose funds are escrowed.
	pub depositor: Option<Address>,
	/// Countersignature retained by `approve`.
	pub approval: Option<PermitSignature>,
	pub created_at: u64,
	pub updated_at: u64,
}

impl EscrowDeal {
	/// The party entitled to the escrow once the deal is approved.
	pub fn beneficiary(&self) -> Option<Address> {
		self.depositor
			.and_then(|depositor| self.permit.counterparty(depositor))
	}
}
