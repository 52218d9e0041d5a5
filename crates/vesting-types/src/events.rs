//! Event types emitted by the ledger and the escrow.
//!
//! Events flow through the core's event bus after an operation has fully
//! committed. `DepositMade` is consumed by external log scanners that rebuild
//! the set of beneficiaries, so exactly one is published per deposit.

use crate::DealKey;
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Main event type encompassing all emitted events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VestingEvent {
	/// Events from the vesting ledger.
	Ledger(LedgerEvent),
	/// Events from the locked deposit escrow.
	Escrow(EscrowEvent),
}

/// Events related to vesting deposits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all_fields = "camelCase")]
pub enum LedgerEvent {
	/// A deposit slot was appended for a beneficiary.
	DepositMade {
		beneficiary: Address,
		deposit_id: u32,
		timestamp: u64,
		amount: U256,
		depositor: Address,
	},
	/// Vested funds were paid out.
	Withdrawn {
		beneficiary: Address,
		amount: U256,
		timestamp: u64,
	},
	/// All slots of `from` now belong to `to`.
	DepositRightsTransferred {
		from: Address,
		to: Address,
		deposits: u32,
	},
	/// Remaining balance of `owner` was sent to the migrator.
	Migrated {
		owner: Address,
		migrator: Address,
		amount: U256,
	},
	/// The deposit index was seeded in bulk.
	IndexCreated { size: usize },
	/// Slots were re-created from a predecessor's export.
	DepositsRestored { count: usize, amount: U256 },
}

/// Events related to locked deposit deals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
	DealCreated {
		key: DealKey,
		permit_hash: B256,
	},
	DealFunded {
		key: DealKey,
		depositor: Address,
		amount: U256,
	},
	DealApproved {
		key: DealKey,
		signer: Address,
		/// Hash the retained signature was produced over.
		signed_hash: B256,
	},
	DealClaimed {
		key: DealKey,
		beneficiary: Address,
		amount: U256,
	},
	DealReclaimed {
		key: DealKey,
		recipient: Address,
		amount: U256,
	},
}

/// Unique beneficiaries of `DepositMade` events, in first-seen order.
pub fn unique_beneficiaries<'a, I>(events: I) -> Vec<Address>
where
	I: IntoIterator<Item = &'a LedgerEvent>,
{
	let mut seen = HashSet::new();
	events
		.into_iter()
		.filter_map(|event| match event {
			LedgerEvent::DepositMade { beneficiary, .. } => Some(*beneficiary),
			_ => None,
		})
		.filter(|beneficiary| seen.insert(*beneficiary))
		.collect()
}
