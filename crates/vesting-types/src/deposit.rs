//! Vesting ledger records.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Who is calling and when, as supplied by the host executing the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
	pub caller: Address,
	/// Unix seconds of the block/time the call executes at.
	pub timestamp: u64,
}

impl CallContext {
	pub fn new(caller: Address, timestamp: u64) -> Self {
		Self { caller, timestamp }
	}
}

/// Currency a transfer is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
	Native,
	Token(Address),
}

impl Currency {
	/// The zero address denotes the native currency, as in permits.
	pub fn from_address(address: Address) -> Self {
		if address.is_zero() {
			Currency::Native
		} else {
			Currency::Token(address)
		}
	}
}

/// One vesting slot held for a beneficiary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
	pub beneficiary: Address,
	pub created_at: u64,
	pub sum_deposited: U256,
	pub sum_paid_already: U256,
}

impl Deposit {
	pub fn new(beneficiary: Address, created_at: u64, sum_deposited: U256) -> Self {
		Self {
			beneficiary,
			created_at,
			sum_deposited,
			sum_paid_already: U256::ZERO,
		}
	}

	pub fn sum_left_to_pay(&self) -> U256 {
		self.sum_deposited.saturating_sub(self.sum_paid_already)
	}
}

/// Flattened view of a slot used for audit export and successor restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
	pub owner: Address,
	/// 1-based position of the slot in the owner's list.
	pub deposit_id: u32,
	pub timestamp: u64,
	pub sum_deposited: U256,
	pub sum_paid_already: U256,
	pub sum_left_to_pay: U256,
}

impl DepositRecord {
	pub fn from_deposit(deposit_id: u32, deposit: &Deposit) -> Self {
		Self {
			owner: deposit.beneficiary,
			deposit_id,
			timestamp: deposit.created_at,
			sum_deposited: deposit.sum_deposited,
			sum_paid_already: deposit.sum_paid_already,
			sum_left_to_pay: deposit.sum_left_to_pay(),
		}
	}
}
