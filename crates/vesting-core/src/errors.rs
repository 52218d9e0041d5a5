//! Error types for ledger and escrow operations.
//!
//! Every rejection is synchronous and leaves no partial state behind. Callers
//! branch on [`ErrorKind`] and on the stable `reason()` code rather than on
//! the display text, which may change.

use crate::state::DealStateError;
use thiserror::Error;
use vesting_funds::FundsError;
use vesting_storage::StorageError;
use vesting_types::{Address, DealKey, DealStatus, PermitError, U256};

/// Coarse classification of a rejected operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// Malformed or inconsistent input.
	Validation,
	/// The caller may not perform the operation.
	Authorization,
	/// The operation does not apply to the current state.
	State,
	/// A time precondition is not met yet, or no longer.
	Temporal,
	/// Storage or funds backend failure.
	Infrastructure,
}

fn funds_kind(error: &FundsError) -> (ErrorKind, &'static str) {
	match error {
		FundsError::InsufficientBalance { .. } | FundsError::InsufficientAllowance { .. } => {
			(ErrorKind::Validation, "INSUFFICIENT_FUNDS")
		},
		_ => (ErrorKind::Infrastructure, "FUNDS_TRANSFER_FAILED"),
	}
}

/// Errors returned by the vesting ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("Amount must be greater than zero")]
	ZeroAmount,
	#[error("Invalid address for {0}")]
	InvalidAddress(&'static str),
	#[error("Max deposit number for this address reached ({max})")]
	DepositLimitExceeded { beneficiary: Address, max: u32 },
	#[error("Only empty account is allowed: {0} already holds deposits")]
	AccountNotEmpty(Address),
	#[error("No deposits held by {0}")]
	NoDeposits(Address),
	#[error("keyArray is already initialized")]
	AlreadyInitialized,
	#[error("Caller {caller} is not allowed to {operation}")]
	Unauthorized {
		caller: Address,
		operation: &'static str,
	},
	#[error("Deposit {deposit_id} of {owner} not found")]
	DepositNotFound { owner: Address, deposit_id: u32 },
	#[error("Invalid deposit record: {0}")]
	InvalidRecord(String),
	#[error("Restored deposits need {needed} of backing, only {available} is unallocated")]
	InsufficientBacking { needed: U256, available: U256 },
	#[error("Funds error: {0}")]
	Funds(#[from] FundsError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl LedgerError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			LedgerError::ZeroAmount
			| LedgerError::InvalidAddress(_)
			| LedgerError::DepositNotFound { .. }
			| LedgerError::InvalidRecord(_) => ErrorKind::Validation,
			LedgerError::Unauthorized { .. } => ErrorKind::Authorization,
			LedgerError::DepositLimitExceeded { .. }
			| LedgerError::AccountNotEmpty(_)
			| LedgerError::NoDeposits(_)
			| LedgerError::AlreadyInitialized
			| LedgerError::InsufficientBacking { .. } => ErrorKind::State,
			LedgerError::Funds(e) => funds_kind(e).0,
			LedgerError::Storage(_) => ErrorKind::Infrastructure,
		}
	}

	/// Stable machine-checkable code.
	pub fn reason(&self) -> &'static str {
		match self {
			LedgerError::ZeroAmount => "ZERO_AMOUNT",
			LedgerError::InvalidAddress(_) => "INVALID_ADDRESS",
			LedgerError::DepositLimitExceeded { .. } => "DEPOSIT_LIMIT_EXCEEDED",
			LedgerError::AccountNotEmpty(_) => "ACCOUNT_NOT_EMPTY",
			LedgerError::NoDeposits(_) => "NO_DEPOSITS",
			LedgerError::AlreadyInitialized => "ALREADY_INITIALIZED",
			LedgerError::Unauthorized { .. } => "UNAUTHORIZED",
			LedgerError::DepositNotFound { .. } => "DEPOSIT_NOT_FOUND",
			LedgerError::InvalidRecord(_) => "INVALID_RECORD",
			LedgerError::InsufficientBacking { .. } => "INSUFFICIENT_BACKING",
			LedgerError::Funds(e) => funds_kind(e).1,
			LedgerError::Storage(_) => "STORAGE_FAILURE",
		}
	}
}

/// Errors returned by the locked deposit escrow.
#[derive(Debug, Error)]
pub enum EscrowError {
	#[error("No deal matches the presented permit")]
	DealNotFound,
	#[error("Amount mismatch: expected {expected}, supplied {supplied}")]
	AmountMismatch { expected: U256, supplied: U256 },
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	#[error("Invalid permit: {0}")]
	InvalidPermit(String),
	#[error("Permit is for chain {actual}, this instance settles chain {expected}")]
	ChainMismatch { expected: u64, actual: u64 },
	#[error("No escrow instance registered for chain {0}")]
	UnknownChain(u64),
	#[error("Currency {0} is not accepted")]
	UnsupportedCurrency(Address),
	#[error("Permit is already registered as deal {0}")]
	DuplicatePermit(DealKey),
	#[error("Deal {key} is {status:?}, expected {expected:?}")]
	InvalidState {
		key: DealKey,
		status: DealStatus,
		expected: DealStatus,
	},
	#[error("Deal {key} is already resolved ({status:?})")]
	AlreadyResolved { key: DealKey, status: DealStatus },
	#[error("Invalid transition from {from:?} to {to:?}")]
	InvalidTransition { from: DealStatus, to: DealStatus },
	#[error("Caller {caller} is not allowed to {operation}")]
	Unauthorized {
		caller: Address,
		operation: &'static str,
	},
	#[error("Deadline {deadline} not reached at {now}")]
	DeadlineNotReached { deadline: u64, now: u64 },
	#[error("Deadline {deadline} passed at {now}")]
	DeadlinePassed { deadline: u64, now: u64 },
	#[error("Funds error: {0}")]
	Funds(#[from] FundsError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
}

impl From<PermitError> for EscrowError {
	fn from(err: PermitError) -> Self {
		match err {
			PermitError::InvalidSignature(reason) => EscrowError::InvalidSignature(reason),
			PermitError::Malformed(e) => EscrowError::InvalidPermit(e.to_string()),
		}
	}
}

impl From<DealStateError> for EscrowError {
	fn from(err: DealStateError) -> Self {
		match err {
			DealStateError::Storage(e) => EscrowError::Storage(e),
			DealStateError::InvalidTransition { from, to } => {
				EscrowError::InvalidTransition { from, to }
			},
			DealStateError::DealNotFound(_) => EscrowError::DealNotFound,
		}
	}
}

impl EscrowError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			EscrowError::AmountMismatch { .. }
			| EscrowError::InvalidSignature(_)
			| EscrowError::InvalidPermit(_)
			| EscrowError::ChainMismatch { .. }
			| EscrowError::UnknownChain(_)
			| EscrowError::UnsupportedCurrency(_) => ErrorKind::Validation,
			EscrowError::Unauthorized { .. } => ErrorKind::Authorization,
			EscrowError::DealNotFound
			| EscrowError::DuplicatePermit(_)
			| EscrowError::InvalidState { .. }
			| EscrowError::AlreadyResolved { .. }
			| EscrowError::InvalidTransition { .. } => ErrorKind::State,
			EscrowError::DeadlineNotReached { .. } | EscrowError::DeadlinePassed { .. } => {
				ErrorKind::Temporal
			},
			EscrowError::Funds(e) => funds_kind(e).0,
			EscrowError::Storage(_) => ErrorKind::Infrastructure,
		}
	}

	/// Stable machine-checkable code.
	pub fn reason(&self) -> &'static str {
		match self {
			EscrowError::DealNotFound => "DEAL_NOT_FOUND",
			EscrowError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
			EscrowError::InvalidSignature(_) => "INVALID_SIGNATURE",
			EscrowError::InvalidPermit(_) => "INVALID_PERMIT",
			EscrowError::ChainMismatch { .. } => "CHAIN_MISMATCH",
			EscrowError::UnknownChain(_) => "UNKNOWN_CHAIN",
			EscrowError::UnsupportedCurrency(_) => "UNSUPPORTED_CURRENCY",
			EscrowError::DuplicatePermit(_) => "DUPLICATE_PERMIT",
			EscrowError::InvalidState { .. } => "INVALID_DEAL_STATE",
			EscrowError::AlreadyResolved { .. } => "ALREADY_RESOLVED",
			EscrowError::InvalidTransition { .. } => "INVALID_TRANSITION",
			EscrowError::Unauthorized { .. } => "UNAUTHORIZED",
			EscrowError::DeadlineNotReached { .. } => "DEADLINE_NOT_REACHED",
			EscrowError::DeadlinePassed { .. } => "DEADLINE_PASSED",
			EscrowError::Funds(e) => funds_kind(e).1,
			EscrowError::Storage(_) => "STORAGE_FAILURE",
		}
	}
}
