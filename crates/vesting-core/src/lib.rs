//! Core of the vesting ledger and locked deposit escrow.
//!
//! The ledger releases native deposits linearly over a fixed number of
//! intervals. The escrow locks one party's deposit until the counterparty
//! countersigns a permit, possibly on another chain, or the deadline passes.
//! Both run over pluggable storage and funds backends assembled by
//! [`VestingBuilder`].

pub mod builder;
pub mod engine;
pub mod errors;
pub mod escrow;
pub mod ledger;
pub mod state;

#[cfg(test)]
pub(crate) mod test_utils;

pub use builder::{BuilderError, VestingBuilder, VestingFactories};
pub use engine::{event_bus::EventBus, VestingEngine};
pub use errors::{ErrorKind, EscrowError, LedgerError};
pub use escrow::EscrowService;
pub use ledger::{schedule::Schedule, VestingLedger, WithdrawalReport};
