//! Common types for the vesting ledger and locked deposit escrow.
//!
//! This crate holds the records, permit encoding and signature handling shared
//! by every other crate in the workspace, plus the configuration validation and
//! registry primitives the pluggable backends build on.

/// Ledger records: deposit slots, exports and call context.
pub mod deposit;
/// Escrow deal records and lifecycle states.
pub mod escrow;
/// Event types published after committed operations.
pub mod events;
/// Peer escrow deployments on other chains.
pub mod networks;
/// Deposit permits and their EIP-712 hashing.
pub mod permit;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Redacting string wrapper for keys.
pub mod secret_string;
/// `{v, r, s}` signatures and signer recovery.
pub mod signature;
/// Storage namespaces.
pub mod storage;
/// Utility functions for encoding and formatting.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use alloy_primitives::{Address, B256, U256};
pub use deposit::*;
pub use escrow::*;
pub use events::*;
pub use networks::{deserialize_peers, PeersConfig};
pub use permit::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use signature::*;
pub use storage::*;
pub use utils::{
	current_timestamp, format_ether, format_token_amount, truncate_id, with_0x_prefix,
	without_0x_prefix,
};
pub use validation::*;
