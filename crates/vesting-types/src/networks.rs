//! Peer deployment types for mirrored escrow instances.
//!
//! A logical deal can be mirrored on several chains. Each chain runs its own
//! escrow instance; to verify a countersignature minted for a peer chain the
//! local instance needs that peer's contract address for the EIP-712 domain.

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// Escrow instance addresses keyed by chain id.
pub type PeersConfig = HashMap<u64, Address>;

/// Helper function to deserialize peer deployments from TOML.
///
/// TOML tables only have string keys, so chain ids arrive as strings and are
/// parsed to u64 here.
///
/// # Errors
///
/// Returns a deserialization error if a chain id key cannot be parsed as a u64
/// or an address is malformed.
pub fn deserialize_peers<'de, D>(deserializer: D) -> Result<PeersConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: HashMap<String, Address> = HashMap::deserialize(deserializer)?;
	let mut result = HashMap::new();

	for (key, value) in string_map {
		let chain_id = key
			.parse::<u64>()
			.map_err(|e| serde::de::Error::custom(format!("Invalid chain_id '{}': {}", key, e)))?;
		result.insert(chain_id, value);
	}

	Ok(result)
}
