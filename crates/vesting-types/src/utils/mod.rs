//! Utility functions for EIP-712 encoding and display formatting.

pub mod eip712;
pub mod formatting;
pub mod helpers;

pub use eip712::{
	compute_domain_hash, compute_final_digest, AbiDecodeError, Eip712AbiDecoder, Eip712AbiEncoder,
	DOMAIN_TYPE,
};
pub use formatting::{
	format_ether, format_token_amount, truncate_id, with_0x_prefix, without_0x_prefix,
};
pub use helpers::current_timestamp;
