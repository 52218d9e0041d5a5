//! Generic EIP-712 utilities shared across the workspace.
//!
//! These helpers provide:
//! - Domain hash computation
//! - Final digest computation (0x1901 || domainHash || structHash)
//! - A minimal ABI encoder/decoder for the static field types used by permits

use alloy_primitives::{keccak256, Address, B256, U256};

/// EIP-712 domain type string, including the version field.
pub const DOMAIN_TYPE: &str =
	"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Size of a single ABI word.
pub const WORD_SIZE: usize = 32;

/// Compute EIP-712 domain hash
/// (keccak256(abi.encode(typeHash, nameHash, versionHash, chainId, verifyingContract))).
pub fn compute_domain_hash(
	name: &str,
	version: &str,
	chain_id: u64,
	verifying_contract: &Address,
) -> B256 {
	let domain_type_hash = keccak256(DOMAIN_TYPE.as_bytes());
	let mut enc = Eip712AbiEncoder::new();
	enc.push_b256(&domain_type_hash);
	enc.push_b256(&keccak256(name.as_bytes()));
	enc.push_b256(&keccak256(version.as_bytes()));
	enc.push_u256(U256::from(chain_id));
	enc.push_address(verifying_contract);
	keccak256(enc.finish())
}

/// Compute the final EIP-712 digest: keccak256(0x1901 || domainHash || structHash).
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> B256 {
	let mut out = Vec::with_capacity(2 + 32 + 32);
	out.push(0x19);
	out.push(0x01);
	out.extend_from_slice(domain_hash.as_slice());
	out.extend_from_slice(struct_hash.as_slice());
	keccak256(out)
}

/// Minimal ABI encoder for static types used in EIP-712 struct hashing.
pub struct Eip712AbiEncoder {
	buf: Vec<u8>,
}

impl Default for Eip712AbiEncoder {
	fn default() -> Self {
		Self::new()
	}
}

impl Eip712AbiEncoder {
	pub fn new() -> Self {
		Self { buf: Vec::new() }
	}

	pub fn push_b256(&mut self, v: &B256) {
		self.buf.extend_from_slice(v.as_slice());
	}

	pub fn push_address(&mut self, addr: &Address) {
		let mut word = [0u8; WORD_SIZE];
		word[12..].copy_from_slice(addr.as_slice());
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u256(&mut self, v: U256) {
		let word: [u8; WORD_SIZE] = v.to_be_bytes::<WORD_SIZE>();
		self.buf.extend_from_slice(&word);
	}

	pub fn push_u64(&mut self, v: u64) {
		self.push_u256(U256::from(v));
	}

	pub fn finish(self) -> Vec<u8> {
		self.buf
	}
}

/// Errors produced while reading ABI words back.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AbiDecodeError {
	#[error("Expected {expected} bytes, got {actual}")]
	Length { expected: usize, actual: usize },
	#[error("Word {0} is not a left-padded address")]
	DirtyAddress(usize),
	#[error("Word {0} does not fit in 64 bits")]
	Overflow(usize),
}

/// Reader over a fixed sequence of static ABI words.
pub struct Eip712AbiDecoder<'a> {
	buf: &'a [u8],
}

impl<'a> Eip712AbiDecoder<'a> {
	/// Wraps `buf`, which must hold exactly `words` ABI words.
	pub fn new(buf: &'a [u8], words: usize) -> Result<Self, AbiDecodeError> {
		let expected = words * WORD_SIZE;
		if buf.len() != expected {
			return Err(AbiDecodeError::Length {
				expected,
				actual: buf.len(),
			});
		}
		Ok(Self { buf })
	}

	fn word(&self, index: usize) -> &'a [u8] {
		&self.buf[index * WORD_SIZE..(index + 1) * WORD_SIZE]
	}

	pub fn u256(&self, index: usize) -> U256 {
		U256::from_be_slice(self.word(index))
	}

	pub fn u64(&self, index: usize) -> Result<u64, AbiDecodeError> {
		let value = self.u256(index);
		if value > U256::from(u64::MAX) {
			return Err(AbiDecodeError::Overflow(index));
		}
		Ok(value.as_limbs()[0])
	}

	pub fn address(&self, index: usize) -> Result<Address, AbiDecodeError> {
		let word = self.word(index);
		if word[..12].iter().any(|b| *b != 0) {
			return Err(AbiDecodeError::DirtyAddress(index));
		}
		Ok(Address::from_slice(&word[12..]))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_address_word_is_left_padded() {
		let addr = Address::repeat_byte(0xab);
		let mut enc = Eip712AbiEncoder::new();
		enc.push_address(&addr);
		let bytes = enc.finish();
		assert_eq!(bytes.len(), 32);
		assert!(bytes[..12].iter().all(|b| *b == 0));
		assert_eq!(&bytes[12..], addr.as_slice());
	}

	#[test]
	fn test_decoder_rejects_dirty_address_and_overflow() {
		let mut enc = Eip712AbiEncoder::new();
		enc.push_u256(U256::MAX);
		let bytes = enc.finish();
		let dec = Eip712AbiDecoder::new(&bytes, 1).unwrap();
		assert_eq!(dec.address(0), Err(AbiDecodeError::DirtyAddress(0)));
		assert_eq!(dec.u64(0), Err(AbiDecodeError::Overflow(0)));
		assert!(Eip712AbiDecoder::new(&bytes, 2).is_err());
	}

	#[test]
	fn test_domain_hash_depends_on_every_field() {
		let contract = Address::repeat_byte(0x11);
		let base = compute_domain_hash("LockedDeposit", "1", 1, &contract);
		assert_ne!(base, compute_domain_hash("LockedDeposit", "2", 1, &contract));
		assert_ne!(base, compute_domain_hash("Other", "1", 1, &contract));
		assert_ne!(base, compute_domain_hash("LockedDeposit", "1", 5, &contract));
		assert_ne!(
			base,
			compute_domain_hash("LockedDeposit", "1", 1, &Address::repeat_byte(0x12))
		);
	}
}
