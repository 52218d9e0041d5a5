//! `{v, r, s}` signature triples and signer recovery.
//!
//! Recovery follows the `ecrecover` rules the escrow contracts were written
//! against, plus the malleability checks of the common ECDSA libraries:
//! `v` must be 27/28 (0/1 accepted), `r` and `s` non-zero, and `s` in the
//! lower half of the curve order.

use crate::permit::PermitError;
use alloy_primitives::{uint, Address, PrimitiveSignature, B256, U256};
use serde::{Deserialize, Serialize};

/// Half of the secp256k1 group order.
const SECP256K1N_HALF: U256 =
	uint!(0x7FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF5D576E7357A4501DDFE92F46681B20A0_U256);

/// Length of the packed `r || s || v` form.
pub const SIGNATURE_LEN: usize = 65;

/// Signature over a permit digest, split the way contracts receive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermitSignature {
	pub v: u8,
	pub r: B256,
	pub s: B256,
}

impl PermitSignature {
	pub fn new(v: u8, r: B256, s: B256) -> Self {
		Self { v, r, s }
	}

	/// Parses the packed 65-byte `r || s || v` form produced by wallets.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, PermitError> {
		if bytes.len() != SIGNATURE_LEN {
			return Err(PermitError::InvalidSignature(format!(
				"expected {} bytes, got {}",
				SIGNATURE_LEN,
				bytes.len()
			)));
		}
		Ok(Self {
			r: B256::from_slice(&bytes[0..32]),
			s: B256::from_slice(&bytes[32..64]),
			v: bytes[64],
		})
	}

	/// Packed `r || s || v`.
	pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
		let mut out = [0u8; SIGNATURE_LEN];
		out[0..32].copy_from_slice(self.r.as_slice());
		out[32..64].copy_from_slice(self.s.as_slice());
		out[64] = self.v;
		out
	}

	fn y_parity(&self) -> Result<bool, PermitError> {
		match self.v {
			0 | 27 => Ok(false),
			1 | 28 => Ok(true),
			v => Err(PermitError::InvalidSignature(format!(
				"invalid recovery id {}",
				v
			))),
		}
	}

	/// Recovers the address that produced this signature over `hash`.
	pub fn recover(&self, hash: &B256) -> Result<Address, PermitError> {
		let parity = self.y_parity()?;
		let r = U256::from_be_bytes(self.r.0);
		let s = U256::from_be_bytes(self.s.0);
		if r.is_zero() || s.is_zero() {
			return Err(PermitError::InvalidSignature("zero r or s".into()));
		}
		if s > SECP256K1N_HALF {
			return Err(PermitError::InvalidSignature("s value in upper half".into()));
		}

		PrimitiveSignature::new(r, s, parity)
			.recover_address_from_prehash(hash)
			.map_err(|e| PermitError::InvalidSignature(e.to_string()))
	}
}

/// Recovers the signer of `hash` from a `{v, r, s}` triple.
pub fn recover_signer(hash: &B256, signature: &PermitSignature) -> Result<Address, PermitError> {
	signature.recover(hash)
}
