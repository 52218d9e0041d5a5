//! Storage-related types for the ledger and escrow.

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Slot list of one beneficiary
	Deposits,
	/// Insertion-ordered list of indexed beneficiaries
	DepositIndex,
	/// Membership marker for one indexed beneficiary
	DepositIndexMember,
	/// Stored deals, by investor and slot
	Deals,
	/// Next free deal slot per investor
	DealCounters,
	/// Maps a permit hash to its deal key
	DealByPermit,
	/// Approval signatures, by the hash they sign
	Signatures,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Deposits => "deposits",
			StorageKey::DepositIndex => "deposit_index",
			StorageKey::DepositIndexMember => "deposit_index_member",
			StorageKey::Deals => "deals",
			StorageKey::DealCounters => "deal_counters",
			StorageKey::DealByPermit => "deal_by_permit",
			StorageKey::Signatures => "signatures",
		}
	}
}
