//! Insertion-ordered registry of every beneficiary that ever held a slot.
//!
//! The ordered member list is persisted as one record; membership is also
//! written as one key per address so lookups do not load the whole list.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vesting_storage::{StorageError, StorageService};
use vesting_types::{Address, StorageKey};

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexRecord {
	members: Vec<Address>,
	/// Set once by a bulk seed.
	seeded: bool,
}

/// Deposit index of one ledger.
pub struct DepositIndex {
	storage: Arc<StorageService>,
	ledger_id: String,
}

impl DepositIndex {
	pub fn new(storage: Arc<StorageService>, ledger_id: impl Into<String>) -> Self {
		Self {
			storage,
			ledger_id: ledger_id.into(),
		}
	}

	fn member_id(&self, address: Address) -> String {
		format!("{}:{:#x}", self.ledger_id, address)
	}

	async fn load(&self) -> Result<IndexRecord, StorageError> {
		Ok(self
			.storage
			.retrieve_opt(StorageKey::DepositIndex.as_str(), &self.ledger_id)
			.await?
			.unwrap_or_default())
	}

	async fn save(&self, record: &IndexRecord) -> Result<(), StorageError> {
		self.storage
			.store(StorageKey::DepositIndex.as_str(), &self.ledger_id, record)
			.await
	}

	pub async fn contains(&self, address: Address) -> Result<bool, StorageError> {
		self.storage
			.exists(
				StorageKey::DepositIndexMember.as_str(),
				&self.member_id(address),
			)
			.await
	}

	/// Appends `address` unless already present. Returns whether it was added.
	pub async fn register(&self, address: Address) -> Result<bool, StorageError> {
		if self.contains(address).await? {
			return Ok(false);
		}
		let mut record = self.load().await?;
		// Already listed when an earlier call failed before the marker write.
		if !record.members.contains(&address) {
			record.members.push(address);
			self.save(&record).await?;
		}
		self.storage
			.store(
				StorageKey::DepositIndexMember.as_str(),
				&self.member_id(address),
				&true,
			)
			.await?;
		Ok(true)
	}

	/// Drops `address` again. Only for undoing a [`register`](Self::register)
	/// whose operation failed afterwards.
	pub async fn unregister(&self, address: Address) -> Result<(), StorageError> {
		let mut record = self.load().await?;
		record.members.retain(|member| *member != address);
		self.save(&record).await?;
		self.storage
			.remove(
				StorageKey::DepositIndexMember.as_str(),
				&self.member_id(address),
			)
			.await
	}

	/// Members in insertion order.
	pub async fn members(&self) -> Result<Vec<Address>, StorageError> {
		Ok(self.load().await?.members)
	}

	pub async fn len(&self) -> Result<usize, StorageError> {
		Ok(self.load().await?.members.len())
	}

	/// True once seeded, or as soon as anything was registered.
	pub async fn is_populated(&self) -> Result<bool, StorageError> {
		let record = self.load().await?;
		Ok(record.seeded || !record.members.is_empty())
	}

	/// Replaces the member list with `addresses`, in order, and marks the
	/// index seeded. The caller checks that the index is not populated.
	pub async fn seed(&self, addresses: &[Address]) -> Result<usize, StorageError> {
		let record = IndexRecord {
			members: addresses.to_vec(),
			seeded: true,
		};
		for address in &record.members {
			self.storage
				.store(
					StorageKey::DepositIndexMember.as_str(),
					&self.member_id(*address),
					&true,
				)
				.await?;
		}
		self.save(&record).await?;
		Ok(record.members.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::{FlakyStorage, WriteFault};
	use vesting_storage::implementations::memory::MemoryStorage;

	fn index(ledger_id: &str, storage: Arc<StorageService>) -> DepositIndex {
		DepositIndex::new(storage, ledger_id)
	}

	fn storage() -> Arc<StorageService> {
		Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	#[tokio::test]
	async fn test_register_is_idempotent_and_ordered() {
		let index = index("l", storage());
		let (a, b) = (Address::repeat_byte(0xa), Address::repeat_byte(0xb));

		assert!(index.register(b).await.unwrap());
		assert!(index.register(a).await.unwrap());
		assert!(!index.register(b).await.unwrap());

		assert_eq!(index.members().await.unwrap(), vec![b, a]);
		assert!(index.contains(a).await.unwrap());
		assert!(!index.contains(Address::repeat_byte(0xc)).await.unwrap());
	}

	#[tokio::test]
	async fn test_seed_marks_populated() {
		let index = index("l", storage());
		assert!(!index.is_populated().await.unwrap());

		assert_eq!(index.seed(&[]).await.unwrap(), 0);
		assert!(index.is_populated().await.unwrap());
	}

	#[tokio::test]
	async fn test_ledgers_do_not_share_members() {
		let storage = storage();
		let first = index("first", storage.clone());
		let second = index("second", storage);

		first.register(Address::repeat_byte(1)).await.unwrap();
		assert!(!second.contains(Address::repeat_byte(1)).await.unwrap());
		assert_eq!(second.len().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_retry_after_marker_failure_lists_once() {
		let fault = WriteFault::default();
		let index = index(
			"l",
			Arc::new(StorageService::new(Box::new(FlakyStorage::new(fault.clone())))),
		);
		let a = Address::repeat_byte(0xa);

		fault.fail(StorageKey::DepositIndexMember);
		assert!(index.register(a).await.is_err());
		fault.clear();

		assert!(index.register(a).await.unwrap());
		assert_eq!(index.members().await.unwrap(), vec![a]);
	}

	#[tokio::test]
	async fn test_unregister_drops_member() {
		let index = index("l", storage());
		let (a, b) = (Address::repeat_byte(0xa), Address::repeat_byte(0xb));
		index.register(a).await.unwrap();
		index.register(b).await.unwrap();

		index.unregister(b).await.unwrap();
		assert_eq!(index.members().await.unwrap(), vec![a]);
		assert!(!index.contains(b).await.unwrap());
	}
}
