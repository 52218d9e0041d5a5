//! Deal state machine.
//!
//! Deals move Created -> Deposited -> Approved -> Claimed, or
//! Created -> Deposited -> Reclaimed once the deadline has passed. Claimed and
//! Reclaimed are terminal. Every update stamps `updated_at` with the caller's
//! timestamp.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use vesting_storage::{StorageError, StorageService};
use vesting_types::{DealKey, DealStatus, EscrowDeal, StorageKey};

/// Errors that can occur during deal state management.
#[derive(Debug, Error)]
pub enum DealStateError {
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Invalid state transition from {from:?} to {to:?}")]
	InvalidTransition { from: DealStatus, to: DealStatus },
	#[error("Deal not found: {0}")]
	DealNotFound(DealKey),
}

/// Manages deal transitions and persistence for one escrow instance.
pub struct DealStateMachine {
	storage: Arc<StorageService>,
	/// Prefix separating deals of different escrow instances.
	scope: String,
}

impl DealStateMachine {
	pub fn new(storage: Arc<StorageService>, scope: impl Into<String>) -> Self {
		Self {
			storage,
			scope: scope.into(),
		}
	}

	fn id(&self, key: &DealKey) -> String {
		format!("{}:{}", self.scope, key.storage_id())
	}

	pub async fn get(&self, key: &DealKey) -> Result<Option<EscrowDeal>, DealStateError> {
		Ok(self
			.storage
			.retrieve_opt(StorageKey::Deals.as_str(), &self.id(key))
			.await?)
	}

	pub async fn store(&self, deal: &EscrowDeal) -> Result<(), DealStateError> {
		self.storage
			.store(StorageKey::Deals.as_str(), &self.id(&deal.key), deal)
			.await?;
		Ok(())
	}

	/// Applies `updater` to a stored deal and persists it.
	pub async fn update_with<F>(
		&self,
		key: &DealKey,
		now: u64,
		updater: F,
	) -> Result<EscrowDeal, DealStateError>
	where
		F: FnOnce(&mut EscrowDeal),
	{
		let mut deal = self
			.get(key)
			.await?
			.ok_or(DealStateError::DealNotFound(*key))?;
		updater(&mut deal);
		deal.updated_at = now;
		self.storage
			.update(StorageKey::Deals.as_str(), &self.id(key), &deal)
			.await?;
		Ok(deal)
	}

	/// Moves a deal to `new_status`, applying `updater` in the same write.
	pub async fn transition<F>(
		&self,
		key: &DealKey,
		new_status: DealStatus,
		now: u64,
		updater: F,
	) -> Result<EscrowDeal, DealStateError>
	where
		F: FnOnce(&mut EscrowDeal),
	{
		let deal = self
			.get(key)
			.await?
			.ok_or(DealStateError::DealNotFound(*key))?;
		if !Self::is_valid_transition(&deal.status, &new_status) {
			return Err(DealStateError::InvalidTransition {
				from: deal.status,
				to: new_status,
			});
		}

		self.update_with(key, now, |d| {
			d.status = new_status;
			updater(d);
		})
		.await
	}

	/// Checks if a state transition is valid
	pub fn is_valid_transition(from: &DealStatus, to: &DealStatus) -> bool {
		static TRANSITIONS: Lazy<HashMap<DealStatus, HashSet<DealStatus>>> = Lazy::new(|| {
			let mut m = HashMap::new();
			m.insert(DealStatus::Created, HashSet::from([DealStatus::Deposited]));
			m.insert(
				DealStatus::Deposited,
				HashSet::from([DealStatus::Approved, DealStatus::Reclaimed]),
			);
			m.insert(DealStatus::Approved, HashSet::from([DealStatus::Claimed]));
			m.insert(DealStatus::Claimed, HashSet::new()); // terminal
			m.insert(DealStatus::Reclaimed, HashSet::new()); // terminal
			m
		});

		TRANSITIONS.get(from).is_some_and(|set| set.contains(to))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use vesting_storage::implementations::memory::MemoryStorage;
	use vesting_types::{Address, Permit, B256, U256};

	fn machine() -> DealStateMachine {
		DealStateMachine::new(
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			"escrow",
		)
	}

	fn deal() -> EscrowDeal {
		let permit = Permit {
			amount: U256::from(100),
			created_at: 10,
			deadline: 20,
			investor: Address::repeat_byte(1),
			team: Address::repeat_byte(2),
			currency: Address::ZERO,
			vesting_contract_address: Address::repeat_byte(3),
			chain_id: 1,
		};
		EscrowDeal {
			key: DealKey::new(permit.investor, 0),
			permit,
			permit_hash: B256::repeat_byte(9),
			status: DealStatus::Created,
			depositor: None,
			approval: None,
			created_at: 10,
			updated_at: 10,
		}
	}

	#[test]
	fn test_transition_table() {
		use DealStatus::*;
		assert!(DealStateMachine::is_valid_transition(&Created, &Deposited));
		assert!(DealStateMachine::is_valid_transition(&Deposited, &Approved));
		assert!(DealStateMachine::is_valid_transition(&Deposited, &Reclaimed));
		assert!(DealStateMachine::is_valid_transition(&Approved, &Claimed));

		assert!(!DealStateMachine::is_valid_transition(&Created, &Approved));
		assert!(!DealStateMachine::is_valid_transition(&Approved, &Reclaimed));
		for terminal in [Claimed, Reclaimed] {
			for to in [Created, Deposited, Approved, Claimed, Reclaimed] {
				assert!(!DealStateMachine::is_valid_transition(&terminal, &to));
			}
		}
	}

	#[tokio::test]
	async fn test_transition_persists_and_stamps() {
		let machine = machine();
		let deal = deal();
		machine.store(&deal).await.unwrap();

		let updated = machine
			.transition(&deal.key, DealStatus::Deposited, 15, |d| {
				d.depositor = Some(d.permit.team)
			})
			.await
			.unwrap();
		assert_eq!(updated.updated_at, 15);

		let stored = machine.get(&deal.key).await.unwrap().unwrap();
		assert_eq!(stored.status, DealStatus::Deposited);
		assert_eq!(stored.depositor, Some(Address::repeat_byte(2)));
	}

	#[tokio::test]
	async fn test_invalid_transition_leaves_deal_untouched() {
		let machine = machine();
		let deal = deal();
		machine.store(&deal).await.unwrap();

		let err = machine
			.transition(&deal.key, DealStatus::Claimed, 15, |_| {})
			.await
			.unwrap_err();
		assert!(matches!(err, DealStateError::InvalidTransition { .. }));
		assert_eq!(machine.get(&deal.key).await.unwrap().unwrap(), deal);
	}

	#[tokio::test]
	async fn test_missing_deal() {
		let err = machine()
			.transition(&DealKey::new(Address::ZERO, 3), DealStatus::Deposited, 1, |_| {})
			.await
			.unwrap_err();
		assert!(matches!(err, DealStateError::DealNotFound(_)));
	}
}
