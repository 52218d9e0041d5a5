//! Vesting ledger.
//!
//! Holds native funds on behalf of beneficiaries and releases them linearly.
//! Each beneficiary owns up to `max_deposits` slots, persisted together as one
//! record. Operations on one ledger are linearized by an operation lock held
//! for the whole call. Whenever accounting and a payout change together, the
//! new accounting is committed first and restored if the payout fails.

pub mod index;
pub mod schedule;

use crate::engine::event_bus::EventBus;
use crate::errors::LedgerError;
use index::DepositIndex;
use schedule::Schedule;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;
use vesting_config::LedgerConfig;
use vesting_funds::FundsService;
use vesting_storage::StorageService;
use vesting_types::{
	format_ether, Address, CallContext, Currency, Deposit, DepositRecord, LedgerEvent,
	StorageKey, VestingEvent, U256,
};

/// Outcome of one beneficiary in a batch withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalReport {
	pub beneficiary: Address,
	/// Amount available when the batch evaluated the beneficiary.
	pub available: U256,
	/// Amount paid out; zero when the beneficiary was at or under the threshold.
	pub withdrawn: U256,
}

/// The vesting ledger service.
pub struct VestingLedger {
	config: LedgerConfig,
	schedule: Schedule,
	storage: Arc<StorageService>,
	funds: Arc<FundsService>,
	index: DepositIndex,
	event_bus: EventBus,
	op_lock: Mutex<()>,
}

impl VestingLedger {
	pub fn new(
		config: LedgerConfig,
		storage: Arc<StorageService>,
		funds: Arc<FundsService>,
		event_bus: EventBus,
	) -> Self {
		let schedule = Schedule::new(
			config.number_of_payments,
			config.time_between_payments,
			config.upfront_installment,
		);
		let index = DepositIndex::new(storage.clone(), config.id.clone());
		Self {
			config,
			schedule,
			storage,
			funds,
			index,
			event_bus,
			op_lock: Mutex::new(()),
		}
	}

	pub fn config(&self) -> &LedgerConfig {
		&self.config
	}

	pub fn schedule(&self) -> &Schedule {
		&self.schedule
	}

	fn slots_id(&self, owner: Address) -> String {
		format!("{}:{:#x}", self.config.id, owner)
	}

	async fn slots(&self, owner: Address) -> Result<Vec<Deposit>, LedgerError> {
		Ok(self
			.storage
			.retrieve_opt(StorageKey::Deposits.as_str(), &self.slots_id(owner))
			.await?
			.unwrap_or_default())
	}

	async fn save_slots(&self, owner: Address, slots: &[Deposit]) -> Result<(), LedgerError> {
		self.storage
			.store(StorageKey::Deposits.as_str(), &self.slots_id(owner), &slots)
			.await?;
		Ok(())
	}

	/// Puts back accounting after a failed payout.
	async fn restore_slots(&self, owner: Address, snapshot: &[Deposit]) {
		if let Err(e) = self.save_slots(owner, snapshot).await {
			tracing::error!(
				owner = %owner,
				error = %e,
				"Failed to restore deposit accounting"
			);
		}
	}

	/// Takes back an index registration made by a call that then failed.
	async fn forget_member(&self, address: Address, registered: bool) {
		if !registered {
			return;
		}
		if let Err(e) = self.index.unregister(address).await {
			tracing::error!(
				address = %address,
				error = %e,
				"Failed to roll back index registration"
			);
		}
	}

	fn require_admin(&self, ctx: &CallContext, operation: &'static str) -> Result<(), LedgerError> {
		if ctx.caller != self.config.admin {
			return Err(LedgerError::Unauthorized {
				caller: ctx.caller,
				operation,
			});
		}
		Ok(())
	}

	fn publish(&self, event: LedgerEvent) {
		self.event_bus.publish(VestingEvent::Ledger(event)).ok();
	}

	/// Opens a new slot of `amount` for `beneficiary`, taking the caller's
	/// native funds into custody. Returns the 1-based deposit id.
	#[instrument(skip_all, fields(beneficiary = %beneficiary, amount = %format_ether(amount)))]
	pub async fn deposit(
		&self,
		ctx: &CallContext,
		beneficiary: Address,
		amount: U256,
	) -> Result<u32, LedgerError> {
		let _guard = self.op_lock.lock().await;

		if amount.is_zero() {
			return Err(LedgerError::ZeroAmount);
		}
		if beneficiary.is_zero() {
			return Err(LedgerError::InvalidAddress("beneficiary"));
		}

		let snapshot = self.slots(beneficiary).await?;
		if snapshot.len() >= self.config.max_deposits as usize {
			return Err(LedgerError::DepositLimitExceeded {
				beneficiary,
				max: self.config.max_deposits,
			});
		}

		let registered = self.index.register(beneficiary).await?;

		let upfront = self.schedule.upfront_share(amount);
		let mut slot = Deposit::new(beneficiary, ctx.timestamp, amount);
		slot.sum_paid_already = upfront;

		let mut slots = snapshot.clone();
		slots.push(slot);
		let deposit_id = slots.len() as u32;
		if let Err(e) = self.save_slots(beneficiary, &slots).await {
			self.forget_member(beneficiary, registered).await;
			return Err(e);
		}

		if let Err(e) = self
			.funds
			.collect(Currency::Native, ctx.caller, self.config.address, amount)
			.await
		{
			self.restore_slots(beneficiary, &snapshot).await;
			self.forget_member(beneficiary, registered).await;
			return Err(e.into());
		}

		if !upfront.is_zero() {
			if let Err(e) = self
				.funds
				.pay(Currency::Native, self.config.address, beneficiary, upfront)
				.await
			{
				if let Err(refund) = self
					.funds
					.pay(Currency::Native, self.config.address, ctx.caller, amount)
					.await
				{
					tracing::error!(
						depositor = %ctx.caller,
						error = %refund,
						"Failed to refund deposit after upfront payout failure"
					);
				}
				self.restore_slots(beneficiary, &snapshot).await;
				self.forget_member(beneficiary, registered).await;
				return Err(e.into());
			}
		}

		tracing::info!(
			deposit_id,
			depositor = %ctx.caller,
			upfront = %format_ether(upfront),
			"Deposit made"
		);
		self.publish(LedgerEvent::DepositMade {
			beneficiary,
			deposit_id,
			timestamp: ctx.timestamp,
			amount,
			depositor: ctx.caller,
		});
		Ok(deposit_id)
	}

	/// Pays out everything vested for `beneficiary` so far. Anyone may trigger
	/// it; funds always go to the beneficiary. Returns the amount paid, zero
	/// when nothing was due.
	#[instrument(skip_all, fields(beneficiary = %beneficiary))]
	pub async fn withdraw(
		&self,
		ctx: &CallContext,
		beneficiary: Address,
	) -> Result<U256, LedgerError> {
		let _guard = self.op_lock.lock().await;
		self.withdraw_locked(ctx, beneficiary).await
	}

	async fn withdraw_locked(
		&self,
		ctx: &CallContext,
		beneficiary: Address,
	) -> Result<U256, LedgerError> {
		let snapshot = self.slots(beneficiary).await?;
		let mut slots = snapshot.clone();
		let mut total = U256::ZERO;
		for slot in slots.iter_mut() {
			let share = self.schedule.payable(slot, ctx.timestamp);
			slot.sum_paid_already += share;
			total += share;
		}

		if total.is_zero() {
			tracing::debug!("Nothing to withdraw");
			return Ok(U256::ZERO);
		}

		self.save_slots(beneficiary, &slots).await?;
		if let Err(e) = self
			.funds
			.pay(Currency::Native, self.config.address, beneficiary, total)
			.await
		{
			self.restore_slots(beneficiary, &snapshot).await;
			return Err(e.into());
		}

		tracing::info!(amount = %format_ether(total), "Withdrawn");
		self.publish(LedgerEvent::Withdrawn {
			beneficiary,
			amount: total,
			timestamp: ctx.timestamp,
		});
		Ok(total)
	}

	/// Amount `beneficiary` could withdraw at `now`.
	pub async fn available_for_all_deposits(
		&self,
		beneficiary: Address,
		now: u64,
	) -> Result<U256, LedgerError> {
		Ok(self
			.slots(beneficiary)
			.await?
			.iter()
			.map(|slot| self.schedule.payable(slot, now))
			.fold(U256::ZERO, |acc, share| acc + share))
	}

	/// Amount still owed to `beneficiary`, vested or not.
	pub async fn remaining_for_all_deposits(
		&self,
		beneficiary: Address,
	) -> Result<U256, LedgerError> {
		Ok(sum_left_to_pay(&self.slots(beneficiary).await?))
	}

	/// Moves every slot of the caller to `new_owner`, which must hold none.
	#[instrument(skip_all, fields(from = %ctx.caller, to = %new_owner))]
	pub async fn transfer_deposit_rights(
		&self,
		ctx: &CallContext,
		new_owner: Address,
	) -> Result<(), LedgerError> {
		let _guard = self.op_lock.lock().await;

		if new_owner.is_zero() {
			return Err(LedgerError::InvalidAddress("new owner"));
		}
		if !self.slots(new_owner).await?.is_empty() {
			return Err(LedgerError::AccountNotEmpty(new_owner));
		}
		let slots = self.slots(ctx.caller).await?;
		if slots.is_empty() {
			return Err(LedgerError::NoDeposits(ctx.caller));
		}

		let moved: Vec<Deposit> = slots
			.iter()
			.cloned()
			.map(|slot| Deposit {
				beneficiary: new_owner,
				..slot
			})
			.collect();

		let registered = self.index.register(new_owner).await?;
		if let Err(e) = self.save_slots(new_owner, &moved).await {
			self.forget_member(new_owner, registered).await;
			return Err(e);
		}
		if let Err(e) = self.save_slots(ctx.caller, &[]).await {
			self.restore_slots(new_owner, &[]).await;
			self.forget_member(new_owner, registered).await;
			return Err(e);
		}

		tracing::info!(deposits = moved.len(), "Deposit rights transferred");
		self.publish(LedgerEvent::DepositRightsTransferred {
			from: ctx.caller,
			to: new_owner,
			deposits: moved.len() as u32,
		});
		Ok(())
	}

	/// Sends the caller's whole remaining balance to the migrator.
	pub async fn migrate_all(&self, ctx: &CallContext) -> Result<U256, LedgerError> {
		let _guard = self.op_lock.lock().await;
		self.migrate_locked(ctx.caller).await
	}

	/// Admin variant of [`migrate_all`](Self::migrate_all) for any holder.
	pub async fn migrate(&self, ctx: &CallContext, target: Address) -> Result<U256, LedgerError> {
		let _guard = self.op_lock.lock().await;
		self.require_admin(ctx, "migrate")?;
		self.migrate_locked(target).await
	}

	#[instrument(skip_all, fields(owner = %owner))]
	async fn migrate_locked(&self, owner: Address) -> Result<U256, LedgerError> {
		let snapshot = self.slots(owner).await?;
		if snapshot.is_empty() {
			return Err(LedgerError::NoDeposits(owner));
		}
		let amount = sum_left_to_pay(&snapshot);

		self.save_slots(owner, &[]).await?;
		if !amount.is_zero() {
			if let Err(e) = self
				.funds
				.pay(Currency::Native, self.config.address, self.config.migrator, amount)
				.await
			{
				self.restore_slots(owner, &snapshot).await;
				return Err(e.into());
			}
		}

		tracing::info!(
			migrator = %self.config.migrator,
			amount = %format_ether(amount),
			"Migrated"
		);
		self.publish(LedgerEvent::Migrated {
			owner,
			migrator: self.config.migrator,
			amount,
		});
		Ok(amount)
	}

	/// Seeds the deposit index once, e.g. from beneficiaries rebuilt out of
	/// historical `DepositMade` events. Duplicates are dropped, first one wins.
	pub async fn create_index(
		&self,
		ctx: &CallContext,
		addresses: &[Address],
	) -> Result<usize, LedgerError> {
		let _guard = self.op_lock.lock().await;
		self.require_admin(ctx, "create the deposit index")?;

		if self.index.is_populated().await? {
			return Err(LedgerError::AlreadyInitialized);
		}
		if addresses.iter().any(|a| a.is_zero()) {
			return Err(LedgerError::InvalidAddress("index member"));
		}

		let mut seen = HashSet::new();
		let unique: Vec<Address> = addresses
			.iter()
			.copied()
			.filter(|a| seen.insert(*a))
			.collect();
		let size = self.index.seed(&unique).await?;

		tracing::info!(size, "Deposit index created");
		self.publish(LedgerEvent::IndexCreated { size });
		Ok(size)
	}

	/// Every live slot of every indexed beneficiary, in index order.
	pub async fn get_all_deposits(&self) -> Result<Vec<DepositRecord>, LedgerError> {
		let mut records = Vec::new();
		for owner in self.index.members().await? {
			for (position, slot) in self.slots(owner).await?.iter().enumerate() {
				records.push(DepositRecord::from_deposit(position as u32 + 1, slot));
			}
		}
		Ok(records)
	}

	pub async fn deposits_counter(&self, owner: Address) -> Result<u32, LedgerError> {
		Ok(self.slots(owner).await?.len() as u32)
	}

	/// Slot `deposit_id` (1-based) of `owner`.
	pub async fn deposit_at(&self, owner: Address, deposit_id: u32) -> Result<Deposit, LedgerError> {
		let slots = self.slots(owner).await?;
		deposit_id
			.checked_sub(1)
			.and_then(|position| slots.get(position as usize))
			.cloned()
			.ok_or(LedgerError::DepositNotFound { owner, deposit_id })
	}

	pub async fn index_size(&self) -> Result<usize, LedgerError> {
		Ok(self.index.len().await?)
	}

	/// Withdraws for every listed beneficiary whose available sum exceeds
	/// `min_available`. Each withdrawal commits on its own; the first failure
	/// stops the batch.
	#[instrument(skip_all, fields(candidates = beneficiaries.len()))]
	pub async fn withdraw_batch(
		&self,
		ctx: &CallContext,
		beneficiaries: &[Address],
		min_available: U256,
	) -> Result<Vec<WithdrawalReport>, LedgerError> {
		let _guard = self.op_lock.lock().await;

		let mut seen = HashSet::new();
		let mut reports = Vec::new();
		for beneficiary in beneficiaries.iter().copied().filter(|b| seen.insert(*b)) {
			let available = self
				.available_for_all_deposits(beneficiary, ctx.timestamp)
				.await?;
			let withdrawn = if available > min_available {
				self.withdraw_locked(ctx, beneficiary).await?
			} else {
				U256::ZERO
			};
			reports.push(WithdrawalReport {
				beneficiary,
				available,
				withdrawn,
			});
		}

		let paid = reports.iter().filter(|r| !r.withdrawn.is_zero()).count();
		tracing::info!(evaluated = reports.len(), paid, "Batch withdrawal finished");
		Ok(reports)
	}

	/// Re-creates slots from a predecessor's export.
	///
	/// Records keep their timestamps and paid amounts, so restored schedules
	/// continue where they left off. The owed amount must be covered by native
	/// funds the ledger holds beyond what it already owes.
	#[instrument(skip_all, fields(records = records.len()))]
	pub async fn restore_deposits(
		&self,
		ctx: &CallContext,
		records: &[DepositRecord],
	) -> Result<U256, LedgerError> {
		let _guard = self.op_lock.lock().await;
		self.require_admin(ctx, "restore deposits")?;

		let mut by_owner: HashMap<Address, Vec<&DepositRecord>> = HashMap::new();
		let mut owners = Vec::new();
		let mut needed = U256::ZERO;
		for record in records {
			if record.owner.is_zero() {
				return Err(LedgerError::InvalidAddress("record owner"));
			}
			if record.sum_deposited.is_zero()
				|| record.sum_paid_already > record.sum_deposited
				|| record.sum_left_to_pay != record.sum_deposited - record.sum_paid_already
			{
				return Err(LedgerError::InvalidRecord(format!(
					"deposit {} of {}",
					record.deposit_id, record.owner
				)));
			}
			needed += record.sum_left_to_pay;
			by_owner
				.entry(record.owner)
				.or_insert_with(|| {
					owners.push(record.owner);
					Vec::new()
				})
				.push(record);
		}

		let mut outstanding = U256::ZERO;
		for owner in self.index.members().await? {
			outstanding += sum_left_to_pay(&self.slots(owner).await?);
		}
		let balance = self
			.funds
			.balance(Currency::Native, self.config.address)
			.await?;
		let available = balance.saturating_sub(outstanding);
		if needed > available {
			return Err(LedgerError::InsufficientBacking { needed, available });
		}

		let mut updates = Vec::with_capacity(owners.len());
		for owner in &owners {
			let mut slots = self.slots(*owner).await?;
			let mut imported = by_owner.remove(owner).unwrap_or_default();
			imported.sort_by_key(|record| record.deposit_id);
			if slots.len() + imported.len() > self.config.max_deposits as usize {
				return Err(LedgerError::DepositLimitExceeded {
					beneficiary: *owner,
					max: self.config.max_deposits,
				});
			}
			slots.extend(imported.into_iter().map(|record| Deposit {
				beneficiary: *owner,
				created_at: record.timestamp,
				sum_deposited: record.sum_deposited,
				sum_paid_already: record.sum_paid_already,
			}));
			updates.push((*owner, slots));
		}

		for (owner, slots) in &updates {
			self.save_slots(*owner, slots).await?;
			self.index.register(*owner).await?;
		}

		tracing::info!(
			count = records.len(),
			owners = owners.len(),
			amount = %format_ether(needed),
			"Deposits restored"
		);
		self.publish(LedgerEvent::DepositsRestored {
			count: records.len(),
			amount: needed,
		});
		Ok(needed)
	}
}

fn sum_left_to_pay(slots: &[Deposit]) -> U256 {
	slots
		.iter()
		.fold(U256::ZERO, |acc, slot| acc + slot.sum_left_to_pay())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::errors::ErrorKind;
	use crate::test_utils::{FlakyStorage, WriteFault};
	use async_trait::async_trait;
	use vesting_config::builders::config::ConfigBuilder;
	use vesting_funds::implementations::memory::MemoryFunds;
	use vesting_funds::{FundsError, FundsInterface};
	use vesting_storage::implementations::memory::MemoryStorage;
	use vesting_storage::StorageInterface;
	use vesting_types::ConfigSchema;

	const MONTH: u64 = 2_592_000;
	const START: u64 = 1_700_000_000;

	fn ether(n: u64) -> U256 {
		U256::from(n) * U256::from(1_000_000_000_000_000_000u128)
	}

	fn addr(byte: u8) -> Address {
		Address::repeat_byte(byte)
	}

	fn at(caller: Address, timestamp: u64) -> CallContext {
		CallContext::new(caller, timestamp)
	}

	struct Fixture {
		ledger: VestingLedger,
		funds: MemoryFunds,
		bus: EventBus,
		config: LedgerConfig,
	}

	impl Fixture {
		async fn new(builder: ConfigBuilder) -> Self {
			Self::with_storage(builder, Box::new(MemoryStorage::new())).await
		}

		async fn with_storage(builder: ConfigBuilder, storage: Box<dyn StorageInterface>) -> Self {
			let config = builder.build().ledger;
			let funds = MemoryFunds::new();
			for byte in [1u8, 2, 3, 4] {
				funds.mint(Currency::Native, addr(byte), ether(100)).await;
			}
			let bus = EventBus::new(64);
			let ledger = VestingLedger::new(
				config.clone(),
				Arc::new(StorageService::new(storage)),
				Arc::new(FundsService::new(Box::new(funds.clone()))),
				bus.clone(),
			);
			Self {
				ledger,
				funds,
				bus,
				config,
			}
		}

		async fn balance(&self, account: Address) -> U256 {
			self.funds
				.balance(Currency::Native, account)
				.await
				.unwrap()
		}

		fn admin(&self, timestamp: u64) -> CallContext {
			at(self.config.admin, timestamp)
		}
	}

	#[tokio::test]
	async fn test_deposit_appends_slot_and_takes_custody() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		let mut events = f.bus.subscribe();

		let id = f
			.ledger
			.deposit(&at(addr(1), START), addr(2), ether(1))
			.await
			.unwrap();

		assert_eq!(id, 1);
		assert_eq!(f.balance(addr(1)).await, ether(99));
		assert_eq!(f.balance(f.config.address).await, ether(1));
		assert_eq!(f.ledger.deposits_counter(addr(2)).await.unwrap(), 1);

		let slot = f.ledger.deposit_at(addr(2), 1).await.unwrap();
		assert_eq!(slot.created_at, START);
		assert_eq!(slot.sum_paid_already, U256::ZERO);

		assert_eq!(
			events.recv().await.unwrap(),
			VestingEvent::Ledger(LedgerEvent::DepositMade {
				beneficiary: addr(2),
				deposit_id: 1,
				timestamp: START,
				amount: ether(1),
				depositor: addr(1),
			})
		);
	}

	#[tokio::test]
	async fn test_deposit_rejects_bad_input() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		let ctx = at(addr(1), START);

		let err = f.ledger.deposit(&ctx, addr(2), U256::ZERO).await.unwrap_err();
		assert_eq!(err.reason(), "ZERO_AMOUNT");

		let err = f
			.ledger
			.deposit(&ctx, Address::ZERO, ether(1))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Validation);
	}

	#[tokio::test]
	async fn test_sixth_deposit_hits_cap() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		let ctx = at(addr(1), START);

		for expected in 1..=5 {
			let id = f.ledger.deposit(&ctx, addr(2), ether(1)).await.unwrap();
			assert_eq!(id, expected);
		}
		let err = f.ledger.deposit(&ctx, addr(2), ether(1)).await.unwrap_err();
		assert!(matches!(err, LedgerError::DepositLimitExceeded { max: 5, .. }));
		assert_eq!(err.kind(), ErrorKind::State);
		assert_eq!(f.balance(addr(1)).await, ether(95));
		assert_eq!(f.ledger.deposits_counter(addr(2)).await.unwrap(), 5);
	}

	#[tokio::test]
	async fn test_unfunded_deposit_leaves_no_slot() {
		let f = Fixture::new(ConfigBuilder::new()).await;

		let err = f
			.ledger
			.deposit(&at(addr(9), START), addr(2), ether(1))
			.await
			.unwrap_err();

		assert_eq!(err.reason(), "INSUFFICIENT_FUNDS");
		assert_eq!(f.ledger.deposits_counter(addr(2)).await.unwrap(), 0);
		assert_eq!(f.ledger.index_size().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_failed_slot_write_leaves_index_untouched() {
		let fault = WriteFault::default();
		let f = Fixture::with_storage(
			ConfigBuilder::new(),
			Box::new(FlakyStorage::new(fault.clone())),
		)
		.await;

		fault.fail(StorageKey::Deposits);
		let err = f
			.ledger
			.deposit(&at(addr(1), START), addr(2), ether(1))
			.await
			.unwrap_err();
		fault.clear();

		assert_eq!(err.kind(), ErrorKind::Infrastructure);
		assert_eq!(f.ledger.index_size().await.unwrap(), 0);
		assert!(!f.ledger.index.contains(addr(2)).await.unwrap());
		assert_eq!(f.balance(addr(1)).await, ether(100));
		assert!(f.ledger.create_index(&f.admin(START), &[addr(3)]).await.is_ok());
	}

	#[tokio::test]
	async fn test_failed_transfer_keeps_slots_and_index() {
		let fault = WriteFault::default();
		let f = Fixture::with_storage(
			ConfigBuilder::new(),
			Box::new(FlakyStorage::new(fault.clone())),
		)
		.await;
		f.ledger
			.deposit(&at(addr(1), START), addr(2), ether(1))
			.await
			.unwrap();

		fault.fail(StorageKey::Deposits);
		assert!(f
			.ledger
			.transfer_deposit_rights(&at(addr(2), START), addr(5))
			.await
			.is_err());
		fault.clear();

		assert_eq!(f.ledger.deposits_counter(addr(2)).await.unwrap(), 1);
		assert_eq!(f.ledger.deposits_counter(addr(5)).await.unwrap(), 0);
		assert_eq!(f.ledger.index_size().await.unwrap(), 1);
		assert!(!f.ledger.index.contains(addr(5)).await.unwrap());
	}

	#[tokio::test]
	async fn test_linear_release() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		f.ledger
			.deposit(&at(addr(1), START), addr(2), ether(1))
			.await
			.unwrap();

		assert_eq!(
			f.ledger
				.available_for_all_deposits(addr(2), START + MONTH - 1)
				.await
				.unwrap(),
			U256::ZERO
		);
		for k in 1..24u64 {
			let expected = ether(1) * U256::from(k) / U256::from(24);
			assert_eq!(
				f.ledger
					.available_for_all_deposits(addr(2), START + k * MONTH)
					.await
					.unwrap(),
				expected
			);
		}
		assert_eq!(
			f.ledger
				.available_for_all_deposits(addr(2), START + 30 * MONTH)
				.await
				.unwrap(),
			ether(1)
		);
	}

	#[tokio::test]
	async fn test_withdraw_pays_vested_and_is_noop_when_nothing_due() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		f.ledger
			.deposit(&at(addr(1), START), addr(2), ether(1))
			.await
			.unwrap();

		// Anyone may trigger the payout.
		let paid = f
			.ledger
			.withdraw(&at(addr(3), START + MONTH), addr(2))
			.await
			.unwrap();
		assert_eq!(paid, U256::from(41_666_666_666_666_666u64));
		assert_eq!(f.balance(addr(2)).await, ether(100) + paid);

		let again = f
			.ledger
			.withdraw(&at(addr(3), START + MONTH + 10), addr(2))
			.await
			.unwrap();
		assert_eq!(again, U256::ZERO);

		f.ledger
			.withdraw(&at(addr(2), START + 24 * MONTH), addr(2))
			.await
			.unwrap();
		assert_eq!(f.balance(addr(2)).await, ether(101));
		assert_eq!(
			f.ledger.remaining_for_all_deposits(addr(2)).await.unwrap(),
			U256::ZERO
		);
		assert_eq!(f.balance(f.config.address).await, U256::ZERO);
	}

	#[tokio::test]
	async fn test_withdraw_sums_slots_of_different_ages() {
		let f = Fixture::new(ConfigBuilder::new().number_of_payments(4)).await;
		f.ledger
			.deposit(&at(addr(1), START), addr(2), U256::from(400))
			.await
			.unwrap();
		f.ledger
			.deposit(&at(addr(1), START + MONTH), addr(2), U256::from(800))
			.await
			.unwrap();

		let paid = f
			.ledger
			.withdraw(&at(addr(2), START + 2 * MONTH), addr(2))
			.await
			.unwrap();
		assert_eq!(paid, U256::from(200 + 200));
		assert_eq!(
			f.ledger.deposit_at(addr(2), 2).await.unwrap().sum_paid_already,
			U256::from(200)
		);
	}

	#[tokio::test]
	async fn test_transfer_moves_all_slots() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		let ctx = at(addr(1), START);
		f.ledger.deposit(&ctx, addr(2), ether(1)).await.unwrap();
		f.ledger.deposit(&ctx, addr(2), ether(2)).await.unwrap();
		f.ledger
			.withdraw(&at(addr(2), START + MONTH), addr(2))
			.await
			.unwrap();
		let before = vec![
			f.ledger.deposit_at(addr(2), 1).await.unwrap(),
			f.ledger.deposit_at(addr(2), 2).await.unwrap(),
		];

		f.ledger
			.transfer_deposit_rights(&at(addr(2), START + MONTH), addr(5))
			.await
			.unwrap();

		assert_eq!(f.ledger.deposits_counter(addr(2)).await.unwrap(), 0);
		assert_eq!(f.ledger.deposits_counter(addr(5)).await.unwrap(), 2);
		for (position, old) in before.iter().enumerate() {
			let moved = f
				.ledger
				.deposit_at(addr(5), position as u32 + 1)
				.await
				.unwrap();
			assert_eq!(moved.beneficiary, addr(5));
			assert_eq!(moved.created_at, old.created_at);
			assert_eq!(moved.sum_deposited, old.sum_deposited);
			assert_eq!(moved.sum_paid_already, old.sum_paid_already);
		}

		let owners: Vec<Address> = f
			.ledger
			.get_all_deposits()
			.await
			.unwrap()
			.iter()
			.map(|r| r.owner)
			.collect();
		assert_eq!(owners, vec![addr(5), addr(5)]);
	}

	#[tokio::test]
	async fn test_transfer_requires_empty_target() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		let ctx = at(addr(1), START);
		f.ledger.deposit(&ctx, addr(2), ether(1)).await.unwrap();
		f.ledger.deposit(&ctx, addr(3), ether(1)).await.unwrap();

		let err = f
			.ledger
			.transfer_deposit_rights(&at(addr(2), START), addr(3))
			.await
			.unwrap_err();
		assert_eq!(err.reason(), "ACCOUNT_NOT_EMPTY");
		assert!(err.to_string().starts_with("Only empty account is allowed"));
		assert_eq!(f.ledger.deposits_counter(addr(2)).await.unwrap(), 1);

		let err = f
			.ledger
			.transfer_deposit_rights(&at(addr(7), START), addr(8))
			.await
			.unwrap_err();
		assert_eq!(err.reason(), "NO_DEPOSITS");
	}

	#[tokio::test]
	async fn test_migration_conserves_remaining() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		let ctx = at(addr(1), START);
		f.ledger.deposit(&ctx, addr(2), ether(1)).await.unwrap();
		f.ledger.deposit(&ctx, addr(2), ether(3)).await.unwrap();
		f.ledger
			.withdraw(&at(addr(2), START + 5 * MONTH), addr(2))
			.await
			.unwrap();
		let remaining = f.ledger.remaining_for_all_deposits(addr(2)).await.unwrap();
		let mut events = f.bus.subscribe();

		let migrated = f
			.ledger
			.migrate_all(&at(addr(2), START + 5 * MONTH))
			.await
			.unwrap();

		assert_eq!(migrated, remaining);
		assert_eq!(f.balance(f.config.migrator).await, remaining);
		assert_eq!(f.ledger.deposits_counter(addr(2)).await.unwrap(), 0);
		assert_eq!(
			events.recv().await.unwrap(),
			VestingEvent::Ledger(LedgerEvent::Migrated {
				owner: addr(2),
				migrator: f.config.migrator,
				amount: remaining,
			})
		);
	}

	#[tokio::test]
	async fn test_upfront_installment_figures() {
		let f = Fixture::new(ConfigBuilder::new().upfront_installment(true)).await;
		let ctx = at(addr(1), START);
		f.ledger.deposit(&ctx, addr(2), ether(1)).await.unwrap();
		f.ledger.deposit(&ctx, addr(2), ether(1)).await.unwrap();

		let upfront = U256::from(41_666_666_666_666_666u64);
		assert_eq!(f.balance(addr(2)).await, ether(100) + upfront + upfront);

		let records = f.ledger.get_all_deposits().await.unwrap();
		assert_eq!(records.len(), 2);
		assert_eq!(records[0].sum_paid_already, upfront);
		assert_eq!(records[1].deposit_id, 2);

		let migrated = f.ledger.migrate_all(&at(addr(2), START)).await.unwrap();
		assert_eq!(
			migrated,
			U256::from(1_916_666_666_666_666_668u128)
		);
	}

	#[tokio::test]
	async fn test_admin_only_operations() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		f.ledger
			.deposit(&at(addr(1), START), addr(2), ether(1))
			.await
			.unwrap();

		let err = f
			.ledger
			.migrate(&at(addr(2), START), addr(2))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Authorization);

		let err = f
			.ledger
			.create_index(&at(addr(2), START), &[addr(2)])
			.await
			.unwrap_err();
		assert_eq!(err.reason(), "UNAUTHORIZED");

		let err = f
			.ledger
			.restore_deposits(&at(addr(2), START), &[])
			.await
			.unwrap_err();
		assert_eq!(err.reason(), "UNAUTHORIZED");

		assert_eq!(
			f.ledger.migrate(&f.admin(START), addr(2)).await.unwrap(),
			ether(1)
		);
	}

	#[tokio::test]
	async fn test_create_index_once() {
		let f = Fixture::new(ConfigBuilder::new()).await;

		let size = f
			.ledger
			.create_index(&f.admin(START), &[addr(2), addr(3), addr(2)])
			.await
			.unwrap();
		assert_eq!(size, 2);
		assert_eq!(f.ledger.index_size().await.unwrap(), 2);

		let err = f
			.ledger
			.create_index(&f.admin(START), &[addr(4)])
			.await
			.unwrap_err();
		assert!(matches!(err, LedgerError::AlreadyInitialized));
		assert_eq!(err.to_string(), "keyArray is already initialized");
	}

	#[tokio::test]
	async fn test_create_index_rejected_once_deposits_exist() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		f.ledger
			.deposit(&at(addr(1), START), addr(2), ether(1))
			.await
			.unwrap();

		let err = f
			.ledger
			.create_index(&f.admin(START), &[addr(3)])
			.await
			.unwrap_err();
		assert_eq!(err.reason(), "ALREADY_INITIALIZED");
	}

	#[tokio::test]
	async fn test_deposit_id_is_one_based() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		f.ledger
			.deposit(&at(addr(1), START), addr(2), ether(1))
			.await
			.unwrap();

		assert!(f.ledger.deposit_at(addr(2), 1).await.is_ok());
		for id in [0, 2] {
			let err = f.ledger.deposit_at(addr(2), id).await.unwrap_err();
			assert_eq!(err.reason(), "DEPOSIT_NOT_FOUND");
		}
	}

	#[tokio::test]
	async fn test_withdraw_batch_respects_threshold() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		let ctx = at(addr(1), START);
		f.ledger.deposit(&ctx, addr(2), ether(24)).await.unwrap();
		f.ledger.deposit(&ctx, addr(3), ether(1)).await.unwrap();

		let reports = f
			.ledger
			.withdraw_batch(
				&at(addr(4), START + MONTH),
				&[addr(2), addr(3), addr(2), addr(6)],
				ether(1) / U256::from(2),
			)
			.await
			.unwrap();

		assert_eq!(reports.len(), 3);
		assert_eq!(reports[0].withdrawn, ether(1));
		assert_eq!(reports[1].withdrawn, U256::ZERO);
		assert!(!reports[1].available.is_zero());
		assert_eq!(reports[2].available, U256::ZERO);
		assert_eq!(f.balance(addr(2)).await, ether(101));
	}

	#[tokio::test]
	async fn test_restore_into_successor() {
		let predecessor = Fixture::new(ConfigBuilder::new()).await;
		let ctx = at(addr(1), START);
		predecessor.ledger.deposit(&ctx, addr(2), ether(2)).await.unwrap();
		predecessor.ledger.deposit(&ctx, addr(3), ether(1)).await.unwrap();
		predecessor
			.ledger
			.withdraw(&at(addr(2), START + 3 * MONTH), addr(2))
			.await
			.unwrap();
		let export = predecessor.ledger.get_all_deposits().await.unwrap();
		let owed: U256 = export
			.iter()
			.fold(U256::ZERO, |acc, r| acc + r.sum_left_to_pay);

		let successor = Fixture::new(ConfigBuilder::new().ledger_id("successor")).await;
		let err = successor
			.ledger
			.restore_deposits(&successor.admin(START), &export)
			.await
			.unwrap_err();
		assert!(matches!(err, LedgerError::InsufficientBacking { .. }));

		successor
			.funds
			.mint(Currency::Native, successor.config.address, owed)
			.await;
		let restored = successor
			.ledger
			.restore_deposits(&successor.admin(START + 3 * MONTH), &export)
			.await
			.unwrap();
		assert_eq!(restored, owed);

		let now = START + 6 * MONTH;
		for owner in [addr(2), addr(3)] {
			assert_eq!(
				successor
					.ledger
					.available_for_all_deposits(owner, now)
					.await
					.unwrap(),
				predecessor
					.ledger
					.available_for_all_deposits(owner, now)
					.await
					.unwrap()
			);
		}

		// The same funds cannot back a second import.
		let err = successor
			.ledger
			.restore_deposits(&successor.admin(now), &export)
			.await
			.unwrap_err();
		assert_eq!(err.reason(), "INSUFFICIENT_BACKING");
	}

	#[tokio::test]
	async fn test_restore_rejects_inconsistent_record() {
		let f = Fixture::new(ConfigBuilder::new()).await;
		let record = DepositRecord {
			owner: addr(2),
			deposit_id: 1,
			timestamp: START,
			sum_deposited: ether(1),
			sum_paid_already: U256::ZERO,
			sum_left_to_pay: ether(2),
		};
		let err = f
			.ledger
			.restore_deposits(&f.admin(START), &[record])
			.await
			.unwrap_err();
		assert_eq!(err.reason(), "INVALID_RECORD");
	}

	/// Native backend whose payouts out of one account fail.
	struct FrozenCustody {
		inner: MemoryFunds,
		frozen: Address,
	}

	#[async_trait]
	impl FundsInterface for FrozenCustody {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.inner.config_schema()
		}

		async fn balance(&self, currency: Currency, account: Address) -> Result<U256, FundsError> {
			self.inner.balance(currency, account).await
		}

		async fn allowance(
			&self,
			token: Address,
			owner: Address,
			spender: Address,
		) -> Result<U256, FundsError> {
			self.inner.allowance(token, owner, spender).await
		}

		async fn transfer(
			&self,
			currency: Currency,
			from: Address,
			to: Address,
			amount: U256,
		) -> Result<(), FundsError> {
			if from == self.frozen {
				return Err(FundsError::TransferFailed("custody frozen".into()));
			}
			self.inner.transfer(currency, from, to, amount).await
		}

		async fn transfer_from(
			&self,
			token: Address,
			spender: Address,
			owner: Address,
			to: Address,
			amount: U256,
		) -> Result<(), FundsError> {
			self.inner
				.transfer_from(token, spender, owner, to, amount)
				.await
		}
	}

	#[tokio::test]
	async fn test_failed_payout_restores_accounting() {
		let config = ConfigBuilder::new().build().ledger;
		let funds = MemoryFunds::new();
		funds.mint(Currency::Native, addr(1), ether(10)).await;
		let ledger = VestingLedger::new(
			config.clone(),
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			Arc::new(FundsService::new(Box::new(FrozenCustody {
				inner: funds.clone(),
				frozen: config.address,
			}))),
			EventBus::new(8),
		);
		ledger
			.deposit(&at(addr(1), START), addr(2), ether(1))
			.await
			.unwrap();

		let err = ledger
			.withdraw(&at(addr(2), START + 2 * MONTH), addr(2))
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Infrastructure);
		assert_eq!(
			ledger.deposit_at(addr(2), 1).await.unwrap().sum_paid_already,
			U256::ZERO
		);

		let err = ledger.migrate_all(&at(addr(2), START)).await.unwrap_err();
		assert_eq!(err.reason(), "FUNDS_TRANSFER_FAILED");
		assert_eq!(ledger.deposits_counter(addr(2)).await.unwrap(), 1);
		assert_eq!(
			ledger.remaining_for_all_deposits(addr(2)).await.unwrap(),
			ether(1)
		);
	}

	#[tokio::test]
	async fn test_concurrent_deposits_respect_cap() {
		let f = Arc::new(Fixture::new(ConfigBuilder::new().max_deposits(3)).await);
		let mut handles = Vec::new();
		for _ in 0..6 {
			let f = f.clone();
			handles.push(tokio::spawn(async move {
				f.ledger
					.deposit(&at(addr(1), START), addr(2), ether(1))
					.await
			}));
		}
		let mut ok = 0;
		for handle in handles {
			if handle.await.unwrap().is_ok() {
				ok += 1;
			}
		}
		assert_eq!(ok, 3);
		assert_eq!(f.ledger.deposits_counter(addr(2)).await.unwrap(), 3);
		assert_eq!(f.balance(addr(1)).await, ether(97));
	}
}
