//! Engine tying the ledger and the escrow to their shared services.
//!
//! Both services are built over the same storage, funds backend and event
//! bus. The engine is cheap to clone and hands out shared references, so a
//! host can route calls from several tasks into one instance.

pub mod event_bus;

use crate::escrow::EscrowService;
use crate::ledger::VestingLedger;
use std::sync::Arc;
use tokio::sync::broadcast;
use vesting_account::AccountService;
use vesting_config::Config;
use vesting_funds::FundsService;
use vesting_storage::StorageService;
use vesting_types::VestingEvent;

/// Main engine holding one ledger and one escrow instance.
#[derive(Clone)]
pub struct VestingEngine {
	/// Configuration the engine was built from.
	pub(crate) config: Config,
	/// Storage service shared by both instances.
	pub(crate) storage: Arc<StorageService>,
	/// Funds backend holding custody balances.
	pub(crate) funds: Arc<FundsService>,
	/// Operator account, when one is configured.
	pub(crate) account: Option<Arc<AccountService>>,
	pub(crate) ledger: Arc<VestingLedger>,
	pub(crate) escrow: Arc<EscrowService>,
	/// Event bus for committed operations.
	pub(crate) event_bus: event_bus::EventBus,
}

impl VestingEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		funds: Arc<FundsService>,
		account: Option<Arc<AccountService>>,
		event_bus: event_bus::EventBus,
	) -> Self {
		let ledger = Arc::new(VestingLedger::new(
			config.ledger.clone(),
			storage.clone(),
			funds.clone(),
			event_bus.clone(),
		));
		let escrow = Arc::new(EscrowService::new(
			config.escrow.clone(),
			storage.clone(),
			funds.clone(),
			event_bus.clone(),
		));
		Self {
			config,
			storage,
			funds,
			account,
			ledger,
			escrow,
			event_bus,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn ledger(&self) -> &Arc<VestingLedger> {
		&self.ledger
	}

	pub fn escrow(&self) -> &Arc<EscrowService> {
		&self.escrow
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn funds(&self) -> &Arc<FundsService> {
		&self.funds
	}

	pub fn account(&self) -> Option<&Arc<AccountService>> {
		self.account.as_ref()
	}

	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Shorthand for subscribing to the engine's events.
	pub fn subscribe(&self) -> broadcast::Receiver<VestingEvent> {
		self.event_bus.subscribe()
	}
}
