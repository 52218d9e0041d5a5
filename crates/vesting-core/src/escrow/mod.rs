//! Locked deposit escrow.
//!
//! A team registers a permit, one party escrows the permit amount, the other
//! party countersigns, and the countersigned party's beneficiary claims with
//! the depositor's signature. If nobody countersigns before the deadline the
//! investor can have the escrow returned.
//!
//! Instances on different chains share no state. A deal spanning two chains
//! settles by signature replay: `approve` accepts the mirror of the local
//! permit for a registered peer chain and publishes the signature, and the
//! other chain's `claim_deposit` consumes it.

use crate::engine::event_bus::EventBus;
use crate::errors::EscrowError;
use crate::state::DealStateMachine;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;
use vesting_config::EscrowConfig;
use vesting_funds::FundsService;
use vesting_storage::StorageService;
use vesting_types::{
	format_ether, truncate_id, Address, CallContext, Currency, DealKey, DealStatus, EscrowDeal,
	EscrowEvent, Permit, PermitDomain, PermitSignature, StorageKey, VestingEvent, B256, U256,
};

/// The escrow service of one chain.
pub struct EscrowService {
	config: EscrowConfig,
	domain: PermitDomain,
	storage: Arc<StorageService>,
	funds: Arc<FundsService>,
	deals: DealStateMachine,
	event_bus: EventBus,
	/// Storage prefix of this instance.
	scope: String,
	op_lock: Mutex<()>,
}

impl EscrowService {
	pub fn new(
		config: EscrowConfig,
		storage: Arc<StorageService>,
		funds: Arc<FundsService>,
		event_bus: EventBus,
	) -> Self {
		let domain = PermitDomain::new(
			config.name.clone(),
			config.version.clone(),
			config.chain_id,
			config.address,
		);
		let scope = format!("{:#x}", config.address);
		Self {
			deals: DealStateMachine::new(storage.clone(), scope.clone()),
			config,
			domain,
			storage,
			funds,
			event_bus,
			scope,
			op_lock: Mutex::new(()),
		}
	}

	pub fn config(&self) -> &EscrowConfig {
		&self.config
	}

	/// Signing domain of this instance.
	pub fn domain(&self) -> &PermitDomain {
		&self.domain
	}

	/// Signing domain of this instance or of a registered peer.
	pub fn domain_for(&self, chain_id: u64) -> Result<PermitDomain, EscrowError> {
		if chain_id == self.config.chain_id {
			return Ok(self.domain.clone());
		}
		self.config
			.peers
			.get(&chain_id)
			.map(|peer| {
				PermitDomain::new(
					self.config.name.clone(),
					self.config.version.clone(),
					chain_id,
					*peer,
				)
			})
			.ok_or(EscrowError::UnknownChain(chain_id))
	}

	fn scoped(&self, id: impl std::fmt::Display) -> String {
		format!("{}:{}", self.scope, id)
	}

	fn publish(&self, event: EscrowEvent) {
		self.event_bus.publish(VestingEvent::Escrow(event)).ok();
	}

	fn ensure_local(&self, permit: &Permit) -> Result<(), EscrowError> {
		if permit.chain_id != self.config.chain_id {
			return Err(EscrowError::ChainMismatch {
				expected: self.config.chain_id,
				actual: permit.chain_id,
			});
		}
		Ok(())
	}

	fn ensure_status(deal: &EscrowDeal, expected: DealStatus) -> Result<(), EscrowError> {
		if deal.status.is_resolved() {
			return Err(EscrowError::AlreadyResolved {
				key: deal.key,
				status: deal.status,
			});
		}
		if deal.status != expected {
			return Err(EscrowError::InvalidState {
				key: deal.key,
				status: deal.status,
				expected,
			});
		}
		Ok(())
	}

	/// Depositor of a funded deal and the party entitled to the escrow.
	fn parties(deal: &EscrowDeal) -> Result<(Address, Address), EscrowError> {
		deal.depositor
			.zip(deal.beneficiary())
			.ok_or(EscrowError::InvalidState {
				key: deal.key,
				status: deal.status,
				expected: DealStatus::Deposited,
			})
	}

	fn currency(&self, permit: &Permit) -> Result<Currency, EscrowError> {
		match Currency::from_address(permit.currency) {
			Currency::Native => Ok(Currency::Native),
			Currency::Token(token) if self.config.designated_token == Some(token) => {
				Ok(Currency::Token(token))
			},
			Currency::Token(token) => Err(EscrowError::UnsupportedCurrency(token)),
		}
	}

	/// Finds the deal registered for the local form of `permit`.
	async fn find_deal(&self, permit: &Permit) -> Result<EscrowDeal, EscrowError> {
		let local = permit.with_chain_id(self.config.chain_id);
		let hash = local.signing_hash(&self.domain);
		let key: DealKey = self
			.storage
			.retrieve_opt(StorageKey::DealByPermit.as_str(), &self.scoped(hash))
			.await?
			.ok_or(EscrowError::DealNotFound)?;
		self.deals.get(&key).await?.ok_or(EscrowError::DealNotFound)
	}

	/// Puts a deal back after a failed transfer.
	async fn restore_deal(&self, snapshot: &EscrowDeal) {
		if let Err(e) = self.deals.store(snapshot).await {
			tracing::error!(
				deal = %snapshot.key,
				error = %e,
				"Failed to restore deal state"
			);
		}
	}

	/// Undoes the registration writes of a `create_deal` that failed midway.
	async fn unregister_deal(&self, mapping_id: Option<&str>, counter_id: &str, slot: u64) {
		if let Some(mapping_id) = mapping_id {
			if let Err(e) = self
				.storage
				.remove(StorageKey::DealByPermit.as_str(), mapping_id)
				.await
			{
				tracing::error!(error = %e, "Failed to remove permit mapping");
			}
		}
		if let Err(e) = self
			.storage
			.store(StorageKey::DealCounters.as_str(), counter_id, &slot)
			.await
		{
			tracing::error!(error = %e, "Failed to restore deal counter");
		}
	}

	/// Registers `permit` as a new deal at the investor's next free slot.
	#[instrument(skip_all, fields(investor = %permit.investor))]
	pub async fn create_deal(
		&self,
		ctx: &CallContext,
		permit: &Permit,
	) -> Result<EscrowDeal, EscrowError> {
		let _guard = self.op_lock.lock().await;

		if ctx.caller != permit.team {
			return Err(EscrowError::Unauthorized {
				caller: ctx.caller,
				operation: "create a deal",
			});
		}
		self.ensure_local(permit)?;
		if permit.amount.is_zero() {
			return Err(EscrowError::InvalidPermit("amount must be greater than zero".into()));
		}
		if permit.investor.is_zero() || permit.team.is_zero() || permit.investor == permit.team {
			return Err(EscrowError::InvalidPermit(
				"investor and team must be distinct non-zero addresses".into(),
			));
		}
		self.currency(permit)?;
		if permit.deadline <= ctx.timestamp {
			return Err(EscrowError::DeadlinePassed {
				deadline: permit.deadline,
				now: ctx.timestamp,
			});
		}

		let permit_hash = permit.signing_hash(&self.domain);
		let mapping_id = self.scoped(permit_hash);
		if let Some(existing) = self
			.storage
			.retrieve_opt::<DealKey>(StorageKey::DealByPermit.as_str(), &mapping_id)
			.await?
		{
			// A mapping without its deal is left over from a failed registration.
			if self.deals.get(&existing).await?.is_some() {
				return Err(EscrowError::DuplicatePermit(existing));
			}
		}

		let counter_id = self.scoped(format!("{:#x}", permit.investor));
		let slot: u64 = self
			.storage
			.retrieve_opt(StorageKey::DealCounters.as_str(), &counter_id)
			.await?
			.unwrap_or_default();
		let key = DealKey::new(permit.investor, slot);
		if self.deals.get(&key).await?.is_some() {
			return Err(EscrowError::DuplicatePermit(key));
		}

		let deal = EscrowDeal {
			key,
			permit: permit.clone(),
			permit_hash,
			status: DealStatus::Created,
			depositor: None,
			approval: None,
			created_at: ctx.timestamp,
			updated_at: ctx.timestamp,
		};
		// Counter, then mapping, then the deal itself. The deal record is what
		// makes the registration visible.
		self.storage
			.store(StorageKey::DealCounters.as_str(), &counter_id, &(slot + 1))
			.await?;
		if let Err(e) = self
			.storage
			.store(StorageKey::DealByPermit.as_str(), &mapping_id, &key)
			.await
		{
			self.unregister_deal(None, &counter_id, slot).await;
			return Err(e.into());
		}
		if let Err(e) = self.deals.store(&deal).await {
			self.unregister_deal(Some(&mapping_id), &counter_id, slot).await;
			return Err(e.into());
		}

		tracing::info!(
			deal = %key,
			permit_hash = %truncate_id(&permit_hash.to_string()),
			amount = %format_ether(permit.amount),
			"Deal created"
		);
		self.publish(EscrowEvent::DealCreated { key, permit_hash });
		Ok(deal)
	}

	/// Escrows the permit amount from the caller, who becomes the depositor.
	///
	/// `value` is the native value attached to the call: exactly the permit
	/// amount for native deals, zero for token deals, which are pulled through
	/// the allowance granted to this instance.
	#[instrument(skip_all, fields(caller = %ctx.caller))]
	pub async fn deposit(
		&self,
		ctx: &CallContext,
		permit: &Permit,
		value: U256,
	) -> Result<EscrowDeal, EscrowError> {
		let _guard = self.op_lock.lock().await;

		self.ensure_local(permit)?;
		let snapshot = self.find_deal(permit).await?;
		if !snapshot.permit.is_party(ctx.caller) {
			return Err(EscrowError::Unauthorized {
				caller: ctx.caller,
				operation: "deposit",
			});
		}
		Self::ensure_status(&snapshot, DealStatus::Created)?;
		if ctx.timestamp > snapshot.permit.deadline {
			return Err(EscrowError::DeadlinePassed {
				deadline: snapshot.permit.deadline,
				now: ctx.timestamp,
			});
		}

		let currency = self.currency(&snapshot.permit)?;
		let expected = match currency {
			Currency::Native => snapshot.permit.amount,
			Currency::Token(_) => U256::ZERO,
		};
		if value != expected {
			return Err(EscrowError::AmountMismatch {
				expected,
				supplied: value,
			});
		}

		let depositor = ctx.caller;
		let deal = self
			.deals
			.transition(
				&snapshot.key,
				DealStatus::Deposited,
				ctx.timestamp,
				|d| d.depositor = Some(depositor),
			)
			.await?;

		if let Err(e) = self
			.funds
			.collect(currency, depositor, self.config.address, deal.permit.amount)
			.await
		{
			self.restore_deal(&snapshot).await;
			return Err(e.into());
		}

		tracing::info!(
			deal = %deal.key,
			amount = %format_ether(deal.permit.amount),
			"Deal funded"
		);
		self.publish(EscrowEvent::DealFunded {
			key: deal.key,
			depositor,
			amount: deal.permit.amount,
		});
		Ok(deal)
	}

	/// Countersigns a funded deal.
	///
	/// `permit` is the stored permit or its mirror for a registered peer chain,
	/// and `signature` must come from the party that did not deposit, over the
	/// permit's hash under its own chain's domain. The signature is retained
	/// and published under that hash.
	#[instrument(skip_all, fields(caller = %ctx.caller, chain_id = permit.chain_id))]
	pub async fn approve(
		&self,
		ctx: &CallContext,
		permit: &Permit,
		signature: &PermitSignature,
	) -> Result<EscrowDeal, EscrowError> {
		let _guard = self.op_lock.lock().await;

		let domain = self.domain_for(permit.chain_id)?;
		let snapshot = self.find_deal(permit).await?;
		Self::ensure_status(&snapshot, DealStatus::Deposited)?;
		if ctx.timestamp > snapshot.permit.deadline {
			return Err(EscrowError::DeadlinePassed {
				deadline: snapshot.permit.deadline,
				now: ctx.timestamp,
			});
		}

		let (_, approver) = Self::parties(&snapshot)?;
		if ctx.caller != approver {
			return Err(EscrowError::Unauthorized {
				caller: ctx.caller,
				operation: "approve",
			});
		}

		let signed_hash = permit.signing_hash(&domain);
		let signer = signature.recover(&signed_hash)?;
		if signer != approver {
			return Err(EscrowError::InvalidSignature(format!(
				"recovered {}, expected {}",
				signer, approver
			)));
		}

		let deal = self
			.deals
			.transition(
				&snapshot.key,
				DealStatus::Approved,
				ctx.timestamp,
				|d| d.approval = Some(*signature),
			)
			.await?;
		// Published only once the deal is approved, since the other chain can
		// claim with it.
		if let Err(e) = self
			.storage
			.store(
				StorageKey::Signatures.as_str(),
				&self.scoped(signed_hash),
				signature,
			)
			.await
		{
			self.restore_deal(&snapshot).await;
			return Err(e.into());
		}

		tracing::info!(
			deal = %deal.key,
			signed_hash = %truncate_id(&signed_hash.to_string()),
			"Deal approved"
		);
		self.publish(EscrowEvent::DealApproved {
			key: deal.key,
			signer,
			signed_hash,
		});
		Ok(deal)
	}

	/// Releases an approved deal to its beneficiary, the caller, against the
	/// depositor's signature over the local permit.
	#[instrument(skip_all, fields(caller = %ctx.caller))]
	pub async fn claim_deposit(
		&self,
		ctx: &CallContext,
		permit: &Permit,
		signature: &PermitSignature,
	) -> Result<EscrowDeal, EscrowError> {
		let _guard = self.op_lock.lock().await;

		self.ensure_local(permit)?;
		let snapshot = self.find_deal(permit).await?;
		Self::ensure_status(&snapshot, DealStatus::Approved)?;

		let (depositor, beneficiary) = Self::parties(&snapshot)?;
		if ctx.caller != beneficiary {
			return Err(EscrowError::Unauthorized {
				caller: ctx.caller,
				operation: "claim",
			});
		}
		let signer = signature.recover(&snapshot.permit_hash)?;
		if signer != depositor {
			return Err(EscrowError::InvalidSignature(format!(
				"recovered {}, expected {}",
				signer, depositor
			)));
		}

		let currency = self.currency(&snapshot.permit)?;
		let deal = self
			.deals
			.transition(&snapshot.key, DealStatus::Claimed, ctx.timestamp, |_| {})
			.await?;
		if let Err(e) = self
			.funds
			.pay(currency, self.config.address, beneficiary, deal.permit.amount)
			.await
		{
			self.restore_deal(&snapshot).await;
			return Err(e.into());
		}

		tracing::info!(
			deal = %deal.key,
			amount = %format_ether(deal.permit.amount),
			"Deal claimed"
		);
		self.publish(EscrowEvent::DealClaimed {
			key: deal.key,
			beneficiary,
			amount: deal.permit.amount,
		});
		Ok(deal)
	}

	/// Returns the escrow of a deal nobody countersigned to the investor, once
	/// the deadline has passed. Only the investor may trigger it.
	#[instrument(skip_all, fields(caller = %ctx.caller))]
	pub async fn claim_on_deadline(
		&self,
		ctx: &CallContext,
		permit: &Permit,
	) -> Result<EscrowDeal, EscrowError> {
		let _guard = self.op_lock.lock().await;

		self.ensure_local(permit)?;
		let snapshot = self.find_deal(permit).await?;
		if ctx.caller != snapshot.permit.investor {
			return Err(EscrowError::Unauthorized {
				caller: ctx.caller,
				operation: "reclaim",
			});
		}
		Self::ensure_status(&snapshot, DealStatus::Deposited)?;
		if ctx.timestamp <= snapshot.permit.deadline {
			return Err(EscrowError::DeadlineNotReached {
				deadline: snapshot.permit.deadline,
				now: ctx.timestamp,
			});
		}

		let recipient = snapshot.permit.investor;
		let currency = self.currency(&snapshot.permit)?;
		let deal = self
			.deals
			.transition(&snapshot.key, DealStatus::Reclaimed, ctx.timestamp, |_| {})
			.await?;
		if let Err(e) = self
			.funds
			.pay(currency, self.config.address, recipient, deal.permit.amount)
			.await
		{
			self.restore_deal(&snapshot).await;
			return Err(e.into());
		}

		tracing::info!(
			deal = %deal.key,
			recipient = %recipient,
			amount = %format_ether(deal.permit.amount),
			"Deal reclaimed"
		);
		self.publish(EscrowEvent::DealReclaimed {
			key: deal.key,
			recipient,
			amount: deal.permit.amount,
		});
		Ok(deal)
	}

	/// Signature published by `approve` under `permit_hash`.
	pub async fn get_signature_by_permit(
		&self,
		permit_hash: B256,
	) -> Result<Option<PermitSignature>, EscrowError> {
		Ok(self
			.storage
			.retrieve_opt(StorageKey::Signatures.as_str(), &self.scoped(permit_hash))
			.await?)
	}

	/// Permit stored for `investor` at `slot` (0-based).
	pub async fn permits_lookup(
		&self,
		investor: Address,
		slot: u64,
	) -> Result<Option<Permit>, EscrowError> {
		Ok(self.deal(investor, slot).await?.map(|deal| deal.permit))
	}

	pub async fn deal(&self, investor: Address, slot: u64) -> Result<Option<EscrowDeal>, EscrowError> {
		Ok(self.deals.get(&DealKey::new(investor, slot)).await?)
	}

	/// Number of deals ever created for `investor`.
	pub async fn deals_counter(&self, investor: Address) -> Result<u64, EscrowError> {
		Ok(self
			.storage
			.retrieve_opt(
				StorageKey::DealCounters.as_str(),
				&self.scoped(format!("{:#x}", investor)),
			)
			.await?
			.unwrap_or_default())
	}
}
