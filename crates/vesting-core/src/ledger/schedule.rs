//! Linear vesting schedule.
//!
//! A slot of `V` deposited at `t0` unlocks in `P` equal installments, one
//! every `T` seconds. With the upfront installment enabled the first one is
//! due immediately, which shifts the whole schedule one interval earlier.
//! All arithmetic truncates toward zero and never overflows: the per-period
//! share is computed as `(V / P) * k + (V % P) * k / P`, which is exactly
//! `floor(V * k / P)` for `k <= P`.

use vesting_types::{Deposit, U256};

/// Parameters shared by every slot of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
	pub number_of_payments: u32,
	pub time_between_payments: u64,
	pub upfront_installment: bool,
}

impl Schedule {
	pub fn new(number_of_payments: u32, time_between_payments: u64, upfront_installment: bool) -> Self {
		Self {
			number_of_payments,
			time_between_payments,
			upfront_installment,
		}
	}

	/// Number of installments unlocked at `now` for a slot created at `created_at`.
	pub fn periods_elapsed(&self, created_at: u64, now: u64) -> u32 {
		if self.number_of_payments == 0 || self.time_between_payments == 0 {
			return 0;
		}
		let elapsed = now.saturating_sub(created_at) / self.time_between_payments;
		let elapsed = if self.upfront_installment {
			elapsed.saturating_add(1)
		} else {
			elapsed
		};
		elapsed.min(u64::from(self.number_of_payments)) as u32
	}

	/// Cumulative amount of `deposited` unlocked after `periods` installments.
	pub fn vested_after(&self, deposited: U256, periods: u32) -> U256 {
		if self.number_of_payments == 0 {
			return U256::ZERO;
		}
		let total = U256::from(self.number_of_payments);
		let k = U256::from(periods.min(self.number_of_payments));
		let share = deposited / total;
		let rest = deposited % total;
		share * k + rest * k / total
	}

	/// Cumulative amount of a slot unlocked at `now`.
	pub fn vested(&self, deposit: &Deposit, now: u64) -> U256 {
		self.vested_after(
			deposit.sum_deposited,
			self.periods_elapsed(deposit.created_at, now),
		)
	}

	/// Amount of a slot payable at `now`.
	pub fn payable(&self, deposit: &Deposit, now: u64) -> U256 {
		self.vested(deposit, now)
			.saturating_sub(deposit.sum_paid_already)
	}

	/// Amount released at deposit time when the upfront installment is on.
	pub fn upfront_share(&self, deposited: U256) -> U256 {
		if self.upfront_installment {
			self.vested_after(deposited, 1)
		} else {
			U256::ZERO
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use vesting_types::Address;

	const DAY: u64 = 86_400;
	const MONTH: u64 = 30 * DAY;

	fn ether(n: u64) -> U256 {
		U256::from(n) * U256::from(1_000_000_000_000_000_000u128)
	}

	fn slot(amount: U256, created_at: u64) -> Deposit {
		Deposit::new(Address::repeat_byte(1), created_at, amount)
	}

	#[test]
	fn test_nothing_vests_before_first_interval() {
		let schedule = Schedule::new(24, MONTH, false);
		let deposit = slot(ether(1), 1_000);
		assert_eq!(schedule.payable(&deposit, 1_000), U256::ZERO);
		assert_eq!(schedule.payable(&deposit, 1_000 + MONTH - 1), U256::ZERO);
		assert_eq!(
			schedule.payable(&deposit, 1_000 + MONTH),
			U256::from(41_666_666_666_666_666u64)
		);
	}

	#[test]
	fn test_everything_vests_after_last_interval() {
		let schedule = Schedule::new(24, MONTH, false);
		let deposit = slot(ether(1), 0);
		assert_eq!(schedule.vested(&deposit, 24 * MONTH), ether(1));
		assert_eq!(schedule.vested(&deposit, 100 * MONTH), ether(1));
	}

	#[test]
	fn test_upfront_shifts_schedule() {
		let schedule = Schedule::new(24, MONTH, true);
		let deposit = slot(ether(1), 0);
		assert_eq!(
			schedule.upfront_share(ether(1)),
			U256::from(41_666_666_666_666_666u64)
		);
		assert_eq!(schedule.periods_elapsed(0, 0), 1);
		assert_eq!(schedule.periods_elapsed(0, 23 * MONTH), 24);
		assert_eq!(schedule.vested(&deposit, 23 * MONTH), ether(1));
	}

	#[test]
	fn test_time_before_creation_is_zero_elapsed() {
		let schedule = Schedule::new(24, MONTH, false);
		assert_eq!(schedule.periods_elapsed(5_000, 1_000), 0);
	}

	#[test]
	fn test_partial_installments_floor_and_sum_exactly() {
		let schedule = Schedule::new(3, DAY, false);
		let deposited = U256::from(10);
		assert_eq!(schedule.vested_after(deposited, 1), U256::from(3));
		assert_eq!(schedule.vested_after(deposited, 2), U256::from(6));
		assert_eq!(schedule.vested_after(deposited, 3), U256::from(10));
	}

	#[test]
	fn test_max_amount_does_not_overflow() {
		let schedule = Schedule::new(24, MONTH, false);
		let vested = schedule.vested_after(U256::MAX, 24);
		assert_eq!(vested, U256::MAX);
		let half = schedule.vested_after(U256::MAX, 12);
		assert!(half < U256::MAX && half > U256::ZERO);
	}

	#[test]
	fn test_payable_subtracts_paid() {
		let schedule = Schedule::new(4, DAY, false);
		let mut deposit = slot(U256::from(100), 0);
		deposit.sum_paid_already = U256::from(25);
		assert_eq!(schedule.payable(&deposit, 2 * DAY), U256::from(25));
		deposit.sum_paid_already = U256::from(60);
		assert_eq!(schedule.payable(&deposit, 2 * DAY), U256::ZERO);
	}
}
