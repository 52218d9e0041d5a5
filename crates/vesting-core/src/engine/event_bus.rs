//! In-process broadcast of committed ledger and escrow events.
//!
//! Events are published only after the operation that produced them has
//! committed. Publishing never fails an operation: with no subscribers the
//! event is dropped, and slow subscribers observe a lag error on their side.

use tokio::sync::broadcast;
use vesting_types::VestingEvent;

/// Broadcast channel shared by the ledger and the escrow.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<VestingEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Subscribes to events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<VestingEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	pub fn publish(
		&self,
		event: VestingEvent,
	) -> Result<usize, broadcast::error::SendError<VestingEvent>> {
		self.sender.send(event)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use vesting_types::{LedgerEvent, U256};

	#[tokio::test]
	async fn test_subscribers_receive_in_order() {
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();

		for size in [1usize, 2] {
			bus.publish(VestingEvent::Ledger(LedgerEvent::IndexCreated { size }))
				.unwrap();
		}

		assert_eq!(
			rx.recv().await.unwrap(),
			VestingEvent::Ledger(LedgerEvent::IndexCreated { size: 1 })
		);
		assert_eq!(
			rx.recv().await.unwrap(),
			VestingEvent::Ledger(LedgerEvent::IndexCreated { size: 2 })
		);
	}

	#[test]
	fn test_publish_without_subscribers_is_an_error_not_a_panic() {
		let bus = EventBus::new(1);
		let event = VestingEvent::Ledger(LedgerEvent::DepositsRestored {
			count: 0,
			amount: U256::ZERO,
		});
		assert!(bus.publish(event).is_err());
	}
}
