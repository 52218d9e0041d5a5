//! Persistent state machines.

pub mod deal;

pub use deal::{DealStateError, DealStateMachine};
