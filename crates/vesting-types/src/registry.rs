//! Registry trait for self-registering backend implementations.

/// Base trait for implementation registries.
///
/// Each backend module (storage, funds, account) exposes a `Registry` struct
/// implementing this trait, pairing the name used in configuration with the
/// factory that builds the backend from its TOML table.
pub trait ImplementationRegistry {
	/// Configuration name, e.g. "memory" for `storage.implementations.memory`
	/// or "local" for `account.implementations.local`.
	const NAME: &'static str;

	/// Factory function type of the module (`StorageFactory`, `FundsFactory`, ...).
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
