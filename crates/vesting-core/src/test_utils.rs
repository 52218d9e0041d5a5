//! Storage double whose writes to one namespace can be made to fail.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use vesting_storage::implementations::memory::MemoryStorage;
use vesting_storage::{StorageError, StorageInterface};
use vesting_types::{ConfigSchema, StorageKey};

/// Switch shared between a test and its [`FlakyStorage`].
#[derive(Clone, Default)]
pub(crate) struct WriteFault(Arc<Mutex<Option<StorageKey>>>);

impl WriteFault {
	pub(crate) fn fail(&self, namespace: StorageKey) {
		*self.0.lock().unwrap() = Some(namespace);
	}

	pub(crate) fn clear(&self) {
		*self.0.lock().unwrap() = None;
	}

	fn hits(&self, key: &str) -> bool {
		self.0
			.lock()
			.unwrap()
			.is_some_and(|ns| key.starts_with(&format!("{}:", ns.as_str())))
	}
}

pub(crate) struct FlakyStorage {
	inner: MemoryStorage,
	fault: WriteFault,
}

impl FlakyStorage {
	pub(crate) fn new(fault: WriteFault) -> Self {
		Self {
			inner: MemoryStorage::new(),
			fault,
		}
	}

	fn check(&self, key: &str) -> Result<(), StorageError> {
		if self.fault.hits(key) {
			return Err(StorageError::Backend(format!("write to {} refused", key)));
		}
		Ok(())
	}
}

#[async_trait]
impl StorageInterface for FlakyStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.inner.get_bytes(key).await
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.check(key)?;
		self.inner.set_bytes(key, value).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.check(key)?;
		self.inner.delete(key).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		self.inner.exists(key).await
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		self.inner.config_schema()
	}
}
