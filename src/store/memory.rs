//! Thread-safe in-memory [`CredentialStore`] for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	auth::CredentialSet,
	store::{CredentialStore, StoreFuture},
};

type Slot = Arc<RwLock<Option<CredentialSet>>>;

/// Single-slot store; clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Slot);
impl MemoryStore {
	/// Creates a store already holding `credential`.
	pub fn with_credential(credential: CredentialSet) -> Self {
		Self(Arc::new(RwLock::new(Some(credential))))
	}

	/// Returns a copy of the current record without going through the async contract.
	pub fn snapshot(&self) -> Option<CredentialSet> {
		self.0.read().clone()
	}

	/// Removes the stored record.
	pub fn clear(&self) {
		self.0.write().take();
	}
}
impl CredentialStore for MemoryStore {
	fn read(&self) -> StoreFuture<'_, Option<CredentialSet>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.read().clone()) })
	}

	fn write(&self, credential: CredentialSet) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.write() = Some(credential);

			Ok(())
		})
	}
}
