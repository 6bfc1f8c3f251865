//! Credential Store capability and built-in implementations.
//!
//! A store owns the canonical [`CredentialSet`] for the single key it was configured with.
//! Coordinators only read from it and replace it wholesale after a refresh, so
//! implementations need read-after-write visibility for that key and nothing more.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::CredentialSet};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Read/write contract for the durable credential record.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Loads the current credential set, or `None` when nothing has been stored yet.
	fn read(&self) -> StoreFuture<'_, Option<CredentialSet>>;

	/// Replaces the stored credential set. A failed write must leave the previous record intact.
	fn write(&self, credential: CredentialSet) -> StoreFuture<'_, ()>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
