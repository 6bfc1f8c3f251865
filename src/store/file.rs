//! JSON-file [`CredentialStore`] that several processes can share.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::CredentialSet,
	store::{CredentialStore, StoreError, StoreFuture},
};

/// Persists one credential set to a JSON file.
///
/// Every read goes back to disk so a refresh written by another process is observed by the
/// next freshness check. Writes land in a sibling `.tmp` file first and are renamed into place.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	write_guard: Arc<Mutex<()>>,
}
impl FileStore {
	/// Opens a store at the provided path, creating parent directories as needed.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		Ok(Self { path, write_guard: Default::default() })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load(path: &Path) -> Result<Option<CredentialSet>, StoreError> {
		let bytes = match fs::read(path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", path.display()),
				}),
		};

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		serde_json::from_slice(&bytes).map(Some).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, credential: &CredentialSet) -> Result<(), StoreError> {
		let _guard = self.write_guard.lock();

		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(credential).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn read(&self) -> StoreFuture<'_, Option<CredentialSet>> {
		let path = self.path.clone();

		Box::pin(blocking(move || Self::load(&path)))
	}

	fn write(&self, credential: CredentialSet) -> StoreFuture<'_, ()> {
		let store = self.clone();

		Box::pin(blocking(move || store.persist(&credential)))
	}
}

async fn blocking<T, F>(task: F) -> Result<T, StoreError>
where
	T: 'static + Send,
	F: 'static + Send + FnOnce() -> Result<T, StoreError>,
{
	tokio::task::spawn_blocking(task)
		.await
		.map_err(|e| StoreError::Backend { message: format!("Store file task failed: {e}") })?
}
