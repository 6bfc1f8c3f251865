//! Cross-process [`RefreshLock`] built on an exclusively created lease file.

// std
use std::{
	fs::{self, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
	time::SystemTime,
};
// self
use crate::{
	_prelude::*,
	lock::{LockError, LockFuture, LockLease, LockTiming, RefreshLock, poll_until},
};

/// Lease-file lock shared by every process that can see `path`.
///
/// The holder writes its [`LockLease`] into the file; acquirers break leases whose time-box has
/// lapsed (or unreadable files older than the TTL). Breaking a stale lease is best effort, which
/// is acceptable because the coordinator re-reads the credential after acquiring.
#[derive(Clone, Debug)]
pub struct FileLock {
	path: PathBuf,
	timing: LockTiming,
}
impl FileLock {
	/// Creates a lock backed by `path` with default timing.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into(), timing: LockTiming::default() }
	}

	/// Overrides lease and polling timing.
	pub fn with_timing(mut self, timing: LockTiming) -> Self {
		self.timing = timing;

		self
	}

	/// Location of the lease file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn try_take(path: &Path, ttl: Duration) -> Result<Option<LockLease>, LockError> {
		match OpenOptions::new().write(true).create_new(true).open(path) {
			Ok(mut file) => {
				let lease = LockLease::new(ttl);
				let written = serde_json::to_vec(&lease)
					.map_err(|e| e.to_string())
					.and_then(|bytes| file.write_all(&bytes).map_err(|e| e.to_string()))
					.and_then(|_| file.sync_all().map_err(|e| e.to_string()));

				if let Err(message) = written {
					let _ = fs::remove_file(path);

					return Err(backend(format!("Failed to write {}: {message}", path.display())));
				}

				Ok(Some(lease))
			},
			Err(e) if e.kind() == ErrorKind::AlreadyExists => {
				if Self::is_stale(path, ttl)? {
					Self::remove(path)?;
				}

				Ok(None)
			},
			Err(e) => Err(backend(format!("Failed to create {}: {e}", path.display()))),
		}
	}

	fn is_stale(path: &Path, ttl: Duration) -> Result<bool, LockError> {
		let now = OffsetDateTime::now_utc();

		match Self::read_lease(path)? {
			Some(Some(lease)) => Ok(lease.is_expired_at(now)),
			Some(None) => {
				let modified = fs::metadata(path)
					.and_then(|meta| meta.modified())
					.unwrap_or(SystemTime::UNIX_EPOCH);

				Ok(OffsetDateTime::from(modified) + ttl <= now)
			},
			None => Ok(false),
		}
	}

	/// `None` when the file is gone, `Some(None)` when it exists but cannot be parsed.
	fn read_lease(path: &Path) -> Result<Option<Option<LockLease>>, LockError> {
		match fs::read(path) {
			Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).ok())),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(backend(format!("Failed to read {}: {e}", path.display()))),
		}
	}

	fn remove(path: &Path) -> Result<(), LockError> {
		match fs::remove_file(path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend(format!("Failed to remove {}: {e}", path.display()))),
		}
	}
}
impl RefreshLock for FileLock {
	fn acquire(&self, timeout: Duration) -> LockFuture<'_, Option<LockLease>> {
		Box::pin(async move {
			let ttl = self.timing.ttl;

			poll_until(self.timing, timeout, || {
				let path = self.path.clone();

				blocking(move || Self::try_take(&path, ttl))
			})
			.await
		})
	}

	fn release(&self, lease: LockLease) -> LockFuture<'_, ()> {
		let path = self.path.clone();

		Box::pin(blocking(move || match Self::read_lease(&path)? {
			Some(Some(current)) if current.owner == lease.owner => Self::remove(&path),
			_ => Ok(()),
		}))
	}
}

/// Runs lease-file I/O on the blocking pool so acquire polling never stalls a runtime worker.
async fn blocking<T, F>(task: F) -> Result<T, LockError>
where
	T: 'static + Send,
	F: 'static + Send + FnOnce() -> Result<T, LockError>,
{
	tokio::task::spawn_blocking(task)
		.await
		.map_err(|e| backend(format!("Lease file task failed: {e}")))?
}

fn backend(message: String) -> LockError {
	LockError::Backend { message }
}
