//! In-process [`RefreshLock`] for coordinators sharing one address space.

// std
use std::future;
// self
use crate::{
	_prelude::*,
	lock::{LockError, LockFuture, LockLease, LockTiming, RefreshLock, poll_until},
};

/// Time-boxed lock held in memory; clones share the same lock.
#[derive(Clone, Debug, Default)]
pub struct MemoryLock {
	holder: Arc<Mutex<Option<LockLease>>>,
	timing: LockTiming,
}
impl MemoryLock {
	/// Creates a lock with custom lease and polling timing.
	pub fn with_timing(timing: LockTiming) -> Self {
		Self { holder: Default::default(), timing }
	}

	/// Returns `true` while an unexpired lease is outstanding.
	pub fn is_held(&self) -> bool {
		self.holder
			.lock()
			.as_ref()
			.is_some_and(|lease| !lease.is_expired_at(OffsetDateTime::now_utc()))
	}

	fn try_take(holder: &Mutex<Option<LockLease>>, ttl: Duration) -> Option<LockLease> {
		let mut guard = holder.lock();
		let now = OffsetDateTime::now_utc();

		if guard.as_ref().is_some_and(|current| !current.is_expired_at(now)) {
			return None;
		}

		let lease = LockLease::new(ttl);

		*guard = Some(lease.clone());

		Some(lease)
	}
}
impl RefreshLock for MemoryLock {
	fn acquire(&self, timeout: Duration) -> LockFuture<'_, Option<LockLease>> {
		let holder = self.holder.clone();
		let timing = self.timing;

		Box::pin(async move {
			poll_until(timing, timeout, || {
				future::ready(Ok::<_, LockError>(Self::try_take(&holder, timing.ttl)))
			})
			.await
		})
	}

	fn release(&self, lease: LockLease) -> LockFuture<'_, ()> {
		let holder = self.holder.clone();

		Box::pin(async move {
			let mut guard = holder.lock();

			if guard.as_ref().is_some_and(|current| current.owner == lease.owner) {
				guard.take();
			}

			Ok(())
		})
	}
}
