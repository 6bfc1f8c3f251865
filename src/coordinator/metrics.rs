// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing coordinator activity.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
	calls: AtomicU64,
	refresh_attempts: AtomicU64,
	refresh_failures: AtomicU64,
	contended: AtomicU64,
	lock_timeouts: AtomicU64,
}
impl CoordinatorMetrics {
	/// Returns the total number of `get_token` calls.
	pub fn calls(&self) -> u64 {
		self.calls.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh exchanges started.
	pub fn refresh_attempts(&self) -> u64 {
		self.refresh_attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh exchanges that failed.
	pub fn refresh_failures(&self) -> u64 {
		self.refresh_failures.load(Ordering::Relaxed)
	}

	/// Returns the number of calls that had to wait for another holder.
	pub fn contended(&self) -> u64 {
		self.contended.load(Ordering::Relaxed)
	}

	/// Returns the number of calls that gave up waiting.
	pub fn lock_timeouts(&self) -> u64 {
		self.lock_timeouts.load(Ordering::Relaxed)
	}

	pub(crate) fn record_call(&self) {
		self.calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_attempt(&self) {
		self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_failure(&self) {
		self.refresh_failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_contended(&self) {
		self.contended.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_lock_timeout(&self) {
		self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
	}
}
