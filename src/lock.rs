//! Mutual-exclusion capability shared by every coordinator that may refresh.
//!
//! Locks are advisory: they keep refreshes from overlapping, while the coordinator's
//! re-read-under-lock step is what keeps a superseded refresh token from being spent.
//! Leases are time-boxed so a crashed holder cannot block the credential forever.

pub mod file;
pub mod memory;

pub use file::FileLock;
pub use memory::MemoryLock;

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::_prelude::*;

const OWNER_LEN: usize = 16;

/// Boxed future returned by [`RefreshLock`] operations.
pub type LockFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LockError>> + 'a + Send>>;

/// Acquire-with-timeout lock contract.
pub trait RefreshLock
where
	Self: Send + Sync,
{
	/// Tries to take the lock for up to `timeout`.
	///
	/// Returns `Some` when the lock is held by the caller and `None` when another holder kept it
	/// for the whole window.
	fn acquire(&self, timeout: Duration) -> LockFuture<'_, Option<LockLease>>;

	/// Releases a lease obtained from [`acquire`](Self::acquire).
	///
	/// Releasing a lease that no longer owns the lock (for example after its time-box lapsed and
	/// another holder took over) must succeed without touching the new holder.
	fn release(&self, lease: LockLease) -> LockFuture<'_, ()>;
}

/// Proof of lock ownership handed out by [`RefreshLock::acquire`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockLease {
	/// Random owner token distinguishing this holder from every other.
	pub owner: String,
	/// Instant the lease was granted.
	#[serde(with = "time::serde::timestamp::milliseconds")]
	pub acquired_at: OffsetDateTime,
	/// Instant after which other acquirers may break the lease.
	#[serde(with = "time::serde::timestamp::milliseconds")]
	pub expires_at: OffsetDateTime,
}
impl LockLease {
	/// Creates a fresh lease valid for `ttl` from now.
	pub fn new(ttl: Duration) -> Self {
		let acquired_at = OffsetDateTime::now_utc();
		let owner = rand::rng().sample_iter(Alphanumeric).take(OWNER_LEN).map(char::from).collect();

		Self { owner, acquired_at, expires_at: acquired_at + ttl }
	}

	/// Returns `true` once the time-box has lapsed at `now`.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		now >= self.expires_at
	}
}

/// Failures raised by [`RefreshLock`] backends.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum LockError {
	/// Backend-level failure for the lock service.
	#[error("Lock backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Polling cadence shared by the built-in lock implementations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockTiming {
	/// How long a granted lease stays valid.
	pub ttl: Duration,
	/// Delay between acquisition attempts while another holder owns the lock.
	pub poll_interval: Duration,
}
impl LockTiming {
	const DEFAULT_POLL_INTERVAL: Duration = Duration::milliseconds(25);
	const DEFAULT_TTL: Duration = Duration::seconds(30);
}
impl Default for LockTiming {
	fn default() -> Self {
		Self { ttl: Self::DEFAULT_TTL, poll_interval: Self::DEFAULT_POLL_INTERVAL }
	}
}

/// Drives `attempt` until it grants a lease or `timeout` elapses.
pub(crate) async fn poll_until<F, Fut>(
	timing: LockTiming,
	timeout: Duration,
	mut attempt: F,
) -> Result<Option<LockLease>, LockError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Option<LockLease>, LockError>>,
{
	let deadline = tokio::time::Instant::now() + std_duration(timeout);

	loop {
		if let Some(lease) = attempt().await? {
			return Ok(Some(lease));
		}

		let now = tokio::time::Instant::now();

		if now >= deadline {
			return Ok(None);
		}

		tokio::time::sleep(std_duration(timing.poll_interval).min(deadline - now)).await;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn leases_carry_unique_owners() {
		let a = LockLease::new(Duration::seconds(5));
		let b = LockLease::new(Duration::seconds(5));

		assert_eq!(a.owner.len(), OWNER_LEN);
		assert_ne!(a.owner, b.owner);
		assert!(!a.is_expired_at(a.acquired_at));
		assert!(a.is_expired_at(a.acquired_at + Duration::seconds(5)));
	}

	#[test]
	fn lease_times_keep_sub_second_precision() {
		let lease = LockLease::new(Duration::milliseconds(500));
		let decoded: LockLease = serde_json::from_slice(
			&serde_json::to_vec(&lease).expect("Lease should serialize."),
		)
		.expect("Lease should deserialize.");

		assert_eq!(decoded.owner, lease.owner);
		assert!(lease.expires_at - decoded.expires_at < Duration::milliseconds(1));
		assert!(!decoded.is_expired_at(lease.acquired_at + Duration::milliseconds(100)));
	}

	#[tokio::test]
	async fn poll_until_gives_up_after_timeout() {
		let timing =
			LockTiming { ttl: Duration::seconds(1), poll_interval: Duration::milliseconds(5) };
		let mut calls = 0;
		let outcome = poll_until(timing, Duration::milliseconds(30), || {
			calls += 1;

			async { Ok(None) }
		})
		.await
		.expect("Polling should not fail.");

		assert!(outcome.is_none());
		assert!(calls > 1);
	}
}
