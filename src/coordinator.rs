//! Token lifecycle coordinator.
//!
//! Every [`Coordinator::get_token`] call walks an explicit state machine:
//!
//! - `FreshCheck`: read the store; absent => [`Error::NoCredential`], fresh => return it.
//! - `Contend`: take the in-process guard, re-read, then try the shared [`RefreshLock`].
//! - `Refresh`: with the lock held, re-read once more and only spend the refresh token when the
//!   record is still stale; persist the result and release the lock on every exit path.
//! - `WaitRetry`: poll the store a bounded number of times for another holder's result.
//!
//! The store is the only source of truth. Nothing read during one call is reused by the next.

mod metrics;
mod request;

pub use metrics::*;
pub use request::*;

// crates.io
use tokio::time;
// self
#[cfg(feature = "reqwest")] use crate::{config::CoordinatorConfig, transport::ReqwestRefreshTransport};
use crate::{
	_prelude::*,
	auth::{self, CredentialSet},
	lock::{LockLease, RefreshLock},
	obs::{self, Operation, OperationSpan, Outcome},
	store::CredentialStore,
	transport::RefreshTransport,
};

/// Defaults applied when a call does not override them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinatorPolicy {
	/// Remaining validity a returned credential must have.
	pub default_buffer: Duration,
	/// Store polls while another holder refreshes, before [`Error::LockTimeout`].
	pub wait_attempts: u32,
	/// Sleep between store polls while another holder refreshes.
	pub retry_interval: Duration,
	/// Upper bound on each in-process guard wait and lock acquisition.
	pub lock_timeout: Duration,
}
impl Default for CoordinatorPolicy {
	fn default() -> Self {
		Self {
			default_buffer: Duration::seconds(60),
			wait_attempts: 3,
			retry_interval: Duration::seconds(1),
			lock_timeout: Duration::seconds(2),
		}
	}
}

/// Where a returned credential came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenSource {
	/// The stored credential was already fresh.
	Cached,
	/// This call refreshed and persisted the credential.
	Refreshed,
	/// Another holder refreshed while this call waited.
	Awaited,
}
impl TokenSource {
	fn outcome(self) -> Outcome {
		match self {
			TokenSource::Cached => Outcome::Cached,
			TokenSource::Refreshed => Outcome::Refreshed,
			TokenSource::Awaited => Outcome::Awaited,
		}
	}
}

/// Credential returned by [`Coordinator::resolve`] together with its provenance.
#[derive(Clone, Debug)]
pub struct ResolvedToken {
	/// Credential satisfying the request.
	pub credential: CredentialSet,
	/// How the credential was obtained.
	pub source: TokenSource,
}

/// Lock ownership carried into the `Refresh` phase.
///
/// Dropping it without [`HeldLock::release`] (a caller abandoning `get_token` mid-refresh)
/// hands the lease to a background release task; without a runtime the lease lapses via its TTL.
struct HeldLock {
	lock: Arc<dyn RefreshLock>,
	lease: Option<LockLease>,
	_local: MutexGuardArc<()>,
}
impl HeldLock {
	fn new(lock: Arc<dyn RefreshLock>, lease: LockLease, local: MutexGuardArc<()>) -> Self {
		Self { lock, lease: Some(lease), _local: local }
	}

	async fn release(mut self) {
		let Some(lease) = self.lease.take() else {
			return;
		};

		if let Err(e) = self.lock.release(lease).await {
			obs::warn_event("Failed to release the refresh lock.", &e);
		}
	}
}
impl Debug for HeldLock {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HeldLock").field("lease", &self.lease).finish_non_exhaustive()
	}
}
impl Drop for HeldLock {
	fn drop(&mut self) {
		let Some(lease) = self.lease.take() else {
			return;
		};

		match tokio::runtime::Handle::try_current() {
			Ok(handle) => {
				let lock = self.lock.clone();

				handle.spawn(async move {
					if let Err(e) = lock.release(lease).await {
						obs::warn_event("Failed to release an abandoned refresh lock.", &e);
					}
				});
			},
			Err(e) => obs::warn_event("Abandoned refresh lock is left to expire.", &e),
		}
	}
}

#[derive(Debug)]
enum Phase {
	FreshCheck,
	Contend,
	Refresh(HeldLock),
	WaitRetry,
}
impl Phase {
	fn label(&self) -> &'static str {
		match self {
			Phase::FreshCheck => "fresh_check",
			Phase::Contend => "contend",
			Phase::Refresh(_) => "refresh",
			Phase::WaitRetry => "wait_retry",
		}
	}
}

#[derive(Debug)]
enum Transition {
	Next(Phase),
	Done(CredentialSet, TokenSource),
}

/// Coordinates refreshes of one stored credential across concurrent callers.
///
/// Clones share the store, lock, transport, metrics, and in-process guard.
#[derive(Clone)]
pub struct Coordinator {
	store: Arc<dyn CredentialStore>,
	lock: Arc<dyn RefreshLock>,
	transport: Arc<dyn RefreshTransport>,
	policy: CoordinatorPolicy,
	metrics: Arc<CoordinatorMetrics>,
	local: Arc<AsyncMutex<()>>,
}
impl Coordinator {
	/// Creates a coordinator from its collaborators.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		lock: Arc<dyn RefreshLock>,
		transport: Arc<dyn RefreshTransport>,
		policy: CoordinatorPolicy,
	) -> Self {
		Self {
			store,
			lock,
			transport,
			policy,
			metrics: Default::default(),
			local: Default::default(),
		}
	}

	/// Creates a coordinator that refreshes through a reqwest transport built from `config`.
	#[cfg(feature = "reqwest")]
	pub fn from_config(
		config: &CoordinatorConfig,
		store: Arc<dyn CredentialStore>,
		lock: Arc<dyn RefreshLock>,
		http_client: ReqwestClient,
	) -> Self {
		let transport = ReqwestRefreshTransport::reqwest(config, http_client);

		Self::new(store, lock, Arc::new(transport), config.policy())
	}

	/// Defaults applied to calls that do not override them.
	pub fn policy(&self) -> &CoordinatorPolicy {
		&self.policy
	}

	/// Shared activity counters.
	pub fn metrics(&self) -> &CoordinatorMetrics {
		&self.metrics
	}

	/// Returns a request seeded with this coordinator's defaults.
	pub fn request(&self) -> TokenRequest {
		TokenRequest::new(self.policy.default_buffer, self.policy.wait_attempts)
	}

	/// Returns a credential valid for at least the default buffer.
	pub async fn token(&self) -> Result<CredentialSet> {
		self.get_token(self.request()).await
	}

	/// Returns a credential satisfying `request`, refreshing or waiting as needed.
	pub async fn get_token(&self, request: TokenRequest) -> Result<CredentialSet> {
		self.resolve(request).await.map(|resolved| resolved.credential)
	}

	/// Same as [`Coordinator::get_token`] but also reports how the credential was obtained.
	pub async fn resolve(&self, request: TokenRequest) -> Result<ResolvedToken> {
		let span = OperationSpan::new(Operation::GetToken, "resolve");

		self.metrics.record_call();
		obs::record_outcome(Operation::GetToken, Outcome::Attempt);

		let result = span.instrument(self.run(CallBudget::start(request))).await;

		match &result {
			Ok(resolved) => obs::record_outcome(Operation::GetToken, resolved.source.outcome()),
			Err(e) => obs::record_outcome(Operation::GetToken, Outcome::of_error(e)),
		}

		result
	}

	/// Reports whether the stored credential lacks `buffer` of remaining validity.
	///
	/// An absent record counts as expired rather than as an error.
	pub async fn is_expired(&self, buffer: Duration) -> Result<bool> {
		let stored = self.store.read().await?;

		Ok(auth::is_expired(stored.as_ref(), OffsetDateTime::now_utc(), buffer))
	}

	async fn run(&self, budget: CallBudget) -> Result<ResolvedToken> {
		let mut phase = Phase::FreshCheck;

		loop {
			obs::phase_event(phase.label(), None);

			let transition = match phase {
				Phase::FreshCheck => self.fresh_check(&budget).await?,
				Phase::Contend => self.contend(&budget).await?,
				Phase::Refresh(held) => self.refresh(&budget, held).await?,
				Phase::WaitRetry => self.wait_retry(&budget).await?,
			};

			match transition {
				Transition::Next(next) => phase = next,
				Transition::Done(credential, source) =>
					return Ok(ResolvedToken { credential, source }),
			}
		}
	}

	async fn fresh_check(&self, budget: &CallBudget) -> Result<Transition> {
		let credential = self.store.read().await?.ok_or(Error::NoCredential)?;

		if is_fresh(&credential, budget) {
			return Ok(Transition::Done(credential, TokenSource::Cached));
		}

		Ok(Transition::Next(Phase::Contend))
	}

	async fn contend(&self, budget: &CallBudget) -> Result<Transition> {
		let wait = budget.clip(self.policy.lock_timeout);
		let Ok(local) = time::timeout(wait, self.local.lock_arc()).await else {
			return Ok(Transition::Next(Phase::WaitRetry));
		};
		// Another task in this process may have refreshed while we queued on the guard.
		let credential = self.store.read().await?.ok_or(Error::NoCredential)?;

		if is_fresh(&credential, budget) {
			return Ok(Transition::Done(credential, TokenSource::Awaited));
		}

		let wait = Duration::try_from(budget.clip(self.policy.lock_timeout))
			.unwrap_or(self.policy.lock_timeout);

		match self.lock.acquire(wait).await? {
			Some(lease) =>
				Ok(Transition::Next(Phase::Refresh(HeldLock::new(self.lock.clone(), lease, local)))),
			None => Ok(Transition::Next(Phase::WaitRetry)),
		}
	}

	async fn refresh(&self, budget: &CallBudget, held: HeldLock) -> Result<Transition> {
		let outcome = self.refresh_locked(budget).await;

		// The lease time-box covers a failed release; the refresh outcome wins.
		held.release().await;

		outcome
	}

	async fn refresh_locked(&self, budget: &CallBudget) -> Result<Transition> {
		let current = self.store.read().await?.ok_or(Error::NoCredential)?;

		if is_fresh(&current, budget) {
			return Ok(Transition::Done(current, TokenSource::Awaited));
		}
		if current.refresh_token.is_empty() {
			return Err(Error::MissingRefreshToken);
		}

		let span = OperationSpan::new(Operation::Refresh, "refresh_locked");

		self.metrics.record_refresh_attempt();
		obs::record_outcome(Operation::Refresh, Outcome::Attempt);
		obs::phase_event("exchange", Some(&current.refresh_token.fingerprint()));

		let refreshed = match span.instrument(self.transport.refresh(&current.refresh_token)).await {
			Ok(refreshed) => refreshed,
			Err(e) => {
				self.metrics.record_refresh_failure();
				obs::record_outcome(Operation::Refresh, Outcome::Failure);

				return Err(e.into());
			},
		};

		self.store.write(refreshed.clone()).await?;
		obs::record_outcome(Operation::Refresh, Outcome::Success);
		obs::phase_event("persisted", Some(&refreshed.access_token.fingerprint()));

		Ok(Transition::Done(refreshed, TokenSource::Refreshed))
	}

	async fn wait_retry(&self, budget: &CallBudget) -> Result<Transition> {
		self.metrics.record_contended();

		let mut polls = 0;

		while polls < budget.wait_attempts && !budget.is_exhausted() {
			time::sleep(budget.clip(self.policy.retry_interval)).await;

			polls += 1;

			let credential = self.store.read().await?.ok_or(Error::NoCredential)?;

			if is_fresh(&credential, budget) {
				return Ok(Transition::Done(credential, TokenSource::Awaited));
			}
		}

		self.metrics.record_lock_timeout();

		Err(Error::LockTimeout { polls })
	}
}
impl Debug for Coordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Coordinator")
			.field("policy", &self.policy)
			.field("metrics", &self.metrics)
			.finish_non_exhaustive()
	}
}

fn is_fresh(credential: &CredentialSet, budget: &CallBudget) -> bool {
	!credential.is_expired_at(OffsetDateTime::now_utc(), budget.buffer)
}
