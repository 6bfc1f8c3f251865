//! Optional observability helpers for coordinator operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `token_steward.operation` with the `op`
//!   (operation) and `stage` (call site) fields, plus debug/warn events on phase transitions.
//!   Events only ever carry token fingerprints, never token values.
//! - Enable `metrics` to increment the `token_steward_operation_total` counter for every
//!   attempt and terminal outcome, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
	/// `Coordinator::get_token` and its shorthands.
	GetToken,
	/// One refresh exchange with the identity provider.
	Refresh,
	/// One business API request issued by the authorized client.
	Request,
}
impl Operation {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Operation::GetToken => "get_token",
			Operation::Refresh => "refresh",
			Operation::Request => "request",
		}
	}
}
impl Display for Operation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
	/// Entry to an operation.
	Attempt,
	/// A stored credential was already fresh.
	Cached,
	/// This caller refreshed and persisted a new credential.
	Refreshed,
	/// Another holder refreshed and this caller observed the result.
	Awaited,
	/// Generic successful completion.
	Success,
	/// The store held no credential.
	NoCredential,
	/// The refresh exchange failed.
	RefreshFailed,
	/// Coordination did not finish within the wait budget.
	LockTimeout,
	/// Any other failure propagated back to the caller.
	Failure,
}
impl Outcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Outcome::Attempt => "attempt",
			Outcome::Cached => "cached",
			Outcome::Refreshed => "refreshed",
			Outcome::Awaited => "awaited",
			Outcome::Success => "success",
			Outcome::NoCredential => "no_credential",
			Outcome::RefreshFailed => "refresh_failed",
			Outcome::LockTimeout => "lock_timeout",
			Outcome::Failure => "failure",
		}
	}

	/// Maps a terminal error to its outcome label.
	pub fn of_error(error: &Error) -> Self {
		match error {
			Error::NoCredential => Outcome::NoCredential,
			Error::RefreshFailed(_) | Error::MissingRefreshToken => Outcome::RefreshFailed,
			Error::LockTimeout { .. } => Outcome::LockTimeout,
			_ => Outcome::Failure,
		}
	}
}
impl Display for Outcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
