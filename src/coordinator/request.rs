// crates.io
use tokio::time::Instant;
// self
use crate::_prelude::*;

/// Per-call parameters for [`crate::coordinator::Coordinator::get_token`].
///
/// Obtain one seeded with the coordinator's defaults through
/// [`crate::coordinator::Coordinator::request`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenRequest {
	/// Remaining validity the returned credential must have.
	pub buffer: Duration,
	/// Store polls while another holder refreshes, before giving up.
	pub wait_attempts: u32,
	/// Overall time budget for the call, measured from when it starts.
	pub deadline: Option<Duration>,
}
impl TokenRequest {
	/// Creates a request without an overall deadline.
	pub fn new(buffer: Duration, wait_attempts: u32) -> Self {
		Self { buffer, wait_attempts, deadline: None }
	}

	/// Overrides the freshness buffer.
	pub fn with_buffer(mut self, buffer: Duration) -> Self {
		self.buffer = buffer;

		self
	}

	/// Overrides the number of store polls while another holder refreshes.
	pub fn with_wait_attempts(mut self, wait_attempts: u32) -> Self {
		self.wait_attempts = wait_attempts;

		self
	}

	/// Bounds the whole call, including every lock wait and polling sleep.
	pub fn with_deadline(mut self, budget: Duration) -> Self {
		self.deadline = Some(budget);

		self
	}
}

/// Request parameters pinned to the instant a call started.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CallBudget {
	pub(crate) buffer: Duration,
	pub(crate) wait_attempts: u32,
	deadline: Option<Instant>,
}
impl CallBudget {
	pub(crate) fn start(request: TokenRequest) -> Self {
		let deadline = request.deadline.map(|budget| Instant::now() + std_duration(budget));

		Self { buffer: request.buffer, wait_attempts: request.wait_attempts, deadline }
	}

	/// Time left before the deadline; `None` when the call is unbounded.
	pub(crate) fn remaining(&self) -> Option<std::time::Duration> {
		self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
	}

	pub(crate) fn is_exhausted(&self) -> bool {
		self.remaining().is_some_and(|left| left.is_zero())
	}

	/// Clips `wait` to the remaining budget.
	pub(crate) fn clip(&self, wait: Duration) -> std::time::Duration {
		let wait = std_duration(wait);

		self.remaining().map_or(wait, |left| wait.min(left))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn builders_override_fields() {
		let request = TokenRequest::new(Duration::seconds(60), 3)
			.with_buffer(Duration::ZERO)
			.with_wait_attempts(7)
			.with_deadline(Duration::seconds(5));

		assert_eq!(request.buffer, Duration::ZERO);
		assert_eq!(request.wait_attempts, 7);
		assert_eq!(request.deadline, Some(Duration::seconds(5)));
	}

	#[tokio::test]
	async fn budget_clips_waits_to_the_deadline() {
		let unbounded = CallBudget::start(TokenRequest::new(Duration::ZERO, 1));

		assert_eq!(unbounded.clip(Duration::seconds(2)), std::time::Duration::from_secs(2));
		assert!(!unbounded.is_exhausted());

		let bounded = CallBudget::start(
			TokenRequest::new(Duration::ZERO, 1).with_deadline(Duration::milliseconds(50)),
		);

		assert!(bounded.clip(Duration::seconds(2)) <= std::time::Duration::from_millis(50));

		let spent =
			CallBudget::start(TokenRequest::new(Duration::ZERO, 1).with_deadline(Duration::ZERO));

		assert!(spent.is_exhausted());
		assert!(spent.clip(Duration::seconds(2)).is_zero());
	}
}
