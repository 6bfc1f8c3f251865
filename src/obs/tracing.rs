// self
use crate::{_prelude::*, obs::Operation};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOperation<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOperation<F> = F;

/// A span builder used by coordinator operations.
#[derive(Clone, Debug)]
pub struct OperationSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OperationSpan {
	/// Creates a new span tagged with the provided operation + stage.
	pub fn new(op: Operation, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("token_steward.operation", op = op.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (op, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOperation<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a debug event for a coordinator phase transition.
///
/// `fingerprint` identifies the credential involved without revealing it.
pub fn phase_event(phase: &'static str, fingerprint: Option<&str>) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(phase, fingerprint = fingerprint.unwrap_or("-"), "Coordinator phase entered.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (phase, fingerprint);
	}
}

/// Emits a warning for a failure that is logged instead of returned.
pub fn warn_event(message: &'static str, error: &dyn StdError) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(error = %error, "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (message, error);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn events_and_spans_never_fail() {
		let span = OperationSpan::new(Operation::GetToken, "events_and_spans_never_fail");

		assert_eq!(span.instrument(async { 7 }).await, 7);

		phase_event("fresh_check", Some("abc"));
		warn_event("lock release failed", &std::io::Error::other("boom"));
	}

	#[cfg(feature = "tracing")]
	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = OperationSpan::new(Operation::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
