//! Crate-level error types shared by the coordinator, stores, locks, and transports.

// self
use crate::{_prelude::*, transport::FailureKind};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Lock-service failure.
	#[error("{0}")]
	Lock(
		#[from]
		#[source]
		crate::lock::LockError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS) while calling the business API.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// No credential exists; the out-of-band authorization flow must run again.
	#[error("No stored credential is available; re-run the authorization flow.")]
	NoCredential,
	/// The stored credential carries an empty refresh token.
	#[error("Stored credential is missing a refresh token.")]
	MissingRefreshToken,
	/// The identity provider rejected or failed the refresh call.
	#[error("Credential refresh failed: {0}")]
	RefreshFailed(#[source] RefreshError),
	/// Another holder did not publish a fresh credential within the wait budget.
	#[error("No fresh credential appeared after {polls} polling round(s) while another holder refreshed.")]
	LockTimeout {
		/// Polling rounds completed before giving up.
		polls: u32,
	},
	/// The business API answered with a non-success status.
	#[error("API request failed with HTTP {status}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Response body, as text.
		body: String,
	},
}
impl Error {
	/// Upstream HTTP status attached to the failure, when one exists.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::RefreshFailed(e) => e.status(),
			Self::Api { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Returns `true` when backing off and calling again may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Storage(_) | Self::Lock(_) | Self::Transport(_) | Self::LockTimeout { .. } =>
				true,
			Self::RefreshFailed(e) => matches!(e.kind(), FailureKind::Transient),
			Self::Api { status, .. } => *status == 429 || *status >= 500,
			Self::Config(_) | Self::NoCredential | Self::MissingRefreshToken => false,
		}
	}
}
impl From<RefreshError> for Error {
	fn from(e: RefreshError) -> Self {
		Self::RefreshFailed(e)
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A required setting was not supplied.
	#[error("Missing required setting `{name}`.")]
	Missing {
		/// Setting or environment variable name.
		name: String,
	},
	/// A numeric setting could not be parsed.
	#[error("Setting `{name}` is not a valid number: {value}.")]
	InvalidNumber {
		/// Setting or environment variable name.
		name: String,
		/// Raw value that failed to parse.
		value: String,
	},
	/// A URL setting could not be parsed.
	#[error("Setting `{name}` is not a valid URL.")]
	InvalidUrl {
		/// Setting or URL label.
		name: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// A setting is outside its accepted range.
	#[error("Setting `{name}` is out of range: {reason}.")]
	OutOfRange {
		/// Setting name.
		name: &'static str,
		/// Accepted range description.
		reason: &'static str,
	},
	/// The authorized client has no API base URL to send requests to.
	#[error("No API base URL is configured.")]
	MissingApiBaseUrl,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {target}.")]
	Network {
		/// Endpoint family that was being called.
		target: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request did not complete in time.
	#[error("Request to {target} timed out.")]
	Timeout {
		/// Endpoint family that was being called.
		target: &'static str,
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Label used for identity-provider calls.
	pub const TOKEN_ENDPOINT: &'static str = "the token endpoint";
	/// Label used for business API calls.
	pub const API: &'static str = "the API";

	/// Wraps a transport-specific network error.
	pub fn network(target: &'static str, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { target, source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(target: &'static str, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Timeout { target, source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl TransportError {
	/// Classifies a reqwest failure as a timeout or a generic network error.
	pub fn from_reqwest(target: &'static str, e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(target, e) } else { Self::network(target, e) }
	}
}

/// Failures of the identity-provider refresh exchange.
#[derive(Debug, ThisError)]
pub enum RefreshError {
	/// The provider refused the grant or the client credentials.
	#[error("Token endpoint rejected the refresh request with HTTP {status}: {message}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Provider-supplied description or body preview.
		message: String,
	},
	/// The provider failed in a way that may clear up on its own.
	#[error("Token endpoint is temporarily unavailable: {message}.")]
	Unavailable {
		/// Provider- or client-supplied description.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// A success response carried JSON that did not match the expected shape.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code.
		status: u16,
	},
	/// A success response carried well-formed but unusable values.
	#[error("Token endpoint returned an unusable response: {reason}.")]
	InvalidResponse {
		/// What was wrong with the response.
		reason: &'static str,
		/// HTTP status code.
		status: u16,
	},
	/// The refresh request could not be assembled locally.
	#[error("Refresh request could not be built.")]
	Request(#[from] oauth2::http::Error),
	/// Network-level failure while calling the token endpoint.
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl RefreshError {
	/// HTTP status returned by the token endpoint, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. }
			| Self::MalformedResponse { status, .. }
			| Self::InvalidResponse { status, .. } => Some(*status),
			Self::Unavailable { status, .. } => *status,
			Self::Request(_) | Self::Transport(_) => None,
		}
	}

	/// Coarse classification used by callers deciding whether to retry.
	pub fn kind(&self) -> FailureKind {
		match self {
			Self::Rejected { .. } => FailureKind::Authorization,
			Self::Request(_) => FailureKind::Local,
			Self::Unavailable { .. }
			| Self::MalformedResponse { .. }
			| Self::InvalidResponse { .. }
			| Self::Transport(_) => FailureKind::Transient,
		}
	}
}
