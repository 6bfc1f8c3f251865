//! Classification of non-success token endpoint responses.
//!
//! Structured OAuth fields (`error`, then `error_description`) win; the HTTP status is the
//! fallback. Anything unrecognized is treated as transient so callers back off instead of
//! discarding a refresh token that may still be valid.

// self
use crate::{
	_prelude::*,
	error::RefreshError,
	http::ResponseMetadata,
	transport::{FailureKind, meta_retry_after},
};

const BODY_PREVIEW_LIMIT: usize = 256;

#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default)]
	error_description: Option<String>,
}

/// Primitive facts about a failed exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ErrorContext {
	pub(crate) http_status: Option<u16>,
	pub(crate) oauth_error: Option<String>,
	pub(crate) error_description: Option<String>,
	pub(crate) body_preview: Option<String>,
}
impl ErrorContext {
	fn from_response(status: u16, body: &[u8]) -> Self {
		let parsed = serde_json::from_slice::<OAuthErrorBody>(body).unwrap_or_default();
		let text = String::from_utf8_lossy(body);
		let body_preview =
			(!text.trim().is_empty()).then(|| truncate_preview(text.trim().to_owned()));

		Self {
			http_status: Some(status),
			oauth_error: parsed.error,
			error_description: parsed.error_description,
			body_preview,
		}
	}

	fn message(&self) -> String {
		match (&self.oauth_error, &self.error_description) {
			(Some(error), Some(description)) => format!("{error} ({description})"),
			(Some(error), None) => error.clone(),
			(None, Some(description)) => description.clone(),
			(None, None) => self.body_preview.clone().unwrap_or_else(|| "empty response body".into()),
		}
	}

	pub(crate) fn classify(&self) -> FailureKind {
		self.oauth_error
			.as_deref()
			.and_then(match_oauth_error)
			.or_else(|| self.error_description.as_deref().and_then(match_oauth_error))
			.unwrap_or_else(|| classify_status(self.http_status))
	}
}

/// Builds the refresh error for a non-2xx token endpoint response.
pub(crate) fn error_response(
	status: u16,
	meta: Option<&ResponseMetadata>,
	body: &[u8],
) -> RefreshError {
	let ctx = ErrorContext::from_response(status, body);
	let message = ctx.message();

	match ctx.classify() {
		FailureKind::Authorization => RefreshError::Rejected { status, message },
		FailureKind::Transient | FailureKind::Local => RefreshError::Unavailable {
			message,
			status: Some(status),
			retry_after: meta_retry_after(meta),
		},
	}
}

fn match_oauth_error(value: &str) -> Option<FailureKind> {
	const AUTHORIZATION: [&str; 4] =
		["invalid_grant", "invalid_client", "unauthorized_client", "access_denied"];
	const TRANSIENT: [&str; 2] = ["temporarily_unavailable", "server_error"];

	let value = value.trim();

	if AUTHORIZATION.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(FailureKind::Authorization)
	} else if TRANSIENT.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(FailureKind::Transient)
	} else {
		None
	}
}

fn classify_status(status: Option<u16>) -> FailureKind {
	match status {
		Some(429) => FailureKind::Transient,
		Some(code) if (400..500).contains(&code) => FailureKind::Authorization,
		_ => FailureKind::Transient,
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}
