//! Parsing of successful token endpoint responses.

// self
use crate::{
	_prelude::*,
	auth::{CredentialSet, TokenSecret},
	error::RefreshError,
};

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	#[serde(default)]
	refresh_token: Option<String>,
	expires_in: i64,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	scope: Option<String>,
}

/// Converts a 2xx body into a credential set anchored at `received_at`.
///
/// Providers that do not rotate refresh tokens omit `refresh_token`; the spent token is carried
/// forward in that case.
pub(crate) fn parse_success(
	status: u16,
	body: &[u8],
	spent_refresh_token: &TokenSecret,
	received_at: OffsetDateTime,
) -> Result<CredentialSet, RefreshError> {
	let mut deserializer = serde_json::Deserializer::from_slice(body);
	let response: TokenResponse = serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| RefreshError::MalformedResponse { source, status })?;

	if response.access_token.is_empty() {
		return Err(RefreshError::InvalidResponse { reason: "access_token is empty", status });
	}
	if response.expires_in <= 0 {
		return Err(RefreshError::InvalidResponse { reason: "expires_in must be positive", status });
	}

	let expires_at = received_at
		.checked_add(Duration::seconds(response.expires_in))
		.ok_or(RefreshError::InvalidResponse { reason: "expires_in is out of range", status })?;
	let refresh_token = response
		.refresh_token
		.filter(|token| !token.is_empty())
		.unwrap_or_else(|| spent_refresh_token.expose().to_owned());
	let mut credential = CredentialSet::new(response.access_token, refresh_token, expires_at);

	credential.token_type = response.token_type;
	credential.scope = response.scope;

	Ok(credential)
}
