//! The credential set persisted by stores and exchanged with the identity provider.

// crates.io
use serde::{Deserializer, Serializer, de::IgnoredAny};
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Returns `true` when `credential` cannot be trusted for `buffer` more time at `now`.
///
/// A missing credential is a valid "expired" answer rather than a fault.
pub fn is_expired(credential: Option<&CredentialSet>, now: OffsetDateTime, buffer: Duration) -> bool {
	credential.is_none_or(|credential| credential.is_expired_at(now, buffer))
}

/// The access/refresh token pair plus absolute expiry.
///
/// Records are replaced wholesale on every successful refresh; they are never mutated in place.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialSet {
	/// Bearer credential for business API calls; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Long-lived credential used only to mint a new access token.
	pub refresh_token: TokenSecret,
	/// Absolute expiry of the access token. `None` means freshness cannot be proven.
	#[serde(default, serialize_with = "serialize_expiry", deserialize_with = "deserialize_expiry")]
	pub expires_at: Option<OffsetDateTime>,
	/// Opaque token type reported by the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub token_type: Option<String>,
	/// Opaque scope string reported by the provider.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
}
impl CredentialSet {
	/// Creates a credential set with an absolute expiry.
	pub fn new(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_at: OffsetDateTime,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			refresh_token: TokenSecret::new(refresh_token),
			expires_at: Some(expires_at),
			token_type: None,
			scope: None,
		}
	}

	/// Normalizes a provider-relative `expires_in` into an absolute expiry anchored at
	/// `received_at`.
	pub fn from_expires_in(
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_in: Duration,
		received_at: OffsetDateTime,
	) -> Self {
		Self::new(access_token, refresh_token, received_at + expires_in)
	}

	/// Sets the passthrough token type.
	pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the passthrough scope string.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Returns `true` when the access token is expired at `now` or expires within `buffer`.
	///
	/// Records without an interpretable expiry are always expired. Negative buffers are treated
	/// as zero.
	pub fn is_expired_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
		let buffer = if buffer.is_negative() { Duration::ZERO } else { buffer };

		match self.expires_at {
			Some(expires_at) => now >= expires_at - buffer,
			None => true,
		}
	}

	/// Convenience helper that evaluates expiry against the current UTC instant.
	pub fn is_expired(&self, buffer: Duration) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc(), buffer)
	}

	/// Remaining validity at `now`, if the expiry is known.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Option<Duration> {
		self.expires_at.map(|expires_at| expires_at - now)
	}
}
impl Debug for CredentialSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialSet")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.finish()
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpiry {
	Seconds(i64),
	Fractional(f64),
	Other(IgnoredAny),
}
impl RawExpiry {
	fn into_instant(self) -> Option<OffsetDateTime> {
		match self {
			Self::Seconds(secs) => OffsetDateTime::from_unix_timestamp(secs).ok(),
			Self::Fractional(secs) if secs.is_finite() => {
				let nanos = (secs * 1_000_000_000_f64) as i128;

				OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
			},
			Self::Fractional(_) | Self::Other(_) => None,
		}
	}
}

fn serialize_expiry<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	match value {
		Some(instant) => serializer.serialize_some(&instant.unix_timestamp()),
		None => serializer.serialize_none(),
	}
}

fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
	D: Deserializer<'de>,
{
	Ok(RawExpiry::deserialize(deserializer)?.into_instant())
}
