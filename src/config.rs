//! Coordinator settings, their validation, and environment loading.

// std
use std::env;
// crates.io
use url::Host;
// self
use crate::{_prelude::*, auth::ClientSecret, coordinator::CoordinatorPolicy, error::ConfigError};

/// Validated settings for a coordinator and its reqwest transport.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret; never rendered in cleartext.
	pub client_secret: ClientSecret,
	/// Identity-provider token endpoint used for refreshes.
	pub token_endpoint: Url,
	/// Base URL of the business API used by [`crate::client::AuthorizedClient`].
	pub api_base_url: Option<Url>,
	/// Default remaining validity a returned credential must have.
	pub default_buffer: Duration,
	/// Default number of store polls while another holder refreshes.
	pub wait_attempts: u32,
	/// Sleep between store polls while another holder refreshes.
	pub retry_interval: Duration,
	/// Upper bound on each lock acquisition attempt.
	pub lock_timeout: Duration,
}
impl CoordinatorConfig {
	/// Default freshness buffer.
	pub const DEFAULT_BUFFER: Duration = Duration::seconds(60);
	/// Default number of store polls while another holder refreshes.
	pub const DEFAULT_WAIT_ATTEMPTS: u32 = 3;
	/// Default sleep between polling rounds.
	pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::seconds(1);
	/// Default bound on each lock acquisition attempt.
	pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::seconds(2);

	/// Starts building a configuration.
	pub fn builder() -> CoordinatorConfigBuilder {
		CoordinatorConfigBuilder::default()
	}

	/// Loads settings from process environment variables named `<prefix>_*`.
	///
	/// | Variable | Meaning |
	/// | --- | --- |
	/// | `<prefix>_CLIENT_ID` | client identifier (required) |
	/// | `<prefix>_CLIENT_SECRET` | client secret (required) |
	/// | `<prefix>_TOKEN_URL` | token endpoint (required) |
	/// | `<prefix>_API_BASE_URL` | business API base URL |
	/// | `<prefix>_TOKEN_BUFFER_SECS` | default freshness buffer in seconds |
	/// | `<prefix>_LOCK_WAIT_ATTEMPTS` | store polls while another holder refreshes |
	/// | `<prefix>_LOCK_RETRY_INTERVAL_MS` | sleep between polling rounds |
	/// | `<prefix>_LOCK_TIMEOUT_MS` | bound on each lock acquisition |
	pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
		Self::from_lookup(prefix, |key| env::var(key).ok())
	}

	/// Same as [`CoordinatorConfig::from_env`] but reads values through `lookup`.
	pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let vars = Lookup { prefix, lookup };
		let mut builder = Self::builder()
			.client_id(vars.required("CLIENT_ID")?)
			.client_secret(ClientSecret::new(vars.required("CLIENT_SECRET")?))
			.token_endpoint(vars.url("TOKEN_URL")?.ok_or_else(|| vars.missing("TOKEN_URL"))?);

		if let Some(url) = vars.url("API_BASE_URL")? {
			builder = builder.api_base_url(url);
		}
		if let Some(secs) = vars.number::<i64>("TOKEN_BUFFER_SECS")? {
			builder = builder.default_buffer(Duration::seconds(secs));
		}
		if let Some(attempts) = vars.number::<u32>("LOCK_WAIT_ATTEMPTS")? {
			builder = builder.wait_attempts(attempts);
		}
		if let Some(ms) = vars.number::<i64>("LOCK_RETRY_INTERVAL_MS")? {
			builder = builder.retry_interval(Duration::milliseconds(ms));
		}
		if let Some(ms) = vars.number::<i64>("LOCK_TIMEOUT_MS")? {
			builder = builder.lock_timeout(Duration::milliseconds(ms));
		}

		builder.build()
	}

	/// Coordinator defaults derived from these settings.
	pub fn policy(&self) -> CoordinatorPolicy {
		CoordinatorPolicy {
			default_buffer: self.default_buffer,
			wait_attempts: self.wait_attempts,
			retry_interval: self.retry_interval,
			lock_timeout: self.lock_timeout,
		}
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.client_id.trim().is_empty() {
			return Err(ConfigError::Missing { name: "client_id".into() });
		}
		if self.client_secret.is_empty() {
			return Err(ConfigError::Missing { name: "client_secret".into() });
		}

		validate_endpoint("token", &self.token_endpoint)?;

		if let Some(url) = self.api_base_url.as_ref() {
			validate_endpoint("API", url)?;
		}
		if self.default_buffer.is_negative() {
			return Err(ConfigError::OutOfRange {
				name: "default_buffer",
				reason: "must not be negative",
			});
		}
		if self.wait_attempts == 0 {
			return Err(ConfigError::OutOfRange {
				name: "wait_attempts",
				reason: "must be at least 1",
			});
		}
		if !self.retry_interval.is_positive() {
			return Err(ConfigError::OutOfRange {
				name: "retry_interval",
				reason: "must be positive",
			});
		}
		if !self.lock_timeout.is_positive() {
			return Err(ConfigError::OutOfRange { name: "lock_timeout", reason: "must be positive" });
		}

		Ok(())
	}
}

/// Builder for [`CoordinatorConfig`] values.
#[derive(Debug, Default)]
pub struct CoordinatorConfigBuilder {
	/// OAuth client identifier.
	pub client_id: Option<String>,
	/// OAuth client secret.
	pub client_secret: Option<ClientSecret>,
	/// Token endpoint used for refreshes.
	pub token_endpoint: Option<Url>,
	/// Optional business API base URL.
	pub api_base_url: Option<Url>,
	/// Freshness buffer override.
	pub default_buffer: Option<Duration>,
	/// Override for store polls while another holder refreshes.
	pub wait_attempts: Option<u32>,
	/// Polling interval override.
	pub retry_interval: Option<Duration>,
	/// Lock acquisition bound override.
	pub lock_timeout: Option<Duration>,
}
impl CoordinatorConfigBuilder {
	/// Sets the OAuth client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the OAuth client secret.
	pub fn client_secret(mut self, client_secret: ClientSecret) -> Self {
		self.client_secret = Some(client_secret);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the business API base URL.
	pub fn api_base_url(mut self, url: Url) -> Self {
		self.api_base_url = Some(url);

		self
	}

	/// Overrides the default freshness buffer.
	pub fn default_buffer(mut self, buffer: Duration) -> Self {
		self.default_buffer = Some(buffer);

		self
	}

	/// Overrides the default number of store polls while another holder refreshes.
	pub fn wait_attempts(mut self, attempts: u32) -> Self {
		self.wait_attempts = Some(attempts);

		self
	}

	/// Overrides the sleep between polling rounds.
	pub fn retry_interval(mut self, interval: Duration) -> Self {
		self.retry_interval = Some(interval);

		self
	}

	/// Overrides the bound on each lock acquisition attempt.
	pub fn lock_timeout(mut self, timeout: Duration) -> Self {
		self.lock_timeout = Some(timeout);

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<CoordinatorConfig, ConfigError> {
		let config = CoordinatorConfig {
			client_id: self.client_id.ok_or(ConfigError::Missing { name: "client_id".into() })?,
			client_secret: self
				.client_secret
				.ok_or(ConfigError::Missing { name: "client_secret".into() })?,
			token_endpoint: self
				.token_endpoint
				.ok_or(ConfigError::Missing { name: "token_endpoint".into() })?,
			api_base_url: self.api_base_url,
			default_buffer: self.default_buffer.unwrap_or(CoordinatorConfig::DEFAULT_BUFFER),
			wait_attempts: self.wait_attempts.unwrap_or(CoordinatorConfig::DEFAULT_WAIT_ATTEMPTS),
			retry_interval: self.retry_interval.unwrap_or(CoordinatorConfig::DEFAULT_RETRY_INTERVAL),
			lock_timeout: self.lock_timeout.unwrap_or(CoordinatorConfig::DEFAULT_LOCK_TIMEOUT),
		};

		config.validate()?;

		Ok(config)
	}
}

struct Lookup<'a, F> {
	prefix: &'a str,
	lookup: F,
}
impl<F> Lookup<'_, F>
where
	F: Fn(&str) -> Option<String>,
{
	fn name(&self, key: &str) -> String {
		format!("{}_{key}", self.prefix)
	}

	fn missing(&self, key: &str) -> ConfigError {
		ConfigError::Missing { name: self.name(key) }
	}

	fn get(&self, key: &str) -> Option<String> {
		(self.lookup)(&self.name(key)).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
	}

	fn required(&self, key: &str) -> Result<String, ConfigError> {
		self.get(key).ok_or_else(|| self.missing(key))
	}

	fn url(&self, key: &str) -> Result<Option<Url>, ConfigError> {
		self.get(key)
			.map(|raw| {
				Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { name: self.name(key), source })
			})
			.transpose()
	}

	fn number<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
	where
		T: std::str::FromStr,
	{
		self.get(key)
			.map(|raw| {
				raw.parse::<T>()
					.map_err(|_| ConfigError::InvalidNumber { name: self.name(key), value: raw })
			})
			.transpose()
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	let loopback = match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
		None => false,
	};

	if url.scheme() == "https" || (url.scheme() == "http" && loopback) {
		Ok(())
	} else {
		Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashMap;
	// self
	use super::*;

	fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map = pairs
			.iter()
			.map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
			.collect::<HashMap<_, _>>();

		move |key| map.get(key).cloned()
	}

	const REQUIRED: [(&str, &str); 3] = [
		("BROKER_CLIENT_ID", "app-key"),
		("BROKER_CLIENT_SECRET", "app-secret"),
		("BROKER_TOKEN_URL", "https://api.example.com/v1/oauth/token"),
	];

	#[test]
	fn lookup_applies_defaults_and_overrides() {
		let config = CoordinatorConfig::from_lookup("BROKER", lookup(&REQUIRED))
			.expect("Required settings should suffice.");

		assert_eq!(config.client_id, "app-key");
		assert_eq!(config.default_buffer, Duration::seconds(60));
		assert_eq!(config.wait_attempts, 3);
		assert_eq!(config.retry_interval, Duration::seconds(1));
		assert_eq!(config.lock_timeout, Duration::seconds(2));
		assert!(config.api_base_url.is_none());

		let mut pairs = REQUIRED.to_vec();

		pairs.extend([
			("BROKER_API_BASE_URL", "https://api.example.com/marketdata/v1"),
			("BROKER_TOKEN_BUFFER_SECS", "300"),
			("BROKER_LOCK_WAIT_ATTEMPTS", "5"),
			("BROKER_LOCK_RETRY_INTERVAL_MS", "250"),
			("BROKER_LOCK_TIMEOUT_MS", "750"),
		]);

		let policy = CoordinatorConfig::from_lookup("BROKER", lookup(&pairs))
			.expect("Overrides should be accepted.")
			.policy();

		assert_eq!(policy.default_buffer, Duration::seconds(300));
		assert_eq!(policy.wait_attempts, 5);
		assert_eq!(policy.retry_interval, Duration::milliseconds(250));
		assert_eq!(policy.lock_timeout, Duration::milliseconds(750));
	}

	#[test]
	fn lookup_reports_missing_and_malformed_values() {
		match CoordinatorConfig::from_lookup("BROKER", lookup(&REQUIRED[..2])) {
			Err(ConfigError::Missing { name }) => assert_eq!(name, "BROKER_TOKEN_URL"),
			other => panic!("Unexpected result: {other:?}."),
		}

		let mut pairs = REQUIRED.to_vec();

		pairs.push(("BROKER_LOCK_WAIT_ATTEMPTS", "many"));

		match CoordinatorConfig::from_lookup("BROKER", lookup(&pairs)) {
			Err(ConfigError::InvalidNumber { name, value }) => {
				assert_eq!(name, "BROKER_LOCK_WAIT_ATTEMPTS");
				assert_eq!(value, "many");
			},
			other => panic!("Unexpected result: {other:?}."),
		}
	}

	#[test]
	fn endpoints_require_https_except_loopback() {
		let builder = || {
			CoordinatorConfig::builder().client_id("id").client_secret(ClientSecret::new("secret"))
		};
		let insecure = builder()
			.token_endpoint(Url::parse("http://idp.example.com/token").expect("Valid URL."))
			.build();

		assert!(matches!(insecure, Err(ConfigError::InsecureEndpoint { endpoint: "token", .. })));
		assert!(
			builder()
				.token_endpoint(Url::parse("http://127.0.0.1:8080/token").expect("Valid URL."))
				.build()
				.is_ok()
		);
		assert!(
			builder()
				.token_endpoint(Url::parse("http://localhost/token").expect("Valid URL."))
				.build()
				.is_ok()
		);
	}

	#[test]
	fn timing_must_be_in_range() {
		let builder = || {
			CoordinatorConfig::builder()
				.client_id("id")
				.client_secret(ClientSecret::new("secret"))
				.token_endpoint(Url::parse("https://idp.example.com/token").expect("Valid URL."))
		};

		assert!(matches!(
			builder().default_buffer(Duration::seconds(-1)).build(),
			Err(ConfigError::OutOfRange { name: "default_buffer", .. })
		));
		assert!(matches!(
			builder().wait_attempts(0).build(),
			Err(ConfigError::OutOfRange { name: "wait_attempts", .. })
		));
		assert!(matches!(
			builder().retry_interval(Duration::ZERO).build(),
			Err(ConfigError::OutOfRange { name: "retry_interval", .. })
		));
		assert!(matches!(
			builder().client_secret(ClientSecret::default()).build(),
			Err(ConfigError::Missing { .. })
		));
	}

	#[test]
	fn debug_output_hides_client_secret() {
		let config = CoordinatorConfig::from_lookup("BROKER", lookup(&REQUIRED))
			.expect("Required settings should suffice.");

		assert!(!format!("{config:?}").contains("app-secret"));
	}
}
