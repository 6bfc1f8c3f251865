//! Authenticated business API requests backed by a [`Coordinator`].

// crates.io
use reqwest::{
	Method, StatusCode,
	header::{ACCEPT, AUTHORIZATION},
};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::CredentialSet,
	config::CoordinatorConfig,
	coordinator::Coordinator,
	error::{ConfigError, TransportError},
	obs::{self, Operation, OperationSpan, Outcome},
};

/// Issues bearer-authenticated JSON requests against one API base URL.
///
/// A `401 Unauthorized` answer triggers exactly one retry with a credential re-checked under a
/// zero buffer; coordinator errors are returned untouched.
#[derive(Clone, Debug)]
pub struct AuthorizedClient {
	coordinator: Arc<Coordinator>,
	http: ReqwestClient,
	base_url: Url,
}
impl AuthorizedClient {
	/// Creates a client for `base_url`.
	pub fn new(coordinator: Arc<Coordinator>, http: ReqwestClient, base_url: Url) -> Self {
		Self { coordinator, http, base_url }
	}

	/// Creates a client for the API base URL configured in `config`.
	pub fn from_config(
		coordinator: Arc<Coordinator>,
		http: ReqwestClient,
		config: &CoordinatorConfig,
	) -> Result<Self, ConfigError> {
		let base_url = config.api_base_url.clone().ok_or(ConfigError::MissingApiBaseUrl)?;

		Ok(Self::new(coordinator, http, base_url))
	}

	/// Coordinator supplying credentials.
	pub fn coordinator(&self) -> &Coordinator {
		&self.coordinator
	}

	/// Base URL requests are resolved against.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Sends a `GET` request to `path` with the given query parameters.
	pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
		self.request(Method::GET, path, query).await
	}

	/// Sends a request to `path` and decodes the JSON response.
	pub async fn request(
		&self,
		method: Method,
		path: &str,
		query: &[(&str, &str)],
	) -> Result<Value> {
		let span = OperationSpan::new(Operation::Request, "request");

		obs::record_outcome(Operation::Request, Outcome::Attempt);

		let result = span.instrument(self.request_inner(method, path, query)).await;

		obs::record_outcome(
			Operation::Request,
			match &result {
				Ok(_) => Outcome::Success,
				Err(e) => Outcome::of_error(e),
			},
		);

		result
	}

	async fn request_inner(
		&self,
		method: Method,
		path: &str,
		query: &[(&str, &str)],
	) -> Result<Value> {
		let url = self.endpoint(path);
		let credential = self.coordinator.token().await?;
		let response = self.send(method.clone(), &url, query, &credential).await?;
		let response = if response.status() == StatusCode::UNAUTHORIZED {
			let request = self.coordinator.request().with_buffer(Duration::ZERO);
			let credential = self.coordinator.get_token(request).await?;

			self.send(method, &url, query, &credential).await?
		} else {
			response
		};
		let status = response.status();
		let body =
			response.text().await.map_err(|e| TransportError::from_reqwest(TransportError::API, e))?;

		if !status.is_success() {
			return Err(Error::Api { status: status.as_u16(), body });
		}

		if body.trim().is_empty() {
			return Ok(Value::Null);
		}

		serde_json::from_str(&body).map_err(|_| Error::Api { status: status.as_u16(), body })
	}

	async fn send(
		&self,
		method: Method,
		url: &str,
		query: &[(&str, &str)],
		credential: &CredentialSet,
	) -> Result<reqwest::Response> {
		let response = self
			.http
			.request(method, url)
			.query(query)
			.header(AUTHORIZATION, format!("Bearer {}", credential.access_token.expose()))
			.header(ACCEPT, "application/json")
			.send()
			.await
			.map_err(|e| TransportError::from_reqwest(TransportError::API, e))?;

		Ok(response)
	}

	fn endpoint(&self, path: &str) -> String {
		let base = self.base_url.as_str().trim_end_matches('/');
		let path = path.trim_start_matches('/');

		if path.is_empty() { base.to_owned() } else { format!("{base}/{path}") }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		coordinator::CoordinatorPolicy,
		error::RefreshError,
		lock::MemoryLock,
		store::MemoryStore,
		transport::{RefreshFuture, RefreshTransport},
	};

	struct Never;
	impl RefreshTransport for Never {
		fn refresh<'a>(&'a self, _: &'a crate::auth::TokenSecret) -> RefreshFuture<'a> {
			Box::pin(async {
				Err(RefreshError::InvalidResponse { reason: "refresh is not expected", status: 0 })
			})
		}
	}

	fn client(base: &str) -> AuthorizedClient {
		let coordinator = Coordinator::new(
			Arc::new(MemoryStore::default()),
			Arc::new(MemoryLock::default()),
			Arc::new(Never),
			CoordinatorPolicy::default(),
		);

		AuthorizedClient::new(
			Arc::new(coordinator),
			ReqwestClient::new(),
			Url::parse(base).expect("Failed to parse base URL."),
		)
	}

	#[test]
	fn endpoint_joins_base_and_path() {
		assert_eq!(
			client("https://api.example.com/marketdata/v1/").endpoint("/quotes"),
			"https://api.example.com/marketdata/v1/quotes"
		);
		assert_eq!(
			client("https://api.example.com/marketdata/v1").endpoint("markets"),
			"https://api.example.com/marketdata/v1/markets"
		);
	}
}
