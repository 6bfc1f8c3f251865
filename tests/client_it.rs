#![cfg(feature = "reqwest")]

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use token_steward::{
	auth::{ClientSecret, CredentialSet, TokenSecret},
	client::AuthorizedClient,
	config::CoordinatorConfig,
	coordinator::{Coordinator, CoordinatorPolicy},
	error::{ConfigError, Error, RefreshError},
	lock::MemoryLock,
	reqwest::Client as ReqwestClient,
	store::{CredentialStore, MemoryStore, StoreFuture},
	transport::{RefreshFuture, RefreshTransport},
};

/// Serves `A1` on the first read and `A2` afterwards, as if another process rotated the record.
#[derive(Default)]
struct RotatingStore {
	reads: AtomicUsize,
}
impl CredentialStore for RotatingStore {
	fn read(&self) -> StoreFuture<'_, Option<CredentialSet>> {
		let n = self.reads.fetch_add(1, Ordering::SeqCst);
		let access = if n == 0 { "A1" } else { "A2" };

		Box::pin(async move {
			Ok(Some(CredentialSet::new(
				access,
				"R1",
				OffsetDateTime::now_utc() + Duration::hours(1),
			)))
		})
	}

	fn write(&self, _: CredentialSet) -> StoreFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}
}

struct Never;
impl RefreshTransport for Never {
	fn refresh<'a>(&'a self, _: &'a TokenSecret) -> RefreshFuture<'a> {
		Box::pin(async {
			Err(RefreshError::InvalidResponse { reason: "refresh is not expected", status: 0 })
		})
	}
}

fn client(server: &MockServer, store: Arc<dyn CredentialStore>) -> AuthorizedClient {
	let coordinator = Coordinator::new(
		store,
		Arc::new(MemoryLock::default()),
		Arc::new(Never),
		CoordinatorPolicy::default(),
	);

	AuthorizedClient::new(
		Arc::new(coordinator),
		ReqwestClient::new(),
		Url::parse(&server.url("/marketdata/v1")).expect("Mock base URL should parse."),
	)
}

#[tokio::test]
async fn get_sends_bearer_token_and_decodes_json() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/marketdata/v1/quotes")
				.query_param("symbols", "AAPL")
				.header("authorization", "Bearer A1")
				.header("accept", "application/json");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"AAPL\":{\"lastPrice\":189.5}}");
		})
		.await;
	let store = MemoryStore::with_credential(CredentialSet::new(
		"A1",
		"R1",
		OffsetDateTime::now_utc() + Duration::hours(1),
	));
	let value = client(&server, Arc::new(store))
		.get("/quotes", &[("symbols", "AAPL")])
		.await
		.expect("Authorized request should succeed.");

	mock.assert_async().await;

	assert_eq!(value, json!({ "AAPL": { "lastPrice": 189.5 } }));
}

#[tokio::test]
async fn unauthorized_answer_is_retried_once_with_the_current_credential() {
	let server = MockServer::start_async().await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/marketdata/v1/markets").header("authorization", "Bearer A1");
			then.status(401).body("{\"message\":\"token revoked\"}");
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/marketdata/v1/markets").header("authorization", "Bearer A2");
			then.status(200).header("content-type", "application/json").body("{\"open\":true}");
		})
		.await;
	let value = client(&server, Arc::new(RotatingStore::default()))
		.get("markets", &[])
		.await
		.expect("Retry with the rotated credential should succeed.");

	rejected.assert_calls_async(1).await;
	accepted.assert_calls_async(1).await;

	assert_eq!(value, json!({ "open": true }));
}

#[tokio::test]
async fn repeated_unauthorized_answer_is_returned_after_one_retry() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/marketdata/v1/markets");
			then.status(401).body("unauthorized");
		})
		.await;
	let store = MemoryStore::with_credential(CredentialSet::new(
		"A1",
		"R1",
		OffsetDateTime::now_utc() + Duration::hours(1),
	));
	let err = client(&server, Arc::new(store))
		.get("markets", &[])
		.await
		.expect_err("Persistent rejection should fail.");

	mock.assert_calls_async(2).await;

	match err {
		Error::Api { status, body } => {
			assert_eq!(status, 401);
			assert_eq!(body, "unauthorized");
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn empty_success_body_decodes_as_null() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/marketdata/v1/ping");
			then.status(204);
		})
		.await;

	let store = MemoryStore::with_credential(CredentialSet::new(
		"A1",
		"R1",
		OffsetDateTime::now_utc() + Duration::hours(1),
	));
	let value = client(&server, Arc::new(store))
		.get("ping", &[])
		.await
		.expect("Empty success should decode.");

	assert!(value.is_null());
}

#[tokio::test]
async fn missing_credential_never_reaches_the_api() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/marketdata/v1/markets");
			then.status(200);
		})
		.await;
	let err = client(&server, Arc::new(MemoryStore::default()))
		.get("markets", &[])
		.await
		.expect_err("Empty store should fail.");

	assert!(matches!(err, Error::NoCredential));
	mock.assert_calls_async(0).await;
}

#[test]
fn from_config_requires_an_api_base_url() {
	let config = CoordinatorConfig::builder()
		.client_id("app-key")
		.client_secret(ClientSecret::new("app-secret"))
		.token_endpoint(
			Url::parse("https://api.example.com/v1/oauth/token")
				.expect("Token endpoint should parse."),
		)
		.build()
		.expect("Configuration should validate.");
	let coordinator = Coordinator::new(
		Arc::new(MemoryStore::default()),
		Arc::new(MemoryLock::default()),
		Arc::new(Never),
		CoordinatorPolicy::default(),
	);
	let err = AuthorizedClient::from_config(Arc::new(coordinator), ReqwestClient::new(), &config)
		.expect_err("Missing base URL should be rejected.");

	assert!(matches!(err, ConfigError::MissingApiBaseUrl));
}
