#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use token_steward::{
	auth::{ClientSecret, CredentialSet, TokenSecret},
	config::CoordinatorConfig,
	coordinator::{Coordinator, TokenSource},
	error::{Error, RefreshError, TransportError},
	lock::MemoryLock,
	reqwest::Client as ReqwestClient,
	store::MemoryStore,
	transport::{FailureKind, RefreshTransport, ReqwestRefreshTransport},
};

const CLIENT_ID: &str = "app-key";
const CLIENT_SECRET: &str = "app-secret";
// base64("app-key:app-secret")
const BASIC: &str = "Basic YXBwLWtleTphcHAtc2VjcmV0";
const FORM: &str = "application/x-www-form-urlencoded;charset=UTF-8";

fn config(server: &MockServer) -> CoordinatorConfig {
	CoordinatorConfig::builder()
		.client_id(CLIENT_ID)
		.client_secret(ClientSecret::new(CLIENT_SECRET))
		.token_endpoint(
			Url::parse(&server.url("/v1/oauth/token")).expect("Mock token endpoint should parse."),
		)
		.build()
		.expect("Loopback configuration should validate.")
}

fn transport(server: &MockServer) -> ReqwestRefreshTransport {
	ReqwestRefreshTransport::reqwest(&config(server), ReqwestClient::new())
}

#[tokio::test]
async fn refresh_posts_basic_auth_and_form_body() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/v1/oauth/token")
				.header("authorization", BASIC)
				.header("content-type", FORM)
				.header("accept", "application/json")
				.body(
					"grant_type=refresh_token&client_id=app-key&client_secret=app-secret&refresh_token=R1",
				);
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"A2\",\"refresh_token\":\"R2\",\"expires_in\":1800,\"token_type\":\"Bearer\",\"scope\":\"api\"}",
			);
		})
		.await;
	let before = OffsetDateTime::now_utc();
	let credential = transport(&server)
		.refresh(&TokenSecret::new("R1"))
		.await
		.expect("Refresh exchange should succeed.");

	mock.assert_async().await;

	let expires_at = credential.expires_at.expect("Refreshed credential should carry an expiry.");

	assert_eq!(credential.access_token.expose(), "A2");
	assert_eq!(credential.refresh_token.expose(), "R2");
	assert_eq!(credential.token_type.as_deref(), Some("Bearer"));
	assert!(expires_at >= before + Duration::seconds(1800));
}

#[tokio::test]
async fn non_rotating_provider_keeps_the_refresh_token() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"A2\",\"expires_in\":1800}");
		})
		.await;

	let credential = transport(&server)
		.refresh(&TokenSecret::new("R1"))
		.await
		.expect("Refresh exchange should succeed.");

	assert_eq!(credential.refresh_token.expose(), "R1");
}

#[tokio::test]
async fn invalid_grant_is_an_authorization_failure() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/oauth/token");
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"invalid_grant\",\"error_description\":\"refresh token expired\"}",
			);
		})
		.await;

	let err = transport(&server)
		.refresh(&TokenSecret::new("R1"))
		.await
		.expect_err("Rejected grant should fail.");

	assert_eq!(err.kind(), FailureKind::Authorization);
	assert_eq!(err.status(), Some(400));
	assert!(err.to_string().contains("refresh token expired"));
}

#[tokio::test]
async fn outage_is_transient_and_keeps_retry_after() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/oauth/token");
			then.status(503).header("retry-after", "7").body("upstream maintenance");
		})
		.await;

	let err = transport(&server)
		.refresh(&TokenSecret::new("R1"))
		.await
		.expect_err("Outage should fail.");

	match err {
		RefreshError::Unavailable { status, retry_after, message } => {
			assert_eq!(status, Some(503));
			assert_eq!(retry_after, Some(Duration::seconds(7)));
			assert_eq!(message, "upstream maintenance");
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn malformed_success_body_is_reported_with_its_path() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"A2\",\"expires_in\":\"soon\"}");
		})
		.await;

	let err = transport(&server)
		.refresh(&TokenSecret::new("R1"))
		.await
		.expect_err("Malformed body should fail.");

	match err {
		RefreshError::MalformedResponse { source, status } => {
			assert_eq!(status, 200);
			assert_eq!(source.path().to_string(), "expires_in");
		},
		other => panic!("Unexpected error: {other:?}."),
	}
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_failure() {
	let server = MockServer::start_async().await;
	let config = config(&server);

	drop(server);

	let err = ReqwestRefreshTransport::reqwest(&config, ReqwestClient::new())
		.refresh(&TokenSecret::new("R1"))
		.await
		.expect_err("Closed port should fail.");

	assert!(matches!(err, RefreshError::Transport(TransportError::Network { .. })));
	assert_eq!(err.kind(), FailureKind::Transient);
}

#[tokio::test]
async fn coordinator_from_config_rotates_the_stored_credential() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/oauth/token").header("authorization", BASIC);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"A2\",\"refresh_token\":\"R2\",\"expires_in\":1800}");
		})
		.await;
	let store = MemoryStore::with_credential(CredentialSet::new(
		"A1",
		"R1",
		OffsetDateTime::now_utc() - Duration::seconds(10),
	));
	let coordinator = Coordinator::from_config(
		&config(&server),
		Arc::new(store.clone()),
		Arc::new(MemoryLock::default()),
		ReqwestClient::new(),
	);
	let resolved = coordinator
		.resolve(coordinator.request().with_buffer(Duration::seconds(60)))
		.await
		.expect("Refresh through the coordinator should succeed.");

	mock.assert_async().await;

	assert_eq!(resolved.source, TokenSource::Refreshed);
	assert_eq!(resolved.credential.access_token.expose(), "A2");
	assert_eq!(
		store.snapshot().map(|c| c.refresh_token.expose().to_owned()).as_deref(),
		Some("R2")
	);

	let again = coordinator.token().await.expect("Fresh credential should be served.");

	assert_eq!(again.access_token.expose(), "A2");
	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn coordinator_surfaces_rejection_without_retrying() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/v1/oauth/token");
			then.status(401).body("{\"error\":\"invalid_client\"}");
		})
		.await;
	let coordinator = Coordinator::from_config(
		&config(&server),
		Arc::new(MemoryStore::with_credential(CredentialSet::new(
			"A1",
			"R1",
			OffsetDateTime::now_utc() - Duration::seconds(10),
		))),
		Arc::new(MemoryLock::default()),
		ReqwestClient::new(),
	);
	let err = coordinator.token().await.expect_err("Rejected client should fail.");

	assert!(matches!(err, Error::RefreshFailed(RefreshError::Rejected { status: 401, .. })));
	assert!(!err.is_retryable());
	mock.assert_calls_async(1).await;
}
