//! Refresh-token exchange against the identity provider's token endpoint.
//!
//! [`RefreshTransport`] is the seam the coordinator calls while it holds the refresh lock. The
//! stock implementation, [`HttpRefreshTransport`], performs a form-encoded `refresh_token` grant
//! through any [`RefreshHttpClient`] and classifies failures into [`RefreshError`] values.

mod classify;
mod response;

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest,
	http::{
		Method, Request,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use url::form_urlencoded::Serializer;
// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	auth::{ClientSecret, CredentialSet, TokenSecret},
	config::CoordinatorConfig,
	error::{RefreshError, TransportError},
	http::{RefreshHttpClient, ResponseMetadata, ResponseMetadataSlot, response_status},
};

/// Boxed future returned by [`RefreshTransport::refresh`].
pub type RefreshFuture<'a> =
	Pin<Box<dyn Future<Output = Result<CredentialSet, RefreshError>> + 'a + Send>>;

/// Reqwest-backed transport used by [`crate::coordinator::Coordinator::from_config`].
#[cfg(feature = "reqwest")]
pub type ReqwestRefreshTransport =
	HttpRefreshTransport<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Coarse failure classes for refresh errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
	/// The grant or the client credentials were refused; re-authorization is required.
	Authorization,
	/// Network trouble or an upstream outage; a later attempt may succeed.
	Transient,
	/// The request could not be assembled locally.
	Local,
}
impl FailureKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FailureKind::Authorization => "authorization",
			FailureKind::Transient => "transient",
			FailureKind::Local => "local",
		}
	}
}
impl Display for FailureKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Exchanges a refresh token for a new credential set.
///
/// Implementations perform exactly one exchange per call and never touch the store or the lock;
/// the coordinator owns both.
pub trait RefreshTransport: Send + Sync {
	/// Spends `refresh_token` and returns the resulting credential set.
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a>;
}

/// Maps HTTP transport failures into [`RefreshError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a refresh error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> RefreshError;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> RefreshError {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			HttpClientError::Http(inner) => RefreshError::Request(inner),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => unavailable(
				meta,
				format!("HTTP client error occurred while calling the token endpoint: {message}"),
			),
			_ => unavailable(meta, "HTTP client error occurred while calling the token endpoint"),
		}
	}
}

/// Refresh transport speaking the OAuth 2.0 `refresh_token` grant over HTTP.
///
/// Client credentials travel both as an HTTP Basic `Authorization` header and in the form body,
/// which keeps providers that only honor one of the two placements working.
pub struct HttpRefreshTransport<C, M>
where
	C: RefreshHttpClient,
	M: TransportErrorMapper<C::TransportError>,
{
	token_endpoint: Url,
	client_id: String,
	client_secret: ClientSecret,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> HttpRefreshTransport<C, M>
where
	C: RefreshHttpClient,
	M: TransportErrorMapper<C::TransportError>,
{
	/// Creates a transport for `token_endpoint` using the provided HTTP client and mapper.
	pub fn new(
		token_endpoint: Url,
		client_id: impl Into<String>,
		client_secret: ClientSecret,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			token_endpoint,
			client_id: client_id.into(),
			client_secret,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		}
	}

	/// Creates a transport from validated coordinator settings.
	pub fn from_config(
		config: &CoordinatorConfig,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self::new(
			config.token_endpoint.clone(),
			config.client_id.clone(),
			config.client_secret.clone(),
			http_client,
			error_mapper,
		)
	}

	/// Token endpoint this transport posts to.
	pub fn token_endpoint(&self) -> &Url {
		&self.token_endpoint
	}

	fn build_request(&self, refresh_token: &TokenSecret) -> Result<HttpRequest, RefreshError> {
		let secret = self.client_secret.expose();
		let body = Serializer::new(String::new())
			.append_pair("grant_type", "refresh_token")
			.append_pair("client_id", &self.client_id)
			.append_pair("client_secret", secret)
			.append_pair("refresh_token", refresh_token.expose())
			.finish();
		let basic = STANDARD.encode(format!("{}:{secret}", self.client_id));
		let request = Request::builder()
			.method(Method::POST)
			.uri(self.token_endpoint.as_str())
			.header(ACCEPT, "application/json")
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded;charset=UTF-8")
			.header(AUTHORIZATION, format!("Basic {basic}"))
			.body(body.into_bytes())?;

		Ok(request)
	}
}
#[cfg(feature = "reqwest")]
impl HttpRefreshTransport<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a reqwest-backed transport sharing `client`'s connection pool.
	pub fn reqwest(config: &CoordinatorConfig, client: ReqwestClient) -> Self {
		Self::from_config(config, ReqwestHttpClient::new(client), ReqwestTransportErrorMapper)
	}
}
impl<C, M> Debug for HttpRefreshTransport<C, M>
where
	C: RefreshHttpClient,
	M: TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpRefreshTransport")
			.field("token_endpoint", &self.token_endpoint.as_str())
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.finish()
	}
}
impl<C, M> RefreshTransport for HttpRefreshTransport<C, M>
where
	C: RefreshHttpClient,
	M: TransportErrorMapper<C::TransportError>,
{
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a> {
		Box::pin(async move {
			let meta = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(meta.clone());
			let request = self.build_request(refresh_token)?;
			let response = handle
				.call(request)
				.await
				.map_err(|e| self.error_mapper.map_transport_error(meta.take().as_ref(), e))?;
			let received_at = OffsetDateTime::now_utc();
			let status = response_status(&response);

			if !response.status().is_success() {
				return Err(classify::error_response(status, meta.take().as_ref(), response.body()));
			}

			response::parse_success(status, response.body(), refresh_token, received_at)
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> RefreshError {
	if err.is_timeout() {
		return RefreshError::Unavailable {
			message: "Request timed out while calling the token endpoint".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		};
	}

	TransportError::from_reqwest(TransportError::TOKEN_ENDPOINT, err).into()
}

#[cfg(feature = "reqwest")]
fn unavailable(meta: Option<&ResponseMetadata>, message: impl Into<String>) -> RefreshError {
	RefreshError::Unavailable {
		message: message.into(),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
}

#[cfg(feature = "reqwest")]
fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}
