//! Token-endpoint facade shared by the exchange flows.

pub use oauth2;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use oauth2::{
	AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, HttpRequest, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
	http::{
		Method,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{ExchangedCredential, ScopeSet, TokenSecret},
	error::ConfigError,
	exchange::ExchangeError,
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs,
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ExchangeError>> + 'a + Send>>;

/// Markers identity providers append to error descriptions; everything from the first marker on
/// is provider-internal.
const INTERNAL_DETAIL_MARKERS: [&str; 4] =
	["Trace ID:", "Correlation ID:", "Timestamp:", "\n"];

/// Maps HTTP transport failures into [`ExchangeError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> ExchangeError;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> ExchangeError {
		let status = meta_status(meta);

		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				ExchangeError::local(format!("The {grant} request could not be built.")),
			HttpClientError::Reqwest(inner) if inner.is_timeout() => ExchangeError::unavailable(
				"Request timed out while calling the token endpoint.",
				status,
			),
			HttpClientError::Reqwest(_) => ExchangeError::unavailable(
				"Network error occurred while calling the token endpoint.",
				status,
			),
			HttpClientError::Http(_) =>
				ExchangeError::local(format!("The {grant} request is not a valid HTTP request.")),
			HttpClientError::Io(_) => ExchangeError::unavailable(
				"I/O error occurred while calling the token endpoint.",
				status,
			),
			HttpClientError::Other(message) => ExchangeError::unavailable(
				format!("HTTP client error occurred while calling the token endpoint: {message}."),
				status,
			),
			_ => ExchangeError::unavailable(
				"HTTP client error occurred while calling the token endpoint.",
				status,
			),
		}
	}
}

pub(crate) trait OAuth2Facade {
	fn exchange_client_credentials<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		scope: &'a ScopeSet,
		delimiter: char,
		extra_params: Vec<(String, String)>,
	) -> FacadeFuture<'a, ExchangedCredential>;

	fn exchange_jwt_bearer<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		form: BTreeMap<String, String>,
	) -> FacadeFuture<'a, ExchangedCredential>;
}

pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredBasicClient,
	token_url: Url,
	client_id: String,
	client_secret: Option<TokenSecret>,
	auth_method: ClientAuthMethod,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&TokenSecret>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(descriptor.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidDescriptor { source })?;
		let mut oauth_client =
			BasicClient::new(ClientId::new(client_id.to_owned())).set_token_uri(token_url);

		if let Some(secret) = client_secret {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
		}
		if matches!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self {
			oauth_client,
			token_url: descriptor.token_endpoint.clone(),
			client_id: client_id.to_owned(),
			client_secret: client_secret.cloned(),
			auth_method: descriptor.preferred_client_auth_method,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	fn build_form_request(
		&self,
		mut form: BTreeMap<String, String>,
	) -> Result<HttpRequest, ConfigError> {
		let mut builder = oauth2::http::Request::builder()
			.method(Method::POST)
			.uri(self.token_url.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json");

		match (&self.client_secret, self.auth_method) {
			(Some(secret), ClientAuthMethod::ClientSecretBasic) => {
				builder = builder.header(AUTHORIZATION, basic_authorization(&self.client_id, secret));
			},
			(Some(secret), ClientAuthMethod::ClientSecretPost) => {
				form.insert("client_id".into(), self.client_id.clone());
				form.insert("client_secret".into(), secret.expose().to_owned());
			},
			(None, _) => {
				form.insert("client_id".into(), self.client_id.clone());
			},
		}

		let body = form_urlencoded::Serializer::new(String::new()).extend_pairs(form.iter()).finish();

		Ok(builder.body(body.into_bytes())?)
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_client_credentials<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		scope: &'a ScopeSet,
		delimiter: char,
		extra_params: Vec<(String, String)>,
	) -> FacadeFuture<'a, ExchangedCredential> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request = self.oauth_client.exchange_client_credentials();

			if let Some(value) = scope.join(delimiter) {
				request = request.add_extra_param("scope", value);
			}
			for (key, value) in extra_params {
				request = request.add_extra_param(key, value);
			}

			let issued_at = OffsetDateTime::now_utc();
			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					strategy,
					GrantType::ClientCredentials,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;
			let status = meta.take().and_then(|value| value.status);
			let expires_in = positive_lifetime(
				response.expires_in().and_then(|value| i64::try_from(value.as_secs()).ok()),
				status,
			)?;

			issue(response.access_token().secret().to_owned(), issued_at, expires_in, status)
		})
	}

	fn exchange_jwt_bearer<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		form: BTreeMap<String, String>,
	) -> FacadeFuture<'a, ExchangedCredential> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let grant = GrantType::JwtBearer;
			let request = self.build_form_request(form)?;
			let instrumented = self.http_client.with_metadata(meta.clone());
			let issued_at = OffsetDateTime::now_utc();
			let response = instrumented.call(request).await.map_err(|err| {
				self.error_mapper.map_transport_error(grant, meta.take().as_ref(), err)
			})?;
			let status = response.status();

			if !status.is_success() {
				obs::log_token_endpoint_rejection(grant, meta.take().as_ref());

				return Err(map_error_body(strategy, grant, status.as_u16(), response.body()));
			}

			let payload = parse_token_body(response.body(), status.as_u16())?;
			let expires_in = positive_lifetime(
				payload.expires_in.as_ref().and_then(ExpiresIn::seconds),
				Some(status.as_u16()),
			)?;

			issue(payload.access_token, issued_at, expires_in, Some(status.as_u16()))
		})
	}
}

/// Successful token-endpoint payload.
#[derive(Debug, Deserialize)]
struct TokenBody {
	access_token: String,
	#[serde(default)]
	expires_in: Option<ExpiresIn>,
}

/// Some endpoints serialize `expires_in` as a JSON string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
	Seconds(i64),
	Text(String),
}
impl ExpiresIn {
	fn seconds(&self) -> Option<i64> {
		match self {
			Self::Seconds(value) => Some(*value),
			Self::Text(value) => value.trim().parse().ok(),
		}
	}
}

/// OAuth error payload (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct ErrorBody {
	error: String,
	#[serde(default)]
	error_description: Option<String>,
}

fn parse_token_body(body: &[u8], status: u16) -> Result<TokenBody, ExchangeError> {
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
		ExchangeError::unavailable(
			format!("Token endpoint response is malformed at `{}`.", err.path()),
			Some(status),
		)
	})
}

fn positive_lifetime(seconds: Option<i64>, status: Option<u16>) -> Result<Duration, ExchangeError> {
	let seconds = seconds.ok_or_else(|| {
		ExchangeError::unavailable("Token endpoint response is missing a usable expires_in.", status)
	})?;

	if seconds <= 0 {
		return Err(ExchangeError::unavailable("The expires_in value must be positive.", status));
	}

	Ok(Duration::seconds(seconds))
}

fn issue(
	token: String,
	issued_at: OffsetDateTime,
	expires_in: Duration,
	status: Option<u16>,
) -> Result<ExchangedCredential, ExchangeError> {
	ExchangedCredential::issued(token, issued_at, expires_in)
		.ok_or_else(|| ExchangeError::unavailable("The expires_in value is out of range.", status))
}

fn map_error_body(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	status: u16,
	body: &[u8],
) -> ExchangeError {
	let mut ctx = ProviderErrorContext::new(grant).with_http_status(status);

	match serde_json::from_slice::<ErrorBody>(body) {
		Ok(parsed) => {
			ctx = ctx.with_oauth_error(parsed.error);

			if let Some(description) = parsed.error_description {
				ctx = ctx.with_error_description(sanitize_description(&description));
			}
		},
		Err(_) if !body.is_empty() => {
			ctx = ctx.with_body_preview(String::from_utf8_lossy(body));
		},
		Err(_) => {},
	}

	classify(strategy, &ctx)
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> ExchangeError
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let status = meta_status(meta.as_ref());

	match err {
		RequestTokenError::ServerResponse(response) => {
			obs::log_token_endpoint_rejection(grant, meta.as_ref());

			map_server_response(strategy, grant, &response, status)
		},
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta.as_ref(), error),
		RequestTokenError::Parse(error, _body) => ExchangeError::unavailable(
			format!("Token endpoint response is malformed at `{}`.", error.path()),
			status,
		),
		RequestTokenError::Other(message) => ExchangeError::unavailable(
			format!("Token endpoint returned an unexpected response: {message}."),
			status,
		),
	}
}

fn map_server_response(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: &BasicErrorResponse,
	status: Option<u16>,
) -> ExchangeError {
	let mut ctx =
		ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_owned());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(sanitize_description(description));
	}
	if let Some(status) = status {
		ctx = ctx.with_http_status(status);
	}

	classify(strategy, &ctx)
}

fn classify(strategy: &dyn ProviderStrategy, ctx: &ProviderErrorContext) -> ExchangeError {
	match strategy.classify_token_error(ctx) {
		ProviderErrorKind::Transient => ExchangeError::unavailable(ctx.message(), ctx.http_status),
		kind => ExchangeError::rejected(kind, ctx.message(), ctx.http_status),
	}
}

fn sanitize_description(description: &str) -> String {
	let end = INTERNAL_DETAIL_MARKERS
		.iter()
		.filter_map(|marker| description.find(marker))
		.min()
		.unwrap_or(description.len());

	description[..end].trim().to_owned()
}

fn basic_authorization(client_id: &str, secret: &TokenSecret) -> String {
	let encode = |value: &str| form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>();
	let credentials = format!("{}:{}", encode(client_id), encode(secret.expose()));

	format!("Basic {}", STANDARD.encode(credentials))
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{http::ReqwestHttpClient, id::ProviderId, provider::DefaultProviderStrategy};

	type TestFacade = BasicFacade<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	fn descriptor(method: ClientAuthMethod) -> ProviderDescriptor {
		let provider_id =
			ProviderId::new("test-provider").expect("Failed to construct provider identifier.");

		ProviderDescriptor::builder(provider_id)
			.token_endpoint(
				Url::parse("https://login.example.com/tenant/oauth2/v2.0/token")
					.expect("Failed to parse token endpoint URL."),
			)
			.support_grants([GrantType::JwtBearer, GrantType::ClientCredentials])
			.preferred_client_auth_method(method)
			.build()
			.expect("Failed to build provider descriptor.")
	}

	fn facade(method: ClientAuthMethod) -> TestFacade {
		TestFacade::from_descriptor(
			&descriptor(method),
			"client id",
			Some(&TokenSecret::new("s3cr:t")),
			Arc::new(ReqwestHttpClient::with_client(ReqwestClient::new())),
			Arc::new(ReqwestTransportErrorMapper),
		)
		.expect("Facade should build from a valid descriptor.")
	}

	fn form() -> BTreeMap<String, String> {
		BTreeMap::from([
			("grant_type".to_owned(), GrantType::JwtBearer.as_str().to_owned()),
			("assertion".to_owned(), "caller.jwt".to_owned()),
		])
	}

	#[test]
	fn basic_auth_encodes_credentials_in_the_header() {
		let request = facade(ClientAuthMethod::ClientSecretBasic)
			.build_form_request(form())
			.expect("Request should build.");
		let header = request
			.headers()
			.get(AUTHORIZATION)
			.and_then(|value| value.to_str().ok())
			.expect("Basic auth header should be present.");
		let body = String::from_utf8(request.body().clone()).expect("Form body should be UTF-8.");

		assert_eq!(header, format!("Basic {}", STANDARD.encode("client+id:s3cr%3At")));
		assert!(!body.contains("client_secret"));
		assert!(body.contains("assertion=caller.jwt"));
	}

	#[test]
	fn post_auth_moves_credentials_into_the_body() {
		let request = facade(ClientAuthMethod::ClientSecretPost)
			.build_form_request(form())
			.expect("Request should build.");
		let body = String::from_utf8(request.body().clone()).expect("Form body should be UTF-8.");

		assert!(request.headers().get(AUTHORIZATION).is_none());
		assert!(body.contains("client_id=client+id"));
		assert!(body.contains("client_secret=s3cr%3At"));
	}

	#[test]
	fn error_bodies_are_classified_and_sanitized() {
		let body = br#"{"error":"invalid_grant","error_description":"AADSTS50013: Assertion failed signature validation. Trace ID: 1234 Correlation ID: abcd"}"#;
		let err = map_error_body(&DefaultProviderStrategy, GrantType::JwtBearer, 400, body);

		assert_eq!(
			err,
			ExchangeError::rejected(
				ProviderErrorKind::InvalidGrant,
				"AADSTS50013: Assertion failed signature validation.",
				Some(400),
			),
		);
	}

	#[test]
	fn non_json_errors_fall_back_to_status() {
		let err =
			map_error_body(&DefaultProviderStrategy, GrantType::JwtBearer, 503, b"<html>busy</html>");

		assert!(matches!(err, ExchangeError::Unavailable { status: Some(503), .. }));
	}

	#[test]
	fn expires_in_accepts_numbers_and_strings() {
		let numeric = parse_token_body(br#"{"access_token":"a","expires_in":3599}"#, 200)
			.expect("Numeric expires_in should parse.");
		let textual = parse_token_body(br#"{"access_token":"a","expires_in":"3599"}"#, 200)
			.expect("Textual expires_in should parse.");

		for payload in [numeric, textual] {
			let seconds = payload.expires_in.as_ref().and_then(ExpiresIn::seconds);

			assert_eq!(positive_lifetime(seconds, Some(200)), Ok(Duration::seconds(3599)));
		}

		assert!(positive_lifetime(None, Some(200)).is_err());
		assert!(positive_lifetime(Some(0), Some(200)).is_err());
	}

	#[test]
	fn oversized_lifetimes_fail_instead_of_overflowing() {
		let expires_in = positive_lifetime(Some(400_000_000_000), Some(200))
			.expect("Large positive lifetimes pass the sign check.");
		let err = issue("token".into(), OffsetDateTime::now_utc(), expires_in, Some(200))
			.expect_err("Expiries beyond the representable range must be refused.");

		assert!(matches!(err, ExchangeError::Unavailable { status: Some(200), .. }), "{err:?}");
		assert!(
			issue("token".into(), OffsetDateTime::now_utc(), Duration::hours(1), Some(200)).is_ok()
		);
	}

	#[test]
	fn malformed_success_bodies_report_the_path() {
		let err = parse_token_body(br#"{"access_token":7}"#, 200)
			.expect_err("Numeric access tokens must be rejected.");

		assert!(err.to_string().contains("access_token"));
	}
}
