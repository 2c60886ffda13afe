//! Downstream API clients bound to exchanged credentials.
//!
//! [`DelegatedClientFactory`] is the only place credentials are exchanged: it hashes the
//! caller's credential into a [`CacheKey`], asks the delegated [`ExchangeCache`] for a
//! downstream-scoped credential, and hands back a [`DownstreamClient`] that carries it. The
//! application identity goes through a second cache so the two credential kinds never mix.

// crates.io
use axum::http::HeaderMap;
use reqwest::{
	StatusCode,
	header::{CONTENT_TYPE, HeaderValue},
};
// self
use crate::{
	_prelude::*,
	auth::{BearerCredential, CacheKey, ExchangedCredential, TokenSecret},
	cache::{CachePolicy, ExchangeCache},
	error::{ConfigError, TransientError, TransportError},
	exchange::{ApplicationCredentialSource, CredentialExchanger},
	locator::ResourceLocator,
};

/// Namespace of the cache holding caller-delegated credentials.
pub const DELEGATED_NAMESPACE: &str = "obo";
/// Namespace of the cache holding application credentials.
pub const APPLICATION_NAMESPACE: &str = "app";

/// Where a downstream client's credential came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialOrigin {
	/// Exchanged on behalf of a caller.
	Delegated,
	/// Issued to the gateway's own identity.
	Application,
}

/// Downstream API location and access-URL defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownstreamSettings {
	/// Base URL that item paths are appended to, e.g. `https://graph.microsoft.com/v1.0`.
	pub base_url: Url,
	/// Lifetime assumed for access URLs whose response carries no expiry.
	pub access_url_lifetime: Duration,
}
impl DownstreamSettings {
	/// Default access-URL lifetime.
	pub const DEFAULT_ACCESS_URL_LIFETIME: Duration = Duration::minutes(10);
	/// Longest accepted access-URL lifetime.
	pub const MAX_ACCESS_URL_LIFETIME: Duration = Duration::days(1);

	/// Validates that `base_url` can carry path segments.
	pub fn new(base_url: Url, access_url_lifetime: Duration) -> Result<Self, ConfigError> {
		if base_url.cannot_be_a_base() {
			return Err(ConfigError::InvalidDownstreamBase { url: base_url.to_string() });
		}
		if !access_url_lifetime.is_positive() {
			return Err(ConfigError::invalid_setting(
				"downstream.access_url_lifetime_secs",
				"must be positive",
			));
		}
		if access_url_lifetime > Self::MAX_ACCESS_URL_LIFETIME {
			return Err(ConfigError::invalid_setting(
				"downstream.access_url_lifetime_secs",
				"must not exceed one day",
			));
		}

		Ok(Self { base_url, access_url_lifetime })
	}
}

/// Time-limited URL granting access to one downstream item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessUrl {
	/// URL handed to the caller.
	pub url: Url,
	/// When the URL stops working.
	pub expires_at: OffsetDateTime,
}

/// `POST .../preview` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviewBody {
	get_url: String,
	#[serde(default, with = "time::serde::rfc3339::option")]
	expiration_date_time: Option<OffsetDateTime>,
}

/// Downstream error envelope, `{ "error": { "code", "message" } }`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
	error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
	#[serde(default)]
	message: Option<String>,
}

/// Client for the downstream API carrying one exchanged credential.
#[derive(Clone)]
pub struct DownstreamClient {
	http: ReqwestClient,
	settings: DownstreamSettings,
	credential: TokenSecret,
	cache_key: CacheKey,
	origin: CredentialOrigin,
}
impl DownstreamClient {
	/// Cache key of the credential this client carries.
	pub fn cache_key(&self) -> &CacheKey {
		&self.cache_key
	}

	/// Origin of the carried credential.
	pub fn origin(&self) -> CredentialOrigin {
		self.origin
	}

	/// Requests an embeddable preview URL for the item at `locator`.
	///
	/// Non-2xx answers become [`Error::Downstream`] with the downstream status and message.
	pub async fn preview_url(&self, locator: &ResourceLocator) -> Result<AccessUrl> {
		const OPERATION: &str = "preview";

		let url = self.item_url(locator, OPERATION)?;
		let requested_at = OffsetDateTime::now_utc();
		let response = self
			.http
			.post(url)
			.bearer_auth(self.credential.expose())
			.header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
			.body("{}")
			.send()
			.await
			.map_err(TransportError::from)?;
		let status = response.status();
		let body = response.bytes().await.map_err(TransportError::from)?;

		if !status.is_success() {
			return Err(Error::Downstream {
				status: status.as_u16(),
				message: downstream_message(status, &body),
			});
		}

		let mut deserializer = serde_json::Deserializer::from_slice(&body);
		let payload: PreviewBody =
			serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
				TransientError::ResponseParse {
					operation: OPERATION,
					source,
					status: Some(status.as_u16()),
				}
			})?;
		let url = Url::parse(&payload.get_url)
			.map_err(|source| TransientError::InvalidUrl { operation: OPERATION, source })?;
		let expires_at = payload
			.expiration_date_time
			.unwrap_or(requested_at + self.settings.access_url_lifetime);

		Ok(AccessUrl { url, expires_at })
	}

	fn item_url(&self, locator: &ResourceLocator, action: &str) -> Result<Url, ConfigError> {
		let mut url = self.settings.base_url.clone();

		url.path_segments_mut()
			.map_err(|_| ConfigError::InvalidDownstreamBase {
				url: self.settings.base_url.to_string(),
			})?
			.pop_if_empty()
			.extend(["drives", locator.drive_id.as_str(), "items", locator.item_id.as_str(), action]);

		Ok(url)
	}
}
impl Debug for DownstreamClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DownstreamClient")
			.field("base_url", &self.settings.base_url.as_str())
			.field("cache_key", &self.cache_key)
			.field("origin", &self.origin)
			.finish()
	}
}

fn downstream_message(status: StatusCode, body: &[u8]) -> String {
	serde_json::from_slice::<ErrorEnvelope>(body)
		.ok()
		.and_then(|envelope| envelope.error.message)
		.map(|message| message.trim().to_owned())
		.filter(|message| !message.is_empty())
		.unwrap_or_else(|| status.canonical_reason().unwrap_or("Downstream request failed").to_owned())
}

/// Produces downstream clients for callers and for the application identity.
#[derive(Clone)]
pub struct DelegatedClientFactory {
	exchanger: Arc<dyn CredentialExchanger>,
	application: Arc<dyn ApplicationCredentialSource>,
	delegated_cache: ExchangeCache,
	application_cache: ExchangeCache,
	http: ReqwestClient,
	settings: DownstreamSettings,
}
impl DelegatedClientFactory {
	/// Creates a factory with fresh caches governed by `policy`.
	pub fn new(
		exchanger: Arc<dyn CredentialExchanger>,
		application: Arc<dyn ApplicationCredentialSource>,
		http: ReqwestClient,
		settings: DownstreamSettings,
		policy: CachePolicy,
	) -> Self {
		Self::with_caches(
			exchanger,
			application,
			http,
			settings,
			ExchangeCache::new(DELEGATED_NAMESPACE, policy),
			ExchangeCache::new(APPLICATION_NAMESPACE, policy),
		)
	}

	/// Creates a factory around existing caches.
	pub fn with_caches(
		exchanger: Arc<dyn CredentialExchanger>,
		application: Arc<dyn ApplicationCredentialSource>,
		http: ReqwestClient,
		settings: DownstreamSettings,
		delegated_cache: ExchangeCache,
		application_cache: ExchangeCache,
	) -> Self {
		Self { exchanger, application, delegated_cache, application_cache, http, settings }
	}

	/// Cache of caller-delegated credentials.
	pub fn delegated_cache(&self) -> &ExchangeCache {
		&self.delegated_cache
	}

	/// Cache of application credentials.
	pub fn application_cache(&self) -> &ExchangeCache {
		&self.application_cache
	}

	/// Extracts the caller's credential from `headers` and returns a client acting as them.
	pub async fn for_caller(&self, headers: &HeaderMap) -> Result<DownstreamClient> {
		let credential = BearerCredential::extract(headers)?;

		self.for_credential(&credential).await
	}

	/// Returns a client acting as the subject of `credential`.
	pub async fn for_credential(&self, credential: &BearerCredential) -> Result<DownstreamClient> {
		let key = credential.cache_key();
		let exchanger = self.exchanger.clone();
		let assertion = credential.clone();
		let exchanged = self
			.delegated_cache
			.get_or_exchange(&key, move || async move { exchanger.exchange(&assertion).await })
			.await?;

		Ok(self.client(exchanged, key, CredentialOrigin::Delegated))
	}

	/// Returns a client acting as the gateway's own application identity.
	pub async fn for_application(&self) -> Result<DownstreamClient> {
		let key = self.application.cache_key();
		let application = self.application.clone();
		let exchanged = self
			.application_cache
			.get_or_exchange(&key, move || async move { application.acquire().await })
			.await
			.map_err(Error::Application)?;

		Ok(self.client(exchanged, key, CredentialOrigin::Application))
	}

	/// Evicts the credential `client` carries, e.g. after the downstream API rejected it.
	pub fn invalidate(&self, client: &DownstreamClient) -> bool {
		match client.origin {
			CredentialOrigin::Delegated => self.delegated_cache.invalidate(&client.cache_key),
			CredentialOrigin::Application => self.application_cache.invalidate(&client.cache_key),
		}
	}

	fn client(
		&self,
		exchanged: ExchangedCredential,
		cache_key: CacheKey,
		origin: CredentialOrigin,
	) -> DownstreamClient {
		DownstreamClient {
			http: self.http.clone(),
			settings: self.settings.clone(),
			credential: exchanged.token,
			cache_key,
			origin,
		}
	}
}
impl Debug for DelegatedClientFactory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DelegatedClientFactory")
			.field("delegated_cache", &self.delegated_cache)
			.field("application_cache", &self.application_cache)
			.field("settings", &self.settings)
			.finish()
	}
}
