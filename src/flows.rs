//! Identity-provider flows powered by the broker facade.
//!
//! [`Broker`] owns everything a token-endpoint call needs (transport, descriptor, strategy,
//! client credentials, downstream scopes) and implements both exchange contracts:
//! [`CredentialExchanger`] through the on-behalf-of flow and [`ApplicationCredentialSource`]
//! through the Client Credentials flow. Each call is a single request bounded by
//! [`Broker::exchange_timeout`]; retries are left to callers.

mod client_credentials;
mod on_behalf_of;

// self
use crate::{
	_prelude::*,
	auth::{BearerCredential, CacheKey, ExchangedCredential, ScopeSet, TokenSecret},
	error::ConfigError,
	exchange::{ApplicationCredentialSource, CredentialExchanger, ExchangeError, ExchangeFuture},
	http::{ReqwestHttpClient, TokenHttpClient},
	oauth::{BasicFacade, ReqwestTransportErrorMapper, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome},
	provider::{GrantType, ProviderDescriptor, ProviderStrategy},
};

/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Coordinates token exchanges against a single identity-provider descriptor.
#[derive(Clone)]
pub struct Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors.
	pub transport_mapper: Arc<M>,
	/// Provider descriptor that defines the token endpoint and quirks.
	pub descriptor: ProviderDescriptor,
	/// Strategy responsible for provider-specific request adjustments and error mapping.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// OAuth 2.0 client identifier of the gateway.
	pub client_id: String,
	/// Client secret used for confidential client authentication.
	pub client_secret: Option<TokenSecret>,
	/// Scopes requested for the downstream API.
	pub downstream_scope: ScopeSet,
	/// Upper bound for a single token-endpoint call.
	pub exchange_timeout: std::time::Duration,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Default bound for a single token-endpoint call.
	pub const DEFAULT_EXCHANGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		downstream_scope: ScopeSet,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			descriptor,
			strategy,
			client_id: client_id.into(),
			client_secret: None,
			downstream_scope,
			exchange_timeout: Self::DEFAULT_EXCHANGE_TIMEOUT,
		}
	}

	/// Sets or replaces the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Overrides the per-call exchange timeout.
	pub fn with_exchange_timeout(mut self, timeout: std::time::Duration) -> Self {
		self.exchange_timeout = timeout;

		self
	}

	fn facade(&self) -> Result<BasicFacade<C, M>, ConfigError> {
		BasicFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_ref(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
	}

	fn ensure_supported(&self, grant: GrantType) -> Result<(), ExchangeError> {
		if self.descriptor.supports(grant) {
			Ok(())
		} else {
			Err(ConfigError::UnsupportedGrant {
				descriptor: self.descriptor.id.to_string(),
				grant: grant.label(),
			}
			.into())
		}
	}

	async fn bounded<F>(&self, exchange: F) -> Result<ExchangedCredential, ExchangeError>
	where
		F: Future<Output = Result<ExchangedCredential, ExchangeError>>,
	{
		tokio::time::timeout(self.exchange_timeout, exchange).await.unwrap_or_else(|_| {
			Err(ExchangeError::unavailable(
				format!(
					"Token endpoint did not answer within {} ms.",
					self.exchange_timeout.as_millis()
				),
				None,
			))
		})
	}
}
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a broker with its own reqwest transport.
	///
	/// The transport's request timeout matches [`Broker::DEFAULT_EXCHANGE_TIMEOUT`]; use
	/// [`Broker::with_client_secret`] to attach the confidential client secret.
	pub fn new(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		downstream_scope: ScopeSet,
	) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(
			descriptor,
			strategy,
			client_id,
			downstream_scope,
			ReqwestHttpClient::with_timeout(Self::DEFAULT_EXCHANGE_TIMEOUT)?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("downstream_scope", &self.downstream_scope)
			.field("exchange_timeout", &self.exchange_timeout)
			.finish()
	}
}
impl<C, M> CredentialExchanger for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange<'a>(&'a self, assertion: &'a BearerCredential) -> ExchangeFuture<'a> {
		Box::pin(self.exchange_on_behalf_of(assertion))
	}
}
impl<C, M> ApplicationCredentialSource for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn acquire(&self) -> ExchangeFuture<'_> {
		Box::pin(self.client_credentials())
	}

	fn cache_key(&self) -> CacheKey {
		CacheKey::application(&self.downstream_scope.fingerprint())
	}
}

/// Records the flow outcome and logs failures.
fn finish(
	kind: FlowKind,
	result: Result<ExchangedCredential, ExchangeError>,
) -> Result<ExchangedCredential, ExchangeError> {
	match &result {
		Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
		Err(err) => {
			obs::log_exchange_failure(kind, err);
			obs::record_flow_outcome(kind, FlowOutcome::Failure);
		},
	}

	result
}
