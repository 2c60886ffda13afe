//! Client Credentials flow for the gateway's own application identity.

// self
use crate::{
	_prelude::*,
	auth::ExchangedCredential,
	exchange::ExchangeError,
	flows::{self, Broker},
	http::TokenHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::GrantType,
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Performs the `client_credentials` grant for the downstream scopes.
	///
	/// No caching happens here; the client factory keeps application credentials in their own
	/// exchange cache.
	pub async fn client_credentials(&self) -> Result<ExchangedCredential, ExchangeError> {
		const KIND: FlowKind = FlowKind::ClientCredentials;

		let span = FlowSpan::new(KIND, "client_credentials");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let grant = GrantType::ClientCredentials;

				self.ensure_supported(grant)?;

				let mut form = BTreeMap::new();

				self.strategy.augment_token_request(grant, &mut form);

				let extra_params = form
					.into_iter()
					.filter(|(key, _)| key != "grant_type" && key != "scope")
					.collect::<Vec<_>>();
				let facade = self.facade()?;

				self.bounded(facade.exchange_client_credentials(
					self.strategy.as_ref(),
					&self.downstream_scope,
					self.descriptor.quirks.scope_delimiter,
					extra_params,
				))
				.await
			})
			.await;

		flows::finish(KIND, result)
	}
}
