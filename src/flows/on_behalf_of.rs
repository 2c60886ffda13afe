//! On-behalf-of exchange (RFC 7523 JWT bearer grant with Microsoft's OBO marker).
//!
//! The caller's bearer credential is sent as the `assertion`; the identity provider answers
//! with a credential for the downstream scopes, issued to the same subject. Credentials that
//! were already minted for the downstream audience are rejected by the provider and surface
//! as [`ExchangeError::Rejected`].

// self
use crate::{
	_prelude::*,
	auth::{BearerCredential, ExchangedCredential},
	exchange::ExchangeError,
	flows::{self, Broker},
	http::TokenHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::GrantType,
};

/// Form value identifying an on-behalf-of request.
const REQUESTED_TOKEN_USE: &str = "on_behalf_of";

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges the caller's credential for a downstream-scoped credential.
	pub async fn exchange_on_behalf_of(
		&self,
		assertion: &BearerCredential,
	) -> Result<ExchangedCredential, ExchangeError> {
		const KIND: FlowKind = FlowKind::OnBehalfOf;

		let span = FlowSpan::new(KIND, "exchange_on_behalf_of");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let grant = GrantType::JwtBearer;

				self.ensure_supported(grant)?;

				let form = self.on_behalf_of_form(assertion);
				let facade = self.facade()?;

				self.bounded(facade.exchange_jwt_bearer(self.strategy.as_ref(), form)).await
			})
			.await;

		flows::finish(KIND, result)
	}

	fn on_behalf_of_form(&self, assertion: &BearerCredential) -> BTreeMap<String, String> {
		let grant = GrantType::JwtBearer;
		let mut form = BTreeMap::new();

		form.insert("grant_type".into(), grant.as_str().into());
		form.insert("assertion".into(), assertion.expose().into());

		if let Some(scope) = self.downstream_scope.join(self.descriptor.quirks.scope_delimiter) {
			form.insert("scope".into(), scope);
		}
		if self.descriptor.quirks.on_behalf_of_marker {
			form.insert("requested_token_use".into(), REQUESTED_TOKEN_USE.into());
		}

		self.strategy.augment_token_request(grant, &mut form);

		form
	}
}
