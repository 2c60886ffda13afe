//! Access-URL request handler.
//!
//! One linear pipeline per request: extract the caller credential, validate the logical
//! id, resolve and validate its locator, obtain a delegated client, call the downstream API.
//! Every local check runs before the exchange, so malformed requests never cost a
//! token-endpoint round trip. Nothing is retried.

// crates.io
use axum::http::HeaderMap;
// self
use crate::{
	_prelude::*,
	auth::BearerCredential,
	client::{AccessUrl, DelegatedClientFactory},
	correlation::CorrelationId,
	id::ResourceId,
	locator::LocatorResolver,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Serves `GET /resources/{id}/access-url`.
#[derive(Clone)]
pub struct AccessUrlHandler {
	factory: DelegatedClientFactory,
	resolver: Arc<dyn LocatorResolver>,
}
impl AccessUrlHandler {
	/// Creates a handler over the provided collaborators.
	pub fn new(factory: DelegatedClientFactory, resolver: Arc<dyn LocatorResolver>) -> Self {
		Self { factory, resolver }
	}

	/// Client factory used for downstream calls.
	pub fn factory(&self) -> &DelegatedClientFactory {
		&self.factory
	}

	/// Runs the pipeline for the raw path segment `raw_id` inside a span tagged with
	/// `correlation_id`.
	pub async fn handle(
		&self,
		headers: &HeaderMap,
		raw_id: &str,
		correlation_id: &CorrelationId,
	) -> Result<AccessUrl> {
		const KIND: FlowKind = FlowKind::AccessUrl;

		let span = FlowSpan::with_correlation(KIND, "handle", correlation_id);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.run(headers, raw_id)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn run(&self, headers: &HeaderMap, raw_id: &str) -> Result<AccessUrl> {
		let credential = BearerCredential::extract(headers)?;
		let id = ResourceId::new(raw_id)?;
		let locator = self
			.resolver
			.resolve(&id)
			.await?
			.ok_or_else(|| Error::NotFound { id: id.to_string() })?;

		locator.validate()?;

		let client = self.factory.for_credential(&credential).await?;
		let result = client.preview_url(&locator).await;

		// The downstream API no longer accepts this credential.
		if matches!(result, Err(Error::Downstream { status: 401, .. })) {
			self.factory.invalidate(&client);
		}

		result
	}
}
impl Debug for AccessUrlHandler {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessUrlHandler").field("factory", &self.factory).finish()
	}
}
