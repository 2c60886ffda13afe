//! HTTP surface: router, per-request deadline, and problem+json rendering.

// crates.io
use axum::{
	Json, Router,
	extract::{Path, State, rejection::PathRejection},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Response},
	routing::get,
};
use tokio::net::TcpListener;
// self
use crate::{
	_prelude::*,
	client::{AccessUrl, DelegatedClientFactory},
	config::GatewayConfig,
	correlation::{CORRELATION_ID_HEADER, CorrelationId},
	error::ConfigError,
	flows::Broker,
	handler::AccessUrlHandler,
	http::ReqwestHttpClient,
	id::IdentifierError,
	locator::LocatorResolver,
	oauth::ReqwestTransportErrorMapper,
	obs,
	problem::{self, ProblemResponse},
	provider::DefaultProviderStrategy,
};

/// Route serving access URLs.
pub const ACCESS_URL_ROUTE: &str = "/resources/{id}/access-url";

/// Shared state handed to every request.
#[derive(Debug)]
pub struct AppState {
	/// Access-URL pipeline.
	pub handler: AccessUrlHandler,
	/// Domain used in problem `type` URIs.
	pub problem_domain: Arc<str>,
	/// Deadline applied to each handler run.
	pub request_timeout: std::time::Duration,
}
impl AppState {
	/// Creates state around an existing handler.
	pub fn new(
		handler: AccessUrlHandler,
		problem_domain: impl Into<Arc<str>>,
		request_timeout: std::time::Duration,
	) -> Self {
		Self { handler, problem_domain: problem_domain.into(), request_timeout }
	}

	/// Wires the production collaborators described by `config`.
	pub fn from_config(
		config: &GatewayConfig,
		resolver: Arc<dyn LocatorResolver>,
	) -> Result<Arc<Self>> {
		let exchange_timeout = config.exchange_timeout()?;
		let mut broker = Broker::<ReqwestHttpClient, ReqwestTransportErrorMapper>::with_http_client(
			config.descriptor()?,
			Arc::new(DefaultProviderStrategy),
			config.client_id()?,
			config.downstream_scope()?,
			ReqwestHttpClient::with_timeout(exchange_timeout)?,
			ReqwestTransportErrorMapper,
		)
		.with_exchange_timeout(exchange_timeout);

		if let Some(secret) = &config.identity.client_secret {
			broker = broker.with_client_secret(secret.as_str());
		}

		let broker = Arc::new(broker);
		let http = ReqwestClient::builder()
			.timeout(config.downstream_timeout()?)
			.build()
			.map_err(ConfigError::from)?;
		let factory = DelegatedClientFactory::new(
			broker.clone(),
			broker,
			http,
			config.downstream_settings()?,
			config.cache_policy()?,
		);

		Ok(Arc::new(Self::new(
			AccessUrlHandler::new(factory, resolver),
			config.problem_domain.as_str(),
			config.request_timeout()?,
		)))
	}
}

/// Success body of the access-URL route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessUrlResponse {
	/// Time-limited URL.
	pub url: Url,
	/// When the URL stops working.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
	/// Correlation id of the request.
	pub correlation_id: CorrelationId,
}

/// Builds the gateway router.
pub fn router(state: Arc<AppState>) -> Router {
	Router::new().route(ACCESS_URL_ROUTE, get(access_url)).with_state(state)
}

/// Serves `router` on `listener` until the process stops.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
	obs::log_listening(listener.local_addr()?);

	axum::serve(listener, router).await
}

async fn access_url(
	State(state): State<Arc<AppState>>,
	id: Result<Path<String>, PathRejection>,
	headers: HeaderMap,
) -> Response {
	let correlation_id = CorrelationId::from_headers(&headers);
	let result = match id {
		Ok(Path(id)) => {
			let after = state.request_timeout;

			tokio::time::timeout(after, state.handler.handle(&headers, &id, &correlation_id))
				.await
				.unwrap_or(Err(Error::DeadlineExceeded { after }))
		},
		// Segments that do not decode to UTF-8 never reach the handler.
		Err(_) => Err(IdentifierError::Undecodable { kind: "Resource" }.into()),
	};

	respond(&state, correlation_id, result)
}

fn respond(state: &AppState, correlation_id: CorrelationId, result: Result<AccessUrl>) -> Response {
	match result {
		Ok(access) => {
			let header = correlation_id.header_value();
			let body = AccessUrlResponse {
				url: access.url,
				expires_at: access.expires_at,
				correlation_id,
			};

			(StatusCode::OK, [(CORRELATION_ID_HEADER, header)], Json(body)).into_response()
		},
		Err(e) => {
			let problem = problem::map(&e, &correlation_id);

			obs::log_problem(&problem, &e);

			ProblemResponse { problem, domain: state.problem_domain.clone() }.into_response()
		},
	}
}
