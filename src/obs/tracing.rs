// std
use std::net::SocketAddr;
// self
use crate::{
	_prelude::*,
	correlation::CorrelationId,
	exchange::ExchangeError,
	http::ResponseMetadata,
	obs::FlowKind,
	problem::{ProblemDetail, Severity},
	provider::GrantType,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by gateway flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("obo_gateway.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Creates a request-scoped span that also carries the request's correlation id.
	pub fn with_correlation(
		kind: FlowKind,
		stage: &'static str,
		correlation_id: &CorrelationId,
	) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"obo_gateway.flow",
				flow = kind.as_str(),
				stage,
				correlation_id = correlation_id.as_str()
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, correlation_id);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits the log line for a problem response at the level its severity calls for.
pub fn log_problem(problem: &ProblemDetail, cause: &Error) {
	#[cfg(feature = "tracing")]
	{
		let correlation_id = problem.correlation_id.as_str();
		let code = problem.code.as_str();
		let status = problem.status;

		match problem.severity() {
			Severity::Error => tracing::error!(
				correlation_id,
				code,
				status,
				error = %cause,
				"request failed"
			),
			Severity::Warn => tracing::warn!(
				correlation_id,
				code,
				status,
				error = %cause,
				"request rejected"
			),
			Severity::Info => tracing::info!(
				correlation_id,
				code,
				status,
				error = %cause,
				"downstream refused request"
			),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (problem, cause);
	}
}

/// Logs a failed identity-provider exchange inside the current flow span.
pub fn log_exchange_failure(kind: FlowKind, error: &ExchangeError) {
	#[cfg(feature = "tracing")]
	{
		if error.is_local() {
			tracing::error!(flow = kind.as_str(), reason = error.label(), %error, "exchange not attempted");
		} else {
			tracing::warn!(flow = kind.as_str(), reason = error.label(), %error, "exchange failed");
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, error);
	}
}

/// Records the identity provider's request id for a rejected token request.
pub fn log_token_endpoint_rejection(grant: GrantType, meta: Option<&ResponseMetadata>) {
	#[cfg(feature = "tracing")]
	{
		let status = meta.and_then(|value| value.status);
		let request_id = meta.and_then(|value| value.request_id.as_deref());

		tracing::debug!(grant = grant.label(), status, request_id, "token endpoint rejected request");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (grant, meta);
	}
}

/// Logs that the HTTP surface is accepting connections.
pub fn log_listening(addr: SocketAddr) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(%addr, "gateway listening");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = addr;
	}
}
