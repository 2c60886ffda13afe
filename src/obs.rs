//! Optional observability helpers for gateway flows.
//!
//! # Feature Flags
//!
//! - `tracing` (default) emits spans named `obo_gateway.flow` with `flow` and `stage` fields,
//!   and the structured log lines for problem responses and exchange failures.
//! - `metrics` increments `obo_gateway_flow_total{flow,outcome}` for every attempt, success,
//!   and failure, plus `obo_gateway_cache_total{namespace,event}` for cache activity.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// On-behalf-of exchange of a caller credential.
	OnBehalfOf,
	/// Client Credentials flow for the application identity.
	ClientCredentials,
	/// One run of the access-URL request handler.
	AccessUrl,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::OnBehalfOf => "on_behalf_of",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::AccessUrl => "access_url",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a gateway flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Exchange-cache activity labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheEvent {
	/// Fresh entry served without I/O.
	Hit,
	/// No fresh entry and no in-flight exchange.
	Miss,
	/// Caller joined an exchange another caller started.
	Join,
	/// Exchange finished and failed.
	Failure,
	/// Entry evicted explicitly.
	Invalidate,
}
impl CacheEvent {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheEvent::Hit => "hit",
			CacheEvent::Miss => "miss",
			CacheEvent::Join => "join",
			CacheEvent::Failure => "failure",
			CacheEvent::Invalidate => "invalidate",
		}
	}
}
