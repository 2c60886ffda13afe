// self
use crate::obs::{CacheEvent, FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"obo_gateway_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records exchange-cache activity for the named cache instance.
pub fn record_cache_event(namespace: &'static str, event: CacheEvent) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"obo_gateway_cache_total",
			"namespace" => namespace,
			"event" => event.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (namespace, event);
	}
}
