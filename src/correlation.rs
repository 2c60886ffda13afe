//! Per-request correlation identifiers.
//!
//! Every response, success or failure, carries the id in the `x-correlation-id` header and
//! in its body; the same value appears on the request's log lines.

// crates.io
use axum::http::{HeaderMap, HeaderValue};
use rand::Rng;
// self
use crate::_prelude::*;

/// Header echoed on every response.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
/// Fallback inbound header set by many proxies.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_LEN: usize = 128;

/// Opaque identifier tying a response to its log lines.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);
impl CorrelationId {
	/// Generates a random 128-bit id rendered as 32 lowercase hex characters.
	pub fn generate() -> Self {
		let mut bytes = [0_u8; 16];

		rand::rng().fill(&mut bytes);

		Self(bytes.iter().map(|byte| format!("{byte:02x}")).collect())
	}

	/// Reuses a caller-supplied id when it is well formed, otherwise generates one.
	pub fn from_headers(headers: &HeaderMap) -> Self {
		[CORRELATION_ID_HEADER, REQUEST_ID_HEADER]
			.into_iter()
			.filter_map(|name| headers.get(name))
			.find_map(|value| value.to_str().ok().and_then(Self::parse))
			.unwrap_or_else(Self::generate)
	}

	/// Accepts 1 to 128 characters drawn from ASCII alphanumerics and `-_.:`.
	pub fn parse(value: &str) -> Option<Self> {
		let value = value.trim();
		let well_formed = !value.is_empty()
			&& value.len() <= MAX_LEN
			&& value.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | ':'));

		well_formed.then(|| Self(value.to_owned()))
	}

	/// Returns the id.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Renders the id as a header value.
	pub fn header_value(&self) -> HeaderValue {
		// Only visible ASCII is ever stored.
		HeaderValue::from_str(&self.0).unwrap_or_else(|_| HeaderValue::from_static("invalid"))
	}
}
impl Debug for CorrelationId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CorrelationId({})", self.0)
	}
}
impl Display for CorrelationId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
