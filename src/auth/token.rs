//! Redacted token secrets and the exchanged downstream credential.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Downstream-scoped credential minted by the identity provider.
///
/// Instances are produced by exchangers, owned by the exchange cache, and only ever handed
/// to downstream clients by value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangedCredential {
	/// Downstream access token.
	pub token: TokenSecret,
	/// Absolute expiry reported by the identity provider.
	pub expires_at: OffsetDateTime,
}
impl ExchangedCredential {
	/// Creates a credential expiring at the provided instant.
	pub fn new(token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self { token: TokenSecret::new(token), expires_at }
	}

	/// Creates a credential that expires `expires_in` after `issued_at`.
	///
	/// Returns `None` when the expiry falls outside the representable date range.
	pub fn issued(
		token: impl Into<String>,
		issued_at: OffsetDateTime,
		expires_in: Duration,
	) -> Option<Self> {
		issued_at.checked_add(expires_in).map(|expires_at| Self::new(token, expires_at))
	}
}
