//! Credential-exchange contracts shared by the identity-provider flows and the cache.
//!
//! [`CredentialExchanger`] trades a caller's bearer credential for a downstream-scoped one;
//! [`ApplicationCredentialSource`] mints credentials for the gateway's own identity. Both
//! report failures as [`ExchangeError`], which carries only a message, a classification, and
//! the provider's HTTP status. Provider-internal fields (trace ids, raw bodies, claims) never
//! leave the flow that observed them.

// self
use crate::{
	_prelude::*,
	auth::{BearerCredential, CacheKey, ExchangedCredential},
	error::ConfigError,
	provider::ProviderErrorKind,
};

/// Boxed future returned by exchangers.
pub type ExchangeFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ExchangedCredential, ExchangeError>> + 'a + Send>>;

/// Failure reported by an exchange attempt.
///
/// The type is cloneable so every waiter sharing one in-flight exchange observes the same
/// outcome.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ExchangeError {
	/// The identity provider refused the exchange.
	#[error("Identity provider rejected the exchange ({kind}): {message}")]
	Rejected {
		/// Provider error classification.
		kind: ProviderErrorKind,
		/// Sanitized provider message.
		message: String,
		/// HTTP status returned by the token endpoint.
		status: Option<u16>,
	},
	/// The identity provider could not be reached or answered unintelligibly.
	#[error("Identity provider is unavailable: {message}")]
	Unavailable {
		/// Failure description.
		message: String,
		/// HTTP status returned by the token endpoint, when one arrived.
		status: Option<u16>,
	},
	/// The exchange could not be attempted because of local wiring.
	#[error("Exchange could not be attempted: {message}")]
	Local {
		/// Failure description.
		message: String,
	},
}
impl ExchangeError {
	/// Builds a [`ExchangeError::Rejected`] value.
	pub fn rejected(kind: ProviderErrorKind, message: impl Into<String>, status: Option<u16>) -> Self {
		Self::Rejected { kind, message: message.into(), status }
	}

	/// Builds a [`ExchangeError::Unavailable`] value.
	pub fn unavailable(message: impl Into<String>, status: Option<u16>) -> Self {
		Self::Unavailable { message: message.into(), status }
	}

	/// Builds a [`ExchangeError::Local`] value.
	pub fn local(message: impl Into<String>) -> Self {
		Self::Local { message: message.into() }
	}

	/// HTTP status reported by the token endpoint, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. } | Self::Unavailable { status, .. } => *status,
			Self::Local { .. } => None,
		}
	}

	/// Returns true when the failure originated inside the gateway.
	pub fn is_local(&self) -> bool {
		matches!(self, Self::Local { .. })
	}

	/// Short label for logs and metrics.
	pub fn label(&self) -> &'static str {
		match self {
			Self::Rejected { kind, .. } => kind.label(),
			Self::Unavailable { .. } => "unavailable",
			Self::Local { .. } => "local",
		}
	}
}
impl From<ConfigError> for ExchangeError {
	fn from(e: ConfigError) -> Self {
		Self::local(e.to_string())
	}
}

/// Trades a caller credential for a downstream-scoped credential.
///
/// Implementations perform exactly one token-endpoint call per invocation, bounded by their
/// own timeout, and never retry.
pub trait CredentialExchanger
where
	Self: Send + Sync,
{
	/// Exchanges `assertion` on behalf of its subject.
	fn exchange<'a>(&'a self, assertion: &'a BearerCredential) -> ExchangeFuture<'a>;
}

/// Acquires credentials for the gateway's own application identity.
pub trait ApplicationCredentialSource
where
	Self: Send + Sync,
{
	/// Requests a fresh application credential.
	fn acquire(&self) -> ExchangeFuture<'_>;

	/// Cache key under which the application credential is stored.
	fn cache_key(&self) -> CacheKey;
}
