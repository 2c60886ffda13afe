//! Gateway-level error types shared across extraction, exchange, and downstream calls.

// self
use crate::{
	_prelude::*, auth::CredentialError, exchange::ExchangeError, id::IdentifierError,
	locator::LocatorError,
};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gateway error; every variant has exactly one problem code.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Downstream answered with something the gateway could not interpret.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS) while calling the downstream API.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Caller credential is missing or malformed.
	#[error(transparent)]
	Unauthorized(#[from] CredentialError),
	/// Logical resource identifier is malformed.
	#[error(transparent)]
	InvalidId(#[from] IdentifierError),
	/// Resource locator failed validation.
	#[error(transparent)]
	Locator(#[from] LocatorError),
	/// No storage mapping exists for the logical resource.
	#[error("Resource `{id}` has no storage mapping.")]
	NotFound {
		/// Logical resource identifier that was looked up.
		id: String,
	},
	/// On-behalf-of exchange failed.
	#[error(transparent)]
	Exchange(#[from] ExchangeError),
	/// Application-identity credential could not be acquired.
	#[error("Application credential could not be acquired: {0}")]
	Application(#[source] ExchangeError),
	/// Downstream API rejected the call.
	#[error("Downstream API returned {status}: {message}.")]
	Downstream {
		/// HTTP status returned by the downstream API.
		status: u16,
		/// Downstream-supplied message, or the canonical reason phrase.
		message: String,
	},
	/// Request deadline elapsed before the handler finished.
	#[error("Request deadline of {after:?} elapsed.")]
	DeadlineExceeded {
		/// Configured deadline.
		after: std::time::Duration,
	},
}

/// Configuration and validation failures raised while wiring the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Descriptor does not enable the requested grant.
	#[error("Descriptor `{descriptor}` does not enable the {grant} grant.")]
	UnsupportedGrant {
		/// Provider identifier string.
		descriptor: String,
		/// Disabled grant label.
		grant: &'static str,
	},
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Downstream base URL cannot carry path segments.
	#[error("Downstream base URL `{url}` cannot be used as a base.")]
	InvalidDownstreamBase {
		/// Offending URL.
		url: String,
	},
	/// A configuration value is missing or malformed.
	#[error("Configuration field `{field}` is invalid: {message}.")]
	InvalidSetting {
		/// Dotted field path.
		field: &'static str,
		/// Human-readable reason.
		message: String,
	},
	/// Layered configuration could not be loaded.
	#[error("Configuration could not be loaded.")]
	Load(#[source] Box<figment::Error>),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Builds an [`ConfigError::InvalidSetting`] for the provided field.
	pub fn invalid_setting(field: &'static str, message: impl Into<String>) -> Self {
		Self::InvalidSetting { field, message: message.into() }
	}
}
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}
impl From<figment::Error> for ConfigError {
	fn from(e: figment::Error) -> Self {
		Self::Load(Box::new(e))
	}
}

/// Downstream responses that arrived but could not be interpreted.
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Downstream responded with malformed JSON.
	#[error("Downstream {operation} response is malformed.")]
	ResponseParse {
		/// Downstream operation label.
		operation: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Downstream returned a URL the gateway cannot hand back to callers.
	#[error("Downstream {operation} response carried an invalid URL.")]
	InvalidUrl {
		/// Downstream operation label.
		operation: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the downstream API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the downstream API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn exchange_error_converts_with_source_message() {
		let exchange = ExchangeError::unavailable("token endpoint offline", Some(503));
		let error: Error = exchange.clone().into();

		assert!(matches!(error, Error::Exchange(_)));
		assert_eq!(error.to_string(), exchange.to_string());
	}

	#[test]
	fn application_error_exposes_exchange_source() {
		let exchange = ExchangeError::local("descriptor disabled client_credentials");
		let error = Error::Application(exchange.clone());
		let source = StdError::source(&error)
			.expect("Application errors should expose the exchange failure as their source.");

		assert_eq!(source.to_string(), exchange.to_string());
	}
}
