//! Caller credential extraction and cache-key fingerprinting.
//!
//! [`BearerCredential::extract`] is the gateway's only entry point for inbound credentials:
//! the `Authorization` header must be present exactly once, carry the case-sensitive
//! `Bearer ` scheme, and hold a non-empty token without embedded whitespace. Anything else is
//! rejected as a whole; partial credentials are never returned.

// crates.io
use axum::http::{HeaderMap, header::AUTHORIZATION};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Scheme prefix required on the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Reasons an inbound `Authorization` header was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialError {
	/// No `Authorization` header was supplied.
	#[error("Authorization header is missing.")]
	Missing,
	/// More than one `Authorization` header was supplied.
	#[error("Authorization header must be supplied exactly once.")]
	MultipleValues,
	/// Header value contains bytes outside visible ASCII.
	#[error("Authorization header is not valid ASCII.")]
	NotAscii,
	/// Header does not use the `Bearer` scheme.
	#[error("Authorization header must use the Bearer scheme.")]
	UnsupportedScheme,
	/// Bearer scheme present but no token followed.
	#[error("Bearer token is empty.")]
	EmptyToken,
	/// Token contains whitespace.
	#[error("Bearer token contains whitespace.")]
	MalformedToken,
}

/// Caller-supplied bearer token; lives for one request and is never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerCredential(TokenSecret);
impl BearerCredential {
	/// Pulls the credential out of the request headers.
	pub fn extract(headers: &HeaderMap) -> Result<Self, CredentialError> {
		let mut values = headers.get_all(AUTHORIZATION).iter();
		let value = values.next().ok_or(CredentialError::Missing)?;

		if values.next().is_some() {
			return Err(CredentialError::MultipleValues);
		}

		Self::parse(value.to_str().map_err(|_| CredentialError::NotAscii)?)
	}

	/// Parses a raw `Authorization` header value.
	pub fn parse(value: &str) -> Result<Self, CredentialError> {
		let token = value.strip_prefix(BEARER_PREFIX).ok_or(CredentialError::UnsupportedScheme)?;

		if token.is_empty() || token.chars().all(char::is_whitespace) {
			return Err(CredentialError::EmptyToken);
		}
		if token.chars().any(char::is_whitespace) {
			return Err(CredentialError::MalformedToken);
		}

		Ok(Self(TokenSecret::new(token)))
	}

	/// Returns the raw token. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		self.0.expose()
	}

	/// Derives the cache key for this credential.
	pub fn cache_key(&self) -> CacheKey {
		CacheKey::delegated(self)
	}
}
impl Debug for BearerCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("BearerCredential").field(&"<redacted>").finish()
	}
}

/// One-way fingerprint used to index exchanged credentials.
///
/// Delegated keys hash the caller's token; application keys hash the requested scopes.
/// The `namespace` prefix keeps both key spaces disjoint even if the two caches were ever
/// pointed at the same map.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);
impl CacheKey {
	const APPLICATION: &'static str = "app";
	const DELEGATED: &'static str = "obo";

	/// Key for a caller credential.
	pub fn delegated(credential: &BearerCredential) -> Self {
		Self::digest(Self::DELEGATED, credential.expose())
	}

	/// Key for the service's own identity at the provided scope fingerprint.
	pub fn application(scope_fingerprint: &str) -> Self {
		Self::digest(Self::APPLICATION, scope_fingerprint)
	}

	/// Returns the namespace prefix (`obo` or `app`).
	pub fn namespace(&self) -> &str {
		self.0.split_once(':').map(|(namespace, _)| namespace).unwrap_or_default()
	}

	/// Returns the encoded key.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	fn digest(namespace: &str, material: &str) -> Self {
		let digest = Sha256::digest(material.as_bytes());

		Self(format!("{namespace}:{}", URL_SAFE_NO_PAD.encode(digest)))
	}
}
impl Debug for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		// Short prefix is enough to correlate log lines.
		let short = self.0.get(..16).unwrap_or(&self.0);

		write!(f, "CacheKey({short}…)")
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use axum::http::HeaderValue;
	// self
	use super::*;

	fn headers(values: &[&'static str]) -> HeaderMap {
		let mut map = HeaderMap::new();

		for value in values {
			map.append(AUTHORIZATION, HeaderValue::from_static(value));
		}

		map
	}

	#[test]
	fn extraction_rejects_every_malformed_header() {
		let cases: [(&[&'static str], CredentialError); 8] = [
			(&[], CredentialError::Missing),
			(&[""], CredentialError::UnsupportedScheme),
			(&["Bearer"], CredentialError::UnsupportedScheme),
			(&["bearer abc"], CredentialError::UnsupportedScheme),
			(&["Basic abc"], CredentialError::UnsupportedScheme),
			(&["Bearer "], CredentialError::EmptyToken),
			(&["Bearer abc def"], CredentialError::MalformedToken),
			(&["Bearer abc", "Bearer def"], CredentialError::MultipleValues),
		];

		for (values, expected) in cases {
			assert_eq!(
				BearerCredential::extract(&headers(values)),
				Err(expected),
				"Header values {values:?} should be rejected.",
			);
		}
	}

	#[test]
	fn extraction_accepts_bearer_tokens() {
		let credential = BearerCredential::extract(&headers(&["Bearer eyJ0eXAi.payload.sig"]))
			.expect("Well-formed bearer header should be accepted.");

		assert_eq!(credential.expose(), "eyJ0eXAi.payload.sig");
		assert_eq!(format!("{credential:?}"), "BearerCredential(\"<redacted>\")");
	}

	#[test]
	fn non_ascii_headers_are_rejected() {
		let mut map = HeaderMap::new();

		map.insert(
			AUTHORIZATION,
			HeaderValue::from_bytes("Bearer tök".as_bytes()).expect("Opaque bytes are allowed."),
		);

		assert_eq!(BearerCredential::extract(&map), Err(CredentialError::NotAscii));
	}

	#[test]
	fn cache_keys_hash_tokens_and_separate_namespaces() {
		let credential =
			BearerCredential::parse("Bearer caller-token").expect("Credential should parse.");
		let key = credential.cache_key();

		assert_eq!(key, CacheKey::delegated(&credential));
		assert_eq!(key.namespace(), "obo");
		assert!(!key.as_str().contains("caller-token"));
		assert_ne!(key, CacheKey::application("caller-token"));
		assert_eq!(CacheKey::application("scope").namespace(), "app");
	}
}
