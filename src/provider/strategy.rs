//! Provider strategy hooks that customize exchange requests and classify failures.
//!
//! Strategies see only crate-owned data (status codes, OAuth fields, body previews) so an
//! identity provider's dialect can be handled without the flows knowing about it.

// self
use crate::{_prelude::*, provider::descriptor::GrantType};

/// Strategy hook that lets providers decorate token requests and classify errors.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a failed token-endpoint response into the exchange taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Adds provider-specific form parameters (audience, resource) before dispatch.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
	/// Provider rejected the assertion (expired, wrong audience, revoked).
	InvalidGrant,
	/// The gateway's own client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the caller may delegate.
	InsufficientScope,
	/// The user must interact with the provider (MFA, consent) before delegation works.
	InteractionRequired,
	/// Failure is temporary and may succeed on retry.
	Transient,
}
impl ProviderErrorKind {
	/// Short label for logs and metrics.
	pub fn label(self) -> &'static str {
		match self {
			Self::InvalidGrant => "invalid_grant",
			Self::InvalidClient => "invalid_client",
			Self::InsufficientScope => "insufficient_scope",
			Self::InteractionRequired => "interaction_required",
			Self::Transient => "transient",
		}
	}
}
impl Display for ProviderErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.label())
	}
}

/// Failure details handed to [`ProviderStrategy::classify_token_error`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Truncated response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided grant type.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
		}
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview, truncated to a fixed number of characters.
	pub fn with_body_preview(mut self, body: impl AsRef<str>) -> Self {
		self.body_preview = Some(truncate_preview(body.as_ref()));

		self
	}

	/// Best human-readable description of the failure.
	pub fn message(&self) -> String {
		self.error_description
			.clone()
			.or_else(|| self.oauth_error.clone())
			.or_else(|| self.body_preview.clone())
			.unwrap_or_else(|| match self.http_status {
				Some(status) => format!("Token endpoint returned HTTP {status}."),
				None => "Token endpoint request failed.".into(),
			})
	}
}

/// Default strategy: structured OAuth fields first, then body hints, then the status code.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		ctx.oauth_error
			.as_deref()
			.and_then(match_error_code)
			.or_else(|| classify_text(ctx.error_description.as_deref()))
			.or_else(|| classify_text(ctx.body_preview.as_deref()))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

fn truncate_preview(body: &str) -> String {
	let mut chars = body.chars();
	let mut buf = chars.by_ref().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	if chars.next().is_some() {
		buf.push('…');
	}

	buf
}

fn match_error_code(value: &str) -> Option<ProviderErrorKind> {
	let kind = match value.to_ascii_lowercase().as_str() {
		"invalid_grant" | "access_denied" => ProviderErrorKind::InvalidGrant,
		"invalid_client" | "unauthorized_client" => ProviderErrorKind::InvalidClient,
		"invalid_scope" | "insufficient_scope" => ProviderErrorKind::InsufficientScope,
		"interaction_required" | "consent_required" | "login_required" =>
			ProviderErrorKind::InteractionRequired,
		"temporarily_unavailable" | "server_error" => ProviderErrorKind::Transient,
		_ => return None,
	};

	Some(kind)
}

fn classify_text(text: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = text?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("interaction_required") || text.contains("consent_required") =>
			Some(ProviderErrorKind::InteractionRequired),
		text if text.contains("invalid_grant") => Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(ProviderErrorKind::InvalidClient),
		text if text.contains("insufficient_scope") || text.contains("invalid_scope") =>
			Some(ProviderErrorKind::InsufficientScope),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn classify(ctx: ProviderErrorContext) -> ProviderErrorKind {
		DefaultProviderStrategy.classify_token_error(&ctx)
	}

	#[test]
	fn oauth_error_codes_take_precedence() {
		let ctx = ProviderErrorContext::new(GrantType::JwtBearer)
			.with_http_status(500)
			.with_oauth_error("invalid_grant");

		assert_eq!(classify(ctx), ProviderErrorKind::InvalidGrant);
		assert_eq!(
			classify(
				ProviderErrorContext::new(GrantType::JwtBearer).with_oauth_error("consent_required")
			),
			ProviderErrorKind::InteractionRequired,
		);
	}

	#[test]
	fn descriptions_and_bodies_are_scanned_for_hints() {
		let ctx = ProviderErrorContext::new(GrantType::JwtBearer)
			.with_oauth_error("unknown_error")
			.with_error_description("AADSTS65001: interaction_required for delegated consent");

		assert_eq!(classify(ctx), ProviderErrorKind::InteractionRequired);
		assert_eq!(
			classify(
				ProviderErrorContext::new(GrantType::ClientCredentials)
					.with_body_preview("please retry later")
			),
			ProviderErrorKind::Transient,
		);
	}

	#[test]
	fn status_codes_are_the_fallback() {
		let by_status =
			|status| classify(ProviderErrorContext::new(GrantType::JwtBearer).with_http_status(status));

		assert_eq!(by_status(400), ProviderErrorKind::InvalidGrant);
		assert_eq!(by_status(401), ProviderErrorKind::InvalidClient);
		assert_eq!(by_status(403), ProviderErrorKind::InsufficientScope);
		assert_eq!(by_status(503), ProviderErrorKind::Transient);
	}

	#[test]
	fn body_previews_are_truncated() {
		let ctx = ProviderErrorContext::new(GrantType::JwtBearer).with_body_preview("x".repeat(300));
		let preview = ctx.body_preview.expect("Preview should be recorded.");

		assert_eq!(preview.chars().count(), ProviderErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}

	#[test]
	fn message_prefers_the_description() {
		let ctx = ProviderErrorContext::new(GrantType::JwtBearer)
			.with_oauth_error("invalid_grant")
			.with_error_description("Assertion expired.");

		assert_eq!(ctx.message(), "Assertion expired.");
		assert_eq!(
			ProviderErrorContext::new(GrantType::JwtBearer).with_http_status(502).message(),
			"Token endpoint returned HTTP 502.",
		);
	}
}
