//! Layered gateway configuration.
//!
//! Values are merged from built-in defaults, an optional YAML file, and `OBO_GATEWAY_*`
//! environment variables (`__` separates nested keys, so
//! `OBO_GATEWAY_IDENTITY__CLIENT_ID` sets `identity.client_id`). Extraction only checks
//! shapes; the typed accessors validate values and build the runtime types.

// std
use std::{net::SocketAddr, path::Path};
// crates.io
use figment::{
	Figment,
	providers::{Env, Format, Serialized, Yaml},
};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	cache::CachePolicy,
	client::DownstreamSettings,
	error::ConfigError,
	id::ProviderId,
	provider::{ClientAuthMethod, GrantType, ProviderDescriptor},
};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "OBO_GATEWAY_";

// Upper bound for cache and access-URL lifetimes.
const MAX_LIFETIME_SECS: i64 = 86_400;

/// Top-level gateway configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
	/// Socket address the HTTP surface binds to.
	pub listen: SocketAddr,
	/// Domain used in problem `type` URIs.
	pub problem_domain: String,
	/// Deadline for one request, in seconds.
	pub request_timeout_secs: u64,
	/// Identity-provider settings.
	pub identity: IdentityConfig,
	/// Downstream API settings.
	pub downstream: DownstreamConfig,
	/// Exchange-cache settings.
	pub cache: CacheConfig,
}
impl GatewayConfig {
	/// Loads defaults, then `path` (when given), then the environment.
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut figment = Figment::from(Serialized::defaults(Self::default()));

		if let Some(path) = path {
			figment = figment.merge(Yaml::file(path));
		}

		Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()?)
	}

	/// Parses YAML layered over the defaults, ignoring the environment.
	pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
		Ok(Figment::from(Serialized::defaults(Self::default())).merge(Yaml::string(yaml)).extract()?)
	}

	/// Request deadline.
	pub fn request_timeout(&self) -> Result<std::time::Duration, ConfigError> {
		positive_secs("request_timeout_secs", self.request_timeout_secs)
	}

	/// Validated identity-provider descriptor.
	pub fn descriptor(&self) -> Result<ProviderDescriptor, ConfigError> {
		let identity = &self.identity;
		let id = ProviderId::new(&identity.provider_id)
			.map_err(|e| ConfigError::invalid_setting("identity.provider_id", e.to_string()))?;
		let token_endpoint = Url::parse(&identity.token_endpoint)
			.map_err(|e| ConfigError::invalid_setting("identity.token_endpoint", e.to_string()))?;
		let mut builder = ProviderDescriptor::builder(id)
			.token_endpoint(token_endpoint)
			.support_grant(GrantType::JwtBearer)
			.preferred_client_auth_method(identity.client_auth_method);

		if identity.application_credentials {
			builder = builder.support_grant(GrantType::ClientCredentials);
		}

		builder.build().map_err(|e| ConfigError::invalid_setting("identity", e.to_string()))
	}

	/// Normalized downstream scopes; at least one is required.
	pub fn downstream_scope(&self) -> Result<ScopeSet, ConfigError> {
		let scope = ScopeSet::new(self.identity.downstream_scopes.iter().cloned())?;

		if scope.is_empty() {
			return Err(ConfigError::invalid_setting(
				"identity.downstream_scopes",
				"at least one scope is required",
			));
		}

		Ok(scope)
	}

	/// Gateway client id; must not be blank.
	pub fn client_id(&self) -> Result<&str, ConfigError> {
		let client_id = self.identity.client_id.trim();

		if client_id.is_empty() {
			return Err(ConfigError::invalid_setting("identity.client_id", "must not be empty"));
		}

		Ok(client_id)
	}

	/// Per-call exchange timeout.
	pub fn exchange_timeout(&self) -> Result<std::time::Duration, ConfigError> {
		positive_secs("identity.exchange_timeout_secs", self.identity.exchange_timeout_secs)
	}

	/// Downstream location and access-URL defaults.
	pub fn downstream_settings(&self) -> Result<DownstreamSettings, ConfigError> {
		let base_url = Url::parse(&self.downstream.base_url)
			.map_err(|e| ConfigError::invalid_setting("downstream.base_url", e.to_string()))?;

		DownstreamSettings::new(
			base_url,
			bounded_duration(
				"downstream.access_url_lifetime_secs",
				self.downstream.access_url_lifetime_secs,
			)?,
		)
	}

	/// Downstream call timeout.
	pub fn downstream_timeout(&self) -> Result<std::time::Duration, ConfigError> {
		positive_secs("downstream.timeout_secs", self.downstream.timeout_secs)
	}

	/// Cache lifetime rules.
	pub fn cache_policy(&self) -> Result<CachePolicy, ConfigError> {
		let safety_margin =
			bounded_duration("cache.safety_margin_secs", self.cache.safety_margin_secs)?;
		let max_ttl = bounded_duration("cache.max_ttl_secs", self.cache.max_ttl_secs)?;

		if !max_ttl.is_positive() {
			return Err(ConfigError::invalid_setting("cache.max_ttl_secs", "must be positive"));
		}

		Ok(CachePolicy { safety_margin, max_ttl })
	}
}
impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			listen: SocketAddr::from(([127, 0, 0, 1], 8080)),
			problem_domain: "obo-gateway.local".into(),
			request_timeout_secs: 30,
			identity: IdentityConfig::default(),
			downstream: DownstreamConfig::default(),
			cache: CacheConfig::default(),
		}
	}
}

/// Identity-provider settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
	/// Descriptor identifier used in logs.
	pub provider_id: String,
	/// Token endpoint URL; HTTPS unless it points at a loopback host.
	pub token_endpoint: String,
	/// Gateway client id.
	pub client_id: String,
	/// Gateway client secret.
	pub client_secret: Option<String>,
	/// How the client authenticates to the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Scopes requested for the downstream API.
	pub downstream_scopes: Vec<String>,
	/// Bound for a single token-endpoint call, in seconds.
	pub exchange_timeout_secs: u64,
	/// Enables the Client Credentials grant for the application identity.
	pub application_credentials: bool,
}
impl Default for IdentityConfig {
	fn default() -> Self {
		Self {
			provider_id: "entra".into(),
			token_endpoint: String::new(),
			client_id: String::new(),
			client_secret: None,
			client_auth_method: ClientAuthMethod::default(),
			downstream_scopes: vec!["https://graph.microsoft.com/.default".into()],
			exchange_timeout_secs: 5,
			application_credentials: true,
		}
	}
}
impl Debug for IdentityConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdentityConfig")
			.field("provider_id", &self.provider_id)
			.field("token_endpoint", &self.token_endpoint)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("client_auth_method", &self.client_auth_method)
			.field("downstream_scopes", &self.downstream_scopes)
			.field("exchange_timeout_secs", &self.exchange_timeout_secs)
			.field("application_credentials", &self.application_credentials)
			.finish()
	}
}

/// Downstream API settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
	/// Base URL item paths are appended to.
	pub base_url: String,
	/// Bound for one downstream call, in seconds.
	pub timeout_secs: u64,
	/// Lifetime assumed for access URLs without an explicit expiry, in seconds.
	pub access_url_lifetime_secs: u64,
}
impl Default for DownstreamConfig {
	fn default() -> Self {
		Self {
			base_url: "https://graph.microsoft.com/v1.0".into(),
			timeout_secs: 10,
			access_url_lifetime_secs: 600,
		}
	}
}

/// Exchange-cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
	/// Entries stop being served this many seconds before the credential expires.
	pub safety_margin_secs: u64,
	/// Upper bound for an entry's lifetime, in seconds.
	pub max_ttl_secs: u64,
}
impl Default for CacheConfig {
	fn default() -> Self {
		Self { safety_margin_secs: 300, max_ttl_secs: 3300 }
	}
}

fn positive_secs(field: &'static str, secs: u64) -> Result<std::time::Duration, ConfigError> {
	if secs == 0 {
		return Err(ConfigError::invalid_setting(field, "must be positive"));
	}

	Ok(std::time::Duration::from_secs(secs))
}

fn bounded_duration(field: &'static str, secs: u64) -> Result<Duration, ConfigError> {
	match i64::try_from(secs) {
		Ok(secs) if secs <= MAX_LIFETIME_SECS => Ok(Duration::seconds(secs)),
		_ => Err(ConfigError::invalid_setting(field, "must not exceed one day")),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const YAML: &str = r#"
listen: "0.0.0.0:9000"
problem_domain: docs.example.com
identity:
  token_endpoint: https://login.example.com/tenant/oauth2/v2.0/token
  client_id: gateway
  client_secret: s3cret
  client_auth_method: client_secret_post
  downstream_scopes: ["Files.Read.All", "Sites.Read.All"]
cache:
  safety_margin_secs: 120
"#;

	#[test]
	fn defaults_are_usable_except_for_identity() {
		let config = GatewayConfig::default();

		assert_eq!(config.request_timeout().ok(), Some(std::time::Duration::from_secs(30)));
		assert_eq!(config.cache_policy().ok(), Some(CachePolicy::default()));
		assert_eq!(
			config.downstream_settings().map(|settings| settings.access_url_lifetime).ok(),
			Some(DownstreamSettings::DEFAULT_ACCESS_URL_LIFETIME),
		);
		assert!(config.client_id().is_err());
		assert!(config.descriptor().is_err());
	}

	#[test]
	fn yaml_layers_over_defaults() {
		let config = GatewayConfig::from_yaml_str(YAML).expect("YAML should parse.");

		assert_eq!(config.listen, SocketAddr::from(([0, 0, 0, 0], 9000)));
		assert_eq!(config.problem_domain, "docs.example.com");
		assert_eq!(config.client_id().ok(), Some("gateway"));
		assert_eq!(config.identity.exchange_timeout_secs, 5);
		assert_eq!(config.cache.safety_margin_secs, 120);
		assert_eq!(config.cache.max_ttl_secs, 3300);

		let descriptor = config.descriptor().expect("Descriptor should build.");

		assert_eq!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost);
		assert!(descriptor.supports(GrantType::JwtBearer));
		assert!(descriptor.supports(GrantType::ClientCredentials));
		assert_eq!(config.downstream_scope().map(|scope| scope.len()).ok(), Some(2));
	}

	#[test]
	fn invalid_values_name_the_field() {
		let config = GatewayConfig::from_yaml_str(
			"identity:\n  token_endpoint: http://login.example.com/token\n  downstream_scopes: []\n",
		)
		.expect("YAML should parse.");

		assert!(config.descriptor().is_err(), "Remote plain-HTTP endpoints must be rejected.");
		assert!(matches!(
			config.downstream_scope(),
			Err(ConfigError::InvalidSetting { field: "identity.downstream_scopes", .. })
		));
		assert!(GatewayConfig::from_yaml_str("request_timeout_secs: soon").is_err());
	}

	#[test]
	fn lifetimes_longer_than_a_day_are_rejected() {
		let config = GatewayConfig::from_yaml_str(
			"cache:\n  safety_margin_secs: 18446744073709551615\n  max_ttl_secs: 86401\ndownstream:\n  access_url_lifetime_secs: 9223372036854775807\n",
		)
		.expect("YAML should parse.");

		assert!(matches!(
			config.cache_policy(),
			Err(ConfigError::InvalidSetting { field: "cache.safety_margin_secs", .. })
		));
		assert!(matches!(
			config.downstream_settings(),
			Err(ConfigError::InvalidSetting { field: "downstream.access_url_lifetime_secs", .. })
		));

		let capped = GatewayConfig::from_yaml_str("cache:\n  max_ttl_secs: 86401\n")
			.expect("YAML should parse.");

		assert!(matches!(
			capped.cache_policy(),
			Err(ConfigError::InvalidSetting { field: "cache.max_ttl_secs", .. })
		));
	}

	#[test]
	fn secrets_stay_out_of_debug_output() {
		let config = GatewayConfig::from_yaml_str(YAML).expect("YAML should parse.");

		assert!(!format!("{config:?}").contains("s3cret"));
	}
}
