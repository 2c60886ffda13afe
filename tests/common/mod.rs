#![allow(dead_code)]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
// self
use obo_gateway::{
	auth::ScopeSet,
	cache::CachePolicy,
	client::{DelegatedClientFactory, DownstreamSettings},
	flows::ReqwestBroker,
	handler::AccessUrlHandler,
	http::ReqwestHttpClient,
	id::{ProviderId, ResourceId},
	locator::{MemoryLocatorResolver, ResourceLocator},
	oauth::ReqwestTransportErrorMapper,
	provider::{ClientAuthMethod, DefaultProviderStrategy, GrantType, ProviderDescriptor},
	server::AppState,
	url::Url,
};

pub const CLIENT_ID: &str = "gateway-client";
pub const CLIENT_SECRET: &str = "gateway-secret";
/// `base64("gateway-client:gateway-secret")`.
pub const BASIC_AUTHORIZATION: &str = "Basic Z2F0ZXdheS1jbGllbnQ6Z2F0ZXdheS1zZWNyZXQ=";
pub const DOWNSTREAM_SCOPE: &str = "https://graph.microsoft.com/.default";
pub const DRIVE_ID: &str = "b!drive-42";
pub const ITEM_ID: &str = "01ABCDEFGHIJKLMNOPQR";
pub const RESOURCE_ID: &str = "doc-42";
pub const PROBLEM_DOMAIN: &str = "docs.example.com";

pub fn descriptor(idp: &MockServer, method: ClientAuthMethod) -> ProviderDescriptor {
	ProviderDescriptor::builder(
		ProviderId::new("mock-entra").expect("Provider identifier should be valid."),
	)
	.token_endpoint(Url::parse(&idp.url("/token")).expect("Mock token endpoint should parse."))
	.support_grants([GrantType::JwtBearer, GrantType::ClientCredentials])
	.preferred_client_auth_method(method)
	.build()
	.expect("Mock descriptor should build.")
}

pub fn scope() -> ScopeSet {
	ScopeSet::new([DOWNSTREAM_SCOPE]).expect("Downstream scope should be valid.")
}

/// Builds a reqwest client that accepts the self-signed certificates served by `httpmock`.
pub fn test_reqwest_client() -> reqwest::Client {
	reqwest::Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.build()
		.expect("Failed to build insecure Reqwest client for tests.")
}

pub fn broker_with(descriptor: ProviderDescriptor) -> ReqwestBroker {
	ReqwestBroker::with_http_client(
		descriptor,
		Arc::new(DefaultProviderStrategy),
		CLIENT_ID,
		scope(),
		ReqwestHttpClient::with_client(test_reqwest_client()),
		ReqwestTransportErrorMapper,
	)
	.with_client_secret(CLIENT_SECRET)
}

pub fn broker(idp: &MockServer, method: ClientAuthMethod) -> ReqwestBroker {
	broker_with(descriptor(idp, method))
}

pub fn token_body(access_token: &str, expires_in: i64) -> serde_json::Value {
	serde_json::json!({
		"access_token": access_token,
		"token_type": "Bearer",
		"expires_in": expires_in,
	})
}

pub fn settings(graph: &MockServer) -> DownstreamSettings {
	DownstreamSettings::new(
		Url::parse(&graph.url("/v1.0")).expect("Mock downstream base should parse."),
		DownstreamSettings::DEFAULT_ACCESS_URL_LIFETIME,
	)
	.expect("Downstream settings should be valid.")
}

pub fn factory(idp: &MockServer, graph: &MockServer) -> DelegatedClientFactory {
	let broker = Arc::new(broker(idp, ClientAuthMethod::ClientSecretBasic));

	DelegatedClientFactory::new(
		broker.clone(),
		broker,
		test_reqwest_client(),
		settings(graph),
		CachePolicy::default(),
	)
}

pub fn preview_path() -> String {
	format!("/v1.0/drives/{DRIVE_ID}/items/{ITEM_ID}/preview")
}

pub fn resolver_with(drive_id: &str, item_id: &str) -> MemoryLocatorResolver {
	let resolver = MemoryLocatorResolver::default();

	resolver.insert(
		ResourceId::new(RESOURCE_ID).expect("Resource identifier should be valid."),
		ResourceLocator::new(drive_id, item_id),
	);

	resolver
}

pub fn state(
	idp: &MockServer,
	graph: &MockServer,
	resolver: MemoryLocatorResolver,
	request_timeout: std::time::Duration,
) -> Arc<AppState> {
	Arc::new(AppState::new(
		AccessUrlHandler::new(factory(idp, graph), Arc::new(resolver)),
		PROBLEM_DOMAIN,
		request_timeout,
	))
}
