mod common;

// crates.io
use httpmock::prelude::*;
// self
use obo_gateway::{
	client::{CredentialOrigin, DelegatedClientFactory},
	error::Error,
	exchange::{ApplicationCredentialSource, ExchangeError},
	provider::{ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorKind},
};
use common::*;

#[tokio::test]
async fn client_credentials_requests_downstream_scope() {
	let idp = MockServer::start_async().await;
	let mock = idp
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("authorization", BASIC_AUTHORIZATION)
				.form_urlencoded_tuple("grant_type", "client_credentials")
				.form_urlencoded_tuple("scope", DOWNSTREAM_SCOPE);
			then.status(200)
				.header("content-type", "application/json")
				.json_body(token_body("app-token", 3600));
		})
		.await;
	let exchanged = broker(&idp, ClientAuthMethod::ClientSecretBasic)
		.acquire()
		.await
		.expect("Client credentials grant should succeed.");

	mock.assert_calls_async(1).await;

	assert_eq!(exchanged.token.expose(), "app-token");
}

#[tokio::test]
async fn invalid_client_is_rejected() {
	let idp = MockServer::start_async().await;
	let _mock = idp
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(401).header("content-type", "application/json").json_body(
				serde_json::json!({
					"error": "invalid_client",
					"error_description": "AADSTS7000215: Invalid client secret provided.",
				}),
			);
		})
		.await;
	let err = broker(&idp, ClientAuthMethod::ClientSecretBasic)
		.client_credentials()
		.await
		.expect_err("Wrong client secrets must fail.");

	assert!(
		matches!(err, ExchangeError::Rejected { kind: ProviderErrorKind::InvalidClient, .. }),
		"{err:?}",
	);
}

#[tokio::test]
async fn disabled_grant_fails_locally_without_calling_the_provider() {
	let idp = MockServer::start_async().await;
	let mock = idp
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(token_body("app-token", 3600));
		})
		.await;
	let descriptor = ProviderDescriptor::builder(
		"obo-only".parse().expect("Provider identifier should be valid."),
	)
	.token_endpoint(idp.url("/token").parse().expect("Mock token endpoint should parse."))
	.support_grant(GrantType::JwtBearer)
	.build()
	.expect("Descriptor should build.");
	let err =
		broker_with(descriptor).acquire().await.expect_err("Disabled grants must not be attempted.");

	mock.assert_calls_async(0).await;

	assert!(err.is_local(), "{err:?}");
}

#[tokio::test]
async fn application_clients_are_cached_apart_from_delegated_ones() {
	let idp = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let mock = idp
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.form_urlencoded_tuple("grant_type", "client_credentials");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(token_body("app-token", 3600));
		})
		.await;
	let factory = factory(&idp, &graph);
	let first = factory.for_application().await.expect("Application client should be created.");
	let second =
		factory.for_application().await.expect("Cached application client should be reused.");

	mock.assert_calls_async(1).await;

	assert_eq!(first.origin(), CredentialOrigin::Application);
	assert_eq!(first.cache_key(), second.cache_key());
	assert_eq!(first.cache_key().namespace(), "app");
	assert_eq!(factory.application_cache().len(), 1);
	assert!(factory.delegated_cache().is_empty());
}

#[tokio::test]
async fn application_failures_surface_as_application_errors() {
	let idp = MockServer::start_async().await;
	let graph = MockServer::start_async().await;
	let _mock = idp
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(500).body("boom");
		})
		.await;
	let factory: DelegatedClientFactory = factory(&idp, &graph);
	let err = factory.for_application().await.expect_err("Provider outage should fail.");

	assert!(matches!(err, Error::Application(ExchangeError::Unavailable { .. })), "{err:?}");
}
