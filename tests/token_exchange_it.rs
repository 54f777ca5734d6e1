// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use conduit::{
	_preludet::*,
	auth::Reauthenticate,
	error::AuthExchangeError,
	request::Params,
	service::{Service, ServiceConfig},
};

const ISSUED: &str = concat!(
	r#"{"access_token":"cc-token","refresh_token":"r-1","#,
	r#""token_type":"bearer","expires_in":3600}"#,
);

fn service(server: &MockServer, credential: Value) -> Service {
	let config = ServiceConfig::from_value(json!({
		"scheme": "http",
		"host": server.address().to_string(),
		"interceptors": [credential],
		"operations": { "me": { "path": "/me", "accept": "application/json" } }
	}))
	.expect("Service configuration should parse.");

	Service::from_config(config).expect("Service should build.")
}

#[tokio::test]
async fn client_credentials_token_is_exchanged_once_and_reused() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").header_exists("authorization");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"cc-token","token_type":"bearer","expires_in":3600}"#,
			);
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/me").header("authorization", "Bearer cc-token");
			then.status(200).header("content-type", "application/json").body(r#"{"id":7}"#);
		})
		.await;
	let service = service(
		&server,
		json!({
			"kind": "oauth2",
			"client_id": "cli",
			"client_secret": "s3cr3t",
			"access_token_url": server.url("/token"),
			"grant_type": "client_credentials"
		}),
	);
	let first = service.send("me", &Params::new()).await?;
	let second = service.send("me", &Params::new()).await?;

	assert_eq!(first.status(), 200);
	assert_eq!(first.get("id"), Some(json!(7)));
	assert_eq!(second.status(), 200);
	assert_eq!(service.token_cache().len(), 1);

	token.assert_calls_async(1).await;
	api.assert_calls_async(2).await;

	Ok(())
}

fn oauth2(server: &MockServer) -> Value {
	json!({
		"kind": "oauth2",
		"client_id": "cli",
		"client_secret": "s3cr3t",
		"access_token_url": server.url("/token"),
		"grant_type": "client_credentials"
	})
}

#[tokio::test]
async fn expired_tokens_are_refreshed_with_the_refresh_grant() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let issue = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("grant_type=client_credentials");
			then.status(200).header("content-type", "application/json").body(ISSUED);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=r-1");
			then.status(200).header("content-type", "application/json").body(
				r#"{"access_token":"refreshed","token_type":"bearer","expires_in":3600}"#,
			);
		})
		.await;
	let before = server
		.mock_async(|when, then| {
			when.method(GET).path("/me").header("authorization", "Bearer cc-token");
			then.status(204);
		})
		.await;
	let after = server
		.mock_async(|when, then| {
			when.method(GET).path("/me").header("authorization", "Bearer refreshed");
			then.status(204);
		})
		.await;
	let service = service(&server, oauth2(&server));

	assert_eq!(service.send("me", &Params::new()).await?.status(), 204);

	service.reauthenticators()[0].invalidate();

	assert_eq!(service.send("me", &Params::new()).await?.status(), 204);

	let cached = service.token_cache().get(service.reauthenticators()[0].cache_key());

	assert_eq!(
		cached.and_then(|t| t.refresh_token).map(|r| r.expose().to_owned()).as_deref(),
		Some("r-1"),
		"A refresh without rotation should keep the old refresh secret."
	);

	issue.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;
	before.assert_calls_async(1).await;
	after.assert_calls_async(1).await;

	Ok(())
}

#[tokio::test]
async fn rejected_refresh_falls_back_to_the_configured_grant() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let issue = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("grant_type=client_credentials");
			then.status(200).header("content-type", "application/json").body(ISSUED);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("grant_type=refresh_token");
			then.status(400)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_grant"}"#);
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/me").header("authorization", "Bearer cc-token");
			then.status(204);
		})
		.await;
	let service = service(&server, oauth2(&server));

	service.send("me", &Params::new()).await?;
	service.reauthenticators()[0].invalidate();

	assert_eq!(service.send("me", &Params::new()).await?.status(), 204);

	issue.assert_calls_async(2).await;
	refresh.assert_calls_async(1).await;
	api.assert_calls_async(2).await;

	Ok(())
}

#[tokio::test]
async fn saml_assertion_is_traded_for_a_bearer_token() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/saml/token")
				.header("content-type", "application/x-www-form-urlencoded");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"saml-token","expires_in":600}"#);
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/me").header("authorization", "Bearer saml-token");
			then.status(204);
		})
		.await;
	let service = service(
		&server,
		json!({
			"kind": "saml",
			"access_token_url": server.url("/saml/token"),
			"assertion": "<saml:Assertion/>",
			"client_id": "cli"
		}),
	);
	let response = service.send("me", &Params::new()).await.expect("Send should succeed.");

	assert_eq!(response.status(), 204);

	token.assert_async().await;
	api.assert_async().await;
}

#[tokio::test]
async fn rejected_grants_surface_the_oauth_error_code() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/saml/token");
			then.status(400)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_grant","error_description":"assertion expired"}"#);
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/me");
			then.status(200);
		})
		.await;
	let service = service(
		&server,
		json!({
			"kind": "saml",
			"access_token_url": server.url("/saml/token"),
			"assertion": "<saml:Assertion/>"
		}),
	);
	let err = service.send("me", &Params::new()).await.expect_err("Exchange should be rejected.");

	assert!(matches!(
		err,
		Error::AuthExchange(AuthExchangeError::Rejected { ref error, .. })
			if error == "invalid_grant"
	));

	token.assert_async().await;
	api.assert_calls_async(0).await;
}
