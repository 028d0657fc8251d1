#![cfg(feature = "server")]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
use serde_json::{Value, json};
use tokio::net::TcpListener;
// self
use schlussel_playground::{
	config::RelayConfig,
	relay::{self, Relay, RelayError, RelayGateway, RelayHttpClient, RelayKind, TARGET_URL_FIELD},
	url::Url,
};

async fn spawn_relay() -> String {
	let gateway = RelayGateway::new(RelayConfig::default())
		.expect("Default relay gateway should build.");
	let listener =
		TcpListener::bind("127.0.0.1:0").await.expect("Loopback listener should bind.");
	let addr = listener.local_addr().expect("Listener should expose its address.");

	tokio::spawn(relay::serve(listener, Arc::new(gateway)));

	format!("http://{addr}")
}

async fn post_form(url: &str, form: &[(&str, &str)]) -> (u16, Value) {
	let response = reqwest::Client::new()
		.post(url)
		.form(form)
		.send()
		.await
		.expect("Relay should answer.");
	let status = response.status().as_u16();
	let body = response.text().await.expect("Relay body should be readable.");

	(status, serde_json::from_str(&body).expect("Relay should always answer with JSON."))
}

#[tokio::test]
async fn missing_target_is_rejected_before_any_upstream_call() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/device");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let base = spawn_relay().await;
	let (status, body) =
		post_form(&format!("{base}/device-code-relay"), &[("client_id", "abc")]).await;

	assert_eq!(status, 400);
	assert_eq!(body["error"], "invalid_request");

	let (status, _) = post_form(&format!("{base}/token-relay"), &[
		(TARGET_URL_FIELD, "not a url"),
		("client_id", "abc"),
	])
	.await;

	assert_eq!(status, 400);

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn target_is_stripped_and_oauth_errors_pass_through() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.body_includes("client_id=abc")
				.body_includes("device_code=dev-1")
				.body_excludes(TARGET_URL_FIELD);
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"authorization_pending\",\"error_description\":\"Keep waiting.\"}",
			);
		})
		.await;
	let base = spawn_relay().await;
	let target = server.url("/token");
	let (status, body) = post_form(&format!("{base}/token-relay"), &[
		(TARGET_URL_FIELD, &target),
		("client_id", "abc"),
		("device_code", "dev-1"),
	])
	.await;

	assert_eq!(status, 200);
	assert_eq!(body, json!({ "error": "authorization_pending", "error_description": "Keep waiting." }));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn non_json_upstream_maps_to_bad_gateway() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/device");
			then.status(503).header("content-type", "text/html").body("<h1>Maintenance</h1>");
		})
		.await;
	let base = spawn_relay().await;
	let target = server.url("/device");
	let (status, body) =
		post_form(&format!("{base}/device-code-relay"), &[(TARGET_URL_FIELD, &target)]).await;

	assert_eq!(status, 502);
	assert_eq!(body["error"], "bad_gateway");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn hosted_relay_client_round_trips_through_the_routes() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/device").body_includes("scope=repo");
			then.status(200).header("content-type", "application/json").body(
				"{\"device_code\":\"dev-1\",\"user_code\":\"ABCD-EFGH\",\"verification_uri\":\"https://idp.test/activate\"}",
			);
		})
		.await;
	let base = Url::parse(&spawn_relay().await).expect("Relay base should parse.");
	let client = RelayHttpClient::new(base);
	let reply = client
		.device_code(vec![
			(TARGET_URL_FIELD.into(), server.url("/device")),
			("client_id".into(), "abc".into()),
			("scope".into(), "repo".into()),
		])
		.await
		.expect("Relay client should forward the device request.");

	assert_eq!(reply["user_code"], "ABCD-EFGH");

	mock.assert_calls_async(1).await;

	let err = client
		.forward(RelayKind::Token, vec![("client_id".into(), "abc".into())])
		.await
		.expect_err("Relay should reject forms without a target.");

	assert!(matches!(
		err,
		schlussel_playground::error::Error::Relay(RelayError::Rejected { status: 400, .. })
	));
}
