#![cfg(feature = "reqwest")]

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
// self
use schlussel_playground::{
	config::RelayConfig,
	error::Error,
	events::RecordingEvents,
	flows::{DeviceFlowController, DeviceFlowParams, FlowError, FlowState},
	relay::ReqwestRelayGateway,
	sandbox::{OutputLine, SnippetRunner},
	url::Url,
};

const CLIENT_ID: &str = "device-client";

fn build_params(server: &MockServer) -> DeviceFlowParams {
	DeviceFlowParams::new(
		Url::parse(&server.url("/device")).expect("Mock device endpoint should parse."),
		Url::parse(&server.url("/token")).expect("Mock token endpoint should parse."),
		CLIENT_ID,
	)
	.with_scope("repo")
}

fn build_controller() -> (DeviceFlowController<ReqwestRelayGateway>, Arc<RecordingEvents>) {
	let gateway =
		ReqwestRelayGateway::new(RelayConfig::default()).expect("Default relay gateway should build.");
	let events = Arc::new(RecordingEvents::default());
	let controller = DeviceFlowController::new(gateway).with_events(events.clone());

	(controller, events)
}

async fn mock_device_endpoint(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/device")
				.body_includes("client_id=device-client")
				.body_includes("scope=repo");
			then.status(200).header("content-type", "application/json").body(
				"{\"device_code\":\"dev-1\",\"user_code\":\"WDJB-MJHT\",\"verification_uri\":\"https://idp.test/activate\",\"interval\":1,\"expires_in\":60}",
			);
		})
		.await
}

#[tokio::test]
async fn device_flow_authenticates_through_the_gateway() {
	let server = MockServer::start_async().await;
	let device = mock_device_endpoint(&server).await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.body_includes("device_code=dev-1")
				.body_includes("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Adevice_code");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"gho_live\",\"token_type\":\"bearer\",\"scope\":\"repo\"}");
		})
		.await;
	let (controller, events) = build_controller();
	let credential = controller
		.authenticate(build_params(&server))
		.await
		.expect("Device flow should authenticate against the mock provider.");

	assert_eq!(credential.expose(), "Bearer gho_live");
	assert_eq!(events.states(), [
		FlowState::Requesting,
		FlowState::AwaitingUserAction,
		FlowState::Polling,
		FlowState::Authenticated,
	]);

	let session = controller.session();

	assert_eq!(session.poll_attempts, 1);
	assert_eq!(session.prompt.map(|prompt| prompt.user_code), Some("WDJB-MJHT".into()));

	device.assert_calls_async(1).await;
	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn provider_denial_fails_the_session() {
	let server = MockServer::start_async().await;
	let _device = mock_device_endpoint(&server).await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400).header("content-type", "application/json").body(
				"{\"error\":\"access_denied\",\"error_description\":\"The user denied the request.\"}",
			);
		})
		.await;
	let (controller, _) = build_controller();
	let err = controller
		.authenticate(build_params(&server))
		.await
		.expect_err("Denied attempts must fail.");

	assert!(matches!(err, Error::Flow(FlowError::Provider { ref code, .. }) if code == "access_denied"));
	assert_eq!(controller.state(), FlowState::Failed);
	assert_eq!(controller.session().error.as_deref(), Some("The user denied the request."));

	token.assert_calls_async(1).await;
}

#[tokio::test]
async fn snippet_failures_never_touch_the_session() {
	let server = MockServer::start_async().await;
	let _device = mock_device_endpoint(&server).await;
	let _token = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"gho_live\",\"token_type\":\"bearer\"}");
		})
		.await;
	let api = server
		.mock_async(|when, then| {
			when.method(GET).path("/user").header("authorization", "Bearer gho_live");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"login\":\"octocat\"}");
		})
		.await;
	let (controller, _) = build_controller();
	let credential = controller
		.authenticate(build_params(&server))
		.await
		.expect("Device flow should authenticate against the mock provider.");
	let runner = SnippetRunner::new();
	let snippet = format!(
		"const res = await fetch('{}', {{ headers }});\nconst user = await res.json();\nconsole.log(user.login);",
		server.url("/user"),
	);
	let output = runner.run(&snippet, &credential).await;

	assert_eq!(output, [OutputLine::plain("octocat")]);

	api.assert_calls_async(1).await;

	let output = runner.run("throw new TypeError('nope')", &credential).await;

	assert_eq!(output, [OutputLine::error("TypeError: nope")]);
	assert_eq!(controller.state(), FlowState::Authenticated);
	assert_eq!(controller.credential(), Some(credential));
}
