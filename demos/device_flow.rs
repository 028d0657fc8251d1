//! Walks the device authorization grant against a mocked provider, printing every lifecycle
//! signal, then runs a snippet with the resulting credential.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use schlussel_playground::{
	config::{DeviceFlowConfig, RelayConfig},
	events::{ChannelEvents, PlaygroundEvent},
	flows::{DeviceFlowController, DeviceFlowParams},
	relay::ReqwestRelayGateway,
	sandbox::SnippetRunner,
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let device_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/login/device/code");
			then.status(200).header("content-type", "application/json").body(
				"{\"device_code\":\"demo-device\",\"user_code\":\"WDJB-MJHT\",\"verification_uri\":\"https://github.com/login/device\",\"interval\":1,\"expires_in\":120}",
			);
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/login/oauth/access_token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"demo-access\",\"token_type\":\"bearer\"}");
		})
		.await;
	let _api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/user");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"login\":\"octocat\",\"id\":1,\"plan\":{\"name\":\"pro\"}}");
		})
		.await;
	let (events, mut signals) = ChannelEvents::new();
	let events = Arc::new(events);
	let printer = tokio::spawn(async move {
		while let Some(signal) = signals.recv().await {
			match signal {
				PlaygroundEvent::StateChanged(state) => println!("[state] {state}"),
				PlaygroundEvent::CodeReceived(prompt) => println!(
					"[prompt] Enter {} at {} within {}s.",
					prompt.user_code,
					prompt.verification_uri,
					prompt.expires_in.as_secs()
				),
				PlaygroundEvent::OutputCleared => println!("[output] cleared"),
				PlaygroundEvent::OutputLine(line) => println!("[output] {}", line.text),
			}
		}
	});
	let gateway = ReqwestRelayGateway::new(RelayConfig::default())?;
	let controller = DeviceFlowController::new(gateway)
		.with_events(events.clone())
		.with_config(DeviceFlowConfig::default());
	let params = DeviceFlowParams::new(
		Url::parse(&server.url("/login/device/code"))?,
		Url::parse(&server.url("/login/oauth/access_token"))?,
		"demo-client",
	)
	.with_scope("repo");
	let credential = controller.authenticate(params).await?;
	let runner = SnippetRunner::new().with_events(events);
	let snippet = format!(
		"const res = await fetch('{}', {{ headers }});\n\
		 console.info(res.status, res.statusText);\n\
		 console.log(await res.json());",
		server.url("/user"),
	);

	runner.run(&snippet, &credential).await;

	device_mock.assert_async().await;
	token_mock.assert_async().await;

	drop(controller);
	drop(runner);
	printer.await?;

	Ok(())
}
