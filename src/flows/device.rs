//! RFC 8628 device authorization driven through a [`Relay`].
//!
//! One attempt is strictly sequential: request a device code, then sleep for the poll interval
//! and poll the token endpoint until the provider settles the attempt or the code expires. The
//! next poll is only scheduled after the previous reply has been handled, so a session never
//! has two token requests in flight.
//!
//! Every attempt carries a generation number. Starting a new attempt (or cancelling) bumps the
//! generation; an older loop notices the mismatch after each suspension point and returns
//! [`FlowError::Superseded`] without touching the newer session.

mod response;
mod session;

pub use session::*;

// crates.io
use oauth2::{ClientId, ClientSecret, DeviceCode};
use tokio::{
	task::JoinHandle,
	time::{self, Instant},
};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	catalog::DevicePlayground,
	config::DeviceFlowConfig,
	events::{NoopEvents, PlaygroundEvents},
	flows::FlowError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	relay::{Relay, TARGET_URL_FIELD},
};
use response::{DeviceGrant, PollOutcome};

/// `grant_type` sent on every token poll.
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Endpoints and client identity for one device authorization attempt.
#[derive(Clone, Debug)]
pub struct DeviceFlowParams {
	/// Device authorization endpoint.
	pub device_endpoint: Url,
	/// Token endpoint.
	pub token_endpoint: Url,
	/// OAuth client identifier.
	pub client_id: ClientId,
	/// Client secret for providers that demand one from public clients.
	pub client_secret: Option<ClientSecret>,
	/// Requested scope string.
	pub scope: Option<String>,
}
impl DeviceFlowParams {
	/// Creates parameters for a public client without scope.
	pub fn new(device_endpoint: Url, token_endpoint: Url, client_id: impl Into<String>) -> Self {
		Self {
			device_endpoint,
			token_endpoint,
			client_id: ClientId::new(client_id.into()),
			client_secret: None,
			scope: None,
		}
	}

	/// Attaches a client secret, sent on token polls.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(ClientSecret::new(secret.into()));

		self
	}

	/// Sets the requested scope.
	pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
		self.scope = Some(scope.into());

		self
	}

	/// Relay form for the device authorization request.
	pub fn device_form(&self) -> Vec<(String, String)> {
		let mut form = vec![
			(TARGET_URL_FIELD.into(), self.device_endpoint.to_string()),
			("client_id".into(), self.client_id.to_string()),
		];

		if let Some(scope) = self.scope.as_deref().filter(|scope| !scope.is_empty()) {
			form.push(("scope".into(), scope.into()));
		}

		form
	}

	/// Relay form for one token poll.
	pub fn token_form(&self, device_code: &DeviceCode) -> Vec<(String, String)> {
		let mut form = vec![
			(TARGET_URL_FIELD.into(), self.token_endpoint.to_string()),
			("client_id".into(), self.client_id.to_string()),
			("device_code".into(), device_code.secret().to_owned()),
			("grant_type".into(), DEVICE_CODE_GRANT_TYPE.into()),
		];

		if let Some(secret) = &self.client_secret {
			form.push(("client_secret".into(), secret.secret().to_owned()));
		}

		form
	}
}
impl From<&DevicePlayground> for DeviceFlowParams {
	fn from(playground: &DevicePlayground) -> Self {
		Self {
			device_endpoint: playground.device_endpoint.clone(),
			token_endpoint: playground.token_endpoint.clone(),
			client_id: ClientId::new(playground.client.id.clone()),
			client_secret: playground.client.secret.clone().map(ClientSecret::new),
			scope: playground.scope.clone(),
		}
	}
}

struct SessionSlot {
	generation: u64,
	session: DeviceFlowSession,
}

/// Drives device authorization attempts and owns the single active session.
///
/// Cloning is cheap; clones share the session slot, so a clone can observe or cancel an attempt
/// started elsewhere.
pub struct DeviceFlowController<R>
where
	R: ?Sized + Relay,
{
	relay: Arc<R>,
	events: Arc<dyn PlaygroundEvents>,
	config: DeviceFlowConfig,
	slot: Arc<Mutex<SessionSlot>>,
}
impl<R> DeviceFlowController<R>
where
	R: ?Sized + Relay,
{
	/// Creates an idle controller talking to the provider through `relay`.
	pub fn new(relay: impl Into<Arc<R>>) -> Self {
		Self {
			relay: relay.into(),
			events: Arc::new(NoopEvents),
			config: DeviceFlowConfig::default(),
			slot: Arc::new(Mutex::new(SessionSlot {
				generation: 0,
				session: DeviceFlowSession::idle(),
			})),
		}
	}

	/// Routes lifecycle signals to `events`.
	pub fn with_events(mut self, events: Arc<dyn PlaygroundEvents>) -> Self {
		self.events = events;

		self
	}

	/// Overrides the polling defaults.
	pub fn with_config(mut self, config: DeviceFlowConfig) -> Self {
		self.config = config;

		self
	}

	/// Polling defaults in effect.
	pub fn config(&self) -> &DeviceFlowConfig {
		&self.config
	}

	/// Snapshot of the active session.
	pub fn session(&self) -> DeviceFlowSession {
		self.slot.lock().session.clone()
	}

	/// Current lifecycle state.
	pub fn state(&self) -> FlowState {
		self.slot.lock().session.state
	}

	/// Credential of the active session, once authenticated.
	pub fn credential(&self) -> Option<Credential> {
		self.slot.lock().session.credential.clone()
	}

	/// Runs a fresh attempt to completion, superseding any attempt still in progress.
	///
	/// Resolves with the credential, or with the error that moved the session to
	/// [`FlowState::Failed`]. A superseded attempt resolves with [`FlowError::Superseded`] and
	/// leaves the session alone.
	pub async fn authenticate(&self, params: DeviceFlowParams) -> Result<Credential> {
		let generation = self.begin();

		self.run(generation, params).await
	}

	/// Starts a fresh attempt on the Tokio runtime and returns its handle.
	///
	/// The session is already [`FlowState::Requesting`] when this returns.
	pub fn start(&self, params: DeviceFlowParams) -> JoinHandle<Result<Credential>> {
		let generation = self.begin();
		let this = self.clone();

		tokio::spawn(async move { this.run(generation, params).await })
	}

	/// Discards the active session; its loop stops at the next suspension point.
	pub fn cancel(&self) {
		let previous = {
			let mut slot = self.slot.lock();

			slot.generation += 1;

			std::mem::replace(&mut slot.session, DeviceFlowSession::idle()).state
		};

		if previous != FlowState::Idle {
			self.emit_transition(previous, FlowState::Idle);
		}
	}

	fn begin(&self) -> u64 {
		let (generation, previous) = {
			let mut slot = self.slot.lock();

			slot.generation += 1;

			let previous =
				std::mem::replace(&mut slot.session, DeviceFlowSession::requesting()).state;

			(slot.generation, previous)
		};

		self.emit_transition(previous, FlowState::Requesting);

		generation
	}

	async fn run(&self, generation: u64, params: DeviceFlowParams) -> Result<Credential> {
		let span = FlowSpan::new(FlowKind::DeviceAuthorization, "authenticate");
		let result = span.instrument(self.drive(generation, &params)).await;

		match &result {
			Ok(_) | Err(Error::Flow(FlowError::Superseded)) => {},
			Err(e) => {
				let message = e.to_string();

				obs::record_warning(FlowKind::DeviceAuthorization, &message);

				// Losing this race means a newer attempt owns the slot; nothing to record.
				let _ = self.update(generation, |session| {
					session.state = FlowState::Failed;
					session.error = Some(message);
					session.device_code = None;
				});
			},
		}

		result
	}

	async fn drive(&self, generation: u64, params: &DeviceFlowParams) -> Result<Credential> {
		obs::record_flow_outcome(FlowKind::DeviceAuthorization, FlowOutcome::Attempt);

		let reply = self.relay.device_code(params.device_form()).await;

		self.ensure_current(generation)?;

		let grant = reply
			.and_then(|json| DeviceGrant::from_json(&json, &self.config).map_err(Error::from));
		let grant = match grant {
			Ok(grant) => grant,
			Err(e) => {
				obs::record_flow_outcome(FlowKind::DeviceAuthorization, FlowOutcome::Failure);

				return Err(e);
			},
		};
		let prompt = UserCodePrompt {
			user_code: grant.user_code,
			verification_uri: grant.verification_uri,
			verification_uri_complete: grant.verification_uri_complete,
			expires_in: grant.expires_in,
		};
		let expires_at = Instant::now() + grant.expires_in;

		self.update(generation, |session| {
			session.state = FlowState::AwaitingUserAction;
			session.prompt = Some(prompt.clone());
			session.poll_interval = grant.interval;
			session.expires_at = Some(expires_at);
			session.device_code = Some(grant.device_code.clone());
		})?;
		obs::record_flow_outcome(FlowKind::DeviceAuthorization, FlowOutcome::Success);
		self.events.on_code_received(&prompt);

		self.poll(generation, params, &grant.device_code, grant.interval).await
	}

	async fn poll(
		&self,
		generation: u64,
		params: &DeviceFlowParams,
		device_code: &DeviceCode,
		mut interval: Duration,
	) -> Result<Credential> {
		let mut lenient_streak = 0_u32;

		loop {
			time::sleep(interval).await;

			if self.is_expired(generation)? {
				obs::record_flow_outcome(FlowKind::TokenPoll, FlowOutcome::Expired);

				return Err(FlowError::Expired.into());
			}

			self.update(generation, |session| {
				session.state = FlowState::Polling;
				session.poll_attempts += 1;
			})?;
			obs::record_flow_outcome(FlowKind::TokenPoll, FlowOutcome::Attempt);

			let reply = self.relay.token(params.token_form(device_code)).await;

			self.ensure_current(generation)?;

			let outcome = match reply {
				Ok(json) => PollOutcome::classify(&json),
				Err(e) => {
					obs::record_warning(FlowKind::TokenPoll, &e);

					PollOutcome::Unrecognized
				},
			};

			match outcome {
				PollOutcome::Pending => {
					lenient_streak = 0;

					obs::record_flow_outcome(FlowKind::TokenPoll, FlowOutcome::Pending);
				},
				PollOutcome::SlowDown => {
					lenient_streak = 0;
					interval += self.config.slow_down_increment;

					self.update(generation, |session| session.poll_interval = interval)?;
					obs::record_flow_outcome(FlowKind::TokenPoll, FlowOutcome::SlowDown);
				},
				PollOutcome::Denied { code, description } => {
					obs::record_flow_outcome(FlowKind::TokenPoll, FlowOutcome::Failure);

					return Err(FlowError::Provider { code, description }.into());
				},
				PollOutcome::Authorized(access_token) => {
					let credential = Credential::bearer(access_token);

					self.update(generation, |session| {
						session.state = FlowState::Authenticated;
						session.credential = Some(credential.clone());
						session.device_code = None;
					})?;
					obs::record_flow_outcome(FlowKind::TokenPoll, FlowOutcome::Success);

					return Ok(credential);
				},
				PollOutcome::Unrecognized => {
					lenient_streak += 1;

					obs::record_flow_outcome(FlowKind::TokenPoll, FlowOutcome::Retry);

					if lenient_streak == self.config.lenient_retry_warn_threshold {
						obs::record_warning(
							FlowKind::TokenPoll,
							format!("{lenient_streak} consecutive unusable poll replies; still polling"),
						);
					}
				},
			}
		}
	}

	fn ensure_current(&self, generation: u64) -> Result<(), FlowError> {
		if self.slot.lock().generation == generation { Ok(()) } else { Err(FlowError::Superseded) }
	}

	fn is_expired(&self, generation: u64) -> Result<bool, FlowError> {
		let slot = self.slot.lock();

		if slot.generation != generation {
			return Err(FlowError::Superseded);
		}

		Ok(slot.session.is_expired_at(Instant::now()))
	}

	// Applies `apply` only while `generation` still owns the slot; signals fire after unlocking.
	fn update<F>(&self, generation: u64, apply: F) -> Result<(), FlowError>
	where
		F: FnOnce(&mut DeviceFlowSession),
	{
		let (from, to) = {
			let mut slot = self.slot.lock();

			if slot.generation != generation {
				return Err(FlowError::Superseded);
			}

			let from = slot.session.state;

			apply(&mut slot.session);

			(from, slot.session.state)
		};

		if from != to {
			self.emit_transition(from, to);
		}

		Ok(())
	}

	fn emit_transition(&self, from: FlowState, to: FlowState) {
		obs::record_transition(FlowKind::DeviceAuthorization, from, to);
		self.events.on_state_changed(to);
	}
}
impl<R> Clone for DeviceFlowController<R>
where
	R: ?Sized + Relay,
{
	fn clone(&self) -> Self {
		Self {
			relay: self.relay.clone(),
			events: self.events.clone(),
			config: self.config,
			slot: self.slot.clone(),
		}
	}
}
impl<R> Debug for DeviceFlowController<R>
where
	R: ?Sized + Relay,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let slot = self.slot.lock();

		f.debug_struct("DeviceFlowController")
			.field("config", &self.config)
			.field("generation", &slot.generation)
			.field("state", &slot.session.state)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		events::{PlaygroundEvent, RecordingEvents},
		relay::RelayKind,
	};

	fn params() -> DeviceFlowParams {
		DeviceFlowParams::new(
			Url::parse("https://idp.test/device").expect("Device URL should parse."),
			Url::parse("https://idp.test/token").expect("Token URL should parse."),
			"client-1",
		)
		.with_scope("repo")
	}

	fn device_reply(device_code: &str, interval: u64, expires_in: u64) -> JsonValue {
		json!({
			"device_code": device_code,
			"user_code": "WDJB-MJHT",
			"verification_uri": "https://idp.test/activate",
			"interval": interval,
			"expires_in": expires_in,
		})
	}

	fn build_controller(
		relay: ScriptedRelay,
	) -> (DeviceFlowController<ScriptedRelay>, Arc<ScriptedRelay>, Arc<RecordingEvents>) {
		let relay = Arc::new(relay);
		let events = Arc::new(RecordingEvents::default());
		let controller = DeviceFlowController::new(relay.clone()).with_events(events.clone());

		(controller, relay, events)
	}

	fn gaps(calls: &[RelayCall], start: Instant) -> Vec<u64> {
		let mut previous = start;

		calls
			.iter()
			.map(|call| {
				let gap = call.at.duration_since(previous).as_secs();

				previous = call.at;

				gap
			})
			.collect()
	}

	#[tokio::test(start_paused = true)]
	async fn happy_path_waits_one_interval_then_authenticates() {
		let (controller, relay, events) = build_controller(
			ScriptedRelay::new()
				.device_reply(device_reply("dev-1", 3, 900))
				.token_reply(json!({ "error": "authorization_pending" }))
				.token_reply(json!({ "access_token": "tok", "token_type": "bearer" })),
		);
		let start = Instant::now();
		let credential =
			controller.authenticate(params()).await.expect("Attempt should authenticate.");

		assert_eq!(credential.expose(), "Bearer tok");
		assert_eq!(controller.credential(), Some(credential));
		assert_eq!(controller.state(), FlowState::Authenticated);
		assert_eq!(events.states(), [
			FlowState::Requesting,
			FlowState::AwaitingUserAction,
			FlowState::Polling,
			FlowState::Authenticated,
		]);
		assert!(events.events().iter().any(|event| matches!(
			event,
			PlaygroundEvent::CodeReceived(prompt) if prompt.user_code == "WDJB-MJHT"
		)));

		let device = relay.calls(RelayKind::DeviceCode);

		assert_eq!(device[0].field(TARGET_URL_FIELD), Some("https://idp.test/device"));
		assert_eq!(device[0].field("client_id"), Some("client-1"));
		assert_eq!(device[0].field("scope"), Some("repo"));

		let tokens = relay.calls(RelayKind::Token);

		assert_eq!(gaps(&tokens, start), [3, 3]);
		assert_eq!(tokens[0].field(TARGET_URL_FIELD), Some("https://idp.test/token"));
		assert_eq!(tokens[0].field("device_code"), Some("dev-1"));
		assert_eq!(tokens[0].field("grant_type"), Some(DEVICE_CODE_GRANT_TYPE));
		assert_eq!(tokens[0].field("client_secret"), None);
	}

	#[tokio::test(start_paused = true)]
	async fn pending_twice_then_token_takes_three_polls_at_the_original_interval() {
		let (controller, relay, _) = build_controller(
			ScriptedRelay::new()
				.device_reply(device_reply("dev-1", 3, 900))
				.token_reply(json!({ "error": "authorization_pending" }))
				.token_reply(json!({ "error": "authorization_pending" }))
				.token_reply(json!({ "access_token": "tok" })),
		);
		let start = Instant::now();
		let credential =
			controller.authenticate(params()).await.expect("Attempt should authenticate.");
		let session = controller.session();

		assert_eq!(credential.expose(), "Bearer tok");
		assert_eq!(gaps(&relay.calls(RelayKind::Token), start), [3, 3, 3]);
		assert_eq!(session.state, FlowState::Authenticated);
		assert_eq!(session.poll_attempts, 3);
		assert_eq!(session.poll_interval, Duration::from_secs(3));
	}

	#[tokio::test(start_paused = true)]
	async fn first_poll_waits_a_full_interval_and_the_last_lands_before_the_deadline() {
		let (controller, relay, _) =
			build_controller(ScriptedRelay::new().device_reply(device_reply("dev-1", 3, 10)));
		let start = Instant::now();
		let err = controller.authenticate(params()).await.expect_err("Attempt should expire.");
		let tokens = relay.calls(RelayKind::Token);

		assert!(matches!(err, Error::Flow(FlowError::Expired)));
		// Polls at t=3, t=6 and t=9; t=12 is past the deadline.
		assert_eq!(tokens[0].at.duration_since(start), Duration::from_secs(3));
		assert_eq!(gaps(&tokens, start), [3, 3, 3]);
		assert_eq!(controller.session().poll_attempts, 3);
		assert_eq!(start.elapsed(), Duration::from_secs(12));
	}

	#[tokio::test(start_paused = true)]
	async fn slow_down_increase_is_sticky() {
		let (controller, relay, _) = build_controller(
			ScriptedRelay::new()
				.device_reply(device_reply("dev-1", 1, 900))
				.token_reply(json!({ "error": "slow_down" }))
				.token_reply(json!({ "error": "authorization_pending" }))
				.token_reply(json!({ "error": "authorization_pending" }))
				.token_reply(json!({ "access_token": "tok" })),
		);
		let start = Instant::now();

		controller.authenticate(params()).await.expect("Attempt should authenticate.");

		assert_eq!(gaps(&relay.calls(RelayKind::Token), start), [1, 6, 6, 6]);
		assert_eq!(controller.session().poll_interval, Duration::from_secs(6));
		assert_eq!(controller.session().poll_attempts, 4);
	}

	#[tokio::test(start_paused = true)]
	async fn expiry_stops_polling_without_a_network_call() {
		let (controller, relay, _) =
			build_controller(ScriptedRelay::new().device_reply(device_reply("dev-1", 5, 12)));
		let err = controller.authenticate(params()).await.expect_err("Attempt should expire.");

		assert!(matches!(err, Error::Flow(FlowError::Expired)));
		// Polls at t=5 and t=10; t=15 is past the deadline.
		assert_eq!(relay.calls(RelayKind::Token).len(), 2);

		let session = controller.session();

		assert_eq!(session.state, FlowState::Failed);
		assert!(session.error.as_deref().is_some_and(|error| error.contains("expired")));
	}

	#[tokio::test(start_paused = true)]
	async fn provider_denial_is_terminal() {
		let (controller, relay, _) = build_controller(
			ScriptedRelay::new()
				.device_reply(device_reply("dev-1", 1, 900))
				.token_reply(json!({ "error": "access_denied", "error_description": "User declined." })),
		);
		let err = controller.authenticate(params()).await.expect_err("Denial should fail.");

		assert_eq!(err.to_string(), "User declined.");
		assert_eq!(controller.session().error.as_deref(), Some("User declined."));
		assert_eq!(relay.calls(RelayKind::Token).len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn unusable_replies_and_network_failures_keep_polling() {
		let (controller, relay, _) = build_controller(
			ScriptedRelay::new()
				.device_reply(device_reply("dev-1", 2, 900))
				.token_failure()
				.token_reply(json!({ "unexpected": true }))
				.token_reply(json!({ "access_token": "tok" })),
		);
		let start = Instant::now();

		controller.authenticate(params()).await.expect("Attempt should authenticate.");

		assert_eq!(gaps(&relay.calls(RelayKind::Token), start), [2, 2, 2]);
	}

	#[tokio::test(start_paused = true)]
	async fn soft_cap_only_warns() {
		let relay = (0..5).fold(
			ScriptedRelay::new().device_reply(device_reply("dev-1", 1, 900)),
			|relay, _| relay.token_failure(),
		);
		let (controller, relay, _) = build_controller(relay.token_reply(json!({ "access_token": "tok" })));
		let controller = controller
			.with_config(DeviceFlowConfig::default().with_lenient_retry_warn_threshold(2));

		controller.authenticate(params()).await.expect("Warnings must not stop polling.");

		assert_eq!(relay.calls(RelayKind::Token).len(), 6);
	}

	#[tokio::test(start_paused = true)]
	async fn device_request_failures_never_poll() {
		let (controller, relay, events) = build_controller(
			ScriptedRelay::new()
				.device_reply(json!({ "error": "invalid_client", "error_description": "Bad client." })),
		);
		let err = controller.authenticate(params()).await.expect_err("Provider error must fail.");

		assert_eq!(err.to_string(), "Bad client.");
		assert_eq!(events.states(), [FlowState::Requesting, FlowState::Failed]);
		assert!(relay.calls(RelayKind::Token).is_empty());

		let (controller, relay, _) = controller_with_missing_user_code();
		let err = controller.authenticate(params()).await.expect_err("Malformed reply must fail.");

		assert!(matches!(err, Error::Flow(FlowError::MalformedDeviceResponse { .. })));
		assert!(relay.calls(RelayKind::Token).is_empty());

		// The relay itself failing is reported the same way.
		let (controller, _, _) = build_controller(ScriptedRelay::new());

		controller.authenticate(params()).await.expect_err("Relay failure must fail.");

		assert_eq!(controller.state(), FlowState::Failed);
		assert!(controller.session().error.is_some());
	}

	fn controller_with_missing_user_code()
	-> (DeviceFlowController<ScriptedRelay>, Arc<ScriptedRelay>, Arc<RecordingEvents>) {
		build_controller(ScriptedRelay::new().device_reply(
			json!({ "device_code": "dev-1", "verification_uri": "https://idp.test/activate" }),
		))
	}

	#[tokio::test(start_paused = true)]
	async fn newer_attempt_supersedes_the_older_loop() {
		let (controller, relay, _) = build_controller(
			ScriptedRelay::new()
				.device_reply(device_reply("dev-a", 2, 900))
				.device_reply(device_reply("dev-b", 2, 900)),
		);
		let first = controller.start(params());

		time::sleep(Duration::from_secs(5)).await;

		let second = controller.start(params().with_client_secret("s3cret"));
		let first = first.await.expect("First task should not panic.");

		assert!(matches!(first, Err(Error::Flow(FlowError::Superseded))));

		time::sleep(Duration::from_secs(5)).await;

		let session = controller.session();

		assert_eq!(session.state, FlowState::Polling);
		assert!(session.error.is_none());
		assert_eq!(session.device_code.as_ref().map(|code| code.secret().as_str()), Some("dev-b"));

		let tokens = relay.calls(RelayKind::Token);
		let first_b = tokens
			.iter()
			.position(|call| call.field("device_code") == Some("dev-b"))
			.expect("Second attempt should have polled.");

		assert!(tokens[first_b..].iter().all(|call| call.field("device_code") == Some("dev-b")));
		assert_eq!(tokens[first_b].field("client_secret"), Some("s3cret"));

		controller.cancel();

		let second = second.await.expect("Second task should not panic.");

		assert!(matches!(second, Err(Error::Flow(FlowError::Superseded))));
		assert_eq!(controller.state(), FlowState::Idle);
	}
}
