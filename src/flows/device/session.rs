// crates.io
use oauth2::DeviceCode;
use tokio::time::Instant;
// self
use crate::{_prelude::*, auth::Credential};

/// Lifecycle of one device authorization attempt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
	/// Nothing started yet, or the last attempt was cancelled.
	#[default]
	Idle,
	/// Device authorization request in flight.
	Requesting,
	/// User code issued; waiting for the first poll.
	AwaitingUserAction,
	/// Token endpoint polling in progress.
	Polling,
	/// Access token received.
	Authenticated,
	/// Attempt ended without a credential.
	Failed,
}
impl FlowState {
	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowState::Idle => "idle",
			FlowState::Requesting => "requesting",
			FlowState::AwaitingUserAction => "awaiting_user_action",
			FlowState::Polling => "polling",
			FlowState::Authenticated => "authenticated",
			FlowState::Failed => "failed",
		}
	}

	/// Returns true for `Authenticated` and `Failed`.
	pub const fn is_terminal(self) -> bool {
		matches!(self, FlowState::Authenticated | FlowState::Failed)
	}
}
impl Display for FlowState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// What the user must see to approve the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserCodePrompt {
	/// Short code typed by the user.
	pub user_code: String,
	/// Page where the code is entered.
	pub verification_uri: String,
	/// Page with the code pre-filled, when the provider offers one.
	pub verification_uri_complete: Option<String>,
	/// Lifetime of the device code.
	pub expires_in: Duration,
}

/// Snapshot of the active attempt.
///
/// Polling-specific fields are populated once the device authorization succeeds.
#[derive(Clone, Debug)]
pub struct DeviceFlowSession {
	/// Current lifecycle state.
	pub state: FlowState,
	/// Wall-clock time the attempt began.
	pub started_at: OffsetDateTime,
	/// User-facing prompt issued by the provider.
	pub prompt: Option<UserCodePrompt>,
	/// Current poll interval; grows on every `slow_down`.
	pub poll_interval: Duration,
	/// Monotonic deadline after which polling stops.
	pub expires_at: Option<Instant>,
	/// Token requests issued so far.
	pub poll_attempts: u32,
	/// Ready-to-use `Authorization` header once authenticated.
	pub credential: Option<Credential>,
	/// Human-readable reason when the attempt failed.
	pub error: Option<String>,
	pub(crate) device_code: Option<DeviceCode>,
}
impl DeviceFlowSession {
	pub(crate) fn idle() -> Self {
		Self {
			state: FlowState::Idle,
			started_at: OffsetDateTime::now_utc(),
			prompt: None,
			poll_interval: Duration::ZERO,
			expires_at: None,
			poll_attempts: 0,
			credential: None,
			error: None,
			device_code: None,
		}
	}

	pub(crate) fn requesting() -> Self {
		Self { state: FlowState::Requesting, ..Self::idle() }
	}

	/// Returns true once the deadline has passed. Sessions without a deadline never expire.
	pub fn is_expired_at(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|deadline| now > deadline)
	}
}
impl Default for DeviceFlowSession {
	fn default() -> Self {
		Self::idle()
	}
}
