//! Optional observability helpers for playground flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `schlussel_playground.flow` with the `flow`
//!   (component) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `schlussel_playground_flow_total` counter for every
//!   attempt and outcome, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Playground components observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Device authorization request (`device_code` issuance).
	DeviceAuthorization,
	/// Token endpoint polling.
	TokenPoll,
	/// Relay forwarding hop.
	Relay,
	/// Sandboxed snippet execution.
	Snippet,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::DeviceAuthorization => "device_authorization",
			FlowKind::TokenPoll => "token_poll",
			FlowKind::Relay => "relay",
			FlowKind::Snippet => "snippet",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a helper.
	Attempt,
	/// Provider asked the client to keep waiting.
	Pending,
	/// Provider asked the client to poll less often.
	SlowDown,
	/// Unrecognized reply or transport failure swallowed by the lenient retry policy.
	Retry,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Device code outlived its deadline.
	Expired,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Pending => "pending",
			FlowOutcome::SlowDown => "slow_down",
			FlowOutcome::Retry => "retry",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Expired => "expired",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
