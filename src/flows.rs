//! Device authorization flow orchestration.

pub mod device;

pub use device::*;

// self
use crate::_prelude::*;

/// Ways a device authorization attempt ends without a credential.
#[derive(Debug, ThisError)]
pub enum FlowError {
	/// The provider answered with an OAuth `error` payload.
	#[error("{}", .description.as_deref().unwrap_or(.code.as_str()))]
	Provider {
		/// Raw OAuth error code.
		code: String,
		/// Provider-supplied `error_description`.
		description: Option<String>,
	},
	/// The device code outlived its lifetime before the user approved it.
	#[error("Device code expired; start a new attempt.")]
	Expired,
	/// The device authorization response lacked a required field.
	#[error("Device authorization response is malformed: {reason}.")]
	MalformedDeviceResponse {
		/// Which field was missing.
		reason: String,
	},
	/// A newer attempt replaced this one.
	#[error("Device authorization attempt was superseded.")]
	Superseded,
}
