//! Interpretation of provider payloads received through the relay.

// crates.io
use oauth2::{DeviceCode, DeviceCodeErrorResponse};
// self
use crate::{_prelude::*, config::DeviceFlowConfig, flows::FlowError};

/// Upper bound on a provider-announced device code lifetime.
const MAX_EXPIRES_IN: Duration = Duration::from_secs(24 * 60 * 60);

/// Parsed device authorization response with defaults applied.
#[derive(Clone, Debug)]
pub(crate) struct DeviceGrant {
	pub(crate) device_code: DeviceCode,
	pub(crate) user_code: String,
	pub(crate) verification_uri: String,
	pub(crate) verification_uri_complete: Option<String>,
	pub(crate) interval: Duration,
	pub(crate) expires_in: Duration,
}
impl DeviceGrant {
	pub(crate) fn from_json(json: &JsonValue, config: &DeviceFlowConfig) -> Result<Self, FlowError> {
		if let Some(e) = provider_error(json) {
			return Err(e);
		}

		let device_code = required(json, "device_code")?;
		let user_code = required(json, "user_code")?;
		// Some providers still spell it `verification_url`.
		let verification_uri = required(json, "verification_uri")
			.or_else(|e| optional(json, "verification_url").ok_or(e))?;

		let expires_in =
			seconds(json, "expires_in").unwrap_or(config.default_expires_in).min(MAX_EXPIRES_IN);
		// Waiting longer than the code lives would only ever end in expiry.
		let interval = seconds(json, "interval").unwrap_or(config.default_interval).min(expires_in);

		Ok(Self {
			device_code: DeviceCode::new(device_code),
			user_code,
			verification_uri,
			verification_uri_complete: optional(json, "verification_uri_complete"),
			interval,
			expires_in,
		})
	}
}

/// Classification of one token-endpoint reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PollOutcome {
	/// `authorization_pending`.
	Pending,
	/// `slow_down`.
	SlowDown,
	/// Any other OAuth error code; terminal.
	Denied { code: String, description: Option<String> },
	/// Access token issued.
	Authorized(String),
	/// Neither an error nor a token.
	Unrecognized,
}
impl PollOutcome {
	pub(crate) fn classify(json: &JsonValue) -> Self {
		let Some(code) = json.get("error").and_then(JsonValue::as_str) else {
			return match optional(json, "access_token") {
				Some(token) => Self::Authorized(token),
				None => Self::Unrecognized,
			};
		};

		// Only the code decides whether to keep polling; the rest may be malformed.
		match code {
			"authorization_pending" => Self::Pending,
			"slow_down" => Self::SlowDown,
			_ => match serde_json::from_value::<DeviceCodeErrorResponse>(json.clone()) {
				Ok(response) => Self::Denied {
					code: code.to_owned(),
					description: response.error_description().cloned(),
				},
				Err(_) => Self::Denied { code: code.to_owned(), description: None },
			},
		}
	}
}

fn provider_error(json: &JsonValue) -> Option<FlowError> {
	let code = json.get("error").and_then(JsonValue::as_str)?;
	let description =
		json.get("error_description").and_then(JsonValue::as_str).map(str::to_owned);

	Some(FlowError::Provider { code: code.to_owned(), description })
}

fn optional(json: &JsonValue, key: &str) -> Option<String> {
	json.get(key).and_then(JsonValue::as_str).filter(|value| !value.is_empty()).map(str::to_owned)
}

fn required(json: &JsonValue, key: &'static str) -> Result<String, FlowError> {
	optional(json, key).ok_or_else(|| FlowError::MalformedDeviceResponse {
		reason: format!("missing `{key}`"),
	})
}

// Accepts integers, floats, and numeric strings; anything else, including values too large
// for a `Duration`, falls back to the defaults.
fn seconds(json: &JsonValue, key: &str) -> Option<Duration> {
	let value = json.get(key)?;
	let secs = value
		.as_f64()
		.or_else(|| value.as_str().and_then(|raw| raw.trim().parse::<f64>().ok()))
		.filter(|secs| *secs > 0.)?;

	Duration::try_from_secs_f64(secs).ok()
}
