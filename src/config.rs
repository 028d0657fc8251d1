//! Tunables for the relay and the device flow.
//!
//! Every struct deserializes with `#[serde(default)]`, so a partial document only overrides the
//! keys it names. Durations are expressed in whole milliseconds on the wire.

// self
use crate::_prelude::*;

/// Polling defaults applied when the provider leaves a field out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFlowConfig {
	/// Poll cadence used when the device response omits `interval`.
	#[serde(with = "millis")]
	pub default_interval: Duration,
	/// Lifetime used when the device response omits `expires_in`.
	#[serde(with = "millis")]
	pub default_expires_in: Duration,
	/// Sticky increment applied on every `slow_down`.
	#[serde(with = "millis")]
	pub slow_down_increment: Duration,
	/// Consecutive lenient retries after which a warning is logged once.
	pub lenient_retry_warn_threshold: u32,
}
impl DeviceFlowConfig {
	/// Overrides the sticky `slow_down` increment.
	pub fn with_slow_down_increment(mut self, increment: Duration) -> Self {
		self.slow_down_increment = increment;

		self
	}

	/// Overrides the lenient-retry warning threshold.
	pub fn with_lenient_retry_warn_threshold(mut self, threshold: u32) -> Self {
		self.lenient_retry_warn_threshold = threshold;

		self
	}
}
impl Default for DeviceFlowConfig {
	fn default() -> Self {
		Self {
			default_interval: Duration::from_secs(5),
			default_expires_in: Duration::from_secs(900),
			slow_down_increment: Duration::from_secs(5),
			lenient_retry_warn_threshold: 10,
		}
	}
}

/// Relay transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
	/// Upper bound for a single upstream exchange; `None` waits indefinitely.
	#[serde(with = "millis::option")]
	pub request_timeout: Option<Duration>,
	/// `User-Agent` sent upstream by the default reqwest transport.
	pub user_agent: String,
}
impl RelayConfig {
	/// Overrides the upstream timeout.
	pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.request_timeout = timeout;

		self
	}

	/// Overrides the user agent.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}
}
impl Default for RelayConfig {
	fn default() -> Self {
		Self {
			request_timeout: Some(Duration::from_secs(30)),
			user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into(),
		}
	}
}

mod millis {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(Duration::from_millis)
	}

	pub mod option {
		// crates.io
		use serde::{Deserializer, Serializer};
		// self
		use crate::_prelude::*;

		pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			match value {
				Some(value) => super::serialize(value, serializer),
				None => serializer.serialize_none(),
			}
		}

		pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
		where
			D: Deserializer<'de>,
		{
			Option::<u64>::deserialize(deserializer).map(|value| value.map(Duration::from_millis))
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn defaults_follow_rfc_8628() {
		let config = DeviceFlowConfig::default();

		assert_eq!(config.default_interval, Duration::from_secs(5));
		assert_eq!(config.default_expires_in, Duration::from_secs(900));
		assert_eq!(config.slow_down_increment, Duration::from_secs(5));
	}

	#[test]
	fn partial_documents_override_only_named_keys() {
		let config: DeviceFlowConfig =
			serde_json::from_str(r#"{"slow_down_increment":7000}"#).expect("Config should parse.");

		assert_eq!(config.slow_down_increment, Duration::from_millis(7_000));
		assert_eq!(config.default_interval, Duration::from_secs(5));

		let relay: RelayConfig =
			serde_json::from_str(r#"{"request_timeout":null}"#).expect("Config should parse.");

		assert_eq!(relay.request_timeout, None);
		assert!(relay.user_agent.starts_with("schlussel-playground/"));
	}
}
