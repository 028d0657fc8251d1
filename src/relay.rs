//! Same-origin relay that forwards device-flow requests to the real provider.
//!
//! Both relay operations share one contract: the caller names the provider URL in the
//! [`TARGET_URL_FIELD`] form field, the relay strips that field, POSTs the remaining fields
//! verbatim, and hands the upstream JSON back untouched (OAuth `error` payloads included).
//! The relay never retries and keeps no state between requests; retry policy belongs to the
//! device flow.
//!
//! [`RelayGateway`] performs the hop in-process, [`RelayHttpClient`] talks to a hosted relay,
//! and both implement [`Relay`] so the device flow does not care which one it drives.

pub mod client;
pub mod gateway;
#[cfg(feature = "server")] pub mod server;

pub use client::*;
pub use gateway::*;
#[cfg(feature = "server")] pub use server::*;

// self
use crate::{_prelude::*, error::TransportError};

/// Internal form field naming the provider URL to forward to.
pub const TARGET_URL_FIELD: &str = "_target_url";

/// Boxed future returned by [`Relay::forward`].
pub type RelayFuture<'a> = Pin<Box<dyn Future<Output = Result<JsonValue>> + 'a + Send>>;

/// Anything able to perform the two relay exchanges.
pub trait Relay
where
	Self: 'static + Send + Sync,
{
	/// Forwards `form` (which must carry [`TARGET_URL_FIELD`]) and resolves with the upstream
	/// JSON body.
	fn forward(&self, kind: RelayKind, form: Vec<(String, String)>) -> RelayFuture<'_>;

	/// Requests a device code.
	fn device_code(&self, form: Vec<(String, String)>) -> RelayFuture<'_> {
		self.forward(RelayKind::DeviceCode, form)
	}

	/// Polls the token endpoint.
	fn token(&self, form: Vec<(String, String)>) -> RelayFuture<'_> {
		self.forward(RelayKind::Token, form)
	}
}

/// The two relay operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RelayKind {
	/// Device authorization request.
	DeviceCode,
	/// Token polling request.
	Token,
}
impl RelayKind {
	/// Route the operation is served under.
	pub const fn path(self) -> &'static str {
		match self {
			RelayKind::DeviceCode => "/device-code-relay",
			RelayKind::Token => "/token-relay",
		}
	}

	/// Returns a stable label suitable for span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RelayKind::DeviceCode => "device_code",
			RelayKind::Token => "token",
		}
	}
}
impl Display for RelayKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Relay failures, each mapped onto the HTTP status the relay answers with.
#[derive(Debug, ThisError)]
pub enum RelayError {
	/// The request did not name a provider URL.
	#[error("Missing `_target_url` form field.")]
	MissingTargetUrl,
	/// The provider URL could not be parsed.
	#[error("The `_target_url` value `{value}` is not a valid URL.")]
	InvalidTargetUrl {
		/// Offending value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The upstream request could not be completed.
	#[error("Upstream request failed.")]
	Upstream(#[source] TransportError),
	/// The upstream answered with something other than JSON.
	#[error("Upstream answered HTTP {status} with a non-JSON body: {preview}")]
	UpstreamBody {
		/// Upstream HTTP status.
		status: u16,
		/// Bounded body excerpt.
		preview: String,
		/// Underlying parse failure.
		#[source]
		source: serde_json::Error,
	},
	/// A hosted relay refused the request.
	#[error("Relay answered HTTP {status}: {message}")]
	Rejected {
		/// Relay HTTP status.
		status: u16,
		/// Relay diagnostic.
		message: String,
	},
}
impl RelayError {
	/// HTTP status the relay routes answer with.
	pub fn status_code(&self) -> u16 {
		match self {
			Self::MissingTargetUrl | Self::InvalidTargetUrl { .. } => 400,
			Self::Upstream(_) | Self::UpstreamBody { .. } => 502,
			Self::Rejected { status, .. } => *status,
		}
	}

	/// OAuth-style `error` code used in the relay's JSON diagnostics.
	pub fn code(&self) -> &'static str {
		match self {
			Self::MissingTargetUrl | Self::InvalidTargetUrl { .. } => "invalid_request",
			Self::Upstream(_) | Self::UpstreamBody { .. } => "bad_gateway",
			Self::Rejected { .. } => "relay_rejected",
		}
	}

	/// Returns true when the failure came from the upstream hop rather than the input.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Upstream(_) | Self::UpstreamBody { .. })
	}

	/// JSON diagnostic body returned by the relay routes.
	pub fn to_json(&self) -> JsonValue {
		serde_json::json!({ "error": self.code(), "error_description": self.to_string() })
	}
}

/// Splits the provider URL out of `form`, returning it with the remaining fields in order.
///
/// Every occurrence of [`TARGET_URL_FIELD`] is removed; the first one wins.
pub fn split_target(
	form: Vec<(String, String)>,
) -> Result<(Url, Vec<(String, String)>), RelayError> {
	let mut target = None;
	let mut rest = Vec::with_capacity(form.len());

	for (key, value) in form {
		if key == TARGET_URL_FIELD {
			target.get_or_insert(value);
		} else {
			rest.push((key, value));
		}
	}

	let value = target.filter(|value| !value.trim().is_empty()).ok_or(RelayError::MissingTargetUrl)?;
	let url =
		Url::parse(&value).map_err(|source| RelayError::InvalidTargetUrl { value, source })?;

	Ok((url, rest))
}
