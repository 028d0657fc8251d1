//! Playground-level error types shared across the catalog, relay, and flows.

// self
use crate::_prelude::*;

/// Playground-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical playground error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Formula catalog could not be loaded.
	#[error(transparent)]
	Catalog(#[from] crate::catalog::CatalogError),
	/// Relay rejected the request or the upstream hop failed.
	#[error(transparent)]
	Relay(#[from] crate::relay::RelayError),
	/// Device flow ended without a credential.
	#[error(transparent)]
	Flow(#[from] crate::flows::FlowError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Returns true when the failure may resolve on its own and the caller should keep polling.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Transport(_) => true,
			Self::Relay(e) => e.is_transient(),
			_ => false,
		}
	}
}

/// Configuration and validation failures raised while wiring components together.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Formula does not carry everything the device playground needs.
	#[error("Formula `{formula}` cannot run the device playground: {reason}.")]
	PlaygroundUnavailable {
		/// Formula identifier string.
		formula: String,
		/// Missing piece.
		reason: &'static str,
	},
	/// A formula endpoint could not be parsed.
	#[error("Formula endpoint `{name}` is not a valid URL.")]
	InvalidEndpoint {
		/// Endpoint key inside the method's `endpoints` map.
		name: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {target}.")]
	Network {
		/// Host or URL the request was aimed at.
		target: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error aimed at `target`.
	pub fn network(
		target: impl Into<String>,
		src: impl 'static + Send + Sync + StdError,
	) -> Self {
		Self::Network { target: target.into(), source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{flows::FlowError, relay::RelayError};

	#[test]
	fn transient_classification_follows_taxonomy() {
		let network = Error::from(TransportError::Io(std::io::Error::other("reset")));

		assert!(network.is_transient());
		assert!(!Error::from(RelayError::MissingTargetUrl).is_transient());
		assert!(!Error::from(FlowError::Expired).is_transient());
	}
}
