//! OAuth 2.0 device-flow playground for schlussel formulas: look a formula up, relay its
//! device-authorization exchanges through a same-origin hop, drive the RFC 8628 polling state
//! machine, and run snippets against the resulting credential with nothing but `headers`,
//! `fetch`, and `console` in scope.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod flows;
pub mod http;
pub mod obs;
pub mod relay;
pub mod sandbox;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for tests; enabled via `cfg(test)` or the `test` crate
	//! feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// crates.io
	use tokio::time::Instant;
	// self
	use crate::{
		error::TransportError,
		relay::{Relay, RelayError, RelayFuture, RelayKind},
	};

	/// One exchange observed by [`ScriptedRelay`].
	#[derive(Clone, Debug)]
	pub struct RelayCall {
		/// Which relay operation was invoked.
		pub kind: RelayKind,
		/// Form fields exactly as the caller sent them.
		pub form: Vec<(String, String)>,
		/// Tokio clock reading when the call arrived.
		pub at: Instant,
	}
	impl RelayCall {
		/// Value of the first `key` field, if present.
		pub fn field(&self, key: &str) -> Option<&str> {
			self.form.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
		}
	}

	/// In-memory [`Relay`] that answers from queued replies and records every call.
	///
	/// An exhausted device queue fails like an unreachable relay; an exhausted token queue keeps
	/// answering `authorization_pending`.
	#[derive(Debug, Default)]
	pub struct ScriptedRelay {
		device: Mutex<VecDeque<Option<JsonValue>>>,
		token: Mutex<VecDeque<Option<JsonValue>>>,
		calls: Mutex<Vec<RelayCall>>,
	}
	impl ScriptedRelay {
		/// Creates a relay with empty queues.
		pub fn new() -> Self {
			Self::default()
		}

		/// Queues a device-authorization reply.
		pub fn device_reply(self, reply: JsonValue) -> Self {
			self.device.lock().push_back(Some(reply));

			self
		}

		/// Queues a token-poll reply.
		pub fn token_reply(self, reply: JsonValue) -> Self {
			self.token.lock().push_back(Some(reply));

			self
		}

		/// Queues a token poll that fails at the upstream hop.
		pub fn token_failure(self) -> Self {
			self.token.lock().push_back(None);

			self
		}

		/// Calls recorded for `kind`, oldest first.
		pub fn calls(&self, kind: RelayKind) -> Vec<RelayCall> {
			self.calls.lock().iter().filter(|call| call.kind == kind).cloned().collect()
		}
	}
	impl Relay for ScriptedRelay {
		fn forward(&self, kind: RelayKind, form: Vec<(String, String)>) -> RelayFuture<'_> {
			self.calls.lock().push(RelayCall { kind, form, at: Instant::now() });

			let reply = match kind {
				RelayKind::DeviceCode => self.device.lock().pop_front().flatten(),
				RelayKind::Token => self
					.token
					.lock()
					.pop_front()
					.unwrap_or_else(|| Some(serde_json::json!({ "error": "authorization_pending" }))),
			};

			Box::pin(async move {
				reply.ok_or_else(|| {
					Error::from(RelayError::Upstream(TransportError::Io(std::io::Error::other(
						"scripted relay failure",
					))))
				})
			})
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value as JsonValue;
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
