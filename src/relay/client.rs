//! Client for a hosted relay, mirroring how a browser page reaches its same-origin relay.

// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{HttpExchange, HttpTransport},
	relay::{Relay, RelayError, RelayFuture, RelayKind},
};

/// Posts relay forms to `{base}/device-code-relay` and `{base}/token-relay`.
///
/// Non-2xx answers come from the relay itself (bad input, unreachable upstream) and surface as
/// [`RelayError::Rejected`]; upstream OAuth errors arrive as regular JSON with HTTP 200.
pub struct RelayHttpClient<T>
where
	T: ?Sized + HttpTransport,
{
	base: Url,
	transport: Arc<T>,
	timeout: Option<Duration>,
}
impl<T> RelayHttpClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client for the relay hosted at `base`.
	pub fn with_transport(base: Url, transport: impl Into<Arc<T>>) -> Self {
		Self { base, transport: transport.into(), timeout: None }
	}

	/// Applies a per-request timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Resolves the route for `kind` against the base URL.
	///
	/// Routes nest under the base path, so `https://site.test/playground` and
	/// `https://site.test/playground/` both resolve to `https://site.test/playground/token-relay`.
	pub fn route(&self, kind: RelayKind) -> Result<Url, ConfigError> {
		let name = kind.path().trim_start_matches('/');
		let mut base = self.base.clone();

		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());

			base.set_path(&path);
		}

		base.join(name)
			.map_err(|source| ConfigError::InvalidEndpoint { name: name.to_owned(), source })
	}

	async fn post(&self, kind: RelayKind, form: Vec<(String, String)>) -> Result<JsonValue> {
		let exchange = HttpExchange::post_form(self.route(kind)?, &form).with_timeout(self.timeout);
		let reply = self.transport.execute(exchange).await?;
		let body = serde_json::from_slice::<JsonValue>(&reply.body);

		if !reply.is_success() {
			let message = body
				.ok()
				.and_then(|json| json.get("error_description").and_then(JsonValue::as_str).map(str::to_owned))
				.unwrap_or_else(|| reply.body_preview());

			return Err(RelayError::Rejected { status: reply.status, message }.into());
		}

		body.map_err(|source| {
			RelayError::UpstreamBody { status: reply.status, preview: reply.body_preview(), source }
				.into()
		})
	}
}
#[cfg(feature = "reqwest")]
impl RelayHttpClient<ReqwestHttpClient> {
	/// Creates a client backed by a default reqwest transport.
	pub fn new(base: Url) -> Self {
		Self::with_transport(base, ReqwestHttpClient::default())
	}
}
impl<T> Relay for RelayHttpClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn forward(&self, kind: RelayKind, form: Vec<(String, String)>) -> RelayFuture<'_> {
		Box::pin(self.post(kind, form))
	}
}
impl<T> Debug for RelayHttpClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RelayHttpClient")
			.field("base", &self.base)
			.field("timeout", &self.timeout)
			.finish()
	}
}
