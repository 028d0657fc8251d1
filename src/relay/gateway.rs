//! In-process relay hop: strip the routing field, forward once, return the upstream JSON.

// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	config::RelayConfig,
	http::{HttpExchange, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	relay::{self, Relay, RelayError, RelayFuture, RelayKind},
};

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport.
pub type ReqwestRelayGateway = RelayGateway<ReqwestHttpClient>;

/// Stateless forwarder shared by both relay routes.
///
/// The gateway owns nothing but its transport and settings, so concurrent calls from unrelated
/// sessions never interfere.
pub struct RelayGateway<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for the single upstream exchange.
	pub transport: Arc<T>,
	/// Timeout and identification settings.
	pub config: RelayConfig,
}
impl<T> RelayGateway<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a gateway around the provided transport.
	pub fn with_transport(transport: impl Into<Arc<T>>, config: RelayConfig) -> Self {
		Self { transport: transport.into(), config }
	}

	/// Forwards `form` to the provider URL it names.
	///
	/// Input problems fail before any network activity. Upstream error payloads are returned as
	/// `Ok`, whatever the upstream status, because interpreting them is the caller's job.
	pub async fn relay(
		&self,
		kind: RelayKind,
		form: Vec<(String, String)>,
	) -> Result<JsonValue, RelayError> {
		let span = FlowSpan::new(FlowKind::Relay, kind.as_str());

		obs::record_flow_outcome(FlowKind::Relay, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let (target, fields) = relay::split_target(form)?;
				let exchange = HttpExchange::post_form(target, &fields)
					.with_timeout(self.config.request_timeout);
				let reply = self.transport.execute(exchange).await.map_err(RelayError::Upstream)?;

				serde_json::from_slice::<JsonValue>(&reply.body).map_err(|source| {
					RelayError::UpstreamBody {
						status: reply.status,
						preview: reply.body_preview(),
						source,
					}
				})
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::Relay, FlowOutcome::Success),
			Err(e) => {
				obs::record_flow_outcome(FlowKind::Relay, FlowOutcome::Failure);
				obs::record_warning(FlowKind::Relay, e);
			},
		}

		result
	}
}
#[cfg(feature = "reqwest")]
impl RelayGateway<ReqwestHttpClient> {
	/// Creates a gateway that provisions its own reqwest transport.
	pub fn new(config: RelayConfig) -> Result<Self> {
		let transport = ReqwestHttpClient::with_user_agent(&config.user_agent)?;

		Ok(Self::with_transport(transport, config))
	}
}
impl<T> Relay for RelayGateway<T>
where
	T: ?Sized + HttpTransport,
{
	fn forward(&self, kind: RelayKind, form: Vec<(String, String)>) -> RelayFuture<'_> {
		Box::pin(async move { self.relay(kind, form).await.map_err(Error::from) })
	}
}
impl<T> Clone for RelayGateway<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { transport: self.transport.clone(), config: self.config.clone() }
	}
}
impl<T> Debug for RelayGateway<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RelayGateway").field("config", &self.config).finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		error::TransportError,
		http::{HttpReply, TransportFuture},
		relay::TARGET_URL_FIELD,
	};

	#[derive(Default)]
	struct CountingTransport {
		calls: AtomicUsize,
		seen: Mutex<Vec<HttpExchange>>,
		reply: Mutex<Option<HttpReply>>,
	}
	impl HttpTransport for CountingTransport {
		fn execute(&self, exchange: HttpExchange) -> TransportFuture<'_> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.seen.lock().push(exchange);

			let reply = self.reply.lock().clone();

			Box::pin(async move {
				reply.ok_or_else(|| TransportError::Io(std::io::Error::other("connection reset")))
			})
		}
	}

	fn build_gateway(reply: Option<HttpReply>) -> (RelayGateway<CountingTransport>, Arc<CountingTransport>) {
		let transport = Arc::new(CountingTransport { reply: Mutex::new(reply), ..Default::default() });

		(RelayGateway::with_transport(transport.clone(), RelayConfig::default()), transport)
	}

	fn pair(key: &str, value: &str) -> (String, String) {
		(key.to_owned(), value.to_owned())
	}

	#[tokio::test]
	async fn missing_target_never_touches_the_network() {
		let (gateway, transport) = build_gateway(Some(HttpReply::new(200, "{}")));
		let err = gateway
			.relay(RelayKind::DeviceCode, vec![pair("client_id", "abc")])
			.await
			.expect_err("Missing target must be rejected.");

		assert!(matches!(err, RelayError::MissingTargetUrl));
		assert_eq!(err.status_code(), 400);
		assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn forwards_remaining_fields_and_passes_errors_through() {
		let body = r#"{"error":"authorization_pending","error_description":"wait"}"#;
		let (gateway, transport) = build_gateway(Some(HttpReply::new(400, body)));
		let json = gateway
			.relay(RelayKind::Token, vec![
				pair(TARGET_URL_FIELD, "https://example.com/token"),
				pair("client_id", "abc"),
				pair("device_code", "dev"),
			])
			.await
			.expect("Upstream OAuth errors should pass through.");

		assert_eq!(json["error"], "authorization_pending");
		assert_eq!(json["error_description"], "wait");

		let seen = transport.seen.lock();
		let exchange = &seen[0];

		assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
		assert_eq!(exchange.url.as_str(), "https://example.com/token");
		assert_eq!(exchange.form_fields(), [pair("client_id", "abc"), pair("device_code", "dev")]);
		assert_eq!(exchange.timeout, RelayConfig::default().request_timeout);
	}

	#[tokio::test]
	async fn non_json_and_network_failures_map_to_bad_gateway() {
		let (gateway, _) = build_gateway(Some(HttpReply::new(500, "<html>oops</html>")));
		let err = gateway
			.relay(RelayKind::Token, vec![pair(TARGET_URL_FIELD, "https://example.com/token")])
			.await
			.expect_err("HTML bodies must be rejected.");

		assert!(matches!(err, RelayError::UpstreamBody { status: 500, .. }));
		assert_eq!(err.status_code(), 502);

		let (gateway, transport) = build_gateway(None);
		let err = gateway
			.relay(RelayKind::Token, vec![pair(TARGET_URL_FIELD, "https://example.com/token")])
			.await
			.expect_err("Transport failures must surface.");

		assert!(err.is_transient());
		assert_eq!(transport.calls.load(Ordering::SeqCst), 1, "The relay must never retry.");
	}
}
