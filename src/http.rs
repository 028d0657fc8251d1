//! Transport primitives shared by the relay and the sandbox `fetch` capability.
//!
//! The module exposes [`HttpTransport`] alongside the crate-owned [`HttpExchange`] and
//! [`HttpReply`] types so the relay, the relay client, and the snippet runner never depend on a
//! particular HTTP stack. [`ReqwestHttpClient`] is the default implementation; tests swap in
//! fakes that count calls or replay canned replies.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use url::form_urlencoded;
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpReply, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks able to perform a single request/response exchange.
///
/// Implementations must not retry: every call maps to exactly one upstream request. They must
/// be `Send + Sync + 'static` so a single transport can be shared behind an [`Arc`] by the
/// relay routes and any number of runners.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `exchange` and resolves with the upstream reply, whatever its status.
	fn execute(&self, exchange: HttpExchange) -> TransportFuture<'_>;
}

/// Outbound request described with crate-owned types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpExchange {
	/// Upper-case HTTP method.
	pub method: String,
	/// Absolute request URL.
	pub url: Url,
	/// Header pairs in insertion order.
	pub headers: Vec<(String, String)>,
	/// Raw request body.
	pub body: Option<Vec<u8>>,
	/// Per-request timeout.
	pub timeout: Option<Duration>,
}
impl HttpExchange {
	/// Creates a bodiless request.
	pub fn new(method: impl Into<String>, url: Url) -> Self {
		Self { method: method.into(), url, headers: Vec::new(), body: None, timeout: None }
	}

	/// Builds a form POST that asks for JSON, keeping the field order.
	pub fn post_form(url: Url, fields: &[(String, String)]) -> Self {
		let body = form_urlencoded::Serializer::new(String::new()).extend_pairs(fields).finish();

		Self::new("POST", url)
			.with_header("Content-Type", "application/x-www-form-urlencoded")
			.with_header("Accept", "application/json")
			.with_body(body.into_bytes())
	}

	/// Appends a header pair.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Sets a per-request timeout.
	pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;

		self
	}

	/// Decodes a form-encoded body back into ordered pairs.
	pub fn form_fields(&self) -> Vec<(String, String)> {
		self.body
			.as_deref()
			.map(|body| form_urlencoded::parse(body).into_owned().collect())
			.unwrap_or_default()
	}

	/// Returns the first header value named `name`, compared case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}
}

/// Upstream reply described with crate-owned types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpReply {
	/// HTTP status code.
	pub status: u16,
	/// Canonical reason phrase for the status.
	pub status_text: String,
	/// Final URL after redirects.
	pub url: Option<Url>,
	/// Header pairs in wire order.
	pub headers: Vec<(String, String)>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpReply {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a reply with a status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, body: body.into(), ..Default::default() }
	}

	/// Returns true for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns the first header value named `name`, compared case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}

	/// Body decoded as UTF-8 with replacement characters for invalid sequences.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	/// Short body excerpt suitable for diagnostics.
	pub fn body_preview(&self) -> String {
		let text = self.text();

		match text.char_indices().nth(Self::BODY_PREVIEW_LIMIT) {
			Some((idx, _)) => text[..idx].to_owned(),
			None => text,
		}
	}
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
	headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value.as_str())
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client that identifies itself with `user_agent`.
	pub fn with_user_agent(user_agent: &str) -> Result<Self, crate::error::ConfigError> {
		Ok(Self(ReqwestClient::builder().user_agent(user_agent).build()?))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestHttpClient {
	fn execute(&self, exchange: HttpExchange) -> TransportFuture<'_> {
		Box::pin(async move {
			let target = exchange.url.to_string();
			let method = reqwest::Method::from_bytes(exchange.method.as_bytes())
				.map_err(|e| TransportError::network(&target, e))?;
			let mut request = self.0.request(method, exchange.url);

			for (name, value) in &exchange.headers {
				request = request.header(name, value);
			}
			if let Some(body) = exchange.body {
				request = request.body(body);
			}
			if let Some(timeout) = exchange.timeout {
				request = request.timeout(timeout);
			}

			let response =
				request.send().await.map_err(|e| TransportError::network(&target, e))?;
			let status = response.status();
			let url = response.url().clone();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await.map_err(|e| TransportError::network(&target, e))?;

			Ok(HttpReply {
				status: status.as_u16(),
				status_text: status.canonical_reason().unwrap_or_default().to_owned(),
				url: Some(url),
				headers,
				body: body.to_vec(),
			})
		})
	}
}
