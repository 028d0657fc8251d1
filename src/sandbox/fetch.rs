//! The `fetch` capability handed to snippets.

// self
use crate::{
	_prelude::*,
	http::{HttpExchange, HttpReply, HttpTransport},
	sandbox::value::{Native, Thrown, Value},
};

/// Performs snippet HTTP requests through a shared [`HttpTransport`].
pub struct FetchCapability<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	timeout: Option<Duration>,
}
impl<T> FetchCapability<T>
where
	T: ?Sized + HttpTransport,
{
	/// Wraps `transport`; every request honors `timeout`.
	pub fn new(transport: Arc<T>, timeout: Option<Duration>) -> Self {
		Self { transport, timeout }
	}

	/// Replaces the per-request timeout.
	pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;

		self
	}

	/// Runs `fetch(resource, init)` and resolves with a response object.
	///
	/// Network failures reject with a `TypeError`, as browsers do. HTTP error statuses resolve
	/// normally; snippets inspect `ok`/`status` themselves.
	pub(crate) async fn fetch(&self, resource: &Value, init: Option<&Value>) -> Result<Value, Thrown> {
		let target = resource.to_display();
		let url = Url::parse(&target)
			.map_err(|_| Value::type_error(format!("Failed to parse URL from {target}")))?;
		let mut exchange = HttpExchange::new("GET", url).with_timeout(self.timeout);

		if let Some(init) = init.filter(|init| !init.is_nullish()) {
			let method = init.get("method")?;

			if !method.is_nullish() {
				exchange.method = method.to_display().to_ascii_uppercase();
			}
			if let Value::Object(entries) = init.get("headers")? {
				let entries = entries.lock().clone();

				for (name, value) in entries {
					exchange = exchange.with_header(name, value.to_display());
				}
			}

			let body = init.get("body")?;

			if !body.is_nullish() {
				exchange = exchange.with_body(body.to_display());
			}
		}

		let reply = self
			.transport
			.execute(exchange)
			.await
			.map_err(|e| Value::type_error(format!("Failed to fetch: {e}")))?;

		Ok(response_object(reply, &target))
	}
}
impl<T> Clone for FetchCapability<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { transport: self.transport.clone(), timeout: self.timeout }
	}
}
impl<T> Debug for FetchCapability<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FetchCapability").field("timeout", &self.timeout).finish()
	}
}

fn response_object(reply: HttpReply, requested: &str) -> Value {
	let ok = reply.is_success();
	let url = reply.url.as_ref().map_or_else(|| requested.to_owned(), Url::to_string);
	let headers = reply
		.headers
		.iter()
		.map(|(name, value)| (name.to_ascii_lowercase(), Value::Str(value.clone())))
		.collect();
	let body = Arc::new(reply.body);

	Value::object(vec![
		("status".into(), Value::Number(f64::from(reply.status))),
		("ok".into(), Value::Bool(ok)),
		("statusText".into(), Value::Str(reply.status_text)),
		("url".into(), Value::Str(url)),
		("headers".into(), Value::object(headers)),
		("json".into(), Value::Native(Native::ResponseJson(body.clone()))),
		("text".into(), Value::Native(Native::ResponseText(body))),
	])
}

/// Body readers; both settle immediately because the body is already buffered.
pub(crate) fn read_json(body: &[u8]) -> Value {
	match serde_json::from_slice::<JsonValue>(body) {
		Ok(json) => Value::resolved(Value::from_json(json)),
		Err(e) => Value::rejected(Value::error(
			"SyntaxError",
			format!("Response body is not valid JSON: {e}"),
		)),
	}
}

pub(crate) fn read_text(body: &[u8]) -> Value {
	Value::resolved(Value::Str(String::from_utf8_lossy(body).into_owned()))
}
