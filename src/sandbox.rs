//! Capability-scoped snippet runner.
//!
//! Snippets are written in a small JavaScript subset and evaluated by an in-crate interpreter.
//! The global scope holds exactly three bindings:
//!
//! - `headers`: an object carrying the `Authorization` header derived from the credential.
//! - `fetch(url, init?)`: HTTP through the runner's [`HttpTransport`]; resolves with a response
//!   exposing `status`, `ok`, `statusText`, `url`, `headers`, `json()`, and `text()`.
//! - `console`: `log`/`info` write plain lines, `error`/`warn` write error lines.
//!
//! Nothing else is reachable; referencing any other name is a `ReferenceError`. Exceptions that
//! escape the snippet, syntax errors included, become one error line.

mod ast;
mod fetch;
mod interp;
mod lexer;
mod parser;
mod value;

pub use fetch::FetchCapability;

// self
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
use crate::{
	_prelude::*,
	auth::Credential,
	events::{NoopEvents, PlaygroundEvents},
	http::HttpTransport,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};
use interp::{Interpreter, Scope};
use value::{Native, Value};

/// Visual style of an output line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLevel {
	/// `console.log` / `console.info`.
	Plain,
	/// `console.error` / `console.warn` and uncaught exceptions.
	Error,
}

/// One line of snippet output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
	/// Visual style.
	pub level: OutputLevel,
	/// Rendered text.
	pub text: String,
}
impl OutputLine {
	/// Plain-styled line.
	pub fn plain(text: impl Into<String>) -> Self {
		Self { level: OutputLevel::Plain, text: text.into() }
	}

	/// Error-styled line.
	pub fn error(text: impl Into<String>) -> Self {
		Self { level: OutputLevel::Error, text: text.into() }
	}

	/// Returns true for error-styled lines.
	pub fn is_error(&self) -> bool {
		self.level == OutputLevel::Error
	}
}

/// Reasons a snippet run ends early. Always reported as output, never returned to callers.
#[derive(Debug, ThisError)]
pub enum SandboxError {
	/// The snippet does not parse.
	#[error("SyntaxError: {message} (line {line})")]
	Syntax {
		/// 1-based line of the offending token.
		line: usize,
		/// Parser diagnostic.
		message: String,
	},
	/// An exception escaped the snippet.
	#[error("{0}")]
	Uncaught(String),
}
impl SandboxError {
	// Template holes are parsed separately; report them at the template's line.
	pub(crate) fn at_line(self, line: usize) -> Self {
		match self {
			Self::Syntax { message, .. } => Self::Syntax { line, message },
			other => other,
		}
	}
}

/// Runs snippets against a credential, one run at a time.
pub struct SnippetRunner<T>
where
	T: ?Sized + HttpTransport,
{
	fetch: FetchCapability<T>,
	events: Arc<dyn PlaygroundEvents>,
	output: Mutex<Vec<OutputLine>>,
	run_guard: AsyncMutex<()>,
}
impl<T> SnippetRunner<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a runner whose `fetch` goes through `transport`.
	pub fn with_transport(transport: impl Into<Arc<T>>) -> Self {
		Self {
			fetch: FetchCapability::new(transport.into(), None),
			events: Arc::new(NoopEvents),
			output: Mutex::new(Vec::new()),
			run_guard: AsyncMutex::new(()),
		}
	}

	/// Routes output signals to `events`.
	pub fn with_events(mut self, events: Arc<dyn PlaygroundEvents>) -> Self {
		self.events = events;

		self
	}

	/// Bounds every `fetch` issued by snippets.
	pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.fetch = self.fetch.with_timeout(timeout);

		self
	}

	/// Output of the most recent run.
	pub fn output(&self) -> Vec<OutputLine> {
		self.output.lock().clone()
	}

	/// Clears previous output, runs `code` with `credential` in scope, and returns the new
	/// output. Concurrent calls queue behind each other.
	pub async fn run(&self, code: &str, credential: &Credential) -> Vec<OutputLine> {
		let _guard = self.run_guard.lock().await;

		self.output.lock().clear();
		self.events.on_output_cleared();
		obs::record_flow_outcome(FlowKind::Snippet, FlowOutcome::Attempt);

		let span = FlowSpan::new(FlowKind::Snippet, "run");

		match span.instrument(self.execute(code, credential)).await {
			Ok(()) => obs::record_flow_outcome(FlowKind::Snippet, FlowOutcome::Success),
			Err(e) => {
				obs::record_flow_outcome(FlowKind::Snippet, FlowOutcome::Failure);
				self.emit(OutputLine::error(e.to_string()));
			},
		}

		self.output()
	}

	async fn execute(&self, code: &str, credential: &Credential) -> Result<(), SandboxError> {
		let program = parser::parse_program(code)?;
		let globals = Scope::root([
			(
				"headers",
				Value::object(vec![("Authorization".into(), Value::Str(credential.expose().into()))]),
			),
			("fetch", Value::Native(Native::Fetch)),
			(
				"console",
				Value::object(vec![
					("log".into(), Value::Native(Native::Console(OutputLevel::Plain, "log"))),
					("info".into(), Value::Native(Native::Console(OutputLevel::Plain, "info"))),
					("error".into(), Value::Native(Native::Console(OutputLevel::Error, "error"))),
					("warn".into(), Value::Native(Native::Console(OutputLevel::Error, "warn"))),
				]),
			),
		]);
		let emit = |line: OutputLine| self.emit(line);
		let interpreter = Interpreter::new(&self.fetch, &emit);

		interpreter.run(&program, &Scope::child(&globals)).await.map_err(|thrown| {
			SandboxError::Uncaught(match thrown {
				Value::Error(_) | Value::Str(_) => thrown.to_display(),
				other => other.render(),
			})
		})
	}

	fn emit(&self, line: OutputLine) {
		self.output.lock().push(line.clone());
		self.events.on_output_line(&line);
	}
}
#[cfg(feature = "reqwest")]
impl SnippetRunner<ReqwestHttpClient> {
	/// Creates a runner backed by a default reqwest transport.
	pub fn new() -> Self {
		Self::with_transport(ReqwestHttpClient::default())
	}
}
#[cfg(feature = "reqwest")]
impl Default for SnippetRunner<ReqwestHttpClient> {
	fn default() -> Self {
		Self::new()
	}
}
impl<T> Debug for SnippetRunner<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SnippetRunner")
			.field("fetch", &self.fetch)
			.field("output_lines", &self.output.lock().len())
			.finish()
	}
}
