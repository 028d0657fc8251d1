//! Runtime values of the snippet language.

// self
use crate::{_prelude::*, sandbox::OutputLevel};

/// Nesting beyond this is treated as a cycle when rendering.
const MAX_RENDER_DEPTH: usize = 64;
/// How far past the current end a single index write may grow an array.
const MAX_ARRAY_GROWTH: usize = 10_000;

pub(crate) type ObjectRef = Arc<Mutex<Vec<(String, Value)>>>;
pub(crate) type ArrayRef = Arc<Mutex<Vec<Value>>>;

/// A thrown value.
pub(crate) type Thrown = Value;

#[derive(Clone)]
pub(crate) enum Value {
	Undefined,
	Null,
	Bool(bool),
	Number(f64),
	Str(String),
	Array(ArrayRef),
	Object(ObjectRef),
	Error(Arc<ErrorValue>),
	Native(Native),
	/// Settled promise; natives perform their work eagerly and hand back the outcome.
	Promise(Arc<Result<Value, Thrown>>),
}
impl Value {
	pub(crate) fn object(entries: Vec<(String, Value)>) -> Self {
		Self::Object(Arc::new(Mutex::new(entries)))
	}

	pub(crate) fn array(items: Vec<Value>) -> Self {
		Self::Array(Arc::new(Mutex::new(items)))
	}

	pub(crate) fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self::Error(Arc::new(ErrorValue { name: name.into(), message: message.into() }))
	}

	pub(crate) fn type_error(message: impl Into<String>) -> Self {
		Self::error("TypeError", message)
	}

	pub(crate) fn reference_error(message: impl Into<String>) -> Self {
		Self::error("ReferenceError", message)
	}

	pub(crate) fn resolved(value: Value) -> Self {
		Self::Promise(Arc::new(Ok(value)))
	}

	pub(crate) fn rejected(reason: Thrown) -> Self {
		Self::Promise(Arc::new(Err(reason)))
	}

	pub(crate) fn type_of(&self) -> &'static str {
		match self {
			Self::Undefined => "undefined",
			Self::Bool(_) => "boolean",
			Self::Number(_) => "number",
			Self::Str(_) => "string",
			Self::Native(_) => "function",
			Self::Null | Self::Array(_) | Self::Object(_) | Self::Error(_) | Self::Promise(_) =>
				"object",
		}
	}

	pub(crate) fn is_nullish(&self) -> bool {
		matches!(self, Self::Undefined | Self::Null)
	}

	pub(crate) fn is_truthy(&self) -> bool {
		match self {
			Self::Undefined | Self::Null => false,
			Self::Bool(b) => *b,
			Self::Number(n) => *n != 0. && !n.is_nan(),
			Self::Str(s) => !s.is_empty(),
			_ => true,
		}
	}

	pub(crate) fn to_number(&self) -> f64 {
		match self {
			Self::Undefined => f64::NAN,
			Self::Null => 0.,
			Self::Bool(b) => f64::from(u8::from(*b)),
			Self::Number(n) => *n,
			Self::Str(s) => {
				let trimmed = s.trim();

				if trimmed.is_empty() { 0. } else { trimmed.parse().unwrap_or(f64::NAN) }
			},
			Self::Array(items) => {
				let display = self.to_display();

				match items.lock().len() {
					0 => 0.,
					_ => Self::Str(display).to_number(),
				}
			},
			_ => f64::NAN,
		}
	}

	/// String conversion as `String(value)` performs it.
	pub(crate) fn to_display(&self) -> String {
		self.display_at(0)
	}

	fn display_at(&self, depth: usize) -> String {
		match self {
			Self::Undefined => "undefined".into(),
			Self::Null => "null".into(),
			Self::Bool(b) => b.to_string(),
			Self::Number(n) => format_number(*n),
			Self::Str(s) => s.clone(),
			Self::Array(items) => {
				if depth >= MAX_RENDER_DEPTH {
					return String::new();
				}

				let items = items.lock().clone();

				items
					.iter()
					.map(|item| if item.is_nullish() { String::new() } else { item.display_at(depth + 1) })
					.collect::<Vec<_>>()
					.join(",")
			},
			Self::Object(_) => "[object Object]".into(),
			Self::Error(e) => e.to_string(),
			Self::Native(native) => format!("function {}() {{ [native code] }}", native.name()),
			Self::Promise(_) => "[object Promise]".into(),
		}
	}

	/// Text printed by `console.*` for one argument.
	pub(crate) fn render(&self) -> String {
		match self {
			Self::Array(_) | Self::Object(_) => self
				.to_json()
				.and_then(|json| serde_json::to_string_pretty(&json).ok())
				.unwrap_or_else(|| self.to_display()),
			_ => self.to_display(),
		}
	}

	/// Structured form as `JSON.stringify` would produce it; `None` when the value cannot be
	/// serialized (cycles, excessive nesting, or a top-level non-serializable value).
	pub(crate) fn to_json(&self) -> Option<JsonValue> {
		self.json_at(0).ok().flatten()
	}

	// `Ok(None)` marks values JSON omits (undefined, functions).
	fn json_at(&self, depth: usize) -> Result<Option<JsonValue>, ()> {
		if depth > MAX_RENDER_DEPTH {
			return Err(());
		}

		Ok(Some(match self {
			Self::Undefined | Self::Native(_) => return Ok(None),
			Self::Null => JsonValue::Null,
			Self::Bool(b) => JsonValue::Bool(*b),
			Self::Number(n) => number_to_json(*n),
			Self::Str(s) => JsonValue::String(s.clone()),
			Self::Array(items) => {
				let items = items.lock().clone();
				let mut out = Vec::with_capacity(items.len());

				for item in &items {
					out.push(item.json_at(depth + 1)?.unwrap_or(JsonValue::Null));
				}

				JsonValue::Array(out)
			},
			Self::Object(entries) => {
				let entries = entries.lock().clone();
				let mut out = serde_json::Map::new();

				for (key, value) in &entries {
					if let Some(json) = value.json_at(depth + 1)? {
						out.insert(key.clone(), json);
					}
				}

				JsonValue::Object(out)
			},
			Self::Error(_) | Self::Promise(_) => JsonValue::Object(serde_json::Map::new()),
		}))
	}

	pub(crate) fn from_json(json: JsonValue) -> Self {
		match json {
			JsonValue::Null => Self::Null,
			JsonValue::Bool(b) => Self::Bool(b),
			JsonValue::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
			JsonValue::String(s) => Self::Str(s),
			JsonValue::Array(items) => Self::array(items.into_iter().map(Self::from_json).collect()),
			JsonValue::Object(map) =>
				Self::object(map.into_iter().map(|(key, value)| (key, Self::from_json(value))).collect()),
		}
	}

	pub(crate) fn strict_eq(&self, other: &Value) -> bool {
		match (self, other) {
			(Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
			(Self::Bool(a), Self::Bool(b)) => a == b,
			(Self::Number(a), Self::Number(b)) => a == b,
			(Self::Str(a), Self::Str(b)) => a == b,
			(Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
			(Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
			(Self::Error(a), Self::Error(b)) => Arc::ptr_eq(a, b),
			(Self::Promise(a), Self::Promise(b)) => Arc::ptr_eq(a, b),
			(Self::Native(a), Self::Native(b)) => a.same(b),
			_ => false,
		}
	}

	pub(crate) fn loose_eq(&self, other: &Value) -> bool {
		match (self, other) {
			(a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
			(Self::Number(_) | Self::Str(_) | Self::Bool(_), Self::Number(_) | Self::Str(_) | Self::Bool(_))
				if self.type_of() != other.type_of() =>
				self.to_number() == other.to_number(),
			_ => self.strict_eq(other),
		}
	}

	/// Property read; `null` and `undefined` throw like the real thing.
	pub(crate) fn get(&self, key: &str) -> Result<Value, Thrown> {
		Ok(match self {
			Self::Undefined | Self::Null => {
				return Err(Self::type_error(format!(
					"Cannot read properties of {} (reading '{key}')",
					self.to_display()
				)));
			},
			Self::Object(entries) => entries
				.lock()
				.iter()
				.find(|(name, _)| name == key)
				.map(|(_, value)| value.clone())
				.unwrap_or(Self::Undefined),
			Self::Array(items) => {
				let items = items.lock();

				match key {
					"length" => Self::Number(items.len() as f64),
					_ => key
						.parse::<usize>()
						.ok()
						.and_then(|index| items.get(index).cloned())
						.unwrap_or(Self::Undefined),
				}
			},
			Self::Str(s) => match key {
				"length" => Self::Number(s.encode_utf16().count() as f64),
				_ => key
					.parse::<usize>()
					.ok()
					.and_then(|index| s.chars().nth(index))
					.map(|c| Self::Str(c.to_string()))
					.unwrap_or(Self::Undefined),
			},
			Self::Error(e) => match key {
				"name" => Self::Str(e.name.clone()),
				"message" => Self::Str(e.message.clone()),
				_ => Self::Undefined,
			},
			Self::Native(native) if key == "name" => Self::Str(native.name().into()),
			_ => Self::Undefined,
		})
	}

	/// Property write; writes to primitives are silently dropped.
	pub(crate) fn set(&self, key: &str, value: Value) -> Result<(), Thrown> {
		match self {
			Self::Undefined | Self::Null => Err(Self::type_error(format!(
				"Cannot set properties of {} (setting '{key}')",
				self.to_display()
			))),
			Self::Object(entries) => {
				let mut entries = entries.lock();

				match entries.iter_mut().find(|(name, _)| name == key) {
					Some((_, slot)) => *slot = value,
					None => entries.push((key.to_owned(), value)),
				}

				Ok(())
			},
			Self::Array(items) => {
				if let Ok(index) = key.parse::<usize>() {
					let mut items = items.lock();

					if index >= items.len() {
						if index - items.len() > MAX_ARRAY_GROWTH {
							return Err(Self::error("RangeError", "Invalid array length"));
						}

						items.resize(index + 1, Self::Undefined);
					}

					items[index] = value;
				}

				Ok(())
			},
			_ => Ok(()),
		}
	}
}

impl Debug for Value {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple(self.type_of()).field(&self.to_display()).finish()
	}
}

#[derive(Debug)]
pub(crate) struct ErrorValue {
	pub(crate) name: String,
	pub(crate) message: String,
}
impl Display for ErrorValue {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		if self.message.is_empty() {
			f.write_str(&self.name)
		} else {
			write!(f, "{}: {}", self.name, self.message)
		}
	}
}

/// Host functions reachable from a snippet.
#[derive(Clone)]
pub(crate) enum Native {
	Console(OutputLevel, &'static str),
	Fetch,
	ResponseJson(Arc<Vec<u8>>),
	ResponseText(Arc<Vec<u8>>),
}
impl Native {
	pub(crate) fn name(&self) -> &'static str {
		match self {
			Self::Console(_, name) => *name,
			Self::Fetch => "fetch",
			Self::ResponseJson(_) => "json",
			Self::ResponseText(_) => "text",
		}
	}

	fn same(&self, other: &Native) -> bool {
		match (self, other) {
			(Self::Console(a, x), Self::Console(b, y)) => a == b && x == y,
			(Self::Fetch, Self::Fetch) => true,
			(Self::ResponseJson(a), Self::ResponseJson(b))
			| (Self::ResponseText(a), Self::ResponseText(b)) => Arc::ptr_eq(a, b),
			_ => false,
		}
	}
}

/// Formats a number the way JavaScript prints it for everyday values.
pub(crate) fn format_number(n: f64) -> String {
	if n.is_nan() {
		"NaN".into()
	} else if n.is_infinite() {
		if n > 0. { "Infinity".into() } else { "-Infinity".into() }
	} else if n == 0. {
		"0".into()
	} else if n.fract() == 0. && n.abs() < 1e21 {
		format!("{n:.0}")
	} else {
		n.to_string()
	}
}

fn number_to_json(n: f64) -> JsonValue {
	// 2^53, the largest range where every integer is exact.
	if n.fract() == 0. && n.abs() < 9_007_199_254_740_992. {
		JsonValue::from(n as i64)
	} else {
		serde_json::Number::from_f64(n).map(JsonValue::Number).unwrap_or(JsonValue::Null)
	}
}
