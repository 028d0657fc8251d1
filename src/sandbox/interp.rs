//! Tree-walking evaluator.
//!
//! Evaluation is async because `fetch` suspends. Recursion goes through boxed futures, the same
//! shape the transport traits use, so the whole run stays `Send`.

// self
use crate::{
	_prelude::*,
	http::HttpTransport,
	sandbox::{
		OutputLine,
		ast::{BinaryOp, DeclKind, Expr, LogicalOp, Property, Stmt, TemplatePart, UnaryOp},
		fetch::{self, FetchCapability},
		value::{Native, Thrown, Value},
	},
};

type Eval<'s, V> = Pin<Box<dyn Future<Output = Result<V, Thrown>> + 's + Send>>;

const ERROR_CONSTRUCTORS: &[&str] =
	&["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError"];

struct Binding {
	value: Value,
	kind: DeclKind,
}

/// Lexical scope; the root holds the capability bindings and nothing else.
pub(crate) struct Scope {
	vars: Mutex<HashMap<String, Binding>>,
	parent: Option<Arc<Scope>>,
}
impl Scope {
	pub(crate) fn root(bindings: impl IntoIterator<Item = (&'static str, Value)>) -> Arc<Self> {
		let vars = bindings
			.into_iter()
			.map(|(name, value)| (name.to_owned(), Binding { value, kind: DeclKind::Const }))
			.collect();

		Arc::new(Self { vars: Mutex::new(vars), parent: None })
	}

	pub(crate) fn child(parent: &Arc<Scope>) -> Arc<Self> {
		Arc::new(Self { vars: Mutex::new(HashMap::new()), parent: Some(parent.clone()) })
	}

	fn declare(&self, name: &str, kind: DeclKind, value: Value) -> Result<(), Thrown> {
		let mut vars = self.vars.lock();

		match vars.get(name) {
			Some(existing) if kind != DeclKind::Var || existing.kind != DeclKind::Var =>
				Err(Value::error("SyntaxError", format!("Identifier '{name}' has already been declared"))),
			_ => {
				vars.insert(name.to_owned(), Binding { value, kind });

				Ok(())
			},
		}
	}

	fn lookup(&self, name: &str) -> Option<Value> {
		if let Some(binding) = self.vars.lock().get(name) {
			return Some(binding.value.clone());
		}

		let mut scope = self.parent.clone();

		while let Some(current) = scope {
			if let Some(binding) = current.vars.lock().get(name) {
				return Some(binding.value.clone());
			}

			scope = current.parent.clone();
		}

		None
	}

	fn assign(self: &Arc<Self>, name: &str, value: Value) -> Result<(), Thrown> {
		let mut scope = Some(self.clone());

		while let Some(current) = scope {
			if let Some(binding) = current.vars.lock().get_mut(name) {
				if binding.kind == DeclKind::Const {
					return Err(Value::type_error("Assignment to constant variable."));
				}

				binding.value = value;

				return Ok(());
			}

			scope = current.parent.clone();
		}

		Err(Value::reference_error(format!("{name} is not defined")))
	}
}

pub(crate) struct Interpreter<'a, T>
where
	T: ?Sized + HttpTransport,
{
	fetch: &'a FetchCapability<T>,
	emit: &'a (dyn Fn(OutputLine) + Send + Sync),
}
impl<'a, T> Interpreter<'a, T>
where
	T: ?Sized + HttpTransport,
{
	pub(crate) fn new(
		fetch: &'a FetchCapability<T>,
		emit: &'a (dyn Fn(OutputLine) + Send + Sync),
	) -> Self {
		Self { fetch, emit }
	}

	pub(crate) async fn run(&self, program: &[Stmt], scope: &Arc<Scope>) -> Result<(), Thrown> {
		for stmt in program {
			self.exec(stmt, scope).await?;
		}

		Ok(())
	}

	fn exec<'s>(&'s self, stmt: &'s Stmt, scope: &'s Arc<Scope>) -> Eval<'s, ()> {
		Box::pin(async move {
			match stmt {
				Stmt::Empty => {},
				Stmt::Expr(expr) => {
					self.eval(expr, scope).await?;
				},
				Stmt::Decl { kind, declarators } =>
					for (name, init) in declarators {
						let value = match init {
							Some(init) => self.eval(init, scope).await?,
							None => Value::Undefined,
						};

						scope.declare(name, *kind, value)?;
					},
				Stmt::If { test, then, otherwise } =>
					if self.eval(test, scope).await?.is_truthy() {
						self.exec(then, scope).await?;
					} else if let Some(otherwise) = otherwise {
						self.exec(otherwise, scope).await?;
					},
				Stmt::Block(body) => self.run(body, &Scope::child(scope)).await?,
				Stmt::Throw(value) => return Err(self.eval(value, scope).await?),
				Stmt::Try { body, param, handler, finalizer } => {
					let mut result = self.run(body, &Scope::child(scope)).await;

					if let (Err(thrown), Some(handler)) = (&result, handler) {
						let inner = Scope::child(scope);

						if let Some(param) = param {
							inner.declare(param, DeclKind::Let, thrown.clone())?;
						}

						result = self.run(handler, &inner).await;
					}
					if let Some(finalizer) = finalizer {
						self.run(finalizer, &Scope::child(scope)).await?;
					}

					result?;
				},
				Stmt::ForOf { kind, name, iterable, body } => {
					let items = match self.eval(iterable, scope).await? {
						Value::Array(items) => items.lock().clone(),
						Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
						other =>
							return Err(Value::type_error(format!(
								"{} is not iterable",
								other.to_display()
							))),
					};

					for item in items {
						let inner = Scope::child(scope);

						inner.declare(name, *kind, item)?;
						self.exec(body, &inner).await?;
					}
				},
			}

			Ok(())
		})
	}

	fn eval<'s>(&'s self, expr: &'s Expr, scope: &'s Arc<Scope>) -> Eval<'s, Value> {
		Box::pin(async move {
			Ok(match expr {
				Expr::Number(n) => Value::Number(*n),
				Expr::Str(s) => Value::Str(s.clone()),
				Expr::Bool(b) => Value::Bool(*b),
				Expr::Null => Value::Null,
				Expr::Undefined => Value::Undefined,
				Expr::Template(parts) => {
					let mut out = String::new();

					for part in parts {
						match part {
							TemplatePart::Text(text) => out.push_str(text),
							TemplatePart::Expr(expr) =>
								out.push_str(&self.eval(expr, scope).await?.to_display()),
						}
					}

					Value::Str(out)
				},
				Expr::Ident(name) => scope
					.lookup(name)
					.ok_or_else(|| Value::reference_error(format!("{name} is not defined")))?,
				Expr::Array(items) => {
					let mut values = Vec::with_capacity(items.len());

					for item in items {
						values.push(self.eval(item, scope).await?);
					}

					Value::array(values)
				},
				Expr::Object(props) => {
					let object = Value::object(Vec::with_capacity(props.len()));

					for (key, value) in props {
						object.set(key, self.eval(value, scope).await?)?;
					}

					object
				},
				Expr::Member { .. } | Expr::Call { .. } =>
					self.eval_chain(expr, scope).await?.unwrap_or(Value::Undefined),
				Expr::NewError { name, args } => {
					if !ERROR_CONSTRUCTORS.contains(&name.as_str()) {
						return Err(Value::type_error(format!("{name} is not a constructor")));
					}

					let message = match args.first() {
						Some(arg) => {
							let message = self.eval(arg, scope).await?;

							if message.is_nullish() { String::new() } else { message.to_display() }
						},
						None => String::new(),
					};

					Value::error(name.clone(), message)
				},
				Expr::Unary { op: UnaryOp::TypeOf, operand } => match operand.as_ref() {
					// `typeof` on an undeclared name does not throw.
					Expr::Ident(name) =>
						Value::Str(scope.lookup(name).map_or("undefined", |value| value.type_of()).into()),
					other => Value::Str(self.eval(other, scope).await?.type_of().into()),
				},
				Expr::Unary { op, operand } => {
					let value = self.eval(operand, scope).await?;

					match op {
						UnaryOp::Not => Value::Bool(!value.is_truthy()),
						UnaryOp::Neg => Value::Number(-value.to_number()),
						UnaryOp::Plus | UnaryOp::TypeOf => Value::Number(value.to_number()),
					}
				},
				Expr::Binary { op, left, right } => {
					let left = self.eval(left, scope).await?;
					let right = self.eval(right, scope).await?;

					binary(*op, &left, &right)
				},
				Expr::Logical { op, left, right } => {
					let left = self.eval(left, scope).await?;
					let short_circuit = match op {
						LogicalOp::And => !left.is_truthy(),
						LogicalOp::Or => left.is_truthy(),
						LogicalOp::Nullish => !left.is_nullish(),
					};

					if short_circuit { left } else { self.eval(right, scope).await? }
				},
				Expr::Conditional { test, then, otherwise } =>
					if self.eval(test, scope).await?.is_truthy() {
						self.eval(then, scope).await?
					} else {
						self.eval(otherwise, scope).await?
					},
				Expr::Assign { target, op, value } => self.assign(target, *op, value, scope).await?,
				Expr::Await(operand) => match self.eval(operand, scope).await? {
					Value::Promise(settled) => settled.as_ref().clone()?,
					other => other,
				},
			})
		})
	}

	// `None` means an optional link short-circuited the rest of the chain.
	fn eval_chain<'s>(&'s self, expr: &'s Expr, scope: &'s Arc<Scope>) -> Eval<'s, Option<Value>> {
		Box::pin(async move {
			match expr {
				Expr::Member { object, property, optional } => {
					let Some(target) = self.eval_link(object, scope).await? else {
						return Ok(None);
					};

					if *optional && target.is_nullish() {
						return Ok(None);
					}

					let key = self.property_key(property, scope).await?;

					target.get(&key).map(Some)
				},
				Expr::Call { callee, args } => {
					let function = match callee.as_ref() {
						Expr::Member { .. } => match self.eval_chain(callee, scope).await? {
							Some(function) => function,
							None => return Ok(None),
						},
						other => self.eval(other, scope).await?,
					};
					let Value::Native(native) = function else {
						return Err(Value::type_error(format!("{} is not a function", describe(callee))));
					};
					let mut values = Vec::with_capacity(args.len());

					for arg in args {
						values.push(self.eval(arg, scope).await?);
					}

					self.call(&native, values).await.map(Some)
				},
				other => self.eval(other, scope).await.map(Some),
			}
		})
	}

	async fn eval_link(&self, expr: &Expr, scope: &Arc<Scope>) -> Result<Option<Value>, Thrown> {
		match expr {
			Expr::Member { .. } | Expr::Call { .. } => self.eval_chain(expr, scope).await,
			other => self.eval(other, scope).await.map(Some),
		}
	}

	async fn property_key(&self, property: &Property, scope: &Arc<Scope>) -> Result<String, Thrown> {
		Ok(match property {
			Property::Named(name) => name.clone(),
			Property::Computed(expr) => self.eval(expr, scope).await?.to_display(),
		})
	}

	async fn assign(
		&self,
		target: &Expr,
		op: Option<BinaryOp>,
		value: &Expr,
		scope: &Arc<Scope>,
	) -> Result<Value, Thrown> {
		match target {
			Expr::Ident(name) => {
				let mut value = self.eval(value, scope).await?;

				if let Some(op) = op {
					let current = scope
						.lookup(name)
						.ok_or_else(|| Value::reference_error(format!("{name} is not defined")))?;

					value = binary(op, &current, &value);
				}

				scope.assign(name, value.clone())?;

				Ok(value)
			},
			Expr::Member { object, property, .. } => {
				let object = self.eval(object, scope).await?;
				let key = self.property_key(property, scope).await?;
				let mut value = self.eval(value, scope).await?;

				if let Some(op) = op {
					value = binary(op, &object.get(&key)?, &value);
				}

				object.set(&key, value.clone())?;

				Ok(value)
			},
			_ => Err(Value::error("SyntaxError", "Invalid left-hand side in assignment")),
		}
	}

	async fn call(&self, native: &Native, args: Vec<Value>) -> Result<Value, Thrown> {
		Ok(match native {
			Native::Console(level, _) => {
				let text = args.iter().map(Value::render).collect::<Vec<_>>().join(" ");

				(self.emit)(OutputLine { level: *level, text });

				Value::Undefined
			},
			Native::Fetch => {
				let resource = args.first().cloned().unwrap_or(Value::Undefined);

				match self.fetch.fetch(&resource, args.get(1)).await {
					Ok(response) => Value::resolved(response),
					Err(reason) => Value::rejected(reason),
				}
			},
			Native::ResponseJson(body) => fetch::read_json(body),
			Native::ResponseText(body) => fetch::read_text(body),
		})
	}
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
	let numeric = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));

	match op {
		BinaryOp::Add =>
			if is_stringy(left) || is_stringy(right) {
				Value::Str(left.to_display() + &right.to_display())
			} else {
				numeric(|a, b| a + b)
			},
		BinaryOp::Sub => numeric(|a, b| a - b),
		BinaryOp::Mul => numeric(|a, b| a * b),
		BinaryOp::Div => numeric(|a, b| a / b),
		BinaryOp::Rem => numeric(|a, b| a % b),
		BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
		BinaryOp::StrictNe => Value::Bool(!left.strict_eq(right)),
		BinaryOp::LooseEq => Value::Bool(left.loose_eq(right)),
		BinaryOp::LooseNe => Value::Bool(!left.loose_eq(right)),
		BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
			let ordering = match (left, right) {
				(Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
				_ => left.to_number().partial_cmp(&right.to_number()),
			};

			Value::Bool(ordering.is_some_and(|ordering| match op {
				BinaryOp::Lt => ordering.is_lt(),
				BinaryOp::Le => ordering.is_le(),
				BinaryOp::Gt => ordering.is_gt(),
				_ => ordering.is_ge(),
			}))
		},
	}
}

// Operands that `+` turns into string concatenation.
fn is_stringy(value: &Value) -> bool {
	!matches!(value, Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_))
}

fn describe(expr: &Expr) -> String {
	match expr {
		Expr::Ident(name) => name.clone(),
		Expr::Member { object, property: Property::Named(name), .. } =>
			format!("{}.{name}", describe(object)),
		Expr::Member { object, .. } => format!("{}[...]", describe(object)),
		Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
		_ => "expression".into(),
	}
}
