//! Recursive-descent parser producing [`Stmt`] trees.

// self
use crate::sandbox::{
	SandboxError,
	ast::{BinaryOp, DeclKind, Expr, LogicalOp, Property, Stmt, TemplatePart, UnaryOp},
	lexer::{self, Spanned, TemplateChunk, Token},
};

const MAX_DEPTH: usize = 64;
static EOF: Token = Token::Eof;
const RESERVED: &[&str] = &[
	"await", "catch", "const", "else", "false", "finally", "for", "if", "let", "new", "null",
	"throw", "true", "try", "typeof", "undefined", "var",
];

pub(crate) fn parse_program(source: &str) -> Result<Vec<Stmt>, SandboxError> {
	let mut parser = Parser::new(lexer::tokenize(source)?, 0);
	let mut program = Vec::new();

	while !parser.at_eof() {
		program.push(parser.statement()?);
	}

	Ok(program)
}

struct Parser {
	tokens: Vec<Spanned>,
	pos: usize,
	depth: usize,
}
impl Parser {
	fn new(tokens: Vec<Spanned>, depth: usize) -> Self {
		Self { tokens, pos: 0, depth }
	}

	fn peek(&self) -> &Token {
		self.peek_at(0)
	}

	fn peek_at(&self, offset: usize) -> &Token {
		self.tokens
			.get(self.pos + offset)
			.or_else(|| self.tokens.last())
			.map(|spanned| &spanned.token)
			.unwrap_or(&EOF)
	}

	fn line(&self) -> usize {
		self.tokens.get(self.pos).or_else(|| self.tokens.last()).map_or(1, |spanned| spanned.line)
	}

	fn advance(&mut self) -> Token {
		let token = self.peek().clone();

		if self.pos < self.tokens.len() {
			self.pos += 1;
		}

		token
	}

	fn at_eof(&self) -> bool {
		matches!(self.peek(), Token::Eof)
	}

	fn is_punct(&self, punct: &str) -> bool {
		matches!(self.peek(), Token::Punct(p) if *p == punct)
	}

	fn is_keyword(&self, keyword: &str) -> bool {
		matches!(self.peek(), Token::Ident(name) if name == keyword)
	}

	fn eat_punct(&mut self, punct: &str) -> bool {
		let found = self.is_punct(punct);

		if found {
			self.pos += 1;
		}

		found
	}

	fn eat_keyword(&mut self, keyword: &str) -> bool {
		let found = self.is_keyword(keyword);

		if found {
			self.pos += 1;
		}

		found
	}

	fn expect_punct(&mut self, punct: &str) -> Result<(), SandboxError> {
		if self.eat_punct(punct) { Ok(()) } else { Err(self.unexpected()) }
	}

	fn unexpected(&self) -> SandboxError {
		let message = match self.peek() {
			Token::Eof => "Unexpected end of input".to_owned(),
			Token::Number(n) => format!("Unexpected number `{n}`"),
			Token::Str(_) | Token::Template(_) => "Unexpected string".to_owned(),
			Token::Ident(name) => format!("Unexpected token `{name}`"),
			Token::Punct(p) => format!("Unexpected token `{p}`"),
		};

		SandboxError::Syntax { line: self.line(), message }
	}

	fn binding_name(&mut self) -> Result<String, SandboxError> {
		match self.peek() {
			Token::Ident(name) if !RESERVED.contains(&name.as_str()) => {
				let name = name.clone();

				self.pos += 1;

				Ok(name)
			},
			_ => Err(self.unexpected()),
		}
	}

	// Dot-accessed and object-literal keys may be reserved words.
	fn property_name(&mut self) -> Result<String, SandboxError> {
		match self.advance() {
			Token::Ident(name) | Token::Str(name) => Ok(name),
			Token::Number(n) => Ok(crate::sandbox::value::format_number(n)),
			_ => {
				self.pos -= 1;

				Err(self.unexpected())
			},
		}
	}

	fn enter(&mut self) -> Result<(), SandboxError> {
		self.depth += 1;

		if self.depth > MAX_DEPTH {
			return Err(SandboxError::Syntax {
				line: self.line(),
				message: "Snippet is nested too deeply".into(),
			});
		}

		Ok(())
	}

	fn statement(&mut self) -> Result<Stmt, SandboxError> {
		self.enter()?;

		let stmt = self.statement_inner();

		self.depth -= 1;

		stmt
	}

	fn statement_inner(&mut self) -> Result<Stmt, SandboxError> {
		if self.eat_punct(";") {
			return Ok(Stmt::Empty);
		}
		if self.is_punct("{") {
			return Ok(Stmt::Block(self.block()?));
		}
		if let Some(kind) = self.decl_kind() {
			let mut declarators = Vec::new();

			loop {
				let name = self.binding_name()?;
				let init = if self.eat_punct("=") { Some(self.expression()?) } else { None };

				if kind == DeclKind::Const && init.is_none() {
					return Err(SandboxError::Syntax {
						line: self.line(),
						message: "Missing initializer in const declaration".into(),
					});
				}

				declarators.push((name, init));

				if !self.eat_punct(",") {
					break;
				}
			}

			self.eat_punct(";");

			return Ok(Stmt::Decl { kind, declarators });
		}
		if self.eat_keyword("if") {
			self.expect_punct("(")?;

			let test = self.expression()?;

			self.expect_punct(")")?;

			let then = Box::new(self.statement()?);
			let otherwise =
				if self.eat_keyword("else") { Some(Box::new(self.statement()?)) } else { None };

			return Ok(Stmt::If { test, then, otherwise });
		}
		if self.eat_keyword("throw") {
			let value = self.expression()?;

			self.eat_punct(";");

			return Ok(Stmt::Throw(value));
		}
		if self.eat_keyword("try") {
			let body = self.block()?;
			let (param, handler) = if self.eat_keyword("catch") {
				let param = if self.eat_punct("(") {
					let name = self.binding_name()?;

					self.expect_punct(")")?;

					Some(name)
				} else {
					None
				};

				(param, Some(self.block()?))
			} else {
				(None, None)
			};
			let finalizer = if self.eat_keyword("finally") { Some(self.block()?) } else { None };

			if handler.is_none() && finalizer.is_none() {
				return Err(SandboxError::Syntax {
					line: self.line(),
					message: "Missing catch or finally after try".into(),
				});
			}

			return Ok(Stmt::Try { body, param, handler, finalizer });
		}
		if self.eat_keyword("for") {
			self.expect_punct("(")?;

			let kind = self.decl_kind().ok_or_else(|| self.unexpected())?;
			let name = self.binding_name()?;

			if !self.eat_keyword("of") {
				return Err(self.unexpected());
			}

			let iterable = self.expression()?;

			self.expect_punct(")")?;

			return Ok(Stmt::ForOf { kind, name, iterable, body: Box::new(self.statement()?) });
		}

		let expr = self.expression()?;

		self.eat_punct(";");

		Ok(Stmt::Expr(expr))
	}

	fn decl_kind(&mut self) -> Option<DeclKind> {
		let kind = match self.peek() {
			Token::Ident(name) if name == "let" => DeclKind::Let,
			Token::Ident(name) if name == "const" => DeclKind::Const,
			Token::Ident(name) if name == "var" => DeclKind::Var,
			_ => return None,
		};

		self.pos += 1;

		Some(kind)
	}

	fn block(&mut self) -> Result<Vec<Stmt>, SandboxError> {
		self.expect_punct("{")?;

		let mut body = Vec::new();

		while !self.eat_punct("}") {
			if self.at_eof() {
				return Err(self.unexpected());
			}

			body.push(self.statement()?);
		}

		Ok(body)
	}

	fn expression(&mut self) -> Result<Expr, SandboxError> {
		let target = self.conditional()?;
		let op = match self.peek() {
			Token::Punct("=") => None,
			Token::Punct("+=") => Some(BinaryOp::Add),
			Token::Punct("-=") => Some(BinaryOp::Sub),
			Token::Punct("*=") => Some(BinaryOp::Mul),
			Token::Punct("/=") => Some(BinaryOp::Div),
			_ => return Ok(target),
		};

		if !matches!(target, Expr::Ident(_) | Expr::Member { optional: false, .. }) {
			return Err(SandboxError::Syntax {
				line: self.line(),
				message: "Invalid left-hand side in assignment".into(),
			});
		}

		self.pos += 1;

		let value = self.expression()?;

		Ok(Expr::Assign { target: Box::new(target), op, value: Box::new(value) })
	}

	fn conditional(&mut self) -> Result<Expr, SandboxError> {
		let test = self.logical_or()?;

		if !self.eat_punct("?") {
			return Ok(test);
		}

		let then = self.expression()?;

		self.expect_punct(":")?;

		let otherwise = self.expression()?;

		Ok(Expr::Conditional {
			test: Box::new(test),
			then: Box::new(then),
			otherwise: Box::new(otherwise),
		})
	}

	fn logical_or(&mut self) -> Result<Expr, SandboxError> {
		let mut left = self.logical_and()?;

		loop {
			let op = if self.eat_punct("||") {
				LogicalOp::Or
			} else if self.eat_punct("??") {
				LogicalOp::Nullish
			} else {
				return Ok(left);
			};
			let right = self.logical_and()?;

			left = Expr::Logical { op, left: Box::new(left), right: Box::new(right) };
		}
	}

	fn logical_and(&mut self) -> Result<Expr, SandboxError> {
		let mut left = self.binary(1)?;

		while self.eat_punct("&&") {
			let right = self.binary(1)?;

			left = Expr::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) };
		}

		Ok(left)
	}

	fn binary(&mut self, min_precedence: u8) -> Result<Expr, SandboxError> {
		let mut left = self.unary()?;

		loop {
			let op = match self.peek() {
				Token::Punct(p) => BinaryOp::from_punct(p),
				_ => None,
			};
			let Some(op) = op.filter(|op| op.precedence() >= min_precedence) else {
				return Ok(left);
			};

			self.pos += 1;

			let right = self.binary(op.precedence() + 1)?;

			left = Expr::Binary { op, left: Box::new(left), right: Box::new(right) };
		}
	}

	fn unary(&mut self) -> Result<Expr, SandboxError> {
		self.enter()?;

		let expr = self.unary_inner();

		self.depth -= 1;

		expr
	}

	fn unary_inner(&mut self) -> Result<Expr, SandboxError> {
		let op = match self.peek() {
			Token::Punct("!") => Some(UnaryOp::Not),
			Token::Punct("-") => Some(UnaryOp::Neg),
			Token::Punct("+") => Some(UnaryOp::Plus),
			Token::Ident(name) if name == "typeof" => Some(UnaryOp::TypeOf),
			Token::Ident(name) if name == "await" => {
				self.pos += 1;

				return Ok(Expr::Await(Box::new(self.unary()?)));
			},
			_ => None,
		};

		match op {
			Some(op) => {
				self.pos += 1;

				Ok(Expr::Unary { op, operand: Box::new(self.unary()?) })
			},
			None => self.postfix(),
		}
	}

	fn postfix(&mut self) -> Result<Expr, SandboxError> {
		let mut expr = self.primary()?;

		loop {
			if self.eat_punct(".") {
				let property = Property::Named(self.property_name()?);

				expr = Expr::Member { object: Box::new(expr), property, optional: false };
			} else if self.eat_punct("?.") {
				let property = if self.eat_punct("[") {
					let index = self.expression()?;

					self.expect_punct("]")?;

					Property::Computed(Box::new(index))
				} else {
					Property::Named(self.property_name()?)
				};

				expr = Expr::Member { object: Box::new(expr), property, optional: true };
			} else if self.eat_punct("[") {
				let index = self.expression()?;

				self.expect_punct("]")?;

				expr = Expr::Member {
					object: Box::new(expr),
					property: Property::Computed(Box::new(index)),
					optional: false,
				};
			} else if self.is_punct("(") {
				let args = self.arguments()?;

				expr = Expr::Call { callee: Box::new(expr), args };
			} else {
				return Ok(expr);
			}
		}
	}

	fn arguments(&mut self) -> Result<Vec<Expr>, SandboxError> {
		self.expect_punct("(")?;

		let mut args = Vec::new();

		while !self.eat_punct(")") {
			args.push(self.expression()?);

			if !self.eat_punct(",") {
				self.expect_punct(")")?;

				break;
			}
		}

		Ok(args)
	}

	fn primary(&mut self) -> Result<Expr, SandboxError> {
		let line = self.line();

		match self.advance() {
			Token::Number(n) => Ok(Expr::Number(n)),
			Token::Str(s) => Ok(Expr::Str(s)),
			Token::Template(chunks) => self.template(chunks, line),
			Token::Punct("(") => {
				let expr = self.expression()?;

				self.expect_punct(")")?;

				Ok(expr)
			},
			Token::Punct("[") => {
				let mut items = Vec::new();

				while !self.eat_punct("]") {
					items.push(self.expression()?);

					if !self.eat_punct(",") {
						self.expect_punct("]")?;

						break;
					}
				}

				Ok(Expr::Array(items))
			},
			Token::Punct("{") => self.object(),
			Token::Ident(name) => match name.as_str() {
				"true" => Ok(Expr::Bool(true)),
				"false" => Ok(Expr::Bool(false)),
				"null" => Ok(Expr::Null),
				"undefined" => Ok(Expr::Undefined),
				"new" => {
					let name = self.binding_name()?;
					let args = if self.is_punct("(") { self.arguments()? } else { Vec::new() };

					Ok(Expr::NewError { name, args })
				},
				other if RESERVED.contains(&other) => {
					self.pos -= 1;

					Err(self.unexpected())
				},
				_ => Ok(Expr::Ident(name)),
			},
			_ => {
				self.pos -= 1;

				Err(self.unexpected())
			},
		}
	}

	fn object(&mut self) -> Result<Expr, SandboxError> {
		let mut props = Vec::new();

		while !self.eat_punct("}") {
			let shorthand = matches!(self.peek(), Token::Ident(_))
				&& matches!(self.peek_at(1), Token::Punct("," | "}"));
			let key = self.property_name()?;
			let value = if shorthand {
				if RESERVED.contains(&key.as_str()) {
					self.pos -= 1;

					return Err(self.unexpected());
				}

				Expr::Ident(key.clone())
			} else {
				self.expect_punct(":")?;
				self.expression()?
			};

			props.push((key, value));

			if !self.eat_punct(",") {
				self.expect_punct("}")?;

				break;
			}
		}

		Ok(Expr::Object(props))
	}

	fn template(&mut self, chunks: Vec<TemplateChunk>, line: usize) -> Result<Expr, SandboxError> {
		let mut parts = Vec::with_capacity(chunks.len());

		for chunk in chunks {
			match chunk {
				TemplateChunk::Text(text) => parts.push(TemplatePart::Text(text)),
				TemplateChunk::Source(source) => {
					let tokens = lexer::tokenize(&source).map_err(|e| e.at_line(line))?;
					let mut inner = Parser::new(tokens, self.depth);
					let expr = inner.expression().map_err(|e| e.at_line(line))?;

					if !inner.at_eof() {
						return Err(inner.unexpected().at_line(line));
					}

					parts.push(TemplatePart::Expr(expr));
				},
			}
		}

		Ok(Expr::Template(parts))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn expr(source: &str) -> Expr {
		match parse_program(source).expect("Source should parse.").remove(0) {
			Stmt::Expr(expr) => expr,
			other => panic!("Expected an expression statement, got {other:?}."),
		}
	}

	#[test]
	fn precedence_follows_javascript() {
		let Expr::Binary { op: BinaryOp::Add, right, .. } = expr("1 + 2 * 3") else {
			panic!("Addition should be the root.");
		};

		assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
		assert!(matches!(expr("a || b && c"), Expr::Logical { op: LogicalOp::Or, .. }));
		assert!(matches!(expr("await fetch(url)"), Expr::Await(_)));
	}

	#[test]
	fn statements_parse_without_semicolons() {
		let program = parse_program(
			"const res = await fetch('https://api.test', { headers })\n\
			 if (!res.ok) throw new Error(`HTTP ${res.status}`)\n\
			 for (const item of await res.json()) { console.log(item.name) }",
		)
		.expect("Snippet should parse.");

		assert_eq!(program.len(), 3);
		assert!(matches!(program[0], Stmt::Decl { kind: DeclKind::Const, .. }));
		assert!(matches!(program[1], Stmt::If { .. }));
		assert!(matches!(program[2], Stmt::ForOf { .. }));
	}

	#[test]
	fn object_literals_support_shorthand_and_keyword_keys() {
		let Expr::Object(props) = expr("({ headers, if: 1, 'x-y': 2 })") else {
			panic!("Expected an object literal.");
		};

		assert_eq!(props[0], ("headers".into(), Expr::Ident("headers".into())));
		assert_eq!(props[1].0, "if");
		assert_eq!(props[2].0, "x-y");
	}

	#[test]
	fn malformed_sources_are_syntax_errors() {
		for source in ["let = 1", "const x", "1 = 2", "try { }", "foo(", "let if = 1"] {
			assert!(
				matches!(parse_program(source), Err(SandboxError::Syntax { .. })),
				"`{source}` should be rejected."
			);
		}

		let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));

		assert!(parse_program(&deep).is_err());
	}
}
