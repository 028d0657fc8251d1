//! Tokenizer for the snippet language.

// self
use crate::sandbox::SandboxError;

/// Punctuators, longest first so greedy matching picks `===` over `==`.
const PUNCTUATORS: &[&str] = &[
	"===", "!==", "...", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "+=", "-=", "*=", "/=",
	"{", "}", "(", ")", "[", "]", ";", ",", ".", ":", "?", "+", "-", "*", "/", "%", "<", ">", "=",
	"!",
];

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
	Number(f64),
	Str(String),
	/// Alternating literal text and raw `${}` sources; always starts and ends with text.
	Template(Vec<TemplateChunk>),
	Ident(String),
	Punct(&'static str),
	Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TemplateChunk {
	Text(String),
	Source(String),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Spanned {
	pub(crate) token: Token,
	pub(crate) line: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, SandboxError> {
	Lexer { chars: source.chars().collect(), pos: 0, line: 1 }.run()
}

struct Lexer {
	chars: Vec<char>,
	pos: usize,
	line: usize,
}
impl Lexer {
	fn run(mut self) -> Result<Vec<Spanned>, SandboxError> {
		let mut tokens = Vec::new();

		loop {
			self.skip_trivia()?;

			let line = self.line;
			let Some(c) = self.peek(0) else {
				tokens.push(Spanned { token: Token::Eof, line });

				return Ok(tokens);
			};
			let token = if c.is_ascii_digit() || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) {
				self.number()?
			} else if c == '"' || c == '\'' {
				self.string(c)?
			} else if c == '`' {
				self.template()?
			} else if is_ident_start(c) {
				self.ident()
			} else {
				self.punct()?
			};

			tokens.push(Spanned { token, line });
		}
	}

	fn peek(&self, offset: usize) -> Option<char> {
		self.chars.get(self.pos + offset).copied()
	}

	fn bump(&mut self) -> Option<char> {
		let c = self.peek(0)?;

		self.pos += 1;

		if c == '\n' {
			self.line += 1;
		}

		Some(c)
	}

	fn error(&self, message: impl Into<String>) -> SandboxError {
		SandboxError::Syntax { line: self.line, message: message.into() }
	}

	fn skip_trivia(&mut self) -> Result<(), SandboxError> {
		while let Some(c) = self.peek(0) {
			match (c, self.peek(1)) {
				(c, _) if c.is_whitespace() => {
					self.bump();
				},
				('/', Some('/')) =>
					while self.peek(0).is_some_and(|c| c != '\n') {
						self.bump();
					},
				('/', Some('*')) => {
					self.pos += 2;

					loop {
						match (self.peek(0), self.peek(1)) {
							(Some('*'), Some('/')) => {
								self.pos += 2;

								break;
							},
							(Some(_), _) => {
								self.bump();
							},
							(None, _) => return Err(self.error("Unterminated comment")),
						}
					}
				},
				_ => break,
			}
		}

		Ok(())
	}

	fn number(&mut self) -> Result<Token, SandboxError> {
		let start = self.pos;

		if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x' | 'X')) {
			self.pos += 2;

			let digits_start = self.pos;

			while self.peek(0).is_some_and(|c| c.is_ascii_hexdigit()) {
				self.pos += 1;
			}

			let digits: String = self.chars[digits_start..self.pos].iter().collect();

			return u64::from_str_radix(&digits, 16)
				.map(|n| Token::Number(n as f64))
				.map_err(|_| self.error("Invalid hexadecimal literal"));
		}

		while self.peek(0).is_some_and(|c| c.is_ascii_digit() || c == '.') {
			self.pos += 1;
		}

		if matches!(self.peek(0), Some('e' | 'E')) {
			self.pos += 1;

			if matches!(self.peek(0), Some('+' | '-')) {
				self.pos += 1;
			}

			while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
				self.pos += 1;
			}
		}

		let raw: String = self.chars[start..self.pos].iter().collect();

		raw.parse::<f64>()
			.map(Token::Number)
			.map_err(|_| self.error(format!("Invalid number literal `{raw}`")))
	}

	fn string(&mut self, quote: char) -> Result<Token, SandboxError> {
		self.bump();

		let mut out = String::new();

		loop {
			match self.bump() {
				Some(c) if c == quote => return Ok(Token::Str(out)),
				Some('\\') => out.push(self.escape()?),
				Some('\n') | None => return Err(self.error("Unterminated string literal")),
				Some(c) => out.push(c),
			}
		}
	}

	fn escape(&mut self) -> Result<char, SandboxError> {
		let c = self.bump().ok_or_else(|| self.error("Unterminated escape sequence"))?;

		Ok(match c {
			'n' => '\n',
			't' => '\t',
			'r' => '\r',
			'0' => '\0',
			'b' => '\u{8}',
			'f' => '\u{c}',
			'v' => '\u{b}',
			'u' => {
				let digits: String = (0..4).filter_map(|_| self.bump()).collect();

				u32::from_str_radix(&digits, 16)
					.ok()
					.and_then(char::from_u32)
					.ok_or_else(|| self.error("Invalid Unicode escape sequence"))?
			},
			other => other,
		})
	}

	fn template(&mut self) -> Result<Token, SandboxError> {
		self.bump();

		let mut chunks = Vec::new();
		let mut text = String::new();

		loop {
			match self.bump() {
				Some('`') => {
					chunks.push(TemplateChunk::Text(text));

					return Ok(Token::Template(chunks));
				},
				Some('\\') => text.push(self.escape()?),
				Some('$') if self.peek(0) == Some('{') => {
					self.bump();
					chunks.push(TemplateChunk::Text(std::mem::take(&mut text)));
					chunks.push(TemplateChunk::Source(self.template_source()?));
				},
				Some(c) => text.push(c),
				None => return Err(self.error("Unterminated template literal")),
			}
		}
	}

	// Collects the raw source of one `${}` hole, honoring nested braces and quotes.
	fn template_source(&mut self) -> Result<String, SandboxError> {
		let mut depth = 0_usize;
		let mut out = String::new();
		let mut quote = None;

		loop {
			let c = self.bump().ok_or_else(|| self.error("Unterminated template expression"))?;

			match quote {
				Some(q) => {
					if c == '\\' {
						out.push(c);

						if let Some(next) = self.bump() {
							out.push(next);
						}

						continue;
					}
					if c == q {
						quote = None;
					}
				},
				None => match c {
					'"' | '\'' | '`' => quote = Some(c),
					'{' => depth += 1,
					'}' if depth == 0 => return Ok(out),
					'}' => depth -= 1,
					_ => {},
				},
			}

			out.push(c);
		}
	}

	fn ident(&mut self) -> Token {
		let start = self.pos;

		while self.peek(0).is_some_and(is_ident_continue) {
			self.pos += 1;
		}

		Token::Ident(self.chars[start..self.pos].iter().collect())
	}

	fn punct(&mut self) -> Result<Token, SandboxError> {
		for &punct in PUNCTUATORS {
			let matches = punct.chars().enumerate().all(|(i, c)| self.peek(i) == Some(c));

			// `?.5` is a conditional followed by a number, not optional chaining.
			if matches && !(punct == "?." && self.peek(2).is_some_and(|c| c.is_ascii_digit())) {
				self.pos += punct.len();

				return Ok(Token::Punct(punct));
			}
		}

		let c = self.peek(0).unwrap_or_default();

		Err(self.error(format!("Unexpected character `{c}`")))
	}
}

fn is_ident_start(c: char) -> bool {
	c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
	c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn tokens(source: &str) -> Vec<Token> {
		tokenize(source)
			.expect("Source should tokenize.")
			.into_iter()
			.map(|spanned| spanned.token)
			.collect()
	}

	#[test]
	fn punctuators_match_greedily() {
		assert_eq!(tokens("a === b"), [
			Token::Ident("a".into()),
			Token::Punct("==="),
			Token::Ident("b".into()),
			Token::Eof,
		]);
		assert_eq!(tokens("x?.y")[1], Token::Punct("?."));
		assert_eq!(tokens("x?.5:1")[1], Token::Punct("?"));
	}

	#[test]
	fn literals_and_comments() {
		assert_eq!(tokens("// note\n1.5e1 /* inline */ 'a\\n' 0x1f"), [
			Token::Number(15.),
			Token::Str("a\n".into()),
			Token::Number(31.),
			Token::Eof,
		]);
	}

	#[test]
	fn templates_keep_raw_hole_sources() {
		assert_eq!(tokens("`id ${ {a: 1}.a } done`"), [
			Token::Template(vec![
				TemplateChunk::Text("id ".into()),
				TemplateChunk::Source(" {a: 1}.a ".into()),
				TemplateChunk::Text(" done".into()),
			]),
			Token::Eof,
		]);
	}

	#[test]
	fn errors_carry_line_numbers() {
		let err = tokenize("let a = 1;\nlet b = 'open").expect_err("Unterminated string must fail.");

		assert_eq!(err.to_string(), "SyntaxError: Unterminated string literal (line 2)");
	}
}
