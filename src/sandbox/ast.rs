//! Syntax tree for the snippet language.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeclKind {
	Let,
	Const,
	Var,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Stmt {
	Decl { kind: DeclKind, declarators: Vec<(String, Option<Expr>)> },
	Expr(Expr),
	If { test: Expr, then: Box<Stmt>, otherwise: Option<Box<Stmt>> },
	Block(Vec<Stmt>),
	Throw(Expr),
	Try { body: Vec<Stmt>, param: Option<String>, handler: Option<Vec<Stmt>>, finalizer: Option<Vec<Stmt>> },
	ForOf { kind: DeclKind, name: String, iterable: Expr, body: Box<Stmt> },
	Empty,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Expr {
	Number(f64),
	Str(String),
	Template(Vec<TemplatePart>),
	Bool(bool),
	Null,
	Undefined,
	Ident(String),
	Array(Vec<Expr>),
	Object(Vec<(String, Expr)>),
	Member { object: Box<Expr>, property: Property, optional: bool },
	Call { callee: Box<Expr>, args: Vec<Expr> },
	/// `new Error(..)` and friends; the only constructors the language knows.
	NewError { name: String, args: Vec<Expr> },
	Unary { op: UnaryOp, operand: Box<Expr> },
	Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
	Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr> },
	Conditional { test: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
	Assign { target: Box<Expr>, op: Option<BinaryOp>, value: Box<Expr> },
	Await(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TemplatePart {
	Text(String),
	Expr(Expr),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Property {
	Named(String),
	Computed(Box<Expr>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
	Not,
	Neg,
	Plus,
	TypeOf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
	Rem,
	StrictEq,
	StrictNe,
	LooseEq,
	LooseNe,
	Lt,
	Le,
	Gt,
	Ge,
}
impl BinaryOp {
	pub(crate) fn from_punct(punct: &str) -> Option<Self> {
		Some(match punct {
			"+" => Self::Add,
			"-" => Self::Sub,
			"*" => Self::Mul,
			"/" => Self::Div,
			"%" => Self::Rem,
			"===" => Self::StrictEq,
			"!==" => Self::StrictNe,
			"==" => Self::LooseEq,
			"!=" => Self::LooseNe,
			"<" => Self::Lt,
			"<=" => Self::Le,
			">" => Self::Gt,
			">=" => Self::Ge,
			_ => return None,
		})
	}

	/// Binding power; higher binds tighter.
	pub(crate) fn precedence(self) -> u8 {
		match self {
			Self::StrictEq | Self::StrictNe | Self::LooseEq | Self::LooseNe => 1,
			Self::Lt | Self::Le | Self::Gt | Self::Ge => 2,
			Self::Add | Self::Sub => 3,
			Self::Mul | Self::Div | Self::Rem => 4,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LogicalOp {
	And,
	Or,
	Nullish,
}
