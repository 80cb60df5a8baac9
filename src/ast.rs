//! Syntax-tree node types accepted by the evaluator.
//!
//! The crate does not build these from text; a parser (or a test helper)
//! constructs them directly. Child nodes are `Rc`-shared so the evaluator
//! can hold onto subtrees without cloning them, and so a return expression
//! can be rewritten into its selected branch cheaply.
//!
//! Several variants exist only so the evaluator can reject them with a
//! precise "not supported" diagnostic instead of failing to represent the
//! input at all: arrays, objects, member access, assignment, `new`, loops,
//! `break`/`continue` and imports.

use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// A 1-based source position. `UNKNOWN_LOCATION` tags synthesized nodes
/// and failures raised outside any source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Loc {
    pub line: usize,
    pub column: usize,
}

pub const UNKNOWN_LOCATION: Loc = Loc { line: 0, column: 0 };

impl Loc {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}", self.line)
    }
}

/// A literal value carried directly by the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
}

/// A static type annotation as written in the source.
///
/// Only the primitive keywords, named references and function shapes are
/// supported by the language; the remaining variants are carried so the
/// type checker can name the construct it rejects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeAnnotation {
    Boolean,
    Number,
    String,
    Undefined,

    Function {
        type_params: Vec<String>,
        params: Vec<Param>,
        return_type: Option<Box<TypeAnnotation>>,
    },

    /// A reference to a named type: a type parameter or a bound alias.
    Name(String),

    // Rejected by `rttc::convert_to_runtime_type`.
    Any,
    Void,
    Null,
    Never,
    BigInt,
    Symbol,
    Object,
    Array(Box<TypeAnnotation>),
    Union(Vec<TypeAnnotation>),
    LiteralType(Literal),
}

/// A named binding position with an optional annotation: a function
/// parameter or the identifier of a variable declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub annotation: Option<TypeAnnotation>,
    pub loc: Loc,
}

impl Param {
    pub fn new(name: impl Into<String>, annotation: Option<TypeAnnotation>, loc: Loc) -> Self {
        Self {
            name: name.into(),
            annotation,
            loc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicalOp {
    And,
    Or,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
        }
    }
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "===",
            BinaryOp::NotEq => "!==",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
        }
    }
}

impl LogicalOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            LogicalOp::And => "&&",
            LogicalOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum Expr {
    Literal {
        value: Literal,
        loc: Loc,
    },

    Identifier {
        name: String,
        loc: Loc,
    },

    Unary {
        op: UnaryOp,
        argument: Rc<Expr>,
        loc: Loc,
    },

    Binary {
        op: BinaryOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
        loc: Loc,
    },

    Logical {
        op: LogicalOp,
        left: Rc<Expr>,
        right: Rc<Expr>,
        loc: Loc,
    },

    /// Ternary conditional. Shares its evaluation rule with `Stmt::If`.
    Conditional {
        test: Rc<Expr>,
        consequent: Rc<Expr>,
        alternate: Rc<Expr>,
        loc: Loc,
    },

    Call {
        callee: Rc<Expr>,
        arguments: Vec<Rc<Expr>>,
        /// Explicit type arguments at the call site, e.g. `f<number>(1)`.
        type_args: Option<Vec<TypeAnnotation>>,
        loc: Loc,
    },

    /// Function expression or arrow function.
    Function(Rc<Function>),

    // Constructs carried only so evaluation can reject them by name.
    Array {
        elements: Vec<Rc<Expr>>,
        loc: Loc,
    },
    Object {
        loc: Loc,
    },
    Member {
        object: Rc<Expr>,
        property: String,
        loc: Loc,
    },
    Assignment {
        target: String,
        value: Rc<Expr>,
        loc: Loc,
    },
    New {
        callee: Rc<Expr>,
        arguments: Vec<Rc<Expr>>,
        loc: Loc,
    },
}

impl Expr {
    pub fn loc(&self) -> Loc {
        match self {
            Expr::Literal { loc, .. }
            | Expr::Identifier { loc, .. }
            | Expr::Unary { loc, .. }
            | Expr::Binary { loc, .. }
            | Expr::Logical { loc, .. }
            | Expr::Conditional { loc, .. }
            | Expr::Call { loc, .. }
            | Expr::Array { loc, .. }
            | Expr::Object { loc }
            | Expr::Member { loc, .. }
            | Expr::Assignment { loc, .. }
            | Expr::New { loc, .. } => *loc,

            Expr::Function(function) => function.loc,
        }
    }
}

/// A function definition: declaration, expression or arrow.
///
/// Parameters carry optional annotations (the type checker requires them
/// at declaration time), `type_params` holds the names of declared type
/// parameters, and an arrow function may use an expression body.
#[derive(Debug, Clone, Serialize)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub type_params: Vec<String>,
    pub return_type: Option<TypeAnnotation>,
    pub body: FunctionBody,
    pub arrow: bool,
    pub loc: Loc,
}

#[derive(Debug, Clone, Serialize)]
pub enum FunctionBody {
    Block(Rc<Block>),
    Expression(Rc<Expr>),
}

#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub statements: Vec<Rc<Stmt>>,
    pub loc: Loc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeclKind {
    Const,
    Let,
    Var,
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclKind::Const => write!(f, "const"),
            DeclKind::Let => write!(f, "let"),
            DeclKind::Var => write!(f, "var"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum Stmt {
    Expression {
        expression: Rc<Expr>,
        loc: Loc,
    },

    /// Single-binding variable declaration. Only `const` with an
    /// initializer survives evaluation; the rest are rejected.
    Declaration {
        kind: DeclKind,
        id: Param,
        init: Option<Rc<Expr>>,
        loc: Loc,
    },

    FunctionDeclaration(Rc<Function>),

    Return {
        argument: Option<Rc<Expr>>,
        loc: Loc,
    },

    If {
        test: Rc<Expr>,
        consequent: Rc<Stmt>,
        alternate: Option<Rc<Stmt>>,
        loc: Loc,
    },

    Block(Rc<Block>),

    /// Accepted as a no-op suspension point.
    Debugger {
        loc: Loc,
    },

    // Constructs carried only so evaluation can reject them by name.
    While {
        test: Rc<Expr>,
        body: Rc<Stmt>,
        loc: Loc,
    },
    For {
        loc: Loc,
    },
    Break {
        loc: Loc,
    },
    Continue {
        loc: Loc,
    },
    Import {
        loc: Loc,
    },
}

impl Stmt {
    pub fn loc(&self) -> Loc {
        match self {
            Stmt::Expression { loc, .. }
            | Stmt::Declaration { loc, .. }
            | Stmt::Return { loc, .. }
            | Stmt::If { loc, .. }
            | Stmt::Debugger { loc }
            | Stmt::While { loc, .. }
            | Stmt::For { loc }
            | Stmt::Break { loc }
            | Stmt::Continue { loc }
            | Stmt::Import { loc } => *loc,

            Stmt::FunctionDeclaration(function) => function.loc,

            Stmt::Block(block) => block.loc,
        }
    }
}

/// A whole program: a block whose environment outlives the run, so a REPL
/// driver can evaluate successive programs against accumulated bindings.
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub body: Rc<Block>,
}

impl Program {
    pub fn new(statements: Vec<Rc<Stmt>>) -> Self {
        let loc = statements
            .first()
            .map(|stmt| stmt.loc())
            .unwrap_or(UNKNOWN_LOCATION);

        Self {
            body: Rc::new(Block { statements, loc }),
        }
    }
}
