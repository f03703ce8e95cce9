//! The typed abstract syntax tree.
//!
//! Every expression node carries a mutable type slot (`ty`) pointing into the
//! [`TypeArena`](crate::types::TypeArena) and a source [`Span`]. The tree is
//! produced by an external parser front-end and progressively annotated by
//! the inference passes; two node kinds are inserted by the compiler itself:
//!
//! - [`ExprKind::Coerce`]: a numeric conversion wrapped around an operand
//!   after arithmetic coercion
//! - [`ExprKind::Quote`]: a live host value embedded into kernel code by the
//!   stitching driver

use crate::host::HostValue;
use crate::span::Span;
use crate::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Invert,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    MatMult,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOpKind {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOpKind {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: TypeId, span: Span) -> Self {
        Self { kind, ty, span }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    LitInt(i64),
    LitFloat(f64),
    LitStr(String),
    LitBool(bool),
    LitNone,
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Attribute {
        value: Box<Expr>,
        attr: String,
        attr_span: Span,
    },
    Subscript {
        value: Box<Expr>,
        index: IndexKind,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    UnaryOp {
        op: UnaryOpKind,
        operand: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOpKind,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOpKind,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<CompareOpKind>,
        comparators: Vec<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        args: Arguments,
        body: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    /// Numeric conversion of `value` to this node's `ty`. Inserted by the
    /// coercion pass; never produced by the parser.
    Coerce { value: Box<Expr> },
    /// A live host value embedded into the tree by the stitching driver.
    Quote { value: HostValue },
}

#[derive(Debug, Clone)]
pub enum IndexKind {
    Index(Box<Expr>),
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone)]
pub struct Keyword {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

/// Parameter list of a function definition or lambda. Defaults align with
/// the tail of `args`: the last `defaults.len()` parameters are optional.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub args: Vec<Param>,
    pub defaults: Vec<Expr>,
}

impl Arguments {
    pub fn required_count(&self) -> usize {
        self.args.len() - self.defaults.len()
    }

    /// Required parameters, then optional parameters paired with defaults.
    pub fn split(&self) -> (&[Param], impl Iterator<Item = (&Param, &Expr)>) {
        let required = self.required_count();
        let optional = self.args[required..].iter().zip(self.defaults.iter());
        (&self.args[..required], optional)
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
    pub span: Span,
}

/// One `for target in iter` clause of a comprehension, with its filters.
#[derive(Debug, Clone)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOpKind,
        value: Expr,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    FunctionDef(FunctionDef),
    Raise {
        exc: Option<Expr>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Stmt>,
    },
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
    Pass,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub args: Arguments,
    pub body: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    /// Return type slot of the signature, distinct from `ty` which holds the
    /// function type the name is bound to.
    pub return_ty: TypeId,
    pub ty: TypeId,
    pub name_span: Span,
}

#[derive(Debug, Clone)]
pub struct ExceptHandler {
    /// Exception constructor expression, absent for a bare `except:`.
    pub filter: Option<Expr>,
    pub name: Option<String>,
    pub name_ty: TypeId,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct WithItem {
    pub context: Expr,
    pub var: Option<Expr>,
    pub span: Span,
}

/// Final product of stitching: the accumulated typed definitions plus the
/// global environment they were typed against.
#[derive(Debug, Clone)]
pub struct Module {
    pub body: Vec<Stmt>,
    pub globals: crate::env::Environment,
}
