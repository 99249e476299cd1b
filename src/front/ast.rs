//! The typed-ish AST produced by the parser and walked by the IL generator.
//!
//! Expression nodes carry a cached lvalue computation (per DESIGN NOTES
//! "LValue caching" in SPEC_FULL.md): `*f() += 1` must call `f` only once,
//! so `lvalue()` is idempotent and memoized on the node itself.

use std::cell::OnceCell;

use crate::common::Id;
use crate::diagnostics::Range;
use crate::middle::lower::LValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    LShift,
    RShift,
    BitAnd,
    BitOr,
    BitXor,
    LogAnd,
    LogOr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompoundOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncDecForm {
    Prefix,
    Postfix,
}

/// A type specification, as written by the user: a base type keyword plus
/// a chain of declarator layers to be reversed per `front::decl_tree`.
#[derive(Clone, Debug)]
pub struct TypeName {
    pub range: Range,
    pub specs: Vec<crate::front::decl_tree::TypeSpec>,
    pub decl: crate::front::decl_tree::Node,
}

#[derive(Debug)]
pub struct Expr {
    pub range: Range,
    pub kind: ExprKind,
    pub(crate) lvalue_cache: OnceCell<Option<LValue>>,
}

impl Expr {
    pub fn new(range: Range, kind: ExprKind) -> Expr {
        Expr { range, kind, lvalue_cache: OnceCell::new() }
    }
}

#[derive(Debug)]
pub enum ExprKind {
    /// An integer literal. The parser/lexer already picked the narrowest
    /// representable type of {int, long}; out-of-range literals are a lex
    /// error raised at token-scan time.
    IntLiteral(i64),
    StringLiteral(Vec<u8>),
    Var(Id),
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    BitNot(Box<Expr>),
    Addr(Box<Expr>),
    Deref(Box<Expr>),
    Assign { lhs: Box<Expr>, rhs: Box<Expr> },
    CompoundAssign { op: CompoundOp, lhs: Box<Expr>, rhs: Box<Expr> },
    IncDec { op: IncDecOp, form: IncDecForm, target: Box<Expr> },
    Subscript { arr: Box<Expr>, index: Box<Expr> },
    Member { base: Box<Expr>, name: Id, arrow: bool },
    Call { func: Box<Expr>, args: Vec<Expr> },
    Sizeof(Box<Expr>),
    SizeofType(TypeName),
    Cast { to: TypeName, arg: Box<Expr> },
}

#[derive(Debug)]
pub struct Stmt {
    pub range: Range,
    pub kind: StmtKind,
}

#[derive(Debug)]
pub enum StmtKind {
    Expr(Expr),
    Decl(Declaration),
    Return(Option<Expr>),
    If { cond: Expr, then_branch: Vec<Stmt>, else_branch: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, step: Option<Expr>, body: Vec<Stmt> },
    Break,
    Continue,
    Compound(Vec<Stmt>),
    /// A bare `struct Foo;` tag declaration with no members and no
    /// declarators, permitted to re-declare an existing tag.
    StructTagOnly { tag: Id },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageClass {
    Auto,
    Static,
    Extern,
}

#[derive(Debug)]
pub struct Declarator {
    pub range: Range,
    pub name: Id,
    pub decl: crate::front::decl_tree::Node,
    pub init: Option<Expr>,
}

#[derive(Debug)]
pub struct Declaration {
    pub range: Range,
    pub storage: StorageClass,
    pub specs: Vec<crate::front::decl_tree::TypeSpec>,
    pub declarators: Vec<Declarator>,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub range: Range,
    pub name: Id,
    pub specs: Vec<crate::front::decl_tree::TypeSpec>,
    pub decl: crate::front::decl_tree::Node,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub enum ExternalDecl {
    Function(FunctionDef),
    Declaration(Declaration),
}

#[derive(Debug)]
pub struct Program {
    pub decls: Vec<ExternalDecl>,
}
