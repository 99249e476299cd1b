//! Recursive-descent parser: turns a token stream into `front::ast::Program`.
//!
//! Declarator parsing follows the C11 threading rule for `type_for` (pointer
//! and array/function declarators are both resolved by substituting the new
//! layer at the `Identifier` leaf of whatever shape the rest of the
//! declarator already built — see `front::decl_tree`'s module doc). `*arr[3]`
//! threads the pointer into the array's `of` position (array of pointers,
//! matching `argv`); `(*arr)[3]` groups the pointer first, so the array
//! threads into the pointer's `to` position instead (pointer to array).

use derive_more::Display;

use super::ast::*;
use super::decl_tree::{Node as DeclNode, TypeSpec};
use super::lex::{Token, TokenContent, TokenKind};
use crate::common::Id;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Range};

#[derive(Display)]
#[display("Parse error: {}", self.message)]
pub struct ParseError {
    pub message: String,
    pub range: Option<Range>,
}

impl std::fmt::Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

impl ParseError {
    fn new(message: impl Into<String>, range: Range) -> Self {
        ParseError { message: message.into(), range: Some(range) }
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::error(DiagnosticKind::Parse, self.message, self.range)
    }
}

/// Walks a declarator shape and replaces its (unique) `Identifier` leaf with
/// `replacement`. `Function.params` is left untouched: each parameter owns
/// an independent declarator relative to its own specs.
fn substitute_leaf(node: DeclNode, replacement: DeclNode) -> DeclNode {
    match node {
        DeclNode::Identifier => replacement,
        DeclNode::Pointer { to, is_const } => {
            DeclNode::Pointer { to: Box::new(substitute_leaf(*to, replacement)), is_const }
        }
        DeclNode::Array { of, n, range } => {
            DeclNode::Array { of: Box::new(substitute_leaf(*of, replacement)), n, range }
        }
        DeclNode::Function { of, params, has_prototype } => {
            DeclNode::Function { of: Box::new(substitute_leaf(*of, replacement)), params, has_prototype }
        }
    }
}

fn is_type_start(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Void
            | TokenKind::Bool
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Signed
            | TokenKind::Unsigned
            | TokenKind::Struct
            | TokenKind::Const
    )
}

/// A cursor over the token slice. Lexing always ends with an `Eof` token, so
/// advancing past the end just parks on it.
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    last_range: Range,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        let last_range = tokens.first().expect("token stream always ends with Eof").range.clone();
        Cursor { tokens, pos: 0, last_range }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn is(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn range(&self) -> Range {
        self.peek().range.clone()
    }

    fn prev_range(&self) -> Range {
        self.last_range.clone()
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        self.last_range = tok.range.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.is(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.is(kind) {
            Ok(self.advance())
        } else {
            Err(self.err(format!("expected {what}, found {}", self.kind())))
        }
    }

    fn advance_ident(&mut self) -> Result<Id, ParseError> {
        let tok = self.expect(TokenKind::Ident, "an identifier")?;
        match tok.content {
            Some(TokenContent::Ident(id)) => Ok(id),
            _ => unreachable!("Ident token always carries TokenContent::Ident"),
        }
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.range())
    }
}

pub fn parse(tokens: &[Token]) -> Result<Program, ParseError> {
    let mut c = Cursor::new(tokens);
    let mut decls = Vec::new();
    while !c.is(TokenKind::Eof) {
        decls.push(parse_external_decl(&mut c)?);
    }
    Ok(Program { decls })
}

// --- Specifiers and declarators -------------------------------------------

fn parse_specs(c: &mut Cursor, allow_storage: bool) -> Result<(Option<StorageClass>, Vec<TypeSpec>), ParseError> {
    let mut storage = None;
    let mut specs = Vec::new();
    loop {
        match c.kind() {
            TokenKind::Auto if allow_storage => {
                c.advance();
                storage = Some(StorageClass::Auto);
            }
            TokenKind::Static if allow_storage => {
                c.advance();
                storage = Some(StorageClass::Static);
            }
            TokenKind::Extern if allow_storage => {
                c.advance();
                storage = Some(StorageClass::Extern);
            }
            TokenKind::Void => {
                c.advance();
                specs.push(TypeSpec::Void);
            }
            TokenKind::Bool => {
                c.advance();
                specs.push(TypeSpec::Bool);
            }
            TokenKind::Char => {
                c.advance();
                specs.push(TypeSpec::Char);
            }
            TokenKind::Short => {
                c.advance();
                specs.push(TypeSpec::Short);
            }
            TokenKind::Int => {
                c.advance();
                specs.push(TypeSpec::Int);
            }
            TokenKind::Long => {
                c.advance();
                specs.push(TypeSpec::Long);
            }
            TokenKind::Signed => {
                c.advance();
                specs.push(TypeSpec::Signed);
            }
            TokenKind::Unsigned => {
                c.advance();
                specs.push(TypeSpec::Unsigned);
            }
            TokenKind::Const => {
                c.advance();
                specs.push(TypeSpec::Const);
            }
            TokenKind::Struct => specs.push(parse_struct_spec(c)?),
            _ => break,
        }
    }
    if specs.is_empty() {
        return Err(c.err(format!("expected a type, found {}", c.kind())));
    }
    Ok((storage, specs))
}

fn parse_struct_spec(c: &mut Cursor) -> Result<TypeSpec, ParseError> {
    c.expect(TokenKind::Struct, "'struct'")?;
    let tag = if c.is(TokenKind::Ident) { Some(c.advance_ident()?) } else { None };
    if !c.eat(TokenKind::LBrace) {
        let tag = tag.ok_or_else(|| c.err("expected a struct tag or '{'"))?;
        return Ok(TypeSpec::StructTag(tag));
    }
    let mut members = Vec::new();
    while !c.is(TokenKind::RBrace) {
        let (_, mspecs) = parse_specs(c, false)?;
        loop {
            let (name, decl) = parse_declarator(c)?;
            let name = name.ok_or_else(|| c.err("struct member must have a name"))?;
            members.push((name, mspecs.clone(), decl));
            if !c.eat(TokenKind::Comma) {
                break;
            }
        }
        c.expect(TokenKind::Semicolon, "';'")?;
    }
    c.expect(TokenKind::RBrace, "'}'")?;
    Ok(TypeSpec::StructDef { tag, members })
}

/// A declarator is a (possibly absent, for abstract declarators) name plus a
/// declarator-tree shape; see the module doc for how the tree is built.
fn parse_declarator(c: &mut Cursor) -> Result<(Option<Id>, DeclNode), ParseError> {
    if c.eat(TokenKind::Star) {
        let mut is_const = false;
        while c.eat(TokenKind::Const) {
            is_const = true;
        }
        let (name, inner) = parse_declarator(c)?;
        let node = substitute_leaf(inner, DeclNode::Pointer { to: Box::new(DeclNode::Identifier), is_const });
        return Ok((name, node));
    }
    parse_direct_declarator_core_and_postfixes(c)
}

fn parse_direct_declarator_core_and_postfixes(c: &mut Cursor) -> Result<(Option<Id>, DeclNode), ParseError> {
    let (name, mut core) = if c.eat(TokenKind::LParen) {
        let (name, inner) = parse_declarator(c)?;
        c.expect(TokenKind::RParen, "')'")?;
        (name, inner)
    } else if c.is(TokenKind::Ident) {
        (Some(c.advance_ident()?), DeclNode::Identifier)
    } else {
        (None, DeclNode::Identifier)
    };

    loop {
        if c.is(TokenKind::LBracket) {
            let start = c.range();
            c.advance();
            let n = if c.is(TokenKind::IntLiteral) {
                let tok = c.advance();
                match tok.content {
                    Some(TokenContent::Int(v)) if v >= 0 => Some(v as u64),
                    _ => return Err(ParseError::new("array size must be a non-negative integer literal", start)),
                }
            } else {
                None
            };
            let range = start.join(&c.range());
            c.expect(TokenKind::RBracket, "']'")?;
            core = substitute_leaf(core, DeclNode::Array { of: Box::new(DeclNode::Identifier), n, range });
        } else if c.is(TokenKind::LParen) {
            c.advance();
            let (params, has_prototype) = parse_parameter_list(c)?;
            c.expect(TokenKind::RParen, "')'")?;
            core = substitute_leaf(core, DeclNode::Function { of: Box::new(DeclNode::Identifier), params, has_prototype });
        } else {
            break;
        }
    }

    Ok((name, core))
}

/// `()` means an unspecified (K&R-style) parameter list; `(void)` means
/// explicitly zero parameters; anything else is a comma-separated list of
/// `specs declarator` pairs, each declarator possibly abstract/unnamed.
fn parse_parameter_list(c: &mut Cursor) -> Result<(Vec<(Vec<TypeSpec>, DeclNode, Option<Id>)>, bool), ParseError> {
    if c.is(TokenKind::RParen) {
        return Ok((Vec::new(), false));
    }
    if c.is(TokenKind::Void) && c.peek_at(1).kind == TokenKind::RParen {
        c.advance();
        return Ok((Vec::new(), true));
    }
    let mut params = Vec::new();
    loop {
        let (_, specs) = parse_specs(c, false)?;
        let (name, decl) = parse_declarator(c)?;
        params.push((specs, decl, name));
        if !c.eat(TokenKind::Comma) {
            break;
        }
    }
    Ok((params, true))
}

fn parse_type_name(c: &mut Cursor) -> Result<TypeName, ParseError> {
    let start = c.range();
    let (_, specs) = parse_specs(c, false)?;
    let (_, decl) = parse_declarator(c)?;
    let range = start.join(&c.prev_range());
    Ok(TypeName { range, specs, decl })
}

fn parse_declarator_list(c: &mut Cursor) -> Result<Vec<Declarator>, ParseError> {
    let mut declarators = Vec::new();
    loop {
        let start = c.range();
        let (name, decl) = parse_declarator(c)?;
        let name = name.ok_or_else(|| c.err("declarator must have a name"))?;
        let init = if c.eat(TokenKind::Assign) { Some(parse_assignment_expr(c)?) } else { None };
        let range = start.join(&c.prev_range());
        declarators.push(Declarator { range, name, decl, init });
        if !c.eat(TokenKind::Comma) {
            break;
        }
    }
    Ok(declarators)
}

// --- Expressions ------------------------------------------------------------
//
// No ternary and no comma operator in this subset, so the chain runs
// directly from assignment down to primary with nothing above or between.

fn parse_left_assoc(
    c: &mut Cursor,
    next: fn(&mut Cursor) -> Result<Expr, ParseError>,
    ops: &[(TokenKind, BinOp)],
) -> Result<Expr, ParseError> {
    let mut lhs = next(c)?;
    loop {
        let Some(&(_, op)) = ops.iter().find(|(k, _)| c.is(*k)) else { break };
        c.advance();
        let rhs = next(c)?;
        let range = lhs.range.join(&rhs.range);
        lhs = Expr::new(range, ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) });
    }
    Ok(lhs)
}

fn parse_expr(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_assignment_expr(c)
}

fn parse_assignment_expr(c: &mut Cursor) -> Result<Expr, ParseError> {
    let lhs = parse_logical_or(c)?;
    if c.eat(TokenKind::Assign) {
        let rhs = parse_assignment_expr(c)?;
        let range = lhs.range.join(&rhs.range);
        return Ok(Expr::new(range, ExprKind::Assign { lhs: Box::new(lhs), rhs: Box::new(rhs) }));
    }
    let op = match c.kind() {
        TokenKind::PlusAssign => Some(CompoundOp::Add),
        TokenKind::MinusAssign => Some(CompoundOp::Sub),
        TokenKind::StarAssign => Some(CompoundOp::Mul),
        TokenKind::SlashAssign => Some(CompoundOp::Div),
        TokenKind::PercentAssign => Some(CompoundOp::Mod),
        _ => None,
    };
    if let Some(op) = op {
        c.advance();
        let rhs = parse_assignment_expr(c)?;
        let range = lhs.range.join(&rhs.range);
        return Ok(Expr::new(range, ExprKind::CompoundAssign { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }));
    }
    Ok(lhs)
}

fn parse_logical_or(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_left_assoc(c, parse_logical_and, &[(TokenKind::PipePipe, BinOp::LogOr)])
}

fn parse_logical_and(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_left_assoc(c, parse_bit_or, &[(TokenKind::AmpAmp, BinOp::LogAnd)])
}

fn parse_bit_or(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_left_assoc(c, parse_bit_xor, &[(TokenKind::Pipe, BinOp::BitOr)])
}

fn parse_bit_xor(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_left_assoc(c, parse_bit_and, &[(TokenKind::Caret, BinOp::BitXor)])
}

fn parse_bit_and(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_left_assoc(c, parse_equality, &[(TokenKind::Amp, BinOp::BitAnd)])
}

fn parse_equality(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_left_assoc(c, parse_relational, &[(TokenKind::EqEq, BinOp::Eq), (TokenKind::NotEq, BinOp::Ne)])
}

fn parse_relational(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_left_assoc(
        c,
        parse_shift,
        &[
            (TokenKind::Lt, BinOp::Lt),
            (TokenKind::Gt, BinOp::Gt),
            (TokenKind::LtEq, BinOp::Le),
            (TokenKind::GtEq, BinOp::Ge),
        ],
    )
}

fn parse_shift(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_left_assoc(c, parse_additive, &[(TokenKind::LShift, BinOp::LShift), (TokenKind::RShift, BinOp::RShift)])
}

fn parse_additive(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_left_assoc(c, parse_multiplicative, &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)])
}

fn parse_multiplicative(c: &mut Cursor) -> Result<Expr, ParseError> {
    parse_left_assoc(
        c,
        parse_cast,
        &[(TokenKind::Star, BinOp::Mul), (TokenKind::Slash, BinOp::Div), (TokenKind::Percent, BinOp::Mod)],
    )
}

fn parse_cast(c: &mut Cursor) -> Result<Expr, ParseError> {
    if c.is(TokenKind::LParen) && is_type_start(c.peek_at(1).kind) {
        let start = c.range();
        c.advance();
        let to = parse_type_name(c)?;
        c.expect(TokenKind::RParen, "')'")?;
        let arg = parse_cast(c)?;
        let range = start.join(&arg.range);
        return Ok(Expr::new(range, ExprKind::Cast { to, arg: Box::new(arg) }));
    }
    parse_unary(c)
}

fn parse_unary(c: &mut Cursor) -> Result<Expr, ParseError> {
    let start = c.range();
    match c.kind() {
        TokenKind::Bang => {
            c.advance();
            let e = parse_cast(c)?;
            Ok(Expr::new(start.join(&e.range), ExprKind::Not(Box::new(e))))
        }
        TokenKind::Minus => {
            c.advance();
            let e = parse_cast(c)?;
            Ok(Expr::new(start.join(&e.range), ExprKind::Neg(Box::new(e))))
        }
        TokenKind::Plus => {
            c.advance();
            parse_cast(c)
        }
        TokenKind::Tilde => {
            c.advance();
            let e = parse_cast(c)?;
            Ok(Expr::new(start.join(&e.range), ExprKind::BitNot(Box::new(e))))
        }
        TokenKind::Amp => {
            c.advance();
            let e = parse_cast(c)?;
            Ok(Expr::new(start.join(&e.range), ExprKind::Addr(Box::new(e))))
        }
        TokenKind::Star => {
            c.advance();
            let e = parse_cast(c)?;
            Ok(Expr::new(start.join(&e.range), ExprKind::Deref(Box::new(e))))
        }
        TokenKind::PlusPlus => {
            c.advance();
            let e = parse_unary(c)?;
            Ok(Expr::new(
                start.join(&e.range),
                ExprKind::IncDec { op: IncDecOp::Inc, form: IncDecForm::Prefix, target: Box::new(e) },
            ))
        }
        TokenKind::MinusMinus => {
            c.advance();
            let e = parse_unary(c)?;
            Ok(Expr::new(
                start.join(&e.range),
                ExprKind::IncDec { op: IncDecOp::Dec, form: IncDecForm::Prefix, target: Box::new(e) },
            ))
        }
        TokenKind::Sizeof => {
            c.advance();
            if c.is(TokenKind::LParen) && is_type_start(c.peek_at(1).kind) {
                c.advance();
                let to = parse_type_name(c)?;
                let end = c.range();
                c.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::new(start.join(&end), ExprKind::SizeofType(to)))
            } else {
                let e = parse_unary(c)?;
                Ok(Expr::new(start.join(&e.range), ExprKind::Sizeof(Box::new(e))))
            }
        }
        _ => parse_postfix(c),
    }
}

fn parse_postfix(c: &mut Cursor) -> Result<Expr, ParseError> {
    let mut expr = parse_primary(c)?;
    loop {
        match c.kind() {
            TokenKind::LBracket => {
                c.advance();
                let index = parse_expr(c)?;
                let end = c.range();
                c.expect(TokenKind::RBracket, "']'")?;
                let range = expr.range.join(&end);
                expr = Expr::new(range, ExprKind::Subscript { arr: Box::new(expr), index: Box::new(index) });
            }
            TokenKind::LParen => {
                c.advance();
                let mut args = Vec::new();
                if !c.is(TokenKind::RParen) {
                    loop {
                        args.push(parse_assignment_expr(c)?);
                        if !c.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let end = c.range();
                c.expect(TokenKind::RParen, "')'")?;
                let range = expr.range.join(&end);
                expr = Expr::new(range, ExprKind::Call { func: Box::new(expr), args });
            }
            TokenKind::Dot => {
                c.advance();
                let name = c.advance_ident()?;
                let range = expr.range.join(&c.prev_range());
                expr = Expr::new(range, ExprKind::Member { base: Box::new(expr), name, arrow: false });
            }
            TokenKind::Arrow => {
                c.advance();
                let name = c.advance_ident()?;
                let range = expr.range.join(&c.prev_range());
                expr = Expr::new(range, ExprKind::Member { base: Box::new(expr), name, arrow: true });
            }
            TokenKind::PlusPlus => {
                let range = expr.range.join(&c.range());
                c.advance();
                expr = Expr::new(
                    range,
                    ExprKind::IncDec { op: IncDecOp::Inc, form: IncDecForm::Postfix, target: Box::new(expr) },
                );
            }
            TokenKind::MinusMinus => {
                let range = expr.range.join(&c.range());
                c.advance();
                expr = Expr::new(
                    range,
                    ExprKind::IncDec { op: IncDecOp::Dec, form: IncDecForm::Postfix, target: Box::new(expr) },
                );
            }
            _ => break,
        }
    }
    Ok(expr)
}

fn parse_primary(c: &mut Cursor) -> Result<Expr, ParseError> {
    let range = c.range();
    match c.kind() {
        TokenKind::IntLiteral => {
            let tok = c.advance();
            let v = match tok.content {
                Some(TokenContent::Int(v)) => v,
                _ => unreachable!("IntLiteral token always carries TokenContent::Int"),
            };
            Ok(Expr::new(range, ExprKind::IntLiteral(v)))
        }
        TokenKind::StringLiteral => {
            let tok = c.advance();
            let bytes = match tok.content {
                Some(TokenContent::Str(bytes)) => bytes,
                _ => unreachable!("StringLiteral token always carries TokenContent::Str"),
            };
            Ok(Expr::new(range, ExprKind::StringLiteral(bytes)))
        }
        TokenKind::Ident => {
            let id = c.advance_ident()?;
            Ok(Expr::new(range, ExprKind::Var(id)))
        }
        TokenKind::LParen => {
            c.advance();
            let inner = parse_expr(c)?;
            c.expect(TokenKind::RParen, "')'")?;
            Ok(inner)
        }
        _ => Err(c.err(format!("expected an expression, found {}", c.kind()))),
    }
}

// --- Statements ---------------------------------------------------------

fn parse_block(c: &mut Cursor) -> Result<Vec<Stmt>, ParseError> {
    c.expect(TokenKind::LBrace, "'{'")?;
    let mut stmts = Vec::new();
    while !c.is(TokenKind::RBrace) {
        stmts.push(parse_statement(c)?);
    }
    c.expect(TokenKind::RBrace, "'}'")?;
    Ok(stmts)
}

/// `if`/`while`/`for` bodies accept either a brace-delimited block or a
/// single statement; either way the caller just gets a `Vec<Stmt>`, with no
/// extra `Compound` wrapper for the single-statement case.
fn parse_stmt_list_or_single(c: &mut Cursor) -> Result<Vec<Stmt>, ParseError> {
    if c.is(TokenKind::LBrace) {
        parse_block(c)
    } else {
        Ok(vec![parse_statement(c)?])
    }
}

fn parse_statement(c: &mut Cursor) -> Result<Stmt, ParseError> {
    let start = c.range();
    match c.kind() {
        TokenKind::LBrace => {
            let stmts = parse_block(c)?;
            Ok(Stmt { range: start.join(&c.prev_range()), kind: StmtKind::Compound(stmts) })
        }
        TokenKind::Semicolon => {
            c.advance();
            Ok(Stmt { range: start, kind: StmtKind::Compound(Vec::new()) })
        }
        TokenKind::If => {
            c.advance();
            c.expect(TokenKind::LParen, "'('")?;
            let cond = parse_expr(c)?;
            c.expect(TokenKind::RParen, "')'")?;
            let then_branch = parse_stmt_list_or_single(c)?;
            let else_branch = if c.eat(TokenKind::Else) { parse_stmt_list_or_single(c)? } else { Vec::new() };
            Ok(Stmt { range: start.join(&c.prev_range()), kind: StmtKind::If { cond, then_branch, else_branch } })
        }
        TokenKind::While => {
            c.advance();
            c.expect(TokenKind::LParen, "'('")?;
            let cond = parse_expr(c)?;
            c.expect(TokenKind::RParen, "')'")?;
            let body = parse_stmt_list_or_single(c)?;
            Ok(Stmt { range: start.join(&c.prev_range()), kind: StmtKind::While { cond, body } })
        }
        TokenKind::For => {
            c.advance();
            c.expect(TokenKind::LParen, "'('")?;
            let init = if c.is(TokenKind::Semicolon) {
                c.advance();
                None
            } else if is_type_start(c.kind()) {
                Some(Box::new(parse_declaration_stmt(c)?))
            } else {
                let e = parse_expr(c)?;
                let range = e.range.clone();
                c.expect(TokenKind::Semicolon, "';'")?;
                Some(Box::new(Stmt { range, kind: StmtKind::Expr(e) }))
            };
            let cond = if c.is(TokenKind::Semicolon) { None } else { Some(parse_expr(c)?) };
            c.expect(TokenKind::Semicolon, "';'")?;
            let step = if c.is(TokenKind::RParen) { None } else { Some(parse_expr(c)?) };
            c.expect(TokenKind::RParen, "')'")?;
            let body = parse_stmt_list_or_single(c)?;
            Ok(Stmt { range: start.join(&c.prev_range()), kind: StmtKind::For { init, cond, step, body } })
        }
        TokenKind::Break => {
            c.advance();
            c.expect(TokenKind::Semicolon, "';'")?;
            Ok(Stmt { range: start.join(&c.prev_range()), kind: StmtKind::Break })
        }
        TokenKind::Continue => {
            c.advance();
            c.expect(TokenKind::Semicolon, "';'")?;
            Ok(Stmt { range: start.join(&c.prev_range()), kind: StmtKind::Continue })
        }
        TokenKind::Return => {
            c.advance();
            let value = if c.is(TokenKind::Semicolon) { None } else { Some(parse_expr(c)?) };
            c.expect(TokenKind::Semicolon, "';'")?;
            Ok(Stmt { range: start.join(&c.prev_range()), kind: StmtKind::Return(value) })
        }
        k if is_type_start(k) => parse_declaration_stmt(c),
        _ => {
            let e = parse_expr(c)?;
            c.expect(TokenKind::Semicolon, "';'")?;
            Ok(Stmt { range: start.join(&c.prev_range()), kind: StmtKind::Expr(e) })
        }
    }
}

/// Shared by block-scope declarations and `for`-init declarations. A bare
/// `struct Foo;` with no braces and no declarators re-declares (or declares)
/// the tag only; everything else — including `struct Foo { ... };` with no
/// variable — becomes a `Declaration` with an empty declarator list.
fn parse_declaration_stmt(c: &mut Cursor) -> Result<Stmt, ParseError> {
    let start = c.range();
    let (storage, specs) = parse_specs(c, true)?;
    if c.eat(TokenKind::Semicolon) {
        let range = start.join(&c.prev_range());
        if let [TypeSpec::StructTag(tag)] = specs.as_slice() {
            return Ok(Stmt { range, kind: StmtKind::StructTagOnly { tag: *tag } });
        }
        let decl = Declaration {
            range: range.clone(),
            storage: storage.unwrap_or(StorageClass::Auto),
            specs,
            declarators: Vec::new(),
        };
        return Ok(Stmt { range, kind: StmtKind::Decl(decl) });
    }
    let declarators = parse_declarator_list(c)?;
    c.expect(TokenKind::Semicolon, "';'")?;
    let range = start.join(&c.prev_range());
    let decl = Declaration { range: range.clone(), storage: storage.unwrap_or(StorageClass::Auto), specs, declarators };
    Ok(Stmt { range, kind: StmtKind::Decl(decl) })
}

// --- Top level --------------------------------------------------------------

fn parse_external_decl(c: &mut Cursor) -> Result<ExternalDecl, ParseError> {
    let start = c.range();
    let (storage, specs) = parse_specs(c, true)?;
    if c.eat(TokenKind::Semicolon) {
        let range = start.join(&c.prev_range());
        let decl = Declaration {
            range: range.clone(),
            storage: storage.unwrap_or(StorageClass::Auto),
            specs,
            declarators: Vec::new(),
        };
        return Ok(ExternalDecl::Declaration(decl));
    }

    let first_start = c.range();
    let (name, node) = parse_declarator(c)?;
    let name = name.ok_or_else(|| c.err("top-level declaration must have a name"))?;

    if matches!(node, DeclNode::Function { .. }) && c.is(TokenKind::LBrace) {
        let body = parse_block(c)?;
        let range = start.join(&c.prev_range());
        let def = FunctionDef { range, name, specs, decl: node, body };
        return Ok(ExternalDecl::Function(def));
    }

    let init = if c.eat(TokenKind::Assign) { Some(parse_assignment_expr(c)?) } else { None };
    let mut declarators = vec![Declarator { range: first_start.join(&c.prev_range()), name, decl: node, init }];
    while c.eat(TokenKind::Comma) {
        let d_start = c.range();
        let (n, d) = parse_declarator(c)?;
        let n = n.ok_or_else(|| c.err("declarator must have a name"))?;
        let init = if c.eat(TokenKind::Assign) { Some(parse_assignment_expr(c)?) } else { None };
        declarators.push(Declarator { range: d_start.join(&c.prev_range()), name: n, decl: d, init });
    }
    c.expect(TokenKind::Semicolon, "';'")?;
    let range = start.join(&c.prev_range());
    let decl = Declaration { range, storage: storage.unwrap_or(StorageClass::Auto), specs, declarators };
    Ok(ExternalDecl::Declaration(decl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::front::lex::tokenize;

    fn parse_str(src: &str) -> Program {
        let mut diags = DiagnosticSink::new();
        let tokens = tokenize("<test>", src, &mut diags);
        assert!(diags.ok(), "unexpected lex diagnostics: {:?}", diags.issues());
        parse(&tokens).expect("parse should succeed")
    }

    fn only_function(program: &Program) -> &FunctionDef {
        match program.decls.as_slice() {
            [ExternalDecl::Function(f)] => f,
            other => panic!("expected a single function, got {other:?}"),
        }
    }

    #[test]
    fn parses_empty_function() {
        let program = parse_str("int main(void) { return 0; }");
        let f = only_function(&program);
        assert_eq!(f.name.as_str(), "main");
        assert!(matches!(f.decl, DeclNode::Function { has_prototype: true, .. }));
        assert_eq!(f.body.len(), 1);
        assert!(matches!(f.body[0].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn array_of_pointer_without_parens() {
        let program = parse_str("int f(char *argv[3]) { return 0; }");
        let f = only_function(&program);
        let DeclNode::Function { params, .. } = &f.decl else { panic!("expected Function node") };
        let (_, decl, _) = &params[0];
        match decl {
            DeclNode::Array { of, n: Some(3), .. } => {
                assert!(matches!(**of, DeclNode::Pointer { .. }), "expected array of pointer, got {of:?}");
            }
            other => panic!("expected Array{{of: Pointer}}, got {other:?}"),
        }
    }

    #[test]
    fn pointer_to_array_with_parens() {
        let program = parse_str("int f(int (*arr)[3]) { return 0; }");
        let f = only_function(&program);
        let DeclNode::Function { params, .. } = &f.decl else { panic!("expected Function node") };
        let (_, decl, _) = &params[0];
        match decl {
            DeclNode::Pointer { to, .. } => {
                assert!(matches!(**to, DeclNode::Array { n: Some(3), .. }), "expected pointer to array, got {to:?}");
            }
            other => panic!("expected Pointer{{to: Array}}, got {other:?}"),
        }
    }

    #[test]
    fn pointer_to_function_returning_int() {
        let program = parse_str("int f(int (*fp)(int)) { return 0; }");
        let f = only_function(&program);
        let DeclNode::Function { params, .. } = &f.decl else { panic!("expected Function node") };
        let (_, decl, _) = &params[0];
        match decl {
            DeclNode::Pointer { to, .. } => {
                assert!(matches!(**to, DeclNode::Function { .. }), "expected pointer to function, got {to:?}");
            }
            other => panic!("expected Pointer{{to: Function}}, got {other:?}"),
        }
    }

    #[test]
    fn nested_arrays_reverse_correctly() {
        let program = parse_str("int arr[3][4];");
        let ExternalDecl::Declaration(decl) = &program.decls[0] else { panic!("expected a declaration") };
        let outer = &decl.declarators[0].decl;
        match outer {
            DeclNode::Array { of, n: Some(3), .. } => {
                assert!(matches!(**of, DeclNode::Array { n: Some(4), .. }), "expected nested array, got {of:?}");
            }
            other => panic!("expected Array{{3, Array{{4}}}}, got {other:?}"),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let program = parse_str("int f(void) { int a; int b; int c; a = b = c; return 0; }");
        let f = only_function(&program);
        let last = f.body.last().unwrap();
        let StmtKind::Expr(e) = &last.kind else { panic!("expected an expression statement") };
        match &e.kind {
            ExprKind::Assign { rhs, .. } => {
                assert!(matches!(rhs.kind, ExprKind::Assign { .. }), "expected a = (b = c)");
            }
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn cast_binds_tighter_than_multiplication() {
        let program = parse_str("int f(void) { int x; x = (int) 1 * 2; return 0; }");
        let f = only_function(&program);
        let StmtKind::Expr(e) = &f.body[1].kind else { panic!("expected an expression statement") };
        let ExprKind::Assign { rhs, .. } = &e.kind else { panic!("expected assignment") };
        match &rhs.kind {
            ExprKind::Binary { op: BinOp::Mul, lhs, .. } => {
                assert!(matches!(lhs.kind, ExprKind::Cast { .. }), "expected (cast) * 2");
            }
            other => panic!("expected Binary(Mul), got {other:?}"),
        }
    }

    #[test]
    fn bare_struct_tag_redeclaration() {
        let program = parse_str("struct Point; struct Point { int x; int y; };");
        assert_eq!(program.decls.len(), 2);
        let ExternalDecl::Declaration(first) = &program.decls[0] else { panic!("expected a declaration") };
        assert!(first.declarators.is_empty());
        assert!(matches!(first.specs.as_slice(), [TypeSpec::StructTag(_)]));
        let ExternalDecl::Declaration(second) = &program.decls[1] else { panic!("expected a declaration") };
        assert!(second.declarators.is_empty());
        assert!(matches!(second.specs.as_slice(), [TypeSpec::StructDef { .. }]));
    }

    #[test]
    fn empty_statement_is_empty_compound() {
        let program = parse_str("int f(void) { ; return 0; }");
        let f = only_function(&program);
        assert!(matches!(&f.body[0].kind, StmtKind::Compound(stmts) if stmts.is_empty()));
    }

    #[test]
    fn for_loop_with_declaration_init() {
        let program = parse_str("int f(void) { for (int i = 0; i < 10; i = i + 1) { } return 0; }");
        let f = only_function(&program);
        let StmtKind::For { init, cond, step, .. } = &f.body[0].kind else { panic!("expected For") };
        assert!(matches!(init.as_deref().map(|s| &s.kind), Some(StmtKind::Decl(_))));
        assert!(cond.is_some());
        assert!(step.is_some());
    }

    #[test]
    fn multiple_declarators_share_specs() {
        let program = parse_str("int a, *b, c[3];");
        let ExternalDecl::Declaration(decl) = &program.decls[0] else { panic!("expected a declaration") };
        assert_eq!(decl.declarators.len(), 3);
        assert!(matches!(decl.declarators[0].decl, DeclNode::Identifier));
        assert!(matches!(decl.declarators[1].decl, DeclNode::Pointer { .. }));
        assert!(matches!(decl.declarators[2].decl, DeclNode::Array { .. }));
    }
}
