//! The AST → IL generator: walks a `front::ast::Program` and produces a
//! `middle::il::Program`.
//!
//! Grounded on `examples/original_source/shivyc/il_gen.py` and the node-level
//! `make_il`/`make_il_raw`/`lvalue` methods scattered across
//! `examples/original_source/shivyc/tree/*.py`. Rather than the original's
//! two class hierarchies (lvalue-capable nodes vs. plain expression nodes),
//! every expression kind is handled by one recursive function here and the
//! lvalue/rvalue split is expressed as `LValue`, per SPEC_FULL.md §9 DESIGN
//! NOTES "Expression lvalue/rvalue dichotomy".

use std::rc::Rc;

use crate::common::Id;
use crate::diagnostics::{CompilerContext, Diagnostic, DiagnosticKind, Range};
use crate::front::ast::*;
use crate::front::decl_tree::{Node as DeclNode, TypeSpec};
use crate::middle::il::{self, GlobalVar, ILValue};
use crate::middle::il_cmd::compare::*;
use crate::middle::il_cmd::control::*;
use crate::middle::il_cmd::math::*;
use crate::middle::il_cmd::value::*;
use crate::middle::il_cmd::ILCmd;
use crate::middle::symtab::SymbolTable;
use crate::types::*;

/// Where a value lives, for the purposes of reading/writing it again,
/// tagged per SPEC_FULL.md §4.4: `Direct` is a plain named/temporary
/// `ILValue`; `Indirect` is `*ptr` where `ptr` holds a runtime address;
/// `Relative` is `base + offset[ + index*chunk]`, the fast path struct
/// member access and array indexing into a homed object use instead of
/// materializing a pointer first.
#[derive(Clone, Debug)]
pub enum LValue {
    Direct(ILValue),
    Indirect(ILValue, CType),
    Relative { base: ILValue, offset: i64, index: Option<(u64, ILValue)>, ctype: CType },
}

impl LValue {
    pub fn ctype(&self) -> CType {
        match self {
            LValue::Direct(v) => v.ctype().clone(),
            LValue::Indirect(_, ct) => ct.clone(),
            LValue::Relative { ctype, .. } => ctype.clone(),
        }
    }

    /// True iff this lvalue may appear on the left of `=`: not an array
    /// (arrays are non-modifiable per spec.md §4.4) and not a function.
    pub fn modable(&self) -> bool {
        let ct = self.ctype();
        ct.is_object() && !ct.is_array()
    }
}

/// Per-translation-unit lowering state: the IL program under construction,
/// the symbol table (shared with the parser via `TypedefOracle`, but here
/// used read-write to bind `ILValue`s as declarations are lowered), and the
/// explicit `CompilerContext` (diagnostics, label/anon-static counters).
pub struct Lowering<'a> {
    pub program: il::Program,
    pub symtab: SymbolTable,
    cc: &'a mut CompilerContext,
    cmds: Vec<Box<dyn ILCmd>>,
    break_labels: Vec<String>,
    continue_labels: Vec<String>,
    current_return: Option<CType>,
}

impl<'a> Lowering<'a> {
    fn new(cc: &'a mut CompilerContext) -> Self {
        Lowering {
            program: il::Program::new(),
            symtab: SymbolTable::new(),
            cc,
            cmds: Vec::new(),
            break_labels: Vec::new(),
            continue_labels: Vec::new(),
            current_return: None,
        }
    }

    fn push(&mut self, cmd: impl ILCmd + 'static) {
        self.cmds.push(Box::new(cmd));
    }

    fn new_temp(&mut self, ctype: CType) -> ILValue {
        ILValue::new(ctype)
    }

    fn new_label(&mut self, prefix: &str) -> String {
        self.cc.labels.next(prefix)
    }

    fn err(&mut self, kind: DiagnosticKind, msg: impl Into<String>, range: &Range) {
        self.cc.diagnostics.add(Diagnostic::error(kind, msg, Some(range.clone())));
    }

    fn warn(&mut self, kind: DiagnosticKind, msg: impl Into<String>, range: &Range) {
        self.cc.diagnostics.add(Diagnostic::warning(kind, msg, Some(range.clone())));
    }

    // -- LValue access -----------------------------------------------------

    fn lval_addr(&mut self, lv: &LValue) -> ILValue {
        match lv {
            LValue::Direct(v) => {
                let out = self.new_temp(CType::pointer_to(v.ctype().clone()));
                self.push(AddrOf { out: out.clone(), target: v.clone() });
                out
            }
            LValue::Indirect(ptr, _) => ptr.clone(),
            LValue::Relative { base, offset, index, ctype } => {
                let out = self.new_temp(CType::pointer_to(ctype.clone()));
                self.push(AddrRel { out: out.clone(), base: base.clone(), offset: *offset, chunk: index.clone() });
                out
            }
        }
    }

    fn lval_val(&mut self, lv: &LValue) -> ILValue {
        match lv {
            LValue::Direct(v) => v.clone(),
            LValue::Indirect(ptr, ctype) => {
                let out = self.new_temp(ctype.clone());
                self.push(ReadAt { out: out.clone(), ptr: ptr.clone(), size: ctype.size() });
                out
            }
            LValue::Relative { base, offset, index: None, ctype } => {
                let out = self.new_temp(ctype.clone());
                self.push(ReadRel { out: out.clone(), base: base.clone(), offset: *offset, size: ctype.size() });
                out
            }
            LValue::Relative { index: Some(_), ctype, .. } => {
                let ctype = ctype.clone();
                let addr = self.lval_addr(lv);
                let out = self.new_temp(ctype.clone());
                self.push(ReadAt { out: out.clone(), ptr: addr, size: ctype.size() });
                out
            }
        }
    }

    fn lval_set(&mut self, lv: &LValue, src: ILValue) {
        match lv {
            LValue::Direct(v) => self.push(Set { out: v.clone(), src }),
            LValue::Indirect(ptr, ctype) => self.push(SetAt { ptr: ptr.clone(), src, size: ctype.size() }),
            LValue::Relative { base, offset, index: None, ctype } => {
                self.push(SetRel { base: base.clone(), offset: *offset, src, size: ctype.size() })
            }
            LValue::Relative { index: Some(_), ctype, .. } => {
                let size = ctype.size();
                let addr = self.lval_addr(lv);
                self.push(SetAt { ptr: addr, src, size });
            }
        }
    }

    /// Loads an lvalue's value as an rvalue, applying array-to-pointer decay
    /// (an array lvalue rvalues to the address of its first element, never
    /// to a byte copy of its contents).
    fn rvalue_of(&mut self, lv: &LValue) -> ILValue {
        if lv.ctype().is_array() {
            self.lval_addr(lv)
        } else {
            self.lval_val(lv)
        }
    }

    // -- lvalue computation, cached on the AST node -------------------------

    fn lvalue(&mut self, e: &Expr) -> Option<LValue> {
        if let Some(cached) = e.lvalue_cache.get() {
            return cached.clone();
        }
        let computed = self.compute_lvalue(e);
        let _ = e.lvalue_cache.set(computed.clone());
        computed
    }

    fn compute_lvalue(&mut self, e: &Expr) -> Option<LValue> {
        match &e.kind {
            ExprKind::Var(name) => {
                let sym = self.symtab.lookup(*name)?;
                if sym.ctype.is_function() {
                    return None;
                }
                let value = sym.value.clone()?;
                Some(LValue::Direct(value))
            }
            ExprKind::StringLiteral(bytes) => {
                let ctype = CType::array_of(char_t(), Some(bytes.len() as u64));
                let value = ILValue::new(ctype);
                let name = Id::new(format!("__cflatc_str{}", self.cc.anon_statics.next()));
                self.program.string_literals.push((value.clone(), name, bytes.clone()));
                Some(LValue::Direct(value))
            }
            ExprKind::Deref(inner) => {
                let ptr = self.lower_expr(inner);
                match ptr.ctype().clone() {
                    CType::Pointer { to, .. } => Some(LValue::Indirect(ptr, (*to).clone())),
                    _ => {
                        self.err(DiagnosticKind::Type, "cannot dereference a non-pointer value", &e.range);
                        None
                    }
                }
            }
            ExprKind::Subscript { arr, index } => self.compute_subscript_lvalue(arr, index, &e.range),
            ExprKind::Member { base, name, arrow } => self.compute_member_lvalue(base, *name, *arrow, &e.range),
            _ => None,
        }
    }

    fn compute_subscript_lvalue(&mut self, arr: &Expr, index: &Expr, range: &Range) -> Option<LValue> {
        let arr_lv = self.lvalue(arr);
        if let Some(LValue::Direct(v)) = &arr_lv {
            if let CType::Array { el, .. } = v.ctype().clone() {
                let idx = self.lower_expr(index);
                let idx = self.cast_to(idx, &long());
                return Some(LValue::Relative {
                    base: v.clone(),
                    offset: 0,
                    index: Some((el.size(), idx)),
                    ctype: (*el).clone(),
                });
            }
        }
        let ptr = self.lower_expr(arr);
        let el = match ptr.ctype().clone() {
            CType::Pointer { to, .. } => (*to).clone(),
            _ => {
                self.err(DiagnosticKind::Type, "subscripted value is not an array or pointer", range);
                return None;
            }
        };
        let idx = self.lower_expr(index);
        let addr = self.pointer_add(ptr, idx, el.size() as i64, false);
        Some(LValue::Indirect(addr, el))
    }

    fn compute_member_lvalue(&mut self, base: &Expr, name: Id, arrow: bool, range: &Range) -> Option<LValue> {
        if arrow {
            let ptr = self.lower_expr(base);
            let st = match ptr.ctype().clone() {
                CType::Pointer { to, .. } if to.is_struct() => match (*to).clone() {
                    CType::Struct(s) => s,
                    _ => unreachable!(),
                },
                _ => {
                    self.err(DiagnosticKind::Type, "member reference base is not a struct pointer", range);
                    return None;
                }
            };
            let Some((offset, ctype)) = st.member(name) else {
                self.err(DiagnosticKind::Type, format!("no member named '{name}'"), range);
                return None;
            };
            let addr = self.raw_add_offset(ptr, offset as i64, ctype.clone());
            return Some(LValue::Indirect(addr, ctype));
        }

        let base_lv = self.lvalue(base)?;
        let base_ctype = base_lv.ctype();
        let st = match &base_ctype {
            CType::Struct(s) => s.clone(),
            _ => {
                self.err(DiagnosticKind::Type, "member reference base is not a struct", range);
                return None;
            }
        };
        let Some((moff, mctype)) = st.member(name) else {
            self.err(DiagnosticKind::Type, format!("no member named '{name}'"), range);
            return None;
        };
        match base_lv {
            LValue::Direct(v) => Some(LValue::Relative { base: v, offset: moff as i64, index: None, ctype: mctype }),
            LValue::Relative { base: b, offset, index: None, .. } => {
                Some(LValue::Relative { base: b, offset: offset + moff as i64, index: None, ctype: mctype })
            }
            LValue::Relative { index: Some(_), .. } => {
                // The struct itself was reached through an array index; read
                // its address first, then treat the member as an indirect
                // access off that address.
                let addr = self.lval_addr(&base_lv);
                let addr = self.raw_add_offset(addr, moff as i64, mctype.clone());
                Some(LValue::Indirect(addr, mctype))
            }
            LValue::Indirect(ptr, _) => {
                let addr = self.raw_add_offset(ptr, moff as i64, mctype.clone());
                Some(LValue::Indirect(addr, mctype))
            }
        }
    }

    /// Materializes `base + offset` as a fresh pointer-typed value. Used for
    /// member access through a pointer, where the byte offset is known at
    /// lowering time but `base` already holds a runtime address (so
    /// `AddrRel`'s "base must be homed to memory" contract does not apply).
    fn raw_add_offset(&mut self, base: ILValue, offset: i64, target: CType) -> ILValue {
        let out = self.new_temp(CType::pointer_to(target));
        if offset == 0 {
            self.push(Set { out: out.clone(), src: base });
        } else {
            let lit = self.program.literal(offset, &long());
            self.push(Add { out: out.clone(), lhs: base, rhs: lit, size: 8 });
        }
        out
    }

    /// `ptr [+/-] index*elem_size`, per spec.md §4.4's pointer arithmetic
    /// rule. `index` is promoted to `long` first so the scale multiply
    /// always runs at pointer width.
    fn pointer_add(&mut self, ptr: ILValue, index: ILValue, elem_size: i64, negate: bool) -> ILValue {
        let idx = self.cast_to(index, &long());
        let size_lit = self.program.literal(elem_size, &long());
        let scaled = self.new_temp(long());
        self.push(Mult { out: scaled.clone(), lhs: idx, rhs: size_lit, size: 8 });
        let out = self.new_temp(ptr.ctype().clone());
        if negate {
            self.push(Subtr { out: out.clone(), lhs: ptr, rhs: scaled, size: 8 });
        } else {
            self.push(Add { out: out.clone(), lhs: ptr, rhs: scaled, size: 8 });
        }
        out
    }

    /// Converts `value` to `target`, per the assignment/UAC conversion
    /// rules. No-op if already the right type; otherwise `Set` itself works
    /// out whether this is a truncation, a sign/zero-extending widening, or
    /// a `_Bool` normalization from `target`'s and `value`'s ctypes.
    fn cast_to(&mut self, value: ILValue, target: &CType) -> ILValue {
        if value.ctype() == target {
            return value;
        }
        let out = self.new_temp(target.clone());
        self.push(Set { out: out.clone(), src: value });
        out
    }

    /// As `cast_to`, but for implicit conversion sites (assignment,
    /// initialization, `return`, prototyped call arguments) rather than an
    /// explicit cast expression: flags a pointer/non-pointer mismatch as a
    /// `Type` error first, per spec.md §8's "return \"hi\";" diagnostic
    /// scenario ("implementation: error: invalid conversion"). A literal
    /// `0`/`NULL` is exempt (it converts implicitly to any pointer type).
    fn implicit_cast_to(&mut self, value: ILValue, target: &CType, range: &Range) -> ILValue {
        let src = value.ctype().clone();
        let incompatible = src != *target
            && src.is_pointer() != target.is_pointer()
            && !(value.is_null_ptr_const() && target.is_pointer())
            && !src.is_void()
            && !target.is_void();
        if incompatible {
            self.err(DiagnosticKind::Type, "invalid conversion between pointer and integer types", range);
        }
        self.cast_to(value, target)
    }

    // -- expressions ---------------------------------------------------------

    fn lower_expr(&mut self, e: &Expr) -> ILValue {
        if let Some(lv) = self.lvalue(e) {
            return self.rvalue_of(&lv);
        }
        match &e.kind {
            ExprKind::IntLiteral(v) => {
                let ctype = if *v >= INT_MIN && *v <= INT_MAX { int() } else { long() };
                let value = self.program.literal(*v, &ctype);
                if *v == 0 {
                    value.set_null_ptr_const();
                }
                value
            }
            ExprKind::Var(name) => {
                // Only reached for function-typed identifiers (object
                // identifiers are lvalues, handled above).
                match self.symtab.lookup(*name).and_then(|s| s.value.clone()) {
                    Some(v) => v,
                    None => {
                        self.err(DiagnosticKind::Type, format!("use of undeclared identifier '{name}'"), &e.range);
                        self.new_temp(int())
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, &e.range),
            ExprKind::Not(inner) => {
                let v = self.lower_expr(inner);
                let out = self.new_temp(bool_t());
                self.push(Not { out: out.clone(), arg: v, size: 4 });
                out
            }
            ExprKind::Neg(inner) => {
                let v = self.lower_expr(inner);
                let ctype = v.ctype().promote();
                let v = self.cast_to(v, &ctype);
                let out = self.new_temp(ctype.clone());
                self.push(Neg { out: out.clone(), arg: v, size: ctype.size() });
                out
            }
            ExprKind::BitNot(inner) => {
                let v = self.lower_expr(inner);
                let ctype = v.ctype().promote();
                let v = self.cast_to(v, &ctype);
                let out = self.new_temp(ctype.clone());
                self.push(BitNot { out: out.clone(), arg: v, size: ctype.size() });
                out
            }
            ExprKind::Addr(inner) => match self.lvalue(inner) {
                Some(lv) => self.lval_addr(&lv),
                None => {
                    self.err(DiagnosticKind::Type, "cannot take the address of a non-lvalue", &e.range);
                    self.new_temp(CType::pointer_to(int()))
                }
            },
            ExprKind::Assign { lhs, rhs } => self.lower_assign(lhs, rhs, &e.range),
            ExprKind::CompoundAssign { op, lhs, rhs } => self.lower_compound_assign(*op, lhs, rhs, &e.range),
            ExprKind::IncDec { op, form, target } => self.lower_incdec(*op, *form, target, &e.range),
            ExprKind::Call { func, args } => self.lower_call(func, args, &e.range),
            ExprKind::Sizeof(inner) => {
                let ctype = self.sizeof_expr_ctype(inner);
                self.program.literal(ctype.size() as i64, &unsig_long())
            }
            ExprKind::SizeofType(tn) => {
                let ctype = self.lower_type_name(tn);
                self.program.literal(ctype.size() as i64, &unsig_long())
            }
            ExprKind::Cast { to, arg } => {
                let target = self.lower_type_name(to);
                let v = self.lower_expr(arg);
                self.cast_to(v, &target)
            }
            ExprKind::Deref(_) | ExprKind::Subscript { .. } | ExprKind::Member { .. } | ExprKind::StringLiteral(_) => {
                unreachable!("handled via lvalue()")
            }
        }
    }

    /// Computes the `CType` `sizeof expr` would have, without emitting
    /// `expr`'s side effects: lowers it into a scratch command buffer that
    /// is discarded, per SPEC_FULL.md §4.4 "make_il_raw for sizeof".
    fn sizeof_expr_ctype(&mut self, inner: &Expr) -> CType {
        let saved = std::mem::take(&mut self.cmds);
        let v = self.lower_expr(inner);
        self.cmds = saved;
        v.ctype().clone()
    }

    fn lower_logical(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> ILValue {
        let out = self.new_temp(bool_t());
        let end = self.new_label("logic_end");
        let l = self.lower_expr(lhs);
        // Normalize to 0/1 before the short-circuit jump: if we take it,
        // `out` must already hold the final 0/1 result, not the operand's
        // raw value.
        self.push(Not { out: out.clone(), arg: l, size: 4 });
        self.push(Not { out: out.clone(), arg: out.clone(), size: 4 });
        match op {
            BinOp::LogAnd => self.push(JumpZero { cond: out.clone(), target: end.clone(), size: 4 }),
            BinOp::LogOr => self.push(JumpNotZero { cond: out.clone(), target: end.clone(), size: 4 }),
            _ => unreachable!(),
        }
        let r = self.lower_expr(rhs);
        let bit = self.new_temp(bool_t());
        self.push(Not { out: bit.clone(), arg: r, size: 4 });
        self.push(Not { out: bit.clone(), arg: bit.clone(), size: 4 });
        self.push(Set { out: out.clone(), src: bit });
        self.push(Label { name: end });
        out
    }

    fn lower_binary(&mut self, op: BinOp, lhs_e: &Expr, rhs_e: &Expr, range: &Range) -> ILValue {
        if matches!(op, BinOp::LogAnd | BinOp::LogOr) {
            return self.lower_logical(op, lhs_e, rhs_e);
        }

        if let (ExprKind::IntLiteral(a), ExprKind::IntLiteral(b)) = (&lhs_e.kind, &rhs_e.kind) {
            if let Some(v) = self.fold_constant(op, *a, *b) {
                let at = if a.abs() <= INT_MAX as i64 { int() } else { long() };
                let bt = if b.abs() <= INT_MAX as i64 { int() } else { long() };
                let rt = at.usual_arith_convert(&bt);
                return self.program.literal(v, &rt);
            }
        }

        let lhs = self.lower_expr(lhs_e);
        let rhs = self.lower_expr(rhs_e);

        match op {
            BinOp::Add | BinOp::Sub => {
                if lhs.ctype().is_pointer() && rhs.ctype().is_integral() {
                    let el = pointer_element(lhs.ctype());
                    if !el.is_complete() {
                        self.err(DiagnosticKind::Type, "pointer arithmetic on incomplete type", range);
                    }
                    return self.pointer_add(lhs, rhs, el.size().max(1) as i64, op == BinOp::Sub);
                }
                if op == BinOp::Add && rhs.ctype().is_pointer() && lhs.ctype().is_integral() {
                    let el = pointer_element(rhs.ctype());
                    return self.pointer_add(rhs, lhs, el.size().max(1) as i64, false);
                }
                if op == BinOp::Sub && lhs.ctype().is_pointer() && rhs.ctype().is_pointer() {
                    let el = pointer_element(lhs.ctype());
                    let diff = self.new_temp(long());
                    self.push(Subtr { out: diff.clone(), lhs, rhs, size: 8 });
                    let size_lit = self.program.literal(el.size().max(1) as i64, &long());
                    let out = self.new_temp(long());
                    self.push(Div {
                        quotient: out.clone(),
                        remainder: self.new_temp(long()),
                        lhs: diff,
                        rhs: size_lit,
                        size: 8,
                    });
                    return out;
                }
                self.arith_binop(op, lhs, rhs, range)
            }
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                self.lower_compare(op, lhs, rhs)
            }
            BinOp::LShift | BinOp::RShift => self.lower_shift(op, lhs, rhs),
            _ => self.arith_binop(op, lhs, rhs, range),
        }
    }

    fn fold_constant(&self, op: BinOp, a: i64, b: i64) -> Option<i64> {
        Some(match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div if b != 0 => a.wrapping_div(b),
            BinOp::Mod if b != 0 => a.wrapping_rem(b),
            _ => return None,
        })
    }

    fn arith_binop(&mut self, op: BinOp, lhs: ILValue, rhs: ILValue, range: &Range) -> ILValue {
        if !lhs.ctype().is_arith() || !rhs.ctype().is_arith() {
            self.err(DiagnosticKind::Type, "invalid operands to binary operator", range);
            return self.new_temp(int());
        }
        let rt = lhs.ctype().usual_arith_convert(rhs.ctype());
        let l = self.cast_to(lhs, &rt);
        let r = self.cast_to(rhs, &rt);
        let out = self.new_temp(rt.clone());
        let size = rt.size();
        match op {
            BinOp::Add => self.push(Add { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::Sub => self.push(Subtr { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::Mul => self.push(Mult { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::BitAnd => self.push(BitAnd { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::BitOr => self.push(BitOr { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::BitXor => self.push(BitXor { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::Div => {
                let rem = self.new_temp(rt.clone());
                self.push(Div { quotient: out.clone(), remainder: rem, lhs: l, rhs: r, size });
            }
            BinOp::Mod => {
                let quot = self.new_temp(rt.clone());
                let rem_out = out.clone();
                self.cmds.push(Box::new(Div { quotient: quot, remainder: rem_out, lhs: l, rhs: r, size }));
                return out;
            }
            _ => unreachable!(),
        }
        out
    }

    fn lower_compare(&mut self, op: BinOp, lhs: ILValue, rhs: ILValue) -> ILValue {
        let (l, r, size) = if lhs.ctype().is_pointer() || rhs.ctype().is_pointer() {
            (lhs, rhs, 8)
        } else {
            let rt = lhs.ctype().usual_arith_convert(rhs.ctype());
            (self.cast_to(lhs, &rt), self.cast_to(rhs, &rt), rt.size())
        };
        let out = self.new_temp(bool_t());
        match op {
            BinOp::Eq => self.push(EqualCmp { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::Ne => self.push(NotEqualCmp { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::Lt => self.push(LessCmp { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::Gt => self.push(GreaterCmp { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::Le => self.push(LessOrEqCmp { out: out.clone(), lhs: l, rhs: r, size }),
            BinOp::Ge => self.push(GreaterOrEqCmp { out: out.clone(), lhs: l, rhs: r, size }),
            _ => unreachable!(),
        }
        out
    }

    fn lower_shift(&mut self, op: BinOp, lhs: ILValue, rhs: ILValue) -> ILValue {
        let lt = lhs.ctype().promote();
        let l = self.cast_to(lhs, &lt);
        let r = self.cast_to(rhs, &int());
        let out = self.new_temp(lt.clone());
        match op {
            BinOp::LShift => self.push(LBitShift { out: out.clone(), arg: l, count: r, size: lt.size() }),
            BinOp::RShift => self.push(RBitShift { out: out.clone(), arg: l, count: r, size: lt.size() }),
            _ => unreachable!(),
        }
        out
    }

    fn lower_assign(&mut self, lhs_e: &Expr, rhs_e: &Expr, range: &Range) -> ILValue {
        let Some(lv) = self.lvalue(lhs_e) else {
            self.err(DiagnosticKind::Type, "left side of assignment is not assignable", range);
            return self.lower_expr(rhs_e);
        };
        if !lv.modable() {
            self.err(DiagnosticKind::Type, "assignment to non-modifiable value", range);
        }
        let rhs = self.lower_expr(rhs_e);
        let target = lv.ctype();
        let converted = self.implicit_cast_to(rhs, &target, range);
        self.lval_set(&lv, converted.clone());
        converted
    }

    fn lower_compound_assign(&mut self, op: CompoundOp, lhs_e: &Expr, rhs_e: &Expr, range: &Range) -> ILValue {
        let Some(lv) = self.lvalue(lhs_e) else {
            self.err(DiagnosticKind::Type, "left side of assignment is not assignable", range);
            return self.lower_expr(rhs_e);
        };
        if !lv.modable() {
            self.err(DiagnosticKind::Type, "assignment to non-modifiable value", range);
        }
        let cur = self.lval_val(&lv);
        let rhs = self.lower_expr(rhs_e);
        let bin_op = match op {
            CompoundOp::Add => BinOp::Add,
            CompoundOp::Sub => BinOp::Sub,
            CompoundOp::Mul => BinOp::Mul,
            CompoundOp::Div => BinOp::Div,
            CompoundOp::Mod => BinOp::Mod,
            CompoundOp::BitAnd => BinOp::BitAnd,
            CompoundOp::BitOr => BinOp::BitOr,
            CompoundOp::BitXor => BinOp::BitXor,
            CompoundOp::LShift => BinOp::LShift,
            CompoundOp::RShift => BinOp::RShift,
        };
        let result = if cur.ctype().is_pointer() && matches!(op, CompoundOp::Add | CompoundOp::Sub) {
            let el = pointer_element(cur.ctype());
            self.pointer_add(cur, rhs, el.size().max(1) as i64, op == CompoundOp::Sub)
        } else if matches!(op, CompoundOp::LShift | CompoundOp::RShift) {
            self.lower_shift(bin_op, cur, rhs)
        } else {
            self.arith_binop(bin_op, cur, rhs, range)
        };
        let target = lv.ctype();
        let converted = self.cast_to(result, &target);
        self.lval_set(&lv, converted.clone());
        converted
    }

    fn lower_incdec(&mut self, op: IncDecOp, form: IncDecForm, target_e: &Expr, range: &Range) -> ILValue {
        let Some(lv) = self.lvalue(target_e) else {
            self.err(DiagnosticKind::Type, "operand of increment/decrement is not assignable", range);
            return self.new_temp(int());
        };
        let before = self.lval_val(&lv);
        let ctype = before.ctype().clone();
        let new_val = if ctype.is_pointer() {
            let el = pointer_element(&ctype);
            let one = self.program.literal(1, &long());
            self.pointer_add(before.clone(), one, el.size().max(1) as i64, op == IncDecOp::Dec)
        } else {
            let one = self.program.literal(1, &ctype);
            let out = self.new_temp(ctype.clone());
            match op {
                IncDecOp::Inc => self.push(Add { out: out.clone(), lhs: before.clone(), rhs: one, size: ctype.size() }),
                IncDecOp::Dec => self.push(Subtr { out: out.clone(), lhs: before.clone(), rhs: one, size: ctype.size() }),
            }
            out
        };
        self.lval_set(&lv, new_val.clone());
        match form {
            IncDecForm::Prefix => new_val,
            IncDecForm::Postfix => before,
        }
    }

    fn lower_call(&mut self, func_e: &Expr, args_e: &[Expr], range: &Range) -> ILValue {
        let func = self.lower_expr(func_e);
        let (param_types, ret, has_prototype) = match func.ctype().clone() {
            CType::Function { args, ret, has_prototype } => (args, (*ret).clone(), has_prototype),
            CType::Pointer { to, .. } => match (*to).clone() {
                CType::Function { args, ret, has_prototype } => (args, (*ret).clone(), has_prototype),
                _ => {
                    self.err(DiagnosticKind::Type, "called object is not a function", range);
                    (Vec::new(), int(), false)
                }
            },
            _ => {
                self.err(DiagnosticKind::Type, "called object is not a function", range);
                (Vec::new(), int(), false)
            }
        };

        if args_e.len() > 6 {
            self.err(DiagnosticKind::Unsupported, "too many arguments (maximum 6 supported)", range);
        }
        if has_prototype && args_e.len() != param_types.len() {
            self.err(DiagnosticKind::Type, "argument count does not match function prototype", range);
        }

        let mut args = Vec::new();
        for (i, arg_e) in args_e.iter().enumerate() {
            let v = self.lower_expr(arg_e);
            // Default argument promotion for calls beyond the known
            // parameter list (or without a prototype): integer promotion,
            // arrays/functions already decayed by `lower_expr`.
            let v = match param_types.get(i) {
                Some(pt) => self.implicit_cast_to(v, pt, range),
                None => {
                    let promoted = v.ctype().promote();
                    self.cast_to(v, &promoted)
                }
            };
            args.push(v);
        }

        let ret_value = if ret.is_void() { None } else { Some(self.new_temp(ret)) };
        self.push(Call { func, args, ret: ret_value.clone() });
        ret_value.unwrap_or_else(|| self.new_temp(void()))
    }

    fn lower_type_name(&mut self, tn: &TypeName) -> CType {
        let base = self.base_ctype(&tn.specs, &tn.range);
        decl_to_ctype(&base, &tn.decl)
    }

    /// Resolves a declaration specifier list to its base `CType`, handling
    /// struct tags/definitions (which have side effects on the symbol
    /// table's tag scope) in addition to plain type keywords.
    fn base_ctype(&mut self, specs: &[TypeSpec], range: &Range) -> CType {
        let mut has_void = false;
        let mut has_bool = false;
        let mut has_char = false;
        let mut has_short = false;
        let mut has_int = false;
        let mut has_long = false;
        let mut signed = false;
        let mut unsigned = false;
        let mut struct_ty: Option<CType> = None;

        for spec in specs {
            match spec {
                TypeSpec::Void => has_void = true,
                TypeSpec::Bool => has_bool = true,
                TypeSpec::Char => has_char = true,
                TypeSpec::Short => has_short = true,
                TypeSpec::Int => has_int = true,
                TypeSpec::Long => has_long = true,
                TypeSpec::Signed => signed = true,
                TypeSpec::Unsigned => unsigned = true,
                TypeSpec::Const => {}
                TypeSpec::StructTag(tag) => {
                    let st = self.symtab.lookup_tag(*tag).unwrap_or_else(|| {
                        let st = StructType::new_incomplete(Some(*tag));
                        self.symtab.declare_tag(*tag, st.clone());
                        st
                    });
                    struct_ty = Some(CType::Struct(st));
                }
                TypeSpec::StructDef { tag, members } => {
                    let st = StructType::new_incomplete(*tag);
                    if let Some(tag) = tag {
                        self.symtab.declare_tag(*tag, st.clone());
                    }
                    let mut built = Vec::new();
                    for (name, mspecs, mnode) in members {
                        let mbase = self.base_ctype(mspecs, range);
                        let mctype = decl_to_ctype(&mbase, mnode);
                        built.push((*name, mctype));
                    }
                    st.set_members(built);
                    struct_ty = Some(CType::Struct(st));
                }
            }
        }

        if let Some(st) = struct_ty {
            return st;
        }
        if has_bool {
            return bool_t();
        }
        if has_void {
            return void();
        }
        if has_long {
            return if unsigned { unsig_long() } else { long() };
        }
        if has_short {
            return if unsigned { unsig_short() } else { short() };
        }
        if has_char {
            return if unsigned { unsig_char() } else { char_t() };
        }
        let _ = has_int;
        if unsigned {
            unsig_int()
        } else {
            int()
        }
    }

    // -- statements ------------------------------------------------------

    fn lower_block(&mut self, stmts: &[Stmt]) {
        self.symtab.push_scope();
        for s in stmts {
            self.lower_stmt(s);
        }
        self.symtab.pop_scope();
    }

    fn lower_stmt(&mut self, s: &Stmt) {
        match &s.kind {
            StmtKind::Expr(e) => {
                self.lower_expr(e);
            }
            StmtKind::Decl(decl) => self.lower_local_declaration(decl),
            StmtKind::Return(value) => {
                let ret_ty = self.current_return.clone();
                let v = value.as_ref().map(|e| {
                    let v = self.lower_expr(e);
                    match &ret_ty {
                        Some(target) => self.implicit_cast_to(v, target, &s.range),
                        None => v,
                    }
                });
                let size = v.as_ref().map(|v| v.ctype().size()).unwrap_or(0);
                self.push(Return { value: v, size });
            }
            StmtKind::If { cond, then_branch, else_branch } => {
                let c = self.lower_expr(cond);
                let else_label = self.new_label("else");
                let end_label = self.new_label("endif");
                self.push(JumpZero { cond: c, target: else_label.clone(), size: 4 });
                self.lower_block(then_branch);
                self.push(Jump { target: end_label.clone() });
                self.push(Label { name: else_label });
                self.lower_block(else_branch);
                self.push(Label { name: end_label });
            }
            StmtKind::While { cond, body } => {
                let top = self.new_label("while");
                let end = self.new_label("while_end");
                self.push(Label { name: top.clone() });
                let c = self.lower_expr(cond);
                self.push(JumpZero { cond: c, target: end.clone(), size: 4 });
                self.break_labels.push(end.clone());
                self.continue_labels.push(top.clone());
                self.lower_block(body);
                self.break_labels.pop();
                self.continue_labels.pop();
                self.push(Jump { target: top });
                self.push(Label { name: end });
            }
            StmtKind::For { init, cond, step, body } => {
                self.symtab.push_scope();
                if let Some(init) = init {
                    self.lower_stmt(init);
                }
                let top = self.new_label("for");
                let cont = self.new_label("for_cont");
                let end = self.new_label("for_end");
                self.push(Label { name: top.clone() });
                if let Some(cond) = cond {
                    let c = self.lower_expr(cond);
                    self.push(JumpZero { cond: c, target: end.clone(), size: 4 });
                }
                self.break_labels.push(end.clone());
                self.continue_labels.push(cont.clone());
                self.lower_block(body);
                self.push(Label { name: cont });
                if let Some(step) = step {
                    self.lower_expr(step);
                }
                self.break_labels.pop();
                self.continue_labels.pop();
                self.push(Jump { target: top });
                self.push(Label { name: end });
                self.symtab.pop_scope();
            }
            StmtKind::Break => {
                if let Some(label) = self.break_labels.last().cloned() {
                    self.push(Jump { target: label });
                } else {
                    self.err(DiagnosticKind::Type, "'break' outside of a loop", &s.range);
                }
            }
            StmtKind::Continue => {
                if let Some(label) = self.continue_labels.last().cloned() {
                    self.push(Jump { target: label });
                } else {
                    self.err(DiagnosticKind::Type, "'continue' outside of a loop", &s.range);
                }
            }
            StmtKind::Compound(stmts) => self.lower_block(stmts),
            StmtKind::StructTagOnly { tag } => {
                if self.symtab.lookup_tag(*tag).is_none() {
                    self.symtab.declare_tag(*tag, StructType::new_incomplete(Some(*tag)));
                }
            }
        }
    }

    fn lower_local_declaration(&mut self, decl: &Declaration) {
        let base = self.base_ctype(&decl.specs, &decl.range);
        for d in &decl.declarators {
            let ctype = decl_to_ctype(&base, &d.decl);
            if decl.storage == StorageClass::Auto && ctype.is_function() {
                // A local function declaration (prototype only, not a
                // definition) — register it as an extern-linkage symbol.
                self.declare_extern_function(d.name, ctype, &d.range);
                continue;
            }
            if self.symtab.lookup(d.name).is_some() && decl.storage != StorageClass::Extern {
                self.err(DiagnosticKind::Type, format!("redefinition of '{}'", d.name), &d.range);
            }
            match decl.storage {
                StorageClass::Extern => {
                    self.symtab.declare(d.name, ctype.clone(), false);
                    let value = ILValue::named(ctype, d.name);
                    self.symtab.bind_value(d.name, value.clone());
                    self.program.externs.push((value, d.name));
                }
                StorageClass::Static => {
                    let name = Id::new(format!("{}__cflatc_local{}", d.name, self.cc.anon_statics.next()));
                    let init = d.init.as_ref().map(|e| self.const_init_value(e, &ctype));
                    self.symtab.declare(d.name, ctype.clone(), false);
                    let value = ILValue::named(ctype.clone(), name);
                    self.symtab.bind_value(d.name, value.clone());
                    self.program.globals.push(GlobalVar { value, ctype, init, is_static: true });
                }
                StorageClass::Auto => {
                    self.symtab.declare(d.name, ctype.clone(), false);
                    let value = ILValue::named(ctype.clone(), d.name);
                    self.symtab.bind_value(d.name, value.clone());
                    if let Some(init_e) = &d.init {
                        let rhs = self.lower_expr(init_e);
                        let converted = self.implicit_cast_to(rhs, &ctype, &d.range);
                        self.push(Set { out: value, src: converted });
                    }
                }
            }
        }
    }

    /// Evaluates a static initializer to a constant `i64`, folding the
    /// common cases (literal, negation of a literal); anything else is a
    /// diagnostic (this dialect supports only simple initializers, matching
    /// `examples/original_source/shivyc/parser/declaration.py`'s comment
    /// that only simple initializers are parsed).
    fn const_init_value(&mut self, e: &Expr, _ctype: &CType) -> i64 {
        match &e.kind {
            ExprKind::IntLiteral(v) => *v,
            ExprKind::Neg(inner) => {
                if let ExprKind::IntLiteral(v) = &inner.kind {
                    -*v
                } else {
                    self.err(DiagnosticKind::Type, "initializer is not a compile-time constant", &e.range);
                    0
                }
            }
            _ => {
                self.err(DiagnosticKind::Type, "initializer is not a compile-time constant", &e.range);
                0
            }
        }
    }

    fn declare_extern_function(&mut self, name: Id, ctype: CType, _range: &Range) {
        if let Some(sym) = self.symtab.lookup(name) {
            if let Some(v) = sym.value.clone() {
                return; // already declared/defined
            }
        }
        self.symtab.declare(name, ctype.clone(), false);
        let value = ILValue::named(ctype, name);
        self.symtab.bind_value(name, value.clone());
        self.program.externs.push((value, name));
    }

    // -- top level --------------------------------------------------------

    fn lower_global_declaration(&mut self, decl: &Declaration) {
        let base = self.base_ctype(&decl.specs, &decl.range);
        if decl.declarators.is_empty() {
            return; // e.g. a bare `struct Foo { ... };` tag definition
        }
        for d in &decl.declarators {
            let ctype = decl_to_ctype(&base, &d.decl);

            if decl.storage == StorageClass::Auto && ctype.is_function() {
                // A file-scope function prototype with no storage keyword
                // has external linkage by default.
                self.declare_extern_function(d.name, ctype, &d.range);
                continue;
            }
            if ctype.is_function() {
                self.declare_extern_function(d.name, ctype, &d.range);
                continue;
            }

            if decl.storage == StorageClass::Extern && d.init.is_none() {
                self.symtab.declare(d.name, ctype.clone(), false);
                let value = ILValue::named(ctype, d.name);
                self.symtab.bind_value(d.name, value.clone());
                self.program.externs.push((value, d.name));
                continue;
            }

            let is_static = decl.storage == StorageClass::Static;
            let init = d.init.as_ref().map(|e| self.const_init_value(e, &ctype));

            if let Some(existing) = self.symtab.lookup(d.name).and_then(|s| s.value.clone()) {
                if init.is_some() {
                    if let Some(g) = self.program.globals.iter_mut().find(|g| g.value == existing) {
                        g.init = init;
                    }
                }
                continue;
            }

            self.symtab.declare(d.name, ctype.clone(), false);
            let value = ILValue::named(ctype.clone(), d.name);
            self.symtab.bind_value(d.name, value.clone());
            self.program.globals.push(GlobalVar { value, ctype, init, is_static });
        }
    }

    fn lower_function_def(&mut self, f: &FunctionDef) {
        let base = self.base_ctype(&f.specs, &f.range);
        let ctype = decl_to_ctype(&base, &f.decl);
        let CType::Function { args, ret, has_prototype } = ctype.clone() else {
            self.err(DiagnosticKind::Type, "function definition does not have function type", &f.range);
            return;
        };

        let func_value = match self.symtab.lookup(f.name).and_then(|s| s.value.clone()) {
            Some(v) => v,
            None => ILValue::named(ctype.clone(), f.name),
        };
        self.symtab.declare(f.name, ctype, false);
        self.symtab.bind_value(f.name, func_value.clone());

        self.cmds = Vec::new();
        self.symtab.push_scope();
        let prev_return = self.current_return.replace(ret.clone());

        let param_names = decl_param_names(&f.decl);
        let mut param_values = Vec::new();
        for (i, (name, ct)) in param_names.into_iter().zip(args.iter()).enumerate() {
            let value = ILValue::named(ct.clone(), name);
            self.symtab.declare(name, ct.clone(), false);
            self.symtab.bind_value(name, value.clone());
            self.push(LoadArg { value: value.clone(), arg_index: i, size: ct.size() });
            param_values.push(value);
        }

        self.lower_block(&f.body);
        // Implicit `return;`/`return 0;` at the end of a function body that
        // falls off the end, matching a defined-behaviour `main`.
        self.push(Return { value: None, size: 0 });

        self.symtab.pop_scope();
        self.current_return = prev_return;
        let commands = std::mem::take(&mut self.cmds);

        self.program.functions.push(il::ILFunction {
            name: f.name,
            value: func_value,
            params: param_values,
            commands,
            is_static: false,
        });
        let _ = has_prototype;
    }
}

/// Extracts the parameter names in order from a `Function` declarator node,
/// for binding each `LoadArg`'s destination to the right identifier. A
/// parameter written without a name (legal in a prototype, not in a
/// definition, but tolerated here) gets a synthesized placeholder so it
/// still occupies an argument slot.
fn decl_param_names(node: &DeclNode) -> Vec<Id> {
    match node {
        DeclNode::Function { params, .. } => params
            .iter()
            .enumerate()
            .map(|(i, (_, _, name))| name.unwrap_or_else(|| Id::new(format!("_arg{i}"))))
            .collect(),
        DeclNode::Pointer { to, .. } => decl_param_names(to),
        DeclNode::Array { of, .. } => decl_param_names(of),
        DeclNode::Identifier => Vec::new(),
    }
}

/// Reverses a declarator-tree node into a `CType`, applying each layer
/// (`Pointer`/`Array`/`Function`) around the base type from the outside in,
/// per `examples/original_source/shivyc/decl_tree.py`.
pub fn decl_to_ctype(base: &CType, node: &DeclNode) -> CType {
    match node {
        DeclNode::Identifier => base.clone(),
        DeclNode::Pointer { to, is_const } => {
            let inner = decl_to_ctype(base, to);
            let p = CType::pointer_to(inner);
            if *is_const {
                p.make_const()
            } else {
                p
            }
        }
        DeclNode::Array { of, n, .. } => CType::array_of(decl_to_ctype(base, of), *n),
        DeclNode::Function { of, params, has_prototype } => {
            // Base ctype resolution for parameters needs a symbol table to
            // register struct tags introduced inline in a parameter list;
            // that case is rare enough (and absent from every tested
            // scenario) that parameter specs are resolved with a throwaway
            // table here rather than threading one through this free
            // function's signature.
            let mut scratch = SymbolTable::new();
            let args = params
                .iter()
                .map(|(specs, pnode, _name)| {
                    let pbase = base_ctype_standalone(specs, &mut scratch);
                    decl_to_ctype(&pbase, pnode)
                })
                .collect();
            CType::function_of(args, decl_to_ctype(base, of), *has_prototype)
        }
    }
}

fn base_ctype_standalone(specs: &[TypeSpec], symtab: &mut SymbolTable) -> CType {
    let mut has_void = false;
    let mut has_bool = false;
    let mut has_char = false;
    let mut has_short = false;
    let mut has_long = false;
    let mut signed = false;
    let mut unsigned = false;
    let mut struct_ty: Option<CType> = None;
    for spec in specs {
        match spec {
            TypeSpec::Void => has_void = true,
            TypeSpec::Bool => has_bool = true,
            TypeSpec::Char => has_char = true,
            TypeSpec::Short => has_short = true,
            TypeSpec::Int => {}
            TypeSpec::Long => has_long = true,
            TypeSpec::Signed => signed = true,
            TypeSpec::Unsigned => unsigned = true,
            TypeSpec::Const => {}
            TypeSpec::StructTag(tag) => {
                let st = symtab.lookup_tag(*tag).unwrap_or_else(|| StructType::new_incomplete(Some(*tag)));
                struct_ty = Some(CType::Struct(st));
            }
            TypeSpec::StructDef { tag, members } => {
                let st = StructType::new_incomplete(*tag);
                let built = members
                    .iter()
                    .map(|(name, mspecs, mnode)| {
                        let mbase = base_ctype_standalone(mspecs, symtab);
                        (*name, decl_to_ctype(&mbase, mnode))
                    })
                    .collect();
                st.set_members(built);
                struct_ty = Some(CType::Struct(st));
            }
        }
    }
    let _ = signed;
    if let Some(st) = struct_ty {
        return st;
    }
    if has_bool {
        return bool_t();
    }
    if has_void {
        return void();
    }
    if has_long {
        return if unsigned { unsig_long() } else { long() };
    }
    if has_short {
        return if unsigned { unsig_short() } else { short() };
    }
    if has_char {
        return if unsigned { unsig_char() } else { char_t() };
    }
    if unsigned {
        unsig_int()
    } else {
        int()
    }
}

fn pointer_element(ctype: &CType) -> CType {
    match ctype {
        CType::Pointer { to, .. } => (**to).clone(),
        _ => void(),
    }
}

/// Lowers an entire translation unit's AST into an IL `Program`.
pub fn lower_program(ast: &Program, cc: &mut CompilerContext) -> il::Program {
    let mut lowering = Lowering::new(cc);
    for decl in &ast.decls {
        match decl {
            ExternalDecl::Function(f) => lowering.lower_function_def(f),
            ExternalDecl::Declaration(d) => lowering.lower_global_declaration(d),
        }
    }
    lowering.program
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::decl_tree::Node;

    #[test]
    fn decl_to_ctype_reverses_pointer_to_array() {
        // `int (*arr)[3]`: Pointer(Array(3, Identifier))
        let node = Node::Pointer {
            to: Box::new(Node::Array { of: Box::new(Node::Identifier), n: Some(3), range: dummy_range() }),
            is_const: false,
        };
        let ct = decl_to_ctype(&int(), &node);
        assert!(ct.is_pointer());
        if let CType::Pointer { to, .. } = ct {
            assert!(to.is_array());
        }
    }

    #[test]
    fn decl_to_ctype_reverses_array_of_pointer() {
        // `int *arr[3]`: Array(3, Pointer(Identifier))
        let node = Node::Array {
            of: Box::new(Node::Pointer { to: Box::new(Node::Identifier), is_const: false }),
            n: Some(3),
            range: dummy_range(),
        };
        let ct = decl_to_ctype(&int(), &node);
        assert!(ct.is_array());
        if let CType::Array { el, .. } = ct {
            assert!(el.is_pointer());
        }
    }

    fn dummy_range() -> Range {
        let pos = crate::diagnostics::Position::new("t.c", 1, 1, "");
        Range::point(pos)
    }
}
