//! x86-64 assembly file writer.
//!
//! Generalized from the teacher crate's RISC-V backend (`Program`/
//! `Instruction`/register-file setup) to emit AT&T or Intel syntax for the
//! System V AMD64 ABI. Unlike the teacher's backend, allocation is not
//! fused into code generation here: by the time `AsmWriter` methods are
//! called, `back::alloc` has already produced a final spotmap, and
//! `il_cmd::*::lower` calls translate one IL command at a time into the
//! instruction text this writer accumulates (SPEC_FULL.md §4.9).

use std::fmt::Write as _;

use crate::back::spot::{Register, Spot, Syntax};
use crate::common::Id;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cond {
    fn suffix(self) -> &'static str {
        match self {
            Cond::Eq => "e",
            Cond::Ne => "ne",
            Cond::Lt => "l",
            Cond::Le => "le",
            Cond::Gt => "g",
            Cond::Ge => "ge",
        }
    }
}

fn size_suffix(size: u64) -> &'static str {
    match size {
        1 => "b",
        2 => "w",
        4 => "l",
        8 => "q",
        _ => "q",
    }
}

fn size_ptr(size: u64) -> &'static str {
    match size {
        1 => "byte ptr",
        2 => "word ptr",
        4 => "dword ptr",
        8 => "qword ptr",
        _ => "qword ptr",
    }
}

/// Accumulates emitted assembly text for one function at a time, in the
/// syntax the driver was asked to produce. `il_cmd::*::lower` implementations
/// call the mnemonic-shaped methods below rather than formatting strings
/// themselves, so indentation/syntax differences live in exactly one place.
pub struct AsmWriter {
    syntax: Syntax,
    text: String,
    data: String,
    bss: String,
}

impl AsmWriter {
    pub fn new(syntax: Syntax) -> Self {
        AsmWriter { syntax, text: String::new(), data: String::new(), bss: String::new() }
    }

    fn operand(&self, spot: &Spot, size: u64) -> String {
        let rendered = spot.render(size, self.syntax);
        if self.syntax == Syntax::Intel && spot.is_memory() {
            format!("{} {}", size_ptr(size), rendered)
        } else {
            rendered
        }
    }

    fn mnemonic(&self, base: &str, size: u64) -> String {
        match self.syntax {
            Syntax::Att => format!("{base}{}", size_suffix(size)),
            Syntax::Intel => base.to_string(),
        }
    }

    fn emit2(&mut self, mnemonic: &str, dst: &str, src: &str) {
        match self.syntax {
            Syntax::Att => writeln!(self.text, "    {mnemonic} {src}, {dst}").unwrap(),
            Syntax::Intel => writeln!(self.text, "    {mnemonic} {dst}, {src}").unwrap(),
        }
    }

    fn emit1(&mut self, mnemonic: &str, operand: &str) {
        writeln!(self.text, "    {mnemonic} {operand}").unwrap();
    }

    fn emit0(&mut self, mnemonic: &str) {
        writeln!(self.text, "    {mnemonic}").unwrap();
    }

    pub fn label(&mut self, name: &str) {
        writeln!(self.text, "{name}:").unwrap();
    }

    pub fn comment(&mut self, text: &str) {
        writeln!(self.text, "    # {text}").unwrap();
    }

    pub fn global_label(&mut self, name: &str) {
        writeln!(self.text, ".globl {name}").unwrap();
        writeln!(self.text, "{name}:").unwrap();
    }

    pub fn mov(&mut self, dst: &Spot, src: &Spot, size: u64) {
        if dst == src {
            return;
        }
        let m = self.mnemonic("mov", size);
        let (d, s) = (self.operand(dst, size), self.operand(src, size));
        self.emit2(&m, &d, &s);
    }

    pub fn lea(&mut self, dst: &Spot, src: &Spot) {
        let (d, s) = (self.operand(dst, 8), self.operand(src, 8));
        self.emit2("lea", &d, &s);
    }

    pub fn binop(&mut self, mnemonic_base: &str, dst: &Spot, src: &Spot, size: u64) {
        let m = self.mnemonic(mnemonic_base, size);
        let (d, s) = (self.operand(dst, size), self.operand(src, size));
        self.emit2(&m, &d, &s);
    }

    /// `shl`/`sar`/`shr`: the shift-count operand is always the 8-bit `cl`
    /// register, independent of the destination's operand size.
    pub fn shift(&mut self, mnemonic_base: &str, dst: &Spot, count: &Spot, size: u64) {
        let m = self.mnemonic(mnemonic_base, size);
        let (d, s) = (self.operand(dst, size), self.operand(count, 1));
        self.emit2(&m, &d, &s);
    }

    pub fn unop(&mut self, mnemonic_base: &str, operand: &Spot, size: u64) {
        let m = self.mnemonic(mnemonic_base, size);
        let o = self.operand(operand, size);
        self.emit1(&m, &o);
    }

    pub fn idiv(&mut self, divisor: &Spot, size: u64) {
        let m = self.mnemonic("idiv", size);
        let o = self.operand(divisor, size);
        self.emit1(&m, &o);
    }

    pub fn cqo(&mut self, size: u64) {
        let m = match size {
            4 => "cdq",
            2 => "cwd",
            _ => "cqo",
        };
        self.emit0(m);
    }

    pub fn cmp(&mut self, lhs: &Spot, rhs: &Spot, size: u64) {
        self.binop("cmp", lhs, rhs, size);
    }

    pub fn setcc(&mut self, cond: Cond, dst: &Spot) {
        let mnemonic = format!("set{}", cond.suffix());
        let d = self.operand(dst, 1);
        self.emit1(&mnemonic, &d);
    }

    pub fn movzx(&mut self, dst: &Spot, src: &Spot, dst_size: u64, src_size: u64) {
        let m = match self.syntax {
            Syntax::Att => format!("movz{}{}", size_suffix(src_size), size_suffix(dst_size)),
            Syntax::Intel => "movzx".to_string(),
        };
        let (d, s) = (self.operand(dst, dst_size), self.operand(src, src_size));
        self.emit2(&m, &d, &s);
    }

    /// Sign-extending move. `movsxd` (not `movsx`) is the 32-to-64 mnemonic
    /// on both syntaxes, so it needs its own case.
    pub fn movsx(&mut self, dst: &Spot, src: &Spot, dst_size: u64, src_size: u64) {
        let m = match self.syntax {
            Syntax::Att if src_size == 4 => "movslq".to_string(),
            Syntax::Att => format!("movs{}{}", size_suffix(src_size), size_suffix(dst_size)),
            Syntax::Intel if src_size == 4 => "movsxd".to_string(),
            Syntax::Intel => "movsx".to_string(),
        };
        let (d, s) = (self.operand(dst, dst_size), self.operand(src, src_size));
        self.emit2(&m, &d, &s);
    }

    pub fn jmp(&mut self, label: &str) {
        self.emit1("jmp", label);
    }

    pub fn jz(&mut self, label: &str) {
        self.emit1("jz", label);
    }

    pub fn jnz(&mut self, label: &str) {
        self.emit1("jnz", label);
    }

    pub fn call(&mut self, target: &str) {
        self.emit1("call", target);
    }

    pub fn call_indirect(&mut self, spot: &Spot) {
        let o = self.operand(spot, 8);
        let o = if self.syntax == Syntax::Att { format!("*{o}") } else { o };
        self.emit1("call", &o);
    }

    pub fn ret(&mut self) {
        self.emit0("ret");
    }

    pub fn push(&mut self, reg: Register) {
        let s = Spot::Register(reg).render(8, self.syntax);
        self.emit1("push", &s);
    }

    pub fn pop(&mut self, reg: Register) {
        let s = Spot::Register(reg).render(8, self.syntax);
        self.emit1("pop", &s);
    }

    pub fn sub_rsp(&mut self, bytes: i64) {
        let m = self.mnemonic("sub", 8);
        let rsp = Spot::Register(Register::Rsp).render(8, self.syntax);
        let imm = Spot::Literal(bytes).render(8, self.syntax);
        self.emit2(&m, &rsp, &imm);
    }

    pub fn add_rsp(&mut self, bytes: i64) {
        let m = self.mnemonic("add", 8);
        let rsp = Spot::Register(Register::Rsp).render(8, self.syntax);
        let imm = Spot::Literal(bytes).render(8, self.syntax);
        self.emit2(&m, &rsp, &imm);
    }

    pub fn raw_line(&mut self, line: &str) {
        writeln!(self.text, "{line}").unwrap();
    }

    pub fn reserve_bss(&mut self, name: &Id, size: u64, align: u64) {
        writeln!(self.bss, ".align {align}").unwrap();
        writeln!(self.bss, ".globl {name}").unwrap();
        writeln!(self.bss, "{name}:").unwrap();
        writeln!(self.bss, "    .zero {size}").unwrap();
    }

    pub fn define_data(&mut self, name: &Id, size: u64, value: i64) {
        writeln!(self.data, ".globl {name}").unwrap();
        writeln!(self.data, "{name}:").unwrap();
        let directive = match size {
            1 => ".byte",
            2 => ".word",
            4 => ".long",
            _ => ".quad",
        };
        writeln!(self.data, "    {directive} {value}").unwrap();
    }

    pub fn define_string(&mut self, name: &Id, bytes: &[u8]) {
        writeln!(self.data, "{name}:").unwrap();
        write!(self.data, "    .byte ").unwrap();
        let rendered: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
        writeln!(self.data, "{}", rendered.join(",")).unwrap();
    }

    /// Finish and assemble the full `.s` file text: an `intel_syntax`
    /// directive when requested, then `.data`/`.bss`/`.text` sections in
    /// that order.
    pub fn finish(self) -> String {
        let mut out = String::new();
        if self.syntax == Syntax::Intel {
            writeln!(out, ".intel_syntax noprefix").unwrap();
        }
        if !self.data.is_empty() {
            writeln!(out, ".data").unwrap();
            out.push_str(&self.data);
        }
        if !self.bss.is_empty() {
            writeln!(out, ".bss").unwrap();
            out.push_str(&self.bss);
        }
        writeln!(out, ".text").unwrap();
        out.push_str(&self.text);
        if self.syntax == Syntax::Intel {
            writeln!(out, ".att_syntax noprefix").unwrap();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::spot::MemSpot;

    #[test]
    fn att_mov_places_src_before_dst() {
        let mut w = AsmWriter::new(Syntax::Att);
        w.mov(&Spot::Register(Register::Rax), &Spot::Literal(5), 8);
        assert!(w.text.contains("movq $5, %rax"));
    }

    #[test]
    fn intel_mov_places_dst_before_src() {
        let mut w = AsmWriter::new(Syntax::Intel);
        w.mov(&Spot::Register(Register::Rax), &Spot::Literal(5), 8);
        assert!(w.text.contains("mov rax, 5"));
    }

    #[test]
    fn intel_memory_operand_gets_size_prefix() {
        let mut w = AsmWriter::new(Syntax::Intel);
        let mem = Spot::Memory(MemSpot::simple(Register::Rbp, -4));
        w.mov(&mem, &Spot::Register(Register::Rax), 4);
        assert!(w.text.contains("dword ptr [rbp - 4]"));
    }
}
