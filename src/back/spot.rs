//! The Spot model: abstract storage locations an `ILValue` can live in once
//! register allocation has run.
//!
//! Grounded on `examples/original_source/shivyc/spots.py`. A `Spot` is either
//! a physical register, a memory location addressed relative to a base
//! register (`[base + offset + chunk*count]`, used for both stack frames and
//! indexed/scaled addressing), or a literal value materialized directly as
//! an assembly immediate.

use std::fmt;

use crate::common::Id;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    Rax,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
}

impl Register {
    /// Every register the allocator may hand out. Matches
    /// `shivyc/spots.py`'s `registers` list exactly: `rbx`/`r12`-`r15` are
    /// callee-saved, and since nothing in this backend ever saves/restores
    /// callee-saved registers across a call, they are not allocatable.
    pub const ALLOCATABLE: &'static [Register] = &[
        Register::Rax,
        Register::Rcx,
        Register::Rdx,
        Register::Rsi,
        Register::Rdi,
        Register::R8,
        Register::R9,
        Register::R10,
        Register::R11,
    ];

    /// System V AMD64 integer argument-passing registers, in order.
    pub const ARG_REGS: &'static [Register] =
        &[Register::Rdi, Register::Rsi, Register::Rdx, Register::Rcx, Register::R8, Register::R9];

    pub const RETURN: Register = Register::Rax;

    /// A `call` clobbers every allocatable register — there is no disjoint
    /// callee-saved set for it to spare.
    pub const CALLER_SAVED: &'static [Register] = Register::ALLOCATABLE;

    fn att_name(self, size: u64) -> &'static str {
        use Register::*;
        match (self, size) {
            (Rax, 8) => "%rax", (Rax, 4) => "%eax", (Rax, 2) => "%ax", (Rax, 1) => "%al",
            (Rcx, 8) => "%rcx", (Rcx, 4) => "%ecx", (Rcx, 2) => "%cx", (Rcx, 1) => "%cl",
            (Rdx, 8) => "%rdx", (Rdx, 4) => "%edx", (Rdx, 2) => "%dx", (Rdx, 1) => "%dl",
            (Rsi, 8) => "%rsi", (Rsi, 4) => "%esi", (Rsi, 2) => "%si", (Rsi, 1) => "%sil",
            (Rdi, 8) => "%rdi", (Rdi, 4) => "%edi", (Rdi, 2) => "%di", (Rdi, 1) => "%dil",
            (Rbp, 8) => "%rbp", (Rbp, 4) => "%ebp", _ => "%rbp",
            (Rsp, 8) => "%rsp", (Rsp, 4) => "%esp", _ => "%rsp",
            (R8, 8) => "%r8", (R8, 4) => "%r8d", (R8, 2) => "%r8w", (R8, 1) => "%r8b",
            (R9, 8) => "%r9", (R9, 4) => "%r9d", (R9, 2) => "%r9w", (R9, 1) => "%r9b",
            (R10, 8) => "%r10", (R10, 4) => "%r10d", (R10, 2) => "%r10w", (R10, 1) => "%r10b",
            (R11, 8) => "%r11", (R11, 4) => "%r11d", (R11, 2) => "%r11w", (R11, 1) => "%r11b",
            _ => "%rax",
        }
    }

    fn intel_name(self, size: u64) -> &'static str {
        use Register::*;
        match (self, size) {
            (Rax, 8) => "rax", (Rax, 4) => "eax", (Rax, 2) => "ax", (Rax, 1) => "al",
            (Rcx, 8) => "rcx", (Rcx, 4) => "ecx", (Rcx, 2) => "cx", (Rcx, 1) => "cl",
            (Rdx, 8) => "rdx", (Rdx, 4) => "edx", (Rdx, 2) => "dx", (Rdx, 1) => "dl",
            (Rsi, 8) => "rsi", (Rsi, 4) => "esi", (Rsi, 2) => "si", (Rsi, 1) => "sil",
            (Rdi, 8) => "rdi", (Rdi, 4) => "edi", (Rdi, 2) => "di", (Rdi, 1) => "dil",
            (Rbp, 8) => "rbp", (Rbp, 4) => "ebp", _ => "rbp",
            (Rsp, 8) => "rsp", (Rsp, 4) => "esp", _ => "rsp",
            (R8, 8) => "r8", (R8, 4) => "r8d", (R8, 2) => "r8w", (R8, 1) => "r8b",
            (R9, 8) => "r9", (R9, 4) => "r9d", (R9, 2) => "r9w", (R9, 1) => "r9b",
            (R10, 8) => "r10", (R10, 4) => "r10d", (R10, 2) => "r10w", (R10, 1) => "r10b",
            (R11, 8) => "r11", (R11, 4) => "r11d", (R11, 2) => "r11w", (R11, 1) => "r11b",
            _ => "rax",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Syntax {
    Att,
    Intel,
}

/// What a `MemSpot` is addressed relative to: either a register (stack
/// frame slots, indexed addressing through a pointer value) or a named
/// symbol (globals, statics, string literals), matching
/// `examples/original_source/shivyc/spots.py`'s `MemSpot(base, ...)` where
/// `base` is "either a string or a Spot".
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Base {
    Reg(Register),
    Symbol(Id),
}

/// A memory operand: `base + offset + chunk*count`. `chunk`/`count` model
/// scaled-index addressing (array/pointer indexing); for a plain stack slot
/// `count` is `None`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemSpot {
    pub base: Base,
    pub offset: i64,
    pub chunk: Option<(u64, Register)>,
}

impl MemSpot {
    pub fn simple(base: Register, offset: i64) -> MemSpot {
        MemSpot { base: Base::Reg(base), offset, chunk: None }
    }

    pub fn indexed(base: Register, offset: i64, chunk: u64, count: Register) -> MemSpot {
        MemSpot { base: Base::Reg(base), offset, chunk: Some((chunk, count)) }
    }

    /// A symbol-relative spot: a global variable, static, or string literal,
    /// addressed by name rather than through a register.
    pub fn symbol(name: Id, offset: i64) -> MemSpot {
        MemSpot { base: Base::Symbol(name), offset, chunk: None }
    }

    fn render(&self, syntax: Syntax) -> String {
        let base_att = match &self.base {
            Base::Reg(r) => r.att_name(8).to_string(),
            Base::Symbol(name) => name.to_string(),
        };
        let base_intel = match &self.base {
            Base::Reg(r) => r.intel_name(8).to_string(),
            Base::Symbol(name) => name.to_string(),
        };
        match syntax {
            Syntax::Att => {
                let idx = match &self.chunk {
                    Some((chunk, reg)) => format!(",{},{chunk}", reg.att_name(8)),
                    None => String::new(),
                };
                if self.offset == 0 && idx.is_empty() {
                    match &self.base {
                        Base::Symbol(_) => base_att,
                        Base::Reg(_) => format!("({base_att})"),
                    }
                } else {
                    format!("{}({}{})", self.offset, base_att, idx)
                }
            }
            Syntax::Intel => {
                let mut s = format!("[{base_intel}");
                if let Some((chunk, reg)) = &self.chunk {
                    s += &format!(" + {}*{chunk}", reg.intel_name(8));
                }
                if self.offset != 0 {
                    s += &format!(" {} {}", if self.offset < 0 { "-" } else { "+" }, self.offset.abs());
                }
                s += "]";
                s
            }
        }
    }
}

/// Where an `ILValue` ends up living once allocation has run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Spot {
    Register(Register),
    Memory(MemSpot),
    /// An immediate value baked directly into the instruction stream.
    Literal(i64),
    /// A bare symbol address — used only for function values, which are
    /// called directly by name rather than dereferenced. Distinct from
    /// `Memory(MemSpot { base: Base::Symbol(_), .. })`, which denotes an
    /// actual storage location (a global variable or string literal).
    Label(Id),
}

impl Spot {
    pub fn is_register(&self) -> bool {
        matches!(self, Spot::Register(_))
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Spot::Memory(_))
    }

    /// Render this spot as an operand of the given `size` (in bytes), in the
    /// requested assembly syntax. `size` selects the register sub-name
    /// (`%rax`/`%eax`/`%ax`/`%al`) for register spots; memory/literal spots
    /// ignore it except that callers are expected to pick the matching
    /// mnemonic suffix/width prefix separately.
    pub fn render(&self, size: u64, syntax: Syntax) -> String {
        match self {
            Spot::Register(r) => match syntax {
                Syntax::Att => r.att_name(size).to_string(),
                Syntax::Intel => r.intel_name(size).to_string(),
            },
            Spot::Memory(m) => m.render(syntax),
            Spot::Literal(v) => match syntax {
                Syntax::Att => format!("${v}"),
                Syntax::Intel => v.to_string(),
            },
            Spot::Label(name) => match syntax {
                Syntax::Att => format!("${name}"),
                Syntax::Intel => format!("offset {name}"),
            },
        }
    }

    /// Shift a memory spot by a scaled index, e.g. to address `arr[i]` given
    /// `arr`'s base spot and `i`'s count register. Panics on non-memory
    /// spots; callers only call this once homes/lowering has established
    /// that the base is a memory location (SPEC_FULL.md §4.6 "address
    /// computation").
    pub fn shift(&self, chunk: u64, count: Register) -> Spot {
        match self {
            Spot::Memory(m) => Spot::Memory(MemSpot { chunk: Some((chunk, count)), ..m.clone() }),
            other => panic!("cannot scale-index a non-memory spot: {other:?}"),
        }
    }

    /// The `%rbp`-relative offset of a stack spot, used when building frame
    /// layout diagnostics and by `back::homes`.
    pub fn rbp_relative_offset(&self) -> Option<i64> {
        match self {
            Spot::Memory(m) if m.base == Base::Reg(Register::Rbp) => Some(m.offset),
            _ => None,
        }
    }
}

impl fmt::Display for Spot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(8, Syntax::Intel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_sub_names_scale_by_size() {
        assert_eq!(Register::Rax.att_name(8), "%rax");
        assert_eq!(Register::Rax.att_name(4), "%eax");
        assert_eq!(Register::Rax.att_name(1), "%al");
    }

    #[test]
    fn memory_spot_renders_in_both_syntaxes() {
        let m = Spot::Memory(MemSpot::simple(Register::Rbp, -8));
        assert_eq!(m.render(8, Syntax::Att), "-8(%rbp)");
        assert_eq!(m.render(8, Syntax::Intel), "[rbp - 8]");
    }

    #[test]
    fn shift_adds_scaled_index() {
        let base = Spot::Memory(MemSpot::simple(Register::Rbp, -16));
        let shifted = base.shift(4, Register::Rcx);
        assert_eq!(shifted.render(4, Syntax::Att), "-16(%rbp,%rcx,4)");
    }
}
