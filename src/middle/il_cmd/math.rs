//! Arithmetic and bitwise IL commands.
//!
//! Grounded on `examples/original_source/shivyc/il_cmds/math.py`: each
//! binary op prefers to reuse its left operand's spot as its output spot
//! (so `a = a + b` doesn't need an extra `mov`), and `Div`/`Mod` pin their
//! operands to `rax`/`rdx` because `idiv` hard-codes them.

use crate::back::asm::{AsmWriter, Cond};
use crate::back::spot::{Register, Spot};
use crate::common::Map;
use crate::middle::il::ILValue;
use crate::middle::il_cmd::ILCmd;

macro_rules! simple_binop {
    ($name:ident, $mnemonic:literal) => {
        #[derive(Debug)]
        pub struct $name {
            pub out: ILValue,
            pub lhs: ILValue,
            pub rhs: ILValue,
            pub size: u64,
        }

        impl ILCmd for $name {
            fn inputs(&self) -> Vec<ILValue> {
                vec![self.lhs.clone(), self.rhs.clone()]
            }
            fn outputs(&self) -> Vec<ILValue> {
                vec![self.out.clone()]
            }
            fn rel_spot_pref(&self) -> Vec<(ILValue, ILValue)> {
                vec![(self.out.clone(), self.lhs.clone())]
            }
            fn lower(
                &self,
                spots: &Map<ILValue, Spot>,
                _homes: &Map<ILValue, Spot>,
                _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
                out: &mut AsmWriter,
            ) {
                let dst = &spots[&self.out];
                let rhs = &spots[&self.rhs];
                out.mov(dst, &spots[&self.lhs], self.size);
                out.binop($mnemonic, dst, rhs, self.size);
            }
        }
    };
}

simple_binop!(Add, "add");
simple_binop!(Subtr, "sub");
simple_binop!(BitAnd, "and");
simple_binop!(BitOr, "or");
simple_binop!(BitXor, "xor");

#[derive(Debug)]
pub struct Mult {
    pub out: ILValue,
    pub lhs: ILValue,
    pub rhs: ILValue,
    pub size: u64,
}

impl ILCmd for Mult {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.lhs.clone(), self.rhs.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.out.clone()]
    }
    fn rel_spot_pref(&self) -> Vec<(ILValue, ILValue)> {
        vec![(self.out.clone(), self.lhs.clone())]
    }
    fn lower(
                &self,
                spots: &Map<ILValue, Spot>,
                _homes: &Map<ILValue, Spot>,
                _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
                out: &mut AsmWriter,
            ) {
        let dst = &spots[&self.out];
        let rhs = &spots[&self.rhs];
        out.mov(dst, &spots[&self.lhs], self.size);
        out.binop("imul", dst, rhs, self.size);
    }
}

/// Signed division. `idiv` divides `rdx:rax` by the operand and leaves the
/// quotient in `rax`, remainder in `rdx` — both are pinned absolute
/// preferences, and the two outputs conflict with each other so the
/// allocator never tries to coalesce them.
#[derive(Debug)]
pub struct Div {
    pub quotient: ILValue,
    pub remainder: ILValue,
    pub lhs: ILValue,
    pub rhs: ILValue,
    pub size: u64,
}

impl ILCmd for Div {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.lhs.clone(), self.rhs.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.quotient.clone(), self.remainder.clone()]
    }
    fn clobber(&self) -> Vec<Register> {
        vec![Register::Rax, Register::Rdx]
    }
    fn abs_spot_pref(&self) -> Vec<(ILValue, Spot)> {
        vec![
            (self.quotient.clone(), Spot::Register(Register::Rax)),
            (self.remainder.clone(), Spot::Register(Register::Rdx)),
            (self.lhs.clone(), Spot::Register(Register::Rax)),
        ]
    }
    fn rel_spot_conf(&self) -> Vec<(ILValue, ILValue)> {
        vec![(self.quotient.clone(), self.remainder.clone())]
    }
    fn abs_spot_conf(&self) -> Vec<(ILValue, Spot)> {
        vec![(self.rhs.clone(), Spot::Register(Register::Rax)), (self.rhs.clone(), Spot::Register(Register::Rdx))]
    }
    fn lower(
                &self,
                spots: &Map<ILValue, Spot>,
                _homes: &Map<ILValue, Spot>,
                _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
                out: &mut AsmWriter,
            ) {
        out.mov(&Spot::Register(Register::Rax), &spots[&self.lhs], self.size);
        out.cqo(self.size);
        out.idiv(&spots[&self.rhs], self.size);
    }
}

#[derive(Debug)]
pub struct Neg {
    pub out: ILValue,
    pub arg: ILValue,
    pub size: u64,
}

impl ILCmd for Neg {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.arg.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.out.clone()]
    }
    fn rel_spot_pref(&self) -> Vec<(ILValue, ILValue)> {
        vec![(self.out.clone(), self.arg.clone())]
    }
    fn lower(
                &self,
                spots: &Map<ILValue, Spot>,
                _homes: &Map<ILValue, Spot>,
                _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
                out: &mut AsmWriter,
            ) {
        out.mov(&spots[&self.out], &spots[&self.arg], self.size);
        out.unop("neg", &spots[&self.out], self.size);
    }
}

#[derive(Debug)]
pub struct BitNot {
    pub out: ILValue,
    pub arg: ILValue,
    pub size: u64,
}

impl ILCmd for BitNot {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.arg.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.out.clone()]
    }
    fn rel_spot_pref(&self) -> Vec<(ILValue, ILValue)> {
        vec![(self.out.clone(), self.arg.clone())]
    }
    fn lower(
                &self,
                spots: &Map<ILValue, Spot>,
                _homes: &Map<ILValue, Spot>,
                _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
                out: &mut AsmWriter,
            ) {
        out.mov(&spots[&self.out], &spots[&self.arg], self.size);
        out.unop("not", &spots[&self.out], self.size);
    }
}

/// Logical `!`: zero-extended boolean-not. `cmp 0` then `sete`.
#[derive(Debug)]
pub struct Not {
    pub out: ILValue,
    pub arg: ILValue,
    pub size: u64,
}

impl ILCmd for Not {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.arg.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.out.clone()]
    }
    fn lower(
                &self,
                spots: &Map<ILValue, Spot>,
                _homes: &Map<ILValue, Spot>,
                _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
                out: &mut AsmWriter,
            ) {
        out.cmp(&spots[&self.arg], &Spot::Literal(0), self.size);
        out.setcc(Cond::Eq, &spots[&self.out]);
        out.movzx(&spots[&self.out], &spots[&self.out], 8, 1);
    }
}

macro_rules! shift_op {
    ($name:ident, $mnemonic:literal) => {
        /// Shifts pin their count operand to `cl`, matching the hardware's
        /// single-operand shift-amount register.
        #[derive(Debug)]
        pub struct $name {
            pub out: ILValue,
            pub arg: ILValue,
            pub count: ILValue,
            pub size: u64,
        }

        impl ILCmd for $name {
            fn inputs(&self) -> Vec<ILValue> {
                vec![self.arg.clone(), self.count.clone()]
            }
            fn outputs(&self) -> Vec<ILValue> {
                vec![self.out.clone()]
            }
            fn rel_spot_pref(&self) -> Vec<(ILValue, ILValue)> {
                vec![(self.out.clone(), self.arg.clone())]
            }
            fn abs_spot_pref(&self) -> Vec<(ILValue, Spot)> {
                vec![(self.count.clone(), Spot::Register(Register::Rcx))]
            }
            fn clobber(&self) -> Vec<Register> {
                vec![Register::Rcx]
            }
            fn lower(
                &self,
                spots: &Map<ILValue, Spot>,
                _homes: &Map<ILValue, Spot>,
                _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
                out: &mut AsmWriter,
            ) {
                out.mov(&spots[&self.out], &spots[&self.arg], self.size);
                out.mov(&Spot::Register(Register::Rcx), &spots[&self.count], 4);
                out.shift($mnemonic, &spots[&self.out], &Spot::Register(Register::Rcx), self.size);
            }
        }
    };
}

shift_op!(LBitShift, "shl");
shift_op!(RBitShift, "sar");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::int;

    #[test]
    fn add_prefers_to_share_lhs_spot() {
        let out = ILValue::new(int());
        let lhs = ILValue::new(int());
        let rhs = ILValue::new(int());
        let cmd = Add { out: out.clone(), lhs: lhs.clone(), rhs: rhs.clone(), size: 4 };
        assert_eq!(cmd.rel_spot_pref(), vec![(out, lhs)]);
    }

    #[test]
    fn div_outputs_conflict_with_each_other() {
        let q = ILValue::new(int());
        let r = ILValue::new(int());
        let cmd = Div {
            quotient: q.clone(),
            remainder: r.clone(),
            lhs: ILValue::new(int()),
            rhs: ILValue::new(int()),
            size: 4,
        };
        assert_eq!(cmd.rel_spot_conf(), vec![(q, r)]);
        assert_eq!(cmd.clobber(), vec![Register::Rax, Register::Rdx]);
    }
}
