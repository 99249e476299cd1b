//! Comparison commands, each producing a 0/1 integer result.
//!
//! Grounded on `examples/original_source/shivyc/il_cmds/compare.py`: every
//! comparison lowers to `cmp` + the matching `setcc` + zero-extend, rather
//! than a conditional jump, so comparisons compose as ordinary expressions
//! (`if (a < b && c > d)` needs the boolean value, not just a branch).

use crate::back::asm::{AsmWriter, Cond};
use crate::back::spot::{Register, Spot};
use crate::common::Map;
use crate::middle::il::ILValue;
use crate::middle::il_cmd::ILCmd;

macro_rules! cmp_op {
    ($name:ident, $cond:expr) => {
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
            fn rel_spot_conf(&self) -> Vec<(ILValue, ILValue)> {
                vec![(self.out.clone(), self.lhs.clone()), (self.out.clone(), self.rhs.clone())]
            }
            fn lower(
                &self,
                spots: &Map<ILValue, Spot>,
                _homes: &Map<ILValue, Spot>,
                _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
                out: &mut AsmWriter,
            ) {
                out.cmp(&spots[&self.lhs], &spots[&self.rhs], self.size);
                out.setcc($cond, &spots[&self.out]);
                out.movzx(&spots[&self.out], &spots[&self.out], 8, 1);
            }
        }
    };
}

cmp_op!(EqualCmp, Cond::Eq);
cmp_op!(NotEqualCmp, Cond::Ne);
cmp_op!(LessCmp, Cond::Lt);
cmp_op!(GreaterCmp, Cond::Gt);
cmp_op!(LessOrEqCmp, Cond::Le);
cmp_op!(GreaterOrEqCmp, Cond::Ge);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::int;

    #[test]
    fn less_cmp_reads_both_operands() {
        let lhs = ILValue::new(int());
        let rhs = ILValue::new(int());
        let cmd = LessCmp { out: ILValue::new(int()), lhs: lhs.clone(), rhs: rhs.clone(), size: 4 };
        assert_eq!(cmd.inputs(), vec![lhs, rhs]);
    }
}
