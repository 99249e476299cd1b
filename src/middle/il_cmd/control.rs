//! Control-flow and call commands.
//!
//! Grounded on `examples/original_source/shivyc/il_cmds/control.py`: labels
//! and jumps are ordinary commands (not a separate basic-block graph), so
//! `back::liveness` recovers control flow by scanning `label_name()`/
//! `targets()` rather than consulting a CFG built during IL generation.

use crate::back::asm::AsmWriter;
use crate::back::spot::{Register, Spot};
use crate::common::Map;
use crate::middle::il::ILValue;
use crate::middle::il_cmd::ILCmd;

#[derive(Debug)]
pub struct Label {
    pub name: String,
}

impl ILCmd for Label {
    fn inputs(&self) -> Vec<ILValue> {
        Vec::new()
    }
    fn outputs(&self) -> Vec<ILValue> {
        Vec::new()
    }
    fn label_name(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn lower(
        &self,
        _spots: &Map<ILValue, Spot>,
        _homes: &Map<ILValue, Spot>,
        _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        out.label(&self.name);
    }
}

#[derive(Debug)]
pub struct Jump {
    pub target: String,
}

impl ILCmd for Jump {
    fn inputs(&self) -> Vec<ILValue> {
        Vec::new()
    }
    fn outputs(&self) -> Vec<ILValue> {
        Vec::new()
    }
    fn targets(&self) -> Vec<&str> {
        vec![&self.target]
    }
    fn lower(
        &self,
        _spots: &Map<ILValue, Spot>,
        _homes: &Map<ILValue, Spot>,
        _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        out.jmp(&self.target);
    }
}

#[derive(Debug)]
pub struct JumpZero {
    pub cond: ILValue,
    pub target: String,
    pub size: u64,
}

impl ILCmd for JumpZero {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.cond.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        Vec::new()
    }
    fn targets(&self) -> Vec<&str> {
        vec![&self.target]
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        _homes: &Map<ILValue, Spot>,
        _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        out.cmp(&spots[&self.cond], &Spot::Literal(0), self.size);
        out.jz(&self.target);
    }
}

#[derive(Debug)]
pub struct JumpNotZero {
    pub cond: ILValue,
    pub target: String,
    pub size: u64,
}

impl ILCmd for JumpNotZero {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.cond.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        Vec::new()
    }
    fn targets(&self) -> Vec<&str> {
        vec![&self.target]
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        _homes: &Map<ILValue, Spot>,
        _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        out.cmp(&spots[&self.cond], &Spot::Literal(0), self.size);
        out.jnz(&self.target);
    }
}

/// Returns from the current function. `value` is `None` for a `void`
/// function; otherwise it's moved into `rax` just before the epilogue.
/// Each `Return` inlines its own `mov rsp, rbp; pop rbp; ret` rather than
/// jumping to one shared epilogue label, matching `Return.make_asm` in
/// `shivyc/il_cmds/control.py` exactly.
#[derive(Debug)]
pub struct Return {
    pub value: Option<ILValue>,
    pub size: u64,
}

impl ILCmd for Return {
    fn inputs(&self) -> Vec<ILValue> {
        self.value.iter().cloned().collect()
    }
    fn outputs(&self) -> Vec<ILValue> {
        Vec::new()
    }
    fn clobber(&self) -> Vec<Register> {
        vec![Register::Rax]
    }
    fn abs_spot_pref(&self) -> Vec<(ILValue, Spot)> {
        self.value.iter().map(|v| (v.clone(), Spot::Register(Register::Rax))).collect()
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        _homes: &Map<ILValue, Spot>,
        _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        if let Some(v) = &self.value {
            out.mov(&Spot::Register(Register::Rax), &spots[v], self.size);
        }
        out.mov(&Spot::Register(Register::Rsp), &Spot::Register(Register::Rbp), 8);
        out.pop(Register::Rbp);
        out.ret();
    }
}

/// Binds one incoming parameter at function entry: moves it out of its ABI
/// argument register into wherever the allocator placed the parameter's
/// `ILValue`. Grounded on `LoadArg` in `shivyc/il_cmds/value.py` (there,
/// `LoadArg` is the *parameter-binding* command; outgoing call arguments are
/// staged directly inside `Call.make_asm`, mirrored below).
#[derive(Debug)]
pub struct LoadArg {
    pub value: ILValue,
    pub arg_index: usize,
    pub size: u64,
}

impl ILCmd for LoadArg {
    fn inputs(&self) -> Vec<ILValue> {
        Vec::new()
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.value.clone()]
    }
    fn clobber(&self) -> Vec<Register> {
        Register::ARG_REGS.get(self.arg_index).copied().into_iter().collect()
    }
    fn abs_spot_pref(&self) -> Vec<(ILValue, Spot)> {
        Register::ARG_REGS
            .get(self.arg_index)
            .map(|r| vec![(self.value.clone(), Spot::Register(*r))])
            .unwrap_or_default()
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        _homes: &Map<ILValue, Spot>,
        _get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        if let Some(reg) = Register::ARG_REGS.get(self.arg_index) {
            out.mov(&spots[&self.value], &Spot::Register(*reg), self.size);
        }
    }
}

/// A direct or indirect function call. `func` is the `ILValue` holding the
/// function's address (a global function symbol decays to its address the
/// same way an array does); `args` are passed in System V order, at most
/// six, all integer/pointer-class — enforced at IL-generation time in
/// `middle::lower`, matching the `NotImplementedError("too many arguments")`
/// raised by `shivyc/il_cmds/control.py`'s `Call.__init__`.
#[derive(Debug)]
pub struct Call {
    pub func: ILValue,
    pub args: Vec<ILValue>,
    pub ret: Option<ILValue>,
}

impl ILCmd for Call {
    fn inputs(&self) -> Vec<ILValue> {
        let mut v = vec![self.func.clone()];
        v.extend(self.args.iter().cloned());
        v
    }
    fn outputs(&self) -> Vec<ILValue> {
        self.ret.iter().cloned().collect()
    }
    fn clobber(&self) -> Vec<Register> {
        Register::CALLER_SAVED.to_vec()
    }
    fn abs_spot_pref(&self) -> Vec<(ILValue, Spot)> {
        let mut v: Vec<(ILValue, Spot)> =
            self.ret.iter().map(|r| (r.clone(), Spot::Register(Register::Rax))).collect();
        v.extend(
            self.args.iter().zip(Register::ARG_REGS.iter()).map(|(a, r)| (a.clone(), Spot::Register(*r))),
        );
        v
    }
    fn abs_spot_conf(&self) -> Vec<(ILValue, Spot)> {
        Register::ARG_REGS
            .iter()
            .take(self.args.len())
            .map(|r| (self.func.clone(), Spot::Register(*r)))
            .collect()
    }
    fn indir_read(&self) -> Vec<ILValue> {
        self.args.clone()
    }
    fn indir_write(&self) -> Vec<ILValue> {
        self.args.clone()
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        _homes: &Map<ILValue, Spot>,
        get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        let used_arg_regs: Vec<Register> = Register::ARG_REGS.iter().take(self.args.len()).copied().collect();

        let mut func_spot = spots[&self.func].clone();
        if let Spot::Register(r) = &func_spot {
            if used_arg_regs.contains(r) {
                let r = get_reg(&[], &used_arg_regs);
                out.mov(&Spot::Register(r), &func_spot, 8);
                func_spot = Spot::Register(r);
            }
        }

        for (arg, reg) in self.args.iter().zip(Register::ARG_REGS.iter()) {
            let arg_spot = spots[arg].clone();
            if arg_spot != Spot::Register(*reg) {
                out.mov(&Spot::Register(*reg), &arg_spot, arg.ctype().size());
            }
        }

        if let Spot::Label(name) = &func_spot {
            out.call(name.as_str());
        } else {
            out.call_indirect(&func_spot);
        }

        if let Some(ret) = &self.ret {
            let ret_spot = spots[ret].clone();
            if ret_spot != Spot::Register(Register::Rax) {
                out.mov(&ret_spot, &Spot::Register(Register::Rax), ret.ctype().size());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::int;

    #[test]
    fn jump_reports_its_target() {
        let j = Jump { target: "L1".to_string() };
        assert_eq!(j.targets(), vec!["L1"]);
    }

    #[test]
    fn call_clobbers_the_caller_saved_set() {
        let c = Call { func: ILValue::new(int()), args: Vec::new(), ret: None };
        assert_eq!(c.clobber(), Register::CALLER_SAVED.to_vec());
    }

    #[test]
    fn call_keeps_func_away_from_registers_its_args_will_use() {
        let func = ILValue::new(int());
        let a0 = ILValue::new(int());
        let c = Call { func: func.clone(), args: vec![a0.clone()], ret: None };
        assert_eq!(c.abs_spot_conf(), vec![(func, Spot::Register(Register::Rdi))]);
    }
}
