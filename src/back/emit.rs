//! The assembly emitter: walks one function's commands in program order,
//! calling each command's `lower` with the finalized spotmap and a register
//! vendor closure, per `examples/original_source/shivyc/asm_gen.py`'s
//! `_generate_asm`.

use std::panic::{self, AssertUnwindSafe};

use crate::back::alloc::{self, AllocStats};
use crate::back::asm::AsmWriter;
use crate::back::spot::{Register, Spot};
use crate::common::{Map, Set};
use crate::middle::il::{ILFunction, ILValue};

/// Compiles one function to assembly text appended onto `out`, returning the
/// allocator statistics for `-z-reg-alloc-perf`. `global_spotmap` is the
/// whole-program spotmap for literals/globals/string literals/function
/// labels (`back::globals::build`).
///
/// `get_reg`'s contract ("never hand back a register holding a value live
/// across this command unless that value is one of the command's own
/// outputs; `SpillRequired` if none exists") can legitimately fail — exactly
/// as `asm_gen.py`'s `get_reg` raises `NotImplementedError("spill required
/// for get_reg")` and lets it propagate as a Python exception rather than a
/// checked return value. The Rust mirror of that is a panic, caught here and
/// turned into the `Unsupported` diagnostic spec.md §7 requires.
pub fn compile_function(
    func: &ILFunction,
    global_spotmap: &Map<ILValue, Spot>,
    out: &mut AsmWriter,
) -> Result<AllocStats, String> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| compile_function_inner(func, global_spotmap, out)));
    match result {
        Ok(stats) => Ok(stats),
        Err(payload) => Err(describe_panic(&payload)),
    }
}

fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("register allocation failed for a function: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("register allocation failed for a function: {s}")
    } else {
        "register allocation failed for a function: spill required".to_string()
    }
}

fn compile_function_inner(
    func: &ILFunction,
    global_spotmap: &Map<ILValue, Spot>,
    out: &mut AsmWriter,
) -> AllocStats {
    let (alloc_result, home_map) = alloc::allocate(&func.commands, global_spotmap, 16);
    let spotmap = &alloc_result.spotmap;

    if func.is_static {
        out.label(&func.name);
    } else {
        out.global_label(&func.name);
    }
    out.push(Register::Rbp);
    out.mov(&Spot::Register(Register::Rbp), &Spot::Register(Register::Rsp), 8);
    if alloc_result.frame_size > 0 {
        out.sub_rsp(alloc_result.frame_size as i64);
    }

    for (i, cmd) in func.commands.iter().enumerate() {
        let live = &alloc_result.live[i];
        let live_across: Set<ILValue> = live.live_in.intersection(&live.live_out).cloned().collect();
        let outputs = cmd.outputs();
        let busy: Set<Register> = live_across
            .iter()
            .filter(|v| !outputs.contains(v))
            .filter_map(|v| spotmap.get(v))
            .filter_map(|s| if let Spot::Register(r) = s { Some(*r) } else { None })
            .collect();

        let mut get_reg = |pref: &[Register], forbidden: &[Register]| -> Register {
            for r in pref {
                if !busy.contains(r) && !forbidden.contains(r) {
                    return *r;
                }
            }
            for r in Register::ALLOCATABLE {
                if !busy.contains(r) && !forbidden.contains(r) {
                    return *r;
                }
            }
            panic!("spill required for get_reg")
        };

        cmd.lower(spotmap, &home_map, &mut get_reg, out);
    }

    alloc_result.stats
}
