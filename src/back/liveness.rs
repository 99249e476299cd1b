//! Liveness analysis: a backward dataflow fixed point over one function's
//! flat command list.
//!
//! Grounded on `examples/original_source/shivyc/asm_gen.py`'s
//! `ASMGen._get_live_vars`: rather than building a basic-block CFG, this
//! walks the command list directly, resolving jump targets by label name.
//! `live_in[i] = (live_out[i] \ outputs[i]) ∪ inputs[i]`, and `live_out[i]`
//! is the union of `live_in[j]` over every successor `j` (the next command,
//! unless this command is an unconditional jump; every `targets()` label).

use crate::common::{Map, Set};
use crate::middle::il::ILValue;
use crate::middle::il_cmd::ILCmd;

/// `(live_in, live_out)` for one command, restricted to the "free" value set
/// the allocator actually colors (globals/literals are excluded — they have
/// a fixed spot regardless of liveness).
#[derive(Clone, Default)]
pub struct LiveSet {
    pub live_in: Set<ILValue>,
    pub live_out: Set<ILValue>,
}

/// Computes per-command liveness for `commands`, restricted to `free_values`.
/// `free_values` should be every value actually worth coloring — globals and
/// literals are typically excluded by the caller since their spot is fixed.
pub fn analyze(commands: &[Box<dyn ILCmd>], free_values: &Set<ILValue>) -> Vec<LiveSet> {
    let mut labels: Map<&str, usize> = Map::new();
    for (i, cmd) in commands.iter().enumerate() {
        if let Some(name) = cmd.label_name() {
            labels.insert(name, i);
        }
    }

    let mut live = vec![LiveSet::default(); commands.len()];

    loop {
        let mut changed = false;
        for i in (0..commands.len()).rev() {
            let cmd = &commands[i];

            let mut live_out: Set<ILValue> = Set::new();
            let falls_through = !is_unconditional(cmd.as_ref());
            if falls_through && i + 1 < commands.len() {
                live_out.extend(live[i + 1].live_in.iter().cloned());
            }
            for target in cmd.targets() {
                if let Some(&j) = labels.get(target) {
                    live_out.extend(live[j].live_in.iter().cloned());
                }
            }

            let mut live_in = live_out.clone();
            for input in cmd.inputs() {
                if free_values.contains(&input) {
                    live_in.insert(input);
                }
            }
            for output in cmd.outputs() {
                live_in.remove(&output);
            }

            if live_in != live[i].live_in || live_out != live[i].live_out {
                changed = true;
            }
            live[i].live_in = live_in;
            live[i].live_out = live_out;
        }
        if !changed {
            break;
        }
    }

    live
}

/// True for commands that never fall through to the next instruction (plain
/// `Jump`). Everything else — including conditional jumps — also falls
/// through, so both successors contribute to `live_out`.
fn is_unconditional(cmd: &dyn ILCmd) -> bool {
    cmd.targets().len() == 1 && cmd.inputs().is_empty() && cmd.outputs().is_empty() && cmd.label_name().is_none()
}
