//! Home-spot pre-allocation: values that must live at a fixed, permanent
//! stack location rather than floating between registers.
//!
//! Grounded on the address-taken/odd-size scan at the top of
//! `examples/original_source/shivyc/asm_gen.py`'s `ASMGen._make_asm`. Two
//! kinds of value need a home: anything whose address is embedded in an
//! `AddrOf`/`AddrRel`/`SetRel`/`ReadRel` (you can't take the address of a
//! register), and anything whose size isn't 1, 2, 4, or 8 bytes (structs and
//! arrays — a real register can't hold them at all).

use crate::back::spot::{MemSpot, Register, Spot};
use crate::common::{Map, Set};
use crate::middle::il::ILValue;
use crate::middle::il_cmd::ILCmd;

/// Values every command's `references()` names as an address target, plus
/// every value whose size is not a power-of-two register width.
pub fn needs_home(commands: &[Box<dyn ILCmd>], free_values: &Set<ILValue>) -> Set<ILValue> {
    let mut needed = Set::new();
    for cmd in commands {
        for targets in cmd.references().values() {
            for v in targets {
                needed.insert(v.clone());
            }
        }
    }
    for v in free_values {
        if !matches!(v.ctype().size(), 1 | 2 | 4 | 8) {
            needed.insert(v.clone());
        }
    }
    needed
}

/// Assigns each value in `needed` a permanent `[rbp - offset]` spot, growing
/// `offset` (the running frame size in bytes, starting from `start_offset`)
/// by each value's size. Returns the home map and the updated offset so the
/// allocator can continue assigning spill slots from the same counter.
pub fn assign_homes(needed: &Set<ILValue>, start_offset: u64) -> (Map<ILValue, Spot>, u64) {
    let mut homes = Map::new();
    let mut offset = start_offset;
    for v in needed {
        offset += v.ctype().size();
        homes.insert(v.clone(), Spot::Memory(MemSpot::simple(Register::Rbp, -(offset as i64))));
    }
    (homes, offset)
}
