//! The closed IL command taxonomy and the trait every command implements.
//!
//! Grounded on `examples/original_source/shivyc/il_cmds/base.py`: rather
//! than one big enum matched everywhere, each command is a small struct
//! implementing a common trait, so the register allocator
//! (`back::alloc`/`back::liveness`) can ask any command generic questions
//! (which values does it read/write, what does it clobber, what spots does
//! it prefer or forbid) without knowing the command's concrete shape.

pub mod compare;
pub mod control;
pub mod math;
pub mod value;

use std::fmt::Debug;

use crate::back::asm::AsmWriter;
use crate::back::spot::{Register, Spot};
use crate::common::Map;
use crate::middle::il::ILValue;

/// Implemented by every concrete IL command. Default methods cover the
/// common case ("touches no registers, has no spot preferences, is not a
/// label or jump"); commands override only what's relevant to them.
pub trait ILCmd: Debug {
    /// Values this command reads.
    fn inputs(&self) -> Vec<ILValue>;

    /// Values this command writes. A command's output is not live before
    /// the command executes even if the same `ILValue` also appears in
    /// `inputs` (this never happens in practice; IL generation always
    /// allocates a fresh temporary for a new definition).
    fn outputs(&self) -> Vec<ILValue>;

    /// Physical registers this command overwrites as a side effect beyond
    /// its declared outputs (e.g. `idiv` clobbers `rdx`, `call` clobbers
    /// the whole caller-saved set).
    fn clobber(&self) -> Vec<Register> {
        Vec::new()
    }

    /// Preferred spot for one of this command's *inputs*, relative to
    /// another of its inputs/outputs — used by the allocator's coalescing
    /// pass to avoid emitting a redundant `mov` (e.g. `Add`'s destination
    /// prefers to share a spot with its left operand).
    fn rel_spot_pref(&self) -> Vec<(ILValue, ILValue)> {
        Vec::new()
    }

    /// Preferred *absolute* spot for one of this command's values (e.g.
    /// `Call`'s arguments prefer the System V argument registers, its
    /// return value prefers `rax`).
    fn abs_spot_pref(&self) -> Vec<(ILValue, Spot)> {
        Vec::new()
    }

    /// Pairs of this command's own values that must NOT share a spot (e.g.
    /// `idiv`'s dividend/remainder outputs).
    fn rel_spot_conf(&self) -> Vec<(ILValue, ILValue)> {
        Vec::new()
    }

    /// Spots this command's values must NOT be assigned to, beyond the
    /// general clobber set (e.g. a shift count must not collide with `rcx`
    /// unless it IS the shift count).
    fn abs_spot_conf(&self) -> Vec<(ILValue, Spot)> {
        Vec::new()
    }

    /// Maps a value this command produces (or `None`, if it produces no
    /// pointer but still reaches into memory, e.g. `SetRel`/`ReadRel`) to the
    /// values whose *address* the command embeds. `back::homes` unions these
    /// to find every value that must be pre-assigned a permanent stack/data
    /// spot rather than floating freely between registers (you can't take
    /// the address of something that might be in `rax`).
    fn references(&self) -> Map<Option<ILValue>, Vec<ILValue>> {
        Map::new()
    }

    /// Values this command dereferences for reading (`ReadAt`/`ReadRel`),
    /// distinct from `inputs()` because an indirectly-read value must be
    /// homed to memory rather than kept purely in a register across the
    /// read (see `back::homes`).
    fn indir_read(&self) -> Vec<ILValue> {
        Vec::new()
    }

    /// Values this command dereferences for writing (`SetAt`/`SetRel`).
    fn indir_write(&self) -> Vec<ILValue> {
        Vec::new()
    }

    /// The label this command defines, if it's a `Label` command.
    fn label_name(&self) -> Option<&str> {
        None
    }

    /// Labels this command may transfer control to, if it's a jump/branch.
    fn targets(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Emit the assembly for this command.
    ///
    /// `spots` is the final spotmap every value (including this command's
    /// own inputs/outputs) was assigned. `homes` maps every value that was
    /// pre-homed to memory (`back::homes`) to that permanent spot — used by
    /// `AddrOf`/`AddrRel`/`SetRel`/`ReadRel` instead of `spots`, since a
    /// value's transient register spot is not a valid thing to take the
    /// address of. `get_reg` vends a scratch register on demand: given a
    /// preference order and a forbidden list, it returns an allocatable
    /// register not live across this command's boundary (besides this
    /// command's own outputs) and not in the forbidden list.
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        homes: &Map<ILValue, Spot>,
        get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    );
}
