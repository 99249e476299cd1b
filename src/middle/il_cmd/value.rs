//! Value-movement, addressing, and indirection commands.
//!
//! Grounded on `examples/original_source/shivyc/il_cmds/value.py`: `Set` is
//! the IL's only plain register-or-memory move, `AddrOf`/`ReadAt`/`SetAt`
//! model pointer dereference at a stable address, and `SetRel`/`ReadRel`/
//! `AddrRel` model the `base + offset` addressing struct member access and
//! array indexing lower to (SPEC_FULL.md §4.6).

use crate::back::asm::{AsmWriter, Cond};
use crate::back::spot::{MemSpot, Register, Spot};
use crate::common::Map;
use crate::middle::il::ILValue;
use crate::middle::il_cmd::ILCmd;
use crate::types::CType;

/// Registers among `spots` a scratch register must avoid, for `get_reg`'s
/// forbidden list (only `Spot::Register` operands name a register; memory
/// and literal operands impose no such constraint).
fn forbid(spots: &[&Spot]) -> Vec<Register> {
    spots.iter().filter_map(|s| if let Spot::Register(r) = s { Some(*r) } else { None }).collect()
}

/// Moves `size` bytes from `src` to `dst`, one maximal chunk at a time
/// (8, then 4, then 2, then 1 byte), staging through `reg` when neither side
/// is already in a register. Mirrors `shivyc/il_cmds/value.py`'s
/// `_ValueCmd.move_data`: a struct/array assignment of an odd size (e.g. 3
/// bytes) moves a 2-byte chunk then a 1-byte chunk, each at the appropriate
/// shifted offset. A literal source is only valid for the first chunk (a
/// multi-byte literal can't be re-sliced), so after the first move `src` is
/// replaced with `reg`.
fn move_data(dst: &Spot, src: &Spot, size: u64, reg: Register, out: &mut AsmWriter) {
    let mut offset = 0u64;
    let mut cur_src = src.clone();
    while offset < size {
        let remaining = size - offset;
        let chunk = if remaining >= 8 {
            8
        } else if remaining >= 4 {
            4
        } else if remaining >= 2 {
            2
        } else {
            1
        };

        let dst_chunk = shift_spot(dst, offset);
        let src_chunk = shift_spot(&cur_src, offset);

        if dst_chunk.is_memory() && src_chunk.is_memory() {
            out.mov(&Spot::Register(reg), &src_chunk, chunk);
            out.mov(&dst_chunk, &Spot::Register(reg), chunk);
        } else {
            out.mov(&dst_chunk, &src_chunk, chunk);
        }

        if matches!(cur_src, Spot::Literal(_)) {
            cur_src = Spot::Register(reg);
        }
        offset += chunk;
    }
}

fn shift_spot(spot: &Spot, offset: u64) -> Spot {
    if offset == 0 {
        return spot.clone();
    }
    match spot {
        Spot::Memory(m) => Spot::Memory(MemSpot { offset: m.offset + offset as i64, ..m.clone() }),
        other => other.clone(),
    }
}

/// Converts `src` to `out`'s ctype: any legal scalar conversion. Unlike every
/// other IL command, `Set`'s sizes are not given by the caller — they're
/// read straight off `out`/`src`'s own ctypes, since that's what determines
/// whether this is a truncation, a sign/zero-extending widening, or a
/// `_Bool` normalization.
#[derive(Debug)]
pub struct Set {
    pub out: ILValue,
    pub src: ILValue,
}

impl Set {
    fn is_bool_target(&self) -> bool {
        matches!(self.out.ctype(), CType::Bool)
    }
}

impl ILCmd for Set {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.src.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.out.clone()]
    }
    fn rel_spot_pref(&self) -> Vec<(ILValue, ILValue)> {
        // A `_Bool` target reads `src` only after first clobbering `out`
        // with a trial zero (see `lower`'s `_set_bool` path below), so it
        // must not share `src`'s spot.
        if self.is_bool_target() { Vec::new() } else { vec![(self.out.clone(), self.src.clone())] }
    }
    fn rel_spot_conf(&self) -> Vec<(ILValue, ILValue)> {
        if self.is_bool_target() { vec![(self.out.clone(), self.src.clone())] } else { Vec::new() }
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        _homes: &Map<ILValue, Spot>,
        get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        let dst = spots[&self.out].clone();
        let src = spots[&self.src].clone();
        let out_size = self.out.ctype().size();
        let src_size = self.src.ctype().size();

        if self.is_bool_target() {
            return self.lower_bool(&dst, &src, src_size, get_reg, out);
        }

        if matches!(src, Spot::Literal(_)) {
            out.mov(&dst, &src, out_size);
            return;
        }

        if out_size <= src_size {
            if dst == src {
                return;
            }
            let reg = match (&dst, &src) {
                (Spot::Register(r), _) => *r,
                (_, Spot::Register(r)) => *r,
                _ => get_reg(&[], &forbid(&[&dst, &src])),
            };
            move_data(&dst, &src, out_size, reg, out);
        } else {
            // Widening: MOVSX for a signed source, a plain 32-bit MOV for an
            // unsigned 4-byte source (which the hardware already
            // zero-extends into the full 64-bit register), MOVZX otherwise.
            let reg = get_reg(&[], &forbid(&[&dst, &src]));
            if self.src.ctype().signed() {
                out.movsx(&Spot::Register(reg), &src, out_size, src_size);
            } else if src_size == 4 {
                out.mov(&Spot::Register(reg), &src, 4);
            } else {
                out.movzx(&Spot::Register(reg), &src, out_size, src_size);
            }
            if Spot::Register(reg) != dst {
                out.mov(&dst, &Spot::Register(reg), out_size);
            }
        }
    }
}

impl Set {
    /// `_Bool` normalization: any nonzero scalar becomes `1`, zero stays `0`.
    /// Grounded on `shivyc/il_cmds/value.py`'s `Set._set_bool` (which does
    /// this with a compare-and-branch), re-expressed with the cmp+setcc
    /// idiom this crate already uses for `Not` and the comparison commands
    /// (`il_cmd::math::Not`, `il_cmd::compare`) instead of introducing a
    /// fresh branch target.
    fn lower_bool(
        &self,
        dst: &Spot,
        src: &Spot,
        src_size: u64,
        get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        let staged;
        let src = if matches!(src, Spot::Literal(_)) {
            let r = get_reg(&[], &forbid(&[dst]));
            out.mov(&Spot::Register(r), src, src_size);
            staged = Spot::Register(r);
            &staged
        } else {
            src
        };
        out.cmp(src, &Spot::Literal(0), src_size);
        out.setcc(Cond::Ne, dst);
    }
}

/// Materializes the address of `target` into `out`. `target` must be homed
/// to memory (never a register) — enforced by `back::homes`, which pre-homes
/// every value that's the argument of an `AddrOf`.
#[derive(Debug)]
pub struct AddrOf {
    pub out: ILValue,
    pub target: ILValue,
}

impl ILCmd for AddrOf {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.target.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.out.clone()]
    }
    fn references(&self) -> Map<Option<ILValue>, Vec<ILValue>> {
        Map::from([(Some(self.out.clone()), vec![self.target.clone()])])
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        homes: &Map<ILValue, Spot>,
        get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        let out_spot = spots[&self.out].clone();
        let pref = match &out_spot {
            Spot::Register(r) => vec![*r],
            _ => Vec::new(),
        };
        let reg = get_reg(&pref, &[]);
        let target_spot = homes.get(&self.target).unwrap_or(&spots[&self.target]).clone();
        out.lea(&Spot::Register(reg), &target_spot);
        if Spot::Register(reg) != out_spot {
            out.mov(&out_spot, &Spot::Register(reg), 8);
        }
    }
}

/// `out = *ptr`, where `ptr` holds a runtime address (not known to be a
/// stack/global offset at compile time).
#[derive(Debug)]
pub struct ReadAt {
    pub out: ILValue,
    pub ptr: ILValue,
    pub size: u64,
}

impl ILCmd for ReadAt {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.ptr.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.out.clone()]
    }
    fn indir_read(&self) -> Vec<ILValue> {
        vec![self.ptr.clone()]
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        _homes: &Map<ILValue, Spot>,
        get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        let out_spot = spots[&self.out].clone();
        let ptr_spot = spots[&self.ptr].clone();
        let addr_reg = match &ptr_spot {
            Spot::Register(r) => *r,
            _ => {
                let r = get_reg(&[], &forbid(&[&out_spot]));
                out.mov(&Spot::Register(r), &ptr_spot, 8);
                r
            }
        };
        let mem = Spot::Memory(MemSpot::simple(addr_reg, 0));
        let reg = match &out_spot {
            Spot::Register(r) => *r,
            _ => get_reg(&[], &[addr_reg]),
        };
        move_data(&out_spot, &mem, self.size, reg, out);
    }
}

/// `*ptr = src`.
#[derive(Debug)]
pub struct SetAt {
    pub ptr: ILValue,
    pub src: ILValue,
    pub size: u64,
}

impl ILCmd for SetAt {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.ptr.clone(), self.src.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        Vec::new()
    }
    fn indir_write(&self) -> Vec<ILValue> {
        vec![self.ptr.clone()]
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        _homes: &Map<ILValue, Spot>,
        get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        let src_spot = spots[&self.src].clone();
        let ptr_spot = spots[&self.ptr].clone();
        let addr_reg = match &ptr_spot {
            Spot::Register(r) => *r,
            _ => {
                let r = get_reg(&[], &forbid(&[&src_spot]));
                out.mov(&Spot::Register(r), &ptr_spot, 8);
                r
            }
        };
        let mem = Spot::Memory(MemSpot::simple(addr_reg, 0));
        let reg = match &src_spot {
            Spot::Register(r) => *r,
            _ => get_reg(&[], &[addr_reg]),
        };
        move_data(&mem, &src_spot, self.size, reg, out);
    }
}

/// `out = base + offset` struct-member/array addressing where `offset` is
/// known at IL-generation time (constant member offset, or constant*index
/// for a statically-sized element). `base` must already be homed to memory.
#[derive(Debug)]
pub struct AddrRel {
    pub out: ILValue,
    pub base: ILValue,
    pub offset: i64,
    pub chunk: Option<(u64, ILValue)>,
}

impl ILCmd for AddrRel {
    fn inputs(&self) -> Vec<ILValue> {
        let mut v = vec![self.base.clone()];
        if let Some((_, idx)) = &self.chunk {
            v.push(idx.clone());
        }
        v
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.out.clone()]
    }
    fn references(&self) -> Map<Option<ILValue>, Vec<ILValue>> {
        Map::from([(Some(self.out.clone()), vec![self.base.clone()])])
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        homes: &Map<ILValue, Spot>,
        get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        let base_spot = homes.get(&self.base).unwrap_or(&spots[&self.base]).clone();
        let rel_spot = match (&base_spot, &self.chunk) {
            (Spot::Memory(m), Some((chunk, idx))) => {
                let idx_spot = spots[idx].clone();
                let idx_reg = match &idx_spot {
                    Spot::Register(r) => *r,
                    _ => {
                        let r = get_reg(&[], &[]);
                        out.mov(&Spot::Register(r), &idx_spot, 8);
                        r
                    }
                };
                Spot::Memory(MemSpot { offset: m.offset + self.offset, chunk: Some((*chunk, idx_reg)), ..m.clone() })
            }
            (Spot::Memory(m), None) => Spot::Memory(MemSpot { offset: m.offset + self.offset, ..m.clone() }),
            (other, _) => other.clone(),
        };
        let out_spot = spots[&self.out].clone();
        let reg = match &out_spot {
            Spot::Register(r) => *r,
            _ => get_reg(&[], &[]),
        };
        out.lea(&Spot::Register(reg), &rel_spot);
        if Spot::Register(reg) != out_spot {
            out.mov(&out_spot, &Spot::Register(reg), 8);
        }
    }
}

#[derive(Debug)]
pub struct ReadRel {
    pub out: ILValue,
    pub base: ILValue,
    pub offset: i64,
    pub size: u64,
}

impl ILCmd for ReadRel {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.base.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        vec![self.out.clone()]
    }
    fn references(&self) -> Map<Option<ILValue>, Vec<ILValue>> {
        Map::from([(None, vec![self.base.clone()])])
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        homes: &Map<ILValue, Spot>,
        get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        let base_spot = homes.get(&self.base).unwrap_or(&spots[&self.base]).clone();
        let m = match &base_spot {
            Spot::Memory(m) => m.clone(),
            other => unreachable!("ReadRel base must be homed to memory, got {other:?}"),
        };
        let rel_spot = Spot::Memory(MemSpot { offset: m.offset + self.offset, ..m });
        let out_spot = spots[&self.out].clone();
        let reg = match &out_spot {
            Spot::Register(r) => *r,
            _ => get_reg(&[], &[]),
        };
        move_data(&out_spot, &rel_spot, self.size, reg, out);
    }
}

#[derive(Debug)]
pub struct SetRel {
    pub base: ILValue,
    pub offset: i64,
    pub src: ILValue,
    pub size: u64,
}

impl ILCmd for SetRel {
    fn inputs(&self) -> Vec<ILValue> {
        vec![self.base.clone(), self.src.clone()]
    }
    fn outputs(&self) -> Vec<ILValue> {
        Vec::new()
    }
    fn references(&self) -> Map<Option<ILValue>, Vec<ILValue>> {
        Map::from([(None, vec![self.base.clone()])])
    }
    fn lower(
        &self,
        spots: &Map<ILValue, Spot>,
        homes: &Map<ILValue, Spot>,
        get_reg: &mut dyn FnMut(&[Register], &[Register]) -> Register,
        out: &mut AsmWriter,
    ) {
        let base_spot = homes.get(&self.base).unwrap_or(&spots[&self.base]).clone();
        let m = match &base_spot {
            Spot::Memory(m) => m.clone(),
            other => unreachable!("SetRel base must be homed to memory, got {other:?}"),
        };
        let rel_spot = Spot::Memory(MemSpot { offset: m.offset + self.offset, ..m });
        let src_spot = spots[&self.src].clone();
        let reg = match &src_spot {
            Spot::Register(r) => *r,
            _ => get_reg(&[], &[]),
        };
        move_data(&rel_spot, &src_spot, self.size, reg, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::int;

    #[test]
    fn set_prefers_source_spot() {
        let out = ILValue::new(int());
        let src = ILValue::new(int());
        let cmd = Set { out: out.clone(), src: src.clone() };
        assert_eq!(cmd.rel_spot_pref(), vec![(out, src)]);
    }

    #[test]
    fn read_at_marks_indirect_read() {
        let ptr = ILValue::new(crate::types::CType::pointer_to(int()));
        let out = ILValue::new(int());
        let cmd = ReadAt { out, ptr: ptr.clone(), size: 4 };
        assert_eq!(cmd.indir_read(), vec![ptr]);
    }

    #[test]
    fn addr_of_references_its_target_under_its_output() {
        let target = ILValue::new(int());
        let out = ILValue::new(crate::types::CType::pointer_to(int()));
        let cmd = AddrOf { out: out.clone(), target: target.clone() };
        assert_eq!(cmd.references().get(&Some(out)), Some(&vec![target]));
    }
}
