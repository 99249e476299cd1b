//! Global spotmap construction: assigns every string literal and file-scope
//! (`static` or externally-linked) variable its fixed, non-dynamic spot, and
//! emits the `.data`/`.bss` directives those spots require. Functions get
//! their own `Spot::Label` entries too, so a `Call` to a named function can
//! be lowered without ever touching `back::alloc`.
//!
//! Grounded on `examples/original_source/shivyc/asm_gen.py`'s
//! `ASMGen._get_global_spotmap`/`_get_nondynamic_spot`.

use crate::back::asm::AsmWriter;
use crate::back::spot::{MemSpot, Spot};
use crate::common::Map;
use crate::middle::il::{GlobalVar, ILValue, Program};

/// Builds the spotmap entries that hold for every command in the program,
/// regardless of which function they appear in, and writes the data/bss
/// directives those globals need into `out`.
pub fn build(program: &Program, out: &mut AsmWriter) -> Map<ILValue, Spot> {
    let mut spotmap = Map::new();

    for (value, lit) in program.literals() {
        spotmap.insert(value, Spot::Literal(lit));
    }

    for (value, name, bytes) in &program.string_literals {
        out.define_string(name, bytes);
        spotmap.insert(value.clone(), Spot::Memory(MemSpot::symbol(*name, 0)));
    }

    for global in &program.globals {
        emit_global(global, out);
        let name = global.value.name_hint().expect("global variable must have a name");
        spotmap.insert(global.value.clone(), Spot::Memory(MemSpot::symbol(name, 0)));
    }

    for func in &program.functions {
        spotmap.insert(func.value.clone(), Spot::Label(func.name));
    }
    for (value, name) in &program.externs {
        spotmap.insert(value.clone(), Spot::Label(*name));
    }

    spotmap
}

fn emit_global(global: &GlobalVar, out: &mut AsmWriter) {
    let name = global.value.name_hint().expect("global variable must have a name");
    match global.init {
        Some(v) => out.define_data(&name, global.ctype.size(), v),
        None => out.reserve_bss(&name, global.ctype.size(), global.ctype.size().min(8)),
    }
}
