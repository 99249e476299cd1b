//! The middle end: symbol tables, the typed intermediate language, and the
//! AST-to-IL generator that bridges the front and back ends.

pub mod il;
pub mod il_cmd;
pub mod lower;
pub mod symtab;

pub use il::{ILFunction, ILValue, Program};
pub use lower::lower_program;
pub use symtab::SymbolTable;
