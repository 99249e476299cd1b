//! The symbol table: a stack of lexical scopes plus a parallel stack of
//! struct-tag scopes, and the typedef-oracle the parser consults while
//! parsing declarators (SPEC_FULL.md §3.6 "Parser typedef callback").
//!
//! Grounded on `examples/original_source/shivyc/` symbol-table handling
//! (folded into `il_gen.py` there); split out here into its own module
//! because the front end now needs read access to it during parsing, not
//! just the IL generator.

use std::rc::Rc;

use crate::common::{Id, Map};
use crate::middle::il::ILValue;
use crate::types::{CType, StructType};

#[derive(Clone, Debug)]
pub struct Symbol {
    pub ctype: CType,
    pub is_typedef: bool,
    /// The `ILValue` this identifier is bound to, once `middle::lower` has
    /// generated it (absent for typedef names, and for ordinary
    /// declarations before their defining point is reached). Declared
    /// separately from `ctype` because the symbol table is built during
    /// parsing — before any IL exists — and filled in as lowering walks
    /// each declaration.
    pub value: Option<ILValue>,
}

/// A stack of scopes, innermost last. Declarations shadow outer scopes;
/// lookups walk from innermost to outermost.
pub struct SymbolTable {
    scopes: Vec<Map<Id, Symbol>>,
    tag_scopes: Vec<Map<Id, Rc<StructType>>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { scopes: vec![Map::new()], tag_scopes: vec![Map::new()] }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Map::new());
        self.tag_scopes.push(Map::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        self.tag_scopes.pop();
        assert!(!self.scopes.is_empty(), "popped the file scope");
    }

    pub fn at_file_scope(&self) -> bool {
        self.scopes.len() == 1
    }

    pub fn declare(&mut self, name: Id, ctype: CType, is_typedef: bool) {
        self.scopes.last_mut().unwrap().insert(name, Symbol { ctype, is_typedef, value: None });
    }

    /// Binds `name` (already `declare`d, in the current innermost scope) to
    /// the `ILValue` lowering just generated for it.
    pub fn bind_value(&mut self, name: Id, value: ILValue) {
        if let Some(sym) = self.scopes.last_mut().unwrap().get_mut(&name) {
            sym.value = Some(value);
        }
    }

    pub fn lookup(&self, name: Id) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(&name))
    }

    /// True iff `name` names a typedef visible in the current scope chain.
    /// This is the oracle the parser needs to disambiguate `Foo * bar;` as
    /// either a declaration or a multiplication expression.
    pub fn is_typedef_name(&self, name: Id) -> bool {
        self.lookup(name).map(|s| s.is_typedef).unwrap_or(false)
    }

    pub fn declare_tag(&mut self, tag: Id, ty: Rc<StructType>) {
        self.tag_scopes.last_mut().unwrap().insert(tag, ty);
    }

    pub fn lookup_tag(&self, tag: Id) -> Option<Rc<StructType>> {
        self.tag_scopes.iter().rev().find_map(|scope| scope.get(&tag).cloned())
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

/// Narrow read-only view the parser needs while parsing declarators, so
/// `front::parse` doesn't have to depend on the full `SymbolTable` API (or,
/// transitively, on `middle::lower`).
pub trait TypedefOracle {
    fn is_typedef_name(&self, name: Id) -> bool;
}

impl TypedefOracle for SymbolTable {
    fn is_typedef_name(&self, name: Id) -> bool {
        SymbolTable::is_typedef_name(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::int;

    #[test]
    fn inner_scope_shadows_outer() {
        let mut tab = SymbolTable::new();
        tab.declare(Id::new("x".to_string()), int(), false);
        tab.push_scope();
        tab.declare(Id::new("x".to_string()), CType::pointer_to(int()), false);
        assert!(tab.lookup(Id::new("x".to_string())).unwrap().ctype.is_pointer());
        tab.pop_scope();
        assert!(tab.lookup(Id::new("x".to_string())).unwrap().ctype.is_integral());
    }

    #[test]
    fn typedef_oracle_reflects_is_typedef_flag() {
        let mut tab = SymbolTable::new();
        let name = Id::new("myint".to_string());
        tab.declare(name, int(), true);
        assert!(TypedefOracle::is_typedef_name(&tab, name));
    }
}
