//! Declaration-tree nodes, read "inside-out" to build a `CType`.
//!
//! Grounded on `examples/original_source/shivyc/decl_tree.py`: a declarator
//! like `int *arr[3]` parses into `Array(3, Pointer(Identifier))`, read from
//! the leaf outward, because that mirrors how a C reader resolves `arr` as
//! "array of 3 pointers to int". `int (*arr)[3]` instead parses into
//! `Pointer(Array(3, Identifier))` — "pointer to array of 3 ints". The
//! reversal from written syntax to this inside-out tree is done by the
//! parser (`front::parse`); turning the tree into a `CType` is done by
//! `middle::lower::decl_to_ctype`.

use crate::common::Id;
use crate::diagnostics::Range;

#[derive(Clone, Debug)]
pub enum TypeSpec {
    Void,
    Bool,
    Char,
    Short,
    Int,
    Long,
    Signed,
    Unsigned,
    Const,
    /// A previously-declared struct tag, resolved by the parser's typedef
    /// oracle callback at parse time (see SPEC_FULL.md §3.6).
    StructTag(Id),
    /// An inline struct definition: `struct Foo { int x; int y; }`.
    StructDef { tag: Option<Id>, members: Vec<(Id, Vec<TypeSpec>, Node)> },
}

/// A single declarator layer. Nodes nest "inside-out": the `base` of a
/// `Pointer`/`Array`/`Function` node is the layer closer to the identifier.
#[derive(Clone, Debug)]
pub enum Node {
    Identifier,
    Pointer { to: Box<Node>, is_const: bool },
    Array { of: Box<Node>, n: Option<u64>, range: Range },
    Function { of: Box<Node>, params: Vec<(Vec<TypeSpec>, Node, Option<Id>)>, has_prototype: bool },
}

impl Node {
    pub fn is_identifier(&self) -> bool {
        matches!(self, Node::Identifier)
    }
}
