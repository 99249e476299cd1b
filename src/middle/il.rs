//! The typed intermediate language's value model and program container.
//!
//! Grounded on `examples/original_source/shivyc/il_gen.py`'s `ILValue`/
//! `ILCode` classes: an `ILValue` is compared and hashed by identity (two
//! distinct temporaries of the same type are different values), so it's
//! wrapped in `Rc` here rather than derived `PartialEq`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::{Id, Map};
use crate::middle::il_cmd::ILCmd;
use crate::types::CType;

/// Monotonic creation-order id, used only so `ILValue`'s `Ord`/`Hash` are
/// stable across runs (pointer addresses are not): the register allocator
/// sorts and dedups nodes by this order, and sorted output must not depend
/// on where the allocator happened to place each `Rc` on the heap.
static NEXT_IL_VALUE_ID: AtomicU64 = AtomicU64::new(0);

struct ILValueInner {
    id: u64,
    ctype: CType,
    name_hint: Option<Id>,
    /// Set when this value was produced by the literal integer `0` written
    /// directly in source — such a value may implicitly convert to any
    /// pointer type (a "null pointer constant", per `shivyc/il_gen.py`'s
    /// `ILValue.null_ptr_const`).
    null_ptr_const: Cell<bool>,
}

/// A single typed storage location in the IL: a function-local temporary,
/// a named local/parameter, or a reference to a global/literal. Cloning an
/// `ILValue` is cheap and aliases the same underlying value (comparison and
/// hashing are by `Rc` pointer identity).
#[derive(Clone)]
pub struct ILValue(Rc<ILValueInner>);

impl ILValue {
    pub fn new(ctype: CType) -> ILValue {
        let id = NEXT_IL_VALUE_ID.fetch_add(1, Ordering::Relaxed);
        ILValue(Rc::new(ILValueInner { id, ctype, name_hint: None, null_ptr_const: Cell::new(false) }))
    }

    pub fn named(ctype: CType, name: Id) -> ILValue {
        let id = NEXT_IL_VALUE_ID.fetch_add(1, Ordering::Relaxed);
        ILValue(Rc::new(ILValueInner { id, ctype, name_hint: Some(name), null_ptr_const: Cell::new(false) }))
    }

    pub fn ctype(&self) -> &CType {
        &self.0.ctype
    }

    pub fn name_hint(&self) -> Option<Id> {
        self.0.name_hint
    }

    pub fn is_null_ptr_const(&self) -> bool {
        self.0.null_ptr_const.get()
    }

    pub fn set_null_ptr_const(&self) {
        self.0.null_ptr_const.set(true);
    }
}

impl PartialEq for ILValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for ILValue {}

impl std::hash::Hash for ILValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state)
    }
}

impl Ord for ILValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.id.cmp(&other.0.id)
    }
}
impl PartialOrd for ILValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ILValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name_hint() {
            Some(n) => write!(f, "%{n}"),
            None => write!(f, "%t{}", self.0.id),
        }
    }
}

/// A literal constant. These are interned per-program so that the same
/// integer constant always lowers to the same global spot preference.
#[derive(Clone, Debug)]
pub struct Literal {
    pub value: i64,
    pub ctype: CType,
}

/// One function's worth of IL: its formal parameters (in order) and its
/// flat command list, labels included inline as `Label` commands rather
/// than as a separate basic-block structure (liveness analysis in
/// `back::liveness` recovers block boundaries from `Jump`/`JumpZero` targets).
pub struct ILFunction {
    pub name: Id,
    /// The `ILValue` that names this function's own address. Every `Call`
    /// that invokes this function by name shares this exact value, so the
    /// global spotmap (`back::globals`) can bind it once to `Spot::Label`.
    pub value: ILValue,
    pub params: Vec<ILValue>,
    pub commands: Vec<Box<dyn ILCmd>>,
    pub is_static: bool,
}

impl fmt::Debug for ILFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ILFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("commands", &self.commands.len())
            .finish()
    }
}

/// A file-scope global object: either a zero-initialized reservation
/// (`.bss`) or a literal-initialized one (`.data`).
#[derive(Debug)]
pub struct GlobalVar {
    pub value: ILValue,
    pub ctype: CType,
    pub init: Option<i64>,
    pub is_static: bool,
}

/// The whole translation unit's IL: functions plus the global/string/literal
/// tables the back end needs to build the global spotmap (`back::globals`).
#[derive(Default, Debug)]
pub struct Program {
    pub functions: Vec<ILFunction>,
    pub globals: Vec<GlobalVar>,
    /// `(value, symbol name, bytes)` for each distinct string literal in the
    /// translation unit. The `ILValue` is what occurrences of the literal in
    /// IL commands reference; the symbol name is what `back::globals` defines
    /// in `.data` and what the value's spot ultimately points at.
    pub string_literals: Vec<(ILValue, Id, Vec<u8>)>,
    /// Functions declared (prototyped or called) but never defined in this
    /// translation unit — `(function-address value, symbol name)`, the same
    /// pairing `ILFunction` carries for defined functions. Resolved at link
    /// time; `back::globals` still needs to bind each to `Spot::Label` so
    /// `Call` can address it directly.
    pub externs: Vec<(ILValue, Id)>,
    /// `(value, ctype, il_value)` triples, matching `shivyc/il_gen.py`'s
    /// `ILCode.literals` registry — kept as a flat `Vec` rather than a map
    /// because `CType` has no total order (structs compare by identity only)
    /// and the table per translation unit stays small.
    literal_cache: RefCell<Vec<(i64, CType, ILValue)>>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    /// Returns the (cached) `ILValue` for an integer literal of the given
    /// type, so repeated uses of e.g. `0` within a function coalesce to the
    /// same value and thus the same preferred spot. A literal `0` is also
    /// marked as a null pointer constant, matching `Number.make_il`.
    pub fn literal(&self, value: i64, ctype: &CType) -> ILValue {
        if let Some((_, _, v)) =
            self.literal_cache.borrow().iter().find(|(v, t, _)| *v == value && t == ctype)
        {
            return v.clone();
        }
        let v = ILValue::new(ctype.clone());
        if value == 0 {
            v.set_null_ptr_const();
        }
        self.literal_cache.borrow_mut().push((value, ctype.clone(), v.clone()));
        v
    }

    /// Every literal `ILValue` registered so far, paired with its numeric
    /// value — consumed by `back::globals::build` to give each a fixed
    /// `Spot::Literal` entry in the global spotmap (literals are never
    /// register-allocation candidates).
    pub fn literals(&self) -> Vec<(ILValue, i64)> {
        self.literal_cache.borrow().iter().map(|(value, _, v)| (v.clone(), *value)).collect()
    }
}
