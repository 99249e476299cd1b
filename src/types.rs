//! The CType system: value types with size, signedness, completeness, and
//! compatibility predicates. Grounded on `examples/original_source/shivyc/ctypes.py`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::common::Id;

/// Integer promotion / usual-arithmetic-conversion math is defined in terms
/// of these constants throughout the module.
pub const INT_MAX: i64 = 2_147_483_647;
pub const INT_MIN: i64 = -2_147_483_648;
pub const LONG_MAX: i64 = i64::MAX;
pub const LONG_MIN: i64 = i64::MIN;

/// A struct type's tag and member list. Shared via `Rc` so every `CType`
/// referring to "the same struct" is identity-comparable, and mutable via
/// `RefCell` because a tag can be declared (incomplete) before its member
/// list is known (`struct Foo;` followed later by `struct Foo { ... };`).
#[derive(Debug)]
pub struct StructType {
    pub tag: Option<Id>,
    members: RefCell<Option<Vec<(Id, CType)>>>,
}

impl StructType {
    pub fn new_incomplete(tag: Option<Id>) -> Rc<StructType> {
        Rc::new(StructType { tag, members: RefCell::new(None) })
    }

    pub fn set_members(&self, members: Vec<(Id, CType)>) {
        *self.members.borrow_mut() = Some(members);
    }

    pub fn is_complete(&self) -> bool {
        self.members.borrow().is_some()
    }

    pub fn size(&self) -> u64 {
        self.members
            .borrow()
            .as_ref()
            .map(|ms| ms.iter().map(|(_, ct)| ct.size()).sum())
            .unwrap_or(1)
    }

    pub fn member(&self, name: Id) -> Option<(u64, CType)> {
        let members = self.members.borrow();
        let members = members.as_ref()?;
        let mut offset = 0u64;
        for (n, ct) in members {
            if *n == name {
                return Some((offset, ct.clone()));
            }
            offset += ct.size();
        }
        None
    }

    pub fn members(&self) -> Option<Vec<(Id, CType)>> {
        self.members.borrow().clone()
    }
}

impl PartialEq for StructType {
    /// Struct compatibility within one translation unit is identity-based.
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
impl Eq for StructType {}

/// A C type, per the data model in SPEC_FULL.md §3.1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CType {
    Void,
    /// `_Bool`. Kept distinct from `Integer { size: 1, signed: false }`
    /// (the representation of `unsigned char`) even though both occupy one
    /// byte, so that assigning to a `_Bool` can be recognized and normalized
    /// to `0`/`1` rather than truncated like any other narrowing `Set`.
    Bool,
    Integer { size: u32, signed: bool },
    Pointer { to: Rc<CType>, is_const: bool },
    Array { el: Rc<CType>, n: Option<u64> },
    Function { args: Vec<CType>, ret: Rc<CType>, has_prototype: bool },
    Struct(Rc<StructType>),
}

impl CType {
    pub fn pointer_to(to: CType) -> CType {
        CType::Pointer { to: Rc::new(to), is_const: false }
    }

    pub fn array_of(el: CType, n: Option<u64>) -> CType {
        CType::Array { el: Rc::new(el), n }
    }

    pub fn function_of(args: Vec<CType>, ret: CType, has_prototype: bool) -> CType {
        CType::Function { args, ret: Rc::new(ret), has_prototype }
    }

    pub fn make_const(&self) -> CType {
        match self {
            CType::Pointer { to, .. } => CType::Pointer { to: to.clone(), is_const: true },
            other => other.clone(),
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, CType::Pointer { is_const: true, .. })
    }

    pub fn is_void(&self) -> bool {
        matches!(self, CType::Void)
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, CType::Integer { .. } | CType::Bool)
    }

    /// No floating point is supported (Non-goal), so arithmetic == integral.
    pub fn is_arith(&self) -> bool {
        self.is_integral()
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, CType::Array { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, CType::Function { .. })
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, CType::Struct(_))
    }

    /// A function type is never complete (sizeof forbidden).
    pub fn is_complete(&self) -> bool {
        match self {
            CType::Void => false,
            CType::Bool | CType::Integer { .. } | CType::Pointer { .. } => true,
            CType::Array { n, .. } => n.is_some(),
            CType::Function { .. } => false,
            CType::Struct(s) => s.is_complete(),
        }
    }

    pub fn is_object(&self) -> bool {
        match self {
            CType::Bool | CType::Integer { .. } | CType::Pointer { .. } | CType::Array { .. } | CType::Struct(_) => {
                true
            }
            CType::Void | CType::Function { .. } => false,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.is_arith() || self.is_pointer()
    }

    pub fn signed(&self) -> bool {
        matches!(self, CType::Integer { signed: true, .. })
    }

    /// sizeof; panics if called on an incomplete/function type (callers must
    /// check `is_complete()` first, matching the "sizeof forbidden" invariant).
    pub fn size(&self) -> u64 {
        match self {
            CType::Void => 1,
            CType::Bool => 1,
            CType::Integer { size, .. } => *size as u64,
            CType::Pointer { .. } => 8,
            CType::Array { el, n } => n.expect("sizeof of incomplete array") * el.size(),
            CType::Function { .. } => panic!("sizeof of function type"),
            CType::Struct(s) => s.size(),
        }
    }

    /// Structural compatibility for pointers/arrays/functions, identity-based
    /// for structs, value-based for void/integers.
    pub fn compatible(&self, other: &CType) -> bool {
        match (self, other) {
            (CType::Void, CType::Void) => true,
            (CType::Bool, CType::Bool) => true,
            (CType::Integer { size: s1, signed: sg1 }, CType::Integer { size: s2, signed: sg2 }) => {
                s1 == s2 && sg1 == sg2
            }
            (CType::Pointer { to: t1, .. }, CType::Pointer { to: t2, .. }) => t1.compatible(t2),
            (CType::Array { el: e1, n: n1 }, CType::Array { el: e2, n: n2 }) => {
                e1.compatible(e2) && (n1.is_none() || n2.is_none() || n1 == n2)
            }
            (
                CType::Function { args: a1, ret: r1, .. },
                CType::Function { args: a2, ret: r2, .. },
            ) => {
                a1.len() == a2.len()
                    && a1.iter().zip(a2).all(|(x, y)| x.compatible(y))
                    && r1.compatible(r2)
            }
            (CType::Struct(s1), CType::Struct(s2)) => s1 == s2,
            _ => false,
        }
    }

    /// Integer promotion: any arithmetic type of size < 4 promotes to
    /// signed 32-bit int; everything else (including non-arithmetic types,
    /// for caller convenience) is unchanged.
    pub fn promote(&self) -> CType {
        match self {
            CType::Bool => int(),
            CType::Integer { size, .. } if *size < 4 => int(),
            other => other.clone(),
        }
    }

    /// Usual arithmetic conversion between two (already-promoted) arithmetic
    /// types, per the standard table: same type unchanged; same signedness,
    /// higher rank wins; unsigned at >= rank wins; else if signed can
    /// represent the unsigned type's range, signed wins; else take the
    /// unsigned counterpart of the signed type.
    pub fn usual_arith_convert(&self, other: &CType) -> CType {
        let a = self.promote();
        let b = other.promote();

        let (CType::Integer { size: sa, signed: siga }, CType::Integer { size: sb, signed: sigb }) =
            (&a, &b)
        else {
            panic!("usual_arith_convert on non-arithmetic type");
        };

        if a == b {
            return a;
        }

        if siga == sigb {
            if sa >= sb { a } else { b }
        } else {
            let (signed_ty, signed_size, unsigned_ty, unsigned_size) = if *siga {
                (&a, *sa, &b, *sb)
            } else {
                (&b, *sb, &a, *sa)
            };

            if unsigned_size >= signed_size {
                unsigned_ty.clone()
            } else if signed_size > unsigned_size {
                signed_ty.clone()
            } else {
                to_unsigned(signed_ty)
            }
        }
    }
}

pub fn to_unsigned(ct: &CType) -> CType {
    match ct {
        CType::Integer { size, signed: true } => CType::Integer { size: *size, signed: false },
        other => other.clone(),
    }
}

pub fn void() -> CType {
    CType::Void
}
pub fn bool_t() -> CType {
    CType::Bool
}
pub fn char_t() -> CType {
    CType::Integer { size: 1, signed: true }
}
pub fn unsig_char() -> CType {
    CType::Integer { size: 1, signed: false }
}
pub fn short() -> CType {
    CType::Integer { size: 2, signed: true }
}
pub fn unsig_short() -> CType {
    CType::Integer { size: 2, signed: false }
}
pub fn int() -> CType {
    CType::Integer { size: 4, signed: true }
}
pub fn unsig_int() -> CType {
    CType::Integer { size: 4, signed: false }
}
pub fn long() -> CType {
    CType::Integer { size: 8, signed: true }
}
pub fn unsig_long() -> CType {
    CType::Integer { size: 8, signed: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn array_size_is_n_times_element_size() {
        let arr = CType::array_of(int(), Some(4));
        assert_eq!(arr.size(), 16);
    }

    #[test]
    fn function_type_is_never_complete() {
        let f = CType::function_of(vec![int()], void(), true);
        assert!(!f.is_complete());
    }

    #[rstest]
    #[case(char_t(), int())]
    #[case(short(), int())]
    #[case(bool_t(), int())]
    fn small_types_promote_to_int(#[case] small: CType, #[case] expected: CType) {
        assert_eq!(small.promote(), expected);
    }

    #[test]
    fn uac_is_commutative() {
        let pairs = [
            (int(), unsig_int()),
            (long(), int()),
            (unsig_long(), long()),
            (char_t(), short()),
            (unsig_int(), long()),
        ];
        for (a, b) in pairs {
            assert_eq!(a.usual_arith_convert(&b), b.usual_arith_convert(&a));
        }
    }

    #[test]
    fn uac_same_signedness_picks_higher_rank() {
        assert_eq!(int().usual_arith_convert(&long()), long());
        assert_eq!(unsig_int().usual_arith_convert(&unsig_long()), unsig_long());
    }

    #[test]
    fn uac_unsigned_at_or_above_rank_wins() {
        assert_eq!(unsig_int().usual_arith_convert(&int()), unsig_int());
    }

    #[test]
    fn uac_signed_can_represent_unsigned_so_signed_wins() {
        // long (signed 64-bit) can represent every value of unsigned int (32-bit).
        assert_eq!(long().usual_arith_convert(&unsig_int()), long());
    }

    #[test]
    fn uac_fixed_point_after_promotion_is_max_by_size_with_int() {
        for t in [char_t(), short(), int(), long(), unsig_char(), unsig_short()] {
            let result = t.usual_arith_convert(&t);
            let expected_size = t.promote().size().max(int().size());
            assert_eq!(result.size(), expected_size);
        }
    }

    #[test]
    fn pointer_compatibility_is_structural() {
        let p1 = CType::pointer_to(int());
        let p2 = CType::pointer_to(long());
        assert!(!p1.compatible(&p2));
        assert!(CType::pointer_to(int()).compatible(&CType::pointer_to(int())));
    }

    #[test]
    fn struct_compatibility_is_identity_based() {
        let s1 = StructType::new_incomplete(None);
        let s2 = StructType::new_incomplete(None);
        s1.set_members(vec![]);
        s2.set_members(vec![]);
        assert!(!CType::Struct(s1.clone()).compatible(&CType::Struct(s2)));
        assert!(CType::Struct(s1.clone()).compatible(&CType::Struct(s1)));
    }
}
