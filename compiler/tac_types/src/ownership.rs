//! Ownership classification for reference-count insertion.
//!
//! RC insertion never inspects type structure itself; it asks the type
//! layer whether a slot of a given type owns what it points at.

use tac_ir::TypeId;

use crate::{Pool, TypeKind};

/// Reference-counting class of a slot type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefClass {
    /// No heap pointer. Stores are plain copies.
    ///
    /// Examples: `int`, `bool`, `()`, label addresses, the `null` literal type.
    Scalar,
    /// Holds a counted reference. Stores increment the new value and
    /// decrement the old one.
    ///
    /// Examples: classes, arrays, sequences.
    Owned,
    /// Holds a reference that is not counted (weak or unmanaged).
    NonOwning,
}

/// Anything that can classify types for RC insertion.
pub trait OwnershipClassification {
    fn ref_class(&self, ty: TypeId) -> RefClass;

    fn is_scalar(&self, ty: TypeId) -> bool {
        self.ref_class(ty) == RefClass::Scalar
    }

    /// Stores into a slot of this type need RC operations.
    fn needs_rc(&self, ty: TypeId) -> bool {
        self.ref_class(ty) == RefClass::Owned
    }
}

impl OwnershipClassification for Pool {
    fn ref_class(&self, ty: TypeId) -> RefClass {
        match self.get(ty) {
            None | Some(TypeKind::Primitive(_)) => RefClass::Scalar,
            Some(TypeKind::Class { .. } | TypeKind::Array { .. } | TypeKind::Sequence { .. }) => {
                RefClass::Owned
            }
            Some(TypeKind::Weak { .. } | TypeKind::Unmanaged { .. }) => RefClass::NonOwning,
        }
    }
}
