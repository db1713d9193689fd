//! Resolved type handle carried by every syntax node and TAC operand.
//!
//! The handle is an index into `tac_types::Pool`. Primitive and root class
//! types have fixed indices so the lowering engine can name them without a
//! pool lookup.

use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    // === Primitive Types ===

    /// 32-bit signed integer.
    pub const INT: TypeId = TypeId(0);
    /// 64-bit signed integer; also the integer view of a pointer.
    pub const LONG: TypeId = TypeId(1);
    pub const DOUBLE: TypeId = TypeId(2);
    pub const BOOL: TypeId = TypeId(3);
    pub const CHAR: TypeId = TypeId(4);
    pub const BYTE: TypeId = TypeId(5);
    /// Result type of methods that return nothing.
    pub const UNIT: TypeId = TypeId(6);
    /// Type of the `null` literal.
    pub const NULL: TypeId = TypeId(7);

    // === Root classes ===

    /// Built-in immutable string class (reference counted).
    pub const STRING: TypeId = TypeId(8);
    /// Root of the class hierarchy.
    pub const OBJECT: TypeId = TypeId(9);
    /// Root of the exception hierarchy.
    pub const EXCEPTION: TypeId = TypeId(10);

    // === Markers ===

    /// Address of a label, the operand type of indirect branches.
    pub const ADDRESS: TypeId = TypeId(11);
    /// Placeholder for nodes the checker already rejected.
    pub const ERROR: TypeId = TypeId(12);

    /// Number of pre-interned types.
    pub const PRE_INTERNED: u32 = 13;

    /// First index handed out for user-declared types.
    pub const FIRST_DYNAMIC: u32 = 64;

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        TypeId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_pre_interned(self) -> bool {
        self.0 < Self::PRE_INTERNED
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            TypeId::INT => write!(f, "int"),
            TypeId::LONG => write!(f, "long"),
            TypeId::DOUBLE => write!(f, "double"),
            TypeId::BOOL => write!(f, "bool"),
            TypeId::CHAR => write!(f, "char"),
            TypeId::BYTE => write!(f, "byte"),
            TypeId::UNIT => write!(f, "()"),
            TypeId::NULL => write!(f, "null"),
            TypeId::STRING => write!(f, "String"),
            TypeId::OBJECT => write!(f, "Object"),
            TypeId::EXCEPTION => write!(f, "Exception"),
            TypeId::ADDRESS => write!(f, "address"),
            TypeId::ERROR => write!(f, "<error>"),
            TypeId(raw) => write!(f, "TypeId({raw})"),
        }
    }
}
