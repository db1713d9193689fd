//! Type pool: storage for every type a compilation unit mentions.

use rustc_hash::FxHashMap;
use tac_ir::{Name, StringInterner, TypeId};

/// Structure of one pooled type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Primitive(&'static str),
    Class {
        name: Name,
        parent: Option<TypeId>,
    },
    Array {
        elem: TypeId,
    },
    /// Reference that does not keep its target alive.
    Weak {
        inner: TypeId,
    },
    /// Raw reference outside reference counting entirely.
    Unmanaged {
        inner: TypeId,
    },
    Sequence {
        elems: Vec<TypeId>,
    },
}

/// Pool of resolved types, addressed by [`TypeId`].
///
/// Pre-interned types occupy fixed indices below
/// [`TypeId::PRE_INTERNED`]; user-declared types start at
/// [`TypeId::FIRST_DYNAMIC`]. Structural types (arrays, weak/unmanaged
/// wrappers, sequences) are deduplicated; classes are nominal and never are.
pub struct Pool {
    builtin: Vec<TypeKind>,
    dynamic: Vec<TypeKind>,
    structural: FxHashMap<TypeKind, TypeId>,
}

impl Pool {
    /// Create a pool with all pre-interned types registered.
    ///
    /// The root class names are interned into `interner` so they render
    /// like user classes.
    pub fn new(interner: &StringInterner) -> Self {
        let object = TypeKind::Class {
            name: interner.intern("Object"),
            parent: None,
        };
        let string = TypeKind::Class {
            name: interner.intern("String"),
            parent: Some(TypeId::OBJECT),
        };
        let exception = TypeKind::Class {
            name: interner.intern("Exception"),
            parent: Some(TypeId::OBJECT),
        };
        // Order must match the TypeId constants.
        let builtin = vec![
            TypeKind::Primitive("int"),
            TypeKind::Primitive("long"),
            TypeKind::Primitive("double"),
            TypeKind::Primitive("bool"),
            TypeKind::Primitive("char"),
            TypeKind::Primitive("byte"),
            TypeKind::Primitive("()"),
            TypeKind::Primitive("null"),
            string,
            object,
            exception,
            TypeKind::Primitive("address"),
            TypeKind::Primitive("<error>"),
        ];
        debug_assert_eq!(builtin.len(), TypeId::PRE_INTERNED as usize);
        Pool {
            builtin,
            dynamic: Vec::new(),
            structural: FxHashMap::default(),
        }
    }

    /// Look up a type. Unknown handles yield `None`.
    pub fn get(&self, ty: TypeId) -> Option<&TypeKind> {
        let raw = ty.raw();
        if raw < TypeId::PRE_INTERNED {
            self.builtin.get(raw as usize)
        } else if raw >= TypeId::FIRST_DYNAMIC {
            self.dynamic.get((raw - TypeId::FIRST_DYNAMIC) as usize)
        } else {
            None
        }
    }

    /// Declare a class. `parent` defaults to `Object`.
    pub fn class(&mut self, name: Name, parent: Option<TypeId>) -> TypeId {
        self.push(TypeKind::Class {
            name,
            parent: Some(parent.unwrap_or(TypeId::OBJECT)),
        })
    }

    /// Declare an exception class. `parent` defaults to `Exception`.
    pub fn exception_class(&mut self, name: Name, parent: Option<TypeId>) -> TypeId {
        self.push(TypeKind::Class {
            name,
            parent: Some(parent.unwrap_or(TypeId::EXCEPTION)),
        })
    }

    pub fn array(&mut self, elem: TypeId) -> TypeId {
        self.structural_type(TypeKind::Array { elem })
    }

    pub fn weak(&mut self, inner: TypeId) -> TypeId {
        self.structural_type(TypeKind::Weak { inner })
    }

    pub fn unmanaged(&mut self, inner: TypeId) -> TypeId {
        self.structural_type(TypeKind::Unmanaged { inner })
    }

    pub fn sequence(&mut self, elems: Vec<TypeId>) -> TypeId {
        self.structural_type(TypeKind::Sequence { elems })
    }

    /// Element type of an array (looking through weak/unmanaged wrappers).
    pub fn element_type(&self, ty: TypeId) -> Option<TypeId> {
        match self.get(ty)? {
            TypeKind::Array { elem } => Some(*elem),
            TypeKind::Weak { inner } | TypeKind::Unmanaged { inner } => self.element_type(*inner),
            _ => None,
        }
    }

    /// Type of element `index` of a sequence type.
    pub fn sequence_element(&self, ty: TypeId, index: u32) -> Option<TypeId> {
        match self.get(ty)? {
            TypeKind::Sequence { elems } => elems.get(index as usize).copied(),
            _ => None,
        }
    }

    /// Class parent, `None` for `Object` and non-class types.
    pub fn parent(&self, ty: TypeId) -> Option<TypeId> {
        match self.get(ty)? {
            TypeKind::Class { parent, .. } => *parent,
            _ => None,
        }
    }

    /// Nominal subtyping over the class hierarchy.
    ///
    /// `null` is a subtype of every class, array and wrapper type.
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup {
            return true;
        }
        if sub == TypeId::NULL {
            return matches!(
                self.get(sup),
                Some(
                    TypeKind::Class { .. }
                        | TypeKind::Array { .. }
                        | TypeKind::Weak { .. }
                        | TypeKind::Unmanaged { .. }
                )
            );
        }
        let mut current = self.parent(sub);
        while let Some(ty) = current {
            if ty == sup {
                return true;
            }
            current = self.parent(ty);
        }
        false
    }

    /// Whether values of `ty` can be thrown and caught.
    pub fn is_exception(&self, ty: TypeId) -> bool {
        self.is_subtype(ty, TypeId::EXCEPTION)
    }

    /// Human-readable type name, as used by the TAC text dump.
    pub fn display(&self, ty: TypeId, interner: &StringInterner) -> String {
        match self.get(ty) {
            None => format!("<unknown {}>", ty.raw()),
            Some(TypeKind::Primitive(name)) => (*name).to_owned(),
            Some(TypeKind::Class { name, .. }) => interner.lookup(*name).to_owned(),
            Some(TypeKind::Array { elem }) => format!("{}[]", self.display(*elem, interner)),
            Some(TypeKind::Weak { inner }) => format!("weak {}", self.display(*inner, interner)),
            Some(TypeKind::Unmanaged { inner }) => {
                format!("unmanaged {}", self.display(*inner, interner))
            }
            Some(TypeKind::Sequence { elems }) => {
                let parts: Vec<String> = elems
                    .iter()
                    .map(|elem| self.display(*elem, interner))
                    .collect();
                format!("({})", parts.join(", "))
            }
        }
    }

    fn structural_type(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&ty) = self.structural.get(&kind) {
            return ty;
        }
        let ty = self.push(kind.clone());
        self.structural.insert(kind, ty);
        ty
    }

    fn push(&mut self, kind: TypeKind) -> TypeId {
        let raw = u32::try_from(self.dynamic.len())
            .ok()
            .and_then(|len| len.checked_add(TypeId::FIRST_DYNAMIC))
            .unwrap_or_else(|| panic!("type pool exceeds u32::MAX entries"));
        self.dynamic.push(kind);
        TypeId::from_raw(raw)
    }
}
