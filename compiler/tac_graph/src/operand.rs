//! Operand model: typed value handles used throughout the graph.

use tac_ir::{Literal, LocalId, Name, TypeId};

use crate::{LabelId, TempId};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OperandKind {
    /// Named local or parameter slot.
    Local(LocalId),
    Temp(TempId),
    Literal(Literal),
    /// Address of a label, only meaningful as a phi input feeding an
    /// indirect branch.
    LabelAddress(LabelId),
}

/// Immutable typed value reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Operand {
    pub kind: OperandKind,
    pub ty: TypeId,
}

impl Operand {
    #[inline]
    pub fn local(local: LocalId, ty: TypeId) -> Self {
        Operand {
            kind: OperandKind::Local(local),
            ty,
        }
    }

    #[inline]
    pub fn temp(temp: TempId, ty: TypeId) -> Self {
        Operand {
            kind: OperandKind::Temp(temp),
            ty,
        }
    }

    #[inline]
    pub fn literal(value: Literal, ty: TypeId) -> Self {
        Operand {
            kind: OperandKind::Literal(value),
            ty,
        }
    }

    #[inline]
    pub fn label_address(label: LabelId) -> Self {
        Operand {
            kind: OperandKind::LabelAddress(label),
            ty: TypeId::ADDRESS,
        }
    }

    pub fn as_temp(&self) -> Option<TempId> {
        match self.kind {
            OperandKind::Temp(temp) => Some(temp),
            _ => None,
        }
    }

    pub fn as_local(&self) -> Option<LocalId> {
        match self.kind {
            OperandKind::Local(local) => Some(local),
            _ => None,
        }
    }

    pub fn as_label_address(&self) -> Option<LabelId> {
        match self.kind {
            OperandKind::LabelAddress(label) => Some(label),
            _ => None,
        }
    }

    /// Locals and temporaries can be written; literals and addresses cannot.
    pub fn is_place(&self) -> bool {
        matches!(self.kind, OperandKind::Local(_) | OperandKind::Temp(_))
    }
}

/// Memory slot reached through an object or array.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Reference {
    Field {
        object: Operand,
        field: Name,
        /// Declared type of the field.
        ty: TypeId,
    },
    Element {
        array: Operand,
        index: Operand,
        /// Element type of the array.
        ty: TypeId,
    },
}

impl Reference {
    /// Type of the value stored in the slot.
    pub fn ty(&self) -> TypeId {
        match self {
            Reference::Field { ty, .. } | Reference::Element { ty, .. } => *ty,
        }
    }

    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        let (first, second) = match self {
            Reference::Field { object, .. } => (object, None),
            Reference::Element { array, index, .. } => (array, Some(index)),
        };
        std::iter::once(first).chain(second)
    }
}
