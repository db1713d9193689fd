//! Shared test helpers for graph construction.

use tac_ir::{Literal, Span, TypeId};

use crate::{Body, Branch, Fragment, LabelId, NodeKind, Operand, TempId};

/// Int-typed temporary `%tN`.
pub fn t(n: u32) -> Operand {
    Operand::temp(TempId::new(n), TypeId::INT)
}

pub fn int(v: i64) -> Operand {
    Operand::literal(Literal::Int(v), TypeId::INT)
}

pub fn boolean(v: bool) -> Operand {
    Operand::literal(Literal::Bool(v), TypeId::BOOL)
}

pub fn goto(label: LabelId) -> NodeKind {
    NodeKind::Branch(Branch::Direct(label))
}

/// Allocate `count` labels up front so kinds can reference them.
pub fn labels(body: &mut Body, count: usize) -> Vec<LabelId> {
    (0..count).map(|_| body.new_label()).collect()
}

/// Link `kinds` in order as the whole body.
pub fn fill(body: &mut Body, kinds: Vec<NodeKind>) {
    let mut frag = Fragment::EMPTY;
    for kind in kinds {
        let id = body.alloc(kind, Span::DUMMY);
        frag.link_to_end(body, id);
    }
    body.set_contents(frag);
}
