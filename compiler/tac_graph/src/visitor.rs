//! Consumer contract for finished graphs.
//!
//! A code generator implements [`NodeVisitor`]: one required method per
//! node kind, no defaults. [`Body::accept`] walks the instruction sequence
//! in order and hands each node to exactly one method through an
//! exhaustive match, so a consumer cannot silently skip a kind.

use crate::node::{
    Binary, Branch, Call, CallFinally, Catch, CatchPad, CatchRet, ChangeRefCount, CleanupRet,
    Conversion, Load, LocalLoad, LocalStore, NewArray, NewObject, Phi, Sequence,
    SequenceElement, Store, Throw, Unary,
};
use crate::{Body, LabelId, Node, NodeId, NodeKind, Operand, RegionId};

pub trait NodeVisitor {
    type Error;

    fn visit_label(&mut self, id: NodeId, label: LabelId) -> Result<(), Self::Error>;
    fn visit_branch(&mut self, id: NodeId, branch: &Branch) -> Result<(), Self::Error>;
    fn visit_call(&mut self, id: NodeId, call: &Call) -> Result<(), Self::Error>;
    fn visit_call_finally(&mut self, id: NodeId, call: &CallFinally) -> Result<(), Self::Error>;
    fn visit_cast(&mut self, id: NodeId, cast: &Conversion) -> Result<(), Self::Error>;
    fn visit_catch(&mut self, id: NodeId, catch: &Catch) -> Result<(), Self::Error>;
    fn visit_catch_pad(&mut self, id: NodeId, pad: &CatchPad) -> Result<(), Self::Error>;
    fn visit_catch_ret(&mut self, id: NodeId, ret: &CatchRet) -> Result<(), Self::Error>;
    fn visit_cleanup_pad(&mut self, id: NodeId, region: RegionId) -> Result<(), Self::Error>;
    fn visit_cleanup_ret(&mut self, id: NodeId, ret: &CleanupRet) -> Result<(), Self::Error>;
    fn visit_landing_pad(&mut self, id: NodeId, region: RegionId) -> Result<(), Self::Error>;
    fn visit_load(&mut self, id: NodeId, load: &Load) -> Result<(), Self::Error>;
    fn visit_store(&mut self, id: NodeId, store: &Store) -> Result<(), Self::Error>;
    fn visit_local_load(&mut self, id: NodeId, load: &LocalLoad) -> Result<(), Self::Error>;
    fn visit_local_store(&mut self, id: NodeId, store: &LocalStore) -> Result<(), Self::Error>;
    fn visit_change_ref_count(
        &mut self,
        id: NodeId,
        change: &ChangeRefCount,
    ) -> Result<(), Self::Error>;
    fn visit_new_object(&mut self, id: NodeId, new: &NewObject) -> Result<(), Self::Error>;
    fn visit_new_array(&mut self, id: NodeId, new: &NewArray) -> Result<(), Self::Error>;
    fn visit_phi(&mut self, id: NodeId, phi: &Phi) -> Result<(), Self::Error>;
    fn visit_pointer_to_long(&mut self, id: NodeId, conv: &Conversion)
        -> Result<(), Self::Error>;
    fn visit_long_to_pointer(&mut self, id: NodeId, conv: &Conversion)
        -> Result<(), Self::Error>;
    fn visit_resume(&mut self, id: NodeId) -> Result<(), Self::Error>;
    fn visit_return(&mut self, id: NodeId, value: Option<&Operand>) -> Result<(), Self::Error>;
    fn visit_sequence(&mut self, id: NodeId, seq: &Sequence) -> Result<(), Self::Error>;
    fn visit_sequence_element(
        &mut self,
        id: NodeId,
        elem: &SequenceElement,
    ) -> Result<(), Self::Error>;
    fn visit_throw(&mut self, id: NodeId, throw: &Throw) -> Result<(), Self::Error>;
    fn visit_type_id(&mut self, id: NodeId, query: &Conversion) -> Result<(), Self::Error>;
    fn visit_unary(&mut self, id: NodeId, unary: &Unary) -> Result<(), Self::Error>;
    fn visit_binary(&mut self, id: NodeId, binary: &Binary) -> Result<(), Self::Error>;
}

/// Hand one node to the matching visitor method.
pub fn dispatch<V: NodeVisitor + ?Sized>(
    visitor: &mut V,
    id: NodeId,
    node: &Node,
) -> Result<(), V::Error> {
    match &node.kind {
        NodeKind::Label(label) => visitor.visit_label(id, *label),
        NodeKind::Branch(branch) => visitor.visit_branch(id, branch),
        NodeKind::Call(call) => visitor.visit_call(id, call),
        NodeKind::CallFinally(call) => visitor.visit_call_finally(id, call),
        NodeKind::Cast(cast) => visitor.visit_cast(id, cast),
        NodeKind::Catch(catch) => visitor.visit_catch(id, catch),
        NodeKind::CatchPad(pad) => visitor.visit_catch_pad(id, pad),
        NodeKind::CatchRet(ret) => visitor.visit_catch_ret(id, ret),
        NodeKind::CleanupPad { region } => visitor.visit_cleanup_pad(id, *region),
        NodeKind::CleanupRet(ret) => visitor.visit_cleanup_ret(id, ret),
        NodeKind::LandingPad { region } => visitor.visit_landing_pad(id, *region),
        NodeKind::Load(load) => visitor.visit_load(id, load),
        NodeKind::Store(store) => visitor.visit_store(id, store),
        NodeKind::LocalLoad(load) => visitor.visit_local_load(id, load),
        NodeKind::LocalStore(store) => visitor.visit_local_store(id, store),
        NodeKind::ChangeRefCount(change) => visitor.visit_change_ref_count(id, change),
        NodeKind::NewObject(new) => visitor.visit_new_object(id, new),
        NodeKind::NewArray(new) => visitor.visit_new_array(id, new),
        NodeKind::Phi(phi) => visitor.visit_phi(id, phi),
        NodeKind::PointerToLong(conv) => visitor.visit_pointer_to_long(id, conv),
        NodeKind::LongToPointer(conv) => visitor.visit_long_to_pointer(id, conv),
        NodeKind::Resume => visitor.visit_resume(id),
        NodeKind::Return(value) => visitor.visit_return(id, value.as_ref()),
        NodeKind::Sequence(seq) => visitor.visit_sequence(id, seq),
        NodeKind::SequenceElement(elem) => visitor.visit_sequence_element(id, elem),
        NodeKind::Throw(throw) => visitor.visit_throw(id, throw),
        NodeKind::TypeId(query) => visitor.visit_type_id(id, query),
        NodeKind::Unary(unary) => visitor.visit_unary(id, unary),
        NodeKind::Binary(binary) => visitor.visit_binary(id, binary),
    }
}

impl Body {
    /// Visit every linked node once, in instruction order.
    ///
    /// Stops at the first error the visitor returns.
    pub fn accept<V: NodeVisitor + ?Sized>(&self, visitor: &mut V) -> Result<(), V::Error> {
        for (id, node) in self.iter() {
            dispatch(visitor, id, node)?;
        }
        Ok(())
    }
}
