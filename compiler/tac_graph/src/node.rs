//! TAC node kinds.
//!
//! [`NodeKind`] is a closed enum: every consumer matches it exhaustively
//! (see [`NodeVisitor`](crate::NodeVisitor)), so adding a kind forces every
//! consumer to handle it.

use bitflags::bitflags;
use smallvec::SmallVec;
use tac_ir::{BinaryOp, LocalId, Name, Span, TypeId, UnaryOp};

use crate::{FinallyId, LabelId, NodeId, Operand, Reference, RegionId};

// ── Control flow ────────────────────────────────────────────────────

/// Block terminator transferring control to one or more labels.
#[derive(Clone, Debug, PartialEq)]
pub enum Branch {
    Direct(LabelId),
    Conditional {
        cond: Operand,
        if_true: LabelId,
        if_false: LabelId,
    },
    /// Jump to the label whose address `address` holds.
    ///
    /// `address` is the result of a phi over label addresses; `targets`
    /// lists exactly those labels.
    Indirect {
        address: Operand,
        targets: SmallVec<[LabelId; 4]>,
    },
}

/// Exceptional successor of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UnwindEdge {
    /// Label placed immediately after the call; reached on normal return.
    pub normal: LabelId,
    /// Region whose landing pad is reached if the callee raises.
    pub region: RegionId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    pub dst: Option<Operand>,
    /// Fully qualified callee name.
    pub callee: Name,
    /// Receiver first for instance calls.
    pub args: Vec<Operand>,
    /// The callee is known not to raise; never carries an unwind edge.
    pub nounwind: bool,
    pub unwind: Option<UnwindEdge>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallFinally {
    pub finally: FinallyId,
    pub unwind: Option<UnwindEdge>,
}

/// SSA merge at the start of a block.
#[derive(Clone, Debug, PartialEq)]
pub struct Phi {
    pub dst: Operand,
    /// Value live on the edge from each predecessor label.
    pub incoming: Vec<(LabelId, Operand)>,
}

// ── Exception handling ──────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatchPad {
    pub region: RegionId,
    /// Declared exception type of the clause.
    pub ty: TypeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatchRet {
    /// The `CatchPad` node being left.
    pub pad: NodeId,
    pub successor: LabelId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleanupRet {
    /// The `CleanupPad` node being left.
    pub pad: NodeId,
    /// Region to continue unwinding into; `None` leaves the method.
    pub unwind: Option<RegionId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Throw {
    pub value: Operand,
    pub unwind: Option<RegionId>,
}

// ── Memory and values ───────────────────────────────────────────────

bitflags! {
    /// Reference-count work a store still needs.
    ///
    /// Both bits are set when lowering creates a store; RC insertion and
    /// later optimizations clear them.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct RcFlags: u8 {
        /// Increment the value being stored.
        const INCREMENT = 1 << 0;
        /// Decrement the value being overwritten.
        const DECREMENT = 1 << 1;
    }
}

impl Default for RcFlags {
    fn default() -> Self {
        RcFlags::all()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Store {
    pub target: Reference,
    pub value: Operand,
    pub rc: RcFlags,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalStore {
    pub local: LocalId,
    pub value: Operand,
    pub rc: RcFlags,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Load {
    pub dst: Operand,
    pub source: Reference,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalLoad {
    pub dst: Operand,
    pub local: LocalId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RcDirection {
    Increment,
    Decrement,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RcTarget {
    /// A value held in a local or temporary.
    Value(Operand),
    /// The value currently held in a field or array slot.
    Slot(Reference),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChangeRefCount {
    pub target: RcTarget,
    pub direction: RcDirection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewObject {
    /// Typed with the class being allocated.
    pub dst: Operand,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewArray {
    pub dst: Operand,
    pub elem: TypeId,
    pub len: Operand,
}

/// One-input value operation: casts, pointer/long reinterpretation and
/// type-id queries. The result type is `dst.ty`.
#[derive(Clone, Debug, PartialEq)]
pub struct Conversion {
    pub dst: Operand,
    pub value: Operand,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Catch {
    /// Receives the in-flight exception object; typed with the clause type.
    pub dst: Operand,
    pub pad: NodeId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sequence {
    pub dst: Operand,
    pub elements: Vec<Operand>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SequenceElement {
    pub dst: Operand,
    pub sequence: Operand,
    pub index: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Unary {
    pub dst: Operand,
    pub op: UnaryOp,
    pub operand: Operand,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Binary {
    pub dst: Operand,
    pub op: BinaryOp,
    pub lhs: Operand,
    pub rhs: Operand,
}

// ── Node ────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Label(LabelId),
    Branch(Branch),
    Call(Call),
    CallFinally(CallFinally),
    Cast(Conversion),
    Catch(Catch),
    CatchPad(CatchPad),
    CatchRet(CatchRet),
    CleanupPad { region: RegionId },
    CleanupRet(CleanupRet),
    LandingPad { region: RegionId },
    Load(Load),
    Store(Store),
    LocalLoad(LocalLoad),
    LocalStore(LocalStore),
    ChangeRefCount(ChangeRefCount),
    NewObject(NewObject),
    NewArray(NewArray),
    Phi(Phi),
    PointerToLong(Conversion),
    LongToPointer(Conversion),
    Resume,
    Return(Option<Operand>),
    Sequence(Sequence),
    SequenceElement(SequenceElement),
    Throw(Throw),
    TypeId(Conversion),
    Unary(Unary),
    Binary(Binary),
}

impl NodeKind {
    /// Whether this node ends its block.
    pub fn is_terminator(&self) -> bool {
        match self {
            NodeKind::Branch(_)
            | NodeKind::Return(_)
            | NodeKind::Throw(_)
            | NodeKind::Resume
            | NodeKind::LandingPad { .. }
            | NodeKind::CatchRet(_)
            | NodeKind::CleanupRet(_) => true,
            NodeKind::Call(call) => call.unwind.is_some(),
            NodeKind::CallFinally(call) => call.unwind.is_some(),
            _ => false,
        }
    }

    pub fn is_pad(&self) -> bool {
        matches!(
            self,
            NodeKind::CatchPad(_) | NodeKind::CleanupPad { .. } | NodeKind::LandingPad { .. }
        )
    }

    /// Unwind edge of a call-like node.
    pub fn unwind_edge(&self) -> Option<UnwindEdge> {
        match self {
            NodeKind::Call(call) => call.unwind,
            NodeKind::CallFinally(call) => call.unwind,
            _ => None,
        }
    }

    /// The operand this node writes, if any.
    pub fn dst(&self) -> Option<&Operand> {
        match self {
            NodeKind::Call(Call { dst, .. }) => dst.as_ref(),
            NodeKind::Cast(c)
            | NodeKind::PointerToLong(c)
            | NodeKind::LongToPointer(c)
            | NodeKind::TypeId(c) => Some(&c.dst),
            NodeKind::Catch(Catch { dst, .. })
            | NodeKind::Load(Load { dst, .. })
            | NodeKind::LocalLoad(LocalLoad { dst, .. })
            | NodeKind::NewObject(NewObject { dst })
            | NodeKind::NewArray(NewArray { dst, .. })
            | NodeKind::Phi(Phi { dst, .. })
            | NodeKind::Sequence(Sequence { dst, .. })
            | NodeKind::SequenceElement(SequenceElement { dst, .. })
            | NodeKind::Unary(Unary { dst, .. })
            | NodeKind::Binary(Binary { dst, .. }) => Some(dst),
            NodeKind::Label(_)
            | NodeKind::Branch(_)
            | NodeKind::CallFinally(_)
            | NodeKind::CatchPad(_)
            | NodeKind::CatchRet(_)
            | NodeKind::CleanupPad { .. }
            | NodeKind::CleanupRet(_)
            | NodeKind::LandingPad { .. }
            | NodeKind::Store(_)
            | NodeKind::LocalStore(_)
            | NodeKind::ChangeRefCount(_)
            | NodeKind::Resume
            | NodeKind::Return(_)
            | NodeKind::Throw(_) => None,
        }
    }

    /// Operands this node reads, in source order.
    pub fn used_operands(&self) -> SmallVec<[&Operand; 4]> {
        let mut used = SmallVec::new();
        match self {
            NodeKind::Branch(Branch::Conditional { cond, .. }) => used.push(cond),
            NodeKind::Branch(Branch::Indirect { address, .. }) => used.push(address),
            NodeKind::Call(call) => used.extend(call.args.iter()),
            NodeKind::Cast(c)
            | NodeKind::PointerToLong(c)
            | NodeKind::LongToPointer(c)
            | NodeKind::TypeId(c) => used.push(&c.value),
            NodeKind::Load(load) => used.extend(load.source.operands()),
            NodeKind::Store(store) => {
                used.extend(store.target.operands());
                used.push(&store.value);
            }
            NodeKind::LocalStore(store) => used.push(&store.value),
            NodeKind::ChangeRefCount(change) => match &change.target {
                RcTarget::Value(value) => used.push(value),
                RcTarget::Slot(slot) => used.extend(slot.operands()),
            },
            NodeKind::NewArray(new) => used.push(&new.len),
            NodeKind::Phi(phi) => used.extend(phi.incoming.iter().map(|(_, value)| value)),
            NodeKind::Return(Some(value)) => used.push(value),
            NodeKind::Sequence(seq) => used.extend(seq.elements.iter()),
            NodeKind::SequenceElement(elem) => used.push(&elem.sequence),
            NodeKind::Throw(throw) => used.push(&throw.value),
            NodeKind::Unary(unary) => used.push(&unary.operand),
            NodeKind::Binary(binary) => {
                used.push(&binary.lhs);
                used.push(&binary.rhs);
            }
            NodeKind::Label(_)
            | NodeKind::Branch(Branch::Direct(_))
            | NodeKind::CallFinally(_)
            | NodeKind::Catch(_)
            | NodeKind::CatchPad(_)
            | NodeKind::CatchRet(_)
            | NodeKind::CleanupPad { .. }
            | NodeKind::CleanupRet(_)
            | NodeKind::LandingPad { .. }
            | NodeKind::LocalLoad(_)
            | NodeKind::NewObject(_)
            | NodeKind::Resume
            | NodeKind::Return(None) => {}
        }
        used
    }

    /// Short kind name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Label(_) => "label",
            NodeKind::Branch(_) => "branch",
            NodeKind::Call(_) => "call",
            NodeKind::CallFinally(_) => "call-finally",
            NodeKind::Cast(_) => "cast",
            NodeKind::Catch(_) => "catch",
            NodeKind::CatchPad(_) => "catch-pad",
            NodeKind::CatchRet(_) => "catch-return",
            NodeKind::CleanupPad { .. } => "cleanup-pad",
            NodeKind::CleanupRet(_) => "cleanup-return",
            NodeKind::LandingPad { .. } => "landing-pad",
            NodeKind::Load(_) => "load",
            NodeKind::Store(_) => "store",
            NodeKind::LocalLoad(_) => "local-load",
            NodeKind::LocalStore(_) => "local-store",
            NodeKind::ChangeRefCount(_) => "change-ref-count",
            NodeKind::NewObject(_) => "new-object",
            NodeKind::NewArray(_) => "new-array",
            NodeKind::Phi(_) => "phi",
            NodeKind::PointerToLong(_) => "pointer-to-long",
            NodeKind::LongToPointer(_) => "long-to-pointer",
            NodeKind::Resume => "resume",
            NodeKind::Return(_) => "return",
            NodeKind::Sequence(_) => "sequence",
            NodeKind::SequenceElement(_) => "sequence-element",
            NodeKind::Throw(_) => "throw",
            NodeKind::TypeId(_) => "type-id",
            NodeKind::Unary(_) => "unary",
            NodeKind::Binary(_) => "binary",
        }
    }
}

/// One arena slot: the node plus its position in the instruction sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    /// Innermost protected region active where the node was emitted.
    pub region: Option<RegionId>,
    pub(crate) prev: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
}

impl Node {
    #[inline]
    pub fn prev(&self) -> Option<NodeId> {
        self.prev
    }

    #[inline]
    pub fn next(&self) -> Option<NodeId> {
        self.next
    }
}
