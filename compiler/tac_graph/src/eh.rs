//! Exception-handling sub-model.
//!
//! Protected regions live in a per-body table beside the node arena.
//! Unwind edges name a [`RegionId`], never a bare label: the landing label
//! is always looked up through the region, so an unwind edge cannot point
//! at an ordinary block.
//!
//! # Region lifecycle
//!
//! ```text
//! NORMAL ──call with unwind edge──▶ CALLING ──returns──▶ NORMAL-CONTINUE (edge.normal)
//!                                      │
//!                                      └──raises──▶ UNWINDING (region landing pad)
//! ```
//!
//! From the landing pad, a catch region tries each clause in declaration
//! order and otherwise continues to its fallback label (the parent region's
//! landing label, or a `resume` block). Cleanup, scope and release regions
//! send every exception to their cleanup pad, which re-raises via
//! `cleanupret` once the cleanup has run.

use tac_ir::TypeId;

use crate::{FinallyId, LabelId, RegionId};

/// One `catch (T)` clause: the type tested and the label of its catch pad.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CatchTarget {
    pub ty: TypeId,
    pub label: LabelId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegionKind {
    /// Body of a `try` with catch clauses, in declaration order.
    Catch { clauses: Vec<CatchTarget> },
    /// Body and catch clauses of a `try` with a `finally`.
    Cleanup { finally: FinallyId },
    /// Whole method; releases owned slots when an exception leaves it.
    Scope,
    /// One call; releases the temporaries it leaves in flight when it
    /// raises. Added by RC insertion.
    Release,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtectedRegion {
    pub kind: RegionKind,
    /// Label of the block holding the landing pad.
    pub landing: LabelId,
    /// Enclosing region, consulted when nothing here handles the exception.
    pub parent: Option<RegionId>,
    /// Where the landing pad sends exceptions no clause matched. For
    /// cleanup and scope regions this is the cleanup pad label.
    pub fallback: Option<LabelId>,
    /// Set once any unwind edge targets this region. Handlers for unused
    /// regions are never emitted.
    pub used: bool,
}

impl ProtectedRegion {
    pub fn new(kind: RegionKind, landing: LabelId, parent: Option<RegionId>) -> Self {
        ProtectedRegion {
            kind,
            landing,
            parent,
            fallback: None,
            used: false,
        }
    }

    /// Labels the landing pad dispatches to, catch clauses first.
    pub fn dispatch_targets(&self) -> impl Iterator<Item = LabelId> + '_ {
        let clauses: &[CatchTarget] = match &self.kind {
            RegionKind::Catch { clauses } => clauses,
            RegionKind::Cleanup { .. } | RegionKind::Scope | RegionKind::Release => &[],
        };
        clauses
            .iter()
            .map(|clause| clause.label)
            .chain(self.fallback)
    }

    /// Whether the landing pad goes straight to a cleanup pad.
    pub fn is_cleanup(&self) -> bool {
        !matches!(self.kind, RegionKind::Catch { .. })
    }
}
