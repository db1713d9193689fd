//! Reference-count insertion over a lowered [`MethodGraph`].
//!
//! Runs once per method, after lowering and before verification. Adds
//! `ChangeRefCount` nodes; never removes or reorders existing ones.
//!
//! # Algorithm
//!
//! 1. **Fresh values.** Results of owned calls, allocations, caught
//!    exceptions, sequences and owned arithmetic carry +1. Casts and phis
//!    forward freshness from their inputs. An owned field, element or
//!    sequence member loaded out of a fresh value is incremented right
//!    after the load, so it holds its own +1 before its base is released.
//!
//! 2. **Last use.** A fresh temporary is consumed by its last use in
//!    sequence order. Stores into owned slots, returns, throws, phis, casts
//!    and sequences take ownership (a store's `INCREMENT` is cleared).
//!    Any other last use is followed by `_DecrementRef`. An unused fresh
//!    value is released right after its definition.
//!
//! 3. **Stores.** Each store into an owned slot gets `_IncrementRef(new)`
//!    then `_DecrementRef(old)` directly in front of it, as its `RcFlags`
//!    ask.
//!
//! 4. **Method boundaries** (main body only). Owned parameters are
//!    incremented after the entry label. Every `return` releases all owned
//!    slots, after incrementing a borrowed returned value. The cleanup pad
//!    of the method scope releases them on unwinding.
//!
//! 5. **Unwinding.** A raising call that leaves fresh temporaries in
//!    flight (its arguments, or values used after it returns) gets its own
//!    [`RegionKind::Release`] region. That region's cleanup pad releases
//!    them, then continues unwinding into the region the call was in.
//!
//! Owned locals start out null and decrementing null is a no-op at run
//! time, so slots are released on every exit whether or not they were
//! assigned.

use rustc_hash::{FxHashMap, FxHashSet};
use tac_graph::cfg::{successor_labels, Cfg};
use tac_graph::node::{ChangeRefCount, CleanupRet, RcDirection, RcTarget, UnwindEdge};
use tac_graph::{
    Body, LabelId, MethodGraph, NodeId, NodeKind, Operand, OperandKind, ProtectedRegion,
    RcFlags, RegionId, RegionKind, TempId,
};
use tac_ir::{Literal, LocalDecl, LocalId, Span, TypeId};
use tac_types::OwnershipClassification;
use tracing::{debug, trace};

/// Insert `_IncrementRef`/`_DecrementRef` nodes into every body of
/// `method`.
pub(crate) fn insert_rc(method: &mut MethodGraph, classifier: &dyn OwnershipClassification) {
    debug_assert!(
        !method.bodies("").any(|(_, body)| body
            .iter()
            .any(|(_, node)| matches!(node.kind, NodeKind::ChangeRefCount(_)))),
        "insert_rc: graph already contains reference-count nodes"
    );

    let owned_slots: Vec<Operand> = method
        .locals_with_ids()
        .filter(|(_, decl)| classifier.needs_rc(decl.ty))
        .map(|(id, decl)| Operand::local(id, decl.ty))
        .collect();
    let owned_params: Vec<Operand> = method
        .params()
        .filter(|(_, decl)| classifier.needs_rc(decl.ty))
        .map(|(id, decl)| Operand::local(id, decl.ty))
        .collect();
    debug!(
        owned_slots = owned_slots.len(),
        finally_functions = method.finally_functions.len(),
        "inserting RC operations"
    );

    let ctx = RcContext {
        locals: &method.locals,
        classifier,
        owned_slots: &owned_slots,
    };
    ctx.rewrite(&mut method.body, Some(&owned_params));
    for finally in &mut method.finally_functions {
        ctx.rewrite(&mut finally.body, None);
    }
}

/// Method-wide facts shared by every body of one method.
struct RcContext<'a> {
    locals: &'a [LocalDecl],
    classifier: &'a dyn OwnershipClassification,
    /// Owned locals and parameters, released on every method exit.
    owned_slots: &'a [Operand],
}

impl RcContext<'_> {
    fn is_owned(&self, ty: TypeId) -> bool {
        self.classifier.needs_rc(ty)
    }

    fn local_owned(&self, local: LocalId) -> bool {
        self.locals
            .get(local.index())
            .is_some_and(|decl| self.is_owned(decl.ty))
    }

    fn local_operand(&self, local: LocalId) -> Option<Operand> {
        self.locals
            .get(local.index())
            .map(|decl| Operand::local(local, decl.ty))
    }

    /// `owned_params` is `Some` for the main body, which also owns the
    /// method's entry and exits.
    fn rewrite(&self, body: &mut Body, owned_params: Option<&[Operand]>) {
        let fresh = self.fresh_temps(body);
        let mut edits = Edits::default();
        let transfers = self.plan_fresh(body, &fresh, &mut edits);
        for store in transfers {
            clear_increment(body, store);
        }
        self.plan_stores(body, &mut edits);
        if let Some(owned_params) = owned_params {
            self.plan_boundaries(body, &fresh, owned_params, &mut edits);
        }
        trace!(
            fresh = fresh.len(),
            inserted = edits.len(),
            "RC operations planned"
        );
        edits.apply(body);
        release_in_flight(body, &fresh);
    }

    // ── Freshness ───────────────────────────────────────────────────

    /// Temporary holding a new +1 reference created by `kind` itself.
    fn fresh_source(&self, kind: &NodeKind) -> Option<TempId> {
        let dst = match kind {
            NodeKind::Call(call) => call.dst.as_ref()?,
            NodeKind::NewObject(_)
            | NodeKind::NewArray(_)
            | NodeKind::Catch(_)
            | NodeKind::Sequence(_)
            | NodeKind::Unary(_)
            | NodeKind::Binary(_) => kind.dst()?,
            _ => return None,
        };
        self.is_owned(dst.ty).then(|| dst.as_temp()).flatten()
    }

    fn fresh_temps(&self, body: &Body) -> FxHashSet<TempId> {
        let mut fresh: FxHashSet<TempId> = body
            .iter()
            .filter_map(|(_, node)| self.fresh_source(&node.kind))
            .collect();

        // Casts, phis and projections of fresh values are fresh; iterate
        // for loops.
        let mut changed = true;
        while changed {
            changed = false;
            for (_, node) in body.iter() {
                let forwarded = match &node.kind {
                    NodeKind::Cast(cast) if is_fresh(&fresh, &cast.value) => Some(cast.dst),
                    NodeKind::Load(load)
                        if load.source.operands().any(|base| is_fresh(&fresh, base)) =>
                    {
                        Some(load.dst)
                    }
                    NodeKind::SequenceElement(elem) if is_fresh(&fresh, &elem.sequence) => {
                        Some(elem.dst)
                    }
                    NodeKind::Phi(phi)
                        if phi.incoming.iter().any(|(_, value)| is_fresh(&fresh, value)) =>
                    {
                        Some(phi.dst)
                    }
                    _ => None,
                };
                let Some(dst) = forwarded.filter(|dst| self.is_owned(dst.ty)) else {
                    continue;
                };
                if let Some(temp) = dst.as_temp() {
                    changed |= fresh.insert(temp);
                }
            }
        }
        fresh
    }

    /// Release or hand off every fresh temporary. Returns the stores that
    /// take ownership of their value.
    fn plan_fresh(
        &self,
        body: &Body,
        fresh: &FxHashSet<TempId>,
        edits: &mut Edits,
    ) -> Vec<NodeId> {
        let mut last_use: FxHashMap<TempId, NodeId> = FxHashMap::default();
        for (id, node) in body.iter() {
            for used in node.kind.used_operands() {
                if let Some(temp) = used.as_temp().filter(|t| fresh.contains(t)) {
                    last_use.insert(temp, id);
                }
            }
        }

        // Planned first so each increment lands ahead of its base's release.
        for (id, node) in body.iter() {
            if let Some(dst) = projected(&node.kind).filter(|dst| is_fresh(fresh, dst)) {
                edits.after(id, increment(RcTarget::Value(*dst)));
            }
        }

        let cfg = Cfg::build(body);
        let mut transfers = Vec::new();
        for (id, node) in body.iter() {
            let fresh_dst = node
                .kind
                .dst()
                .and_then(|dst| Some((*dst, dst.as_temp()?)))
                .filter(|(_, temp)| fresh.contains(temp));
            if let Some((dst, temp)) = fresh_dst {
                match last_use.get(&temp).copied() {
                    None => edits.release_after(body, id, dst),
                    Some(user) if self.takes_ownership(body.kind(user), &dst) => {
                        if matches!(
                            body.kind(user),
                            NodeKind::LocalStore(_) | NodeKind::Store(_)
                        ) {
                            transfers.push(user);
                        }
                    }
                    Some(user) => edits.release_after(body, user, dst),
                }
            }
            self.plan_borrowed_inputs(&cfg, fresh, id, &node.kind, edits);
        }
        transfers
    }

    /// Whether `kind`, as the last use of fresh `value`, consumes it.
    fn takes_ownership(&self, kind: &NodeKind, value: &Operand) -> bool {
        match kind {
            NodeKind::LocalStore(store) => store.value == *value && self.local_owned(store.local),
            NodeKind::Store(store) => store.value == *value && self.is_owned(store.target.ty()),
            NodeKind::Return(Some(returned)) => returned == value,
            NodeKind::Throw(throw) => throw.value == *value,
            NodeKind::Cast(cast) => self.is_owned(cast.dst.ty),
            NodeKind::Phi(phi) => self.is_owned(phi.dst.ty),
            NodeKind::Sequence(seq) => self.is_owned(seq.dst.ty),
            _ => false,
        }
    }

    /// Consumers of fresh values also consume their borrowed inputs;
    /// those need their own +1 first.
    fn plan_borrowed_inputs(
        &self,
        cfg: &Cfg,
        fresh: &FxHashSet<TempId>,
        id: NodeId,
        kind: &NodeKind,
        edits: &mut Edits,
    ) {
        let borrowed = |value: &Operand| {
            self.is_owned(value.ty) && !is_fresh(fresh, value) && !is_null(value)
        };
        match kind {
            NodeKind::Phi(phi) if is_fresh(fresh, &phi.dst) => {
                for (pred, value) in phi.incoming.iter().filter(|(_, v)| borrowed(v)) {
                    match block_terminator(cfg, *pred) {
                        Some(term) => edits.before(term, increment(RcTarget::Value(*value))),
                        None => debug_assert!(false, "phi predecessor {pred} has no terminator"),
                    }
                }
            }
            NodeKind::Sequence(seq) if is_fresh(fresh, &seq.dst) => {
                for value in seq.elements.iter().filter(|v| borrowed(v)) {
                    edits.before(id, increment(RcTarget::Value(*value)));
                }
            }
            NodeKind::Throw(throw) if borrowed(&throw.value) => {
                edits.before(id, increment(RcTarget::Value(throw.value)));
            }
            _ => {}
        }
    }

    // ── Stores ──────────────────────────────────────────────────────

    fn plan_stores(&self, body: &Body, edits: &mut Edits) {
        for (id, node) in body.iter() {
            let (value, old, rc) = match &node.kind {
                NodeKind::LocalStore(store) if self.local_owned(store.local) => {
                    let Some(old) = self.local_operand(store.local) else {
                        continue;
                    };
                    (store.value, RcTarget::Value(old), store.rc)
                }
                NodeKind::Store(store) if self.is_owned(store.target.ty()) => {
                    (store.value, RcTarget::Slot(store.target), store.rc)
                }
                _ => continue,
            };
            if rc.contains(RcFlags::INCREMENT) && !is_null(&value) {
                edits.before(id, increment(RcTarget::Value(value)));
            }
            if rc.contains(RcFlags::DECREMENT) {
                edits.before(id, decrement(old));
            }
        }
    }

    // ── Method entry and exits ──────────────────────────────────────

    fn plan_boundaries(
        &self,
        body: &Body,
        fresh: &FxHashSet<TempId>,
        owned_params: &[Operand],
        edits: &mut Edits,
    ) {
        if let Some(entry) = body.entry() {
            for param in owned_params {
                edits.after(entry, increment(RcTarget::Value(*param)));
            }
        }

        for (id, node) in body.iter() {
            match &node.kind {
                NodeKind::Return(value) => {
                    if let Some(value) = value.filter(|v| {
                        self.is_owned(v.ty) && !is_fresh(fresh, v) && !is_null(v)
                    }) {
                        edits.before(id, increment(RcTarget::Value(value)));
                    }
                    self.release_slots(id, edits);
                }
                NodeKind::CleanupRet(ret) if is_scope_pad(body, ret.pad) => {
                    self.release_slots(id, edits);
                }
                _ => {}
            }
        }
    }

    fn release_slots(&self, before: NodeId, edits: &mut Edits) {
        for slot in self.owned_slots {
            edits.before(before, decrement(RcTarget::Value(*slot)));
        }
    }
}

// ── Unwinding ───────────────────────────────────────────────────────

/// Route every raising call that leaves fresh temporaries in flight
/// through a release region of its own.
fn release_in_flight(body: &mut Body, fresh: &FxHashSet<TempId>) {
    let in_flight = liveness::in_flight_at_calls(body, fresh);
    if in_flight.is_empty() {
        return;
    }
    let defined: Vec<Operand> = body
        .iter()
        .filter_map(|(_, node)| node.kind.dst().copied())
        .filter(|dst| is_fresh(fresh, dst))
        .collect();
    debug!(calls = in_flight.len(), "releasing in-flight temporaries on unwind");
    for (call, temps) in in_flight {
        let values: Vec<Operand> = defined
            .iter()
            .filter(|value| value.as_temp().is_some_and(|temp| temps.contains(&temp)))
            .copied()
            .collect();
        add_release_region(body, call, &values);
    }
}

/// Give `call` a release region whose cleanup pad drops `values` and then
/// unwinds into the region the call used to unwind into. The pad blocks go
/// at the end of the body.
fn add_release_region(body: &mut Body, call: NodeId, values: &[Operand]) {
    let node = body.node(call);
    let (span, outer) = (node.span, node.region);
    let old_edge = node.kind.unwind_edge();
    let parent = old_edge.map(|edge| edge.region);
    debug_assert!(
        old_edge.is_some() || outer.is_none(),
        "raising call inside a region without an unwind edge"
    );

    let normal = match old_edge {
        Some(edge) => edge.normal,
        None => split_after(body, call, span, outer),
    };
    let landing = body.new_label();
    let cleanup = body.new_label();
    let region = body.add_region(ProtectedRegion {
        kind: RegionKind::Release,
        landing,
        parent,
        fallback: Some(cleanup),
        used: true,
    });
    if let NodeKind::Call(call) = body.kind_mut(call) {
        call.unwind = Some(UnwindEdge { normal, region });
    }
    body.set_region(call, Some(region));

    let Some(mut tail) = body.exit() else {
        return;
    };
    let mut append = |body: &mut Body, kind: NodeKind| {
        let id = body.alloc_in(kind, span, parent);
        body.insert_after(tail, id);
        tail = id;
        id
    };
    append(body, NodeKind::Label(landing));
    append(body, NodeKind::LandingPad { region });
    append(body, NodeKind::Label(cleanup));
    let pad = append(body, NodeKind::CleanupPad { region });
    for value in values {
        append(body, decrement(RcTarget::Value(*value)));
    }
    append(
        body,
        NodeKind::CleanupRet(CleanupRet {
            pad,
            unwind: parent,
        }),
    );
    trace!(?call, ?region, released = values.len(), "release region added");
}

/// End the block at `call` with a new label, so the call can carry an
/// unwind edge. Phis fed from the rest of the block now name that label as
/// their predecessor.
fn split_after(body: &mut Body, call: NodeId, span: Span, region: Option<RegionId>) -> LabelId {
    let block = enclosing_label(body, call);
    let normal = body.new_label();
    let label = body.alloc_in(NodeKind::Label(normal), span, region);
    body.insert_after(call, label);

    let Some(block) = block else {
        return normal;
    };
    let mut cursor = body.node(label).next();
    while let Some(id) = cursor {
        if body.kind(id).is_terminator() {
            for succ in successor_labels(body, body.kind(id)) {
                rename_phi_predecessor(body, succ, block, normal);
            }
            break;
        }
        cursor = body.node(id).next();
    }
    normal
}

fn enclosing_label(body: &Body, node: NodeId) -> Option<LabelId> {
    let mut cursor = Some(node);
    while let Some(id) = cursor {
        if let NodeKind::Label(label) = body.kind(id) {
            return Some(*label);
        }
        cursor = body.node(id).prev();
    }
    None
}

fn rename_phi_predecessor(body: &mut Body, block: LabelId, from: LabelId, to: LabelId) {
    let mut cursor = body.label_node(block).and_then(|label| body.node(label).next());
    while let Some(id) = cursor {
        let NodeKind::Phi(phi) = body.kind_mut(id) else {
            break;
        };
        for (pred, _) in &mut phi.incoming {
            if *pred == from {
                *pred = to;
            }
        }
        cursor = body.node(id).next();
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Value a load or sequence-element node borrows out of another value.
fn projected(kind: &NodeKind) -> Option<&Operand> {
    match kind {
        NodeKind::Load(load) => Some(&load.dst),
        NodeKind::SequenceElement(elem) => Some(&elem.dst),
        _ => None,
    }
}

fn is_fresh(fresh: &FxHashSet<TempId>, value: &Operand) -> bool {
    value.as_temp().is_some_and(|temp| fresh.contains(&temp))
}

fn is_null(value: &Operand) -> bool {
    matches!(value.kind, OperandKind::Literal(Literal::Null))
}

fn is_scope_pad(body: &Body, pad: NodeId) -> bool {
    let NodeKind::CleanupPad { region } = body.kind(pad) else {
        return false;
    };
    body.region(*region)
        .is_some_and(|r| r.kind == RegionKind::Scope)
}

fn block_terminator(cfg: &Cfg, label: LabelId) -> Option<NodeId> {
    cfg.block(label).and_then(|block| block.terminator)
}

fn clear_increment(body: &mut Body, store: NodeId) {
    match body.kind_mut(store) {
        NodeKind::LocalStore(store) => store.rc.remove(RcFlags::INCREMENT),
        NodeKind::Store(store) => store.rc.remove(RcFlags::INCREMENT),
        _ => {}
    }
}

fn increment(target: RcTarget) -> NodeKind {
    NodeKind::ChangeRefCount(ChangeRefCount {
        target,
        direction: RcDirection::Increment,
    })
}

fn decrement(target: RcTarget) -> NodeKind {
    NodeKind::ChangeRefCount(ChangeRefCount {
        target,
        direction: RcDirection::Decrement,
    })
}

/// Planned insertions, applied once planning has finished walking the
/// body.
#[derive(Default)]
struct Edits {
    before: Vec<(NodeId, NodeKind)>,
    after: Vec<(NodeId, NodeKind)>,
}

impl Edits {
    fn len(&self) -> usize {
        self.before.len() + self.after.len()
    }

    fn before(&mut self, anchor: NodeId, kind: NodeKind) {
        self.before.push((anchor, kind));
    }

    fn after(&mut self, anchor: NodeId, kind: NodeKind) {
        self.after.push((anchor, kind));
    }

    /// Release `value` once `node` is done with it. A call with an unwind
    /// edge finishes at its normal label; a phi at the end of its block's
    /// phi group.
    fn release_after(&mut self, body: &Body, node: NodeId, value: Operand) {
        let kind = body.kind(node);
        let release = decrement(RcTarget::Value(value));
        if let Some(edge) = kind.unwind_edge() {
            if let Some(label) = body.label_node(edge.normal) {
                self.after(label, release);
                return;
            }
        }
        match kind {
            NodeKind::Phi(_) => {
                let mut last = node;
                while let Some(next) = body.node(last).next() {
                    if !matches!(body.kind(next), NodeKind::Phi(_)) {
                        break;
                    }
                    last = next;
                }
                self.after(last, release);
            }
            kind if kind.is_terminator() => {
                debug_assert!(false, "fresh value last used by a terminator");
                self.before(node, release);
            }
            _ => self.after(node, release),
        }
    }

    /// `before` edits keep their planned order in front of the anchor;
    /// `after` edits are chained so they also keep it.
    fn apply(self, body: &mut Body) {
        for (anchor, kind) in self.before {
            let node = alloc_beside(body, anchor, kind);
            body.insert_before(anchor, node);
        }
        let mut tails: FxHashMap<NodeId, NodeId> = FxHashMap::default();
        for (anchor, kind) in self.after {
            let at = tails.get(&anchor).copied().unwrap_or(anchor);
            let node = alloc_beside(body, anchor, kind);
            body.insert_after(at, node);
            tails.insert(anchor, node);
        }
    }
}

fn alloc_beside(body: &mut Body, anchor: NodeId, kind: NodeKind) -> NodeId {
    let anchor = body.node(anchor);
    let (span, region) = (anchor.span, anchor.region);
    body.alloc_in(kind, span, region)
}

mod liveness;

#[cfg(test)]
mod tests;
