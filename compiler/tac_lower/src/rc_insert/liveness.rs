//! Backward liveness of fresh temporaries over a [`Body`].
//!
//! Standard gen/kill dataflow iterated to a fixed point. A phi input is a
//! use at the end of the predecessor it arrives from, never at the phi's
//! own block. Reference-count nodes are uses like any other, so once the
//! releases are placed a temporary is live exactly while this frame still
//! owns a reference to it.

use rustc_hash::{FxHashMap, FxHashSet};
use tac_graph::cfg::Cfg;
use tac_graph::{Body, LabelId, NodeId, NodeKind, Operand, TempId};
use tracing::trace;

pub(super) type LiveSet = FxHashSet<TempId>;

/// Tracked temporaries a raising call leaves in flight: live before the
/// call, minus whatever the region it unwinds into still uses. Calls are
/// listed in sequence order; calls with nothing in flight are skipped.
pub(super) fn in_flight_at_calls(
    body: &Body,
    tracked: &FxHashSet<TempId>,
) -> Vec<(NodeId, LiveSet)> {
    let cfg = Cfg::build(body);
    let (live_in, live_out) = block_liveness(body, &cfg, tracked);

    let mut in_flight = Vec::new();
    for block in cfg.blocks() {
        let mut live = live_out.get(&block.label).cloned().unwrap_or_default();
        let mut at_calls = Vec::new();
        for &id in block.nodes.iter().rev() {
            let kind = body.kind(id);
            if let Some(temp) = kind.dst().and_then(Operand::as_temp) {
                live.remove(&temp);
            }
            if !matches!(kind, NodeKind::Phi(_)) {
                live.extend(tracked_uses(kind, tracked));
            }
            let NodeKind::Call(call) = kind else {
                continue;
            };
            if call.nounwind {
                continue;
            }
            let handled = call
                .unwind
                .and_then(|edge| body.region(edge.region))
                .and_then(|region| live_in.get(&region.landing));
            let mut set = live.clone();
            if let Some(handled) = handled {
                set.retain(|temp| !handled.contains(temp));
            }
            if !set.is_empty() {
                at_calls.push((id, set));
            }
        }
        in_flight.extend(at_calls.into_iter().rev());
    }
    trace!(calls = in_flight.len(), "in-flight temporaries computed");
    in_flight
}

/// `live_in` and `live_out` per block label.
fn block_liveness(
    body: &Body,
    cfg: &Cfg,
    tracked: &FxHashSet<TempId>,
) -> (FxHashMap<LabelId, LiveSet>, FxHashMap<LabelId, LiveSet>) {
    let mut gen: FxHashMap<LabelId, LiveSet> = FxHashMap::default();
    let mut kill: FxHashMap<LabelId, LiveSet> = FxHashMap::default();
    // Phi inputs, keyed by the predecessor they arrive from.
    let mut phi_out: FxHashMap<LabelId, LiveSet> = FxHashMap::default();

    for block in cfg.blocks() {
        let block_gen = gen.entry(block.label).or_default();
        let block_kill = kill.entry(block.label).or_default();
        for &id in &block.nodes {
            let kind = body.kind(id);
            if let NodeKind::Phi(phi) = kind {
                for (pred, value) in &phi.incoming {
                    if let Some(temp) = value.as_temp().filter(|t| tracked.contains(t)) {
                        phi_out.entry(*pred).or_default().insert(temp);
                    }
                }
            } else {
                for temp in tracked_uses(kind, tracked) {
                    if !block_kill.contains(&temp) {
                        block_gen.insert(temp);
                    }
                }
            }
            if let Some(temp) = kind.dst().and_then(Operand::as_temp) {
                if tracked.contains(&temp) {
                    block_kill.insert(temp);
                }
            }
        }
    }

    let mut live_in: FxHashMap<LabelId, LiveSet> = FxHashMap::default();
    let mut live_out: FxHashMap<LabelId, LiveSet> = FxHashMap::default();
    let mut iterations = 0u32;
    loop {
        iterations += 1;
        let mut changed = false;
        // Reverse block order visits most successors first.
        for block in cfg.blocks().iter().rev() {
            let label = block.label;
            let mut out = phi_out.get(&label).cloned().unwrap_or_default();
            for succ in cfg.successors(label) {
                if let Some(succ_in) = live_in.get(succ) {
                    out.extend(succ_in.iter().copied());
                }
            }
            let mut inn = gen.get(&label).cloned().unwrap_or_default();
            let block_kill = kill.get(&label);
            inn.extend(
                out.iter()
                    .copied()
                    .filter(|temp| !block_kill.is_some_and(|k| k.contains(temp))),
            );
            if live_in.get(&label) != Some(&inn) || live_out.get(&label) != Some(&out) {
                changed = true;
                live_in.insert(label, inn);
                live_out.insert(label, out);
            }
        }
        if !changed {
            break;
        }
    }
    trace!(iterations, "liveness converged");
    (live_in, live_out)
}

fn tracked_uses<'a>(
    kind: &'a NodeKind,
    tracked: &'a FxHashSet<TempId>,
) -> impl Iterator<Item = TempId> + 'a {
    kind.used_operands()
        .into_iter()
        .filter_map(Operand::as_temp)
        .filter(move |temp| tracked.contains(temp))
}
