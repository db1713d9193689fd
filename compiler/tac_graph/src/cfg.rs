//! Block partition and control-flow edges of a [`Body`].
//!
//! A block is a label node plus everything up to and including the first
//! terminator that follows it. Edges come from terminators only; unwind
//! edges resolve through the region table to the region's landing label.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::{smallvec, SmallVec};

use crate::{Body, Branch, LabelId, NodeId, NodeKind, RegionId};

/// Labels control can reach directly from `kind`.
///
/// Empty for non-terminators and for terminators that leave the body.
pub fn successor_labels(body: &Body, kind: &NodeKind) -> SmallVec<[LabelId; 4]> {
    let landing = |region: RegionId| body.region(region).map(|r| r.landing);
    match kind {
        NodeKind::Branch(Branch::Direct(target)) => smallvec![*target],
        NodeKind::Branch(Branch::Conditional {
            if_true, if_false, ..
        }) => smallvec![*if_true, *if_false],
        NodeKind::Branch(Branch::Indirect { targets, .. }) => targets.clone(),
        NodeKind::Call(_) | NodeKind::CallFinally(_) => match kind.unwind_edge() {
            Some(edge) => std::iter::once(edge.normal)
                .chain(landing(edge.region))
                .collect(),
            None => SmallVec::new(),
        },
        NodeKind::Throw(throw) => throw.unwind.and_then(landing).into_iter().collect(),
        NodeKind::CleanupRet(ret) => ret.unwind.and_then(landing).into_iter().collect(),
        NodeKind::CatchRet(ret) => smallvec![ret.successor],
        NodeKind::LandingPad { region } => body
            .region(*region)
            .map(|r| r.dispatch_targets().collect())
            .unwrap_or_default(),
        _ => SmallVec::new(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub label: LabelId,
    /// Every node of the block, label node first.
    pub nodes: Vec<NodeId>,
    pub terminator: Option<NodeId>,
}

#[derive(Clone, Debug)]
pub struct Cfg {
    blocks: Vec<Block>,
    by_label: FxHashMap<LabelId, usize>,
    preds: Vec<Vec<LabelId>>,
    succs: Vec<SmallVec<[LabelId; 4]>>,
    /// Nodes linked before the first label.
    stray: Vec<NodeId>,
}

impl Cfg {
    pub fn build(body: &Body) -> Cfg {
        let mut blocks: Vec<Block> = Vec::new();
        let mut stray = Vec::new();

        for (id, node) in body.iter() {
            if let NodeKind::Label(label) = node.kind {
                blocks.push(Block {
                    label,
                    nodes: vec![id],
                    terminator: None,
                });
                continue;
            }
            match blocks.last_mut() {
                Some(block) => {
                    block.nodes.push(id);
                    if block.terminator.is_none() && node.kind.is_terminator() {
                        block.terminator = Some(id);
                    }
                }
                None => stray.push(id),
            }
        }

        let by_label: FxHashMap<LabelId, usize> = blocks
            .iter()
            .enumerate()
            .map(|(idx, block)| (block.label, idx))
            .collect();

        let succs: Vec<SmallVec<[LabelId; 4]>> = blocks
            .iter()
            .map(|block| {
                let mut seen = FxHashSet::default();
                block
                    .terminator
                    .map(|term| successor_labels(body, body.kind(term)))
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|label| seen.insert(*label))
                    .collect()
            })
            .collect();

        let mut preds: Vec<Vec<LabelId>> = vec![Vec::new(); blocks.len()];
        for (block, block_succs) in blocks.iter().zip(&succs) {
            for succ in block_succs {
                if let Some(&idx) = by_label.get(succ) {
                    preds[idx].push(block.label);
                }
            }
        }

        Cfg {
            blocks,
            by_label,
            preds,
            succs,
            stray,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, label: LabelId) -> Option<&Block> {
        self.by_label.get(&label).map(|&idx| &self.blocks[idx])
    }

    /// Label of the first block.
    pub fn entry(&self) -> Option<LabelId> {
        self.blocks.first().map(|block| block.label)
    }

    /// Distinct predecessor labels, in block order.
    pub fn predecessors(&self, label: LabelId) -> &[LabelId] {
        self.by_label
            .get(&label)
            .map_or(&[], |&idx| self.preds[idx].as_slice())
    }

    /// Distinct successor labels, in terminator order.
    pub fn successors(&self, label: LabelId) -> &[LabelId] {
        self.by_label
            .get(&label)
            .map_or(&[], |&idx| self.succs[idx].as_slice())
    }

    pub fn stray_nodes(&self) -> &[NodeId] {
        &self.stray
    }

    /// Labels reachable from the entry block.
    ///
    /// Iterative DFS; deep nesting cannot overflow the stack.
    pub fn reachable(&self) -> FxHashSet<LabelId> {
        let mut seen = FxHashSet::default();
        let mut stack: Vec<LabelId> = self.entry().into_iter().collect();
        while let Some(label) = stack.pop() {
            if !seen.insert(label) {
                continue;
            }
            stack.extend(
                self.successors(label)
                    .iter()
                    .copied()
                    .filter(|succ| !seen.contains(succ)),
            );
        }
        seen
    }
}
