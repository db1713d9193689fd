//! Node arena and fragment splicing.
//!
//! A [`Body`] owns every node of one method (or one finally function) in a
//! flat `Vec`, addressed by [`NodeId`]. The instruction sequence is a
//! doubly-linked list threaded through the `prev`/`next` fields, so
//! splicing and insertion are index reassignments and never move nodes.
//!
//! Lowering builds the sequence out of [`Fragment`]s: `(entry, exit)` pairs
//! over nodes already allocated in the arena. A fragment starts empty,
//! becomes non-empty when its first node is linked, and composes with other
//! fragments only by splicing ends together.

use tac_ir::Span;

use crate::ids::next_index;
use crate::{LabelId, Node, NodeId, NodeKind, ProtectedRegion, RegionId};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Body {
    nodes: Vec<Node>,
    /// Node each label was placed at, indexed by `LabelId`.
    labels: Vec<Option<NodeId>>,
    regions: Vec<ProtectedRegion>,
    entry: Option<NodeId>,
    exit: Option<NodeId>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Arena ───────────────────────────────────────────────────────

    /// Allocate an unlinked node outside any protected region.
    ///
    /// Allocating a `Label` node places that label.
    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.alloc_in(kind, span, None)
    }

    /// Allocate an unlinked node emitted inside `region`.
    pub fn alloc_in(&mut self, kind: NodeKind, span: Span, region: Option<RegionId>) -> NodeId {
        let id = NodeId::new(next_index(self.nodes.len(), "node arena"));
        if let NodeKind::Label(label) = kind {
            if let Some(slot) = self.labels.get_mut(label.index()) {
                debug_assert!(slot.is_none(), "label {label} placed twice");
                *slot = Some(id);
            }
        }
        self.nodes.push(Node {
            kind,
            span,
            region,
            prev: None,
            next: None,
        });
        id
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    /// Mutable access to a node's payload. Links stay untouched.
    #[inline]
    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.index()].kind
    }

    /// Move a node into another protected region. Unwind edges on the
    /// node must be retargeted to match.
    pub fn set_region(&mut self, id: NodeId, region: Option<RegionId>) {
        self.nodes[id.index()].region = region;
    }

    /// Number of allocated nodes, linked or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ── Labels ──────────────────────────────────────────────────────

    pub fn new_label(&mut self) -> LabelId {
        let label = LabelId::new(next_index(self.labels.len(), "label table"));
        self.labels.push(None);
        label
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }

    /// Node at which `label` was placed, if it was.
    pub fn label_node(&self, label: LabelId) -> Option<NodeId> {
        self.labels.get(label.index()).copied().flatten()
    }

    // ── Regions ─────────────────────────────────────────────────────

    pub fn add_region(&mut self, region: ProtectedRegion) -> RegionId {
        let id = RegionId::new(next_index(self.regions.len(), "region table"));
        self.regions.push(region);
        id
    }

    pub fn region(&self, id: RegionId) -> Option<&ProtectedRegion> {
        self.regions.get(id.index())
    }

    pub fn region_mut(&mut self, id: RegionId) -> Option<&mut ProtectedRegion> {
        self.regions.get_mut(id.index())
    }

    pub fn regions(&self) -> impl Iterator<Item = (RegionId, &ProtectedRegion)> {
        self.regions
            .iter()
            .enumerate()
            .map(|(idx, region)| (RegionId::new(next_index(idx, "region table")), region))
    }

    // ── Sequence ────────────────────────────────────────────────────

    pub fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    pub fn exit(&self) -> Option<NodeId> {
        self.exit
    }

    /// Make `fragment` the body's instruction sequence.
    pub fn set_contents(&mut self, fragment: Fragment) {
        self.entry = fragment.entry;
        self.exit = fragment.exit;
    }

    pub fn contents(&self) -> Fragment {
        Fragment {
            entry: self.entry,
            exit: self.exit,
        }
    }

    /// Link unlinked `node` directly after `anchor`.
    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) {
        debug_assert_ne!(anchor, node);
        let next = self.nodes[anchor.index()].next;
        {
            let inserted = &mut self.nodes[node.index()];
            inserted.prev = Some(anchor);
            inserted.next = next;
        }
        self.nodes[anchor.index()].next = Some(node);
        match next {
            Some(next) => self.nodes[next.index()].prev = Some(node),
            None if self.exit == Some(anchor) => self.exit = Some(node),
            None => {}
        }
    }

    /// Link unlinked `node` directly before `anchor`.
    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) {
        debug_assert_ne!(anchor, node);
        let prev = self.nodes[anchor.index()].prev;
        {
            let inserted = &mut self.nodes[node.index()];
            inserted.prev = prev;
            inserted.next = Some(anchor);
        }
        self.nodes[anchor.index()].prev = Some(node);
        match prev {
            Some(prev) => self.nodes[prev.index()].next = Some(node),
            None if self.entry == Some(anchor) => self.entry = Some(node),
            None => {}
        }
    }

    /// Walk the linked sequence from entry to exit.
    pub fn iter(&self) -> BodyIter<'_> {
        BodyIter {
            body: self,
            cursor: self.entry,
        }
    }

    /// Ids of the linked sequence, collected so the body can be mutated
    /// while walking it.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

pub struct BodyIter<'a> {
    body: &'a Body,
    cursor: Option<NodeId>,
}

impl<'a> Iterator for BodyIter<'a> {
    type Item = (NodeId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.body.node(id);
        self.cursor = node.next;
        Some((id, node))
    }
}

/// Partially built run of linked nodes with one entry and one exit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    entry: Option<NodeId>,
    exit: Option<NodeId>,
}

impl Fragment {
    pub const EMPTY: Fragment = Fragment {
        entry: None,
        exit: None,
    };

    pub fn single(node: NodeId) -> Self {
        Fragment {
            entry: Some(node),
            exit: Some(node),
        }
    }

    #[inline]
    pub fn entry(&self) -> Option<NodeId> {
        self.entry
    }

    #[inline]
    pub fn exit(&self) -> Option<NodeId> {
        self.exit
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    /// Whether the fragment already ends its block.
    pub fn is_terminated(&self, body: &Body) -> bool {
        self.exit
            .is_some_and(|exit| body.kind(exit).is_terminator())
    }

    /// Append one unlinked node.
    pub fn link_to_end(&mut self, body: &mut Body, node: NodeId) {
        self.splice_to_end(body, Fragment::single(node));
    }

    /// Prepend one unlinked node.
    pub fn link_to_start(&mut self, body: &mut Body, node: NodeId) {
        self.splice_to_start(body, Fragment::single(node));
    }

    /// Append `other`. Splicing onto an empty fragment adopts `other`.
    pub fn splice_to_end(&mut self, body: &mut Body, other: Fragment) {
        let (Some(other_entry), Some(other_exit)) = (other.entry, other.exit) else {
            return;
        };
        match self.exit {
            None => *self = other,
            Some(exit) => {
                body.nodes[exit.index()].next = Some(other_entry);
                body.nodes[other_entry.index()].prev = Some(exit);
                self.exit = Some(other_exit);
            }
        }
    }

    /// Prepend `other`. Splicing onto an empty fragment adopts `other`.
    pub fn splice_to_start(&mut self, body: &mut Body, other: Fragment) {
        let (Some(other_entry), Some(other_exit)) = (other.entry, other.exit) else {
            return;
        };
        match self.entry {
            None => *self = other,
            Some(entry) => {
                body.nodes[other_exit.index()].next = Some(entry);
                body.nodes[entry.index()].prev = Some(other_exit);
                self.entry = Some(other_entry);
            }
        }
    }
}
