//! Structural invariant checks for finished bodies.
//!
//! None of these can fire for graphs produced from well-formed input; a
//! failure means the lowering engine (or a pass after it) has a bug.
//! Callers treat any error as fatal for the compilation unit.

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use crate::cfg::{successor_labels, Cfg};
use crate::{Body, Branch, LabelId, MethodGraph, NodeId, NodeKind, RegionId, TempId};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("body has no nodes")]
    EmptyBody,
    #[error("node {node:?} precedes the first label")]
    StrayNode { node: NodeId },
    #[error("node {node:?} follows a terminator without a label")]
    UnlabeledCode { node: NodeId },
    #[error("control falls through into {label} without a terminator")]
    FallthroughIntoLabel { label: LabelId },
    #[error("block {label} has no terminator")]
    MissingTerminator { label: LabelId },
    #[error("{label} is referenced but never placed")]
    UnplacedLabel { label: LabelId },
    #[error("{label} is placed more than once")]
    DuplicateLabel { label: LabelId },
    #[error("{label} has no predecessors")]
    DanglingLabel { label: LabelId },
    #[error("phi at {label} records no incoming values")]
    EmptyPhi { label: LabelId },
    #[error("phi at {label} records a value from {from}, which is not a predecessor")]
    PhiEdgeMismatch { label: LabelId, from: LabelId },
    #[error("phi at {label} records no value for predecessor {from}")]
    PhiMissingEdge { label: LabelId, from: LabelId },
    #[error("phi {node:?} is not at the start of its block")]
    MisplacedPhi { node: NodeId },
    #[error("call {node:?} may raise inside a protected region but has no unwind label")]
    MissingUnwindEdge { node: NodeId },
    #[error("node {node:?} carries an unwind edge outside its protected region")]
    UnexpectedUnwindEdge { node: NodeId },
    #[error("normal label of call {node:?} does not directly follow it")]
    NormalLabelMismatch { node: NodeId },
    #[error("region {region:?} does not exist")]
    UnknownRegion { region: RegionId },
    #[error("region {region:?} is used but its landing block has no landing pad")]
    MissingLandingPad { region: RegionId },
    #[error("node {node:?} refers to a pad of the wrong kind")]
    PadMismatch { node: NodeId },
    #[error("indirect branch {node:?} targets differ from its phi's label addresses")]
    IndirectTargetMismatch { node: NodeId },
    #[error("{temp} is defined more than once")]
    TempRedefined { temp: TempId },
    #[error("node {node:?} writes to a literal or label address")]
    InvalidDestination { node: NodeId },
}

/// Check one body. Returns every violation found, in sequence order.
pub fn verify_body(body: &Body) -> Vec<GraphError> {
    let mut errors = Vec::new();
    if body.entry().is_none() {
        errors.push(GraphError::EmptyBody);
        return errors;
    }
    let cfg = Cfg::build(body);
    errors.extend(
        cfg.stray_nodes()
            .iter()
            .map(|&node| GraphError::StrayNode { node }),
    );

    check_block_structure(body, &mut errors);
    check_labels(body, &cfg, &mut errors);
    check_phis(body, &cfg, &mut errors);
    check_unwind_edges(body, &mut errors);
    check_pads_and_regions(body, &cfg, &mut errors);
    check_definitions(body, &mut errors);
    errors
}

/// Check the main body and every finally function of `method`.
///
/// Returns the first violation.
pub fn verify_method(method: &MethodGraph) -> Result<(), GraphError> {
    let bodies = std::iter::once(&method.body)
        .chain(method.finally_functions.iter().map(|finally| &finally.body));
    for body in bodies {
        if let Some(error) = verify_body(body).into_iter().next() {
            debug!(%error, "graph verification failed");
            return Err(error);
        }
    }
    Ok(())
}

fn check_block_structure(body: &Body, errors: &mut Vec<GraphError>) {
    let mut seen_label = false;
    let mut terminated = true;
    let mut current: Option<LabelId> = None;
    for (id, node) in body.iter() {
        if let NodeKind::Label(label) = node.kind {
            if seen_label && !terminated {
                errors.push(GraphError::FallthroughIntoLabel { label });
            }
            seen_label = true;
            terminated = false;
            current = Some(label);
            continue;
        }
        if seen_label && terminated {
            errors.push(GraphError::UnlabeledCode { node: id });
        }
        terminated = node.kind.is_terminator();
    }
    if let (Some(label), false) = (current, terminated) {
        errors.push(GraphError::MissingTerminator { label });
    }
}

fn check_labels(body: &Body, cfg: &Cfg, errors: &mut Vec<GraphError>) {
    let mut placed = FxHashSet::default();
    for block in cfg.blocks() {
        if !placed.insert(block.label) {
            errors.push(GraphError::DuplicateLabel { label: block.label });
        }
    }

    let mut referenced: Vec<LabelId> = Vec::new();
    for (_, node) in body.iter() {
        referenced.extend(successor_labels(body, &node.kind));
        if let NodeKind::Phi(phi) = &node.kind {
            referenced.extend(phi.incoming.iter().map(|(label, _)| *label));
        }
    }
    let mut reported = FxHashSet::default();
    for label in referenced {
        if !placed.contains(&label) && reported.insert(label) {
            errors.push(GraphError::UnplacedLabel { label });
        }
    }

    let entry = cfg.entry();
    for block in cfg.blocks() {
        if Some(block.label) != entry && cfg.predecessors(block.label).is_empty() {
            errors.push(GraphError::DanglingLabel { label: block.label });
        }
    }
}

fn check_phis(body: &Body, cfg: &Cfg, errors: &mut Vec<GraphError>) {
    for block in cfg.blocks() {
        let preds = cfg.predecessors(block.label);
        let mut at_start = true;
        for &id in &block.nodes[1..] {
            let NodeKind::Phi(phi) = body.kind(id) else {
                at_start = false;
                continue;
            };
            if !at_start {
                errors.push(GraphError::MisplacedPhi { node: id });
            }
            if phi.incoming.is_empty() {
                errors.push(GraphError::EmptyPhi { label: block.label });
                continue;
            }
            for (from, _) in &phi.incoming {
                if !preds.contains(from) {
                    errors.push(GraphError::PhiEdgeMismatch {
                        label: block.label,
                        from: *from,
                    });
                }
            }
            for pred in preds {
                if !phi.incoming.iter().any(|(from, _)| from == pred) {
                    errors.push(GraphError::PhiMissingEdge {
                        label: block.label,
                        from: *pred,
                    });
                }
            }
        }
    }
}

fn check_unwind_edges(body: &Body, errors: &mut Vec<GraphError>) {
    for (id, node) in body.iter() {
        let (may_raise, edge_region, normal) = match &node.kind {
            NodeKind::Call(call) => (
                !call.nounwind,
                call.unwind.map(|edge| edge.region),
                call.unwind.map(|edge| edge.normal),
            ),
            NodeKind::CallFinally(call) => (
                true,
                call.unwind.map(|edge| edge.region),
                call.unwind.map(|edge| edge.normal),
            ),
            NodeKind::Throw(throw) => (true, throw.unwind, None),
            _ => continue,
        };

        match (node.region, edge_region) {
            (Some(_), None) if may_raise => errors.push(GraphError::MissingUnwindEdge { node: id }),
            (Some(expected), Some(actual)) if expected == actual && may_raise => {}
            (_, Some(_)) => errors.push(GraphError::UnexpectedUnwindEdge { node: id }),
            _ => {}
        }
        if let Some(region) = edge_region {
            if body.region(region).is_none() {
                errors.push(GraphError::UnknownRegion { region });
            }
        }
        if let Some(normal) = normal {
            let follows = node
                .next()
                .is_some_and(|next| *body.kind(next) == NodeKind::Label(normal));
            if !follows {
                errors.push(GraphError::NormalLabelMismatch { node: id });
            }
        }
    }
}

fn check_pads_and_regions(body: &Body, cfg: &Cfg, errors: &mut Vec<GraphError>) {
    for (id, node) in body.iter() {
        let pad_ok = match &node.kind {
            NodeKind::CatchRet(ret) => matches!(body.kind(ret.pad), NodeKind::CatchPad(_)),
            NodeKind::Catch(catch) => matches!(body.kind(catch.pad), NodeKind::CatchPad(_)),
            NodeKind::CleanupRet(ret) => {
                matches!(body.kind(ret.pad), NodeKind::CleanupPad { .. })
            }
            NodeKind::CatchPad(pad) => body.region(pad.region).is_some(),
            NodeKind::CleanupPad { region } | NodeKind::LandingPad { region } => {
                body.region(*region).is_some()
            }
            _ => true,
        };
        if !pad_ok {
            errors.push(GraphError::PadMismatch { node: id });
        }
    }

    for (region_id, region) in body.regions() {
        if !region.used {
            continue;
        }
        let has_pad = cfg.block(region.landing).is_some_and(|block| {
            block.nodes.get(1).is_some_and(|&first| {
                *body.kind(first) == NodeKind::LandingPad { region: region_id }
            })
        });
        if !has_pad {
            errors.push(GraphError::MissingLandingPad { region: region_id });
        }
    }
}

fn check_definitions(body: &Body, errors: &mut Vec<GraphError>) {
    let mut defs: FxHashMap<TempId, NodeId> = FxHashMap::default();
    for (id, node) in body.iter() {
        if let Some(dst) = node.kind.dst() {
            if !dst.is_place() {
                errors.push(GraphError::InvalidDestination { node: id });
            }
            if let Some(temp) = dst.as_temp() {
                if defs.insert(temp, id).is_some() {
                    errors.push(GraphError::TempRedefined { temp });
                }
            }
        }
    }

    for (id, node) in body.iter() {
        let NodeKind::Branch(Branch::Indirect { address, targets }) = &node.kind else {
            continue;
        };
        let phi_targets: Option<FxHashSet<LabelId>> = address
            .as_temp()
            .and_then(|temp| defs.get(&temp))
            .and_then(|&def| match body.kind(def) {
                NodeKind::Phi(phi) => phi
                    .incoming
                    .iter()
                    .map(|(_, value)| value.as_label_address())
                    .collect(),
                _ => None,
            });
        let branch_targets: FxHashSet<LabelId> = targets.iter().copied().collect();
        if phi_targets.as_ref() != Some(&branch_targets) {
            errors.push(GraphError::IndirectTargetMismatch { node: id });
        }
    }
}
