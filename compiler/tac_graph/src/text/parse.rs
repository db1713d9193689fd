//! Re-reads the control-flow topology of a rendered method.
//!
//! Only labels and edge markers are parsed: `goto`, conditional and
//! indirect branches, `to label .. unwind label ..` on calls, landing pad
//! dispatch lists, `catchret to`, and `unwind label` on `throw` and
//! `cleanupret`. Everything else on a line is ignored.

use std::collections::{BTreeMap, BTreeSet};

use tac_ir::StringInterner;
use thiserror::Error;

use crate::{Cfg, MethodGraph};

/// Predecessor sets per label, per function section.
///
/// Function sections are keyed by the name in their header line: the
/// method name for the main body, `_finallyN_..` for finally functions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    pub functions: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl Topology {
    /// Topology computed directly from the graph.
    pub fn of_method(method: &MethodGraph, interner: &StringInterner) -> Topology {
        let mut functions = BTreeMap::new();
        for (name, body) in method.bodies(interner.lookup(method.name)) {
            let cfg = Cfg::build(body);
            let mut labels: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            for block in cfg.blocks() {
                labels.entry(block.label.to_string()).or_default();
                for succ in cfg.successors(block.label) {
                    labels
                        .entry(succ.to_string())
                        .or_default()
                        .insert(block.label.to_string());
                }
            }
            functions.insert(name.to_owned(), labels);
        }
        Topology { functions }
    }

    pub fn predecessors(&self, function: &str, label: &str) -> Option<&BTreeSet<String>> {
        self.functions.get(function)?.get(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("line {line}: function `{name}` opened inside another function")]
    NestedFunction { line: usize, name: String },
    #[error("line {line}: `{text}` outside of any function")]
    OutsideFunction { line: usize, text: String },
    #[error("line {line}: malformed edge in `{text}`")]
    MalformedEdge { line: usize, text: String },
    #[error("function `{name}` is never closed")]
    UnclosedFunction { name: String },
}

struct Section {
    name: String,
    labels: BTreeMap<String, BTreeSet<String>>,
    current: Option<String>,
}

/// Parse the output of [`render_method`](crate::text::render_method).
pub fn parse_topology(text: &str) -> Result<Topology, TopologyError> {
    let mut topology = Topology::default();
    let mut section: Option<Section> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }

        if let Some(name) = header_name(raw) {
            if let Some(open) = &section {
                return Err(TopologyError::NestedFunction {
                    line,
                    name: open.name.clone(),
                });
            }
            section = Some(Section {
                name: name.to_owned(),
                labels: BTreeMap::new(),
                current: None,
            });
            continue;
        }

        let Some(open) = section.as_mut() else {
            return Err(TopologyError::OutsideFunction {
                line,
                text: trimmed.to_owned(),
            });
        };

        if raw == "}" {
            if let Some(done) = section.take() {
                topology.functions.insert(done.name, done.labels);
            }
            continue;
        }

        if let Some(label) = trimmed.strip_suffix(':').filter(|l| is_label(l)) {
            open.labels.entry(label.to_owned()).or_default();
            open.current = Some(label.to_owned());
            continue;
        }

        let targets = edge_targets(trimmed).ok_or_else(|| TopologyError::MalformedEdge {
            line,
            text: trimmed.to_owned(),
        })?;
        if let Some(from) = &open.current {
            for target in targets {
                open.labels
                    .entry(target.to_owned())
                    .or_default()
                    .insert(from.clone());
            }
        }
    }

    match section {
        Some(open) => Err(TopologyError::UnclosedFunction { name: open.name }),
        None => Ok(topology),
    }
}

/// Name from a `method Name(..) => (..) {` or `finally name() {` header.
fn header_name(raw: &str) -> Option<&str> {
    if !raw.ends_with('{') {
        return None;
    }
    let rest = raw
        .strip_prefix("method ")
        .or_else(|| raw.strip_prefix("finally "))?;
    rest.split('(').next()
}

fn is_label(text: &str) -> bool {
    text.strip_prefix('L')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Labels a line transfers control to. `None` if an edge marker is present
/// but a target is not a label.
fn edge_targets(line: &str) -> Option<Vec<&str>> {
    let line = line.trim_end_matches(';');
    let mut targets = Vec::new();

    if line.starts_with("goto phi ") || line.starts_with("landingpad") {
        for part in line.split("label ").skip(1) {
            targets.push(part.split(',').next().unwrap_or_default().trim());
        }
    } else if let Some(rest) = line.strip_prefix("goto ") {
        match rest.rsplit_once(" ? ") {
            Some((_, arms)) => targets.extend(arms.split(',').map(str::trim)),
            None => targets.push(rest.trim()),
        }
    } else if let Some(rest) = line.strip_prefix("catchret to ") {
        targets.push(rest.trim());
    } else if let Some((_, rest)) = line.rsplit_once(" to label ") {
        let (normal, unwind) = rest.split_once(" unwind label ")?;
        targets.push(normal.trim());
        targets.push(unwind.trim());
    } else if line.starts_with("throw ") || line.starts_with("cleanupret") {
        if let Some((_, rest)) = line.rsplit_once("unwind label ") {
            targets.push(rest.trim());
        }
    }

    targets.iter().all(|t| is_label(t)).then_some(targets)
}
