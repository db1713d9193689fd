//! Three-address code graph for lowered methods.
//!
//! This crate provides:
//!
//! - **Node graph** ([`Body`], [`Node`], [`NodeKind`]): an arena of nodes
//!   linked into one instruction sequence. Labels start blocks; terminators
//!   end them. Lowering builds the sequence out of [`Fragment`]s, which
//!   splice in O(1).
//!
//! - **Exception sub-model** ([`ProtectedRegion`], [`RegionKind`]): a
//!   per-body region table. Calls that may raise carry an
//!   [`UnwindEdge`](node::UnwindEdge) naming a region, and the landing
//!   label is always resolved through the table.
//!
//! - **Consumer contract** ([`NodeVisitor`]): one required method per node
//!   kind, dispatched by an exhaustive match.
//!
//! - **Analysis** ([`cfg::Cfg`], [`verify`]): block partition, predecessor
//!   and successor sets, and the well-formedness checks every finished
//!   graph must pass.
//!
//! - **Text form** ([`text`]): a line-per-node dump and a parser that reads
//!   its control-flow topology back.
//!
//! # Crate Dependencies
//!
//! `tac_graph` depends on `tac_ir` (names, operators, literals) and
//! `tac_types` (type display). It knows nothing about the syntax tree;
//! `tac_lower` builds graphs, backends consume them.

mod body;
pub mod cfg;
mod eh;
mod ids;
mod method;
pub mod node;
mod operand;
pub mod text;
pub mod verify;
mod visitor;

#[cfg(test)]
mod test_helpers;

pub use body::{Body, BodyIter, Fragment};
pub use cfg::Cfg;
pub use eh::{CatchTarget, ProtectedRegion, RegionKind};
pub use ids::{next_index, FinallyId, LabelId, NodeId, RegionId, TempId};
pub use method::{finally_function_name, FinallyFunction, MethodGraph};
pub use node::{Branch, Node, NodeKind, RcFlags};
pub use operand::{Operand, OperandKind, Reference};
pub use verify::{verify_body, verify_method, GraphError};
pub use visitor::{dispatch, NodeVisitor};
