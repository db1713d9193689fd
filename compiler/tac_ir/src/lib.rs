//! Shared IR vocabulary for the TAC compiler layers.
//!
//! This crate holds everything the lowering engine reads but does not own:
//! interned identifiers, source spans, operator enums, and the typed syntax
//! tree handed over by the (external) parser and type checker.
//!
//! # Input boundary
//!
//! Every expression in a [`SyntaxArena`] already carries a resolved type
//! handle and every name expression carries a resolved [`Binding`]. Nothing
//! downstream performs name resolution or type inference.

mod interner;
mod name;
pub mod ops;
mod span;
pub mod syntax;
mod type_id;

pub use interner::{InternError, StringInterner};
pub use name::Name;
pub use ops::{AssignOp, BinaryOp, LogicalOp, UnaryOp};
pub use span::Span;
pub use syntax::{
    Binding, CatchClause, ConversionKind, Expr, ExprId, ExprKind, Literal, LocalDecl, LocalId,
    MethodDecl, Stmt, StmtId, StmtKind, SyntaxArena,
};
pub use type_id::TypeId;
