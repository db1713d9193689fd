//! Type layer boundary for TAC lowering.
//!
//! The full type checker lives upstream. This crate only answers the
//! questions lowering and RC insertion ask about an already-resolved type:
//!
//! - **Structure** ([`Pool`]): is it a class, an array, a sequence? What is
//!   an array's element type? Is one class a subtype of another (used to
//!   order and test exception dispatch)?
//! - **Ownership** ([`RefClass`]): is a slot of this type
//!   [`Owned`](RefClass::Owned) (its stores are reference counted),
//!   [`NonOwning`](RefClass::NonOwning) (weak or unmanaged reference) or
//!   [`Scalar`](RefClass::Scalar) (no heap pointer at all)?
//!
//! Type handles are [`TypeId`]s from `tac_ir`, re-exported here.

mod ownership;
mod pool;

pub use ownership::{OwnershipClassification, RefClass};
pub use pool::{Pool, TypeKind};
pub use tac_ir::TypeId;
