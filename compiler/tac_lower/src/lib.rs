//! Lowering of the typed syntax tree into TAC graphs.
//!
//! This crate provides:
//!
//! - **Lowering** ([`CompilationUnit`]): expressions, statements and
//!   `try`/`catch`/`finally` into one [`MethodGraph`](tac_graph::MethodGraph)
//!   per method, finally blocks into out-of-line finally functions.
//! - **Reference counting**: a post-pass that adds `_IncrementRef` and
//!   `_DecrementRef` nodes around stores, fresh values and method exits.
//! - **Diagnostics** ([`ErrorReporter`]): per-method failures accumulate
//!   for the unit instead of aborting it.
//!
//! # Pipeline
//!
//! ```text
//! MethodDecl ──lower──▶ MethodGraph ──insert_rc──▶ ──verify──▶ consumer
//! ```
//!
//! Both later stages are switched by [`LowerConfig`].
//!
//! # Tracing
//!
//! Call [`init_tracing`] once at startup, then set `RUST_LOG`, e.g.
//! `RUST_LOG=tac_lower=debug`. `TAC_LOG_TREE=1` switches to an indented
//! span tree.

mod config;
mod error;
mod lower;
mod rc_insert;
mod temps;
mod unit;

#[cfg(test)]
mod test_helpers;

use std::sync::Once;

pub use config::LowerConfig;
pub use error::{ErrorReporter, LowerError, LowerWarning, Problem, Report, Severity};
pub use temps::TempAllocator;
pub use unit::CompilationUnit;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Does nothing unless `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        if std::env::var("TAC_LOG_TREE").is_ok() {
            tracing_subscriber::registry()
                .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true))
                .with(filter)
                .init();
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
