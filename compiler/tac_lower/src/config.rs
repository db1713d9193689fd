//! Lowering configuration.

/// Knobs for one compilation unit.
///
/// Tracing output is configured separately, from the environment
/// (`RUST_LOG`, `TAC_LOG_TREE`); see [`init_tracing`](crate::init_tracing).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LowerConfig {
    /// Run reference-count insertion after lowering each method.
    pub insert_rc: bool,
    /// Run the graph verifier on every finished method.
    pub verify: bool,
    /// Maximum number of reported errors before the unit stops (0 = unlimited).
    pub error_limit: usize,
    /// Count lowering warnings as errors.
    pub warnings_as_errors: bool,
}

impl Default for LowerConfig {
    fn default() -> Self {
        LowerConfig {
            insert_rc: true,
            verify: true,
            error_limit: 0,
            warnings_as_errors: false,
        }
    }
}

impl LowerConfig {
    /// Plain lowering: no RC insertion, verification on.
    pub fn without_rc() -> Self {
        LowerConfig {
            insert_rc: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_error_limit(mut self, limit: usize) -> Self {
        self.error_limit = limit;
        self
    }

    #[must_use]
    pub fn with_warnings_as_errors(mut self, enabled: bool) -> Self {
        self.warnings_as_errors = enabled;
        self
    }
}
