//! Lowering failures and the per-unit error reporter.

use tac_graph::GraphError;
use tac_ir::Span;
use thiserror::Error;
use tracing::{error, warn};

use crate::LowerConfig;

/// Why lowering of one method stopped.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LowerError {
    /// A recognised construct this layer refuses to lower.
    #[error("{what} is not supported")]
    Unsupported { what: &'static str, span: Span },
    /// The checker handed over a node it had already rejected.
    #[error("input contains a node rejected by the checker")]
    Upstream { span: Span },
    /// Invariant breach inside the lowering engine.
    #[error("internal lowering error: {message}")]
    Internal { message: String, span: Span },
    /// The finished graph failed verification.
    #[error("lowered graph is malformed: {0}")]
    InvalidGraph(#[from] GraphError),
}

impl LowerError {
    pub(crate) fn internal(message: impl Into<String>, span: Span) -> Self {
        LowerError::Internal {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            LowerError::Unsupported { span, .. }
            | LowerError::Upstream { span }
            | LowerError::Internal { span, .. } => Some(*span),
            LowerError::InvalidGraph(_) => None,
        }
    }

    /// Engine bugs abort the whole compilation unit; everything else only
    /// the current method.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LowerError::Internal { .. } | LowerError::InvalidGraph(_)
        )
    }
}

/// Something odd but recoverable noticed while lowering.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LowerWarning {
    /// Statements after a terminating statement, or catch handlers of a
    /// `try` whose body cannot raise.
    #[error("unreachable code was not lowered")]
    UnreachableCode { span: Span },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Problem {
    Error(LowerError),
    Warning(LowerWarning),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    /// Display name of the method the problem was found in.
    pub method: String,
    pub severity: Severity,
    pub problem: Problem,
}

/// Accumulates problems for a compilation unit so the driver can move on
/// to the next method instead of stopping at the first failure.
#[derive(Debug)]
pub struct ErrorReporter {
    reports: Vec<Report>,
    error_count: usize,
    has_fatal: bool,
    error_limit: usize,
    warnings_as_errors: bool,
}

impl ErrorReporter {
    pub fn new(config: &LowerConfig) -> Self {
        ErrorReporter {
            reports: Vec::new(),
            error_count: 0,
            has_fatal: false,
            error_limit: config.error_limit,
            warnings_as_errors: config.warnings_as_errors,
        }
    }

    /// Record a failed method. Returns `false` if the error limit was
    /// already reached and the report was dropped.
    pub fn report(&mut self, method: &str, problem: LowerError) -> bool {
        if self.limit_reached() {
            return false;
        }
        error!(method, error = %problem, span = ?problem.span(), "method lowering failed");
        self.has_fatal |= problem.is_fatal();
        self.error_count += 1;
        self.reports.push(Report {
            method: method.to_owned(),
            severity: Severity::Error,
            problem: Problem::Error(problem),
        });
        true
    }

    pub fn warn(&mut self, method: &str, warning: LowerWarning) {
        let severity = if self.warnings_as_errors {
            if self.limit_reached() {
                return;
            }
            self.error_count += 1;
            Severity::Error
        } else {
            Severity::Warning
        };
        warn!(method, warning = %warning, "lowering warning");
        self.reports.push(Report {
            method: method.to_owned(),
            severity,
            problem: Problem::Warning(warning),
        });
    }

    pub fn limit_reached(&self) -> bool {
        self.error_limit > 0 && self.error_count >= self.error_limit
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// An engine bug or malformed graph was reported; the unit has failed.
    pub fn has_fatal(&self) -> bool {
        self.has_fatal
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }
}
