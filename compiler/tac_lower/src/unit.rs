//! Compilation-unit driver.

use tac_graph::{verify_method, MethodGraph};
use tac_ir::{MethodDecl, StringInterner, SyntaxArena};
use tac_types::Pool;
use tracing::{debug, info_span};

use crate::error::{ErrorReporter, LowerError};
use crate::lower::lower_method;
use crate::rc_insert::insert_rc;
use crate::temps::TempAllocator;
use crate::LowerConfig;

/// Lowers the methods of one compilation unit.
///
/// Owns the temporary counter, so temporaries are numbered across the
/// whole unit and never reused, and the reporter that collects per-method
/// failures.
pub struct CompilationUnit<'a> {
    arena: &'a SyntaxArena,
    pool: &'a Pool,
    interner: &'a StringInterner,
    config: LowerConfig,
    temps: TempAllocator,
    reporter: ErrorReporter,
}

impl<'a> CompilationUnit<'a> {
    pub fn new(
        arena: &'a SyntaxArena,
        pool: &'a Pool,
        interner: &'a StringInterner,
        config: LowerConfig,
    ) -> Self {
        CompilationUnit {
            arena,
            pool,
            interner,
            config,
            temps: TempAllocator::new(),
            reporter: ErrorReporter::new(&config),
        }
    }

    /// Lower, RC-annotate and verify one method.
    ///
    /// Warnings go to the reporter; the error is returned to the caller
    /// and not reported.
    pub fn lower_method(&mut self, decl: &MethodDecl) -> Result<MethodGraph, LowerError> {
        let name = self.interner.lookup(decl.name);
        let _span = info_span!("lower_method", method = name).entered();

        let lowered = lower_method(
            decl,
            self.arena,
            self.pool,
            self.interner,
            &mut self.temps,
            &self.config,
        )?;
        for warning in lowered.warnings {
            self.reporter.warn(name, warning);
        }

        let mut graph = lowered.graph;
        if self.config.insert_rc {
            insert_rc(&mut graph, self.pool);
        }
        if self.config.verify {
            verify_method(&graph)?;
        }
        debug!(temps = self.temps.issued(), "method done");
        Ok(graph)
    }

    /// Lower every method, reporting failures and moving on. Stops early
    /// after a fatal error or once the error limit is reached.
    pub fn lower_all(&mut self, decls: &[MethodDecl]) -> Vec<MethodGraph> {
        let mut graphs = Vec::with_capacity(decls.len());
        for decl in decls {
            match self.lower_method(decl) {
                Ok(graph) => graphs.push(graph),
                Err(error) => {
                    let fatal = error.is_fatal();
                    let recorded = self.reporter.report(self.interner.lookup(decl.name), error);
                    if fatal || !recorded || self.reporter.limit_reached() {
                        debug!(fatal, "stopping compilation unit");
                        break;
                    }
                }
            }
        }
        graphs
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    pub fn temps(&self) -> &TempAllocator {
        &self.temps
    }

    pub fn into_reporter(self) -> ErrorReporter {
        self.reporter
    }
}
