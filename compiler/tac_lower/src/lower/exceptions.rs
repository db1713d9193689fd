//! `try`/`catch`/`finally`, `throw` and `return`.
//!
//! A `try` with catch clauses opens a catch region over its body; the
//! landing pad dispatches to one catch pad per clause. A `finally` block is
//! lowered once, out of line, into a finally function. It is called from
//! a cleanup pad when an exception leaves the protected code, and from a
//! shared finally-exit block on every normal exit. Normal exits record
//! their continuation as a label address; the finally-exit block merges
//! them with a phi and resumes through an indirect branch.
//!
//! ```text
//!   body ... goto Lfx            Lfx:  %a = phi [ &Ldone, Lb ], [ &Lr, Lc ]
//!   catch ... catchret to Lfx          _finally0_m();
//!                                      goto phi %a label Ldone, label Lr;
//! ```

use smallvec::SmallVec;
use tac_graph::node::{Catch, CatchPad, CatchRet, CleanupRet, Phi, Throw};
use tac_graph::{
    finally_function_name, next_index, Body, Branch, CatchTarget, FinallyFunction, FinallyId,
    Fragment, LabelId, NodeId, NodeKind, Operand, ProtectedRegion, RegionId, RegionKind,
};
use tac_ir::{CatchClause, ExprId, LocalDecl, LocalId, Span, StmtId, TypeId};
use tracing::debug;

use super::{LowerResult, Lowered, Lowerer};
use crate::error::{LowerError, LowerWarning};

/// Handler a `return` has to leave on its way out of the method.
pub(crate) enum ExitScope {
    /// Inside a catch handler: leave through its pad.
    Catch { pad: NodeId },
    /// Inside code protected by a `finally`.
    Finally(FinallyExit),
}

/// Normal exits collected for one finally-exit block.
pub(crate) struct FinallyExit {
    label: LabelId,
    /// `(predecessor, continuation)` per branch into the exit block.
    edges: Vec<(LabelId, LabelId)>,
    /// Continuations that carry a `return` further out.
    pending_returns: Vec<LabelId>,
}

impl Lowerer<'_> {
    // ── throw / return ──────────────────────────────────────────────

    pub(crate) fn lower_throw(&mut self, value: ExprId, span: Span) -> LowerResult<Fragment> {
        let Lowered { mut frag, value } = self.lower_expr(value)?;
        let unwind = self.region;
        if let Some(region) = unwind {
            self.mark_used(region);
        }
        self.emit(&mut frag, NodeKind::Throw(Throw { value, unwind }), span);
        Ok(frag)
    }

    pub(crate) fn lower_return(
        &mut self,
        value: Option<ExprId>,
        span: Span,
    ) -> LowerResult<Fragment> {
        if self.in_finally {
            return Err(LowerError::Unsupported {
                what: "return inside a finally block",
                span,
            });
        }
        let mut frag = Fragment::EMPTY;
        let value = match value {
            Some(value) => {
                let value = self.lower_into(&mut frag, value)?;
                (value.ty != TypeId::UNIT).then_some(value)
            }
            None => None,
        };

        if self.exits.is_empty() {
            self.emit(&mut frag, NodeKind::Return(value), span);
            return Ok(frag);
        }
        if let Some(value) = value {
            let slot = self.return_slot();
            self.emit_local_store(&mut frag, slot, value, span);
        }
        self.route_return(&mut frag, span)?;
        Ok(frag)
    }

    /// Synthetic local holding the result while finally blocks run.
    fn return_slot(&mut self) -> LocalId {
        if let Some(slot) = self.return_slot {
            return slot;
        }
        let slot = LocalId::new(next_index(self.locals.len(), "local table"));
        self.locals.push(LocalDecl {
            name: self.interner.intern("$return"),
            ty: self.decl.return_type,
            is_param: false,
        });
        self.return_slot = Some(slot);
        slot
    }

    /// Leave the active exit scopes, innermost first. Stops at the first
    /// finally, whose exit block continues the walk.
    fn route_return(&mut self, frag: &mut Fragment, span: Span) -> LowerResult<()> {
        for idx in (0..self.exits.len()).rev() {
            match &self.exits[idx] {
                ExitScope::Catch { pad } => {
                    let pad = *pad;
                    let next = self.body.new_label();
                    self.emit(
                        frag,
                        NodeKind::CatchRet(CatchRet {
                            pad,
                            successor: next,
                        }),
                        span,
                    );
                    self.place_label(frag, next, span);
                }
                ExitScope::Finally(_) => {
                    let pred = self.current_label(span)?;
                    let cont = self.body.new_label();
                    let ExitScope::Finally(exit) = &mut self.exits[idx] else {
                        return Err(LowerError::internal("exit scope changed kind", span));
                    };
                    exit.edges.push((pred, cont));
                    exit.pending_returns.push(cont);
                    let target = exit.label;
                    self.goto(frag, target, span);
                    return Ok(());
                }
            }
        }
        let target = *self.return_block.get_or_insert_with(|| self.body.new_label());
        self.goto(frag, target, span);
        Ok(())
    }

    /// Shared `return` block for returns routed through handlers.
    pub(crate) fn close_return_block(&mut self, frag: &mut Fragment) {
        let Some(label) = self.return_block else {
            return;
        };
        let span = self.decl.span;
        self.place_label(frag, label, span);
        let value = self
            .return_slot
            .map(|slot| Operand::local(slot, self.decl.return_type));
        self.emit(frag, NodeKind::Return(value), span);
    }

    // ── try ─────────────────────────────────────────────────────────

    pub(crate) fn lower_try(
        &mut self,
        body: StmtId,
        catches: &[CatchClause],
        finally: Option<StmtId>,
        span: Span,
    ) -> LowerResult<Fragment> {
        match finally {
            Some(finally) => self.lower_try_finally(body, catches, finally, span),
            None if catches.is_empty() => self.lower_stmt(body),
            None => {
                let done = self.body.new_label();
                let mut frag = Fragment::EMPTY;
                let mut reached = false;
                let outer = self.region;
                let region = self.open_catch_region(catches, outer);

                self.region = Some(region);
                let code = self.lower_stmt(body);
                self.region = outer;
                frag.splice_to_end(&mut self.body, code?);
                if !frag.is_terminated(&self.body) {
                    self.goto(&mut frag, done, span);
                    reached = true;
                }

                if self.region_used(region) {
                    reached |= self.lower_handlers(&mut frag, region, catches, done, None, span)?;
                } else {
                    self.skip_handlers(catches);
                }
                if reached {
                    self.place_label(&mut frag, done, span);
                }
                Ok(frag)
            }
        }
    }

    fn open_catch_region(&mut self, catches: &[CatchClause], parent: Option<RegionId>) -> RegionId {
        let clauses = catches
            .iter()
            .map(|clause| CatchTarget {
                ty: clause.ty,
                label: self.body.new_label(),
            })
            .collect();
        let landing = self.body.new_label();
        self.body.add_region(ProtectedRegion::new(
            RegionKind::Catch { clauses },
            landing,
            parent,
        ))
    }

    /// Landing pad and catch pads of a used catch region, emitted under the
    /// enclosing region. Falling out of a handler leaves through `catchret`
    /// to `exit`, or, with `finally_done` set, to the innermost finally exit
    /// with `finally_done` recorded as the continuation.
    /// Returns whether any handler reaches `exit`.
    fn lower_handlers(
        &mut self,
        frag: &mut Fragment,
        region: RegionId,
        catches: &[CatchClause],
        exit: LabelId,
        finally_done: Option<LabelId>,
        span: Span,
    ) -> LowerResult<bool> {
        let Some(protected) = self.body.region(region) else {
            return Err(LowerError::internal("catch region vanished", span));
        };
        let landing = protected.landing;
        let parent = protected.parent;
        let targets: Vec<CatchTarget> = match &protected.kind {
            RegionKind::Catch { clauses } => clauses.clone(),
            RegionKind::Cleanup { .. } | RegionKind::Scope | RegionKind::Release => Vec::new(),
        };

        let resume = match parent.and_then(|p| self.region_landing(p).map(|l| (p, l))) {
            Some((parent, parent_landing)) => {
                self.mark_used(parent);
                self.set_fallback(region, parent_landing);
                None
            }
            None => {
                let resume = self.body.new_label();
                self.set_fallback(region, resume);
                Some(resume)
            }
        };
        self.place_label(frag, landing, span);
        self.emit(frag, NodeKind::LandingPad { region }, span);

        let mut reached = false;
        for (clause, target) in catches.iter().zip(targets) {
            self.place_label(frag, target.label, span);
            let pad = self.emit(
                frag,
                NodeKind::CatchPad(CatchPad {
                    region,
                    ty: clause.ty,
                }),
                clause.span,
            );
            let exception = self.fresh(clause.ty);
            self.emit(
                frag,
                NodeKind::Catch(Catch {
                    dst: exception,
                    pad,
                }),
                clause.span,
            );
            if let Some(binding) = clause.binding {
                self.emit_local_store(frag, binding, exception, clause.span);
            }

            self.exits.push(ExitScope::Catch { pad });
            let handler = self.lower_stmt(clause.body);
            self.exits.pop();
            frag.splice_to_end(&mut self.body, handler?);

            if frag.is_terminated(&self.body) {
                continue;
            }
            let successor = match finally_done {
                Some(done) => self.record_finally_edge(done, span)?,
                None => {
                    reached = true;
                    exit
                }
            };
            self.emit(frag, NodeKind::CatchRet(CatchRet { pad, successor }), span);
        }

        if let Some(resume) = resume {
            self.place_label(frag, resume, span);
            self.emit(frag, NodeKind::Resume, span);
        }
        Ok(reached)
    }

    /// Record an edge from the current block into the innermost finally
    /// exit, continuing at `cont`. Returns the exit label.
    fn record_finally_edge(&mut self, cont: LabelId, span: Span) -> LowerResult<LabelId> {
        let pred = self.current_label(span)?;
        let Some(ExitScope::Finally(exit)) = self.exits.last_mut() else {
            return Err(LowerError::internal("finally exit scope missing", span));
        };
        exit.edges.push((pred, cont));
        Ok(exit.label)
    }

    fn lower_try_finally(
        &mut self,
        body: StmtId,
        catches: &[CatchClause],
        finally: StmtId,
        span: Span,
    ) -> LowerResult<Fragment> {
        let finally_id = self.lower_finally_function(finally, span)?;
        let outer = self.region;
        let cleanup_landing = self.body.new_label();
        let cleanup = self.body.add_region(ProtectedRegion::new(
            RegionKind::Cleanup {
                finally: finally_id,
            },
            cleanup_landing,
            outer,
        ));
        let catch_region =
            (!catches.is_empty()).then(|| self.open_catch_region(catches, Some(cleanup)));

        let exit_label = self.body.new_label();
        let done = self.body.new_label();
        self.exits.push(ExitScope::Finally(FinallyExit {
            label: exit_label,
            edges: Vec::new(),
            pending_returns: Vec::new(),
        }));

        let mut frag = Fragment::EMPTY;
        let protected =
            self.lower_protected(&mut frag, body, catches, catch_region, cleanup, done, span);
        self.region = outer;
        let Some(ExitScope::Finally(exit)) = self.exits.pop() else {
            return Err(LowerError::internal("finally exit scope missing", span));
        };
        protected?;

        if self.region_used(cleanup) {
            let cleanup_label = self.body.new_label();
            self.set_fallback(cleanup, cleanup_label);
            self.place_label(&mut frag, cleanup_landing, span);
            self.emit(&mut frag, NodeKind::LandingPad { region: cleanup }, span);
            self.place_label(&mut frag, cleanup_label, span);
            let pad = self.emit(&mut frag, NodeKind::CleanupPad { region: cleanup }, span);
            self.emit_call_finally(&mut frag, finally_id, span);
            if let Some(outer) = outer {
                self.mark_used(outer);
            }
            self.emit(
                &mut frag,
                NodeKind::CleanupRet(CleanupRet { pad, unwind: outer }),
                span,
            );
        }

        if !exit.edges.is_empty() {
            self.lower_finally_exit(&mut frag, exit, finally_id, done, span)?;
        }
        Ok(frag)
    }

    /// Body and catch handlers of a `try` with a finally. Every normal exit
    /// branches to the finally exit on top of the exit stack.
    #[expect(clippy::too_many_arguments, reason = "region bookkeeping for one try")]
    fn lower_protected(
        &mut self,
        frag: &mut Fragment,
        body: StmtId,
        catches: &[CatchClause],
        catch_region: Option<RegionId>,
        cleanup: RegionId,
        done: LabelId,
        span: Span,
    ) -> LowerResult<()> {
        self.region = Some(catch_region.unwrap_or(cleanup));
        let code = self.lower_stmt(body)?;
        frag.splice_to_end(&mut self.body, code);
        if !frag.is_terminated(&self.body) {
            let target = self.record_finally_edge(done, span)?;
            self.goto(frag, target, span);
        }

        self.region = Some(cleanup);
        match catch_region {
            Some(region) if self.region_used(region) => {
                self.lower_handlers(frag, region, catches, done, Some(done), span)?;
            }
            Some(_) => self.skip_handlers(catches),
            None => {}
        }
        Ok(())
    }

    /// Handlers of a region nothing unwinds into are not lowered; whatever
    /// they contain is reported as unreachable.
    fn skip_handlers(&mut self, catches: &[CatchClause]) {
        let Some(span) = catches.iter().map(|clause| clause.span).reduce(Span::merge) else {
            return;
        };
        debug!(handlers = catches.len(), "catch handlers are unreachable");
        self.warnings.push(LowerWarning::UnreachableCode { span });
    }

    /// Merge every normal exit, run the finally function, and branch to the
    /// recorded continuation.
    fn lower_finally_exit(
        &mut self,
        frag: &mut Fragment,
        exit: FinallyExit,
        finally: FinallyId,
        done: LabelId,
        span: Span,
    ) -> LowerResult<()> {
        self.place_label(frag, exit.label, span);
        let address = self.fresh(TypeId::ADDRESS);
        let incoming = exit
            .edges
            .iter()
            .map(|&(pred, cont)| (pred, Operand::label_address(cont)))
            .collect();
        self.emit(
            frag,
            NodeKind::Phi(Phi {
                dst: address,
                incoming,
            }),
            span,
        );
        self.emit_call_finally(frag, finally, span);

        let mut targets: SmallVec<[LabelId; 4]> = SmallVec::new();
        for &(_, cont) in &exit.edges {
            if !targets.contains(&cont) {
                targets.push(cont);
            }
        }
        let reaches_done = targets.contains(&done);
        self.emit(
            frag,
            NodeKind::Branch(Branch::Indirect { address, targets }),
            span,
        );

        for cont in exit.pending_returns {
            self.place_label(frag, cont, span);
            self.route_return(frag, span)?;
        }
        if reaches_done {
            self.place_label(frag, done, span);
        }
        Ok(())
    }

    /// Lower `finally` into its own body. The function gets a table slot
    /// before its body is lowered, so nested finally blocks number after it.
    fn lower_finally_function(&mut self, finally: StmtId, span: Span) -> LowerResult<FinallyId> {
        let index = self.finally_functions.len();
        let id = FinallyId::new(next_index(index, "finally table"));
        let name = finally_function_name(id.raw(), self.interner.lookup(self.decl.mangled));
        debug!(%name, "lowering finally function");
        self.finally_functions.push(FinallyFunction {
            id,
            name,
            body: Body::new(),
        });

        let saved_body = std::mem::take(&mut self.body);
        let saved_label = self.current_label.take();
        let saved_region = self.region.take();
        let saved_exits = std::mem::take(&mut self.exits);
        let saved_in_finally = std::mem::replace(&mut self.in_finally, true);

        let lowered = self.lower_finally_body(finally, span);

        let mut finally_body = std::mem::replace(&mut self.body, saved_body);
        self.current_label = saved_label;
        self.region = saved_region;
        self.exits = saved_exits;
        self.in_finally = saved_in_finally;

        finally_body.set_contents(lowered?);
        if let Some(slot) = self.finally_functions.get_mut(index) {
            slot.body = finally_body;
        }
        Ok(id)
    }

    fn lower_finally_body(&mut self, finally: StmtId, span: Span) -> LowerResult<Fragment> {
        let mut frag = Fragment::EMPTY;
        let entry = self.body.new_label();
        self.place_label(&mut frag, entry, span);
        let code = self.lower_stmt(finally)?;
        frag.splice_to_end(&mut self.body, code);
        if !frag.is_terminated(&self.body) {
            self.emit(&mut frag, NodeKind::Return(None), span);
        }
        Ok(frag)
    }
}
