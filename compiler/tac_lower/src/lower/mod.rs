//! Typed syntax tree → TAC lowering.
//!
//! # Entry Point
//!
//! [`lower_method`] turns one [`MethodDecl`] into a [`MethodGraph`]: the main
//! body plus one finally function per `finally` block.
//!
//! # Architecture
//!
//! - [`Lowerer`] owns the body under construction and the per-method state
//!   (active protected region, exit scopes, synthetic return slot).
//! - `expr.rs` lowers expressions to a [`Lowered`] fragment plus the operand
//!   holding the value; `stmt.rs` lowers statements to fragments.
//! - `exceptions.rs` lowers `try`/`catch`/`finally`, `throw` and `return`
//!   routing through enclosing handlers.
//!
//! Nodes are created in the order they appear in the final sequence, so the
//! label of the block being emitted is always known. Phi inputs record it as
//! their predecessor.

mod exceptions;
mod expr;
mod stmt;

use tac_graph::node::{Call, CallFinally, UnwindEdge};
use tac_graph::{
    Body, Branch, FinallyFunction, FinallyId, Fragment, LabelId, MethodGraph, NodeId, NodeKind,
    Operand, ProtectedRegion, RegionId, RegionKind,
};
use tac_ir::{
    Expr, Literal, LocalDecl, LocalId, MethodDecl, Span, Stmt, StmtId, StmtKind,
    StringInterner, SyntaxArena, TypeId,
};
use tac_types::{OwnershipClassification, Pool};
use tracing::{debug, trace};

use crate::error::{LowerError, LowerWarning};
use crate::temps::TempAllocator;
use crate::LowerConfig;

use self::exceptions::ExitScope;

pub(crate) type LowerResult<T> = Result<T, LowerError>;

/// Code computing a value, and the operand that holds it afterwards.
pub(crate) struct Lowered {
    pub(crate) frag: Fragment,
    pub(crate) value: Operand,
}

impl Lowered {
    /// A value needing no code: literals and bare names.
    fn operand(value: Operand) -> Self {
        Lowered {
            frag: Fragment::EMPTY,
            value,
        }
    }
}

pub(crate) struct LoweredMethod {
    pub(crate) graph: MethodGraph,
    pub(crate) warnings: Vec<LowerWarning>,
}

/// Per-method lowering state.
pub(crate) struct Lowerer<'a> {
    arena: &'a SyntaxArena,
    pool: &'a Pool,
    interner: &'a StringInterner,
    decl: &'a MethodDecl,
    temps: &'a mut TempAllocator,
    /// Body being emitted: the method body, or a finally function body
    /// while one is being lowered.
    body: Body,
    locals: Vec<LocalDecl>,
    finally_functions: Vec<FinallyFunction>,
    /// Label of the block currently being emitted.
    current_label: Option<LabelId>,
    /// Innermost active protected region.
    region: Option<RegionId>,
    /// Enclosing handlers a `return` has to leave, innermost last.
    exits: Vec<ExitScope>,
    return_slot: Option<LocalId>,
    return_block: Option<LabelId>,
    in_finally: bool,
    warnings: Vec<LowerWarning>,
}

/// Lower one method. With `config.insert_rc` set, a method owning
/// reference-counted slots gets a method-wide scope region so unwinding
/// can release them.
pub(crate) fn lower_method(
    decl: &MethodDecl,
    arena: &SyntaxArena,
    pool: &Pool,
    interner: &StringInterner,
    temps: &mut TempAllocator,
    config: &LowerConfig,
) -> LowerResult<LoweredMethod> {
    debug!(method = %interner.lookup(decl.name), "lowering method");
    let mut lowerer = Lowerer {
        arena,
        pool,
        interner,
        decl,
        temps,
        body: Body::new(),
        locals: decl.locals.clone(),
        finally_functions: Vec::new(),
        current_label: None,
        region: None,
        exits: Vec::new(),
        return_slot: None,
        return_block: None,
        in_finally: false,
        warnings: Vec::new(),
    };

    let scope = (config.insert_rc && lowerer.needs_scope()).then(|| lowerer.open_scope());
    lowerer.region = scope;

    let mut frag = Fragment::EMPTY;
    let entry = lowerer.body.new_label();
    lowerer.place_label(&mut frag, entry, decl.span);
    let stmts = lowerer.lower_stmt(decl.body)?;
    frag.splice_to_end(&mut lowerer.body, stmts);

    if !frag.is_terminated(&lowerer.body) {
        if decl.return_type != TypeId::UNIT {
            return Err(LowerError::internal(
                "control reaches the end of a method with a result",
                decl.span,
            ));
        }
        lowerer.emit(&mut frag, NodeKind::Return(None), decl.span);
    }
    lowerer.close_return_block(&mut frag);
    if let Some(scope) = scope {
        lowerer.region = None;
        lowerer.close_scope(&mut frag, scope, decl.span);
    }
    lowerer.body.set_contents(frag);
    Ok(lowerer.finish())
}

impl<'a> Lowerer<'a> {
    fn finish(self) -> LoweredMethod {
        let mut graph = MethodGraph::new(
            self.decl.name,
            self.decl.mangled,
            self.locals,
            self.decl.return_type,
        );
        graph.body = self.body;
        graph.finally_functions = self.finally_functions;
        debug!(
            method = %self.interner.lookup(self.decl.name),
            nodes = graph.body.node_count(),
            finally_functions = graph.finally_functions.len(),
            "method lowered"
        );
        LoweredMethod {
            graph,
            warnings: self.warnings,
        }
    }

    // ── Lookups ─────────────────────────────────────────────────────

    #[inline]
    fn expr(&self, id: tac_ir::ExprId) -> &'a Expr {
        self.arena.expr(id)
    }

    #[inline]
    fn stmt(&self, id: StmtId) -> &'a Stmt {
        self.arena.stmt(id)
    }

    fn is_owned(&self, ty: TypeId) -> bool {
        self.pool.needs_rc(ty)
    }

    /// Receiver of the method, for implicit `this.field` names.
    fn this_operand(&self, span: Span) -> LowerResult<Operand> {
        let this = self
            .decl
            .this
            .ok_or_else(|| LowerError::internal("field name in a method without receiver", span))?;
        let ty = self
            .locals
            .get(this.index())
            .map(|decl| decl.ty)
            .ok_or_else(|| LowerError::internal("receiver is not in the local table", span))?;
        Ok(Operand::local(this, ty))
    }

    fn current_label(&self, span: Span) -> LowerResult<LabelId> {
        self.current_label
            .ok_or_else(|| LowerError::internal("code emitted outside any block", span))
    }

    // ── Emission ────────────────────────────────────────────────────

    /// Allocate `kind` in the active region and append it to `frag`.
    fn emit(&mut self, frag: &mut Fragment, kind: NodeKind, span: Span) -> NodeId {
        trace!(kind = kind.name(), "emit");
        let id = self.body.alloc_in(kind, span, self.region);
        frag.link_to_end(&mut self.body, id);
        id
    }

    /// Start a new block at `label`. The preceding node must be a
    /// terminator.
    fn place_label(&mut self, frag: &mut Fragment, label: LabelId, span: Span) {
        self.emit(frag, NodeKind::Label(label), span);
        self.current_label = Some(label);
    }

    fn goto(&mut self, frag: &mut Fragment, target: LabelId, span: Span) {
        self.emit(frag, NodeKind::Branch(Branch::Direct(target)), span);
    }

    fn fresh(&mut self, ty: TypeId) -> Operand {
        Operand::temp(self.temps.fresh(), ty)
    }

    /// Value of unit-typed expressions; never stored or passed on.
    fn unit_value() -> Operand {
        Operand::literal(Literal::Null, TypeId::UNIT)
    }

    /// Copy a local into a temporary so the value is fixed at this point.
    fn materialize(&mut self, frag: &mut Fragment, value: Operand, span: Span) -> Operand {
        let Some(local) = value.as_local() else {
            return value;
        };
        let dst = self.fresh(value.ty);
        self.emit(
            frag,
            NodeKind::LocalLoad(tac_graph::node::LocalLoad { dst, local }),
            span,
        );
        dst
    }

    /// Emit `call`, giving it an unwind edge if it may raise inside a
    /// protected region. The normal label is placed right after it.
    fn emit_call(&mut self, frag: &mut Fragment, mut call: Call, span: Span) {
        match self.region.filter(|_| !call.nounwind) {
            Some(region) => {
                let normal = self.body.new_label();
                call.unwind = Some(UnwindEdge { normal, region });
                self.mark_used(region);
                self.emit(frag, NodeKind::Call(call), span);
                self.place_label(frag, normal, span);
            }
            None => {
                self.emit(frag, NodeKind::Call(call), span);
            }
        }
    }

    fn emit_call_finally(&mut self, frag: &mut Fragment, finally: FinallyId, span: Span) {
        match self.region {
            Some(region) => {
                let normal = self.body.new_label();
                self.mark_used(region);
                let unwind = Some(UnwindEdge { normal, region });
                self.emit(frag, NodeKind::CallFinally(CallFinally { finally, unwind }), span);
                self.place_label(frag, normal, span);
            }
            None => {
                self.emit(
                    frag,
                    NodeKind::CallFinally(CallFinally {
                        finally,
                        unwind: None,
                    }),
                    span,
                );
            }
        }
    }

    // ── Regions ─────────────────────────────────────────────────────

    fn mark_used(&mut self, region: RegionId) {
        if let Some(region) = self.body.region_mut(region) {
            region.used = true;
        }
    }

    fn region_used(&self, region: RegionId) -> bool {
        self.body.region(region).is_some_and(|r| r.used)
    }

    fn region_landing(&self, region: RegionId) -> Option<LabelId> {
        self.body.region(region).map(|r| r.landing)
    }

    fn set_fallback(&mut self, region: RegionId, fallback: LabelId) {
        if let Some(region) = self.body.region_mut(region) {
            region.fallback = Some(fallback);
        }
    }

    /// Whether unwinding out of this method has owned slots to release.
    fn needs_scope(&self) -> bool {
        self.decl.locals.iter().any(|local| self.is_owned(local.ty))
            || (self.is_owned(self.decl.return_type) && self.contains_try(self.decl.body))
    }

    fn contains_try(&self, stmt: StmtId) -> bool {
        match &self.stmt(stmt).kind {
            StmtKind::Try { .. } => true,
            StmtKind::Block(stmts) => stmts.iter().any(|&s| self.contains_try(s)),
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                self.contains_try(*then_branch)
                    || else_branch.is_some_and(|s| self.contains_try(s))
            }
            StmtKind::While { body, .. } => self.contains_try(*body),
            StmtKind::Expr(_)
            | StmtKind::Local { .. }
            | StmtKind::Assign { .. }
            | StmtKind::Throw(_)
            | StmtKind::Return(_) => false,
        }
    }

    fn open_scope(&mut self) -> RegionId {
        let landing = self.body.new_label();
        self.body
            .add_region(ProtectedRegion::new(RegionKind::Scope, landing, None))
    }

    /// Landing and cleanup blocks of the method scope, if anything unwinds
    /// into it. The cleanup pad is left empty; RC insertion fills it.
    fn close_scope(&mut self, frag: &mut Fragment, scope: RegionId, span: Span) {
        if !self.region_used(scope) {
            return;
        }
        let Some(landing) = self.region_landing(scope) else {
            return;
        };
        let cleanup = self.body.new_label();
        self.set_fallback(scope, cleanup);
        self.place_label(frag, landing, span);
        self.emit(frag, NodeKind::LandingPad { region: scope }, span);
        self.place_label(frag, cleanup, span);
        let pad = self.emit(frag, NodeKind::CleanupPad { region: scope }, span);
        self.emit(
            frag,
            NodeKind::CleanupRet(tac_graph::node::CleanupRet { pad, unwind: None }),
            span,
        );
    }
}

#[cfg(test)]
mod tests;
