//! Syntax-tree factories for lowering tests.

use tac_graph::{Body, MethodGraph, NodeKind};
use tac_ir::{
    AssignOp, BinaryOp, Binding, CatchClause, ExprId, ExprKind, Literal, LocalId, MethodDecl,
    Span, StmtId, StmtKind, StringInterner, SyntaxArena, TypeId,
};
use tac_types::Pool;

use crate::{CompilationUnit, LowerConfig, LowerError};

/// Interner, type pool and syntax arena for one test program.
pub(crate) struct Fixture {
    pub(crate) interner: StringInterner,
    pub(crate) pool: Pool,
    pub(crate) arena: SyntaxArena,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let interner = StringInterner::new();
        let pool = Pool::new(&interner);
        Fixture {
            interner,
            pool,
            arena: SyntaxArena::new(),
        }
    }

    /// Method `name` (mangled by replacing `.` with `_`) with a placeholder
    /// body; set `decl.body` before lowering.
    pub(crate) fn method(&self, name: &str, return_type: TypeId) -> MethodDecl {
        MethodDecl::new(
            self.interner.intern(name),
            self.interner.intern(&name.replace('.', "_")),
            return_type,
            StmtId::new(u32::MAX),
        )
    }

    pub(crate) fn class(&mut self, name: &str) -> TypeId {
        let name = self.interner.intern(name);
        self.pool.class(name, None)
    }

    pub(crate) fn exception(&mut self, name: &str) -> TypeId {
        let name = self.interner.intern(name);
        self.pool.exception_class(name, None)
    }

    // ── Expressions ─────────────────────────────────────────────────

    pub(crate) fn expr(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        self.arena.alloc_expr(kind, ty, Span::DUMMY)
    }

    pub(crate) fn int(&mut self, value: i64) -> ExprId {
        self.expr(ExprKind::Literal(Literal::Int(value)), TypeId::INT)
    }

    pub(crate) fn null(&mut self, ty: TypeId) -> ExprId {
        self.expr(ExprKind::Literal(Literal::Null), ty)
    }

    /// Name expression bound to a local or parameter of `decl`.
    pub(crate) fn var(&mut self, decl: &MethodDecl, local: LocalId) -> ExprId {
        let slot = decl.local(local);
        let binding = if slot.is_param {
            Binding::Param(local)
        } else {
            Binding::Local(local)
        };
        let kind = ExprKind::Name {
            name: slot.name,
            binding,
        };
        self.expr(kind, slot.ty)
    }

    pub(crate) fn chain(&mut self, operands: Vec<ExprId>, ops: Vec<BinaryOp>, ty: TypeId) -> ExprId {
        self.expr(ExprKind::Chain { operands, ops }, ty)
    }

    pub(crate) fn call(&mut self, callee: &str, args: Vec<ExprId>, ty: TypeId) -> ExprId {
        let kind = ExprKind::Call {
            callee: self.interner.intern(callee),
            receiver: None,
            args,
            nounwind: false,
        };
        self.expr(kind, ty)
    }

    pub(crate) fn new_object(&mut self, ty: TypeId) -> ExprId {
        self.expr(
            ExprKind::New {
                ctor: None,
                args: Vec::new(),
            },
            ty,
        )
    }

    // ── Statements ──────────────────────────────────────────────────

    pub(crate) fn stmt(&mut self, kind: StmtKind) -> StmtId {
        self.arena.alloc_stmt(kind, Span::DUMMY)
    }

    pub(crate) fn eval(&mut self, expr: ExprId) -> StmtId {
        self.stmt(StmtKind::Expr(expr))
    }

    pub(crate) fn assign(&mut self, target: ExprId, op: AssignOp, value: ExprId) -> StmtId {
        self.stmt(StmtKind::Assign { target, op, value })
    }

    pub(crate) fn block(&mut self, stmts: Vec<StmtId>) -> StmtId {
        self.stmt(StmtKind::Block(stmts))
    }

    pub(crate) fn ret(&mut self, value: Option<ExprId>) -> StmtId {
        self.stmt(StmtKind::Return(value))
    }

    pub(crate) fn try_stmt(
        &mut self,
        body: StmtId,
        catches: Vec<CatchClause>,
        finally: Option<StmtId>,
    ) -> StmtId {
        self.stmt(StmtKind::Try {
            body,
            catches,
            finally,
        })
    }

    pub(crate) fn catch(ty: TypeId, binding: Option<LocalId>, body: StmtId) -> CatchClause {
        CatchClause {
            ty,
            binding,
            body,
            span: Span::DUMMY,
        }
    }

    // ── Lowering ────────────────────────────────────────────────────

    pub(crate) fn lower(
        &self,
        decl: &MethodDecl,
        config: LowerConfig,
    ) -> Result<MethodGraph, LowerError> {
        CompilationUnit::new(&self.arena, &self.pool, &self.interner, config).lower_method(decl)
    }

    pub(crate) fn render(&self, graph: &MethodGraph) -> String {
        tac_graph::text::render_method(graph, &self.pool, &self.interner)
    }
}

/// Number of nodes in `body` matching `pred`.
pub(crate) fn count(body: &Body, pred: impl Fn(&NodeKind) -> bool) -> usize {
    body.iter().filter(|(_, node)| pred(&node.kind)).count()
}

/// Kinds of `body` in sequence order.
pub(crate) fn kinds(body: &Body) -> Vec<&NodeKind> {
    body.iter().map(|(_, node)| &node.kind).collect()
}
