//! Statement lowering: locals, assignment, `if`, `while`, blocks.

use tac_graph::node::{Binary, Load, LocalStore, Store};
use tac_graph::{Branch, Fragment, LabelId, NodeKind, Operand, RcFlags, Reference};
use tac_ir::{AssignOp, Binding, ExprId, ExprKind, LocalId, Span, StmtId, StmtKind, TypeId};
use tracing::warn;

use super::{LowerResult, Lowered, Lowerer};
use crate::error::{LowerError, LowerWarning};

impl Lowerer<'_> {
    pub(crate) fn lower_stmt(&mut self, id: StmtId) -> LowerResult<Fragment> {
        let stmt = self.stmt(id);
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Expr(expr) => Ok(self.lower_expr(*expr)?.frag),
            StmtKind::Local { local, init } => {
                let mut frag = Fragment::EMPTY;
                if let Some(init) = init {
                    let value = self.lower_into(&mut frag, *init)?;
                    self.emit_local_store(&mut frag, *local, value, span);
                }
                Ok(frag)
            }
            StmtKind::Assign { target, op, value } => self.lower_assign(*target, *op, *value, span),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(*cond, *then_branch, *else_branch, span),
            StmtKind::While { cond, body } => self.lower_while(*cond, *body, span),
            StmtKind::Block(stmts) => self.lower_block(stmts),
            StmtKind::Try {
                body,
                catches,
                finally,
            } => self.lower_try(*body, catches, *finally, span),
            StmtKind::Throw(value) => self.lower_throw(*value, span),
            StmtKind::Return(value) => self.lower_return(*value, span),
        }
    }

    /// Statements after one that ends its block are dropped with a warning.
    fn lower_block(&mut self, stmts: &[StmtId]) -> LowerResult<Fragment> {
        let mut frag = Fragment::EMPTY;
        for (idx, &stmt) in stmts.iter().enumerate() {
            if frag.is_terminated(&self.body) {
                let first = self.stmt(stmt).span;
                let span = stmts
                    .last()
                    .map_or(first, |&last| first.merge(self.stmt(last).span));
                warn!(
                    dropped = stmts.len() - idx,
                    "statements after a terminating statement are not lowered"
                );
                self.warnings.push(LowerWarning::UnreachableCode { span });
                break;
            }
            let code = self.lower_stmt(stmt)?;
            frag.splice_to_end(&mut self.body, code);
        }
        Ok(frag)
    }

    pub(crate) fn emit_local_store(
        &mut self,
        frag: &mut Fragment,
        local: LocalId,
        value: Operand,
        span: Span,
    ) {
        self.emit(
            frag,
            NodeKind::LocalStore(LocalStore {
                local,
                value,
                rc: RcFlags::default(),
            }),
            span,
        );
    }

    // ── Assignment ──────────────────────────────────────────────────

    /// Plain and compound assignment. `x op= y` reads `x`, combines, and
    /// writes `x` back.
    fn lower_assign(
        &mut self,
        target: ExprId,
        op: AssignOp,
        value: ExprId,
        span: Span,
    ) -> LowerResult<Fragment> {
        if op == AssignOp::RefAssign {
            return Err(LowerError::Unsupported {
                what: "reference-rebinding assignment",
                span,
            });
        }
        let target = self.expr(target);
        let ty = target.ty;
        match &target.kind {
            ExprKind::Name {
                binding: Binding::Local(local) | Binding::Param(local),
                ..
            } => self.assign_local(*local, ty, op, value, span),
            ExprKind::Name {
                binding: Binding::Field { field },
                ..
            } => {
                let object = self.this_operand(span)?;
                let slot = Reference::Field {
                    object,
                    field: *field,
                    ty,
                };
                self.assign_slot(Fragment::EMPTY, slot, op, value, span)
            }
            ExprKind::Field { object, field } => {
                let Lowered {
                    frag,
                    value: object,
                } = self.lower_expr(*object)?;
                let slot = Reference::Field {
                    object,
                    field: *field,
                    ty,
                };
                self.assign_slot(frag, slot, op, value, span)
            }
            ExprKind::Index { array, index } => {
                let mut frag = Fragment::EMPTY;
                let array = self.lower_into(&mut frag, *array)?;
                let index = self.lower_into(&mut frag, *index)?;
                self.assign_slot(frag, Reference::Element { array, index, ty }, op, value, span)
            }
            ExprKind::Sequence(_) => Err(LowerError::Unsupported {
                what: "sequence assignment",
                span,
            }),
            ExprKind::Error => Err(LowerError::Upstream { span: target.span }),
            _ => Err(LowerError::internal("assignment target is not a place", span)),
        }
    }

    fn assign_local(
        &mut self,
        local: LocalId,
        ty: TypeId,
        op: AssignOp,
        value: ExprId,
        span: Span,
    ) -> LowerResult<Fragment> {
        let Lowered { mut frag, value } = self.lower_expr(value)?;
        let current = Operand::local(local, ty);
        match op.binary_op() {
            None => self.emit_local_store(&mut frag, local, value, span),
            // Owned slots go through a store so RC insertion sees the
            // overwrite.
            Some(op) if self.is_owned(ty) => {
                let dst = self.fresh(ty);
                self.emit(
                    &mut frag,
                    NodeKind::Binary(Binary {
                        dst,
                        op,
                        lhs: current,
                        rhs: value,
                    }),
                    span,
                );
                self.emit_local_store(&mut frag, local, dst, span);
            }
            Some(op) => {
                self.emit(
                    &mut frag,
                    NodeKind::Binary(Binary {
                        dst: current,
                        op,
                        lhs: current,
                        rhs: value,
                    }),
                    span,
                );
            }
        }
        Ok(frag)
    }

    /// Store into a field or array slot whose address operands are already
    /// computed by `frag`.
    fn assign_slot(
        &mut self,
        mut frag: Fragment,
        target: Reference,
        op: AssignOp,
        value: ExprId,
        span: Span,
    ) -> LowerResult<Fragment> {
        let value = self.lower_into(&mut frag, value)?;
        let value = match op.binary_op() {
            None => value,
            Some(op) => {
                let old = self.fresh(target.ty());
                self.emit(&mut frag, NodeKind::Load(Load { dst: old, source: target }), span);
                let dst = self.fresh(target.ty());
                self.emit(
                    &mut frag,
                    NodeKind::Binary(Binary {
                        dst,
                        op,
                        lhs: old,
                        rhs: value,
                    }),
                    span,
                );
                dst
            }
        };
        self.emit(
            &mut frag,
            NodeKind::Store(Store {
                target,
                value,
                rc: RcFlags::default(),
            }),
            span,
        );
        Ok(frag)
    }

    // ── Control flow ────────────────────────────────────────────────

    /// `if`: one conditional branch, each arm in its own fragment, and one
    /// join label placed only if some arm falls through.
    fn lower_if(
        &mut self,
        cond: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
        span: Span,
    ) -> LowerResult<Fragment> {
        let Lowered {
            mut frag,
            value: cond,
        } = self.lower_expr(cond)?;
        let then_label = self.body.new_label();
        let else_label = else_branch.map(|_| self.body.new_label());
        let join = self.body.new_label();
        self.emit(
            &mut frag,
            NodeKind::Branch(Branch::Conditional {
                cond,
                if_true: then_label,
                if_false: else_label.unwrap_or(join),
            }),
            span,
        );

        let (then_frag, mut join_reached) = self.lower_arm(then_label, then_branch, join, span)?;
        frag.splice_to_end(&mut self.body, then_frag);
        match (else_label, else_branch) {
            (Some(label), Some(stmt)) => {
                let (else_frag, falls_through) = self.lower_arm(label, stmt, join, span)?;
                frag.splice_to_end(&mut self.body, else_frag);
                join_reached |= falls_through;
            }
            _ => join_reached = true,
        }

        if join_reached {
            self.place_label(&mut frag, join, span);
        }
        Ok(frag)
    }

    /// One arm of an `if`: its label, its body, and a branch to `join` if
    /// the body falls through.
    fn lower_arm(
        &mut self,
        label: LabelId,
        stmt: StmtId,
        join: LabelId,
        span: Span,
    ) -> LowerResult<(Fragment, bool)> {
        let mut frag = Fragment::EMPTY;
        self.place_label(&mut frag, label, span);
        let body = self.lower_stmt(stmt)?;
        frag.splice_to_end(&mut self.body, body);
        let falls_through = !frag.is_terminated(&self.body);
        if falls_through {
            self.goto(&mut frag, join, span);
        }
        Ok((frag, falls_through))
    }

    fn lower_while(&mut self, cond: ExprId, body: StmtId, span: Span) -> LowerResult<Fragment> {
        let head = self.body.new_label();
        let body_label = self.body.new_label();
        let exit = self.body.new_label();

        let mut frag = Fragment::EMPTY;
        self.goto(&mut frag, head, span);
        self.place_label(&mut frag, head, span);
        let cond = self.lower_into(&mut frag, cond)?;
        self.emit(
            &mut frag,
            NodeKind::Branch(Branch::Conditional {
                cond,
                if_true: body_label,
                if_false: exit,
            }),
            span,
        );

        self.place_label(&mut frag, body_label, span);
        let body = self.lower_stmt(body)?;
        frag.splice_to_end(&mut self.body, body);
        if !frag.is_terminated(&self.body) {
            self.goto(&mut frag, head, span);
        }

        self.place_label(&mut frag, exit, span);
        Ok(frag)
    }
}
