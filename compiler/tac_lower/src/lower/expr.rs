//! Expression lowering.
//!
//! Every expression lowers to a fragment plus the operand holding its value.
//! Literals and bare local names produce no code; everything else ends in a
//! node writing a fresh temporary, and the fragment is spliced in before the
//! node that consumes the value.

use tac_graph::node::{
    Binary, Call, Conversion, Load, NewArray, NewObject, Phi, Sequence, SequenceElement, Unary,
};
use tac_graph::{Branch, Fragment, NodeKind, Operand, Reference};
use tac_ir::{
    BinaryOp, Binding, ConversionKind, ExprId, ExprKind, Literal, LogicalOp, Name, Span, TypeId,
    UnaryOp,
};

use super::{LowerResult, Lowered, Lowerer};
use crate::error::LowerError;

impl Lowerer<'_> {
    pub(crate) fn lower_expr(&mut self, id: ExprId) -> LowerResult<Lowered> {
        let expr = self.expr(id);
        let (ty, span) = (expr.ty, expr.span);
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(Lowered::operand(Operand::literal(*literal, ty))),
            ExprKind::Name { binding, .. } => self.lower_name(*binding, ty, span),
            ExprKind::Chain { operands, ops } => self.lower_chain(operands, ops, ty, span),
            ExprKind::Unary { op, operand } => self.lower_unary(*op, *operand, ty, span),
            ExprKind::Logical { op, lhs, rhs } => self.lower_logical(*op, *lhs, *rhs, ty, span),
            ExprKind::Conditional {
                cond,
                then_expr,
                else_expr,
            } => self.lower_conditional(*cond, *then_expr, *else_expr, ty, span),
            ExprKind::Call {
                callee,
                receiver,
                args,
                nounwind,
            } => {
                let mut frag = Fragment::EMPTY;
                let args = self.lower_operands(&mut frag, receiver.iter().chain(args))?;
                let dst = (ty != TypeId::UNIT).then(|| self.fresh(ty));
                let call = Call {
                    dst,
                    callee: *callee,
                    args,
                    nounwind: *nounwind,
                    unwind: None,
                };
                self.emit_call(&mut frag, call, span);
                Ok(Lowered {
                    frag,
                    value: dst.unwrap_or_else(Self::unit_value),
                })
            }
            ExprKind::Field { object, field } => {
                let Lowered { frag, value } = self.lower_expr(*object)?;
                let source = Reference::Field {
                    object: value,
                    field: *field,
                    ty,
                };
                Ok(self.load(frag, source, span))
            }
            ExprKind::Index { array, index } => {
                let mut frag = Fragment::EMPTY;
                let array = self.lower_into(&mut frag, *array)?;
                let index = self.lower_into(&mut frag, *index)?;
                Ok(self.load(frag, Reference::Element { array, index, ty }, span))
            }
            ExprKind::New { ctor, args } => self.lower_new(*ctor, args, ty, span),
            ExprKind::NewArray { len } => {
                let elem = self.pool.element_type(ty).ok_or_else(|| {
                    LowerError::internal("array creation with a non-array type", span)
                })?;
                let Lowered { mut frag, value: len } = self.lower_expr(*len)?;
                let dst = self.fresh(ty);
                self.emit(&mut frag, NodeKind::NewArray(NewArray { dst, elem, len }), span);
                Ok(Lowered { frag, value: dst })
            }
            ExprKind::Cast { operand } => self.lower_conversion(*operand, ty, span, NodeKind::Cast),
            ExprKind::TypeOf { operand } => {
                self.lower_conversion(*operand, ty, span, NodeKind::TypeId)
            }
            ExprKind::Convert { kind, operand } => {
                let make = match kind {
                    ConversionKind::PointerToLong => NodeKind::PointerToLong,
                    ConversionKind::LongToPointer => NodeKind::LongToPointer,
                };
                self.lower_conversion(*operand, ty, span, make)
            }
            ExprKind::Sequence(elements) => {
                let mut frag = Fragment::EMPTY;
                let elements = self.lower_operands(&mut frag, elements.iter())?;
                let dst = self.fresh(ty);
                self.emit(&mut frag, NodeKind::Sequence(Sequence { dst, elements }), span);
                Ok(Lowered { frag, value: dst })
            }
            ExprKind::Element { sequence, index } => {
                let Lowered {
                    mut frag,
                    value: sequence,
                } = self.lower_expr(*sequence)?;
                let dst = self.fresh(ty);
                self.emit(
                    &mut frag,
                    NodeKind::SequenceElement(SequenceElement {
                        dst,
                        sequence,
                        index: *index,
                    }),
                    span,
                );
                Ok(Lowered { frag, value: dst })
            }
            ExprKind::Error => Err(LowerError::Upstream { span }),
        }
    }

    /// Lower `id` and splice its code onto `frag`, returning the value.
    pub(crate) fn lower_into(&mut self, frag: &mut Fragment, id: ExprId) -> LowerResult<Operand> {
        let Lowered { frag: code, value } = self.lower_expr(id)?;
        frag.splice_to_end(&mut self.body, code);
        Ok(value)
    }

    fn lower_operands<'e>(
        &mut self,
        frag: &mut Fragment,
        ids: impl Iterator<Item = &'e ExprId>,
    ) -> LowerResult<Vec<Operand>> {
        ids.map(|&id| self.lower_into(frag, id)).collect()
    }

    fn lower_name(&mut self, binding: Binding, ty: TypeId, span: Span) -> LowerResult<Lowered> {
        match binding {
            Binding::Local(local) | Binding::Param(local) => {
                Ok(Lowered::operand(Operand::local(local, ty)))
            }
            Binding::Field { field } => {
                let object = self.this_operand(span)?;
                Ok(self.load(Fragment::EMPTY, Reference::Field { object, field, ty }, span))
            }
        }
    }

    fn load(&mut self, mut frag: Fragment, source: Reference, span: Span) -> Lowered {
        let dst = self.fresh(source.ty());
        self.emit(&mut frag, NodeKind::Load(Load { dst, source }), span);
        Lowered { frag, value: dst }
    }

    /// `a op0 b op1 c ...` left to right: the first pair combines into a
    /// temporary, then each further operand combines with the running one.
    fn lower_chain(
        &mut self,
        operands: &[ExprId],
        ops: &[BinaryOp],
        ty: TypeId,
        span: Span,
    ) -> LowerResult<Lowered> {
        let Some((&first, rest)) = operands.split_first() else {
            return Err(LowerError::internal("empty operator chain", span));
        };
        if rest.len() != ops.len() {
            return Err(LowerError::internal("operator chain arity mismatch", span));
        }
        let Lowered {
            mut frag,
            value: mut acc,
        } = self.lower_expr(first)?;
        for (idx, (&op, &operand)) in ops.iter().zip(rest).enumerate() {
            let rhs = self.lower_into(&mut frag, operand)?;
            let result_ty = if idx + 1 == ops.len() {
                ty
            } else if op.is_comparison() {
                TypeId::BOOL
            } else {
                acc.ty
            };
            let dst = self.fresh(result_ty);
            self.emit(
                &mut frag,
                NodeKind::Binary(Binary {
                    dst,
                    op,
                    lhs: acc,
                    rhs,
                }),
                span,
            );
            acc = dst;
        }
        Ok(Lowered { frag, value: acc })
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: ExprId,
        ty: TypeId,
        span: Span,
    ) -> LowerResult<Lowered> {
        let Lowered {
            mut frag,
            value: operand,
        } = self.lower_expr(operand)?;
        let dst = self.fresh(ty);
        self.emit(&mut frag, NodeKind::Unary(Unary { dst, op, operand }), span);
        Ok(Lowered { frag, value: dst })
    }

    /// Short-circuit `&&`/`||`. The left operand decides whether the right
    /// one runs; a phi at the join picks the constant or the right value.
    fn lower_logical(
        &mut self,
        op: LogicalOp,
        lhs: ExprId,
        rhs: ExprId,
        ty: TypeId,
        span: Span,
    ) -> LowerResult<Lowered> {
        let Lowered {
            mut frag,
            value: cond,
        } = self.lower_expr(lhs)?;
        let rhs_label = self.body.new_label();
        let join = self.body.new_label();
        let (if_true, if_false, decided) = match op {
            LogicalOp::And => (rhs_label, join, false),
            LogicalOp::Or => (join, rhs_label, true),
        };
        let short_pred = self.current_label(span)?;
        self.emit(
            &mut frag,
            NodeKind::Branch(Branch::Conditional {
                cond,
                if_true,
                if_false,
            }),
            span,
        );

        self.place_label(&mut frag, rhs_label, span);
        let rhs = self.lower_into(&mut frag, rhs)?;
        let rhs = self.materialize(&mut frag, rhs, span);
        let rhs_pred = self.current_label(span)?;
        self.goto(&mut frag, join, span);

        self.place_label(&mut frag, join, span);
        let dst = self.fresh(ty);
        let incoming = vec![
            (short_pred, Operand::literal(Literal::Bool(decided), TypeId::BOOL)),
            (rhs_pred, rhs),
        ];
        self.emit(&mut frag, NodeKind::Phi(Phi { dst, incoming }), span);
        Ok(Lowered { frag, value: dst })
    }

    /// `cond ? a : b`, merged through a phi at the join label.
    fn lower_conditional(
        &mut self,
        cond: ExprId,
        then_expr: ExprId,
        else_expr: ExprId,
        ty: TypeId,
        span: Span,
    ) -> LowerResult<Lowered> {
        let Lowered {
            mut frag,
            value: cond,
        } = self.lower_expr(cond)?;
        let then_label = self.body.new_label();
        let else_label = self.body.new_label();
        let join = self.body.new_label();
        self.emit(
            &mut frag,
            NodeKind::Branch(Branch::Conditional {
                cond,
                if_true: then_label,
                if_false: else_label,
            }),
            span,
        );

        let mut incoming = Vec::with_capacity(2);
        for (label, arm) in [(then_label, then_expr), (else_label, else_expr)] {
            self.place_label(&mut frag, label, span);
            let value = self.lower_into(&mut frag, arm)?;
            let value = self.materialize(&mut frag, value, span);
            incoming.push((self.current_label(span)?, value));
            self.goto(&mut frag, join, span);
        }

        self.place_label(&mut frag, join, span);
        let dst = self.fresh(ty);
        self.emit(&mut frag, NodeKind::Phi(Phi { dst, incoming }), span);
        Ok(Lowered { frag, value: dst })
    }

    /// Allocation, then the constructor call on the new object.
    fn lower_new(
        &mut self,
        ctor: Option<Name>,
        args: &[ExprId],
        ty: TypeId,
        span: Span,
    ) -> LowerResult<Lowered> {
        let mut frag = Fragment::EMPTY;
        let mut args = self.lower_operands(&mut frag, args.iter())?;
        let dst = self.fresh(ty);
        self.emit(&mut frag, NodeKind::NewObject(NewObject { dst }), span);
        if let Some(ctor) = ctor {
            args.insert(0, dst);
            let call = Call {
                dst: None,
                callee: ctor,
                args,
                nounwind: false,
                unwind: None,
            };
            self.emit_call(&mut frag, call, span);
        }
        Ok(Lowered { frag, value: dst })
    }

    fn lower_conversion(
        &mut self,
        operand: ExprId,
        ty: TypeId,
        span: Span,
        make: fn(Conversion) -> NodeKind,
    ) -> LowerResult<Lowered> {
        let Lowered { mut frag, value } = self.lower_expr(operand)?;
        let dst = self.fresh(ty);
        self.emit(&mut frag, make(Conversion { dst, value }), span);
        Ok(Lowered { frag, value: dst })
    }
}
