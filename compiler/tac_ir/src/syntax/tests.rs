use pretty_assertions::assert_eq;

use super::*;

#[test]
fn arena_allocates_sequential_ids() {
    let mut arena = SyntaxArena::new();
    let a = arena.alloc_expr(ExprKind::Literal(Literal::Int(1)), TypeId::INT, Span::DUMMY);
    let b = arena.alloc_expr(ExprKind::Literal(Literal::Int(2)), TypeId::INT, Span::DUMMY);
    assert_eq!(a.raw(), 0);
    assert_eq!(b.raw(), 1);
    assert_eq!(arena.expr_count(), 2);
    assert_eq!(arena.expr(b).kind, ExprKind::Literal(Literal::Int(2)));
}

#[test]
fn method_locals_keep_declaration_order() {
    let mut arena = SyntaxArena::new();
    let body = arena.alloc_stmt(StmtKind::Block(Vec::new()), Span::DUMMY);
    let mut method = MethodDecl::new(Name::from_raw(1), Name::from_raw(2), TypeId::UNIT, body);
    let p = method.add_param(Name::from_raw(3), TypeId::INT);
    let l = method.add_local(Name::from_raw(4), TypeId::STRING);
    assert_eq!(p, LocalId::new(0));
    assert_eq!(l, LocalId::new(1));
    assert!(method.local(p).is_param);
    assert!(!method.local(l).is_param);
    assert_eq!(method.local(l).ty, TypeId::STRING);
}
