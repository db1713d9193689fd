use pretty_assertions::assert_eq;
use tac_graph::node::Binary;
use tac_graph::{verify_method, Branch, NodeKind, Operand};
use tac_ir::{AssignOp, BinaryOp, ExprKind, Literal, LogicalOp, StmtKind, TypeId};

use crate::test_helpers::{count, kinds, Fixture};
use crate::{LowerConfig, LowerError};

#[test]
fn arithmetic_chain_folds_left_to_right() {
    let mut f = Fixture::new();
    let mut decl = f.method("Calc.sum", TypeId::INT);
    let a = decl.add_param(f.interner.intern("a"), TypeId::INT);
    let b = decl.add_param(f.interner.intern("b"), TypeId::INT);
    let (a, b, one) = (f.var(&decl, a), f.var(&decl, b), f.int(1));
    let sum = f.chain(vec![a, b, one], vec![BinaryOp::Add, BinaryOp::Sub], TypeId::INT);
    decl.body = f.ret(Some(sum));

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Calc.sum(int a, int b) => (int) {
L0:
    %t0 = a + b;
    %t1 = %t0 - 1;
    return %t1;
}
"
    );
}

#[test]
fn compound_assignment_on_scalar_writes_the_local() {
    let mut f = Fixture::new();
    let mut decl = f.method("Calc.inc", TypeId::UNIT);
    let x = decl.add_param(f.interner.intern("x"), TypeId::INT);
    let (target, two) = (f.var(&decl, x), f.int(2));
    decl.body = f.assign(target, AssignOp::Add, two);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    let x = Operand::local(x, TypeId::INT);
    let binaries: Vec<&NodeKind> = kinds(&graph.body)
        .into_iter()
        .filter(|kind| matches!(kind, NodeKind::Binary(_)))
        .collect();
    assert_eq!(
        binaries,
        vec![&NodeKind::Binary(Binary {
            dst: x,
            op: BinaryOp::Add,
            lhs: x,
            rhs: Operand::literal(Literal::Int(2), TypeId::INT),
        })]
    );
    assert!(f.render(&graph).contains("    x = x + 2;\n    return;\n"));
}

#[test]
fn compound_assignment_on_owned_local_goes_through_a_store() {
    let mut f = Fixture::new();
    let mut decl = f.method("Text.append", TypeId::UNIT);
    let s = decl.add_local(f.interner.intern("s"), TypeId::STRING);
    let (target, value) = (f.var(&decl, s), f.var(&decl, s));
    decl.body = f.assign(target, AssignOp::Add, value);

    let graph = f.lower(&decl, LowerConfig::without_rc()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Text.append() => (()) {
    String s;
L0:
    %t0 = s + s;
    s = %t0;
    return;
}
"
    );
}

#[test]
fn if_else_joins_once() {
    let mut f = Fixture::new();
    let mut decl = f.method("Calc.pick", TypeId::INT);
    let c = decl.add_param(f.interner.intern("c"), TypeId::BOOL);
    let r = decl.add_local(f.interner.intern("r"), TypeId::INT);
    let cond = f.var(&decl, c);
    let (r1, one) = (f.var(&decl, r), f.int(1));
    let then_branch = f.assign(r1, AssignOp::Assign, one);
    let (r2, two) = (f.var(&decl, r), f.int(2));
    let else_branch = f.assign(r2, AssignOp::Assign, two);
    let branch = f.stmt(StmtKind::If {
        cond,
        then_branch,
        else_branch: Some(else_branch),
    });
    let result = f.var(&decl, r);
    let ret = f.ret(Some(result));
    decl.body = f.block(vec![branch, ret]);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Calc.pick(bool c) => (int) {
    int r;
L0:
    goto c ? L1, L2;
L1:
    r = 1;
    goto L3;
L2:
    r = 2;
    goto L3;
L3:
    return r;
}
"
    );
}

#[test]
fn if_without_else_falls_through_to_join() {
    let mut f = Fixture::new();
    let mut decl = f.method("Calc.guard", TypeId::INT);
    let c = decl.add_param(f.interner.intern("c"), TypeId::BOOL);
    let cond = f.var(&decl, c);
    let zero = f.int(0);
    let early = f.ret(Some(zero));
    let branch = f.stmt(StmtKind::If {
        cond,
        then_branch: early,
        else_branch: None,
    });
    let one = f.int(1);
    let late = f.ret(Some(one));
    decl.body = f.block(vec![branch, late]);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Calc.guard(bool c) => (int) {
L0:
    goto c ? L1, L2;
L1:
    return 0;
L2:
    return 1;
}
"
    );
}

#[test]
fn while_loop_branches_back_to_its_head() {
    let mut f = Fixture::new();
    let mut decl = f.method("Calc.count", TypeId::UNIT);
    let i = decl.add_param(f.interner.intern("i"), TypeId::INT);
    let (lhs, ten) = (f.var(&decl, i), f.int(10));
    let cond = f.chain(vec![lhs, ten], vec![BinaryOp::Lt], TypeId::BOOL);
    let (target, one) = (f.var(&decl, i), f.int(1));
    let body = f.assign(target, AssignOp::Add, one);
    decl.body = f.stmt(StmtKind::While { cond, body });

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Calc.count(int i) => (()) {
L0:
    goto L1;
L1:
    %t0 = i < 10;
    goto %t0 ? L2, L3;
L2:
    i = i + 1;
    goto L1;
L3:
    return;
}
"
    );
}

#[test]
fn short_circuit_and_merges_through_a_phi() {
    let mut f = Fixture::new();
    let mut decl = f.method("Logic.both", TypeId::BOOL);
    let a = decl.add_param(f.interner.intern("a"), TypeId::BOOL);
    let b = decl.add_param(f.interner.intern("b"), TypeId::BOOL);
    let (lhs, rhs) = (f.var(&decl, a), f.var(&decl, b));
    let both = f.expr(
        ExprKind::Logical {
            op: LogicalOp::And,
            lhs,
            rhs,
        },
        TypeId::BOOL,
    );
    decl.body = f.ret(Some(both));

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Logic.both(bool a, bool b) => (bool) {
L0:
    goto a ? L1, L2;
L1:
    %t0 = b;
    goto L2;
L2:
    %t1 = phi [ false, L0 ], [ %t0, L1 ];
    return %t1;
}
"
    );
}

#[test]
fn call_in_try_unwinds_to_a_matching_catch_pad() {
    let mut f = Fixture::new();
    let io_error = f.exception("IoError");
    let mut decl = f.method("Worker.run", TypeId::UNIT);
    let e = decl.add_local(f.interner.intern("e"), io_error);
    let read = f.call("Io.read", Vec::new(), TypeId::UNIT);
    let read = f.eval(read);
    let body = f.block(vec![read]);
    let caught = f.var(&decl, e);
    let warn = f.call("Log.warn", vec![caught], TypeId::UNIT);
    let handler = f.eval(warn);
    let clause = Fixture::catch(io_error, Some(e), handler);
    let protected = f.try_stmt(body, vec![clause], None);
    decl.body = f.block(vec![protected]);

    let graph = f.lower(&decl, LowerConfig::without_rc()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Worker.run() => (()) {
    IoError e;
L0:
    Io.read() to label L4 unwind label L3;
L4:
    goto L1;
L3:
    landingpad catch(IoError) label L2, otherwise label L5;
L2:
    catch(IoError)
    %t0 = exception(IoError);
    e = %t0;
    Log.warn(e);
    catchret to L1;
L5:
    resume;
L1:
    return;
}
"
    );
}

#[test]
fn try_without_raising_code_emits_no_pads() {
    let mut f = Fixture::new();
    let io_error = f.exception("IoError");
    let mut decl = f.method("Worker.quiet", TypeId::UNIT);
    let x = decl.add_local(f.interner.intern("x"), TypeId::INT);
    let (target, one) = (f.var(&decl, x), f.int(1));
    let body = f.assign(target, AssignOp::Assign, one);
    let handler = f.block(Vec::new());
    let protected = f.try_stmt(body, vec![Fixture::catch(io_error, None, handler)], None);
    decl.body = f.block(vec![protected]);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(count(&graph.body, NodeKind::is_pad), 0);
    assert!(graph.body.regions().all(|(_, region)| !region.used));
}

#[test]
fn finally_runs_out_of_line_on_both_paths() {
    let mut f = Fixture::new();
    let mut decl = f.method("Worker.run", TypeId::UNIT);
    let work = f.call("A.f", Vec::new(), TypeId::UNIT);
    let body = f.eval(work);
    let cleanup = f.call("B.g", Vec::new(), TypeId::UNIT);
    let finally = f.eval(cleanup);
    decl.body = f.try_stmt(body, Vec::new(), Some(finally));

    let graph = f.lower(&decl, LowerConfig::without_rc()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Worker.run() => (()) {
L0:
    A.f() to label L4 unwind label L1;
L4:
    goto L2;
L1:
    landingpad cleanup label L5;
L5:
    cleanuppad;
    _finally0_Worker_run();
    cleanupret;
L2:
    %t0 = &L3;
    _finally0_Worker_run();
    goto phi %t0 label L3;
L3:
    return;
}

finally _finally0_Worker_run() {
L0:
    B.g();
    return;
}
"
    );
}

#[test]
fn return_through_finally_uses_the_return_slot() {
    let mut f = Fixture::new();
    let mut decl = f.method("Calc.safe", TypeId::INT);
    let one = f.int(1);
    let body = f.ret(Some(one));
    let cleanup = f.call("B.g", Vec::new(), TypeId::UNIT);
    let finally = f.eval(cleanup);
    decl.body = f.try_stmt(body, Vec::new(), Some(finally));

    let graph = f.lower(&decl, LowerConfig::without_rc()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Calc.safe() => (int) {
    int $return;
L0:
    $return = 1;
    goto L2;
L2:
    %t0 = &L4;
    _finally0_Calc_safe();
    goto phi %t0 label L4;
L4:
    goto L5;
L5:
    return $return;
}

finally _finally0_Calc_safe() {
L0:
    B.g();
    return;
}
"
    );
}

#[test]
fn catch_and_finally_share_one_exit_block() {
    let mut f = Fixture::new();
    let io_error = f.exception("IoError");
    let mut decl = f.method("Worker.all", TypeId::UNIT);
    let work = f.call("A.f", Vec::new(), TypeId::UNIT);
    let body = f.eval(work);
    let log = f.call("Log.warn", Vec::new(), TypeId::UNIT);
    let handler = f.eval(log);
    let cleanup = f.call("B.g", Vec::new(), TypeId::UNIT);
    let finally = f.eval(cleanup);
    decl.body = f.try_stmt(
        body,
        vec![Fixture::catch(io_error, None, handler)],
        Some(finally),
    );

    let graph = f.lower(&decl, LowerConfig::without_rc()).unwrap();
    verify_method(&graph).unwrap();
    let body = &graph.body;
    let indirect = count(body, |k| {
        matches!(k, NodeKind::Branch(Branch::Indirect { .. }))
    });
    assert_eq!(indirect, 1);
    assert_eq!(count(body, |k| matches!(k, NodeKind::CatchPad(_))), 1);
    assert_eq!(count(body, |k| matches!(k, NodeKind::CleanupPad { .. })), 1);
    // Once on the unwind path, once on the shared normal exit.
    assert_eq!(count(body, |k| matches!(k, NodeKind::CallFinally(_))), 2);
    // The handler's call runs under the cleanup region.
    let handler_unwinds = body.iter().any(|(_, node)| match &node.kind {
        NodeKind::Call(call) => f.interner.lookup(call.callee) == "Log.warn" && call.unwind.is_some(),
        _ => false,
    });
    assert!(handler_unwinds);
    let phi_inputs = body.iter().find_map(|(_, node)| match &node.kind {
        NodeKind::Phi(phi) => Some(phi.incoming.len()),
        _ => None,
    });
    assert_eq!(phi_inputs, Some(2));
}

#[test]
fn return_inside_catch_leaves_the_pad_first() {
    let mut f = Fixture::new();
    let io_error = f.exception("IoError");
    let mut decl = f.method("Calc.fallback", TypeId::INT);
    let read = f.call("Io.read", Vec::new(), TypeId::INT);
    let body = f.ret(Some(read));
    let zero = f.int(0);
    let handler = f.ret(Some(zero));
    decl.body = f.try_stmt(body, vec![Fixture::catch(io_error, None, handler)], None);

    let graph = f.lower(&decl, LowerConfig::without_rc()).unwrap();
    let text = f.render(&graph);
    assert!(
        text.contains("    $return = 0;\n    catchret to L"),
        "unexpected graph:\n{text}"
    );
    assert!(text.contains("    return $return;\n"), "unexpected graph:\n{text}");
    verify_method(&graph).unwrap();
}

#[test]
fn field_and_element_stores() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let ints = f.pool.array(TypeId::INT);
    let mut decl = f.method("Node.fill", TypeId::UNIT);
    let n = decl.add_param(f.interner.intern("n"), node);
    let arr = decl.add_param(f.interner.intern("arr"), ints);

    let object = f.var(&decl, n);
    let count_field = f.interner.intern("count");
    let field = f.expr(
        ExprKind::Field {
            object,
            field: count_field,
        },
        TypeId::INT,
    );
    let three = f.int(3);
    let bump = f.assign(field, AssignOp::Mul, three);

    let (array, index) = (f.var(&decl, arr), f.int(0));
    let slot = f.expr(ExprKind::Index { array, index }, TypeId::INT);
    let seven = f.int(7);
    let set = f.assign(slot, AssignOp::Assign, seven);
    decl.body = f.block(vec![bump, set]);

    let graph = f.lower(&decl, LowerConfig::without_rc()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Node.fill(Node n, int[] arr) => (()) {
L0:
    %t0 = n:count;
    %t1 = %t0 * 3;
    n:count = %t1;
    arr[0] = 7;
    return;
}
"
    );
}

#[test]
fn object_creation_calls_the_constructor_on_the_new_object() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Node.make", node);
    let ctor = f.interner.intern("Node.init");
    let one = f.int(1);
    let created = f.expr(
        ExprKind::New {
            ctor: Some(ctor),
            args: vec![one],
        },
        node,
    );
    decl.body = f.ret(Some(created));

    let graph = f.lower(&decl, LowerConfig::without_rc()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Node.make() => (Node) {
L0:
    %t0 = Node:create;
    Node.init(%t0, 1);
    return %t0;
}
"
    );

    let bare = f.new_object(node);
    decl.body = f.ret(Some(bare));
    let graph = f.lower(&decl, LowerConfig::without_rc()).unwrap();
    assert_eq!(count(&graph.body, |k| matches!(k, NodeKind::Call(_))), 0);
}

#[test]
fn unsupported_assignments_are_errors() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Node.swap", TypeId::UNIT);
    let a = decl.add_local(f.interner.intern("a"), node);
    let (target, value) = (f.var(&decl, a), f.null(node));
    decl.body = f.assign(target, AssignOp::RefAssign, value);
    assert!(matches!(
        f.lower(&decl, LowerConfig::default()),
        Err(LowerError::Unsupported {
            what: "reference-rebinding assignment",
            ..
        })
    ));

    let pair_ty = f.pool.sequence(vec![TypeId::INT, TypeId::INT]);
    let (x, y) = (f.int(1), f.int(2));
    let target = f.expr(ExprKind::Sequence(vec![x, y]), pair_ty);
    let value = f.expr(ExprKind::Sequence(vec![x, y]), pair_ty);
    decl.body = f.assign(target, AssignOp::Assign, value);
    assert!(matches!(
        f.lower(&decl, LowerConfig::default()),
        Err(LowerError::Unsupported {
            what: "sequence assignment",
            ..
        })
    ));
}

#[test]
fn rejected_input_is_an_upstream_error() {
    let mut f = Fixture::new();
    let mut decl = f.method("Broken.f", TypeId::UNIT);
    let bad = f.expr(ExprKind::Error, TypeId::ERROR);
    decl.body = f.eval(bad);
    let error = f.lower(&decl, LowerConfig::default()).unwrap_err();
    assert!(matches!(error, LowerError::Upstream { .. }));
    assert!(!error.is_fatal());
}

#[test]
fn return_inside_finally_is_unsupported() {
    let mut f = Fixture::new();
    let mut decl = f.method("Calc.odd", TypeId::UNIT);
    let body = f.block(Vec::new());
    let finally = f.ret(None);
    decl.body = f.try_stmt(body, Vec::new(), Some(finally));
    assert!(matches!(
        f.lower(&decl, LowerConfig::default()),
        Err(LowerError::Unsupported {
            what: "return inside a finally block",
            ..
        })
    ));
}

#[test]
fn falling_off_a_valued_method_is_internal() {
    let mut f = Fixture::new();
    let mut decl = f.method("Calc.none", TypeId::INT);
    decl.body = f.block(Vec::new());
    let error = f.lower(&decl, LowerConfig::default()).unwrap_err();
    assert!(matches!(error, LowerError::Internal { .. }));
    assert!(error.is_fatal());
}
