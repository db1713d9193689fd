use pretty_assertions::assert_eq;
use tac_graph::node::RcTarget;
use tac_graph::{verify_method, NodeKind, RegionKind};
use tac_ir::{AssignOp, ExprKind, StmtKind, TypeId};

use crate::test_helpers::{count, Fixture};
use crate::LowerConfig;

fn is_rc(kind: &NodeKind) -> bool {
    matches!(kind, NodeKind::ChangeRefCount(_))
}

#[test]
fn store_to_owned_local_increments_new_and_releases_old() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Holder.keep", TypeId::UNIT);
    let n = decl.add_param(f.interner.intern("n"), node);
    let kept = decl.add_local(f.interner.intern("kept"), node);
    let (target, value) = (f.var(&decl, kept), f.var(&decl, n));
    decl.body = f.assign(target, AssignOp::Assign, value);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Holder.keep(Node n) => (()) {
    Node kept;
L1:
    _IncrementRef(n);
    _IncrementRef(n);
    _DecrementRef(kept);
    kept = n;
    _DecrementRef(n);
    _DecrementRef(kept);
    return;
}
"
    );
}

#[test]
fn fresh_call_result_moves_into_the_store() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Holder.fill", TypeId::UNIT);
    let kept = decl.add_local(f.interner.intern("kept"), node);
    let target = f.var(&decl, kept);
    let made = f.call("Factory.make", Vec::new(), node);
    decl.body = f.assign(target, AssignOp::Assign, made);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Holder.fill() => (()) {
    Node kept;
L1:
    %t0 = Factory.make() to label L2 unwind label L0;
L2:
    _DecrementRef(kept);
    kept = %t0;
    _DecrementRef(kept);
    return;
L0:
    landingpad cleanup label L3;
L3:
    cleanuppad;
    _DecrementRef(kept);
    cleanupret;
}
"
    );
}

#[test]
fn discarded_fresh_result_is_released_after_its_call() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Util.touch", TypeId::UNIT);
    let made = f.call("Factory.make", Vec::new(), node);
    decl.body = f.eval(made);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Util.touch() => (()) {
L0:
    %t0 = Factory.make();
    _DecrementRef(%t0);
    return;
}
"
    );
}

#[test]
fn weak_slots_get_no_reference_counting() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let weak_node = f.pool.weak(node);
    let mut decl = f.method("Holder.peek", TypeId::UNIT);
    let n = decl.add_param(f.interner.intern("n"), node);
    let w = decl.add_local(f.interner.intern("w"), weak_node);
    let (target, value) = (f.var(&decl, w), f.var(&decl, n));
    decl.body = f.assign(target, AssignOp::Assign, value);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    // Only the parameter's entry increment and exit release.
    assert_eq!(count(&graph.body, is_rc), 2);
    let touches_weak = graph.body.iter().any(|(_, node)| match &node.kind {
        NodeKind::ChangeRefCount(change) => {
            matches!(change.target, RcTarget::Value(value) if value.as_local() == Some(w))
        }
        _ => false,
    });
    assert!(!touches_weak);
}

#[test]
fn returning_a_parameter_hands_out_a_new_reference() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Holder.same", node);
    let n = decl.add_param(f.interner.intern("n"), node);
    let value = f.var(&decl, n);
    decl.body = f.ret(Some(value));

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Holder.same(Node n) => (Node) {
L1:
    _IncrementRef(n);
    _IncrementRef(n);
    _DecrementRef(n);
    return n;
}
"
    );
}

#[test]
fn field_stores_release_the_old_slot_value() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Node.link", TypeId::UNIT);
    let n = decl.add_param(f.interner.intern("n"), node);
    let m = decl.add_param(f.interner.intern("m"), node);
    let next = f.interner.intern("next");

    let object = f.var(&decl, n);
    let field = f.expr(ExprKind::Field { object, field: next }, node);
    let value = f.var(&decl, m);
    let link = f.assign(field, AssignOp::Assign, value);

    let object = f.var(&decl, n);
    let field = f.expr(ExprKind::Field { object, field: next }, node);
    let null = f.null(node);
    let unlink = f.assign(field, AssignOp::Assign, null);
    decl.body = f.block(vec![link, unlink]);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Node.link(Node n, Node m) => (()) {
L1:
    _IncrementRef(n);
    _IncrementRef(m);
    _IncrementRef(m);
    _DecrementRef(n:next);
    n:next = m;
    _DecrementRef(n:next);
    n:next = null;
    _DecrementRef(n);
    _DecrementRef(m);
    return;
}
"
    );
}

#[test]
fn phi_of_borrowed_and_fresh_values_owns_both() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Pick.one", node);
    let c = decl.add_param(f.interner.intern("c"), TypeId::BOOL);
    let a = decl.add_param(f.interner.intern("a"), node);
    let cond = f.var(&decl, c);
    let then_expr = f.var(&decl, a);
    let else_expr = f.call("Factory.make", Vec::new(), node);
    let picked = f.expr(
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        },
        node,
    );
    decl.body = f.ret(Some(picked));

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Pick.one(bool c, Node a) => (Node) {
L1:
    _IncrementRef(a);
    goto c ? L2, L3;
L2:
    %t0 = a;
    _IncrementRef(%t0);
    goto L4;
L3:
    %t1 = Factory.make() to label L5 unwind label L0;
L5:
    goto L4;
L4:
    %t2 = phi [ %t0, L2 ], [ %t1, L5 ];
    _DecrementRef(a);
    return %t2;
L0:
    landingpad cleanup label L6;
L6:
    cleanuppad;
    _DecrementRef(a);
    cleanupret;
}
"
    );
}

#[test]
fn thrown_parameter_is_incremented_before_it_leaves() {
    let mut f = Fixture::new();
    let io_error = f.exception("IoError");
    let mut decl = f.method("Err.raise", TypeId::UNIT);
    let e = decl.add_param(f.interner.intern("e"), io_error);
    let value = f.var(&decl, e);
    decl.body = f.stmt(StmtKind::Throw(value));

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Err.raise(IoError e) => (()) {
L1:
    _IncrementRef(e);
    _IncrementRef(e);
    throw e unwind label L0;
L0:
    landingpad cleanup label L2;
L2:
    cleanuppad;
    _DecrementRef(e);
    cleanupret;
}
"
    );
}

#[test]
fn unbound_caught_exception_is_released() {
    let mut f = Fixture::new();
    let io_error = f.exception("IoError");
    let mut decl = f.method("Worker.run", TypeId::UNIT);
    let read = f.call("Io.read", Vec::new(), TypeId::UNIT);
    let body = f.eval(read);
    let handler = f.block(Vec::new());
    decl.body = f.try_stmt(body, vec![Fixture::catch(io_error, None, handler)], None);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    let text = f.render(&graph);
    assert!(
        text.contains("    %t0 = exception(IoError);\n    _DecrementRef(%t0);\n"),
        "unexpected graph:\n{text}"
    );
}

#[test]
fn finally_bodies_get_store_rc_but_no_exit_releases() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Holder.guard", TypeId::UNIT);
    let kept = decl.add_local(f.interner.intern("kept"), node);
    let work = f.call("A.f", Vec::new(), TypeId::UNIT);
    let body = f.eval(work);
    let (target, null) = (f.var(&decl, kept), f.null(node));
    let finally = f.assign(target, AssignOp::Assign, null);
    decl.body = f.try_stmt(body, Vec::new(), Some(finally));

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    let text = f.render(&graph);
    assert!(
        text.ends_with(
            "\
finally _finally0_Holder_guard() {
L0:
    _DecrementRef(kept);
    kept = null;
    return;
}
"
        ),
        "unexpected graph:\n{text}"
    );
}

#[test]
fn without_rc_leaves_the_graph_untouched() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Holder.keep", TypeId::UNIT);
    let n = decl.add_param(f.interner.intern("n"), node);
    let kept = decl.add_local(f.interner.intern("kept"), node);
    let (target, value) = (f.var(&decl, kept), f.var(&decl, n));
    decl.body = f.assign(target, AssignOp::Assign, value);

    let graph = f.lower(&decl, LowerConfig::without_rc()).unwrap();
    assert_eq!(count(&graph.body, is_rc), 0);
}

#[test]
fn field_of_a_fresh_object_is_retained_before_the_object_is_released() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Holder.fill", TypeId::UNIT);
    let kept = decl.add_local(f.interner.intern("kept"), node);
    let target = f.var(&decl, kept);
    let made = f.call("Factory.make", Vec::new(), node);
    let next = f.interner.intern("next");
    let field = f.expr(
        ExprKind::Field {
            object: made,
            field: next,
        },
        node,
    );
    decl.body = f.assign(target, AssignOp::Assign, field);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Holder.fill() => (()) {
    Node kept;
L1:
    %t0 = Factory.make() to label L2 unwind label L0;
L2:
    %t1 = %t0:next;
    _IncrementRef(%t1);
    _DecrementRef(%t0);
    _DecrementRef(kept);
    kept = %t1;
    _DecrementRef(kept);
    return;
L0:
    landingpad cleanup label L3;
L3:
    cleanuppad;
    _DecrementRef(kept);
    cleanupret;
}
"
    );
}

#[test]
fn member_of_a_fresh_sequence_is_retained_before_the_sequence_is_released() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let pair = f.pool.sequence(vec![node, node]);
    let mut decl = f.method("Pair.first", node);
    let a = decl.add_param(f.interner.intern("a"), node);
    let b = decl.add_param(f.interner.intern("b"), node);
    let (a, b) = (f.var(&decl, a), f.var(&decl, b));
    let sequence = f.expr(ExprKind::Sequence(vec![a, b]), pair);
    let first = f.expr(ExprKind::Element { sequence, index: 0 }, node);
    decl.body = f.ret(Some(first));

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Pair.first(Node a, Node b) => (Node) {
L1:
    _IncrementRef(a);
    _IncrementRef(b);
    _IncrementRef(a);
    _IncrementRef(b);
    %t0 = (a, b);
    %t1 = %t0.0;
    _IncrementRef(%t1);
    _DecrementRef(%t0);
    _DecrementRef(a);
    _DecrementRef(b);
    return %t1;
}
"
    );
}

#[test]
fn fresh_argument_is_released_when_the_call_unwinds() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Util.pass", TypeId::UNIT);
    let made = f.call("Factory.make", Vec::new(), node);
    let take = f.call("Sink.take", vec![made], TypeId::UNIT);
    decl.body = f.eval(take);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Util.pass() => (()) {
L0:
    %t0 = Factory.make();
    Sink.take(%t0) to label L1 unwind label L2;
L1:
    _DecrementRef(%t0);
    return;
L2:
    landingpad cleanup label L3;
L3:
    cleanuppad;
    _DecrementRef(%t0);
    cleanupret;
}
"
    );
    assert!(verify_method(&graph).is_ok());
}

#[test]
fn new_object_is_released_when_its_constructor_or_consumer_unwinds() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Holder.pass", TypeId::UNIT);
    decl.add_local(f.interner.intern("kept"), node);
    let ctor = f.interner.intern("Node.init");
    let created = f.expr(
        ExprKind::New {
            ctor: Some(ctor),
            args: Vec::new(),
        },
        node,
    );
    let take = f.call("Sink.take", vec![created], TypeId::UNIT);
    decl.body = f.eval(take);

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(
        f.render(&graph),
        "\
method Holder.pass() => (()) {
    Node kept;
L1:
    %t0 = Node:create;
    Node.init(%t0) to label L2 unwind label L5;
L2:
    Sink.take(%t0) to label L3 unwind label L7;
L3:
    _DecrementRef(%t0);
    _DecrementRef(kept);
    return;
L0:
    landingpad cleanup label L4;
L4:
    cleanuppad;
    _DecrementRef(kept);
    cleanupret;
L5:
    landingpad cleanup label L6;
L6:
    cleanuppad;
    _DecrementRef(%t0);
    cleanupret unwind label L0;
L7:
    landingpad cleanup label L8;
L8:
    cleanuppad;
    _DecrementRef(%t0);
    cleanupret unwind label L0;
}
"
    );
    let release_parents: Vec<_> = graph
        .body
        .regions()
        .filter(|(_, region)| region.kind == RegionKind::Release)
        .map(|(_, region)| region.parent)
        .collect();
    assert_eq!(release_parents.len(), 2);
    assert!(release_parents.iter().all(Option::is_some));
}

#[test]
fn splitting_a_block_for_an_unwind_edge_keeps_phis_consistent() {
    let mut f = Fixture::new();
    let node = f.class("Node");
    let mut decl = f.method("Pick.two", node);
    let c = decl.add_param(f.interner.intern("c"), TypeId::BOOL);
    let cond = f.var(&decl, c);
    let then_expr = f.call("Factory.make", Vec::new(), node);
    let inner = f.call("Factory.make", Vec::new(), node);
    let else_expr = f.call("Wrap.copy", vec![inner], node);
    let picked = f.expr(
        ExprKind::Conditional {
            cond,
            then_expr,
            else_expr,
        },
        node,
    );
    decl.body = f.ret(Some(picked));

    let graph = f.lower(&decl, LowerConfig::default()).unwrap();
    assert_eq!(verify_method(&graph), Ok(()), "{}", f.render(&graph));

    let copy = f.interner.intern("Wrap.copy");
    let (argument, edge) = graph
        .body
        .iter()
        .find_map(|(_, node)| match &node.kind {
            NodeKind::Call(call) if call.callee == copy => Some((call.args[0], call.unwind?)),
            _ => None,
        })
        .unwrap();
    let pad = graph
        .body
        .iter()
        .find(|(_, node)| node.kind == NodeKind::CleanupPad { region: edge.region })
        .map(|(id, _)| id)
        .unwrap();
    let mut released = Vec::new();
    let mut cursor = graph.body.node(pad).next();
    while let Some(id) = cursor {
        let NodeKind::ChangeRefCount(change) = graph.body.kind(id) else {
            break;
        };
        released.push(change.target.clone());
        cursor = graph.body.node(id).next();
    }
    assert_eq!(released, vec![RcTarget::Value(argument)]);
}
