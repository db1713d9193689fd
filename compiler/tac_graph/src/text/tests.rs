use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use tac_ir::{BinaryOp, LocalDecl, LocalId, Name, StringInterner, TypeId};
use tac_types::Pool;

use super::*;
use crate::node::{Call, Catch, CatchPad, CatchRet, Phi, UnwindEdge};
use crate::test_helpers::{boolean, fill, goto, int, labels, t};
use crate::{
    finally_function_name, Branch, CatchTarget, FinallyFunction, FinallyId, NodeKind,
    ProtectedRegion, TempId,
};

fn counter_bump(interner: &StringInterner) -> MethodGraph {
    let locals = vec![
        LocalDecl {
            name: interner.intern("n"),
            ty: TypeId::INT,
            is_param: true,
        },
        LocalDecl {
            name: interner.intern("total"),
            ty: TypeId::INT,
            is_param: false,
        },
    ];
    let mut method = MethodGraph::new(
        interner.intern("Counter.bump"),
        interner.intern("Counter_bump"),
        locals,
        TypeId::INT,
    );
    let body = &mut method.body;
    let l = labels(body, 4);
    fill(
        body,
        vec![
            NodeKind::Label(l[0]),
            NodeKind::Binary(crate::node::Binary {
                dst: t(0),
                op: BinaryOp::Add,
                lhs: Operand::local(LocalId::new(0), TypeId::INT),
                rhs: int(1),
            }),
            NodeKind::LocalStore(crate::node::LocalStore {
                local: LocalId::new(1),
                value: t(0),
                rc: crate::RcFlags::default(),
            }),
            NodeKind::Branch(Branch::Conditional {
                cond: boolean(true),
                if_true: l[1],
                if_false: l[2],
            }),
            NodeKind::Label(l[1]),
            goto(l[3]),
            NodeKind::Label(l[2]),
            goto(l[3]),
            NodeKind::Label(l[3]),
            NodeKind::Phi(Phi {
                dst: t(1),
                incoming: vec![(l[1], int(1)), (l[2], int(2))],
            }),
            NodeKind::Return(Some(t(1))),
        ],
    );
    method
}

/// `try { Foo.bar(); } catch (IoError e) { } finally { }` in lowered form.
fn worker_run(interner: &StringInterner, pool: &mut Pool) -> MethodGraph {
    let io_error = pool.exception_class(interner.intern("IoError"), None);
    let mut method = MethodGraph::new(
        interner.intern("Worker.run"),
        interner.intern("Worker_run"),
        Vec::new(),
        TypeId::UNIT,
    );
    let body = &mut method.body;
    let l = labels(body, 6);
    let mut region = ProtectedRegion::new(
        RegionKind::Catch {
            clauses: vec![CatchTarget {
                ty: io_error,
                label: l[3],
            }],
        },
        l[2],
        None,
    );
    region.fallback = Some(l[5]);
    region.used = true;
    let region = body.add_region(region);
    fill(
        body,
        vec![
            NodeKind::Label(l[0]),
            NodeKind::Call(Call {
                dst: None,
                callee: interner.intern("Foo.bar"),
                args: Vec::new(),
                nounwind: false,
                unwind: Some(UnwindEdge {
                    normal: l[1],
                    region,
                }),
            }),
            NodeKind::Label(l[1]),
            goto(l[4]),
            NodeKind::Label(l[2]),
            NodeKind::LandingPad { region },
            NodeKind::Label(l[3]),
            NodeKind::CatchPad(CatchPad { region, ty: io_error }),
            NodeKind::Catch(Catch {
                dst: Operand::temp(TempId::new(0), io_error),
                pad: NodeId::new(7),
            }),
            NodeKind::CatchRet(CatchRet {
                pad: NodeId::new(7),
                successor: l[4],
            }),
            NodeKind::Label(l[4]),
            NodeKind::CallFinally(crate::node::CallFinally {
                finally: FinallyId::new(0),
                unwind: None,
            }),
            NodeKind::Return(None),
            NodeKind::Label(l[5]),
            NodeKind::Resume,
        ],
    );

    let mut finally_body = Body::new();
    let fl = labels(&mut finally_body, 1);
    fill(
        &mut finally_body,
        vec![NodeKind::Label(fl[0]), NodeKind::Return(None)],
    );
    method.finally_functions.push(FinallyFunction {
        id: FinallyId::new(0),
        name: finally_function_name(0, "Worker_run"),
        body: finally_body,
    });
    method
}

#[test]
fn renders_header_locals_and_nodes() {
    let interner = StringInterner::new();
    let pool = Pool::new(&interner);
    let method = counter_bump(&interner);
    let expected = "\
method Counter.bump(int n) => (int) {
    int total;
L0:
    %t0 = n + 1;
    total = %t0;
    goto true ? L1, L2;
L1:
    goto L3;
L2:
    goto L3;
L3:
    %t1 = phi [ 1, L1 ], [ 2, L2 ];
    return %t1;
}
";
    assert_eq!(render_method(&method, &pool, &interner), expected);
}

#[test]
fn renders_exception_handling_forms() {
    let interner = StringInterner::new();
    let mut pool = Pool::new(&interner);
    let method = worker_run(&interner, &mut pool);
    let text = render_method(&method, &pool, &interner);
    for line in [
        "method Worker.run() => (()) {",
        "    Foo.bar() to label L1 unwind label L2;",
        "    landingpad catch(IoError) label L3, otherwise label L5;",
        "    catch(IoError)",
        "    %t0 = exception(IoError);",
        "    catchret to L4;",
        "    _finally0_Worker_run();",
        "    resume;",
        "finally _finally0_Worker_run() {",
    ] {
        assert!(
            text.lines().any(|l| l == line),
            "missing `{line}` in:\n{text}"
        );
    }
}

#[test]
fn single_input_phi_renders_as_copy() {
    let interner = StringInterner::new();
    let pool = Pool::new(&interner);
    let mut method = MethodGraph::new(Name::EMPTY, Name::EMPTY, Vec::new(), TypeId::INT);
    let l = labels(&mut method.body, 2);
    fill(
        &mut method.body,
        vec![
            NodeKind::Label(l[0]),
            goto(l[1]),
            NodeKind::Label(l[1]),
            NodeKind::Phi(Phi {
                dst: t(4),
                incoming: vec![(l[0], int(7))],
            }),
            NodeKind::Return(Some(t(4))),
        ],
    );
    let text = render_method(&method, &pool, &interner);
    assert!(text.contains("    %t4 = 7;\n"), "{text}");
}

#[test]
fn topology_survives_render_and_parse() {
    let interner = StringInterner::new();
    let mut pool = Pool::new(&interner);
    for method in [counter_bump(&interner), worker_run(&interner, &mut pool)] {
        let text = render_method(&method, &pool, &interner);
        let parsed = parse_topology(&text).unwrap_or_else(|e| panic!("{e}\n{text}"));
        assert_eq!(parsed, Topology::of_method(&method, &interner));
    }
}

#[test]
fn parsed_topology_records_unwind_and_catchret_edges() {
    let interner = StringInterner::new();
    let mut pool = Pool::new(&interner);
    let method = worker_run(&interner, &mut pool);
    let parsed = parse_topology(&render_method(&method, &pool, &interner))
        .unwrap_or_else(|e| panic!("{e}"));

    let preds = |label: &str| -> Vec<String> {
        parsed
            .predecessors("Worker.run", label)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    };
    assert_eq!(preds("L2"), vec!["L0"]);
    assert_eq!(preds("L3"), vec!["L2"]);
    assert_eq!(preds("L4"), vec!["L1", "L3"]);
    assert_eq!(preds("L5"), vec!["L2"]);
    assert!(parsed
        .predecessors("_finally0_Worker_run", "L0")
        .is_some_and(BTreeSet::is_empty));
}

#[test]
fn malformed_dumps_are_rejected() {
    assert_eq!(
        parse_topology("method m() => (()) {\nL0:\n    goto nowhere;\n}\n"),
        Err(TopologyError::MalformedEdge {
            line: 3,
            text: "goto nowhere;".to_owned(),
        })
    );
    assert_eq!(
        parse_topology("method m() => (()) {\nL0:\n    return;\n"),
        Err(TopologyError::UnclosedFunction {
            name: "m".to_owned()
        })
    );
    assert_eq!(
        parse_topology("return;\n"),
        Err(TopologyError::OutsideFunction {
            line: 1,
            text: "return;".to_owned(),
        })
    );
}
