//! Human-readable dump of a method graph, one line per node.
//!
//! ```text
//! method Counter.bump(int n) => (int) {
//!     int total;
//! L0:
//!     %t0 = n + 1;
//!     total = %t0;
//!     goto %t1 ? L1, L2;
//! ...
//! }
//! ```
//!
//! This is a debugging serialization for logs and golden tests, not a
//! stable file format. [`parse_topology`] reads the label and edge markers
//! back.

mod parse;

use std::fmt::{self, Write};

use tac_ir::{Literal, StringInterner, TypeId};
use tac_types::Pool;

use crate::node::{
    Binary, Branch, Call, CallFinally, Catch, CatchPad, CatchRet, ChangeRefCount, CleanupRet,
    Conversion, Load, LocalLoad, LocalStore, NewArray, NewObject, Phi, RcDirection, RcTarget,
    Sequence, SequenceElement, Store, Throw, Unary, UnwindEdge,
};
use crate::{
    Body, LabelId, MethodGraph, NodeId, NodeVisitor, Operand, OperandKind, Reference, RegionId,
    RegionKind,
};

pub use parse::{parse_topology, Topology, TopologyError};

/// Render the method and all of its finally functions.
pub fn render_method(method: &MethodGraph, pool: &Pool, interner: &StringInterner) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_method(&mut out, method, pool, interner);
    out
}

fn write_method(
    out: &mut String,
    method: &MethodGraph,
    pool: &Pool,
    interner: &StringInterner,
) -> fmt::Result {
    let names = Names {
        method,
        pool,
        interner,
    };
    let params: Vec<String> = method
        .params()
        .map(|(_, decl)| {
            format!(
                "{} {}",
                pool.display(decl.ty, interner),
                interner.lookup(decl.name)
            )
        })
        .collect();
    writeln!(
        out,
        "method {}({}) => ({}) {{",
        interner.lookup(method.name),
        params.join(", "),
        pool.display(method.return_type, interner)
    )?;
    for (_, decl) in method.locals_with_ids().filter(|(_, decl)| !decl.is_param) {
        writeln!(
            out,
            "    {} {};",
            pool.display(decl.ty, interner),
            interner.lookup(decl.name)
        )?;
    }
    write_body(out, &names, &method.body)?;
    writeln!(out, "}}")?;

    for finally in &method.finally_functions {
        writeln!(out)?;
        writeln!(out, "finally {}() {{", finally.name)?;
        write_body(out, &names, &finally.body)?;
        writeln!(out, "}}")?;
    }
    Ok(())
}

fn write_body(out: &mut String, names: &Names<'_>, body: &Body) -> fmt::Result {
    let mut renderer = TextRenderer { out, names, body };
    body.accept(&mut renderer)
}

/// Name lookups shared by every body of a method.
struct Names<'a> {
    method: &'a MethodGraph,
    pool: &'a Pool,
    interner: &'a StringInterner,
}

impl Names<'_> {
    fn ty(&self, ty: TypeId) -> String {
        self.pool.display(ty, self.interner)
    }

    fn local(&self, local: tac_ir::LocalId) -> String {
        match self.method.local(local) {
            Some(decl) if decl.name != tac_ir::Name::EMPTY => {
                self.interner.lookup(decl.name).to_owned()
            }
            _ => format!("_{}", local.raw()),
        }
    }

    fn operand(&self, operand: &Operand) -> String {
        match operand.kind {
            OperandKind::Local(local) => self.local(local),
            OperandKind::Temp(temp) => temp.to_string(),
            OperandKind::LabelAddress(label) => format!("&{label}"),
            OperandKind::Literal(literal) => match literal {
                Literal::Int(v) => v.to_string(),
                Literal::Double(v) => format!("{v:?}"),
                Literal::Bool(v) => v.to_string(),
                Literal::Char(c) => format!("'{}'", c.escape_debug()),
                Literal::Str(name) => format!("{:?}", self.interner.lookup(name)),
                Literal::Null => "null".to_owned(),
            },
        }
    }

    fn operands(&self, operands: &[Operand]) -> String {
        operands
            .iter()
            .map(|operand| self.operand(operand))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn reference(&self, reference: &Reference) -> String {
        match reference {
            Reference::Field { object, field, .. } => {
                format!("{}:{}", self.operand(object), self.interner.lookup(*field))
            }
            Reference::Element { array, index, .. } => {
                format!("{}[{}]", self.operand(array), self.operand(index))
            }
        }
    }

    fn finally_name(&self, call: &CallFinally) -> String {
        self.method
            .finally_function(call.finally)
            .map_or_else(|| format!("_finally{}", call.finally.raw()), |f| f.name.clone())
    }
}

struct TextRenderer<'a, 'b> {
    out: &'b mut String,
    names: &'b Names<'a>,
    body: &'b Body,
}

impl TextRenderer<'_, '_> {
    fn line(&mut self, text: fmt::Arguments<'_>) -> fmt::Result {
        writeln!(self.out, "    {text}")
    }

    fn unwind_suffix(&self, unwind: Option<UnwindEdge>) -> String {
        match unwind {
            Some(edge) => format!(
                " to label {} unwind label {}",
                edge.normal,
                self.landing(edge.region)
            ),
            None => String::new(),
        }
    }

    fn landing(&self, region: RegionId) -> String {
        self.body
            .region(region)
            .map_or_else(|| "<no region>".to_owned(), |r| r.landing.to_string())
    }

    fn assign(&mut self, dst: &Operand, value: &str) -> fmt::Result {
        let dst = self.names.operand(dst);
        self.line(format_args!("{dst} = {value};"))
    }
}

impl NodeVisitor for TextRenderer<'_, '_> {
    type Error = fmt::Error;

    fn visit_label(&mut self, _: NodeId, label: LabelId) -> fmt::Result {
        writeln!(self.out, "{label}:")
    }

    fn visit_branch(&mut self, _: NodeId, branch: &Branch) -> fmt::Result {
        match branch {
            Branch::Direct(target) => self.line(format_args!("goto {target};")),
            Branch::Conditional {
                cond,
                if_true,
                if_false,
            } => {
                let cond = self.names.operand(cond);
                self.line(format_args!("goto {cond} ? {if_true}, {if_false};"))
            }
            Branch::Indirect { address, targets } => {
                let address = self.names.operand(address);
                let targets: Vec<String> = targets.iter().map(|t| format!("label {t}")).collect();
                self.line(format_args!("goto phi {address} {};", targets.join(", ")))
            }
        }
    }

    fn visit_call(&mut self, _: NodeId, call: &Call) -> fmt::Result {
        let callee = self.names.interner.lookup(call.callee);
        let args = self.names.operands(&call.args);
        let suffix = self.unwind_suffix(call.unwind);
        match &call.dst {
            Some(dst) => {
                let dst = self.names.operand(dst);
                self.line(format_args!("{dst} = {callee}({args}){suffix};"))
            }
            None => self.line(format_args!("{callee}({args}){suffix};")),
        }
    }

    fn visit_call_finally(&mut self, _: NodeId, call: &CallFinally) -> fmt::Result {
        let name = self.names.finally_name(call);
        let suffix = self.unwind_suffix(call.unwind);
        self.line(format_args!("{name}(){suffix};"))
    }

    fn visit_cast(&mut self, _: NodeId, cast: &Conversion) -> fmt::Result {
        let value = format!(
            "cast<{}>({})",
            self.names.ty(cast.dst.ty),
            self.names.operand(&cast.value)
        );
        self.assign(&cast.dst, &value)
    }

    fn visit_catch(&mut self, _: NodeId, catch: &Catch) -> fmt::Result {
        let value = format!("exception({})", self.names.ty(catch.dst.ty));
        self.assign(&catch.dst, &value)
    }

    fn visit_catch_pad(&mut self, _: NodeId, pad: &CatchPad) -> fmt::Result {
        let ty = self.names.ty(pad.ty);
        self.line(format_args!("catch({ty})"))
    }

    fn visit_catch_ret(&mut self, _: NodeId, ret: &CatchRet) -> fmt::Result {
        self.line(format_args!("catchret to {};", ret.successor))
    }

    fn visit_cleanup_pad(&mut self, _: NodeId, _: RegionId) -> fmt::Result {
        self.line(format_args!("cleanuppad;"))
    }

    fn visit_cleanup_ret(&mut self, _: NodeId, ret: &CleanupRet) -> fmt::Result {
        match ret.unwind {
            Some(region) => {
                let landing = self.landing(region);
                self.line(format_args!("cleanupret unwind label {landing};"))
            }
            None => self.line(format_args!("cleanupret;")),
        }
    }

    fn visit_landing_pad(&mut self, _: NodeId, region: RegionId) -> fmt::Result {
        let Some(region) = self.body.region(region) else {
            return self.line(format_args!("landingpad;"));
        };
        let mut parts: Vec<String> = Vec::new();
        if let RegionKind::Catch { clauses } = &region.kind {
            parts.extend(
                clauses
                    .iter()
                    .map(|c| format!("catch({}) label {}", self.names.ty(c.ty), c.label)),
            );
        }
        let fallback = if region.is_cleanup() { "cleanup" } else { "otherwise" };
        parts.extend(region.fallback.map(|l| format!("{fallback} label {l}")));
        self.line(format_args!("landingpad {};", parts.join(", ")))
    }

    fn visit_load(&mut self, _: NodeId, load: &Load) -> fmt::Result {
        let value = self.names.reference(&load.source);
        self.assign(&load.dst, &value)
    }

    fn visit_store(&mut self, _: NodeId, store: &Store) -> fmt::Result {
        let target = self.names.reference(&store.target);
        let value = self.names.operand(&store.value);
        self.line(format_args!("{target} = {value};"))
    }

    fn visit_local_load(&mut self, _: NodeId, load: &LocalLoad) -> fmt::Result {
        let value = self.names.local(load.local);
        self.assign(&load.dst, &value)
    }

    fn visit_local_store(&mut self, _: NodeId, store: &LocalStore) -> fmt::Result {
        let target = self.names.local(store.local);
        let value = self.names.operand(&store.value);
        self.line(format_args!("{target} = {value};"))
    }

    fn visit_change_ref_count(&mut self, _: NodeId, change: &ChangeRefCount) -> fmt::Result {
        let func = match change.direction {
            RcDirection::Increment => "_IncrementRef",
            RcDirection::Decrement => "_DecrementRef",
        };
        let target = match &change.target {
            RcTarget::Value(value) => self.names.operand(value),
            RcTarget::Slot(slot) => self.names.reference(slot),
        };
        self.line(format_args!("{func}({target});"))
    }

    fn visit_new_object(&mut self, _: NodeId, new: &NewObject) -> fmt::Result {
        let value = format!("{}:create", self.names.ty(new.dst.ty));
        self.assign(&new.dst, &value)
    }

    fn visit_new_array(&mut self, _: NodeId, new: &NewArray) -> fmt::Result {
        let value = format!(
            "{}:create[{}]",
            self.names.ty(new.elem),
            self.names.operand(&new.len)
        );
        self.assign(&new.dst, &value)
    }

    fn visit_phi(&mut self, _: NodeId, phi: &Phi) -> fmt::Result {
        match phi.incoming.as_slice() {
            [] => {
                let dst = self.names.operand(&phi.dst);
                self.line(format_args!("// no values recorded in phi for {dst}"))
            }
            [(_, value)] => {
                let value = self.names.operand(value);
                self.assign(&phi.dst, &value)
            }
            incoming => {
                let arms: Vec<String> = incoming
                    .iter()
                    .map(|(label, value)| format!("[ {}, {label} ]", self.names.operand(value)))
                    .collect();
                let value = format!("phi {}", arms.join(", "));
                self.assign(&phi.dst, &value)
            }
        }
    }

    fn visit_pointer_to_long(&mut self, _: NodeId, conv: &Conversion) -> fmt::Result {
        let value = format!("long({})", self.names.operand(&conv.value));
        self.assign(&conv.dst, &value)
    }

    fn visit_long_to_pointer(&mut self, _: NodeId, conv: &Conversion) -> fmt::Result {
        let value = format!("pointer({})", self.names.operand(&conv.value));
        self.assign(&conv.dst, &value)
    }

    fn visit_resume(&mut self, _: NodeId) -> fmt::Result {
        self.line(format_args!("resume;"))
    }

    fn visit_return(&mut self, _: NodeId, value: Option<&Operand>) -> fmt::Result {
        match value {
            Some(value) => {
                let value = self.names.operand(value);
                self.line(format_args!("return {value};"))
            }
            None => self.line(format_args!("return;")),
        }
    }

    fn visit_sequence(&mut self, _: NodeId, seq: &Sequence) -> fmt::Result {
        let value = format!("({})", self.names.operands(&seq.elements));
        self.assign(&seq.dst, &value)
    }

    fn visit_sequence_element(&mut self, _: NodeId, elem: &SequenceElement) -> fmt::Result {
        let value = format!("{}.{}", self.names.operand(&elem.sequence), elem.index);
        self.assign(&elem.dst, &value)
    }

    fn visit_throw(&mut self, _: NodeId, throw: &Throw) -> fmt::Result {
        let value = self.names.operand(&throw.value);
        match throw.unwind {
            Some(region) => {
                let landing = self.landing(region);
                self.line(format_args!("throw {value} unwind label {landing};"))
            }
            None => self.line(format_args!("throw {value};")),
        }
    }

    fn visit_type_id(&mut self, _: NodeId, query: &Conversion) -> fmt::Result {
        let value = format!("typeid({})", self.names.operand(&query.value));
        self.assign(&query.dst, &value)
    }

    fn visit_unary(&mut self, _: NodeId, unary: &Unary) -> fmt::Result {
        let value = format!("{}{}", unary.op, self.names.operand(&unary.operand));
        self.assign(&unary.dst, &value)
    }

    fn visit_binary(&mut self, _: NodeId, binary: &Binary) -> fmt::Result {
        let value = format!(
            "{} {} {}",
            self.names.operand(&binary.lhs),
            binary.op,
            self.names.operand(&binary.rhs)
        );
        self.assign(&binary.dst, &value)
    }
}

#[cfg(test)]
mod tests;
