//! Per-method graph and its finally-function side table.

use tac_ir::{LocalDecl, LocalId, Name, TypeId};

use crate::{Body, FinallyId};

/// Name of the out-of-line function holding finally block `index` of a
/// method: `_finally<index>_<mangled>`.
pub fn finally_function_name(index: u32, mangled: &str) -> String {
    format!("_finally{index}_{mangled}")
}

/// Out-of-line body of one `finally` block.
///
/// A self-contained mini method: its own labels, nodes and regions, no
/// parameters, no result. It reads and writes the enclosing method's locals.
#[derive(Clone, Debug, PartialEq)]
pub struct FinallyFunction {
    pub id: FinallyId,
    pub name: String,
    pub body: Body,
}

/// Lowered form of one method.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodGraph {
    pub name: Name,
    pub mangled: Name,
    /// Parameters, declared locals, then synthetic slots added by lowering.
    pub locals: Vec<LocalDecl>,
    pub return_type: TypeId,
    pub body: Body,
    pub finally_functions: Vec<FinallyFunction>,
}

impl MethodGraph {
    pub fn new(name: Name, mangled: Name, locals: Vec<LocalDecl>, return_type: TypeId) -> Self {
        MethodGraph {
            name,
            mangled,
            locals,
            return_type,
            body: Body::new(),
            finally_functions: Vec::new(),
        }
    }

    pub fn local(&self, id: LocalId) -> Option<&LocalDecl> {
        self.locals.get(id.index())
    }

    pub fn finally_function(&self, id: FinallyId) -> Option<&FinallyFunction> {
        self.finally_functions.get(id.index())
    }

    pub fn params(&self) -> impl Iterator<Item = (LocalId, &LocalDecl)> {
        self.locals_with_ids().filter(|(_, decl)| decl.is_param)
    }

    pub fn locals_with_ids(&self) -> impl Iterator<Item = (LocalId, &LocalDecl)> {
        self.locals
            .iter()
            .enumerate()
            .map(|(idx, decl)| (LocalId::new(crate::ids::next_index(idx, "local table")), decl))
    }

    /// Every body of the method: the main body first, then finally
    /// functions in table order, each with its display name.
    pub fn bodies<'a>(&'a self, method_name: &'a str) -> impl Iterator<Item = (&'a str, &'a Body)> {
        std::iter::once((method_name, &self.body)).chain(
            self.finally_functions
                .iter()
                .map(|finally| (finally.name.as_str(), &finally.body)),
        )
    }
}
