//! Typed syntax tree: the lowering engine's input boundary.
//!
//! The parser and type checker are external collaborators. By the time a
//! tree lands here every [`Expr`] has a resolved [`TypeId`] and every name
//! expression a resolved [`Binding`]. Expressions and statements live in a
//! flat [`SyntaxArena`] and refer to each other by index.

use crate::{AssignOp, BinaryOp, LogicalOp, Name, Span, TypeId, UnaryOp};

macro_rules! syntax_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

syntax_index!(
    /// Index of an [`Expr`] in a [`SyntaxArena`].
    ExprId
);
syntax_index!(
    /// Index of a [`Stmt`] in a [`SyntaxArena`].
    StmtId
);
syntax_index!(
    /// Index into a method's local table (parameters included).
    LocalId
);

// ── Expressions ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Literal {
    Int(i64),
    Double(f64),
    Bool(bool),
    Char(char),
    Str(Name),
    Null,
}

/// What a name expression was resolved to by the checker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    Local(LocalId),
    Param(LocalId),
    /// Field of the receiver (`this`) of the enclosing method.
    Field { field: Name },
}

/// Explicit pointer/integer reinterpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversionKind {
    PointerToLong,
    LongToPointer,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Name {
        name: Name,
        binding: Binding,
    },
    /// Flat operator chain `a op0 b op1 c ...`, evaluated left to right.
    ///
    /// `ops.len() == operands.len() - 1`.
    Chain {
        operands: Vec<ExprId>,
        ops: Vec<BinaryOp>,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Logical {
        op: LogicalOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    /// `cond ? then_expr : else_expr`
    Conditional {
        cond: ExprId,
        then_expr: ExprId,
        else_expr: ExprId,
    },
    Call {
        /// Fully qualified method name, e.g. `Console.print`.
        callee: Name,
        receiver: Option<ExprId>,
        args: Vec<ExprId>,
        /// The checker proved the callee cannot raise.
        nounwind: bool,
    },
    Field {
        object: ExprId,
        field: Name,
    },
    Index {
        array: ExprId,
        index: ExprId,
    },
    /// Object creation. The expression type is the class being created.
    New {
        ctor: Option<Name>,
        args: Vec<ExprId>,
    },
    /// Array creation. The expression type is the array type.
    NewArray {
        len: ExprId,
    },
    /// Checked conversion to the expression's type.
    Cast {
        operand: ExprId,
    },
    /// Runtime type descriptor of the operand.
    TypeOf {
        operand: ExprId,
    },
    Convert {
        kind: ConversionKind,
        operand: ExprId,
    },
    /// Tuple-like sequence value `(a, b, ...)`.
    Sequence(Vec<ExprId>),
    /// Element `index` of a sequence value.
    Element {
        sequence: ExprId,
        index: u32,
    },
    /// Node the checker rejected but still handed over.
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub span: Span,
}

// ── Statements ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    /// Declared exception type.
    pub ty: TypeId,
    /// Local receiving the caught exception, if named.
    pub binding: Option<LocalId>,
    pub body: StmtId,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Expr(ExprId),
    /// Local declaration with optional initializer.
    Local {
        local: LocalId,
        init: Option<ExprId>,
    },
    Assign {
        target: ExprId,
        op: AssignOp,
        value: ExprId,
    },
    If {
        cond: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    While {
        cond: ExprId,
        body: StmtId,
    },
    Block(Vec<StmtId>),
    Try {
        body: StmtId,
        catches: Vec<CatchClause>,
        finally: Option<StmtId>,
    },
    Throw(ExprId),
    Return(Option<ExprId>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

// ── Methods ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalDecl {
    pub name: Name,
    pub ty: TypeId,
    pub is_param: bool,
}

/// One method body ready for lowering.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodDecl {
    /// Display name, e.g. `Counter.bump`.
    pub name: Name,
    /// Mangled name used for finally-function naming.
    pub mangled: Name,
    /// Parameters first, then declared locals.
    pub locals: Vec<LocalDecl>,
    /// Receiver parameter for instance methods.
    pub this: Option<LocalId>,
    pub return_type: TypeId,
    pub body: StmtId,
    pub span: Span,
}

impl MethodDecl {
    /// Create a method with an empty local table.
    pub fn new(name: Name, mangled: Name, return_type: TypeId, body: StmtId) -> Self {
        MethodDecl {
            name,
            mangled,
            locals: Vec::new(),
            this: None,
            return_type,
            body,
            span: Span::DUMMY,
        }
    }

    pub fn add_param(&mut self, name: Name, ty: TypeId) -> LocalId {
        self.push_local(LocalDecl {
            name,
            ty,
            is_param: true,
        })
    }

    pub fn add_local(&mut self, name: Name, ty: TypeId) -> LocalId {
        self.push_local(LocalDecl {
            name,
            ty,
            is_param: false,
        })
    }

    pub fn local(&self, id: LocalId) -> &LocalDecl {
        &self.locals[id.index()]
    }

    fn push_local(&mut self, decl: LocalDecl) -> LocalId {
        let id = LocalId::new(
            u32::try_from(self.locals.len())
                .unwrap_or_else(|_| panic!("local table exceeds u32::MAX entries")),
        );
        self.locals.push(decl);
        id
    }
}

// ── Arena ───────────────────────────────────────────────────────────

/// Flat storage for the expressions and statements of a compilation unit.
#[derive(Clone, Debug, Default)]
pub struct SyntaxArena {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
}

impl SyntaxArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_expr(&mut self, kind: ExprKind, ty: TypeId, span: Span) -> ExprId {
        let id = ExprId::new(
            u32::try_from(self.exprs.len())
                .unwrap_or_else(|_| panic!("expression arena exceeds u32::MAX entries")),
        );
        self.exprs.push(Expr { kind, ty, span });
        id
    }

    pub fn alloc_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        let id = StmtId::new(
            u32::try_from(self.stmts.len())
                .unwrap_or_else(|_| panic!("statement arena exceeds u32::MAX entries")),
        );
        self.stmts.push(Stmt { kind, span });
        id
    }

    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    #[inline]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }
}

#[cfg(test)]
mod tests;
