use super::expr::{Expr, LocalVar, Stmt};
use super::type_inference::VariableBinding;

/// Offset range of the instructions a statement came from, plus its first source line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceSpan {
    pub start: u32,
    /// Offset of the last contributing instruction.
    pub end: u32,
    pub line: Option<u32>,
}

/// A structured statement produced by control flow structuring.
/// Represents Java-level control flow constructs. Every nested body is a
/// statement list.
#[derive(Clone, Debug, PartialEq)]
pub enum StructuredStmt {
    /// A simple statement (from stack simulation).
    Simple { stmt: Stmt, span: Option<SourceSpan> },
    /// A nested scope.
    Block(Vec<StructuredStmt>),
    /// if / if-else
    If {
        condition: Expr,
        then_body: Vec<StructuredStmt>,
        else_body: Option<Vec<StructuredStmt>>,
    },
    While {
        condition: Expr,
        body: Vec<StructuredStmt>,
    },
    DoWhile {
        body: Vec<StructuredStmt>,
        condition: Expr,
    },
    For {
        init: Vec<StructuredStmt>,
        condition: Expr,
        update: Vec<StructuredStmt>,
        body: Vec<StructuredStmt>,
    },
    /// for-each loop (desugared from iterator or array index pattern)
    ForEach {
        var: LocalVar,
        iterable: Expr,
        body: Vec<StructuredStmt>,
    },
    Switch {
        expr: Expr,
        kind: SwitchKind,
        cases: Vec<SwitchCase>,
    },
    TryCatch {
        try_body: Vec<StructuredStmt>,
        catches: Vec<CatchClause>,
        finally_body: Option<Vec<StructuredStmt>>,
    },
    /// try-with-resources (desugared)
    TryWithResources {
        resources: Vec<(LocalVar, Expr)>,
        body: Vec<StructuredStmt>,
        catches: Vec<CatchClause>,
        finally_body: Option<Vec<StructuredStmt>>,
    },
    Synchronized {
        object: Expr,
        body: Vec<StructuredStmt>,
    },
    /// Labeled statement (for break/continue targets)
    Labeled {
        label: String,
        body: Vec<StructuredStmt>,
    },
    Break { label: Option<String> },
    Continue { label: Option<String> },
    /// assert statement (desugared)
    Assert {
        condition: Expr,
        message: Option<Expr>,
    },
    /// Jump that no structured construct could express; target is a bytecode offset.
    UnstructuredGoto { target: u32 },
    /// A block left over from an unstructurable region, reachable only by goto.
    UnstructuredBlock {
        label: String,
        body: Vec<StructuredStmt>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchKind {
    Int,
    String,
    Enum,
}

/// A switch case arm.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<SwitchValue>,
    pub is_default: bool,
    pub body: Vec<StructuredStmt>,
    pub falls_through: bool,
}

/// Value for a switch case label.
#[derive(Clone, Debug, PartialEq)]
pub enum SwitchValue {
    Int(i32),
    String(String),
    Enum { type_name: String, const_name: String },
}

/// A catch clause in a try-catch. Several types make a multi-catch.
#[derive(Clone, Debug, PartialEq)]
pub struct CatchClause {
    /// Internal names; `java/lang/Throwable` for catch-all handlers.
    pub exception_types: Vec<String>,
    /// `None` when the handler discards the exception.
    pub var: Option<LocalVar>,
    pub body: Vec<StructuredStmt>,
}

impl StructuredStmt {
    pub fn simple(stmt: Stmt) -> Self {
        StructuredStmt::Simple { stmt, span: None }
    }

    pub fn as_simple(&self) -> Option<&Stmt> {
        match self {
            StructuredStmt::Simple { stmt, .. } => Some(stmt),
            _ => None,
        }
    }

    /// Nested statement lists, in source order.
    pub fn bodies(&self) -> Vec<&Vec<StructuredStmt>> {
        match self {
            StructuredStmt::Simple { .. }
            | StructuredStmt::Break { .. }
            | StructuredStmt::Continue { .. }
            | StructuredStmt::Assert { .. }
            | StructuredStmt::UnstructuredGoto { .. } => Vec::new(),
            StructuredStmt::Block(body)
            | StructuredStmt::While { body, .. }
            | StructuredStmt::DoWhile { body, .. }
            | StructuredStmt::ForEach { body, .. }
            | StructuredStmt::Synchronized { body, .. }
            | StructuredStmt::Labeled { body, .. }
            | StructuredStmt::UnstructuredBlock { body, .. } => vec![body],
            StructuredStmt::If {
                then_body, else_body, ..
            } => {
                let mut all = vec![then_body];
                all.extend(else_body.iter());
                all
            }
            StructuredStmt::For { init, update, body, .. } => vec![init, body, update],
            StructuredStmt::Switch { cases, .. } => cases.iter().map(|c| &c.body).collect(),
            StructuredStmt::TryCatch {
                try_body,
                catches,
                finally_body,
            } => {
                let mut all = vec![try_body];
                all.extend(catches.iter().map(|c| &c.body));
                all.extend(finally_body.iter());
                all
            }
            StructuredStmt::TryWithResources {
                body,
                catches,
                finally_body,
                ..
            } => {
                let mut all = vec![body];
                all.extend(catches.iter().map(|c| &c.body));
                all.extend(finally_body.iter());
                all
            }
        }
    }

    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<StructuredStmt>> {
        match self {
            StructuredStmt::Simple { .. }
            | StructuredStmt::Break { .. }
            | StructuredStmt::Continue { .. }
            | StructuredStmt::Assert { .. }
            | StructuredStmt::UnstructuredGoto { .. } => Vec::new(),
            StructuredStmt::Block(body)
            | StructuredStmt::While { body, .. }
            | StructuredStmt::DoWhile { body, .. }
            | StructuredStmt::ForEach { body, .. }
            | StructuredStmt::Synchronized { body, .. }
            | StructuredStmt::Labeled { body, .. }
            | StructuredStmt::UnstructuredBlock { body, .. } => vec![body],
            StructuredStmt::If {
                then_body, else_body, ..
            } => {
                let mut all = vec![then_body];
                all.extend(else_body.iter_mut());
                all
            }
            StructuredStmt::For { init, update, body, .. } => vec![init, body, update],
            StructuredStmt::Switch { cases, .. } => cases.iter_mut().map(|c| &mut c.body).collect(),
            StructuredStmt::TryCatch {
                try_body,
                catches,
                finally_body,
            } => {
                let mut all = vec![try_body];
                all.extend(catches.iter_mut().map(|c| &mut c.body));
                all.extend(finally_body.iter_mut());
                all
            }
            StructuredStmt::TryWithResources {
                body,
                catches,
                finally_body,
                ..
            } => {
                let mut all = vec![body];
                all.extend(catches.iter_mut().map(|c| &mut c.body));
                all.extend(finally_body.iter_mut());
                all
            }
        }
    }

    /// Expressions owned by this statement itself, not by its nested bodies.
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            StructuredStmt::Simple { stmt, .. } => stmt.exprs(),
            StructuredStmt::If { condition, .. }
            | StructuredStmt::While { condition, .. }
            | StructuredStmt::DoWhile { condition, .. }
            | StructuredStmt::For { condition, .. } => vec![condition],
            StructuredStmt::ForEach { iterable, .. } => vec![iterable],
            StructuredStmt::Switch { expr, .. } => vec![expr],
            StructuredStmt::Synchronized { object, .. } => vec![object],
            StructuredStmt::TryWithResources { resources, .. } => resources.iter().map(|(_, e)| e).collect(),
            StructuredStmt::Assert { condition, message } => {
                let mut all = vec![condition];
                all.extend(message.iter());
                all
            }
            _ => Vec::new(),
        }
    }

    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            StructuredStmt::Simple { stmt, .. } => stmt.exprs_mut(),
            StructuredStmt::If { condition, .. }
            | StructuredStmt::While { condition, .. }
            | StructuredStmt::DoWhile { condition, .. }
            | StructuredStmt::For { condition, .. } => vec![condition],
            StructuredStmt::ForEach { iterable, .. } => vec![iterable],
            StructuredStmt::Switch { expr, .. } => vec![expr],
            StructuredStmt::Synchronized { object, .. } => vec![object],
            StructuredStmt::TryWithResources { resources, .. } => resources.iter_mut().map(|(_, e)| e).collect(),
            StructuredStmt::Assert { condition, message } => {
                let mut all = vec![condition];
                all.extend(message.iter_mut());
                all
            }
            _ => Vec::new(),
        }
    }

    /// Variables declared or written by this statement itself.
    pub fn own_vars_mut(&mut self) -> Vec<&mut LocalVar> {
        match self {
            StructuredStmt::Simple { stmt, .. } => stmt.target_var_mut().into_iter().collect(),
            StructuredStmt::ForEach { var, .. } => vec![var],
            StructuredStmt::TryCatch { catches, .. } => catches.iter_mut().filter_map(|c| c.var.as_mut()).collect(),
            StructuredStmt::TryWithResources { resources, catches, .. } => {
                let mut all: Vec<&mut LocalVar> = resources.iter_mut().map(|(v, _)| v).collect();
                all.extend(catches.iter_mut().filter_map(|c| c.var.as_mut()));
                all
            }
            _ => Vec::new(),
        }
    }

    pub fn own_vars(&self) -> Vec<&LocalVar> {
        match self {
            StructuredStmt::Simple { stmt, .. } => stmt.target_var().into_iter().collect(),
            StructuredStmt::ForEach { var, .. } => vec![var],
            StructuredStmt::TryCatch { catches, .. } => catches.iter().filter_map(|c| c.var.as_ref()).collect(),
            StructuredStmt::TryWithResources { resources, catches, .. } => {
                let mut all: Vec<&LocalVar> = resources.iter().map(|(v, _)| v).collect();
                all.extend(catches.iter().filter_map(|c| c.var.as_ref()));
                all
            }
            _ => Vec::new(),
        }
    }

    /// The statement itself (not its bodies) reads or writes `var`.
    pub fn header_mentions(&self, var: &LocalVar) -> bool {
        self.own_vars().iter().any(|v| v.same_variable(var)) || self.exprs().iter().any(|e| e.mentions_var(var))
    }

    pub fn mentions_var(&self, var: &LocalVar) -> bool {
        self.header_mentions(var) || self.bodies().iter().any(|b| b.iter().any(|s| s.mentions_var(var)))
    }

    /// Control never reaches the statement after this one.
    pub fn is_terminal(&self) -> bool {
        match self {
            StructuredStmt::Simple { stmt, .. } => stmt.is_terminal(),
            StructuredStmt::Break { .. } | StructuredStmt::Continue { .. } | StructuredStmt::UnstructuredGoto { .. } => {
                true
            }
            StructuredStmt::If {
                then_body,
                else_body: Some(else_body),
                ..
            } => ends_terminal(then_body) && ends_terminal(else_body),
            StructuredStmt::Block(body) => ends_terminal(body),
            _ => false,
        }
    }

    /// Clear offset provenance so structurally equal copies compare equal.
    pub fn erase_provenance(&mut self) {
        walk_stmts_mut(std::slice::from_mut(self), &mut |s| {
            if let StructuredStmt::Simple { span, .. } = s {
                *span = None;
            }
            for v in s.own_vars_mut() {
                v.offset = None;
            }
            for e in s.exprs_mut() {
                e.vars_mut(&mut |v| v.offset = None);
            }
        });
    }
}

pub fn ends_terminal(stmts: &[StructuredStmt]) -> bool {
    stmts.last().map_or(false, |s| s.is_terminal())
}

/// Pre-order visit of every statement in `stmts`, including nested bodies.
pub fn walk_stmts<F: FnMut(&StructuredStmt)>(stmts: &[StructuredStmt], f: &mut F) {
    for s in stmts {
        f(s);
        for body in s.bodies() {
            walk_stmts(body, f);
        }
    }
}

/// Post-order visit: nested bodies first, then the statement.
pub fn walk_stmts_mut<F: FnMut(&mut StructuredStmt)>(stmts: &mut [StructuredStmt], f: &mut F) {
    for s in stmts.iter_mut() {
        for body in s.bodies_mut() {
            walk_stmts_mut(body, f);
        }
        f(s);
    }
}

/// Post-order visit of every statement list, innermost first.
pub fn walk_lists_mut<F: FnMut(&mut Vec<StructuredStmt>)>(stmts: &mut Vec<StructuredStmt>, f: &mut F) {
    for s in stmts.iter_mut() {
        for body in s.bodies_mut() {
            walk_lists_mut(body, f);
        }
    }
    f(stmts);
}

/// Visit every expression node, bottom-up.
pub fn walk_exprs_mut<F: FnMut(&mut Expr)>(stmts: &mut [StructuredStmt], f: &mut F) {
    walk_stmts_mut(stmts, &mut |s| {
        for e in s.exprs_mut() {
            e.walk_mut(f);
        }
    });
}

/// Visit every local variable reference and declaration.
pub fn walk_vars_mut<F: FnMut(&mut LocalVar)>(stmts: &mut [StructuredStmt], f: &mut F) {
    walk_stmts_mut(stmts, &mut |s| {
        for v in s.own_vars_mut() {
            f(v);
        }
        for e in s.exprs_mut() {
            e.vars_mut(f);
        }
    });
}

pub fn list_mentions(stmts: &[StructuredStmt], var: &LocalVar) -> bool {
    stmts.iter().any(|s| s.mentions_var(var))
}

/// A structured method body: statements plus the resolved local variables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructuredBody {
    pub statements: Vec<StructuredStmt>,
    pub variables: Vec<VariableBinding>,
}

impl StructuredBody {
    pub fn new(statements: Vec<StructuredStmt>) -> Self {
        Self {
            statements,
            variables: Vec::new(),
        }
    }

    pub fn variable(&self, id: u32) -> Option<&VariableBinding> {
        self.variables.iter().find(|v| v.id == id)
    }

    /// The binding with this name, if any.
    pub fn variable_named(&self, name: &str) -> Option<&VariableBinding> {
        self.variables.iter().find(|v| v.name == name)
    }
}
