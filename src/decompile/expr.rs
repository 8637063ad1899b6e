use crate::model::{ArithOp, CmpOp, Condition, Constant, MethodRef};

use super::descriptor::JvmType;

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
    /// `&&`
    CondAnd,
    /// `||`
    CondOr,
}

impl BinOp {
    pub fn from_arith(op: ArithOp) -> Self {
        match op {
            ArithOp::Add => BinOp::Add,
            ArithOp::Sub => BinOp::Sub,
            ArithOp::Mul => BinOp::Mul,
            ArithOp::Div => BinOp::Div,
            ArithOp::Rem => BinOp::Rem,
            ArithOp::Shl => BinOp::Shl,
            ArithOp::Shr => BinOp::Shr,
            ArithOp::Ushr => BinOp::Ushr,
            ArithOp::And => BinOp::And,
            ArithOp::Or => BinOp::Or,
            ArithOp::Xor => BinOp::Xor,
        }
    }

    /// Java source token for this operator.
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::CondAnd => "&&",
            BinOp::CondOr => "||",
        }
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    /// Logical `!`.
    Not,
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl CompareOp {
    pub fn from_condition(cond: Condition) -> Self {
        match cond {
            Condition::Eq => CompareOp::Eq,
            Condition::Ne => CompareOp::Ne,
            Condition::Lt => CompareOp::Lt,
            Condition::Ge => CompareOp::Ge,
            Condition::Gt => CompareOp::Gt,
            Condition::Le => CompareOp::Le,
        }
    }

    /// Returns the negated comparison.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Le => CompareOp::Gt,
        }
    }

    /// Java source token for this operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
        }
    }
}

/// Method invocation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// Local variable reference.
///
/// `offset` is the load/store instruction the reference came from; the
/// resolver uses it to find the live range, then fills in `id`, `name` and
/// the refined `ty`.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVar {
    pub index: u16,
    pub name: Option<String>,
    pub ty: JvmType,
    pub offset: Option<u32>,
    pub id: Option<u32>,
}

impl LocalVar {
    pub fn new(index: u16, ty: JvmType, offset: Option<u32>) -> Self {
        Self {
            index,
            name: None,
            ty,
            offset,
            id: None,
        }
    }

    /// Same logical variable: equal binding ids once resolved, equal slots before.
    pub fn same_variable(&self, other: &LocalVar) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.index == other.index,
        }
    }
}

/// Expression tree node -- represents a value-producing computation.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    // --- Literals ---
    IntLiteral(i32),
    LongLiteral(i64),
    FloatLiteral(f32),
    DoubleLiteral(f64),
    BooleanLiteral(bool),
    StringLiteral(String),
    /// Internal name or array descriptor of the class.
    ClassLiteral(String),
    NullLiteral,

    // --- Variables ---
    LocalLoad(LocalVar),
    This,

    // --- Operations ---
    BinaryOp { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
    Cast { target_type: JvmType, operand: Box<Expr> },
    Instanceof { operand: Box<Expr>, check_type: String },

    // --- Field access ---
    FieldGet {
        object: Option<Box<Expr>>,
        class_name: String,
        field_name: String,
        field_type: JvmType,
    },

    // --- Method invocation ---
    MethodCall {
        kind: InvokeKind,
        object: Option<Box<Expr>>,
        class_name: String,
        method_name: String,
        descriptor: String,
        args: Vec<Expr>,
        return_type: JvmType,
    },

    // --- Object creation ---
    New {
        class_name: String,
        constructor_descriptor: String,
        args: Vec<Expr>,
    },
    NewArray { element_type: JvmType, length: Box<Expr> },
    NewMultiArray { element_type: JvmType, dimensions: Vec<Expr> },
    /// `new T[] { a, b, c }`
    ArrayInit { element_type: JvmType, elements: Vec<Expr> },
    ArrayLength { array: Box<Expr> },
    ArrayLoad { array: Box<Expr>, index: Box<Expr>, element_type: JvmType },

    // --- Comparison ---
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    /// Result of lcmp/fcmpl/fcmpg/dcmpl/dcmpg: -1, 0, or 1
    CmpResult { kind: CmpOp, left: Box<Expr>, right: Box<Expr> },

    // --- invokedynamic ---
    InvokeDynamic {
        method_name: String,
        descriptor: String,
        bootstrap: MethodRef,
        bootstrap_args: Vec<Constant>,
        captures: Vec<Expr>,
        return_type: JvmType,
    },

    Ternary { condition: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    /// Assignment used as a value; `target` is a local load, field get or array load.
    Assign { target: Box<Expr>, value: Box<Expr> },
    /// `++i` / `i++` (and `--`, `+= k`) used as a value.
    Increment { var: LocalVar, amount: i32, prefix: bool },

    /// The exception object a handler starts with.
    CaughtException { exception_type: Option<String> },

    // --- Fallback ---
    Unresolved(String),
    /// Marker for an uninitialized `new` before <init> is called; keyed by the `new` offset.
    UninitNew { class_name: String, offset: u32 },
}

impl Expr {
    /// Direct operands, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::BinaryOp { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::CmpResult { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::UnaryOp { operand, .. } | Expr::Cast { operand, .. } | Expr::Instanceof { operand, .. } => {
                vec![operand.as_ref()]
            }
            Expr::FieldGet { object, .. } => object.iter().map(|o| o.as_ref()).collect(),
            Expr::MethodCall { object, args, .. } => {
                let mut all: Vec<&Expr> = object.iter().map(|o| o.as_ref()).collect();
                all.extend(args.iter());
                all
            }
            Expr::New { args, .. } => args.iter().collect(),
            Expr::NewArray { length, .. } => vec![length.as_ref()],
            Expr::NewMultiArray { dimensions, .. } => dimensions.iter().collect(),
            Expr::ArrayInit { elements, .. } => elements.iter().collect(),
            Expr::ArrayLength { array } => vec![array.as_ref()],
            Expr::ArrayLoad { array, index, .. } => vec![array.as_ref(), index.as_ref()],
            Expr::InvokeDynamic { captures, .. } => captures.iter().collect(),
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => vec![condition.as_ref(), then_expr.as_ref(), else_expr.as_ref()],
            Expr::Assign { target, value } => vec![target.as_ref(), value.as_ref()],
            _ => Vec::new(),
        }
    }

    /// Direct operands, mutable, in evaluation order.
    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::BinaryOp { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::CmpResult { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expr::UnaryOp { operand, .. } | Expr::Cast { operand, .. } | Expr::Instanceof { operand, .. } => {
                vec![operand.as_mut()]
            }
            Expr::FieldGet { object, .. } => object.iter_mut().map(|o| o.as_mut()).collect(),
            Expr::MethodCall { object, args, .. } => {
                let mut all: Vec<&mut Expr> = object.iter_mut().map(|o| o.as_mut()).collect();
                all.extend(args.iter_mut());
                all
            }
            Expr::New { args, .. } => args.iter_mut().collect(),
            Expr::NewArray { length, .. } => vec![length.as_mut()],
            Expr::NewMultiArray { dimensions, .. } => dimensions.iter_mut().collect(),
            Expr::ArrayInit { elements, .. } => elements.iter_mut().collect(),
            Expr::ArrayLength { array } => vec![array.as_mut()],
            Expr::ArrayLoad { array, index, .. } => vec![array.as_mut(), index.as_mut()],
            Expr::InvokeDynamic { captures, .. } => captures.iter_mut().collect(),
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => vec![condition.as_mut(), then_expr.as_mut(), else_expr.as_mut()],
            Expr::Assign { target, value } => vec![target.as_mut(), value.as_mut()],
            _ => Vec::new(),
        }
    }

    /// Visit every node in evaluation order (operands before the node itself).
    pub fn walk<F: FnMut(&Expr)>(&self, f: &mut F) {
        for child in self.children() {
            child.walk(f);
        }
        f(self);
    }

    /// Bottom-up rewrite: operands are visited before the node itself.
    pub fn walk_mut<F: FnMut(&mut Expr)>(&mut self, f: &mut F) {
        for child in self.children_mut() {
            child.walk_mut(f);
        }
        f(self);
    }

    pub fn any<P: Fn(&Expr) -> bool>(&self, pred: P) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= pred(e));
        found
    }

    /// Visit every local variable reference in this tree.
    pub fn vars_mut<F: FnMut(&mut LocalVar)>(&mut self, f: &mut F) {
        self.walk_mut(&mut |e| match e {
            Expr::LocalLoad(var) | Expr::Increment { var, .. } => f(var),
            _ => {}
        });
    }

    pub fn mentions_var(&self, var: &LocalVar) -> bool {
        self.any(|e| match e {
            Expr::LocalLoad(v) | Expr::Increment { var: v, .. } => v.same_variable(var),
            _ => false,
        })
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::IntLiteral(_)
                | Expr::LongLiteral(_)
                | Expr::FloatLiteral(_)
                | Expr::DoubleLiteral(_)
                | Expr::BooleanLiteral(_)
                | Expr::StringLiteral(_)
                | Expr::ClassLiteral(_)
                | Expr::NullLiteral
        )
    }

    /// Can be evaluated twice with the same result and no observable effect.
    pub fn is_pure(&self) -> bool {
        match self {
            e if e.is_literal() => true,
            Expr::LocalLoad(_) | Expr::This | Expr::UninitNew { .. } | Expr::CaughtException { .. } => true,
            Expr::FieldGet { object, .. } => object.as_ref().map_or(true, |o| o.is_pure()),
            Expr::ArrayLength { array } => array.is_pure(),
            Expr::Cast { operand, .. } => operand.is_pure(),
            _ => false,
        }
    }

    /// Evaluating the node itself (not its operands) has an observable effect.
    pub fn is_effect_node(&self) -> bool {
        matches!(
            self,
            Expr::MethodCall { .. }
                | Expr::New { .. }
                | Expr::InvokeDynamic { .. }
                | Expr::Assign { .. }
                | Expr::Increment { .. }
                | Expr::Unresolved(_)
        )
    }

    pub fn has_side_effects(&self) -> bool {
        self.any(|e| e.is_effect_node())
    }

    /// Best-effort static type of the expression.
    pub fn jvm_type(&self) -> JvmType {
        match self {
            Expr::IntLiteral(_) => JvmType::Int,
            Expr::LongLiteral(_) => JvmType::Long,
            Expr::FloatLiteral(_) => JvmType::Float,
            Expr::DoubleLiteral(_) => JvmType::Double,
            Expr::BooleanLiteral(_) => JvmType::Boolean,
            Expr::StringLiteral(_) => JvmType::Reference("java/lang/String".into()),
            Expr::ClassLiteral(_) => JvmType::Reference("java/lang/Class".into()),
            Expr::NullLiteral => JvmType::Null,
            Expr::LocalLoad(var) => var.ty.clone(),
            Expr::This => JvmType::Unknown,
            Expr::BinaryOp { op, left, right } => match op {
                BinOp::CondAnd | BinOp::CondOr => JvmType::Boolean,
                BinOp::Shl | BinOp::Shr | BinOp::Ushr => widen(left.jvm_type()),
                BinOp::Add if left.jvm_type().is_string() || right.jvm_type().is_string() => {
                    JvmType::Reference("java/lang/String".into())
                }
                BinOp::And | BinOp::Or | BinOp::Xor
                    if left.jvm_type() == JvmType::Boolean && right.jvm_type() == JvmType::Boolean =>
                {
                    JvmType::Boolean
                }
                _ => {
                    let l = widen(left.jvm_type());
                    let r = widen(right.jvm_type());
                    if l == JvmType::Double || r == JvmType::Double {
                        JvmType::Double
                    } else if l == JvmType::Float || r == JvmType::Float {
                        JvmType::Float
                    } else if l == JvmType::Long || r == JvmType::Long {
                        JvmType::Long
                    } else {
                        JvmType::Int
                    }
                }
            },
            Expr::UnaryOp { op: UnaryOp::Not, .. } => JvmType::Boolean,
            Expr::UnaryOp { op: UnaryOp::Neg, operand } => widen(operand.jvm_type()),
            Expr::Cast { target_type, .. } => target_type.clone(),
            Expr::Instanceof { .. } | Expr::Compare { .. } => JvmType::Boolean,
            Expr::CmpResult { .. } => JvmType::Int,
            Expr::FieldGet { field_type, .. } => field_type.clone(),
            Expr::MethodCall { return_type, .. } | Expr::InvokeDynamic { return_type, .. } => return_type.clone(),
            Expr::New { class_name, .. } | Expr::UninitNew { class_name, .. } => {
                JvmType::Reference(class_name.clone())
            }
            Expr::NewArray { element_type, .. } | Expr::ArrayInit { element_type, .. } => {
                JvmType::Array(Box::new(element_type.clone()))
            }
            Expr::NewMultiArray { element_type, .. } => element_type.clone(),
            Expr::ArrayLength { .. } => JvmType::Int,
            Expr::ArrayLoad { element_type, .. } => element_type.clone(),
            Expr::Ternary {
                then_expr, else_expr, ..
            } => {
                let t = then_expr.jvm_type();
                if t == JvmType::Null {
                    else_expr.jvm_type()
                } else {
                    t
                }
            }
            Expr::Assign { target, .. } => target.jvm_type(),
            Expr::Increment { var, .. } => var.ty.clone(),
            Expr::CaughtException { exception_type } => JvmType::Reference(
                exception_type.clone().unwrap_or_else(|| "java/lang/Throwable".into()),
            ),
            Expr::Unresolved(_) => JvmType::Unknown,
        }
    }

    /// True for expressions whose value is a Java `boolean`.
    pub fn is_boolean(&self) -> bool {
        match self {
            Expr::Ternary {
                then_expr, else_expr, ..
            } => then_expr.is_boolean() && else_expr.is_boolean(),
            _ => self.jvm_type() == JvmType::Boolean,
        }
    }

    pub fn boxed(self) -> Box<Expr> {
        Box::new(self)
    }
}

fn widen(ty: JvmType) -> JvmType {
    match ty {
        JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Boolean => JvmType::Int,
        other => other,
    }
}

/// Logical negation, pushed through comparisons and `&&`/`||`.
pub fn negate_expr(expr: Expr) -> Expr {
    match expr {
        Expr::Compare { op, left, right } => Expr::Compare {
            op: op.negate(),
            left,
            right,
        },
        Expr::UnaryOp {
            op: UnaryOp::Not,
            operand,
        } => *operand,
        Expr::BooleanLiteral(b) => Expr::BooleanLiteral(!b),
        Expr::BinaryOp {
            op: BinOp::CondAnd,
            left,
            right,
        } => Expr::BinaryOp {
            op: BinOp::CondOr,
            left: Box::new(negate_expr(*left)),
            right: Box::new(negate_expr(*right)),
        },
        Expr::BinaryOp {
            op: BinOp::CondOr,
            left,
            right,
        } => Expr::BinaryOp {
            op: BinOp::CondAnd,
            left: Box::new(negate_expr(*left)),
            right: Box::new(negate_expr(*right)),
        },
        other => Expr::UnaryOp {
            op: UnaryOp::Not,
            operand: Box::new(other),
        },
    }
}

/// Statement -- represents a side-effecting operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    LocalStore { var: LocalVar, value: Expr },
    /// A local declaration, optionally merged with its first store.
    Declare { var: LocalVar, init: Option<Expr> },
    FieldStore {
        object: Option<Expr>,
        class_name: String,
        field_name: String,
        field_type: JvmType,
        value: Expr,
    },
    ArrayStore { array: Expr, index: Expr, value: Expr },
    ExprStmt(Expr),
    Iinc { var: LocalVar, amount: i32 },
    Return(Option<Expr>),
    Throw(Expr),
    Monitor { enter: bool, object: Expr },
}

impl Stmt {
    /// Top-level expressions, in evaluation order.
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Stmt::LocalStore { value, .. } => vec![value],
            Stmt::Declare { init, .. } => init.iter().collect(),
            Stmt::FieldStore { object, value, .. } => {
                let mut all: Vec<&Expr> = object.iter().collect();
                all.push(value);
                all
            }
            Stmt::ArrayStore { array, index, value } => vec![array, index, value],
            Stmt::ExprStmt(e) | Stmt::Throw(e) => vec![e],
            Stmt::Monitor { object, .. } => vec![object],
            Stmt::Return(value) => value.iter().collect(),
            Stmt::Iinc { .. } => Vec::new(),
        }
    }

    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Stmt::LocalStore { value, .. } => vec![value],
            Stmt::Declare { init, .. } => init.iter_mut().collect(),
            Stmt::FieldStore { object, value, .. } => {
                let mut all: Vec<&mut Expr> = object.iter_mut().collect();
                all.push(value);
                all
            }
            Stmt::ArrayStore { array, index, value } => vec![array, index, value],
            Stmt::ExprStmt(e) | Stmt::Throw(e) => vec![e],
            Stmt::Monitor { object, .. } => vec![object],
            Stmt::Return(value) => value.iter_mut().collect(),
            Stmt::Iinc { .. } => Vec::new(),
        }
    }

    /// The local variable this statement writes, if any.
    pub fn target_var(&self) -> Option<&LocalVar> {
        match self {
            Stmt::LocalStore { var, .. } | Stmt::Declare { var, .. } | Stmt::Iinc { var, .. } => Some(var),
            _ => None,
        }
    }

    pub fn target_var_mut(&mut self) -> Option<&mut LocalVar> {
        match self {
            Stmt::LocalStore { var, .. } | Stmt::Declare { var, .. } | Stmt::Iinc { var, .. } => Some(var),
            _ => None,
        }
    }

    pub fn vars_mut<F: FnMut(&mut LocalVar)>(&mut self, f: &mut F) {
        if let Some(var) = self.target_var_mut() {
            f(var);
        }
        for e in self.exprs_mut() {
            e.vars_mut(f);
        }
    }

    pub fn mentions_var(&self, var: &LocalVar) -> bool {
        self.target_var().map_or(false, |v| v.same_variable(var)) || self.exprs().iter().any(|e| e.mentions_var(var))
    }

    /// Control never continues past this statement.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stmt::Return(_) | Stmt::Throw(_))
    }
}
