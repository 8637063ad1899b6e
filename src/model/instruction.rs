use std::fmt;

/// Computational type of a slot or stack value, as encoded in the opcode prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    /// Long and double values take two slots / two stack words.
    pub fn is_wide(self) -> bool {
        matches!(self, ValueKind::Long | ValueKind::Double)
    }

    fn prefix(self) -> char {
        match self {
            ValueKind::Int => 'i',
            ValueKind::Long => 'l',
            ValueKind::Float => 'f',
            ValueKind::Double => 'd',
            ValueKind::Reference => 'a',
        }
    }
}

/// Element kind of the `xaload` / `xastore` family. `Byte` covers boolean arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

impl ArrayKind {
    fn prefix(self) -> char {
        match self {
            ArrayKind::Int => 'i',
            ArrayKind::Long => 'l',
            ArrayKind::Float => 'f',
            ArrayKind::Double => 'd',
            ArrayKind::Reference => 'a',
            ArrayKind::Byte => 'b',
            ArrayKind::Char => 'c',
            ArrayKind::Short => 's',
        }
    }

    pub fn is_wide(self) -> bool {
        matches!(self, ArrayKind::Long | ArrayKind::Double)
    }
}

/// Element type operand of `newarray`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl PrimitiveKind {
    pub fn descriptor(self) -> char {
        match self {
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Double => 'D',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Long => 'J',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithOp {
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
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConvertOp {
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
}

impl ConvertOp {
    pub fn result_kind(self) -> ValueKind {
        match self {
            ConvertOp::I2L | ConvertOp::F2L | ConvertOp::D2L => ValueKind::Long,
            ConvertOp::I2F | ConvertOp::L2F | ConvertOp::D2F => ValueKind::Float,
            ConvertOp::I2D | ConvertOp::L2D | ConvertOp::F2D => ValueKind::Double,
            _ => ValueKind::Int,
        }
    }
}

/// `lcmp`, `fcmpl`, `fcmpg`, `dcmpl`, `dcmpg`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    LCmp,
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,
}

/// Comparison encoded in a conditional branch opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Condition {
    fn suffix(self) -> &'static str {
        match self {
            Condition::Eq => "eq",
            Condition::Ne => "ne",
            Condition::Lt => "lt",
            Condition::Ge => "ge",
            Condition::Gt => "gt",
            Condition::Le => "le",
        }
    }
}

/// A loadable constant after constant-pool resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Internal class name, or an array descriptor such as `[I`.
    Class(String),
    MethodType(String),
    MethodHandle(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Long(v) => write!(f, "{}L", v),
            Constant::Float(v) => write!(f, "{}F", v),
            Constant::Double(v) => write!(f, "{}D", v),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Class(c) => write!(f, "{}.class", c),
            Constant::MethodType(d) => write!(f, "MethodType {}", d),
            Constant::MethodHandle(h) => write!(f, "MethodHandle {}", h),
        }
    }
}

/// A resolved `Fieldref`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

impl FieldRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

/// A resolved `Methodref` / `InterfaceMethodref`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub interface: bool,
}

impl MethodRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
            interface: false,
        }
    }

    pub fn interface(owner: impl Into<String>, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            interface: true,
            ..Self::new(owner, name, descriptor)
        }
    }
}

/// A resolved `invokedynamic` call site.
#[derive(Clone, Debug, PartialEq)]
pub struct CallSite {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: MethodRef,
    pub bootstrap_args: Vec<Constant>,
}

/// One instruction with its resolved operands.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Nop,
    AconstNull,
    Const(Constant),
    Load { kind: ValueKind, slot: u16 },
    Store { kind: ValueKind, slot: u16 },
    Iinc { slot: u16, amount: i32 },
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),

    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,

    Arith { op: ArithOp, kind: ValueKind },
    Neg(ValueKind),
    Convert(ConvertOp),
    Compare(CmpOp),

    IfZero { cond: Condition, target: u32 },
    IfIntCompare { cond: Condition, target: u32 },
    /// `if_acmpeq` (`cond == Eq`) / `if_acmpne` (`cond == Ne`).
    IfRefCompare { cond: Condition, target: u32 },
    /// `ifnull` (`is_null`) / `ifnonnull`.
    IfNull { is_null: bool, target: u32 },
    Goto(u32),
    Jsr(u32),
    Ret(u16),
    TableSwitch { default: u32, low: i32, targets: Vec<u32> },
    LookupSwitch { default: u32, pairs: Vec<(i32, u32)> },
    Return(Option<ValueKind>),
    Athrow,

    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    InvokeVirtual(MethodRef),
    InvokeSpecial(MethodRef),
    InvokeStatic(MethodRef),
    InvokeInterface(MethodRef),
    InvokeDynamic(CallSite),

    New(String),
    NewArray(PrimitiveKind),
    ANewArray(String),
    MultiANewArray { descriptor: String, dimensions: u8 },
    ArrayLength,
    CheckCast(String),
    InstanceOf(String),
    MonitorEnter,
    MonitorExit,

    /// An opcode the reader could not classify.
    Unknown(u8),
}

impl Op {
    /// Absolute jump targets of this instruction, in operand order.
    pub fn targets(&self) -> Vec<u32> {
        match self {
            Op::IfZero { target, .. }
            | Op::IfIntCompare { target, .. }
            | Op::IfRefCompare { target, .. }
            | Op::IfNull { target, .. }
            | Op::Goto(target)
            | Op::Jsr(target) => vec![*target],
            Op::TableSwitch { default, targets, .. } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            Op::LookupSwitch { default, pairs } => {
                let mut all: Vec<u32> = pairs.iter().map(|(_, t)| *t).collect();
                all.push(*default);
                all
            }
            _ => Vec::new(),
        }
    }

    /// Rewrite every jump target through `f`.
    pub fn map_targets(&mut self, mut f: impl FnMut(u32) -> u32) {
        match self {
            Op::IfZero { target, .. }
            | Op::IfIntCompare { target, .. }
            | Op::IfRefCompare { target, .. }
            | Op::IfNull { target, .. }
            | Op::Goto(target)
            | Op::Jsr(target) => *target = f(*target),
            Op::TableSwitch { default, targets, .. } => {
                *default = f(*default);
                for t in targets.iter_mut() {
                    *t = f(*t);
                }
            }
            Op::LookupSwitch { default, pairs } => {
                *default = f(*default);
                for (_, t) in pairs.iter_mut() {
                    *t = f(*t);
                }
            }
            _ => {}
        }
    }

    pub fn is_conditional_branch(&self) -> bool {
        matches!(
            self,
            Op::IfZero { .. } | Op::IfIntCompare { .. } | Op::IfRefCompare { .. } | Op::IfNull { .. }
        )
    }

    /// True when control never falls through to the next instruction.
    pub fn ends_flow(&self) -> bool {
        matches!(
            self,
            Op::Goto(_)
                | Op::Jsr(_)
                | Op::Ret(_)
                | Op::TableSwitch { .. }
                | Op::LookupSwitch { .. }
                | Op::Return(_)
                | Op::Athrow
        )
    }

    /// True when the instruction ends a basic block.
    pub fn is_block_end(&self) -> bool {
        self.ends_flow() || self.is_conditional_branch()
    }

    /// Length of the JVM encoding of this instruction when placed at `offset`.
    pub fn encoded_len(&self, offset: u32) -> u32 {
        let slot_len = |slot: u16| {
            if slot <= 3 {
                1
            } else if slot <= 0xff {
                2
            } else {
                4
            }
        };
        match self {
            Op::Const(c) => match c {
                Constant::Int(v) if (-1..=5).contains(v) => 1,
                Constant::Int(v) if i8::try_from(*v).is_ok() => 2,
                Constant::Int(v) if i16::try_from(*v).is_ok() => 3,
                Constant::Long(v) if *v == 0 || *v == 1 => 1,
                Constant::Double(v) if *v == 0.0 || *v == 1.0 => 1,
                Constant::Float(v) if *v == 0.0 || *v == 1.0 || *v == 2.0 => 1,
                Constant::Long(_) | Constant::Double(_) => 3,
                _ => 2,
            },
            Op::Load { slot, .. } | Op::Store { slot, .. } => slot_len(*slot),
            Op::Ret(slot) => {
                if *slot <= 0xff {
                    2
                } else {
                    4
                }
            }
            Op::Iinc { slot, amount } => {
                if *slot <= 0xff && i8::try_from(*amount).is_ok() {
                    3
                } else {
                    6
                }
            }
            Op::IfZero { .. }
            | Op::IfIntCompare { .. }
            | Op::IfRefCompare { .. }
            | Op::IfNull { .. }
            | Op::Goto(_)
            | Op::Jsr(_) => 3,
            Op::TableSwitch { targets, .. } => {
                let pad = 3 - (offset % 4);
                1 + pad + 12 + 4 * targets.len() as u32
            }
            Op::LookupSwitch { pairs, .. } => {
                let pad = 3 - (offset % 4);
                1 + pad + 8 + 8 * pairs.len() as u32
            }
            Op::GetStatic(_)
            | Op::PutStatic(_)
            | Op::GetField(_)
            | Op::PutField(_)
            | Op::InvokeVirtual(_)
            | Op::InvokeSpecial(_)
            | Op::InvokeStatic(_)
            | Op::New(_)
            | Op::ANewArray(_)
            | Op::CheckCast(_)
            | Op::InstanceOf(_) => 3,
            Op::InvokeInterface(_) | Op::InvokeDynamic(_) => 5,
            Op::NewArray(_) => 2,
            Op::MultiANewArray { .. } => 4,
            _ => 1,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Nop => write!(f, "nop"),
            Op::AconstNull => write!(f, "aconst_null"),
            Op::Const(c) => write!(f, "ldc {}", c),
            Op::Load { kind, slot } => write!(f, "{}load {}", kind.prefix(), slot),
            Op::Store { kind, slot } => write!(f, "{}store {}", kind.prefix(), slot),
            Op::Iinc { slot, amount } => write!(f, "iinc {} {}", slot, amount),
            Op::ArrayLoad(k) => write!(f, "{}aload", k.prefix()),
            Op::ArrayStore(k) => write!(f, "{}astore", k.prefix()),
            Op::Pop => write!(f, "pop"),
            Op::Pop2 => write!(f, "pop2"),
            Op::Dup => write!(f, "dup"),
            Op::DupX1 => write!(f, "dup_x1"),
            Op::DupX2 => write!(f, "dup_x2"),
            Op::Dup2 => write!(f, "dup2"),
            Op::Dup2X1 => write!(f, "dup2_x1"),
            Op::Dup2X2 => write!(f, "dup2_x2"),
            Op::Swap => write!(f, "swap"),
            Op::Arith { op, kind } => {
                let name = match op {
                    ArithOp::Add => "add",
                    ArithOp::Sub => "sub",
                    ArithOp::Mul => "mul",
                    ArithOp::Div => "div",
                    ArithOp::Rem => "rem",
                    ArithOp::Shl => "shl",
                    ArithOp::Shr => "shr",
                    ArithOp::Ushr => "ushr",
                    ArithOp::And => "and",
                    ArithOp::Or => "or",
                    ArithOp::Xor => "xor",
                };
                write!(f, "{}{}", kind.prefix(), name)
            }
            Op::Neg(kind) => write!(f, "{}neg", kind.prefix()),
            Op::Convert(c) => write!(f, "{}", format!("{:?}", c).to_lowercase()),
            Op::Compare(c) => write!(f, "{}", format!("{:?}", c).to_lowercase()),
            Op::IfZero { cond, target } => write!(f, "if{} {}", cond.suffix(), target),
            Op::IfIntCompare { cond, target } => write!(f, "if_icmp{} {}", cond.suffix(), target),
            Op::IfRefCompare { cond, target } => write!(f, "if_acmp{} {}", cond.suffix(), target),
            Op::IfNull { is_null: true, target } => write!(f, "ifnull {}", target),
            Op::IfNull { is_null: false, target } => write!(f, "ifnonnull {}", target),
            Op::Goto(t) => write!(f, "goto {}", t),
            Op::Jsr(t) => write!(f, "jsr {}", t),
            Op::Ret(slot) => write!(f, "ret {}", slot),
            Op::TableSwitch { default, low, targets } => {
                write!(f, "tableswitch {} [", low)?;
                for (i, t) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "] default {}", default)
            }
            Op::LookupSwitch { default, pairs } => {
                write!(f, "lookupswitch [")?;
                for (i, (k, t)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, t)?;
                }
                write!(f, "] default {}", default)
            }
            Op::Return(None) => write!(f, "return"),
            Op::Return(Some(kind)) => write!(f, "{}return", kind.prefix()),
            Op::Athrow => write!(f, "athrow"),
            Op::GetStatic(r) => write!(f, "getstatic {}.{} {}", r.owner, r.name, r.descriptor),
            Op::PutStatic(r) => write!(f, "putstatic {}.{} {}", r.owner, r.name, r.descriptor),
            Op::GetField(r) => write!(f, "getfield {}.{} {}", r.owner, r.name, r.descriptor),
            Op::PutField(r) => write!(f, "putfield {}.{} {}", r.owner, r.name, r.descriptor),
            Op::InvokeVirtual(m) => write!(f, "invokevirtual {}.{}{}", m.owner, m.name, m.descriptor),
            Op::InvokeSpecial(m) => write!(f, "invokespecial {}.{}{}", m.owner, m.name, m.descriptor),
            Op::InvokeStatic(m) => write!(f, "invokestatic {}.{}{}", m.owner, m.name, m.descriptor),
            Op::InvokeInterface(m) => write!(f, "invokeinterface {}.{}{}", m.owner, m.name, m.descriptor),
            Op::InvokeDynamic(site) => write!(
                f,
                "invokedynamic {}{} [{}.{}]",
                site.name, site.descriptor, site.bootstrap.owner, site.bootstrap.name
            ),
            Op::New(c) => write!(f, "new {}", c),
            Op::NewArray(k) => write!(f, "newarray {}", k.descriptor()),
            Op::ANewArray(c) => write!(f, "anewarray {}", c),
            Op::MultiANewArray { descriptor, dimensions } => {
                write!(f, "multianewarray {} {}", descriptor, dimensions)
            }
            Op::ArrayLength => write!(f, "arraylength"),
            Op::CheckCast(c) => write!(f, "checkcast {}", c),
            Op::InstanceOf(c) => write!(f, "instanceof {}", c),
            Op::MonitorEnter => write!(f, "monitorenter"),
            Op::MonitorExit => write!(f, "monitorexit"),
            Op::Unknown(opcode) => write!(f, "<unknown opcode 0x{:02x}>", opcode),
        }
    }
}

/// An instruction at its bytecode offset.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub offset: u32,
    pub op: Op,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>5}: {}", self.offset, self.op)
    }
}
