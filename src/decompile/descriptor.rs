//! JVM field and method descriptors.

use crate::model::{ArrayKind, PrimitiveKind, ValueKind};

/// Represents a JVM type from a descriptor string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JvmType {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
    Void,
    Reference(String),
    Array(Box<JvmType>),
    Null,
    Unknown,
}

impl JvmType {
    /// Returns true if this type occupies two slots on the JVM stack.
    pub fn is_wide(&self) -> bool {
        matches!(self, JvmType::Long | JvmType::Double)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Reference(_) | JvmType::Array(_) | JvmType::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, JvmType::Reference(name) if name == "java/lang/Object")
    }

    pub fn is_string(&self) -> bool {
        matches!(self, JvmType::Reference(name) if name == "java/lang/String")
    }

    /// The computational kind used by load/store opcodes, if any.
    pub fn value_kind(&self) -> Option<ValueKind> {
        match self {
            JvmType::Int | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Boolean => {
                Some(ValueKind::Int)
            }
            JvmType::Long => Some(ValueKind::Long),
            JvmType::Float => Some(ValueKind::Float),
            JvmType::Double => Some(ValueKind::Double),
            JvmType::Reference(_) | JvmType::Array(_) | JvmType::Null => Some(ValueKind::Reference),
            JvmType::Void | JvmType::Unknown => None,
        }
    }

    pub fn from_kind(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Int => JvmType::Int,
            ValueKind::Long => JvmType::Long,
            ValueKind::Float => JvmType::Float,
            ValueKind::Double => JvmType::Double,
            ValueKind::Reference => JvmType::Reference("java/lang/Object".into()),
        }
    }

    pub fn from_array_kind(kind: ArrayKind) -> Self {
        match kind {
            ArrayKind::Int => JvmType::Int,
            ArrayKind::Long => JvmType::Long,
            ArrayKind::Float => JvmType::Float,
            ArrayKind::Double => JvmType::Double,
            ArrayKind::Reference => JvmType::Reference("java/lang/Object".into()),
            ArrayKind::Byte => JvmType::Byte,
            ArrayKind::Char => JvmType::Char,
            ArrayKind::Short => JvmType::Short,
        }
    }

    pub fn from_primitive(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Boolean => JvmType::Boolean,
            PrimitiveKind::Char => JvmType::Char,
            PrimitiveKind::Float => JvmType::Float,
            PrimitiveKind::Double => JvmType::Double,
            PrimitiveKind::Byte => JvmType::Byte,
            PrimitiveKind::Short => JvmType::Short,
            PrimitiveKind::Int => JvmType::Int,
            PrimitiveKind::Long => JvmType::Long,
        }
    }

    /// Element type of an array type.
    pub fn element(&self) -> Option<&JvmType> {
        match self {
            JvmType::Array(inner) => Some(inner),
            _ => None,
        }
    }

    /// Returns the JVM descriptor string for this type.
    pub fn to_descriptor(&self) -> String {
        match self {
            JvmType::Int => "I".into(),
            JvmType::Long => "J".into(),
            JvmType::Float => "F".into(),
            JvmType::Double => "D".into(),
            JvmType::Byte => "B".into(),
            JvmType::Char => "C".into(),
            JvmType::Short => "S".into(),
            JvmType::Boolean => "Z".into(),
            JvmType::Void => "V".into(),
            JvmType::Reference(name) => format!("L{};", name),
            JvmType::Array(inner) => format!("[{}", inner.to_descriptor()),
            JvmType::Null | JvmType::Unknown => "Ljava/lang/Object;".into(),
        }
    }

    /// Returns the simple (unqualified) name for display.
    pub fn simple_name(&self) -> String {
        match self {
            JvmType::Int => "int".into(),
            JvmType::Long => "long".into(),
            JvmType::Float => "float".into(),
            JvmType::Double => "double".into(),
            JvmType::Byte => "byte".into(),
            JvmType::Char => "char".into(),
            JvmType::Short => "short".into(),
            JvmType::Boolean => "boolean".into(),
            JvmType::Void => "void".into(),
            JvmType::Reference(name) => simple_class_name(name).to_string(),
            JvmType::Array(inner) => format!("{}[]", inner.simple_name()),
            JvmType::Null => "null".into(),
            JvmType::Unknown => "Object".into(),
        }
    }
}

/// Parse a single type descriptor starting at position `pos` in `desc`.
/// Returns (JvmType, next_position).
pub fn parse_type_at(desc: &str, pos: usize) -> Option<(JvmType, usize)> {
    let bytes = desc.as_bytes();
    if pos >= bytes.len() {
        return None;
    }
    match bytes[pos] {
        b'B' => Some((JvmType::Byte, pos + 1)),
        b'C' => Some((JvmType::Char, pos + 1)),
        b'D' => Some((JvmType::Double, pos + 1)),
        b'F' => Some((JvmType::Float, pos + 1)),
        b'I' => Some((JvmType::Int, pos + 1)),
        b'J' => Some((JvmType::Long, pos + 1)),
        b'S' => Some((JvmType::Short, pos + 1)),
        b'Z' => Some((JvmType::Boolean, pos + 1)),
        b'V' => Some((JvmType::Void, pos + 1)),
        b'L' => {
            let semi = desc[pos + 1..].find(';')?;
            let class_name = &desc[pos + 1..pos + 1 + semi];
            if class_name.is_empty() {
                return None;
            }
            Some((JvmType::Reference(class_name.to_string()), pos + 1 + semi + 1))
        }
        b'[' => {
            let (inner, next) = parse_type_at(desc, pos + 1)?;
            Some((JvmType::Array(Box::new(inner)), next))
        }
        _ => None,
    }
}

/// Parse a full field descriptor string. Trailing garbage is rejected.
pub fn parse_type_descriptor(desc: &str) -> Option<JvmType> {
    let (ty, next) = parse_type_at(desc, 0)?;
    (next == desc.len()).then_some(ty)
}

/// Parse a method descriptor, e.g. "(II)V" -> ([Int, Int], Void)
pub fn parse_method_descriptor(desc: &str) -> Option<(Vec<JvmType>, JvmType)> {
    if !desc.starts_with('(') {
        return None;
    }
    let close = desc.find(')')?;
    let mut params = Vec::new();
    let mut pos = 1;
    while pos < close {
        let (ty, next) = parse_type_at(desc, pos)?;
        params.push(ty);
        pos = next;
    }
    if pos != close {
        return None;
    }
    let (ret, end) = parse_type_at(desc, close + 1)?;
    (end == desc.len()).then_some((params, ret))
}

/// Type named by a class constant: an internal name or an array descriptor.
pub fn class_ref_type(name: &str) -> JvmType {
    if name.starts_with('[') {
        parse_type_descriptor(name).unwrap_or(JvmType::Unknown)
    } else {
        JvmType::Reference(name.to_string())
    }
}

/// Convert internal class name to source name.
pub fn internal_to_source_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Get just the simple class name from an internal name.
pub fn simple_class_name(name: &str) -> &str {
    let base = match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    };
    match base.rfind('$') {
        Some(pos) if pos + 1 < base.len() => &base[pos + 1..],
        _ => base,
    }
}

/// Get the package from an internal name.
pub fn package_name(name: &str) -> Option<&str> {
    name.rfind('/').map(|pos| &name[..pos])
}

/// Number of local slots the parameters of `params` occupy.
pub fn parameter_slots(params: &[JvmType]) -> u16 {
    params.iter().map(|p| if p.is_wide() { 2 } else { 1 }).sum()
}
