use crate::error::MethodFailure;

use super::descriptor::{self, JvmType};
use super::expr::Expr;
use super::structured_types::StructuredBody;

/// Primitive types in Java.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

/// A Java type as it appears in source code (with generics).
#[derive(Clone, Debug, PartialEq)]
pub enum JavaType {
    Primitive(PrimitiveType),
    ClassType {
        package: Option<String>,
        /// Simple name; nested types are dotted (`Map.Entry`).
        name: String,
        type_args: Vec<JavaType>,
    },
    ArrayType(Box<JavaType>),
    WildcardType {
        bound: Option<Box<JavaType>>,
        is_upper: bool,
    },
    TypeVariable(String),
    Void,
}

impl JavaType {
    /// Get the simple display name for this type.
    pub fn display_name(&self) -> String {
        match self {
            JavaType::Primitive(p) => match p {
                PrimitiveType::Boolean => "boolean".into(),
                PrimitiveType::Byte => "byte".into(),
                PrimitiveType::Char => "char".into(),
                PrimitiveType::Short => "short".into(),
                PrimitiveType::Int => "int".into(),
                PrimitiveType::Long => "long".into(),
                PrimitiveType::Float => "float".into(),
                PrimitiveType::Double => "double".into(),
            },
            JavaType::ClassType { name, type_args, .. } => {
                if type_args.is_empty() {
                    name.clone()
                } else {
                    let args: Vec<String> = type_args.iter().map(|a| a.display_name()).collect();
                    format!("{}<{}>", name, args.join(", "))
                }
            }
            JavaType::ArrayType(inner) => format!("{}[]", inner.display_name()),
            JavaType::WildcardType { bound, is_upper } => match bound {
                Some(b) => {
                    if *is_upper {
                        format!("? extends {}", b.display_name())
                    } else {
                        format!("? super {}", b.display_name())
                    }
                }
                None => "?".into(),
            },
            JavaType::TypeVariable(name) => name.clone(),
            JavaType::Void => "void".into(),
        }
    }

    /// Check if this is the java.lang.Object type.
    pub fn is_object(&self) -> bool {
        matches!(self, JavaType::ClassType { name, package, .. } if name == "Object" && package.as_deref() == Some("java.lang"))
    }

    pub fn object() -> Self {
        JavaType::class("java/lang/Object")
    }

    /// Raw class type for an internal name (`java/util/Map$Entry` → `Map.Entry`).
    pub fn class(internal_name: &str) -> Self {
        let (package, name) = split_class_name(internal_name);
        JavaType::ClassType {
            package,
            name,
            type_args: Vec::new(),
        }
    }

    /// Erased source type of a descriptor type.
    pub fn from_jvm(ty: &JvmType) -> Self {
        match ty {
            JvmType::Int => JavaType::Primitive(PrimitiveType::Int),
            JvmType::Long => JavaType::Primitive(PrimitiveType::Long),
            JvmType::Float => JavaType::Primitive(PrimitiveType::Float),
            JvmType::Double => JavaType::Primitive(PrimitiveType::Double),
            JvmType::Byte => JavaType::Primitive(PrimitiveType::Byte),
            JvmType::Char => JavaType::Primitive(PrimitiveType::Char),
            JvmType::Short => JavaType::Primitive(PrimitiveType::Short),
            JvmType::Boolean => JavaType::Primitive(PrimitiveType::Boolean),
            JvmType::Void => JavaType::Void,
            JvmType::Reference(name) => JavaType::class(name),
            JvmType::Array(inner) => JavaType::ArrayType(Box::new(JavaType::from_jvm(inner))),
            JvmType::Null | JvmType::Unknown => JavaType::object(),
        }
    }
}

/// Package (dotted) and nested-dotted simple name of an internal class name.
pub fn split_class_name(internal_name: &str) -> (Option<String>, String) {
    let package = descriptor::package_name(internal_name).map(|p| p.replace('/', "."));
    let base = match internal_name.rfind('/') {
        Some(pos) => &internal_name[pos + 1..],
        None => internal_name,
    };
    (package, base.replace('$', "."))
}

/// Visibility level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    PackagePrivate,
    Private,
}

/// What kind of class-like entity this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
    Record,
}

/// A generic type parameter declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct TypeParameter {
    pub name: String,
    /// Empty when the only bound is `Object`.
    pub bounds: Vec<JavaType>,
}

/// A Java class / interface / enum / record / annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaClass {
    pub kind: ClassKind,
    pub visibility: Visibility,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_static: bool,
    pub is_synthetic: bool,
    pub type_parameters: Vec<TypeParameter>,
    pub package: Option<String>,
    /// Simple name, e.g. `Inner` for `a/b/Outer$Inner`.
    pub name: String,
    pub internal_name: String,
    pub super_class: Option<JavaType>,
    pub interfaces: Vec<JavaType>,
    pub fields: Vec<JavaField>,
    pub methods: Vec<JavaMethod>,
    pub inner_classes: Vec<JavaClass>,
    pub source_file: Option<String>,
}

impl JavaClass {
    pub fn method(&self, name: &str) -> Option<&JavaMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&JavaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn inner_class(&self, name: &str) -> Option<&JavaClass> {
        self.inner_classes.iter().find(|c| c.name == name)
    }
}

/// A method parameter declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaParameter {
    pub param_type: JavaType,
    pub name: String,
    pub is_varargs: bool,
}

/// What a method's body reconstructed to.
#[derive(Clone, Debug, PartialEq)]
pub enum MethodBody {
    Decompiled(StructuredBody),
    /// The method could not be reconstructed; the raw listing stands in.
    Fallback(FallbackBody),
}

impl MethodBody {
    pub fn structured(&self) -> Option<&StructuredBody> {
        match self {
            MethodBody::Decompiled(body) => Some(body),
            MethodBody::Fallback(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FallbackBody {
    pub failure: MethodFailure,
    /// One line per instruction, e.g. `   12: iload 1`.
    pub listing: Vec<String>,
}

/// A Java method declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaMethod {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_abstract: bool,
    pub is_synchronized: bool,
    pub is_native: bool,
    pub is_default: bool,
    pub is_synthetic: bool,
    pub is_bridge: bool,
    pub type_parameters: Vec<TypeParameter>,
    pub return_type: JavaType,
    /// `<init>` and `<clinit>` keep their JVM names.
    pub name: String,
    pub descriptor: String,
    pub parameters: Vec<JavaParameter>,
    pub throws: Vec<JavaType>,
    /// `None` for abstract and native methods.
    pub body: Option<MethodBody>,
    /// Position in the class file's method table.
    pub declared_order: usize,
    pub first_line: Option<u32>,
}

impl JavaMethod {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn structured_body(&self) -> Option<&StructuredBody> {
        self.body.as_ref().and_then(MethodBody::structured)
    }
}

/// A Java field declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct JavaField {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
    pub is_volatile: bool,
    pub is_transient: bool,
    pub is_synthetic: bool,
    pub is_enum_constant: bool,
    pub field_type: JavaType,
    pub name: String,
    pub descriptor: String,
    pub initializer: Option<Expr>,
    /// Constructor arguments of an enum constant, without name and ordinal.
    pub enum_arguments: Vec<Expr>,
    pub declared_order: usize,
}
