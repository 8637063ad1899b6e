use super::flags::*;
use super::instruction::{Constant, Instruction};

/// A decoded class: the unit the decompiler turns into one declaration tree.
#[derive(Clone, Debug, Default)]
pub struct ClassModel {
    /// Internal name, e.g. `com/example/Foo$Bar`.
    pub name: String,
    pub access: ClassAccessFlags,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub signature: Option<String>,
    pub source_file: Option<String>,
    pub fields: Vec<FieldModel>,
    pub methods: Vec<MethodModel>,
    pub inner_classes: Vec<InnerClassRef>,
}

impl ClassModel {
    /// A public class extending `java/lang/Object` with no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            super_name: Some("java/lang/Object".to_string()),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: MethodModel) -> Self {
        self.methods.push(method);
        self
    }

    pub fn with_field(mut self, field: FieldModel) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(&self, name: &str) -> Option<&MethodModel> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn is_interface(&self) -> bool {
        self.access.contains(ClassAccessFlags::INTERFACE)
    }

    /// The entry describing this class itself in its own inner-class table.
    pub fn own_inner_entry(&self) -> Option<&InnerClassRef> {
        self.inner_classes.iter().find(|ic| ic.inner_name == self.name)
    }
}

/// One `InnerClasses` table entry.
#[derive(Clone, Debug, PartialEq)]
pub struct InnerClassRef {
    pub inner_name: String,
    pub outer_name: Option<String>,
    /// `None` for anonymous classes.
    pub simple_name: Option<String>,
    pub access: InnerClassAccessFlags,
}

#[derive(Clone, Debug, Default)]
pub struct FieldModel {
    pub name: String,
    pub descriptor: String,
    pub access: FieldAccessFlags,
    pub signature: Option<String>,
    pub constant_value: Option<Constant>,
}

impl FieldModel {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>, access: FieldAccessFlags) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            access,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MethodModel {
    pub name: String,
    pub descriptor: String,
    pub access: MethodAccessFlags,
    pub signature: Option<String>,
    /// Internal names from the `Exceptions` attribute.
    pub exceptions: Vec<String>,
    /// Names from the `MethodParameters` attribute, in declaration order.
    pub parameter_names: Option<Vec<String>>,
    pub code: Option<Code>,
}

impl MethodModel {
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>, access: MethodAccessFlags) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            access,
            ..Default::default()
        }
    }

    pub fn with_code(mut self, code: Code) -> Self {
        self.code = Some(code);
        self
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }
}

/// The decoded `Code` attribute of a method.
#[derive(Clone, Debug, Default)]
pub struct Code {
    pub instructions: Vec<Instruction>,
    pub exception_table: Vec<ExceptionHandler>,
    /// `LocalVariableTable` merged with `LocalVariableTypeTable`; `None` when absent.
    pub local_variables: Option<Vec<LocalVariable>>,
    pub line_numbers: Vec<LineNumber>,
}

impl Code {
    /// Source line of the instruction at `offset`, from the line number table.
    pub fn line_at(&self, offset: u32) -> Option<u32> {
        self.line_numbers
            .iter()
            .filter(|ln| ln.start <= offset)
            .max_by_key(|ln| ln.start)
            .map(|ln| ln.line)
    }

    /// Offset of the instruction following the one at `offset`.
    pub fn next_offset(&self, offset: u32) -> Option<u32> {
        let idx = self
            .instructions
            .binary_search_by_key(&offset, |i| i.offset)
            .ok()?;
        self.instructions.get(idx + 1).map(|i| i.offset)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionHandler {
    pub start: u32,
    /// Exclusive.
    pub end: u32,
    pub handler: u32,
    /// Internal name of the caught class; `None` catches everything.
    pub catch_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalVariable {
    pub start: u32,
    pub length: u32,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub slot: u16,
}

impl LocalVariable {
    pub fn covers(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.start + self.length
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineNumber {
    pub start: u32,
    pub line: u32,
}
