//! Declaration assembly.
//!
//! Builds the class, field and method headers of a [`JavaClass`] from its
//! [`ClassModel`], and applies the clean-ups that need a whole class in view:
//! static-initializer folding, hidden compiler members, implicit `super()`
//! calls, and nesting of inner classes.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{DecompileError, Result};
use crate::model::{
    ClassAccessFlags, ClassModel, Code, Constant, FieldAccessFlags, FieldModel, InnerClassAccessFlags, MethodAccessFlags,
    MethodModel,
};

use super::class_decompiler::{DecompileOptions, DecompiledClass};
use super::descriptor::{parse_method_descriptor, parse_type_descriptor, JvmType};
use super::expr::{Expr, InvokeKind, Stmt};
use super::java_ast::*;
use super::signature::{parse_class_signature, parse_field_signature, parse_method_signature};
use super::structured_types::{walk_stmts_mut, StructuredStmt};
use super::type_inference::{parameter_base_name, VariableKind};

const ENUM: &str = "java/lang/Enum";
const RECORD: &str = "java/lang/Record";
const ANNOTATION: &str = "java/lang/annotation/Annotation";
const ENUM_CONSTRUCTOR_PREFIX: &str = "(Ljava/lang/String;I";

/// Build the declaration skeleton of `model`: header, fields and method
/// headers. Method bodies are left empty.
pub fn declare_class(model: &ClassModel) -> Result<JavaClass> {
    if model.name.is_empty() {
        return Err(DecompileError::invalid_input("<class>", "class has no name"));
    }
    let kind = class_kind(model);
    let own = model.own_inner_entry();

    let (package, mut name) = split_class_name(&model.name);
    if let Some(simple) = own.and_then(|ic| ic.simple_name.as_ref()) {
        name = simple.clone();
    }

    let signature = model.signature.as_deref().and_then(|sig| {
        let parsed = parse_class_signature(sig);
        if parsed.is_none() {
            debug!(class = %model.name, signature = sig, "ignoring unparsable class signature");
        }
        parsed
    });
    let (type_parameters, super_class, interfaces) = match signature {
        Some(sig) => (sig.type_parameters, Some(sig.super_class), sig.interfaces),
        None => (
            Vec::new(),
            model.super_name.as_deref().map(JavaType::class),
            model.interfaces.iter().map(|i| JavaType::class(i)).collect(),
        ),
    };
    let implicit_super = match kind {
        ClassKind::Enum => Some(ENUM),
        ClassKind::Record => Some(RECORD),
        _ => None,
    };
    let super_class = super_class.filter(|s| {
        !s.is_object() && implicit_super.map_or(true, |implicit| !same_class(s, implicit))
    });
    let interfaces = interfaces
        .into_iter()
        .filter(|i| !(kind == ClassKind::Annotation && same_class(i, ANNOTATION)))
        .collect();

    let flags = model.access;
    let (visibility, is_static) = match own {
        Some(ic) => (inner_visibility(ic.access), ic.access.contains(InnerClassAccessFlags::STATIC)),
        None => (class_visibility(flags), false),
    };
    let is_final = own.map_or(flags.contains(ClassAccessFlags::FINAL), |ic| {
        ic.access.contains(InnerClassAccessFlags::FINAL)
    });

    let fields = model
        .fields
        .iter()
        .enumerate()
        .map(|(order, field)| declare_field(model, order, field))
        .collect::<Result<Vec<_>>>()?;
    let methods = model
        .methods
        .iter()
        .enumerate()
        .map(|(order, method)| declare_method(model, kind, order, method))
        .collect::<Result<Vec<_>>>()?;

    Ok(JavaClass {
        kind,
        visibility,
        is_final: is_final && matches!(kind, ClassKind::Class | ClassKind::Record),
        is_abstract: flags.contains(ClassAccessFlags::ABSTRACT) && kind == ClassKind::Class,
        is_static: is_static && kind == ClassKind::Class,
        is_synthetic: flags.contains(ClassAccessFlags::SYNTHETIC),
        type_parameters,
        package,
        name,
        internal_name: model.name.clone(),
        super_class,
        interfaces,
        fields,
        methods,
        inner_classes: Vec::new(),
        source_file: model.source_file.clone(),
    })
}

pub fn class_kind(model: &ClassModel) -> ClassKind {
    let flags = model.access;
    if flags.contains(ClassAccessFlags::ANNOTATION) {
        ClassKind::Annotation
    } else if flags.contains(ClassAccessFlags::ENUM) {
        ClassKind::Enum
    } else if flags.contains(ClassAccessFlags::INTERFACE) {
        ClassKind::Interface
    } else if model.super_name.as_deref() == Some(RECORD) {
        ClassKind::Record
    } else {
        ClassKind::Class
    }
}

fn same_class(ty: &JavaType, internal_name: &str) -> bool {
    let (package, name) = split_class_name(internal_name);
    matches!(ty, JavaType::ClassType { package: p, name: n, .. } if *p == package && *n == name)
}

fn class_visibility(flags: ClassAccessFlags) -> Visibility {
    if flags.contains(ClassAccessFlags::PUBLIC) {
        Visibility::Public
    } else {
        Visibility::PackagePrivate
    }
}

fn inner_visibility(flags: InnerClassAccessFlags) -> Visibility {
    if flags.contains(InnerClassAccessFlags::PUBLIC) {
        Visibility::Public
    } else if flags.contains(InnerClassAccessFlags::PROTECTED) {
        Visibility::Protected
    } else if flags.contains(InnerClassAccessFlags::PRIVATE) {
        Visibility::Private
    } else {
        Visibility::PackagePrivate
    }
}

fn method_visibility(flags: MethodAccessFlags) -> Visibility {
    if flags.contains(MethodAccessFlags::PUBLIC) {
        Visibility::Public
    } else if flags.contains(MethodAccessFlags::PROTECTED) {
        Visibility::Protected
    } else if flags.contains(MethodAccessFlags::PRIVATE) {
        Visibility::Private
    } else {
        Visibility::PackagePrivate
    }
}

fn field_visibility(flags: FieldAccessFlags) -> Visibility {
    if flags.contains(FieldAccessFlags::PUBLIC) {
        Visibility::Public
    } else if flags.contains(FieldAccessFlags::PROTECTED) {
        Visibility::Protected
    } else if flags.contains(FieldAccessFlags::PRIVATE) {
        Visibility::Private
    } else {
        Visibility::PackagePrivate
    }
}

/// Source type of every field of `model`, keyed by field name. Generic
/// signatures win over descriptors.
pub fn field_types(model: &ClassModel) -> HashMap<String, JavaType> {
    model
        .fields
        .iter()
        .filter_map(|f| Some((f.name.clone(), field_type(f)?)))
        .collect()
}

fn field_type(field: &FieldModel) -> Option<JavaType> {
    field
        .signature
        .as_deref()
        .and_then(parse_field_signature)
        .or_else(|| parse_type_descriptor(&field.descriptor).map(|t| JavaType::from_jvm(&t)))
}

fn declare_field(model: &ClassModel, order: usize, field: &FieldModel) -> Result<JavaField> {
    let jvm_type = parse_type_descriptor(&field.descriptor).ok_or_else(|| {
        DecompileError::invalid_input(
            format!("{}.{}", model.name, field.name),
            format!("unparsable field descriptor '{}'", field.descriptor),
        )
    })?;
    let field_type = field_type(field).unwrap_or_else(|| JavaType::from_jvm(&jvm_type));
    let flags = field.access;

    Ok(JavaField {
        visibility: field_visibility(flags),
        is_static: flags.contains(FieldAccessFlags::STATIC),
        is_final: flags.contains(FieldAccessFlags::FINAL),
        is_volatile: flags.contains(FieldAccessFlags::VOLATILE),
        is_transient: flags.contains(FieldAccessFlags::TRANSIENT),
        is_synthetic: flags.contains(FieldAccessFlags::SYNTHETIC),
        is_enum_constant: flags.contains(FieldAccessFlags::ENUM),
        field_type,
        name: field.name.clone(),
        descriptor: field.descriptor.clone(),
        initializer: field.constant_value.as_ref().map(|c| constant_initializer(c, &jvm_type)),
        enum_arguments: Vec::new(),
        declared_order: order,
    })
}

/// `ConstantValue` attributes store booleans and chars as ints.
fn constant_initializer(value: &Constant, ty: &JvmType) -> Expr {
    match (value, ty) {
        (Constant::Int(v), JvmType::Boolean) => Expr::BooleanLiteral(*v != 0),
        (Constant::Int(v), JvmType::Char) => Expr::Cast {
            target_type: JvmType::Char,
            operand: Box::new(Expr::IntLiteral(*v)),
        },
        (Constant::Int(v), _) => Expr::IntLiteral(*v),
        (Constant::Long(v), _) => Expr::LongLiteral(*v),
        (Constant::Float(v), _) => Expr::FloatLiteral(*v),
        (Constant::Double(v), _) => Expr::DoubleLiteral(*v),
        (Constant::String(s), _) => Expr::StringLiteral(s.clone()),
        (Constant::Class(c), _) => Expr::ClassLiteral(c.clone()),
        (other, _) => Expr::Unresolved(other.to_string()),
    }
}

/// Number of leading descriptor parameters the compiler added: the name and
/// ordinal of an enum constructor.
fn hidden_parameters(kind: ClassKind, method: &MethodModel) -> usize {
    if kind == ClassKind::Enum && method.is_constructor() && method.descriptor.starts_with(ENUM_CONSTRUCTOR_PREFIX) {
        2
    } else {
        0
    }
}

/// Build a method header. The body is attached later by the class decompiler.
pub fn declare_method(model: &ClassModel, kind: ClassKind, order: usize, method: &MethodModel) -> Result<JavaMethod> {
    let (params, ret) = parse_method_descriptor(&method.descriptor).ok_or_else(|| {
        DecompileError::invalid_input(
            format!("{}.{}", model.name, method.name),
            format!("unparsable method descriptor '{}'", method.descriptor),
        )
    })?;
    let flags = method.access;
    let hidden = hidden_parameters(kind, method).min(params.len());

    let signature = method.signature.as_deref().and_then(|sig| {
        let parsed = parse_method_signature(sig);
        if parsed.is_none() {
            debug!(method = %method.name, signature = sig, "ignoring unparsable method signature");
        }
        parsed
    });
    // javac drops synthetic parameters from the signature, so it lines up
    // with the visible ones or not at all.
    let generic_params = signature
        .as_ref()
        .filter(|s| s.parameters.len() == params.len() - hidden)
        .map(|s| s.parameters.clone());

    let names = parameter_names(method, &params);
    let visible = params.len() - hidden;
    let parameters: Vec<JavaParameter> = params
        .iter()
        .enumerate()
        .skip(hidden)
        .map(|(i, ty)| JavaParameter {
            param_type: generic_params
                .as_ref()
                .and_then(|g| g.get(i - hidden))
                .cloned()
                .unwrap_or_else(|| JavaType::from_jvm(ty)),
            name: names[i].clone(),
            is_varargs: i - hidden + 1 == visible && flags.contains(MethodAccessFlags::VARARGS),
        })
        .collect();

    let throws = match &signature {
        Some(sig) if !sig.throws.is_empty() => sig.throws.clone(),
        _ => method.exceptions.iter().map(|e| JavaType::class(e)).collect(),
    };
    let (type_parameters, return_type) = match signature {
        Some(sig) => (sig.type_parameters, sig.return_type),
        None => (Vec::new(), JavaType::from_jvm(&ret)),
    };

    let is_static = flags.contains(MethodAccessFlags::STATIC);
    let is_abstract = flags.contains(MethodAccessFlags::ABSTRACT);
    Ok(JavaMethod {
        visibility: method_visibility(flags),
        is_static,
        is_final: flags.contains(MethodAccessFlags::FINAL),
        is_abstract,
        is_synchronized: flags.contains(MethodAccessFlags::SYNCHRONIZED),
        is_native: flags.contains(MethodAccessFlags::NATIVE),
        is_default: kind == ClassKind::Interface && !is_abstract && !is_static && !method.is_static_initializer(),
        is_synthetic: flags.contains(MethodAccessFlags::SYNTHETIC),
        is_bridge: flags.contains(MethodAccessFlags::BRIDGE),
        type_parameters,
        return_type,
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
        parameters,
        throws,
        body: None,
        declared_order: order,
        first_line: method.code.as_ref().and_then(first_line),
    })
}

/// Names for every descriptor parameter: `MethodParameters`, then the local
/// variable table, then a name derived from the type.
fn parameter_names(method: &MethodModel, params: &[JvmType]) -> Vec<String> {
    let mut slot: u16 = if method.is_static() { 0 } else { 1 };
    let mut counters: HashMap<String, u32> = HashMap::new();
    let mut names = Vec::with_capacity(params.len());
    for (i, ty) in params.iter().enumerate() {
        let declared = method
            .parameter_names
            .as_ref()
            .and_then(|n| n.get(i))
            .filter(|n| !n.is_empty())
            .cloned();
        let from_lvt = || {
            method
                .code
                .as_ref()
                .and_then(|c| c.local_variables.as_ref())
                .and_then(|lvt| lvt.iter().find(|lv| lv.slot == slot && lv.start == 0))
                .map(|lv| lv.name.clone())
        };
        let name = declared.or_else(from_lvt).unwrap_or_else(|| {
            let base = parameter_base_name(ty);
            let n = counters.entry(base.clone()).or_insert(0);
            *n += 1;
            if *n == 1 {
                base
            } else {
                format!("{}{}", base, *n - 1)
            }
        });
        names.push(name);
        slot += if ty.is_wide() { 2 } else { 1 };
    }
    names
}

fn first_line(code: &Code) -> Option<u32> {
    code.line_numbers.iter().min_by_key(|ln| ln.start).map(|ln| ln.line)
}

/// One line per instruction, for methods that fell back.
pub fn raw_listing(code: &Code) -> Vec<String> {
    code.instructions.iter().map(|insn| insn.to_string()).collect()
}

/// Per-method clean-up once the body is known.
pub fn tidy_method(method: &mut JavaMethod, model: &ClassModel, kind: ClassKind, options: &DecompileOptions) {
    let Some(MethodBody::Decompiled(body)) = &mut method.body else {
        return;
    };

    // The resolver's names account for every local, so they win.
    let mut param_names: Vec<(u16, String)> = body
        .variables
        .iter()
        .filter(|b| b.kind == VariableKind::Parameter)
        .map(|b| (b.slot, b.name.clone()))
        .collect();
    param_names.sort_by_key(|(slot, _)| *slot);
    let skip = param_names.len().saturating_sub(method.parameters.len());
    if param_names.len() - skip == method.parameters.len() {
        for (param, (_, name)) in method.parameters.iter_mut().zip(param_names.into_iter().skip(skip)) {
            param.name = name;
        }
    }

    if method.return_type == JavaType::Void || method.name == "<init>" || method.name == "<clinit>" {
        if matches!(
            body.statements.last().and_then(StructuredStmt::as_simple),
            Some(Stmt::Return(None))
        ) {
            body.statements.pop();
        }
    }

    if method.name == "<init>" {
        let position = body.statements.iter().position(|s| constructor_call(s).is_some());
        if let Some(pos) = position {
            if let Some((class_name, args)) = constructor_call(&body.statements[pos]) {
                let implicit = match kind {
                    ClassKind::Enum => class_name == ENUM,
                    _ => Some(class_name) == model.super_name.as_deref() && args == 0,
                };
                if implicit {
                    trace!(class = %model.name, "dropping implicit super()");
                    body.statements.remove(pos);
                }
            }
        }
    }

    if !options.realign_line_numbers {
        walk_stmts_mut(&mut body.statements, &mut |s| {
            if let StructuredStmt::Simple { span, .. } = s {
                *span = None;
            }
        });
    }
}

/// `super(...)` or `this(...)`: the owner and argument count.
fn constructor_call(stmt: &StructuredStmt) -> Option<(&str, usize)> {
    match stmt.as_simple()? {
        Stmt::ExprStmt(Expr::MethodCall {
            kind: InvokeKind::Special,
            object: Some(object),
            class_name,
            method_name,
            args,
            ..
        }) if method_name == "<init>" && matches!(object.as_ref(), Expr::This) => Some((class_name.as_str(), args.len())),
        _ => None,
    }
}

/// Whole-class clean-up, after every method of `class` has been tidied.
pub fn tidy_class(class: &mut JavaClass, model: &ClassModel, options: &DecompileOptions) {
    fold_static_initializers(class, model);

    if !options.include_synthetic {
        let kind = class.kind;
        let own_array = format!("()[L{};", model.name);
        let own_value_of = format!("(Ljava/lang/String;)L{};", model.name);
        class.fields.retain(|f| {
            let hidden = f.is_synthetic || (kind == ClassKind::Enum && f.name == "$VALUES");
            if hidden {
                trace!(class = %model.name, field = %f.name, "hiding compiler field");
            }
            !hidden
        });
        class.methods.retain(|m| {
            let enum_helper = kind == ClassKind::Enum
                && m.is_static
                && ((m.name == "values" && m.descriptor == own_array)
                    || (m.name == "valueOf" && m.descriptor == own_value_of));
            let empty_enum_constructor = kind == ClassKind::Enum
                && m.name == "<init>"
                && m.parameters.is_empty()
                && m.structured_body().map_or(false, |b| b.statements.is_empty());
            let hidden = m.is_synthetic || m.is_bridge || enum_helper || empty_enum_constructor;
            if hidden {
                trace!(class = %model.name, method = %m.name, "hiding compiler method");
            }
            !hidden
        });
    }
}

/// Move the leading `static` field stores of `<clinit>` into field
/// initializers, keeping source order. Drops the initializer when nothing
/// else is left in it.
fn fold_static_initializers(class: &mut JavaClass, model: &ClassModel) {
    let JavaClass { fields, methods, .. } = class;
    let Some(pos) = methods.iter().position(|m| m.name == "<clinit>") else {
        return;
    };
    let Some(MethodBody::Decompiled(body)) = &mut methods[pos].body else {
        return;
    };

    let nested_prefix = format!("{}$", model.name);
    let mut folded = 0;
    let mut last_order = None;
    for stmt in &body.statements {
        let Some(Stmt::FieldStore {
            object: None,
            class_name,
            field_name,
            value,
            ..
        }) = stmt.as_simple()
        else {
            break;
        };
        if *class_name != model.name || reads_locals(value) {
            break;
        }
        let Some(field) = fields
            .iter_mut()
            .find(|f| f.name == *field_name && f.is_static && f.initializer.is_none() && f.enum_arguments.is_empty())
        else {
            break;
        };
        if last_order.map_or(false, |o| field.declared_order <= o) {
            break;
        }
        last_order = Some(field.declared_order);

        match value {
            Expr::New { class_name: created, args, .. }
                if field.is_enum_constant
                    && (*created == model.name || created.starts_with(&nested_prefix))
                    && args.len() >= 2 =>
            {
                field.enum_arguments = args[2..].to_vec();
            }
            _ => field.initializer = Some(value.clone()),
        }
        trace!(class = %model.name, field = %field.name, "folded static initializer");
        folded += 1;
    }
    body.statements.drain(..folded);

    if body.statements.is_empty() {
        debug!(class = %model.name, "static initializer fully folded");
        methods.remove(pos);
    }
}

fn reads_locals(value: &Expr) -> bool {
    value.any(|e| {
        matches!(
            e,
            Expr::LocalLoad(_) | Expr::Increment { .. } | Expr::CaughtException { .. } | Expr::Unresolved(_)
        )
    })
}

/// Attach every class of a batch to its enclosing class when both decoded
/// successfully. Returns the remaining top-level entries in input order.
pub fn nest_classes(models: &[ClassModel], results: Vec<Result<DecompiledClass>>) -> Vec<Result<DecompiledClass>> {
    let index: HashMap<&str, usize> = models.iter().enumerate().map(|(i, m)| (m.name.as_str(), i)).collect();
    let mut parent: Vec<Option<usize>> = models
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let outer = m.own_inner_entry()?.outer_name.as_deref()?;
            let p = *index.get(outer)?;
            (p != i && results[i].is_ok() && results[p].is_ok()).then_some(p)
        })
        .collect();

    // Break cycles from malformed inner-class tables.
    let mut depth = vec![0usize; models.len()];
    for i in 0..models.len() {
        let mut cursor = parent[i];
        let mut steps = 0;
        while let Some(p) = cursor {
            steps += 1;
            if p == i || steps > models.len() {
                break;
            }
            cursor = parent[p];
        }
        if cursor.is_some() {
            debug!(class = %models[i].name, "inner-class cycle; keeping class at top level");
            parent[i] = None;
            steps = 0;
        }
        depth[i] = steps;
    }

    let mut slots: Vec<Option<Result<DecompiledClass>>> = results.into_iter().map(Some).collect();
    let mut order: Vec<usize> = (0..models.len()).filter(|&i| parent[i].is_some()).collect();
    order.sort_by(|a, b| depth[*b].cmp(&depth[*a]).then(a.cmp(b)));
    for child in order {
        let Some(p) = parent[child] else { continue };
        let Some(Ok(nested)) = slots[child].take() else { continue };
        match &mut slots[p] {
            Some(Ok(outer)) => {
                trace!(outer = %models[p].name, inner = %models[child].name, "attached nested class");
                outer.class.inner_classes.push(nested.class);
                outer.failures.extend(nested.failures);
            }
            _ => slots[child] = Some(Ok(nested)),
        }
    }
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;

    fn enum_model() -> ClassModel {
        let mut model = ClassModel::new("demo/Color");
        model.access = ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::SUPER | ClassAccessFlags::ENUM;
        model.super_name = Some("java/lang/Enum".into());
        model.signature = Some("Ljava/lang/Enum<Ldemo/Color;>;".into());
        model
    }

    #[test]
    fn test_class_header() {
        let mut model = ClassModel::new("demo/Box");
        model.signature = Some("<T:Ljava/lang/Number;>Ljava/lang/Object;Ljava/lang/Comparable<Ldemo/Box<TT;>;>;".into());
        model.interfaces = vec!["java/lang/Comparable".into()];
        let class = declare_class(&model).unwrap();
        assert_eq!(class.kind, ClassKind::Class);
        assert_eq!(class.package.as_deref(), Some("demo"));
        assert_eq!(class.name, "Box");
        assert!(class.super_class.is_none());
        assert_eq!(class.type_parameters[0].bounds[0].display_name(), "Number");
        assert_eq!(class.interfaces[0].display_name(), "Comparable<Box<T>>");
    }

    #[test]
    fn test_enum_header_drops_implicit_super() {
        let class = declare_class(&enum_model()).unwrap();
        assert_eq!(class.kind, ClassKind::Enum);
        assert!(class.super_class.is_none());
        assert!(!class.is_final);
    }

    #[test]
    fn test_nested_class_uses_inner_entry() {
        let mut model = ClassModel::new("demo/Outer$Inner");
        model.access = ClassAccessFlags::SUPER;
        model.inner_classes.push(InnerClassRef {
            inner_name: "demo/Outer$Inner".into(),
            outer_name: Some("demo/Outer".into()),
            simple_name: Some("Inner".into()),
            access: InnerClassAccessFlags::PRIVATE | InnerClassAccessFlags::STATIC,
        });
        let class = declare_class(&model).unwrap();
        assert_eq!(class.name, "Inner");
        assert_eq!(class.visibility, Visibility::Private);
        assert!(class.is_static);
    }

    #[test]
    fn test_field_declarations() {
        let mut flag = FieldModel::new("DEBUG", "Z", FieldAccessFlags::STATIC | FieldAccessFlags::FINAL);
        flag.constant_value = Some(Constant::Int(1));
        let mut items = FieldModel::new("items", "Ljava/util/List;", FieldAccessFlags::PRIVATE);
        items.signature = Some("Ljava/util/List<Ljava/lang/String;>;".into());
        let model = ClassModel::new("demo/Holder").with_field(flag).with_field(items);

        let class = declare_class(&model).unwrap();
        assert_eq!(class.fields[0].initializer, Some(Expr::BooleanLiteral(true)));
        assert_eq!(class.fields[1].field_type.display_name(), "List<String>");
        assert_eq!(class.fields[1].declared_order, 1);
        assert_eq!(field_types(&model)["items"].display_name(), "List<String>");
    }

    #[test]
    fn test_bad_field_descriptor_is_invalid_input() {
        let model = ClassModel::new("demo/Bad").with_field(FieldModel::new("x", "Q", FieldAccessFlags::empty()));
        assert!(matches!(declare_class(&model), Err(DecompileError::InvalidInput { .. })));
    }

    #[test]
    fn test_method_header() {
        let mut method = MethodModel::new(
            "pick",
            "(Ljava/util/List;[Ljava/lang/String;)Ljava/lang/Object;",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::VARARGS,
        );
        method.signature = Some("<E:Ljava/lang/Object;>(Ljava/util/List<TE;>;[Ljava/lang/String;)TE;".into());
        method.exceptions = vec!["java/io/IOException".into()];
        let model = ClassModel::new("demo/Picker");

        let java = declare_method(&model, ClassKind::Class, 3, &method).unwrap();
        assert_eq!(java.type_parameters[0].name, "E");
        assert_eq!(java.return_type, JavaType::TypeVariable("E".into()));
        assert_eq!(java.parameters[0].param_type.display_name(), "List<E>");
        assert_eq!(java.parameters[0].name, "paramList");
        assert!(java.parameters[1].is_varargs);
        assert_eq!(java.throws[0].display_name(), "IOException");
        assert_eq!(java.declared_order, 3);
    }

    #[test]
    fn test_enum_constructor_hides_name_and_ordinal() {
        let ctor = MethodModel::new("<init>", "(Ljava/lang/String;II)V", MethodAccessFlags::PRIVATE);
        let java = declare_method(&enum_model(), ClassKind::Enum, 0, &ctor).unwrap();
        assert_eq!(java.parameters.len(), 1);
        assert_eq!(java.parameters[0].param_type, JavaType::Primitive(PrimitiveType::Int));
    }

    #[test]
    fn test_interface_default_method() {
        let mut model = ClassModel::new("demo/Shape");
        model.access = ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT;
        let area = MethodModel::new("area", "()D", MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT);
        let describe = MethodModel::new("describe", "()Ljava/lang/String;", MethodAccessFlags::PUBLIC);
        let class = declare_class(&model.with_method(area).with_method(describe)).unwrap();
        assert!(!class.methods[0].is_default);
        assert!(class.methods[1].is_default);
    }

    #[test]
    fn test_raw_listing() {
        let mut b = CodeBuilder::new();
        b.iconst(1).return_value(ValueKind::Int);
        let code = b.build().unwrap();
        let listing = raw_listing(&code);
        assert_eq!(listing.len(), 2);
        assert!(listing[0].starts_with("    0: "));
    }
}
