use classfile_decompiler::decompile::java_ast::Visibility;

use super::*;

const COLOR: &str = "demo/Color";

/// `enum Color { RED, GREEN }` as javac lays it out.
fn color_enum() -> ClassModel {
    let constant = FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL | FieldAccessFlags::ENUM;
    let values_field = FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL | FieldAccessFlags::SYNTHETIC;

    let mut clinit = CodeBuilder::new();
    for (ordinal, name) in ["RED", "GREEN"].iter().enumerate() {
        clinit
            .new_object(COLOR)
            .op(Op::Dup)
            .ldc_string(name)
            .iconst(ordinal as i32)
            .invoke_special(COLOR, "<init>", "(Ljava/lang/String;I)V")
            .put_static(COLOR, name, "Ldemo/Color;");
    }
    clinit
        .invoke_static(COLOR, "$values", "()[Ldemo/Color;")
        .put_static(COLOR, "$VALUES", "[Ldemo/Color;")
        .return_void();

    let mut ctor = CodeBuilder::new();
    ctor.load(ValueKind::Reference, 0)
        .load(ValueKind::Reference, 1)
        .load(ValueKind::Int, 2)
        .invoke_special("java/lang/Enum", "<init>", "(Ljava/lang/String;I)V")
        .return_void();

    let mut values = CodeBuilder::new();
    values
        .get_static(COLOR, "$VALUES", "[Ldemo/Color;")
        .return_value(ValueKind::Reference);

    let mut value_of = CodeBuilder::new();
    value_of
        .op(Op::Const(Constant::Class(COLOR.into())))
        .load(ValueKind::Reference, 0)
        .invoke_static(
            "java/lang/Enum",
            "valueOf",
            "(Ljava/lang/Class;Ljava/lang/String;)Ljava/lang/Enum;",
        )
        .check_cast(COLOR)
        .return_value(ValueKind::Reference);

    let public_static = MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC;
    let mut class = ClassModel::new(COLOR)
        .with_field(FieldModel::new("RED", "Ldemo/Color;", constant))
        .with_field(FieldModel::new("GREEN", "Ldemo/Color;", constant))
        .with_field(FieldModel::new("$VALUES", "[Ldemo/Color;", values_field))
        .with_method(MethodModel::new("values", "()[Ldemo/Color;", public_static).with_code(values.build().unwrap()))
        .with_method(
            MethodModel::new("valueOf", "(Ljava/lang/String;)Ldemo/Color;", public_static)
                .with_code(value_of.build().unwrap()),
        )
        .with_method(
            MethodModel::new("<init>", "(Ljava/lang/String;I)V", MethodAccessFlags::PRIVATE)
                .with_code(ctor.build().unwrap()),
        )
        .with_method(MethodModel::new("<clinit>", "()V", MethodAccessFlags::STATIC).with_code(clinit.build().unwrap()));
    class.access = ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL | ClassAccessFlags::SUPER | ClassAccessFlags::ENUM;
    class.super_name = Some("java/lang/Enum".into());
    class.signature = Some("Ljava/lang/Enum<Ldemo/Color;>;".into());
    class
}

#[test]
fn test_enum_declaration() {
    let result = decompile_one(&color_enum());
    assert!(result.failures.is_empty(), "unexpected failures: {:?}", result.failures);
    let class = result.class;

    assert_eq!(class.kind, ClassKind::Enum);
    assert_eq!(class.super_class, None);
    let names: Vec<&str> = class.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["RED", "GREEN"]);
    assert!(class.fields.iter().all(|f| f.is_enum_constant && f.initializer.is_none() && f.enum_arguments.is_empty()));
    assert!(class.methods.is_empty(), "compiler methods left: {:?}", class.methods);
}

#[test]
fn test_enum_compiler_members_shown_on_request() {
    let options = DecompileOptions {
        include_synthetic: true,
        ..DecompileOptions::default()
    };
    let class = decompile_with(&color_enum(), options).class;

    let values = class.field("$VALUES").unwrap();
    assert!(values.is_synthetic);
    assert!(matches!(values.initializer, Some(Expr::MethodCall { .. })));
    assert!(class.method("values").is_some());
    assert!(class.method("valueOf").is_some());
    let ctor = class.method("<init>").unwrap();
    assert!(ctor.parameters.is_empty());
    assert!(ctor.structured_body().unwrap().statements.is_empty());
}

#[test]
fn test_static_initializer_folds_into_fields() {
    let mut clinit = CodeBuilder::new();
    clinit
        .ldc_string("app")
        .invoke_static("java/lang/System", "getProperty", "(Ljava/lang/String;)Ljava/lang/String;")
        .put_static("demo/Config", "NAME", "Ljava/lang/String;")
        .iconst(3)
        .put_static("demo/Config", "RETRIES", "I")
        .invoke_static("demo/Config", "load", "()V")
        .return_void();
    let shared = FieldAccessFlags::PUBLIC | FieldAccessFlags::STATIC | FieldAccessFlags::FINAL;
    let class = ClassModel::new("demo/Config")
        .with_field(FieldModel::new("NAME", "Ljava/lang/String;", shared))
        .with_field(FieldModel::new("RETRIES", "I", FieldAccessFlags::STATIC))
        .with_method(MethodModel::new("<clinit>", "()V", MethodAccessFlags::STATIC).with_code(clinit.build().unwrap()));
    let class = decompile_one(&class).class;

    assert!(matches!(
        class.field("NAME").unwrap().initializer,
        Some(Expr::MethodCall { ref method_name, .. }) if method_name == "getProperty"
    ));
    assert_eq!(class.field("RETRIES").unwrap().initializer, Some(Expr::IntLiteral(3)));

    // The trailing call has no field to go to, so the initializer stays.
    let stmts = statements(&class, "<clinit>");
    assert_eq!(stmts.len(), 1, "got {:?}", stmts);
}

#[test]
fn test_implicit_super_call_removed() {
    let class = ClassModel::new("demo/Plain").with_method(default_constructor());
    let class = decompile_one(&class).class;
    let ctor = class.method("<init>").unwrap();
    assert!(ctor.is_constructor());
    assert_eq!(ctor.visibility, Visibility::Public);
    assert!(ctor.structured_body().unwrap().statements.is_empty());
}

#[test]
fn test_explicit_super_call_kept() {
    let mut b = CodeBuilder::new();
    b.load(ValueKind::Reference, 0)
        .ldc_string("boom")
        .invoke_special("java/lang/RuntimeException", "<init>", "(Ljava/lang/String;)V")
        .return_void();
    let mut class = ClassModel::new("demo/Boom")
        .with_method(MethodModel::new("<init>", "()V", MethodAccessFlags::PUBLIC).with_code(b.build().unwrap()));
    class.super_name = Some("java/lang/RuntimeException".into());
    let class = decompile_one(&class).class;

    let stmts = statements(&class, "<init>");
    assert_eq!(stmts.len(), 1);
    let Some(Stmt::ExprStmt(Expr::MethodCall { object, method_name, .. })) = stmts[0].as_simple() else {
        panic!("expected the super call, got {:?}", stmts);
    };
    assert_eq!(method_name, "<init>");
    assert_eq!(object.as_deref(), Some(&Expr::This));
}

#[test]
fn test_nested_classes_attach_to_outer() {
    let entry = InnerClassRef {
        inner_name: "demo/Outer$Inner".into(),
        outer_name: Some("demo/Outer".into()),
        simple_name: Some("Inner".into()),
        access: InnerClassAccessFlags::PRIVATE | InnerClassAccessFlags::STATIC,
    };
    let mut outer = ClassModel::new("demo/Outer").with_method(default_constructor());
    outer.inner_classes.push(entry.clone());
    let mut inner = ClassModel::new("demo/Outer$Inner").with_method(underflow_method());
    inner.inner_classes.push(entry);
    let other = ClassModel::new("demo/Other");

    let results = Decompiler::new(DecompileOptions::default()).decompile_classes(&[inner, outer, other]);
    assert_eq!(results.len(), 2);
    let outer = results[0].as_ref().unwrap();
    assert_eq!(outer.class.name, "Outer");
    let nested = outer.class.inner_class("Inner").unwrap();
    assert!(nested.is_static);
    assert_eq!(nested.visibility, Visibility::Private);
    assert_eq!(outer.failures.len(), 1);
    assert_eq!(outer.failures[0].class_name, "demo/Outer$Inner");
    assert_eq!(results[1].as_ref().unwrap().class.name, "Other");
}

#[test]
fn test_line_numbers_kept_on_request() {
    let mut b = CodeBuilder::new();
    b.line(7).invoke_static(FLOW, "tick", "()V");
    b.line(8).return_void();
    let class = ClassModel::new(FLOW).with_method(static_method("lined", "()V", &b));

    let plain = decompile_one(&class).class;
    assert_eq!(plain.method("lined").unwrap().first_line, Some(7));
    let mut spans = 0;
    walk_stmts(statements(&plain, "lined"), &mut |s| {
        if let StructuredStmt::Simple { span: Some(_), .. } = s {
            spans += 1;
        }
    });
    assert_eq!(spans, 0);

    let options = DecompileOptions {
        realign_line_numbers: true,
        ..DecompileOptions::default()
    };
    let aligned = decompile_with(&class, options).class;
    let stmts = statements(&aligned, "lined");
    let StructuredStmt::Simple { span: Some(span), .. } = &stmts[0] else {
        panic!("expected a span, got {:?}", stmts);
    };
    assert_eq!(span.line, Some(7));
}
