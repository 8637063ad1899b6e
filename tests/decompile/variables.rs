use classfile_decompiler::decompile::descriptor::JvmType;
use classfile_decompiler::decompile::type_inference::VariableKind;

use super::*;

fn body_of<'a>(result: &'a DecompiledClass, method: &str) -> &'a classfile_decompiler::decompile::structured_types::StructuredBody {
    result
        .class
        .method(method)
        .and_then(|m| m.structured_body())
        .unwrap_or_else(|| panic!("{} did not decompile", method))
}

#[test]
fn test_reused_slot_becomes_two_variables() {
    // int i = 1; use(i); String str = "x"; use(str);
    let mut b = CodeBuilder::new();
    b.iconst(1)
        .store(ValueKind::Int, 0)
        .load(ValueKind::Int, 0)
        .invoke_static(FLOW, "use", "(I)V")
        .ldc_string("x")
        .store(ValueKind::Reference, 0)
        .load(ValueKind::Reference, 0)
        .invoke_static(FLOW, "use", "(Ljava/lang/String;)V")
        .return_void();
    let class = ClassModel::new(FLOW).with_method(static_method("reuse", "()V", &b));
    let result = decompile_one(&class);
    let body = body_of(&result, "reuse");

    assert_eq!(body.variables.len(), 2);
    let int_var = body.variable_named("i").unwrap();
    let str_var = body.variable_named("str").unwrap();
    assert_eq!(int_var.slot, str_var.slot);
    assert_eq!(int_var.jvm_type, JvmType::Int);
    assert!(str_var.jvm_type.is_string());
    assert_eq!(
        count_matching(&body.statements, |s| matches!(s.as_simple(), Some(Stmt::Declare { .. }))),
        2
    );
}

#[test]
fn test_parameters_then_locals() {
    let class = decompile_one(&flow_class());
    let body = body_of(&class, "sum");
    let kinds: Vec<VariableKind> = body.variables.iter().map(|v| v.kind).collect();
    assert_eq!(kinds, vec![VariableKind::Parameter, VariableKind::Local, VariableKind::Local]);
    assert_eq!(body.variables[0].name, "paramInt");

    let method = class.class.method("sum").unwrap();
    assert_eq!(method.parameters.len(), 1);
    assert_eq!(method.parameters[0].name, "paramInt");
}

#[test]
fn test_debug_names_win() {
    let mut b = CodeBuilder::new();
    let start = b.here();
    b.load(ValueKind::Int, 0).iconst(2).arith(ArithOp::Mul, ValueKind::Int);
    b.store(ValueKind::Int, 1);
    let scope = b.here();
    b.load(ValueKind::Int, 1).return_value(ValueKind::Int);
    let end = b.here();
    b.local_variable(start, end, 0, "count", "I", None);
    b.local_variable(scope, end, 1, "doubled", "I", None);
    let class = ClassModel::new(FLOW).with_method(static_method("twice", "(I)I", &b));
    let result = decompile_one(&class);

    let method = result.class.method("twice").unwrap();
    assert_eq!(method.parameters[0].name, "count");
    let body = body_of(&result, "twice");
    assert!(body.variable_named("doubled").is_some());
}

#[test]
fn test_dup_store_becomes_assignment_expression() {
    // return (i = n * 2) + i;
    let mut b = CodeBuilder::new();
    b.load(ValueKind::Int, 0)
        .iconst(2)
        .arith(ArithOp::Mul, ValueKind::Int)
        .op(Op::Dup)
        .store(ValueKind::Int, 1)
        .load(ValueKind::Int, 1)
        .arith(ArithOp::Add, ValueKind::Int)
        .return_value(ValueKind::Int);
    let class = ClassModel::new(FLOW).with_method(static_method("chain", "(I)I", &b));
    let result = decompile_one(&class);
    assert!(result.failures.is_empty());

    let stmts = statements(&result.class, "chain");
    let has_assign = stmts
        .iter()
        .filter_map(StructuredStmt::as_simple)
        .any(|s| s.exprs().iter().any(|e| e.any(|e| matches!(e, Expr::Assign { .. }))));
    assert!(has_assign, "got {:?}", stmts);
}

#[test]
fn test_receiver_is_this() {
    let mut b = CodeBuilder::new();
    b.load(ValueKind::Reference, 0)
        .get_field("demo/Point", "x", "I")
        .return_value(ValueKind::Int);
    let getter = MethodModel::new("getX", "()I", MethodAccessFlags::PUBLIC).with_code(b.build().unwrap());
    let class = ClassModel::new("demo/Point")
        .with_field(FieldModel::new("x", "I", FieldAccessFlags::PRIVATE))
        .with_method(getter);
    let result = decompile_one(&class);

    let stmts = statements(&result.class, "getX");
    let Some(Stmt::Return(Some(Expr::FieldGet { object: Some(object), field_name, .. }))) = stmts[0].as_simple() else {
        panic!("expected a field read, got {:?}", stmts);
    };
    assert_eq!(**object, Expr::This);
    assert_eq!(field_name, "x");
    assert_eq!(body_of(&result, "getX").variables[0].kind, VariableKind::This);
}

#[test]
fn test_loop_counter_slot_reused_for_object() {
    // for (int i = 0; i < n; i++) tick(); Object o = make(); use(o);
    let mut b = CodeBuilder::new();
    let head = b.new_label();
    let done = b.new_label();
    b.iconst(0).store(ValueKind::Int, 1);
    b.bind(head);
    b.load(ValueKind::Int, 1).load(ValueKind::Int, 0).if_icmp(Condition::Ge, done);
    b.invoke_static(FLOW, "tick", "()V").iinc(1, 1).goto(head);
    b.bind(done);
    b.invoke_static(FLOW, "make", "()Ljava/lang/Object;")
        .store(ValueKind::Reference, 1)
        .load(ValueKind::Reference, 1)
        .invoke_static(FLOW, "use", "(Ljava/lang/Object;)V")
        .return_void();
    let class = ClassModel::new(FLOW).with_method(static_method("count", "(I)V", &b));
    let result = decompile_one(&class);
    assert!(result.failures.is_empty(), "unexpected failures: {:?}", result.failures);

    let body = body_of(&result, "count");
    let in_slot: Vec<&JvmType> = body.variables.iter().filter(|v| v.slot == 1).map(|v| &v.jvm_type).collect();
    assert_eq!(in_slot.len(), 2, "got {:?}", body.variables);
    assert!(in_slot.contains(&&JvmType::Int));
    assert!(in_slot.contains(&&JvmType::Reference("java/lang/Object".into())));
    assert!(body.variable_named("i").is_some());
    assert!(find_stmt(&body.statements, |s| matches!(s, StructuredStmt::For { .. })).is_some());
}
