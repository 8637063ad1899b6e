use super::*;

#[test]
fn test_stack_underflow_falls_back_to_listing() {
    let class = ClassModel::new(FLOW).with_method(underflow_method());
    let result = decompile_one(&class);

    assert_eq!(result.failures.len(), 1);
    let failure = &result.failures[0];
    assert_eq!(failure.kind, FailureKind::Simulation);
    assert_eq!(failure.offset, 0);
    assert_eq!(failure.method_name, "broken");
    assert!(failure.fell_back);

    let Some(MethodBody::Fallback(fallback)) = &result.class.method("broken").unwrap().body else {
        panic!("expected a fallback body");
    };
    assert_eq!(&fallback.failure, failure);
    assert_eq!(fallback.listing.len(), 2);
    assert!(fallback.listing[0].contains("pop"));
}

#[test]
fn test_one_bad_method_does_not_spoil_the_class() {
    let mut class = flow_class().with_method(underflow_method());
    class.methods.swap(3, 11);
    let result = decompile_one(&class);

    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].method_name, "broken");
    let decompiled = result
        .class
        .methods
        .iter()
        .filter(|m| matches!(m.body, Some(MethodBody::Decompiled(_))))
        .count();
    assert_eq!(decompiled, result.class.methods.len() - 1);
    assert_eq!(result.class.methods[3].name, "broken");
}

#[test]
fn test_bad_branch_target_is_invalid_input() {
    let mut b = CodeBuilder::new();
    b.iconst(0).op(Op::Pop).return_void();
    let mut code = b.build().unwrap();
    code.instructions[1].op = Op::Goto(999);
    let method = MethodModel::new("jump", "()V", MethodAccessFlags::STATIC).with_code(code);
    let class = ClassModel::new(FLOW).with_method(method);

    let err = Decompiler::new(DecompileOptions::default())
        .decompile_class(&class)
        .unwrap_err();
    let DecompileError::InvalidInput { location, message } = &err else {
        panic!("expected invalid input, got {:?}", err);
    };
    assert!(location.contains("jump"), "location: {}", location);
    assert!(message.contains("999"), "message: {}", message);
}

#[test]
fn test_irreducible_region_keeps_the_rest() {
    let mut b = CodeBuilder::new();
    let la = b.new_label();
    let lb = b.new_label();
    let lr = b.new_label();
    b.load(ValueKind::Int, 0).if_zero(Condition::Eq, lb);
    b.bind(la);
    b.iinc(1, 1).load(ValueKind::Int, 0).if_zero(Condition::Eq, lr);
    b.bind(lb);
    b.iinc(1, -1).load(ValueKind::Int, 1).if_zero(Condition::Ne, la);
    b.bind(lr);
    b.return_void();
    let class = ClassModel::new(FLOW).with_method(static_method("tangle", "(II)V", &b));
    let result = decompile_one(&class);

    assert!(!result.failures.is_empty());
    assert!(result
        .failures
        .iter()
        .all(|f| f.kind == FailureKind::Structuring && !f.fell_back));
    let stmts = statements(&result.class, "tangle");
    assert!(count_matching(stmts, |s| matches!(s, StructuredStmt::UnstructuredGoto { .. })) > 0);
}

#[test]
fn test_missing_method() {
    let err = Decompiler::new(DecompileOptions::default())
        .decompile_method(&flow_class(), "absent")
        .unwrap_err();
    assert!(matches!(err, DecompileError::MethodNotFound { ref method, .. } if method == "absent"));
}

#[test]
fn test_single_method_matches_class_output() {
    let model = flow_class();
    let whole = decompile_one(&model);
    let single = Decompiler::new(DecompileOptions::default())
        .decompile_method(&model, "sum(I)I")
        .unwrap();
    assert!(single.failures.is_empty());
    assert_eq!(Some(&single.method), whole.class.method("sum"));
}

#[test]
fn test_output_independent_of_worker_count() {
    let model = flow_class().with_method(underflow_method());
    let serial = DecompileOptions {
        worker_threads: 1,
        ..DecompileOptions::default()
    };
    let parallel = DecompileOptions {
        worker_threads: 4,
        ..DecompileOptions::default()
    };

    let expected = decompile_with(&model, serial.clone());
    for _ in 0..3 {
        assert_eq!(decompile_with(&model, parallel.clone()), expected);
    }

    let batch = vec![model.clone(), ClassModel::new("demo/Other").with_method(default_constructor())];
    let serial_batch = Decompiler::new(serial).decompile_classes(&batch);
    let parallel_batch = Decompiler::new(parallel).decompile_classes(&batch);
    assert_eq!(serial_batch, parallel_batch);
}

#[test]
fn test_unknown_opcode_falls_back_alone() {
    let mut b = CodeBuilder::new();
    b.invoke_static(FLOW, "tick", "()V").op(Op::Unknown(0xcb)).return_void();
    let class = flow_class().with_method(static_method("mystery", "()V", &b));
    let result = decompile_one(&class);

    assert_eq!(result.failures.len(), 1, "got {:?}", result.failures);
    let failure = &result.failures[0];
    assert_eq!(failure.kind, FailureKind::UnsupportedPattern);
    assert_eq!(failure.method_name, "mystery");
    assert_eq!(failure.offset, 3);
    assert!(failure.fell_back);

    let Some(MethodBody::Fallback(fallback)) = &result.class.method("mystery").unwrap().body else {
        panic!("expected a fallback body");
    };
    assert!(fallback.listing.iter().any(|line| line.contains("unknown opcode 0xcb")));
    let decompiled = result
        .class
        .methods
        .iter()
        .filter(|m| matches!(m.body, Some(MethodBody::Decompiled(_))))
        .count();
    assert_eq!(decompiled, result.class.methods.len() - 1);
}

#[test]
fn test_stack_depth_disagreement_at_join() {
    // One arm leaves an int on the stack, the other leaves nothing.
    let mut b = CodeBuilder::new();
    let join = b.new_label();
    b.load(ValueKind::Int, 0).if_zero(Condition::Eq, join);
    b.iconst(1);
    b.bind(join);
    b.return_void();
    let class = ClassModel::new(FLOW).with_method(static_method("lopsided", "(I)V", &b));
    let result = decompile_one(&class);

    assert_eq!(result.failures.len(), 1, "got {:?}", result.failures);
    assert_eq!(result.failures[0].kind, FailureKind::Simulation);
    assert!(result.failures[0].message.contains("depth"), "{}", result.failures[0].message);
    assert!(result.failures[0].fell_back);
}

#[test]
fn test_overlapping_slot_lifetimes() {
    // Slot 1 holds an int that stays live across a branch where the same
    // slot briefly holds a string.
    let mut b = CodeBuilder::new();
    let later = b.new_label();
    b.iconst(1).store(ValueKind::Int, 1);
    b.load(ValueKind::Int, 0).if_zero(Condition::Eq, later);
    b.ldc_string("x")
        .store(ValueKind::Reference, 1)
        .load(ValueKind::Reference, 1)
        .invoke_static(FLOW, "use", "(Ljava/lang/Object;)V")
        .return_void();
    b.bind(later);
    b.load(ValueKind::Int, 1).invoke_static(FLOW, "use", "(I)V").return_void();
    let class = ClassModel::new(FLOW).with_method(static_method("clash", "(I)V", &b));
    let result = decompile_one(&class);

    assert_eq!(result.failures.len(), 1, "got {:?}", result.failures);
    let failure = &result.failures[0];
    assert_eq!(failure.kind, FailureKind::Simulation);
    assert!(failure.message.contains("overlap"), "{}", failure.message);
    assert!(matches!(
        result.class.method("clash").unwrap().body,
        Some(MethodBody::Fallback(_))
    ));
}

#[test]
fn test_out_of_temporary_slots() {
    let mut b = CodeBuilder::new();
    b.iconst(0).store(ValueKind::Int, 65534);
    b.invoke_static(FLOW, "next", "()I")
        .op(Op::Dup)
        .invoke_static(FLOW, "use", "(I)V")
        .invoke_static(FLOW, "use", "(I)V")
        .return_void();
    let class = ClassModel::new(FLOW).with_method(static_method("crowded", "()V", &b));
    let result = decompile_one(&class);

    assert_eq!(result.failures.len(), 1, "got {:?}", result.failures);
    assert_eq!(result.failures[0].kind, FailureKind::Simulation);
    assert!(result.failures[0].fell_back);
}
