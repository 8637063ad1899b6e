use super::*;

fn flow() -> JavaClass {
    decompile_one(&flow_class()).class
}

#[test]
fn test_try_catch() {
    let class = flow();
    let stmts = statements(&class, "parse");
    let Some(StructuredStmt::TryCatch {
        try_body,
        catches,
        finally_body,
    }) = find_stmt(stmts, |s| matches!(s, StructuredStmt::TryCatch { .. }))
    else {
        panic!("expected try/catch, got {:?}", stmts);
    };
    assert!(finally_body.is_none());
    assert!(matches!(try_body.last().and_then(StructuredStmt::as_simple), Some(Stmt::Return(Some(_)))));
    assert_eq!(catches.len(), 1);
    assert_eq!(catches[0].exception_types, vec!["java/lang/NumberFormatException".to_string()]);
    assert!(matches!(
        catches[0].body.last().and_then(StructuredStmt::as_simple),
        Some(Stmt::Return(Some(Expr::IntLiteral(-1))))
    ));
}

#[test]
fn test_try_finally_strips_inlined_copies() {
    let class = flow();
    let stmts = statements(&class, "guarded");
    let Some(StructuredStmt::TryCatch {
        try_body,
        catches,
        finally_body: Some(finally_body),
    }) = find_stmt(stmts, |s| matches!(s, StructuredStmt::TryCatch { .. }))
    else {
        panic!("expected try/finally, got {:?}", stmts);
    };
    assert!(catches.is_empty());
    assert_eq!(try_body.len(), 1, "finally copy left in try body: {:?}", try_body);
    assert_eq!(finally_body.len(), 1);
    let Some(Stmt::ExprStmt(Expr::MethodCall { method_name, .. })) = finally_body[0].as_simple() else {
        panic!("expected a call in finally, got {:?}", finally_body);
    };
    assert_eq!(method_name, "done");

    let done_calls = count_matching(stmts, |s| {
        matches!(s.as_simple(), Some(Stmt::ExprStmt(Expr::MethodCall { method_name, .. })) if method_name == "done")
    });
    assert_eq!(done_calls, 1);
}

#[test]
fn test_synchronized_block() {
    let class = flow();
    let stmts = statements(&class, "locked");
    let Some(StructuredStmt::Synchronized { object, body }) =
        find_stmt(stmts, |s| matches!(s, StructuredStmt::Synchronized { .. }))
    else {
        panic!("expected synchronized, got {:?}", stmts);
    };
    assert!(matches!(object, Expr::LocalLoad(_)));
    assert_eq!(body.len(), 1);
    assert_eq!(
        count_matching(stmts, |s| matches!(s.as_simple(), Some(Stmt::Monitor { .. }))),
        0
    );
}

/// `try { a(); } catch (Exception e) { b(); } finally { c(); } return;`
fn handled_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    let exit = b.new_label();
    let start = b.here();
    b.invoke_static(FLOW, "a", "()V");
    let end = b.here();
    b.invoke_static(FLOW, "c", "()V").goto(exit);
    let catch = b.here();
    b.store(ValueKind::Reference, 0).invoke_static(FLOW, "b", "()V");
    let catch_end = b.here();
    b.invoke_static(FLOW, "c", "()V").goto(exit);
    let any = b.here();
    b.store(ValueKind::Reference, 1)
        .invoke_static(FLOW, "c", "()V")
        .load(ValueKind::Reference, 1)
        .athrow();
    b.bind(exit);
    b.return_void();
    b.handler(start, end, catch, Some("java/lang/Exception"));
    b.handler(start, end, any, None);
    b.handler(catch, catch_end, any, None);
    static_method("handled", "()V", &b)
}

fn calls_to(stmts: &[StructuredStmt], name: &str) -> usize {
    count_matching(stmts, |s| {
        matches!(s.as_simple(), Some(Stmt::ExprStmt(Expr::MethodCall { method_name, .. })) if method_name == name)
    })
}

#[test]
fn test_try_catch_finally_collapses() {
    let class = ClassModel::new(FLOW).with_method(handled_method());
    let result = decompile_one(&class);
    assert!(result.failures.is_empty(), "unexpected failures: {:?}", result.failures);

    let stmts = statements(&result.class, "handled");
    assert_eq!(stmts.len(), 1, "got {:?}", stmts);
    let StructuredStmt::TryCatch {
        try_body,
        catches,
        finally_body: Some(finally_body),
    } = &stmts[0]
    else {
        panic!("expected try/catch/finally, got {:?}", stmts);
    };
    assert_eq!(try_body.len(), 1, "finally copy left in try body: {:?}", try_body);
    assert_eq!(catches.len(), 1);
    assert_eq!(catches[0].exception_types, vec!["java/lang/Exception".to_string()]);
    assert_eq!(catches[0].body.len(), 1, "finally copy left in catch: {:?}", catches[0].body);
    assert_eq!(finally_body.len(), 1);

    assert_eq!(calls_to(stmts, "a"), 1);
    assert_eq!(calls_to(stmts, "b"), 1);
    assert_eq!(calls_to(stmts, "c"), 1);
    assert_eq!(count_matching(stmts, |s| matches!(s, StructuredStmt::UnstructuredGoto { .. })), 0);
}

#[test]
fn test_if_arms_join_before_return() {
    // if (n > 0) a(); else b(); c(); return;
    let mut b = CodeBuilder::new();
    let other = b.new_label();
    let join = b.new_label();
    b.load(ValueKind::Int, 0).if_zero(Condition::Le, other);
    b.invoke_static(FLOW, "a", "()V").goto(join);
    b.bind(other);
    b.invoke_static(FLOW, "b", "()V");
    b.bind(join);
    b.invoke_static(FLOW, "c", "()V").return_void();
    let class = ClassModel::new(FLOW).with_method(static_method("branch", "(I)V", &b));
    let result = decompile_one(&class);
    assert!(result.failures.is_empty(), "unexpected failures: {:?}", result.failures);

    let stmts = statements(&result.class, "branch");
    assert_eq!(stmts.len(), 2, "got {:?}", stmts);
    assert!(matches!(stmts[0], StructuredStmt::If { else_body: Some(_), .. }));
    assert_eq!(calls_to(stmts, "c"), 1);
}
