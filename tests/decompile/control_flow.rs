use super::*;

fn flow() -> JavaClass {
    let result = decompile_one(&flow_class());
    assert!(result.failures.is_empty(), "unexpected failures: {:?}", result.failures);
    result.class
}

#[test]
fn test_pre_test_loop_becomes_while() {
    let class = flow();
    let stmts = statements(&class, "spin");
    assert_eq!(count_matching(stmts, |s| matches!(s, StructuredStmt::While { .. })), 1);
    assert_eq!(count_matching(stmts, |s| matches!(s, StructuredStmt::UnstructuredGoto { .. })), 0);
    let Some(StructuredStmt::While { condition, body }) =
        find_stmt(stmts, |s| matches!(s, StructuredStmt::While { .. }))
    else {
        unreachable!()
    };
    assert!(matches!(condition, Expr::Compare { .. }));
    assert_eq!(body.len(), 1);
}

#[test]
fn test_single_block_loop_becomes_do_while() {
    let class = flow();
    let stmts = statements(&class, "drain");
    let Some(StructuredStmt::DoWhile { body, .. }) =
        find_stmt(stmts, |s| matches!(s, StructuredStmt::DoWhile { .. }))
    else {
        panic!("expected do-while, got {:?}", stmts);
    };
    assert_eq!(body.len(), 2);
    assert!(matches!(body[1].as_simple(), Some(Stmt::Iinc { amount: -1, .. })));
}

#[test]
fn test_counting_loop_becomes_for() {
    let class = flow();
    let stmts = statements(&class, "sum");
    let Some(StructuredStmt::For { init, update, body, .. }) =
        find_stmt(stmts, |s| matches!(s, StructuredStmt::For { .. }))
    else {
        panic!("expected for loop, got {:?}", stmts);
    };
    assert_eq!(init.len(), 1);
    assert_eq!(update.len(), 1);
    assert_eq!(body.len(), 1);
    assert!(matches!(stmts.last().and_then(StructuredStmt::as_simple), Some(Stmt::Return(Some(_)))));
}

#[test]
fn test_value_merge_becomes_ternary() {
    let class = flow();
    let stmts = statements(&class, "max");
    assert_eq!(stmts.len(), 1, "got {:?}", stmts);
    let Some(Stmt::Return(Some(Expr::Ternary { condition, .. }))) = stmts[0].as_simple() else {
        panic!("expected a returned ternary, got {:?}", stmts);
    };
    assert!(matches!(**condition, Expr::Compare { .. }));
}

#[test]
fn test_table_switch() {
    let class = flow();
    let stmts = statements(&class, "pick");
    let Some(StructuredStmt::Switch { cases, .. }) = find_stmt(stmts, |s| matches!(s, StructuredStmt::Switch { .. }))
    else {
        panic!("expected switch, got {:?}", stmts);
    };
    assert_eq!(cases.len(), 3);
    assert_eq!(cases.iter().filter(|c| c.is_default).count(), 1);
    assert!(cases
        .iter()
        .all(|c| matches!(c.body.last().and_then(StructuredStmt::as_simple), Some(Stmt::Return(Some(_))))));
}

#[test]
fn test_short_circuit_condition() {
    // if (a > 0 && b > 0) tick();
    let mut b = CodeBuilder::new();
    let skip = b.new_label();
    b.load(ValueKind::Int, 0).if_zero(Condition::Le, skip);
    b.load(ValueKind::Int, 1).if_zero(Condition::Le, skip);
    b.invoke_static(FLOW, "tick", "()V");
    b.bind(skip);
    b.return_void();
    let class = ClassModel::new(FLOW).with_method(static_method("both", "(II)V", &b));
    let result = decompile_one(&class);

    let stmts = statements(&result.class, "both");
    assert_eq!(stmts.len(), 1, "got {:?}", stmts);
    let StructuredStmt::If {
        condition: Expr::BinaryOp { op, .. },
        else_body: None,
        ..
    } = &stmts[0]
    else {
        panic!("expected a single if, got {:?}", stmts);
    };
    assert_eq!(*op, BinOp::CondAnd);
}
