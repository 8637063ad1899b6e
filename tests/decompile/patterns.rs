use classfile_decompiler::decompile::desugar::{desugar, DesugarTables};
use classfile_decompiler::decompile::util::MethodContext;
use classfile_decompiler::decompile::DesugarOptions;

use super::*;

#[test]
fn test_string_builder_chain_becomes_concatenation() {
    let class = decompile_one(&flow_class()).class;
    let stmts = statements(&class, "greet");
    assert_eq!(stmts.len(), 1, "got {:?}", stmts);
    let Some(Stmt::Return(Some(Expr::BinaryOp { op: BinOp::Add, left, right }))) = stmts[0].as_simple() else {
        panic!("expected a returned concatenation, got {:?}", stmts);
    };
    assert_eq!(**left, Expr::StringLiteral("Hello, ".into()));
    assert!(matches!(**right, Expr::LocalLoad(_)));
}

#[test]
fn test_iterator_loop_becomes_foreach() {
    let class = decompile_one(&flow_class()).class;
    let stmts = statements(&class, "showAll");
    let Some(StructuredStmt::ForEach { var, iterable, body }) =
        find_stmt(stmts, |s| matches!(s, StructuredStmt::ForEach { .. }))
    else {
        panic!("expected enhanced for, got {:?}", stmts);
    };
    assert!(matches!(iterable, Expr::LocalLoad(_)));
    assert!(var.ty.is_string());
    assert_eq!(body.len(), 1);

    let no_iterator = count_matching(stmts, |s| {
        s.exprs().iter().any(|e| {
            e.any(|e| matches!(e, Expr::MethodCall { method_name, .. } if method_name == "hasNext" || method_name == "iterator"))
        })
    });
    assert_eq!(no_iterator, 0);
}

#[test]
fn test_disabled_pass_keeps_raw_shape() {
    let options = DecompileOptions::from_settings([("desugar.foreach", "false"), ("desugar.stringConcat", "false")]).unwrap();
    let class = decompile_with(&flow_class(), options).class;

    let loops = statements(&class, "showAll");
    assert_eq!(count_matching(loops, |s| matches!(s, StructuredStmt::ForEach { .. })), 0);
    assert_eq!(count_matching(loops, |s| matches!(s, StructuredStmt::While { .. })), 1);

    let greet = statements(&class, "greet");
    let Some(Stmt::Return(Some(Expr::MethodCall { method_name, .. }))) = greet[0].as_simple() else {
        panic!("expected the raw builder chain, got {:?}", greet);
    };
    assert_eq!(method_name, "toString");
}

#[test]
fn test_rewriting_settled_output_changes_nothing() {
    let model = flow_class();
    let class = decompile_one(&model).class;
    for name in ["sum", "max", "pick", "greet", "showAll"] {
        let method = model.method(name).unwrap();
        let code = method.code.as_ref().unwrap();
        let ctx = MethodContext::new(&model.name, method, code).unwrap();
        let Some(MethodBody::Decompiled(settled)) = &class.method(name).unwrap().body else {
            panic!("{} did not decompile", name);
        };

        let mut again = settled.clone();
        desugar(&mut again, &DesugarOptions::default(), &DesugarTables::default(), &ctx);
        assert_eq!(&again, settled, "second rewrite of {} changed the body", name);
    }
}

/// `return new int[] { 7, 7, ... }` with `len` elements, as javac emits it.
fn filled_array(len: i32) -> MethodModel {
    let mut b = CodeBuilder::new();
    b.iconst(len).op(Op::NewArray(PrimitiveKind::Int));
    for k in 0..len {
        b.op(Op::Dup).iconst(k).iconst(7).op(Op::ArrayStore(ArrayKind::Int));
    }
    b.return_value(ValueKind::Reference);
    static_method("filled", "()[I", &b)
}

#[test]
fn test_small_array_initializer_folds() {
    let class = ClassModel::new(FLOW).with_method(filled_array(3));
    let result = decompile_one(&class);
    assert!(result.failures.is_empty(), "unexpected failures: {:?}", result.failures);

    let stmts = statements(&result.class, "filled");
    assert_eq!(stmts.len(), 1, "got {:?}", stmts);
    let Some(Stmt::Return(Some(Expr::ArrayInit { elements, .. }))) = stmts[0].as_simple() else {
        panic!("expected a returned initializer, got {:?}", stmts);
    };
    assert_eq!(elements, &vec![Expr::IntLiteral(7); 3]);
}

#[test]
fn test_oversized_array_initializer_keeps_one_array() {
    let class = ClassModel::new(FLOW).with_method(filled_array(1100));
    let result = decompile_one(&class);
    assert!(result.failures.is_empty(), "unexpected failures: {:?}", result.failures);

    let stmts = statements(&result.class, "filled");
    let stores = count_matching(stmts, |s| {
        matches!(s.as_simple(), Some(Stmt::ArrayStore { array: Expr::LocalLoad(_), .. }))
    });
    assert_eq!(stores, 1100);
    let allocations = count_matching(stmts, |s| {
        s.as_simple()
            .map_or(false, |s| s.exprs().iter().any(|e| e.any(|e| matches!(e, Expr::NewArray { .. }))))
    });
    assert_eq!(allocations, 1);
    assert!(matches!(
        stmts.last().and_then(StructuredStmt::as_simple),
        Some(Stmt::Return(Some(Expr::LocalLoad(_))))
    ));
}

#[test]
fn test_failed_rewrite_is_recorded_but_body_kept() {
    // The recipe asks for two values while the call site captures one.
    let site = CallSite {
        name: "makeConcatWithConstants".into(),
        descriptor: "(I)Ljava/lang/String;".into(),
        bootstrap: MethodRef::new(
            "java/lang/invoke/StringConcatFactory",
            "makeConcatWithConstants",
            "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;",
        ),
        bootstrap_args: vec![Constant::String("\u{1}-\u{1}".into())],
    };
    let mut b = CodeBuilder::new();
    b.load(ValueKind::Int, 0)
        .op(Op::InvokeDynamic(site))
        .return_value(ValueKind::Reference);
    let class = ClassModel::new(FLOW).with_method(static_method("label", "(I)Ljava/lang/String;", &b));
    let result = decompile_one(&class);

    assert_eq!(result.failures.len(), 1, "got {:?}", result.failures);
    let failure = &result.failures[0];
    assert_eq!(failure.kind, FailureKind::UnsupportedPattern);
    assert_eq!(failure.method_name, "label");
    assert!(!failure.fell_back);

    let stmts = statements(&result.class, "label");
    assert!(matches!(
        stmts[0].as_simple(),
        Some(Stmt::Return(Some(Expr::InvokeDynamic { .. })))
    ));
}
