use classfile_decompiler::decompile::expr::{BinOp, Expr, Stmt};
use classfile_decompiler::decompile::java_ast::{ClassKind, JavaClass, MethodBody};
use classfile_decompiler::decompile::structured_types::{walk_stmts, StructuredStmt};
use classfile_decompiler::decompile::{DecompileOptions, DecompiledClass, Decompiler};
use classfile_decompiler::error::{DecompileError, FailureKind};
use classfile_decompiler::model::*;

mod assembly;
mod control_flow;
mod failures;
mod patterns;
mod regions;
mod variables;

// ---- Test helpers ----

const FLOW: &str = "demo/Flow";

fn static_method(name: &str, descriptor: &str, code: &CodeBuilder) -> MethodModel {
    MethodModel::new(name, descriptor, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC)
        .with_code(code.build().unwrap())
}

/// `public Owner() { super(); }`
fn default_constructor() -> MethodModel {
    let mut b = CodeBuilder::new();
    b.load(ValueKind::Reference, 0)
        .invoke_special("java/lang/Object", "<init>", "()V")
        .return_void();
    MethodModel::new("<init>", "()V", MethodAccessFlags::PUBLIC).with_code(b.build().unwrap())
}

fn decompile_with(class: &ClassModel, options: DecompileOptions) -> DecompiledClass {
    Decompiler::new(options).decompile_class(class).unwrap()
}

fn decompile_one(class: &ClassModel) -> DecompiledClass {
    decompile_with(class, DecompileOptions::default())
}

fn statements<'a>(class: &'a JavaClass, method: &str) -> &'a [StructuredStmt] {
    let m = class
        .method(method)
        .unwrap_or_else(|| panic!("no method {} in {}", method, class.name));
    match &m.body {
        Some(MethodBody::Decompiled(body)) => &body.statements,
        other => panic!("{} did not decompile: {:?}", method, other),
    }
}

fn count_matching<P: Fn(&StructuredStmt) -> bool>(stmts: &[StructuredStmt], pred: P) -> usize {
    let mut n = 0;
    walk_stmts(stmts, &mut |s| {
        if pred(s) {
            n += 1;
        }
    });
    n
}

fn find_stmt<P: Fn(&StructuredStmt) -> bool>(stmts: &[StructuredStmt], pred: P) -> Option<StructuredStmt> {
    let mut found = None;
    walk_stmts(stmts, &mut |s| {
        if found.is_none() && pred(s) {
            found = Some(s.clone());
        }
    });
    found
}

// ---- Fixtures ----

/// `while (n > 10) tick();`
fn spin_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    let head = b.new_label();
    let done = b.new_label();
    b.bind(head);
    b.load(ValueKind::Int, 0).iconst(10).if_icmp(Condition::Le, done);
    b.invoke_static(FLOW, "tick", "()V").goto(head);
    b.bind(done);
    b.return_void();
    static_method("spin", "(I)V", &b)
}

/// `do { tick(); n--; } while (n > 0);`
fn drain_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    let top = b.here();
    b.invoke_static(FLOW, "tick", "()V").iinc(0, -1);
    b.load(ValueKind::Int, 0).if_zero(Condition::Gt, top);
    b.return_void();
    static_method("drain", "(I)V", &b)
}

/// `int s = 0; for (int i = 0; i < n; i++) s += i; return s;`
fn sum_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    let head = b.new_label();
    let done = b.new_label();
    b.iconst(0).store(ValueKind::Int, 1);
    b.iconst(0).store(ValueKind::Int, 2);
    b.bind(head);
    b.load(ValueKind::Int, 2).load(ValueKind::Int, 0).if_icmp(Condition::Ge, done);
    b.load(ValueKind::Int, 1).load(ValueKind::Int, 2);
    b.arith(ArithOp::Add, ValueKind::Int).store(ValueKind::Int, 1);
    b.iinc(2, 1).goto(head);
    b.bind(done);
    b.load(ValueKind::Int, 1).return_value(ValueKind::Int);
    static_method("sum", "(I)I", &b)
}

/// `return a > b ? a : b;`
fn max_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    let other = b.new_label();
    let join = b.new_label();
    b.load(ValueKind::Int, 0).load(ValueKind::Int, 1).if_icmp(Condition::Le, other);
    b.load(ValueKind::Int, 0).goto(join);
    b.bind(other);
    b.load(ValueKind::Int, 1);
    b.bind(join);
    b.return_value(ValueKind::Int);
    static_method("max", "(II)I", &b)
}

/// `switch (k) { case 0: return 10; case 1: return 20; default: return 0; }`
fn pick_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    let zero = b.new_label();
    let one = b.new_label();
    let other = b.new_label();
    b.load(ValueKind::Int, 0).table_switch(0, &[zero, one], other);
    b.bind(zero);
    b.iconst(10).return_value(ValueKind::Int);
    b.bind(one);
    b.iconst(20).return_value(ValueKind::Int);
    b.bind(other);
    b.iconst(0).return_value(ValueKind::Int);
    static_method("pick", "(I)I", &b)
}

/// `try { return Integer.parseInt(s); } catch (NumberFormatException e) { return -1; }`
fn parse_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    let start = b.here();
    b.load(ValueKind::Reference, 0)
        .invoke_static("java/lang/Integer", "parseInt", "(Ljava/lang/String;)I")
        .return_value(ValueKind::Int);
    let end = b.here();
    let handler = b.here();
    b.store(ValueKind::Reference, 1).iconst(-1).return_value(ValueKind::Int);
    b.handler(start, end, handler, Some("java/lang/NumberFormatException"));
    static_method("parse", "(Ljava/lang/String;)I", &b)
}

/// `try { r.run(); } finally { done(); }`
fn guarded_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    let exit = b.new_label();
    let start = b.here();
    b.load(ValueKind::Reference, 0)
        .invoke_interface("java/lang/Runnable", "run", "()V");
    let end = b.here();
    b.invoke_static(FLOW, "done", "()V").goto(exit);
    let handler = b.here();
    b.store(ValueKind::Reference, 1)
        .invoke_static(FLOW, "done", "()V")
        .load(ValueKind::Reference, 1)
        .athrow();
    b.bind(exit);
    b.return_void();
    b.handler(start, end, handler, None);
    static_method("guarded", "(Ljava/lang/Runnable;)V", &b)
}

/// `synchronized (lock) { tick(); }`
fn locked_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    let exit = b.new_label();
    b.load(ValueKind::Reference, 0)
        .op(Op::Dup)
        .store(ValueKind::Reference, 1)
        .op(Op::MonitorEnter);
    let start = b.here();
    b.invoke_static(FLOW, "tick", "()V")
        .load(ValueKind::Reference, 1)
        .op(Op::MonitorExit);
    let end = b.here();
    b.goto(exit);
    let handler = b.here();
    b.store(ValueKind::Reference, 2)
        .load(ValueKind::Reference, 1)
        .op(Op::MonitorExit);
    let handler_end = b.here();
    b.load(ValueKind::Reference, 2).athrow();
    b.bind(exit);
    b.return_void();
    b.handler(start, end, handler, None);
    b.handler(handler, handler_end, handler, None);
    static_method("locked", "(Ljava/lang/Object;)V", &b)
}

/// `return "Hello, " + name;` compiled through a `StringBuilder`.
fn greet_method() -> MethodModel {
    const SB: &str = "java/lang/StringBuilder";
    const APPEND: &str = "(Ljava/lang/String;)Ljava/lang/StringBuilder;";
    let mut b = CodeBuilder::new();
    b.new_object(SB)
        .op(Op::Dup)
        .invoke_special(SB, "<init>", "()V")
        .ldc_string("Hello, ")
        .invoke_virtual(SB, "append", APPEND)
        .load(ValueKind::Reference, 0)
        .invoke_virtual(SB, "append", APPEND)
        .invoke_virtual(SB, "toString", "()Ljava/lang/String;")
        .return_value(ValueKind::Reference);
    static_method("greet", "(Ljava/lang/String;)Ljava/lang/String;", &b)
}

/// `for (String s : xs) show(s);` compiled to an explicit iterator loop.
fn show_all_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    let head = b.new_label();
    let done = b.new_label();
    b.load(ValueKind::Reference, 0)
        .invoke_interface("java/util/List", "iterator", "()Ljava/util/Iterator;")
        .store(ValueKind::Reference, 1);
    b.bind(head);
    b.load(ValueKind::Reference, 1)
        .invoke_interface("java/util/Iterator", "hasNext", "()Z")
        .if_zero(Condition::Eq, done);
    b.load(ValueKind::Reference, 1)
        .invoke_interface("java/util/Iterator", "next", "()Ljava/lang/Object;")
        .check_cast("java/lang/String")
        .store(ValueKind::Reference, 2);
    b.load(ValueKind::Reference, 2)
        .invoke_static(FLOW, "show", "(Ljava/lang/String;)V")
        .goto(head);
    b.bind(done);
    b.return_void();
    static_method("showAll", "(Ljava/util/List;)V", &b)
}

/// `pop` with nothing on the stack.
fn underflow_method() -> MethodModel {
    let mut b = CodeBuilder::new();
    b.op(Op::Pop).return_void();
    static_method("broken", "()V", &b)
}

fn flow_class() -> ClassModel {
    ClassModel::new(FLOW)
        .with_method(default_constructor())
        .with_method(spin_method())
        .with_method(drain_method())
        .with_method(sum_method())
        .with_method(max_method())
        .with_method(pick_method())
        .with_method(parse_method())
        .with_method(guarded_method())
        .with_method(locked_method())
        .with_method(greet_method())
        .with_method(show_all_method())
}
