//! Source-level pattern recovery.
//!
//! Rewrites compiler idioms in a resolved method body back into the source
//! constructs they came from. Every pass works on a copy of the body: a pass
//! that fails is logged and dropped, the others still apply. The passes repeat
//! until the tree stops changing.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, trace, warn};

use crate::error::ReconstructError;
use crate::model::{Constant, MethodModel};

use super::descriptor::{parse_method_descriptor, JvmType};
use super::expr::*;
use super::java_ast::{JavaType, PrimitiveType};
use super::structured_types::*;
use super::type_inference::{local_base_name, VariableKind};
use super::util::MethodContext;

const MAX_ROUNDS: usize = 8;
const THROWABLE: &str = "java/lang/Throwable";
const ASSERTIONS_DISABLED: &str = "$assertionsDisabled";
const SWITCH_MAP_PREFIX: &str = "$SwitchMap$";

/// Wrapper class, primitive descriptor and unboxing method.
const WRAPPERS: &[(&str, &str, &str)] = &[
    ("java/lang/Integer", "I", "intValue"),
    ("java/lang/Long", "J", "longValue"),
    ("java/lang/Float", "F", "floatValue"),
    ("java/lang/Double", "D", "doubleValue"),
    ("java/lang/Byte", "B", "byteValue"),
    ("java/lang/Short", "S", "shortValue"),
    ("java/lang/Character", "C", "charValue"),
    ("java/lang/Boolean", "Z", "booleanValue"),
];

/// Which rewrites to apply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesugarOptions {
    pub synthetic_accessors: bool,
    pub boolean_cleanup: bool,
    pub ternary: bool,
    pub string_concat: bool,
    pub autobox: bool,
    pub foreach: bool,
    pub try_resources: bool,
    pub assert: bool,
    pub string_switch: bool,
    pub enum_switch: bool,
}

impl Default for DesugarOptions {
    fn default() -> Self {
        Self {
            synthetic_accessors: true,
            boolean_cleanup: true,
            ternary: true,
            string_concat: true,
            autobox: true,
            foreach: true,
            try_resources: true,
            assert: true,
            string_switch: true,
            enum_switch: true,
        }
    }
}

impl DesugarOptions {
    /// Every rewrite turned off.
    pub fn none() -> Self {
        Self {
            synthetic_accessors: false,
            boolean_cleanup: false,
            ternary: false,
            string_concat: false,
            autobox: false,
            foreach: false,
            try_resources: false,
            assert: false,
            string_switch: false,
            enum_switch: false,
        }
    }
}

/// Body template of a synthetic `access$NNN` method.
#[derive(Clone, Debug, PartialEq)]
struct Accessor {
    param_slots: Vec<u16>,
    body: Expr,
}

impl Accessor {
    fn param_position(&self, var: &LocalVar) -> Option<usize> {
        self.param_slots.iter().position(|&slot| slot == var.index)
    }

    /// The template with its parameters replaced by `args`, if that keeps
    /// every argument evaluated exactly once and in order.
    fn instantiate(&self, args: &[Expr]) -> Option<Expr> {
        if args.len() != self.param_slots.len() {
            return None;
        }
        let mut uses = vec![0usize; args.len()];
        let mut order = Vec::new();
        self.body.walk(&mut |e| {
            if let Expr::LocalLoad(v) = e {
                if let Some(i) = self.param_position(v) {
                    uses[i] += 1;
                    order.push(i);
                }
            }
        });
        let impure: Vec<usize> = (0..args.len()).filter(|&i| !args[i].is_pure()).collect();
        if impure.iter().any(|&i| uses[i] != 1) {
            return None;
        }
        let impure_order: Vec<usize> = order.iter().copied().filter(|i| impure.contains(i)).collect();
        if impure_order != impure {
            return None;
        }
        let mut body = self.body.clone();
        body.walk_mut(&mut |e| {
            let replacement = match e {
                Expr::LocalLoad(v) => self.param_position(v).map(|i| args[i].clone()),
                _ => None,
            };
            if let Some(arg) = replacement {
                *e = arg;
            }
        });
        Some(body)
    }
}

/// Class-level facts some rewrites need: synthetic accessor bodies, enum
/// switch-map tables and enum constant orders. Filled by the class
/// decompiler before any method body is rewritten.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DesugarTables {
    accessors: HashMap<(String, String, String), Accessor>,
    /// (holder class, `$SwitchMap$...` field) -> index -> (enum class, constant)
    switch_maps: HashMap<(String, String), BTreeMap<i32, (String, String)>>,
    enum_constants: HashMap<String, Vec<String>>,
}

impl DesugarTables {
    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty() && self.switch_maps.is_empty() && self.enum_constants.is_empty()
    }

    /// Record the body of a synthetic accessor. Returns false when `method`
    /// is not an accessor or its body is not a single forwarding expression.
    pub fn add_accessor(&mut self, owner: &str, method: &MethodModel, statements: &[StructuredStmt]) -> bool {
        if !method.name.starts_with("access$") || !method.is_static() {
            return false;
        }
        let Some((params, _)) = parse_method_descriptor(&method.descriptor) else {
            return false;
        };
        let mut param_slots = Vec::with_capacity(params.len());
        let mut slot = 0u16;
        for p in &params {
            param_slots.push(slot);
            slot += if p.is_wide() { 2 } else { 1 };
        }

        let Some(simple) = statements.iter().map(StructuredStmt::as_simple).collect::<Option<Vec<&Stmt>>>() else {
            return false;
        };
        let body = match simple.as_slice() {
            [Stmt::Return(Some(e))] => e.clone(),
            [Stmt::ExprStmt(e)] | [Stmt::ExprStmt(e), Stmt::Return(None)] => e.clone(),
            [Stmt::FieldStore {
                object,
                class_name,
                field_name,
                field_type,
                value,
            }]
            | [Stmt::FieldStore {
                object,
                class_name,
                field_name,
                field_type,
                value,
            }, Stmt::Return(None)] => Expr::Assign {
                target: Expr::FieldGet {
                    object: object.clone().map(Box::new),
                    class_name: class_name.clone(),
                    field_name: field_name.clone(),
                    field_type: field_type.clone(),
                }
                .boxed(),
                value: value.clone().boxed(),
            },
            _ => return false,
        };

        let mut foreign = false;
        body.walk(&mut |e| match e {
            Expr::LocalLoad(v) if !param_slots.contains(&v.index) => foreign = true,
            Expr::Increment { .. } => foreign = true,
            _ => {}
        });
        if foreign {
            return false;
        }
        trace!(owner, method = %method.name, "recorded synthetic accessor");
        self.accessors.insert(
            (owner.to_string(), method.name.clone(), method.descriptor.clone()),
            Accessor { param_slots, body },
        );
        true
    }

    /// Record `$SwitchMap$` table entries assigned in a static initializer.
    /// Returns the number of entries found.
    pub fn add_switch_maps(&mut self, statements: &[StructuredStmt]) -> usize {
        let mut found = 0;
        walk_stmts(statements, &mut |s| {
            let Some(Stmt::ArrayStore {
                array:
                    Expr::FieldGet {
                        object: None,
                        class_name: holder,
                        field_name,
                        ..
                    },
                index,
                value: Expr::IntLiteral(k),
            }) = s.as_simple()
            else {
                return;
            };
            if !field_name.starts_with(SWITCH_MAP_PREFIX) {
                return;
            }
            let Some(Expr::FieldGet {
                object: None,
                class_name: enum_class,
                field_name: constant,
                ..
            }) = ordinal_operand(index)
            else {
                return;
            };
            self.switch_maps
                .entry((holder.clone(), field_name.clone()))
                .or_default()
                .insert(*k, (enum_class.clone(), constant.clone()));
            found += 1;
        });
        found
    }

    /// Record the declaration order of an enum's constants.
    pub fn add_enum_constants(&mut self, enum_class: impl Into<String>, constants: Vec<String>) {
        self.enum_constants.insert(enum_class.into(), constants);
    }

    pub fn extend(&mut self, other: DesugarTables) {
        self.accessors.extend(other.accessors);
        for (key, entries) in other.switch_maps {
            self.switch_maps.entry(key).or_default().extend(entries);
        }
        self.enum_constants.extend(other.enum_constants);
    }

    pub fn has_accessor(&self, owner: &str, name: &str, descriptor: &str) -> bool {
        self.accessors
            .contains_key(&(owner.to_string(), name.to_string(), descriptor.to_string()))
    }

    pub fn switch_map_label(&self, holder: &str, field: &str, index: i32) -> Option<&(String, String)> {
        self.switch_maps
            .get(&(holder.to_string(), field.to_string()))
            .and_then(|m| m.get(&index))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    Accessors,
    Ternary,
    StringConcat,
    Boxing,
    EnhancedFor,
    TryWithResources,
    Assert,
    Switches,
}

const PASSES: [Pass; 8] = [
    Pass::Accessors,
    Pass::Ternary,
    Pass::StringConcat,
    Pass::Boxing,
    Pass::EnhancedFor,
    Pass::TryWithResources,
    Pass::Assert,
    Pass::Switches,
];

impl Pass {
    fn name(self) -> &'static str {
        match self {
            Pass::Accessors => "accessors",
            Pass::Ternary => "ternary",
            Pass::StringConcat => "string-concat",
            Pass::Boxing => "autobox",
            Pass::EnhancedFor => "foreach",
            Pass::TryWithResources => "try-resources",
            Pass::Assert => "assert",
            Pass::Switches => "switch",
        }
    }

    fn enabled(self, options: &DesugarOptions) -> bool {
        match self {
            Pass::Accessors => options.synthetic_accessors || options.boolean_cleanup,
            Pass::Ternary => options.ternary,
            Pass::StringConcat => options.string_concat,
            Pass::Boxing => options.autobox,
            Pass::EnhancedFor => options.foreach,
            Pass::TryWithResources => options.try_resources,
            Pass::Assert => options.assert,
            Pass::Switches => options.string_switch || options.enum_switch,
        }
    }
}

/// Apply every enabled rewrite to `body` until nothing changes.
///
/// A pass that fails leaves the body as it was and is retried next round;
/// its distinct errors are returned so the caller can record them.
pub fn desugar(
    body: &mut StructuredBody,
    options: &DesugarOptions,
    tables: &DesugarTables,
    ctx: &MethodContext,
) -> Vec<ReconstructError> {
    let rewriter = Rewriter { options, tables, ctx };
    let mut skipped: Vec<ReconstructError> = Vec::new();
    for round in 1..=MAX_ROUNDS {
        let mut changed = false;
        for pass in PASSES {
            if !pass.enabled(options) {
                continue;
            }
            let mut candidate = body.clone();
            match rewriter.run(pass, &mut candidate) {
                Ok(()) => {
                    if candidate != *body {
                        trace!(method = %ctx.location(), pass = pass.name(), round, "pattern rewritten");
                        *body = candidate;
                        changed = true;
                    }
                }
                Err(e) => {
                    if !skipped.contains(&e) {
                        warn!(method = %ctx.location(), pass = pass.name(), error = %e, "pattern pass skipped");
                        skipped.push(e);
                    }
                }
            }
        }
        if !changed {
            debug!(method = %ctx.location(), rounds = round, "patterns settled");
            return skipped;
        }
    }
    debug!(method = %ctx.location(), "pattern rewriting stopped after {} rounds", MAX_ROUNDS);
    skipped
}

struct Rewriter<'a> {
    options: &'a DesugarOptions,
    tables: &'a DesugarTables,
    ctx: &'a MethodContext<'a>,
}

impl Rewriter<'_> {
    fn run(&self, pass: Pass, body: &mut StructuredBody) -> Result<(), ReconstructError> {
        match pass {
            Pass::Accessors => {
                self.inline_accessors(body);
                Ok(())
            }
            Pass::Ternary => {
                self.ternaries(body);
                Ok(())
            }
            Pass::StringConcat => concatenations(&mut body.statements),
            Pass::Boxing => {
                walk_stmts_mut(&mut body.statements, &mut elide_boxing_in_stmt);
                Ok(())
            }
            Pass::EnhancedFor => {
                enhanced_for_loops(&mut body.statements);
                Ok(())
            }
            Pass::TryWithResources => {
                try_with_resources(&mut body.statements);
                Ok(())
            }
            Pass::Assert => {
                walk_stmts_mut(&mut body.statements, &mut rewrite_assert);
                Ok(())
            }
            Pass::Switches => self.switches(&mut body.statements),
        }
    }

    // ---- accessors and boolean cleanup ----

    fn inline_accessors(&self, body: &mut StructuredBody) {
        if self.options.synthetic_accessors && !self.tables.accessors.is_empty() {
            walk_exprs_mut(&mut body.statements, &mut |e| {
                let inlined = match e {
                    Expr::MethodCall {
                        kind: InvokeKind::Static,
                        class_name,
                        method_name,
                        descriptor,
                        args,
                        ..
                    } if method_name.starts_with("access$") => self
                        .tables
                        .accessors
                        .get(&(class_name.clone(), method_name.clone(), descriptor.clone()))
                        .and_then(|a| a.instantiate(args)),
                    _ => None,
                };
                if let Some(inlined) = inlined {
                    *e = inlined;
                }
            });
        }
        if self.options.boolean_cleanup {
            self.clean_booleans(&mut body.statements, false);
        }
    }

    /// Turn `0`/`1` into `false`/`true` wherever a boolean is expected and
    /// drop comparisons of booleans against them. With `selects`, also
    /// folds `c ? 1 : 0` style selects into plain conditions.
    fn clean_booleans(&self, statements: &mut [StructuredStmt], selects: bool) {
        walk_exprs_mut(statements, &mut |e| simplify_boolean(e, selects));
        let returns_boolean = self.ctx.return_type == JvmType::Boolean;
        walk_stmts_mut(statements, &mut |s| {
            let StructuredStmt::Simple { stmt, .. } = s else {
                return;
            };
            match stmt {
                Stmt::LocalStore { var, value } | Stmt::Declare { var, init: Some(value) }
                    if var.ty == JvmType::Boolean =>
                {
                    coerce_boolean(value, selects)
                }
                Stmt::FieldStore {
                    field_type: JvmType::Boolean,
                    value,
                    ..
                } => coerce_boolean(value, selects),
                Stmt::ArrayStore { array, value, .. } if array.jvm_type().element() == Some(&JvmType::Boolean) => {
                    coerce_boolean(value, selects)
                }
                Stmt::Return(Some(value)) if returns_boolean => coerce_boolean(value, selects),
                _ => {}
            }
        });
    }

    // ---- ternaries ----

    fn ternaries(&self, body: &mut StructuredBody) {
        let temps: HashSet<u32> = body
            .variables
            .iter()
            .filter(|v| v.kind == VariableKind::StackTemporary)
            .map(|v| v.id)
            .collect();
        walk_lists_mut(&mut body.statements, &mut |list| merge_ternaries(list, &temps));
        let counts = var_counts(&body.statements);
        walk_lists_mut(&mut body.statements, &mut |list| inline_temporaries(list, &temps, &counts));
        if self.options.boolean_cleanup {
            self.retype_booleans(body);
            self.clean_booleans(&mut body.statements, true);
        }
    }

    /// Int locals without debug info that only ever hold `0`/`1` selects of
    /// conditions and are only tested against zero become booleans.
    fn retype_booleans(&self, body: &mut StructuredBody) {
        let mut values: HashMap<u32, Vec<Expr>> = HashMap::new();
        let mut tests: HashMap<u32, usize> = HashMap::new();
        let mut loads: HashMap<u32, usize> = HashMap::new();
        walk_stmts(&body.statements, &mut |s| {
            if let Some(Stmt::LocalStore { var, value } | Stmt::Declare { var, init: Some(value) }) = s.as_simple() {
                if let Some(id) = var.id {
                    values.entry(id).or_default().push(value.clone());
                }
            }
            for e in s.exprs() {
                e.walk(&mut |n| match n {
                    Expr::LocalLoad(v) => {
                        if let Some(id) = v.id {
                            *loads.entry(id).or_insert(0) += 1;
                        }
                    }
                    Expr::Increment { var, .. } => {
                        if let Some(id) = var.id {
                            // never a boolean
                            values.entry(id).or_default().push(Expr::Unresolved(String::new()));
                        }
                    }
                    Expr::Compare {
                        op: CompareOp::Eq | CompareOp::Ne,
                        left,
                        right,
                    } => {
                        if let (Expr::LocalLoad(v), Expr::IntLiteral(0 | 1)) = (left.as_ref(), right.as_ref()) {
                            if let Some(id) = v.id {
                                *tests.entry(id).or_insert(0) += 1;
                            }
                        }
                    }
                    _ => {}
                });
            }
        });

        let mut used_names: HashSet<String> = body.variables.iter().map(|v| v.name.clone()).collect();
        let mut renamed: HashMap<u32, String> = HashMap::new();
        for binding in body.variables.iter_mut() {
            if binding.jvm_type != JvmType::Int
                || !matches!(binding.kind, VariableKind::Local | VariableKind::StackTemporary)
                || self.ctx.lvt_for_store(binding.slot, binding.declaration).is_some()
            {
                continue;
            }
            let Some(stored) = values.get(&binding.id) else {
                continue;
            };
            let all_boolean = stored.iter().all(is_boolean_valued);
            let any_condition = stored
                .iter()
                .any(|v| !matches!(v, Expr::IntLiteral(_) | Expr::BooleanLiteral(_)));
            let loaded = loads.get(&binding.id).copied().unwrap_or(0);
            let tested = tests.get(&binding.id).copied().unwrap_or(0);
            if !all_boolean || !any_condition || loaded != tested {
                continue;
            }
            used_names.remove(&binding.name);
            let base = local_base_name(&JvmType::Boolean);
            let mut name = base.clone();
            let mut n = 0;
            while used_names.contains(&name) {
                n += 1;
                name = format!("{}{}", base, n);
            }
            used_names.insert(name.clone());
            trace!(var = %binding.name, new_name = %name, "retyped int local to boolean");
            binding.jvm_type = JvmType::Boolean;
            binding.java_type = JavaType::Primitive(PrimitiveType::Boolean);
            binding.name = name.clone();
            renamed.insert(binding.id, name);
        }
        if renamed.is_empty() {
            return;
        }
        walk_vars_mut(&mut body.statements, &mut |v| {
            if let Some(name) = v.id.and_then(|id| renamed.get(&id)) {
                v.ty = JvmType::Boolean;
                v.name = Some(name.clone());
            }
        });
    }

    // ---- switches ----

    fn switches(&self, statements: &mut Vec<StructuredStmt>) -> Result<(), ReconstructError> {
        let mut failure = None;
        if self.options.string_switch {
            let counts = var_counts(statements);
            walk_lists_mut(statements, &mut |list| {
                let mut i = 0;
                while failure.is_none() && i < list.len() {
                    if let Err(e) = rewrite_string_switch(list, i, &counts) {
                        failure = Some(e);
                    }
                    i += 1;
                }
            });
        }
        if self.options.enum_switch && failure.is_none() {
            walk_stmts_mut(statements, &mut |s| {
                if failure.is_none() {
                    if let Err(e) = self.rewrite_enum_switch(s) {
                        failure = Some(e);
                    }
                }
            });
        }
        failure.map_or(Ok(()), Err)
    }

    fn rewrite_enum_switch(&self, s: &mut StructuredStmt) -> Result<(), ReconstructError> {
        let StructuredStmt::Switch {
            expr,
            kind: kind @ SwitchKind::Int,
            cases,
        } = s
        else {
            return Ok(());
        };

        let current: &Expr = expr;
        let (subject, labels): (Expr, BTreeMap<i32, (String, String)>) = match current {
            Expr::ArrayLoad { array, index, .. } => {
                let Expr::FieldGet {
                    object: None,
                    class_name: holder,
                    field_name,
                    ..
                } = array.as_ref()
                else {
                    return Ok(());
                };
                let Some(subject) = ordinal_operand(index) else {
                    return Ok(());
                };
                if !field_name.starts_with(SWITCH_MAP_PREFIX) {
                    return Ok(());
                }
                let Some(table) = self.tables.switch_maps.get(&(holder.clone(), field_name.clone())) else {
                    trace!(holder = %holder, field = %field_name, "no switch map recorded");
                    return Ok(());
                };
                (subject.clone(), table.clone())
            }
            Expr::MethodCall { class_name, .. } => {
                let Some(subject) = ordinal_operand(current) else {
                    return Ok(());
                };
                let Some(constants) = self.tables.enum_constants.get(class_name) else {
                    return Ok(());
                };
                let labels = constants
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i as i32, (class_name.clone(), c.clone())))
                    .collect();
                (subject.clone(), labels)
            }
            _ => return Ok(()),
        };

        let mut relabeled = cases.clone();
        for case in relabeled.iter_mut() {
            for value in case.values.iter_mut() {
                let SwitchValue::Int(k) = value else {
                    return Err(ReconstructError::unsupported(0, "enum switch label is not an int"));
                };
                let Some((type_name, const_name)) = labels.get(&*k) else {
                    return Err(ReconstructError::unsupported(
                        0,
                        format!("no enum constant for switch label {}", k),
                    ));
                };
                *value = SwitchValue::Enum {
                    type_name: type_name.clone(),
                    const_name: const_name.clone(),
                };
            }
        }
        *expr = subject;
        *kind = SwitchKind::Enum;
        *cases = relabeled;
        Ok(())
    }
}

// ---- shared helpers ----

/// Occurrences of every resolved variable: stores, declarations and loads.
fn var_counts(statements: &[StructuredStmt]) -> HashMap<u32, usize> {
    let mut counts = HashMap::new();
    walk_stmts(statements, &mut |s| {
        for v in s.own_vars() {
            if let Some(id) = v.id {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        for e in s.exprs() {
            e.walk(&mut |n| {
                if let Expr::LocalLoad(v) | Expr::Increment { var: v, .. } = n {
                    if let Some(id) = v.id {
                        *counts.entry(id).or_insert(0) += 1;
                    }
                }
            });
        }
    });
    counts
}

fn count_in(statements: &[StructuredStmt], var: &LocalVar) -> usize {
    var.id
        .and_then(|id| var_counts(statements).get(&id).copied())
        .unwrap_or(0)
}

/// `var` occurs only inside `statements`.
fn confined_to(statements: &[StructuredStmt], var: &LocalVar, counts: &HashMap<u32, usize>) -> bool {
    match var.id {
        Some(id) => counts.get(&id).copied().unwrap_or(0) == count_in(statements, var),
        None => false,
    }
}

fn is_load_of(e: &Expr, var: &LocalVar) -> bool {
    matches!(e, Expr::LocalLoad(v) if v.same_variable(var))
}

/// `var.name()` with no arguments.
fn is_call_on(e: &Expr, name: &str, var: &LocalVar) -> bool {
    matches!(e, Expr::MethodCall { method_name, object: Some(o), args, .. }
        if method_name == name && args.is_empty() && is_load_of(o, var))
}

/// The receiver of `x.ordinal()`.
fn ordinal_operand(e: &Expr) -> Option<&Expr> {
    match e {
        Expr::MethodCall {
            method_name,
            object: Some(o),
            args,
            descriptor,
            ..
        } if method_name == "ordinal" && args.is_empty() && descriptor == "()I" => Some(o),
        _ => None,
    }
}

fn and(left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op: BinOp::CondAnd,
        left: left.boxed(),
        right: right.boxed(),
    }
}

fn or(left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op: BinOp::CondOr,
        left: left.boxed(),
        right: right.boxed(),
    }
}

fn conjuncts(e: &Expr, out: &mut Vec<Expr>) {
    match e {
        Expr::BinaryOp {
            op: BinOp::CondAnd,
            left,
            right,
        } => {
            conjuncts(left, out);
            conjuncts(right, out);
        }
        other => out.push(other.clone()),
    }
}

// ---- booleans ----

fn is_boolean_valued(e: &Expr) -> bool {
    match e {
        Expr::IntLiteral(0 | 1) => true,
        Expr::Ternary {
            then_expr, else_expr, ..
        } => is_boolean_valued(then_expr) && is_boolean_valued(else_expr),
        other => other.is_boolean(),
    }
}

fn coerce_boolean(e: &mut Expr, selects: bool) {
    let replacement = match e {
        Expr::IntLiteral(0) => Some(Expr::BooleanLiteral(false)),
        Expr::IntLiteral(1) => Some(Expr::BooleanLiteral(true)),
        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
        } if selects => {
            coerce_boolean(then_expr, true);
            coerce_boolean(else_expr, true);
            fold_select(condition, then_expr, else_expr)
        }
        _ => None,
    };
    if let Some(r) = replacement {
        *e = r;
    }
}

/// `c ? a : b` with a boolean literal on one side, as `&&` / `||`.
fn fold_select(c: &Expr, a: &Expr, b: &Expr) -> Option<Expr> {
    let c = c.clone();
    match (a, b) {
        (Expr::BooleanLiteral(true), Expr::BooleanLiteral(false)) => Some(c),
        (Expr::BooleanLiteral(false), Expr::BooleanLiteral(true)) => Some(negate_expr(c)),
        (Expr::BooleanLiteral(true), other) if other.is_boolean() => Some(or(c, other.clone())),
        (Expr::BooleanLiteral(false), other) if other.is_boolean() => Some(and(negate_expr(c), other.clone())),
        (other, Expr::BooleanLiteral(false)) if other.is_boolean() => Some(and(c, other.clone())),
        (other, Expr::BooleanLiteral(true)) if other.is_boolean() => Some(or(negate_expr(c), other.clone())),
        _ => None,
    }
}

fn simplify_boolean(e: &mut Expr, selects: bool) {
    match e {
        Expr::MethodCall { descriptor, args, .. } => coerce_boolean_args(descriptor, args, selects),
        Expr::New {
            constructor_descriptor,
            args,
            ..
        } => coerce_boolean_args(constructor_descriptor, args, selects),
        Expr::Assign { target, value } if target.jvm_type() == JvmType::Boolean => coerce_boolean(value, selects),
        Expr::Ternary {
            then_expr, else_expr, ..
        } => {
            if then_expr.is_boolean() {
                coerce_boolean(else_expr, selects);
            } else if else_expr.is_boolean() {
                coerce_boolean(then_expr, selects);
            }
        }
        _ => {}
    }

    let replacement = match e {
        Expr::Compare {
            op: op @ (CompareOp::Eq | CompareOp::Ne),
            left,
            right,
        } if left.is_boolean() => {
            let truth = match right.as_ref() {
                Expr::IntLiteral(0) | Expr::BooleanLiteral(false) => Some(false),
                Expr::IntLiteral(1) | Expr::BooleanLiteral(true) => Some(true),
                _ => None,
            };
            // b != 0, b == 1 -> b; b == 0, b != 1 -> !b
            truth.map(|t| {
                let operand = left.as_ref().clone();
                if (*op == CompareOp::Ne) != t {
                    operand
                } else {
                    negate_expr(operand)
                }
            })
        }
        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
        } => match (then_expr.as_ref(), else_expr.as_ref()) {
            (Expr::BooleanLiteral(true), Expr::BooleanLiteral(false)) => Some(condition.as_ref().clone()),
            (Expr::BooleanLiteral(false), Expr::BooleanLiteral(true)) => Some(negate_expr(condition.as_ref().clone())),
            _ => None,
        },
        _ => None,
    };
    if let Some(r) = replacement {
        *e = r;
    }
}

fn coerce_boolean_args(descriptor: &str, args: &mut [Expr], selects: bool) {
    let Some((params, _)) = parse_method_descriptor(descriptor) else {
        return;
    };
    for (arg, ty) in args.iter_mut().zip(&params) {
        if *ty == JvmType::Boolean {
            coerce_boolean(arg, selects);
        }
    }
}

// ---- ternaries ----

fn single_store(body: &[StructuredStmt]) -> Option<(&LocalVar, &Expr, Option<SourceSpan>)> {
    match body {
        [StructuredStmt::Simple {
            stmt: Stmt::LocalStore { var, value },
            span,
        }] => Some((var, value, *span)),
        _ => None,
    }
}

/// `if (c) x = a; else x = b;` -> `x = c ? a : b;` when `x` is a stack
/// temporary or read by the next statement.
fn merge_ternaries(list: &mut [StructuredStmt], temps: &HashSet<u32>) {
    for i in 0..list.len() {
        let StructuredStmt::If {
            condition,
            then_body,
            else_body: Some(else_body),
        } = &list[i]
        else {
            continue;
        };
        let (Some((a, va, span)), Some((b, vb, _))) = (single_store(then_body), single_store(else_body)) else {
            continue;
        };
        if !a.same_variable(b) {
            continue;
        }
        let is_temp = a.id.map_or(false, |id| temps.contains(&id));
        let used_next = list.get(i + 1).map_or(false, |next| next.mentions_var(a));
        if !is_temp && !used_next {
            continue;
        }
        let merged = StructuredStmt::Simple {
            stmt: Stmt::LocalStore {
                var: a.clone(),
                value: Expr::Ternary {
                    condition: condition.clone().boxed(),
                    then_expr: va.clone().boxed(),
                    else_expr: vb.clone().boxed(),
                },
            },
            span,
        };
        list[i] = merged;
    }
}

/// Fold a single-use stack temporary into the statement that reads it.
fn inline_temporaries(list: &mut Vec<StructuredStmt>, temps: &HashSet<u32>, counts: &HashMap<u32, usize>) {
    let mut i = list.len().saturating_sub(1);
    while i > 0 {
        i -= 1;
        let Some(Stmt::LocalStore { var, value }) = list[i].as_simple() else {
            continue;
        };
        let Some(id) = var.id.filter(|id| temps.contains(id)) else {
            continue;
        };
        if counts.get(&id) != Some(&2) {
            continue;
        }
        let (var, value) = (var.clone(), value.clone());
        if substitute_use(&mut list[i + 1], &var, &value) {
            trace!(temp = id, "inlined stack temporary");
            list.remove(i);
        }
    }
}

enum Substitution {
    Replaced,
    Blocked,
    Absent,
}

fn substitute_use(target: &mut StructuredStmt, var: &LocalVar, value: &Expr) -> bool {
    let exprs: Vec<&mut Expr> = match target {
        StructuredStmt::Simple { stmt, .. } => {
            if stmt.target_var().map_or(false, |t| t.same_variable(var)) {
                return false;
            }
            stmt.exprs_mut()
        }
        StructuredStmt::If { condition, .. } => vec![condition],
        StructuredStmt::Switch { expr, .. } => vec![expr],
        StructuredStmt::Synchronized { object, .. } => vec![object],
        _ => return false,
    };
    let mut effect_seen = false;
    for e in exprs {
        match replace_load(e, var, value, &mut effect_seen, false) {
            Substitution::Replaced => return true,
            Substitution::Blocked => return false,
            Substitution::Absent => {}
        }
    }
    false
}

/// Replace the load of `var` in `e`, visiting operands in evaluation order.
/// Blocked when moving `value` there would reorder it with another effect
/// or make its evaluation conditional.
fn replace_load(
    e: &mut Expr,
    var: &LocalVar,
    value: &Expr,
    effect_seen: &mut bool,
    conditional: bool,
) -> Substitution {
    if is_load_of(e, var) {
        let movable = value.is_literal() || (!*effect_seen && (!conditional || value.is_pure()));
        if !movable {
            return Substitution::Blocked;
        }
        *e = value.clone();
        return Substitution::Replaced;
    }
    let lazy_from = match e {
        Expr::Ternary { .. } => 1,
        Expr::BinaryOp {
            op: BinOp::CondAnd | BinOp::CondOr,
            ..
        } => 1,
        _ => usize::MAX,
    };
    let effect_node = e.is_effect_node();
    for (i, child) in e.children_mut().into_iter().enumerate() {
        match replace_load(child, var, value, effect_seen, conditional || i >= lazy_from) {
            Substitution::Absent => {}
            done => return done,
        }
    }
    if effect_node {
        *effect_seen = true;
    }
    Substitution::Absent
}

// ---- string concatenation ----

fn concatenations(statements: &mut [StructuredStmt]) -> Result<(), ReconstructError> {
    let mut failure = None;
    walk_exprs_mut(statements, &mut |e| match concat_parts(e) {
        Ok(Some(parts)) => *e = join_concat(parts),
        Ok(None) => {}
        Err(err) => {
            failure.get_or_insert(err);
        }
    });
    failure.map_or(Ok(()), Err)
}

fn is_builder(class_name: &str) -> bool {
    matches!(class_name, "java/lang/StringBuilder" | "java/lang/StringBuffer")
}

fn concat_parts(e: &Expr) -> Result<Option<Vec<Expr>>, ReconstructError> {
    match e {
        Expr::MethodCall {
            class_name,
            method_name,
            object: Some(chain),
            args,
            ..
        } if is_builder(class_name) && method_name == "toString" && args.is_empty() => {
            let mut parts = Vec::new();
            Ok(unwind_builder(chain, &mut parts).then_some(parts))
        }
        Expr::InvokeDynamic {
            method_name,
            bootstrap,
            bootstrap_args,
            captures,
            ..
        } if bootstrap.owner == "java/lang/invoke/StringConcatFactory" => {
            recipe_parts(method_name, bootstrap_args, captures).map(Some)
        }
        _ => Ok(None),
    }
}

fn unwind_builder(e: &Expr, parts: &mut Vec<Expr>) -> bool {
    match e {
        Expr::MethodCall {
            class_name,
            method_name,
            descriptor,
            object: Some(inner),
            args,
            ..
        } if is_builder(class_name) && method_name == "append" && args.len() == 1 => {
            if !unwind_builder(inner, parts) {
                return false;
            }
            let part = match &args[0] {
                Expr::IntLiteral(c) if descriptor.starts_with("(C)") => Expr::Cast {
                    target_type: JvmType::Char,
                    operand: Expr::IntLiteral(*c).boxed(),
                },
                other => other.clone(),
            };
            parts.push(part);
            true
        }
        Expr::New {
            class_name,
            constructor_descriptor,
            args,
        } if is_builder(class_name) => match (constructor_descriptor.as_str(), args.as_slice()) {
            ("()V", []) => true,
            ("(Ljava/lang/String;)V" | "(Ljava/lang/CharSequence;)V", [first]) => {
                parts.push(strip_value_of(first));
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// `String.valueOf(x)` -> `x`
fn strip_value_of(e: &Expr) -> Expr {
    match e {
        Expr::MethodCall {
            kind: InvokeKind::Static,
            class_name,
            method_name,
            descriptor,
            args,
            ..
        } if class_name == "java/lang/String"
            && method_name == "valueOf"
            && args.len() == 1
            && !descriptor.starts_with("([C") =>
        {
            args[0].clone()
        }
        other => other.clone(),
    }
}

fn constant_expr(c: &Constant) -> Expr {
    match c {
        Constant::Int(v) => Expr::IntLiteral(*v),
        Constant::Long(v) => Expr::LongLiteral(*v),
        Constant::Float(v) => Expr::FloatLiteral(*v),
        Constant::Double(v) => Expr::DoubleLiteral(*v),
        Constant::String(s) => Expr::StringLiteral(s.clone()),
        Constant::Class(c) => Expr::ClassLiteral(c.clone()),
        other => Expr::Unresolved(other.to_string()),
    }
}

/// Operands of a `makeConcatWithConstants` recipe: `\u{1}` takes the next
/// captured value, `\u{2}` the next bootstrap constant.
fn recipe_parts(
    method_name: &str,
    bootstrap_args: &[Constant],
    captures: &[Expr],
) -> Result<Vec<Expr>, ReconstructError> {
    if method_name == "makeConcat" {
        return Ok(captures.to_vec());
    }
    let Some(Constant::String(recipe)) = bootstrap_args.first() else {
        return Err(ReconstructError::unsupported(0, "string concatenation without a recipe"));
    };
    let mismatch = || ReconstructError::unsupported(0, "concatenation recipe does not match its operands");
    let mut constants = bootstrap_args[1..].iter();
    let mut values = captures.iter();
    let mut parts = Vec::new();
    let mut literal = String::new();
    for c in recipe.chars() {
        match c {
            '\u{1}' => {
                if !literal.is_empty() {
                    parts.push(Expr::StringLiteral(std::mem::take(&mut literal)));
                }
                parts.push(values.next().ok_or_else(mismatch)?.clone());
            }
            '\u{2}' => match constants.next().ok_or_else(mismatch)? {
                Constant::String(s) => literal.push_str(s),
                other => {
                    if !literal.is_empty() {
                        parts.push(Expr::StringLiteral(std::mem::take(&mut literal)));
                    }
                    parts.push(constant_expr(other));
                }
            },
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        parts.push(Expr::StringLiteral(literal));
    }
    if values.next().is_some() {
        return Err(mismatch());
    }
    Ok(parts)
}

/// Left-nested `+` chain; starts with `""` unless one of the first two
/// operands is already a string.
fn join_concat(mut parts: Vec<Expr>) -> Expr {
    if !parts.iter().take(2).any(|p| p.jvm_type().is_string()) {
        parts.insert(0, Expr::StringLiteral(String::new()));
    }
    let mut iter = parts.into_iter();
    let first = iter.next().unwrap_or_else(|| Expr::StringLiteral(String::new()));
    iter.fold(first, |acc, part| Expr::BinaryOp {
        op: BinOp::Add,
        left: acc.boxed(),
        right: part.boxed(),
    })
}

// ---- boxing ----

/// The operand of `Integer.valueOf(i)` or `boxed.intValue()`.
fn boxing_operand(e: &Expr) -> Option<Expr> {
    let Expr::MethodCall {
        kind,
        class_name,
        method_name,
        descriptor,
        object,
        args,
        ..
    } = e
    else {
        return None;
    };
    let &(_, prim, unbox) = WRAPPERS.iter().find(|(w, _, _)| *w == class_name.as_str())?;
    match (kind, object, args.as_slice()) {
        (InvokeKind::Static, None, [value])
            if method_name == "valueOf" && *descriptor == format!("({})L{};", prim, class_name) =>
        {
            Some(value.clone())
        }
        (InvokeKind::Virtual, Some(obj), []) if method_name == unbox && *descriptor == format!("(){}", prim) => {
            Some(obj.as_ref().clone())
        }
        _ => None,
    }
}

/// Drop boxing calls below `e`; `keep_top` protects `e` itself, for
/// receivers and expression statements.
fn elide_boxing(e: &mut Expr, keep_top: bool) {
    match &mut *e {
        Expr::MethodCall { object, args, .. } => {
            if let Some(o) = object {
                elide_boxing(o, true);
            }
            for a in args.iter_mut() {
                elide_boxing(a, false);
            }
        }
        Expr::FieldGet { object: Some(o), .. } => elide_boxing(o, true),
        Expr::Compare { left, right, .. } => {
            elide_boxing(left, true);
            elide_boxing(right, true);
            let l = boxing_operand(left);
            let r = boxing_operand(right);
            let l_ref = l.as_ref().map_or_else(|| left.jvm_type(), |x| x.jvm_type()).is_reference();
            let r_ref = r.as_ref().map_or_else(|| right.jvm_type(), |x| x.jvm_type()).is_reference();
            // two wrappers would compare by identity
            let both_refs = l_ref && r_ref && !(left.jvm_type().is_reference() && right.jvm_type().is_reference());
            if let Some(l) = l {
                **left = l;
            }
            if !both_refs {
                if let Some(r) = r {
                    **right = r;
                }
            }
        }
        other => {
            for c in other.children_mut() {
                elide_boxing(c, false);
            }
        }
    }
    if !keep_top {
        if let Some(inner) = boxing_operand(e) {
            *e = inner;
        }
    }
}

fn elide_boxing_in_stmt(s: &mut StructuredStmt) {
    match s {
        StructuredStmt::Simple { stmt, .. } => match stmt {
            Stmt::ExprStmt(e) | Stmt::Monitor { object: e, .. } | Stmt::Throw(e) => elide_boxing(e, true),
            Stmt::FieldStore { object, value, .. } => {
                if let Some(o) = object {
                    elide_boxing(o, true);
                }
                elide_boxing(value, false);
            }
            Stmt::ArrayStore { array, index, value } => {
                elide_boxing(array, true);
                elide_boxing(index, false);
                elide_boxing(value, false);
            }
            other => {
                for e in other.exprs_mut() {
                    elide_boxing(e, false);
                }
            }
        },
        StructuredStmt::Synchronized { object, .. } => elide_boxing(object, true),
        StructuredStmt::ForEach { iterable, .. } => elide_boxing(iterable, true),
        other => {
            for e in other.exprs_mut() {
                elide_boxing(e, false);
            }
        }
    }
}

// ---- enhanced for ----

fn enhanced_for_loops(statements: &mut Vec<StructuredStmt>) {
    let counts = var_counts(statements);
    walk_lists_mut(statements, &mut |list| {
        let mut i = 0;
        while i < list.len() {
            if !rewrite_iterator_loop(list, i, &counts) {
                rewrite_array_loop(list, i, &counts);
            }
            i += 1;
        }
    });
}

/// Casts and unboxing around `it.next()`.
fn strip_conversions(mut e: &Expr) -> &Expr {
    loop {
        e = match e {
            Expr::Cast { operand, .. } => operand.as_ref(),
            Expr::MethodCall {
                object: Some(o),
                args,
                method_name,
                ..
            } if args.is_empty() && method_name.ends_with("Value") => o.as_ref(),
            _ => return e,
        };
    }
}

/// `it = c.iterator(); while (it.hasNext()) { x = it.next(); ... }`
fn rewrite_iterator_loop(list: &mut Vec<StructuredStmt>, i: usize, counts: &HashMap<u32, usize>) -> bool {
    let (Some(Stmt::LocalStore { var: it, value: init }), Some(StructuredStmt::While { condition, body })) =
        (list[i].as_simple(), list.get(i + 1))
    else {
        return false;
    };
    let Expr::MethodCall {
        method_name,
        object: Some(iterable),
        args,
        ..
    } = init
    else {
        return false;
    };
    if method_name != "iterator" || !args.is_empty() || !is_call_on(condition, "hasNext", it) {
        return false;
    }
    let Some(StructuredStmt::Simple {
        stmt: Stmt::LocalStore { var: element, value },
        ..
    }) = body.first()
    else {
        return false;
    };
    if !is_call_on(strip_conversions(value), "next", it) || !confined_to(&list[i..i + 2], it, counts) {
        return false;
    }
    if list_mentions(&body[1..], it) {
        return false;
    }
    let foreach = StructuredStmt::ForEach {
        var: element.clone(),
        iterable: iterable.as_ref().clone(),
        body: body[1..].to_vec(),
    };
    trace!("rewrote iterator loop as enhanced for");
    list.splice(i..i + 2, std::iter::once(foreach));
    true
}

/// `a = e; n = a.length; for (i = 0; i < n; i++) { x = a[i]; ... }`
fn rewrite_array_loop(list: &mut Vec<StructuredStmt>, i: usize, counts: &HashMap<u32, usize>) -> bool {
    let Some(Stmt::LocalStore {
        var: array_var,
        value: array_expr,
    }) = list[i].as_simple()
    else {
        return false;
    };
    let Some(Stmt::LocalStore {
        var: length_var,
        value: Expr::ArrayLength { array },
    }) = list.get(i + 1).and_then(StructuredStmt::as_simple)
    else {
        return false;
    };
    if !is_load_of(array, array_var) {
        return false;
    }
    // `i = 0` sits either in the loop header or just before the loop
    let (loop_at, outer_init) = match list.get(i + 2) {
        Some(StructuredStmt::For { .. }) => (i + 2, None),
        Some(StructuredStmt::Simple {
            stmt: store @ Stmt::LocalStore { .. },
            ..
        }) => (i + 3, Some(store)),
        _ => return false,
    };
    let Some(StructuredStmt::For {
        init,
        condition,
        update,
        body,
    }) = list.get(loop_at)
    else {
        return false;
    };
    let index_init = match (outer_init, init.as_slice()) {
        (Some(store), []) => store,
        (None, [StructuredStmt::Simple { stmt, .. }]) => stmt,
        _ => return false,
    };
    let Stmt::LocalStore {
        var: index_var,
        value: Expr::IntLiteral(0),
    } = index_init
    else {
        return false;
    };
    let Expr::Compare {
        op: CompareOp::Lt,
        left,
        right,
    } = condition
    else {
        return false;
    };
    if !is_load_of(left, index_var) || !is_load_of(right, length_var) {
        return false;
    }
    let [StructuredStmt::Simple {
        stmt: Stmt::Iinc { var: step, amount: 1 },
        ..
    }] = update.as_slice()
    else {
        return false;
    };
    if !step.same_variable(index_var) {
        return false;
    }
    let Some(StructuredStmt::Simple {
        stmt:
            Stmt::LocalStore {
                var: element,
                value: Expr::ArrayLoad {
                    array: element_array,
                    index,
                    ..
                },
            },
        ..
    }) = body.first()
    else {
        return false;
    };
    if !is_load_of(element_array, array_var) || !is_load_of(index, index_var) {
        return false;
    }
    let rest = &body[1..];
    let matched = &list[i..=loop_at];
    for helper in [array_var, length_var, index_var] {
        if list_mentions(rest, helper) || !confined_to(matched, helper, counts) {
            return false;
        }
    }
    let foreach = StructuredStmt::ForEach {
        var: element.clone(),
        iterable: array_expr.clone(),
        body: rest.to_vec(),
    };
    trace!("rewrote indexed array loop as enhanced for");
    list.splice(i..=loop_at, std::iter::once(foreach));
    true
}

// ---- try-with-resources ----

fn try_with_resources(statements: &mut Vec<StructuredStmt>) {
    walk_lists_mut(statements, &mut |list| {
        let mut i = 0;
        while i < list.len() {
            rewrite_resource_block(list, i);
            i += 1;
        }
        merge_resource_blocks(list);
    });
}

fn is_not_null_check(e: &Expr, var: &LocalVar) -> bool {
    match e {
        Expr::Compare {
            op: CompareOp::Ne,
            left,
            right,
        } => {
            (is_load_of(left, var) && matches!(right.as_ref(), Expr::NullLiteral))
                || (is_load_of(right, var) && matches!(left.as_ref(), Expr::NullLiteral))
        }
        _ => false,
    }
}

/// `r.close();`, possibly behind `if (r != null)`.
fn is_close_stmt(s: &StructuredStmt, resource: &LocalVar) -> bool {
    match s {
        StructuredStmt::Simple {
            stmt: Stmt::ExprStmt(e),
            ..
        } => is_call_on(e, "close", resource),
        StructuredStmt::If {
            condition,
            then_body,
            else_body: None,
        } => is_not_null_check(condition, resource) && matches!(then_body.as_slice(), [only] if is_close_stmt(only, resource)),
        _ => false,
    }
}

fn is_add_suppressed(s: &StructuredStmt, primary: Option<&LocalVar>) -> bool {
    match s.as_simple() {
        Some(Stmt::ExprStmt(Expr::MethodCall {
            method_name,
            object: Some(o),
            args,
            ..
        })) if method_name == "addSuppressed" && args.len() == 1 => {
            primary.map_or(matches!(o.as_ref(), Expr::LocalLoad(_)), |p| is_load_of(o, p))
        }
        _ => false,
    }
}

/// `try { r.close(); } catch (Throwable t2) { primary.addSuppressed(t2); }`,
/// possibly behind `if (r != null)`.
fn is_suppressed_close(s: &StructuredStmt, resource: &LocalVar, primary: Option<&LocalVar>) -> bool {
    match s {
        StructuredStmt::TryCatch {
            try_body,
            catches,
            finally_body: None,
        } => {
            matches!(try_body.as_slice(), [only] if is_close_stmt(only, resource))
                && matches!(catches.as_slice(), [c] if c.body.iter().all(|b| is_add_suppressed(b, primary)))
        }
        StructuredStmt::If {
            condition,
            then_body,
            else_body: None,
        } => {
            is_not_null_check(condition, resource)
                && !then_body.is_empty()
                && then_body.iter().all(|b| is_suppressed_close(b, resource, primary))
        }
        _ => false,
    }
}

/// Any statement of a compiler-generated finally block that closes `resource`.
fn closes_resource(s: &StructuredStmt, resource: &LocalVar) -> bool {
    if is_close_stmt(s, resource) || is_suppressed_close(s, resource, None) {
        return true;
    }
    match s {
        StructuredStmt::If {
            then_body, else_body, ..
        } => {
            !then_body.is_empty()
                && then_body.iter().all(|b| closes_resource(b, resource))
                && else_body
                    .as_ref()
                    .map_or(true, |e| e.iter().all(|b| closes_resource(b, resource)))
        }
        _ => false,
    }
}

fn is_throwable_catch(c: &CatchClause) -> bool {
    c.exception_types.len() == 1 && c.exception_types[0] == THROWABLE
}

/// Drop the close calls the compiler copies in front of every exit.
fn strip_closes(body: &mut Vec<StructuredStmt>, resource: &LocalVar) {
    walk_lists_mut(body, &mut |list| {
        let mut k = 0;
        while k < list.len() {
            let exits_next = list.get(k + 1).map_or(false, StructuredStmt::is_terminal);
            if exits_next && is_close_stmt(&list[k], resource) {
                list.remove(k);
            } else {
                k += 1;
            }
        }
    });
    if body.last().map_or(false, |s| is_close_stmt(s, resource)) {
        body.pop();
    }
}

fn rewrite_resource_block(list: &mut Vec<StructuredStmt>, i: usize) -> bool {
    let Some(Stmt::LocalStore {
        var: resource,
        value: init,
    }) = list[i].as_simple()
    else {
        return false;
    };
    let (resource, init) = (resource.clone(), init.clone());

    // javac 9+: try { body } catch (Throwable t) { <close, suppressed>; throw t; } r.close();
    if let Some(StructuredStmt::TryCatch {
        try_body,
        catches,
        finally_body: None,
    }) = list.get(i + 1)
    {
        if let [c] = catches.as_slice() {
            let rethrows = match (c.var.as_ref(), c.body.as_slice()) {
                (Some(t), [close, StructuredStmt::Simple {
                    stmt: Stmt::Throw(thrown),
                    ..
                }]) => is_load_of(thrown, t) && is_suppressed_close(close, &resource, Some(t)),
                _ => false,
            };
            if is_throwable_catch(c) && rethrows {
                let mut body = try_body.clone();
                strip_closes(&mut body, &resource);
                let end = match list.get(i + 2) {
                    Some(s) if is_close_stmt(s, &resource) => i + 2,
                    _ => i + 1,
                };
                let twr = StructuredStmt::TryWithResources {
                    resources: vec![(resource, init)],
                    body,
                    catches: Vec::new(),
                    finally_body: None,
                };
                trace!("rewrote try-with-resources");
                list.splice(i..=end, std::iter::once(twr));
                return true;
            }
        }
    }

    // javac 7/8: Throwable primary = null; try { body } catch (Throwable t) { primary = t; throw t; } finally { <close> }
    let (primary, try_at) = match list.get(i + 1).and_then(StructuredStmt::as_simple) {
        Some(Stmt::LocalStore {
            var,
            value: Expr::NullLiteral,
        }) => (Some(var.clone()), i + 2),
        _ => (None, i + 1),
    };
    let Some(StructuredStmt::TryCatch {
        try_body,
        catches,
        finally_body: Some(finally_body),
    }) = list.get(try_at)
    else {
        return false;
    };
    if finally_body.is_empty() || !finally_body.iter().all(|s| closes_resource(s, &resource)) {
        return false;
    }
    let captures_primary = |c: &CatchClause| match (c.var.as_ref(), primary.as_ref(), c.body.as_slice()) {
        (Some(t), Some(p), [StructuredStmt::Simple {
            stmt: Stmt::LocalStore { var, value },
            ..
        }, StructuredStmt::Simple {
            stmt: Stmt::Throw(thrown),
            ..
        }]) => var.same_variable(p) && is_load_of(value, t) && is_load_of(thrown, t),
        _ => false,
    };
    let catches_ok = match catches.as_slice() {
        [] => true,
        [c] => is_throwable_catch(c) && captures_primary(c),
        _ => false,
    };
    if !catches_ok {
        return false;
    }
    let mut body = try_body.clone();
    strip_closes(&mut body, &resource);
    let twr = StructuredStmt::TryWithResources {
        resources: vec![(resource, init)],
        body,
        catches: Vec::new(),
        finally_body: None,
    };
    trace!("rewrote finally-closed resource as try-with-resources");
    list.splice(i..=try_at, std::iter::once(twr));
    true
}

/// Fold an enclosing try's handlers into a sole inner resource block and
/// flatten directly nested resource blocks.
fn merge_resource_blocks(list: &mut [StructuredStmt]) {
    for s in list.iter_mut() {
        let merged = match s {
            StructuredStmt::TryCatch {
                try_body,
                catches,
                finally_body,
            } => match try_body.as_slice() {
                [StructuredStmt::TryWithResources {
                    resources,
                    body,
                    catches: inner_catches,
                    finally_body: None,
                }] if inner_catches.is_empty() => Some(StructuredStmt::TryWithResources {
                    resources: resources.clone(),
                    body: body.clone(),
                    catches: catches.clone(),
                    finally_body: finally_body.clone(),
                }),
                _ => None,
            },
            StructuredStmt::TryWithResources {
                resources,
                body,
                catches,
                finally_body,
            } => match body.as_slice() {
                [StructuredStmt::TryWithResources {
                    resources: inner_resources,
                    body: inner_body,
                    catches: inner_catches,
                    finally_body: None,
                }] if inner_catches.is_empty() => {
                    let mut all = resources.clone();
                    all.extend(inner_resources.iter().cloned());
                    Some(StructuredStmt::TryWithResources {
                        resources: all,
                        body: inner_body.clone(),
                        catches: catches.clone(),
                        finally_body: finally_body.clone(),
                    })
                }
                _ => None,
            },
            _ => None,
        };
        if let Some(merged) = merged {
            *s = merged;
        }
    }
}

// ---- assert ----

fn is_assertions_enabled(e: &Expr) -> bool {
    let is_flag = |x: &Expr| matches!(x, Expr::FieldGet { field_name, .. } if field_name == ASSERTIONS_DISABLED);
    match e {
        Expr::UnaryOp {
            op: UnaryOp::Not,
            operand,
        } => is_flag(operand),
        Expr::Compare {
            op: CompareOp::Eq,
            left,
            right,
        } => is_flag(left) && matches!(right.as_ref(), Expr::IntLiteral(0) | Expr::BooleanLiteral(false)),
        _ => false,
    }
}

fn rewrite_assert(s: &mut StructuredStmt) {
    let replacement = match s {
        StructuredStmt::If {
            condition,
            then_body,
            else_body: None,
        } => assert_from(condition, then_body),
        _ => None,
    };
    if let Some(assert) = replacement {
        trace!("rewrote assert");
        *s = assert;
    }
}

/// `if (!$assertionsDisabled && !cond) throw new AssertionError(msg);`
fn assert_from(condition: &Expr, then_body: &[StructuredStmt]) -> Option<StructuredStmt> {
    let mut parts = Vec::new();
    conjuncts(condition, &mut parts);
    if !parts.first().map_or(false, is_assertions_enabled) {
        return None;
    }
    let mut failed: Vec<Expr> = parts[1..].to_vec();
    let mut body = then_body;
    if let (true, [StructuredStmt::If {
        condition: inner,
        then_body: inner_body,
        else_body: None,
    }]) = (failed.is_empty(), then_body)
    {
        conjuncts(inner, &mut failed);
        body = inner_body.as_slice();
    }
    let message = match body {
        [StructuredStmt::Simple {
            stmt: Stmt::Throw(Expr::New { class_name, args, .. }),
            ..
        }] if class_name == "java/lang/AssertionError" => args.first().cloned(),
        _ => return None,
    };
    let condition = match failed.into_iter().reduce(and) {
        Some(failed) => negate_expr(failed),
        None => Expr::BooleanLiteral(false),
    };
    Some(StructuredStmt::Assert { condition, message })
}

// ---- string switch ----

/// `String.hashCode` as the JVM computes it.
fn java_string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// `s.equals("lit")` -> `lit`
fn equals_literal<'e>(e: &'e Expr, subject: &LocalVar) -> Option<&'e str> {
    match e {
        Expr::MethodCall {
            method_name,
            object: Some(o),
            args,
            ..
        } if method_name == "equals" && is_load_of(o, subject) => match args.as_slice() {
            [Expr::StringLiteral(lit)] => Some(lit),
            _ => None,
        },
        _ => None,
    }
}

fn not_equals_literal<'e>(e: &'e Expr, subject: &LocalVar) -> Option<&'e str> {
    match e {
        Expr::UnaryOp {
            op: UnaryOp::Not,
            operand,
        } => equals_literal(operand, subject),
        Expr::Compare {
            op: CompareOp::Eq,
            left,
            right,
        } if matches!(right.as_ref(), Expr::IntLiteral(0) | Expr::BooleanLiteral(false)) => {
            equals_literal(left, subject)
        }
        _ => None,
    }
}

/// Collect `(index, literal)` pairs from one arm of the hash switch.
fn collect_string_labels(
    stmts: &[StructuredStmt],
    subject: &LocalVar,
    index_var: &LocalVar,
    guard: Option<&str>,
    out: &mut Vec<(i32, String)>,
) {
    let mut guard = guard.map(str::to_string);
    for s in stmts {
        match s {
            StructuredStmt::If {
                condition,
                then_body,
                else_body,
            } => {
                if let Some(lit) = equals_literal(condition, subject) {
                    collect_string_labels(then_body, subject, index_var, Some(lit), out);
                    if let Some(else_body) = else_body {
                        collect_string_labels(else_body, subject, index_var, guard.as_deref(), out);
                    }
                } else if let Some(lit) = not_equals_literal(condition, subject) {
                    if let Some(else_body) = else_body {
                        collect_string_labels(else_body, subject, index_var, Some(lit), out);
                    }
                    if ends_terminal(then_body) {
                        guard = Some(lit.to_string());
                    }
                }
            }
            StructuredStmt::Simple {
                stmt: Stmt::LocalStore {
                    var,
                    value: Expr::IntLiteral(k),
                },
                ..
            } if var.same_variable(index_var) => {
                if let Some(lit) = &guard {
                    out.push((*k, lit.clone()));
                }
            }
            _ => {}
        }
    }
}

/// `s = e; idx = -1; switch (s.hashCode()) {...} switch (idx) {...}`
fn rewrite_string_switch(
    list: &mut Vec<StructuredStmt>,
    i: usize,
    counts: &HashMap<u32, usize>,
) -> Result<bool, ReconstructError> {
    if i + 3 >= list.len() {
        return Ok(false);
    }
    let ((subject_var, subject), index_var) = match (list[i].as_simple(), list[i + 1].as_simple()) {
        (
            Some(Stmt::LocalStore { var: a, value: va }),
            Some(Stmt::LocalStore {
                var: b,
                value: Expr::IntLiteral(-1),
            }),
        ) if va.jvm_type().is_string() => ((a, va), b),
        (
            Some(Stmt::LocalStore {
                var: b,
                value: Expr::IntLiteral(-1),
            }),
            Some(Stmt::LocalStore { var: a, value: va }),
        ) if va.jvm_type().is_string() => ((a, va), b),
        _ => return Ok(false),
    };
    let StructuredStmt::Switch {
        expr: hash_expr,
        cases: hash_cases,
        ..
    } = &list[i + 2]
    else {
        return Ok(false);
    };
    let StructuredStmt::Switch {
        expr: index_expr,
        kind: SwitchKind::Int,
        cases,
    } = &list[i + 3]
    else {
        return Ok(false);
    };
    if !is_call_on(hash_expr, "hashCode", subject_var) || !is_load_of(index_expr, index_var) {
        return Ok(false);
    }
    if !confined_to(&list[i..=i + 2], subject_var, counts)
        || !confined_to(&list[i..=i + 3], index_var, counts)
        || cases.iter().any(|c| list_mentions(&c.body, index_var))
    {
        return Ok(false);
    }

    let mut labels: BTreeMap<i32, String> = BTreeMap::new();
    for case in hash_cases {
        let mut found = Vec::new();
        collect_string_labels(&case.body, subject_var, index_var, None, &mut found);
        for (k, lit) in found {
            if !case.values.contains(&SwitchValue::Int(java_string_hash(&lit))) {
                return Err(ReconstructError::unsupported(
                    0,
                    format!("string case {:?} sits under a different hash", lit),
                ));
            }
            labels.insert(k, lit);
        }
    }
    if labels.is_empty() {
        return Ok(false);
    }

    let mut relabeled = cases.clone();
    for case in relabeled.iter_mut() {
        for value in case.values.iter_mut() {
            let label = match value {
                SwitchValue::Int(k) => labels.get(&*k),
                _ => None,
            };
            let Some(label) = label else {
                return Err(ReconstructError::unsupported(0, "string switch index has no matching case"));
            };
            *value = SwitchValue::String(label.clone());
        }
    }
    let switch = StructuredStmt::Switch {
        expr: subject.clone(),
        kind: SwitchKind::String,
        cases: relabeled,
    };
    trace!(cases = labels.len(), "rewrote string switch");
    list.splice(i..=i + 3, std::iter::once(switch));
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompile::type_inference::VariableBinding;
    use crate::model::{Code, CodeBuilder, MethodAccessFlags, MethodModel, MethodRef};

    fn context_parts(descriptor: &str) -> (MethodModel, Code) {
        let code = CodeBuilder::new().return_void().build().unwrap();
        let method = MethodModel::new("test", descriptor, MethodAccessFlags::STATIC);
        (method, code)
    }

    fn var(id: u32, slot: u16, ty: JvmType) -> LocalVar {
        LocalVar {
            index: slot,
            name: Some(format!("v{}", id)),
            ty,
            offset: None,
            id: Some(id),
        }
    }

    fn binding(v: &LocalVar, kind: VariableKind) -> VariableBinding {
        VariableBinding {
            id: v.id.unwrap(),
            slot: v.index,
            name: v.name.clone().unwrap(),
            jvm_type: v.ty.clone(),
            java_type: JavaType::from_jvm(&v.ty),
            kind,
            live_range: Vec::new(),
            declaration: 0,
        }
    }

    fn string() -> JvmType {
        JvmType::Reference("java/lang/String".into())
    }

    fn load(v: &LocalVar) -> Expr {
        Expr::LocalLoad(v.clone())
    }

    fn store(v: &LocalVar, value: Expr) -> StructuredStmt {
        StructuredStmt::simple(Stmt::LocalStore {
            var: v.clone(),
            value,
        })
    }

    fn call(object: Option<Expr>, class: &str, name: &str, descriptor: &str, args: Vec<Expr>) -> Expr {
        let return_type = parse_method_descriptor(descriptor).unwrap().1;
        Expr::MethodCall {
            kind: if object.is_some() {
                InvokeKind::Virtual
            } else {
                InvokeKind::Static
            },
            object: object.map(Box::new),
            class_name: class.into(),
            method_name: name.into(),
            descriptor: descriptor.into(),
            args,
            return_type,
        }
    }

    fn run(statements: Vec<StructuredStmt>, variables: Vec<VariableBinding>, descriptor: &str) -> StructuredBody {
        run_with(statements, variables, descriptor, &DesugarTables::default())
    }

    fn run_with(
        statements: Vec<StructuredStmt>,
        variables: Vec<VariableBinding>,
        descriptor: &str,
        tables: &DesugarTables,
    ) -> StructuredBody {
        let (method, code) = context_parts(descriptor);
        let ctx = MethodContext::new("Test", &method, &code).unwrap();
        let mut body = StructuredBody { statements, variables };
        desugar(&mut body, &DesugarOptions::default(), tables, &ctx);
        body
    }

    fn compare(op: CompareOp, left: Expr, right: Expr) -> Expr {
        Expr::Compare {
            op,
            left: left.boxed(),
            right: right.boxed(),
        }
    }

    #[test]
    fn test_stack_ternary_into_return() {
        let a = var(0, 0, JvmType::Int);
        let tmp = var(1, 5, JvmType::Int);
        let cond = compare(CompareOp::Gt, load(&a), Expr::IntLiteral(0));
        let statements = vec![
            StructuredStmt::If {
                condition: cond.clone(),
                then_body: vec![store(&tmp, Expr::IntLiteral(1))],
                else_body: Some(vec![store(&tmp, Expr::IntLiteral(2))]),
            },
            StructuredStmt::simple(Stmt::Return(Some(load(&tmp)))),
        ];
        let vars = vec![binding(&a, VariableKind::Parameter), binding(&tmp, VariableKind::StackTemporary)];
        let body = run(statements, vars, "(I)I");
        assert_eq!(
            body.statements,
            vec![StructuredStmt::simple(Stmt::Return(Some(Expr::Ternary {
                condition: cond.boxed(),
                then_expr: Expr::IntLiteral(1).boxed(),
                else_expr: Expr::IntLiteral(2).boxed(),
            })))]
        );
    }

    #[test]
    fn test_boolean_select_folds_to_condition() {
        let a = var(0, 0, JvmType::Int);
        let tmp = var(1, 5, JvmType::Int);
        let statements = vec![
            StructuredStmt::If {
                condition: compare(CompareOp::Le, load(&a), Expr::IntLiteral(0)),
                then_body: vec![store(&tmp, Expr::IntLiteral(0))],
                else_body: Some(vec![store(&tmp, Expr::IntLiteral(1))]),
            },
            StructuredStmt::simple(Stmt::Return(Some(load(&tmp)))),
        ];
        let vars = vec![binding(&a, VariableKind::Parameter), binding(&tmp, VariableKind::StackTemporary)];
        let body = run(statements, vars, "(I)Z");
        assert_eq!(
            body.statements,
            vec![StructuredStmt::simple(Stmt::Return(Some(compare(
                CompareOp::Gt,
                load(&a),
                Expr::IntLiteral(0)
            ))))]
        );
    }

    #[test]
    fn test_int_flag_becomes_boolean() {
        let a = var(0, 0, JvmType::Int);
        let flag = var(1, 1, JvmType::Int);
        let statements = vec![
            store(
                &flag,
                Expr::Ternary {
                    condition: compare(CompareOp::Gt, load(&a), Expr::IntLiteral(3)).boxed(),
                    then_expr: Expr::IntLiteral(1).boxed(),
                    else_expr: Expr::IntLiteral(0).boxed(),
                },
            ),
            StructuredStmt::If {
                condition: compare(CompareOp::Ne, load(&flag), Expr::IntLiteral(0)),
                then_body: vec![StructuredStmt::simple(Stmt::Return(None))],
                else_body: None,
            },
        ];
        let vars = vec![binding(&a, VariableKind::Parameter), binding(&flag, VariableKind::Local)];
        let body = run(statements, vars, "(I)V");
        let flag_binding = body.variable(1).unwrap();
        assert_eq!(flag_binding.jvm_type, JvmType::Boolean);
        assert_eq!(flag_binding.name, "bool");
        let StructuredStmt::If { condition, .. } = &body.statements[1] else {
            panic!("expected if, got {:?}", body.statements[1]);
        };
        assert!(matches!(condition, Expr::LocalLoad(v) if v.name.as_deref() == Some("bool")));
        let Some(Stmt::LocalStore { value, .. }) = body.statements[0].as_simple() else {
            panic!("expected store");
        };
        assert_eq!(*value, compare(CompareOp::Gt, load(&a), Expr::IntLiteral(3)));
    }

    #[test]
    fn test_string_builder_chain() {
        let i = var(0, 0, JvmType::Int);
        let sb = "java/lang/StringBuilder";
        let chain = call(
            Some(call(
                Some(Expr::New {
                    class_name: sb.into(),
                    constructor_descriptor: "(Ljava/lang/String;)V".into(),
                    args: vec![Expr::StringLiteral("x=".into())],
                }),
                sb,
                "append",
                "(I)Ljava/lang/StringBuilder;",
                vec![load(&i)],
            )),
            sb,
            "toString",
            "()Ljava/lang/String;",
            vec![],
        );
        let statements = vec![StructuredStmt::simple(Stmt::Return(Some(chain)))];
        let body = run(statements, vec![binding(&i, VariableKind::Parameter)], "(I)Ljava/lang/String;");
        assert_eq!(
            body.statements,
            vec![StructuredStmt::simple(Stmt::Return(Some(Expr::BinaryOp {
                op: BinOp::Add,
                left: Expr::StringLiteral("x=".into()).boxed(),
                right: load(&i).boxed(),
            })))]
        );
    }

    #[test]
    fn test_indy_concat_recipe() {
        let a = var(0, 0, JvmType::Int);
        let b = var(1, 1, JvmType::Int);
        let indy = Expr::InvokeDynamic {
            method_name: "makeConcatWithConstants".into(),
            descriptor: "(II)Ljava/lang/String;".into(),
            bootstrap: MethodRef::new(
                "java/lang/invoke/StringConcatFactory",
                "makeConcatWithConstants",
                "(Ljava/lang/invoke/MethodHandles$Lookup;)Ljava/lang/invoke/CallSite;",
            ),
            bootstrap_args: vec![Constant::String("\u{1} and \u{1}".into())],
            captures: vec![load(&a), load(&b)],
            return_type: string(),
        };
        let parts = concat_parts(&indy).unwrap().unwrap();
        assert_eq!(parts, vec![load(&a), Expr::StringLiteral(" and ".into()), load(&b)]);

        let joined = join_concat(vec![load(&a), load(&b)]);
        let Expr::BinaryOp { left, .. } = &joined else {
            panic!("expected a concatenation");
        };
        assert!(matches!(left.as_ref(), Expr::BinaryOp { left, .. } if **left == Expr::StringLiteral(String::new())));
    }

    #[test]
    fn test_recipe_mismatch_is_an_error() {
        let err = recipe_parts("makeConcatWithConstants", &[Constant::String("\u{1}\u{1}".into())], &[Expr::IntLiteral(1)])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::FailureKind::UnsupportedPattern);
    }

    #[test]
    fn test_boxing_is_elided() {
        let list = var(0, 0, JvmType::Reference("java/util/List".into()));
        let i = var(1, 1, JvmType::Int);
        let boxed = call(None, "java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;", vec![load(&i)]);
        let add = call(Some(load(&list)), "java/util/List", "add", "(Ljava/lang/Object;)Z", vec![boxed.clone()]);
        let receiver = call(Some(boxed.clone()), "java/lang/Integer", "hashCode", "()I", vec![]);
        let statements = vec![
            StructuredStmt::simple(Stmt::ExprStmt(add)),
            StructuredStmt::simple(Stmt::ExprStmt(receiver.clone())),
        ];
        let vars = vec![binding(&list, VariableKind::Parameter), binding(&i, VariableKind::Parameter)];
        let body = run(statements, vars, "(Ljava/util/List;I)V");
        assert_eq!(
            body.statements[0],
            StructuredStmt::simple(Stmt::ExprStmt(call(
                Some(load(&list)),
                "java/util/List",
                "add",
                "(Ljava/lang/Object;)Z",
                vec![load(&i)]
            )))
        );
        assert_eq!(body.statements[1], StructuredStmt::simple(Stmt::ExprStmt(receiver)));
    }

    #[test]
    fn test_unboxing_inside_arithmetic() {
        // return Integer.valueOf(i).intValue() + 1;
        let i = var(0, 0, JvmType::Int);
        let boxed = call(None, "java/lang/Integer", "valueOf", "(I)Ljava/lang/Integer;", vec![load(&i)]);
        let unboxed = call(Some(boxed), "java/lang/Integer", "intValue", "()I", vec![]);
        let sum = |left: Expr| Expr::BinaryOp {
            op: BinOp::Add,
            left: left.boxed(),
            right: Expr::IntLiteral(1).boxed(),
        };
        let statements = vec![StructuredStmt::simple(Stmt::Return(Some(sum(unboxed))))];
        let body = run(statements, vec![binding(&i, VariableKind::Parameter)], "(I)I");
        assert_eq!(
            body.statements,
            vec![StructuredStmt::simple(Stmt::Return(Some(sum(load(&i)))))]
        );
    }

    #[test]
    fn test_iterator_loop_becomes_foreach() {
        let list = var(0, 0, JvmType::Reference("java/util/List".into()));
        let it = var(1, 1, JvmType::Reference("java/util/Iterator".into()));
        let s = var(2, 2, string());
        let next = call(Some(load(&it)), "java/util/Iterator", "next", "()Ljava/lang/Object;", vec![]);
        let print = StructuredStmt::simple(Stmt::ExprStmt(call(
            None,
            "Log",
            "print",
            "(Ljava/lang/String;)V",
            vec![load(&s)],
        )));
        let statements = vec![
            store(
                &it,
                call(Some(load(&list)), "java/util/List", "iterator", "()Ljava/util/Iterator;", vec![]),
            ),
            StructuredStmt::While {
                condition: call(Some(load(&it)), "java/util/Iterator", "hasNext", "()Z", vec![]),
                body: vec![
                    store(
                        &s,
                        Expr::Cast {
                            target_type: string(),
                            operand: next.boxed(),
                        },
                    ),
                    print.clone(),
                ],
            },
        ];
        let vars = vec![
            binding(&list, VariableKind::Parameter),
            binding(&it, VariableKind::Local),
            binding(&s, VariableKind::Local),
        ];
        let body = run(statements, vars, "(Ljava/util/List;)V");
        assert_eq!(
            body.statements,
            vec![StructuredStmt::ForEach {
                var: s.clone(),
                iterable: load(&list),
                body: vec![print],
            }]
        );
    }

    #[test]
    fn test_iterator_used_after_loop_is_kept() {
        let list = var(0, 0, JvmType::Reference("java/util/List".into()));
        let it = var(1, 1, JvmType::Reference("java/util/Iterator".into()));
        let o = var(2, 2, JvmType::Reference("java/lang/Object".into()));
        let statements = vec![
            store(
                &it,
                call(Some(load(&list)), "java/util/List", "iterator", "()Ljava/util/Iterator;", vec![]),
            ),
            StructuredStmt::While {
                condition: call(Some(load(&it)), "java/util/Iterator", "hasNext", "()Z", vec![]),
                body: vec![store(
                    &o,
                    call(Some(load(&it)), "java/util/Iterator", "next", "()Ljava/lang/Object;", vec![]),
                )],
            },
            StructuredStmt::simple(Stmt::Return(Some(load(&it)))),
        ];
        let vars = vec![
            binding(&list, VariableKind::Parameter),
            binding(&it, VariableKind::Local),
            binding(&o, VariableKind::Local),
        ];
        let body = run(statements.clone(), vars, "(Ljava/util/List;)Ljava/util/Iterator;");
        assert_eq!(body.statements, statements);
    }

    #[test]
    fn test_resource_block_becomes_try_with_resources() {
        let path = var(0, 0, string());
        let r = var(1, 1, JvmType::Reference("java/io/Reader".into()));
        let t = var(2, 2, JvmType::Reference(THROWABLE.into()));
        let t2 = var(3, 3, JvmType::Reference(THROWABLE.into()));
        let open = Expr::New {
            class_name: "java/io/FileReader".into(),
            constructor_descriptor: "(Ljava/lang/String;)V".into(),
            args: vec![load(&path)],
        };
        let close = || StructuredStmt::simple(Stmt::ExprStmt(call(Some(load(&r)), "java/io/Reader", "close", "()V", vec![])));
        let read = StructuredStmt::simple(Stmt::ExprStmt(call(
            None,
            "Io",
            "consume",
            "(Ljava/io/Reader;)V",
            vec![load(&r)],
        )));
        let suppressed_close = StructuredStmt::TryCatch {
            try_body: vec![close()],
            catches: vec![CatchClause {
                exception_types: vec![THROWABLE.into()],
                var: Some(t2.clone()),
                body: vec![StructuredStmt::simple(Stmt::ExprStmt(call(
                    Some(load(&t)),
                    THROWABLE,
                    "addSuppressed",
                    "(Ljava/lang/Throwable;)V",
                    vec![load(&t2)],
                )))],
            }],
            finally_body: None,
        };
        let statements = vec![
            store(&r, open.clone()),
            StructuredStmt::TryCatch {
                try_body: vec![read.clone()],
                catches: vec![CatchClause {
                    exception_types: vec![THROWABLE.into()],
                    var: Some(t.clone()),
                    body: vec![suppressed_close, StructuredStmt::simple(Stmt::Throw(load(&t)))],
                }],
                finally_body: None,
            },
            close(),
        ];
        let vars = vec![
            binding(&path, VariableKind::Parameter),
            binding(&r, VariableKind::Local),
            binding(&t, VariableKind::CatchVariable),
            binding(&t2, VariableKind::CatchVariable),
        ];
        let body = run(statements, vars, "(Ljava/lang/String;)V");
        assert_eq!(
            body.statements,
            vec![StructuredStmt::TryWithResources {
                resources: vec![(r.clone(), open)],
                body: vec![read],
                catches: Vec::new(),
                finally_body: None,
            }]
        );
    }

    #[test]
    fn test_assert_with_message() {
        let x = var(0, 0, JvmType::Int);
        let flag = Expr::FieldGet {
            object: None,
            class_name: "Test".into(),
            field_name: ASSERTIONS_DISABLED.into(),
            field_type: JvmType::Boolean,
        };
        let statements = vec![StructuredStmt::If {
            condition: and(
                negate_expr(flag),
                compare(CompareOp::Le, load(&x), Expr::IntLiteral(0)),
            ),
            then_body: vec![StructuredStmt::simple(Stmt::Throw(Expr::New {
                class_name: "java/lang/AssertionError".into(),
                constructor_descriptor: "(Ljava/lang/Object;)V".into(),
                args: vec![Expr::StringLiteral("positive".into())],
            }))],
            else_body: None,
        }];
        let body = run(statements, vec![binding(&x, VariableKind::Parameter)], "(I)V");
        assert_eq!(
            body.statements,
            vec![StructuredStmt::Assert {
                condition: compare(CompareOp::Gt, load(&x), Expr::IntLiteral(0)),
                message: Some(Expr::StringLiteral("positive".into())),
            }]
        );
    }

    #[test]
    fn test_string_switch() {
        let arg = var(0, 0, string());
        let s = var(1, 1, string());
        let idx = var(2, 2, JvmType::Int);
        let equals = |lit: &str| {
            call(
                Some(load(&s)),
                "java/lang/String",
                "equals",
                "(Ljava/lang/Object;)Z",
                vec![Expr::StringLiteral(lit.into())],
            )
        };
        let hash_case = |lit: &str, k: i32| SwitchCase {
            values: vec![SwitchValue::Int(java_string_hash(lit))],
            is_default: false,
            body: vec![
                StructuredStmt::If {
                    condition: equals(lit),
                    then_body: vec![store(&idx, Expr::IntLiteral(k))],
                    else_body: None,
                },
                StructuredStmt::Break { label: None },
            ],
            falls_through: false,
        };
        let ret = |v: i32| vec![StructuredStmt::simple(Stmt::Return(Some(Expr::IntLiteral(v))))];
        let statements = vec![
            store(&s, load(&arg)),
            store(&idx, Expr::IntLiteral(-1)),
            StructuredStmt::Switch {
                expr: call(Some(load(&s)), "java/lang/String", "hashCode", "()I", vec![]),
                kind: SwitchKind::Int,
                cases: vec![hash_case("a", 0), hash_case("b", 1)],
            },
            StructuredStmt::Switch {
                expr: load(&idx),
                kind: SwitchKind::Int,
                cases: vec![
                    SwitchCase {
                        values: vec![SwitchValue::Int(0)],
                        is_default: false,
                        body: ret(10),
                        falls_through: false,
                    },
                    SwitchCase {
                        values: vec![SwitchValue::Int(1)],
                        is_default: false,
                        body: ret(20),
                        falls_through: false,
                    },
                    SwitchCase {
                        values: vec![],
                        is_default: true,
                        body: ret(0),
                        falls_through: false,
                    },
                ],
            },
        ];
        let vars = vec![
            binding(&arg, VariableKind::Parameter),
            binding(&s, VariableKind::Local),
            binding(&idx, VariableKind::Local),
        ];
        let body = run(statements, vars, "(Ljava/lang/String;)I");
        assert_eq!(body.statements.len(), 1);
        let StructuredStmt::Switch { expr, kind, cases } = &body.statements[0] else {
            panic!("expected a switch, got {:?}", body.statements[0]);
        };
        assert_eq!(*kind, SwitchKind::String);
        assert_eq!(*expr, load(&arg));
        assert_eq!(cases[0].values, vec![SwitchValue::String("a".into())]);
        assert_eq!(cases[1].values, vec![SwitchValue::String("b".into())]);
        assert!(cases[2].is_default);
    }

    #[test]
    fn test_enum_switch_through_switch_map() {
        let color = "demo/Color";
        let map_field = "$SwitchMap$demo$Color";
        let entry = |constant: &str, k: i32| {
            StructuredStmt::simple(Stmt::ArrayStore {
                array: Expr::FieldGet {
                    object: None,
                    class_name: "demo/Test$1".into(),
                    field_name: map_field.into(),
                    field_type: JvmType::Array(Box::new(JvmType::Int)),
                },
                index: call(
                    Some(Expr::FieldGet {
                        object: None,
                        class_name: color.into(),
                        field_name: constant.into(),
                        field_type: JvmType::Reference(color.into()),
                    }),
                    color,
                    "ordinal",
                    "()I",
                    vec![],
                ),
                value: Expr::IntLiteral(k),
            })
        };
        let mut tables = DesugarTables::default();
        assert_eq!(tables.add_switch_maps(&[entry("RED", 1), entry("GREEN", 2)]), 2);
        assert_eq!(
            tables.switch_map_label("demo/Test$1", map_field, 2),
            Some(&(color.to_string(), "GREEN".to_string()))
        );

        let c = var(0, 0, JvmType::Reference(color.into()));
        let case = |k: i32| SwitchCase {
            values: vec![SwitchValue::Int(k)],
            is_default: false,
            body: vec![StructuredStmt::simple(Stmt::Return(Some(Expr::IntLiteral(k))))],
            falls_through: false,
        };
        let switch = |cases| StructuredStmt::Switch {
            expr: Expr::ArrayLoad {
                array: Expr::FieldGet {
                    object: None,
                    class_name: "demo/Test$1".into(),
                    field_name: map_field.into(),
                    field_type: JvmType::Array(Box::new(JvmType::Int)),
                }
                .boxed(),
                index: call(Some(load(&c)), color, "ordinal", "()I", vec![]).boxed(),
                element_type: JvmType::Int,
            },
            kind: SwitchKind::Int,
            cases,
        };
        let vars = vec![binding(&c, VariableKind::Parameter)];
        let body = run_with(vec![switch(vec![case(1), case(2)])], vars.clone(), "(Ldemo/Color;)I", &tables);
        let StructuredStmt::Switch { expr, kind, cases } = &body.statements[0] else {
            panic!("expected a switch");
        };
        assert_eq!(*kind, SwitchKind::Enum);
        assert_eq!(*expr, load(&c));
        assert_eq!(
            cases[1].values,
            vec![SwitchValue::Enum {
                type_name: color.into(),
                const_name: "GREEN".into()
            }]
        );

        // a label the table does not know leaves the switch alone
        let unknown = vec![switch(vec![case(1), case(7)])];
        let body = run_with(unknown.clone(), vars, "(Ldemo/Color;)I", &tables);
        assert_eq!(body.statements, unknown);
    }

    #[test]
    fn test_accessor_inlining() {
        let mut tables = DesugarTables::default();
        let accessor = MethodModel::new(
            "access$000",
            "(Ldemo/Outer;)I",
            MethodAccessFlags::STATIC | MethodAccessFlags::SYNTHETIC,
        );
        let outer = var(0, 0, JvmType::Reference("demo/Outer".into()));
        let field = |object: Expr| Expr::FieldGet {
            object: Some(object.boxed()),
            class_name: "demo/Outer".into(),
            field_name: "count".into(),
            field_type: JvmType::Int,
        };
        assert!(tables.add_accessor(
            "demo/Outer",
            &accessor,
            &[StructuredStmt::simple(Stmt::Return(Some(field(load(&outer)))))]
        ));
        assert!(tables.has_accessor("demo/Outer", "access$000", "(Ldemo/Outer;)I"));

        let target = var(3, 1, JvmType::Reference("demo/Outer".into()));
        let statements = vec![StructuredStmt::simple(Stmt::Return(Some(call(
            None,
            "demo/Outer",
            "access$000",
            "(Ldemo/Outer;)I",
            vec![load(&target)],
        ))))];
        let body = run_with(statements, vec![binding(&target, VariableKind::Parameter)], "(Ldemo/Outer;)I", &tables);
        assert_eq!(
            body.statements,
            vec![StructuredStmt::simple(Stmt::Return(Some(field(load(&target)))))]
        );
    }

    #[test]
    fn test_rewrites_are_idempotent() {
        let a = var(0, 0, JvmType::Int);
        let tmp = var(1, 5, JvmType::Int);
        let statements = vec![
            StructuredStmt::If {
                condition: compare(CompareOp::Le, load(&a), Expr::IntLiteral(0)),
                then_body: vec![store(&tmp, Expr::IntLiteral(0))],
                else_body: Some(vec![store(&tmp, Expr::IntLiteral(1))]),
            },
            StructuredStmt::simple(Stmt::Return(Some(load(&tmp)))),
        ];
        let vars = vec![binding(&a, VariableKind::Parameter), binding(&tmp, VariableKind::StackTemporary)];
        let once = run(statements, vars, "(I)Z");
        let twice = run(once.statements.clone(), once.variables.clone(), "(I)Z");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_disabled_options_leave_tree_alone() {
        let a = var(0, 0, JvmType::Int);
        let tmp = var(1, 5, JvmType::Int);
        let statements = vec![
            StructuredStmt::If {
                condition: compare(CompareOp::Gt, load(&a), Expr::IntLiteral(0)),
                then_body: vec![store(&tmp, Expr::IntLiteral(1))],
                else_body: Some(vec![store(&tmp, Expr::IntLiteral(2))]),
            },
            StructuredStmt::simple(Stmt::Return(Some(load(&tmp)))),
        ];
        let (method, code) = context_parts("(I)I");
        let ctx = MethodContext::new("Test", &method, &code).unwrap();
        let mut body = StructuredBody {
            statements: statements.clone(),
            variables: vec![binding(&a, VariableKind::Parameter), binding(&tmp, VariableKind::StackTemporary)],
        };
        desugar(&mut body, &DesugarOptions::none(), &DesugarTables::default(), &ctx);
        assert_eq!(body.statements, statements);
    }

    #[test]
    fn test_java_string_hash() {
        assert_eq!(java_string_hash(""), 0);
        assert_eq!(java_string_hash("a"), 97);
        assert_eq!(java_string_hash("hello"), 99162322);
    }
}
