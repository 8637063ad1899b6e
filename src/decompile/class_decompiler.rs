use std::collections::HashMap;
use std::thread;

use tracing::{debug, trace, warn};

use crate::error::{DecompileError, MethodFailure, ReconstructError, Result};
use crate::model::{ClassAccessFlags, ClassModel, Code, FieldAccessFlags, MethodModel};

use super::assembler;
use super::cfg::{build_cfg, validate_code};
use super::desugar::{desugar, DesugarOptions, DesugarTables};
use super::java_ast::*;
use super::stack_sim::simulate_method;
use super::structured_types::{StructuredBody, StructuredStmt};
use super::structuring::structure_method;
use super::type_inference::{place_declarations, resolve_variables};
use super::util::MethodContext;

const SWITCH_MAP_PREFIX: &str = "$SwitchMap$";

/// Options controlling the decompilation process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecompileOptions {
    /// Keep each statement's bytecode span so a printer can line up source lines.
    pub realign_line_numbers: bool,
    pub include_synthetic: bool,
    pub desugar: DesugarOptions,
    /// Nesting depth after which structuring gives up on a region.
    pub max_structuring_depth: usize,
    /// `0` uses the available parallelism.
    pub worker_threads: usize,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            realign_line_numbers: false,
            include_synthetic: false,
            desugar: DesugarOptions::default(),
            max_structuring_depth: 256,
            worker_threads: 0,
        }
    }
}

impl DecompileOptions {
    /// Build options from external key/value settings such as
    /// `realignLineNumbers=true`. Unknown keys are ignored.
    pub fn from_settings<I, K, V>(settings: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in settings {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "realignLineNumbers" => options.realign_line_numbers = parse_flag(key, value)?,
                "includeSynthetic" => options.include_synthetic = parse_flag(key, value)?,
                "maxStructuringDepth" => options.max_structuring_depth = parse_count(key, value)?,
                "workerThreads" => options.worker_threads = parse_count(key, value)?,
                _ => match key.strip_prefix("desugar.") {
                    Some(pass) => {
                        let enabled = parse_flag(key, value)?;
                        let d = &mut options.desugar;
                        let slot = match pass {
                            "syntheticAccessors" => &mut d.synthetic_accessors,
                            "booleanCleanup" => &mut d.boolean_cleanup,
                            "ternary" => &mut d.ternary,
                            "stringConcat" => &mut d.string_concat,
                            "autobox" => &mut d.autobox,
                            "foreach" => &mut d.foreach,
                            "tryResources" => &mut d.try_resources,
                            "assert" => &mut d.assert,
                            "stringSwitch" => &mut d.string_switch,
                            "enumSwitch" => &mut d.enum_switch,
                            _ => {
                                debug!(key, "ignoring unknown desugar setting");
                                continue;
                            }
                        };
                        *slot = enabled;
                    }
                    None => debug!(key, "ignoring unknown setting"),
                },
            }
        }
        Ok(options)
    }

    fn workers(&self) -> usize {
        match self.worker_threads {
            0 => thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            n => n,
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(DecompileError::invalid_input(key, format!("expected a boolean, got '{}'", value))),
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| DecompileError::invalid_input(key, format!("expected a count, got '{}'", value)))
}

/// One decompiled class plus every failure recorded while building it.
#[derive(Clone, Debug, PartialEq)]
pub struct DecompiledClass {
    pub class: JavaClass,
    pub failures: Vec<MethodFailure>,
}

/// One decompiled method, from [`Decompiler::decompile_method`].
#[derive(Clone, Debug, PartialEq)]
pub struct DecompiledMethod {
    pub method: JavaMethod,
    pub failures: Vec<MethodFailure>,
}

struct MethodOutcome {
    body: Option<MethodBody>,
    failures: Vec<MethodFailure>,
}

/// The main decompiler entry point.
pub struct Decompiler {
    options: DecompileOptions,
}

impl Decompiler {
    pub fn new(options: DecompileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecompileOptions {
        &self.options
    }

    /// Decompile one class; its methods are processed in parallel.
    pub fn decompile_class(&self, class: &ClassModel) -> Result<DecompiledClass> {
        let tables = self.scan_tables(std::slice::from_ref(class));
        self.build_class(class, &tables, true)
    }

    /// Decompile a batch of classes in parallel. Nested classes are attached
    /// to their outer class when it is part of the batch, so there is one
    /// result per top-level class, in input order.
    pub fn decompile_classes(&self, classes: &[ClassModel]) -> Vec<Result<DecompiledClass>> {
        let tables = self.scan_tables(classes);
        debug!(classes = classes.len(), "decompiling batch");
        let results = parallel_map(classes, self.options.workers(), |class| self.build_class(class, &tables, false));
        assembler::nest_classes(classes, results)
    }

    /// Decompile a single method, found by name or by name plus descriptor
    /// (`max(II)I`).
    pub fn decompile_method(&self, class: &ClassModel, method_name: &str) -> Result<DecompiledMethod> {
        let (order, method) = class
            .methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == method_name || format!("{}{}", m.name, m.descriptor) == method_name)
            .ok_or_else(|| DecompileError::MethodNotFound {
                class: class.name.clone(),
                method: method_name.to_string(),
            })?;

        let kind = assembler::class_kind(class);
        let mut java = assembler::declare_method(class, kind, order, method)?;
        let tables = self.scan_tables(std::slice::from_ref(class));
        let outcome = self.decompile_body(class, method, &assembler::field_types(class), &tables)?;
        java.body = outcome.body;
        assembler::tidy_method(&mut java, class, kind, &self.options);
        Ok(DecompiledMethod {
            method: java,
            failures: outcome.failures,
        })
    }

    fn build_class(&self, class: &ClassModel, tables: &DesugarTables, parallel: bool) -> Result<DecompiledClass> {
        debug!(class = %class.name, methods = class.methods.len(), "decompiling class");
        let mut java = assembler::declare_class(class)?;
        let field_types = assembler::field_types(class);

        let body_of = |method: &MethodModel| self.decompile_body(class, method, &field_types, tables);
        let outcomes = if parallel {
            parallel_map(&class.methods, self.options.workers(), body_of)
        } else {
            class.methods.iter().map(body_of).collect()
        };

        let kind = java.kind;
        let mut failures = Vec::new();
        for (method, outcome) in java.methods.iter_mut().zip(outcomes) {
            let outcome = outcome?;
            method.body = outcome.body;
            failures.extend(outcome.failures);
            assembler::tidy_method(method, class, kind, &self.options);
        }
        assembler::tidy_class(&mut java, class, &self.options);

        Ok(DecompiledClass { class: java, failures })
    }

    /// Decompile one body. Malformed code aborts with a [`DecompileError`];
    /// anything the pipeline cannot reconstruct becomes a fallback listing.
    fn decompile_body(
        &self,
        class: &ClassModel,
        method: &MethodModel,
        field_types: &HashMap<String, JavaType>,
        tables: &DesugarTables,
    ) -> Result<MethodOutcome> {
        let Some(code) = &method.code else {
            return Ok(MethodOutcome {
                body: None,
                failures: Vec::new(),
            });
        };
        validate_code(code, &location(class, method))?;
        let ctx = MethodContext::new(&class.name, method, code)?;

        let failure = |err: &ReconstructError, fell_back: bool| {
            MethodFailure::new(&class.name, &method.name, &method.descriptor, err, fell_back)
        };
        match self.reconstruct(&ctx, field_types, Some(tables)) {
            Ok((body, partial_failures)) => {
                for err in &partial_failures {
                    warn!(method = %ctx.location(), %err, "method only partly reconstructed");
                }
                debug!(
                    method = %ctx.location(),
                    statements = body.statements.len(),
                    variables = body.variables.len(),
                    "decompiled method"
                );
                Ok(MethodOutcome {
                    body: Some(MethodBody::Decompiled(body)),
                    failures: partial_failures.iter().map(|e| failure(e, false)).collect(),
                })
            }
            Err(err) => {
                warn!(method = %ctx.location(), %err, "falling back to raw listing");
                let recorded = failure(&err, true);
                Ok(MethodOutcome {
                    body: Some(MethodBody::Fallback(FallbackBody {
                        failure: recorded.clone(),
                        listing: assembler::raw_listing(code),
                    })),
                    failures: vec![recorded],
                })
            }
        }
    }

    /// The reconstruction stages of one method. Desugaring runs only when
    /// `tables` is given.
    fn reconstruct(
        &self,
        ctx: &MethodContext,
        field_types: &HashMap<String, JavaType>,
        tables: Option<&DesugarTables>,
    ) -> std::result::Result<(StructuredBody, Vec<ReconstructError>), ReconstructError> {
        let cfg = build_cfg(ctx.code);
        trace!(method = %ctx.location(), blocks = cfg.len(), "built control flow graph");
        let sim = simulate_method(&cfg, ctx)?;
        let structured = structure_method(&cfg, sim, self.options.max_structuring_depth);
        let mut statements = structured.statements;
        let variables = resolve_variables(&mut statements, &cfg, ctx, field_types)?;
        let mut body = StructuredBody { statements, variables };
        let mut failures = structured.failures;
        if let Some(tables) = tables {
            failures.extend(desugar(&mut body, &self.options.desugar, tables, ctx));
        }
        place_declarations(&mut body.statements, &mut body.variables);
        Ok((body, failures))
    }

    /// Collect the class-level facts desugaring needs from a batch:
    /// synthetic accessor bodies, `$SwitchMap$` tables and enum constants.
    fn scan_tables(&self, classes: &[ClassModel]) -> DesugarTables {
        let per_class = parallel_map(classes, self.options.workers(), |class| self.scan_class(class));
        let mut tables = DesugarTables::default();
        for t in per_class {
            tables.extend(t);
        }
        tables
    }

    fn scan_class(&self, class: &ClassModel) -> DesugarTables {
        let mut tables = DesugarTables::default();
        if class.access.contains(ClassAccessFlags::ENUM) {
            let constants: Vec<String> = class
                .fields
                .iter()
                .filter(|f| f.access.contains(FieldAccessFlags::ENUM))
                .map(|f| f.name.clone())
                .collect();
            if !constants.is_empty() {
                tables.add_enum_constants(class.name.clone(), constants);
            }
        }

        let options = &self.options.desugar;
        let holds_switch_maps = class.fields.iter().any(|f| f.name.starts_with(SWITCH_MAP_PREFIX));
        let field_types = assembler::field_types(class);
        for method in &class.methods {
            let accessor = options.synthetic_accessors && method.is_static() && method.name.starts_with("access$");
            let switch_maps = options.enum_switch && holds_switch_maps && method.is_static_initializer();
            if !accessor && !switch_maps {
                continue;
            }
            let Some(code) = &method.code else { continue };
            let Some(statements) = self.scan_body(class, method, code, &field_types) else {
                continue;
            };
            if accessor && !tables.add_accessor(&class.name, method, &statements) {
                trace!(class = %class.name, method = %method.name, "accessor body not inlinable");
            }
            if switch_maps {
                let found = tables.add_switch_maps(&statements);
                debug!(class = %class.name, entries = found, "collected switch-map entries");
            }
        }
        tables
    }

    /// An undesugared body for table scanning; failures only skip the method.
    fn scan_body(
        &self,
        class: &ClassModel,
        method: &MethodModel,
        code: &Code,
        field_types: &HashMap<String, JavaType>,
    ) -> Option<Vec<StructuredStmt>> {
        let location = location(class, method);
        if let Err(err) = validate_code(code, &location) {
            debug!(method = %location, %err, "skipping scan of invalid method");
            return None;
        }
        let ctx = match MethodContext::new(&class.name, method, code) {
            Ok(ctx) => ctx,
            Err(err) => {
                debug!(method = %location, %err, "skipping scan of invalid method");
                return None;
            }
        };
        match self.reconstruct(&ctx, field_types, None) {
            Ok((body, _)) => Some(body.statements),
            Err(err) => {
                debug!(method = %location, %err, "skipping scan of unreconstructable method");
                None
            }
        }
    }
}

fn location(class: &ClassModel, method: &MethodModel) -> String {
    format!("{}.{}{}", class.name, method.name, method.descriptor)
}

/// Map `f` over `items` on up to `workers` scoped threads, keeping input order.
fn parallel_map<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = workers.min(items.len());
    if workers <= 1 {
        return items.iter().map(f).collect();
    }
    let chunk = (items.len() + workers - 1) / workers;
    let f = &f;
    thread::scope(|scope| {
        let handles: Vec<_> = items
            .chunks(chunk)
            .map(|part| scope.spawn(move || part.iter().map(f).collect::<Vec<R>>()))
            .collect();
        let mut results = Vec::with_capacity(items.len());
        for handle in handles {
            match handle.join() {
                Ok(part) => results.extend(part),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
        results
    })
}

/// Decompile one class with default options.
pub fn decompile(class: &ClassModel) -> Result<DecompiledClass> {
    Decompiler::new(DecompileOptions::default()).decompile_class(class)
}
