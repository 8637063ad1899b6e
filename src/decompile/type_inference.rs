//! Local variable resolution.
//!
//! Splits every slot into webs of definitions and uses (reaching definitions
//! plus union-find), gives each web a type, a source name and a live range,
//! and finally decides where each local is declared.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use crate::error::ReconstructError;
use crate::model::{LocalVariable, Op, ValueKind};

use super::cfg_types::ControlFlowGraph;
use super::descriptor::{simple_class_name, JvmType};
use super::expr::{Expr, LocalVar, Stmt};
use super::java_ast::JavaType;
use super::signature::{parse_field_signature, parse_method_signature};
use super::structured_types::{list_mentions, walk_stmts, walk_vars_mut, StructuredStmt};
use super::util::MethodContext;

const THROWABLE: &str = "java/lang/Throwable";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariableKind {
    Parameter,
    Local,
    CatchVariable,
    StackTemporary,
    This,
}

/// One resolved local variable.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableBinding {
    pub id: u32,
    pub slot: u16,
    pub name: String,
    pub jvm_type: JvmType,
    /// Generic source type when a signature is known, else the erased type.
    pub java_type: JavaType,
    pub kind: VariableKind,
    /// Sorted, inclusive offset intervals.
    pub live_range: Vec<(u32, u32)>,
    /// Offset of the first definition; parameters are defined at 0.
    pub declaration: u32,
}

impl VariableBinding {
    /// A reference to this binding usable in statements.
    pub fn to_var(&self) -> LocalVar {
        LocalVar {
            index: self.slot,
            name: Some(self.name.clone()),
            ty: self.jvm_type.clone(),
            offset: None,
            id: Some(self.id),
        }
    }

    pub fn overlaps(&self, other: &VariableBinding) -> bool {
        self.live_range
            .iter()
            .any(|&(a, b)| other.live_range.iter().any(|&(c, d)| a <= d && c <= b))
    }
}

// ---- webs ----

/// A load, store or `iinc` of a slot, or a parameter's definition at entry.
#[derive(Clone, Debug)]
struct Access {
    slot: u16,
    /// `None` for definitions at method entry.
    offset: Option<u32>,
    kind: Option<ValueKind>,
    defines: bool,
    uses: bool,
}

fn slot_access(op: &Op) -> Option<(u16, Option<ValueKind>, bool, bool)> {
    match op {
        Op::Load { kind, slot } => Some((*slot, Some(*kind), false, true)),
        Op::Store { kind, slot } => Some((*slot, Some(*kind), true, false)),
        Op::Iinc { slot, .. } => Some((*slot, Some(ValueKind::Int), true, true)),
        Op::Ret(slot) => Some((*slot, None, false, true)),
        _ => None,
    }
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// The smaller index becomes the root, so roots follow access order.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

struct DefUse {
    accesses: Vec<Access>,
    sets: UnionFind,
    by_site: HashMap<(u32, u16), usize>,
}

/// Apply one access to the set of reaching definitions.
fn step<F: FnMut(usize)>(accesses: &[Access], a: usize, reaching: &mut BTreeSet<usize>, mut on_use: F) {
    let access = &accesses[a];
    if access.uses {
        for &d in reaching.iter() {
            if accesses[d].slot == access.slot {
                on_use(d);
            }
        }
    }
    if access.defines {
        reaching.retain(|&d| accesses[d].slot != access.slot);
        reaching.insert(a);
    }
}

/// Reaching definitions at instruction granularity, then one union per
/// def-use pair. Handlers see every definition made anywhere in the blocks
/// they cover.
fn link_definitions(cfg: &ControlFlowGraph, ctx: &MethodContext) -> DefUse {
    let mut accesses = Vec::new();
    let mut entry = BTreeSet::new();
    if !ctx.is_static {
        entry.insert(accesses.len());
        accesses.push(Access {
            slot: 0,
            offset: None,
            kind: Some(ValueKind::Reference),
            defines: true,
            uses: false,
        });
    }
    for (ty, &slot) in ctx.params.iter().zip(&ctx.param_slots) {
        entry.insert(accesses.len());
        accesses.push(Access {
            slot,
            offset: None,
            kind: ty.value_kind(),
            defines: true,
            uses: false,
        });
    }

    let mut by_site = HashMap::new();
    let mut per_block: Vec<Vec<usize>> = Vec::with_capacity(cfg.len());
    for block in &cfg.blocks {
        let mut list = Vec::new();
        for insn in &block.instructions {
            if let Some((slot, kind, defines, uses)) = slot_access(&insn.op) {
                by_site.insert((insn.offset, slot), accesses.len());
                list.push(accesses.len());
                accesses.push(Access {
                    slot,
                    offset: Some(insn.offset),
                    kind,
                    defines,
                    uses,
                });
            }
        }
        per_block.push(list);
    }

    let n = cfg.len();
    let mut handler_preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    for b in 0..n {
        for h in cfg.exception_successors(b) {
            handler_preds[h].push(b);
        }
    }
    let mut order = cfg.reverse_postorder();
    let seen: HashSet<usize> = order.iter().copied().collect();
    order.extend((0..n).filter(|b| !seen.contains(b)));

    let mut reach_in: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut reach_out: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut changed = true;
    while changed {
        changed = false;
        for &b in &order {
            let mut reaching = if b == cfg.entry { entry.clone() } else { BTreeSet::new() };
            for &p in cfg.predecessors(b) {
                reaching.extend(reach_out[p].iter().copied());
            }
            for &p in &handler_preds[b] {
                reaching.extend(reach_in[p].iter().copied());
                reaching.extend(per_block[p].iter().copied().filter(|&a| accesses[a].defines));
            }
            let mut out = reaching.clone();
            for &a in &per_block[b] {
                step(&accesses, a, &mut out, |_| {});
            }
            if reaching != reach_in[b] || out != reach_out[b] {
                reach_in[b] = reaching;
                reach_out[b] = out;
                changed = true;
            }
        }
    }

    let mut sets = UnionFind::new(accesses.len());
    for b in 0..n {
        let mut reaching = reach_in[b].clone();
        for &a in &per_block[b] {
            step(&accesses, a, &mut reaching, |d| sets.union(a, d));
        }
    }
    DefUse {
        accesses,
        sets,
        by_site,
    }
}

/// Everything known about one live range of a slot.
struct Web<'a> {
    slot: u16,
    offsets: BTreeSet<u32>,
    defs: BTreeSet<u32>,
    kinds: BTreeSet<ValueKindKey>,
    lvt: Vec<&'a LocalVariable>,
    param: Option<usize>,
    is_this: bool,
    temp: bool,
    /// Types of values stored into the web.
    evidence: Vec<JvmType>,
    /// Generic types of this class's fields stored into the web.
    generic_evidence: Vec<JavaType>,
    caught: bool,
    referenced: bool,
}

/// `ValueKind` ordered for deterministic reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ValueKindKey(u8);

impl ValueKindKey {
    fn of(kind: ValueKind) -> Self {
        ValueKindKey(match kind {
            ValueKind::Int => 0,
            ValueKind::Long => 1,
            ValueKind::Float => 2,
            ValueKind::Double => 3,
            ValueKind::Reference => 4,
        })
    }

    fn name(self) -> &'static str {
        ["int", "long", "float", "double", "reference"][self.0 as usize]
    }
}

impl<'a> Web<'a> {
    fn new(slot: u16) -> Self {
        Self {
            slot,
            offsets: BTreeSet::new(),
            defs: BTreeSet::new(),
            kinds: BTreeSet::new(),
            lvt: Vec::new(),
            param: None,
            is_this: false,
            temp: false,
            evidence: Vec::new(),
            generic_evidence: Vec::new(),
            caught: false,
            referenced: false,
        }
    }

    fn first_offset(&self) -> u32 {
        self.offsets.iter().next().copied().unwrap_or(0)
    }

    fn declaration(&self) -> u32 {
        if self.param.is_some() || self.is_this {
            return 0;
        }
        self.defs.iter().next().copied().unwrap_or_else(|| self.first_offset())
    }

    fn kind(&self) -> VariableKind {
        if self.is_this {
            VariableKind::This
        } else if self.param.is_some() {
            VariableKind::Parameter
        } else if self.temp {
            VariableKind::StackTemporary
        } else if self.caught {
            VariableKind::CatchVariable
        } else {
            VariableKind::Local
        }
    }

    fn live_range(&self) -> Vec<(u32, u32)> {
        let lo = if self.param.is_some() || self.is_this { 0 } else { self.first_offset() };
        let hi = self.offsets.iter().next_back().copied().unwrap_or(lo);
        vec![(lo, hi.max(lo))]
    }
}

/// Where a `LocalVar` of the tree lives before webs are numbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Home {
    Web(usize),
    Temp(u16),
    Orphan(u16),
}

struct Webs<'a> {
    webs: Vec<Web<'a>>,
    /// Web index of every access.
    web_of: Vec<usize>,
    by_site: HashMap<(u32, u16), usize>,
    extra: BTreeMap<Home, usize>,
}

impl<'a> Webs<'a> {
    fn home(&self, ctx: &MethodContext, var: &LocalVar) -> Home {
        if ctx.is_temp_slot(var.index) {
            return Home::Temp(var.index);
        }
        var.offset
            .and_then(|o| self.by_site.get(&(o, var.index)))
            .map(|&a| Home::Web(self.web_of[a]))
            .unwrap_or(Home::Orphan(var.index))
    }

    /// Web index of a tree variable, creating webs for temporaries and strays.
    fn locate(&mut self, ctx: &MethodContext, var: &LocalVar) -> usize {
        let home = self.home(ctx, var);
        let idx = match home {
            Home::Web(w) => w,
            _ => match self.extra.get(&home) {
                Some(&w) => w,
                None => {
                    let mut web = Web::new(var.index);
                    web.temp = matches!(home, Home::Temp(_));
                    web.kinds.extend(var.ty.value_kind().map(ValueKindKey::of));
                    self.webs.push(web);
                    self.extra.insert(home, self.webs.len() - 1);
                    self.webs.len() - 1
                }
            },
        };
        if let (Some(o), false) = (var.offset, matches!(home, Home::Web(_))) {
            self.webs[idx].offsets.insert(o);
        }
        idx
    }
}

fn lvt_key(lv: &LocalVariable) -> (u16, u32, u32) {
    (lv.slot, lv.start, lv.length)
}

/// Group accesses into webs and merge webs that share a local variable table entry.
fn collect_webs<'a>(cfg: &ControlFlowGraph, ctx: &MethodContext<'a>) -> Result<Webs<'a>, ReconstructError> {
    let DefUse {
        accesses,
        mut sets,
        by_site,
    } = link_definitions(cfg, ctx);

    let lvt_of = |a: &Access| -> Option<&'a LocalVariable> {
        match a.offset {
            None => ctx.lvt_entry(a.slot, 0),
            Some(o) if a.defines && !a.uses => ctx.lvt_for_store(a.slot, o),
            Some(o) => ctx.lvt_entry(a.slot, o),
        }
    };
    let mut by_entry: HashMap<(u16, u32, u32), usize> = HashMap::new();
    for (i, a) in accesses.iter().enumerate() {
        if let Some(lv) = lvt_of(a) {
            match by_entry.get(&lvt_key(lv)) {
                Some(&first) => sets.union(first, i),
                None => {
                    by_entry.insert(lvt_key(lv), i);
                }
            }
        }
    }

    let mut root_web: HashMap<usize, usize> = HashMap::new();
    let mut webs: Vec<Web<'a>> = Vec::new();
    let mut web_of = Vec::with_capacity(accesses.len());
    let mut param_no = 0usize;
    for (i, a) in accesses.iter().enumerate() {
        let root = sets.find(i);
        let w = *root_web.entry(root).or_insert_with(|| {
            webs.push(Web::new(a.slot));
            webs.len() - 1
        });
        web_of.push(w);
        let web = &mut webs[w];
        match a.offset {
            Some(o) => {
                web.offsets.insert(o);
                if a.defines {
                    web.defs.insert(o);
                }
            }
            None if !ctx.is_static && i == 0 => web.is_this = true,
            None => {
                web.param = Some(param_no);
                param_no += 1;
            }
        }
        if let Some(k) = a.kind {
            web.kinds.insert(ValueKindKey::of(k));
        }
        if let Some(lv) = lvt_of(a) {
            if !web.lvt.iter().any(|e| lvt_key(e) == lvt_key(lv)) {
                web.lvt.push(lv);
            }
        }
    }

    for web in &webs {
        if web.kinds.len() > 1 {
            let names: Vec<&str> = web.kinds.iter().map(|k| k.name()).collect();
            return Err(ReconstructError::resolution(
                web.slot,
                web.first_offset(),
                format!("slot {} holds conflicting kinds ({})", web.slot, names.join(", ")),
            ));
        }
        if let Some(first) = web.lvt.first() {
            if let Some(other) = web.lvt.iter().find(|lv| lv.descriptor != first.descriptor) {
                return Err(ReconstructError::resolution(
                    web.slot,
                    web.first_offset(),
                    format!(
                        "slot {} is declared as both '{}' and '{}' within one live range",
                        web.slot, first.descriptor, other.descriptor
                    ),
                ));
            }
        }
    }

    Ok(Webs {
        webs,
        web_of,
        by_site,
        extra: BTreeMap::new(),
    })
}

// ---- evidence ----

fn visit_vars<F: FnMut(&LocalVar)>(stmts: &[StructuredStmt], f: &mut F) {
    walk_stmts(stmts, &mut |s| {
        for v in s.own_vars() {
            f(v);
        }
        for e in s.exprs() {
            e.walk(&mut |n| {
                if let Expr::LocalLoad(v) | Expr::Increment { var: v, .. } = n {
                    f(v);
                }
            });
        }
    });
}

/// Every `(variable, stored value)` pair, including assignments used as values.
fn visit_stores<F: FnMut(&LocalVar, &Expr)>(stmts: &[StructuredStmt], f: &mut F) {
    walk_stmts(stmts, &mut |s| {
        if let Some(Stmt::LocalStore { var, value } | Stmt::Declare { var, init: Some(value) }) = s.as_simple() {
            f(var, value);
        }
        for e in s.exprs() {
            e.walk(&mut |n| {
                if let Expr::Assign { target, value } = n {
                    if let Expr::LocalLoad(v) = target.as_ref() {
                        f(v, value);
                    }
                }
            });
        }
    });
}

fn catch_vars<F: FnMut(&LocalVar, &[String])>(stmts: &[StructuredStmt], f: &mut F) {
    walk_stmts(stmts, &mut |s| {
        if let StructuredStmt::TryCatch { catches, .. } | StructuredStmt::TryWithResources { catches, .. } = s {
            for c in catches {
                if let Some(v) = &c.var {
                    f(v, &c.exception_types);
                }
            }
        }
    });
}

/// `c ? 1 : 0` and `c ? 0 : 1`.
fn is_boolean_select(e: &Expr) -> bool {
    match e {
        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            condition.is_boolean()
                && matches!(
                    (then_expr.as_ref(), else_expr.as_ref()),
                    (Expr::IntLiteral(1), Expr::IntLiteral(0)) | (Expr::IntLiteral(0), Expr::IntLiteral(1))
                )
        }
        _ => false,
    }
}

fn value_evidence(value: &Expr) -> Option<JvmType> {
    match value {
        Expr::IntLiteral(0 | 1) | Expr::NullLiteral | Expr::Unresolved(_) => None,
        e if is_boolean_select(e) => Some(JvmType::Boolean),
        e if e.is_boolean() => Some(JvmType::Boolean),
        e => match e.jvm_type() {
            JvmType::Unknown | JvmType::Null | JvmType::Void => None,
            ty => Some(ty),
        },
    }
}

/// Pick one type out of the stored values' types.
fn unify_evidence(kind: Option<ValueKindKey>, evidence: &[JvmType]) -> Option<JvmType> {
    let distinct: BTreeSet<String> = evidence.iter().map(JvmType::to_descriptor).collect();
    match kind.map(|k| k.0) {
        Some(0) => {
            if distinct.len() != 1 {
                return Some(JvmType::Int);
            }
            evidence
                .first()
                .filter(|t| matches!(t, JvmType::Boolean | JvmType::Char | JvmType::Byte | JvmType::Short))
                .cloned()
                .or(Some(JvmType::Int))
        }
        Some(4) => match distinct.len() {
            0 => None,
            1 => evidence.first().cloned(),
            _ => Some(JvmType::Reference("java/lang/Object".into())),
        },
        _ => None,
    }
}

// ---- names ----

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const", "continue",
    "default", "do", "double", "else", "enum", "extends", "false", "final", "finally", "float", "for", "goto", "if",
    "implements", "import", "instanceof", "int", "interface", "long", "native", "new", "null", "package", "private",
    "protected", "public", "return", "short", "static", "strictfp", "super", "switch", "synchronized", "this",
    "throw", "throws", "transient", "true", "try", "void", "volatile", "while", "_",
];

pub fn is_java_keyword(name: &str) -> bool {
    JAVA_KEYWORDS.contains(&name)
}

/// `IOException` → `ioException`, `URL` → `url`, `ArrayList` → `arrayList`.
fn lower_camel(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let upper = chars.iter().take_while(|c| c.is_uppercase()).count();
    let lower_count = match upper {
        0 => 0,
        n if n == chars.len() => n,
        1 => 1,
        n => n - 1,
    };
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < lower_count { c.to_ascii_lowercase() } else { *c })
        .collect()
}

fn usable_identifier(name: &str) -> bool {
    name.chars().next().map_or(false, |c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Capitalized word for a type, used in generated parameter and array names.
fn type_word(ty: &JvmType) -> String {
    match ty {
        JvmType::Array(inner) => format!("ArrayOf{}", type_word(inner)),
        JvmType::Reference(name) => {
            let simple = simple_class_name(name);
            if usable_identifier(simple) {
                simple.to_string()
            } else {
                "Object".to_string()
            }
        }
        JvmType::Null | JvmType::Unknown | JvmType::Void => "Object".to_string(),
        primitive => {
            let name = primitive.simple_name();
            let mut chars = name.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => name,
            }
        }
    }
}

/// Base name for an unnamed parameter: `paramInt`, `paramString`, `paramArrayOfInt`.
pub fn parameter_base_name(ty: &JvmType) -> String {
    format!("param{}", type_word(ty))
}

/// Base name for an unnamed local of `ty`.
pub fn local_base_name(ty: &JvmType) -> String {
    let name = match ty {
        JvmType::Int => "i".to_string(),
        JvmType::Long => "l".to_string(),
        JvmType::Float => "f".to_string(),
        JvmType::Double => "d".to_string(),
        JvmType::Byte => "b".to_string(),
        JvmType::Char => "c".to_string(),
        JvmType::Short => "s".to_string(),
        JvmType::Boolean => "bool".to_string(),
        JvmType::Array(inner) => format!("arrayOf{}", type_word(inner)),
        JvmType::Reference(name) => match name.as_str() {
            "java/lang/String" => "str".to_string(),
            "java/lang/Object" => "obj".to_string(),
            "java/lang/Class" => "clazz".to_string(),
            _ => {
                let simple = simple_class_name(name);
                if usable_identifier(simple) {
                    lower_camel(simple)
                } else {
                    "obj".to_string()
                }
            }
        },
        JvmType::Null | JvmType::Unknown | JvmType::Void => "obj".to_string(),
    };
    if is_java_keyword(&name) {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => format!("local{}{}", first.to_uppercase(), chars.as_str()),
            None => name,
        }
    } else {
        name
    }
}

/// Hands out unique names: `base`, then `base1`, `base2`, ...
#[derive(Default)]
struct NameAllocator {
    used: HashSet<String>,
    counters: HashMap<String, u32>,
}

impl NameAllocator {
    fn reserve(&mut self, name: &str) {
        self.used.insert(name.to_string());
    }

    fn fresh(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let n = self.counters.entry(base.to_string()).or_insert(0);
        loop {
            *n += 1;
            let candidate = format!("{}{}", base, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

// ---- resolution ----

/// Resolve every local variable of a structured method body.
///
/// Fills in `id`, `name` and the refined `ty` of every `LocalVar` in
/// `statements` and returns the bindings ordered by id: `this`, the
/// parameters, then locals in order of first definition.
pub fn resolve_variables(
    statements: &mut [StructuredStmt],
    cfg: &ControlFlowGraph,
    ctx: &MethodContext,
    field_types: &HashMap<String, JavaType>,
) -> Result<Vec<VariableBinding>, ReconstructError> {
    let mut webs = collect_webs(cfg, ctx)?;

    let mut refs: Vec<LocalVar> = Vec::new();
    visit_vars(statements, &mut |v| refs.push(v.clone()));
    for v in &refs {
        let w = webs.locate(ctx, v);
        webs.webs[w].referenced = true;
    }
    visit_stores(statements, &mut |v, value| {
        let w = webs.locate(ctx, v);
        let web = &mut webs.webs[w];
        if matches!(value, Expr::CaughtException { .. }) {
            web.caught = true;
        }
        if let Some(ty) = value_evidence(value) {
            web.evidence.push(ty);
        }
        if let Expr::FieldGet {
            object, field_name, class_name, ..
        } = value
        {
            if class_name == ctx.class_name && (object.is_none() || matches!(object.as_deref(), Some(Expr::This))) {
                if let Some(generic) = field_types.get(field_name) {
                    web.generic_evidence.push(generic.clone());
                }
            }
        }
    });
    catch_vars(statements, &mut |v, types| {
        let w = webs.locate(ctx, v);
        let web = &mut webs.webs[w];
        web.caught = true;
        let ty = match types {
            [single] => single.clone(),
            _ => THROWABLE.to_string(),
        };
        web.evidence.push(JvmType::Reference(ty));
    });

    let method_sig = ctx
        .method
        .signature
        .as_deref()
        .and_then(parse_method_signature)
        .filter(|sig| sig.parameters.len() == ctx.params.len());

    // This first, then parameters, then everything else by first definition.
    let mut order: Vec<usize> = (0..webs.webs.len())
        .filter(|&w| {
            let web = &webs.webs[w];
            web.referenced || web.param.is_some() || web.is_this
        })
        .collect();
    order.sort_by_key(|&w| {
        let web = &webs.webs[w];
        let rank = if web.is_this {
            0
        } else if web.param.is_some() {
            1
        } else {
            2
        };
        (rank, web.param.unwrap_or(0), web.declaration(), web.slot)
    });

    let mut names = NameAllocator::default();
    for lv in ctx.code.local_variables.iter().flatten() {
        names.reserve(&lv.name);
    }
    for name in ctx.method.parameter_names.iter().flatten() {
        names.reserve(name);
    }
    names.reserve("this");

    let mut bindings = Vec::with_capacity(order.len());
    let mut binding_of: HashMap<usize, usize> = HashMap::new();
    for &w in &order {
        let web = &webs.webs[w];
        let kind = web.kind();
        let lvt = web.lvt.first().copied();
        let kind_key = web.kinds.iter().next().copied();

        let jvm_type = if web.is_this {
            JvmType::Reference(ctx.class_name.to_string())
        } else if let Some(ty) = lvt.and_then(MethodContext::lvt_type) {
            ty
        } else if let Some(ty) = web.param.and_then(|p| ctx.params.get(p)) {
            ty.clone()
        } else if let Some(ty) = unify_evidence(kind_key, &web.evidence) {
            ty
        } else {
            match kind_key.map(|k| k.0) {
                Some(0) => JvmType::Int,
                Some(1) => JvmType::Long,
                Some(2) => JvmType::Float,
                Some(3) => JvmType::Double,
                _ => JvmType::Reference("java/lang/Object".into()),
            }
        };

        let java_type = lvt
            .and_then(|lv| lv.signature.as_deref())
            .and_then(parse_field_signature)
            .or_else(|| {
                let sig = method_sig.as_ref()?;
                web.param.and_then(|p| sig.parameters.get(p)).cloned()
            })
            .or_else(|| match web.generic_evidence.as_slice() {
                [first, rest @ ..] if jvm_type.is_reference() && rest.iter().all(|g| g == first) => Some(first.clone()),
                _ => None,
            })
            .unwrap_or_else(|| JavaType::from_jvm(&jvm_type));

        let declared_param_name = web.param.and_then(|p| {
            ctx.method
                .parameter_names
                .as_ref()
                .and_then(|names| names.get(p))
                .filter(|n| !n.is_empty())
                .cloned()
        });
        let name = match kind {
            VariableKind::This => "this".to_string(),
            VariableKind::StackTemporary => names.fresh("tmp"),
            VariableKind::Parameter => match lvt.map(|lv| lv.name.clone()).or(declared_param_name) {
                Some(name) => name,
                None => names.fresh(&parameter_base_name(&jvm_type)),
            },
            VariableKind::Local | VariableKind::CatchVariable => match lvt {
                Some(lv) => lv.name.clone(),
                None => names.fresh(&local_base_name(&jvm_type)),
            },
        };

        trace!(slot = web.slot, name = %name, ty = ?jvm_type, "resolved variable");
        binding_of.insert(w, bindings.len());
        bindings.push(VariableBinding {
            id: bindings.len() as u32,
            slot: web.slot,
            name,
            jvm_type,
            java_type,
            kind,
            live_range: web.live_range(),
            declaration: web.declaration(),
        });
    }

    check_disjoint(&bindings)?;

    walk_vars_mut(statements, &mut |v| {
        let w = webs.locate(ctx, v);
        if let Some(b) = binding_of.get(&w).map(|&i| &bindings[i]) {
            v.id = Some(b.id);
            v.name = Some(b.name.clone());
            v.ty = b.jvm_type.clone();
        }
    });

    debug!(method = %ctx.location(), variables = bindings.len(), "resolved local variables");
    Ok(bindings)
}

/// Two bindings of one slot must not be live at the same time.
fn check_disjoint(bindings: &[VariableBinding]) -> Result<(), ReconstructError> {
    let mut by_slot: BTreeMap<u16, Vec<&VariableBinding>> = BTreeMap::new();
    for b in bindings.iter().filter(|b| b.kind != VariableKind::StackTemporary) {
        by_slot.entry(b.slot).or_default().push(b);
    }
    for (slot, group) in by_slot {
        for (i, a) in group.iter().enumerate() {
            if let Some(b) = group[i + 1..].iter().find(|b| a.overlaps(b)) {
                let at = a.declaration.max(b.declaration);
                return Err(ReconstructError::simulation(
                    at,
                    format!("live ranges of '{}' and '{}' overlap in slot {}", a.name, b.name, slot),
                ));
            }
        }
    }
    Ok(())
}

// ---- declarations ----

/// Insert local declarations.
///
/// Bindings no longer referenced after pattern rewriting are dropped. Each
/// remaining local is declared in the innermost statement list holding all of
/// its uses, merged into its first store where possible. Variables declared by
/// catch clauses, for-each headers and resources are left alone.
pub fn place_declarations(statements: &mut Vec<StructuredStmt>, variables: &mut Vec<VariableBinding>) {
    let mut header_declared: HashSet<u32> = HashSet::new();
    walk_stmts(statements, &mut |s| match s {
        StructuredStmt::ForEach { var, .. } => header_declared.extend(var.id),
        StructuredStmt::TryWithResources {
            resources, catches, ..
        } => {
            header_declared.extend(resources.iter().filter_map(|(v, _)| v.id));
            header_declared.extend(catches.iter().filter_map(|c| c.var.as_ref().and_then(|v| v.id)));
        }
        StructuredStmt::TryCatch { catches, .. } => {
            header_declared.extend(catches.iter().filter_map(|c| c.var.as_ref().and_then(|v| v.id)));
        }
        _ => {}
    });

    variables.retain(|b| {
        matches!(b.kind, VariableKind::Parameter | VariableKind::This) || list_mentions(statements, &b.to_var())
    });

    for binding in variables.iter() {
        if matches!(binding.kind, VariableKind::Parameter | VariableKind::This) || header_declared.contains(&binding.id)
        {
            continue;
        }
        if declare_in(statements, &binding.to_var()) {
            trace!(name = %binding.name, "placed declaration");
        }
    }
}

fn declare_in(list: &mut Vec<StructuredStmt>, var: &LocalVar) -> bool {
    let users: Vec<usize> = (0..list.len()).filter(|&i| list[i].mentions_var(var)).collect();
    let Some(&first) = users.first() else {
        return false;
    };

    if users.len() == 1 {
        if let StructuredStmt::For { init, .. } = &mut list[first] {
            let owner = init.iter_mut().find(|s| s.mentions_var(var));
            if let Some(StructuredStmt::Simple { stmt, .. }) = owner {
                if into_declaration(stmt, var) {
                    return true;
                }
            }
        }
        if !list[first].header_mentions(var) {
            let mut bodies: Vec<&mut Vec<StructuredStmt>> = list[first]
                .bodies_mut()
                .into_iter()
                .filter(|b| list_mentions(b, var))
                .collect();
            if let [only] = bodies.as_mut_slice() {
                return declare_in(only, var);
            }
        }
    }

    if let StructuredStmt::Simple { stmt, .. } = &mut list[first] {
        if into_declaration(stmt, var) {
            return true;
        }
    }
    list.insert(
        first,
        StructuredStmt::simple(Stmt::Declare {
            var: var.clone(),
            init: None,
        }),
    );
    true
}

/// `x = v;` → `T x = v;` when the store targets `var`.
fn into_declaration(stmt: &mut Stmt, var: &LocalVar) -> bool {
    if let Stmt::LocalStore { var: target, value } = stmt {
        if target.same_variable(var) && !value.mentions_var(var) {
            let target = target.clone();
            let value = std::mem::replace(value, Expr::NullLiteral);
            *stmt = Stmt::Declare {
                var: target,
                init: Some(value),
            };
            return true;
        }
    }
    false
}
