use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::ReconstructError;
use crate::model::{Constant, ConvertOp, FieldRef, Instruction, MethodRef, Op, ValueKind};

use super::cfg_types::*;
use super::descriptor::*;
use super::expr::*;
use super::structured_types::SourceSpan;
use super::util::MethodContext;

type SimResult<T> = Result<T, ReconstructError>;

/// A block after symbolic execution.
#[derive(Clone, Debug)]
pub struct SimulatedBlock {
    pub id: BlockId,
    pub statements: Vec<(Stmt, SourceSpan)>,
    pub exit_stack: Vec<Expr>,
    /// Condition under which the taken edge is followed, or the switch key.
    pub branch: Option<Expr>,
    pub terminator: Terminator,
}

/// Every reachable block of a method, indexed by `BlockId`.
#[derive(Clone, Debug)]
pub struct SimulatedMethod {
    pub blocks: Vec<SimulatedBlock>,
    pub temp_base: u16,
    /// One past the highest synthesized temporary slot.
    pub temp_limit: u16,
}

/// Simulate every block of `cfg` in reverse postorder, threading stack
/// values across edges.
pub fn simulate_method(cfg: &ControlFlowGraph, ctx: &MethodContext) -> SimResult<SimulatedMethod> {
    let mut sim = Simulator {
        ctx,
        next_temp: ctx.temp_base,
    };
    let mut done: Vec<Option<SimulatedBlock>> = vec![None; cfg.len()];
    let mut entry_depth: Vec<Option<usize>> = vec![None; cfg.len()];
    let mut join_vars: HashMap<BlockId, Vec<Option<LocalVar>>> = HashMap::new();

    for b in cfg.reverse_postorder() {
        let entry = if cfg.is_handler(b) {
            vec![Expr::CaughtException {
                exception_type: handler_type(cfg, b),
            }]
        } else {
            sim.entry_stack(cfg, b, &mut done, &mut join_vars)?
        };
        entry_depth[b] = Some(entry.len());
        let mut block = sim.simulate_block(cfg.block(b), entry)?;

        // Stack values flowing along back edges into joins simulated earlier.
        for s in cfg.successors(b) {
            if cfg.is_handler(s) || (s != b && done[s].is_none()) {
                continue;
            }
            let depth = entry_depth[s].unwrap_or(0);
            if block.exit_stack.len() != depth {
                return Err(ReconstructError::simulation(
                    cfg.block(b).last_offset(),
                    format!(
                        "stack depth {} does not match depth {} at loop entry {}",
                        block.exit_stack.len(),
                        depth,
                        cfg.block(s).start
                    ),
                ));
            }
            if let Some(vars) = join_vars.get(&s) {
                sim.assign_join(&mut block, cfg.block(b).last_offset(), vars);
            }
        }
        done[b] = Some(block);
    }

    let blocks: Vec<SimulatedBlock> = done.into_iter().flatten().collect();
    for block in &blocks {
        for (stmt, span) in &block.statements {
            let leftover = stmt
                .exprs()
                .iter()
                .any(|e| e.any(|n| matches!(n, Expr::UninitNew { .. } | Expr::CmpResult { .. })));
            if leftover {
                return Err(ReconstructError::simulation(
                    span.end,
                    "uninitialized object or raw comparison result escapes into a statement",
                ));
            }
        }
    }
    debug!(
        blocks = blocks.len(),
        temps = sim.next_temp - ctx.temp_base,
        "simulated method"
    );
    Ok(SimulatedMethod {
        blocks,
        temp_base: ctx.temp_base,
        temp_limit: sim.next_temp,
    })
}

/// The exception type a handler block receives: the catch type when every
/// entry naming this handler agrees, otherwise `None` (any throwable).
fn handler_type(cfg: &ControlFlowGraph, handler: BlockId) -> Option<String> {
    let mut types = cfg
        .exception_regions
        .iter()
        .filter(|r| r.handler == handler)
        .map(|r| r.catch_type.clone());
    let first = types.next().flatten()?;
    types.all(|t| t.as_deref() == Some(first.as_str())).then_some(first)
}

struct Frame {
    stack: Vec<Expr>,
    stmts: Vec<(Stmt, SourceSpan)>,
    span_start: Option<u32>,
}

impl Frame {
    fn pop(&mut self, offset: u32) -> SimResult<Expr> {
        self.stack
            .pop()
            .ok_or_else(|| ReconstructError::simulation(offset, "pop from empty operand stack"))
    }

    /// Pop `n` values, returned in push order.
    fn pop_n(&mut self, n: usize, offset: u32) -> SimResult<Vec<Expr>> {
        if self.stack.len() < n {
            return Err(ReconstructError::simulation(
                offset,
                format!("need {} operands, stack holds {}", n, self.stack.len()),
            ));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    fn push(&mut self, e: Expr) {
        self.stack.push(e);
    }
}

struct Simulator<'c, 'a> {
    ctx: &'c MethodContext<'a>,
    next_temp: u16,
}

impl<'c, 'a> Simulator<'c, 'a> {
    fn new_temp(&mut self, ty: JvmType, offset: u32) -> SimResult<LocalVar> {
        let ty = match ty {
            JvmType::Null | JvmType::Unknown | JvmType::Void => JvmType::Reference("java/lang/Object".into()),
            other => other,
        };
        let width = if ty.is_wide() { 2 } else { 1 };
        let next = self
            .next_temp
            .checked_add(width)
            .ok_or_else(|| ReconstructError::simulation(offset, "no local slot left for a stack temporary"))?;
        let var = LocalVar::new(self.next_temp, ty, Some(offset));
        self.next_temp = next;
        Ok(var)
    }

    fn is_temp(&self, e: &Expr) -> bool {
        matches!(e, Expr::LocalLoad(v) if self.ctx.is_temp_slot(v.index))
    }

    /// Values that may be evaluated later or twice without changing meaning.
    fn is_stable(&self, e: &Expr) -> bool {
        e.is_literal() || matches!(e, Expr::This | Expr::UninitNew { .. }) || self.is_temp(e)
    }

    fn emit(&self, f: &mut Frame, stmt: Stmt, offset: u32) {
        let start = f.span_start.take().unwrap_or(offset);
        let span = SourceSpan {
            start,
            end: offset,
            line: self.ctx.line_at(start),
        };
        f.stmts.push((stmt, span));
    }

    /// Move stack entries matching `pred` into temporaries, bottom first.
    fn spill_if<P: Fn(&Expr) -> bool>(&mut self, f: &mut Frame, offset: u32, pred: P) -> SimResult<()> {
        for idx in 0..f.stack.len() {
            if self.is_stable(&f.stack[idx]) || !pred(&f.stack[idx]) {
                continue;
            }
            let var = self.new_temp(f.stack[idx].jvm_type(), offset)?;
            let value = std::mem::replace(&mut f.stack[idx], Expr::LocalLoad(var.clone()));
            self.emit(f, Stmt::LocalStore { var, value }, offset);
        }
        Ok(())
    }

    fn spill_slot_reads(&mut self, f: &mut Frame, slot: u16, offset: u32) -> SimResult<()> {
        self.spill_if(f, offset, |e| {
            e.any(|n| matches!(n, Expr::LocalLoad(v) | Expr::Increment { var: v, .. } if v.index == slot))
        })
    }

    /// Two copies of `value` for the dup family.
    fn duplicate(&mut self, f: &mut Frame, value: Expr, next: Option<&Op>, offset: u32) -> SimResult<(Expr, Expr)> {
        if value.is_pure() || array_init_slot(&value, next) {
            return Ok((value.clone(), value));
        }
        let var = self.new_temp(value.jvm_type(), offset)?;
        self.emit(
            f,
            Stmt::LocalStore {
                var: var.clone(),
                value,
            },
            offset,
        );
        Ok((Expr::LocalLoad(var.clone()), Expr::LocalLoad(var)))
    }

    /// Type of a slot access: LVT entry, then parameter descriptor, then the value.
    fn local_type(&self, slot: u16, kind: ValueKind, offset: u32, value: Option<&Expr>) -> JvmType {
        let lvt = match value {
            Some(_) => self.ctx.lvt_for_store(slot, offset),
            None => self.ctx.lvt_entry(slot, offset),
        };
        if let Some(ty) = lvt
            .and_then(MethodContext::lvt_type)
            .filter(|t| t.value_kind() == Some(kind))
        {
            return ty;
        }
        if let Some(ty) = self.ctx.param_type(slot).filter(|t| t.value_kind() == Some(kind)) {
            return ty.clone();
        }
        if kind == ValueKind::Reference {
            if let Some(ty) = value.map(Expr::jvm_type).filter(|t| t.is_reference() && *t != JvmType::Null) {
                return ty;
            }
        }
        JvmType::from_kind(kind)
    }

    fn local(&self, slot: u16, kind: ValueKind, offset: u32, value: Option<&Expr>) -> LocalVar {
        LocalVar::new(slot, self.local_type(slot, kind, offset, value), Some(offset))
    }

    fn entry_stack(
        &mut self,
        cfg: &ControlFlowGraph,
        b: BlockId,
        done: &mut [Option<SimulatedBlock>],
        join_vars: &mut HashMap<BlockId, Vec<Option<LocalVar>>>,
    ) -> SimResult<Vec<Expr>> {
        let preds = cfg.predecessors(b);
        let processed: Vec<BlockId> = preds.iter().copied().filter(|p| done[*p].is_some()).collect();
        let exits: Vec<Vec<Expr>> = processed
            .iter()
            .filter_map(|p| done[*p].as_ref().map(|s| s.exit_stack.clone()))
            .collect();
        let Some(first) = exits.first() else {
            return Ok(Vec::new());
        };
        let depth = first.len();
        if let Some(bad) = exits.iter().find(|e| e.len() != depth) {
            return Err(ReconstructError::simulation(
                cfg.block(b).start,
                format!("stack depth mismatch at join: {} vs {}", depth, bad.len()),
            ));
        }
        if preds.len() == 1 || depth == 0 {
            return Ok(first.clone());
        }

        let all_processed = processed.len() == preds.len();
        let mut entry = Vec::with_capacity(depth);
        let mut vars = Vec::with_capacity(depth);
        for i in 0..depth {
            let value = &first[i];
            if all_processed && self.is_stable(value) && exits.iter().all(|e| e[i] == *value) {
                entry.push(value.clone());
                vars.push(None);
                continue;
            }
            let ty = exits
                .iter()
                .map(|e| e[i].jvm_type())
                .find(|t| !matches!(t, JvmType::Null | JvmType::Unknown))
                .unwrap_or(JvmType::Unknown);
            let var = self.new_temp(ty, cfg.block(b).start)?;
            entry.push(Expr::LocalLoad(var.clone()));
            vars.push(Some(var));
        }
        if vars.iter().any(Option::is_some) {
            for p in processed {
                let at = cfg.block(p).last_offset();
                if let Some(block) = done[p].as_mut() {
                    self.assign_join(block, at, &vars);
                }
            }
            join_vars.insert(b, vars);
        }
        Ok(entry)
    }

    /// Append `var = value` for every per-depth join variable to a predecessor.
    fn assign_join(&self, block: &mut SimulatedBlock, at: u32, vars: &[Option<LocalVar>]) {
        for (i, var) in vars.iter().enumerate() {
            let (Some(var), Some(value)) = (var, block.exit_stack.get(i)) else {
                continue;
            };
            if matches!(value, Expr::LocalLoad(v) if v.index == var.index) {
                continue;
            }
            let span = SourceSpan {
                start: at,
                end: at,
                line: self.ctx.line_at(at),
            };
            let stmt = Stmt::LocalStore {
                var: var.clone(),
                value: value.clone(),
            };
            block.statements.push((stmt, span));
            block.exit_stack[i] = Expr::LocalLoad(var.clone());
        }
    }

    fn simulate_block(&mut self, block: &BasicBlock, entry: Vec<Expr>) -> SimResult<SimulatedBlock> {
        let mut f = Frame {
            stack: entry,
            stmts: Vec::new(),
            span_start: None,
        };
        let mut branch = None;
        let insns = &block.instructions;
        let mut i = 0;
        while i < insns.len() {
            let insn = &insns[i];
            if f.span_start.is_none() {
                f.span_start = Some(insn.offset);
            }
            let prev = if i > 0 { Some(&insns[i - 1].op) } else { None };
            let next = insns.get(i + 1).map(|n| &n.op);
            let consumed_next = self.step(&mut f, insn, prev, next, &mut branch)?;
            i += if consumed_next { 2 } else { 1 };
        }
        trace!(block = block.id, stmts = f.stmts.len(), depth = f.stack.len(), "simulated block");
        Ok(SimulatedBlock {
            id: block.id,
            statements: f.stmts,
            exit_stack: f.stack,
            branch,
            terminator: block.terminator.clone(),
        })
    }

    /// Execute one instruction. Returns true when the following instruction
    /// was folded into this one.
    fn step(
        &mut self,
        f: &mut Frame,
        insn: &Instruction,
        prev: Option<&Op>,
        next: Option<&Op>,
        branch: &mut Option<Expr>,
    ) -> SimResult<bool> {
        let offset = insn.offset;
        match &insn.op {
            // ============================================================
            // Constants and locals
            // ============================================================
            Op::Nop => {}
            Op::AconstNull => f.push(Expr::NullLiteral),
            Op::Const(c) => f.push(constant_expr(c)),

            Op::Load { kind, slot } => {
                if *kind == ValueKind::Reference && self.ctx.is_this_slot(*slot) {
                    f.push(Expr::This);
                } else {
                    f.push(Expr::LocalLoad(self.local(*slot, *kind, offset, None)));
                }
            }
            Op::Store { kind, slot } => {
                let value = f.pop(offset)?;
                let var = self.local(*slot, *kind, offset, Some(&value));
                self.spill_slot_reads(f, *slot, offset)?;
                self.emit(f, Stmt::LocalStore { var, value }, offset);
            }
            Op::Iinc { slot, amount } => {
                let var = self.local(*slot, ValueKind::Int, offset, None);
                let after_load = matches!(prev, Some(Op::Load { kind: ValueKind::Int, slot: s }) if s == slot)
                    && matches!(f.stack.last(), Some(Expr::LocalLoad(v)) if v.index == *slot);
                if after_load {
                    // iload n; iinc n k: the loaded value is the old one.
                    f.stack.pop();
                    self.spill_slot_reads(f, *slot, offset)?;
                    f.push(Expr::Increment {
                        var,
                        amount: *amount,
                        prefix: false,
                    });
                    return Ok(false);
                }
                let load_follows = matches!(next, Some(Op::Load { kind: ValueKind::Int, slot: s }) if s == slot);
                self.spill_slot_reads(f, *slot, offset)?;
                if load_follows && !f.stack.is_empty() {
                    f.push(Expr::Increment {
                        var,
                        amount: *amount,
                        prefix: true,
                    });
                    return Ok(true);
                }
                self.emit(f, Stmt::Iinc { var, amount: *amount }, offset);
            }

            // ============================================================
            // Arrays
            // ============================================================
            Op::ArrayLoad(kind) => {
                let index = f.pop(offset)?;
                let array = f.pop(offset)?;
                let element_type = array
                    .jvm_type()
                    .element()
                    .cloned()
                    .unwrap_or_else(|| JvmType::from_array_kind(*kind));
                f.push(Expr::ArrayLoad {
                    array: array.boxed(),
                    index: index.boxed(),
                    element_type,
                });
            }
            Op::ArrayStore(_) => {
                let value = f.pop(offset)?;
                let index = f.pop(offset)?;
                let array = f.pop(offset)?;
                if let Err(value) = fold_array_init(f, &array, &index, value) {
                    self.spill_if(f, offset, |e| e.any(|n| matches!(n, Expr::ArrayLoad { .. })))?;
                    self.emit(f, Stmt::ArrayStore { array, index, value }, offset);
                }
            }
            Op::NewArray(prim) => {
                let length = f.pop(offset)?;
                f.push(Expr::NewArray {
                    element_type: JvmType::from_primitive(*prim),
                    length: length.boxed(),
                });
            }
            Op::ANewArray(class) => {
                let length = f.pop(offset)?;
                f.push(Expr::NewArray {
                    element_type: class_ref_type(class),
                    length: length.boxed(),
                });
            }
            Op::MultiANewArray { descriptor, dimensions } => {
                let dims = f.pop_n(*dimensions as usize, offset)?;
                let element_type = parse_type_descriptor(descriptor).ok_or_else(|| {
                    ReconstructError::simulation(offset, format!("bad array descriptor '{}'", descriptor))
                })?;
                f.push(Expr::NewMultiArray {
                    element_type,
                    dimensions: dims,
                });
            }
            Op::ArrayLength => {
                let array = f.pop(offset)?;
                f.push(Expr::ArrayLength { array: array.boxed() });
            }

            // ============================================================
            // Stack manipulation
            // ============================================================
            Op::Pop => {
                let value = f.pop(offset)?;
                self.discard(f, value, offset);
            }
            Op::Pop2 => {
                let value = f.pop(offset)?;
                let wide = value.jvm_type().is_wide();
                self.discard(f, value, offset);
                if !wide {
                    let second = f.pop(offset)?;
                    self.discard(f, second, offset);
                }
            }
            Op::Dup => return self.dup_single(f, next, offset),
            Op::Dup2 => {
                if f.stack.last().map_or(false, |v| v.jvm_type().is_wide()) {
                    return self.dup_single(f, next, offset);
                }
                let v1 = f.pop(offset)?;
                let v2 = f.pop(offset)?;
                let (a2, b2) = self.duplicate(f, v2, next, offset)?;
                let (a1, b1) = self.duplicate(f, v1, next, offset)?;
                f.stack.extend([a2, a1, b2, b1]);
            }
            Op::DupX1 => {
                let v1 = f.pop(offset)?;
                let v2 = f.pop(offset)?;
                if let Some(Op::PutField(field)) = next {
                    f.push(assign_field(Some(v2), field, v1));
                    return Ok(true);
                }
                let (a, b) = self.duplicate(f, v1, next, offset)?;
                f.stack.extend([a, v2, b]);
            }
            Op::Dup2X1 => {
                let v1 = f.pop(offset)?;
                if v1.jvm_type().is_wide() {
                    let v2 = f.pop(offset)?;
                    if let Some(Op::PutField(field)) = next {
                        f.push(assign_field(Some(v2), field, v1));
                        return Ok(true);
                    }
                    let (a, b) = self.duplicate(f, v1, next, offset)?;
                    f.stack.extend([a, v2, b]);
                } else {
                    let v2 = f.pop(offset)?;
                    let v3 = f.pop(offset)?;
                    let (a2, b2) = self.duplicate(f, v2, next, offset)?;
                    let (a1, b1) = self.duplicate(f, v1, next, offset)?;
                    f.stack.extend([a2, a1, v3, b2, b1]);
                }
            }
            Op::DupX2 => {
                let v1 = f.pop(offset)?;
                let v2 = f.pop(offset)?;
                if v2.jvm_type().is_wide() {
                    let (a, b) = self.duplicate(f, v1, next, offset)?;
                    f.stack.extend([a, v2, b]);
                } else {
                    let v3 = f.pop(offset)?;
                    if let Some(Op::ArrayStore(_)) = next {
                        f.push(assign_array(v3, v2, v1));
                        return Ok(true);
                    }
                    let (a, b) = self.duplicate(f, v1, next, offset)?;
                    f.stack.extend([a, v3, v2, b]);
                }
            }
            Op::Dup2X2 => {
                let v1 = f.pop(offset)?;
                if v1.jvm_type().is_wide() {
                    let v2 = f.pop(offset)?;
                    if v2.jvm_type().is_wide() {
                        let (a, b) = self.duplicate(f, v1, next, offset)?;
                        f.stack.extend([a, v2, b]);
                    } else {
                        let v3 = f.pop(offset)?;
                        if let Some(Op::ArrayStore(_)) = next {
                            f.push(assign_array(v3, v2, v1));
                            return Ok(true);
                        }
                        let (a, b) = self.duplicate(f, v1, next, offset)?;
                        f.stack.extend([a, v3, v2, b]);
                    }
                } else {
                    let v2 = f.pop(offset)?;
                    let v3 = f.pop(offset)?;
                    let (a2, b2) = self.duplicate(f, v2, next, offset)?;
                    let (a1, b1) = self.duplicate(f, v1, next, offset)?;
                    if v3.jvm_type().is_wide() {
                        f.stack.extend([a2, a1, v3, b2, b1]);
                    } else {
                        let v4 = f.pop(offset)?;
                        f.stack.extend([a2, a1, v4, v3, b2, b1]);
                    }
                }
            }
            Op::Swap => {
                let v1 = f.pop(offset)?;
                let v2 = f.pop(offset)?;
                f.stack.extend([v1, v2]);
            }

            // ============================================================
            // Arithmetic, conversion, comparison
            // ============================================================
            Op::Arith { op, .. } => {
                let right = f.pop(offset)?;
                let left = f.pop(offset)?;
                f.push(Expr::BinaryOp {
                    op: BinOp::from_arith(*op),
                    left: left.boxed(),
                    right: right.boxed(),
                });
            }
            Op::Neg(_) => {
                let operand = f.pop(offset)?;
                f.push(Expr::UnaryOp {
                    op: UnaryOp::Neg,
                    operand: operand.boxed(),
                });
            }
            Op::Convert(c) => {
                let operand = f.pop(offset)?;
                f.push(Expr::Cast {
                    target_type: convert_type(*c),
                    operand: operand.boxed(),
                });
            }
            Op::Compare(kind) => {
                let right = f.pop(offset)?;
                let left = f.pop(offset)?;
                f.push(Expr::CmpResult {
                    kind: *kind,
                    left: left.boxed(),
                    right: right.boxed(),
                });
            }
            Op::CheckCast(class) => {
                let operand = f.pop(offset)?;
                f.push(Expr::Cast {
                    target_type: class_ref_type(class),
                    operand: operand.boxed(),
                });
            }
            Op::InstanceOf(class) => {
                let operand = f.pop(offset)?;
                f.push(Expr::Instanceof {
                    operand: operand.boxed(),
                    check_type: class.clone(),
                });
            }

            // ============================================================
            // Branches
            // ============================================================
            Op::IfZero { cond, .. } => {
                let value = f.pop(offset)?;
                let op = CompareOp::from_condition(*cond);
                let condition = match value {
                    Expr::CmpResult { left, right, .. } => Expr::Compare { op, left, right },
                    v if v.is_boolean() && op == CompareOp::Ne => v,
                    v if v.is_boolean() && op == CompareOp::Eq => negate_expr(v),
                    v => Expr::Compare {
                        op,
                        left: v.boxed(),
                        right: Expr::IntLiteral(0).boxed(),
                    },
                };
                self.end_with_branch(f, condition, offset, branch)?;
            }
            Op::IfIntCompare { cond, .. } | Op::IfRefCompare { cond, .. } => {
                let right = f.pop(offset)?;
                let left = f.pop(offset)?;
                let condition = Expr::Compare {
                    op: CompareOp::from_condition(*cond),
                    left: left.boxed(),
                    right: right.boxed(),
                };
                self.end_with_branch(f, condition, offset, branch)?;
            }
            Op::IfNull { is_null, .. } => {
                let value = f.pop(offset)?;
                let condition = Expr::Compare {
                    op: if *is_null { CompareOp::Eq } else { CompareOp::Ne },
                    left: value.boxed(),
                    right: Expr::NullLiteral.boxed(),
                };
                self.end_with_branch(f, condition, offset, branch)?;
            }
            Op::TableSwitch { .. } | Op::LookupSwitch { .. } => {
                let key = f.pop(offset)?;
                self.end_with_branch(f, key, offset, branch)?;
            }
            Op::Goto(_) => {}
            Op::Jsr(_) | Op::Ret(_) => {
                return Err(ReconstructError::unsupported(offset, "jsr/ret subroutines are not supported"));
            }
            Op::Unknown(opcode) => {
                return Err(ReconstructError::unsupported(
                    offset,
                    format!("unclassified opcode 0x{:02x}", opcode),
                ));
            }
            Op::Return(kind) => {
                let value = match kind {
                    Some(_) => Some(f.pop(offset)?),
                    None => None,
                };
                self.emit(f, Stmt::Return(value), offset);
            }
            Op::Athrow => {
                let value = f.pop(offset)?;
                self.emit(f, Stmt::Throw(value), offset);
            }

            // ============================================================
            // Fields
            // ============================================================
            Op::GetStatic(field) => f.push(field_get(None, field)),
            Op::GetField(field) => {
                let object = f.pop(offset)?;
                f.push(field_get(Some(object), field));
            }
            Op::PutStatic(field) | Op::PutField(field) => {
                let value = f.pop(offset)?;
                let object = match &insn.op {
                    Op::PutField(_) => Some(f.pop(offset)?),
                    _ => None,
                };
                self.spill_if(f, offset, |e| {
                    e.any(|n| matches!(n, Expr::FieldGet { class_name, field_name, .. }
                        if *class_name == field.owner && *field_name == field.name))
                })?;
                self.emit(
                    f,
                    Stmt::FieldStore {
                        object,
                        class_name: field.owner.clone(),
                        field_name: field.name.clone(),
                        field_type: parse_type_descriptor(&field.descriptor).unwrap_or(JvmType::Unknown),
                        value,
                    },
                    offset,
                );
            }

            // ============================================================
            // Calls and object creation
            // ============================================================
            Op::InvokeSpecial(m) if m.name == "<init>" => self.constructor_call(f, m, offset)?,
            Op::InvokeVirtual(m) | Op::InvokeSpecial(m) | Op::InvokeStatic(m) | Op::InvokeInterface(m) => {
                let kind = match &insn.op {
                    Op::InvokeVirtual(_) => InvokeKind::Virtual,
                    Op::InvokeSpecial(_) => InvokeKind::Special,
                    Op::InvokeStatic(_) => InvokeKind::Static,
                    _ => InvokeKind::Interface,
                };
                let (params, return_type) = method_types(m, offset)?;
                let args = f.pop_n(params.len(), offset)?;
                let object = match kind {
                    InvokeKind::Static => None,
                    _ => Some(f.pop(offset)?.boxed()),
                };
                let call = Expr::MethodCall {
                    kind,
                    object,
                    class_name: m.owner.clone(),
                    method_name: m.name.clone(),
                    descriptor: m.descriptor.clone(),
                    args,
                    return_type: return_type.clone(),
                };
                self.push_or_emit(f, call, &return_type, offset);
            }
            Op::InvokeDynamic(site) => {
                let (params, return_type) = parse_method_descriptor(&site.descriptor).ok_or_else(|| {
                    ReconstructError::simulation(offset, format!("bad call site descriptor '{}'", site.descriptor))
                })?;
                let captures = f.pop_n(params.len(), offset)?;
                let call = Expr::InvokeDynamic {
                    method_name: site.name.clone(),
                    descriptor: site.descriptor.clone(),
                    bootstrap: site.bootstrap.clone(),
                    bootstrap_args: site.bootstrap_args.clone(),
                    captures,
                    return_type: return_type.clone(),
                };
                self.push_or_emit(f, call, &return_type, offset);
            }
            Op::New(class) => f.push(Expr::UninitNew {
                class_name: class.clone(),
                offset,
            }),

            // ============================================================
            // Monitors
            // ============================================================
            Op::MonitorEnter | Op::MonitorExit => {
                let object = f.pop(offset)?;
                let enter = matches!(insn.op, Op::MonitorEnter);
                self.emit(f, Stmt::Monitor { enter, object }, offset);
            }
        }
        Ok(false)
    }

    fn discard(&self, f: &mut Frame, value: Expr, offset: u32) {
        if value.has_side_effects() {
            self.emit(f, Stmt::ExprStmt(value), offset);
        }
    }

    /// `dup`, or `dup2` of a wide value, with the store-as-value lookahead.
    fn dup_single(&mut self, f: &mut Frame, next: Option<&Op>, offset: u32) -> SimResult<bool> {
        let value = f.pop(offset)?;
        match next {
            Some(Op::Store { kind, slot }) => {
                let var = self.local(*slot, *kind, offset, Some(&value));
                self.spill_slot_reads(f, *slot, offset)?;
                f.push(Expr::Assign {
                    target: Expr::LocalLoad(var).boxed(),
                    value: value.boxed(),
                });
                Ok(true)
            }
            Some(Op::PutStatic(field)) => {
                f.push(assign_field(None, field, value));
                Ok(true)
            }
            _ => {
                let (a, b) = self.duplicate(f, value, next, offset)?;
                f.stack.extend([a, b]);
                Ok(false)
            }
        }
    }

    fn end_with_branch(&mut self, f: &mut Frame, value: Expr, offset: u32, branch: &mut Option<Expr>) -> SimResult<()> {
        self.spill_if(f, offset, |_| true)?;
        *branch = Some(value);
        Ok(())
    }

    fn push_or_emit(&self, f: &mut Frame, call: Expr, return_type: &JvmType, offset: u32) {
        if *return_type == JvmType::Void {
            self.emit(f, Stmt::ExprStmt(call), offset);
        } else {
            f.push(call);
        }
    }

    fn constructor_call(&mut self, f: &mut Frame, m: &MethodRef, offset: u32) -> SimResult<()> {
        let (params, _) = method_types(m, offset)?;
        let args = f.pop_n(params.len(), offset)?;
        let receiver = f.pop(offset)?;
        match receiver {
            Expr::UninitNew {
                class_name,
                offset: new_at,
            } => {
                let created = Expr::New {
                    class_name,
                    constructor_descriptor: m.descriptor.clone(),
                    args,
                };
                let mut replaced = false;
                for e in f.stack.iter_mut() {
                    if matches!(e, Expr::UninitNew { offset, .. } if *offset == new_at) {
                        *e = created.clone();
                        replaced = true;
                    }
                }
                if !replaced {
                    self.emit(f, Stmt::ExprStmt(created), offset);
                }
            }
            receiver => {
                // super(...) or this(...)
                let call = Expr::MethodCall {
                    kind: InvokeKind::Special,
                    object: Some(receiver.boxed()),
                    class_name: m.owner.clone(),
                    method_name: m.name.clone(),
                    descriptor: m.descriptor.clone(),
                    args,
                    return_type: JvmType::Void,
                };
                self.emit(f, Stmt::ExprStmt(call), offset);
            }
        }
        Ok(())
    }
}

fn method_types(m: &MethodRef, offset: u32) -> SimResult<(Vec<JvmType>, JvmType)> {
    parse_method_descriptor(&m.descriptor).ok_or_else(|| {
        ReconstructError::simulation(
            offset,
            format!("bad method descriptor '{}' for {}.{}", m.descriptor, m.owner, m.name),
        )
    })
}

fn constant_expr(c: &Constant) -> Expr {
    match c {
        Constant::Int(v) => Expr::IntLiteral(*v),
        Constant::Long(v) => Expr::LongLiteral(*v),
        Constant::Float(v) => Expr::FloatLiteral(*v),
        Constant::Double(v) => Expr::DoubleLiteral(*v),
        Constant::String(s) => Expr::StringLiteral(s.clone()),
        Constant::Class(name) => Expr::ClassLiteral(name.clone()),
        other => Expr::Unresolved(other.to_string()),
    }
}

fn convert_type(c: ConvertOp) -> JvmType {
    match c {
        ConvertOp::I2B => JvmType::Byte,
        ConvertOp::I2C => JvmType::Char,
        ConvertOp::I2S => JvmType::Short,
        other => JvmType::from_kind(other.result_kind()),
    }
}

fn field_get(object: Option<Expr>, field: &FieldRef) -> Expr {
    Expr::FieldGet {
        object: object.map(Box::new),
        class_name: field.owner.clone(),
        field_name: field.name.clone(),
        field_type: parse_type_descriptor(&field.descriptor).unwrap_or(JvmType::Unknown),
    }
}

fn assign_field(object: Option<Expr>, field: &FieldRef, value: Expr) -> Expr {
    Expr::Assign {
        target: field_get(object, field).boxed(),
        value: value.boxed(),
    }
}

fn assign_array(array: Expr, index: Expr, value: Expr) -> Expr {
    let element_type = array.jvm_type().element().cloned().unwrap_or(JvmType::Unknown);
    Expr::Assign {
        target: Expr::ArrayLoad {
            array: array.boxed(),
            index: index.boxed(),
            element_type,
        }
        .boxed(),
        value: value.boxed(),
    }
}

/// Default element value of a freshly allocated array.
fn default_value(ty: &JvmType) -> Expr {
    match ty {
        JvmType::Long => Expr::LongLiteral(0),
        JvmType::Float => Expr::FloatLiteral(0.0),
        JvmType::Double => Expr::DoubleLiteral(0.0),
        JvmType::Boolean => Expr::BooleanLiteral(false),
        JvmType::Int | JvmType::Byte | JvmType::Char | JvmType::Short => Expr::IntLiteral(0),
        _ => Expr::NullLiteral,
    }
}

const MAX_ARRAY_INIT: i32 = 1024;

/// `dup` of an array about to have element `k` stored, where the store is
/// certain to fold into an initializer. Any other array is spilled, since the
/// copies would each allocate.
fn array_init_slot(array: &Expr, next: Option<&Op>) -> bool {
    let Some(Op::Const(Constant::Int(k))) = next else {
        return false;
    };
    let len = match array {
        Expr::NewArray { length, .. } => match **length {
            Expr::IntLiteral(n) if (0..=MAX_ARRAY_INIT).contains(&n) => n as usize,
            _ => return false,
        },
        Expr::ArrayInit { elements, .. } => elements.len(),
        _ => return false,
    };
    usize::try_from(*k).map_or(false, |k| k < len)
}

/// `newarray; dup; k; v; xastore`: fold the element into an `ArrayInit` on
/// top of the stack. Hands the value back when the shape does not match.
fn fold_array_init(f: &mut Frame, array: &Expr, index: &Expr, value: Expr) -> Result<(), Expr> {
    let Expr::IntLiteral(k) = *index else {
        return Err(value);
    };
    if f.stack.last() != Some(array) || k < 0 {
        return Err(value);
    }
    let (element_type, mut elements) = match array {
        Expr::NewArray { element_type, length } => match **length {
            Expr::IntLiteral(n) if (0..=MAX_ARRAY_INIT).contains(&n) => {
                (element_type.clone(), vec![default_value(element_type); n as usize])
            }
            _ => return Err(value),
        },
        Expr::ArrayInit { element_type, elements } => (element_type.clone(), elements.clone()),
        _ => return Err(value),
    };
    let Some(slot) = elements.get_mut(k as usize) else {
        return Err(value);
    };
    *slot = match (&element_type, value) {
        (JvmType::Boolean, Expr::IntLiteral(v)) => Expr::BooleanLiteral(v != 0),
        (_, v) => v,
    };
    if let Some(top) = f.stack.last_mut() {
        *top = Expr::ArrayInit { element_type, elements };
    }
    Ok(())
}
