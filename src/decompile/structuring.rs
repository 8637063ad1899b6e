use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace, warn};

use crate::error::ReconstructError;

use super::cfg_types::*;
use super::expr::*;
use super::stack_sim::{SimulatedBlock, SimulatedMethod};
use super::structured_types::*;

const THROWABLE: &str = "java/lang/Throwable";

/// Result of structuring one method.
#[derive(Clone, Debug)]
pub struct StructuredMethod {
    pub statements: Vec<StructuredStmt>,
    /// Regions that fell back to `UnstructuredGoto` / `UnstructuredBlock`.
    pub failures: Vec<ReconstructError>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatchHandler {
    /// Several types make a multi-catch.
    pub exception_types: Vec<String>,
    pub handler: BlockId,
}

/// One `try` statement recovered from the exception table.
#[derive(Clone, Debug, PartialEq)]
pub struct TryRegion {
    pub start: u32,
    pub end: u32,
    pub catches: Vec<CatchHandler>,
    pub finally_handler: Option<BlockId>,
}

impl TryRegion {
    pub fn covers(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// Group exception table entries into try statements, outer regions first.
pub fn build_try_regions(cfg: &ControlFlowGraph) -> Vec<TryRegion> {
    struct HandlerGroup {
        handler: BlockId,
        types: Vec<String>,
        catch_any: bool,
        start: u32,
        end: u32,
    }

    let mut groups: Vec<HandlerGroup> = Vec::new();
    for entry in &cfg.exception_regions {
        // Handlers covering themselves guard the monitorexit / rethrow of a
        // finally handler; they are not source-level try statements.
        if entry.covers(entry.handler_offset) {
            trace!(handler = entry.handler_offset, "skipping self-covering exception entry");
            continue;
        }
        let group = match groups.iter().position(|g| g.handler == entry.handler) {
            Some(i) => &mut groups[i],
            None => {
                groups.push(HandlerGroup {
                    handler: entry.handler,
                    types: Vec::new(),
                    catch_any: false,
                    start: entry.start,
                    end: entry.end,
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };
        group.start = group.start.min(entry.start);
        group.end = group.end.max(entry.end);
        match &entry.catch_type {
            Some(ty) if !group.types.contains(ty) => group.types.push(ty.clone()),
            Some(_) => {}
            None => group.catch_any = true,
        }
    }

    let mut regions: Vec<TryRegion> = Vec::new();
    for g in groups.iter().filter(|g| !g.catch_any) {
        let catch = CatchHandler {
            exception_types: g.types.clone(),
            handler: g.handler,
        };
        match regions.iter_mut().find(|r| r.start == g.start && r.end == g.end) {
            Some(region) => region.catches.push(catch),
            None => regions.push(TryRegion {
                start: g.start,
                end: g.end,
                catches: vec![catch],
                finally_handler: None,
            }),
        }
    }
    for g in groups.iter().filter(|g| g.catch_any) {
        match regions
            .iter_mut()
            .find(|r| r.start == g.start && r.finally_handler.is_none() && !r.catches.is_empty())
        {
            Some(region) => region.finally_handler = Some(g.handler),
            None => regions.push(TryRegion {
                start: g.start,
                end: g.end,
                catches: Vec::new(),
                finally_handler: Some(g.handler),
            }),
        }
    }
    regions.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
    regions
}

/// Immediate dominators by the Cooper-Harvey-Kennedy iteration.
///
/// `idom[root] == Some(root)`; nodes unreachable from `root` get `None`.
pub fn immediate_dominators(succs: &[Vec<usize>], root: usize) -> Vec<Option<usize>> {
    let n = succs.len();
    let mut idom = vec![None; n];
    if root >= n {
        return idom;
    }

    let mut postorder = Vec::with_capacity(n);
    let mut seen = vec![false; n];
    let mut stack = vec![(root, 0usize)];
    seen[root] = true;
    while let Some((node, idx)) = stack.pop() {
        match succs[node].get(idx) {
            Some(&next) => {
                stack.push((node, idx + 1));
                if !seen[next] {
                    seen[next] = true;
                    stack.push((next, 0));
                }
            }
            None => postorder.push(node),
        }
    }
    let mut po_number = vec![0usize; n];
    for (i, &node) in postorder.iter().enumerate() {
        po_number[node] = i;
    }
    let mut preds = vec![Vec::new(); n];
    for (u, targets) in succs.iter().enumerate() {
        if seen[u] {
            for &s in targets {
                preds[s].push(u);
            }
        }
    }

    idom[root] = Some(root);
    let mut changed = true;
    while changed {
        changed = false;
        for &node in postorder.iter().rev() {
            if node == root {
                continue;
            }
            let mut new_idom: Option<usize> = None;
            for &p in &preds[node] {
                if idom[p].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(current) => intersect(&idom, &po_number, p, current),
                });
            }
            if new_idom.is_some() && idom[node] != new_idom {
                idom[node] = new_idom;
                changed = true;
            }
        }
    }
    idom
}

fn intersect(idom: &[Option<usize>], po_number: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while po_number[a] < po_number[b] {
            match idom[a] {
                Some(next) if next != a => a = next,
                _ => return b,
            }
        }
        while po_number[b] < po_number[a] {
            match idom[b] {
                Some(next) if next != b => b = next,
                _ => return a,
            }
        }
    }
    a
}

/// `a` dominates `b` in the tree described by `idom`.
pub fn dominates(idom: &[Option<usize>], a: usize, mut b: usize) -> bool {
    loop {
        if a == b {
            return true;
        }
        match idom.get(b).copied().flatten() {
            Some(parent) if parent != b => b = parent,
            _ => return false,
        }
    }
}

fn terminator_successors(term: &Terminator) -> Vec<BlockId> {
    let mut all = match term {
        Terminator::FallThrough { target } | Terminator::Goto { target } => vec![*target],
        Terminator::ConditionalBranch { taken, not_taken } => vec![*taken, *not_taken],
        Terminator::Switch { default, cases } => {
            let mut all: Vec<BlockId> = cases.iter().map(|(_, t)| *t).collect();
            all.push(*default);
            all
        }
        Terminator::Jsr { target, return_to } => {
            let mut all = vec![*target];
            all.extend(*return_to);
            all
        }
        Terminator::Ret | Terminator::Return | Terminator::Throw => Vec::new(),
    };
    let mut seen = BTreeSet::new();
    all.retain(|b| seen.insert(*b));
    all
}

fn cond_or(left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op: BinOp::CondOr,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn cond_and(left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op: BinOp::CondAnd,
        left: Box::new(left),
        right: Box::new(right),
    }
}

struct JumpFrame {
    is_loop: bool,
    break_target: Option<BlockId>,
    continue_target: Option<BlockId>,
    /// Assigned the first time a jump needs it.
    label: Option<String>,
}

enum LoopShape {
    PreTest { condition: Expr, body: BlockId, follow: BlockId },
    PostTest { latch: BlockId, condition: Expr, follow: BlockId },
    Endless,
}

struct Structurer<'a> {
    cfg: &'a ControlFlowGraph,
    blocks: Vec<SimulatedBlock>,
    /// Folded into a predecessor's short-circuit condition.
    merged: Vec<bool>,
    visited: Vec<bool>,
    /// Header → natural loop body (header included).
    loops: BTreeMap<BlockId, BTreeSet<BlockId>>,
    latches: BTreeMap<BlockId, Vec<BlockId>>,
    opened_loops: BTreeSet<BlockId>,
    regions: Vec<TryRegion>,
    region_entry: Vec<Option<BlockId>>,
    opened_regions: Vec<bool>,
    frames: Vec<JumpFrame>,
    label_counter: usize,
    depth: usize,
    max_depth: usize,
    /// Goto targets still waiting for an `UnstructuredBlock`.
    pending: Vec<BlockId>,
    failures: Vec<ReconstructError>,
}

/// Turn the simulated blocks of one method into nested statements.
///
/// Regions that cannot be expressed fall back to `UnstructuredGoto` and
/// `UnstructuredBlock` nodes; each such region is reported in `failures`
/// while the rest of the method structures normally.
pub fn structure_method(cfg: &ControlFlowGraph, sim: SimulatedMethod, max_depth: usize) -> StructuredMethod {
    if cfg.is_empty() {
        return StructuredMethod {
            statements: Vec::new(),
            failures: Vec::new(),
        };
    }
    let mut s = Structurer::new(cfg, sim, max_depth);
    s.merge_short_circuits();
    s.find_loops();

    let mut statements = s.sequence(cfg.entry, None, true);
    s.drain_leftovers(&mut statements);
    debug!(
        blocks = cfg.len(),
        loops = s.loops.len(),
        try_regions = s.regions.len(),
        failures = s.failures.len(),
        "structured method"
    );
    StructuredMethod {
        statements,
        failures: s.failures,
    }
}

impl<'a> Structurer<'a> {
    fn new(cfg: &'a ControlFlowGraph, sim: SimulatedMethod, max_depth: usize) -> Self {
        let n = cfg.len();
        let mut blocks: Vec<SimulatedBlock> = (0..n)
            .map(|id| SimulatedBlock {
                id,
                statements: Vec::new(),
                exit_stack: Vec::new(),
                branch: None,
                terminator: cfg.block(id).terminator.clone(),
            })
            .collect();
        for block in sim.blocks {
            if block.id < n {
                let id = block.id;
                blocks[id] = block;
            }
        }
        let regions = build_try_regions(cfg);
        let region_entry = regions
            .iter()
            .map(|r| cfg.blocks.iter().find(|b| r.covers(b.start)).map(|b| b.id))
            .collect();
        let opened_regions = vec![false; regions.len()];
        Self {
            cfg,
            blocks,
            merged: vec![false; n],
            visited: vec![false; n],
            loops: BTreeMap::new(),
            latches: BTreeMap::new(),
            opened_loops: BTreeSet::new(),
            regions,
            region_entry,
            opened_regions,
            frames: Vec::new(),
            label_counter: 0,
            depth: 0,
            max_depth,
            pending: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn succs(&self, b: BlockId) -> Vec<BlockId> {
        terminator_successors(&self.blocks[b].terminator)
    }

    fn normal_preds(&self, b: BlockId) -> Vec<BlockId> {
        (0..self.blocks.len())
            .filter(|&p| !self.merged[p] && self.succs(p).contains(&b))
            .collect()
    }

    // ---- short-circuit conditions ----

    fn can_merge(&self, a: BlockId, b: BlockId, region_starts: &BTreeSet<u32>) -> bool {
        let block = &self.blocks[b];
        b != a
            && !self.merged[b]
            && block.statements.is_empty()
            && block.exit_stack.is_empty()
            && block.branch.is_some()
            && !self.cfg.is_handler(b)
            && !region_starts.contains(&self.cfg.block(b).start)
            && self.normal_preds(b) == [a]
            && self.cfg.exception_successors(a) == self.cfg.exception_successors(b)
    }

    /// Fold chains of statement-free conditional blocks into `&&` / `||`.
    fn merge_short_circuits(&mut self) {
        let region_starts: BTreeSet<u32> = self.cfg.exception_regions.iter().map(|r| r.start).collect();
        let mut changed = true;
        while changed {
            changed = false;
            for a in 0..self.blocks.len() {
                if self.merged[a] {
                    continue;
                }
                let (ta, na) = match &self.blocks[a].terminator {
                    Terminator::ConditionalBranch { taken, not_taken } => (*taken, *not_taken),
                    _ => continue,
                };
                for (via_taken, b) in [(false, na), (true, ta)] {
                    if !self.can_merge(a, b, &region_starts) {
                        continue;
                    }
                    let (tb, nb) = match &self.blocks[b].terminator {
                        Terminator::ConditionalBranch { taken, not_taken } => (*taken, *not_taken),
                        _ => continue,
                    };
                    let other = if via_taken { na } else { ta };
                    if tb == b || nb == b || other == b {
                        continue;
                    }
                    let (Some(ca), Some(cb)) = (self.blocks[a].branch.clone(), self.blocks[b].branch.clone()) else {
                        continue;
                    };
                    let condition = if !via_taken && other == tb {
                        cond_or(ca, cb)
                    } else if !via_taken && other == nb {
                        cond_and(negate_expr(ca), cb)
                    } else if via_taken && other == nb {
                        cond_and(ca, cb)
                    } else if via_taken && other == tb {
                        cond_or(negate_expr(ca), cb)
                    } else {
                        continue;
                    };
                    trace!(into = a, from = b, "merged short-circuit condition");
                    self.blocks[a].terminator = Terminator::ConditionalBranch {
                        taken: tb,
                        not_taken: nb,
                    };
                    self.blocks[a].branch = Some(condition);
                    self.merged[b] = true;
                    changed = true;
                    break;
                }
            }
        }
    }

    // ---- loops ----

    fn find_loops(&mut self) {
        let n = self.blocks.len();
        let succs: Vec<Vec<BlockId>> = (0..n)
            .map(|b| {
                if self.merged[b] {
                    return Vec::new();
                }
                let mut all = self.succs(b);
                for h in self.cfg.exception_successors(b) {
                    if !all.contains(&h) {
                        all.push(h);
                    }
                }
                all
            })
            .collect();
        let idom = immediate_dominators(&succs, self.cfg.entry);
        let mut preds = vec![Vec::new(); n];
        for (u, targets) in succs.iter().enumerate() {
            if idom[u].is_some() {
                for &s in targets {
                    preds[s].push(u);
                }
            }
        }

        for u in 0..n {
            if idom[u].is_none() {
                continue;
            }
            for h in self.succs(u) {
                if !dominates(&idom, h, u) {
                    continue;
                }
                // Natural loop: everything reaching the latch without passing the header.
                let body = self.loops.entry(h).or_insert_with(|| BTreeSet::from([h]));
                let mut work = vec![u];
                while let Some(x) = work.pop() {
                    if !dominates(&idom, h, x) || !body.insert(x) {
                        continue;
                    }
                    work.extend(preds[x].iter().copied());
                }
                self.latches.entry(h).or_default().push(u);
            }
        }
        for (h, body) in &self.loops {
            trace!(header = h, blocks = body.len(), "found natural loop");
        }
    }
}

/// A finally body still to be removed from the head of the continuation
/// that follows the try statement at `index`.
struct PrefixStrip {
    index: usize,
    pattern: Vec<StructuredStmt>,
}

impl<'a> Structurer<'a> {
    fn fresh_label(&mut self) -> String {
        self.label_counter += 1;
        format!("label{}", self.label_counter)
    }

    fn label_of(&mut self, frame: usize) -> String {
        if let Some(label) = &self.frames[frame].label {
            return label.clone();
        }
        let label = self.fresh_label();
        self.frames[frame].label = Some(label.clone());
        label
    }

    fn is_jump_target(&self, b: BlockId) -> bool {
        self.frames
            .iter()
            .any(|f| f.break_target == Some(b) || f.continue_target == Some(b))
    }

    /// `break` / `continue` for a jump to `b`, when `b` is an enclosing target.
    fn jump_to(&mut self, b: BlockId) -> Option<StructuredStmt> {
        for i in (0..self.frames.len()).rev() {
            if self.frames[i].continue_target == Some(b) {
                let nearer_loop = self.frames[i + 1..].iter().any(|f| f.is_loop);
                let label = if nearer_loop { Some(self.label_of(i)) } else { None };
                return Some(StructuredStmt::Continue { label });
            }
            if self.frames[i].break_target == Some(b) {
                let innermost = i + 1 == self.frames.len();
                let label = if innermost { None } else { Some(self.label_of(i)) };
                return Some(StructuredStmt::Break { label });
            }
        }
        None
    }

    fn is_exit(&self, b: BlockId, stop: Option<BlockId>) -> bool {
        Some(b) == stop || self.visited[b] || self.merged[b] || self.is_jump_target(b)
    }

    fn goto_fallback(&mut self, target: BlockId, out: &mut Vec<StructuredStmt>, reason: &str) {
        let offset = self.cfg.block(target).start;
        warn!(offset, reason, "leaving region unstructured");
        out.push(StructuredStmt::UnstructuredGoto { target: offset });
        self.failures.push(ReconstructError::structuring(offset, reason));
        if !self.visited[target] && !self.pending.contains(&target) {
            self.pending.push(target);
        }
    }

    fn emit_block(&mut self, b: BlockId, out: &mut Vec<StructuredStmt>) {
        self.visited[b] = true;
        out.extend(
            self.blocks[b]
                .statements
                .iter()
                .map(|(stmt, span)| StructuredStmt::Simple {
                    stmt: stmt.clone(),
                    span: Some(*span),
                }),
        );
    }

    /// Structure the blocks from `start` until control reaches `stop`, leaves
    /// through an enclosing jump target, or ends.
    ///
    /// With `first` set, `start` itself is entered even if it is the stop or a
    /// jump target: constructs opening there are being built by the caller.
    fn sequence(&mut self, start: BlockId, stop: Option<BlockId>, first: bool) -> Vec<StructuredStmt> {
        let mut out = Vec::new();
        self.depth += 1;
        if self.depth > self.max_depth {
            self.goto_fallback(start, &mut out, "structuring depth limit exceeded");
            self.depth -= 1;
            return out;
        }

        let mut strips = Vec::new();
        let mut current = Some(start);
        let mut entering = first;
        while let Some(b) = current {
            if !entering {
                if Some(b) == stop {
                    break;
                }
                if let Some(jump) = self.jump_to(b) {
                    out.push(jump);
                    break;
                }
                if self.visited[b] || self.merged[b] {
                    self.goto_fallback(b, &mut out, "jump into an already structured region");
                    break;
                }
            }
            entering = false;
            current = self.structure_block(b, stop, &mut out, &mut strips);
        }

        for strip in strips.into_iter().rev() {
            let from = strip.index + 1;
            let to = from + strip.pattern.len();
            if to <= out.len() && erased(&out[from..to]) == strip.pattern {
                out.drain(from..to);
            }
        }
        self.depth -= 1;
        out
    }

    /// Emit whatever opens at `b` and return the block control continues at.
    fn structure_block(
        &mut self,
        b: BlockId,
        stop: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
        strips: &mut Vec<PrefixStrip>,
    ) -> Option<BlockId> {
        let unopened_loop = self.loops.contains_key(&b) && !self.opened_loops.contains(&b);
        if let Some(idx) = self.unopened_region_at(b) {
            if !unopened_loop || self.region_covers_loop(idx, b) {
                return self.structure_try(b, idx, stop, out, strips);
            }
        }
        if unopened_loop {
            return self.structure_loop(b, stop, out);
        }

        self.emit_block(b, out);
        match self.blocks[b].terminator.clone() {
            Terminator::Return | Terminator::Throw | Terminator::Ret => None,
            Terminator::FallThrough { target } | Terminator::Goto { target } => Some(target),
            Terminator::Jsr { return_to, .. } => return_to,
            Terminator::ConditionalBranch { taken, not_taken } => self.structure_if(b, taken, not_taken, stop, out),
            Terminator::Switch { default, cases } => self.structure_switch(b, default, &cases, stop, out),
        }
    }

    // ---- region graph ----

    /// Blocks every path from `entries` to the region exit passes through,
    /// nearest first. The exit is the sequence stop together with every
    /// structured block and enclosing jump target; blocks that only return
    /// or throw never reach it and do not constrain the result.
    ///
    /// When no entry reaches the exit at all, `return` counts as leaving the
    /// region, so arms meeting at a shared tail before returning still join.
    /// Throwing blocks never do: a rethrowing finally handler must not pull
    /// the join of its try statement past the code after it.
    fn post_dominator_chain(&self, entries: &[BlockId], stop: Option<BlockId>) -> Vec<BlockId> {
        self.exit_chain(entries, stop, false)
            .or_else(|| self.exit_chain(entries, stop, true))
            .unwrap_or_default()
    }

    /// `None` when no entry reaches the exit.
    fn exit_chain(&self, entries: &[BlockId], stop: Option<BlockId>, returns_exit: bool) -> Option<Vec<BlockId>> {
        let mut nodes: Vec<BlockId> = Vec::new();
        let mut index: BTreeMap<BlockId, usize> = BTreeMap::new();
        let mut work: Vec<BlockId> = entries.to_vec();
        while let Some(b) = work.pop() {
            if index.contains_key(&b) || self.is_exit(b, stop) {
                continue;
            }
            index.insert(b, nodes.len());
            nodes.push(b);
            work.extend(self.succs(b));
        }

        let sink = nodes.len();
        let fork = sink + 1;
        let local = |b: BlockId| index.get(&b).copied().unwrap_or(sink);
        // Reverse edges, so dominators from the sink are post-dominators.
        let mut reverse = vec![Vec::new(); nodes.len() + 2];
        for (i, &b) in nodes.iter().enumerate() {
            for s in self.succs(b) {
                let target = local(s);
                if !reverse[target].contains(&i) {
                    reverse[target].push(i);
                }
            }
            if returns_exit && matches!(self.blocks[b].terminator, Terminator::Return) {
                reverse[sink].push(i);
            }
        }
        for &e in entries {
            let target = local(e);
            if !reverse[target].contains(&fork) {
                reverse[target].push(fork);
            }
        }

        let ipdom = immediate_dominators(&reverse, sink);
        let mut chain = Vec::new();
        let mut x = Some(ipdom[fork]?);
        while let Some(node) = x {
            if node == sink {
                break;
            }
            chain.push(nodes[node]);
            x = ipdom[node];
        }
        Some(chain)
    }

    /// Control from `from` can arrive at `target` without leaving the region.
    fn reaches(&self, from: BlockId, target: Option<BlockId>) -> bool {
        let Some(target) = target else {
            return false;
        };
        let mut seen = BTreeSet::new();
        let mut work = vec![from];
        while let Some(b) = work.pop() {
            if b == target {
                return true;
            }
            if !seen.insert(b) || self.is_exit(b, None) {
                continue;
            }
            work.extend(self.succs(b));
        }
        false
    }

    // ---- conditionals ----

    fn structure_if(
        &mut self,
        b: BlockId,
        taken: BlockId,
        not_taken: BlockId,
        stop: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
    ) -> Option<BlockId> {
        let Some(condition) = self.blocks[b].branch.clone() else {
            self.goto_fallback(taken, out, "conditional branch without a condition");
            return Some(not_taken);
        };
        if taken == not_taken {
            if condition.has_side_effects() {
                out.push(StructuredStmt::simple(Stmt::ExprStmt(condition)));
            }
            return Some(taken);
        }

        if let Some(&join) = self.post_dominator_chain(&[taken, not_taken], stop).first() {
            let then_body = self.sequence(not_taken, Some(join), false);
            let else_body = self.sequence(taken, Some(join), false);
            push_if(out, condition, then_body, else_body);
            return Some(join);
        }

        // No join: an arm that never reaches the stop becomes an `if` without
        // `else`, and the other arm continues the sequence.
        if !self.reaches(not_taken, stop) {
            let then_body = self.sequence(not_taken, stop, false);
            push_if(out, condition, then_body, Vec::new());
            return Some(taken);
        }
        if !self.reaches(taken, stop) {
            let else_body = self.sequence(taken, stop, false);
            push_if(out, condition, Vec::new(), else_body);
            return Some(not_taken);
        }
        let then_body = self.sequence(not_taken, stop, false);
        let else_body = self.sequence(taken, stop, false);
        push_if(out, condition, then_body, else_body);
        None
    }

    // ---- switches ----

    fn structure_switch(
        &mut self,
        b: BlockId,
        default: BlockId,
        cases: &[(i32, BlockId)],
        stop: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
    ) -> Option<BlockId> {
        let Some(key) = self.blocks[b].branch.clone() else {
            self.goto_fallback(default, out, "switch without a key");
            return None;
        };
        let mut targets: Vec<BlockId> = cases.iter().map(|(_, t)| *t).collect();
        targets.push(default);
        targets.sort_unstable();
        targets.dedup();
        let follow = self.post_dominator_chain(&targets, stop).first().copied().or(stop);

        // (target, keys, is_default), in target order.
        let mut groups: Vec<(BlockId, Vec<i32>, bool)> = Vec::new();
        for &t in &targets {
            let keys: Vec<i32> = cases.iter().filter(|(_, ct)| *ct == t).map(|(k, _)| *k).collect();
            let is_default = t == default;
            if Some(t) == follow && (is_default || Some(default) == follow) {
                continue;
            }
            groups.push((t, keys, is_default));
        }

        let frame = self.frames.len();
        self.frames.push(JumpFrame {
            is_loop: false,
            break_target: follow,
            continue_target: None,
            label: None,
        });
        let mut switch_cases = Vec::with_capacity(groups.len());
        for (i, (target, keys, is_default)) in groups.iter().enumerate() {
            let last = i + 1 == groups.len();
            let body = if Some(*target) == follow {
                vec![StructuredStmt::Break { label: None }]
            } else {
                let next = groups.get(i + 1).map(|g| g.0).or(follow);
                self.sequence(*target, next, false)
            };
            let falls_through = !last && !ends_terminal(&body);
            switch_cases.push(SwitchCase {
                values: keys.iter().map(|k| SwitchValue::Int(*k)).collect(),
                is_default: *is_default,
                body,
                falls_through,
            });
        }
        let label = self.frames.pop().and_then(|f| f.label);
        debug_assert_eq!(self.frames.len(), frame);

        let stmt = StructuredStmt::Switch {
            expr: key,
            kind: SwitchKind::Int,
            cases: switch_cases,
        };
        out.push(labeled(label, stmt));
        follow
    }
}

fn labeled(label: Option<String>, stmt: StructuredStmt) -> StructuredStmt {
    match label {
        Some(label) => StructuredStmt::Labeled {
            label,
            body: vec![stmt],
        },
        None => stmt,
    }
}

/// `condition` selects `else_body`, the way a branch's taken edge does.
fn push_if(out: &mut Vec<StructuredStmt>, condition: Expr, then_body: Vec<StructuredStmt>, else_body: Vec<StructuredStmt>) {
    let stmt = match (then_body.is_empty(), else_body.is_empty()) {
        (true, true) => {
            if condition.has_side_effects() {
                out.push(StructuredStmt::simple(Stmt::ExprStmt(condition)));
            }
            return;
        }
        (false, true) => StructuredStmt::If {
            condition: negate_expr(condition),
            then_body,
            else_body: None,
        },
        (true, false) => StructuredStmt::If {
            condition,
            then_body: else_body,
            else_body: None,
        },
        (false, false) => StructuredStmt::If {
            condition: negate_expr(condition),
            then_body,
            else_body: Some(else_body),
        },
    };
    out.push(stmt);
}

/// Copies with offsets cleared, for structural comparison.
fn erased(stmts: &[StructuredStmt]) -> Vec<StructuredStmt> {
    let mut copy = stmts.to_vec();
    for s in &mut copy {
        s.erase_provenance();
    }
    copy
}

impl<'a> Structurer<'a> {
    // ---- try / catch / finally ----

    fn unopened_region_at(&self, b: BlockId) -> Option<usize> {
        (0..self.regions.len()).find(|&i| !self.opened_regions[i] && self.region_entry[i] == Some(b))
    }

    fn region_covers_loop(&self, idx: usize, header: BlockId) -> bool {
        let region = &self.regions[idx];
        self.loops
            .get(&header)
            .map_or(false, |body| body.iter().all(|&x| region.covers(self.cfg.block(x).start)))
    }

    fn handler_body(&mut self, handler: BlockId, end: Option<BlockId>) -> Vec<StructuredStmt> {
        if self.visited[handler] {
            let mut out = Vec::new();
            self.goto_fallback(handler, &mut out, "exception handler shared with another region");
            return out;
        }
        self.sequence(handler, end, true)
    }

    fn structure_try(
        &mut self,
        b: BlockId,
        idx: usize,
        stop: Option<BlockId>,
        out: &mut Vec<StructuredStmt>,
        strips: &mut Vec<PrefixStrip>,
    ) -> Option<BlockId> {
        self.opened_regions[idx] = true;
        let region = self.regions[idx].clone();
        let mut entries = vec![b];
        entries.extend(region.catches.iter().map(|c| c.handler));
        entries.extend(region.finally_handler);
        let join = self
            .post_dominator_chain(&entries, stop)
            .into_iter()
            .find(|j| !entries.contains(j) && !region.covers(self.cfg.block(*j).start));
        let end = join.or(stop);

        let mut try_body = self.sequence(b, end, true);
        let mut catches = Vec::with_capacity(region.catches.len());
        for handler in &region.catches {
            let mut body = self.handler_body(handler.handler, end);
            let var = take_catch_var(&mut body);
            catches.push(CatchClause {
                exception_types: handler.exception_types.clone(),
                var,
                body,
            });
        }

        let mut finally_body = None;
        if let Some(handler) = region.finally_handler {
            let mut body = self.handler_body(handler, end);
            match split_finally(&mut body) {
                Some(inner) => finally_body = Some(inner),
                None => {
                    let var = take_catch_var(&mut body);
                    catches.push(CatchClause {
                        exception_types: vec![THROWABLE.to_string()],
                        var,
                        body,
                    });
                }
            }
        }

        // The compiler copies the finally body onto every normal exit.
        let mut prefix = None;
        if let Some(pattern) = finally_body.as_deref().filter(|f| !f.is_empty()).map(erased) {
            let stripped = strip_suffix(&mut try_body, &pattern);
            strip_before_exits(&mut try_body, &pattern);
            for c in &mut catches {
                strip_suffix(&mut c.body, &pattern);
                strip_before_exits(&mut c.body, &pattern);
            }
            if !stripped && !ends_terminal(&try_body) {
                prefix = Some(pattern);
            }
        }

        trace!(
            start = region.start,
            end = region.end,
            catches = catches.len(),
            finally = finally_body.is_some(),
            "structured try region"
        );
        out.push(StructuredStmt::TryCatch {
            try_body,
            catches,
            finally_body,
        });
        fold_synchronized(out);
        if let Some(pattern) = prefix {
            strips.push(PrefixStrip {
                index: out.len() - 1,
                pattern,
            });
        }
        join
    }

    // ---- loops ----

    fn loop_shape(&self, h: BlockId, body: &BTreeSet<BlockId>, latches: &[BlockId]) -> LoopShape {
        let header = &self.blocks[h];
        let try_at_header = self.unopened_region_at(h).is_some();
        if header.statements.is_empty() && !try_at_header {
            if let (Terminator::ConditionalBranch { taken, not_taken }, Some(cond)) = (&header.terminator, &header.branch) {
                match (body.contains(taken), body.contains(not_taken)) {
                    (true, false) => {
                        return LoopShape::PreTest {
                            condition: cond.clone(),
                            body: *taken,
                            follow: *not_taken,
                        }
                    }
                    (false, true) => {
                        return LoopShape::PreTest {
                            condition: negate_expr(cond.clone()),
                            body: *not_taken,
                            follow: *taken,
                        }
                    }
                    _ => {}
                }
            }
        }
        if let [latch] = latches {
            let block = &self.blocks[*latch];
            if *latch == h && try_at_header {
                return LoopShape::Endless;
            }
            if let (Terminator::ConditionalBranch { taken, not_taken }, Some(cond)) = (&block.terminator, &block.branch) {
                if *taken == h && !body.contains(not_taken) {
                    return LoopShape::PostTest {
                        latch: *latch,
                        condition: cond.clone(),
                        follow: *not_taken,
                    };
                }
                if *not_taken == h && !body.contains(taken) {
                    return LoopShape::PostTest {
                        latch: *latch,
                        condition: negate_expr(cond.clone()),
                        follow: *taken,
                    };
                }
            }
        }
        LoopShape::Endless
    }

    fn structure_loop(&mut self, h: BlockId, stop: Option<BlockId>, out: &mut Vec<StructuredStmt>) -> Option<BlockId> {
        self.opened_loops.insert(h);
        let body = self.loops.get(&h).cloned().unwrap_or_default();
        let latches = self.latches.get(&h).cloned().unwrap_or_default();
        match self.loop_shape(h, &body, &latches) {
            LoopShape::PreTest {
                condition,
                body: entry,
                follow,
            } => self.pre_test_loop(h, condition, entry, follow, &latches, out),
            LoopShape::PostTest {
                latch,
                condition,
                follow,
            } => {
                self.frames.push(JumpFrame {
                    is_loop: true,
                    break_target: Some(follow),
                    continue_target: Some(latch),
                    label: None,
                });
                let mut body = if latch == h {
                    Vec::new()
                } else {
                    self.sequence(h, Some(latch), true)
                };
                self.emit_block(latch, &mut body);
                let label = self.frames.pop().and_then(|f| f.label);
                trace!(header = h, latch, "structured do-while loop");
                out.push(labeled(label, StructuredStmt::DoWhile { body, condition }));
                Some(follow)
            }
            LoopShape::Endless => {
                let follow = self.endless_follow(&body, stop);
                self.frames.push(JumpFrame {
                    is_loop: true,
                    break_target: follow,
                    continue_target: Some(h),
                    label: None,
                });
                let body = self.sequence(h, Some(h), true);
                let label = self.frames.pop().and_then(|f| f.label);
                trace!(header = h, ?follow, "structured endless loop");
                out.push(labeled(
                    label,
                    StructuredStmt::While {
                        condition: Expr::BooleanLiteral(true),
                        body,
                    },
                ));
                follow
            }
        }
    }

    fn pre_test_loop(
        &mut self,
        h: BlockId,
        condition: Expr,
        entry: BlockId,
        follow: BlockId,
        latches: &[BlockId],
        out: &mut Vec<StructuredStmt>,
    ) -> Option<BlockId> {
        self.visited[h] = true;
        let init_slot = match out.last().and_then(StructuredStmt::as_simple) {
            Some(Stmt::LocalStore { var, .. }) if mentions_slot(&condition, var.index) => Some(var.index),
            _ => None,
        };
        let update_block = init_slot.and_then(|slot| self.update_block(h, entry, latches, slot));
        let continue_target = update_block.unwrap_or(h);
        self.frames.push(JumpFrame {
            is_loop: true,
            break_target: Some(follow),
            continue_target: Some(continue_target),
            label: None,
        });
        let mut body = self.sequence(entry, Some(continue_target), false);
        let label = self.frames.pop().and_then(|f| f.label);

        let stmt = if let Some(u) = update_block {
            let mut update = Vec::new();
            self.emit_block(u, &mut update);
            StructuredStmt::For {
                init: out.pop().into_iter().collect(),
                condition,
                update,
                body,
            }
        } else if init_slot.map_or(false, |slot| ends_with_update(&body, slot))
            && !continues_loop(&body, label.as_deref(), false)
        {
            let update = body.pop().into_iter().collect();
            StructuredStmt::For {
                init: out.pop().into_iter().collect(),
                condition,
                update,
                body,
            }
        } else {
            StructuredStmt::While { condition, body }
        };
        trace!(header = h, follow, "structured pre-test loop");
        out.push(labeled(label, stmt));
        Some(follow)
    }

    /// The single latch of a counting loop when it holds nothing but the
    /// loop variable's update, reached by `continue`.
    fn update_block(&self, h: BlockId, entry: BlockId, latches: &[BlockId], slot: u16) -> Option<BlockId> {
        let [u] = latches else {
            return None;
        };
        let u = *u;
        let block = &self.blocks[u];
        let jumps_back = matches!(
            block.terminator,
            Terminator::Goto { target } | Terminator::FallThrough { target } if target == h
        );
        let only_updates = !block.statements.is_empty()
            && block
                .statements
                .iter()
                .all(|(s, _)| matches!(s, Stmt::Iinc { .. } | Stmt::LocalStore { .. }));
        let writes_slot = block
            .statements
            .iter()
            .any(|(s, _)| s.target_var().map_or(false, |v| v.index == slot));
        (u != h && u != entry && jumps_back && only_updates && writes_slot && !self.visited[u]).then_some(u)
    }

    /// Where control goes after a `while (true)` loop.
    fn endless_follow(&self, body: &BTreeSet<BlockId>, stop: Option<BlockId>) -> Option<BlockId> {
        let mut exits: Vec<BlockId> = Vec::new();
        for &n in body {
            for s in self.succs(n) {
                if !body.contains(&s) && !exits.contains(&s) {
                    exits.push(s);
                }
            }
        }
        exits.sort_unstable();
        if let Some(stop) = stop.filter(|s| exits.contains(s)) {
            return Some(stop);
        }
        let candidates: Vec<BlockId> = exits.into_iter().filter(|&e| !self.is_exit(e, stop)).collect();
        let last = body.iter().next_back().copied()?;
        let joins_all = |c: BlockId| {
            candidates
                .iter()
                .all(|&o| o == c || self.reaches_outside(o, c, body, stop))
        };

        let after: Vec<BlockId> = candidates.iter().copied().filter(|&c| c > last).collect();
        if let Some(c) = after.iter().copied().find(|&c| joins_all(c)) {
            return Some(c);
        }
        if let Some(&c) = after.first() {
            return Some(c);
        }
        // Exits inside the loop's code range that only return or throw stay inline.
        candidates
            .iter()
            .copied()
            .find(|&c| joins_all(c) && !self.terminates(c, body, stop))
    }

    fn reaches_outside(&self, from: BlockId, to: BlockId, body: &BTreeSet<BlockId>, stop: Option<BlockId>) -> bool {
        let mut seen = BTreeSet::new();
        let mut work = vec![from];
        while let Some(b) = work.pop() {
            if b == to {
                return true;
            }
            if body.contains(&b) || self.is_exit(b, stop) || !seen.insert(b) {
                continue;
            }
            work.extend(self.succs(b));
        }
        false
    }

    /// Every path from `from` ends in a return or throw.
    fn terminates(&self, from: BlockId, body: &BTreeSet<BlockId>, stop: Option<BlockId>) -> bool {
        let mut seen = BTreeSet::new();
        let mut work = vec![from];
        while let Some(b) = work.pop() {
            if body.contains(&b) || self.is_exit(b, stop) {
                return false;
            }
            if seen.insert(b) {
                work.extend(self.succs(b));
            }
        }
        true
    }

    // ---- fallback ----

    /// Give every goto target and every block nothing reached a labeled
    /// block of its own at the end of the method.
    fn drain_leftovers(&mut self, out: &mut Vec<StructuredStmt>) {
        self.frames.clear();
        loop {
            let next = if self.pending.is_empty() {
                let orphan = (0..self.blocks.len()).find(|&b| !self.visited[b] && !self.merged[b]);
                if let Some(b) = orphan {
                    let offset = self.cfg.block(b).start;
                    warn!(offset, "block not reached by structured control flow");
                    self.failures.push(ReconstructError::structuring(
                        offset,
                        "block not reached by structured control flow",
                    ));
                }
                orphan
            } else {
                Some(self.pending.remove(0))
            };
            let Some(b) = next else {
                break;
            };
            if self.visited[b] {
                continue;
            }
            self.depth = 0;
            let body = self.sequence(b, None, true);
            self.visited[b] = true;
            out.push(StructuredStmt::UnstructuredBlock {
                label: format!("block_{}", self.cfg.block(b).start),
                body,
            });
        }
    }
}

fn mentions_slot(expr: &Expr, slot: u16) -> bool {
    expr.any(|e| matches!(e, Expr::LocalLoad(v) if v.index == slot))
}

fn ends_with_update(body: &[StructuredStmt], slot: u16) -> bool {
    match body.last().and_then(StructuredStmt::as_simple) {
        Some(Stmt::Iinc { var, .. }) => var.index == slot,
        Some(Stmt::LocalStore { var, value }) => var.index == slot && mentions_slot(value, slot),
        _ => false,
    }
}

/// `stmts` holds a `continue` of the loop they form the body of.
fn continues_loop(stmts: &[StructuredStmt], label: Option<&str>, nested: bool) -> bool {
    stmts.iter().any(|s| match s {
        StructuredStmt::Continue { label: None } => !nested,
        StructuredStmt::Continue { label: Some(l) } => label == Some(l.as_str()),
        StructuredStmt::While { .. }
        | StructuredStmt::DoWhile { .. }
        | StructuredStmt::For { .. }
        | StructuredStmt::ForEach { .. } => s.bodies().iter().any(|b| continues_loop(b, label, true)),
        _ => s.bodies().iter().any(|b| continues_loop(b, label, nested)),
    })
}

/// Drop the leading `store caught exception` of a handler, returning the variable.
fn take_catch_var(body: &mut Vec<StructuredStmt>) -> Option<LocalVar> {
    let var = match body.first().and_then(StructuredStmt::as_simple) {
        Some(Stmt::LocalStore {
            var,
            value: Expr::CaughtException { .. },
        }) => var.clone(),
        _ => return None,
    };
    body.remove(0);
    Some(var)
}

/// `store t; F; throw t` → `F`.
fn split_finally(body: &mut Vec<StructuredStmt>) -> Option<Vec<StructuredStmt>> {
    if body.len() < 2 {
        return None;
    }
    let var = match body.first().and_then(StructuredStmt::as_simple) {
        Some(Stmt::LocalStore {
            var,
            value: Expr::CaughtException { .. },
        }) => var.clone(),
        _ => return None,
    };
    match body.last().and_then(StructuredStmt::as_simple) {
        Some(Stmt::Throw(Expr::LocalLoad(v))) if v.index == var.index => {}
        _ => return None,
    }
    let inner = &body[1..body.len() - 1];
    if list_mentions(inner, &var) {
        return None;
    }
    let inner = inner.to_vec();
    body.clear();
    Some(inner)
}

fn strip_suffix(body: &mut Vec<StructuredStmt>, pattern: &[StructuredStmt]) -> bool {
    if body.len() < pattern.len() {
        return false;
    }
    let from = body.len() - pattern.len();
    if erased(&body[from..]) != pattern {
        return false;
    }
    body.truncate(from);
    true
}

/// Remove finally copies placed before `return`, `break` and `continue`.
fn strip_before_exits(body: &mut Vec<StructuredStmt>, pattern: &[StructuredStmt]) {
    let len = pattern.len();
    walk_lists_mut(body, &mut |list| {
        let mut i = len;
        while i < list.len() {
            let exits = matches!(list[i], StructuredStmt::Break { .. } | StructuredStmt::Continue { .. })
                || matches!(list[i].as_simple(), Some(Stmt::Return(_)));
            if exits && erased(&list[i - len..i]) == pattern {
                list.drain(i - len..i);
                i = (i - len + 1).max(len);
            } else {
                i += 1;
            }
        }
    });
}

/// `monitorenter (t = obj); try { body } finally { monitorexit t }` →
/// `synchronized (obj) { body }`.
fn fold_synchronized(out: &mut Vec<StructuredStmt>) {
    let n = out.len();
    if n < 2 {
        return;
    }
    let lock = match &out[n - 1] {
        StructuredStmt::TryCatch {
            catches,
            finally_body: Some(finally),
            ..
        } if catches.is_empty() && finally.len() == 1 => match finally[0].as_simple() {
            Some(Stmt::Monitor {
                enter: false,
                object: Expr::LocalLoad(lock),
            }) => lock.index,
            _ => return,
        },
        _ => return,
    };
    let (object, consumed) = match out[n - 2].as_simple() {
        Some(Stmt::Monitor {
            enter: true,
            object: Expr::Assign { target, value },
        }) if matches!(target.as_ref(), Expr::LocalLoad(v) if v.index == lock) => (value.as_ref().clone(), 1),
        Some(Stmt::Monitor {
            enter: true,
            object: Expr::LocalLoad(v),
        }) if v.index == lock && n >= 3 => match out[n - 3].as_simple() {
            Some(Stmt::LocalStore { var, value }) if var.index == lock => (value.clone(), 2),
            _ => return,
        },
        _ => return,
    };
    let Some(StructuredStmt::TryCatch { try_body, .. }) = out.pop() else {
        return;
    };
    out.truncate(out.len() - consumed);
    trace!(slot = lock, "folded synchronized block");
    out.push(StructuredStmt::Synchronized { object, body: try_body });
}
