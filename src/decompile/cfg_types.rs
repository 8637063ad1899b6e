use std::collections::BTreeMap;
use std::fmt::Write;

use crate::model::Instruction;

/// Dense block index; blocks are numbered in offset order after pruning.
pub type BlockId = usize;

/// How a basic block ends.
#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    /// The next block starts right after this one.
    FallThrough { target: BlockId },
    Goto { target: BlockId },
    ConditionalBranch { taken: BlockId, not_taken: BlockId },
    /// `cases` keeps the operand order: `(key, target)`.
    Switch { default: BlockId, cases: Vec<(i32, BlockId)> },
    Jsr { target: BlockId, return_to: Option<BlockId> },
    Ret,
    Return,
    Throw,
}

/// Edge classification, used by the structurer and the DOT dump.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    FallThrough,
    Taken,
    NotTaken,
    Jump,
    Switch,
    Exception,
}

/// A basic block in the CFG.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub id: BlockId,
    /// Offset of the first instruction.
    pub start: u32,
    /// Offset one past the last instruction.
    pub end: u32,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn last_offset(&self) -> u32 {
        self.instructions.last().map_or(self.start, |i| i.offset)
    }
}

/// One exception table entry, with the handler resolved to its block.
#[derive(Clone, Debug, PartialEq)]
pub struct ExceptionRegion {
    pub start: u32,
    pub end: u32,
    pub handler: BlockId,
    pub handler_offset: u32,
    pub catch_type: Option<String>,
}

impl ExceptionRegion {
    pub fn covers(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// The control flow graph for a single method.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    pub blocks: Vec<BasicBlock>,
    pub entry: BlockId,
    /// Start offset → block.
    pub block_at: BTreeMap<u32, BlockId>,
    /// Exception table order.
    pub exception_regions: Vec<ExceptionRegion>,
    pub(crate) preds: Vec<Vec<BlockId>>,
}

impl ControlFlowGraph {
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    /// Normal successor edges, in terminator operand order.
    pub fn edges(&self, id: BlockId) -> Vec<(BlockId, EdgeKind)> {
        match &self.blocks[id].terminator {
            Terminator::FallThrough { target } => vec![(*target, EdgeKind::FallThrough)],
            Terminator::Goto { target } => vec![(*target, EdgeKind::Jump)],
            Terminator::ConditionalBranch { taken, not_taken } => {
                vec![(*taken, EdgeKind::Taken), (*not_taken, EdgeKind::NotTaken)]
            }
            Terminator::Switch { default, cases } => {
                let mut all: Vec<(BlockId, EdgeKind)> = cases.iter().map(|(_, t)| (*t, EdgeKind::Switch)).collect();
                all.push((*default, EdgeKind::Switch));
                all
            }
            Terminator::Jsr { target, return_to } => {
                let mut all = vec![(*target, EdgeKind::Jump)];
                all.extend(return_to.map(|r| (r, EdgeKind::Jump)));
                all
            }
            Terminator::Ret | Terminator::Return | Terminator::Throw => Vec::new(),
        }
    }

    /// Distinct normal successors, in first-seen order.
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        let mut succs: Vec<BlockId> = Vec::new();
        for (target, _) in self.edges(id) {
            if !succs.contains(&target) {
                succs.push(target);
            }
        }
        succs
    }

    /// Handlers whose range covers this block, in table order, deduplicated.
    pub fn exception_successors(&self, id: BlockId) -> Vec<BlockId> {
        let start = self.blocks[id].start;
        let mut succs = Vec::new();
        for region in &self.exception_regions {
            if region.covers(start) && !succs.contains(&region.handler) {
                succs.push(region.handler);
            }
        }
        succs
    }

    /// Normal and exception successors.
    pub fn all_successors(&self, id: BlockId) -> Vec<BlockId> {
        let mut succs = self.successors(id);
        for h in self.exception_successors(id) {
            if !succs.contains(&h) {
                succs.push(h);
            }
        }
        succs
    }

    /// Normal predecessors, in block order.
    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        &self.preds[id]
    }

    /// Blocks with an exception edge into `handler`.
    pub fn exception_predecessors(&self, handler: BlockId) -> Vec<BlockId> {
        (0..self.blocks.len())
            .filter(|&b| self.exception_successors(b).contains(&handler))
            .collect()
    }

    pub fn is_handler(&self, id: BlockId) -> bool {
        self.exception_regions.iter().any(|r| r.handler == id)
    }

    /// Block ids in reverse postorder over normal and exception edges.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        if self.blocks.is_empty() {
            return Vec::new();
        }
        let mut visited = vec![false; self.blocks.len()];
        let mut postorder = Vec::with_capacity(self.blocks.len());
        // Iterative DFS: (block, next successor index).
        let mut stack = vec![(self.entry, 0usize)];
        visited[self.entry] = true;
        while let Some((block, idx)) = stack.pop() {
            let succs = self.all_successors(block);
            if idx < succs.len() {
                stack.push((block, idx + 1));
                let next = succs[idx];
                if !visited[next] {
                    visited[next] = true;
                    stack.push((next, 0));
                }
            } else {
                postorder.push(block);
            }
        }
        postorder.reverse();
        postorder
    }

    /// Generate a DOT graph for visualization.
    pub fn to_dot(&self) -> String {
        let mut dot = String::from("digraph CFG {\n");
        for block in &self.blocks {
            let _ = writeln!(
                dot,
                "  B{} [label=\"B{} [{}..{}) {} instrs\"];",
                block.id,
                block.id,
                block.start,
                block.end,
                block.instructions.len()
            );
            for (succ, kind) in self.edges(block.id) {
                let _ = writeln!(dot, "  B{} -> B{} [label=\"{:?}\"];", block.id, succ, kind);
            }
            for handler in self.exception_successors(block.id) {
                let _ = writeln!(dot, "  B{} -> B{} [style=dashed, label=\"catch\"];", block.id, handler);
            }
        }
        dot.push_str("}\n");
        dot
    }
}
