use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::error::{DecompileError, Result};
use crate::model::{Code, Instruction, Op};

use super::cfg_types::*;
use super::descriptor::{parse_method_descriptor, parse_type_descriptor};

/// Check the preconditions block splitting relies on: strictly increasing
/// offsets, jump and handler targets that land on instructions, and no
/// control falling off the end of the code.
pub fn validate_code(code: &Code, location: &str) -> Result<()> {
    let invalid = |message: String| DecompileError::invalid_input(location, message);
    let Some(last) = code.instructions.last() else {
        return Err(invalid("code attribute has no instructions".to_string()));
    };
    let offsets: BTreeSet<u32> = code.instructions.iter().map(|i| i.offset).collect();
    for pair in code.instructions.windows(2) {
        if pair[1].offset <= pair[0].offset {
            return Err(invalid(format!(
                "instruction offsets not increasing: {} then {}",
                pair[0].offset, pair[1].offset
            )));
        }
    }
    for insn in &code.instructions {
        for target in insn.op.targets() {
            if !offsets.contains(&target) {
                return Err(invalid(format!(
                    "branch at offset {} targets {}, which is not an instruction",
                    insn.offset, target
                )));
            }
        }
    }
    for insn in &code.instructions {
        if let Some(descriptor) = malformed_descriptor(&insn.op) {
            return Err(invalid(format!(
                "instruction at offset {} carries unparsable descriptor '{}'",
                insn.offset, descriptor
            )));
        }
    }
    if !last.op.ends_flow() {
        return Err(invalid(format!("control falls off the end of the code after offset {}", last.offset)));
    }
    for (idx, entry) in code.exception_table.iter().enumerate() {
        let bad_end = entry.end <= entry.start || (!offsets.contains(&entry.end) && entry.end <= last.offset);
        if !offsets.contains(&entry.start) || bad_end {
            return Err(invalid(format!(
                "exception table entry {} has an invalid range [{}, {})",
                idx, entry.start, entry.end
            )));
        }
        if !offsets.contains(&entry.handler) {
            return Err(invalid(format!(
                "exception table entry {} targets handler {}, which is not an instruction",
                idx, entry.handler
            )));
        }
    }
    Ok(())
}

fn malformed_descriptor(op: &Op) -> Option<&str> {
    let (descriptor, is_method) = match op {
        Op::GetStatic(f) | Op::PutStatic(f) | Op::GetField(f) | Op::PutField(f) => (f.descriptor.as_str(), false),
        Op::InvokeVirtual(m) | Op::InvokeSpecial(m) | Op::InvokeStatic(m) | Op::InvokeInterface(m) => {
            (m.descriptor.as_str(), true)
        }
        Op::InvokeDynamic(site) => (site.descriptor.as_str(), true),
        Op::MultiANewArray { descriptor, .. } => (descriptor.as_str(), false),
        _ => return None,
    };
    let valid = if is_method {
        parse_method_descriptor(descriptor).is_some()
    } else {
        parse_type_descriptor(descriptor).is_some()
    };
    (!valid).then_some(descriptor)
}

/// Build a control flow graph from a validated `Code` attribute.
///
/// Blocks unreachable from the entry (over normal and exception edges) are
/// dropped, and the survivors are numbered in offset order.
pub fn build_cfg(code: &Code) -> ControlFlowGraph {
    let insns = &code.instructions;
    let code_end = insns.last().map_or(0, |i| i.offset + i.op.encoded_len(i.offset));

    // Step 1: Identify block leaders
    let mut leaders = BTreeSet::new();
    if let Some(first) = insns.first() {
        leaders.insert(first.offset);
    }
    for (idx, insn) in insns.iter().enumerate() {
        leaders.extend(insn.op.targets());
        if insn.op.is_block_end() {
            if let Some(next) = insns.get(idx + 1) {
                leaders.insert(next.offset);
            }
        }
    }
    for entry in &code.exception_table {
        leaders.insert(entry.handler);
        leaders.insert(entry.start);
        leaders.insert(entry.end);
    }

    // Step 2: Split into raw blocks, indexed by leader order.
    let mut raw: Vec<(u32, u32, Vec<Instruction>)> = Vec::new();
    let mut current: Vec<Instruction> = Vec::new();
    for insn in insns {
        if leaders.contains(&insn.offset) && !current.is_empty() {
            let start = current[0].offset;
            raw.push((start, insn.offset, std::mem::take(&mut current)));
        }
        current.push(insn.clone());
    }
    if let Some(first) = current.first() {
        raw.push((first.offset, code_end, current));
    }
    let raw_at: BTreeMap<u32, usize> = raw.iter().enumerate().map(|(i, (start, _, _))| (*start, i)).collect();
    let at = |offset: u32| raw_at.get(&offset).copied().unwrap_or(0);

    let raw_terms: Vec<Terminator> = raw
        .iter()
        .enumerate()
        .map(|(i, (_, _, block))| {
            let next = if i + 1 < raw.len() { Some(i + 1) } else { None };
            match block.last().map(|insn| &insn.op) {
                Some(Op::Goto(t)) => Terminator::Goto { target: at(*t) },
                Some(Op::IfZero { target, .. })
                | Some(Op::IfIntCompare { target, .. })
                | Some(Op::IfRefCompare { target, .. })
                | Some(Op::IfNull { target, .. }) => Terminator::ConditionalBranch {
                    taken: at(*target),
                    not_taken: next.unwrap_or(i),
                },
                Some(Op::TableSwitch { default, low, targets }) => Terminator::Switch {
                    default: at(*default),
                    cases: targets
                        .iter()
                        .enumerate()
                        .map(|(k, t)| (low.wrapping_add(k as i32), at(*t)))
                        .collect(),
                },
                Some(Op::LookupSwitch { default, pairs }) => Terminator::Switch {
                    default: at(*default),
                    cases: pairs.iter().map(|(key, t)| (*key, at(*t))).collect(),
                },
                Some(Op::Return(_)) => Terminator::Return,
                Some(Op::Athrow) => Terminator::Throw,
                Some(Op::Jsr(t)) => Terminator::Jsr {
                    target: at(*t),
                    return_to: next,
                },
                Some(Op::Ret(_)) => Terminator::Ret,
                _ => match next {
                    Some(n) => Terminator::FallThrough { target: n },
                    None => Terminator::Return,
                },
            }
        })
        .collect();

    // Step 3: Reachability over normal and exception edges.
    let mut reachable = vec![false; raw.len()];
    let mut work = vec![0usize];
    while let Some(b) = work.pop() {
        if b >= raw.len() || reachable[b] {
            continue;
        }
        reachable[b] = true;
        work.extend(terminator_targets(&raw_terms[b]));
        let start = raw[b].0;
        for entry in &code.exception_table {
            if start >= entry.start && start < entry.end {
                work.push(at(entry.handler));
            }
        }
    }

    let mut renumber = vec![None; raw.len()];
    let mut next_id = 0;
    for (i, live) in reachable.iter().enumerate() {
        if *live {
            renumber[i] = Some(next_id);
            next_id += 1;
        }
    }
    let map = |raw_id: usize| renumber.get(raw_id).copied().flatten().unwrap_or(0);

    let mut blocks = Vec::with_capacity(next_id);
    let mut block_at = BTreeMap::new();
    for (i, ((start, end, instructions), term)) in raw.into_iter().zip(raw_terms).enumerate() {
        let Some(id) = renumber[i] else {
            trace!(offset = start, "pruning unreachable block");
            continue;
        };
        let terminator = match term {
            Terminator::FallThrough { target } => Terminator::FallThrough { target: map(target) },
            Terminator::Goto { target } => Terminator::Goto { target: map(target) },
            Terminator::ConditionalBranch { taken, not_taken } => Terminator::ConditionalBranch {
                taken: map(taken),
                not_taken: map(not_taken),
            },
            Terminator::Switch { default, cases } => Terminator::Switch {
                default: map(default),
                cases: cases.into_iter().map(|(k, t)| (k, map(t))).collect(),
            },
            Terminator::Jsr { target, return_to } => Terminator::Jsr {
                target: map(target),
                return_to: return_to.and_then(|r| renumber[r]),
            },
            other => other,
        };
        block_at.insert(start, id);
        blocks.push(BasicBlock {
            id,
            start,
            end,
            instructions,
            terminator,
        });
    }

    let exception_regions = code
        .exception_table
        .iter()
        .filter_map(|entry| {
            let handler = *block_at.get(&entry.handler)?;
            let covers_live = blocks.iter().any(|b| b.start >= entry.start && b.start < entry.end);
            covers_live.then(|| ExceptionRegion {
                start: entry.start,
                end: entry.end,
                handler,
                handler_offset: entry.handler,
                catch_type: entry.catch_type.clone(),
            })
        })
        .collect();

    let mut cfg = ControlFlowGraph {
        blocks,
        entry: 0,
        block_at,
        exception_regions,
        preds: Vec::new(),
    };
    let mut preds = vec![Vec::new(); cfg.blocks.len()];
    for b in 0..cfg.blocks.len() {
        for s in cfg.successors(b) {
            preds[s].push(b);
        }
    }
    cfg.preds = preds;
    cfg
}

fn terminator_targets(term: &Terminator) -> Vec<usize> {
    match term {
        Terminator::FallThrough { target } | Terminator::Goto { target } => vec![*target],
        Terminator::ConditionalBranch { taken, not_taken } => vec![*taken, *not_taken],
        Terminator::Switch { default, cases } => {
            let mut all: Vec<usize> = cases.iter().map(|(_, t)| *t).collect();
            all.push(*default);
            all
        }
        Terminator::Jsr { target, return_to } => {
            let mut all = vec![*target];
            all.extend(*return_to);
            all
        }
        Terminator::Ret | Terminator::Return | Terminator::Throw => Vec::new(),
    }
}
