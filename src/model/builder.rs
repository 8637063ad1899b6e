use crate::error::{DecompileError, Result};

use super::instruction::*;
use super::types::{Code, ExceptionHandler, LineNumber, LocalVariable};

/// A position in a [`CodeBuilder`] stream, bound with [`CodeBuilder::bind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Label(usize);

struct PendingLocal {
    start: Label,
    end: Label,
    slot: u16,
    name: String,
    descriptor: String,
    signature: Option<String>,
}

/// Assembles a [`Code`] attribute from resolved ops.
///
/// Jump operands name labels; `build` lays out JVM-sized offsets and patches
/// every target, so forward references are fine.
///
/// ```rust
/// use classfile_decompiler::model::{CodeBuilder, Condition, ValueKind};
///
/// let mut b = CodeBuilder::new();
/// let done = b.new_label();
/// b.load(ValueKind::Int, 0);
/// b.if_zero(Condition::Eq, done);
/// b.iconst(1);
/// b.return_value(ValueKind::Int);
/// b.bind(done);
/// b.iconst(0);
/// b.return_value(ValueKind::Int);
/// let code = b.build().unwrap();
/// assert_eq!(code.instructions.len(), 6);
/// ```
#[derive(Default)]
pub struct CodeBuilder {
    ops: Vec<(Op, bool)>,
    labels: Vec<Option<usize>>,
    handlers: Vec<(Label, Label, Label, Option<String>)>,
    locals: Vec<PendingLocal>,
    lines: Vec<(usize, u32)>,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next emitted instruction.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.ops.len());
        self
    }

    /// A fresh label bound to the next emitted instruction.
    pub fn here(&mut self) -> Label {
        let label = self.new_label();
        self.bind(label);
        label
    }

    /// Emit an op without jump operands.
    pub fn op(&mut self, op: Op) -> &mut Self {
        self.ops.push((op, false));
        self
    }

    /// Emit an op whose jump operands hold [`Label`] indices instead of offsets.
    pub fn jump_op(&mut self, op: Op) -> &mut Self {
        self.ops.push((op, true));
        self
    }

    /// Attach a source line to the next emitted instruction.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.lines.push((self.ops.len(), line));
        self
    }

    pub fn handler(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> &mut Self {
        self.handlers.push((start, end, handler, catch_type.map(str::to_string)));
        self
    }

    pub fn local_variable(
        &mut self,
        start: Label,
        end: Label,
        slot: u16,
        name: &str,
        descriptor: &str,
        signature: Option<&str>,
    ) -> &mut Self {
        self.locals.push(PendingLocal {
            start,
            end,
            slot,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            signature: signature.map(str::to_string),
        });
        self
    }

    // ---- constants and slots ----

    pub fn iconst(&mut self, value: i32) -> &mut Self {
        self.op(Op::Const(Constant::Int(value)))
    }

    pub fn lconst(&mut self, value: i64) -> &mut Self {
        self.op(Op::Const(Constant::Long(value)))
    }

    pub fn ldc_string(&mut self, value: &str) -> &mut Self {
        self.op(Op::Const(Constant::String(value.to_string())))
    }

    pub fn aconst_null(&mut self) -> &mut Self {
        self.op(Op::AconstNull)
    }

    pub fn load(&mut self, kind: ValueKind, slot: u16) -> &mut Self {
        self.op(Op::Load { kind, slot })
    }

    pub fn store(&mut self, kind: ValueKind, slot: u16) -> &mut Self {
        self.op(Op::Store { kind, slot })
    }

    pub fn iinc(&mut self, slot: u16, amount: i32) -> &mut Self {
        self.op(Op::Iinc { slot, amount })
    }

    pub fn arith(&mut self, op: ArithOp, kind: ValueKind) -> &mut Self {
        self.op(Op::Arith { op, kind })
    }

    // ---- fields and calls ----

    pub fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.op(Op::GetField(FieldRef::new(owner, name, descriptor)))
    }

    pub fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.op(Op::PutField(FieldRef::new(owner, name, descriptor)))
    }

    pub fn get_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.op(Op::GetStatic(FieldRef::new(owner, name, descriptor)))
    }

    pub fn put_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.op(Op::PutStatic(FieldRef::new(owner, name, descriptor)))
    }

    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.op(Op::InvokeVirtual(MethodRef::new(owner, name, descriptor)))
    }

    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.op(Op::InvokeSpecial(MethodRef::new(owner, name, descriptor)))
    }

    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.op(Op::InvokeStatic(MethodRef::new(owner, name, descriptor)))
    }

    pub fn invoke_interface(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut Self {
        self.op(Op::InvokeInterface(MethodRef::interface(owner, name, descriptor)))
    }

    pub fn new_object(&mut self, class: &str) -> &mut Self {
        self.op(Op::New(class.to_string()))
    }

    pub fn check_cast(&mut self, class: &str) -> &mut Self {
        self.op(Op::CheckCast(class.to_string()))
    }

    // ---- control flow ----

    pub fn if_zero(&mut self, cond: Condition, target: Label) -> &mut Self {
        self.jump_op(Op::IfZero { cond, target: target.0 as u32 })
    }

    pub fn if_icmp(&mut self, cond: Condition, target: Label) -> &mut Self {
        self.jump_op(Op::IfIntCompare { cond, target: target.0 as u32 })
    }

    pub fn if_acmp(&mut self, cond: Condition, target: Label) -> &mut Self {
        self.jump_op(Op::IfRefCompare { cond, target: target.0 as u32 })
    }

    pub fn if_null(&mut self, is_null: bool, target: Label) -> &mut Self {
        self.jump_op(Op::IfNull { is_null, target: target.0 as u32 })
    }

    pub fn goto(&mut self, target: Label) -> &mut Self {
        self.jump_op(Op::Goto(target.0 as u32))
    }

    pub fn table_switch(&mut self, low: i32, targets: &[Label], default: Label) -> &mut Self {
        self.jump_op(Op::TableSwitch {
            default: default.0 as u32,
            low,
            targets: targets.iter().map(|l| l.0 as u32).collect(),
        })
    }

    pub fn lookup_switch(&mut self, pairs: &[(i32, Label)], default: Label) -> &mut Self {
        self.jump_op(Op::LookupSwitch {
            default: default.0 as u32,
            pairs: pairs.iter().map(|(k, l)| (*k, l.0 as u32)).collect(),
        })
    }

    pub fn return_void(&mut self) -> &mut Self {
        self.op(Op::Return(None))
    }

    pub fn return_value(&mut self, kind: ValueKind) -> &mut Self {
        self.op(Op::Return(Some(kind)))
    }

    pub fn athrow(&mut self) -> &mut Self {
        self.op(Op::Athrow)
    }

    /// Lay out offsets and resolve labels.
    pub fn build(&self) -> Result<Code> {
        let mut offsets = Vec::with_capacity(self.ops.len() + 1);
        let mut offset = 0u32;
        for (op, _) in &self.ops {
            offsets.push(offset);
            offset += op.encoded_len(offset);
        }
        // A label bound after the last instruction resolves to the code length.
        offsets.push(offset);

        let resolve = |label: usize| -> Result<u32> {
            self.labels
                .get(label)
                .copied()
                .flatten()
                .map(|idx| offsets[idx])
                .ok_or_else(|| DecompileError::InvalidInput {
                    location: "code builder".to_string(),
                    message: format!("label {} was never bound", label),
                })
        };

        let mut instructions = Vec::with_capacity(self.ops.len());
        for (idx, (op, has_labels)) in self.ops.iter().enumerate() {
            let mut op = op.clone();
            if *has_labels {
                let mut failure = None;
                op.map_targets(|label| match resolve(label as usize) {
                    Ok(target) => target,
                    Err(e) => {
                        failure = Some(e);
                        0
                    }
                });
                if let Some(e) = failure {
                    return Err(e);
                }
            }
            instructions.push(Instruction {
                offset: offsets[idx],
                op,
            });
        }

        let mut exception_table = Vec::with_capacity(self.handlers.len());
        for (start, end, handler, catch_type) in &self.handlers {
            exception_table.push(ExceptionHandler {
                start: resolve(start.0)?,
                end: resolve(end.0)?,
                handler: resolve(handler.0)?,
                catch_type: catch_type.clone(),
            });
        }

        let local_variables = if self.locals.is_empty() {
            None
        } else {
            let mut table = Vec::with_capacity(self.locals.len());
            for local in &self.locals {
                let start = resolve(local.start.0)?;
                let end = resolve(local.end.0)?;
                table.push(LocalVariable {
                    start,
                    length: end.saturating_sub(start),
                    name: local.name.clone(),
                    descriptor: local.descriptor.clone(),
                    signature: local.signature.clone(),
                    slot: local.slot,
                });
            }
            Some(table)
        };

        let line_numbers = self
            .lines
            .iter()
            .map(|(idx, line)| LineNumber {
                start: offsets[*idx],
                line: *line,
            })
            .collect();

        Ok(Code {
            instructions,
            exception_table,
            local_variables,
            line_numbers,
        })
    }
}
