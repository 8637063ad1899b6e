use crate::error::{DecompileError, Result};
use crate::model::{Code, LocalVariable, MethodModel, Op};

use super::descriptor::{parse_method_descriptor, parse_type_descriptor, JvmType};

/// Per-method facts shared by every pipeline stage.
pub struct MethodContext<'a> {
    pub class_name: &'a str,
    pub method: &'a MethodModel,
    pub code: &'a Code,
    pub params: Vec<JvmType>,
    pub return_type: JvmType,
    pub is_static: bool,
    /// Slot of each declared parameter (`this` excluded).
    pub param_slots: Vec<u16>,
    /// Slot 0 still holds `this` everywhere (instance method, never stored to).
    pub this_available: bool,
    /// First slot above every bytecode slot; synthesized temporaries start here.
    pub temp_base: u16,
}

impl<'a> MethodContext<'a> {
    pub fn new(class_name: &'a str, method: &'a MethodModel, code: &'a Code) -> Result<Self> {
        let (params, return_type) = parse_method_descriptor(&method.descriptor).ok_or_else(|| {
            DecompileError::invalid_input(
                format!("{}.{}", class_name, method.name),
                format!("unparsable method descriptor '{}'", method.descriptor),
            )
        })?;
        let is_static = method.is_static();
        let mut slot: u16 = if is_static { 0 } else { 1 };
        let mut param_slots = Vec::with_capacity(params.len());
        for p in &params {
            param_slots.push(slot);
            slot = slot.saturating_add(if p.is_wide() { 2 } else { 1 });
        }

        let mut max_slot = slot;
        let mut this_stored = false;
        for insn in &code.instructions {
            let touched = match &insn.op {
                Op::Load { kind, slot } => Some(slot.saturating_add(if kind.is_wide() { 2 } else { 1 })),
                Op::Store { kind, slot } => {
                    this_stored |= *slot == 0;
                    Some(slot.saturating_add(if kind.is_wide() { 2 } else { 1 }))
                }
                Op::Iinc { slot, .. } => {
                    this_stored |= *slot == 0;
                    Some(slot.saturating_add(1))
                }
                Op::Ret(slot) => Some(slot.saturating_add(1)),
                _ => None,
            };
            if let Some(top) = touched {
                max_slot = max_slot.max(top);
            }
        }
        for lv in code.local_variables.iter().flatten() {
            max_slot = max_slot.max(lv.slot.saturating_add(1));
        }

        Ok(Self {
            class_name,
            method,
            code,
            params,
            return_type,
            is_static,
            param_slots,
            this_available: !is_static && !this_stored,
            temp_base: max_slot,
        })
    }

    pub fn location(&self) -> String {
        format!("{}.{}{}", self.class_name, self.method.name, self.method.descriptor)
    }

    /// Index of the declared parameter stored in `slot`.
    pub fn param_index(&self, slot: u16) -> Option<usize> {
        self.param_slots.iter().position(|s| *s == slot)
    }

    pub fn is_this_slot(&self, slot: u16) -> bool {
        slot == 0 && self.this_available
    }

    pub fn is_temp_slot(&self, slot: u16) -> bool {
        slot >= self.temp_base
    }

    /// LVT entry for `slot` in scope at `offset`.
    pub fn lvt_entry(&self, slot: u16, offset: u32) -> Option<&'a LocalVariable> {
        self.code
            .local_variables
            .as_ref()?
            .iter()
            .find(|lv| lv.slot == slot && lv.covers(offset))
    }

    /// LVT entry for a store at `offset`. A variable's scope usually starts at
    /// the instruction after its first store.
    pub fn lvt_for_store(&self, slot: u16, offset: u32) -> Option<&'a LocalVariable> {
        self.lvt_entry(slot, offset)
            .or_else(|| self.lvt_entry(slot, self.code.next_offset(offset)?))
    }

    /// Declared type of an LVT entry.
    pub fn lvt_type(lv: &LocalVariable) -> Option<JvmType> {
        parse_type_descriptor(&lv.descriptor)
    }

    pub fn line_at(&self, offset: u32) -> Option<u32> {
        self.code.line_at(offset)
    }

    /// Declared type of a parameter slot.
    pub fn param_type(&self, slot: u16) -> Option<&JvmType> {
        self.param_index(slot).map(|i| &self.params[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CodeBuilder, MethodAccessFlags, ValueKind};

    #[test]
    fn test_slots_and_temp_base() {
        let mut b = CodeBuilder::new();
        b.load(ValueKind::Long, 1).store(ValueKind::Long, 4).return_void();
        let code = b.build().unwrap();
        let method = MethodModel::new("m", "(JI)V", MethodAccessFlags::PUBLIC);
        let ctx = MethodContext::new("Test", &method, &code).unwrap();
        assert_eq!(ctx.param_slots, vec![1, 3]);
        assert_eq!(ctx.temp_base, 6);
        assert!(ctx.is_this_slot(0));
        assert_eq!(ctx.param_type(3), Some(&JvmType::Int));
    }

    #[test]
    fn test_bad_descriptor() {
        let code = CodeBuilder::new().return_void().build().unwrap();
        let method = MethodModel::new("m", "(X)V", MethodAccessFlags::STATIC);
        assert!(MethodContext::new("Test", &method, &code).is_err());
    }
}
