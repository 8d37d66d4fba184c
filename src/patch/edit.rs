use std::collections::HashSet;

use crate::descriptor::MethodType;
use crate::error::PatchError;
use crate::ir::{Constant, Instruction, Program, Register};

fn used_registers(program: &Program) -> HashSet<Register> {
    let mut used = HashSet::new();
    for block in &program.blocks {
        for phi in &block.phis {
            used.extend(phi.incomings.iter().map(|incoming| incoming.value));
        }
        for instruction in &block.instructions {
            used.extend(instruction.uses());
        }
    }
    used
}

/// Removes every call to `class.method`, whatever its descriptor. A call
/// whose result is still read is replaced by the default value of its
/// return type. Control flow is never altered. Nothing is modified unless
/// every block could be rewritten.
pub(crate) fn delete_calls(program: &mut Program, class: &str, method: &str) -> Result<bool, PatchError> {
    let used = used_registers(program);
    let mut changed = false;
    let mut rewritten = Vec::with_capacity(program.blocks.len());
    for (index, block) in program.blocks.iter().enumerate() {
        let mut instructions = Vec::with_capacity(block.instructions.len());
        for instruction in &block.instructions {
            let Instruction::Invoke {
                receiver,
                method: target,
                ..
            } = instruction
            else {
                instructions.push(instruction.clone());
                continue;
            };
            if target.class != class || target.name != method {
                instructions.push(instruction.clone());
                continue;
            }
            changed = true;
            let Some(receiver) = receiver.filter(|receiver| used.contains(receiver)) else {
                continue;
            };
            let return_type = MethodType::parse(&target.descriptor)?.return_type;
            let value = Constant::default_for(&return_type).ok_or_else(|| {
                PatchError::invariant(
                    index as u32,
                    format!("void call {}.{} has a result", class, method),
                )
            })?;
            instructions.push(Instruction::Const { receiver, value });
        }
        rewritten.push(instructions);
    }
    for (block, instructions) in program.blocks.iter_mut().zip(rewritten) {
        block.instructions = instructions;
    }
    Ok(changed)
}

/// Replaces every read of a field named `field` by `value`.
pub(crate) fn replace_field_reads(program: &mut Program, field: &str, value: &Constant) -> bool {
    let mut changed = false;
    for block in &mut program.blocks {
        for instruction in &mut block.instructions {
            if let Instruction::GetField {
                receiver,
                field: reference,
                ..
            } = instruction
                && reference.name == field
            {
                *instruction = Instruction::Const {
                    receiver: *receiver,
                    value: value.clone(),
                };
                changed = true;
            }
        }
    }
    changed
}
