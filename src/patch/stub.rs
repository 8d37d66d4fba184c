use std::str::FromStr;

use jdescriptor::MethodDescriptor;

use crate::error::PatchError;
use crate::ir::{CallKind, Instruction, MethodRef, Program};
use crate::patch::{PatchTarget, ReturnValue};

/// Registers live on entry: one per declared parameter plus the receiver of
/// instance methods.
pub(crate) fn parameter_count(target: &PatchTarget<'_>) -> Result<u32, PatchError> {
    let descriptor = MethodDescriptor::from_str(target.descriptor).map_err(|error| {
        PatchError::BadTargetDescriptor {
            descriptor: target.descriptor.to_string(),
            reason: error.to_string(),
        }
    })?;
    let declared = descriptor.parameter_types().len() as u32;
    Ok(if target.is_static { declared } else { declared + 1 })
}

fn single_block(parameters: u32, build: impl FnOnce(&mut Program) -> Vec<Instruction>) -> Program {
    let mut program = Program::new(parameters);
    let entry = program.create_block();
    let instructions = build(&mut program);
    program.blocks[entry.index()].instructions = instructions;
    program
}

pub(crate) fn return_stub(
    target: &PatchTarget<'_>,
    value: &ReturnValue,
) -> Result<Program, PatchError> {
    let parameters = parameter_count(target)?;
    match value {
        ReturnValue::Constant(constant) => Ok(single_block(parameters, |program| {
            let receiver = program.create_register();
            vec![
                Instruction::Const {
                    receiver,
                    value: constant.clone(),
                },
                Instruction::Exit {
                    value: Some(receiver),
                },
            ]
        })),
        ReturnValue::Parameter(index) => {
            let program = Program::new(parameters);
            let register = program.parameter(*index).ok_or_else(|| {
                PatchError::invariant(
                    0,
                    format!("stub returns parameter {index} but the method has {parameters}"),
                )
            })?;
            Ok(single_block(parameters, |_| {
                vec![Instruction::Exit {
                    value: Some(register),
                }]
            }))
        }
    }
}

pub(crate) fn void_stub(target: &PatchTarget<'_>) -> Result<Program, PatchError> {
    Ok(single_block(parameter_count(target)?, |_| {
        vec![Instruction::Exit { value: None }]
    }))
}

/// `throw new <exception>()`.
pub(crate) fn throw_stub(target: &PatchTarget<'_>, exception: &str) -> Result<Program, PatchError> {
    Ok(single_block(parameter_count(target)?, |program| {
        let instance = program.create_register();
        vec![
            Instruction::Construct {
                receiver: instance,
                class: exception.to_string(),
            },
            Instruction::Invoke {
                receiver: None,
                kind: CallKind::Special,
                method: MethodRef::new(exception, "<init>", "()V"),
                instance: Some(instance),
                arguments: Vec::new(),
            },
            Instruction::Raise {
                exception: instance,
            },
        ]
    }))
}
