use crate::descriptor::{rewrite_descriptor, rewrite_method_descriptor};
use crate::error::PatchError;
use crate::ir::{FieldRef, Instruction, Program};
use crate::rename::NameMapper;

fn replace_name<M: NameMapper + ?Sized>(name: &mut String, mapper: &M) -> bool {
    let mapped = mapper.map_name(name);
    if mapped == name.as_str() {
        return false;
    }
    *name = mapped.into_owned();
    true
}

fn replace_descriptor(
    descriptor: &mut String,
    rewritten: String,
) -> bool {
    if *descriptor == rewritten {
        return false;
    }
    *descriptor = rewritten;
    true
}

fn replace_field<M: NameMapper + ?Sized>(field: &mut FieldRef, mapper: &M) -> Result<bool, PatchError> {
    let rewritten = rewrite_descriptor(&field.descriptor, mapper)?;
    Ok(replace_name(&mut field.class, mapper) | replace_descriptor(&mut field.descriptor, rewritten))
}

/// Redirects constructions, calls and field accesses from replaced classes
/// to their substitutes, including class names inside descriptors.
pub fn replace_classes<M: NameMapper + ?Sized>(program: &mut Program, mapper: &M) -> Result<bool, PatchError> {
    let mut changed = false;
    for block in &mut program.blocks {
        for instruction in &mut block.instructions {
            changed |= match instruction {
                Instruction::Construct { class, .. } => replace_name(class, mapper),
                Instruction::Invoke { method, .. } => {
                    let rewritten = rewrite_method_descriptor(&method.descriptor, mapper)?;
                    replace_name(&mut method.class, mapper)
                        | replace_descriptor(&mut method.descriptor, rewritten)
                }
                Instruction::GetField { field, .. } | Instruction::PutField { field, .. } => {
                    replace_field(field, mapper)?
                }
                _ => false,
            };
        }
    }
    Ok(changed)
}
