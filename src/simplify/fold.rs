use std::collections::HashMap;

use crate::ir::{
    BinaryCondition, BlockId, BranchCondition, Constant, Instruction, Program, Register,
};
use crate::simplify::Pass;

/// Turns branches with a statically known outcome into jumps.
pub struct ConstantConditionFold;

impl Pass for ConstantConditionFold {
    fn name(&self) -> &'static str {
        "constant condition folding"
    }

    fn run(&self, program: &mut Program) -> bool {
        let constants: HashMap<Register, Constant> = program
            .blocks
            .iter()
            .flat_map(|block| &block.instructions)
            .filter_map(|instruction| match instruction {
                Instruction::Const { receiver, value } => Some((*receiver, value.clone())),
                _ => None,
            })
            .collect();

        let mut changed = false;
        let mut abandoned: Vec<(BlockId, BlockId)> = Vec::new();
        for (index, block) in program.blocks.iter_mut().enumerate() {
            let Some(terminator) = block.terminator_mut() else {
                continue;
            };
            let Some((target, dropped)) = decide(terminator, &constants) else {
                continue;
            };
            *terminator = Instruction::Jump { target };
            changed = true;
            if let Some(dropped) = dropped {
                abandoned.push((BlockId(index as u32), dropped));
            }
        }

        for (source, successor) in abandoned {
            if let Some(block) = program.block_mut(successor) {
                for phi in &mut block.phis {
                    phi.incomings.retain(|incoming| incoming.source != source);
                }
            }
        }
        changed
    }
}

/// Chosen target and, when the other edge disappears, the abandoned block.
fn decide(
    terminator: &Instruction,
    constants: &HashMap<Register, Constant>,
) -> Option<(BlockId, Option<BlockId>)> {
    let (outcome, consequent, alternative) = match terminator {
        Instruction::Branch {
            consequent,
            alternative,
            ..
        }
        | Instruction::BinaryBranch {
            consequent,
            alternative,
            ..
        } if consequent == alternative => return Some((*consequent, None)),
        Instruction::Branch {
            condition,
            operand,
            consequent,
            alternative,
        } => (
            unary(*condition, constants.get(operand)?)?,
            *consequent,
            *alternative,
        ),
        Instruction::BinaryBranch {
            condition,
            first,
            second,
            consequent,
            alternative,
        } => {
            let outcome = if first == second {
                same_operand(*condition)
            } else {
                binary(*condition, constants.get(first)?, constants.get(second)?)?
            };
            (outcome, *consequent, *alternative)
        }
        _ => return None,
    };
    if outcome {
        Some((consequent, Some(alternative)))
    } else {
        Some((alternative, Some(consequent)))
    }
}

fn unary(condition: BranchCondition, value: &Constant) -> Option<bool> {
    match (condition, value) {
        (BranchCondition::Zero, Constant::Int(value)) => Some(*value == 0),
        (BranchCondition::NonZero, Constant::Int(value)) => Some(*value != 0),
        (BranchCondition::Null, Constant::Null) => Some(true),
        (BranchCondition::NotNull, Constant::Null) => Some(false),
        (BranchCondition::Null, Constant::String(_)) => Some(false),
        (BranchCondition::NotNull, Constant::String(_)) => Some(true),
        _ => None,
    }
}

fn binary(condition: BinaryCondition, first: &Constant, second: &Constant) -> Option<bool> {
    match (first, second) {
        (Constant::Int(first), Constant::Int(second)) => match condition {
            BinaryCondition::Equal => Some(first == second),
            BinaryCondition::NotEqual => Some(first != second),
            BinaryCondition::Less => Some(first < second),
            BinaryCondition::GreaterOrEqual => Some(first >= second),
            BinaryCondition::Greater => Some(first > second),
            BinaryCondition::LessOrEqual => Some(first <= second),
            _ => None,
        },
        (Constant::Null, Constant::Null) => match condition {
            BinaryCondition::ReferenceEqual => Some(true),
            BinaryCondition::ReferenceNotEqual => Some(false),
            _ => None,
        },
        (Constant::Null, Constant::String(_)) | (Constant::String(_), Constant::Null) => {
            match condition {
                BinaryCondition::ReferenceEqual => Some(false),
                BinaryCondition::ReferenceNotEqual => Some(true),
                _ => None,
            }
        }
        _ => None,
    }
}

fn same_operand(condition: BinaryCondition) -> bool {
    matches!(
        condition,
        BinaryCondition::Equal
            | BinaryCondition::GreaterOrEqual
            | BinaryCondition::LessOrEqual
            | BinaryCondition::ReferenceEqual
    )
}
