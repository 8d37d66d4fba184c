use std::collections::{HashMap, HashSet};

use crate::cfg::{ControlFlowGraph, Dominators};
use crate::ir::{BinaryOp, BlockId, Constant, Instruction, NumericKind, Phi, Program, Register};
use crate::simplify::Pass;

/// Copy propagation, trivial-phi removal, redundancy elimination over
/// dominating definitions, integer constant folding and removal of unused
/// pure definitions.
pub struct ValueNumbering;

impl Pass for ValueNumbering {
    fn name(&self) -> &'static str {
        "value numbering"
    }

    fn run(&self, program: &mut Program) -> bool {
        let mut changed = fold_constants(program);

        let mut replacements = HashMap::new();
        collect_copies(program, &mut replacements);
        collect_redundant(program, &mut replacements);
        if !replacements.is_empty() {
            apply_replacements(program, &replacements);
            changed = true;
        }

        changed | remove_unused(program)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
enum Key {
    Const(Constant),
    Binary(BinaryOp, NumericKind, Register, Register),
}

fn constants(program: &Program) -> HashMap<Register, Constant> {
    program
        .blocks
        .iter()
        .flat_map(|block| &block.instructions)
        .filter_map(|instruction| match instruction {
            Instruction::Const { receiver, value } => Some((*receiver, value.clone())),
            _ => None,
        })
        .collect()
}

fn fold_constants(program: &mut Program) -> bool {
    let constants = constants(program);
    let mut changed = false;
    for block in &mut program.blocks {
        for instruction in &mut block.instructions {
            let Instruction::Binary {
                receiver,
                op,
                kind,
                first,
                second,
            } = *instruction
            else {
                continue;
            };
            let (Some(left), Some(right)) = (constants.get(&first), constants.get(&second)) else {
                continue;
            };
            if let Some(value) = evaluate(op, kind, left, right) {
                *instruction = Instruction::Const {
                    receiver,
                    value,
                };
                changed = true;
            }
        }
    }
    changed
}

fn evaluate(op: BinaryOp, kind: NumericKind, left: &Constant, right: &Constant) -> Option<Constant> {
    match (kind, left, right) {
        (NumericKind::Int, Constant::Int(left), Constant::Int(right)) => {
            let (left, right) = (*left, *right);
            let value = match op {
                BinaryOp::Add => left.wrapping_add(right),
                BinaryOp::Subtract => left.wrapping_sub(right),
                BinaryOp::Multiply => left.wrapping_mul(right),
                BinaryOp::Divide if right != 0 => left.wrapping_div(right),
                BinaryOp::Modulo if right != 0 => left.wrapping_rem(right),
                BinaryOp::Divide | BinaryOp::Modulo => return None,
                BinaryOp::And => left & right,
                BinaryOp::Or => left | right,
                BinaryOp::Xor => left ^ right,
                BinaryOp::ShiftLeft => left.wrapping_shl(right as u32 & 0x1F),
                BinaryOp::ShiftRight => left.wrapping_shr(right as u32 & 0x1F),
                BinaryOp::ShiftRightUnsigned => ((left as u32) >> (right as u32 & 0x1F)) as i32,
            };
            Some(Constant::Int(value))
        }
        // Shift distances of long shifts are ints.
        (NumericKind::Long, Constant::Long(left), Constant::Int(right))
            if matches!(
                op,
                BinaryOp::ShiftLeft | BinaryOp::ShiftRight | BinaryOp::ShiftRightUnsigned
            ) =>
        {
            let distance = *right as u32 & 0x3F;
            let value = match op {
                BinaryOp::ShiftLeft => left.wrapping_shl(distance),
                BinaryOp::ShiftRight => left.wrapping_shr(distance),
                _ => ((*left as u64) >> distance) as i64,
            };
            Some(Constant::Long(value))
        }
        (NumericKind::Long, Constant::Long(left), Constant::Long(right)) => {
            let (left, right) = (*left, *right);
            let value = match op {
                BinaryOp::Add => left.wrapping_add(right),
                BinaryOp::Subtract => left.wrapping_sub(right),
                BinaryOp::Multiply => left.wrapping_mul(right),
                BinaryOp::Divide if right != 0 => left.wrapping_div(right),
                BinaryOp::Modulo if right != 0 => left.wrapping_rem(right),
                BinaryOp::And => left & right,
                BinaryOp::Or => left | right,
                BinaryOp::Xor => left ^ right,
                _ => return None,
            };
            Some(Constant::Long(value))
        }
        _ => None,
    }
}

fn trivial_phi(phi: &Phi) -> Option<Register> {
    let mut value = None;
    for incoming in &phi.incomings {
        if incoming.value == phi.receiver || Some(incoming.value) == value {
            continue;
        }
        if value.is_some() {
            return None;
        }
        value = Some(incoming.value);
    }
    value
}

fn collect_copies(program: &Program, replacements: &mut HashMap<Register, Register>) {
    for block in &program.blocks {
        for phi in &block.phis {
            if let Some(value) = trivial_phi(phi) {
                replacements.insert(phi.receiver, value);
            }
        }
        for instruction in &block.instructions {
            if let Instruction::Assign { receiver, assignee } = instruction {
                replacements.insert(*receiver, *assignee);
            }
        }
    }
}

fn resolve(replacements: &HashMap<Register, Register>, register: Register) -> Register {
    let mut current = register;
    // Bounded walk; a cycle can only come from unreachable code.
    for _ in 0..=replacements.len() {
        match replacements.get(&current) {
            Some(next) if *next != current => current = *next,
            _ => break,
        }
    }
    current
}

fn collect_redundant(program: &Program, replacements: &mut HashMap<Register, Register>) {
    let cfg = ControlFlowGraph::build(program);
    let dominators = Dominators::new(&cfg);
    let mut available: HashMap<Key, Vec<(BlockId, Register)>> = HashMap::new();
    for block_id in cfg.reverse_postorder() {
        let Some(block) = program.block(block_id) else {
            continue;
        };
        for instruction in &block.instructions {
            let (receiver, key) = match instruction {
                Instruction::Const { receiver, value } => (*receiver, Key::Const(value.clone())),
                Instruction::Binary {
                    receiver,
                    op,
                    kind,
                    first,
                    second,
                } if instruction.is_pure() => (
                    *receiver,
                    Key::Binary(
                        *op,
                        *kind,
                        resolve(replacements, *first),
                        resolve(replacements, *second),
                    ),
                ),
                _ => continue,
            };
            if replacements.contains_key(&receiver) {
                continue;
            }
            let candidates = available.entry(key).or_default();
            let earlier = candidates
                .iter()
                .find(|(defining_block, _)| dominators.dominates(*defining_block, block_id))
                .map(|(_, register)| *register);
            match earlier {
                Some(register) => {
                    replacements.insert(receiver, register);
                }
                None => candidates.push((block_id, receiver)),
            }
        }
    }
}

fn apply_replacements(program: &mut Program, replacements: &HashMap<Register, Register>) {
    for block in &mut program.blocks {
        block
            .phis
            .retain(|phi| !replacements.contains_key(&phi.receiver));
        block.instructions.retain(|instruction| {
            !(instruction.is_pure()
                && instruction
                    .receiver()
                    .is_some_and(|receiver| replacements.contains_key(&receiver)))
        });
    }
    program.map_uses(|register| resolve(replacements, register));
}

fn remove_unused(program: &mut Program) -> bool {
    let mut used = HashSet::new();
    for block in &program.blocks {
        for phi in &block.phis {
            // A phi feeding only itself is still dead.
            used.extend(
                phi.incomings
                    .iter()
                    .map(|incoming| incoming.value)
                    .filter(|value| *value != phi.receiver),
            );
        }
        for instruction in &block.instructions {
            used.extend(instruction.uses());
        }
    }

    let mut changed = false;
    for block in &mut program.blocks {
        let before = block.phis.len() + block.instructions.len();
        block.phis.retain(|phi| used.contains(&phi.receiver));
        block.instructions.retain(|instruction| {
            !instruction.is_pure()
                || instruction
                    .receiver()
                    .is_none_or(|receiver| used.contains(&receiver))
        });
        changed |= before != block.phis.len() + block.instructions.len();
    }
    changed
}
