use crate::cfg::ControlFlowGraph;
use crate::ir::{BlockId, Program};
use crate::simplify::Pass;

/// Removes blocks the entry cannot reach and compacts block ids.
pub struct UnreachableBlockElimination;

impl Pass for UnreachableBlockElimination {
    fn name(&self) -> &'static str {
        "unreachable block elimination"
    }

    fn run(&self, program: &mut Program) -> bool {
        let reachable = ControlFlowGraph::build(program).reachable();
        if reachable.iter().all(|reachable| *reachable) {
            return false;
        }

        let mut remap: Vec<Option<BlockId>> = Vec::with_capacity(reachable.len());
        let mut next = 0u32;
        for reachable in &reachable {
            if *reachable {
                remap.push(Some(BlockId(next)));
                next += 1;
            } else {
                remap.push(None);
            }
        }

        let blocks = std::mem::take(&mut program.blocks);
        program.blocks = blocks
            .into_iter()
            .zip(&reachable)
            .filter(|(_, reachable)| **reachable)
            .map(|(mut block, _)| {
                for phi in &mut block.phis {
                    phi.incomings.retain_mut(|incoming| {
                        match remap.get(incoming.source.index()).copied().flatten() {
                            Some(source) => {
                                incoming.source = source;
                                true
                            }
                            None => false,
                        }
                    });
                }
                for instruction in &mut block.instructions {
                    // Reachable blocks only jump to reachable blocks.
                    instruction.map_targets(|target| {
                        remap
                            .get(target.index())
                            .copied()
                            .flatten()
                            .unwrap_or(target)
                    });
                }
                block
            })
            .collect();
        true
    }
}
