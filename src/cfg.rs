use crate::ir::{BlockId, Instruction, Program};

/// Edge between basic blocks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FlowEdge {
    pub from: BlockId,
    pub to: BlockId,
    pub kind: EdgeKind,
}

/// Edge classification by terminator operand.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum EdgeKind {
    Jump,
    Consequent,
    Alternative,
}

/// Successor and predecessor lists of a program, indexed by block.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    pub edges: Vec<FlowEdge>,
    successors: Vec<Vec<BlockId>>,
    predecessors: Vec<Vec<BlockId>>,
}

impl ControlFlowGraph {
    pub fn build(program: &Program) -> Self {
        let count = program.blocks.len();
        let mut edges = Vec::new();
        for (index, block) in program.blocks.iter().enumerate() {
            let from = BlockId(index as u32);
            match block.terminator() {
                Some(Instruction::Jump { target }) => edges.push(FlowEdge {
                    from,
                    to: *target,
                    kind: EdgeKind::Jump,
                }),
                Some(
                    Instruction::Branch {
                        consequent,
                        alternative,
                        ..
                    }
                    | Instruction::BinaryBranch {
                        consequent,
                        alternative,
                        ..
                    },
                ) => {
                    edges.push(FlowEdge {
                        from,
                        to: *consequent,
                        kind: EdgeKind::Consequent,
                    });
                    edges.push(FlowEdge {
                        from,
                        to: *alternative,
                        kind: EdgeKind::Alternative,
                    });
                }
                _ => {}
            }
        }

        let mut successors = vec![Vec::new(); count];
        let mut predecessors = vec![Vec::new(); count];
        for edge in &edges {
            // Edges to missing blocks are reported by `Program::validate`.
            if edge.to.index() >= count {
                continue;
            }
            let targets: &mut Vec<BlockId> = &mut successors[edge.from.index()];
            if !targets.contains(&edge.to) {
                targets.push(edge.to);
                predecessors[edge.to.index()].push(edge.from);
            }
        }

        ControlFlowGraph {
            edges,
            successors,
            predecessors,
        }
    }

    pub fn len(&self) -> usize {
        self.successors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        self.successors
            .get(block.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn predecessors(&self, block: BlockId) -> &[BlockId] {
        self.predecessors
            .get(block.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Blocks reachable from the entry, in reverse post-order.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut visited = vec![false; self.len()];
        let mut postorder = Vec::with_capacity(self.len());
        // Explicit stack of (block, next successor index).
        let mut stack = vec![(BlockId(0), 0usize)];
        visited[0] = true;
        while let Some((block, next)) = stack.last_mut() {
            let successors = self.successors(*block);
            if let Some(successor) = successors.get(*next).copied() {
                *next += 1;
                if !visited[successor.index()] {
                    visited[successor.index()] = true;
                    stack.push((successor, 0));
                }
            } else {
                postorder.push(*block);
                stack.pop();
            }
        }
        postorder.reverse();
        postorder
    }

    pub fn reachable(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.len()];
        for block in self.reverse_postorder() {
            reachable[block.index()] = true;
        }
        reachable
    }

    /// Immediate dominator of every reachable block; the entry and
    /// unreachable blocks map to `None`.
    pub fn immediate_dominators(&self) -> Vec<Option<BlockId>> {
        let order = self.reverse_postorder();
        let mut position = vec![usize::MAX; self.len()];
        for (index, block) in order.iter().enumerate() {
            position[block.index()] = index;
        }

        let mut idom: Vec<Option<BlockId>> = vec![None; self.len()];
        if order.is_empty() {
            return idom;
        }
        idom[0] = Some(BlockId(0));
        let mut changed = true;
        while changed {
            changed = false;
            for block in order.iter().skip(1) {
                let mut candidate: Option<BlockId> = None;
                for predecessor in self.predecessors(*block) {
                    if idom[predecessor.index()].is_none() {
                        continue;
                    }
                    candidate = Some(match candidate {
                        None => *predecessor,
                        Some(current) => intersect(&idom, &position, current, *predecessor),
                    });
                }
                if candidate.is_some() && idom[block.index()] != candidate {
                    idom[block.index()] = candidate;
                    changed = true;
                }
            }
        }
        idom[0] = None;
        idom
    }
}

fn intersect(
    idom: &[Option<BlockId>],
    position: &[usize],
    mut first: BlockId,
    mut second: BlockId,
) -> BlockId {
    while first != second {
        while position[first.index()] > position[second.index()] {
            first = idom[first.index()].unwrap_or(BlockId(0));
        }
        while position[second.index()] > position[first.index()] {
            second = idom[second.index()].unwrap_or(BlockId(0));
        }
    }
    first
}

/// Dominance queries over a fixed immediate-dominator table.
pub struct Dominators {
    idom: Vec<Option<BlockId>>,
}

impl Dominators {
    pub fn new(cfg: &ControlFlowGraph) -> Self {
        Dominators {
            idom: cfg.immediate_dominators(),
        }
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(block.index()).copied().flatten()
    }

    /// Whether `dominator` dominates `block` (reflexive).
    pub fn dominates(&self, dominator: BlockId, block: BlockId) -> bool {
        let mut current = block;
        loop {
            if current == dominator {
                return true;
            }
            match self.immediate_dominator(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }
}
