//! Natural loop analysis over MIR
//!
//! Dominators are computed with the iterative scheme of Cooper, Harvey and
//! Kennedy over a reverse post order numbering. Every edge whose target
//! dominates its source is a back edge; the blocks that reach the source
//! without passing through the target form the loop body. Back edges into
//! the same header are merged into one loop.

use std::collections::BTreeSet;

use hashbrown::HashMap;
use itertools::Itertools;

use crate::{
    index::{IndexVec, simple_index},
    middle::mir::{BlockId, Function},
};

simple_index! {
    /// Identifies a loop in a [`LoopForest`]
    pub struct LoopId = "loop";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    pub header: BlockId,
    pub blocks: BTreeSet<BlockId>,
    /// The single block branching back to the header, if there is only one
    pub latch: Option<BlockId>,
    /// The single block outside the loop entering it, if that block has no
    /// other successor
    pub preheader: Option<BlockId>,
    pub parent: Option<LoopId>,
    /// Directly nested loops, ordered by the layout position of their headers
    pub children: Vec<LoopId>,
}

impl Loop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    pub loops: IndexVec<LoopId, Loop>,
    /// Outermost loops, ordered by the layout position of their headers
    pub roots: Vec<LoopId>,
}

/// Immediate dominators of every block reachable from the entry
#[derive(Debug, Clone)]
pub struct Dominators {
    idom: HashMap<BlockId, BlockId>,
    entry: BlockId,
}

impl Dominators {
    pub fn compute(function: &Function) -> Self {
        let entry = function.entry();
        let order = reverse_post_order(function);
        let rpo_number: HashMap<BlockId, usize> = order
            .iter()
            .enumerate()
            .map(|(number, block)| (*block, number))
            .collect();
        let predecessors = function.predecessors();

        let mut idom = HashMap::new();
        idom.insert(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;

            for &block in order.iter().skip(1) {
                let new_idom = predecessors[&block]
                    .iter()
                    .copied()
                    .filter(|predecessor| idom.contains_key(predecessor))
                    .reduce(|a, b| intersect(&idom, &rpo_number, a, b));

                let Some(new_idom) = new_idom else {
                    continue;
                };

                if idom.get(&block) != Some(&new_idom) {
                    idom.insert(block, new_idom);
                    changed = true;
                }
            }
        }

        Self { idom, entry }
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).copied().filter(|idom| *idom != block)
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.idom.contains_key(&block)
    }

    /// Whether every path from the entry to `b` passes through `a`
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(b) {
            return false;
        }

        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            if current == self.entry {
                return false;
            }
            current = self.idom[&current];
        }
    }
}

fn intersect(
    idom: &HashMap<BlockId, BlockId>,
    rpo_number: &HashMap<BlockId, usize>,
    mut a: BlockId,
    mut b: BlockId,
) -> BlockId {
    while a != b {
        while rpo_number[&a] > rpo_number[&b] {
            a = idom[&a];
        }
        while rpo_number[&b] > rpo_number[&a] {
            b = idom[&b];
        }
    }
    a
}

/// Blocks reachable from the entry in reverse post order. Successors are
/// visited in terminator order.
pub fn reverse_post_order(function: &Function) -> Vec<BlockId> {
    let mut visited = BTreeSet::new();
    let mut post_order = Vec::new();
    // (block, index of the next successor to visit)
    let mut stack = vec![(function.entry(), 0usize)];
    visited.insert(function.entry());

    while let Some((block, next)) = stack.pop() {
        let successors = function.successors(block);

        match successors.get(next) {
            Some(&successor) => {
                stack.push((block, next + 1));
                if visited.insert(successor) {
                    stack.push((successor, 0));
                }
            }
            None => post_order.push(block),
        }
    }

    post_order.reverse();
    post_order
}

impl LoopForest {
    pub fn compute(function: &Function) -> Self {
        let dominators = Dominators::compute(function);
        let predecessors = function.predecessors();
        let layout_position: HashMap<BlockId, usize> = function
            .layout
            .iter()
            .enumerate()
            .map(|(position, block)| (*block, position))
            .collect();

        // back edge sources grouped by header, headers in layout order
        let mut back_edges: Vec<(BlockId, Vec<BlockId>)> = Vec::new();
        for &block in &function.layout {
            for header in function.successors(block).into_iter().unique() {
                if dominators.dominates(header, block) {
                    match back_edges.iter_mut().find(|(h, _)| *h == header) {
                        Some((_, sources)) => sources.push(block),
                        None => back_edges.push((header, vec![block])),
                    }
                }
            }
        }
        back_edges.sort_by_key(|(header, _)| layout_position[header]);

        let mut loops: IndexVec<LoopId, Loop> = IndexVec::new();

        for (header, sources) in back_edges {
            let mut blocks = BTreeSet::from([header]);
            let mut worklist = Vec::new();

            for &source in &sources {
                if blocks.insert(source) {
                    worklist.push(source);
                }
            }

            while let Some(block) = worklist.pop() {
                for &predecessor in &predecessors[&block] {
                    if dominators.is_reachable(predecessor) && blocks.insert(predecessor) {
                        worklist.push(predecessor);
                    }
                }
            }

            let latch = match sources.as_slice() {
                [latch] => Some(*latch),
                _ => None,
            };

            let preheader = match predecessors[&header]
                .iter()
                .filter(|predecessor| !blocks.contains(*predecessor))
                .collect_vec()
                .as_slice()
            {
                [outside] if function.successors(**outside).iter().all(|s| *s == header) => {
                    Some(**outside)
                }
                _ => None,
            };

            loops.push(Loop {
                header,
                blocks,
                latch,
                preheader,
                parent: None,
                children: Vec::new(),
            });
        }

        // the parent is the smallest other loop containing the header
        let ids = loops.indices().collect_vec();
        for &id in &ids {
            let header = loops[id].header;
            let parent = ids
                .iter()
                .copied()
                .filter(|other| *other != id)
                .filter(|other| {
                    let other = &loops[*other];
                    other.contains(header) && other.blocks.len() > loops[id].blocks.len()
                })
                .min_by_key(|other| loops[*other].blocks.len());

            loops[id].parent = parent;
            if let Some(parent) = parent {
                loops[parent].children.push(id);
            }
        }

        let roots = ids
            .into_iter()
            .filter(|id| loops[*id].parent.is_none())
            .collect();

        Self { loops, roots }
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Every loop, each one before the loops nested in it
    pub fn preorder(&self) -> Vec<LoopId> {
        let mut order = Vec::with_capacity(self.loops.len());
        let mut stack = self.roots.iter().rev().copied().collect_vec();

        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.loops[id].children.iter().rev().copied());
        }

        order
    }

    /// The innermost loop containing `block`
    pub fn innermost_loop_of(&self, block: BlockId) -> Option<LoopId> {
        self.loops
            .enumerate()
            .filter(|(_, lp)| lp.contains(block))
            .min_by_key(|(_, lp)| lp.blocks.len())
            .map(|(id, _)| id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::middle::{
        mir::{InstructionKind, Operand, Terminator},
        ty::Type,
    };

    /// Blocks of a loop shaped the way loop canonicalization leaves it
    #[derive(Debug, Clone, Copy)]
    pub(crate) struct LoopBlocks {
        pub preheader: BlockId,
        pub header: BlockId,
        pub latch: BlockId,
        pub exit: BlockId,
    }

    /// `preheader -> header -> [inner] -> latch -> header | exit`. The body is
    /// either the header itself or the nested structure built by `inner`,
    /// which receives the block to start from and must return the block it
    /// finishes in.
    pub(crate) fn canonical_loop(
        function: &mut Function,
        entry: BlockId,
        condition: Operand,
        inner: impl FnOnce(&mut Function, BlockId) -> BlockId,
    ) -> LoopBlocks {
        let preheader = entry;
        let header = function.add_block();
        function.set_terminator(preheader, Terminator::Jump { target: header });

        let body_end = inner(function, header);
        let latch = function.add_block();
        function.set_terminator(body_end, Terminator::Jump { target: latch });

        let exit = function.add_block();
        function.set_terminator(
            latch,
            Terminator::Branch {
                condition,
                positive: header,
                negative: exit,
            },
        );

        LoopBlocks {
            preheader,
            header,
            latch,
            exit,
        }
    }

    /// [`canonical_loop`] carrying the generic trip count protocol: the
    /// setup marker at the end of `entry` and a decrement marker in the latch
    /// driving the back edge
    pub(crate) fn counted_loop(
        function: &mut Function,
        entry: BlockId,
        trip_count: Operand,
        inner: impl FnOnce(&mut Function, BlockId) -> BlockId,
    ) -> LoopBlocks {
        function.push_effect(entry, InstructionKind::SetTripCount { trip_count });

        let blocks = canonical_loop(function, entry, Operand::constant(1, Type::BOOL), inner);
        let more = function.push(blocks.latch, InstructionKind::LoopDecrement, Type::BOOL);
        function.set_terminator(
            blocks.latch,
            Terminator::Branch {
                condition: more.into(),
                positive: blocks.header,
                negative: blocks.exit,
            },
        );

        blocks
    }

    #[test]
    fn finds_nested_loops_with_preheaders_and_latches() {
        let mut function = Function::new("nest");
        let flag = function.add_parameter(Type::BOOL);
        let entry = function.entry();

        let mut inner_blocks = None;
        let outer = canonical_loop(&mut function, entry, flag.into(), |function, header| {
            let inner = canonical_loop(function, header, flag.into(), |_, header| header);
            inner_blocks = Some(inner);
            inner.exit
        });
        let inner = inner_blocks.unwrap();

        let forest = LoopForest::compute(&function);
        let order = forest.preorder();

        assert_eq!(order.len(), 2);
        let (outer_id, inner_id) = (order[0], order[1]);
        let outer_loop = &forest.loops[outer_id];
        let inner_loop = &forest.loops[inner_id];

        assert_eq!(outer_loop.header, outer.header);
        assert_eq!(outer_loop.latch, Some(outer.latch));
        assert_eq!(outer_loop.preheader, Some(outer.preheader));
        assert_eq!(outer_loop.children, vec![inner_id]);

        assert_eq!(inner_loop.header, inner.header);
        assert_eq!(inner_loop.preheader, Some(outer.header));
        assert_eq!(inner_loop.latch, Some(inner.latch));
        assert_eq!(inner_loop.parent, Some(outer_id));
        assert!(outer_loop.contains(inner.latch));
        assert!(!inner_loop.contains(outer.latch));

        assert_eq!(forest.innermost_loop_of(inner.header), Some(inner_id));
        assert_eq!(forest.innermost_loop_of(outer.exit), None);
    }

    #[test]
    fn loop_entered_from_a_branch_has_no_preheader() {
        let mut function = Function::new("guarded");
        let flag = function.add_parameter(Type::BOOL);
        let entry = function.entry();
        let header = function.add_block();
        let exit = function.add_block();

        function.set_terminator(
            entry,
            Terminator::Branch {
                condition: flag.into(),
                positive: header,
                negative: exit,
            },
        );
        function.set_terminator(
            header,
            Terminator::Branch {
                condition: flag.into(),
                positive: header,
                negative: exit,
            },
        );

        let forest = LoopForest::compute(&function);

        assert_eq!(forest.roots.len(), 1);
        let lp = &forest.loops[forest.roots[0]];
        assert_eq!(lp.latch, Some(header));
        assert_eq!(lp.preheader, None);
    }

    #[test]
    fn dominators_of_a_diamond() {
        let mut function = Function::new("diamond");
        let flag = function.add_parameter(Type::BOOL);
        let entry = function.entry();
        let left = function.add_block();
        let right = function.add_block();
        let join = function.add_block();

        function.set_terminator(
            entry,
            Terminator::Branch {
                condition: flag.into(),
                positive: left,
                negative: right,
            },
        );
        function.set_terminator(left, Terminator::Jump { target: join });
        function.set_terminator(right, Terminator::Jump { target: join });

        let dominators = Dominators::compute(&function);

        assert_eq!(dominators.immediate_dominator(join), Some(entry));
        assert!(dominators.dominates(entry, right));
        assert!(!dominators.dominates(left, join));
        assert!(LoopForest::compute(&function).is_empty());
        assert_eq!(reverse_post_order(&function), vec![entry, right, left, join]);
    }
}
