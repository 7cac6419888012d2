//! Places loop set-iteration pseudos at the head of their block's terminator
//! run, where the hardware loop instruction replacing them has to sit.

use crate::backend::lir::{self, Instruction};

/// Moves every `loop.set_iter` right before the first other terminator of
/// its block, or to the end of the block when nothing else terminates it.
/// Returns whether any instruction moved.
pub fn place_set_iterations(function: &mut lir::Function) -> bool {
    let mut changed = false;

    for block in &mut function.blocks {
        changed |= place_in_block(block);
    }

    changed
}

fn place_in_block(block: &mut lir::Block) -> bool {
    let is_set_iter = |instruction: &Instruction| matches!(instruction, Instruction::LoopPseudoSetIter { .. });

    let original = std::mem::take(&mut block.instructions);
    let mut set_iterations = Vec::new();
    let mut rest = Vec::with_capacity(original.len());
    for instruction in original.iter().cloned() {
        if is_set_iter(&instruction) {
            set_iterations.push(instruction);
        } else {
            rest.push(instruction);
        }
    }

    if set_iterations.is_empty() {
        block.instructions = original;
        return false;
    }

    let position = rest
        .iter()
        .rposition(|instruction| !instruction.is_terminator())
        .map_or(0, |last| last + 1);

    let placed: Vec<_> = rest[..position]
        .iter()
        .cloned()
        .chain(set_iterations)
        .chain(rest[position..].iter().cloned())
        .collect();

    let moved = placed != original;
    block.instructions = placed;

    if moved {
        tracing::trace!(block = %block.id, "moved loop.set_iter to terminator run");
    }

    moved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::lir::{BlockId, Predicate, VirtualRegister},
        frontend::intern::InternedSymbol,
    };

    fn set_iter(count: u32) -> Instruction {
        Instruction::LoopPseudoSetIter {
            id: 0,
            depth: 0,
            count: VirtualRegister::from_u32(count),
        }
    }

    fn mov(destination: u32) -> Instruction {
        Instruction::MoveImmediate {
            destination: VirtualRegister::from_u32(destination),
            value: 8,
        }
    }

    fn jump(target: u32) -> Instruction {
        Instruction::Branch {
            predicate: Predicate::Truth,
            target: BlockId::from_u32(target),
        }
    }

    fn function(instructions: Vec<Instruction>) -> lir::Function {
        let mut function = lir::Function::new(InternedSymbol::new("place"));
        let mut block = lir::Block::new(BlockId::ZERO);
        block.instructions = instructions;
        function.blocks.push(block);
        function
    }

    #[test]
    fn set_iteration_moves_past_later_values() {
        let mut function = function(vec![mov(0), set_iter(0), mov(1), jump(1)]);

        assert!(place_set_iterations(&mut function));
        assert_eq!(
            function.blocks[0].instructions,
            vec![mov(0), mov(1), set_iter(0), jump(1)]
        );
        assert_eq!(function.blocks[0].first_terminator(), 2);
    }

    #[test]
    fn set_iteration_ends_a_block_without_branches() {
        let mut function = function(vec![set_iter(0), mov(0)]);

        assert!(place_set_iterations(&mut function));
        assert_eq!(function.blocks[0].instructions, vec![mov(0), set_iter(0)]);
    }

    #[test]
    fn placement_is_idempotent() {
        let mut function = function(vec![mov(0), set_iter(0), jump(1)]);

        assert!(!place_set_iterations(&mut function));
        assert_eq!(function.blocks[0].instructions, vec![mov(0), set_iter(0), jump(1)]);
    }

    #[test]
    fn placed_set_iteration_reports_no_change() {
        let mut function = function(vec![set_iter(0), jump(1)]);

        assert!(!place_set_iterations(&mut function));
        assert_eq!(function.blocks[0].instructions, vec![set_iter(0), jump(1)]);

        let mut moved = self::function(vec![set_iter(0), mov(0), jump(1)]);
        assert!(place_set_iterations(&mut moved));
        assert!(!place_set_iterations(&mut moved));
        assert_eq!(moved.blocks[0].instructions, vec![mov(0), set_iter(0), jump(1)]);
    }
}
