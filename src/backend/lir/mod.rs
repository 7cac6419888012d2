//! LIR (Low-level Intermediate Representation). The linear instruction
//! stream handed to final code emission: blocks in layout order, each a list
//! of target instruction records ending in a run of terminators.
//!
//! Control flow is predicated. A block may end in several branches which are
//! tried in order, and falls through to its layout successor when none of
//! them is taken.

use strum::Display;

use crate::{
    frontend::{ast::BinaryOperatorKind, intern::InternedSymbol},
    index::{IndexVec, simple_index},
    middle::{mir::CondCode, ty::Type},
};

pub mod pretty_print;

simple_index! {
    /// Identifies an LIR block. Blocks keep the number of the MIR block they
    /// were selected from.
    pub struct BlockId = "bb";
}

simple_index! {
    /// A virtual register holding one scalar or vector value
    pub struct VirtualRegister = "%";
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: InternedSymbol,
    pub parameters: Vec<VirtualRegister>,
    /// Type of every virtual register
    pub registers: IndexVec<VirtualRegister, Type>,
    /// Blocks in layout order
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
}

/// The guard of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// Always taken
    Truth,
    Register(VirtualRegister),
}

/// Which lanes of a mask must be active for a mask branch to be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MaskCondition {
    All,
    Any,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    MoveImmediate {
        destination: VirtualRegister,
        value: i64,
    },
    /// Sets every lane of `destination` to `value`
    BroadcastImmediate {
        destination: VirtualRegister,
        value: i64,
    },
    BuildVector {
        destination: VirtualRegister,
        lanes: Vec<VirtualRegister>,
    },
    Copy {
        destination: VirtualRegister,
        source: VirtualRegister,
    },
    Binary {
        operator: BinaryOperatorKind,
        destination: VirtualRegister,
        lhs: VirtualRegister,
        rhs: VirtualRegister,
    },
    Compare {
        condition: CondCode,
        destination: VirtualRegister,
        lhs: VirtualRegister,
        rhs: VirtualRegister,
    },
    Bitcast {
        destination: VirtualRegister,
        source: VirtualRegister,
    },
    ZeroExtend {
        destination: VirtualRegister,
        source: VirtualRegister,
    },
    Select {
        destination: VirtualRegister,
        condition: VirtualRegister,
        on_true: VirtualRegister,
        on_false: VirtualRegister,
    },
    Branch {
        predicate: Predicate,
        target: BlockId,
    },
    /// Branch taken depending on how many lanes of `mask` are active
    MaskBranch {
        condition: MaskCondition,
        mask: VirtualRegister,
        target: BlockId,
    },
    /// Loads the trip count of hardware loop `id`
    LoopPseudoSetIter {
        id: u32,
        depth: u32,
        count: VirtualRegister,
    },
    /// Decrements the trip count of hardware loop `id`, setting
    /// `destination` while iterations remain
    LoopPseudoIterDec {
        destination: VirtualRegister,
        id: u32,
    },
    /// Runs the blocks from the layout successor up to the latch `count`
    /// times, then continues at `exit`
    Loop {
        depth: u8,
        count: VirtualRegister,
        exit: BlockId,
    },
    Return {
        value: Option<VirtualRegister>,
    },
}

impl Instruction {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Branch { .. }
                | Self::MaskBranch { .. }
                | Self::LoopPseudoSetIter { .. }
                | Self::LoopPseudoIterDec { .. }
                | Self::Loop { .. }
                | Self::Return { .. }
        )
    }

    /// Block this instruction may transfer control to
    pub fn branch_target(&self) -> Option<BlockId> {
        match self {
            Self::Branch { target, .. } | Self::MaskBranch { target, .. } => Some(*target),
            Self::Loop { exit, .. } => Some(*exit),
            _ => None,
        }
    }

    pub fn is_set_iteration(&self, id: u32) -> bool {
        matches!(self, Self::LoopPseudoSetIter { id: other, .. } if *other == id)
    }

    pub fn is_iteration_decrement(&self, id: u32) -> bool {
        matches!(self, Self::LoopPseudoIterDec { id: other, .. } if *other == id)
    }
}

impl Block {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            instructions: Vec::new(),
        }
    }

    /// Index of the first instruction of the terminator run ending the block.
    /// Equals the instruction count when the block has no terminator.
    pub fn first_terminator(&self) -> usize {
        self.instructions
            .iter()
            .rposition(|instruction| !instruction.is_terminator())
            .map_or(0, |last| last + 1)
    }

    /// The maximal run of terminators ending the block
    pub fn terminators(&self) -> &[Instruction] {
        &self.instructions[self.first_terminator()..]
    }
}

impl Function {
    pub fn new(name: InternedSymbol) -> Self {
        Self {
            name,
            parameters: Vec::new(),
            registers: IndexVec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn new_register(&mut self, ty: Type) -> VirtualRegister {
        self.registers.push(ty)
    }

    pub fn position_of(&self, block: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == block)
    }

    /// The block placed right after `block`
    pub fn layout_successor(&self, block: BlockId) -> Option<BlockId> {
        let position = self.position_of(block)?;
        self.blocks.get(position + 1).map(|b| b.id)
    }

    pub fn block(&self, block: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == block)
    }

    pub fn block_mut(&mut self, block: BlockId) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.id == block)
    }

    /// Number of instructions across all blocks
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|block| block.instructions.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminators_are_the_trailing_run() {
        let p = VirtualRegister::from_u32(0);
        let mut block = Block::new(BlockId::ZERO);
        block.instructions = vec![
            Instruction::LoopPseudoIterDec {
                destination: p,
                id: 0,
            },
            Instruction::MoveImmediate {
                destination: VirtualRegister::from_u32(1),
                value: 3,
            },
            Instruction::LoopPseudoIterDec {
                destination: p,
                id: 1,
            },
            Instruction::Branch {
                predicate: Predicate::Register(p),
                target: BlockId::ZERO,
            },
        ];

        assert_eq!(block.first_terminator(), 2);
        assert_eq!(block.terminators().len(), 2);
        assert!(block.terminators()[0].is_iteration_decrement(1));

        block.instructions.truncate(2);
        assert!(block.terminators().is_empty());
    }
}
