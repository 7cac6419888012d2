//! MIR (Mid-level Intermediate Representation). Functions are SSA values
//! spread over basic blocks, each block ending in exactly one terminator.
//! Loops are still visible here as a block graph, which is where the trip
//! count markers get paired up with their hardware loop ids.

use hashbrown::HashMap;
use itertools::Itertools;
use strum::Display;

use crate::{
    frontend::{ast::BinaryOperatorKind, intern::InternedSymbol},
    index::{IndexVec, simple_index},
    middle::ty::Type,
};

pub mod pretty_print;

simple_index! {
    /// Identifies a MIR block
    pub struct BlockId = "bb";
}

simple_index! {
    /// Identifies an SSA value
    pub struct ValueId = "%";
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: InternedSymbol,
    pub parameters: Vec<ValueId>,
    pub values: IndexVec<ValueId, ValueData>,
    pub blocks: IndexVec<BlockId, Block>,
    /// Program order of the blocks. The first block is the entry.
    pub layout: Vec<BlockId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueData {
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub result: Option<ValueId>,
    pub kind: InstructionKind,
}

/// Integer comparison predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CondCode {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ugt,
}

impl CondCode {
    pub fn inverse(self) -> Self {
        match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Slt => Self::Sge,
            Self::Sle => Self::Sgt,
            Self::Sgt => Self::Sle,
            Self::Sge => Self::Slt,
            Self::Ult => Self::Ugt,
            Self::Ugt => Self::Ult,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    Binary {
        operator: BinaryOperatorKind,
        lhs: Operand,
        rhs: Operand,
    },
    /// Lane-wise for vector operands, producing `i1` or a lane mask
    Compare {
        condition: CondCode,
        lhs: Operand,
        rhs: Operand,
    },
    /// Reinterprets the bits of `value` as the result type
    Bitcast {
        value: Operand,
    },
    ZeroExtend {
        value: Operand,
    },
    Select {
        condition: Operand,
        on_true: Operand,
        on_false: Operand,
    },
    /// Generic loop setup marker, placed in a loop preheader
    SetTripCount {
        trip_count: Operand,
    },
    /// Generic loop decrement marker, placed in the latch. Produces `i1`,
    /// true while the loop should keep iterating.
    LoopDecrement,
    /// Setup marker once the loop has been given an id and nesting depth
    HardwareLoopSetIter {
        id: u32,
        depth: u32,
        trip_count: Operand,
    },
    /// Decrement marker paired with the set-iteration marker of the same id
    HardwareLoopIterDec {
        id: u32,
    },
}

impl InstructionKind {
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Self::Binary { lhs, rhs, .. } | Self::Compare { lhs, rhs, .. } => vec![lhs, rhs],
            Self::Bitcast { value } | Self::ZeroExtend { value } => vec![value],
            Self::Select {
                condition,
                on_true,
                on_false,
            } => vec![condition, on_true, on_false],
            Self::SetTripCount { trip_count }
            | Self::HardwareLoopSetIter { trip_count, .. } => vec![trip_count],
            Self::LoopDecrement | Self::HardwareLoopIterDec { .. } => vec![],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Self::Binary { lhs, rhs, .. } | Self::Compare { lhs, rhs, .. } => vec![lhs, rhs],
            Self::Bitcast { value } | Self::ZeroExtend { value } => vec![value],
            Self::Select {
                condition,
                on_true,
                on_false,
            } => vec![condition, on_true, on_false],
            Self::SetTripCount { trip_count }
            | Self::HardwareLoopSetIter { trip_count, .. } => vec![trip_count],
            Self::LoopDecrement | Self::HardwareLoopIterDec { .. } => vec![],
        }
    }

    /// Whether this instruction is one of the loop protocol markers
    pub fn is_loop_marker(&self) -> bool {
        matches!(
            self,
            Self::SetTripCount { .. }
                | Self::LoopDecrement
                | Self::HardwareLoopSetIter { .. }
                | Self::HardwareLoopIterDec { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump {
        target: BlockId,
    },
    Branch {
        condition: Operand,
        positive: BlockId,
        negative: BlockId,
    },
    Return {
        value: Option<Operand>,
    },
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Self::Jump { target } => vec![*target],
            Self::Branch {
                positive, negative, ..
            } => vec![*positive, *negative],
            Self::Return { .. } => vec![],
        }
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Self::Jump { .. } | Self::Return { value: None } => vec![],
            Self::Branch { condition, .. } => vec![condition],
            Self::Return { value: Some(value) } => vec![value],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Self::Jump { .. } | Self::Return { value: None } => vec![],
            Self::Branch { condition, .. } => vec![condition],
            Self::Return { value: Some(value) } => vec![value],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Value(ValueId),
    /// An integer constant. Vector-typed constants are splats.
    Constant { value: i64, ty: Type },
}

impl Operand {
    pub fn constant(value: i64, ty: Type) -> Self {
        Self::Constant { value, ty }
    }

    pub fn as_value(self) -> Option<ValueId> {
        match self {
            Self::Value(value) => Some(value),
            Self::Constant { .. } => None,
        }
    }

    pub fn as_constant(self) -> Option<i64> {
        match self {
            Self::Constant { value, .. } => Some(value),
            Self::Value(_) => None,
        }
    }
}

impl core::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Constant { value, ty } => write!(f, "{value}:{ty}"),
        }
    }
}

impl From<ValueId> for Operand {
    fn from(value: ValueId) -> Self {
        Self::Value(value)
    }
}

/// Position of an instruction: its block and index inside the block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    pub block: BlockId,
    pub index: usize,
}

impl Function {
    /// A function with an empty entry block that returns nothing
    pub fn new(name: &str) -> Self {
        let mut function = Self {
            name: InternedSymbol::new(name),
            parameters: Vec::new(),
            values: IndexVec::new(),
            blocks: IndexVec::new(),
            layout: Vec::new(),
        };
        function.add_block();
        function
    }

    pub fn entry(&self) -> BlockId {
        self.layout.first().copied().unwrap_or(BlockId::ZERO)
    }

    pub fn add_parameter(&mut self, ty: Type) -> ValueId {
        let value = self.values.push(ValueData { ty });
        self.parameters.push(value);
        value
    }

    /// Appends a new block to the end of the layout
    pub fn add_block(&mut self) -> BlockId {
        let id = self.blocks.next_index();
        self.blocks.push(Block {
            id,
            instructions: Vec::new(),
            terminator: Terminator::Return { value: None },
        });
        self.layout.push(id);
        id
    }

    /// Appends an instruction producing a value of type `ty`
    pub fn push(&mut self, block: BlockId, kind: InstructionKind, ty: Type) -> ValueId {
        let result = self.values.push(ValueData { ty });
        self.blocks[block].instructions.push(Instruction {
            result: Some(result),
            kind,
        });
        result
    }

    /// Appends an instruction without a result
    pub fn push_effect(&mut self, block: BlockId, kind: InstructionKind) {
        self.blocks[block]
            .instructions
            .push(Instruction { result: None, kind });
    }

    /// Inserts an instruction producing a value of type `ty` at `index` of
    /// `block`
    pub fn insert(&mut self, block: BlockId, index: usize, kind: InstructionKind, ty: Type) -> ValueId {
        let result = self.values.push(ValueData { ty });
        self.blocks[block].instructions.insert(
            index,
            Instruction {
                result: Some(result),
                kind,
            },
        );
        result
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        self.blocks[block].terminator = terminator;
    }

    pub fn value_type(&self, value: ValueId) -> Type {
        self.values[value].ty
    }

    pub fn operand_type(&self, operand: Operand) -> Type {
        match operand {
            Operand::Value(value) => self.value_type(value),
            Operand::Constant { ty, .. } => ty,
        }
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.blocks[block].terminator.successors()
    }

    /// Predecessor lists for every block, each list in layout order without
    /// duplicates
    pub fn predecessors(&self) -> HashMap<BlockId, Vec<BlockId>> {
        let mut predecessors: HashMap<BlockId, Vec<BlockId>> =
            self.blocks.indices().map(|id| (id, Vec::new())).collect();

        for &block in &self.layout {
            for successor in self.successors(block).into_iter().unique() {
                predecessors.entry(successor).or_default().push(block);
            }
        }

        predecessors
    }

    /// Where `value` is defined, or `None` for parameters
    pub fn definition(&self, value: ValueId) -> Option<Location> {
        self.layout.iter().find_map(|&block| {
            self.blocks[block]
                .instructions
                .iter()
                .position(|instruction| instruction.result == Some(value))
                .map(|index| Location { block, index })
        })
    }

    pub fn instruction_at(&self, location: Location) -> &Instruction {
        &self.blocks[location.block].instructions[location.index]
    }

    /// The instruction that defines `value`, if any
    pub fn defining_instruction(&self, value: ValueId) -> Option<&Instruction> {
        self.definition(value)
            .map(|location| self.instruction_at(location))
    }

    /// Number of operands, across all instructions and terminators, reading
    /// `value`
    pub fn use_count(&self, value: ValueId) -> usize {
        let reads = |operand: &Operand| *operand == Operand::Value(value);

        self.blocks
            .iter()
            .flat_map(|block| {
                block
                    .instructions
                    .iter()
                    .flat_map(|instruction| instruction.kind.operands())
                    .chain(block.terminator.operands())
            })
            .filter(|operand| reads(operand))
            .count()
    }

    /// Rewrites every read of `from` to read `to` instead. Returns the number
    /// of operands rewritten.
    pub fn replace_all_uses(&mut self, from: ValueId, to: Operand) -> usize {
        let mut replaced = 0;

        for block in self.blocks.iter_mut() {
            let operands = block
                .instructions
                .iter_mut()
                .flat_map(|instruction| instruction.kind.operands_mut())
                .chain(block.terminator.operands_mut());

            for operand in operands {
                if *operand == Operand::Value(from) {
                    *operand = to;
                    replaced += 1;
                }
            }
        }

        replaced
    }

    /// Removes the instruction at `location`, returning it
    pub fn remove(&mut self, location: Location) -> Instruction {
        self.blocks[location.block]
            .instructions
            .remove(location.index)
    }

    /// All instructions in layout order together with their location
    pub fn instructions(&self) -> impl Iterator<Item = (Location, &Instruction)> {
        self.layout.iter().flat_map(move |&block| {
            self.blocks[block]
                .instructions
                .iter()
                .enumerate()
                .map(move |(index, instruction)| (Location { block, index }, instruction))
        })
    }
}
