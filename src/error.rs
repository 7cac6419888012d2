//! Internal consistency failures raised by the lowering passes.
//!
//! None of these are reachable from source input alone. Each one means an
//! earlier pass broke a structural contract (a marker went missing, a block
//! ended up with terminators we do not know how to read, ...). Passes return
//! them instead of guessing so that a broken pipeline never miscompiles.

use thiserror::Error;

use crate::{
    backend::{isel, lir},
    middle::mir,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoweringError {
    #[error("loop preheader {preheader} holds more than one trip count marker")]
    MultipleTripCountMarkers { preheader: mir::BlockId },

    #[error("loop headed by {header} has a trip count marker but no unique latch")]
    MissingLoopLatch { header: mir::BlockId },

    #[error("loop latch {latch} is missing the decrement marker paired with its trip count")]
    MissingDecrementMarker { latch: mir::BlockId },

    #[error("generic loop marker survived to instruction selection in {block}")]
    UnloweredLoopMarker { block: mir::BlockId },

    #[error("value {value} is used but never defined")]
    UndefinedValue { value: mir::ValueId },

    #[error("no iteration decrement found for hardware loop #{id}")]
    MissingIterationDecrement { id: u32 },

    #[error("set-iteration pseudo of hardware loop #{id} is not the first terminator of {block}")]
    SetIterationNotFirstTerminator { id: u32, block: lir::BlockId },

    #[error("unexpected branch shape in preheader {block} of hardware loop #{id}")]
    UnexpectedPreheaderBranch { id: u32, block: lir::BlockId },

    #[error("preheader {block} of hardware loop #{id} has no layout successor")]
    MissingLayoutSuccessor { id: u32, block: lir::BlockId },

    #[error("unexpected branch shape in latch {block} of hardware loop #{id}")]
    UnexpectedLatchBranch { id: u32, block: lir::BlockId },

    #[error("hardware loop #{id} has depth {depth} which does not fit the 8-bit depth field")]
    LoopDepthOverflow { id: u32, depth: u32 },

    #[error("mask operand {node} of a branch in {block} carries no value")]
    InvalidMaskOperand { node: isel::NodeId, block: lir::BlockId },

    #[error("selection node {node} in {block} has no value or the wrong operands for its opcode")]
    MalformedSelectionNode { node: isel::NodeId, block: lir::BlockId },
}

pub type LoweringResult<T> = Result<T, LoweringError>;
