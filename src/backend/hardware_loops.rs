//! Hardware loop rematerialization
//!
//! After selection a counted loop is spread over two blocks: the preheader
//! loads the trip count and enters the header, the latch decrements it and
//! branches back while iterations remain.
//!
//! ```text
//! preheader:                      latch:
//!     loop.set_iter #id, d, %n        %p = loop.iter_dec #id
//!     jmp true, header                jmp %p, header
//!                                     jmp true, exit
//! ```
//!
//! The set-iteration pseudo becomes a single `loop d, %n, exit`; the
//! decrement and the backwards branch disappear. The remaining unconditional
//! branches keep the control flow around the loop body intact.

use crate::{
    backend::lir::{self, Instruction, Predicate},
    error::{LoweringError, LoweringResult},
};

/// Pseudo found in a block: `(block position, instruction index)` plus its
/// operands
struct SetIteration {
    position: usize,
    index: usize,
    id: u32,
    depth: u32,
    count: lir::VirtualRegister,
}

/// Where the pieces of one loop live: `(block position, instruction index)`
struct LoopShape {
    set_iteration: (usize, usize),
    decrement: (usize, usize),
    latch_branch: (usize, usize),
    depth: u8,
    count: lir::VirtualRegister,
    exit: lir::BlockId,
}

fn find_decrement(function: &lir::Function, id: u32) -> Option<(usize, usize)> {
    function
        .blocks
        .iter()
        .enumerate()
        .find_map(|(position, block)| {
            block
                .instructions
                .iter()
                .position(|instruction| instruction.is_iteration_decrement(id))
                .map(|index| (position, index))
        })
}

fn find_set_iteration(function: &lir::Function) -> Option<SetIteration> {
    function
        .blocks
        .iter()
        .enumerate()
        .find_map(|(position, block)| {
            block
                .instructions
                .iter()
                .enumerate()
                .find_map(|(index, instruction)| match *instruction {
                    Instruction::LoopPseudoSetIter { id, depth, count } => Some(SetIteration {
                        position,
                        index,
                        id,
                        depth,
                        count,
                    }),
                    _ => None,
                })
        })
}

/// Checks that the loop started by `set_iteration` has the expected shape
/// and finds all of its pieces
fn analyze(function: &lir::Function, set_iteration: SetIteration) -> LoweringResult<LoopShape> {
    let SetIteration {
        position,
        index,
        id,
        depth,
        count,
    } = set_iteration;
    let preheader = &function.blocks[position];

    let decrement = find_decrement(function, id).ok_or(LoweringError::MissingIterationDecrement { id })?;

    let first_terminator = preheader.first_terminator();
    if index != first_terminator {
        return Err(LoweringError::SetIterationNotFirstTerminator {
            id,
            block: preheader.id,
        });
    }

    let header = match preheader.instructions.get(index + 1) {
        Some(Instruction::Branch {
            predicate: Predicate::Truth,
            target,
        }) => *target,
        Some(_) => {
            return Err(LoweringError::UnexpectedPreheaderBranch {
                id,
                block: preheader.id,
            });
        }
        None => function
            .blocks
            .get(position + 1)
            .map(|block| block.id)
            .ok_or(LoweringError::MissingLayoutSuccessor {
                id,
                block: preheader.id,
            })?,
    };

    let latch = &function.blocks[decrement.0];
    let unexpected_latch = || LoweringError::UnexpectedLatchBranch { id, block: latch.id };

    let mut terminators = latch.first_terminator()..latch.instructions.len();
    if terminators.start == decrement.1 {
        terminators.next();
    }

    let conditional = terminators.next().ok_or_else(unexpected_latch)?;
    match latch.instructions[conditional] {
        Instruction::Branch {
            predicate: Predicate::Register(_),
            target,
        } if target == header => {}
        _ => return Err(unexpected_latch()),
    }

    let exit = match terminators.next().map(|index| &latch.instructions[index]) {
        Some(Instruction::Branch {
            predicate: Predicate::Truth,
            target,
        }) => *target,
        _ => return Err(unexpected_latch()),
    };

    let depth = u8::try_from(depth)
        .ok()
        .filter(|depth| *depth < u8::MAX)
        .ok_or(LoweringError::LoopDepthOverflow { id, depth })?;

    Ok(LoopShape {
        set_iteration: (position, index),
        decrement,
        latch_branch: (decrement.0, conditional),
        depth,
        count,
        exit,
    })
}

/// Removes the instructions at the given locations. Indices within a block
/// are removed from the back so earlier ones stay valid.
fn remove_all(function: &mut lir::Function, mut locations: Vec<(usize, usize)>) {
    locations.sort_unstable();
    locations.dedup();

    for (position, index) in locations.into_iter().rev() {
        function.blocks[position].instructions.remove(index);
    }
}

fn rematerialize(function: &mut lir::Function, shape: LoopShape) {
    let (position, index) = shape.set_iteration;

    function.blocks[position].instructions.insert(
        index,
        Instruction::Loop {
            depth: shape.depth,
            count: shape.count,
            exit: shape.exit,
        },
    );

    let shift = |(block, at): (usize, usize)| {
        if block == position && at >= index {
            (block, at + 1)
        } else {
            (block, at)
        }
    };

    remove_all(
        function,
        vec![
            shift(shape.set_iteration),
            shift(shape.latch_branch),
            shift(shape.decrement),
        ],
    );
}

/// Folds every set-iteration/decrement pair of `function` into one hardware
/// loop instruction. Returns whether anything changed.
pub fn rematerialize_hardware_loops(function: &mut lir::Function) -> LoweringResult<bool> {
    let mut changed = false;

    while let Some(set_iteration) = find_set_iteration(function) {
        let position = set_iteration.position;
        let shape = analyze(function, set_iteration)?;

        tracing::debug!(
            preheader = %function.blocks[position].id,
            latch = %function.blocks[shape.decrement.0].id,
            exit = %shape.exit,
            depth = shape.depth,
            "rematerialized hardware loop"
        );

        rematerialize(function, shape);
        changed = true;
    }

    Ok(changed)
}
