//! Sinks mask tests into the blocks branching on them
//!
//! Instruction selection only looks at one block at a time, so a branch on
//! `cmp (bitcast %mask), C` can only become a mask branch when the compare
//! and the bitcast live in the branch's own block. When either is defined
//! elsewhere, a copy is placed at the start of the branching block.

use crate::middle::{
    mir::{BlockId, Function, InstructionKind, Location, Operand, Terminator, ValueId},
    ty::LaneType,
};

struct MaskTest {
    compare: ValueId,
    compare_kind: InstructionKind,
    /// Which compare operand is the bitcast
    cast_operand: usize,
    cast: ValueId,
    mask: Operand,
}

fn definition_block(function: &Function, value: ValueId) -> Option<BlockId> {
    function.definition(value).map(|location| location.block)
}

/// The mask test `block` branches on, if any
fn branch_mask_test(function: &Function, block: BlockId) -> Option<MaskTest> {
    let Terminator::Branch {
        condition: Operand::Value(compare),
        ..
    } = function.blocks[block].terminator
    else {
        return None;
    };

    let compare_kind = function.defining_instruction(compare)?.kind.clone();
    let InstructionKind::Compare { lhs, rhs, .. } = &compare_kind else {
        return None;
    };

    let (cast_operand, cast, mask) = [*lhs, *rhs]
        .into_iter()
        .enumerate()
        .find_map(|(index, operand)| {
            let cast = operand.as_value()?;
            match function.defining_instruction(cast)?.kind {
                InstructionKind::Bitcast { value } => Some((index, cast, value)),
                _ => None,
            }
        })?;

    let vector_to_integer = function.operand_type(mask).is_vector()
        && !function.value_type(cast).is_vector();

    vector_to_integer.then_some(MaskTest {
        compare,
        compare_kind,
        cast_operand,
        cast,
        mask,
    })
}

fn set_compare_operand(kind: &mut InstructionKind, index: usize, value: ValueId) {
    if let InstructionKind::Compare { lhs, rhs, .. } = kind {
        match index {
            0 => *lhs = value.into(),
            _ => *rhs = value.into(),
        }
    }
}

fn sink_into(function: &mut Function, block: BlockId, test: MaskTest) -> bool {
    let MaskTest {
        compare,
        mut compare_kind,
        cast_operand,
        cast,
        mask,
    } = test;

    let remote_compare = definition_block(function, compare) != Some(block);
    let remote_cast = definition_block(function, cast) != Some(block);
    if !remote_compare && !remote_cast {
        return false;
    }

    let mut sunk_cast = None;
    if remote_cast {
        let ty = function.value_type(cast);
        let copy = function.insert(block, 0, InstructionKind::Bitcast { value: mask }, ty);
        set_compare_operand(&mut compare_kind, cast_operand, copy);
        sunk_cast = Some(copy);
    }

    if remote_compare {
        let ty = function.value_type(compare);
        // after the bitcast it reads
        let index = match sunk_cast {
            Some(_) => 1,
            None => function
                .definition(cast)
                .map_or(0, |location| location.index + 1),
        };
        let copy = function.insert(block, index, compare_kind, ty);

        if let Terminator::Branch { condition, .. } = &mut function.blocks[block].terminator {
            *condition = copy.into();
        }
    } else if let Some(Location { index, .. }) = function.definition(compare) {
        function.blocks[block].instructions[index].kind = compare_kind;
    }

    tracing::debug!(%block, %compare, remote_compare, remote_cast, "sank mask test");
    true
}

/// Makes every branch on a mask test see the test in its own block. Returns
/// whether anything changed.
pub fn sink_predicate_conditions(function: &mut Function) -> bool {
    let mut changed = false;

    for block in function.layout.clone() {
        if let Some(test) = branch_mask_test(function, block) {
            changed |= sink_into(function, block, test);
        }
    }

    changed
}
