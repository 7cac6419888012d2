//! Runs the lowering passes over one function, from MIR carrying generic loop
//! markers to LIR where counted loops are single hardware instructions.

use crate::{
    backend::{
        hardware_loops::rematerialize_hardware_loops, isel::select_instructions, lir,
        loop_pseudo::place_set_iterations,
    },
    error::LoweringResult,
    middle::{
        block_order::order_blocks,
        hardware_loops::{LoopIdAllocator, assign_hardware_loop_ids},
        mir,
        predicate_sinking::sink_predicate_conditions,
        select_cleanup::remove_redundant_selects,
    },
    options::CodegenOptions,
};

/// Lowers `function` to LIR. The MIR is rewritten in place along the way.
///
/// Loop ids are drawn from `loop_ids`, so functions of one compilation unit
/// should share an allocator.
pub fn lower_function(
    function: &mut mir::Function,
    options: &CodegenOptions,
    loop_ids: &LoopIdAllocator,
) -> LoweringResult<lir::Function> {
    let _span = tracing::debug_span!("lower_function", function = %function.name).entered();

    let selects = remove_redundant_selects(function);

    let loops = if options.hardware_loops {
        assign_hardware_loop_ids(function, loop_ids)?
    } else {
        false
    };

    let sunk = sink_predicate_conditions(function);
    let reordered = options.reorder_blocks && order_blocks(function);

    tracing::debug!(selects, loops, sunk, reordered, "mir passes done");

    let mut lowered = select_instructions(function, options)?;

    let placed = place_set_iterations(&mut lowered);
    let rematerialized = rematerialize_hardware_loops(&mut lowered)?;

    tracing::debug!(
        placed,
        rematerialized,
        instructions = lowered.instruction_count(),
        "lir passes done"
    );

    Ok(lowered)
}
