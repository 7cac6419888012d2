//! Pairs up the generic trip count markers of every loop and gives each pair
//! a hardware loop id and nesting depth.
//!
//! Loop canonicalization leaves a `set_trip_count` marker in the preheader of
//! every counted loop and a `loop_decrement` marker in its latch. Here both
//! are replaced by their hardware forms, which carry a unique id so the two
//! can be found again after instruction selection, and the depth of the loop
//! counted in hardware loops only: a loop that stays a software loop does not
//! use up a nesting level of the loop unit.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::{
    error::{LoweringError, LoweringResult},
    middle::{
        loops::{Loop, LoopForest, LoopId},
        mir::{BlockId, Function, InstructionKind, Operand},
    },
};

/// Hands out hardware loop ids. Ids are unique per allocator, across threads.
#[derive(Debug, Default)]
pub struct LoopIdAllocator {
    next: AtomicU32,
}

/// Allocator shared by every function compiled in this process
pub static GLOBAL_LOOP_IDS: LoopIdAllocator = LoopIdAllocator::new();

impl LoopIdAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    /// Starts counting at `first`, for callers that want ids to be
    /// reproducible per compilation unit
    pub const fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    pub fn allocate(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Converts every loop of `function` carrying a trip count marker. Returns
/// whether anything changed.
pub fn assign_hardware_loop_ids(
    function: &mut Function,
    allocator: &LoopIdAllocator,
) -> LoweringResult<bool> {
    let forest = LoopForest::compute(function);

    tracing::debug!(
        function = %function.name,
        loops = forest.loops.len(),
        "assigning hardware loop ids"
    );

    let mut changed = false;
    for &root in &forest.roots {
        changed |= traverse_loop(function, &forest, root, 0, allocator)?;
    }

    Ok(changed)
}

fn traverse_loop(
    function: &mut Function,
    forest: &LoopForest,
    id: LoopId,
    depth: u32,
    allocator: &LoopIdAllocator,
) -> LoweringResult<bool> {
    let converted = convert_loop(function, &forest.loops[id], depth, allocator)?;
    let child_depth = depth + converted as u32;

    let mut changed = converted;
    for &child in &forest.loops[id].children {
        changed |= traverse_loop(function, forest, child, child_depth, allocator)?;
    }

    Ok(changed)
}

fn convert_loop(
    function: &mut Function,
    lp: &Loop,
    depth: u32,
    allocator: &LoopIdAllocator,
) -> LoweringResult<bool> {
    let Some(preheader) = lp.preheader else {
        tracing::trace!(header = %lp.header, "loop has no preheader, leaving it in software");
        return Ok(false);
    };

    let Some((setup, trip_count)) = find_trip_count_marker(function, preheader)? else {
        tracing::trace!(header = %lp.header, "loop has no trip count marker");
        return Ok(false);
    };

    let latch = lp
        .latch
        .ok_or(LoweringError::MissingLoopLatch { header: lp.header })?;

    let decrement = function.blocks[latch]
        .instructions
        .iter()
        .position(|instruction| matches!(instruction.kind, InstructionKind::LoopDecrement))
        .ok_or(LoweringError::MissingDecrementMarker { latch })?;

    let id = allocator.allocate();

    function.blocks[preheader].instructions[setup].kind = InstructionKind::HardwareLoopSetIter {
        id,
        depth,
        trip_count,
    };

    // the result value is kept so the latch branch still reads it
    function.blocks[latch].instructions[decrement].kind =
        InstructionKind::HardwareLoopIterDec { id };

    tracing::debug!(header = %lp.header, id, depth, "converted loop to a hardware loop");

    Ok(true)
}

fn find_trip_count_marker(
    function: &Function,
    preheader: BlockId,
) -> LoweringResult<Option<(usize, Operand)>> {
    let mut markers = function.blocks[preheader]
        .instructions
        .iter()
        .enumerate()
        .filter_map(|(index, instruction)| match instruction.kind {
            InstructionKind::SetTripCount { trip_count } => Some((index, trip_count)),
            _ => None,
        });

    let first = markers.next();
    if markers.next().is_some() {
        return Err(LoweringError::MultipleTripCountMarkers { preheader });
    }

    Ok(first)
}
