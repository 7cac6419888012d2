//! The middle of the compiler works on MIR, where loops are still visible as
//! a block graph. Trip count markers are paired into hardware loops here and
//! the IR is tidied up for instruction selection.

pub mod block_order;
pub mod hardware_loops;
pub mod loops;
pub mod mir;
pub mod predicate_sinking;
pub mod select_cleanup;
pub mod ty;
