//! The backend turns MIR into LIR: instruction selection over per-block
//! graphs, then the passes working on the linear instruction stream.
//!
//! Counted loops arrive here as a pair of pseudos sharing an id. Placement
//! puts the set-iteration pseudo where the hardware loop instruction belongs
//! and rematerialization folds each pair into that instruction.

pub mod hardware_loops;
pub mod isel;
pub mod lir;
pub mod loop_pseudo;
