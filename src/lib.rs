//! Control flow divergence analysis and hardware loop lowering for a
//! predicated vector target.
//!
//! The crate follows the usual compiler split. [`frontend`] classifies loops
//! and conditionals of the typed source tree as uniform or divergent,
//! [`middle`] pairs the trip count markers of counted loops on MIR and
//! [`backend`] selects instructions, combines mask predicates and folds every
//! counted loop into a single hardware loop instruction. [`pipeline`] runs the
//! MIR and LIR passes in order.

pub mod backend;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;
pub mod options;
pub mod pipeline;
