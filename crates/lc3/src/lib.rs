//! This crate explores the executions of LC-3 programs symbolically. Inputs marked symbolic in
//! the [image::ProgramImage] are carried through execution as expressions, and a state forks
//! whenever a branch or a memory address depends on them. Defects found along the way are
//! reported as [issue::Issue]s.
//!
//! ### Searching
//!
//! Loops quickly make the number of paths intractable. The [search::PruningSearcher] decomposes
//! every loop found by the [loops::LoopAnalyzer] into a finite set of segments and postpones
//! states that cannot cover a new one. Postponed states are reactivated once nothing else is
//! left to run, so no path is discarded.
//!
//! The [driver::Explorer] ties the pieces together.

pub mod alloc;
pub mod config;
pub mod coverage;
pub mod driver;
pub mod executor;
pub mod flow;
pub mod image;
pub mod isa;
pub mod issue;
pub mod limits;

/// Module for finding loops and the segments they decompose into.
pub mod loops;
pub mod mem;

/// Module for scheduling the states waiting to be stepped.
pub mod search;
pub mod state;

/// Module for tracking which subroutine each node and state belongs to.
pub mod subroutine;

pub use driver::{Explorer, Summary};

#[cfg(test)]
mod tests;
