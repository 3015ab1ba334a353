mod constraints;
mod enumerate;
mod eval;
mod predicate;
pub mod solver;
mod word;

#[cfg(feature = "z3")]
mod z3;

pub use crate::constraints::*;
pub use crate::enumerate::*;
pub use crate::eval::*;
pub use crate::predicate::*;
pub use crate::solver::{Error, Result, Solver, Validity};
pub use crate::word::*;

#[cfg(feature = "z3")]
pub use crate::z3::Z3Solver;

#[cfg(test)]
mod tests;
