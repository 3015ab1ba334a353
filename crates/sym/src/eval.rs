use std::collections::BTreeMap;

use crate::{Predicate, SymbolicWord};

/// A simple evaluator that evaluates [SymbolicWord] and [Predicate] values given a
/// [VariableAssignments]. Evaluation fails with `None` if a variable without an assignment is
/// required to determine the result.
#[derive(Clone, Debug, Default)]
pub struct Evaluator {
    assignments: VariableAssignments,
}

impl Evaluator {
    /// Create a new instance using the given [VariableAssignments]. The assignments are fixed for
    /// the lifetime of this evaluator.
    pub fn new(assignments: impl Into<VariableAssignments>) -> Self {
        Self {
            assignments: assignments.into(),
        }
    }

    pub fn assignments(&self) -> &VariableAssignments {
        &self.assignments
    }

    pub(crate) fn assignments_mut(&mut self) -> &mut VariableAssignments {
        &mut self.assignments
    }

    pub fn evaluate_word(&self, word: &SymbolicWord) -> Option<u16> {
        match word {
            SymbolicWord::Literal(x) => Some(*x),
            SymbolicWord::Variable(id) => self.assignments.get(*id),
            SymbolicWord::Not(x) => self.evaluate_word(x).map(|x| !x),
            SymbolicWord::Add(x, y) => {
                Some(self.evaluate_word(x)?.wrapping_add(self.evaluate_word(y)?))
            }
            SymbolicWord::Mul(x, y) => {
                let x = self.evaluate_word(x)?;
                if x == 0 {
                    return Some(0);
                }

                Some(x.wrapping_mul(self.evaluate_word(y)?))
            }
            SymbolicWord::And(x, y) => {
                let x = self.evaluate_word(x)?;
                if x == 0 {
                    return Some(0);
                }

                Some(x & self.evaluate_word(y)?)
            }
            SymbolicWord::LogicalShiftRight(x, amount) => {
                Some(self.evaluate_word(x)?.checked_shr(*amount).unwrap_or(0))
            }
        }
    }

    pub fn evaluate(&self, predicate: &Predicate) -> Option<bool> {
        match predicate {
            Predicate::Literal(b) => Some(*b),
            Predicate::Equal(x, y) => Some(self.evaluate_word(x)? == self.evaluate_word(y)?),
            Predicate::UnsignedLessThan(x, y) => {
                Some(self.evaluate_word(x)? < self.evaluate_word(y)?)
            }
            Predicate::UnsignedLessThanEq(x, y) => {
                Some(self.evaluate_word(x)? <= self.evaluate_word(y)?)
            }
            Predicate::SignedLessThan(x, y) => {
                Some((self.evaluate_word(x)? as i16) < (self.evaluate_word(y)? as i16))
            }
            Predicate::SignedLessThanEq(x, y) => {
                Some((self.evaluate_word(x)? as i16) <= (self.evaluate_word(y)? as i16))
            }
            Predicate::Not(x) => self.evaluate(x).map(|x| !x),
            Predicate::And(lhs, rhs) => match self.evaluate(lhs) {
                // LHS is false, do not need to evaluate RHS
                Some(false) => Some(false),
                Some(true) => self.evaluate(rhs),
                // LHS is not concrete. Should still evaluate RHS in case it is false
                None => match self.evaluate(rhs) {
                    Some(false) => Some(false),
                    _ => None,
                },
            },
        }
    }
}

impl From<VariableAssignments> for Evaluator {
    fn from(value: VariableAssignments) -> Self {
        Self::new(value)
    }
}

/// Mapping [SymbolicWord::Variable] identifiers to concrete values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableAssignments {
    assignments: BTreeMap<usize, u16>,
}

impl VariableAssignments {
    pub fn get(&self, variable_id: usize) -> Option<u16> {
        self.assignments.get(&variable_id).copied()
    }

    pub fn insert(&mut self, variable_id: usize, value: u16) -> Option<u16> {
        self.assignments.insert(variable_id, value)
    }

    pub fn remove(&mut self, variable_id: usize) -> Option<u16> {
        self.assignments.remove(&variable_id)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, u16)> + '_ {
        self.assignments.iter().map(|(id, value)| (*id, *value))
    }
}

impl<I: IntoIterator<Item = (usize, u16)>> From<I> for VariableAssignments {
    fn from(iter: I) -> Self {
        iter.into_iter().collect()
    }
}

impl FromIterator<(usize, u16)> for VariableAssignments {
    fn from_iter<T: IntoIterator<Item = (usize, u16)>>(iter: T) -> Self {
        Self {
            assignments: iter.into_iter().collect(),
        }
    }
}

impl Extend<(usize, u16)> for VariableAssignments {
    fn extend<T: IntoIterator<Item = (usize, u16)>>(&mut self, iter: T) {
        self.assignments.extend(iter)
    }
}
