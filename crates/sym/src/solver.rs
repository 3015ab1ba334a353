use thiserror;

use crate::{ConstraintSet, Predicate, VariableAssignments};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The enumeration of assignments for a group of related variables exceeded the configured
    /// budget before an answer was found.
    #[error("search over {variables} related variables exceeded budget of {budget} assignments")]
    BudgetExceeded { variables: usize, budget: u64 },

    /// The backend could not decide the query.
    #[error("solver returned unknown: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The validity of a query under a set of constraints.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Validity {
    /// The query holds in every model of the constraints.
    True,

    /// The query holds in no model of the constraints.
    False,

    /// The query holds in some models but not all.
    Unknown,
}

/// Satisfiability queries over [ConstraintSet] values.
///
/// Every query assumes the constraints themselves are satisfiable. A solver holds no state
/// between queries.
pub trait Solver {
    /// Returns true if some model of `constraints` also satisfies `query`.
    fn may_be_true(&self, constraints: &ConstraintSet, query: &Predicate) -> Result<bool>;

    /// Returns a model of `constraints` restricted to `variables`, or `None` if there is none.
    /// Variables left unconstrained are assigned an arbitrary value.
    fn get_model(
        &self,
        constraints: &ConstraintSet,
        variables: &[usize],
    ) -> Result<Option<VariableAssignments>>;

    /// Returns true if every model of `constraints` satisfies `query`.
    fn must_be_true(&self, constraints: &ConstraintSet, query: &Predicate) -> Result<bool> {
        Ok(!self.may_be_true(constraints, &!query.clone())?)
    }

    /// Returns true if no model of `constraints` satisfies `query`.
    fn must_be_false(&self, constraints: &ConstraintSet, query: &Predicate) -> Result<bool> {
        Ok(!self.may_be_true(constraints, query)?)
    }

    fn may_be_false(&self, constraints: &ConstraintSet, query: &Predicate) -> Result<bool> {
        Ok(!self.must_be_true(constraints, query)?)
    }

    fn evaluate(&self, constraints: &ConstraintSet, query: &Predicate) -> Result<Validity> {
        if let Some(b) = query.maybe_literal() {
            return Ok(if b { Validity::True } else { Validity::False });
        }

        if self.must_be_true(constraints, query)? {
            Ok(Validity::True)
        } else if self.must_be_false(constraints, query)? {
            Ok(Validity::False)
        } else {
            Ok(Validity::Unknown)
        }
    }
}

impl<S: Solver + ?Sized> Solver for &S {
    fn may_be_true(&self, constraints: &ConstraintSet, query: &Predicate) -> Result<bool> {
        (**self).may_be_true(constraints, query)
    }

    fn get_model(
        &self,
        constraints: &ConstraintSet,
        variables: &[usize],
    ) -> Result<Option<VariableAssignments>> {
        (**self).get_model(constraints, variables)
    }
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn may_be_true(&self, constraints: &ConstraintSet, query: &Predicate) -> Result<bool> {
        (**self).may_be_true(constraints, query)
    }

    fn get_model(
        &self,
        constraints: &ConstraintSet,
        variables: &[usize],
    ) -> Result<Option<VariableAssignments>> {
        (**self).get_model(constraints, variables)
    }
}
