use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use crate::solver::{Error, Result, Solver};
use crate::{ConstraintSet, Evaluator, Predicate, SymbolicWord, VariableAssignments};

/// A [Solver] that decides queries by enumerating assignments of 16-bit variables.
///
/// Constraints are first split into conjuncts and then into independent groups that share no
/// variables. Only the groups reachable from the variables of the query are considered. Within a
/// group every variable domain is first narrowed by the constraints mentioning only that variable.
///
/// A group coupling several variables is first checked with every multi-variable subterm, such as
/// the difference of two inputs, replaced by a fresh variable. Comparisons of such terms against
/// constants are decided this way without enumerating pairs of inputs. Otherwise the remaining
/// multi-variable constraints are checked by backtracking in order of increasing domain size.
///
/// Queries over a single variable are always decided. Unsatisfiable queries that compare variables
/// directly, like `x < y`, or that relate several distinct multi-variable terms may exhaust the
/// assignment budget, in which case [Error::BudgetExceeded] is returned.
#[derive(Clone, Debug)]
pub struct EnumeratingSolver {
    budget: u64,
}

impl Default for EnumeratingSolver {
    fn default() -> Self {
        Self::with_budget(Self::DEFAULT_BUDGET)
    }
}

type Constraint<'a> = (&'a Predicate, BTreeSet<usize>);

impl EnumeratingSolver {
    pub const DEFAULT_BUDGET: u64 = 1 << 26;

    pub fn new() -> Self {
        Self::default()
    }

    /// Create a solver that gives up after trying `budget` assignments for a single query.
    pub fn with_budget(budget: u64) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Find an assignment satisfying every predicate, if one exists.
    pub fn solve<'a>(
        &self,
        predicates: impl IntoIterator<Item = &'a Predicate>,
    ) -> Result<Option<VariableAssignments>> {
        self.solve_with(predicates, true)
    }

    fn solve_with<'a>(
        &self,
        predicates: impl IntoIterator<Item = &'a Predicate>,
        abstract_terms: bool,
    ) -> Result<Option<VariableAssignments>> {
        let mut conjuncts = Vec::new();
        for predicate in predicates {
            split_conjuncts(predicate, &mut conjuncts);
        }

        let mut groups = UnionFind::default();
        let mut constraints = Vec::new();
        for predicate in conjuncts {
            let variables = predicate.variables();
            if let Some(first) = variables.first() {
                for variable in &variables {
                    groups.union(*first, *variable);
                }
                constraints.push((predicate, variables));
            } else if Evaluator::default().evaluate(predicate) == Some(false) {
                return Ok(None);
            }
        }

        let mut components: BTreeMap<usize, Vec<Constraint<'a>>> = BTreeMap::new();
        for constraint in constraints {
            if let Some(first) = constraint.1.first() {
                let root = groups.find(*first);
                components.entry(root).or_default().push(constraint);
            }
        }

        let mut model = VariableAssignments::default();
        for component in components.values() {
            match self.solve_component(component, abstract_terms)? {
                Some(assignments) => model.extend(assignments.iter()),
                None => return Ok(None),
            }
        }

        Ok(Some(model))
    }

    /// Returns true if the constraints are unsatisfiable even with every multi-variable term
    /// replaced by an independent variable. Giving up on the abstraction proves nothing.
    fn abstraction_unsatisfiable(&self, constraints: &[Constraint<'_>]) -> Result<bool> {
        let Some(abstracted) = TermAbstraction::apply(constraints) else {
            return Ok(false);
        };

        match self.solve_with(&abstracted, false) {
            Ok(model) => Ok(model.is_none()),
            Err(Error::BudgetExceeded { variables, .. }) => {
                tracing::trace!(variables, "abstraction exceeded the budget");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn solve_component(
        &self,
        constraints: &[Constraint<'_>],
        abstract_terms: bool,
    ) -> Result<Option<VariableAssignments>> {
        let variables: BTreeSet<usize> = constraints
            .iter()
            .flat_map(|(_, variables)| variables.iter().copied())
            .collect();

        if variables.len() == 1 {
            let id = variables.first().copied().unwrap_or_default();
            let mut evaluator = Evaluator::default();
            for value in 0..=u16::MAX {
                evaluator.assignments_mut().insert(id, value);
                if constraints
                    .iter()
                    .all(|(predicate, _)| evaluator.evaluate(predicate) == Some(true))
                {
                    return Ok(Some(evaluator.assignments().clone()));
                }
            }

            return Ok(None);
        }

        if abstract_terms && self.abstraction_unsatisfiable(constraints)? {
            return Ok(None);
        }

        let mut unary: BTreeMap<usize, Vec<&Predicate>> = BTreeMap::new();
        let mut coupled = Vec::new();
        for (predicate, predicate_variables) in constraints {
            if predicate_variables.len() == 1 {
                if let Some(id) = predicate_variables.first() {
                    unary.entry(*id).or_default().push(predicate);
                }
            } else {
                coupled.push((*predicate, predicate_variables));
            }
        }

        let mut domains = Vec::with_capacity(variables.len());
        for id in variables {
            let predicates = unary.get(&id).map(Vec::as_slice).unwrap_or_default();
            let mut evaluator = Evaluator::default();
            let domain: Vec<u16> = (0..=u16::MAX)
                .filter(|value| {
                    evaluator.assignments_mut().insert(id, *value);
                    predicates
                        .iter()
                        .all(|predicate| evaluator.evaluate(predicate) == Some(true))
                })
                .collect();

            if domain.is_empty() {
                return Ok(None);
            }

            domains.push((id, domain));
        }

        domains.sort_by_key(|(_, domain)| domain.len());
        let position: HashMap<usize, usize> = domains
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (*id, i))
            .collect();

        // Each coupled constraint is checked as soon as its last variable is assigned
        let mut checks: Vec<Vec<&Predicate>> = vec![Vec::new(); domains.len()];
        for (predicate, predicate_variables) in coupled {
            let depth = predicate_variables
                .iter()
                .filter_map(|id| position.get(id))
                .max()
                .copied()
                .unwrap_or_default();
            checks[depth].push(predicate);
        }

        let mut search = Backtrack {
            domains: &domains,
            checks: &checks,
            evaluator: Evaluator::default(),
            steps: 0,
            budget: self.budget,
        };

        if search.run(0)? {
            Ok(Some(search.evaluator.assignments().clone()))
        } else {
            Ok(None)
        }
    }
}

struct Backtrack<'a> {
    domains: &'a [(usize, Vec<u16>)],
    checks: &'a [Vec<&'a Predicate>],
    evaluator: Evaluator,
    steps: u64,
    budget: u64,
}

impl Backtrack<'_> {
    fn run(&mut self, depth: usize) -> Result<bool> {
        let Some((id, domain)) = self.domains.get(depth) else {
            return Ok(true);
        };

        for value in domain {
            self.steps += 1;
            if self.steps > self.budget {
                return Err(Error::BudgetExceeded {
                    variables: self.domains.len(),
                    budget: self.budget,
                });
            }

            self.evaluator.assignments_mut().insert(*id, *value);
            let consistent = self.checks[depth]
                .iter()
                .all(|predicate| self.evaluator.evaluate(predicate) == Some(true));

            if consistent && self.run(depth + 1)? {
                return Ok(true);
            }
        }

        self.evaluator.assignments_mut().remove(*id);
        Ok(false)
    }
}

/// Flatten nested conjunctions so each conjunct can be grouped on its own variables.
fn split_conjuncts<'a>(predicate: &'a Predicate, conjuncts: &mut Vec<&'a Predicate>) {
    match predicate {
        Predicate::And(lhs, rhs) => {
            split_conjuncts(lhs, conjuncts);
            split_conjuncts(rhs, conjuncts);
        }
        _ => conjuncts.push(predicate),
    }
}

/// Replaces each maximal word subterm over more than one variable with a fresh variable. Equal
/// terms share a variable. Every model of the original constraints induces a model of the
/// abstraction, so an unsatisfiable abstraction proves the original unsatisfiable.
struct TermAbstraction {
    next_variable: usize,
    terms: HashMap<SymbolicWord, usize>,
}

impl TermAbstraction {
    /// The abstracted constraints, or `None` if no term was replaced.
    fn apply(constraints: &[Constraint<'_>]) -> Option<Vec<Predicate>> {
        let next_variable = constraints
            .iter()
            .filter_map(|(_, variables)| variables.last())
            .max()
            .map_or(0, |max| max + 1);

        let mut abstraction = Self {
            next_variable,
            terms: HashMap::new(),
        };
        let abstracted: Vec<Predicate> = constraints
            .iter()
            .map(|(predicate, _)| abstraction.predicate(predicate))
            .collect();

        (!abstraction.terms.is_empty()).then_some(abstracted)
    }

    fn word(&mut self, word: &SymbolicWord) -> Rc<SymbolicWord> {
        if word.variables().len() < 2 {
            return Rc::new(word.clone());
        }

        let id = match self.terms.get(word) {
            Some(id) => *id,
            None => {
                let id = self.next_variable;
                self.next_variable += 1;
                self.terms.insert(word.clone(), id);
                id
            }
        };
        Rc::new(SymbolicWord::Variable(id))
    }

    fn predicate(&mut self, predicate: &Predicate) -> Predicate {
        match predicate {
            Predicate::Literal(b) => Predicate::Literal(*b),
            Predicate::Equal(x, y) => Predicate::Equal(self.word(x), self.word(y)),
            Predicate::UnsignedLessThan(x, y) => {
                Predicate::UnsignedLessThan(self.word(x), self.word(y))
            }
            Predicate::UnsignedLessThanEq(x, y) => {
                Predicate::UnsignedLessThanEq(self.word(x), self.word(y))
            }
            Predicate::SignedLessThan(x, y) => {
                Predicate::SignedLessThan(self.word(x), self.word(y))
            }
            Predicate::SignedLessThanEq(x, y) => {
                Predicate::SignedLessThanEq(self.word(x), self.word(y))
            }
            Predicate::Not(x) => Predicate::Not(Rc::new(self.predicate(x))),
            Predicate::And(x, y) => {
                Predicate::And(Rc::new(self.predicate(x)), Rc::new(self.predicate(y)))
            }
        }
    }
}

/// Constraints transitively sharing variables with `query`.
fn relevant_constraints<'a>(
    constraints: &'a ConstraintSet,
    query: &Predicate,
) -> Vec<&'a Predicate> {
    let mut variables = query.variables();
    let mut candidates: Vec<Option<Constraint<'a>>> = constraints
        .iter()
        .map(|predicate| Some((predicate, predicate.variables())))
        .collect();

    let mut relevant = Vec::new();
    loop {
        let mut changed = false;
        for candidate in candidates.iter_mut() {
            let overlaps = candidate
                .as_ref()
                .is_some_and(|(_, vars)| !vars.is_disjoint(&variables));
            if overlaps && let Some((predicate, vars)) = candidate.take() {
                variables.extend(vars);
                relevant.push(predicate);
                changed = true;
            }
        }

        if !changed {
            return relevant;
        }
    }
}

impl Solver for EnumeratingSolver {
    fn may_be_true(&self, constraints: &ConstraintSet, query: &Predicate) -> Result<bool> {
        if let Some(b) = query.maybe_literal() {
            return Ok(b);
        }

        let mut predicates = relevant_constraints(constraints, query);
        tracing::trace!(constraints = predicates.len(), %query, "enumerating query");
        predicates.push(query);
        Ok(self.solve(predicates)?.is_some())
    }

    fn get_model(
        &self,
        constraints: &ConstraintSet,
        variables: &[usize],
    ) -> Result<Option<VariableAssignments>> {
        let Some(model) = self.solve(constraints.iter())? else {
            return Ok(None);
        };

        Ok(Some(
            variables
                .iter()
                .map(|id| (*id, model.get(*id).unwrap_or_default()))
                .collect(),
        ))
    }
}

#[derive(Default)]
struct UnionFind {
    parent: HashMap<usize, usize>,
}

impl UnionFind {
    fn find(&mut self, mut x: usize) -> usize {
        loop {
            let parent = *self.parent.entry(x).or_insert(x);
            if parent == x {
                return x;
            }

            let grandparent = *self.parent.entry(parent).or_insert(parent);
            self.parent.insert(x, grandparent);
            x = grandparent;
        }
    }

    fn union(&mut self, x: usize, y: usize) {
        let x = self.find(x);
        let y = self.find(y);
        if x != y {
            self.parent.insert(x, y);
        }
    }
}
