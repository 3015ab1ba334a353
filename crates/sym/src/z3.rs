use ::z3::ast::{Ast, Bool, BV};
use ::z3::{Config, Context, SatResult};

use crate::solver::{Error, Result, Solver};
use crate::{ConstraintSet, Predicate, SymbolicWord, VariableAssignments};

/// A [Solver] backed by z3. A fresh context is created for every query.
#[derive(Clone, Debug, Default)]
pub struct Z3Solver;

impl Z3Solver {
    pub fn new() -> Self {
        Self
    }
}

fn variable<'ctx>(ctx: &'ctx Context, id: usize) -> BV<'ctx> {
    BV::new_const(ctx, format!("v{id}"), 16)
}

fn word<'ctx>(ctx: &'ctx Context, word: &SymbolicWord) -> BV<'ctx> {
    match word {
        SymbolicWord::Literal(x) => BV::from_u64(ctx, *x as u64, 16),
        SymbolicWord::Variable(id) => variable(ctx, *id),
        SymbolicWord::Not(x) => self::word(ctx, x).bvnot(),
        SymbolicWord::Add(x, y) => self::word(ctx, x).bvadd(&self::word(ctx, y)),
        SymbolicWord::Mul(x, y) => self::word(ctx, x).bvmul(&self::word(ctx, y)),
        SymbolicWord::And(x, y) => self::word(ctx, x).bvand(&self::word(ctx, y)),
        SymbolicWord::LogicalShiftRight(x, amount) => {
            self::word(ctx, x).bvlshr(&BV::from_u64(ctx, *amount as u64, 16))
        }
    }
}

fn predicate<'ctx>(ctx: &'ctx Context, predicate: &Predicate) -> Bool<'ctx> {
    match predicate {
        Predicate::Literal(b) => Bool::from_bool(ctx, *b),
        Predicate::Equal(x, y) => word(ctx, x)._eq(&word(ctx, y)),
        Predicate::UnsignedLessThan(x, y) => word(ctx, x).bvult(&word(ctx, y)),
        Predicate::UnsignedLessThanEq(x, y) => word(ctx, x).bvule(&word(ctx, y)),
        Predicate::SignedLessThan(x, y) => word(ctx, x).bvslt(&word(ctx, y)),
        Predicate::SignedLessThanEq(x, y) => word(ctx, x).bvsle(&word(ctx, y)),
        Predicate::Not(x) => self::predicate(ctx, x).not(),
        Predicate::And(x, y) => Bool::and(ctx, &[&self::predicate(ctx, x), &self::predicate(ctx, y)]),
    }
}

impl Solver for Z3Solver {
    fn may_be_true(&self, constraints: &ConstraintSet, query: &Predicate) -> Result<bool> {
        let config = Config::new();
        let ctx = Context::new(&config);
        let solver = ::z3::Solver::new(&ctx);
        for constraint in constraints.iter().chain(std::iter::once(query)) {
            solver.assert(&predicate(&ctx, constraint));
        }

        match solver.check() {
            SatResult::Sat => Ok(true),
            SatResult::Unsat => Ok(false),
            SatResult::Unknown => Err(Error::Unknown(
                solver.get_reason_unknown().unwrap_or_default(),
            )),
        }
    }

    fn get_model(
        &self,
        constraints: &ConstraintSet,
        variables: &[usize],
    ) -> Result<Option<VariableAssignments>> {
        let config = Config::new();
        let ctx = Context::new(&config);
        let solver = ::z3::Solver::new(&ctx);
        for constraint in constraints.iter() {
            solver.assert(&predicate(&ctx, constraint));
        }

        match solver.check() {
            SatResult::Sat => (),
            SatResult::Unsat => return Ok(None),
            SatResult::Unknown => {
                return Err(Error::Unknown(
                    solver.get_reason_unknown().unwrap_or_default(),
                ));
            }
        }

        let Some(model) = solver.get_model() else {
            return Err(Error::Unknown(String::from("satisfiable without a model")));
        };

        Ok(Some(
            variables
                .iter()
                .map(|id| {
                    let value = model
                        .eval(&variable(&ctx, *id), true)
                        .and_then(|value| value.as_u64())
                        .unwrap_or_default();
                    (*id, value as u16)
                })
                .collect(),
        ))
    }
}
