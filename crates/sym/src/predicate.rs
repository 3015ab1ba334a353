use std::collections::BTreeSet;
use std::rc::Rc;

use crate::SymbolicWord;

/// A boolean condition over [SymbolicWord] values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Predicate {
    /// A literal `true` or `false` value.
    Literal(bool),

    Equal(Rc<SymbolicWord>, Rc<SymbolicWord>),
    UnsignedLessThan(Rc<SymbolicWord>, Rc<SymbolicWord>),
    UnsignedLessThanEq(Rc<SymbolicWord>, Rc<SymbolicWord>),
    SignedLessThan(Rc<SymbolicWord>, Rc<SymbolicWord>),
    SignedLessThanEq(Rc<SymbolicWord>, Rc<SymbolicWord>),

    /// The negation of a predicate. The `!` operator should be preferred to this, as it has the
    /// opportunity to perform simplifications where a direct construction does not.
    Not(Rc<Self>),

    /// The conjunction of two predicates. The `&` operator should be preferred to this, as it has
    /// the opportunity to perform simplifications where a direct construction does not.
    And(Rc<Self>, Rc<Self>),
}

impl Predicate {
    pub fn maybe_literal(&self) -> Option<bool> {
        match self {
            Self::Literal(b) => Some(*b),
            _ => None,
        }
    }

    /// Identifiers of every variable this predicate depends on.
    pub fn variables(&self) -> BTreeSet<usize> {
        let mut variables = BTreeSet::new();
        self.collect_variables(&mut variables);
        variables
    }

    pub(crate) fn collect_variables(&self, variables: &mut BTreeSet<usize>) {
        match self {
            Self::Literal(_) => (),
            Self::Equal(x, y)
            | Self::UnsignedLessThan(x, y)
            | Self::UnsignedLessThanEq(x, y)
            | Self::SignedLessThan(x, y)
            | Self::SignedLessThanEq(x, y) => {
                x.collect_variables(variables);
                y.collect_variables(variables);
            }
            Self::Not(x) => x.collect_variables(variables),
            Self::And(x, y) => {
                x.collect_variables(variables);
                y.collect_variables(variables);
            }
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(b) => write!(f, "{b}"),
            Self::Equal(x, y) => write!(f, "({x} == {y})"),
            Self::UnsignedLessThan(x, y) => write!(f, "({x} <u {y})"),
            Self::UnsignedLessThanEq(x, y) => write!(f, "({x} <=u {y})"),
            Self::SignedLessThan(x, y) => write!(f, "({x} <s {y})"),
            Self::SignedLessThanEq(x, y) => write!(f, "({x} <=s {y})"),
            Self::Not(x) => write!(f, "!{x}"),
            Self::And(x, y) => write!(f, "({x} && {y})"),
        }
    }
}

impl std::ops::Not for Predicate {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Literal(b) => Self::Literal(!b),
            Self::Not(x) => Rc::unwrap_or_clone(x),
            _ => Self::Not(Rc::new(self)),
        }
    }
}

impl std::ops::BitAnd for Predicate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Literal(false), _) | (_, Self::Literal(false)) => Self::Literal(false),
            (Self::Literal(true), x) | (x, Self::Literal(true)) => x,
            (x, y) if x == y => x,
            (x, y) => Self::And(Rc::new(x), Rc::new(y)),
        }
    }
}

impl std::ops::BitOr for Predicate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        !(!self & !rhs)
    }
}
