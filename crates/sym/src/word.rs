use std::collections::BTreeSet;
use std::rc::Rc;

use crate::Predicate;

pub const ZERO: SymbolicWord = SymbolicWord::Literal(0);

/// A 16-bit value whose bits may depend on symbolic input variables. All arithmetic wraps modulo
/// 2^16.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolicWord {
    /// A concrete value.
    Literal(u16),

    /// A 16-bit input variable. Two variables with the same identifier are equivalent.
    Variable(usize),

    /// Bitwise complement. The `!` operator should be preferred to this, as it has the opportunity
    /// to perform simplifications where a direct construction does not.
    Not(Rc<Self>),

    /// Wrapping addition. When one side is a literal it is kept on the left.
    Add(Rc<Self>, Rc<Self>),

    /// Wrapping multiplication. When one side is a literal it is kept on the left.
    Mul(Rc<Self>, Rc<Self>),

    /// Bitwise conjunction. When one side is a literal it is kept on the left.
    And(Rc<Self>, Rc<Self>),

    /// Logical shift right by a constant amount in `1..16`.
    LogicalShiftRight(Rc<Self>, u32),
}

impl SymbolicWord {
    pub fn maybe_literal(&self) -> Option<u16> {
        match self {
            Self::Literal(x) => Some(*x),
            _ => None,
        }
    }

    pub fn maybe_variable(&self) -> Option<usize> {
        match self {
            Self::Variable(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    /// Construct `factor * word`, folding a zero factor to the literal `0` and a unit factor to
    /// `word` itself.
    pub fn scaled(factor: u16, word: Self) -> Self {
        Self::Literal(factor) * word
    }

    /// Decompose `k * x` where `k` is a literal. Returns the factor and the scaled expression.
    pub fn as_scaled(&self) -> Option<(u16, &Self)> {
        match self {
            Self::Mul(lhs, rhs) => lhs.maybe_literal().map(|factor| (factor, rhs.as_ref())),
            _ => None,
        }
    }

    /// Logical shift right by `amount` bits.
    pub fn logical_shift_right(self, amount: u32) -> Self {
        if amount == 0 {
            return self;
        }

        if amount >= 16 {
            return ZERO;
        }

        match self {
            Self::Literal(x) => Self::Literal(x >> amount),
            Self::LogicalShiftRight(_, inner) if inner + amount >= 16 => ZERO,
            Self::LogicalShiftRight(word, inner) => Self::LogicalShiftRight(word, inner + amount),
            _ => Self::LogicalShiftRight(Rc::new(self), amount),
        }
    }

    pub fn equals(self, rhs: Self) -> Predicate {
        if let (Self::Literal(x), Self::Literal(y)) = (&self, &rhs) {
            return Predicate::Literal(x == y);
        }

        if self == rhs {
            return Predicate::Literal(true);
        }

        Predicate::Equal(Rc::new(self), Rc::new(rhs))
    }

    pub fn unsigned_less_than(self, rhs: Self) -> Predicate {
        match (&self, &rhs) {
            (Self::Literal(x), Self::Literal(y)) => Predicate::Literal(x < y),
            (_, Self::Literal(0)) => Predicate::Literal(false),
            _ if self == rhs => Predicate::Literal(false),
            _ => Predicate::UnsignedLessThan(Rc::new(self), Rc::new(rhs)),
        }
    }

    pub fn unsigned_less_than_eq(self, rhs: Self) -> Predicate {
        match (&self, &rhs) {
            (Self::Literal(x), Self::Literal(y)) => Predicate::Literal(x <= y),
            (Self::Literal(0), _) | (_, Self::Literal(u16::MAX)) => Predicate::Literal(true),
            _ if self == rhs => Predicate::Literal(true),
            _ => Predicate::UnsignedLessThanEq(Rc::new(self), Rc::new(rhs)),
        }
    }

    pub fn signed_less_than(self, rhs: Self) -> Predicate {
        match (&self, &rhs) {
            (Self::Literal(x), Self::Literal(y)) => Predicate::Literal((*x as i16) < (*y as i16)),
            _ if self == rhs => Predicate::Literal(false),
            _ => Predicate::SignedLessThan(Rc::new(self), Rc::new(rhs)),
        }
    }

    pub fn signed_less_than_eq(self, rhs: Self) -> Predicate {
        match (&self, &rhs) {
            (Self::Literal(x), Self::Literal(y)) => Predicate::Literal((*x as i16) <= (*y as i16)),
            _ if self == rhs => Predicate::Literal(true),
            _ => Predicate::SignedLessThanEq(Rc::new(self), Rc::new(rhs)),
        }
    }

    /// Identifiers of every variable this word depends on.
    pub fn variables(&self) -> BTreeSet<usize> {
        let mut variables = BTreeSet::new();
        self.collect_variables(&mut variables);
        variables
    }

    pub(crate) fn collect_variables(&self, variables: &mut BTreeSet<usize>) {
        match self {
            Self::Literal(_) => (),
            Self::Variable(id) => {
                variables.insert(*id);
            }
            Self::Not(x) | Self::LogicalShiftRight(x, _) => x.collect_variables(variables),
            Self::Add(x, y) | Self::Mul(x, y) | Self::And(x, y) => {
                x.collect_variables(variables);
                y.collect_variables(variables);
            }
        }
    }
}

impl From<u16> for SymbolicWord {
    fn from(value: u16) -> Self {
        Self::Literal(value)
    }
}

impl std::fmt::Display for SymbolicWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(x) => write!(f, "x{x:04X}"),
            Self::Variable(id) => write!(f, "v{id}"),
            Self::Not(x) => write!(f, "~{x}"),
            Self::Add(x, y) => write!(f, "({x} + {y})"),
            Self::Mul(x, y) => write!(f, "({x} * {y})"),
            Self::And(x, y) => write!(f, "({x} & {y})"),
            Self::LogicalShiftRight(x, amount) => write!(f, "({x} >> {amount})"),
        }
    }
}

impl std::ops::Not for SymbolicWord {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            Self::Literal(x) => Self::Literal(!x),
            Self::Not(x) => Rc::unwrap_or_clone(x),
            _ => Self::Not(Rc::new(self)),
        }
    }
}

impl std::ops::Add for SymbolicWord {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Literal(x), Self::Literal(y)) => Self::Literal(x.wrapping_add(y)),
            (Self::Literal(0), y) | (y, Self::Literal(0)) => y,
            (Self::Literal(x), Self::Add(lhs, rhs)) | (Self::Add(lhs, rhs), Self::Literal(x))
                if lhs.is_literal() =>
            {
                // Keep constant offsets folded into a single literal
                let offset = lhs.maybe_literal().unwrap_or_default().wrapping_add(x);
                Self::Literal(offset) + Rc::unwrap_or_clone(rhs)
            }
            (x, Self::Literal(y)) => Self::Add(Rc::new(Self::Literal(y)), Rc::new(x)),
            (x, y) => Self::Add(Rc::new(x), Rc::new(y)),
        }
    }
}

impl std::ops::Sub for SymbolicWord {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        // Two's complement negation
        self + (!rhs + Self::Literal(1))
    }
}

impl std::ops::Mul for SymbolicWord {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Literal(x), Self::Literal(y)) => Self::Literal(x.wrapping_mul(y)),
            (Self::Literal(0), _) | (_, Self::Literal(0)) => ZERO,
            (Self::Literal(1), y) | (y, Self::Literal(1)) => y,
            (Self::Literal(x), Self::Mul(lhs, rhs)) | (Self::Mul(lhs, rhs), Self::Literal(x))
                if lhs.is_literal() =>
            {
                let factor = lhs.maybe_literal().unwrap_or_default().wrapping_mul(x);
                Self::Literal(factor) * Rc::unwrap_or_clone(rhs)
            }
            (x, Self::Literal(y)) => Self::Mul(Rc::new(Self::Literal(y)), Rc::new(x)),
            (x, y) => Self::Mul(Rc::new(x), Rc::new(y)),
        }
    }
}

impl std::ops::BitAnd for SymbolicWord {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        match (self, rhs) {
            (Self::Literal(x), Self::Literal(y)) => Self::Literal(x & y),
            (Self::Literal(0), _) | (_, Self::Literal(0)) => ZERO,
            (Self::Literal(u16::MAX), y) | (y, Self::Literal(u16::MAX)) => y,
            (x, y) if x == y => x,
            (x, Self::Literal(y)) => Self::And(Rc::new(Self::Literal(y)), Rc::new(x)),
            (x, y) => Self::And(Rc::new(x), Rc::new(y)),
        }
    }
}

impl std::ops::Shr<u32> for SymbolicWord {
    type Output = Self;

    fn shr(self, rhs: u32) -> Self::Output {
        self.logical_shift_right(rhs)
    }
}
