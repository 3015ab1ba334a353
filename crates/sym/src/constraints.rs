use std::rc::Rc;

use crate::Predicate;

#[derive(Debug)]
struct Node {
    predicate: Predicate,
    parent: Option<Rc<Node>>,
}

/// An ordered, append-only set of [Predicate] constraints.
///
/// Cloning is constant time: the clone shares every existing constraint with the original and
/// the two diverge only in what is pushed afterwards. This makes it cheap to hand one copy to each
/// successor of a forked execution state.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    head: Option<Rc<Node>>,
    len: usize,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a constraint. A literal `true` carries no information and is not recorded.
    pub fn push(&mut self, predicate: Predicate) {
        if predicate == Predicate::Literal(true) {
            return;
        }

        self.head = Some(Rc::new(Node {
            predicate,
            parent: self.head.take(),
        }));
        self.len += 1;
    }

    /// Iterate over the constraints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Predicate> {
        let mut predicates = Vec::with_capacity(self.len);
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            predicates.push(&n.predicate);
            node = n.parent.as_deref();
        }

        predicates.into_iter().rev()
    }

    /// Returns true if this set contains a literal `false` constraint.
    pub fn is_trivially_false(&self) -> bool {
        self.iter().any(|p| *p == Predicate::Literal(false))
    }
}

impl Extend<Predicate> for ConstraintSet {
    fn extend<T: IntoIterator<Item = Predicate>>(&mut self, iter: T) {
        for predicate in iter {
            self.push(predicate);
        }
    }
}

impl FromIterator<Predicate> for ConstraintSet {
    fn from_iter<T: IntoIterator<Item = Predicate>>(iter: T) -> Self {
        let mut constraints = Self::new();
        constraints.extend(iter);
        constraints
    }
}

impl Drop for ConstraintSet {
    fn drop(&mut self) {
        // Unlink uniquely owned nodes iteratively so long chains do not recurse on drop
        let mut node = self.head.take();
        while let Some(n) = node {
            match Rc::try_unwrap(n) {
                Ok(mut n) => node = n.parent.take(),
                Err(_) => break,
            }
        }
    }
}
