use crate::*;

#[test]
fn evaluate_literal() {
    let eval = Evaluator::default();
    assert_eq!(eval.evaluate_word(&SymbolicWord::Literal(7)), Some(7));
    assert_eq!(eval.evaluate(&Predicate::Literal(true)), Some(true));
}

#[test]
fn evaluate_variable() {
    let eval = Evaluator::new(VariableAssignments::from_iter([(0, 3), (1, 0xFFFF)]));
    assert_eq!(eval.evaluate_word(&SymbolicWord::Variable(0)), Some(3));
    assert_eq!(eval.evaluate_word(&SymbolicWord::Variable(1)), Some(0xFFFF));
    assert_eq!(eval.evaluate_word(&SymbolicWord::Variable(2)), None);
}

#[test]
fn evaluate_expression() {
    let x = SymbolicWord::Variable(0);
    let y = SymbolicWord::Variable(1);
    let eval = Evaluator::new(VariableAssignments::from_iter([(0, 3), (1, 0xFFFF)]));
    assert_eq!(eval.evaluate_word(&(x.clone() + y.clone())), Some(2));
    assert_eq!(eval.evaluate(&y.clone().signed_less_than(x.clone())), Some(true));
    assert_eq!(eval.evaluate(&y.unsigned_less_than(x)), Some(false));
}

#[test]
fn evaluate_short_circuit() {
    let x = SymbolicWord::Variable(0);
    let unknown = SymbolicWord::Variable(1).equals(ZERO);
    let eval = Evaluator::new(VariableAssignments::from_iter([(0, 0)]));

    // Multiplying and masking by zero does not need the other operand
    assert_eq!(eval.evaluate_word(&(x.clone() * SymbolicWord::Variable(1))), Some(0));
    assert_eq!(eval.evaluate_word(&(x.clone() & SymbolicWord::Variable(1))), Some(0));

    let falsehood = x.clone().equals(SymbolicWord::Literal(1));
    assert_eq!(eval.evaluate(&(unknown.clone() & falsehood)), Some(false));
    assert_eq!(eval.evaluate(&(unknown & x.equals(ZERO))), None);
}
