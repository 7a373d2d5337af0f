use crate::common::value::DataValue;
use crate::storage::table::Tuple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// A minimal evaluable expression over a tuple: column references,
/// literals, comparisons and conjunctions. Enough for scan predicates,
/// join keys and HAVING clauses.
#[derive(Debug, Clone)]
pub enum Expression {
    Column(usize),
    Literal(DataValue),
    Compare(CompareOp, Box<Expression>, Box<Expression>),
    And(Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn column(index: usize) -> Self {
        Expression::Column(index)
    }

    pub fn literal(value: DataValue) -> Self {
        Expression::Literal(value)
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare(op, Box::new(left), Box::new(right))
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Expression::And(Box::new(left), Box::new(right))
    }

    pub fn evaluate(&self, tuple: &Tuple) -> DataValue {
        match self {
            Expression::Column(index) => tuple.value(*index).clone(),
            Expression::Literal(value) => value.clone(),
            Expression::Compare(op, left, right) => {
                let left = left.evaluate(tuple);
                let right = right.evaluate(tuple);
                DataValue::Boolean(compare(*op, &left, &right))
            }
            Expression::And(left, right) => {
                DataValue::Boolean(left.evaluate(tuple).is_true() && right.evaluate(tuple).is_true())
            }
        }
    }
}

/// Compare two values. Mismatched types and NULLs never compare equal, in
/// line with the usual three-valued-logic collapse to false.
fn compare(op: CompareOp, left: &DataValue, right: &DataValue) -> bool {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (DataValue::Integer(l), DataValue::Integer(r)) => l.cmp(r),
        (DataValue::Text(l), DataValue::Text(r)) => l.cmp(r),
        (DataValue::Boolean(l), DataValue::Boolean(r)) => l.cmp(r),
        _ => return false,
    };

    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::LtEq => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::GtEq => ordering != Ordering::Less,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple() -> Tuple {
        Tuple::new(vec![
            DataValue::Integer(5),
            DataValue::Text("abc".to_string()),
            DataValue::Null,
        ])
    }

    #[test]
    fn test_comparisons() {
        let ge = Expression::compare(
            CompareOp::GtEq,
            Expression::column(0),
            Expression::literal(DataValue::Integer(5)),
        );
        assert!(ge.evaluate(&tuple()).is_true());

        let lt = Expression::compare(
            CompareOp::Lt,
            Expression::column(1),
            Expression::literal(DataValue::Text("abd".to_string())),
        );
        assert!(lt.evaluate(&tuple()).is_true());
    }

    #[test]
    fn test_null_never_equals() {
        let eq = Expression::compare(
            CompareOp::Eq,
            Expression::column(2),
            Expression::literal(DataValue::Null),
        );
        assert!(!eq.evaluate(&tuple()).is_true());
    }

    #[test]
    fn test_and() {
        let both = Expression::and(
            Expression::compare(
                CompareOp::Eq,
                Expression::column(0),
                Expression::literal(DataValue::Integer(5)),
            ),
            Expression::compare(
                CompareOp::Eq,
                Expression::column(1),
                Expression::literal(DataValue::Text("abc".to_string())),
            ),
        );
        assert!(both.evaluate(&tuple()).is_true());
    }
}
