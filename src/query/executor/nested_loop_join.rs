use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::query::executor::expression::Expression;
use crate::query::executor::{Executor, QueryResult};
use crate::storage::table::Tuple;

/// Nested loop join: for every left tuple, rescan the right side and emit
/// the concatenated tuples that pass the predicate (evaluated over left
/// columns followed by right columns). Joined rows have no rid of their
/// own.
pub struct NestedLoopJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    predicate: Option<Expression>,
    left_tuple: Option<Tuple>,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        predicate: Option<Expression>,
    ) -> Self {
        Self {
            left,
            right,
            predicate,
            left_tuple: None,
        }
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.left_tuple = self.left.next()?.map(|(tuple, _)| tuple);
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        loop {
            let left_tuple = match &self.left_tuple {
                Some(tuple) => tuple.clone(),
                None => return Ok(None),
            };

            let right_tuple = match self.right.next()? {
                Some((tuple, _)) => tuple,
                None => {
                    // Right side exhausted: advance the outer side and
                    // start the inner scan over.
                    self.left_tuple = self.left.next()?.map(|(tuple, _)| tuple);
                    if self.left_tuple.is_none() {
                        return Ok(None);
                    }
                    self.right.init()?;
                    continue;
                }
            };

            let joined = left_tuple.join(&right_tuple);
            let selected = self
                .predicate
                .as_ref()
                .map_or(true, |p| p.evaluate(&joined).is_true());
            if selected {
                return Ok(Some((joined, Rid::new(INVALID_PAGE_ID, 0))));
            }
        }
    }
}
