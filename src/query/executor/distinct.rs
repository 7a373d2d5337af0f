use std::collections::HashSet;

use crate::common::types::Rid;
use crate::query::executor::{Executor, QueryResult};
use crate::storage::table::Tuple;

/// Drop duplicate tuples, keeping first-seen order.
pub struct DistinctExecutor {
    child: Box<dyn Executor>,
    seen: HashSet<Tuple>,
}

impl DistinctExecutor {
    pub fn new(child: Box<dyn Executor>) -> Self {
        Self {
            child,
            seen: HashSet::new(),
        }
    }
}

impl Executor for DistinctExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.seen.clear();
        self.child.init()
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        while let Some((tuple, rid)) = self.child.next()? {
            if self.seen.insert(tuple.clone()) {
                return Ok(Some((tuple, rid)));
            }
        }
        Ok(None)
    }
}
