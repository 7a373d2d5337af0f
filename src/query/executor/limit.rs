use crate::common::types::Rid;
use crate::query::executor::{Executor, QueryResult};
use crate::storage::table::Tuple;

/// Pass through at most `limit` tuples.
pub struct LimitExecutor {
    child: Box<dyn Executor>,
    limit: usize,
    emitted: usize,
}

impl LimitExecutor {
    pub fn new(child: Box<dyn Executor>, limit: usize) -> Self {
        Self {
            child,
            limit,
            emitted: 0,
        }
    }
}

impl Executor for LimitExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.emitted = 0;
        self.child.init()
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.emitted >= self.limit {
            return Ok(None);
        }
        match self.child.next()? {
            Some(found) => {
                self.emitted += 1;
                Ok(Some(found))
            }
            None => Ok(None),
        }
    }
}
