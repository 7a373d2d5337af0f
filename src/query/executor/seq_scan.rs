use std::sync::Arc;

use crate::common::types::Rid;
use crate::query::executor::expression::Expression;
use crate::query::executor::{Executor, ExecutorContext, QueryResult};
use crate::storage::table::heap::TableError;
use crate::storage::table::{TableHeap, TableIterator, Tuple};
use crate::transaction::transaction::IsolationLevel;

/// Sequential scan over a table heap with an optional predicate.
///
/// Every tuple is read under the lock its isolation level demands: no lock
/// under READ_UNCOMMITTED, a shared lock released right after the copy
/// under READ_COMMITTED, a shared lock held to commit under
/// REPEATABLE_READ.
pub struct SeqScanExecutor {
    context: Arc<ExecutorContext>,
    table: Arc<TableHeap>,
    predicate: Option<Expression>,
    iter: Option<TableIterator>,
}

impl SeqScanExecutor {
    pub fn new(
        context: Arc<ExecutorContext>,
        table: Arc<TableHeap>,
        predicate: Option<Expression>,
    ) -> Self {
        Self {
            context,
            table,
            predicate,
            iter: None,
        }
    }

    fn tuple_entry(&self, rid: Rid) -> QueryResult<()> {
        if self.context.txn().isolation_level() == IsolationLevel::ReadUncommitted {
            return Ok(());
        }
        self.context.lock_manager().lock_shared(self.context.txn(), rid)?;
        Ok(())
    }

    fn tuple_exit(&self, rid: Rid) {
        if self.context.txn().isolation_level() == IsolationLevel::ReadCommitted {
            self.context.lock_manager().unlock(self.context.txn(), rid);
        }
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.iter = Some(self.table.iter());
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        loop {
            let item = match self.iter.as_mut().and_then(|iter| iter.next()) {
                Some(item) => item,
                None => return Ok(None),
            };
            let (_, rid) = item?;

            self.tuple_entry(rid)?;
            // Re-read under the lock; the unlocked iterator peek may be
            // stale by the time the lock is granted.
            let tuple = match self.table.get_tuple(rid) {
                Ok(tuple) => tuple,
                Err(TableError::TupleNotFound(_)) => {
                    self.tuple_exit(rid);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let selected = self
                .predicate
                .as_ref()
                .map_or(true, |p| p.evaluate(&tuple).is_true());
            self.tuple_exit(rid);

            if selected {
                return Ok(Some((tuple, rid)));
            }
        }
    }
}
