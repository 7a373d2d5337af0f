use std::sync::Arc;

use crate::common::types::Rid;
use crate::index::TableIndex;
use crate::query::executor::{Executor, ExecutorContext, QueryResult};
use crate::storage::table::{TableHeap, Tuple};
use crate::transaction::transaction::{IndexWriteRecord, IsolationLevel, TableWriteRecord, WriteType};

/// Delete every tuple the child produces: exclusive-lock the rid (upgrading
/// the scan's shared lock under REPEATABLE_READ), mark-delete in the heap,
/// remove from every index. The actual slot is freed at commit.
pub struct DeleteExecutor {
    context: Arc<ExecutorContext>,
    table: Arc<TableHeap>,
    indexes: Vec<Arc<TableIndex>>,
    child: Box<dyn Executor>,
}

impl DeleteExecutor {
    pub fn new(
        context: Arc<ExecutorContext>,
        table: Arc<TableHeap>,
        indexes: Vec<Arc<TableIndex>>,
        child: Box<dyn Executor>,
    ) -> Self {
        Self {
            context,
            table,
            indexes,
            child,
        }
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let (tuple, rid) = match self.child.next()? {
            Some(found) => found,
            None => return Ok(None),
        };

        let txn = self.context.txn();
        if txn.isolation_level() == IsolationLevel::RepeatableRead {
            self.context.lock_manager().lock_upgrade(txn, rid)?;
        } else {
            self.context.lock_manager().lock_exclusive(txn, rid)?;
        }

        self.table.mark_delete(rid)?;
        txn.append_table_write(TableWriteRecord {
            rid,
            tuple: tuple.clone(),
            write_type: WriteType::Delete,
            table: Arc::clone(&self.table),
        });

        for index in &self.indexes {
            index.delete_entry(&tuple, rid)?;
            txn.append_index_write(IndexWriteRecord {
                rid,
                tuple: tuple.clone(),
                write_type: WriteType::Delete,
                index: Arc::clone(index),
            });
        }

        Ok(Some((tuple, rid)))
    }
}
