use std::sync::Arc;

use crate::common::types::Rid;
use crate::index::TableIndex;
use crate::query::executor::{Executor, ExecutorContext, QueryResult};
use crate::storage::table::{TableHeap, Tuple};
use crate::transaction::transaction::{IndexWriteRecord, TableWriteRecord, WriteType};

enum InsertSource {
    RawValues { rows: Vec<Tuple>, cursor: usize },
    Child(Box<dyn Executor>),
}

/// Insert tuples into a table, locking each new rid exclusively and
/// reflecting the insert into every index on the table. Both writes are
/// recorded in the transaction so an abort can reverse them.
pub struct InsertExecutor {
    context: Arc<ExecutorContext>,
    table: Arc<TableHeap>,
    indexes: Vec<Arc<TableIndex>>,
    source: InsertSource,
}

impl InsertExecutor {
    /// Insert a literal list of rows.
    pub fn from_raw_values(
        context: Arc<ExecutorContext>,
        table: Arc<TableHeap>,
        indexes: Vec<Arc<TableIndex>>,
        rows: Vec<Tuple>,
    ) -> Self {
        Self {
            context,
            table,
            indexes,
            source: InsertSource::RawValues { rows, cursor: 0 },
        }
    }

    /// Insert everything a child executor produces.
    pub fn from_child(
        context: Arc<ExecutorContext>,
        table: Arc<TableHeap>,
        indexes: Vec<Arc<TableIndex>>,
        child: Box<dyn Executor>,
    ) -> Self {
        Self {
            context,
            table,
            indexes,
            source: InsertSource::Child(child),
        }
    }

    fn inner_next(&mut self) -> QueryResult<Option<Tuple>> {
        match &mut self.source {
            InsertSource::RawValues { rows, cursor } => {
                if *cursor >= rows.len() {
                    return Ok(None);
                }
                let tuple = rows[*cursor].clone();
                *cursor += 1;
                Ok(Some(tuple))
            }
            InsertSource::Child(child) => Ok(child.next()?.map(|(tuple, _)| tuple)),
        }
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> QueryResult<()> {
        match &mut self.source {
            InsertSource::RawValues { cursor, .. } => {
                *cursor = 0;
                Ok(())
            }
            InsertSource::Child(child) => child.init(),
        }
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let tuple = match self.inner_next()? {
            Some(tuple) => tuple,
            None => return Ok(None),
        };

        let rid = self.table.insert_tuple(&tuple)?;
        self.context
            .lock_manager()
            .lock_exclusive(self.context.txn(), rid)?;
        self.context.txn().append_table_write(TableWriteRecord {
            rid,
            tuple: tuple.clone(),
            write_type: WriteType::Insert,
            table: Arc::clone(&self.table),
        });

        for index in &self.indexes {
            index.insert_entry(&tuple, rid)?;
            self.context.txn().append_index_write(IndexWriteRecord {
                rid,
                tuple: tuple.clone(),
                write_type: WriteType::Insert,
                index: Arc::clone(index),
            });
        }

        Ok(Some((tuple, rid)))
    }
}
