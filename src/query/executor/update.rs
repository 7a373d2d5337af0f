use std::collections::HashMap;
use std::sync::Arc;

use crate::common::types::Rid;
use crate::common::value::DataValue;
use crate::index::TableIndex;
use crate::query::executor::{Executor, ExecutorContext, ExecutorError, QueryResult};
use crate::storage::page::PageError;
use crate::storage::table::heap::TableError;
use crate::storage::table::{TableHeap, Tuple};
use crate::transaction::transaction::{IndexWriteRecord, IsolationLevel, TableWriteRecord, WriteType};

/// How one column changes.
#[derive(Debug, Clone)]
pub enum UpdateOp {
    Set(DataValue),
    Add(i64),
}

/// Update every tuple the child produces. Updates run in place when the new
/// record fits the old slot; otherwise the tuple is deleted and reinserted,
/// which moves it to a new rid that gets its own exclusive lock.
pub struct UpdateExecutor {
    context: Arc<ExecutorContext>,
    table: Arc<TableHeap>,
    indexes: Vec<Arc<TableIndex>>,
    child: Box<dyn Executor>,
    update_attrs: HashMap<usize, UpdateOp>,
}

impl UpdateExecutor {
    pub fn new(
        context: Arc<ExecutorContext>,
        table: Arc<TableHeap>,
        indexes: Vec<Arc<TableIndex>>,
        child: Box<dyn Executor>,
        update_attrs: HashMap<usize, UpdateOp>,
    ) -> Self {
        Self {
            context,
            table,
            indexes,
            child,
            update_attrs,
        }
    }

    fn generate_updated_tuple(&self, src: &Tuple) -> Tuple {
        let values = src
            .values()
            .iter()
            .enumerate()
            .map(|(idx, value)| match self.update_attrs.get(&idx) {
                None => value.clone(),
                Some(UpdateOp::Set(new_value)) => new_value.clone(),
                Some(UpdateOp::Add(delta)) => match value {
                    DataValue::Integer(i) => DataValue::Integer(i + delta),
                    other => other.clone(),
                },
            })
            .collect();
        Tuple::new(values)
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        let (old_tuple, rid) = match self.child.next()? {
            Some(found) => found,
            None => return Ok(None),
        };
        let new_tuple = self.generate_updated_tuple(&old_tuple);

        let txn = self.context.txn();
        if txn.isolation_level() == IsolationLevel::RepeatableRead {
            self.context.lock_manager().lock_upgrade(txn, rid)?;
        } else {
            self.context.lock_manager().lock_exclusive(txn, rid)?;
        }

        let mut new_rid = rid;
        let mut delete_insert = false;
        match self.table.update_tuple(rid, &new_tuple) {
            Ok(()) => {
                txn.append_table_write(TableWriteRecord {
                    rid,
                    tuple: new_tuple.clone(),
                    write_type: WriteType::Update {
                        old_tuple: old_tuple.clone(),
                    },
                    table: Arc::clone(&self.table),
                });
            }
            Err(TableError::Page(PageError::InsufficientSpace)) => {
                // No room in place: delete and reinsert under a fresh rid.
                self.table.mark_delete(rid)?;
                txn.append_table_write(TableWriteRecord {
                    rid,
                    tuple: old_tuple.clone(),
                    write_type: WriteType::Delete,
                    table: Arc::clone(&self.table),
                });

                new_rid = self.table.insert_tuple(&new_tuple)?;
                self.context.lock_manager().lock_exclusive(txn, new_rid)?;
                txn.append_table_write(TableWriteRecord {
                    rid: new_rid,
                    tuple: new_tuple.clone(),
                    write_type: WriteType::Insert,
                    table: Arc::clone(&self.table),
                });
                delete_insert = true;
            }
            Err(e) => return Err(ExecutorError::Table(e)),
        }

        for index in &self.indexes {
            let key_changed = index.key_of(&old_tuple) != index.key_of(&new_tuple);
            if !(delete_insert || key_changed) {
                // The indexed column kept its value and the tuple kept its
                // rid, so the entry is still right.
                continue;
            }
            index.delete_entry(&old_tuple, rid)?;
            txn.append_index_write(IndexWriteRecord {
                rid,
                tuple: old_tuple.clone(),
                write_type: WriteType::Delete,
                index: Arc::clone(index),
            });
            index.insert_entry(&new_tuple, new_rid)?;
            txn.append_index_write(IndexWriteRecord {
                rid: new_rid,
                tuple: new_tuple.clone(),
                write_type: WriteType::Insert,
                index: Arc::clone(index),
            });
        }

        Ok(Some((new_tuple, new_rid)))
    }
}
