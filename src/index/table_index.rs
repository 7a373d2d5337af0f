use std::sync::Arc;

use crate::common::types::Rid;
use crate::common::value::DataValue;
use crate::index::hash::{ExtendibleHashTable, IndexError};
use crate::storage::buffer::BufferPool;
use crate::storage::table::Tuple;

/// A secondary index over one column of a table, backed by the extendible
/// hash table. Keys are collapsed to 64-bit index keys; values are rids.
pub struct TableIndex {
    name: String,
    key_column: usize,
    hash_table: ExtendibleHashTable<i64, Rid>,
}

impl TableIndex {
    pub fn new(
        name: impl Into<String>,
        key_column: usize,
        buffer_pool: Arc<dyn BufferPool>,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            name: name.into(),
            key_column,
            hash_table: ExtendibleHashTable::new(buffer_pool)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_column(&self) -> usize {
        self.key_column
    }

    /// The index key a tuple files under.
    pub fn key_of(&self, tuple: &Tuple) -> i64 {
        tuple.value(self.key_column).index_key()
    }

    pub fn insert_entry(&self, tuple: &Tuple, rid: Rid) -> Result<bool, IndexError> {
        self.hash_table.insert(&self.key_of(tuple), &rid)
    }

    pub fn delete_entry(&self, tuple: &Tuple, rid: Rid) -> Result<bool, IndexError> {
        self.hash_table.remove(&self.key_of(tuple), &rid)
    }

    /// All rids filed under the given column value.
    pub fn scan(&self, key: &DataValue) -> Result<Vec<Rid>, IndexError> {
        self.hash_table.get_value(&key.index_key())
    }
}
