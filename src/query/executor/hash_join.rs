use std::collections::HashMap;

use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::common::value::DataValue;
use crate::query::executor::expression::Expression;
use crate::query::executor::{Executor, QueryResult};
use crate::storage::table::Tuple;

/// Hash join: `init` drains the whole left side into an in-memory hash
/// table keyed by the left join expression, then each right tuple probes
/// it, emitting matches in the order they sit in the left bucket.
pub struct HashJoinExecutor {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    left_key: Expression,
    right_key: Expression,
    hash_table: HashMap<DataValue, Vec<Tuple>>,
    /// Probe state: the current right tuple, its key and the position
    /// inside the matching left bucket.
    probe: Option<(Tuple, DataValue, usize)>,
}

impl HashJoinExecutor {
    pub fn new(
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
        left_key: Expression,
        right_key: Expression,
    ) -> Self {
        Self {
            left,
            right,
            left_key,
            right_key,
            hash_table: HashMap::new(),
            probe: None,
        }
    }
}

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.hash_table.clear();
        self.probe = None;

        // Build the left-side partition completely in memory.
        while let Some((tuple, _)) = self.left.next()? {
            let key = self.left_key.evaluate(&tuple);
            self.hash_table.entry(key).or_default().push(tuple);
        }
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        loop {
            if let Some((right_tuple, key, position)) = &mut self.probe {
                if let Some(bucket) = self.hash_table.get(key) {
                    if *position < bucket.len() {
                        let joined = bucket[*position].join(right_tuple);
                        *position += 1;
                        return Ok(Some((joined, Rid::new(INVALID_PAGE_ID, 0))));
                    }
                }
                self.probe = None;
            }

            let right_tuple = match self.right.next()? {
                Some((tuple, _)) => tuple,
                None => return Ok(None),
            };
            let key = self.right_key.evaluate(&right_tuple);
            if self.hash_table.contains_key(&key) {
                self.probe = Some((right_tuple, key, 0));
            }
        }
    }
}
