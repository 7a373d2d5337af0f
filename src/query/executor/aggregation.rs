use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::common::value::DataValue;
use crate::query::executor::expression::Expression;
use crate::query::executor::{Executor, QueryResult};
use crate::storage::table::Tuple;

/// Supported aggregate functions, each over one input column (or none for
/// COUNT(*)).
#[derive(Debug, Clone, Copy)]
pub enum AggregateType {
    CountStar,
    Count(usize),
    Sum(usize),
    Min(usize),
    Max(usize),
}

/// Hash aggregation: `init` materializes every group in a hash map keyed by
/// the group-by columns, `next` iterates the groups applying the optional
/// HAVING predicate.
///
/// Output tuples carry the group-by values first, then one value per
/// aggregate, which is also the layout the HAVING expression sees.
pub struct AggregationExecutor {
    child: Box<dyn Executor>,
    group_by: Vec<usize>,
    aggregates: Vec<AggregateType>,
    having: Option<Expression>,
    groups: Vec<Tuple>,
    cursor: usize,
}

impl AggregationExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        group_by: Vec<usize>,
        aggregates: Vec<AggregateType>,
        having: Option<Expression>,
    ) -> Self {
        Self {
            child,
            group_by,
            aggregates,
            having,
            groups: Vec::new(),
            cursor: 0,
        }
    }

    fn initial_accumulators(&self) -> Vec<DataValue> {
        self.aggregates
            .iter()
            .map(|aggregate| match aggregate {
                AggregateType::CountStar | AggregateType::Count(_) => DataValue::Integer(0),
                AggregateType::Sum(_) => DataValue::Integer(0),
                AggregateType::Min(_) | AggregateType::Max(_) => DataValue::Null,
            })
            .collect()
    }

    fn combine(&self, accumulators: &mut [DataValue], tuple: &Tuple) {
        for (accumulator, aggregate) in accumulators.iter_mut().zip(&self.aggregates) {
            match *aggregate {
                AggregateType::CountStar => {
                    if let DataValue::Integer(count) = accumulator {
                        *count += 1;
                    }
                }
                AggregateType::Count(column) => {
                    if !matches!(tuple.value(column), DataValue::Null) {
                        if let DataValue::Integer(count) = accumulator {
                            *count += 1;
                        }
                    }
                }
                AggregateType::Sum(column) => {
                    if let (DataValue::Integer(sum), DataValue::Integer(value)) =
                        (&mut *accumulator, tuple.value(column))
                    {
                        *sum += value;
                    }
                }
                AggregateType::Min(column) => {
                    let value = tuple.value(column);
                    if smaller(value, accumulator) {
                        *accumulator = value.clone();
                    }
                }
                AggregateType::Max(column) => {
                    let value = tuple.value(column);
                    if smaller(accumulator, value) {
                        *accumulator = value.clone();
                    }
                }
            }
        }
    }
}

/// Whether `candidate` should replace `current` as the running minimum (or,
/// flipped, the maximum). NULL always loses.
fn smaller(candidate: &DataValue, current: &DataValue) -> bool {
    match (candidate, current) {
        (DataValue::Null, _) => false,
        (_, DataValue::Null) => true,
        (DataValue::Integer(a), DataValue::Integer(b)) => a < b,
        (DataValue::Text(a), DataValue::Text(b)) => a < b,
        (DataValue::Boolean(a), DataValue::Boolean(b)) => a < b,
        _ => false,
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.groups.clear();
        self.cursor = 0;

        let mut table: HashMap<Vec<DataValue>, Vec<DataValue>> = HashMap::new();
        let mut key_order: Vec<Vec<DataValue>> = Vec::new();

        while let Some((tuple, _)) = self.child.next()? {
            let key: Vec<DataValue> = self
                .group_by
                .iter()
                .map(|&column| tuple.value(column).clone())
                .collect();
            let accumulators = match table.entry(key) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    key_order.push(entry.key().clone());
                    let initial = self.initial_accumulators();
                    entry.insert(initial)
                }
            };
            self.combine(accumulators, &tuple);
        }

        for key in key_order {
            let accumulators = table.remove(&key).unwrap_or_default();
            let mut values = key;
            values.extend(accumulators);
            self.groups.push(Tuple::new(values));
        }
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        while self.cursor < self.groups.len() {
            let tuple = self.groups[self.cursor].clone();
            self.cursor += 1;

            let selected = self
                .having
                .as_ref()
                .map_or(true, |h| h.evaluate(&tuple).is_true());
            if selected {
                return Ok(Some((tuple, Rid::new(INVALID_PAGE_ID, 0))));
            }
        }
        Ok(None)
    }
}
