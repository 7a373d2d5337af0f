use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A single column value inside a tuple.
///
/// The engine core only needs types with total equality so that values can
/// key hash joins, aggregations and distinct sets directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataValue {
    Integer(i64),
    Text(String),
    Boolean(bool),
    Null,
}

impl DataValue {
    /// Whether this value is truthy when used as a predicate result.
    pub fn is_true(&self) -> bool {
        matches!(self, DataValue::Boolean(true))
    }

    /// Collapse the value into a fixed-width key for the hash index.
    ///
    /// Integers map to themselves so index scans over integer columns stay
    /// exact; other types go through a deterministic 64-bit hash.
    pub fn index_key(&self) -> i64 {
        match self {
            DataValue::Integer(i) => *i,
            other => {
                let mut hasher = DefaultHasher::new();
                other.hash(&mut hasher);
                hasher.finish() as i64
            }
        }
    }
}

impl std::fmt::Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Text(s) => write!(f, "{}", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
            DataValue::Null => write!(f, "NULL"),
        }
    }
}
