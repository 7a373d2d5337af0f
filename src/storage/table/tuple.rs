use serde::{Deserialize, Serialize};

use crate::common::value::DataValue;

/// A row of values, serialized with bincode into heap pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple {
    values: Vec<DataValue>,
}

impl Tuple {
    pub fn new(values: Vec<DataValue>) -> Self {
        Self { values }
    }

    pub fn value(&self, column: usize) -> &DataValue {
        &self.values[column]
    }

    pub fn values(&self) -> &[DataValue] {
        &self.values
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    /// Concatenate two tuples, left columns first. Used by the joins.
    pub fn join(&self, right: &Tuple) -> Tuple {
        let mut values = self.values.clone();
        values.extend(right.values.iter().cloned());
        Tuple::new(values)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

impl From<Vec<DataValue>> for Tuple {
    fn from(values: Vec<DataValue>) -> Self {
        Tuple::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let tuple = Tuple::new(vec![
            DataValue::Integer(42),
            DataValue::Text("forty-two".to_string()),
            DataValue::Boolean(true),
            DataValue::Null,
        ]);
        let bytes = tuple.to_bytes().unwrap();
        assert_eq!(Tuple::from_bytes(&bytes).unwrap(), tuple);
    }

    #[test]
    fn test_join_concatenates() {
        let left = Tuple::new(vec![DataValue::Integer(1)]);
        let right = Tuple::new(vec![DataValue::Integer(2), DataValue::Integer(3)]);
        let joined = left.join(&right);
        assert_eq!(joined.column_count(), 3);
        assert_eq!(joined.value(2), &DataValue::Integer(3));
    }
}
