// Query Execution Module
//
// The engine core stops at the executor layer: pull-based operator
// iterators consuming the storage and lock contracts. Planning and SQL
// live outside this crate.

pub mod executor;
