pub mod hash;
pub mod table_index;

pub use hash::{ExtendibleHashTable, IndexError};
pub use table_index::TableIndex;
