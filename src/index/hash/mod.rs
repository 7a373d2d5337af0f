mod error;
mod extendible;

pub use error::IndexError;
pub use extendible::ExtendibleHashTable;
