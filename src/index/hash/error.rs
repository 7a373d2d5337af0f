use thiserror::Error;

use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Hash directory is at maximum depth and cannot grow")]
    DirectoryFull,

    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),
}
