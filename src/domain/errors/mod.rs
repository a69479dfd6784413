//! Domain error types.

mod load_error;
mod media_error;
mod storage_error;

pub use load_error::LoadError;
pub use media_error::{MediaError, ThumbnailError};
pub use storage_error::StorageError;
