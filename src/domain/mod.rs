//! Domain layer with cache entities, error types, and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheEntry, LoadStatus, RenderableRef, ResourceState, ThumbnailState};
pub use errors::{LoadError, MediaError, StorageError, ThumbnailError};
pub use ports::{Clock, FrameExtractor, KeyValueStore, MediaSession, ResourceFetcher, SystemClock};
