//! Domain entities.

mod cache_entry;
mod load_state;
mod renderable;

pub use cache_entry::{CacheEntry, PersistedEntry, ThumbnailCacheEntry, ThumbnailKey, is_expired};
pub use load_state::{LoadStatus, ResourceState, ThumbnailState};
pub use renderable::RenderableRef;
