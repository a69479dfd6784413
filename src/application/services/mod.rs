//! Loading services built on the caches.

pub mod image_resource_loader;
pub mod request_coalescer;
pub mod retry;
pub mod thumbnail_extractor;

pub use image_resource_loader::{ImageResource, ImageResourceLoader};
pub use request_coalescer::{DEFAULT_FAILURE_TTL, RequestCoalescer};
pub use retry::{RetryPolicy, RetryState};
pub use thumbnail_extractor::{
    Thumbnail, ThumbnailConfig, ThumbnailHandle, VideoThumbnailExtractor,
};
