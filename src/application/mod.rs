//! Application layer with the loading services and the media facade.

/// Media facade.
pub mod media_service;
/// Loading services.
pub mod services;

pub use media_service::MediaService;
pub use services::{
    ImageResource, ImageResourceLoader, RequestCoalescer, RetryPolicy, Thumbnail,
    ThumbnailConfig, ThumbnailHandle, VideoThumbnailExtractor,
};
