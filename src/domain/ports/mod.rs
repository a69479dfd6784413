//! Ports to the collaborators the caching engine consumes.

mod clock_port;
mod fetcher_port;
mod frame_extractor_port;
mod key_value_store_port;

pub use clock_port::{Clock, SystemClock};
pub use fetcher_port::ResourceFetcher;
pub use frame_extractor_port::{FrameExtractor, MediaSession};
pub use key_value_store_port::KeyValueStore;

#[cfg(test)]
pub mod mocks {
    pub use super::clock_port::mock::ManualClock;
    pub use super::fetcher_port::MockResourceFetcher;
    pub use super::frame_extractor_port::mock::SyntheticVideo;
}
