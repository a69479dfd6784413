//! Video frame extraction and thumbnail encoding.

pub mod ffmpeg;
pub mod raster;

pub use ffmpeg::FfmpegFrameExtractor;
pub use raster::{DEFAULT_JPEG_QUALITY, data_url, decode_data_url, encode_jpeg, mean_luma};
