//! Raster analysis and still-image encoding for thumbnails.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbaImage;
use image::codecs::jpeg::JpegEncoder;

use crate::domain::errors::ThumbnailError;

/// Default JPEG quality on a 0.0-1.0 scale.
pub const DEFAULT_JPEG_QUALITY: f32 = 0.9;

/// Returns the mean luma of a frame: the average of the R, G and B channel
/// means, on a 0-255 scale. Alpha is ignored.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_luma(frame: &RgbaImage) -> f64 {
    let pixels = u64::from(frame.width()) * u64::from(frame.height());
    if pixels == 0 {
        return 0.0;
    }

    let sum: u64 = frame
        .pixels()
        .map(|p| u64::from(p[0]) + u64::from(p[1]) + u64::from(p[2]))
        .sum();

    sum as f64 / (pixels as f64 * 3.0)
}

/// Encodes a frame as JPEG. `quality` is on a 0.0-1.0 scale.
///
/// # Errors
/// Returns error if the encoder rejects the frame.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_jpeg(frame: &RgbaImage, quality: f32) -> Result<Vec<u8>, ThumbnailError> {
    let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
    let rgb = image::DynamicImage::ImageRgba8(frame.clone()).to_rgb8();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(|e| ThumbnailError::Encode(e.to_string()))?;
    Ok(out)
}

/// Wraps encoded bytes as a `data:` URL.
#[must_use]
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Decodes the payload of a base64 `data:` URL.
#[must_use]
pub fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let (_, payload) = url.strip_prefix("data:")?.split_once(";base64,")?;
    STANDARD.decode(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use test_case::test_case;

    #[test_case([0, 0, 0], 0.0 ; "black")]
    #[test_case([255, 255, 255], 255.0 ; "white")]
    #[test_case([30, 60, 90], 60.0 ; "channel_average")]
    fn test_mean_luma_solid(rgb: [u8; 3], expected: f64) {
        let frame = RgbaImage::from_pixel(4, 3, Rgba([rgb[0], rgb[1], rgb[2], 0]));
        assert!((mean_luma(&frame) - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mean_luma_mixed() {
        let mut frame = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        frame.put_pixel(1, 0, Rgba([100, 100, 100, 255]));
        assert!((mean_luma(&frame) - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mean_luma_empty_frame() {
        assert!(mean_luma(&RgbaImage::new(0, 0)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_encode_jpeg_produces_decodable_image() {
        let frame = RgbaImage::from_pixel(320, 180, Rgba([120, 120, 120, 255]));

        let jpeg = encode_jpeg(&frame, DEFAULT_JPEG_QUALITY).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();

        assert_eq!((decoded.width(), decoded.height()), (320, 180));
        assert!((mean_luma(&decoded.to_rgba8()) - 120.0).abs() < 3.0);
    }

    #[test]
    fn test_data_url_round_trip() {
        let url = data_url("image/jpeg", b"\xff\xd8jpeg");
        assert!(url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(decode_data_url(&url).unwrap(), b"\xff\xd8jpeg");
        assert!(decode_data_url("https://x/y.jpg").is_none());
    }
}
