//! Utilities shared by the pipeline, the server and the CLI: logging setup,
//! upload decoding, region cropping and debug drawing.

pub mod transform;
pub mod visualization;

pub use transform::get_rotate_crop_image;

use crate::core::OcrResult;
use image::RgbImage;

/// Initializes the tracing subscriber for logging.
///
/// The filter is read from `RUST_LOG`. Calling this more than once is harmless;
/// later calls leave the first subscriber in place.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Decodes image bytes in any format `image` understands into RGB.
pub fn load_image_from_bytes(bytes: &[u8]) -> OcrResult<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Whether `bytes` start with the PDF magic `%PDF`.
pub fn is_pdf_bytes(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OCRError;
    use std::io::Cursor;

    #[test]
    fn test_png_bytes_decode_to_rgb() {
        let img = RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let decoded = load_image_from_bytes(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(1, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_garbage_bytes_fail_as_image_load() {
        let err = load_image_from_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, OCRError::ImageLoad(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_pdf_magic() {
        assert!(is_pdf_bytes(b"%PDF-1.7\n"));
        assert!(!is_pdf_bytes(b"%PD"));
        assert!(!is_pdf_bytes(b"\x89PNG"));
    }
}
