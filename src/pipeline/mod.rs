//! The inference pipeline: model roles, loading and the four stages.
//!
//! Stages only see the traits below, so handlers can be driven by the ONNX
//! models from [`crate::models`] or by any other implementation (tests use
//! mocks).

pub mod loader;
pub mod stages;

use crate::core::OcrResult;
use crate::domain::{LayoutResult, OrderResult, TextDetectionResult};
use image::RgbImage;

pub use loader::{ModelConfig, ModelRegistry, load_det, load_layout, load_models, load_order, load_rec};
pub use stages::{layout_detection, ocr, order_detection, text_detection};

/// Finds text regions in an image.
pub trait TextDetect: Send + Sync {
    fn detect(&self, image: &RgbImage) -> OcrResult<TextDetectionResult>;
}

/// Reads the text of rectified line crops.
pub trait TextRecognize: Send + Sync {
    /// Returns one `(text, confidence)` pair per crop, in input order.
    ///
    /// `languages` holds resolved language codes. Single-script models may
    /// ignore them.
    fn recognize(&self, crops: &[RgbImage], languages: &[String]) -> OcrResult<Vec<(String, f32)>>;
}

/// Classifies page regions, using detected text lines to refine them.
pub trait LayoutDetect: Send + Sync {
    fn detect_layout(&self, image: &RgbImage, text_lines: &TextDetectionResult) -> OcrResult<LayoutResult>;
}

/// Assigns a reading position to each region of a page.
pub trait ReadingOrder: Send + Sync {
    /// `rects` are `[x1, y1, x2, y2]` in image coordinates. The returned boxes
    /// keep the input order.
    fn order(&self, image: &RgbImage, rects: &[[f32; 4]]) -> OcrResult<OrderResult>;
}
