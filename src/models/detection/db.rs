//! DB (Differentiable Binarization) text detection model.
//!
//! Handles preprocessing (limit-side resize and ImageNet normalization), the
//! ONNX forward pass and box extraction from the probability map.

use crate::core::inference::{OrtInfer, TensorInput};
use crate::core::{OCRError, OcrResult};
use crate::domain::schema::{PolygonBox, TextDetectionResult, image_bbox};
use crate::pipeline::TextDetect;
use crate::processors::{BoundingBox, ColorOrder, DBPostProcess, DetResize, NormalizeImage};
use image::RgbImage;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Settings for [`DBModel`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DBConfig {
    pub resize: DetResize,
    pub postprocess: DBPostProcess,
    pub color_order: ColorOrder,
}

/// DB text detection model.
#[derive(Debug)]
pub struct DBModel {
    inference: OrtInfer,
    resize: DetResize,
    normalizer: NormalizeImage,
    postprocess: DBPostProcess,
}

impl DBModel {
    pub fn new(inference: OrtInfer, config: DBConfig) -> OcrResult<Self> {
        Ok(Self {
            inference,
            resize: config.resize,
            normalizer: NormalizeImage::imagenet(config.color_order)?,
            postprocess: config.postprocess,
        })
    }

    /// Runs the forward pass and returns boxes in image coordinates with
    /// their scores.
    pub fn predict_boxes(&self, image: &RgbImage) -> OcrResult<(Vec<BoundingBox>, Vec<f32>)> {
        let (resized, scale) = self.resize.apply(image)?;
        let batch = self.normalizer.normalize_to(&resized)?;

        let input_name = self.inference.primary_input_name("x");
        let (shape, data) = self
            .inference
            .infer_first_f32(&[(input_name, TensorInput::Array4(&batch))])?;

        // [1, 1, H, W] for PaddleOCR exports, [1, H, W] for some others.
        let (h, w) = match shape.as_slice() {
            [1, 1, h, w] | [1, h, w] => (*h as usize, *w as usize),
            _ => {
                return Err(OCRError::tensor_shape(
                    "read detection map",
                    "[1, 1, H, W]",
                    &shape,
                ));
            }
        };
        if data.len() < h * w {
            return Err(OCRError::tensor_shape("read detection map", "H * W values", &shape));
        }
        let map = ArrayView2::from_shape((h, w), &data[..h * w])?;

        let (boxes, scores) = self.postprocess.apply(&map, &scale);
        debug!(
            "DB detection: {}x{} input, {} boxes",
            resized.width(),
            resized.height(),
            boxes.len()
        );
        Ok((boxes, scores))
    }
}

impl TextDetect for DBModel {
    fn detect(&self, image: &RgbImage) -> OcrResult<TextDetectionResult> {
        let (boxes, scores) = self.predict_boxes(image)?;
        let bboxes = boxes
            .iter()
            .zip(scores)
            .map(|(bbox, score)| PolygonBox::new(bbox, Some(score)))
            .collect();
        Ok(TextDetectionResult {
            bboxes,
            image_bbox: image_bbox(image.width(), image.height()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DBConfig::default();
        assert_eq!(config.resize.limit_side_len, 960);
        assert_eq!(config.postprocess.box_thresh, 0.6);
        assert_eq!(config.color_order, ColorOrder::BGR);
    }

    #[test]
    fn test_config_partial_json_keeps_defaults() {
        let config: DBConfig =
            serde_json::from_str(r#"{"postprocess": {"thresh": 0.2}}"#).unwrap();
        assert_eq!(config.postprocess.thresh, 0.2);
        assert_eq!(config.postprocess.unclip_ratio, 1.5);
        assert_eq!(config.resize, DetResize::default());
    }
}
