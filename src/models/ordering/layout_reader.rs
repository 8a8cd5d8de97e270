//! LayoutReader-style reading-order model.
//!
//! The export takes boxes quantized to a 1000x1000 grid and scores every
//! (box, position) pair.

use crate::core::inference::{OrtInfer, TensorInput};
use crate::core::{OCRError, OcrResult};
use crate::domain::schema::{OrderBox, OrderResult, image_bbox};
use crate::pipeline::ReadingOrder;
use crate::processors::BoundingBox;
use crate::processors::order_decode::{complete_positions, decode_positions, encode_boxes};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const BOXES_INPUT: &str = "boxes";
const MASK_INPUT: &str = "attention_mask";
const LOGITS_OUTPUT: &str = "logits";

/// Settings for [`LayoutReaderModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutReaderConfig {
    /// Boxes sent through the model; the rest follow in top-to-bottom order.
    pub max_boxes: usize,
}

impl Default for LayoutReaderConfig {
    fn default() -> Self {
        Self { max_boxes: 256 }
    }
}

/// Reading-order model.
#[derive(Debug)]
pub struct LayoutReaderModel {
    inference: OrtInfer,
    max_boxes: usize,
}

impl LayoutReaderModel {
    pub fn new(inference: OrtInfer, config: LayoutReaderConfig) -> OcrResult<Self> {
        if config.max_boxes == 0 {
            return Err(OCRError::config_error_detailed(
                "reading order model",
                "max_boxes must be at least 1",
            ));
        }
        Ok(Self {
            inference,
            max_boxes: config.max_boxes,
        })
    }

    /// Returns a distinct position for each rectangle, in input order.
    pub fn predict_positions(&self, rects: &[[f32; 4]], width: f32, height: f32) -> OcrResult<Vec<usize>> {
        if rects.is_empty() {
            return Ok(Vec::new());
        }
        let n = rects.len().min(self.max_boxes);
        if n < rects.len() {
            warn!(
                "Reading order: {} boxes exceed the model limit of {}, ordering the rest by position",
                rects.len(),
                self.max_boxes
            );
        }

        let (boxes, mask) = encode_boxes(&rects[..n], width, height);
        let mut outputs = self.inference.infer(&[
            (BOXES_INPUT, TensorInput::I64Array3(&boxes)),
            (MASK_INPUT, TensorInput::I64Array2(&mask)),
        ])?;
        if outputs.is_empty() {
            return Err(OCRError::tensor_shape("read reading order logits", "one output", &[]));
        }
        let idx = outputs
            .iter()
            .position(|(name, _)| name == LOGITS_OUTPUT)
            .unwrap_or(0);
        let (_, logits) = outputs.swap_remove(idx);
        let (shape, data) = logits.into_f32();
        let model_positions = decode_positions(&shape, &data, n)?;
        Ok(complete_positions(rects, &model_positions))
    }
}

impl ReadingOrder for LayoutReaderModel {
    fn order(&self, image: &RgbImage, rects: &[[f32; 4]]) -> OcrResult<OrderResult> {
        let positions = self.predict_positions(rects, image.width() as f32, image.height() as f32)?;
        debug!("Reading order: {} boxes", positions.len());

        let bboxes = rects
            .iter()
            .zip(positions)
            .map(|(rect, position)| OrderBox {
                polygon: BoundingBox::from_rect(*rect).to_polygon(),
                bbox: *rect,
                position,
            })
            .collect();
        Ok(OrderResult {
            bboxes,
            image_bbox: image_bbox(image.width(), image.height()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_box_limit() {
        assert_eq!(LayoutReaderConfig::default().max_boxes, 256);
        let config: LayoutReaderConfig = serde_json::from_str(r#"{"max_boxes": 64}"#).unwrap();
        assert_eq!(config.max_boxes, 64);
    }
}
