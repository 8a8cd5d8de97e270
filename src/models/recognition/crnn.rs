//! CTC text recognition model (CRNN / SVTR exports).
//!
//! Crops are sorted by aspect ratio so each batch pads to a similar width,
//! recognized batch by batch and returned in their original order.

use crate::core::inference::{OrtInfer, TensorInput};
use crate::core::OcrResult;
use crate::pipeline::TextRecognize;
use crate::processors::{CTCLabelDecode, ColorOrder, NormalizeImage, RecResize};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Settings for [`CRNNModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CRNNConfig {
    pub resize: RecResize,
    /// Crops per forward pass.
    pub batch_size: usize,
    /// Append a space class after the dictionary.
    pub use_space_char: bool,
    pub color_order: ColorOrder,
}

impl Default for CRNNConfig {
    fn default() -> Self {
        Self {
            resize: RecResize::default(),
            batch_size: 6,
            use_space_char: true,
            color_order: ColorOrder::BGR,
        }
    }
}

/// CTC text recognition model.
#[derive(Debug)]
pub struct CRNNModel {
    inference: OrtInfer,
    decoder: CTCLabelDecode,
    resize: RecResize,
    normalizer: NormalizeImage,
    batch_size: usize,
}

impl CRNNModel {
    pub fn new(inference: OrtInfer, decoder: CTCLabelDecode, config: CRNNConfig) -> OcrResult<Self> {
        Ok(Self {
            inference,
            decoder,
            resize: config.resize,
            normalizer: NormalizeImage::for_ocr_recognition(config.color_order)?,
            batch_size: config.batch_size.max(1),
        })
    }

    fn recognize_batch(&self, crops: &[&RgbImage]) -> OcrResult<Vec<(String, f32)>> {
        let resized = self.resize.apply(crops);
        let batch = self.normalizer.normalize_batch_to(&resized)?;

        let input_name = self.inference.primary_input_name("x");
        let (shape, data) = self
            .inference
            .infer_first_f32(&[(input_name, TensorInput::Array4(&batch))])?;
        self.decoder.decode(&shape, &data)
    }

    /// Recognizes every crop, batching by similar aspect ratio.
    pub fn predict(&self, crops: &[RgbImage]) -> OcrResult<Vec<(String, f32)>> {
        if crops.is_empty() {
            return Ok(Vec::new());
        }

        let mut order: Vec<usize> = (0..crops.len()).collect();
        order.sort_by(|&a, &b| {
            aspect_ratio(&crops[a])
                .partial_cmp(&aspect_ratio(&crops[b]))
                .unwrap_or(Ordering::Equal)
        });

        let mut results = vec![(String::new(), 0.0); crops.len()];
        for chunk in order.chunks(self.batch_size) {
            let batch: Vec<&RgbImage> = chunk.iter().map(|&i| &crops[i]).collect();
            let decoded = self.recognize_batch(&batch)?;
            for (&idx, result) in chunk.iter().zip(decoded) {
                results[idx] = result;
            }
        }
        debug!(
            "CTC recognition: {} crops in {} batches",
            crops.len(),
            crops.len().div_ceil(self.batch_size)
        );
        Ok(results)
    }
}

fn aspect_ratio(img: &RgbImage) -> f32 {
    img.width() as f32 / img.height().max(1) as f32
}

impl TextRecognize for CRNNModel {
    fn recognize(&self, crops: &[RgbImage], languages: &[String]) -> OcrResult<Vec<(String, f32)>> {
        debug!(?languages, "Recognizer is dictionary-bound, languages are informational");
        self.predict(crops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CRNNConfig::default();
        assert_eq!(config.batch_size, 6);
        assert_eq!(config.resize.height, 48);
        assert!(config.use_space_char);
    }

    #[test]
    fn test_config_from_json() {
        let config: CRNNConfig =
            serde_json::from_str(r#"{"batch_size": 16, "resize": {"max_width": 640}}"#).unwrap();
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.resize.max_width, 640);
        assert_eq!(config.resize.height, 48);
    }
}
