//! Small shared types for the image processors.

use serde::{Deserialize, Serialize};

/// How `limit_side_len` constrains a detector input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    /// Shrink so the longer side is at most the limit.
    #[default]
    Max,
    /// Grow so the shorter side is at least the limit.
    Min,
}

/// Channel order a model expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorOrder {
    /// Red, Green, Blue (the order `image` decodes to)
    RGB,
    /// Blue, Green, Red (PaddlePaddle exports)
    #[default]
    BGR,
}

/// Original dimensions and resize ratios of one preprocessed image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageScaleInfo {
    /// Original image height before resizing
    pub src_h: f32,
    /// Original image width before resizing
    pub src_w: f32,
    /// resized_height / original_height
    pub ratio_h: f32,
    /// resized_width / original_width
    pub ratio_w: f32,
}

impl ImageScaleInfo {
    pub fn new(src_h: f32, src_w: f32, ratio_h: f32, ratio_w: f32) -> Self {
        Self {
            src_h,
            src_w,
            ratio_h,
            ratio_w,
        }
    }
}
