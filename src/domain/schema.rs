//! Prediction types returned by the pipeline stages.
//!
//! Every type serializes to the JSON payload of its endpoint. Boxes carry both
//! the polygon (clockwise from the top-left) and its axis-aligned hull as
//! `[x1, y1, x2, y2]`.

use crate::processors::BoundingBox;
use serde::{Deserialize, Serialize};

/// `[0, 0, width, height]` for an image of the given size.
pub fn image_bbox(width: u32, height: u32) -> [f32; 4] {
    [0.0, 0.0, width as f32, height as f32]
}

/// A detected text region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonBox {
    pub polygon: Vec<[f32; 2]>,
    pub confidence: Option<f32>,
    pub bbox: [f32; 4],
}

impl PolygonBox {
    pub fn new(polygon: &BoundingBox, confidence: Option<f32>) -> Self {
        Self {
            polygon: polygon.to_polygon(),
            confidence,
            bbox: polygon.to_rect(),
        }
    }

    /// The polygon as a [`BoundingBox`].
    pub fn to_bounding_box(&self) -> BoundingBox {
        BoundingBox::new(self.polygon.iter().map(|&p| p.into()).collect())
    }
}

/// Output of the text detection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetectionResult {
    pub bboxes: Vec<PolygonBox>,
    pub image_bbox: [f32; 4],
}

/// A labelled layout region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    pub polygon: Vec<[f32; 2]>,
    pub confidence: Option<f32>,
    pub bbox: [f32; 4],
    pub label: String,
}

/// Output of the layout detection stage, in top-to-bottom, left-to-right order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutResult {
    pub bboxes: Vec<LayoutBox>,
    pub image_bbox: [f32; 4],
}

/// A region with its reading position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBox {
    pub polygon: Vec<[f32; 2]>,
    pub bbox: [f32; 4],
    pub position: usize,
}

/// Output of the order detection stage.
///
/// Boxes keep the order of the layout regions they came from; `position`
/// values form a permutation of `0..bboxes.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub bboxes: Vec<OrderBox>,
    pub image_bbox: [f32; 4],
}

/// A recognized line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub polygon: Vec<[f32; 2]>,
    pub bbox: [f32; 4],
    pub text: String,
    pub confidence: Option<f32>,
}

/// Output of the OCR stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text_lines: Vec<TextLine>,
    /// Resolved language codes the request asked for.
    pub languages: Vec<String>,
    pub image_bbox: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_box_hull() {
        let quad = BoundingBox::from_coords(3.0, 4.0, 13.0, 9.0);
        let pb = PolygonBox::new(&quad, Some(0.75));
        assert_eq!(pb.bbox, [3.0, 4.0, 13.0, 9.0]);
        assert_eq!(pb.polygon[0], [3.0, 4.0]);
        assert_eq!(pb.to_bounding_box(), quad);
    }

    #[test]
    fn test_detection_result_json_shape() {
        let result = TextDetectionResult {
            bboxes: vec![PolygonBox::new(&BoundingBox::from_coords(0.0, 0.0, 2.0, 1.0), None)],
            image_bbox: image_bbox(10, 5),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["image_bbox"], serde_json::json!([0.0, 0.0, 10.0, 5.0]));
        assert_eq!(json["bboxes"][0]["bbox"], serde_json::json!([0.0, 0.0, 2.0, 1.0]));
        assert!(json["bboxes"][0]["confidence"].is_null());
    }
}
