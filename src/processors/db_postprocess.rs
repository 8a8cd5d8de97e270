//! Post-processing for DB (Differentiable Binarization) text detection models.
//!
//! [`DBPostProcess`] turns a probability map into quadrilaterals: threshold,
//! trace contours, fit a minimum-area box, score it against the map, expand it
//! by the unclip ratio and rescale to the source image.

use crate::processors::geometry::{BoundingBox, Point, ScanlineBuffer};
use crate::processors::types::ImageScaleInfo;
use clipper2::{EndType, JoinType, Path as ClipperPath};
use image::{GrayImage, Luma};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Thresholds and limits for DB post-processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DBPostProcess {
    /// Binarization threshold for the probability map.
    pub thresh: f32,
    /// Minimum mean probability inside a box.
    pub box_thresh: f32,
    /// Maximum number of contours considered.
    pub max_candidates: usize,
    /// Polygon offset distance factor (`area * ratio / perimeter`).
    pub unclip_ratio: f32,
    /// Minimum short side of a box, in map pixels.
    pub min_size: f32,
    /// Dilate the binary mask by one pixel before tracing contours.
    pub use_dilation: bool,
}

impl Default for DBPostProcess {
    fn default() -> Self {
        Self {
            thresh: 0.3,
            box_thresh: 0.6,
            max_candidates: 1000,
            unclip_ratio: 1.5,
            min_size: 3.0,
            use_dilation: false,
        }
    }
}

impl DBPostProcess {
    /// Extracts boxes from one `[H, W]` probability map.
    ///
    /// Returned boxes are in source image coordinates, ordered clockwise from
    /// the top-left, with one score per box.
    pub fn apply(
        &self,
        pred: &ndarray::ArrayView2<f32>,
        scale: &ImageScaleInfo,
    ) -> (Vec<BoundingBox>, Vec<f32>) {
        let (height, width) = (pred.shape()[0] as u32, pred.shape()[1] as u32);
        if height == 0 || width == 0 {
            return (Vec::new(), Vec::new());
        }

        let mut mask = GrayImage::new(width, height);
        for ((y, x), &value) in pred.indexed_iter() {
            if value > self.thresh {
                mask.put_pixel(x as u32, y as u32, Luma([255]));
            }
        }
        if self.use_dilation {
            mask = morphology::dilate(&mask, Norm::LInf, 1);
        }

        let dest_w = scale.src_w;
        let dest_h = scale.src_h;
        let width_scale = dest_w / width as f32;
        let height_scale = dest_h / height as f32;

        let mut boxes = Vec::new();
        let mut scores = Vec::new();

        for contour in find_contours::<u32>(&mask).into_iter().take(self.max_candidates) {
            let contour_box = BoundingBox::from_contour(&contour);
            let Some((mini_box, min_side)) = mini_box(&contour_box.points) else {
                continue;
            };
            if min_side < self.min_size {
                continue;
            }

            let score = box_score_fast(pred, &mini_box);
            if score < self.box_thresh {
                continue;
            }

            let expanded = unclip(&mini_box, self.unclip_ratio);
            let Some((expanded_box, expanded_side)) = self::mini_box(&expanded.points) else {
                continue;
            };
            if expanded_side < self.min_size + 2.0 {
                continue;
            }

            let scaled = expanded_box
                .points
                .iter()
                .map(|p| {
                    Point::new(
                        (p.x * width_scale).round().clamp(0.0, dest_w),
                        (p.y * height_scale).round().clamp(0.0, dest_h),
                    )
                })
                .collect();
            boxes.push(BoundingBox::new(scaled));
            scores.push(score);
        }

        debug!(
            "DBPostProcess: map {}x{}, source {}x{}, {} boxes",
            width,
            height,
            dest_w,
            dest_h,
            boxes.len()
        );
        (boxes, scores)
    }
}

/// Fits an ordered minimum-area quadrilateral around `points`.
fn mini_box(points: &[Point]) -> Option<(BoundingBox, f32)> {
    if points.len() < 3 {
        return None;
    }
    let rect = BoundingBox::new(points.to_vec()).get_min_area_rect();
    let min_side = rect.min_side();
    if !min_side.is_finite() || min_side <= 0.0 {
        return None;
    }
    Some((BoundingBox::new(rect.ordered_corners().to_vec()), min_side))
}

/// Mean probability inside `bbox`, evaluated on the box's bounding rectangle
/// of the map.
pub fn box_score_fast(pred: &ndarray::ArrayView2<f32>, bbox: &BoundingBox) -> f32 {
    let height = pred.shape()[0];
    let width = pred.shape()[1];
    let (Some((min_x, max_x)), Some((min_y, max_y))) = (
        bbox.points.iter().map(|p| p.x).minmax().into_option(),
        bbox.points.iter().map(|p| p.y).minmax().into_option(),
    ) else {
        return 0.0;
    };

    let start_x = min_x.floor().clamp(0.0, width as f32 - 1.0) as usize;
    let end_x = max_x.ceil().clamp(0.0, width as f32 - 1.0) as usize + 1;
    let start_y = min_y.floor().clamp(0.0, height as f32 - 1.0) as usize;
    let end_y = max_y.ceil().clamp(0.0, height as f32 - 1.0) as usize + 1;

    let mut buffer = ScanlineBuffer::new(bbox.points.len());
    let (total, pixels) = (start_y..end_y)
        .map(|y| buffer.process_scanline(y as f32 + 0.5, bbox, start_x, end_x, pred))
        .fold((0.0, 0), |(s, n), (ls, ln)| (s + ls, n + ln));

    if pixels > 0 { total / pixels as f32 } else { 0.0 }
}

/// Offsets the polygon outwards by `area * ratio / perimeter`.
///
/// Returns an empty box when the polygon is degenerate or the offset splits it.
pub fn unclip(bbox: &BoundingBox, unclip_ratio: f32) -> BoundingBox {
    let path: ClipperPath = bbox
        .points
        .iter()
        .map(|p| (p.x as f64, p.y as f64))
        .collect::<Vec<_>>()
        .into();
    if path.len() < 3 {
        return BoundingBox::new(Vec::new());
    }

    let area = path.signed_area().abs();
    let perimeter = bbox.perimeter() as f64;
    if area <= f64::EPSILON || perimeter <= f64::EPSILON {
        return BoundingBox::new(Vec::new());
    }

    let delta = area * unclip_ratio as f64 / perimeter;
    let offset = path.inflate(delta, JoinType::Round, EndType::Polygon, 2.0);
    let Some(expanded) = offset.into_iter().exactly_one().ok() else {
        return BoundingBox::new(Vec::new());
    };

    BoundingBox::new(
        expanded
            .iter()
            .map(|p| Point::new(p.x() as f32, p.y() as f32))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn synthetic_map() -> Array2<f32> {
        let mut map = Array2::<f32>::zeros((64, 128));
        for y in 20..30 {
            for x in 10..90 {
                map[[y, x]] = 0.9;
            }
        }
        map
    }

    #[test]
    fn test_single_text_region_is_detected() {
        let map = synthetic_map();
        let scale = ImageScaleInfo::new(64.0, 128.0, 1.0, 1.0);
        let (boxes, scores) = DBPostProcess::default().apply(&map.view(), &scale);

        assert_eq!(boxes.len(), 1);
        assert!(scores[0] > 0.8);
        let [x1, y1, x2, y2] = boxes[0].to_rect();
        // Expanded beyond the raw region but still inside the image.
        assert!(x1 < 10.0 && x2 > 89.0);
        assert!(y1 < 20.0 && y2 > 29.0);
        assert!(x1 >= 0.0 && y1 >= 0.0 && x2 <= 128.0 && y2 <= 64.0);
        assert_eq!(boxes[0].points.len(), 4);
    }

    #[test]
    fn test_boxes_are_rescaled_to_source() {
        let map = synthetic_map();
        let scale = ImageScaleInfo::new(128.0, 256.0, 0.5, 0.5);
        let (boxes, _) = DBPostProcess::default().apply(&map.view(), &scale);
        let [x1, _, x2, _] = boxes[0].to_rect();
        assert!(x1 < 20.0 && x2 > 178.0);
    }

    #[test]
    fn test_low_probability_regions_are_dropped() {
        let mut map = synthetic_map();
        map.mapv_inplace(|v| if v > 0.0 { 0.45 } else { 0.0 });
        let scale = ImageScaleInfo::new(64.0, 128.0, 1.0, 1.0);
        let (boxes, _) = DBPostProcess::default().apply(&map.view(), &scale);
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_tiny_regions_are_dropped() {
        let mut map = Array2::<f32>::zeros((32, 32));
        map[[5, 5]] = 1.0;
        map[[5, 6]] = 1.0;
        let scale = ImageScaleInfo::new(32.0, 32.0, 1.0, 1.0);
        let (boxes, _) = DBPostProcess::default().apply(&map.view(), &scale);
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_box_score_fast_averages_inside() {
        let map = synthetic_map();
        let inside = BoundingBox::from_coords(20.0, 21.0, 60.0, 28.0);
        assert!((box_score_fast(&map.view(), &inside) - 0.9).abs() < 1e-5);
    }

    #[test]
    fn test_unclip_grows_polygon() {
        let square = BoundingBox::from_coords(10.0, 10.0, 20.0, 20.0);
        let grown = unclip(&square, 1.5);
        assert!(grown.area() > square.area());
        assert!(grown.x_min() < 10.0 && grown.x_max() > 20.0);
    }
}
