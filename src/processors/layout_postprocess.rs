//! Post-processing for layout detection outputs.
//!
//! Layout exports emit rows of `[class_id, score, x1, y1, x2, y2]` in source
//! image coordinates. Rows are filtered by score, suppressed per class and then
//! reconciled with the text lines found by the detector.

use crate::processors::geometry::BoundingBox;
use crate::processors::sorting::sort_reading_order;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Plain-text class name used when the label set has none.
pub const DEFAULT_TEXT_LABEL: &str = "text";

/// The label set's own spelling of the plain-text class, matched
/// case-insensitively, or [`DEFAULT_TEXT_LABEL`].
pub fn text_label(labels: &[String]) -> &str {
    labels
        .iter()
        .find(|label| label.eq_ignore_ascii_case(DEFAULT_TEXT_LABEL))
        .map_or(DEFAULT_TEXT_LABEL, String::as_str)
}

/// Labels whose regions hold non-text content. Lines inside them count as
/// covered but never grow the region.
const NON_TEXT_LABELS: &[&str] = &[
    "table", "figure", "image", "picture", "chart", "formula", "equation", "seal",
];

/// One layout region.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDetection {
    pub bbox: BoundingBox,
    pub label: String,
    /// Model score; `None` for regions synthesized from text lines.
    pub score: Option<f32>,
}

impl LayoutDetection {
    /// Whether the region is expected to contain running text.
    pub fn is_text_like(&self) -> bool {
        let label = self.label.to_ascii_lowercase();
        !NON_TEXT_LABELS.contains(&label.as_str())
    }
}

/// Settings for [`LayoutPostProcess`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutPostProcess {
    /// Minimum score for a row to be kept.
    pub score_threshold: f32,
    /// IoU above which a lower-scored box of the same class is suppressed.
    pub nms_threshold: f32,
    /// Fraction of a text line that must lie in a region for it to count as covered.
    pub text_ioa_threshold: f32,
    /// Turn uncovered text lines into their own regions.
    pub add_uncovered_text: bool,
}

impl Default for LayoutPostProcess {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.5,
            text_ioa_threshold: 0.5,
            add_uncovered_text: true,
        }
    }
}

impl LayoutPostProcess {
    /// Converts raw `[N, 6]` rows into labelled regions.
    ///
    /// Rows with an out-of-range class, a non-finite value or an empty box after
    /// clamping to the image are dropped.
    pub fn apply(
        &self,
        rows: &[f32],
        labels: &[String],
        img_width: f32,
        img_height: f32,
    ) -> Vec<LayoutDetection> {
        let mut candidates: Vec<(usize, f32, BoundingBox)> = rows
            .chunks_exact(6)
            .filter(|row| row.iter().all(|v| v.is_finite()))
            .filter(|row| row[1] >= self.score_threshold)
            .filter_map(|row| {
                let class_id = row[0].round();
                if class_id < 0.0 || class_id as usize >= labels.len() {
                    return None;
                }
                let x1 = row[2].clamp(0.0, img_width);
                let y1 = row[3].clamp(0.0, img_height);
                let x2 = row[4].clamp(0.0, img_width);
                let y2 = row[5].clamp(0.0, img_height);
                (x2 > x1 && y2 > y1)
                    .then(|| (class_id as usize, row[1], BoundingBox::from_coords(x1, y1, x2, y2)))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        let keep = nms_keep(&candidates, self.nms_threshold);

        debug!(
            "LayoutPostProcess: {} rows, {} above threshold, {} after NMS",
            rows.len() / 6,
            candidates.len(),
            keep.len()
        );

        keep.into_iter()
            .map(|i| {
                let (class_id, score, bbox) = &candidates[i];
                LayoutDetection {
                    bbox: bbox.clone(),
                    label: labels[*class_id].clone(),
                    score: Some(*score),
                }
            })
            .collect()
    }

    /// Reconciles layout regions with detected text lines and sorts the result
    /// top-to-bottom, left-to-right.
    ///
    /// A line belongs to the region containing the largest share of it, if that
    /// share reaches `text_ioa_threshold`. Text-like regions grow to enclose
    /// their lines. Uncovered lines become regions labelled `text_label`.
    pub fn refine_with_text_lines(
        &self,
        mut regions: Vec<LayoutDetection>,
        lines: &[BoundingBox],
        text_label: &str,
    ) -> Vec<LayoutDetection> {
        let mut uncovered = Vec::new();

        for line in lines {
            let best = regions
                .iter()
                .enumerate()
                .map(|(i, region)| (i, line.ioa(&region.bbox)))
                .filter(|(_, ioa)| *ioa >= self.text_ioa_threshold)
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

            match best {
                Some((i, _)) => {
                    if regions[i].is_text_like() {
                        regions[i].bbox = regions[i].bbox.union(line);
                    }
                }
                None => uncovered.push(line),
            }
        }

        if self.add_uncovered_text {
            regions.extend(uncovered.into_iter().map(|line| LayoutDetection {
                bbox: BoundingBox::from_rect(line.to_rect()),
                label: text_label.to_string(),
                score: None,
            }));
        }

        sort_reading_order(regions, |r| &r.bbox)
    }
}

/// Class-wise non-maximum suppression over candidates sorted by descending score.
fn nms_keep(candidates: &[(usize, f32, BoundingBox)], iou_threshold: f32) -> Vec<usize> {
    let mut suppressed = vec![false; candidates.len()];
    let mut keep = Vec::new();

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        for j in (i + 1)..candidates.len() {
            if !suppressed[j]
                && candidates[i].0 == candidates[j].0
                && candidates[i].2.iou(&candidates[j].2) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["Text", "Title", "Table"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_score_filter_and_class_mapping() {
        let rows = [
            0.0, 0.9, 10.0, 10.0, 100.0, 50.0, // kept
            2.0, 0.3, 10.0, 60.0, 100.0, 90.0, // low score
            7.0, 0.9, 10.0, 60.0, 100.0, 90.0, // unknown class
        ];
        let out = LayoutPostProcess::default().apply(&rows, &labels(), 200.0, 200.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "Text");
        assert_eq!(out[0].score, Some(0.9));
    }

    #[test]
    fn test_nms_is_class_wise() {
        let rows = [
            0.0, 0.9, 0.0, 0.0, 100.0, 100.0,
            0.0, 0.8, 5.0, 5.0, 100.0, 100.0, // same class, overlapping
            2.0, 0.7, 5.0, 5.0, 100.0, 100.0, // other class, kept
        ];
        let out = LayoutPostProcess::default().apply(&rows, &labels(), 200.0, 200.0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].score, Some(0.9));
        assert_eq!(out[1].label, "Table");
    }

    #[test]
    fn test_boxes_are_clamped() {
        let rows = [1.0, 0.95, -20.0, -5.0, 500.0, 40.0];
        let out = LayoutPostProcess::default().apply(&rows, &labels(), 300.0, 200.0);
        assert_eq!(out[0].bbox.to_rect(), [0.0, 0.0, 300.0, 40.0]);
    }

    #[test]
    fn test_refinement_grows_text_regions_and_adds_uncovered_lines() {
        let regions = vec![
            LayoutDetection {
                bbox: BoundingBox::from_coords(10.0, 10.0, 100.0, 40.0),
                label: "Text".to_string(),
                score: Some(0.9),
            },
            LayoutDetection {
                bbox: BoundingBox::from_coords(10.0, 200.0, 300.0, 400.0),
                label: "Table".to_string(),
                score: Some(0.8),
            },
        ];
        let lines = vec![
            // Mostly inside the text region, sticks out to the right.
            BoundingBox::from_coords(12.0, 12.0, 120.0, 30.0),
            // Inside the table: covered, table unchanged.
            BoundingBox::from_coords(20.0, 210.0, 320.0, 230.0),
            // Outside everything.
            BoundingBox::from_coords(10.0, 100.0, 80.0, 120.0),
        ];

        let refined = LayoutPostProcess::default().refine_with_text_lines(regions, &lines, "Text");
        assert_eq!(refined.len(), 3);
        assert_eq!(refined[0].bbox.to_rect(), [10.0, 10.0, 120.0, 40.0]);
        assert_eq!(refined[1].label, "Text");
        assert_eq!(refined[1].score, None);
        assert_eq!(refined[2].bbox.to_rect(), [10.0, 200.0, 300.0, 400.0]);
    }

    #[test]
    fn test_uncovered_lines_can_be_ignored() {
        let post = LayoutPostProcess {
            add_uncovered_text: false,
            ..Default::default()
        };
        let lines = vec![BoundingBox::from_coords(0.0, 0.0, 10.0, 10.0)];
        assert!(post.refine_with_text_lines(Vec::new(), &lines, "text").is_empty());
    }

    #[test]
    fn test_text_label_follows_the_label_set() {
        let lower: Vec<String> = ["title", "text", "table"].iter().map(|s| s.to_string()).collect();
        assert_eq!(text_label(&lower), "text");
        assert_eq!(text_label(&labels()), "Text");

        let no_text: Vec<String> = ["figure", "table"].iter().map(|s| s.to_string()).collect();
        assert_eq!(text_label(&no_text), DEFAULT_TEXT_LABEL);
    }

    #[test]
    fn test_uncovered_lines_share_the_models_text_class() {
        let lower: Vec<String> = ["text", "title"].iter().map(|s| s.to_string()).collect();
        let regions = LayoutPostProcess::default().apply(
            &[0.0, 0.9, 0.0, 0.0, 100.0, 20.0],
            &lower,
            200.0,
            200.0,
        );
        let lines = vec![
            BoundingBox::from_coords(2.0, 2.0, 90.0, 18.0),
            BoundingBox::from_coords(10.0, 150.0, 90.0, 170.0),
        ];
        let refined =
            LayoutPostProcess::default().refine_with_text_lines(regions, &lines, text_label(&lower));
        assert_eq!(refined.len(), 2);
        assert!(refined.iter().all(|r| r.label == "text"));
    }
}
