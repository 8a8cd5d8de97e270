//! Scale-aware layout detection model.
//!
//! Covers PaddleDetection exports of RT-DETR (PP-DocLayout) and PicoDet. Both
//! take a fixed-size image plus auxiliary `scale_factor` and, for RT-DETR,
//! `im_shape` inputs, and emit `[class_id, score, x1, y1, x2, y2]` rows in
//! source image coordinates.

use crate::core::inference::{OrtInfer, TensorInput};
use crate::core::{OCRError, OcrResult};
use crate::domain::schema::{LayoutBox, LayoutResult, TextDetectionResult, image_bbox};
use crate::pipeline::LayoutDetect;
use crate::processors::layout_postprocess::text_label;
use crate::processors::resize::fixed_resize;
use crate::processors::{ColorOrder, LayoutDetection, LayoutPostProcess, NormalizeImage};
use image::RgbImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const IMAGE_INPUT: &str = "image";
const IM_SHAPE_INPUT: &str = "im_shape";
const SCALE_FACTOR_INPUT: &str = "scale_factor";

/// Class names of PP-DocLayout-L.
const PP_DOCLAYOUT_LABELS: &[&str] = &[
    "paragraph_title",
    "image",
    "text",
    "number",
    "abstract",
    "content",
    "figure_title",
    "formula",
    "table",
    "table_title",
    "reference",
    "doc_title",
    "footnote",
    "header",
    "algorithm",
    "footer",
    "seal",
    "chart_title",
    "chart",
    "formula_number",
    "header_image",
    "footer_image",
    "aside_text",
];

/// Class names of the PicoDet CDLA model.
const CDLA_LABELS: &[&str] = &[
    "text",
    "title",
    "figure",
    "figure_caption",
    "table",
    "table_caption",
    "header",
    "footer",
    "reference",
    "equation",
];

/// Class names of the PubLayNet models.
const PUBLAYNET_LABELS: &[&str] = &["text", "title", "list", "table", "figure"];

/// The class names a layout checkpoint was trained with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutLabels {
    #[default]
    PpDoclayout,
    Cdla,
    Publaynet,
    /// Explicit list, in class id order.
    Custom(Vec<String>),
}

impl FromStr for LayoutLabels {
    type Err = OCRError;

    /// Parses a preset name or a comma-separated list of labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pp-doclayout" => Ok(Self::PpDoclayout),
            "cdla" => Ok(Self::Cdla),
            "publaynet" => Ok(Self::Publaynet),
            _ => {
                let labels: Vec<String> = s
                    .split(',')
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect();
                if labels.len() < 2 {
                    return Err(OCRError::config_error_detailed(
                        "layout labels",
                        format!(
                            "'{s}' is neither a preset (pp-doclayout, cdla, publaynet) nor a comma-separated list"
                        ),
                    ));
                }
                Ok(Self::Custom(labels))
            }
        }
    }
}

impl LayoutLabels {
    /// Reads one label per line from `path`.
    pub fn from_file(path: &Path) -> OcrResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OCRError::config_error_detailed(format!("layout labels '{}'", path.display()), e.to_string())
        })?;
        let labels: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        if labels.is_empty() {
            return Err(OCRError::config_error_detailed(
                format!("layout labels '{}'", path.display()),
                "file is empty",
            ));
        }
        Ok(Self::Custom(labels))
    }

    pub fn names(&self) -> Vec<String> {
        let preset = match self {
            Self::PpDoclayout => PP_DOCLAYOUT_LABELS,
            Self::Cdla => CDLA_LABELS,
            Self::Publaynet => PUBLAYNET_LABELS,
            Self::Custom(labels) => return labels.clone(),
        };
        preset.iter().map(|l| l.to_string()).collect()
    }
}

/// Settings for [`LayoutModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutModelConfig {
    /// Model input size as `(height, width)`.
    pub image_shape: (u32, u32),
    pub labels: LayoutLabels,
    pub postprocess: LayoutPostProcess,
    pub color_order: ColorOrder,
}

impl Default for LayoutModelConfig {
    fn default() -> Self {
        Self {
            image_shape: (640, 640),
            labels: LayoutLabels::default(),
            postprocess: LayoutPostProcess::default(),
            color_order: ColorOrder::BGR,
        }
    }
}

/// Layout detection model.
#[derive(Debug)]
pub struct LayoutModel {
    inference: OrtInfer,
    image_shape: (u32, u32),
    labels: Vec<String>,
    normalizer: NormalizeImage,
    postprocess: LayoutPostProcess,
}

impl LayoutModel {
    pub fn new(inference: OrtInfer, config: LayoutModelConfig) -> OcrResult<Self> {
        let (h, w) = config.image_shape;
        if h == 0 || w == 0 {
            return Err(OCRError::config_error_detailed(
                "layout model",
                format!("input size {w}x{h} must be positive"),
            ));
        }
        Ok(Self {
            inference,
            image_shape: config.image_shape,
            labels: config.labels.names(),
            // Paddle's layout exports expect inputs scaled to [0,1] without mean/std shift
            normalizer: NormalizeImage::unit_scale(config.color_order)?,
            postprocess: config.postprocess,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Whether the export declares `name` as an input. Exports whose inputs
    /// could not be listed get every input.
    fn wants_input(&self, name: &str) -> bool {
        let names = self.inference.input_names();
        names.is_empty() || names.iter().any(|n| n == name)
    }

    /// Runs the forward pass and returns the raw regions, before refinement.
    pub fn predict(&self, image: &RgbImage) -> OcrResult<Vec<LayoutDetection>> {
        let (target_h, target_w) = self.image_shape;
        let (resized, scale) = fixed_resize(image, target_w, target_h);
        let batch = self.normalizer.normalize_to(&resized)?;

        let im_shape = Array2::from_shape_vec((1, 2), vec![target_h as f32, target_w as f32])?;
        let scale_factor = Array2::from_shape_vec((1, 2), vec![scale.ratio_h, scale.ratio_w])?;

        let mut inputs = vec![(IMAGE_INPUT, TensorInput::Array4(&batch))];
        if self.wants_input(IM_SHAPE_INPUT) {
            inputs.push((IM_SHAPE_INPUT, TensorInput::Array2(&im_shape)));
        }
        if self.wants_input(SCALE_FACTOR_INPUT) {
            inputs.push((SCALE_FACTOR_INPUT, TensorInput::Array2(&scale_factor)));
        }

        let (shape, data) = self.inference.infer_first_f32(&inputs)?;
        let rows = detection_rows(&shape, &data)?;
        let detections = self.postprocess.apply(
            &rows,
            &self.labels,
            image.width() as f32,
            image.height() as f32,
        );
        debug!("Layout model: {} regions", detections.len());
        Ok(detections)
    }
}

/// Flattens the first output into 6-value rows. Some exports append extra
/// columns per row; those are dropped.
fn detection_rows(shape: &[i64], data: &[f32]) -> OcrResult<Vec<f32>> {
    let row_len = match shape.last() {
        Some(&n) if n >= 6 => n as usize,
        _ => {
            return Err(OCRError::tensor_shape(
                "read layout detections",
                "[N, 6] rows of [class_id, score, x1, y1, x2, y2]",
                shape,
            ));
        }
    };
    Ok(data
        .chunks_exact(row_len)
        .flat_map(|row| row[..6].iter().copied())
        .collect())
}

impl LayoutDetect for LayoutModel {
    fn detect_layout(&self, image: &RgbImage, text_lines: &TextDetectionResult) -> OcrResult<LayoutResult> {
        let regions = self.predict(image)?;
        let lines: Vec<_> = text_lines.bboxes.iter().map(|b| b.to_bounding_box()).collect();
        let regions = self
            .postprocess
            .refine_with_text_lines(regions, &lines, text_label(&self.labels));

        let bboxes = regions
            .into_iter()
            .map(|region| LayoutBox {
                polygon: region.bbox.to_polygon(),
                confidence: region.score,
                bbox: region.bbox.to_rect(),
                label: region.label,
            })
            .collect();
        Ok(LayoutResult {
            bboxes,
            image_bbox: image_bbox(image.width(), image.height()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_presets_parse() {
        assert_eq!("pp-doclayout".parse::<LayoutLabels>().unwrap(), LayoutLabels::PpDoclayout);
        assert_eq!("PubLayNet".parse::<LayoutLabels>().unwrap(), LayoutLabels::Publaynet);
        assert_eq!(LayoutLabels::PpDoclayout.names().len(), 23);
        assert_eq!(LayoutLabels::Cdla.names()[9], "equation");
    }

    #[test]
    fn test_custom_labels_parse() {
        let labels: LayoutLabels = "Text, Table ,Figure".parse().unwrap();
        assert_eq!(labels.names(), vec!["Text", "Table", "Figure"]);
        assert!("nonsense".parse::<LayoutLabels>().is_err());
    }

    #[test]
    fn test_detection_rows_drop_extra_columns() {
        let data = [0.0, 0.9, 1.0, 2.0, 3.0, 4.0, 7.0, 1.0, 0.8, 5.0, 6.0, 7.0, 8.0, 7.0];
        let rows = detection_rows(&[2, 7], &data).unwrap();
        assert_eq!(rows, vec![0.0, 0.9, 1.0, 2.0, 3.0, 4.0, 1.0, 0.8, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_detection_rows_reject_short_rows() {
        assert!(detection_rows(&[1, 4], &[0.0; 4]).is_err());
        assert!(detection_rows(&[], &[]).is_err());
    }

    #[test]
    fn test_config_default_input_size() {
        let config = LayoutModelConfig::default();
        assert_eq!(config.image_shape, (640, 640));
        assert_eq!(config.labels, LayoutLabels::PpDoclayout);
    }
}
