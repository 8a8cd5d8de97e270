//! The four inference stages.
//!
//! Each stage returns a debug rendering next to its result. Layout and order
//! detection recompute text detection with the detector they are given; no
//! intermediate result outlives a call.

use crate::core::{OCRError, OcrResult};
use crate::domain::languages::replace_lang_with_code;
use crate::domain::schema::{self, LayoutResult, OrderResult, TextDetectionResult, TextLine, image_bbox};
use crate::pipeline::{LayoutDetect, ReadingOrder, TextDetect, TextRecognize};
use crate::processors::BoundingBox;
use crate::processors::sorting::sort_reading_order;
use crate::utils::get_rotate_crop_image;
use crate::utils::visualization::{PolygonLabels, draw_polys_on_image, draw_text_on_image};
use image::RgbImage;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Detects text regions and draws their polygons.
pub fn text_detection(
    image: &RgbImage,
    det: &dyn TextDetect,
) -> OcrResult<(RgbImage, TextDetectionResult)> {
    let result = det.detect(image)?;
    debug!("Text detection: {} regions", result.bboxes.len());

    let polygons: Vec<Vec<[f32; 2]>> = result.bboxes.iter().map(|b| b.polygon.clone()).collect();
    let rendered = draw_polys_on_image(&polygons, image, None);
    Ok((rendered, result))
}

fn detect_layout(image: &RgbImage, det: &dyn TextDetect, layout: &dyn LayoutDetect) -> OcrResult<LayoutResult> {
    let text_lines = det.detect(image)?;
    let result = layout.detect_layout(image, &text_lines)?;
    debug!(
        "Layout detection: {} regions from {} text lines",
        result.bboxes.len(),
        text_lines.bboxes.len()
    );
    Ok(result)
}

/// Runs text detection with `det`, then the layout model on its output, and
/// draws the labelled regions.
pub fn layout_detection(
    image: &RgbImage,
    det: &dyn TextDetect,
    layout: &dyn LayoutDetect,
) -> OcrResult<(RgbImage, LayoutResult)> {
    let result = detect_layout(image, det, layout)?;

    let polygons: Vec<Vec<[f32; 2]>> = result.bboxes.iter().map(|b| b.polygon.clone()).collect();
    let labels: Vec<String> = result.bboxes.iter().map(|b| b.label.clone()).collect();
    let rendered = draw_polys_on_image(&polygons, image, Some(PolygonLabels::layout(&labels)));
    Ok((rendered, result))
}

/// Runs layout detection, then orders the layout regions and draws their
/// positions.
pub fn order_detection(
    image: &RgbImage,
    det: &dyn TextDetect,
    layout: &dyn LayoutDetect,
    order: &dyn ReadingOrder,
) -> OcrResult<(RgbImage, OrderResult)> {
    let layout_result = detect_layout(image, det, layout)?;
    let rects: Vec<[f32; 4]> = layout_result.bboxes.iter().map(|b| b.bbox).collect();
    let result = order.order(image, &rects)?;

    let polygons: Vec<Vec<[f32; 2]>> = result.bboxes.iter().map(|b| b.polygon.clone()).collect();
    let labels: Vec<String> = result.bboxes.iter().map(|b| b.position.to_string()).collect();
    let rendered = draw_polys_on_image(&polygons, image, Some(PolygonLabels::order(&labels)));
    Ok((rendered, result))
}

/// Detects and reads every text line of `image`.
///
/// `langs` may hold codes or language names; they are resolved without
/// touching the caller's list. Lines with no recognized text are dropped and
/// the rest come back in reading order. The rendering is a white page with
/// each line's text drawn in its box.
pub fn ocr(
    image: &RgbImage,
    langs: &[String],
    det: &dyn TextDetect,
    rec: &dyn TextRecognize,
) -> OcrResult<(RgbImage, schema::OcrResult)> {
    let languages = replace_lang_with_code(langs)?;
    let detection = det.detect(image)?;

    let regions: Vec<BoundingBox> = detection.bboxes.iter().map(|b| b.to_bounding_box()).collect();
    let (regions, crops): (Vec<BoundingBox>, Vec<RgbImage>) = regions
        .into_par_iter()
        .filter_map(|region| match get_rotate_crop_image(image, &region.points) {
            Ok(crop) => Some((region, crop)),
            Err(e) => {
                warn!("Skipping text region {:?}: {}", region.to_rect(), e);
                None
            }
        })
        .unzip();

    let recognized = rec.recognize(&crops, &languages)?;
    if recognized.len() != crops.len() {
        return Err(OCRError::tensor_shape(
            "recognize text lines",
            &format!("{} results", crops.len()),
            &[recognized.len() as i64],
        ));
    }

    let lines: Vec<(BoundingBox, TextLine)> = regions
        .into_iter()
        .zip(recognized)
        .filter(|(_, (text, _))| !text.trim().is_empty())
        .map(|(region, (text, confidence))| {
            let line = TextLine {
                polygon: region.to_polygon(),
                bbox: region.to_rect(),
                text,
                confidence: Some(confidence),
            };
            (region, line)
        })
        .collect();
    let text_lines: Vec<TextLine> = sort_reading_order(lines, |(region, _)| region)
        .into_iter()
        .map(|(_, line)| line)
        .collect();
    debug!(
        "OCR: {} lines from {} regions",
        text_lines.len(),
        detection.bboxes.len()
    );

    let rects: Vec<[f32; 4]> = text_lines.iter().map(|l| l.bbox).collect();
    let texts: Vec<String> = text_lines.iter().map(|l| l.text.clone()).collect();
    let rendered = draw_text_on_image(&rects, &texts, image.width(), image.height());

    Ok((
        rendered,
        schema::OcrResult {
            text_lines,
            languages,
            image_bbox: image_bbox(image.width(), image.height()),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{LayoutBox, OrderBox, PolygonBox};
    use std::sync::Mutex;

    struct FixedDetector {
        boxes: Vec<[f32; 4]>,
    }

    impl TextDetect for FixedDetector {
        fn detect(&self, image: &RgbImage) -> OcrResult<TextDetectionResult> {
            Ok(TextDetectionResult {
                bboxes: self
                    .boxes
                    .iter()
                    .map(|r| PolygonBox::new(&BoundingBox::from_rect(*r), Some(0.9)))
                    .collect(),
                image_bbox: image_bbox(image.width(), image.height()),
            })
        }
    }

    /// Reads back the crop width so results are tied to their regions. Crops
    /// 6 pixels wide read as empty.
    struct WidthRecognizer;

    impl TextRecognize for WidthRecognizer {
        fn recognize(&self, crops: &[RgbImage], _languages: &[String]) -> OcrResult<Vec<(String, f32)>> {
            Ok(crops
                .iter()
                .map(|c| {
                    let text = if c.width() == 6 { String::new() } else { format!("w{}", c.width()) };
                    (text, 0.8)
                })
                .collect())
        }
    }

    /// Copies text lines into `Text` regions and records what it was given.
    #[derive(Default)]
    struct EchoLayout {
        seen_lines: Mutex<Vec<usize>>,
    }

    impl LayoutDetect for EchoLayout {
        fn detect_layout(&self, image: &RgbImage, text_lines: &TextDetectionResult) -> OcrResult<LayoutResult> {
            self.seen_lines.lock().unwrap().push(text_lines.bboxes.len());
            Ok(LayoutResult {
                bboxes: text_lines
                    .bboxes
                    .iter()
                    .map(|b| LayoutBox {
                        polygon: b.polygon.clone(),
                        confidence: b.confidence,
                        bbox: b.bbox,
                        label: "Text".to_string(),
                    })
                    .collect(),
                image_bbox: image_bbox(image.width(), image.height()),
            })
        }
    }

    struct ReverseOrder;

    impl ReadingOrder for ReverseOrder {
        fn order(&self, image: &RgbImage, rects: &[[f32; 4]]) -> OcrResult<OrderResult> {
            let n = rects.len();
            Ok(OrderResult {
                bboxes: rects
                    .iter()
                    .enumerate()
                    .map(|(i, r)| OrderBox {
                        polygon: BoundingBox::from_rect(*r).to_polygon(),
                        bbox: *r,
                        position: n - 1 - i,
                    })
                    .collect(),
                image_bbox: image_bbox(image.width(), image.height()),
            })
        }
    }

    fn page() -> RgbImage {
        RgbImage::from_pixel(100, 60, image::Rgb([255, 255, 255]))
    }

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_text_detection_returns_rendering_of_same_size() {
        let det = FixedDetector {
            boxes: vec![[10.0, 10.0, 40.0, 20.0]],
        };
        let (rendered, result) = text_detection(&page(), &det).unwrap();
        assert_eq!(rendered.dimensions(), (100, 60));
        assert_eq!(result.bboxes.len(), 1);
        assert_eq!(result.image_bbox, [0.0, 0.0, 100.0, 60.0]);
    }

    #[test]
    fn test_layout_detection_feeds_detector_output_to_layout() {
        let det = FixedDetector {
            boxes: vec![[10.0, 10.0, 40.0, 20.0], [10.0, 30.0, 40.0, 40.0]],
        };
        let layout = EchoLayout::default();
        let (_, result) = layout_detection(&page(), &det, &layout).unwrap();
        assert_eq!(*layout.seen_lines.lock().unwrap(), vec![2]);
        assert_eq!(result.bboxes.len(), 2);
    }

    #[test]
    fn test_order_detection_orders_layout_regions() {
        let det = FixedDetector {
            boxes: vec![[10.0, 10.0, 40.0, 20.0], [10.0, 30.0, 40.0, 40.0]],
        };
        let layout = EchoLayout::default();
        let (rendered, result) = order_detection(&page(), &det, &layout, &ReverseOrder).unwrap();
        assert_eq!(rendered.dimensions(), (100, 60));
        let positions: Vec<usize> = result.bboxes.iter().map(|b| b.position).collect();
        assert_eq!(positions, vec![1, 0]);
        assert_eq!(result.bboxes[0].bbox, [10.0, 10.0, 40.0, 20.0]);
    }

    #[test]
    fn test_ocr_sorts_lines_and_drops_empty_text() {
        let det = FixedDetector {
            boxes: vec![
                [50.0, 30.0, 80.0, 40.0],
                [10.0, 10.0, 40.0, 20.0],
                [60.0, 10.0, 66.0, 13.0],
            ],
        };
        let langs = owned(&["English"]);
        let (rendered, result) = ocr(&page(), &langs, &det, &WidthRecognizer).unwrap();

        assert_eq!(rendered.dimensions(), (100, 60));
        assert_eq!(result.languages, owned(&["en"]));
        assert_eq!(langs, owned(&["English"]));
        let texts: Vec<&str> = result.text_lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["w30", "w30"]);
        assert_eq!(result.text_lines[0].bbox, [10.0, 10.0, 40.0, 20.0]);
        assert_eq!(result.text_lines[1].bbox, [50.0, 30.0, 80.0, 40.0]);
    }

    #[test]
    fn test_ocr_is_repeatable() {
        let det = FixedDetector {
            boxes: vec![[10.0, 10.0, 40.0, 20.0], [10.0, 30.0, 60.0, 40.0]],
        };
        let langs = owned(&["en", "de"]);
        let (_, first) = ocr(&page(), &langs, &det, &WidthRecognizer).unwrap();
        let (_, second) = ocr(&page(), &langs, &det, &WidthRecognizer).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ocr_rejects_unknown_language() {
        let det = FixedDetector { boxes: vec![] };
        let err = ocr(&page(), &owned(&["Klingon"]), &det, &WidthRecognizer).unwrap_err();
        assert!(matches!(err, OCRError::UnsupportedLanguage { .. }));
    }
}
