//! Debug renderings returned next to each prediction.
//!
//! Text and labels need a TrueType font. One is looked up in the usual system
//! locations on first use; without it only the shapes are drawn.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;
use once_cell::sync::Lazy;
use tracing::{debug, info};

const BBOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BACKGROUND_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Font size for layout labels.
const LAYOUT_LABEL_FONT_SIZE: f32 = 16.0;
/// Font size for reading-order positions.
const ORDER_LABEL_FONT_SIZE: f32 = 20.0;

const FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static SYSTEM_FONT: Lazy<Option<FontVec>> = Lazy::new(|| {
    if let Ok(path) = std::env::var("OAR_FONT_PATH")
        && let Some(font) = load_font(&path)
    {
        return Some(font);
    }
    let font = FONT_PATHS.iter().find_map(|path| load_font(path));
    if font.is_none() {
        debug!("No system font found, labels will not be drawn");
    }
    font
});

fn load_font(path: &str) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    let font = FontVec::try_from_vec(data).ok()?;
    info!("Loaded label font: {}", path);
    Some(font)
}

/// Per-polygon labels and the size to draw them at.
#[derive(Debug, Clone, Copy)]
pub struct PolygonLabels<'a> {
    pub texts: &'a [String],
    pub font_size: f32,
}

impl<'a> PolygonLabels<'a> {
    /// Region class names.
    pub fn layout(texts: &'a [String]) -> Self {
        Self {
            texts,
            font_size: LAYOUT_LABEL_FONT_SIZE,
        }
    }

    /// Reading-order positions.
    pub fn order(texts: &'a [String]) -> Self {
        Self {
            texts,
            font_size: ORDER_LABEL_FONT_SIZE,
        }
    }
}

/// Draws each polygon outline and, when given, its label at the first vertex.
pub fn draw_polys_on_image(
    polygons: &[Vec<[f32; 2]>],
    image: &RgbImage,
    labels: Option<PolygonLabels<'_>>,
) -> RgbImage {
    let mut canvas = image.clone();
    for polygon in polygons {
        draw_polygon_outline(&mut canvas, polygon, 2);
    }

    if let (Some(labels), Some(font)) = (labels, SYSTEM_FONT.as_ref()) {
        let scale = PxScale::from(labels.font_size);
        for (polygon, label) in polygons.iter().zip(labels.texts) {
            let Some(&[x, y]) = polygon.first() else {
                continue;
            };
            draw_label(&mut canvas, font, scale, label, x as i32, y as i32);
        }
    }
    canvas
}

/// Renders recognized text on a white canvas of `width x height`, each string
/// sized to fit its rectangle.
pub fn draw_text_on_image(rects: &[[f32; 4]], texts: &[String], width: u32, height: u32) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(width.max(1), height.max(1), BACKGROUND_COLOR);
    let Some(font) = SYSTEM_FONT.as_ref() else {
        for rect in rects {
            let [x1, y1, x2, y2] = *rect;
            draw_polygon_outline(&mut canvas, &[[x1, y1], [x2, y1], [x2, y2], [x1, y2]], 1);
        }
        return canvas;
    };

    for (rect, text) in rects.iter().zip(texts) {
        let [x1, y1, x2, y2] = *rect;
        let (box_w, box_h) = (x2 - x1, y2 - y1);
        if box_w <= 0.0 || box_h <= 0.0 || text.is_empty() {
            continue;
        }
        let mut size = box_h.max(8.0);
        let text_w = text_width(font, PxScale::from(size), text);
        if text_w > box_w {
            size = (size * box_w / text_w).max(6.0);
        }
        draw_text_mut(
            &mut canvas,
            TEXT_COLOR,
            x1 as i32,
            y1 as i32,
            PxScale::from(size),
            font,
            text,
        );
    }
    canvas
}

fn text_width(font: &FontVec, scale: PxScale, text: &str) -> f32 {
    let scaled = font.as_scaled(scale);
    text.chars().map(|c| scaled.h_advance(scaled.glyph_id(c))).sum()
}

fn draw_label(canvas: &mut RgbImage, font: &FontVec, scale: PxScale, label: &str, x: i32, y: i32) {
    let w = text_width(font, scale, label).ceil().max(1.0) as u32 + 4;
    let h = scale.y.ceil().max(1.0) as u32 + 2;
    let top = (y - h as i32).max(0);
    draw_filled_rect_mut(canvas, Rect::at(x, top).of_size(w, h), LABEL_BACKGROUND);
    draw_text_mut(canvas, LABEL_COLOR, x + 2, top, scale, font, label);
}

fn draw_polygon_outline(canvas: &mut RgbImage, polygon: &[[f32; 2]], thickness: i32) {
    let n = polygon.len();
    if n < 2 {
        return;
    }
    for i in 0..n {
        let [x1, y1] = polygon[i];
        let [x2, y2] = polygon[(i + 1) % n];
        for offset in 0..thickness {
            let d = offset as f32;
            draw_line_segment_mut(canvas, (x1 + d, y1 + d), (x2 + d, y2 + d), BBOX_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygons_are_drawn_on_a_copy() {
        let image = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let polys = vec![vec![[2.0, 2.0], [10.0, 2.0], [10.0, 10.0], [2.0, 10.0]]];
        let out = draw_polys_on_image(&polys, &image, None);
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(*out.get_pixel(5, 2), BBOX_COLOR);
        assert_eq!(*image.get_pixel(5, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_presets_use_their_font_sizes() {
        let texts = vec!["text".to_string()];
        assert_eq!(PolygonLabels::layout(&texts).font_size, LAYOUT_LABEL_FONT_SIZE);
        assert_eq!(PolygonLabels::order(&texts).font_size, ORDER_LABEL_FONT_SIZE);

        let image = RgbImage::from_pixel(40, 40, Rgb([0, 0, 0]));
        let polys = vec![vec![[2.0, 2.0], [30.0, 2.0], [30.0, 30.0], [2.0, 30.0]]];
        let out = draw_polys_on_image(&polys, &image, Some(PolygonLabels::order(&texts)));
        assert_eq!(out.dimensions(), (40, 40));
    }

    #[test]
    fn test_text_canvas_is_white_and_sized() {
        let out = draw_text_on_image(&[], &[], 30, 12);
        assert_eq!(out.dimensions(), (30, 12));
        assert!(out.pixels().all(|p| *p == BACKGROUND_COLOR));
    }
}
