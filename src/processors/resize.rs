//! Resizing for the three model inputs: detector (limit side, multiple of 32),
//! layout (fixed size) and recognizer (fixed height, padded width).

use crate::core::{OCRError, OcrResult};
use crate::processors::types::{ImageScaleInfo, LimitType};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Detector input sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetResize {
    pub limit_side_len: u32,
    pub limit_type: LimitType,
    /// Hard cap applied after the limit rule.
    pub max_side_limit: u32,
}

impl Default for DetResize {
    fn default() -> Self {
        Self {
            limit_side_len: 960,
            limit_type: LimitType::Max,
            max_side_limit: 4000,
        }
    }
}

impl DetResize {
    /// Computes the target `(width, height)` for an image of `width x height`.
    ///
    /// Both sides are rounded to the nearest multiple of 32, never below 32.
    pub fn target_size(&self, width: u32, height: u32) -> (u32, u32) {
        let limit = self.limit_side_len as f32;
        let ratio = match self.limit_type {
            LimitType::Max if height.max(width) as f32 > limit => limit / height.max(width) as f32,
            LimitType::Min if (height.min(width) as f32) < limit => limit / height.min(width) as f32,
            _ => 1.0,
        };

        let mut resize_h = (height as f32 * ratio) as u32;
        let mut resize_w = (width as f32 * ratio) as u32;

        if resize_h.max(resize_w) > self.max_side_limit {
            warn!(
                "Resized size {}x{} exceeds max_side_limit {}, shrinking",
                resize_w, resize_h, self.max_side_limit
            );
            let cap = self.max_side_limit as f32 / resize_h.max(resize_w) as f32;
            resize_h = (resize_h as f32 * cap) as u32;
            resize_w = (resize_w as f32 * cap) as u32;
        }

        (
            ((resize_w + 16) / 32 * 32).max(32),
            ((resize_h + 16) / 32 * 32).max(32),
        )
    }

    /// Resizes `img` for the detector and records the ratios needed to map
    /// predictions back.
    pub fn apply(&self, img: &RgbImage) -> OcrResult<(RgbImage, ImageScaleInfo)> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(OCRError::invalid_input("image has zero width or height"));
        }

        let (resize_w, resize_h) = self.target_size(width, height);
        let info = ImageScaleInfo::new(
            height as f32,
            width as f32,
            resize_h as f32 / height as f32,
            resize_w as f32 / width as f32,
        );
        if (resize_w, resize_h) == (width, height) {
            return Ok((img.clone(), info));
        }
        Ok((
            imageops::resize(img, resize_w, resize_h, FilterType::Triangle),
            info,
        ))
    }
}

/// Stretches `img` to exactly `width x height` and returns the ratios used.
pub fn fixed_resize(img: &RgbImage, width: u32, height: u32) -> (RgbImage, ImageScaleInfo) {
    let (src_w, src_h) = img.dimensions();
    let info = ImageScaleInfo::new(
        src_h as f32,
        src_w as f32,
        height as f32 / src_h.max(1) as f32,
        width as f32 / src_w.max(1) as f32,
    );
    (
        imageops::resize(img, width, height, FilterType::Triangle),
        info,
    )
}

/// Recognizer input sizing: fixed height, width proportional to the crop and
/// right-padded to the batch width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecResize {
    pub height: u32,
    /// Width used when every crop in the batch is narrower than `max_width / height`.
    pub max_width: u32,
    /// Upper bound for wide batches.
    pub hard_max_width: u32,
}

impl Default for RecResize {
    fn default() -> Self {
        Self {
            height: 48,
            max_width: 320,
            hard_max_width: 3200,
        }
    }
}

impl RecResize {
    /// Width the batch is padded to, given its widest width/height ratio.
    fn batch_width(&self, max_wh_ratio: f32) -> u32 {
        let wanted = (self.height as f32 * max_wh_ratio).ceil() as u32;
        wanted.max(self.max_width).clamp(1, self.hard_max_width)
    }

    /// Resizes one crop to the recognizer height and pads it to `target_width`.
    fn resize_and_pad(&self, img: &RgbImage, target_width: u32) -> RgbImage {
        let (w, h) = img.dimensions();
        let ratio = w as f32 / h.max(1) as f32;
        let resized_w = ((self.height as f32 * ratio).ceil() as u32).clamp(1, target_width);
        let resized = imageops::resize(img, resized_w, self.height, FilterType::Triangle);

        let mut padded = RgbImage::from_pixel(target_width, self.height, Rgb([0, 0, 0]));
        imageops::replace(&mut padded, &resized, 0, 0);
        padded
    }

    /// Resizes a batch of crops to a common `[height, batch_width]` size.
    pub fn apply(&self, imgs: &[&RgbImage]) -> Vec<RgbImage> {
        let max_wh_ratio = imgs
            .iter()
            .map(|img| img.width() as f32 / img.height().max(1) as f32)
            .fold(0.0f32, f32::max);
        let target_width = self.batch_width(max_wh_ratio);
        imgs.iter()
            .map(|img| self.resize_and_pad(img, target_width))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_det_resize_limits_long_side() {
        let resize = DetResize::default();
        let (w, h) = resize.target_size(1920, 1080);
        assert_eq!(w % 32, 0);
        assert_eq!(h % 32, 0);
        assert!(w <= 960 + 16);
        assert_eq!((w, h), (960, 544));
    }

    #[test]
    fn test_det_resize_keeps_small_images() {
        let resize = DetResize::default();
        assert_eq!(resize.target_size(640, 480), (640, 480));
        assert_eq!(resize.target_size(10, 10), (32, 32));
    }

    #[test]
    fn test_det_resize_apply_records_ratios() {
        let img = RgbImage::new(100, 50);
        let (resized, info) = DetResize::default().apply(&img).unwrap();
        assert_eq!(resized.dimensions(), (96, 64));
        assert_eq!(info.src_w, 100.0);
        assert!((info.ratio_w - 0.96).abs() < 1e-6);
    }

    #[test]
    fn test_rec_resize_pads_batch_to_widest() {
        let resize = RecResize::default();
        let square = RgbImage::new(48, 48);
        let wide = RgbImage::new(960, 48);
        let out = resize.apply(&[&square, &wide]);
        assert!(out.iter().all(|img| img.dimensions() == (960, 48)));
    }

    #[test]
    fn test_rec_resize_uses_default_width_for_narrow_batches() {
        let resize = RecResize::default();
        let narrow = RgbImage::new(20, 10);
        let out = resize.apply(&[&narrow]);
        assert_eq!(out[0].dimensions(), (320, 48));
    }
}
