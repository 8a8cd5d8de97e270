//! Per-channel image normalization into NCHW tensors.

use crate::core::{OCRError, OcrResult, Tensor4D};
use crate::processors::types::ColorOrder;
use image::RgbImage;
use rayon::prelude::*;

/// Computes `pixel * alpha[c] + beta[c]` for each channel, where
/// `alpha = scale / std` and `beta = -mean / std`.
#[derive(Debug, Clone)]
pub struct NormalizeImage {
    /// Per-channel multiplier, in output channel order
    pub alpha: [f32; 3],
    /// Per-channel offset, in output channel order
    pub beta: [f32; 3],
    /// Channel order of the produced tensor
    pub color_order: ColorOrder,
}

impl NormalizeImage {
    /// Creates a normalizer. `mean` and `std` are given in output channel order.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `scale` or any `std` value is not positive.
    pub fn new(scale: f32, mean: [f32; 3], std: [f32; 3], color_order: ColorOrder) -> OcrResult<Self> {
        if scale <= 0.0 {
            return Err(OCRError::config_error_detailed(
                "normalization",
                format!("scale must be greater than 0, got {scale}"),
            ));
        }
        if let Some((i, s)) = std.iter().enumerate().find(|(_, s)| **s <= 0.0) {
            return Err(OCRError::config_error_detailed(
                "normalization",
                format!("standard deviation at index {i} must be greater than 0, got {s}"),
            ));
        }

        Ok(Self {
            alpha: std.map(|s| scale / s),
            beta: [0, 1, 2].map(|c| -mean[c] / std[c]),
            color_order,
        })
    }

    /// ImageNet mean/std (given in RGB order) for the requested output order.
    pub fn imagenet(color_order: ColorOrder) -> OcrResult<Self> {
        let (mean, std) = match color_order {
            ColorOrder::RGB => ([0.485, 0.456, 0.406], [0.229, 0.224, 0.225]),
            ColorOrder::BGR => ([0.406, 0.456, 0.485], [0.225, 0.224, 0.229]),
        };
        Self::new(1.0 / 255.0, mean, std, color_order)
    }

    /// Maps pixels to `(x / 255 - 0.5) / 0.5`, the range recognizers are trained on.
    pub fn for_ocr_recognition(color_order: ColorOrder) -> OcrResult<Self> {
        Self::new(1.0 / 255.0, [0.5; 3], [0.5; 3], color_order)
    }

    /// Scales pixels to `[0, 1]` without centering.
    pub fn unit_scale(color_order: ColorOrder) -> OcrResult<Self> {
        Self::new(1.0 / 255.0, [0.0; 3], [1.0; 3], color_order)
    }

    fn source_channels(&self) -> [usize; 3] {
        match self.color_order {
            ColorOrder::RGB => [0, 1, 2],
            ColorOrder::BGR => [2, 1, 0],
        }
    }

    fn fill_chw(&self, img: &RgbImage, out: &mut [f32]) {
        let (width, height) = img.dimensions();
        let plane = (width * height) as usize;
        let src_channels = self.source_channels();
        for (idx, pixel) in img.pixels().enumerate() {
            for c in 0..3 {
                out[c * plane + idx] = pixel[src_channels[c]] as f32 * self.alpha[c] + self.beta[c];
            }
        }
    }

    /// Normalizes one image into a `[1, 3, H, W]` tensor.
    pub fn normalize_to(&self, img: &RgbImage) -> OcrResult<Tensor4D> {
        self.normalize_batch_to(std::slice::from_ref(img))
    }

    /// Normalizes same-sized images into a `[N, 3, H, W]` tensor.
    ///
    /// # Errors
    ///
    /// Returns an error when the images differ in size.
    pub fn normalize_batch_to(&self, imgs: &[RgbImage]) -> OcrResult<Tensor4D> {
        let Some(first) = imgs.first() else {
            return Ok(Tensor4D::zeros((0, 3, 0, 0)));
        };
        let (width, height) = first.dimensions();
        if let Some((i, img)) = imgs
            .iter()
            .enumerate()
            .find(|(_, img)| img.dimensions() != (width, height))
        {
            return Err(OCRError::tensor_shape(
                "normalize batch",
                &format!("every image to be {width}x{height}"),
                &[i as i64, img.height() as i64, img.width() as i64],
            ));
        }

        let img_size = 3 * (width * height) as usize;
        let mut data = vec![0.0f32; imgs.len() * img_size];
        if imgs.len() == 1 {
            self.fill_chw(first, &mut data);
        } else {
            data.par_chunks_mut(img_size)
                .zip(imgs.par_iter())
                .for_each(|(out, img)| self.fill_chw(img, out));
        }

        Ok(Tensor4D::from_shape_vec(
            (imgs.len(), 3, height as usize, width as usize),
            data,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_recognition_normalization_range() {
        let norm = NormalizeImage::for_ocr_recognition(ColorOrder::RGB).unwrap();
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        let tensor = norm.normalize_to(&img).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 1]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bgr_swaps_channels() {
        let norm = NormalizeImage::unit_scale(ColorOrder::BGR).unwrap();
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        let tensor = norm.normalize_to(&img).unwrap();
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert!((tensor[[0, 2, 0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_batch_is_rejected() {
        let norm = NormalizeImage::imagenet(ColorOrder::RGB).unwrap();
        let imgs = vec![RgbImage::new(4, 4), RgbImage::new(8, 4)];
        assert!(norm.normalize_batch_to(&imgs).is_err());
    }

    #[test]
    fn test_invalid_std_is_rejected() {
        assert!(NormalizeImage::new(1.0, [0.0; 3], [1.0, 0.0, 1.0], ColorOrder::RGB).is_err());
        assert!(NormalizeImage::new(0.0, [0.0; 3], [1.0; 3], ColorOrder::RGB).is_err());
    }
}
