//! Perspective rectification of quadrilateral text regions.

use crate::core::{OCRError, OcrResult};
use crate::processors::geometry::{Point, order_quad};
use image::{Rgb, RgbImage, imageops};
use nalgebra::{DMatrix, DVector, Matrix3, RowDVector, Vector3};
use rayon::prelude::*;
use tracing::debug;

/// Height-to-width ratio from which a crop is treated as vertical text.
const VERTICAL_RATIO: f32 = 1.5;

/// Cuts the quadrilateral `quad` out of `src_image` and warps it to an upright
/// rectangle. Crops at least 1.5 times taller than wide are rotated by 90
/// degrees so the text runs horizontally.
pub fn get_rotate_crop_image(src_image: &RgbImage, quad: &[Point]) -> OcrResult<RgbImage> {
    let &[a, b, c, d] = quad else {
        return Err(OCRError::image_processing_error(format!(
            "a text region needs exactly 4 points, got {}",
            quad.len()
        )));
    };

    let min_x = quad.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
    let max_x = quad.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
    let min_y = quad.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
    let max_y = quad.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);

    let left = min_x.max(0.0) as u32;
    let top = min_y.max(0.0) as u32;
    let right = max_x.min(src_image.width() as f32) as u32;
    let bottom = max_y.min(src_image.height() as f32) as u32;
    if right <= left || bottom <= top {
        return Err(OCRError::image_processing_error(format!(
            "empty crop region ({left}, {top})-({right}, {bottom})"
        )));
    }

    let region = imageops::crop_imm(src_image, left, top, right - left, bottom - top).to_image();
    let shift = |p: Point| Point::new(p.x - left as f32, p.y - top as f32);
    let ordered = order_quad([shift(a), shift(b), shift(c), shift(d)]);

    let width = distance(&ordered[0], &ordered[1])
        .max(distance(&ordered[2], &ordered[3]))
        .round() as u32;
    let height = distance(&ordered[0], &ordered[3])
        .max(distance(&ordered[1], &ordered[2]))
        .round() as u32;
    if width == 0 || height == 0 {
        return Err(OCRError::image_processing_error(format!(
            "degenerate text region {width}x{height}"
        )));
    }

    let target = [
        Point::new(0.0, 0.0),
        Point::new(width as f32, 0.0),
        Point::new(width as f32, height as f32),
        Point::new(0.0, height as f32),
    ];
    let matrix = get_perspective_transform(&ordered, &target)?;
    let warped = warp_perspective(&region, &matrix, width, height)?;

    if warped.height() as f32 >= warped.width() as f32 * VERTICAL_RATIO {
        debug!("Rotating vertical crop {}x{}", warped.width(), warped.height());
        Ok(imageops::rotate270(&warped))
    } else {
        Ok(warped)
    }
}

fn distance(p1: &Point, p2: &Point) -> f32 {
    (p1.x - p2.x).hypot(p1.y - p2.y)
}

/// Solves for the homography mapping `src` onto `dst`.
fn get_perspective_transform(src: &[Point; 4], dst: &[Point; 4]) -> OcrResult<Matrix3<f32>> {
    let mut a = DMatrix::<f32>::zeros(8, 8);
    let mut b = DVector::<f32>::zeros(8);

    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        a.set_row(
            i * 2,
            &RowDVector::from_row_slice(&[s.x, s.y, 1.0, 0.0, 0.0, 0.0, -s.x * d.x, -s.y * d.x]),
        );
        b[i * 2] = d.x;
        a.set_row(
            i * 2 + 1,
            &RowDVector::from_row_slice(&[0.0, 0.0, 0.0, s.x, s.y, 1.0, -s.x * d.y, -s.y * d.y]),
        );
        b[i * 2 + 1] = d.y;
    }

    let h = a
        .lu()
        .solve(&b)
        .ok_or_else(|| OCRError::image_processing_error("perspective transform is singular"))?;
    Ok(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

/// Inverse-maps every destination pixel through `matrix` with bicubic sampling
/// and edge replication.
fn warp_perspective(
    src: &RgbImage,
    matrix: &Matrix3<f32>,
    width: u32,
    height: u32,
) -> OcrResult<RgbImage> {
    let inverse = matrix
        .try_inverse()
        .ok_or_else(|| OCRError::image_processing_error("perspective transform is not invertible"))?;

    let mut dst = RgbImage::new(width, height);
    let fallback = *src.get_pixel(0, 0);
    let row_len = (width * 3) as usize;
    let fill_row = |y: usize, row: &mut [u8]| {
        for x in 0..width {
            let p = inverse * Vector3::new(x as f32, y as f32, 1.0);
            let pixel = if p.z.abs() > f32::EPSILON {
                bicubic_interpolate(src, p.x / p.z, p.y / p.z)
            } else {
                fallback
            };
            let idx = (x * 3) as usize;
            row[idx..idx + 3].copy_from_slice(&pixel.0);
        }
    };

    let buffer: &mut [u8] = dst.as_mut();
    if height <= 1 {
        buffer
            .chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| fill_row(y, row));
    } else {
        buffer
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| fill_row(y, row));
    }
    Ok(dst)
}

#[inline]
fn get_pixel_replicate(image: &RgbImage, x: i32, y: i32) -> Rgb<u8> {
    let cx = x.clamp(0, image.width() as i32 - 1) as u32;
    let cy = y.clamp(0, image.height() as i32 - 1) as u32;
    *image.get_pixel(cx, cy)
}

/// Catmull-Rom cubic convolution kernel (a = -0.5).
#[inline]
fn cubic_kernel(t: f32) -> f32 {
    const A: f32 = -0.5;
    let t = t.abs();
    if t <= 1.0 {
        (A + 2.0) * t * t * t - (A + 3.0) * t * t + 1.0
    } else if t < 2.0 {
        A * t * t * t - 5.0 * A * t * t + 8.0 * A * t - 4.0 * A
    } else {
        0.0
    }
}

fn bicubic_interpolate(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (x0, y0) = (x.floor() as i32, y.floor() as i32);
    let (dx, dy) = (x - x0 as f32, y - y0 as f32);
    let wx = [dx + 1.0, dx, dx - 1.0, dx - 2.0].map(cubic_kernel);
    let wy = [dy + 1.0, dy, dy - 1.0, dy - 2.0].map(cubic_kernel);

    let mut acc = [0.0f32; 3];
    for (j, weight_y) in wy.iter().enumerate() {
        for (i, weight_x) in wx.iter().enumerate() {
            let pixel = get_pixel_replicate(image, x0 - 1 + i as i32, y0 - 1 + j as i32);
            for (c, value) in acc.iter_mut().enumerate() {
                *value += weight_x * weight_y * pixel.0[c] as f32;
            }
        }
    }
    Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 8) as u8, (y * 8) as u8, ((x + y) * 4) as u8])
        })
    }

    #[test]
    fn test_axis_aligned_crop_matches_region() {
        let image = gradient(20, 20);
        let quad = [
            Point::new(4.0, 2.0),
            Point::new(14.0, 2.0),
            Point::new(14.0, 8.0),
            Point::new(4.0, 8.0),
        ];
        let crop = get_rotate_crop_image(&image, &quad).unwrap();
        assert_eq!(crop.dimensions(), (10, 6));
        assert_eq!(crop.get_pixel(0, 0), image.get_pixel(4, 2));
    }

    #[test]
    fn test_point_order_does_not_matter() {
        let image = gradient(20, 20);
        let quad = [
            Point::new(14.0, 8.0),
            Point::new(4.0, 2.0),
            Point::new(4.0, 8.0),
            Point::new(14.0, 2.0),
        ];
        let crop = get_rotate_crop_image(&image, &quad).unwrap();
        assert_eq!(crop.dimensions(), (10, 6));
    }

    #[test]
    fn test_tall_crop_is_rotated() {
        let image = gradient(20, 40);
        let quad = [
            Point::new(2.0, 2.0),
            Point::new(6.0, 2.0),
            Point::new(6.0, 30.0),
            Point::new(2.0, 30.0),
        ];
        let crop = get_rotate_crop_image(&image, &quad).unwrap();
        assert_eq!(crop.dimensions(), (28, 4));
    }

    #[test]
    fn test_invalid_regions_are_rejected() {
        let image = gradient(10, 10);
        assert!(get_rotate_crop_image(&image, &[Point::new(0.0, 0.0)]).is_err());
        let outside = [
            Point::new(50.0, 50.0),
            Point::new(60.0, 50.0),
            Point::new(60.0, 60.0),
            Point::new(50.0, 60.0),
        ];
        assert!(get_rotate_crop_image(&image, &outside).is_err());
    }

    #[test]
    fn test_singular_matrix_cannot_be_warped() {
        let image = RgbImage::new(2, 2);
        let matrix = Matrix3::new(1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert!(warp_perspective(&image, &matrix, 2, 2).is_err());
    }
}
