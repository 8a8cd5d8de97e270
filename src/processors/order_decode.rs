//! Input encoding and output decoding for the reading-order model.
//!
//! The model scores every (box, position) pair. Decoding hands out positions
//! greedily: the best remaining pair wins, then its row and column are retired.

use crate::core::{OCRError, OcrResult};
use crate::processors::geometry::BoundingBox;
use crate::processors::sorting::reading_order_indices;
use ndarray::{Array2, Array3};

/// Side of the integer grid box coordinates are quantized to.
pub const ORDER_GRID_SIZE: f32 = 1000.0;

/// Scales `[x1, y1, x2, y2]` rectangles to the `0..=1000` grid as a `[1, n, 4]`
/// tensor, along with the matching all-ones attention mask.
pub fn encode_boxes(rects: &[[f32; 4]], width: f32, height: f32) -> (Array3<i64>, Array2<i64>) {
    let n = rects.len();
    let (width, height) = (width.max(1.0), height.max(1.0));
    let boxes = Array3::from_shape_fn((1, n, 4), |(_, i, k)| {
        let extent = if k % 2 == 0 { width } else { height };
        (rects[i][k] / extent * ORDER_GRID_SIZE)
            .round()
            .clamp(0.0, ORDER_GRID_SIZE) as i64
    });
    (boxes, Array2::ones((1, n)))
}

/// Decodes `[1, n, n]` logits (row = box, column = position) into a distinct
/// position for each of the `n` boxes.
pub fn decode_positions(shape: &[i64], logits: &[f32], n: usize) -> OcrResult<Vec<usize>> {
    let expected = [1, n as i64, n as i64];
    let matches = shape == expected || shape == &expected[1..];
    if !matches || logits.len() != n * n {
        return Err(OCRError::tensor_shape(
            "decode reading order",
            &format!("logits of shape [1, {n}, {n}]"),
            shape,
        ));
    }

    let mut pairs: Vec<(f32, usize, usize)> = logits
        .iter()
        .enumerate()
        .map(|(idx, &score)| (score, idx / n, idx % n))
        .collect();
    // Highest score first; ties go to the lower box, then the lower position.
    pairs.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut positions = vec![usize::MAX; n];
    let mut taken = vec![false; n];
    let mut assigned = 0;
    for (_, row, col) in pairs {
        if assigned == n {
            break;
        }
        if positions[row] != usize::MAX || taken[col] {
            continue;
        }
        positions[row] = col;
        taken[col] = true;
        assigned += 1;
    }
    Ok(positions)
}

/// Combines model positions for the first `model_positions.len()` boxes with
/// positions for the remaining boxes, which follow in reading order.
pub fn complete_positions(rects: &[[f32; 4]], model_positions: &[usize]) -> Vec<usize> {
    let limit = model_positions.len();
    let mut positions = model_positions.to_vec();
    if rects.len() <= limit {
        return positions;
    }

    let overflow: Vec<BoundingBox> = rects[limit..]
        .iter()
        .map(|r| BoundingBox::from_rect(*r))
        .collect();
    positions.resize(rects.len(), 0);
    for (rank, idx) in reading_order_indices(&overflow).into_iter().enumerate() {
        positions[limit + idx] = limit + rank;
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scales_to_grid() {
        let (boxes, mask) = encode_boxes(&[[0.0, 50.0, 200.0, 100.0]], 200.0, 100.0);
        assert_eq!(boxes.shape(), &[1, 1, 4]);
        assert_eq!(boxes.as_slice().unwrap(), &[0, 500, 1000, 1000]);
        assert_eq!(mask.as_slice().unwrap(), &[1]);
    }

    #[test]
    fn test_greedy_assignment_is_a_permutation() {
        // Box 0 prefers position 1, box 1 prefers position 1 less strongly.
        let logits = [
            0.1, 0.9, 0.0, //
            0.2, 0.8, 0.1, //
            0.0, 0.3, 0.5,
        ];
        let positions = decode_positions(&[1, 3, 3], &logits, 3).unwrap();
        assert_eq!(positions, vec![1, 0, 2]);
    }

    #[test]
    fn test_identity_logits_keep_order() {
        let n = 4;
        let mut logits = vec![0.0; n * n];
        for i in 0..n {
            logits[i * n + i] = 1.0;
        }
        assert_eq!(decode_positions(&[1, 4, 4], &logits, n).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        assert!(decode_positions(&[1, 2, 3], &[0.0; 6], 2).is_err());
    }

    #[test]
    fn test_overflow_boxes_follow_in_reading_order() {
        let rects = [
            [0.0, 0.0, 10.0, 10.0],
            [0.0, 20.0, 10.0, 30.0],
            [0.0, 90.0, 10.0, 95.0],
            [0.0, 50.0, 10.0, 60.0],
        ];
        let positions = complete_positions(&rects, &[1, 0]);
        assert_eq!(positions, vec![1, 0, 3, 2]);
    }
}
