//! Top-to-bottom, left-to-right ordering of boxes.

use crate::processors::geometry::BoundingBox;
use std::cmp::Ordering;

/// Vertical distance under which two boxes count as the same line.
pub const SAME_LINE_TOLERANCE: f32 = 10.0;

/// Returns the indices of `boxes` in reading order.
///
/// Boxes are sorted by their top edge, then left edge. Neighbours whose tops
/// differ by less than [`SAME_LINE_TOLERANCE`] are then bubbled into
/// left-to-right order.
pub fn reading_order_indices(boxes: &[BoundingBox]) -> Vec<usize> {
    let keys: Vec<(f32, f32)> = boxes.iter().map(|b| (b.y_min(), b.x_min())).collect();
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        keys[a]
            .0
            .partial_cmp(&keys[b].0)
            .unwrap_or(Ordering::Equal)
            .then(keys[a].1.partial_cmp(&keys[b].1).unwrap_or(Ordering::Equal))
    });

    for i in 0..order.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            let (cur, next) = (keys[order[j]], keys[order[j + 1]]);
            if (next.0 - cur.0).abs() < SAME_LINE_TOLERANCE && next.1 < cur.1 {
                order.swap(j, j + 1);
            } else {
                break;
            }
        }
    }
    order
}

/// Sorts `items` into reading order using the box returned by `bbox_of`.
pub fn sort_reading_order<T>(items: Vec<T>, bbox_of: impl Fn(&T) -> &BoundingBox) -> Vec<T> {
    let boxes: Vec<BoundingBox> = items.iter().map(|item| bbox_of(item).clone()).collect();
    let order = reading_order_indices(&boxes);
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_then_columns() {
        let boxes = vec![
            BoundingBox::from_coords(100.0, 50.0, 150.0, 60.0),
            BoundingBox::from_coords(10.0, 52.0, 60.0, 62.0),
            BoundingBox::from_coords(10.0, 0.0, 60.0, 10.0),
        ];
        assert_eq!(reading_order_indices(&boxes), vec![2, 1, 0]);
    }

    #[test]
    fn test_far_apart_lines_keep_vertical_order() {
        let boxes = vec![
            BoundingBox::from_coords(0.0, 100.0, 10.0, 110.0),
            BoundingBox::from_coords(50.0, 20.0, 60.0, 30.0),
        ];
        assert_eq!(reading_order_indices(&boxes), vec![1, 0]);
    }

    #[test]
    fn test_sort_items_by_box() {
        let items = vec![
            ("second", BoundingBox::from_coords(0.0, 40.0, 5.0, 45.0)),
            ("first", BoundingBox::from_coords(0.0, 0.0, 5.0, 5.0)),
        ];
        let sorted = sort_reading_order(items, |(_, b)| b);
        assert_eq!(sorted[0].0, "first");
        assert_eq!(sorted[1].0, "second");
        assert!(reading_order_indices(&[]).is_empty());
    }
}
