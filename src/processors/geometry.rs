//! Geometric primitives shared by the post-processors.
//!
//! Polygons coming out of the detector are kept as [`BoundingBox`] point lists;
//! layout and ordering work on their axis-aligned hulls, so most overlap
//! measures here are computed on those hulls.

use imageproc::contours::Contour;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::f32::consts::PI;

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    /// X-coordinate of the point.
    pub x: f32,
    /// Y-coordinate of the point.
    pub y: f32,
}

impl Point {
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns the point as an `[x, y]` pair.
    pub fn to_array(self) -> [f32; 2] {
        [self.x, self.y]
    }
}

impl From<[f32; 2]> for Point {
    fn from(p: [f32; 2]) -> Self {
        Self::new(p[0], p[1])
    }
}

/// A polygon given by its vertices, usually four corners of a text region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    /// Vertices in drawing order.
    pub points: Vec<Point>,
}

impl BoundingBox {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Creates the axis-aligned rectangle `(x1, y1)`-`(x2, y2)` as four corners,
    /// clockwise from the top-left.
    pub fn from_coords(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            points: vec![
                Point::new(x1, y1),
                Point::new(x2, y1),
                Point::new(x2, y2),
                Point::new(x1, y2),
            ],
        }
    }

    /// Creates a rectangle from an `[x1, y1, x2, y2]` array.
    pub fn from_rect(rect: [f32; 4]) -> Self {
        Self::from_coords(rect[0], rect[1], rect[2], rect[3])
    }

    /// Creates a polygon from the points of an imageproc contour.
    pub fn from_contour(contour: &Contour<u32>) -> Self {
        Self {
            points: contour
                .points
                .iter()
                .map(|p| Point::new(p.x as f32, p.y as f32))
                .collect(),
        }
    }

    /// Polygon area by the shoelace formula; 0 for fewer than three points.
    pub fn area(&self) -> f32 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f32 = (0..n)
            .map(|i| {
                let (a, b) = (self.points[i], self.points[(i + 1) % n]);
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice.abs() / 2.0
    }

    pub fn perimeter(&self) -> f32 {
        let n = self.points.len();
        (0..n)
            .map(|i| {
                let (a, b) = (self.points[i], self.points[(i + 1) % n]);
                ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
            })
            .sum()
    }

    pub fn x_min(&self) -> f32 {
        self.fold_coord(|p| p.x, f32::INFINITY, f32::min)
    }

    pub fn y_min(&self) -> f32 {
        self.fold_coord(|p| p.y, f32::INFINITY, f32::min)
    }

    pub fn x_max(&self) -> f32 {
        self.fold_coord(|p| p.x, f32::NEG_INFINITY, f32::max)
    }

    pub fn y_max(&self) -> f32 {
        self.fold_coord(|p| p.y, f32::NEG_INFINITY, f32::max)
    }

    fn fold_coord(&self, coord: impl Fn(&Point) -> f32, init: f32, f: fn(f32, f32) -> f32) -> f32 {
        if self.points.is_empty() {
            return 0.0;
        }
        self.points.iter().map(coord).fold(init, f)
    }

    /// The axis-aligned hull as `[x1, y1, x2, y2]`.
    pub fn to_rect(&self) -> [f32; 4] {
        [self.x_min(), self.y_min(), self.x_max(), self.y_max()]
    }

    /// The vertices as `[x, y]` pairs.
    pub fn to_polygon(&self) -> Vec<[f32; 2]> {
        self.points.iter().map(|p| p.to_array()).collect()
    }

    /// Area of the axis-aligned hull.
    pub fn rect_area(&self) -> f32 {
        (self.x_max() - self.x_min()).max(0.0) * (self.y_max() - self.y_min()).max(0.0)
    }

    /// Intersection area of the two axis-aligned hulls.
    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x_min().max(other.x_min());
        let iy1 = self.y_min().max(other.y_min());
        let ix2 = self.x_max().min(other.x_max());
        let iy2 = self.y_max().min(other.y_max());
        if ix1 >= ix2 || iy1 >= iy2 {
            return 0.0;
        }
        (ix2 - ix1) * (iy2 - iy1)
    }

    /// Intersection over union of the axis-aligned hulls.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.rect_area() + other.rect_area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    /// Fraction of this box's hull that lies inside `other`.
    pub fn ioa(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        let own = self.rect_area();
        if inter <= 0.0 || own <= 0.0 {
            return 0.0;
        }
        inter / own
    }

    /// Smallest axis-aligned rectangle enclosing both boxes.
    pub fn union(&self, other: &Self) -> Self {
        Self::from_coords(
            self.x_min().min(other.x_min()),
            self.y_min().min(other.y_min()),
            self.x_max().max(other.x_max()),
            self.y_max().max(other.y_max()),
        )
    }

    /// Convex hull by Graham scan. Inputs with fewer than three points are returned as-is.
    fn convex_hull(&self) -> BoundingBox {
        if self.points.len() < 3 {
            return self.clone();
        }

        let mut points = self.points.clone();
        let start_idx = points
            .iter()
            .position_min_by(|a, b| {
                a.y.partial_cmp(&b.y)
                    .unwrap_or(Ordering::Equal)
                    .then(a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
            })
            .unwrap_or(0);
        points.swap(0, start_idx);
        let pivot = points[0];

        points[1..].sort_by(|a, b| {
            let cross = cross_product(&pivot, a, b);
            if cross == 0.0 {
                let da = (a.x - pivot.x).powi(2) + (a.y - pivot.y).powi(2);
                let db = (b.x - pivot.x).powi(2) + (b.y - pivot.y).powi(2);
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            } else if cross > 0.0 {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        });

        let mut hull: Vec<Point> = Vec::with_capacity(points.len());
        for point in points {
            while hull.len() > 1
                && cross_product(&hull[hull.len() - 2], &hull[hull.len() - 1], &point) <= 0.0
            {
                hull.pop();
            }
            hull.push(point);
        }
        BoundingBox::new(hull)
    }

    /// Minimum-area enclosing rectangle, found with rotating calipers over the
    /// convex hull. Degenerate (collinear) inputs fall back to the axis-aligned hull.
    pub fn get_min_area_rect(&self) -> MinAreaRect {
        if self.points.len() < 3 {
            return MinAreaRect::default();
        }

        let hull = self.convex_hull();
        let hull_points = &hull.points;

        if hull_points.len() < 3 {
            let (Some((min_x, max_x)), Some((min_y, max_y))) = (
                self.points.iter().map(|p| p.x).minmax().into_option(),
                self.points.iter().map(|p| p.y).minmax().into_option(),
            ) else {
                return MinAreaRect::default();
            };
            return MinAreaRect {
                center: Point::new((min_x + max_x) / 2.0, (min_y + max_y) / 2.0),
                width: max_x - min_x,
                height: max_y - min_y,
                angle: 0.0,
            };
        }

        let mut min_area = f32::MAX;
        let mut best = MinAreaRect::default();
        let n = hull_points.len();

        for i in 0..n {
            let origin = hull_points[i];
            let next = hull_points[(i + 1) % n];
            let edge_x = next.x - origin.x;
            let edge_y = next.y - origin.y;
            let edge_len = (edge_x * edge_x + edge_y * edge_y).sqrt();
            if edge_len < f32::EPSILON {
                continue;
            }

            // Unit edge direction and its normal.
            let (nx, ny) = (edge_x / edge_len, edge_y / edge_len);
            let (px, py) = (-ny, nx);

            let (mut min_n, mut max_n) = (f32::MAX, f32::MIN);
            let (mut min_p, mut max_p) = (f32::MAX, f32::MIN);
            for point in hull_points {
                let dx = point.x - origin.x;
                let dy = point.y - origin.y;
                let proj_n = nx * dx + ny * dy;
                let proj_p = px * dx + py * dy;
                min_n = min_n.min(proj_n);
                max_n = max_n.max(proj_n);
                min_p = min_p.min(proj_p);
                max_p = max_p.max(proj_p);
            }

            let width = max_n - min_n;
            let height = max_p - min_p;
            if width * height < min_area {
                min_area = width * height;
                let cn = (min_n + max_n) / 2.0;
                let cp = (min_p + max_p) / 2.0;
                best = MinAreaRect {
                    center: Point::new(origin.x + cn * nx + cp * px, origin.y + cn * ny + cp * py),
                    width,
                    height,
                    angle: ny.atan2(nx) * 180.0 / PI,
                };
            }
        }

        best
    }
}

fn cross_product(p1: &Point, p2: &Point, p3: &Point) -> f32 {
    (p2.x - p1.x) * (p3.y - p1.y) - (p2.y - p1.y) * (p3.x - p1.x)
}

/// A rotated rectangle: center, side lengths and rotation in degrees.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinAreaRect {
    pub center: Point,
    pub width: f32,
    pub height: f32,
    pub angle: f32,
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl MinAreaRect {
    /// The four corners, unordered (in rotation order starting at `-w/2, -h/2`).
    fn corners(&self) -> [Point; 4] {
        let (sin_a, cos_a) = (self.angle * PI / 180.0).sin_cos();
        let (w_2, h_2) = (self.width / 2.0, self.height / 2.0);
        [(-w_2, -h_2), (w_2, -h_2), (w_2, h_2), (-w_2, h_2)].map(|(x, y)| {
            Point::new(
                x * cos_a - y * sin_a + self.center.x,
                x * sin_a + y * cos_a + self.center.y,
            )
        })
    }

    /// The corners ordered top-left, top-right, bottom-right, bottom-left.
    ///
    /// Points are sorted by x; of the two leftmost the upper one is top-left,
    /// of the two rightmost the upper one is top-right.
    pub fn ordered_corners(&self) -> [Point; 4] {
        order_quad(self.corners())
    }

    pub fn min_side(&self) -> f32 {
        self.width.min(self.height)
    }
}

/// Orders four points clockwise from the top-left.
pub fn order_quad(mut points: [Point; 4]) -> [Point; 4] {
    points.sort_by(|a, b| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal));
    let (tl, bl) = if points[1].y > points[0].y {
        (points[0], points[1])
    } else {
        (points[1], points[0])
    };
    let (tr, br) = if points[3].y > points[2].y {
        (points[2], points[3])
    } else {
        (points[3], points[2])
    };
    [tl, tr, br, bl]
}

/// Accumulates map values along one horizontal scanline through a polygon.
pub(crate) struct ScanlineBuffer {
    intersections: Vec<f32>,
}

impl ScanlineBuffer {
    pub(crate) fn new(max_polygon_points: usize) -> Self {
        Self {
            intersections: Vec::with_capacity(max_polygon_points),
        }
    }

    /// Sums `pred` over the pixels of row `y` that fall inside `polygon`,
    /// restricted to `start_x..end_x`. Returns `(sum, pixel_count)`.
    pub(crate) fn process_scanline(
        &mut self,
        y: f32,
        polygon: &BoundingBox,
        start_x: usize,
        end_x: usize,
        pred: &ndarray::ArrayView2<f32>,
    ) -> (f32, usize) {
        self.intersections.clear();

        let n = polygon.points.len();
        for i in 0..n {
            let p1 = &polygon.points[i];
            let p2 = &polygon.points[(i + 1) % n];
            if ((p1.y <= y && y < p2.y) || (p2.y <= y && y < p1.y))
                && (p2.y - p1.y).abs() > f32::EPSILON
            {
                self.intersections
                    .push(p1.x + (y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y));
            }
        }
        self.intersections
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        let row = y as usize;
        if row >= pred.shape()[0] {
            return (0.0, 0);
        }

        let mut sum = 0.0;
        let mut pixels = 0;
        for pair in self.intersections.chunks_exact(2) {
            let x1 = pair[0].max(start_x as f32).round() as usize;
            let x2 = (pair[1].min(end_x as f32).round() as usize).min(pred.shape()[1]);
            for x in x1..x2 {
                sum += pred[[row, x]];
                pixels += 1;
            }
        }
        (sum, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_extents() {
        let bbox = BoundingBox::new(vec![
            Point::new(10.0, 20.0),
            Point::new(50.0, 15.0),
            Point::new(45.0, 60.0),
            Point::new(5.0, 55.0),
        ]);
        assert_eq!(bbox.to_rect(), [5.0, 15.0, 50.0, 60.0]);
        assert_eq!(BoundingBox::new(vec![]).to_rect(), [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_area_and_perimeter_of_rectangle() {
        let rect = BoundingBox::from_coords(0.0, 0.0, 4.0, 3.0);
        assert!((rect.area() - 12.0).abs() < 1e-6);
        assert!((rect.perimeter() - 14.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_and_ioa() {
        let a = BoundingBox::from_coords(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::from_coords(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);

        let line = BoundingBox::from_coords(2.0, 2.0, 8.0, 4.0);
        assert!((line.ioa(&a) - 1.0).abs() < 1e-6);
        assert!((a.ioa(&line) - 0.12).abs() < 1e-6);

        let far = BoundingBox::from_coords(100.0, 100.0, 110.0, 110.0);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_union_covers_both() {
        let a = BoundingBox::from_coords(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::from_coords(5.0, -2.0, 20.0, 8.0);
        assert_eq!(a.union(&b).to_rect(), [0.0, -2.0, 20.0, 10.0]);
    }

    #[test]
    fn test_min_area_rect_of_axis_aligned_box() {
        let rect = BoundingBox::from_coords(10.0, 10.0, 40.0, 20.0).get_min_area_rect();
        assert!((rect.width * rect.height - 300.0).abs() < 1e-3);
        assert!((rect.min_side() - 10.0).abs() < 1e-3);
        assert!((rect.center.x - 25.0).abs() < 1e-3);
        assert!((rect.center.y - 15.0).abs() < 1e-3);

        let corners = rect.ordered_corners();
        assert!((corners[0].x - 10.0).abs() < 1e-3 && (corners[0].y - 10.0).abs() < 1e-3);
        assert!((corners[2].x - 40.0).abs() < 1e-3 && (corners[2].y - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_min_area_rect_of_rotated_square() {
        let diamond = BoundingBox::new(vec![
            Point::new(10.0, 0.0),
            Point::new(20.0, 10.0),
            Point::new(10.0, 20.0),
            Point::new(0.0, 10.0),
        ]);
        let rect = diamond.get_min_area_rect();
        assert!((rect.width * rect.height - 200.0).abs() < 1e-2);
    }

    #[test]
    fn test_collinear_points_fall_back_to_hull() {
        let line = BoundingBox::new(vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
        ]);
        let rect = line.get_min_area_rect();
        assert_eq!(rect.min_side(), 0.0);
    }

    #[test]
    fn test_scanline_sums_inside_polygon() {
        let pred = ndarray::Array2::<f32>::ones((10, 10));
        let square = BoundingBox::from_coords(2.0, 2.0, 6.0, 6.0);
        let mut buffer = ScanlineBuffer::new(4);
        let (sum, pixels) = buffer.process_scanline(3.5, &square, 0, 10, &pred.view());
        assert_eq!(pixels, 4);
        assert!((sum - 4.0).abs() < 1e-6);
    }
}
