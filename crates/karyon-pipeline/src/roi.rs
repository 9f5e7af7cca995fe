//! Region boundaries: closed outlines traced along pixel edges.

use geo::{ConvexHull, Coord, LineString, MultiPoint, Polygon};
use serde::{Deserialize, Serialize};

use crate::mask::BooleanMask;
use crate::types::{PixelPoint, Point, Rect};

/// Length saved per corner when a staircase corner is cut diagonally.
const CORNER_CUT: f64 = 2.0 - std::f64::consts::SQRT_2;

/// A closed polygon outlining one detected object.
///
/// Vertices are pixel corners in traversal order; the last vertex
/// connects back to the first. `bounds` is the pixel rectangle the
/// outline encloses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    vertices: Vec<PixelPoint>,
    bounds: Rect,
}

impl Roi {
    /// Build an outline from its corner vertices.
    #[must_use]
    pub fn new(vertices: Vec<PixelPoint>) -> Self {
        let bounds = bounds_of(&vertices);
        Self { vertices, bounds }
    }

    /// Corner vertices in traversal order.
    #[must_use]
    pub fn vertices(&self) -> &[PixelPoint] {
        &self.vertices
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Whether the outline has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// The pixel rectangle enclosed by the outline.
    #[must_use]
    pub const fn bounds(&self) -> Rect {
        self.bounds
    }

    /// The outline shifted by `(dx, dy)` pixels.
    #[must_use = "returns a translated copy"]
    pub fn translate(&self, dx: i32, dy: i32) -> Self {
        Self {
            vertices: self
                .vertices
                .iter()
                .map(|p| PixelPoint::new(p.x.saturating_add(dx), p.y.saturating_add(dy)))
                .collect(),
            bounds: self.bounds.translated(dx, dy),
        }
    }

    /// Perimeter of the outline with staircase corners smoothed.
    ///
    /// Sums the axis-aligned edge lengths, then subtracts `2 - √2` for
    /// every corner that would be cut by a diagonal, so a digitized
    /// circle measures close to its true circumference. Isolated unit
    /// steps alternate between counted and uncounted corners.
    #[must_use]
    pub fn traced_perimeter(&self) -> f64 {
        let n = self.vertices.len();
        if n < 2 {
            return 0.0;
        }
        let mut sum_dx = 0_i64;
        let mut sum_dy = 0_i64;
        let mut corners = 0_u32;

        let (mut dx1, mut dy1) = step(self.vertices[n - 1], self.vertices[0]);
        let mut side1 = dx1.abs() + dy1.abs();
        let mut corner = false;
        for i in 0..n {
            let (dx2, dy2) = step(self.vertices[i], self.vertices[(i + 1) % n]);
            sum_dx += dx1.abs();
            sum_dy += dy1.abs();
            let side2 = dx2.abs() + dy2.abs();
            if side1 > 1 || !corner {
                corner = true;
                corners += 1;
            } else {
                corner = false;
            }
            dx1 = dx2;
            dy1 = dy2;
            side1 = side2;
        }
        #[allow(clippy::cast_precision_loss)]
        let straight = (sum_dx + sum_dy) as f64;
        f64::from(corners).mul_add(-CORNER_CUT, straight)
    }

    /// Maximum caliper diameter: the largest distance between any two
    /// convex hull vertices.
    #[must_use]
    pub fn feret(&self) -> f64 {
        let points: MultiPoint<f64> = self
            .vertices
            .iter()
            .map(|p| geo::Point::new(f64::from(p.x), f64::from(p.y)))
            .collect();
        let hull = points.convex_hull();
        let coords: Vec<Coord<f64>> = hull.exterior().coords().copied().collect();
        let mut best = 0.0_f64;
        for (i, a) in coords.iter().enumerate() {
            for b in &coords[i + 1..] {
                let d = Point::new(a.x, a.y).distance(Point::new(b.x, b.y));
                best = best.max(d);
            }
        }
        best
    }

    /// The outline as a `geo` polygon in corner coordinates.
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        let ring: Vec<(f64, f64)> = self
            .vertices
            .iter()
            .map(|p| (f64::from(p.x), f64::from(p.y)))
            .collect();
        Polygon::new(LineString::from(ring), vec![])
    }

    /// Rasterize the polygon interior into a mask covering [`bounds`](Self::bounds).
    ///
    /// Cell `(i, j)` is set when the centre of pixel
    /// `(bounds.x + i, bounds.y + j)` lies inside the outline under the
    /// even-odd rule.
    #[must_use]
    pub fn mask(&self) -> BooleanMask {
        let bounds = self.bounds;
        let mut mask = BooleanMask::new(bounds.width, bounds.height);
        let n = self.vertices.len();
        let mut crossings: Vec<f64> = Vec::new();
        for row in 0..bounds.height {
            let yc = f64::from(bounds.y) + f64::from(row) + 0.5;
            crossings.clear();
            for i in 0..n {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                let (ay, by) = (f64::from(a.y), f64::from(b.y));
                if (ay < yc) != (by < yc) {
                    let t = (yc - ay) / (by - ay);
                    crossings.push(t.mul_add(f64::from(b.x - a.x), f64::from(a.x)));
                }
            }
            crossings.sort_by(f64::total_cmp);
            for pair in crossings.chunks_exact(2) {
                for col in 0..bounds.width {
                    let xc = f64::from(bounds.x) + f64::from(col) + 0.5;
                    if xc > pair[0] && xc < pair[1] {
                        let _ = mask.set(i64::from(col), i64::from(row), true);
                    }
                }
            }
        }
        mask
    }
}

fn step(from: PixelPoint, to: PixelPoint) -> (i64, i64) {
    (
        i64::from(to.x) - i64::from(from.x),
        i64::from(to.y) - i64::from(from.y),
    )
}

fn bounds_of(vertices: &[PixelPoint]) -> Rect {
    let Some(first) = vertices.first() else {
        return Rect::new(0, 0, 0, 0);
    };
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in vertices {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Rect::new(
        min_x,
        min_y,
        max_x.abs_diff(min_x),
        max_y.abs_diff(min_y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_roi(x: i32, y: i32, w: i32, h: i32) -> Roi {
        Roi::new(vec![
            PixelPoint::new(x, y),
            PixelPoint::new(x + w, y),
            PixelPoint::new(x + w, y + h),
            PixelPoint::new(x, y + h),
        ])
    }

    #[test]
    fn bounds_cover_vertices() {
        let roi = rect_roi(3, 4, 5, 2);
        assert_eq!(roi.bounds(), Rect::new(3, 4, 5, 2));
    }

    #[test]
    fn single_pixel_perimeter_cuts_two_corners() {
        let roi = rect_roi(0, 0, 1, 1);
        let expected = 2.0f64.mul_add(-CORNER_CUT, 4.0);
        assert!(
            (roi.traced_perimeter() - expected).abs() < 1e-9,
            "expected {expected}, got {}",
            roi.traced_perimeter()
        );
    }

    #[test]
    fn large_rectangle_cuts_every_corner() {
        let roi = rect_roi(0, 0, 10, 4);
        let expected = 4.0f64.mul_add(-CORNER_CUT, 28.0);
        assert!((roi.traced_perimeter() - expected).abs() < 1e-9);
    }

    #[test]
    fn feret_of_rectangle_is_diagonal() {
        let roi = rect_roi(0, 0, 3, 4);
        assert!((roi.feret() - 5.0).abs() < 1e-9, "got {}", roi.feret());
    }

    #[test]
    fn mask_fills_rectangle() {
        let roi = rect_roi(2, 2, 4, 3);
        let mask = roi.mask();
        assert_eq!((mask.width(), mask.height()), (4, 3));
        assert_eq!(mask.count(), 12);
    }

    #[test]
    fn mask_of_l_shape_excludes_notch() {
        // One-pixel column on the left joined to a three-pixel bottom row.
        let roi = Roi::new(vec![
            PixelPoint::new(0, 0),
            PixelPoint::new(1, 0),
            PixelPoint::new(1, 2),
            PixelPoint::new(3, 2),
            PixelPoint::new(3, 3),
            PixelPoint::new(0, 3),
        ]);
        let mask = roi.mask();
        assert_eq!(mask.count(), 5);
        assert!(!mask.is_set(2, 0));
        assert!(mask.is_set(0, 0));
        assert!(mask.is_set(2, 2));
    }

    #[test]
    fn translate_moves_vertices_and_bounds() {
        let roi = rect_roi(10, 10, 2, 2).translate(-10, -5);
        assert_eq!(roi.bounds(), Rect::new(0, 5, 2, 2));
        assert_eq!(roi.vertices()[0], PixelPoint::new(0, 5));
    }
}
