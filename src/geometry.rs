//! Polygon containment for region-of-interest filtering.
//!
//! Containment uses the crossing-number (ray casting) rule with half-open edge handling: an edge
//! counts as crossed when exactly one of its endpoints lies strictly above the query row and the
//! crossing lies strictly to the right of the query point. For an axis-aligned rectangle
//! `[x0, x1] × [y0, y1]` this makes the region `[x0, x1) × [y0, y1)`: points on the left and
//! bottom edges are inside, points on the right and top edges are outside. Of the four corners
//! only `(x0, y0)` is inside. Shared edges of adjacent polygons are therefore claimed by exactly
//! one of them.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CellError, CellResult};

/// A 2-D vertex.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A simple polygon given by its vertices in order (implicitly closed).
///
/// Deserializes from a JSON array of `[x, y]` pairs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<[f32; 2]>")]
pub struct Polygon {
    vertices: Vec<Point>,
    min: Point,
    max: Point,
}

impl Polygon {
    /// Build a polygon. Needs at least three vertices, all finite.
    pub fn new(vertices: Vec<Point>) -> CellResult<Self> {
        if vertices.len() < 3 {
            return Err(CellError::config(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        if vertices.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(CellError::config("polygon vertices must be finite"));
        }

        let mut min = vertices[0];
        let mut max = vertices[0];
        for p in &vertices[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }

        Ok(Self { vertices, min, max })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Containment test for `(x, y)`; see the module docs for the boundary convention.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        if x < self.min.x || x > self.max.x || y < self.min.y || y > self.max.y {
            return false;
        }

        let (px, py) = (f64::from(x), f64::from(y));
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = (f64::from(self.vertices[i].x), f64::from(self.vertices[i].y));
            let (xj, yj) = (f64::from(self.vertices[j].x), f64::from(self.vertices[j].y));
            if (yi > py) != (yj > py) {
                let cross_x = (xj - xi) * (py - yi) / (yj - yi) + xi;
                if px < cross_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

impl TryFrom<Vec<[f32; 2]>> for Polygon {
    type Error = CellError;

    fn try_from(pairs: Vec<[f32; 2]>) -> CellResult<Self> {
        Polygon::new(pairs.into_iter().map(|[x, y]| Point::new(x, y)).collect())
    }
}

/// Parse a JSON array of polygons, each an array of `[x, y]` pairs.
pub fn polygons_from_json_str(input: &str) -> CellResult<Vec<Polygon>> {
    Ok(serde_json::from_str(input)?)
}

/// Read polygons from a JSON file (see [`polygons_from_json_str`]).
pub fn load_polygons(path: impl AsRef<Path>) -> CellResult<Vec<Polygon>> {
    polygons_from_json_str(&fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::{polygons_from_json_str, Point, Polygon};

    fn unit_square() -> Polygon {
        Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn unit_square_interior_and_exterior() {
        let sq = unit_square();
        assert!(sq.contains(0.5, 0.5));
        assert!(!sq.contains(2.0, 2.0));
        assert!(!sq.contains(-0.1, 0.5));
    }

    #[test]
    fn left_and_bottom_edges_are_inside() {
        let sq = unit_square();
        assert!(sq.contains(0.0, 0.5));
        assert!(sq.contains(0.5, 0.0));
    }

    #[test]
    fn right_and_top_edges_are_outside() {
        let sq = unit_square();
        assert!(!sq.contains(1.0, 0.5));
        assert!(!sq.contains(0.5, 1.0));
    }

    #[test]
    fn only_the_lower_left_vertex_is_inside() {
        let sq = unit_square();
        assert!(sq.contains(0.0, 0.0));
        assert!(!sq.contains(1.0, 0.0));
        assert!(!sq.contains(1.0, 1.0));
        assert!(!sq.contains(0.0, 1.0));
    }

    #[test]
    fn concave_polygon_excludes_notch() {
        // U shape: notch between x=1..2 above y=1
        let u = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 0.0),
            Point::new(3.0, 3.0),
            Point::new(2.0, 3.0),
            Point::new(2.0, 1.0),
            Point::new(1.0, 1.0),
            Point::new(1.0, 3.0),
            Point::new(0.0, 3.0),
        ])
        .unwrap();
        assert!(u.contains(0.5, 2.0));
        assert!(u.contains(2.5, 2.0));
        assert!(!u.contains(1.5, 2.0));
        assert!(u.contains(1.5, 0.5));
    }

    #[test]
    fn degenerate_polygons_are_rejected() {
        assert!(Polygon::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]).is_err());
        assert!(Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(f32::NAN, 1.0),
            Point::new(1.0, 0.0)
        ])
        .is_err());
    }

    #[test]
    fn polygons_parse_from_json_pairs() {
        let polys = polygons_from_json_str("[[[0,0],[1,0],[1,1],[0,1]], [[5,5],[6,5],[6,6]]]").unwrap();
        assert_eq!(polys.len(), 2);
        assert!(polys[0].contains(0.5, 0.5));
        assert!(polygons_from_json_str("[[[0,0],[1,0]]]").is_err());
    }
}
