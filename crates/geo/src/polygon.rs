//! Point-in-polygon containment for delivery zones.

use crate::point::GeoPoint;
use serde::{Deserialize, Serialize};

/// Tolerance in degrees for the on-boundary test (well under a meter)
const BOUNDARY_EPS: f64 = 1e-9;

/// A closed polyline of vertices.
///
/// The closing edge from the last vertex back to the first is implicit;
/// input that repeats the first vertex at the end is tolerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ring {
    /// Ring vertices in order, either winding
    pub vertices: Vec<GeoPoint>,
}

impl Ring {
    pub fn new(vertices: Vec<GeoPoint>) -> Self {
        Self { vertices }
    }

    /// Vertices with an explicit closing duplicate stripped
    fn effective(&self) -> &[GeoPoint] {
        match self.vertices.as_slice() {
            [first, .., last] if first == last => &self.vertices[..self.vertices.len() - 1],
            v => v,
        }
    }

    /// A ring with fewer than three distinct vertices encloses nothing
    fn is_degenerate(&self) -> bool {
        let pts = self.effective();
        let mut distinct: Vec<GeoPoint> = Vec::new();
        for p in pts {
            if !distinct.iter().any(|q| q == p) {
                distinct.push(*p);
            }
        }
        distinct.len() < 3
    }

    /// Even-odd ray cast. Results for points exactly on the boundary are
    /// unspecified here; callers must test [`Ring::on_boundary`] first.
    fn crosses(&self, point: &GeoPoint) -> bool {
        let pts = self.effective();
        let n = pts.len();
        if n < 3 {
            return false;
        }
        let (x, y) = (point.longitude, point.latitude);
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (ix, iy) = (pts[i].longitude, pts[i].latitude);
            let (jx, jy) = (pts[j].longitude, pts[j].latitude);
            if ((iy > y) != (jy > y)) && (x < (jx - ix) * (y - iy) / (jy - iy) + ix) {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// True when the point lies on one of the ring's edges or vertices
    fn on_boundary(&self, point: &GeoPoint) -> bool {
        let pts = self.effective();
        let n = pts.len();
        if n == 0 {
            return false;
        }
        let mut j = n - 1;
        for i in 0..n {
            if on_segment(&pts[j], &pts[i], point) {
                return true;
            }
            j = i;
        }
        false
    }
}

/// Collinearity-plus-bounding-box test for a point against segment `a..b`
fn on_segment(a: &GeoPoint, b: &GeoPoint, p: &GeoPoint) -> bool {
    let cross = (b.longitude - a.longitude) * (p.latitude - a.latitude)
        - (b.latitude - a.latitude) * (p.longitude - a.longitude);
    if cross.abs() > BOUNDARY_EPS {
        return false;
    }
    let within_lon = p.longitude >= a.longitude.min(b.longitude) - BOUNDARY_EPS
        && p.longitude <= a.longitude.max(b.longitude) + BOUNDARY_EPS;
    let within_lat = p.latitude >= a.latitude.min(b.latitude) - BOUNDARY_EPS
        && p.latitude <= a.latitude.max(b.latitude) + BOUNDARY_EPS;
    within_lon && within_lat
}

/// A polygon with an exterior boundary and optional interior holes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polygon {
    /// Outer boundary
    pub exterior: Ring,
    /// Interior exclusion rings
    #[serde(default)]
    pub holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(exterior: Ring) -> Self {
        Self {
            exterior,
            holes: Vec::new(),
        }
    }

    pub fn with_holes(exterior: Ring, holes: Vec<Ring>) -> Self {
        Self { exterior, holes }
    }

    /// Zone-membership test.
    ///
    /// Points exactly on any boundary edge or vertex count as inside,
    /// including hole boundaries. Points strictly inside a hole are
    /// outside. A degenerate exterior (fewer than three distinct
    /// vertices) contains nothing.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        if self.exterior.is_degenerate() {
            return false;
        }
        if self.exterior.on_boundary(point) || self.holes.iter().any(|h| h.on_boundary(point)) {
            return true;
        }
        if !self.exterior.crosses(point) {
            return false;
        }
        !self
            .holes
            .iter()
            .any(|h| !h.is_degenerate() && h.crosses(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint::new(latitude, longitude).unwrap()
    }

    fn unit_square() -> Polygon {
        Polygon::new(Ring::new(vec![
            pt(0.0, 0.0),
            pt(0.0, 1.0),
            pt(1.0, 1.0),
            pt(1.0, 0.0),
        ]))
    }

    #[test]
    fn test_point_inside_square() {
        assert!(unit_square().contains(&pt(0.5, 0.5)));
    }

    #[test]
    fn test_point_outside_square() {
        assert!(!unit_square().contains(&pt(1.5, 0.5)));
        assert!(!unit_square().contains(&pt(-0.2, 0.5)));
    }

    #[test]
    fn test_point_on_edge_counts_inside() {
        assert!(unit_square().contains(&pt(0.0, 0.5)));
        assert!(unit_square().contains(&pt(0.5, 1.0)));
    }

    #[test]
    fn test_point_on_vertex_counts_inside() {
        assert!(unit_square().contains(&pt(1.0, 1.0)));
        assert!(unit_square().contains(&pt(0.0, 0.0)));
    }

    #[test]
    fn test_point_just_outside_edge() {
        assert!(!unit_square().contains(&pt(0.5, 1.0 + 1e-6)));
    }

    #[test]
    fn test_closed_ring_matches_open_ring() {
        let closed = Polygon::new(Ring::new(vec![
            pt(0.0, 0.0),
            pt(0.0, 1.0),
            pt(1.0, 1.0),
            pt(1.0, 0.0),
            pt(0.0, 0.0),
        ]));
        for probe in [pt(0.5, 0.5), pt(1.5, 0.5), pt(0.0, 0.5), pt(1.0, 1.0)] {
            assert_eq!(closed.contains(&probe), unit_square().contains(&probe));
        }
    }

    #[test]
    fn test_hole_excludes_interior_but_not_its_boundary() {
        let hole = Ring::new(vec![
            pt(0.25, 0.25),
            pt(0.25, 0.75),
            pt(0.75, 0.75),
            pt(0.75, 0.25),
        ]);
        let poly = Polygon::with_holes(unit_square().exterior, vec![hole]);
        assert!(!poly.contains(&pt(0.5, 0.5)));
        assert!(poly.contains(&pt(0.25, 0.5)));
        assert!(poly.contains(&pt(0.1, 0.5)));
    }

    #[test]
    fn test_concave_polygon() {
        let l_shape = Polygon::new(Ring::new(vec![
            pt(0.0, 0.0),
            pt(2.0, 0.0),
            pt(2.0, 1.0),
            pt(1.0, 1.0),
            pt(1.0, 2.0),
            pt(0.0, 2.0),
        ]));
        assert!(l_shape.contains(&pt(0.5, 1.5)));
        assert!(l_shape.contains(&pt(1.5, 0.5)));
        assert!(!l_shape.contains(&pt(1.5, 1.5)));
    }

    #[test]
    fn test_degenerate_ring_contains_nothing() {
        let line = Polygon::new(Ring::new(vec![pt(0.0, 0.0), pt(1.0, 1.0)]));
        assert!(!line.contains(&pt(0.5, 0.5)));
        assert!(!line.contains(&pt(0.0, 0.0)));

        let repeated = Polygon::new(Ring::new(vec![
            pt(0.0, 0.0),
            pt(0.0, 0.0),
            pt(1.0, 1.0),
        ]));
        assert!(!repeated.contains(&pt(0.5, 0.5)));
    }

    #[test]
    fn test_empty_ring() {
        let empty = Polygon::new(Ring::new(Vec::new()));
        assert!(!empty.contains(&pt(0.0, 0.0)));
    }
}
