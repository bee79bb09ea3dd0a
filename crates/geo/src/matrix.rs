//! Pairwise great-circle distance matrix.

use crate::point::GeoPoint;

/// Symmetric matrix of pairwise haversine distances in kilometers.
///
/// Stored row-major in a flat buffer. Row/column indices follow the
/// order of the point slice handed to [`DistanceMatrix::build`], so
/// callers can keep parallel vectors of points and metadata.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    size: usize,
    cells: Vec<f64>,
}

impl DistanceMatrix {
    /// Build the matrix for a slice of points.
    ///
    /// The diagonal is zero and `get(i, j) == get(j, i)` for all pairs.
    pub fn build(points: &[GeoPoint]) -> Self {
        let size = points.len();
        let mut cells = vec![0.0; size * size];
        for i in 0..size {
            for j in (i + 1)..size {
                let d = points[i].haversine_km(&points[j]);
                cells[i * size + j] = d;
                cells[j * size + i] = d;
            }
        }
        Self { size, cells }
    }

    /// Distance between point `i` and point `j` in kilometers.
    ///
    /// # Panics
    /// Panics if either index is out of bounds.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(
            i < self.size && j < self.size,
            "distance matrix index out of bounds"
        );
        self.cells[i * self.size + j]
    }

    /// Number of points the matrix covers
    pub fn len(&self) -> usize {
        self.size
    }

    /// True when the matrix covers no points
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}
