//! Open-path visit-order solving.
//!
//! A driver leaves the depot once and does not return, so routes are
//! open paths over the distance matrix with the depot fixed at index 0.

use lastmile_geo::DistanceMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;

/// Minimum gain for a 2-opt move, keeps float noise from cycling
const IMPROVEMENT_EPS: f64 = 1e-9;

/// Errors produced by a route solver
#[derive(Debug, Error)]
pub enum SolverError {
    /// Instance the solver cannot work with
    #[error("Unsolvable route instance: {reason}")]
    Infeasible { reason: String },
}

/// Visit-order solver over a distance matrix.
///
/// Index 0 is the depot. Implementations return a permutation of
/// `0..matrix.len()` that starts at 0. The path is open; no return leg
/// to the depot is counted.
pub trait TspSolver: Send + Sync {
    fn solve(&self, matrix: &DistanceMatrix) -> Result<Vec<usize>, SolverError>;
}

/// Unoptimized fallback order: depot first, then input order
pub fn identity_order(len: usize) -> Vec<usize> {
    (0..len).collect()
}

/// Total length of an open path over the matrix, in kilometers
pub fn path_length_km(matrix: &DistanceMatrix, order: &[usize]) -> f64 {
    order.windows(2).map(|leg| matrix.get(leg[0], leg[1])).sum()
}

/// Cheapest-arc construction with 2-opt improvement and seeded restarts.
///
/// The greedy pass repeatedly takes the cheapest arc out of the current
/// node, then 2-opt removes crossings. `restarts` additional tours start
/// from shuffled orders and the shortest result wins. Output is
/// deterministic for a fixed seed.
#[derive(Debug, Clone)]
pub struct CheapestArcSolver {
    /// Shuffled restarts on top of the greedy tour
    pub restarts: u32,

    /// Seed for the restart shuffles
    pub seed: u64,
}

impl Default for CheapestArcSolver {
    fn default() -> Self {
        Self {
            restarts: 8,
            seed: 7,
        }
    }
}

impl TspSolver for CheapestArcSolver {
    fn solve(&self, matrix: &DistanceMatrix) -> Result<Vec<usize>, SolverError> {
        let n = matrix.len();
        if n <= 2 {
            // Nothing to reorder: at most the depot and one stop
            return Ok(identity_order(n));
        }

        let mut best = cheapest_arc_tour(matrix);
        two_opt(matrix, &mut best);
        let mut best_km = path_length_km(matrix, &best);

        let mut rng = StdRng::seed_from_u64(self.seed);
        for _ in 0..self.restarts {
            let mut tour: Vec<usize> = (1..n).collect();
            tour.shuffle(&mut rng);
            tour.insert(0, 0);
            two_opt(matrix, &mut tour);
            let km = path_length_km(matrix, &tour);
            if km + IMPROVEMENT_EPS < best_km {
                best_km = km;
                best = tour;
            }
        }
        Ok(best)
    }
}

/// Greedy tour taking the cheapest arc out of the current node.
///
/// Always terminates: while the tour is short of `n` nodes an unvisited
/// node with a finite distance remains.
fn cheapest_arc_tour(matrix: &DistanceMatrix) -> Vec<usize> {
    let n = matrix.len();
    let mut tour = Vec::with_capacity(n);
    let mut visited = vec![false; n];
    let mut current = 0;
    visited[0] = true;
    tour.push(0);
    while tour.len() < n {
        let mut next = current;
        let mut next_km = f64::INFINITY;
        for candidate in 1..n {
            if !visited[candidate] && matrix.get(current, candidate) < next_km {
                next = candidate;
                next_km = matrix.get(current, candidate);
            }
        }
        visited[next] = true;
        tour.push(next);
        current = next;
    }
    tour
}

/// In-place 2-opt improvement for an open path; index 0 never moves.
///
/// Reversing `tour[i..=k]` replaces the leg into `tour[i]` and, unless
/// `k` is the last stop, the leg out of `tour[k]`. Internal legs only
/// change direction, which the symmetric matrix makes free.
fn two_opt(matrix: &DistanceMatrix, tour: &mut [usize]) {
    let n = tour.len();
    if n < 3 {
        return;
    }
    let mut improved = true;
    while improved {
        improved = false;
        for i in 1..n - 1 {
            for k in i + 1..n {
                let before = tour[i - 1];
                let mut removed = matrix.get(before, tour[i]);
                let mut added = matrix.get(before, tour[k]);
                if k + 1 < n {
                    removed += matrix.get(tour[k], tour[k + 1]);
                    added += matrix.get(tour[i], tour[k + 1]);
                }
                if added + IMPROVEMENT_EPS < removed {
                    tour[i..=k].reverse();
                    improved = true;
                }
            }
        }
    }
}
