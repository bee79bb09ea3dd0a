//! Route optimization for single-driver delivery rounds.
//!
//! Builds a distance matrix over a driver's routable parcels, solves an
//! open-path visit order starting at the depot and persists the result
//! as 1-based bag positions. A manual override path accepts an
//! operator-chosen order instead and recomputes the same leg metrics.

pub mod optimizer;
pub mod solver;

pub use optimizer::RouteOptimizer;
pub use solver::{identity_order, CheapestArcSolver, SolverError, TspSolver};
