//! Geographic primitives for the lastmile engine.
//!
//! Provides validated coordinates, great-circle (haversine) distances,
//! pairwise distance matrices for route solving, and point-in-polygon
//! containment for delivery-zone membership.

pub mod matrix;
pub mod point;
pub mod polygon;

pub use matrix::DistanceMatrix;
pub use point::{GeoError, GeoPoint, EARTH_RADIUS_KM};
pub use polygon::{Polygon, Ring};
