//! Route payloads produced by the optimizer and the manual override.

use crate::ids::{DriverId, ParcelId};
use serde::{Deserialize, Serialize};

/// One stop on a driver's route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    /// Parcel delivered at this stop
    pub parcel_id: ParcelId,

    /// Carrier tracking number
    pub tracking_no: String,

    /// Delivery address
    pub address: String,

    /// 1-based visit order
    pub sequence: u32,

    /// Stop latitude in degrees
    pub latitude: f64,

    /// Stop longitude in degrees
    pub longitude: f64,

    /// Distance from the previous stop (the depot for the first stop),
    /// kilometers rounded to 2 decimals
    pub distance_from_previous_km: f64,

    /// Drive time from the previous stop, minutes rounded to 1 decimal
    pub duration_from_previous_min: f64,

    /// Google Maps navigation link for this stop
    pub google_maps_url: String,

    /// Waze navigation link for this stop
    pub waze_url: String,
}

/// A fully sequenced route for one driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRoute {
    /// Driver the route belongs to
    pub driver_id: DriverId,

    /// Total route distance, kilometers rounded to 2 decimals
    pub total_distance_km: f64,

    /// Total estimated drive time, minutes rounded to 1 decimal
    pub total_duration_min: f64,

    /// Ordered stops
    pub stops: Vec<Stop>,
}

impl DriverRoute {
    /// Empty route for a driver with nothing to deliver
    pub fn empty(driver_id: DriverId) -> Self {
        Self {
            driver_id,
            total_distance_km: 0.0,
            total_duration_min: 0.0,
            stops: Vec::new(),
        }
    }
}

/// Google Maps navigation deep link for a coordinate
pub fn google_maps_url(latitude: f64, longitude: f64) -> String {
    format!(
        "https://www.google.com/maps/dir/?api=1&destination={},{}",
        latitude, longitude
    )
}

/// Waze navigation deep link for a coordinate
pub fn waze_url(latitude: f64, longitude: f64) -> String {
    format!("https://waze.com/ul?ll={},{}&navigate=yes", latitude, longitude)
}
