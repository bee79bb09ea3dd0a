//! Delivery zones and membership filtering.

use crate::ids::ZoneId;
use crate::parcel::Parcel;
use lastmile_geo::Polygon;
use serde::{Deserialize, Serialize};

/// A named delivery zone with a polygon boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    /// Unique zone identifier
    pub id: ZoneId,

    /// Human-readable zone name
    pub name: String,

    /// Boundary polygon; holes mark excluded pockets
    pub boundary: Polygon,
}

impl Zone {
    /// Membership test for a single parcel.
    ///
    /// A parcel with no geocoded position is never a member.
    pub fn contains_parcel(&self, parcel: &Parcel) -> bool {
        match &parcel.position {
            Some(position) => self.boundary.contains(position),
            None => false,
        }
    }
}

/// Keep the parcels whose position falls inside the zone.
///
/// Membership is boundary-inclusive; parcels without coordinates are
/// always excluded.
pub fn filter_by_zone(parcels: Vec<Parcel>, zone: &Zone) -> Vec<Parcel> {
    parcels
        .into_iter()
        .filter(|p| zone.contains_parcel(p))
        .collect()
}
