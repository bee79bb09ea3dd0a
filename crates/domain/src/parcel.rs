//! Parcel model and lifecycle state machine.
//!
//! A parcel moves through `pending -> assigned -> sorted -> delivered`,
//! with one undo edge (`sorted -> assigned`) used by the sorting desk
//! when a scan has to be reverted. The transition table is closed; any
//! pair it does not list is rejected by the caller with a typed error.

use crate::ids::{DriverId, ParcelId, SorterId, ZoneId};
use lastmile_geo::GeoPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parcel lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParcelStatus {
    /// Registered but not yet assigned to a driver
    Pending,
    /// Assigned to a driver, awaiting warehouse sorting
    Assigned,
    /// Physically sorted into the driver's bag
    Sorted,
    /// Delivered to the recipient
    Delivered,
}

impl ParcelStatus {
    /// Check if status is terminal (delivered)
    pub fn is_terminal(&self) -> bool {
        matches!(self, ParcelStatus::Delivered)
    }

    /// Check if transition to new status is valid
    pub fn can_transition_to(&self, new_status: ParcelStatus) -> bool {
        match (self, new_status) {
            // From Pending
            (ParcelStatus::Pending, ParcelStatus::Assigned) => true,
            // From Assigned
            (ParcelStatus::Assigned, ParcelStatus::Sorted) => true,
            (ParcelStatus::Assigned, ParcelStatus::Delivered) => true,
            // From Sorted (the undo edge goes back to Assigned)
            (ParcelStatus::Sorted, ParcelStatus::Assigned) => true,
            (ParcelStatus::Sorted, ParcelStatus::Delivered) => true,
            // Terminal state cannot transition
            (ParcelStatus::Delivered, _) => false,
            // Invalid transitions
            _ => false,
        }
    }

    /// Storage string for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::Pending => "pending",
            ParcelStatus::Assigned => "assigned",
            ParcelStatus::Sorted => "sorted",
            ParcelStatus::Delivered => "delivered",
        }
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParcelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ParcelStatus::Pending),
            "assigned" => Ok(ParcelStatus::Assigned),
            "sorted" => Ok(ParcelStatus::Sorted),
            "delivered" => Ok(ParcelStatus::Delivered),
            other => Err(format!("Unknown parcel status: {}", other)),
        }
    }
}

/// A parcel tracked by the dispatch engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    /// Unique parcel identifier
    pub id: ParcelId,

    /// Carrier tracking number (unique across the store)
    pub tracking_no: String,

    /// Source feed the parcel was ingested from
    pub source: String,

    /// Free-form delivery address
    pub address: String,

    /// Geocoded delivery position, once known
    pub position: Option<GeoPoint>,

    /// Current lifecycle status
    pub status: ParcelStatus,

    /// Driver the parcel is assigned to
    pub driver_id: Option<DriverId>,

    /// Operator who sorted the parcel into the bag
    pub sorter_id: Option<SorterId>,

    /// Delivery zone membership
    pub zone_id: Option<ZoneId>,

    /// Bag position / visit order within the driver's route (1-based)
    pub sequence_order: Option<u32>,

    /// Driver assignment timestamp (Unix epoch milliseconds)
    pub dispatch_timestamp_ms: Option<u64>,

    /// Sort scan timestamp (Unix epoch milliseconds)
    pub sort_timestamp_ms: Option<u64>,
}

impl Parcel {
    /// True for parcels on an active round (assigned or sorted)
    pub fn is_active(&self) -> bool {
        matches!(self.status, ParcelStatus::Assigned | ParcelStatus::Sorted)
    }
}

/// Insert payload for a new parcel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewParcel {
    /// Carrier tracking number
    pub tracking_no: String,

    /// Source feed identifier
    pub source: String,

    /// Free-form delivery address
    pub address: String,

    /// Position when the source feed already carries coordinates
    pub position: Option<GeoPoint>,

    /// Pre-assigned delivery zone
    pub zone_id: Option<ZoneId>,

    /// Pre-assigned driver; the parcel is inserted as `assigned`
    pub driver_id: Option<DriverId>,
}

impl NewParcel {
    /// Create a minimal insert payload
    pub fn new(tracking_no: String, source: String, address: String) -> Self {
        Self {
            tracking_no,
            source,
            address,
            position: None,
            zone_id: None,
            driver_id: None,
        }
    }

    /// Status the parcel is inserted with
    pub fn initial_status(&self) -> ParcelStatus {
        if self.driver_id.is_some() {
            ParcelStatus::Assigned
        } else {
            ParcelStatus::Pending
        }
    }
}

/// Partial update applied to a parcel; only `Some` fields are written
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParcelUpdate {
    /// New lifecycle status
    pub status: Option<ParcelStatus>,

    /// New driver assignment
    pub driver_id: Option<DriverId>,

    /// New zone membership
    pub zone_id: Option<ZoneId>,

    /// Geocoded position
    pub position: Option<GeoPoint>,

    /// Bag position within the driver's route
    pub sequence_order: Option<u32>,

    /// Driver assignment timestamp (Unix epoch milliseconds)
    pub dispatch_timestamp_ms: Option<u64>,
}

impl ParcelUpdate {
    /// Apply the update in place; the single source of truth for what a
    /// partial update means, shared by every store implementation
    pub fn apply(&self, parcel: &mut Parcel) {
        if let Some(status) = self.status {
            parcel.status = status;
        }
        if let Some(driver_id) = self.driver_id {
            parcel.driver_id = Some(driver_id);
        }
        if let Some(zone_id) = self.zone_id {
            parcel.zone_id = Some(zone_id);
        }
        if let Some(position) = self.position {
            parcel.position = Some(position);
        }
        if let Some(sequence_order) = self.sequence_order {
            parcel.sequence_order = Some(sequence_order);
        }
        if let Some(ts) = self.dispatch_timestamp_ms {
            parcel.dispatch_timestamp_ms = Some(ts);
        }
    }
}
