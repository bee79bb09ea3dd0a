//! Engine error taxonomy.
//!
//! One closed enum covers every rejection the dispatch and sorting
//! operations can produce. Infrastructure outages (geocoder, solver)
//! are deliberately absent: those degrade softly at the call site and
//! never surface as domain errors.

use crate::ids::DriverId;
use crate::parcel::ParcelStatus;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Unknown tracking number or entity id
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Scan of a parcel that has no driver yet
    #[error("Parcel {tracking_no} has no driver assigned")]
    Unassigned { tracking_no: String },

    /// Lifecycle transition the state machine does not allow
    #[error("Invalid transition for {tracking_no}: {from} -> {to}")]
    InvalidTransition {
        tracking_no: String,
        from: ParcelStatus,
        to: ParcelStatus,
    },

    /// Unscan of a parcel that is not in `sorted`
    #[error("Parcel {tracking_no} is not sorted")]
    NotSorted { tracking_no: String },

    /// Unscan by a different operator without elevated authority
    #[error("Parcel {tracking_no} was sorted by another operator")]
    NotOwner { tracking_no: String },

    /// Manual route ids do not match the driver's active parcels
    #[error(
        "Route for driver {driver_id} does not match its parcels: {missing} missing, {unexpected} unexpected"
    )]
    RouteMismatch {
        driver_id: DriverId,
        missing: usize,
        unexpected: usize,
    },

    /// Storage failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DispatchError {
    /// NotFound for an unknown tracking number
    pub fn parcel_not_found(tracking_no: &str) -> Self {
        DispatchError::NotFound {
            what: format!("parcel {}", tracking_no),
        }
    }

    /// NotFound for an unknown driver id
    pub fn driver_not_found(driver_id: DriverId) -> Self {
        DispatchError::NotFound {
            what: format!("driver {}", driver_id),
        }
    }

    /// NotFound for an unknown zone id
    pub fn zone_not_found(zone_id: crate::ids::ZoneId) -> Self {
        DispatchError::NotFound {
            what: format!("zone {}", zone_id),
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DispatchError::parcel_not_found("LM42");
        assert_eq!(err.to_string(), "Not found: parcel LM42");

        let err = DispatchError::InvalidTransition {
            tracking_no: "LM42".to_string(),
            from: ParcelStatus::Pending,
            to: ParcelStatus::Sorted,
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition for LM42: pending -> sorted"
        );
    }

    #[test]
    fn test_store_error_converts() {
        let store_err = StoreError::Backend("disk full".to_string());
        let err: DispatchError = store_err.into();
        assert!(matches!(err, DispatchError::Store(_)));
    }
}
