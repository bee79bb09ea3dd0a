//! Core domain model for the lastmile dispatch engine.
//!
//! This crate contains pure domain logic with no I/O dependencies:
//! - Parcel model and lifecycle state machine
//! - Drivers, delivery zones and zone-membership filtering
//! - Route payloads shared by the optimizer and its consumers
//! - The storage abstraction every service crate runs against
//! - The closed error taxonomy

pub mod driver;
pub mod error;
pub mod ids;
pub mod parcel;
pub mod route;
pub mod store;
pub mod zone;

pub use driver::Driver;
pub use error::{DispatchError, Result};
pub use ids::{DriverId, ParcelId, SorterId, ZoneId};
pub use parcel::{NewParcel, Parcel, ParcelStatus, ParcelUpdate};
pub use route::{DriverRoute, Stop};
pub use store::{BulkInsertOutcome, ParcelCounts, ParcelStore, StoreError};
pub use zone::{filter_by_zone, Zone};
